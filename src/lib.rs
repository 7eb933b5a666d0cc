//! ATLAS Alert Codec
//!
//! Composes Avro schema fragments into one resolved alert schema and uses it
//! to encode and decode alert records, including embedded image cutouts
//! ("stamps").
//!
//! ## Features
//!
//! - **Schema Composition**: fragments are loaded in dependency order and
//!   later fragments may refer to types named by earlier ones
//! - **Schemaless Messages**: bare Avro binary for one record, schema supplied
//!   out of band
//! - **Bulk Containers**: Avro object container files with the schema embedded
//!   once and records in sync-delimited blocks
//! - **Stamps**: cutout files embedded as `{fileName, stampData}` records and
//!   extracted back to disk
//! - **Integrity Checks**: MD5 (or SHA-256) comparison of stamp files
//!
//! ## Layout
//!
//! ```text
//! schema/
//! ├── cutout.avsc      atlas.alert.cutout
//! ├── candidate.avsc   atlas.alert.candidate
//! └── alert.avsc       atlas.alert.alert (references both)
//! ```

pub mod checksum;
pub mod codec;
pub mod config;
pub mod error;
pub mod inspect;
pub mod schema;
pub mod stamp;
pub mod value;

pub use checksum::{check_md5, files_match, Checksum, DigestAlgorithm};
pub use codec::{
    decode, decode_file, encode, read_bulk, read_bulk_file, write_bulk, write_bulk_file, BulkReader,
    BulkWriter, ContainerCodec,
};
pub use config::CodecConfig;
pub use error::{AlertError, Result};
pub use inspect::{inspect, render, report, stamp_originals, StampCheck, StampOriginals};
pub use schema::{compose, compose_embedded, compose_fragments, ResolvedSchema, SchemaComposer, SchemaFragment};
pub use stamp::{embed, extract, extract_all, strip_stamps, Stamp, StampField};
pub use value::{Record, Value};
