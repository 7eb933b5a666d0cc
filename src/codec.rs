//! Binary record codec
//!
//! Two framings are supported:
//!
//! - **schemaless**: the bare Avro binary encoding of one record. Nothing in
//!   the bytes identifies the schema, so the same [`ResolvedSchema`] has to be
//!   supplied to [`decode`].
//! - **bulk**: an Avro object container file. The writer schema is stored once
//!   in the header and records follow in sync-delimited blocks, so the file
//!   can be re-read on its own with [`read_bulk`].
//!
//! Records are conformed to the schema before encoding: extra fields are
//! dropped, defaults fill missing fields and union branches are chosen from
//! the shape of the value.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;

use apache_avro::schema::{EnumSchema, FixedSchema, RecordSchema, Schema, UnionSchema};
use apache_avro::types::Value as AvroValue;
use apache_avro::{Codec, Reader, Writer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{AlertError, Result};
use crate::schema::{index_named, ResolvedSchema};
use crate::value::{Record, Value};

/// Block compression for bulk containers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ContainerCodec {
    #[default]
    Null,
    Deflate,
}

impl From<ContainerCodec> for Codec {
    fn from(codec: ContainerCodec) -> Self {
        match codec {
            ContainerCodec::Null => Codec::Null,
            ContainerCodec::Deflate => Codec::Deflate,
        }
    }
}

/// Encode one record without any framing or embedded schema
pub fn encode(record: &Record, schema: &ResolvedSchema) -> Result<Vec<u8>> {
    let value = Conformer::new(schema.named()).record(record, schema.avro(), "")?;
    let bytes = apache_avro::to_avro_datum(schema.avro(), value)
        .map_err(|e| AlertError::encoding("", e.to_string()))?;
    debug!(bytes = bytes.len(), "encoded schemaless record");
    Ok(bytes)
}

/// Decode exactly one schemaless record starting at offset 0
pub fn decode(bytes: &[u8], schema: &ResolvedSchema) -> Result<Record> {
    let mut remaining = bytes;
    let value = apache_avro::from_avro_datum(schema.avro(), &mut remaining, None)
        .map_err(|e| AlertError::decoding(e.to_string()))?;
    if !remaining.is_empty() {
        return Err(AlertError::decoding(format!(
            "{} trailing bytes after record; concatenated schemaless records are not supported",
            remaining.len()
        )));
    }
    into_record(value)
}

/// Read a whole file holding a single schemaless record and decode it
pub fn decode_file(path: impl AsRef<Path>, schema: &ResolvedSchema) -> Result<Record> {
    let bytes = std::fs::read(path.as_ref())?;
    debug!(path = %path.as_ref().display(), bytes = bytes.len(), "read schemaless message");
    decode(&bytes, schema)
}

/// Writes records into a self-describing container
pub struct BulkWriter<'a, W: Write> {
    schema: &'a ResolvedSchema,
    inner: Writer<'a, W>,
    written: usize,
}

impl<'a, W: Write> BulkWriter<'a, W> {
    pub fn new(schema: &'a ResolvedSchema, writer: W, codec: ContainerCodec) -> Self {
        Self {
            schema,
            inner: Writer::with_codec(schema.avro(), writer, codec.into()),
            written: 0,
        }
    }

    /// Append one record; order of appends is the order records are read back
    pub fn append(&mut self, record: &Record) -> Result<()> {
        let value = Conformer::new(self.schema.named()).record(record, self.schema.avro(), "")?;
        self.inner
            .append(value)
            .map_err(|e| AlertError::encoding(&format!("record {}", self.written), e.to_string()))?;
        self.written += 1;
        Ok(())
    }

    /// Number of records appended so far
    pub fn written(&self) -> usize {
        self.written
    }

    /// Flush the last block and hand back the underlying writer
    pub fn into_inner(self) -> Result<W> {
        let written = self.written;
        let inner = self
            .inner
            .into_inner()
            .map_err(|e| AlertError::encoding("<container>", e.to_string()))?;
        debug!(records = written, "finished bulk container");
        Ok(inner)
    }
}

/// Write all records into one container on `writer`
pub fn write_bulk<'r, W: Write>(
    schema: &ResolvedSchema,
    records: impl IntoIterator<Item = &'r Record>,
    writer: W,
    codec: ContainerCodec,
) -> Result<W> {
    let mut bulk = BulkWriter::new(schema, writer, codec);
    for record in records {
        bulk.append(record)?;
    }
    bulk.into_inner()
}

/// Write all records into a container file, returning how many were written
pub fn write_bulk_file<'r>(
    path: impl AsRef<Path>,
    schema: &ResolvedSchema,
    records: impl IntoIterator<Item = &'r Record>,
    codec: ContainerCodec,
) -> Result<usize> {
    let path = path.as_ref();
    let file = BufWriter::new(File::create(path)?);
    let mut bulk = BulkWriter::new(schema, file, codec);
    for record in records {
        bulk.append(record)?;
    }
    let count = bulk.written();
    bulk.into_inner()?.flush()?;
    info!(path = %path.display(), records = count, "wrote bulk container");
    Ok(count)
}

/// Lazy sequence of records read from a container
pub struct BulkReader<'a, R: Read> {
    inner: Reader<'a, R>,
}

impl<'a, R: Read> BulkReader<'a, R> {
    /// Schema embedded in the container header
    pub fn writer_schema(&self) -> &Schema {
        self.inner.writer_schema()
    }
}

impl<'a, R: Read> Iterator for BulkReader<'a, R> {
    type Item = Result<Record>;

    fn next(&mut self) -> Option<Self::Item> {
        self.inner.next().map(|value| {
            value
                .map_err(|e| AlertError::decoding(e.to_string()))
                .and_then(into_record)
        })
    }
}

/// Open a container. With a reader schema records are projected onto it.
pub fn read_bulk<R: Read>(reader: R, reader_schema: Option<&ResolvedSchema>) -> Result<BulkReader<'_, R>> {
    let inner = match reader_schema {
        Some(schema) => Reader::with_schema(schema.avro(), reader),
        None => Reader::new(reader),
    }
    .map_err(|e| AlertError::decoding(format!("unreadable container header: {e}")))?;

    if let Some(schema) = reader_schema {
        let writer = inner.writer_schema();
        check_projection(writer, &index_named(writer), schema.avro(), schema.named(), "")?;
    }
    Ok(BulkReader { inner })
}

/// Open a container file for lazy reading
pub fn read_bulk_file<'a>(
    path: impl AsRef<Path>,
    reader_schema: Option<&'a ResolvedSchema>,
) -> Result<BulkReader<'a, BufReader<File>>> {
    let path = path.as_ref();
    debug!(path = %path.display(), "opening bulk container");
    read_bulk(BufReader::new(File::open(path)?), reader_schema)
}

fn follow_ref<'s>(schema: &'s Schema, named: &'s HashMap<String, Schema>) -> &'s Schema {
    match schema {
        Schema::Ref { name } => named.get(&name.fullname(None)).unwrap_or(schema),
        other => other,
    }
}

fn join(path: &str, field: &str) -> String {
    if path.is_empty() {
        field.to_string()
    } else {
        format!("{path}.{field}")
    }
}

fn record_name(schema: &Schema) -> Option<String> {
    match schema {
        Schema::Record(RecordSchema { name, .. }) => Some(name.fullname(None)),
        _ => None,
    }
}

/// Every reader field must come from the writer or have a default.
///
/// Records under unions are paired with the writer record of the same full
/// name; a branch with no counterpart on the other side is never read.
fn check_projection(
    writer: &Schema,
    writer_named: &HashMap<String, Schema>,
    reader: &Schema,
    reader_named: &HashMap<String, Schema>,
    path: &str,
) -> Result<()> {
    let writer = follow_ref(writer, writer_named);
    let reader = follow_ref(reader, reader_named);

    match (writer, reader) {
        (Schema::Record(RecordSchema { fields: writer_fields, .. }), Schema::Record(RecordSchema { fields: reader_fields, .. })) => {
            for field in reader_fields {
                let field_path = join(path, &field.name);
                match writer_fields.iter().find(|w| w.name == field.name) {
                    Some(source) => {
                        check_projection(&source.schema, writer_named, &field.schema, reader_named, &field_path)?
                    }
                    None if field.default.is_some() => {}
                    None => {
                        return Err(AlertError::decoding(format!(
                            "reader field '{field_path}' has no default and is absent from the writer schema"
                        )))
                    }
                }
            }
            Ok(())
        }
        (Schema::Array(writer_items), Schema::Array(reader_items)) => {
            check_projection(writer_items, writer_named, reader_items, reader_named, &format!("{path}[]"))
        }
        (Schema::Map(writer_values), Schema::Map(reader_values)) => {
            check_projection(writer_values, writer_named, reader_values, reader_named, path)
        }
        (Schema::Union(_), _) | (_, Schema::Union(_)) => {
            let writer_branches = branches(writer);
            let reader_branches = branches(reader);
            for reader_branch in &reader_branches {
                let resolved = follow_ref(reader_branch, reader_named);
                let Some(name) = record_name(resolved) else {
                    continue;
                };
                let source = writer_branches
                    .iter()
                    .find(|w| record_name(follow_ref(w, writer_named)).as_deref() == Some(name.as_str()));
                if let Some(source) = source {
                    check_projection(source, writer_named, resolved, reader_named, path)?;
                }
            }
            Ok(())
        }
        _ => Ok(()),
    }
}

fn branches(schema: &Schema) -> Vec<&Schema> {
    match schema {
        Schema::Union(union) => union.variants().iter().collect(),
        other => vec![other],
    }
}

/// Shapes a [`Value`] tree into the Avro value a schema expects
struct Conformer<'s> {
    named: &'s HashMap<String, Schema>,
}

impl<'s> Conformer<'s> {
    fn new(named: &'s HashMap<String, Schema>) -> Self {
        Self { named }
    }

    fn resolve(&self, schema: &'s Schema, path: &str) -> Result<&'s Schema> {
        match schema {
            Schema::Ref { name } => {
                let fullname = name.fullname(None);
                self.named
                    .get(&fullname)
                    .ok_or_else(|| AlertError::encoding(path, format!("unresolved type '{fullname}'")))
            }
            other => Ok(other),
        }
    }

    fn record(&self, record: &Record, schema: &'s Schema, path: &str) -> Result<AvroValue> {
        let Schema::Record(RecordSchema { fields, .. }) = self.resolve(schema, path)? else {
            return Err(AlertError::encoding(path, "schema root is not a record"));
        };

        let mut out = Vec::with_capacity(fields.len());
        for field in fields {
            let field_path = join(path, &field.name);
            let value = match (record.get(&field.name), &field.default) {
                (Some(value), _) => self.value(value, &field.schema, &field_path)?,
                (None, Some(default)) => self.value(&Value::from_json(default), &field.schema, &field_path)?,
                (None, None) => {
                    return Err(AlertError::encoding(&field_path, "missing required field with no default"))
                }
            };
            out.push((field.name.clone(), value));
        }
        Ok(AvroValue::Record(out))
    }

    fn value(&self, value: &Value, schema: &'s Schema, path: &str) -> Result<AvroValue> {
        let schema = self.resolve(schema, path)?;
        let mismatch = || AlertError::encoding(path, format!("cannot encode {} as {}", value.kind(), schema_kind(schema)));

        Ok(match (schema, value) {
            (Schema::Null, Value::Null) => AvroValue::Null,
            (Schema::Boolean, Value::Boolean(b)) => AvroValue::Boolean(*b),
            (Schema::Int, Value::Int(i)) => AvroValue::Int(narrow(*i, path)?),
            (Schema::Long, Value::Int(i)) => AvroValue::Long(*i),
            (Schema::Float, Value::Int(i)) => AvroValue::Float(*i as f32),
            (Schema::Float, Value::Float(f)) => AvroValue::Float(*f as f32),
            (Schema::Double, Value::Int(i)) => AvroValue::Double(*i as f64),
            (Schema::Double, Value::Float(f)) => AvroValue::Double(*f),
            (Schema::Bytes, Value::Bytes(b)) => AvroValue::Bytes(b.clone()),
            (Schema::Bytes, Value::String(s)) => AvroValue::Bytes(code_points(s, path)?),
            (Schema::String, Value::String(s)) => AvroValue::String(s.clone()),
            (Schema::Date, Value::Int(i)) => AvroValue::Date(narrow(*i, path)?),
            (Schema::TimeMillis, Value::Int(i)) => AvroValue::TimeMillis(narrow(*i, path)?),
            (Schema::TimeMicros, Value::Int(i)) => AvroValue::TimeMicros(*i),
            (Schema::TimestampMillis, Value::Int(i)) => AvroValue::TimestampMillis(*i),
            (Schema::TimestampMicros, Value::Int(i)) => AvroValue::TimestampMicros(*i),
            (Schema::Enum(EnumSchema { symbols, .. }), Value::String(s)) => {
                let index = symbols
                    .iter()
                    .position(|symbol| symbol == s)
                    .ok_or_else(|| AlertError::encoding(path, format!("'{s}' is not a symbol of the enum")))?;
                AvroValue::Enum(index as u32, s.clone())
            }
            (Schema::Fixed(FixedSchema { size, .. }), Value::Bytes(b)) if b.len() == *size => {
                AvroValue::Fixed(*size, b.clone())
            }
            (Schema::Array(items), Value::Array(values)) => AvroValue::Array(
                values
                    .iter()
                    .enumerate()
                    .map(|(i, v)| self.value(v, items, &format!("{path}[{i}]")))
                    .collect::<Result<_>>()?,
            ),
            (Schema::Map(values), Value::Map(map)) => AvroValue::Map(
                map.iter()
                    .map(|(k, v)| Ok((k.clone(), self.value(v, values, &join(path, k))?)))
                    .collect::<Result<_>>()?,
            ),
            (Schema::Map(values), Value::Record(record)) => AvroValue::Map(
                record
                    .iter()
                    .map(|(k, v)| Ok((k.clone(), self.value(v, values, &join(path, k))?)))
                    .collect::<Result<_>>()?,
            ),
            (Schema::Record(_), Value::Record(record)) => self.record(record, schema, path)?,
            (Schema::Record(_), Value::Map(map)) => {
                let record: Record = map.iter().map(|(k, v)| (k.clone(), v.clone())).collect();
                self.record(&record, schema, path)?
            }
            (Schema::Union(union), value) => self.union(union, value, path)?,
            _ => return Err(mismatch()),
        })
    }

    fn union(&self, union: &'s UnionSchema, value: &Value, path: &str) -> Result<AvroValue> {
        let variants = union.variants();

        // exact kind first so e.g. an integer lands on "long" rather than "double"
        let exact = variants
            .iter()
            .enumerate()
            .filter(|(_, v)| self.resolve(v, path).map(|s| exact_kind(s, value)).unwrap_or(false));
        for (index, variant) in exact {
            if let Ok(inner) = self.value(value, variant, path) {
                return Ok(AvroValue::Union(index as u32, Box::new(inner)));
            }
        }

        for (index, variant) in variants.iter().enumerate() {
            if let Ok(inner) = self.value(value, variant, path) {
                return Ok(AvroValue::Union(index as u32, Box::new(inner)));
            }
        }

        Err(AlertError::encoding(
            path,
            format!("{} matches no branch of the union", value.kind()),
        ))
    }
}

fn exact_kind(schema: &Schema, value: &Value) -> bool {
    matches!(
        (schema, value),
        (Schema::Null, Value::Null)
            | (Schema::Boolean, Value::Boolean(_))
            | (Schema::Int | Schema::Long, Value::Int(_))
            | (Schema::Float | Schema::Double, Value::Float(_))
            | (Schema::String | Schema::Enum(_), Value::String(_))
            | (Schema::Bytes | Schema::Fixed(_), Value::Bytes(_))
            | (Schema::Record(_), Value::Record(_))
            | (Schema::Array(_), Value::Array(_))
            | (Schema::Map(_), Value::Map(_))
    )
}

fn schema_kind(schema: &Schema) -> &'static str {
    match schema {
        Schema::Null => "null",
        Schema::Boolean => "boolean",
        Schema::Int => "int",
        Schema::Long => "long",
        Schema::Float => "float",
        Schema::Double => "double",
        Schema::Bytes => "bytes",
        Schema::String => "string",
        Schema::Record(_) => "record",
        Schema::Enum(_) => "enum",
        Schema::Fixed(_) => "fixed",
        Schema::Array(_) => "array",
        Schema::Map(_) => "map",
        Schema::Union(_) => "union",
        _ => "logical type",
    }
}

fn narrow(i: i64, path: &str) -> Result<i32> {
    i32::try_from(i).map_err(|_| AlertError::encoding(path, format!("{i} does not fit in an int")))
}

// Avro JSON convention: each char is one byte
fn code_points(s: &str, path: &str) -> Result<Vec<u8>> {
    s.chars()
        .map(|c| u8::try_from(u32::from(c)).map_err(|_| AlertError::encoding(path, format!("character {c:?} is not a byte"))))
        .collect()
}

fn into_record(value: AvroValue) -> Result<Record> {
    match from_avro(value)? {
        Value::Record(record) => Ok(record),
        other => Err(AlertError::decoding(format!("expected a record, decoded {}", other.kind()))),
    }
}

fn from_avro(value: AvroValue) -> Result<Value> {
    Ok(match value {
        AvroValue::Null => Value::Null,
        AvroValue::Boolean(b) => Value::Boolean(b),
        AvroValue::Int(i) | AvroValue::Date(i) | AvroValue::TimeMillis(i) => Value::Int(i as i64),
        AvroValue::Long(i)
        | AvroValue::TimeMicros(i)
        | AvroValue::TimestampMillis(i)
        | AvroValue::TimestampMicros(i) => Value::Int(i),
        AvroValue::Float(f) => Value::Float(f as f64),
        AvroValue::Double(f) => Value::Float(f),
        AvroValue::Bytes(b) | AvroValue::Fixed(_, b) => Value::Bytes(b),
        AvroValue::String(s) | AvroValue::Enum(_, s) => Value::String(s),
        AvroValue::Union(_, inner) => from_avro(*inner)?,
        AvroValue::Array(items) => Value::Array(items.into_iter().map(from_avro).collect::<Result<_>>()?),
        AvroValue::Map(map) => Value::Map(
            map.into_iter()
                .map(|(k, v)| Ok((k, from_avro(v)?)))
                .collect::<Result<_>>()?,
        ),
        AvroValue::Record(fields) => Value::Record(
            fields
                .into_iter()
                .map(|(k, v)| Ok((k, from_avro(v)?)))
                .collect::<Result<Record>>()?,
        ),
        other => return Err(AlertError::decoding(format!("unsupported decoded value {other:?}"))),
    })
}
