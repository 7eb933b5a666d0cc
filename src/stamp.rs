//! Postage stamp cutouts embedded in alerts
//!
//! A stamp is an opaque image file carried inside an alert as a nested
//! `{fileName, stampData}` record under one of three well-known fields.

use std::fmt;
use std::fs;
use std::io::{self, Read};
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::error::{AlertError, Result};
use crate::value::{Record, Value};

pub const CUTOUT_SCIENCE: &str = "cutoutScience";
pub const CUTOUT_TEMPLATE: &str = "cutoutTemplate";
pub const CUTOUT_DIFFERENCE: &str = "cutoutDifference";

/// Every field name that may hold a stamp
pub const STAMP_FIELDS: [&str; 3] = [CUTOUT_SCIENCE, CUTOUT_TEMPLATE, CUTOUT_DIFFERENCE];

const FILE_NAME: &str = "fileName";
const STAMP_DATA: &str = "stampData";

/// Alert field a stamp is stored under
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StampField {
    Science,
    Template,
    Difference,
}

impl StampField {
    pub const ALL: [StampField; 3] = [StampField::Science, StampField::Template, StampField::Difference];

    pub fn as_str(&self) -> &'static str {
        match self {
            StampField::Science => CUTOUT_SCIENCE,
            StampField::Template => CUTOUT_TEMPLATE,
            StampField::Difference => CUTOUT_DIFFERENCE,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            StampField::Science => "Science",
            StampField::Template => "Template",
            StampField::Difference => "Difference",
        }
    }
}

impl fmt::Display for StampField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A named binary blob
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Stamp {
    pub file_name: String,
    pub stamp_data: Vec<u8>,
}

impl Stamp {
    pub fn new(file_name: impl Into<String>, stamp_data: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            stamp_data,
        }
    }

    /// Read a whole file; the stamp is named after the file's base name
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, format!("{} has no file name", path.display())))?;
        let stamp_data = fs::read(path)?;
        debug!(path = %path.display(), bytes = stamp_data.len(), "loaded stamp");
        Ok(Self::new(file_name, stamp_data))
    }

    /// Read a stamp from any byte source
    pub fn from_reader(file_name: impl Into<String>, mut reader: impl Read) -> Result<Self> {
        let mut stamp_data = Vec::new();
        reader.read_to_end(&mut stamp_data)?;
        Ok(Self::new(file_name, stamp_data))
    }

    /// Interpret a decoded field value. `Null` means no stamp.
    pub fn from_value(value: &Value) -> Result<Option<Self>> {
        let record = match value {
            Value::Null => return Ok(None),
            Value::Record(record) => record,
            other => return Err(AlertError::decoding(format!("stamp field holds {}", other.kind()))),
        };
        match (record.get(FILE_NAME), record.get(STAMP_DATA)) {
            (Some(Value::String(name)), Some(Value::Bytes(data))) => Ok(Some(Self::new(name.clone(), data.clone()))),
            _ => Err(AlertError::decoding(format!(
                "stamp record needs a string '{FILE_NAME}' and bytes '{STAMP_DATA}'"
            ))),
        }
    }

    pub fn to_record(&self) -> Record {
        Record::new()
            .with(FILE_NAME, self.file_name.as_str())
            .with(STAMP_DATA, self.stamp_data.clone())
    }

    /// Write `stampData` to `dir/fileName`, creating `dir` if needed and
    /// replacing any existing file.
    pub fn write_to(&self, dir: impl AsRef<Path>) -> Result<PathBuf> {
        let dir = dir.as_ref();
        let name = Path::new(&self.file_name);
        if self.file_name.is_empty() || name.file_name() != Some(name.as_os_str()) {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("stamp file name '{}' is not a plain file name", self.file_name),
            )
            .into());
        }

        fs::create_dir_all(dir)?;
        let out_path = dir.join(name);
        fs::write(&out_path, &self.stamp_data)?;
        debug!(path = %out_path.display(), bytes = self.stamp_data.len(), "wrote stamp");
        Ok(out_path)
    }
}

impl From<Stamp> for Value {
    fn from(stamp: Stamp) -> Self {
        Value::Record(stamp.to_record())
    }
}

impl From<&Stamp> for Value {
    fn from(stamp: &Stamp) -> Self {
        Value::Record(stamp.to_record())
    }
}

/// Load the file at `path` and store it in `record` under `field`
pub fn embed(record: &mut Record, field: StampField, path: impl AsRef<Path>) -> Result<()> {
    let stamp = Stamp::load(path)?;
    record.insert(field.as_str(), stamp);
    Ok(())
}

/// The stamp held by `field`, if any
pub fn stamp(record: &Record, field: StampField) -> Result<Option<Stamp>> {
    match record.get(field.as_str()) {
        Some(value) => Stamp::from_value(value),
        None => Ok(None),
    }
}

/// Write the stamp held by `field` into `dir`, returning the file written
pub fn extract(record: &Record, field: StampField, dir: impl AsRef<Path>) -> Result<Option<PathBuf>> {
    stamp(record, field)?
        .map(|s| s.write_to(dir.as_ref()))
        .transpose()
}

/// Write every stamp present in `record` into `dir`
pub fn extract_all(record: &Record, dir: impl AsRef<Path>) -> Result<Vec<(StampField, PathBuf)>> {
    let mut written = Vec::new();
    for field in StampField::ALL {
        if let Some(path) = extract(record, field, dir.as_ref())? {
            written.push((field, path));
        }
    }
    Ok(written)
}

/// Copy of `record` without its stamp fields, for display
pub fn strip_stamps(record: &Record) -> Record {
    record.without(&STAMP_FIELDS)
}
