//! Decoded message inspection
//!
//! Extracts the stamps carried by a decoded alert and, where the original
//! cutout files are known, checks that the extracted bytes are identical.

use std::collections::HashMap;
use std::fmt::Write;
use std::path::{Path, PathBuf};

use tracing::warn;

use crate::checksum::{files_match, DigestAlgorithm};
use crate::config::{CodecConfig, OutputFormat};
use crate::error::Result;
use crate::stamp::{extract, strip_stamps, StampField};
use crate::value::Record;

/// Original cutout files, keyed by the field they were embedded under
pub type StampOriginals = HashMap<StampField, PathBuf>;

/// Collect the originals that were actually given
pub fn stamp_originals(
    science: Option<PathBuf>,
    template: Option<PathBuf>,
    difference: Option<PathBuf>,
) -> StampOriginals {
    [
        (StampField::Science, science),
        (StampField::Template, template),
        (StampField::Difference, difference),
    ]
    .into_iter()
    .filter_map(|(field, path)| path.map(|p| (field, p)))
    .collect()
}

/// Outcome of extracting one stamp
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StampCheck {
    pub field: StampField,
    pub path: PathBuf,
    /// `None` when no original was supplied for this field
    pub matches: Option<bool>,
}

/// Extract every stamp of `record` into `dir` and compare against originals
pub fn inspect(
    record: &Record,
    dir: impl AsRef<Path>,
    originals: &StampOriginals,
    algorithm: DigestAlgorithm,
) -> Result<Vec<StampCheck>> {
    let mut checks = Vec::new();
    for field in StampField::ALL {
        let Some(path) = extract(record, field, dir.as_ref())? else {
            continue;
        };
        let matches = match originals.get(&field) {
            Some(original) => Some(files_match(algorithm, original, &path)?),
            None => None,
        };
        if matches == Some(false) {
            warn!(field = %field, path = %path.display(), "extracted stamp differs from original");
        }
        checks.push(StampCheck { field, path, matches });
    }
    Ok(checks)
}

/// JSON text of `record` without its stamps
pub fn render(record: &Record, format: OutputFormat) -> Result<String> {
    let shown = strip_stamps(record);
    Ok(match format {
        OutputFormat::Pretty => serde_json::to_string_pretty(&shown)?,
        OutputFormat::Compact => serde_json::to_string(&shown)?,
    })
}

/// Human-readable summary of one decoded message: the record without its
/// stamps, one line per extracted stamp and the size of the JSON text.
pub fn report(record: &Record, config: &CodecConfig, originals: &StampOriginals) -> Result<String> {
    let text = render(record, config.display.format)?;
    let mut out = format!("{text}\n");

    for check in inspect(record, &config.stamps.output_dir, originals, config.stamps.digest)? {
        let _ = match check.matches {
            Some(ok) => writeln!(out, "{} stamp ok: {}", check.field.label(), ok),
            None => writeln!(out, "{} stamp written to {}", check.field.label(), check.path.display()),
        };
    }
    let _ = write!(out, "size in bytes of json text: {}", text.len());
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stamp::Stamp;
    use tempfile::TempDir;

    #[test]
    fn test_inspect_reports_per_field() {
        let dir = TempDir::new().unwrap();
        let sci = dir.path().join("sci.jpg");
        let temp = dir.path().join("temp.jpg");
        std::fs::write(&sci, b"science").unwrap();
        std::fs::write(&temp, b"something else").unwrap();

        let record = Record::new()
            .with(StampField::Science.as_str(), Stamp::new("sci.jpg", b"science".to_vec()))
            .with(StampField::Template.as_str(), Stamp::new("temp.jpg", b"template".to_vec()))
            .with(StampField::Difference.as_str(), Stamp::new("diff.jpg", b"diff".to_vec()));

        let originals: StampOriginals = [(StampField::Science, sci), (StampField::Template, temp)]
            .into_iter()
            .collect();
        let out = dir.path().join("output");
        let checks = inspect(&record, &out, &originals, DigestAlgorithm::Md5).unwrap();

        assert_eq!(checks.len(), 3);
        assert_eq!(checks[0].matches, Some(true));
        assert_eq!(checks[1].matches, Some(false));
        assert_eq!(checks[2].matches, None);
        assert_eq!(checks[2].path, out.join("diff.jpg"));
    }

    #[test]
    fn test_render_hides_stamps() {
        let record = Record::new()
            .with("alertId", 5i64)
            .with(StampField::Science.as_str(), Stamp::new("sci.jpg", vec![1, 2]));
        let text = render(&record, OutputFormat::Compact).unwrap();
        assert_eq!(text, r#"{"alertId":5}"#);
    }

    #[test]
    fn test_stamp_originals_skips_missing() {
        let originals = stamp_originals(Some(PathBuf::from("sci.jpg")), None, Some(PathBuf::from("diff.jpg")));
        assert_eq!(originals.len(), 2);
        assert_eq!(originals.get(&StampField::Science), Some(&PathBuf::from("sci.jpg")));
        assert!(!originals.contains_key(&StampField::Template));
    }

    #[test]
    fn test_report_lists_stamps_and_size() {
        let dir = TempDir::new().unwrap();
        let sci = dir.path().join("sci.jpg");
        std::fs::write(&sci, b"science").unwrap();

        let mut config = CodecConfig::default();
        config.stamps.output_dir = dir.path().join("output");
        config.display.format = OutputFormat::Compact;
        let record = Record::new()
            .with("alertId", 5i64)
            .with(StampField::Science.as_str(), Stamp::new("sci.jpg", b"science".to_vec()))
            .with(StampField::Difference.as_str(), Stamp::new("diff.jpg", b"diff".to_vec()));

        let text = report(&record, &config, &stamp_originals(Some(sci), None, None)).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], r#"{"alertId":5}"#);
        assert_eq!(lines[1], "Science stamp ok: true");
        assert!(lines[2].starts_with("Difference stamp written to "));
        assert_eq!(lines[3], "size in bytes of json text: 13");
    }
}
