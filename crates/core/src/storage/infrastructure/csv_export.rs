use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::storage::domain::detection_store::DetectionRecord;

#[derive(Error, Debug)]
pub enum ExportError {
    #[error("failed to create {path}: {source}")]
    Create {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to write export: {0}")]
    Write(#[from] io::Error),
}

const HEADER: &str = "ID,timestamp,type,confidence";

/// Write records as CSV with a header row. Returns the number of data rows.
pub fn write_csv<W: Write>(records: &[DetectionRecord], out: &mut W) -> Result<usize, ExportError> {
    writeln!(out, "{HEADER}")?;
    for r in records {
        writeln!(
            out,
            "{},{},{},{:.3}",
            r.id,
            r.formatted_timestamp(),
            escape(&r.detection_type),
            r.confidence
        )?;
    }
    out.flush()?;
    Ok(records.len())
}

pub fn export_csv(records: &[DetectionRecord], path: &Path) -> Result<usize, ExportError> {
    let file = File::create(path).map_err(|source| ExportError::Create {
        path: path.to_path_buf(),
        source,
    })?;
    let written = write_csv(records, &mut BufWriter::new(file))?;
    log::info!("Exported {written} records to {}", path.display());
    Ok(written)
}

fn escape(field: &str) -> String {
    if field.contains([',', '"', '\n']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn record(id: i64, kind: &str, confidence: f64) -> DetectionRecord {
        DetectionRecord {
            id,
            timestamp: NaiveDate::from_ymd_opt(2024, 1, 2)
                .unwrap()
                .and_hms_opt(3, 4, 5)
                .unwrap(),
            detection_type: kind.to_string(),
            confidence,
        }
    }

    #[test]
    fn test_writes_header_and_rows() {
        let mut buf = Vec::new();
        let n = write_csv(&[record(1, "yawn", 0.8766), record(2, "closed_eyes", 0.5)], &mut buf)
            .unwrap();
        assert_eq!(n, 2);
        let text = String::from_utf8(buf).unwrap();
        assert_eq!(
            text,
            "ID,timestamp,type,confidence\n\
             1,2024-01-02 03:04:05,yawn,0.877\n\
             2,2024-01-02 03:04:05,closed_eyes,0.500\n"
        );
    }

    #[test]
    fn test_quotes_fields_with_separators() {
        assert_eq!(escape("plain"), "plain");
        assert_eq!(escape("a,b"), "\"a,b\"");
        assert_eq!(escape("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_export_to_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.csv");
        export_csv(&[record(7, "yawn", 0.9)], &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.contains("7,2024-01-02 03:04:05,yawn,0.900"));
    }

    #[test]
    fn test_export_to_missing_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("missing").join("records.csv");
        assert!(matches!(
            export_csv(&[], &path),
            Err(ExportError::Create { .. })
        ));
    }
}
