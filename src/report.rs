//! CSV report output
//!
//! One row per `ClassifiedAnomaly`, header taken from its field names. The
//! file is written under a temporary name and renamed into place, so a
//! reader never sees a partial report.

use crate::classify::ClassifiedAnomaly;
use crate::error::Result;
use std::fs;
use std::path::Path;
use tracing::info;

/// Write `rows` to `path`, creating parent directories as needed
pub fn write_report(path: &Path, rows: &[ClassifiedAnomaly]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent)?;
    }

    let tmp = path.with_extension("csv.tmp");
    {
        let mut writer = csv::Writer::from_path(&tmp)?;
        if rows.is_empty() {
            writer.write_record(COLUMNS)?;
        }
        for row in rows {
            writer.serialize(row)?;
        }
        writer.flush()?;
    }
    fs::rename(&tmp, path)?;

    info!(path = %path.display(), rows = rows.len(), "Report written");
    Ok(())
}

/// Column order of the report; matches the field order of `ClassifiedAnomaly`
pub const COLUMNS: &[&str] = &[
    "sample_id",
    "readset",
    "fwd_fastq_name",
    "rev_fastq_name",
    "pcr_sample_name",
    "dna_sample_name",
    "pcr_fl_sample_name",
    "difference_category",
    "color_code",
    "directory",
];

#[cfg(test)]
mod tests {
    use super::*;
    use crate::classify::{ColorCode, ReplicationCategory};
    use tempfile::tempdir;

    fn row(readset: &str, fl: Option<&str>) -> ClassifiedAnomaly {
        ClassifiedAnomaly {
            sample_id: "CO1234".into(),
            readset: readset.into(),
            fwd_fastq_name: "x-1_R1.fastq.gz".into(),
            rev_fastq_name: "x-1_R2.fastq.gz".into(),
            pcr_sample_name: "P1".into(),
            dna_sample_name: "D1".into(),
            pcr_fl_sample_name: fl.map(String::from),
            difference_category: ReplicationCategory::MethodReplication,
            color_code: ColorCode::Red,
            directory: "https://h/r/a/".into(),
        }
    }

    #[test]
    fn test_report_rows_and_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("out").join("replication_df_its2.csv");
        write_report(&path, &[row("RS1", None), row("RS2", Some("FL2"))]).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert_eq!(lines[0], COLUMNS.join(","));
        assert!(lines[1].contains(",RS1,"));
        assert!(lines[1].contains("P1,D1,,method_replication,red,"));
        assert!(lines[2].contains("P1,D1,FL2,method_replication,red,"));
        assert!(!path.with_extension("csv.tmp").exists());
    }

    #[test]
    fn test_empty_report_has_header() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("replication_df_18s.csv");
        write_report(&path, &[]).unwrap();
        assert_eq!(fs::read_to_string(&path).unwrap().trim_end(), COLUMNS.join(","));
    }
}
