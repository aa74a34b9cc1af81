//! CSV sources for the reference table
//!
//! Two layouts exist in the wild, told apart by column count:
//!
//! ```text
//! 5 columns: readset, primers, sample_id, pcr_sample_name, dna_sample_name
//! 6 columns: readset, primers, sample_id, pcr_sample_name, pcr_fl_sample_name, dna_sample_name
//! ```
//!
//! The header row is skipped; its wording differs between sources.

use super::{ReadsetRecord, ReferenceTable};
use crate::error::ReferenceError;
use csv::{ReaderBuilder, StringRecord};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Read all rows of one source file
pub fn read_source(path: &Path) -> Result<Vec<ReadsetRecord>, ReferenceError> {
    if !path.exists() {
        return Err(ReferenceError::MissingSource(path.to_path_buf()));
    }

    let csv_err = |source| ReferenceError::Csv {
        path: path.to_path_buf(),
        source,
    };

    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)
        .map_err(csv_err)?;

    let mut records = Vec::new();
    for row in rdr.records() {
        let row = row.map_err(csv_err)?;
        if row.iter().all(|f| f.trim().is_empty()) {
            continue;
        }
        records.push(normalize_row(path, &row)?);
    }

    debug!(path = %path.display(), rows = records.len(), "Read reference source");
    Ok(records)
}

fn normalize_row(path: &Path, row: &StringRecord) -> Result<ReadsetRecord, ReferenceError> {
    let field = |i: usize| row.get(i).unwrap_or_default().trim().to_string();

    match row.len() {
        5 => Ok(ReadsetRecord {
            readset: field(0),
            primers: field(1),
            sample_id: field(2),
            pcr_sample_name: field(3),
            pcr_full_length_name: None,
            dna_sample_name: field(4),
        }),
        6 => {
            let full_length = field(4);
            Ok(ReadsetRecord {
                readset: field(0),
                primers: field(1),
                sample_id: field(2),
                pcr_sample_name: field(3),
                pcr_full_length_name: (!full_length.is_empty()).then_some(full_length),
                dna_sample_name: field(5),
            })
        }
        found => Err(ReferenceError::UnexpectedLayout {
            path: path.to_path_buf(),
            line: row.position().map(|p| p.line()).unwrap_or_default(),
            found,
        }),
    }
}

/// Load and merge every source, in order, into one table
pub fn load_sources(paths: &[PathBuf]) -> Result<ReferenceTable, ReferenceError> {
    let mut rows = Vec::new();
    for path in paths {
        let origin = path.display().to_string();
        rows.extend(read_source(path)?.into_iter().map(|r| (origin.clone(), r)));
    }

    let table = ReferenceTable::from_records(rows)?;
    info!(sources = paths.len(), readsets = table.len(), "Reference table loaded");
    Ok(table)
}
