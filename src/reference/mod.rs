//! Readset reference table
//!
//! A read-only lookup from readset key to the stable identifiers of the
//! sample that produced it. Built once at startup from several CSV sources
//! (see `loader`) and shared read-only by every crawler instance.
//!
//! Read file names never contain the full readset key, only fragments of it,
//! so lookups are substring searches over the keys of one sample. The result
//! is a tagged `Lookup` so callers decide what "none" and "several" mean.

mod loader;

pub use loader::{load_sources, read_source};

use crate::error::ReferenceError;
use std::collections::HashMap;

/// One row of the reference table
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReadsetRecord {
    /// Readset key (index of the table)
    pub readset: String,

    /// Primer set the readset was amplified with
    pub primers: String,

    /// Sample identifier; several readsets share one sample
    pub sample_id: String,

    /// PCR-sample name
    pub pcr_sample_name: String,

    /// Full-length PCR name (only some sources carry it)
    pub pcr_full_length_name: Option<String>,

    /// DNA-sample name
    pub dna_sample_name: String,
}

/// Outcome of a fragment lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<'a> {
    /// No key contains the fragment
    NotFound,

    /// Exactly one key contains the fragment
    Unique(&'a ReadsetRecord),

    /// Several keys contain the fragment, in table order
    Ambiguous(Vec<&'a ReadsetRecord>),
}

impl<'a> Lookup<'a> {
    fn from_matches(mut matches: Vec<&'a ReadsetRecord>) -> Self {
        match matches.len() {
            0 => Lookup::NotFound,
            1 => Lookup::Unique(matches.remove(0)),
            _ => Lookup::Ambiguous(matches),
        }
    }

    /// Narrow an ambiguous result to the keys that also contain `extra`
    pub fn narrow(self, extra: &str) -> Self {
        match self {
            Lookup::Ambiguous(matches) => Lookup::from_matches(
                matches
                    .into_iter()
                    .filter(|r| r.readset.contains(extra))
                    .collect(),
            ),
            other => other,
        }
    }

    /// Number of matching rows
    pub fn len(&self) -> usize {
        match self {
            Lookup::NotFound => 0,
            Lookup::Unique(_) => 1,
            Lookup::Ambiguous(m) => m.len(),
        }
    }

    /// True when nothing matched
    pub fn is_empty(&self) -> bool {
        matches!(self, Lookup::NotFound)
    }
}

/// Merged, read-only readset table
#[derive(Debug, Default, Clone)]
pub struct ReferenceTable {
    records: Vec<ReadsetRecord>,
    by_key: HashMap<String, usize>,
    by_sample: HashMap<String, Vec<usize>>,
}

impl ReferenceTable {
    /// Build a table from `(origin, record)` pairs
    ///
    /// `origin` names the source a row came from and is only used to report
    /// duplicate keys, which are rejected.
    pub fn from_records<I, S>(rows: I) -> Result<Self, ReferenceError>
    where
        I: IntoIterator<Item = (S, ReadsetRecord)>,
        S: Into<String>,
    {
        let mut table = ReferenceTable::default();
        let mut origins: Vec<String> = Vec::new();

        for (origin, record) in rows {
            let origin = origin.into();
            if let Some(&existing) = table.by_key.get(&record.readset) {
                return Err(ReferenceError::DuplicateKey {
                    key: record.readset,
                    first: origins[existing].clone(),
                    second: origin,
                });
            }

            let idx = table.records.len();
            table.by_key.insert(record.readset.clone(), idx);
            table
                .by_sample
                .entry(record.sample_id.clone())
                .or_default()
                .push(idx);
            table.records.push(record);
            origins.push(origin);
        }

        Ok(table)
    }

    /// Number of readsets
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// True if the table holds no readsets
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Exact lookup by readset key
    pub fn get(&self, readset: &str) -> Option<&ReadsetRecord> {
        self.by_key.get(readset).map(|&i| &self.records[i])
    }

    /// Readsets whose key contains `fragment`, restricted to one sample
    pub fn find_in_sample(&self, sample_id: &str, fragment: &str) -> Lookup<'_> {
        let matches: Vec<&ReadsetRecord> = self
            .by_sample
            .get(sample_id)
            .map(|rows| {
                rows.iter()
                    .map(|&i| &self.records[i])
                    .filter(|r| r.readset.contains(fragment))
                    .collect()
            })
            .unwrap_or_default();
        Lookup::from_matches(matches)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(readset: &str, sample: &str, pcr: &str, dna: &str) -> ReadsetRecord {
        ReadsetRecord {
            readset: readset.into(),
            primers: "ITS2".into(),
            sample_id: sample.into(),
            pcr_sample_name: pcr.into(),
            pcr_full_length_name: None,
            dna_sample_name: dna.into(),
        }
    }

    fn table() -> ReferenceTable {
        ReferenceTable::from_records(vec![
            ("coral", record("AB_1_HWT5BCX2.12BA001", "CO1234", "P1", "D1")),
            ("coral", record("AB_2_HWT5BCX2.12BA001", "CO1234", "P1", "D1")),
            ("coral", record("AB_1_HWT5BCX2.12BA002", "CO9999", "P9", "D9")),
        ])
        .unwrap()
    }

    #[test]
    fn test_find_in_sample_unique() {
        let t = table();
        match t.find_in_sample("CO1234", "2_HWT5BCX2.12BA001") {
            Lookup::Unique(r) => assert_eq!(r.readset, "AB_2_HWT5BCX2.12BA001"),
            other => panic!("expected unique, got {:?}", other),
        }
    }

    #[test]
    fn test_find_restricted_to_sample() {
        let t = table();
        assert_eq!(t.find_in_sample("CO1234", "12BA002"), Lookup::NotFound);
        assert_eq!(t.find_in_sample("CO9999", "12BA002").len(), 1);
        assert_eq!(t.find_in_sample("unknown", "12BA001"), Lookup::NotFound);
    }

    #[test]
    fn test_ambiguous_and_narrow() {
        let t = table();
        let lookup = t.find_in_sample("CO1234", "HWT5BCX2.12BA001");
        assert_eq!(lookup.len(), 2);
        match lookup.narrow("AB_2") {
            Lookup::Unique(r) => assert_eq!(r.readset, "AB_2_HWT5BCX2.12BA001"),
            other => panic!("expected unique, got {:?}", other),
        }
    }

    #[test]
    fn test_duplicate_key_rejected() {
        let err = ReferenceTable::from_records(vec![
            ("coral", record("K1", "S", "P", "D")),
            ("plankton", record("K1", "S", "P", "D")),
        ])
        .unwrap_err();
        match err {
            ReferenceError::DuplicateKey { key, first, second } => {
                assert_eq!(key, "K1");
                assert_eq!(first, "coral");
                assert_eq!(second, "plankton");
            }
            other => panic!("unexpected error {:?}", other),
        }
    }
}
