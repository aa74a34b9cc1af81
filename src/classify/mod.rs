//! Replicate classification
//!
//! Decides, for the read files of one directory, whether they hold more
//! runs than one forward/reverse pair per sample and, if so, why:
//!
//! ```text
//! files <= 2 ──────────────────────────────► no anomaly
//! files <= 2 × samples ────────────────────► no anomaly
//! one base name ───────────────────────────► sequencing_replicate (green)
//! several base names, resolve each:
//!   #pcr != #dna  or  #pcr > #samples ─────► method_replication   (red)
//!   otherwise ─────────────────────────────► unknown_replication  (yellow)
//! ```
//!
//! Name parsing lives in `names`; readset resolution goes through the
//! shared `ReferenceTable`.

pub mod names;

use crate::error::{ClassifyError, ClassifyResult};
use crate::reference::{Lookup, ReadsetRecord, ReferenceTable};
use names::RunFragments;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

/// Run indices tried, lowest first, when resolving a base name
const RUN_INDEX_DIGITS: std::ops::RangeInclusive<u8> = 0..=9;

/// Why a directory holds extra read files
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationCategory {
    /// Same library sequenced twice
    SequencingReplicate,
    /// Distinct readsets with identical PCR and DNA provenance
    UnknownReplication,
    /// Distinct PCR or DNA extraction events
    MethodReplication,
}

impl ReplicationCategory {
    /// Category label as written to the report
    pub fn as_str(&self) -> &'static str {
        match self {
            ReplicationCategory::SequencingReplicate => "sequencing_replicate",
            ReplicationCategory::UnknownReplication => "unknown_replication",
            ReplicationCategory::MethodReplication => "method_replication",
        }
    }

    /// Fixed color tag of the category
    pub fn color(&self) -> ColorCode {
        match self {
            ReplicationCategory::SequencingReplicate => ColorCode::Green,
            ReplicationCategory::UnknownReplication => ColorCode::Yellow,
            ReplicationCategory::MethodReplication => ColorCode::Red,
        }
    }
}

impl fmt::Display for ReplicationCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Color tag paired with each category
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColorCode {
    Green,
    Yellow,
    Red,
}

/// One output row; field order is the report column order
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassifiedAnomaly {
    pub sample_id: String,
    pub readset: String,
    pub fwd_fastq_name: String,
    pub rev_fastq_name: String,
    pub pcr_sample_name: String,
    pub dna_sample_name: String,
    pub pcr_fl_sample_name: Option<String>,
    pub difference_category: ReplicationCategory,
    pub color_code: ColorCode,
    pub directory: String,
}

impl ClassifiedAnomaly {
    fn new(
        sample_id: &str,
        forward: &str,
        record: &ReadsetRecord,
        category: ReplicationCategory,
        directory: &str,
    ) -> Self {
        Self {
            sample_id: sample_id.to_string(),
            readset: record.readset.clone(),
            fwd_fastq_name: forward.to_string(),
            rev_fastq_name: names::reverse_name(forward),
            pcr_sample_name: record.pcr_sample_name.clone(),
            dna_sample_name: record.dna_sample_name.clone(),
            pcr_fl_sample_name: record.pcr_full_length_name.clone(),
            difference_category: category,
            color_code: category.color(),
            directory: directory.to_string(),
        }
    }
}

/// Classifies directories against a shared reference table
#[derive(Debug, Clone)]
pub struct Classifier {
    reference: Arc<ReferenceTable>,
}

impl Classifier {
    pub fn new(reference: Arc<ReferenceTable>) -> Self {
        Self { reference }
    }

    /// Classify the read files found in `directory`
    ///
    /// Returns an empty list when the file count is what one
    /// forward/reverse pair per sample would give.
    pub fn classify(
        &self,
        reads: &[String],
        directory: &str,
    ) -> ClassifyResult<Vec<ClassifiedAnomaly>> {
        if reads.len() <= 2 {
            return Ok(Vec::new());
        }

        let sample_groups: BTreeSet<String> =
            reads.iter().map(|r| names::sample_group(r)).collect();
        if reads.len() <= 2 * sample_groups.len() {
            return Ok(Vec::new());
        }

        let bases = distinct_base_names(reads)?;
        debug!(
            directory = %directory,
            files = reads.len(),
            samples = sample_groups.len(),
            bases = bases.len(),
            "Replicate group found"
        );

        if bases.len() == 1 {
            self.sequencing_replicates(reads, directory)
        } else {
            self.unknown_or_method(reads, &bases, sample_groups.len(), directory)
        }
    }

    /// One base name: the same library was sequenced under two run indices
    fn sequencing_replicates(
        &self,
        reads: &[String],
        directory: &str,
    ) -> ClassifyResult<Vec<ClassifiedAnomaly>> {
        if reads.len() != 4 {
            return Err(ClassifyError::InvariantViolation(format!(
                "sequencing replicate group in '{}' has {} files, expected 4",
                directory,
                reads.len()
            )));
        }

        let mut anomalies = Vec::with_capacity(2);
        for run_index in [1u8, 2] {
            let forward = names::forward_read_for_run(reads, run_index).ok_or_else(|| {
                ClassifyError::InvariantViolation(format!(
                    "no forward read for run index {} in '{}'",
                    run_index, directory
                ))
            })?;
            let fragments = names::read_fragments(forward)
                .ok_or_else(|| malformed(forward, "missing flowcell/library segments"))?;
            let sample_id = names::sample_id(forward)
                .ok_or_else(|| malformed(forward, "missing sample id token"))?;

            let key = fragments.key(run_index);
            let record = match self.reference.find_in_sample(sample_id, &key) {
                Lookup::Unique(record) => record,
                Lookup::NotFound => {
                    return Err(ClassifyError::LookupNotFound {
                        key,
                        sample_id: sample_id.to_string(),
                    })
                }
                Lookup::Ambiguous(matches) => {
                    return Err(ClassifyError::LookupAmbiguous {
                        key,
                        sample_id: sample_id.to_string(),
                        matches: matches.len(),
                    })
                }
            };

            anomalies.push(ClassifiedAnomaly::new(
                sample_id,
                forward,
                record,
                ReplicationCategory::SequencingReplicate,
                directory,
            ));
        }

        Ok(anomalies)
    }

    /// Several base names: distinct readsets, possibly distinct provenance
    fn unknown_or_method(
        &self,
        reads: &[String],
        bases: &[&str],
        sample_count: usize,
        directory: &str,
    ) -> ClassifyResult<Vec<ClassifiedAnomaly>> {
        let mut pcr_names = BTreeSet::new();
        let mut dna_names = BTreeSet::new();
        let mut resolved = Vec::with_capacity(bases.len());

        for &base in bases {
            let sample_id =
                names::sample_id(base).ok_or_else(|| malformed(base, "missing sample id token"))?;
            let fragments = names::base_fragments(base)
                .ok_or_else(|| malformed(base, "missing flowcell/library segments"))?;
            let record = self.resolve_base(sample_id, &fragments, names::batch_token(base))?;
            let forward = names::forward_read_for_base(reads, base)
                .ok_or_else(|| malformed(base, "no forward read for base name"))?;

            pcr_names.insert(record.pcr_sample_name.as_str());
            dna_names.insert(record.dna_sample_name.as_str());
            resolved.push((sample_id, forward, record));
        }

        let category = if pcr_names.len() != dna_names.len() || pcr_names.len() > sample_count {
            ReplicationCategory::MethodReplication
        } else {
            ReplicationCategory::UnknownReplication
        };

        Ok(resolved
            .into_iter()
            .map(|(sample_id, forward, record)| {
                ClassifiedAnomaly::new(sample_id, forward, record, category, directory)
            })
            .collect())
    }

    /// Try run indices 0..=9; the first that yields one readset wins
    ///
    /// An ambiguous digit is narrowed by the batch token before moving on.
    fn resolve_base(
        &self,
        sample_id: &str,
        fragments: &RunFragments,
        batch: Option<&str>,
    ) -> ClassifyResult<&ReadsetRecord> {
        let mut ambiguous: Option<(String, usize)> = None;

        for digit in RUN_INDEX_DIGITS {
            let key = fragments.key(digit);
            let mut lookup = self.reference.find_in_sample(sample_id, &key);
            let count = lookup.len();
            if count > 1 {
                if let Some(token) = batch {
                    lookup = lookup.narrow(token);
                }
                if !matches!(lookup, Lookup::Unique(_)) {
                    ambiguous.get_or_insert((key.clone(), count));
                }
            }

            if let Lookup::Unique(record) = lookup {
                return Ok(record);
            }
        }

        Err(match ambiguous {
            Some((key, matches)) => ClassifyError::LookupAmbiguous {
                key,
                sample_id: sample_id.to_string(),
                matches,
            },
            None => ClassifyError::LookupNotFound {
                key: format!("[0-9]_{}.{}", fragments.flowcell, fragments.library),
                sample_id: sample_id.to_string(),
            },
        })
    }
}

/// Distinct base names in first-seen order
fn distinct_base_names(reads: &[String]) -> ClassifyResult<Vec<&str>> {
    let mut bases: Vec<&str> = Vec::new();
    for read in reads {
        let base = names::base_name(read).ok_or_else(|| malformed(read, "no hyphen segment"))?;
        if !bases.contains(&base) {
            bases.push(base);
        }
    }
    Ok(bases)
}

fn malformed(name: &str, reason: &str) -> ClassifyError {
    ClassifyError::MalformedName {
        name: name.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const DIR: &str = "https://host/ITS2/CO-0001234/";

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

    fn classifier(rows: Vec<ReadsetRecord>) -> Classifier {
        let table = ReferenceTable::from_records(rows.into_iter().map(|r| ("test", r))).unwrap();
        Classifier::new(Arc::new(table))
    }

    fn reads(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn pairs(bases: &[&str]) -> Vec<String> {
        bases
            .iter()
            .flat_map(|b| [format!("{}-1_R1.fastq.gz", b), format!("{}-1_R2.fastq.gz", b)])
            .collect()
    }

    #[test]
    fn test_single_pair_is_not_an_anomaly() {
        let c = classifier(vec![]);
        let files = reads(&["A_1-x-S1-1_R1.fastq.gz", "A_1-x-S1-1_R2.fastq.gz"]);
        assert!(c.classify(&files, DIR).unwrap().is_empty());
    }

    #[test]
    fn test_one_pair_per_sample_is_not_an_anomaly() {
        let c = classifier(vec![]);
        let files = reads(&[
            "TARA_SED1_ITS2_F-L1-1_R1.fastq.gz",
            "TARA_SED1_ITS2_F-L1-1_R2.fastq.gz",
            "TARA_SED2_ITS2_F-L2-1_R1.fastq.gz",
            "TARA_SED2_ITS2_F-L2-1_R2.fastq.gz",
        ]);
        assert!(c.classify(&files, DIR).unwrap().is_empty());
    }

    #[test]
    fn test_sequencing_replicate() {
        let c = classifier(vec![
            record("TARA_1_HWT5BCX2.12BA001", "CO1234", "P1", "D1"),
            record("TARA_2_HWT5BCX2.12BA001", "CO1234", "P1", "D1"),
        ]);
        let files = reads(&[
            "TARA_CO1234_ITS2_HWT5BCX2-12BA001-1_R1.fastq.gz",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA001-1_R2.fastq.gz",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA001-2_R1.fastq.gz",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA001-2_R2.fastq.gz",
        ]);

        let rows = c.classify(&files, DIR).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].readset, "TARA_1_HWT5BCX2.12BA001");
        assert_eq!(rows[1].readset, "TARA_2_HWT5BCX2.12BA001");
        for row in &rows {
            assert_eq!(row.difference_category, ReplicationCategory::SequencingReplicate);
            assert_eq!(row.color_code, ColorCode::Green);
            assert_eq!(row.sample_id, "CO1234");
            assert_eq!(row.directory, DIR);
            assert!(row.rev_fastq_name.ends_with("_R2.fastq.gz"));
        }
    }

    #[test]
    fn test_sequencing_replicate_needs_four_files() {
        let c = classifier(vec![]);
        let files = reads(&[
            "TARA_CO1234_ITS2_F-L-1_R1.fastq.gz",
            "TARA_CO1234_ITS2_F-L-1_R2.fastq.gz",
            "TARA_CO1234_ITS2_F-L-2_R1.fastq.gz",
            "TARA_CO1234_ITS2_F-L-2_R2.fastq.gz",
            "TARA_CO1234_ITS2_F-L-3_R1.fastq.gz",
        ]);
        assert!(matches!(
            c.classify(&files, DIR),
            Err(ClassifyError::InvariantViolation(_))
        ));
    }

    #[test]
    fn test_unknown_replication() {
        let c = classifier(vec![
            record("TARA_1_HWT5BCX2.12BA001", "CO1234", "P1", "D1"),
            record("TARA_1_HWT5BCX2.12BA002", "CO1234", "P1", "D1"),
            record("TARA_2_HWT5BCX2.12BA003", "CO1234", "P1", "D1"),
        ]);
        let files = pairs(&[
            "TARA_CO1234_ITS2_HWT5BCX2-12BA001",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA002",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA003",
        ]);

        let rows = c.classify(&files, DIR).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows
            .iter()
            .all(|r| r.difference_category == ReplicationCategory::UnknownReplication
                && r.color_code == ColorCode::Yellow));
        assert_eq!(rows[2].readset, "TARA_2_HWT5BCX2.12BA003");
        assert_eq!(rows[0].fwd_fastq_name, "TARA_CO1234_ITS2_HWT5BCX2-12BA001-1_R1.fastq.gz");
    }

    #[test]
    fn test_method_replication() {
        let c = classifier(vec![
            record("TARA_1_HWT5BCX2.12BA001", "CO1234", "P1", "D1"),
            record("TARA_1_HWT5BCX2.12BA002", "CO1234", "P2", "D1"),
            record("TARA_1_HWT5BCX2.12BA003", "CO1234", "P2", "D1"),
        ]);
        let files = pairs(&[
            "TARA_CO1234_ITS2_HWT5BCX2-12BA001",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA002",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA003",
        ]);

        let rows = c.classify(&files, DIR).unwrap();
        assert_eq!(rows.len(), 3);
        assert!(rows
            .iter()
            .all(|r| r.difference_category == ReplicationCategory::MethodReplication
                && r.color_code == ColorCode::Red));
    }

    #[test]
    fn test_lookup_not_found() {
        let c = classifier(vec![record("TARA_1_HWT5BCX2.12BA001", "CO1234", "P1", "D1")]);
        let files = pairs(&[
            "TARA_CO1234_ITS2_HWT5BCX2-12BA001",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA404",
        ]);
        match c.classify(&files, DIR) {
            Err(ClassifyError::LookupNotFound { key, sample_id }) => {
                assert_eq!(sample_id, "CO1234");
                assert!(key.ends_with("HWT5BCX2.12BA404"));
            }
            other => panic!("expected not found, got {:?}", other),
        }
    }

    #[test]
    fn test_lowest_digit_wins() {
        let c = classifier(vec![
            record("TARA_3_HWT5BCX2.12BA004", "CO1234", "P3", "D1"),
            record("TARA_1_HWT5BCX2.12BA004", "CO1234", "P1", "D1"),
            record("TARA_1_HWT5BCX2.12BA005", "CO1234", "P1", "D1"),
        ]);
        let files = pairs(&[
            "TARA_CO1234_ITS2_HWT5BCX2-12BA004",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA005",
        ]);
        let rows = c.classify(&files, DIR).unwrap();
        assert_eq!(rows[0].readset, "TARA_1_HWT5BCX2.12BA004");
        assert_eq!(rows[0].difference_category, ReplicationCategory::UnknownReplication);
    }

    #[test]
    fn test_batch_token_breaks_ties() {
        let c = classifier(vec![
            record("TARA_1_HWT5BCX2.12BA001_BID07", "CO1234", "P1", "D1"),
            record("TARA_1_HWT5BCX2.12BA001_BID08", "CO1234", "P8", "D8"),
            record("TARA_1_HWT5BCX2.12BA002_BID07", "CO1234", "P1", "D1"),
        ]);
        let files = pairs(&[
            "TARA_CO1234_ITS2_HWT5BCX2-12BA001-BID07",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA002-BID07",
        ]);
        let rows = c.classify(&files, DIR).unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].readset, "TARA_1_HWT5BCX2.12BA001_BID07");
    }

    #[test]
    fn test_ambiguous_without_tie_break() {
        let c = classifier(vec![
            record("X_1_HWT5BCX2.12BA001", "CO1234", "P1", "D1"),
            record("Y_1_HWT5BCX2.12BA001", "CO1234", "P1", "D1"),
            record("X_1_HWT5BCX2.12BA002", "CO1234", "P1", "D1"),
        ]);
        let files = pairs(&[
            "TARA_CO1234_ITS2_HWT5BCX2-12BA001",
            "TARA_CO1234_ITS2_HWT5BCX2-12BA002",
        ]);
        assert!(matches!(
            c.classify(&files, DIR),
            Err(ClassifyError::LookupAmbiguous { matches: 2, .. })
        ));
    }

    #[test]
    fn test_category_labels() {
        assert_eq!(ReplicationCategory::SequencingReplicate.as_str(), "sequencing_replicate");
        assert_eq!(ReplicationCategory::MethodReplication.color(), ColorCode::Red);
    }
}
