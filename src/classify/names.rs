//! Read file name parsing
//!
//! Read files follow a loose naming scheme, for example:
//!
//! ```text
//! TARA_CO1234_ITS2_HWT5BCX2-12BA001-1_R1.fastq.gz
//! └──┬──────┘      └──┬───┘ └──┬──┘ │ └┬┘
//!  sample group    flowcell  library│ direction
//!                                run index
//! ```
//!
//! Batched runs carry an extra `BID..` segment before the run index. Every
//! function here is pure and returns `None` when the name lacks the segment
//! it looks for.

/// Substring that marks a compressed sequence file
pub const READ_MARKER: &str = "fastq.gz";

/// Forward-direction marker
pub const FORWARD_MARKER: &str = "R1";

/// Reverse-direction marker
pub const REVERSE_MARKER: &str = "R2";

/// Marker of a batch-identifier segment
pub const BATCH_MARKER: &str = "BID";

/// The two name fragments a readset key is built from
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunFragments {
    /// Flowcell token (last underscore token before the library segment)
    pub flowcell: String,
    /// Library segment
    pub library: String,
}

impl RunFragments {
    /// Composite readset fragment for one run index, e.g. `1_HWT5BCX2.12BA001`
    pub fn key(&self, run_index: u8) -> String {
        format!("{}_{}.{}", run_index, self.flowcell, self.library)
    }
}

/// True if the entry name is a read file
pub fn is_read_file(name: &str) -> bool {
    name.contains(READ_MARKER)
}

/// First two underscore tokens, joined: identifies the biological sample
pub fn sample_group(name: &str) -> String {
    name.split('_').take(2).collect::<Vec<_>>().join("_")
}

/// Second underscore token: the sample id used in the reference table
pub fn sample_id(name: &str) -> Option<&str> {
    name.split('_').nth(1).filter(|s| !s.is_empty())
}

/// Name with the last hyphen segment (run index and direction) removed
pub fn base_name(name: &str) -> Option<&str> {
    name.rfind('-')
        .map(|idx| &name[..idx])
        .filter(|base| !base.is_empty())
}

/// Last hyphen segment of a base name; used to break ties between readsets
pub fn batch_token(base: &str) -> Option<&str> {
    base.rsplit('-').next().filter(|s| !s.is_empty() && *s != base)
}

/// Fragments of a full read file name (sequencing-replicate groups)
///
/// Library is the second-from-last hyphen segment, flowcell the last
/// underscore token of the third-from-last.
pub fn read_fragments(name: &str) -> Option<RunFragments> {
    fragments_at(name, 1)
}

/// Fragments of a base name (differing base names)
///
/// With a batch segment the library and flowcell sit one segment further
/// from the end.
pub fn base_fragments(base: &str) -> Option<RunFragments> {
    if base.contains(BATCH_MARKER) {
        fragments_at(base, 1)
    } else {
        fragments_at(base, 0)
    }
}

/// Library at hyphen segment `-(skip + 1)`, flowcell inside `-(skip + 2)`
fn fragments_at(name: &str, skip: usize) -> Option<RunFragments> {
    let segments: Vec<&str> = name.split('-').collect();
    if segments.len() < skip + 2 {
        return None;
    }
    let library = segments[segments.len() - 1 - skip];
    let flowcell = segments[segments.len() - 2 - skip].rsplit('_').next()?;
    if library.is_empty() || flowcell.is_empty() {
        return None;
    }
    Some(RunFragments {
        flowcell: flowcell.to_string(),
        library: library.to_string(),
    })
}

/// Forward read of one run index, e.g. the name containing `-2_R1`
pub fn forward_read_for_run(reads: &[String], run_index: u8) -> Option<&str> {
    let needle = format!("-{}_{}", run_index, FORWARD_MARKER);
    reads.iter().map(String::as_str).find(|r| r.contains(&needle))
}

/// First forward read belonging to a base name
pub fn forward_read_for_base<'a>(reads: &'a [String], base: &str) -> Option<&'a str> {
    reads
        .iter()
        .map(String::as_str)
        .find(|r| r.contains(base) && r.contains(FORWARD_MARKER))
}

/// Reverse counterpart of a forward read (last direction marker swapped)
pub fn reverse_name(forward: &str) -> String {
    match forward.rfind(FORWARD_MARKER) {
        Some(idx) => format!(
            "{}{}{}",
            &forward[..idx],
            REVERSE_MARKER,
            &forward[idx + FORWARD_MARKER.len()..]
        ),
        None => forward.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FWD: &str = "TARA_CO1234_ITS2_HWT5BCX2-12BA001-1_R1.fastq.gz";
    const BATCHED: &str = "TARA_CO1234_ITS2_HWT5BCX2-12BA001-BID07-1_R1.fastq.gz";

    #[test]
    fn test_read_marker() {
        assert!(is_read_file(FWD));
        assert!(!is_read_file("CO-0001234/"));
        assert!(!is_read_file("md5sum.txt"));
    }

    #[test]
    fn test_sample_tokens() {
        assert_eq!(sample_group(FWD), "TARA_CO1234");
        assert_eq!(sample_id(FWD), Some("CO1234"));
        assert_eq!(sample_group("A_1-x-S1-1_R1.fastq.gz"), "A_1-x-S1-1");
        assert_eq!(sample_id("nounderscore.fastq.gz"), None);
    }

    #[test]
    fn test_base_name() {
        assert_eq!(base_name(FWD), Some("TARA_CO1234_ITS2_HWT5BCX2-12BA001"));
        assert_eq!(base_name("no_hyphen_R1.fastq.gz"), None);
        assert_eq!(base_name("-1_R1.fastq.gz"), None);
    }

    #[test]
    fn test_read_fragments() {
        let frags = read_fragments(FWD).unwrap();
        assert_eq!(frags.flowcell, "HWT5BCX2");
        assert_eq!(frags.library, "12BA001");
        assert_eq!(frags.key(2), "2_HWT5BCX2.12BA001");
        assert_eq!(read_fragments("short-1_R1.fastq.gz"), None);
    }

    #[test]
    fn test_base_fragments_with_and_without_batch() {
        let plain = base_fragments(base_name(FWD).unwrap()).unwrap();
        assert_eq!(plain.key(0), "0_HWT5BCX2.12BA001");

        let base = base_name(BATCHED).unwrap();
        assert_eq!(base, "TARA_CO1234_ITS2_HWT5BCX2-12BA001-BID07");
        let batched = base_fragments(base).unwrap();
        assert_eq!(batched.flowcell, "HWT5BCX2");
        assert_eq!(batched.library, "12BA001");
        assert_eq!(batch_token(base), Some("BID07"));
    }

    #[test]
    fn test_forward_reads() {
        let reads: Vec<String> = [
            "S_A_F-L-1_R2.fastq.gz",
            "S_A_F-L-1_R1.fastq.gz",
            "S_A_F-L-2_R1.fastq.gz",
        ]
        .iter()
        .map(|s| s.to_string())
        .collect();
        assert_eq!(forward_read_for_run(&reads, 2), Some("S_A_F-L-2_R1.fastq.gz"));
        assert_eq!(forward_read_for_run(&reads, 3), None);
        assert_eq!(forward_read_for_base(&reads, "S_A_F-L"), Some("S_A_F-L-1_R1.fastq.gz"));
    }

    #[test]
    fn test_reverse_name() {
        assert_eq!(
            reverse_name(FWD),
            "TARA_CO1234_ITS2_HWT5BCX2-12BA001-1_R2.fastq.gz"
        );
        assert_eq!(reverse_name("plain.fastq.gz"), "plain.fastq.gz");
    }
}
