//! Benchmarks for replication-walker
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use replication_walker::classify::names;
use replication_walker::reference::{ReadsetRecord, ReferenceTable};
use replication_walker::Classifier;
use std::sync::Arc;

/// Reference table with `samples` samples of 20 readsets each
fn reference(samples: usize) -> ReferenceTable {
    let rows = (0..samples).flat_map(|s| {
        (0..20).map(move |r| {
            (
                "bench",
                ReadsetRecord {
                    readset: format!("TARA_{}_HWT5BCX2.{:04}BA{:03}", r % 3, s, r),
                    primers: "ITS2".into(),
                    sample_id: format!("CO{:04}", s),
                    pcr_sample_name: format!("P{}_{}", s, r % 2),
                    pcr_full_length_name: None,
                    dna_sample_name: format!("D{}", s),
                },
            )
        })
    });
    ReferenceTable::from_records(rows).unwrap()
}

fn group(sample: usize, libraries: &[usize]) -> Vec<String> {
    libraries
        .iter()
        .flat_map(|lib| {
            let base = format!("TARA_CO{:04}_ITS2_HWT5BCX2-{:04}BA{:03}", sample, sample, lib);
            [format!("{}-1_R1.fastq.gz", base), format!("{}-1_R2.fastq.gz", base)]
        })
        .collect()
}

fn benchmark_name_parsing(c: &mut Criterion) {
    let name = "TARA_CO1234_ITS2_HWT5BCX2-12BA001-BID07-1_R1.fastq.gz";

    c.bench_function("name_fragments", |b| {
        b.iter(|| {
            let base = names::base_name(black_box(name)).unwrap();
            black_box(names::base_fragments(base));
            black_box(names::sample_group(name));
            black_box(names::reverse_name(name));
        })
    });
}

fn benchmark_classify(c: &mut Criterion) {
    let classifier = Classifier::new(Arc::new(reference(2000)));
    let normal = group(1500, &[3]);
    let replicated = group(1500, &[3, 4, 5]);

    c.bench_function("classify_single_pair", |b| {
        b.iter(|| black_box(classifier.classify(black_box(&normal), "https://h/a/")))
    });

    c.bench_function("classify_replicate_group", |b| {
        b.iter(|| black_box(classifier.classify(black_box(&replicated), "https://h/a/")))
    });
}

criterion_group!(benches, benchmark_name_parsing, benchmark_classify);
criterion_main!(benches);
