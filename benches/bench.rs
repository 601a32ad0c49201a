//! Criterion benchmarks for the block-tree term dictionary.
//!
//! Covers writing a field, exact seeks by term and by ordinal, forward
//! iteration and automaton intersection.

use std::collections::BTreeSet;
use std::hint::black_box;
use std::sync::Arc;

use blocktree_ords::lexical::core::automaton::{CompiledAutomaton, LevenshteinAutomaton, wildcard};
use blocktree_ords::lexical::core::terms::{Terms, TermsEnum};
use blocktree_ords::lexical::index::blocktree::{
    BlockTreeConfig, BlockTreeTermsReader, BlockTreeTermsWriter, ReaderOptions,
};
use blocktree_ords::lexical::index::field::{FieldInfo, FieldInfos, IndexOptions};
use blocktree_ords::lexical::index::postings::{PlainPostingsReader, PlainPostingsWriter, Posting};
use blocktree_ords::lexical::index::segment::{SegmentInfo, SegmentReadState, SegmentWriteState};
use blocktree_ords::storage::MemoryStorage;
use criterion::{Criterion, Throughput, criterion_group, criterion_main};

const MAX_DOC: u32 = 10_000;

/// Generate sorted, distinct terms.
fn generate_terms(count: usize) -> Vec<Vec<u8>> {
    let syllables = [
        "ka", "ri", "to", "mo", "su", "ne", "la", "pi", "do", "ve", "xu", "qa", "ze", "bo", "ha", "yi",
    ];
    let mut terms = BTreeSet::new();
    let mut state = 0x2545_f491_4f6c_dd1du64;
    let mut next = || {
        state = state
            .wrapping_mul(6_364_136_223_846_793_005)
            .wrapping_add(1_442_695_040_888_963_407);
        (state >> 33) as usize
    };
    while terms.len() < count {
        let len = 1 + next() % 5;
        let term: String = (0..len).map(|_| syllables[next() % syllables.len()]).collect();
        terms.insert(term.into_bytes());
    }
    terms.into_iter().collect()
}

fn field_infos() -> Arc<FieldInfos> {
    Arc::new(FieldInfos::new(vec![FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs)]).unwrap())
}

fn write(storage: &MemoryStorage, terms: &[Vec<u8>], config: BlockTreeConfig) -> SegmentInfo {
    let info = SegmentInfo::new("_0", MAX_DOC);
    let field_infos = field_infos();
    let state = SegmentWriteState::new(&info, field_infos.clone());
    let postings = PlainPostingsWriter::new(storage, &state).unwrap();
    let mut writer = BlockTreeTermsWriter::new(storage, &state, Box::new(postings), config).unwrap();
    let field = field_infos.field_info(0).unwrap().clone();
    writer
        .write_field(
            &field,
            terms.iter().enumerate().map(|(i, term)| {
                let doc = (i as u32 * 13) % MAX_DOC;
                (term, vec![Posting::with_frequency(doc, 1 + (i as u32 % 3))])
            }),
        )
        .unwrap();
    writer.close().unwrap();
    info
}

fn open(storage: &MemoryStorage, info: &SegmentInfo) -> BlockTreeTermsReader {
    let state = SegmentReadState::new(info, field_infos());
    let postings = PlainPostingsReader::open(storage, &state).unwrap();
    BlockTreeTermsReader::open(storage, &state, Box::new(postings), ReaderOptions::default()).unwrap()
}

/// Benchmark writing a whole field.
fn bench_write(c: &mut Criterion) {
    let mut group = c.benchmark_group("write");
    group.sample_size(20);
    let terms = generate_terms(50_000);

    group.throughput(Throughput::Elements(terms.len() as u64));
    group.bench_function("write_field_50k", |b| {
        b.iter(|| {
            let storage = MemoryStorage::new();
            black_box(write(&storage, &terms, BlockTreeConfig::default()))
        })
    });

    group.finish();
}

/// Benchmark point lookups.
fn bench_seek(c: &mut Criterion) {
    let mut group = c.benchmark_group("seek");
    let terms = generate_terms(50_000);
    let storage = MemoryStorage::new();
    let info = write(&storage, &terms, BlockTreeConfig::default());
    let reader = open(&storage, &info);
    let field = reader.terms("body").unwrap();
    let probes: Vec<&Vec<u8>> = terms.iter().step_by(97).collect();

    group.throughput(Throughput::Elements(probes.len() as u64));
    group.bench_function("seek_exact", |b| {
        let mut terms_enum = field.iterator().unwrap();
        b.iter(|| {
            for probe in &probes {
                black_box(terms_enum.seek_exact(black_box(probe)).unwrap());
            }
        })
    });

    group.bench_function("seek_exact_ord", |b| {
        let mut terms_enum = field.iterator().unwrap();
        b.iter(|| {
            for ord in (0..terms.len() as u64).step_by(97) {
                terms_enum.seek_exact_ord(black_box(ord)).unwrap();
                black_box(terms_enum.term().unwrap());
            }
        })
    });

    group.bench_function("seek_ceil_and_ord", |b| {
        let mut terms_enum = field.iterator().unwrap();
        b.iter(|| {
            for probe in &probes {
                black_box(terms_enum.seek_ceil(black_box(probe)).unwrap());
                black_box(terms_enum.ord().unwrap());
            }
        })
    });

    group.finish();
}

/// Benchmark sequential iteration and automaton intersection.
fn bench_enumerate(c: &mut Criterion) {
    let mut group = c.benchmark_group("enumerate");
    let terms = generate_terms(50_000);
    let storage = MemoryStorage::new();
    let info = write(&storage, &terms, BlockTreeConfig::default());
    let reader = open(&storage, &info);
    let field = reader.terms("body").unwrap();

    group.throughput(Throughput::Elements(terms.len() as u64));
    group.bench_function("iterate_all", |b| {
        b.iter(|| {
            let mut terms_enum = field.iterator().unwrap();
            let mut count = 0;
            while terms_enum.next().unwrap().is_some() {
                count += 1;
            }
            black_box(count)
        })
    });

    let pattern = CompiledAutomaton::new(wildcard("ka*to").unwrap()).unwrap();
    group.bench_function("intersect_wildcard", |b| {
        b.iter(|| {
            let mut terms_enum = field.intersect(&pattern, None).unwrap();
            let mut count = 0;
            while terms_enum.next().unwrap().is_some() {
                count += 1;
            }
            black_box(count)
        })
    });

    let fuzzy = CompiledAutomaton::new(
        LevenshteinAutomaton::new(terms[terms.len() / 2].clone(), 2)
            .unwrap()
            .to_automaton()
            .unwrap(),
    )
    .unwrap();
    group.bench_function("intersect_levenshtein_2", |b| {
        b.iter(|| {
            let mut terms_enum = fuzzy.terms_enum(field).unwrap();
            let mut count = 0;
            while terms_enum.next().unwrap().is_some() {
                count += 1;
            }
            black_box(count)
        })
    });

    group.finish();
}

criterion_group!(benches, bench_write, bench_seek, bench_enumerate);

criterion_main!(benches);
