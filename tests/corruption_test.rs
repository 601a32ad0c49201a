mod common;

use blocktree_ords::error::BlockTreeError;
use blocktree_ords::lexical::core::automaton::{CompiledAutomaton, wildcard};
use blocktree_ords::lexical::core::terms::{Terms, TermsEnum};
use blocktree_ords::lexical::index::blocktree::{ReaderOptions, TERMS_INDEX_CODEC_NAME};
use blocktree_ords::storage::{DataInput, DataOutput, MemoryStorage, Storage};
use rand::SeedableRng;
use rand::rngs::StdRng;

use common::*;

fn segment() -> MemoryStorage {
    let mut rng = StdRng::seed_from_u64(11);
    let terms = random_terms(&mut rng, 1000, b"abcdef", 6);
    let storage = MemoryStorage::new();
    write_segment(&storage, small_config(), &[(BODY, terms.as_slice())]);
    storage
}

fn expect_corrupt(result: Result<impl std::fmt::Debug, BlockTreeError>) {
    match result {
        Err(e) => assert!(e.is_corruption(), "expected corruption, got {e:?}"),
        Ok(v) => panic!("expected corruption, got {v:?}"),
    }
}

#[test]
fn test_flipped_block_byte_fails_integrity_check() {
    let storage = segment();
    let mut bytes = storage.read_all("_0.tio").unwrap();
    let pos = bytes.len() / 3;
    bytes[pos] ^= 0x5a;
    storage.overwrite("_0.tio", bytes).unwrap();

    // The damaged byte sits in a block body, which open does not read.
    let reader = open_reader(&storage, ReaderOptions::default()).unwrap();
    expect_corrupt(reader.check_integrity());
}

#[test]
fn test_flipped_index_byte_fails_integrity_check() {
    let storage = segment();
    let mut bytes = storage.read_all("_0.tipo").unwrap();
    let pos = bytes.len() - 1;
    bytes[pos] ^= 0x01;
    storage.overwrite("_0.tipo", bytes).unwrap();

    let reader = open_reader(&storage, ReaderOptions::default()).unwrap();
    expect_corrupt(reader.check_integrity());
}

#[test]
fn test_truncated_files_are_rejected_on_open() {
    for name in ["_0.tio", "_0.tipo"] {
        let storage = segment();
        let mut bytes = storage.read_all(name).unwrap();
        bytes.truncate(bytes.len() - 5);
        storage.overwrite(name, bytes).unwrap();
        expect_corrupt(open_reader(&storage, ReaderOptions::default()));
    }
}

#[test]
fn test_swapped_files_are_rejected() {
    let storage = segment();
    let terms = storage.read_all("_0.tio").unwrap();
    storage.overwrite("_0.tipo", terms).unwrap();
    expect_corrupt(open_reader(&storage, ReaderOptions::default()));
}

#[test]
fn test_bad_directory_offset() {
    let storage = segment();
    let mut bytes = storage.read_all("_0.tio").unwrap();
    // The directory offset is the big-endian u64 right before the footer.
    let at = bytes.len() - 16 - 8;
    bytes[at..at + 8].copy_from_slice(&u64::MAX.to_be_bytes());
    storage.overwrite("_0.tio", bytes).unwrap();
    expect_corrupt(open_reader(&storage, ReaderOptions::default()));
}

/// One per-field entry of the terms file trailer.
#[derive(Debug, Clone)]
struct FieldEntry {
    number: u32,
    num_terms: u64,
    root: Vec<u8>,
    sum_total_term_freq: Option<u64>,
    sum_doc_freq: u64,
    doc_count: u32,
    min_term: Vec<u8>,
    max_term: Vec<u8>,
}

/// Start of the per-field directory, read from the offset before the footer.
fn dir_offset(bytes: &[u8]) -> usize {
    let at = bytes.len() - 16 - 8;
    u64::from_be_bytes(bytes[at..at + 8].try_into().unwrap()) as usize
}

fn read_terms_dir(bytes: &[u8]) -> Vec<FieldEntry> {
    let mut input = &bytes[dir_offset(bytes)..];
    let num_fields = input.read_vint().unwrap();
    (0..num_fields)
        .map(|_| {
            let number = input.read_vint().unwrap();
            let num_terms = input.read_vlong().unwrap();
            let root_len = input.read_vint().unwrap() as usize;
            let root = input.read_bytes_vec(root_len).unwrap();
            // Only BODY carries frequencies in these segments.
            let sum_total_term_freq = (number == 0).then(|| input.read_vlong().unwrap());
            FieldEntry {
                number,
                num_terms,
                root,
                sum_total_term_freq,
                sum_doc_freq: input.read_vlong().unwrap(),
                doc_count: input.read_vint().unwrap(),
                min_term: input.read_len_prefixed().unwrap(),
                max_term: input.read_len_prefixed().unwrap(),
            }
        })
        .collect()
}

/// Replace everything from the directory on, then re-seal with a fresh footer.
fn reseal(original: &[u8], dir: &[u8]) -> Vec<u8> {
    let start = dir_offset(original);
    let footer_start = original.len() - 16;
    let mut bytes = original[..start].to_vec();
    bytes.extend_from_slice(dir);
    bytes.write_be_u64(start as u64).unwrap();
    // Magic and algorithm id are kept; the checksum covers everything before it.
    bytes.extend_from_slice(&original[footer_start..footer_start + 8]);
    let checksum = crc32fast::hash(&bytes) as u64;
    bytes.write_be_u64(checksum).unwrap();
    bytes
}

fn write_terms_dir(storage: &MemoryStorage, fields: &[FieldEntry]) {
    let original = storage.read_all("_0.tio").unwrap();
    let mut dir = Vec::new();
    dir.write_vint(fields.len() as u32).unwrap();
    for field in fields {
        dir.write_vint(field.number).unwrap();
        dir.write_vlong(field.num_terms).unwrap();
        dir.write_vint(field.root.len() as u32).unwrap();
        dir.write_bytes(&field.root).unwrap();
        if let Some(ttf) = field.sum_total_term_freq {
            dir.write_vlong(ttf).unwrap();
        }
        dir.write_vlong(field.sum_doc_freq).unwrap();
        dir.write_vint(field.doc_count).unwrap();
        dir.write_len_prefixed(&field.min_term).unwrap();
        dir.write_len_prefixed(&field.max_term).unwrap();
    }
    storage.overwrite("_0.tio", reseal(&original, &dir)).unwrap();
}

/// Rewrite a single trailer entry, leaving the index file untouched.
fn edit_body_entry(edit: impl FnOnce(&mut FieldEntry)) -> MemoryStorage {
    let storage = segment();
    let mut fields = read_terms_dir(&storage.read_all("_0.tio").unwrap());
    assert_eq!(fields.len(), 1);
    edit(&mut fields[0]);
    write_terms_dir(&storage, &fields);
    storage
}

fn expect_corrupt_message(storage: &MemoryStorage, needle: &str) {
    let err = open_reader(storage, ReaderOptions::default()).unwrap_err();
    assert!(err.is_corruption(), "expected corruption, got {err:?}");
    assert!(err.to_string().contains(needle), "{err}");
}

#[test]
fn test_resealed_trailer_still_opens() {
    let storage = edit_body_entry(|_| {});
    let reader = open_reader(&storage, ReaderOptions::default()).unwrap();
    assert_eq!(reader.terms(BODY).unwrap().size(), 1000);
    reader.check_integrity().unwrap();
}

#[test]
fn test_doc_count_above_max_doc() {
    let storage = edit_body_entry(|field| field.doc_count = MAX_DOC + 1);
    expect_corrupt_message(&storage, "invalid docCount");
}

#[test]
fn test_sum_doc_freq_below_doc_count() {
    let storage = edit_body_entry(|field| field.sum_doc_freq = u64::from(field.doc_count) - 1);
    expect_corrupt_message(&storage, "invalid sumDocFreq");
}

#[test]
fn test_sum_total_term_freq_below_sum_doc_freq() {
    let storage = edit_body_entry(|field| {
        field.sum_total_term_freq = Some(field.sum_doc_freq - 1);
    });
    expect_corrupt_message(&storage, "invalid sumTotalTermFreq");
}

#[test]
fn test_duplicate_field_entry() {
    let storage = segment();
    let mut fields = read_terms_dir(&storage.read_all("_0.tio").unwrap());
    fields.push(fields[0].clone());
    write_terms_dir(&storage, &fields);

    // The index directory needs one start pointer per trailer entry.
    let index = storage.read_all("_0.tipo").unwrap();
    let mut index_dir = &index[dir_offset(&index)..];
    let index_start = index_dir.read_vlong().unwrap();
    let mut dir = Vec::new();
    dir.write_vlong(index_start).unwrap();
    dir.write_vlong(index_start).unwrap();
    storage.overwrite("_0.tipo", reseal(&index, &dir)).unwrap();

    expect_corrupt_message(&storage, "duplicate field: body");
}

#[test]
fn test_index_file_from_other_version() {
    let storage = segment();
    let mut index = storage.read_all("_0.tipo").unwrap();
    // Magic, the one-byte codec length, then the codec name.
    let at = 4 + 1 + TERMS_INDEX_CODEC_NAME.len();
    assert_eq!(i32::from_be_bytes(index[at..at + 4].try_into().unwrap()), 1);
    index[at..at + 4].copy_from_slice(&2i32.to_be_bytes());
    let body = index.len() - 8;
    let checksum = crc32fast::hash(&index[..body]) as u64;
    index[body..].copy_from_slice(&checksum.to_be_bytes());
    storage.overwrite("_0.tipo", index).unwrap();

    expect_corrupt(open_reader(&storage, ReaderOptions::default()));
}

#[test]
fn test_missing_file_is_not_corruption() {
    let storage = segment();
    storage.delete_file("_0.tipo").unwrap();
    let err = open_reader(&storage, ReaderOptions::default()).unwrap_err();
    assert!(!err.is_corruption());
    assert!(!err.is_usage_error());
}

#[test]
fn test_without_terms_index() {
    let storage = segment();
    let reader = open_reader(
        &storage,
        ReaderOptions {
            load_terms_index: false,
        },
    )
    .unwrap();
    let field = reader.terms(BODY).unwrap();
    assert!(!field.has_index());

    let mut terms_enum = field.iterator().unwrap();
    let all = collect(terms_enum.as_mut());
    assert_eq!(all.len() as u64, field.size());

    let mut terms_enum = field.iterator().unwrap();
    assert!(terms_enum.next().unwrap().is_some());
    assert!(terms_enum.ord().is_ok());
    for err in [
        terms_enum.seek_exact(b"abc").unwrap_err(),
        terms_enum.seek_ceil(b"abc").map(|_| ()).unwrap_err(),
        terms_enum.seek_exact_ord(3).unwrap_err(),
    ] {
        assert!(matches!(err, BlockTreeError::IllegalState(_)), "{err:?}");
    }

    let compiled = CompiledAutomaton::new(wildcard("a*b").unwrap()).unwrap();
    let err = field.intersect(&compiled, None).err().expect("expected error");
    assert!(matches!(err, BlockTreeError::IllegalState(_)));

    reader.check_integrity().unwrap();
}
