mod common;

use blocktree_ords::lexical::core::automaton::{CompiledAutomaton, wildcard};
use blocktree_ords::lexical::core::terms::{SeekStatus, Terms, TermsEnum};
use blocktree_ords::lexical::index::blocktree::ReaderOptions;
use blocktree_ords::storage::{FileStorage, Storage, StorageConfig};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tempfile::TempDir;

use common::*;

#[test]
fn test_file_storage_round_trip() {
    let dir = TempDir::new().unwrap();
    let mut rng = StdRng::seed_from_u64(3);
    let body = random_terms(&mut rng, 2500, b"etaoinshr", 9);
    let id: Vec<Vec<u8>> = (0..50u32)
        .map(|i| (i * 5_000_000).to_be_bytes().to_vec())
        .collect();

    {
        let storage = FileStorage::new(dir.path(), StorageConfig::default()).unwrap();
        write_segment(
            &storage,
            Default::default(),
            &[(BODY, body.as_slice()), (ID, id.as_slice())],
        );
        for name in ["_0.tio", "_0.tipo", "_0.si", "_0.fnm"] {
            assert!(storage.file_exists(name), "{name} missing");
        }
    }

    let storage = FileStorage::new(dir.path(), StorageConfig::default()).unwrap();
    let reader = open_reader(&storage, ReaderOptions::default()).unwrap();
    reader.check_integrity().unwrap();

    let field = reader.terms(BODY).unwrap();
    let mut terms_enum = field.iterator().unwrap();
    assert_eq!(collect(terms_enum.as_mut()), body);

    let mut terms_enum = field.iterator().unwrap();
    for ord in (0..body.len()).step_by(37) {
        terms_enum.seek_exact_ord(ord as u64).unwrap();
        assert_eq!(terms_enum.term().unwrap(), body[ord].as_slice());
        assert_eq!(terms_enum.seek_ceil(&body[ord]).unwrap(), SeekStatus::Found);
        assert_eq!(terms_enum.ord().unwrap(), ord as u64);
    }

    // Binary terms, including bytes above 0x7f.
    let ids = reader.terms(ID).unwrap();
    let mut terms_enum = ids.iterator().unwrap();
    assert_eq!(collect(terms_enum.as_mut()), id);
    assert!(terms_enum.seek_exact(&(49u32 * 5_000_000).to_be_bytes()).unwrap());
    assert_eq!(terms_enum.ord().unwrap(), 49);

    let compiled = CompiledAutomaton::new(wildcard("s*e").unwrap()).unwrap();
    let mut terms_enum = field.intersect(&compiled, None).unwrap();
    let expected: Vec<Vec<u8>> = body
        .iter()
        .filter(|t| t.starts_with(b"s") && t.ends_with(b"e"))
        .cloned()
        .collect();
    assert_eq!(collect(terms_enum.as_mut()), expected);
}
