mod common;

use blocktree_ords::lexical::core::automaton::{
    Automaton, AutomatonType, CompiledAutomaton, LevenshteinAutomaton, wildcard,
};
use blocktree_ords::lexical::core::terms::{Terms, TermsEnum};
use blocktree_ords::lexical::index::blocktree::{BlockTreeTermsReader, ReaderOptions};
use blocktree_ords::storage::MemoryStorage;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use common::*;

fn accepted(automaton: &Automaton, terms: &[Vec<u8>]) -> Vec<Vec<u8>> {
    terms.iter().filter(|t| automaton.run(t)).cloned().collect()
}

fn intersect_all(reader: &BlockTreeTermsReader, compiled: &CompiledAutomaton) -> Vec<Vec<u8>> {
    let field = reader.terms(BODY).unwrap();
    let mut terms_enum = compiled.terms_enum(field).unwrap();
    collect(terms_enum.as_mut())
}

fn patterns(rng: &mut StdRng, alphabet: &[u8], count: usize) -> Vec<String> {
    let mut patterns = vec!["*".to_string(), "a*".to_string(), "*a".to_string(), "?b*c".to_string()];
    while patterns.len() < count {
        let len = rng.random_range(1..=5);
        let pattern: String = (0..len)
            .map(|_| match rng.random_range(0..10) {
                0..=1 => '*',
                2 => '?',
                _ => alphabet[rng.random_range(0..alphabet.len())] as char,
            })
            .collect();
        patterns.push(pattern);
    }
    patterns
}

#[test]
fn test_wildcard_matches_brute_force() {
    let mut rng = StdRng::seed_from_u64(2024);
    let alphabet = b"abcd";
    let terms = random_terms(&mut rng, 1200, alphabet, 8);
    let patterns = patterns(&mut rng, alphabet, 40);

    for config in configs() {
        let storage = MemoryStorage::new();
        write_segment(&storage, config, &[(BODY, terms.as_slice())]);
        let reader = open_reader(&storage, ReaderOptions::default()).unwrap();

        for pattern in &patterns {
            let automaton = wildcard(pattern).unwrap();
            let expected = accepted(&automaton, &terms);
            let compiled = CompiledAutomaton::new(automaton).unwrap();
            assert_eq!(
                lossy(&intersect_all(&reader, &compiled)),
                lossy(&expected),
                "pattern {pattern:?} with {config:?}"
            );
        }
    }
}

#[test]
fn test_prefix_and_fuzzy_match_brute_force() {
    let mut rng = StdRng::seed_from_u64(31);
    let terms = random_terms(&mut rng, 1500, b"abcdefg", 7);

    for config in [small_config(), Default::default()] {
        let storage = MemoryStorage::new();
        write_segment(&storage, config, &[(BODY, terms.as_slice())]);
        let reader = open_reader(&storage, ReaderOptions::default()).unwrap();

        for prefix in [&b"a"[..], b"bc", b"gfe", b"zz"] {
            let automaton = Automaton::prefix(prefix);
            let expected = accepted(&automaton, &terms);
            let compiled = CompiledAutomaton::new(automaton).unwrap();
            assert_eq!(intersect_all(&reader, &compiled), expected);
        }

        for _ in 0..15 {
            let target = terms[rng.random_range(0..terms.len())].clone();
            let edits = rng.random_range(1..=2);
            let automaton = LevenshteinAutomaton::new(target.clone(), edits)
                .unwrap()
                .prefix_length(rng.random_range(0..2))
                .to_automaton()
                .unwrap();
            let expected = accepted(&automaton, &terms);
            assert!(expected.contains(&target));
            let compiled = CompiledAutomaton::new(automaton).unwrap();
            assert_eq!(
                lossy(&intersect_all(&reader, &compiled)),
                lossy(&expected),
                "target {:?} edits {edits}",
                String::from_utf8_lossy(&target)
            );
        }
    }
}

#[test]
fn test_start_term() {
    let mut rng = StdRng::seed_from_u64(77);
    let terms = random_terms(&mut rng, 1000, b"abc", 9);
    let storage = MemoryStorage::new();
    write_segment(&storage, small_config(), &[(BODY, terms.as_slice())]);
    let reader = open_reader(&storage, ReaderOptions::default()).unwrap();
    let field = reader.terms(BODY).unwrap();

    let automaton = wildcard("*b?").unwrap();
    let expected = accepted(&automaton, &terms);
    let compiled = CompiledAutomaton::new(automaton).unwrap();
    assert_eq!(compiled.kind(), AutomatonType::Normal);

    for _ in 0..60 {
        let start = if rng.random_bool(0.5) {
            terms[rng.random_range(0..terms.len())].clone()
        } else {
            (0..rng.random_range(1..6))
                .map(|_| b"abcd"[rng.random_range(0..4)])
                .collect()
        };
        let after: Vec<Vec<u8>> = expected
            .iter()
            .filter(|t| t.as_slice() > start.as_slice())
            .cloned()
            .collect();
        let mut terms_enum = field.intersect(&compiled, Some(&start)).unwrap();
        assert_eq!(
            lossy(&collect(terms_enum.as_mut())),
            lossy(&after),
            "start {:?}",
            String::from_utf8_lossy(&start)
        );
    }
}

#[test]
fn test_common_suffix_and_stats() {
    let storage = MemoryStorage::new();
    let terms = to_terms(&["bat", "bats", "cat", "cats", "hats", "mat", "rats", "s"]);
    write_segment(&storage, small_config(), &[(BODY, terms.as_slice())]);
    let reader = open_reader(&storage, ReaderOptions::default()).unwrap();
    let field = reader.terms(BODY).unwrap();

    let compiled = CompiledAutomaton::new(wildcard("?*ts").unwrap()).unwrap();
    assert_eq!(compiled.common_suffix(), Some(&b"ts"[..]));
    let mut terms_enum = field.intersect(&compiled, None).unwrap();
    let mut matched = Vec::new();
    while let Some(term) = terms_enum.next().unwrap() {
        matched.push(String::from_utf8_lossy(term).into_owned());
        assert_eq!(terms_enum.doc_freq().unwrap(), 1);
        assert!(terms_enum.postings().is_ok());
    }
    assert_eq!(matched, vec!["bats", "cats", "hats", "rats"]);
}

#[test]
fn test_unsupported_operations() {
    let storage = MemoryStorage::new();
    let terms = to_terms(&["cat", "cats", "dad", "day", "dog"]);
    write_segment(&storage, small_config(), &[(BODY, terms.as_slice())]);
    let reader = open_reader(&storage, ReaderOptions::default()).unwrap();
    let field = reader.terms(BODY).unwrap();

    let compiled = CompiledAutomaton::new(wildcard("d*").unwrap()).unwrap();
    let mut terms_enum = field.intersect(&compiled, None).unwrap();
    assert!(terms_enum.term().unwrap_err().is_usage_error());
    assert_eq!(terms_enum.next().unwrap(), Some(&b"dad"[..]));
    assert!(terms_enum.seek_exact(b"day").unwrap_err().is_usage_error());
    assert!(terms_enum.seek_ceil(b"day").unwrap_err().is_usage_error());
    assert!(terms_enum.seek_exact_ord(1).unwrap_err().is_usage_error());
    assert!(terms_enum.ord().unwrap_err().is_usage_error());

    for automaton in [Automaton::any_string(), Automaton::empty(), Automaton::literal(b"dad")] {
        let compiled = CompiledAutomaton::new(automaton).unwrap();
        assert_ne!(compiled.kind(), AutomatonType::Normal);
        assert!(field.intersect(&compiled, None).err().expect("expected error").is_usage_error());
    }

    let all = CompiledAutomaton::new(Automaton::any_string()).unwrap();
    assert_eq!(intersect_all(&reader, &all), terms);
    let none = CompiledAutomaton::new(Automaton::empty()).unwrap();
    assert!(intersect_all(&reader, &none).is_empty());
    let single = CompiledAutomaton::new(Automaton::literal(b"dad")).unwrap();
    assert_eq!(lossy(&intersect_all(&reader, &single)), vec!["dad"]);
    let missing = CompiledAutomaton::new(Automaton::literal(b"dab")).unwrap();
    assert!(intersect_all(&reader, &missing).is_empty());
}
