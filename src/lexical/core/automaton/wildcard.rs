use crate::error::Result;
use crate::lexical::core::automaton::{Automaton, DEFAULT_MAX_DETERMINIZED_STATES, Nfa};

const WILDCARD_STRING: char = '*';
const WILDCARD_CHAR: char = '?';
const WILDCARD_ESCAPE: char = '\\';

/// Build the automaton for a wildcard pattern.
///
/// `*` matches any string, `?` matches exactly one UTF-8 encoded character
/// and `\` escapes the next character. A trailing `\` matches itself.
pub fn wildcard(pattern: &str) -> Result<Automaton> {
    let mut nfa = Nfa::new();
    let mut current = 0;
    let mut chars = pattern.chars();

    while let Some(c) = chars.next() {
        match c {
            WILDCARD_STRING => {
                let looping = nfa.add_state();
                nfa.add_epsilon(current, looping);
                nfa.add_transition(looping, 0, 255, looping);
                current = looping;
            }
            WILDCARD_CHAR => current = any_char(&mut nfa, current),
            WILDCARD_ESCAPE => {
                let literal = chars.next().unwrap_or(WILDCARD_ESCAPE);
                current = literal_char(&mut nfa, current, literal);
            }
            other => current = literal_char(&mut nfa, current, other),
        }
    }
    nfa.set_accept(current, true);
    nfa.determinize(DEFAULT_MAX_DETERMINIZED_STATES)
}

fn literal_char(nfa: &mut Nfa, from: usize, c: char) -> usize {
    let mut buf = [0u8; 4];
    let mut current = from;
    for &b in c.encode_utf8(&mut buf).as_bytes() {
        let next = nfa.add_state();
        nfa.add_transition(current, b, b, next);
        current = next;
    }
    current
}

/// One UTF-8 sequence of 1 to 4 bytes.
fn any_char(nfa: &mut Nfa, from: usize) -> usize {
    let end = nfa.add_state();
    nfa.add_transition(from, 0x00, 0x7f, end);
    for (lead_min, lead_max, continuations) in [(0xc2, 0xdf, 1), (0xe0, 0xef, 2), (0xf0, 0xf4, 3)] {
        let mut current = nfa.add_state();
        nfa.add_transition(from, lead_min, lead_max, current);
        for i in 0..continuations {
            let next = if i + 1 == continuations {
                end
            } else {
                nfa.add_state()
            };
            nfa.add_transition(current, 0x80, 0xbf, next);
            current = next;
        }
    }
    end
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_star_and_question_mark() {
        let automaton = wildcard("da*").unwrap();
        assert!(automaton.run(b"da"));
        assert!(automaton.run(b"day"));
        assert!(!automaton.run(b"dog"));

        let automaton = wildcard("d?g").unwrap();
        assert!(automaton.run(b"dog"));
        assert!(automaton.run("dög".as_bytes()));
        assert!(!automaton.run(b"dg"));
        assert!(!automaton.run(b"doog"));
    }

    #[test]
    fn test_escape() {
        let automaton = wildcard(r"a\*b").unwrap();
        assert!(automaton.run(b"a*b"));
        assert!(!automaton.run(b"axb"));

        let trailing = wildcard(r"a\").unwrap();
        assert!(trailing.run(br"a\"));
    }

    #[test]
    fn test_common_prefix_and_suffix() {
        let automaton = wildcard("ca*s").unwrap();
        assert_eq!(automaton.common_prefix(), b"ca".to_vec());
        let reversed = automaton
            .reverse()
            .determinize(DEFAULT_MAX_DETERMINIZED_STATES)
            .unwrap();
        assert_eq!(reversed.common_prefix(), b"s".to_vec());
    }
}
