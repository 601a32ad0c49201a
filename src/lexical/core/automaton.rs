//! Deterministic byte automata for term matching.
//!
//! An [`Automaton`] is a DFA over bytes. State 0 is the initial state; each
//! state's transitions are sorted by `min` and never overlap, so stepping is
//! a binary search. Automata are usually built as an [`Nfa`] (literal,
//! prefix, wildcard and Levenshtein constructors are provided) and then
//! determinized. [`CompiledAutomaton`] classifies an automaton so that term
//! dictionaries can pick the cheapest way to enumerate its language.

mod compiled;
mod levenshtein;
mod nfa;
mod wildcard;

use std::collections::HashSet;

pub use compiled::{AutomatonType, CompiledAutomaton};
pub use levenshtein::LevenshteinAutomaton;
pub use nfa::{DEFAULT_MAX_DETERMINIZED_STATES, Nfa};
pub use wildcard::wildcard;

/// A byte range `[min, max]` leading to `dest`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Transition {
    pub min: u8,
    pub max: u8,
    pub dest: usize,
}

/// One DFA state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct State {
    pub accept: bool,
    pub transitions: Vec<Transition>,
}

/// A deterministic automaton over bytes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Automaton {
    states: Vec<State>,
}

impl Automaton {
    /// Build from states. Transitions of every state are sorted and must not
    /// overlap.
    pub fn from_states(mut states: Vec<State>) -> Self {
        if states.is_empty() {
            states.push(State::default());
        }
        for state in &mut states {
            state.transitions.sort();
        }
        Automaton { states }
    }

    /// Accepts nothing.
    pub fn empty() -> Self {
        Self::from_states(vec![State::default()])
    }

    /// Accepts every byte string.
    pub fn any_string() -> Self {
        Self::from_states(vec![State {
            accept: true,
            transitions: vec![Transition {
                min: 0,
                max: 255,
                dest: 0,
            }],
        }])
    }

    /// Accepts exactly `term`.
    pub fn literal(term: &[u8]) -> Self {
        let mut states = Vec::with_capacity(term.len() + 1);
        for (i, &b) in term.iter().enumerate() {
            states.push(State {
                accept: false,
                transitions: vec![Transition {
                    min: b,
                    max: b,
                    dest: i + 1,
                }],
            });
        }
        states.push(State {
            accept: true,
            transitions: Vec::new(),
        });
        Self::from_states(states)
    }

    /// Accepts every byte string starting with `prefix`.
    pub fn prefix(prefix: &[u8]) -> Self {
        let mut automaton = Self::literal(prefix);
        let last = automaton.states.len() - 1;
        automaton.states[last].transitions.push(Transition {
            min: 0,
            max: 255,
            dest: last,
        });
        automaton
    }

    pub fn initial_state(&self) -> usize {
        0
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn is_accept(&self, state: usize) -> bool {
        self.states.get(state).is_some_and(|s| s.accept)
    }

    pub fn transitions(&self, state: usize) -> &[Transition] {
        self.states
            .get(state)
            .map_or(&[][..], |s| s.transitions.as_slice())
    }

    /// The state reached from `state` on `label`, or `None` for the dead state.
    pub fn step(&self, state: usize, label: u8) -> Option<usize> {
        let transitions = self.transitions(state);
        let idx = transitions.partition_point(|t| t.max < label);
        match transitions.get(idx) {
            Some(t) if t.min <= label => Some(t.dest),
            _ => None,
        }
    }

    /// True if the automaton accepts `input`.
    pub fn run(&self, input: &[u8]) -> bool {
        let mut state = self.initial_state();
        for &b in input {
            match self.step(state, b) {
                Some(next) => state = next,
                None => return false,
            }
        }
        self.is_accept(state)
    }

    /// An NFA accepting the reversed language.
    pub fn reverse(&self) -> Nfa {
        let mut nfa = Nfa::new();
        // State 0 of the NFA is the new initial state; DFA state i maps to i + 1.
        for _ in 0..self.states.len() {
            nfa.add_state();
        }
        for (i, state) in self.states.iter().enumerate() {
            if state.accept {
                nfa.add_epsilon(0, i + 1);
            }
            for t in &state.transitions {
                nfa.add_transition(t.dest + 1, t.min, t.max, i + 1);
            }
        }
        nfa.set_accept(self.initial_state() + 1, true);
        nfa
    }

    /// Longest byte string every accepted input starts with.
    pub fn common_prefix(&self) -> Vec<u8> {
        let mut prefix = Vec::new();
        let mut visited = HashSet::new();
        let mut state = self.initial_state();
        while visited.insert(state) {
            let s = &self.states[state];
            if s.accept || s.transitions.len() != 1 {
                break;
            }
            let t = s.transitions[0];
            if t.min != t.max {
                break;
            }
            prefix.push(t.min);
            state = t.dest;
        }
        prefix
    }

    /// True if no input is accepted. Assumes dead states were pruned.
    pub fn is_empty_language(&self) -> bool {
        let initial = &self.states[self.initial_state()];
        !initial.accept && initial.transitions.is_empty()
    }

    /// True if every input is accepted.
    pub fn accepts_all(&self) -> bool {
        let mut visited = HashSet::new();
        let mut pending = vec![self.initial_state()];
        while let Some(state) = pending.pop() {
            if !visited.insert(state) {
                continue;
            }
            let s = &self.states[state];
            if !s.accept {
                return false;
            }
            let mut expected: u16 = 0;
            for t in &s.transitions {
                if t.min as u16 != expected {
                    return false;
                }
                expected = t.max as u16 + 1;
                pending.push(t.dest);
            }
            if expected != 256 {
                return false;
            }
        }
        true
    }

    /// The only accepted input, if the language has exactly one string.
    pub fn single_string(&self) -> Option<Vec<u8>> {
        let mut term = Vec::new();
        let mut visited = HashSet::new();
        let mut state = self.initial_state();
        loop {
            if !visited.insert(state) {
                return None;
            }
            let s = &self.states[state];
            if s.accept {
                return s.transitions.is_empty().then_some(term);
            }
            match s.transitions.as_slice() {
                [t] if t.min == t.max => {
                    term.push(t.min);
                    state = t.dest;
                }
                _ => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_literal_and_prefix() {
        let literal = Automaton::literal(b"dad");
        assert!(literal.run(b"dad"));
        assert!(!literal.run(b"da"));
        assert!(!literal.run(b"dads"));
        assert_eq!(literal.single_string(), Some(b"dad".to_vec()));

        let prefix = Automaton::prefix(b"da");
        assert!(prefix.run(b"da"));
        assert!(prefix.run(b"day"));
        assert!(!prefix.run(b"d"));
        assert!(!prefix.run(b"dog"));
        assert_eq!(prefix.common_prefix(), b"da".to_vec());
        assert_eq!(prefix.single_string(), None);
    }

    #[test]
    fn test_step_binary_search() {
        let automaton = Automaton::from_states(vec![
            State {
                accept: false,
                transitions: vec![
                    Transition { min: b'x', max: b'z', dest: 2 },
                    Transition { min: b'a', max: b'c', dest: 1 },
                ],
            },
            State { accept: true, transitions: vec![] },
            State { accept: true, transitions: vec![] },
        ]);
        assert_eq!(automaton.step(0, b'a'), Some(1));
        assert_eq!(automaton.step(0, b'c'), Some(1));
        assert_eq!(automaton.step(0, b'd'), None);
        assert_eq!(automaton.step(0, b'y'), Some(2));
        assert_eq!(automaton.step(1, b'a'), None);
    }

    #[test]
    fn test_classification_helpers() {
        assert!(Automaton::empty().is_empty_language());
        assert!(!Automaton::literal(b"").is_empty_language());
        assert!(Automaton::any_string().accepts_all());
        assert!(!Automaton::prefix(b"a").accepts_all());
        assert_eq!(Automaton::literal(b"").single_string(), Some(Vec::new()));
    }

    #[test]
    fn test_reverse() {
        let reversed = Automaton::prefix(b"ab")
            .reverse()
            .determinize(DEFAULT_MAX_DETERMINIZED_STATES)
            .unwrap();
        assert!(reversed.run(b"ba"));
        assert!(reversed.run(b"xyzba"));
        assert!(!reversed.run(b"ab"));
    }
}
