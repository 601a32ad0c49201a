use crate::error::{BlockTreeError, Result};
use crate::lexical::core::automaton::{Automaton, DEFAULT_MAX_DETERMINIZED_STATES, Nfa};

/// Largest supported edit distance.
pub const MAXIMUM_SUPPORTED_DISTANCE: u32 = 2;

/// Builder for automata accepting every byte string within a given edit
/// distance of a term.
///
/// Edits are counted on bytes. The first `prefix_length` bytes must match
/// exactly.
#[derive(Debug, Clone)]
pub struct LevenshteinAutomaton {
    term: Vec<u8>,
    max_edits: u32,
    prefix_length: usize,
    transpositions: bool,
}

impl LevenshteinAutomaton {
    pub fn new(term: impl Into<Vec<u8>>, max_edits: u32) -> Result<Self> {
        if max_edits > MAXIMUM_SUPPORTED_DISTANCE {
            return Err(BlockTreeError::illegal_argument(format!(
                "max edits must be 0..={MAXIMUM_SUPPORTED_DISTANCE}, inclusive; got: {max_edits}"
            )));
        }
        Ok(LevenshteinAutomaton {
            term: term.into(),
            max_edits,
            prefix_length: 0,
            transpositions: true,
        })
    }

    pub fn prefix_length(mut self, prefix_length: usize) -> Self {
        self.prefix_length = prefix_length;
        self
    }

    /// Count a swap of two adjacent bytes as one edit.
    pub fn transpositions(mut self, transpositions: bool) -> Self {
        self.transpositions = transpositions;
        self
    }

    pub fn to_nfa(&self) -> Nfa {
        let term = &self.term;
        let n = term.len();
        let k = self.max_edits as usize;
        let prefix_length = self.prefix_length.min(n);

        let mut nfa = Nfa::new();
        // State (i, e): i bytes of the term consumed with e edits spent.
        let mut ids = vec![0usize; (n + 1) * (k + 1)];
        for (slot, id) in ids.iter_mut().enumerate() {
            *id = if slot == 0 { 0 } else { nfa.add_state() };
        }
        let id = |i: usize, e: usize| ids[i * (k + 1) + e];

        for e in 0..=k {
            nfa.set_accept(id(n, e), true);
        }

        for i in 0..=n {
            for e in 0..=k {
                let from = id(i, e);
                if i < n {
                    nfa.add_transition(from, term[i], term[i], id(i + 1, e));
                }
                if i < prefix_length || e == k {
                    continue;
                }
                // Insertion.
                nfa.add_transition(from, 0, 255, id(i, e + 1));
                if i < n {
                    // Substitution and deletion.
                    nfa.add_transition(from, 0, 255, id(i + 1, e + 1));
                    nfa.add_epsilon(from, id(i + 1, e + 1));
                }
                if self.transpositions && i + 1 < n && term[i] != term[i + 1] {
                    let swapped = nfa.add_state();
                    nfa.add_transition(from, term[i + 1], term[i + 1], swapped);
                    nfa.add_transition(swapped, term[i], term[i], id(i + 2, e + 1));
                }
            }
        }
        nfa
    }

    pub fn to_automaton(&self) -> Result<Automaton> {
        self.to_nfa().determinize(DEFAULT_MAX_DETERMINIZED_STATES)
    }
}
