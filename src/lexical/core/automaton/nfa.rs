use std::collections::{BTreeSet, HashMap, VecDeque};

use crate::error::{BlockTreeError, Result};
use crate::lexical::core::automaton::{Automaton, State, Transition};

/// Upper bound on the number of DFA states subset construction may create.
pub const DEFAULT_MAX_DETERMINIZED_STATES: usize = 10_000;

#[derive(Debug, Clone, Default)]
struct NfaState {
    accept: bool,
    transitions: Vec<Transition>,
    epsilons: Vec<usize>,
}

/// A nondeterministic byte automaton with epsilon transitions.
///
/// State 0 is the initial state.
#[derive(Debug, Clone)]
pub struct Nfa {
    states: Vec<NfaState>,
}

impl Default for Nfa {
    fn default() -> Self {
        Self::new()
    }
}

impl Nfa {
    /// An NFA with a single, non-accepting initial state.
    pub fn new() -> Self {
        Nfa {
            states: vec![NfaState::default()],
        }
    }

    pub fn add_state(&mut self) -> usize {
        self.states.push(NfaState::default());
        self.states.len() - 1
    }

    pub fn num_states(&self) -> usize {
        self.states.len()
    }

    pub fn set_accept(&mut self, state: usize, accept: bool) {
        self.states[state].accept = accept;
    }

    pub fn add_transition(&mut self, from: usize, min: u8, max: u8, dest: usize) {
        self.states[from]
            .transitions
            .push(Transition { min, max, dest });
    }

    pub fn add_epsilon(&mut self, from: usize, dest: usize) {
        self.states[from].epsilons.push(dest);
    }

    fn closure(&self, set: &mut BTreeSet<usize>) {
        let mut pending: Vec<usize> = set.iter().copied().collect();
        while let Some(state) = pending.pop() {
            for &dest in &self.states[state].epsilons {
                if set.insert(dest) {
                    pending.push(dest);
                }
            }
        }
    }

    /// Subset construction followed by removal of states that cannot reach
    /// an accept state.
    pub fn determinize(&self, max_states: usize) -> Result<Automaton> {
        let mut start = BTreeSet::new();
        start.insert(0usize);
        self.closure(&mut start);

        let start_key: Vec<usize> = start.into_iter().collect();
        let mut ids: HashMap<Vec<usize>, usize> = HashMap::new();
        let mut sets: Vec<Vec<usize>> = Vec::new();
        let mut dfa: Vec<State> = Vec::new();
        let mut worklist = VecDeque::new();

        ids.insert(start_key.clone(), 0);
        sets.push(start_key);
        dfa.push(State::default());
        worklist.push_back(0usize);

        while let Some(id) = worklist.pop_front() {
            let members = sets[id].clone();
            dfa[id].accept = members.iter().any(|&s| self.states[s].accept);

            let mut points: Vec<u16> = Vec::new();
            for &s in &members {
                for t in &self.states[s].transitions {
                    points.push(t.min as u16);
                    points.push(t.max as u16 + 1);
                }
            }
            points.sort_unstable();
            points.dedup();

            let mut transitions: Vec<Transition> = Vec::new();
            for window in points.windows(2) {
                let (lo, hi) = (window[0], window[1] - 1);
                if lo > 255 {
                    break;
                }
                let mut target = BTreeSet::new();
                for &s in &members {
                    for t in &self.states[s].transitions {
                        if t.min as u16 <= lo && lo <= t.max as u16 {
                            target.insert(t.dest);
                        }
                    }
                }
                if target.is_empty() {
                    continue;
                }
                self.closure(&mut target);
                let key: Vec<usize> = target.into_iter().collect();
                let dest = match ids.get(&key) {
                    Some(&dest) => dest,
                    None => {
                        if dfa.len() >= max_states {
                            return Err(BlockTreeError::illegal_argument(format!(
                                "determinizing automaton would result in more than {max_states} states"
                            )));
                        }
                        let dest = dfa.len();
                        ids.insert(key.clone(), dest);
                        sets.push(key);
                        dfa.push(State::default());
                        worklist.push_back(dest);
                        dest
                    }
                };

                match transitions.last_mut() {
                    Some(prev) if prev.dest == dest && prev.max as u16 + 1 == lo => {
                        prev.max = hi as u8;
                    }
                    _ => transitions.push(Transition {
                        min: lo as u8,
                        max: hi as u8,
                        dest,
                    }),
                }
            }
            dfa[id].transitions = transitions;
        }

        Ok(remove_dead_states(dfa))
    }
}

/// Drop states from which no accept state is reachable. State 0 is kept.
fn remove_dead_states(states: Vec<State>) -> Automaton {
    let n = states.len();
    let mut incoming: Vec<Vec<usize>> = vec![Vec::new(); n];
    for (from, state) in states.iter().enumerate() {
        for t in &state.transitions {
            incoming[t.dest].push(from);
        }
    }

    let mut live = vec![false; n];
    let mut pending: Vec<usize> = (0..n).filter(|&s| states[s].accept).collect();
    for &s in &pending {
        live[s] = true;
    }
    while let Some(state) = pending.pop() {
        for &from in &incoming[state] {
            if !live[from] {
                live[from] = true;
                pending.push(from);
            }
        }
    }

    let mut remap = vec![usize::MAX; n];
    let mut next = 0;
    for (s, slot) in remap.iter_mut().enumerate() {
        if s == 0 || live[s] {
            *slot = next;
            next += 1;
        }
    }

    let mut result = Vec::with_capacity(next);
    for (s, state) in states.into_iter().enumerate() {
        if remap[s] == usize::MAX {
            continue;
        }
        let transitions = state
            .transitions
            .into_iter()
            .filter(|t| live[t.dest])
            .map(|t| Transition {
                dest: remap[t.dest],
                ..t
            })
            .collect();
        result.push(State {
            accept: state.accept,
            transitions,
        });
    }
    Automaton::from_states(result)
}
