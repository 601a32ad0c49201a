use std::cmp::Ordering;
use std::sync::Arc;

use crate::error::{BlockTreeError, Result};
use crate::lexical::core::automaton::{Automaton, CompiledAutomaton, Transition};
use crate::lexical::core::terms::{SeekStatus, TermsEnum, unpositioned};
use crate::lexical::index::blocktree::frame::{Entry, FloorBlock, Frame};
use crate::lexical::index::blocktree::output::Output;
use crate::lexical::index::blocktree::reader::FieldReader;
use crate::lexical::index::postings::{BlockTermState, Impact, PostingsEnum};
use crate::storage::StorageInput;
use crate::util::fst::{Fst, FstOutput};

/// A block frame plus the automaton state reached at its prefix.
#[derive(Debug, Default)]
struct IntersectFrame {
    frame: Frame,
    state: usize,
    transition_index: usize,
    /// The transition the next suffix label is matched against; `None` once
    /// the state's transitions are used up.
    transition: Option<Transition>,
    /// Index output accumulated along `frame.arc`.
    output_prefix: Output,
    /// Next entry of `frame.floor` to move to.
    next_floor: usize,
}

impl IntersectFrame {
    fn set_state(&mut self, automaton: &Automaton, state: usize) {
        self.state = state;
        self.transition_index = 0;
        self.transition = automaton.transitions(state).first().copied();
    }

    /// Move to the first transition that ends at or after `label`.
    fn advance_transition(&mut self, automaton: &Automaton, label: u8) -> bool {
        let transitions = automaton.transitions(self.state);
        while let Some(transition) = self.transition {
            if label <= transition.max {
                return true;
            }
            self.transition_index += 1;
            self.transition = transitions.get(self.transition_index).copied();
        }
        false
    }

    fn move_to(&mut self, block: FloorBlock) {
        self.frame.fp = block.fp;
        self.frame.has_terms = block.has_terms;
        self.frame.term_ord = block.term_ord;
        self.next_floor += 1;
    }

    /// Skip follower blocks whose entries all start below the current
    /// transition.
    fn skip_floor_blocks(&mut self) {
        let Some(transition) = self.transition else {
            return;
        };
        while let Some(&block) = self.frame.floor.get(self.next_floor) {
            if block.lead > transition.min {
                break;
            }
            self.move_to(block);
        }
    }

    fn load(&mut self, input: &mut dyn StorageInput, automaton: &Automaton) -> Result<()> {
        self.next_floor = 0;
        // The first block also holds the prefix itself, which an accepting
        // state must see.
        if self.frame.is_floor && !automaton.is_accept(self.state) {
            self.skip_floor_blocks();
        }
        self.frame.loaded = false;
        self.frame.load_block(input)
    }

    fn load_next_floor_block(&mut self, input: &mut dyn StorageInput) -> Result<()> {
        let block = *self.frame.floor.get(self.next_floor).ok_or_else(|| {
            BlockTreeError::corrupt(format!(
                "floor chain at fp {} ended before its last block",
                self.frame.fp_orig
            ))
        })?;
        self.move_to(block);
        self.skip_floor_blocks();
        self.frame.loaded = false;
        self.frame.load_block(input)
    }
}

/// Enumerates the terms of a field accepted by a [`CompiledAutomaton`].
///
/// Blocks are entered only while the automaton can still accept something
/// below their prefix, and floor blocks and suffix ranges that no transition
/// can match are skipped without being read. Seeking and ordinals are not
/// supported.
pub struct IntersectTermsEnum<'a> {
    field: &'a FieldReader,
    compiled: &'a CompiledAutomaton,
    input: Box<dyn StorageInput>,
    index: Arc<Fst<Output>>,
    stack: Vec<IntersectFrame>,
    current: usize,
    term: Vec<u8>,
    term_exists: bool,
    eof: bool,
}

impl std::fmt::Debug for IntersectTermsEnum<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IntersectTermsEnum")
            .field("field", &self.field.field_info.name)
            .field("term", &String::from_utf8_lossy(&self.term))
            .field("depth", &self.current)
            .field("eof", &self.eof)
            .finish()
    }
}

impl<'a> IntersectTermsEnum<'a> {
    pub(crate) fn new(
        field: &'a FieldReader,
        compiled: &'a CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<Self> {
        let index = field
            .index()?
            .ok_or_else(|| BlockTreeError::illegal_state("terms index was not loaded"))?;
        let automaton = compiled.automaton();
        let mut input = field.terms_input()?;

        let mut root = IntersectFrame::default();
        root.frame.reset_from_output(&field.root_code, 0)?;
        let arc = index.first_arc();
        root.output_prefix = arc.output.clone();
        root.frame.arc = Some(arc);
        root.set_state(automaton, automaton.initial_state());
        root.load(input.as_mut(), automaton)?;

        let mut terms_enum = IntersectTermsEnum {
            field,
            compiled,
            input,
            index,
            stack: vec![root],
            current: 0,
            term: Vec::new(),
            term_exists: false,
            eof: false,
        };
        if let Some(start) = start_term {
            terms_enum.seek_to_start_term(start)?;
        }
        Ok(terms_enum)
    }

    /// Enter the sub-block the current frame just stepped onto, with the
    /// automaton in `state` after its suffix.
    fn push_frame(&mut self, state: usize) -> Result<()> {
        let automaton = self.compiled.automaton();
        let parent = &self.stack[self.current];
        let mut arc = parent
            .frame
            .arc
            .clone()
            .ok_or_else(|| BlockTreeError::illegal_state("frame has no index arc"))?;
        let mut output = parent.output_prefix.clone();
        let sub_fp = parent.frame.last_sub_fp;
        for &label in &self.term[parent.frame.prefix..] {
            arc = self.index.find_target_arc(label, &arc)?.ok_or_else(|| {
                BlockTreeError::corrupt(format!(
                    "sub-block {:?} is missing from the terms index",
                    String::from_utf8_lossy(&self.term)
                ))
            })?;
            output = output.add(&arc.output)?;
        }
        if !arc.is_final() {
            return Err(BlockTreeError::corrupt(format!(
                "sub-block {:?} has no index entry",
                String::from_utf8_lossy(&self.term)
            )));
        }
        let data = output.add(&arc.next_final_output)?;

        let depth = self.current + 1;
        if self.stack.len() <= depth {
            self.stack.push(IntersectFrame::default());
        }
        let frame = &mut self.stack[depth];
        frame.frame.reset_from_output(&data, self.term.len())?;
        if sub_fp != Some(frame.frame.fp_orig) {
            return Err(BlockTreeError::corrupt(format!(
                "terms index points at fp {} but the block file at {:?}",
                frame.frame.fp_orig, sub_fp
            )));
        }
        frame.frame.arc = Some(arc);
        frame.output_prefix = output;
        frame.set_state(automaton, state);
        frame.load(self.input.as_mut(), automaton)?;
        self.current = depth;
        Ok(())
    }

    /// Run the automaton over the suffix of the entry last stepped onto.
    fn run_suffix(automaton: &Automaton, frame: &IntersectFrame) -> Option<usize> {
        frame
            .frame
            .suffix()
            .iter()
            .try_fold(frame.state, |state, &label| automaton.step(state, label))
    }

    /// Position so that `next` returns the first accepted term after
    /// `target`.
    fn seek_to_start_term(&mut self, target: &[u8]) -> Result<()> {
        let compiled = self.compiled;
        let automaton = compiled.automaton();
        loop {
            let frame = &mut self.stack[self.current];
            if frame.frame.is_exhausted() {
                if !frame.frame.is_last_in_floor {
                    frame.load_next_floor_block(self.input.as_mut())?;
                    continue;
                }
                return Ok(());
            }

            let mark = frame.frame.mark();
            let entry = frame.frame.next_entry(&mut self.term)?;
            if matches!(entry, Entry::SubBlock { .. }) && target.starts_with(&self.term) {
                if let Some(state) = Self::run_suffix(automaton, frame) {
                    self.push_frame(state)?;
                    continue;
                }
            }

            match self.term.as_slice().cmp(target) {
                Ordering::Less => {}
                Ordering::Equal => return Ok(()),
                Ordering::Greater => {
                    let frame = &mut self.stack[self.current].frame;
                    frame.reset_to_mark(mark);
                    self.term.truncate(frame.prefix);
                    return Ok(());
                }
            }
        }
    }

    fn next_term(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let compiled = self.compiled;
        let automaton = compiled.automaton();

        loop {
            while self.stack[self.current].frame.is_exhausted() {
                let frame = &mut self.stack[self.current];
                if !frame.frame.is_last_in_floor {
                    frame.load_next_floor_block(self.input.as_mut())?;
                    continue;
                }
                if self.current == 0 {
                    self.eof = true;
                    self.term_exists = false;
                    return Ok(false);
                }
                self.current -= 1;
            }

            let frame = &mut self.stack[self.current];
            let entry = frame.frame.next_entry(&mut self.term)?;

            if let Some(&label) = frame.frame.suffix().first() {
                if !frame.advance_transition(automaton, label) {
                    // No transition left, so nothing further in this frame
                    // can match.
                    frame.frame.is_last_in_floor = true;
                    frame.frame.next_ent = frame.frame.ent_count;
                    continue;
                }
            }

            if entry == Entry::Term {
                if let Some(suffix) = compiled.common_suffix() {
                    if !self.term.ends_with(suffix) {
                        continue;
                    }
                }
            }

            let Some(state) = Self::run_suffix(automaton, frame) else {
                continue;
            };
            match entry {
                Entry::SubBlock { .. } => self.push_frame(state)?,
                Entry::Term if automaton.is_accept(state) => {
                    self.term_exists = true;
                    return Ok(true);
                }
                Entry::Term => {}
            }
        }
    }

    fn decoded_frame(&mut self) -> Result<&mut Frame> {
        if !self.term_exists {
            return Err(unpositioned());
        }
        let field = self.field;
        let frame = &mut self.stack[self.current].frame;
        frame.decode_meta_data(field.postings_reader.as_ref(), &field.field_info)?;
        Ok(frame)
    }
}

fn unsupported() -> BlockTreeError {
    BlockTreeError::illegal_state("seek and ord are not supported on an automaton terms enum")
}

impl TermsEnum for IntersectTermsEnum<'_> {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        if self.next_term()? {
            Ok(Some(&self.term))
        } else {
            Ok(None)
        }
    }

    fn seek_exact(&mut self, _target: &[u8]) -> Result<bool> {
        Err(unsupported())
    }

    fn seek_ceil(&mut self, _target: &[u8]) -> Result<SeekStatus> {
        Err(unsupported())
    }

    fn seek_exact_ord(&mut self, _ord: u64) -> Result<()> {
        Err(unsupported())
    }

    fn term(&self) -> Result<&[u8]> {
        if self.term_exists {
            Ok(&self.term)
        } else {
            Err(unpositioned())
        }
    }

    fn ord(&self) -> Result<u64> {
        Err(unsupported())
    }

    fn doc_freq(&mut self) -> Result<u32> {
        Ok(self.decoded_frame()?.state.doc_freq)
    }

    fn total_term_freq(&mut self) -> Result<u64> {
        Ok(self.decoded_frame()?.state.total_term_freq)
    }

    fn term_state(&mut self) -> Result<BlockTermState> {
        Ok(self.decoded_frame()?.state.clone())
    }

    fn postings(&mut self) -> Result<Box<dyn PostingsEnum>> {
        let state = self.term_state()?;
        self.field
            .postings_reader
            .postings(&self.field.field_info, &state)
    }

    fn impacts(&mut self) -> Result<Vec<Impact>> {
        let state = self.term_state()?;
        self.field
            .postings_reader
            .impacts(&self.field.field_info, &state)
    }
}
