//! Seekable enumeration over every term of a field.
//!
//! The enumerator keeps one [`Frame`] per block on the path from the root to
//! the current term, together with the index arcs that spell the term. A
//! seek first reuses whatever prefix of the current term the target shares,
//! then walks the index for the rest and scans the deepest block it reaches.

use std::cmp::Ordering;
use std::sync::Arc;

use log::trace;

use crate::error::{BlockTreeError, Result};
use crate::lexical::core::terms::{SeekStatus, Terms, TermsEnum, unpositioned};
use crate::lexical::index::blocktree::frame::{Entry, Frame};
use crate::lexical::index::blocktree::output::Output;
use crate::lexical::index::blocktree::reader::FieldReader;
use crate::lexical::index::blocktree::stats::Stats;
use crate::lexical::index::postings::{BlockTermState, Impact, PostingsEnum};
use crate::storage::StorageInput;
use crate::util::fst::{Fst, FstArc, FstOutput};

fn missing_index() -> BlockTreeError {
    BlockTreeError::illegal_state("terms index was not loaded")
}

/// Where a seek resumes walking the index after reusing the current term.
struct SeekStart {
    arc: FstArc<Output>,
    output: Output,
    target_upto: usize,
    /// Frames up to this depth may keep their read position.
    reuse_limit: usize,
}

/// Iterates, seeks and resolves ordinals over the terms of one field.
///
/// Iteration works without the terms index; every seek needs it.
pub struct SegmentTermsEnum<'a> {
    field: &'a FieldReader,
    input: Box<dyn StorageInput>,
    index: Option<Arc<Fst<Output>>>,

    stack: Vec<Frame>,
    current: usize,

    /// Index arcs for the bytes of `term`, `arcs[0]` being the root arc.
    arcs: Vec<FstArc<Output>>,
    term: Vec<u8>,
    /// How many leading bytes of `term` the arcs in `arcs` still spell.
    valid_index_prefix: usize,

    term_exists: bool,
    eof: bool,
    /// Target of a missed `seek_exact`; the next `next` lands on its ceiling.
    pending_seek: Option<Vec<u8>>,
}

impl std::fmt::Debug for SegmentTermsEnum<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SegmentTermsEnum")
            .field("field", &self.field.field_info.name)
            .field("term", &String::from_utf8_lossy(&self.term))
            .field("depth", &self.current)
            .field("term_exists", &self.term_exists)
            .field("eof", &self.eof)
            .finish()
    }
}

impl<'a> SegmentTermsEnum<'a> {
    pub(crate) fn new(field: &'a FieldReader) -> Result<Self> {
        let index = field.index()?;
        let mut root = Frame::default();
        root.reset_from_output(&field.root_code, 0)?;
        let arcs = match &index {
            Some(fst) => {
                let arc = fst.first_arc();
                root.arc = Some(arc.clone());
                vec![arc]
            }
            None => Vec::new(),
        };
        Ok(SegmentTermsEnum {
            field,
            input: field.terms_input()?,
            index,
            stack: vec![root],
            current: 0,
            arcs,
            term: Vec::new(),
            valid_index_prefix: 0,
            term_exists: false,
            eof: false,
            pending_seek: None,
        })
    }

    fn require_index(&self) -> Result<Arc<Fst<Output>>> {
        self.index.clone().ok_or_else(missing_index)
    }

    fn frame_at(&mut self, depth: usize) -> &mut Frame {
        while self.stack.len() <= depth {
            self.stack.push(Frame::default());
        }
        &mut self.stack[depth]
    }

    fn set_arc(&mut self, idx: usize, arc: FstArc<Output>) {
        if idx < self.arcs.len() {
            self.arcs[idx] = arc;
        } else {
            self.arcs.push(arc);
        }
    }

    fn load_current(&mut self) -> Result<()> {
        self.stack[self.current].load_block(self.input.as_mut())
    }

    /// Push the chain described by an index output one level below the
    /// current frame.
    fn push_frame_by_data(
        &mut self,
        arc: FstArc<Output>,
        data: &Output,
        length: usize,
        reuse_limit: Option<usize>,
    ) -> Result<()> {
        let depth = self.current + 1;
        let frame = self.frame_at(depth);
        let kept = frame.refresh_from_output(data, length)?;
        if kept && reuse_limit.is_none_or(|limit| depth > limit) {
            frame.rewind();
        }
        frame.arc = Some(arc);
        self.current = depth;
        Ok(())
    }

    /// Push the sub-block at `fp` one level below the current frame.
    fn push_frame_by_fp(&mut self, fp: u64, length: usize, term_ord: u64) {
        let depth = self.current + 1;
        self.frame_at(depth).reset(fp, length, term_ord);
        self.current = depth;
    }

    /// Compare `target` with the current term and position the stack on the
    /// deepest frame the seek can start from. `None` if already on `target`.
    fn seek_start(&mut self, target: &[u8]) -> Result<Option<SeekStart>> {
        let mut arc = self.arcs.first().cloned().ok_or_else(missing_index)?;
        let mut output = arc.output.clone();
        let mut target_upto = 0;
        let mut last_frame = 0;

        let limit = target.len().min(self.valid_index_prefix);
        let mut cmp = Ordering::Equal;
        while target_upto < limit {
            cmp = self.term[target_upto].cmp(&target[target_upto]);
            if cmp != Ordering::Equal {
                break;
            }
            arc = self.arcs[target_upto + 1].clone();
            output = output.add(&arc.output)?;
            if arc.is_final() {
                last_frame += 1;
            }
            target_upto += 1;
        }
        if cmp == Ordering::Equal {
            cmp = self.term[target_upto..].cmp(&target[target_upto..]);
        }

        let reuse_limit = match cmp {
            Ordering::Equal if self.term_exists => return Ok(None),
            Ordering::Less if self.term_exists => {
                // Target is after the current term: frames on the current
                // path are positioned before it and can keep scanning.
                let limit = self.current;
                self.current = last_frame;
                limit
            }
            // Unpositioned after a miss or the end: `term` need not match
            // the frame positions, so start the block over.
            _ => {
                self.current = last_frame;
                self.stack[last_frame].rewind();
                last_frame
            }
        };
        self.term.truncate(target_upto);
        Ok(Some(SeekStart {
            arc,
            output,
            target_upto,
            reuse_limit,
        }))
    }

    /// Follow the index along `target`, pushing a frame for every block
    /// prefix passed. Returns how many target bytes the index matched.
    fn walk_index(&mut self, index: &Fst<Output>, target: &[u8], start: SeekStart) -> Result<usize> {
        let SeekStart {
            mut arc,
            mut output,
            mut target_upto,
            reuse_limit,
        } = start;
        while target_upto < target.len() {
            let label = target[target_upto];
            let Some(next) = index.find_target_arc(label, &arc)? else {
                break;
            };
            arc = next;
            self.term.push(label);
            output = output.add(&arc.output)?;
            target_upto += 1;
            self.set_arc(target_upto, arc.clone());
            if arc.is_final() {
                let data = output.add(&arc.next_final_output)?;
                self.push_frame_by_data(arc.clone(), &data, target_upto, Some(reuse_limit))?;
            }
        }
        self.valid_index_prefix = self.stack[self.current].prefix;
        Ok(target_upto)
    }

    /// Step through the current block until an entry reaches `target`.
    fn scan_to_term(&mut self, target: &[u8], exact_only: bool) -> Result<SeekStatus> {
        loop {
            let frame = &mut self.stack[self.current];
            if frame.next_ent >= frame.ent_count {
                self.term_exists = false;
                return Ok(SeekStatus::End);
            }
            let entry = frame.next_entry(&mut self.term)?;
            let cmp = self.term.as_slice().cmp(target);
            match (cmp, entry) {
                (Ordering::Less, _) => {}
                (Ordering::Equal, Entry::Term) => {
                    self.term_exists = true;
                    return Ok(SeekStatus::Found);
                }
                (_, Entry::Term) => {
                    self.term_exists = true;
                    return Ok(SeekStatus::NotFound);
                }
                (cmp, Entry::SubBlock { .. }) if exact_only && cmp == Ordering::Greater => {
                    self.term_exists = false;
                    return Ok(SeekStatus::NotFound);
                }
                (_, Entry::SubBlock { fp, term_ord }) => {
                    self.first_term_below(fp, term_ord)?;
                    return Ok(if self.term == target {
                        SeekStatus::Found
                    } else {
                        SeekStatus::NotFound
                    });
                }
            }
        }
    }

    /// Descend into the sub-block at `fp` and stop on its first term.
    fn first_term_below(&mut self, fp: u64, term_ord: u64) -> Result<()> {
        let length = self.term.len();
        self.push_frame_by_fp(fp, length, term_ord);
        self.load_current()?;
        self.step_to_term()
    }

    /// Step entries from the current, non-exhausted frame, descending into
    /// sub-blocks, until a term is reached.
    fn step_to_term(&mut self) -> Result<()> {
        loop {
            match self.stack[self.current].next_entry(&mut self.term)? {
                Entry::Term => {
                    self.term_exists = true;
                    return Ok(());
                }
                Entry::SubBlock { fp, term_ord } => {
                    let length = self.term.len();
                    self.push_frame_by_fp(fp, length, term_ord);
                    self.load_current()?;
                }
            }
        }
    }

    fn next_term(&mut self) -> Result<bool> {
        if self.eof {
            return Ok(false);
        }
        let frame = &mut self.stack[self.current];
        if !frame.loaded {
            frame.scan_to_floor_frame(&self.term);
            frame.load_block(self.input.as_mut())?;
        }

        while self.stack[self.current].is_exhausted() {
            let frame = &mut self.stack[self.current];
            if !frame.is_last_in_floor {
                frame.load_next_floor_block(self.input.as_mut())?;
                continue;
            }
            if self.current == 0 {
                frame.rewind();
                self.eof = true;
                self.term_exists = false;
                self.term.clear();
                self.valid_index_prefix = 0;
                return Ok(false);
            }
            let child_fp = frame.fp_orig;
            self.current -= 1;
            let parent = &mut self.stack[self.current];
            if !parent.loaded || parent.last_sub_fp != Some(child_fp) {
                // A seek pushed the child without scanning the parent.
                parent.scan_to_floor_frame(&self.term);
                parent.load_block(self.input.as_mut())?;
                parent.scan_to_sub_block(child_fp)?;
            }
            self.valid_index_prefix = self.valid_index_prefix.min(parent.prefix);
        }

        self.step_to_term()?;
        Ok(true)
    }

    /// Binary or linear search among the arcs leaving `follow` for the one
    /// whose ordinal range holds `ord`.
    fn find_arc_by_ord(
        index: &Fst<Output>,
        follow: &FstArc<Output>,
        output: &Output,
        ord: i64,
    ) -> Result<Option<FstArc<Output>>> {
        let mut arc = index.read_first_target_arc(follow)?;
        if arc.bytes_per_arc() > 0 {
            let mut low = 0;
            let mut high = arc.num_arcs();
            while low < high {
                let mid = (low + high) / 2;
                index.read_arc_by_index(&mut arc, mid)?;
                let range = output.add(&arc.output)?;
                if ord > range.true_end_ord() {
                    low = mid + 1;
                } else if ord < range.start_ord {
                    high = mid;
                } else {
                    return Ok(Some(arc));
                }
            }
            return Ok(None);
        }
        loop {
            let range = output.add(&arc.output)?;
            if range.contains_ord(ord) {
                return Ok(Some(arc));
            }
            if ord < range.start_ord || arc.is_last() {
                return Ok(None);
            }
            index.read_next_arc(&mut arc)?;
        }
    }

    fn decoded_frame(&mut self) -> Result<&mut Frame> {
        if !self.term_exists {
            return Err(unpositioned());
        }
        let field = self.field;
        let frame = &mut self.stack[self.current];
        frame.decode_meta_data(field.postings_reader.as_ref(), &field.field_info)?;
        Ok(frame)
    }

    /// Visit every block of the field, recording it in `stats`. Leaves the
    /// enumerator unpositioned.
    pub(crate) fn compute_block_stats(&mut self, stats: &mut Stats) -> Result<()> {
        self.current = 0;
        self.pending_seek = None;
        self.eof = false;
        self.term_exists = false;
        self.term.clear();
        self.valid_index_prefix = 0;
        self.stack[0].rewind();
        self.load_current()?;
        let root = &self.stack[0];
        stats.start_block(root, !root.is_last_in_floor);

        'blocks: loop {
            while self.stack[self.current].is_exhausted() {
                let frame = &mut self.stack[self.current];
                stats.end_block(frame)?;
                if !frame.is_last_in_floor {
                    frame.load_next_floor_block(self.input.as_mut())?;
                    stats.start_block(frame, true);
                    continue;
                }
                if self.current == 0 {
                    break 'blocks;
                }
                self.current -= 1;
            }

            loop {
                match self.stack[self.current].next_entry(&mut self.term)? {
                    Entry::Term => {
                        stats.term(&self.term);
                        break;
                    }
                    Entry::SubBlock { fp, term_ord } => {
                        let length = self.term.len();
                        self.push_frame_by_fp(fp, length, term_ord);
                        self.load_current()?;
                        let frame = &self.stack[self.current];
                        stats.start_block(frame, !frame.is_last_in_floor);
                    }
                }
            }
        }
        stats.finish()?;

        self.current = 0;
        self.stack[0].rewind();
        self.term.clear();
        Ok(())
    }
}

impl TermsEnum for SegmentTermsEnum<'_> {
    fn next(&mut self) -> Result<Option<&[u8]>> {
        if let Some(target) = self.pending_seek.take() {
            if self.seek_ceil(&target)? == SeekStatus::End {
                return Ok(None);
            }
            return Ok(Some(&self.term));
        }
        if self.next_term()? {
            Ok(Some(&self.term))
        } else {
            Ok(None)
        }
    }

    fn seek_exact(&mut self, target: &[u8]) -> Result<bool> {
        let index = self.require_index()?;
        trace!(
            "seek_exact field={} target={:?}",
            self.field.field_info.name,
            String::from_utf8_lossy(target)
        );
        self.pending_seek = None;
        self.eof = false;

        let Some(start) = self.seek_start(target)? else {
            return Ok(true);
        };
        let target_upto = self.walk_index(&index, target, start)?;

        let frame = &mut self.stack[self.current];
        frame.scan_to_floor_frame(target);
        if !frame.has_terms {
            // Only sub-blocks below this prefix, so the target cannot be here.
            self.term_exists = false;
            if let Some(&label) = target.get(target_upto) {
                self.term.push(label);
            }
            self.pending_seek = Some(target.to_vec());
            return Ok(false);
        }
        frame.load_block(self.input.as_mut())?;

        if self.scan_to_term(target, true)? == SeekStatus::Found {
            return Ok(true);
        }
        self.term_exists = false;
        self.pending_seek = Some(target.to_vec());
        Ok(false)
    }

    fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let index = self.require_index()?;
        trace!(
            "seek_ceil field={} target={:?}",
            self.field.field_info.name,
            String::from_utf8_lossy(target)
        );
        self.pending_seek = None;
        self.eof = false;

        let Some(start) = self.seek_start(target)? else {
            return Ok(SeekStatus::Found);
        };
        self.walk_index(&index, target, start)?;

        let frame = &mut self.stack[self.current];
        frame.scan_to_floor_frame(target);
        frame.load_block(self.input.as_mut())?;

        match self.scan_to_term(target, false)? {
            SeekStatus::End => {
                // Every entry of the block sorts before the target; the
                // ceiling is the next term after the block.
                self.term.clear();
                self.term.extend_from_slice(target);
                self.term_exists = false;
                if self.next_term()? {
                    Ok(SeekStatus::NotFound)
                } else {
                    Ok(SeekStatus::End)
                }
            }
            status => Ok(status),
        }
    }

    fn seek_exact_ord(&mut self, ord: u64) -> Result<()> {
        let num_terms = self.field.size();
        if ord >= num_terms {
            return Err(BlockTreeError::illegal_argument(format!(
                "targetOrd={ord} is out of bounds (numTerms={num_terms})"
            )));
        }
        let index = self.require_index()?;
        self.pending_seek = None;
        self.eof = false;
        self.term_exists = false;

        let target = ord as i64;
        let mut arc = self.arcs.first().cloned().ok_or_else(missing_index)?;
        let mut output = arc.output.clone();
        self.current = 0;
        self.stack[0].rewind();
        self.term.clear();

        loop {
            let upto = self.term.len();
            if upto > 0 && arc.is_final() {
                let data = output.add(&arc.next_final_output)?;
                if data.contains_ord(target) {
                    self.push_frame_by_data(arc.clone(), &data, upto, None)?;
                }
            }
            if !Fst::target_has_arcs(&arc) {
                break;
            }
            let Some(child) = Self::find_arc_by_ord(&index, &arc, &output, target)? else {
                break;
            };
            let label = u8::try_from(child.label).map_err(|_| {
                BlockTreeError::corrupt(format!("invalid index arc label {}", child.label))
            })?;
            output = output.add(&child.output)?;
            self.term.push(label);
            self.set_arc(upto + 1, child.clone());
            arc = child;
        }

        let prefix = self.stack[self.current].prefix;
        self.term.truncate(prefix);
        self.valid_index_prefix = prefix;
        let frame = &mut self.stack[self.current];
        frame.scan_to_floor_frame_by_ord(ord);
        frame.load_block(self.input.as_mut())?;

        loop {
            let frame = &mut self.stack[self.current];
            if frame.next_ent >= frame.ent_count {
                return Err(BlockTreeError::corrupt(format!(
                    "term ordinal {ord} not found in block at fp {}",
                    frame.fp
                )));
            }
            match frame.next_entry(&mut self.term)? {
                Entry::Term => {
                    let term_ord = frame.term_ord - 1;
                    if term_ord == ord {
                        self.term_exists = true;
                        return Ok(());
                    }
                    if term_ord > ord {
                        return Err(BlockTreeError::corrupt(format!(
                            "term ordinal {ord} skipped in block at fp {}",
                            frame.fp
                        )));
                    }
                }
                Entry::SubBlock { fp, term_ord } => {
                    if ord < frame.term_ord {
                        let length = self.term.len();
                        self.push_frame_by_fp(fp, length, term_ord);
                        self.load_current()?;
                    }
                }
            }
        }
    }

    fn term(&self) -> Result<&[u8]> {
        if self.term_exists {
            Ok(&self.term)
        } else {
            Err(unpositioned())
        }
    }

    fn ord(&self) -> Result<u64> {
        if !self.term_exists {
            return Err(unpositioned());
        }
        Ok(self.stack[self.current].term_ord - 1)
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
