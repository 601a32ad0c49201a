use std::collections::HashMap;

use crate::error::{BlockTreeError, Result};
use crate::storage::data::DataOutput;
use crate::util::fst::reader::Fst;
use crate::util::fst::{
    BIT_ARC_HAS_FINAL_OUTPUT, BIT_ARC_HAS_OUTPUT, BIT_FINAL_ARC, BIT_STOP_NODE,
    FIXED_ARRAY_NUM_ARCS_DEEP, FIXED_ARRAY_NUM_ARCS_SHALLOW, FIXED_ARRAY_SHALLOW_DISTANCE,
    FstOutput, LAYOUT_FIXED_ARRAY, LAYOUT_LINEAR,
};

#[derive(Debug, Clone)]
struct PendingArc<O> {
    label: u8,
    /// Address of the compiled target, `None` while uncompiled or when the
    /// target has no arcs.
    target: Option<u64>,
    output: O,
    next_final_output: O,
    is_final: bool,
}

#[derive(Debug, Clone)]
struct UnCompiledNode<O> {
    arcs: Vec<PendingArc<O>>,
    output: O,
    is_final: bool,
}

impl<O: FstOutput> UnCompiledNode<O> {
    fn new() -> Self {
        UnCompiledNode {
            arcs: Vec::new(),
            output: O::no_output(),
            is_final: false,
        }
    }

    fn clear(&mut self) {
        self.arcs.clear();
        self.output = O::no_output();
        self.is_final = false;
    }

    fn last_arc_mut(&mut self, label: u8) -> Result<&mut PendingArc<O>> {
        match self.arcs.last_mut() {
            Some(arc) if arc.label == label => Ok(arc),
            _ => Err(BlockTreeError::illegal_state(format!(
                "no pending arc with label {label}"
            ))),
        }
    }

    fn add_arc(&mut self, label: u8) {
        self.arcs.push(PendingArc {
            label,
            target: None,
            output: O::no_output(),
            next_final_output: O::no_output(),
            is_final: false,
        });
    }

    fn prepend_output(&mut self, prefix: &O) -> Result<()> {
        for arc in &mut self.arcs {
            arc.output = prefix.add(&arc.output)?;
        }
        if self.is_final {
            self.output = prefix.add(&self.output)?;
        }
        Ok(())
    }
}

/// Builds an [`Fst`] from inputs added in strictly increasing byte order.
#[derive(Debug)]
pub struct Builder<O: FstOutput> {
    frontier: Vec<UnCompiledNode<O>>,
    last_input: Vec<u8>,
    started: bool,
    empty_output: Option<O>,
    bytes: Vec<u8>,
    registry: HashMap<Vec<u8>, u64>,
    scratch: Vec<u8>,
}

impl<O: FstOutput> Default for Builder<O> {
    fn default() -> Self {
        Self::new()
    }
}

impl<O: FstOutput> Builder<O> {
    pub fn new() -> Self {
        Builder {
            frontier: vec![UnCompiledNode::new()],
            last_input: Vec::new(),
            started: false,
            empty_output: None,
            bytes: Vec::new(),
            registry: HashMap::new(),
            scratch: Vec::new(),
        }
    }

    /// Add the next input with its output.
    pub fn add(&mut self, input: &[u8], output: O) -> Result<()> {
        if self.started && input <= self.last_input.as_slice() {
            return Err(BlockTreeError::illegal_argument(format!(
                "inputs are added out of order: {:?} after {:?}",
                input, self.last_input
            )));
        }
        self.started = true;

        if input.is_empty() {
            self.frontier[0].is_final = true;
            self.empty_output = Some(output);
            return Ok(());
        }

        let stop = self.last_input.len().min(input.len());
        let mut prefix_len = 0;
        while prefix_len < stop && self.last_input[prefix_len] == input[prefix_len] {
            prefix_len += 1;
        }
        let prefix_len_plus1 = prefix_len + 1;

        while self.frontier.len() <= input.len() {
            self.frontier.push(UnCompiledNode::new());
        }

        self.freeze_tail(prefix_len_plus1)?;

        for idx in prefix_len_plus1..=input.len() {
            self.frontier[idx - 1].add_arc(input[idx - 1]);
        }

        let last = &mut self.frontier[input.len()];
        last.is_final = true;
        last.output = O::no_output();

        // Push conflicting outputs forward, only as far as needed.
        let mut output = output;
        for idx in 1..prefix_len_plus1 {
            let label = input[idx - 1];
            let last_output = self.frontier[idx - 1].last_arc_mut(label)?.output.clone();
            let common = if !last_output.is_no_output() {
                let common = output.common(&last_output);
                let word_suffix = last_output.subtract(&common)?;
                self.frontier[idx - 1].last_arc_mut(label)?.output = common.clone();
                self.frontier[idx].prepend_output(&word_suffix)?;
                common
            } else {
                O::no_output()
            };
            output = output.subtract(&common)?;
        }

        self.frontier[prefix_len_plus1 - 1]
            .last_arc_mut(input[prefix_len_plus1 - 1])?
            .output = output;

        self.last_input.clear();
        self.last_input.extend_from_slice(input);
        Ok(())
    }

    /// Compile all remaining nodes. Returns `None` if nothing was added.
    pub fn finish(mut self) -> Result<Option<Fst<O>>> {
        if !self.started {
            return Ok(None);
        }
        self.freeze_tail(0)?;
        let root = std::mem::replace(&mut self.frontier[0], UnCompiledNode::new());
        let root_address = self.compile_node(&root, 0)?;
        Ok(Some(Fst::new(self.empty_output, root_address, self.bytes)))
    }

    fn freeze_tail(&mut self, prefix_len_plus1: usize) -> Result<()> {
        let down_to = prefix_len_plus1.max(1);
        for idx in (down_to..=self.last_input.len()).rev() {
            let next_final_output = self.frontier[idx].output.clone();
            let is_final = self.frontier[idx].is_final || self.frontier[idx].arcs.is_empty();

            let node = std::mem::replace(&mut self.frontier[idx], UnCompiledNode::new());
            let address = self.compile_node(&node, idx)?;
            self.frontier[idx] = node;
            self.frontier[idx].clear();

            let label = self.last_input[idx - 1];
            let parent = self.frontier[idx - 1].last_arc_mut(label)?;
            parent.target = address;
            parent.next_final_output = next_final_output;
            parent.is_final = is_final;
        }
        Ok(())
    }

    fn compile_node(&mut self, node: &UnCompiledNode<O>, depth: usize) -> Result<Option<u64>> {
        if node.arcs.is_empty() {
            return Ok(None);
        }

        self.scratch.clear();
        encode_node(&node.arcs, depth, &mut self.scratch)?;

        if let Some(&address) = self.registry.get(&self.scratch) {
            return Ok(Some(address));
        }
        let address = self.bytes.len() as u64;
        self.bytes.extend_from_slice(&self.scratch);
        self.registry.insert(self.scratch.clone(), address);
        Ok(Some(address))
    }
}

fn encode_arc<O: FstOutput>(arc: &PendingArc<O>, out: &mut Vec<u8>) -> Result<()> {
    let mut flags = 0u8;
    if arc.is_final {
        flags |= BIT_FINAL_ARC;
    }
    if arc.target.is_none() {
        flags |= BIT_STOP_NODE;
    }
    let has_output = !arc.output.is_no_output();
    let has_final_output = arc.is_final && !arc.next_final_output.is_no_output();
    if has_output {
        flags |= BIT_ARC_HAS_OUTPUT;
    }
    if has_final_output {
        flags |= BIT_ARC_HAS_FINAL_OUTPUT;
    }

    out.push(flags);
    out.push(arc.label);
    if has_output {
        arc.output.write(out)?;
    }
    if has_final_output {
        arc.next_final_output.write(out)?;
    }
    if let Some(target) = arc.target {
        out.write_vlong(target)?;
    }
    Ok(())
}

fn encode_node<O: FstOutput>(arcs: &[PendingArc<O>], depth: usize, out: &mut Vec<u8>) -> Result<()> {
    let fixed_array = (depth <= FIXED_ARRAY_SHALLOW_DISTANCE
        && arcs.len() >= FIXED_ARRAY_NUM_ARCS_SHALLOW)
        || arcs.len() >= FIXED_ARRAY_NUM_ARCS_DEEP;

    out.write_vint(arcs.len() as u32)?;

    if !fixed_array {
        out.push(LAYOUT_LINEAR);
        for arc in arcs {
            encode_arc(arc, out)?;
        }
        return Ok(());
    }

    let mut encoded: Vec<Vec<u8>> = Vec::with_capacity(arcs.len());
    for arc in arcs {
        let mut buf = Vec::new();
        encode_arc(arc, &mut buf)?;
        encoded.push(buf);
    }
    let bytes_per_arc = encoded.iter().map(Vec::len).max().unwrap_or(0);

    out.push(LAYOUT_FIXED_ARRAY);
    out.write_vint(bytes_per_arc as u32)?;
    for buf in &encoded {
        out.extend_from_slice(buf);
        out.resize(out.len() + bytes_per_arc - buf.len(), 0);
    }
    Ok(())
}
