use std::io::{Read, Write};

use crate::error::{BlockTreeError, Result};
use crate::storage::data::{DataInput, DataOutput};
use crate::util::fst::{
    BIT_ARC_HAS_FINAL_OUTPUT, BIT_ARC_HAS_OUTPUT, BIT_FINAL_ARC, BIT_STOP_NODE, END_LABEL,
    FstOutput, LAYOUT_FIXED_ARRAY, LAYOUT_LINEAR,
};

/// One arc of an [`Fst`], plus the cursor needed to move to its siblings.
#[derive(Debug, Clone, PartialEq)]
pub struct FstArc<O> {
    pub label: i32,
    pub output: O,
    pub next_final_output: O,
    flags: u8,
    target: Option<u64>,
    num_arcs: usize,
    arc_idx: usize,
    bytes_per_arc: usize,
    arcs_start: usize,
    next_arc: usize,
}

impl<O: FstOutput> FstArc<O> {
    fn empty() -> Self {
        FstArc {
            label: END_LABEL,
            output: O::no_output(),
            next_final_output: O::no_output(),
            flags: 0,
            target: None,
            num_arcs: 0,
            arc_idx: 0,
            bytes_per_arc: 0,
            arcs_start: 0,
            next_arc: 0,
        }
    }

    /// True if an input ends after following this arc.
    pub fn is_final(&self) -> bool {
        self.flags & BIT_FINAL_ARC != 0
    }

    /// True if this is the last arc leaving its node.
    pub fn is_last(&self) -> bool {
        self.arc_idx + 1 >= self.num_arcs
    }

    /// Address of the node this arc points to, `None` if it has no arcs.
    pub fn target(&self) -> Option<u64> {
        self.target
    }

    /// Number of arcs leaving the node this arc belongs to.
    pub fn num_arcs(&self) -> usize {
        self.num_arcs
    }

    /// Position of this arc among its siblings.
    pub fn arc_idx(&self) -> usize {
        self.arc_idx
    }

    /// Fixed arc width of the node, or 0 for linearly encoded nodes.
    pub fn bytes_per_arc(&self) -> usize {
        self.bytes_per_arc
    }
}

/// A compiled, immutable FST.
#[derive(Debug, Clone)]
pub struct Fst<O> {
    empty_output: Option<O>,
    root: Option<u64>,
    bytes: Vec<u8>,
}

impl<O: FstOutput> Fst<O> {
    pub(crate) fn new(empty_output: Option<O>, root: Option<u64>, bytes: Vec<u8>) -> Self {
        Fst {
            empty_output,
            root,
            bytes,
        }
    }

    /// Output of the empty input, if it was added.
    pub fn empty_output(&self) -> Option<&O> {
        self.empty_output.as_ref()
    }

    /// Size of the node store in bytes.
    pub fn num_bytes(&self) -> usize {
        self.bytes.len()
    }

    /// The virtual arc leading into the root node.
    pub fn first_arc(&self) -> FstArc<O> {
        let mut arc = FstArc::empty();
        if let Some(output) = &self.empty_output {
            arc.flags = BIT_FINAL_ARC;
            arc.next_final_output = output.clone();
        }
        arc.target = self.root;
        arc.num_arcs = 1;
        arc
    }

    /// True if `arc` leads to a node that has outgoing arcs.
    pub fn target_has_arcs(arc: &FstArc<O>) -> bool {
        arc.target.is_some()
    }

    fn slice_from(&self, pos: usize) -> Result<&[u8]> {
        self.bytes
            .get(pos..)
            .ok_or_else(|| BlockTreeError::corrupt(format!("FST address {pos} out of bounds")))
    }

    fn read_node_header(&self, address: u64) -> Result<(usize, usize, usize)> {
        let address = address as usize;
        let mut r = self.slice_from(address)?;
        let len = r.len();
        let num_arcs = r.read_vint()? as usize;
        let layout = r.read_byte()?;
        let bytes_per_arc = match layout {
            LAYOUT_LINEAR => 0,
            LAYOUT_FIXED_ARRAY => r.read_vint()? as usize,
            other => {
                return Err(BlockTreeError::corrupt(format!(
                    "unknown FST node layout {other}"
                )));
            }
        };
        if num_arcs == 0 {
            return Err(BlockTreeError::corrupt("FST node without arcs"));
        }
        Ok((num_arcs, bytes_per_arc, address + (len - r.len())))
    }

    fn read_arc_at(&self, pos: usize, arc: &mut FstArc<O>) -> Result<()> {
        let mut r = self.slice_from(pos)?;
        let len = r.len();
        let flags = r.read_byte()?;
        arc.label = r.read_byte()? as i32;
        arc.flags = flags;
        arc.output = if flags & BIT_ARC_HAS_OUTPUT != 0 {
            O::read(&mut r)?
        } else {
            O::no_output()
        };
        arc.next_final_output = if flags & BIT_ARC_HAS_FINAL_OUTPUT != 0 {
            O::read(&mut r)?
        } else {
            O::no_output()
        };
        arc.target = if flags & BIT_STOP_NODE != 0 {
            None
        } else {
            Some(r.read_vlong()?)
        };
        arc.next_arc = pos + (len - r.len());
        Ok(())
    }

    /// Read the first real arc leaving the node `follow` points to.
    pub fn read_first_target_arc(&self, follow: &FstArc<O>) -> Result<FstArc<O>> {
        let address = follow
            .target
            .ok_or_else(|| BlockTreeError::illegal_state("arc has no target node"))?;
        let (num_arcs, bytes_per_arc, arcs_start) = self.read_node_header(address)?;
        let mut arc = FstArc::empty();
        arc.num_arcs = num_arcs;
        arc.bytes_per_arc = bytes_per_arc;
        arc.arcs_start = arcs_start;
        arc.arc_idx = 0;
        self.read_arc_at(arcs_start, &mut arc)?;
        Ok(arc)
    }

    /// Advance `arc` to its next sibling.
    pub fn read_next_arc(&self, arc: &mut FstArc<O>) -> Result<()> {
        if arc.is_last() {
            return Err(BlockTreeError::illegal_state("no next arc"));
        }
        arc.arc_idx += 1;
        let pos = if arc.bytes_per_arc > 0 {
            arc.arcs_start + arc.arc_idx * arc.bytes_per_arc
        } else {
            arc.next_arc
        };
        self.read_arc_at(pos, arc)
    }

    /// Position `arc` on sibling `idx` of a fixed-array node.
    pub fn read_arc_by_index(&self, arc: &mut FstArc<O>, idx: usize) -> Result<()> {
        if arc.bytes_per_arc == 0 {
            return Err(BlockTreeError::illegal_state(
                "indexed arc access needs a fixed-array node",
            ));
        }
        if idx >= arc.num_arcs {
            return Err(BlockTreeError::illegal_argument(format!(
                "arc index {idx} out of bounds ({} arcs)",
                arc.num_arcs
            )));
        }
        arc.arc_idx = idx;
        self.read_arc_at(arc.arcs_start + idx * arc.bytes_per_arc, arc)
    }

    /// Find the arc labeled `label` leaving the node `follow` points to.
    pub fn find_target_arc(&self, label: u8, follow: &FstArc<O>) -> Result<Option<FstArc<O>>> {
        let Some(address) = follow.target else {
            return Ok(None);
        };
        let (num_arcs, bytes_per_arc, arcs_start) = self.read_node_header(address)?;
        let mut arc = FstArc::empty();
        arc.num_arcs = num_arcs;
        arc.bytes_per_arc = bytes_per_arc;
        arc.arcs_start = arcs_start;

        if bytes_per_arc > 0 {
            let mut low = 0usize;
            let mut high = num_arcs;
            while low < high {
                let mid = (low + high) / 2;
                let pos = arcs_start + mid * bytes_per_arc + 1;
                let mid_label = *self
                    .bytes
                    .get(pos)
                    .ok_or_else(|| BlockTreeError::corrupt("FST arc out of bounds"))?;
                match mid_label.cmp(&label) {
                    std::cmp::Ordering::Less => low = mid + 1,
                    std::cmp::Ordering::Greater => high = mid,
                    std::cmp::Ordering::Equal => {
                        arc.arc_idx = mid;
                        self.read_arc_at(arcs_start + mid * bytes_per_arc, &mut arc)?;
                        return Ok(Some(arc));
                    }
                }
            }
            return Ok(None);
        }

        let mut pos = arcs_start;
        for idx in 0..num_arcs {
            arc.arc_idx = idx;
            self.read_arc_at(pos, &mut arc)?;
            match (arc.label as u8).cmp(&label) {
                std::cmp::Ordering::Equal => return Ok(Some(arc)),
                std::cmp::Ordering::Greater => return Ok(None),
                std::cmp::Ordering::Less => pos = arc.next_arc,
            }
        }
        Ok(None)
    }

    /// Serialize the FST.
    pub fn save<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        match &self.empty_output {
            Some(output) => {
                out.write_byte(1)?;
                output.write(out)?;
            }
            None => out.write_byte(0)?,
        }
        out.write_vlong(self.root.map_or(0, |address| address + 1))?;
        out.write_vlong(self.bytes.len() as u64)?;
        out.write_bytes(&self.bytes)?;
        Ok(())
    }

    /// Deserialize an FST written by [`Fst::save`].
    pub fn load<R: Read + ?Sized>(input: &mut R) -> Result<Self> {
        let empty_output = match input.read_byte()? {
            0 => None,
            1 => Some(O::read(input)?),
            other => {
                return Err(BlockTreeError::corrupt(format!(
                    "invalid FST empty-output flag {other}"
                )));
            }
        };
        let root = match input.read_vlong()? {
            0 => None,
            n => Some(n - 1),
        };
        let num_bytes = input.read_vlong()? as usize;
        let bytes = input.read_bytes_vec(num_bytes)?;
        if let Some(address) = root {
            if address as usize >= bytes.len() {
                return Err(BlockTreeError::corrupt("FST root address out of bounds"));
            }
        }
        Ok(Fst {
            empty_output,
            root,
            bytes,
        })
    }
}
