//! A minimal finite-state transducer over byte labels.
//!
//! The FST maps sorted byte-string inputs to values of any [`FstOutput`]
//! algebra. Outputs are pushed towards the root as far as the algebra's
//! `common` allows, identical suffix nodes are stored once, and nodes with
//! many arcs are laid out as fixed-width arrays so their arcs can be binary
//! searched.
//!
//! Node layout in the byte store:
//!
//! ```text
//! vint(numArcs) | layout (0 = linear, 1 = fixed) | [vint(bytesPerArc)] | arcs...
//! arc: flags | label | [output] | [final output] | [vlong(target address)]
//! ```

mod builder;
mod reader;

use std::io::{Read, Write};

use crate::error::Result;

pub use builder::Builder;
pub use reader::{Fst, FstArc};

/// Label of the virtual arc that enters the root node.
pub const END_LABEL: i32 = -1;

pub(crate) const BIT_FINAL_ARC: u8 = 1;
pub(crate) const BIT_STOP_NODE: u8 = 1 << 1;
pub(crate) const BIT_ARC_HAS_OUTPUT: u8 = 1 << 2;
pub(crate) const BIT_ARC_HAS_FINAL_OUTPUT: u8 = 1 << 3;

pub(crate) const LAYOUT_LINEAR: u8 = 0;
pub(crate) const LAYOUT_FIXED_ARRAY: u8 = 1;

/// Nodes up to this depth use a fixed array once they have
/// [`FIXED_ARRAY_NUM_ARCS_SHALLOW`] arcs.
pub(crate) const FIXED_ARRAY_SHALLOW_DISTANCE: usize = 3;
pub(crate) const FIXED_ARRAY_NUM_ARCS_SHALLOW: usize = 5;
pub(crate) const FIXED_ARRAY_NUM_ARCS_DEEP: usize = 10;

/// The value algebra carried on FST arcs.
///
/// `no_output` is the identity of `add`; `common` must return a value that
/// both arguments can `subtract`.
pub trait FstOutput: Clone + PartialEq + std::fmt::Debug + Send + Sync {
    /// The identity value.
    fn no_output() -> Self;

    /// Returns true if this is the identity value.
    fn is_no_output(&self) -> bool {
        *self == Self::no_output()
    }

    /// The largest value both `self` and `other` start with.
    fn common(&self, other: &Self) -> Self;

    /// Remove `prefix` from `self`.
    fn subtract(&self, prefix: &Self) -> Result<Self>;

    /// Append `suffix` to `self`.
    fn add(&self, suffix: &Self) -> Result<Self>;

    /// Serialize the value.
    fn write<W: Write + ?Sized>(&self, out: &mut W) -> Result<()>;

    /// Deserialize a value written by [`FstOutput::write`].
    fn read<R: Read + ?Sized>(input: &mut R) -> Result<Self>;
}

#[cfg(test)]
impl FstOutput for u64 {
    fn no_output() -> Self {
        0
    }

    fn common(&self, other: &Self) -> Self {
        (*self).min(*other)
    }

    fn subtract(&self, prefix: &Self) -> Result<Self> {
        self.checked_sub(*prefix)
            .ok_or_else(|| crate::error::BlockTreeError::corrupt("negative output"))
    }

    fn add(&self, suffix: &Self) -> Result<Self> {
        self.checked_add(*suffix)
            .ok_or_else(|| crate::error::BlockTreeError::corrupt("output overflow"))
    }

    fn write<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        crate::util::varint::write_u64(out, *self)?;
        Ok(())
    }

    fn read<R: Read + ?Sized>(input: &mut R) -> Result<Self> {
        crate::util::varint::read_u64(input)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn build(entries: &[(&[u8], u64)]) -> Fst<u64> {
        let mut builder = Builder::new();
        for (input, output) in entries {
            builder.add(input, *output).unwrap();
        }
        builder.finish().unwrap().unwrap()
    }

    /// Follows `input` from the root and returns the accumulated final output.
    fn lookup(fst: &Fst<u64>, input: &[u8]) -> Option<u64> {
        let mut arc = fst.first_arc();
        let mut output = arc.output;
        for &label in input {
            arc = fst.find_target_arc(label, &arc).unwrap()?;
            output = output.add(&arc.output).unwrap();
        }
        if arc.is_final() {
            Some(output.add(&arc.next_final_output).unwrap())
        } else {
            None
        }
    }

    #[test]
    fn test_lookup_small() {
        let entries: Vec<(&[u8], u64)> = vec![
            (b"", 1),
            (b"cat", 5),
            (b"cats", 7),
            (b"d", 3),
            (b"dog", 12),
        ];
        let fst = build(&entries);

        for (input, output) in &entries {
            assert_eq!(lookup(&fst, input), Some(*output), "input {:?}", input);
        }
        assert_eq!(lookup(&fst, b"ca"), None);
        assert_eq!(lookup(&fst, b"dogs"), None);
        assert_eq!(lookup(&fst, b"x"), None);
    }

    #[test]
    fn test_fixed_array_nodes_are_searchable() {
        // Root has 26 arcs, far above the fixed-array threshold.
        let inputs: Vec<Vec<u8>> = (b'a'..=b'z').map(|c| vec![c, b'x']).collect();
        let mut builder = Builder::new();
        for (i, input) in inputs.iter().enumerate() {
            builder.add(input, i as u64 * 10).unwrap();
        }
        let fst = builder.finish().unwrap().unwrap();

        let root = fst.first_arc();
        let first = fst.read_first_target_arc(&root).unwrap();
        assert!(first.bytes_per_arc() > 0);
        assert_eq!(first.num_arcs(), 26);

        for (i, input) in inputs.iter().enumerate() {
            assert_eq!(lookup(&fst, input), Some(i as u64 * 10));
        }
        assert_eq!(lookup(&fst, b"A"), None);

        let mut arc = first.clone();
        fst.read_arc_by_index(&mut arc, 25).unwrap();
        assert_eq!(arc.label, b'z' as i32);
        assert!(arc.is_last());
    }

    #[test]
    fn test_iterate_siblings() {
        let fst = build(&[(b"a", 1), (b"b", 2), (b"c", 3)]);
        let mut arc = fst.read_first_target_arc(&fst.first_arc()).unwrap();
        let mut labels = vec![arc.label];
        while !arc.is_last() {
            fst.read_next_arc(&mut arc).unwrap();
            labels.push(arc.label);
        }
        assert_eq!(labels, vec![b'a' as i32, b'b' as i32, b'c' as i32]);
    }

    #[test]
    fn test_suffix_sharing() {
        let shared = build(&[(b"ax", 0), (b"bx", 0), (b"cx", 0)]);
        let distinct = build(&[(b"ax", 0), (b"by", 0), (b"cz", 0)]);
        assert!(shared.num_bytes() < distinct.num_bytes());
    }

    #[test]
    fn test_save_load() {
        let fst = build(&[(b"", 4), (b"ab", 9), (b"ac", 11)]);
        let mut bytes = Vec::new();
        fst.save(&mut bytes).unwrap();

        let loaded: Fst<u64> = Fst::load(&mut &bytes[..]).unwrap();
        assert_eq!(lookup(&loaded, b""), Some(4));
        assert_eq!(lookup(&loaded, b"ab"), Some(9));
        assert_eq!(lookup(&loaded, b"ac"), Some(11));
    }

    #[test]
    fn test_out_of_order_rejected() {
        let mut builder = Builder::new();
        builder.add(b"b", 1u64).unwrap();
        assert!(builder.add(b"a", 1).is_err());
        assert!(builder.add(b"b", 1).is_err());
    }

    #[test]
    fn test_empty_builder() {
        let builder: Builder<u64> = Builder::new();
        assert!(builder.finish().unwrap().is_none());
    }
}
