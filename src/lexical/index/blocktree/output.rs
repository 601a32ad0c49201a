use std::fmt;
use std::io::{Read, Write};

use crate::error::{BlockTreeError, Result};
use crate::storage::{DataInput, DataOutput};
use crate::util::fst::FstOutput;

/// Value carried by the index FST: block bytes plus a range of term ordinals.
///
/// `end_ord` is stored as `i64::MAX - end`, so taking the minimum of two
/// outputs yields the smallest start and the largest end at once. The empty
/// output (no bytes, both ordinals 0) is the identity of [`FstOutput::add`].
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Output {
    pub bytes: Vec<u8>,
    pub start_ord: i64,
    pub end_ord: i64,
}

impl Output {
    pub fn new(bytes: Vec<u8>, start_ord: i64, end_ord: i64) -> Self {
        Output {
            bytes,
            start_ord,
            end_ord,
        }
    }

    /// The inclusive upper bound of the ordinal range.
    pub fn true_end_ord(&self) -> i64 {
        i64::MAX - self.end_ord
    }

    pub fn contains_ord(&self, ord: i64) -> bool {
        ord >= self.start_ord && ord <= self.true_end_ord()
    }
}

impl fmt::Display for Output {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{:02x?} ords={}..={}",
            self.bytes,
            self.start_ord,
            self.true_end_ord()
        )
    }
}

impl FstOutput for Output {
    fn no_output() -> Self {
        Output::default()
    }

    fn is_no_output(&self) -> bool {
        self.bytes.is_empty() && self.start_ord == 0 && self.end_ord == 0
    }

    fn common(&self, other: &Self) -> Self {
        let shared = self
            .bytes
            .iter()
            .zip(&other.bytes)
            .take_while(|(a, b)| a == b)
            .count();
        Output {
            bytes: self.bytes[..shared].to_vec(),
            start_ord: self.start_ord.min(other.start_ord),
            end_ord: self.end_ord.min(other.end_ord),
        }
    }

    fn subtract(&self, prefix: &Self) -> Result<Self> {
        if prefix.is_no_output() {
            return Ok(self.clone());
        }
        if !self.bytes.starts_with(&prefix.bytes) {
            return Err(BlockTreeError::corrupt(format!(
                "output {self} does not start with {prefix}"
            )));
        }
        let start_ord = self.start_ord - prefix.start_ord;
        let end_ord = self.end_ord - prefix.end_ord;
        if start_ord < 0 || end_ord < 0 {
            return Err(BlockTreeError::corrupt(format!(
                "cannot subtract {prefix} from {self}"
            )));
        }
        Ok(Output {
            bytes: self.bytes[prefix.bytes.len()..].to_vec(),
            start_ord,
            end_ord,
        })
    }

    fn add(&self, suffix: &Self) -> Result<Self> {
        if self.is_no_output() {
            return Ok(suffix.clone());
        }
        if suffix.is_no_output() {
            return Ok(self.clone());
        }
        let (Some(start_ord), Some(end_ord)) = (
            self.start_ord.checked_add(suffix.start_ord),
            self.end_ord.checked_add(suffix.end_ord),
        ) else {
            return Err(BlockTreeError::corrupt(format!(
                "ordinal overflow adding {suffix} to {self}"
            )));
        };
        let mut bytes = Vec::with_capacity(self.bytes.len() + suffix.bytes.len());
        bytes.extend_from_slice(&self.bytes);
        bytes.extend_from_slice(&suffix.bytes);
        Ok(Output {
            bytes,
            start_ord,
            end_ord,
        })
    }

    fn write<W: Write + ?Sized>(&self, out: &mut W) -> Result<()> {
        out.write_vint(self.bytes.len() as u32)?;
        out.write_bytes(&self.bytes)?;
        out.write_vlong(self.start_ord as u64)?;
        out.write_vlong(self.end_ord as u64)?;
        Ok(())
    }

    fn read<R: Read + ?Sized>(input: &mut R) -> Result<Self> {
        let len = input.read_vint()? as usize;
        let bytes = input.read_bytes_vec(len)?;
        let start_ord = read_ord(input)?;
        let end_ord = read_ord(input)?;
        Ok(Output {
            bytes,
            start_ord,
            end_ord,
        })
    }
}

fn read_ord<R: Read + ?Sized>(input: &mut R) -> Result<i64> {
    let value = input.read_vlong()?;
    i64::try_from(value)
        .map_err(|_| BlockTreeError::corrupt(format!("ordinal {value} out of range")))
}
