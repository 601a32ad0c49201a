//! Byte-level data input and output.
//!
//! [`DataInput`] and [`DataOutput`] extend any `Read`/`Write` with the
//! primitive encodings used by the term dictionary files: single bytes,
//! variable-length ints and longs, big-endian fixed-width integers and
//! length-prefixed byte strings.

use std::io::{self, Read, Write};

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};

use crate::error::{BlockTreeError, Result};
use crate::util::varint;

/// Primitive decoding on top of `Read`.
pub trait DataInput: Read {
    /// Read a single byte.
    fn read_byte(&mut self) -> Result<u8> {
        Ok(self.read_u8()?)
    }

    /// Read a variable-length u32.
    fn read_vint(&mut self) -> Result<u32> {
        varint::read_u32(self)
    }

    /// Read a variable-length u64.
    fn read_vlong(&mut self) -> Result<u64> {
        varint::read_u64(self)
    }

    /// Read a big-endian u32.
    fn read_be_u32(&mut self) -> Result<u32> {
        Ok(self.read_u32::<BigEndian>()?)
    }

    /// Read a big-endian i32.
    fn read_be_i32(&mut self) -> Result<i32> {
        Ok(self.read_i32::<BigEndian>()?)
    }

    /// Read a big-endian u64.
    fn read_be_u64(&mut self) -> Result<u64> {
        Ok(self.read_u64::<BigEndian>()?)
    }

    /// Read exactly `len` bytes into a new vector.
    fn read_bytes_vec(&mut self, len: usize) -> Result<Vec<u8>> {
        let mut bytes = vec![0u8; len];
        self.read_exact(&mut bytes)?;
        Ok(bytes)
    }

    /// Read a vint length followed by that many bytes.
    fn read_len_prefixed(&mut self) -> Result<Vec<u8>> {
        let len = self.read_vint()? as usize;
        self.read_bytes_vec(len)
    }

    /// Read a vint-prefixed UTF-8 string.
    fn read_string(&mut self) -> Result<String> {
        let bytes = self.read_len_prefixed()?;
        String::from_utf8(bytes).map_err(|e| BlockTreeError::corrupt(format!("invalid string: {e}")))
    }
}

impl<R: Read + ?Sized> DataInput for R {}

/// Primitive encoding on top of `Write`.
pub trait DataOutput: Write {
    /// Write a single byte.
    fn write_byte(&mut self, b: u8) -> Result<()> {
        Ok(self.write_u8(b)?)
    }

    /// Write a variable-length u32.
    fn write_vint(&mut self, value: u32) -> Result<()> {
        varint::write_u32(self, value)?;
        Ok(())
    }

    /// Write a variable-length u64.
    fn write_vlong(&mut self, value: u64) -> Result<()> {
        varint::write_u64(self, value)?;
        Ok(())
    }

    /// Write a big-endian u32.
    fn write_be_u32(&mut self, value: u32) -> Result<()> {
        Ok(self.write_u32::<BigEndian>(value)?)
    }

    /// Write a big-endian i32.
    fn write_be_i32(&mut self, value: i32) -> Result<()> {
        Ok(self.write_i32::<BigEndian>(value)?)
    }

    /// Write a big-endian u64.
    fn write_be_u64(&mut self, value: u64) -> Result<()> {
        Ok(self.write_u64::<BigEndian>(value)?)
    }

    /// Write raw bytes.
    fn write_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        Ok(self.write_all(bytes)?)
    }

    /// Write a vint length followed by the bytes.
    fn write_len_prefixed(&mut self, bytes: &[u8]) -> Result<()> {
        let len = u32::try_from(bytes.len())
            .map_err(|_| BlockTreeError::illegal_argument("byte string too long"))?;
        self.write_vint(len)?;
        self.write_bytes(bytes)
    }

    /// Write a vint-prefixed UTF-8 string.
    fn write_string(&mut self, s: &str) -> Result<()> {
        self.write_len_prefixed(s.as_bytes())
    }
}

impl<W: Write + ?Sized> DataOutput for W {}

/// An owned, reusable in-memory input with an explicit read position.
///
/// Frames keep one of these per decoded section (suffixes, stats, metadata)
/// and refill them on every block load, so the allocation is reused.
#[derive(Debug, Default, Clone)]
pub struct ByteArrayInput {
    bytes: Vec<u8>,
    pos: usize,
}

impl ByteArrayInput {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_vec(bytes: Vec<u8>) -> Self {
        ByteArrayInput { bytes, pos: 0 }
    }

    /// Replace the content with `len` bytes read from `reader` and rewind.
    pub fn fill_from<R: Read + ?Sized>(&mut self, reader: &mut R, len: usize) -> Result<()> {
        self.bytes.clear();
        self.bytes.resize(len, 0);
        reader.read_exact(&mut self.bytes)?;
        self.pos = 0;
        Ok(())
    }

    /// Replace the content with a copy of `bytes` and rewind.
    pub fn reset_to(&mut self, bytes: &[u8]) {
        self.bytes.clear();
        self.bytes.extend_from_slice(bytes);
        self.pos = 0;
    }

    pub fn position(&self) -> usize {
        self.pos
    }

    pub fn set_position(&mut self, pos: usize) {
        self.pos = pos;
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn eof(&self) -> bool {
        self.pos >= self.bytes.len()
    }

    pub fn skip(&mut self, n: usize) -> Result<()> {
        if self.pos + n > self.bytes.len() {
            return Err(BlockTreeError::corrupt("read past end of block buffer"));
        }
        self.pos += n;
        Ok(())
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    /// Returns the `len` bytes at the current position and advances past them.
    pub fn read_slice(&mut self, len: usize) -> Result<&[u8]> {
        let start = self.pos;
        self.skip(len)?;
        Ok(&self.bytes[start..start + len])
    }
}

impl Read for ByteArrayInput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.pos >= self.bytes.len() {
            return Ok(0);
        }
        let n = buf.len().min(self.bytes.len() - self.pos);
        buf[..n].copy_from_slice(&self.bytes[self.pos..self.pos + n]);
        self.pos += n;
        Ok(n)
    }
}
