//! Variable-length integer encoding utilities.
//!
//! Integers are written 7 bits per byte, least significant group first, with
//! the high bit of each byte set when more bytes follow. Every length, count
//! and file-pointer delta in the term dictionary files uses this encoding.

use std::io::{Read, Write};

use byteorder::ReadBytesExt;

use crate::error::{BlockTreeError, Result};

/// Maximum encoded length of a u32.
pub const MAX_VINT_LEN: usize = 5;

/// Maximum encoded length of a u64.
pub const MAX_VLONG_LEN: usize = 10;

/// Append the variable-length encoding of `value` to `out`.
pub fn encode_u64_into(value: u64, out: &mut Vec<u8>) -> usize {
    let mut val = value;
    let mut written = 0;
    loop {
        let byte = (val & 0x7F) as u8;
        val >>= 7;
        written += 1;
        if val == 0 {
            out.push(byte);
            return written;
        }
        out.push(byte | 0x80);
    }
}

/// Encode a u32 value using variable-length encoding.
pub fn encode_u32(value: u32) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VINT_LEN);
    encode_u64_into(value as u64, &mut bytes);
    bytes
}

/// Encode a u64 value using variable-length encoding.
pub fn encode_u64(value: u64) -> Vec<u8> {
    let mut bytes = Vec::with_capacity(MAX_VLONG_LEN);
    encode_u64_into(value, &mut bytes);
    bytes
}

/// Number of bytes the encoding of `value` occupies.
pub fn encoded_len(value: u64) -> usize {
    let bits = 64 - value.leading_zeros() as usize;
    bits.div_ceil(7).max(1)
}

fn decode_bounded(bytes: &[u8], max_bits: u32) -> Result<(u64, usize)> {
    let mut result = 0u64;
    let mut shift = 0u32;

    for (i, &byte) in bytes.iter().enumerate() {
        if shift >= max_bits {
            return Err(BlockTreeError::corrupt("VarInt overflow"));
        }
        result |= ((byte & 0x7F) as u64) << shift;
        if (byte & 0x80) == 0 {
            return Ok((result, i + 1));
        }
        shift += 7;
    }

    Err(BlockTreeError::corrupt("Incomplete VarInt"))
}

/// Decode a u32 value from variable-length encoding.
pub fn decode_u32(bytes: &[u8]) -> Result<(u32, usize)> {
    let (value, n) = decode_bounded(bytes, 32)?;
    let value =
        u32::try_from(value).map_err(|_| BlockTreeError::corrupt("VarInt overflow"))?;
    Ok((value, n))
}

/// Decode a u64 value from variable-length encoding.
pub fn decode_u64(bytes: &[u8]) -> Result<(u64, usize)> {
    decode_bounded(bytes, 64)
}

fn read_bounded<R: Read + ?Sized>(reader: &mut R, max_bits: u32) -> Result<u64> {
    let mut result = 0u64;
    let mut shift = 0u32;

    loop {
        let byte = reader.read_u8()?;
        if shift >= max_bits {
            return Err(BlockTreeError::corrupt("VarInt overflow"));
        }
        result |= ((byte & 0x7F) as u64) << shift;
        if (byte & 0x80) == 0 {
            return Ok(result);
        }
        shift += 7;
    }
}

/// Write a variable-length encoded u32 to a writer.
pub fn write_u32<W: Write + ?Sized>(writer: &mut W, value: u32) -> Result<usize> {
    write_u64(writer, value as u64)
}

/// Read a variable-length encoded u32 from a reader.
pub fn read_u32<R: Read + ?Sized>(reader: &mut R) -> Result<u32> {
    let value = read_bounded(reader, 32)?;
    u32::try_from(value).map_err(|_| BlockTreeError::corrupt("VarInt overflow"))
}

/// Write a variable-length encoded u64 to a writer.
pub fn write_u64<W: Write + ?Sized>(writer: &mut W, value: u64) -> Result<usize> {
    let mut buf = [0u8; MAX_VLONG_LEN];
    let mut val = value;
    let mut len = 0;
    loop {
        let byte = (val & 0x7F) as u8;
        val >>= 7;
        if val == 0 {
            buf[len] = byte;
            len += 1;
            break;
        }
        buf[len] = byte | 0x80;
        len += 1;
    }
    writer.write_all(&buf[..len])?;
    Ok(len)
}

/// Read a variable-length encoded u64 from a reader.
pub fn read_u64<R: Read + ?Sized>(reader: &mut R) -> Result<u64> {
    read_bounded(reader, 64)
}

/// A trait for types that can be encoded as variable-length integers.
pub trait VarInt: Sized {
    /// Encode this value as a variable-length integer.
    fn encode_varint(&self) -> Vec<u8>;

    /// Decode a variable-length integer from bytes.
    fn decode_varint(bytes: &[u8]) -> Result<(Self, usize)>;

    /// Write this value as a variable-length integer to a writer.
    fn write_varint<W: Write>(&self, writer: &mut W) -> Result<usize>;

    /// Read a variable-length integer from a reader.
    fn read_varint<R: Read>(reader: &mut R) -> Result<Self>;
}

impl VarInt for u32 {
    fn encode_varint(&self) -> Vec<u8> {
        encode_u32(*self)
    }

    fn decode_varint(bytes: &[u8]) -> Result<(Self, usize)> {
        decode_u32(bytes)
    }

    fn write_varint<W: Write>(&self, writer: &mut W) -> Result<usize> {
        write_u32(writer, *self)
    }

    fn read_varint<R: Read>(reader: &mut R) -> Result<Self> {
        read_u32(reader)
    }
}

impl VarInt for u64 {
    fn encode_varint(&self) -> Vec<u8> {
        encode_u64(*self)
    }

    fn decode_varint(bytes: &[u8]) -> Result<(Self, usize)> {
        decode_u64(bytes)
    }

    fn write_varint<W: Write>(&self, writer: &mut W) -> Result<usize> {
        write_u64(writer, *self)
    }

    fn read_varint<R: Read>(reader: &mut R) -> Result<Self> {
        read_u64(reader)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn test_encode_decode_boundaries() {
        let test_values = [0u64, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX];

        for &value in &test_values {
            let encoded = encode_u64(value);
            let (decoded, bytes_read) = decode_u64(&encoded).unwrap();

            assert_eq!(value, decoded);
            assert_eq!(encoded.len(), bytes_read);
            assert_eq!(encoded_len(value), encoded.len());
        }
    }

    #[test]
    fn test_write_read_stream() {
        let mut buffer = Vec::new();
        write_u32(&mut buffer, 300).unwrap();
        write_u64(&mut buffer, i64::MAX as u64).unwrap();
        write_u32(&mut buffer, 0).unwrap();

        let mut cursor = Cursor::new(buffer);
        assert_eq!(read_u32(&mut cursor).unwrap(), 300);
        assert_eq!(read_u64(&mut cursor).unwrap(), i64::MAX as u64);
        assert_eq!(read_u32(&mut cursor).unwrap(), 0);
        assert!(read_u32(&mut cursor).is_err());
    }

    #[test]
    fn test_varint_trait_write_read() {
        let mut buffer = Vec::new();
        let value = 98765u32;

        let bytes_written = value.write_varint(&mut buffer).unwrap();
        assert_eq!(bytes_written, buffer.len());

        let mut cursor = Cursor::new(buffer);
        let decoded = u32::read_varint(&mut cursor).unwrap();

        assert_eq!(value, decoded);
    }

    #[test]
    fn test_encoding_efficiency() {
        assert_eq!(encode_u32(0).len(), 1);
        assert_eq!(encode_u32(127).len(), 1);
        assert_eq!(encode_u32(128).len(), 2);
        assert_eq!(encode_u32(16384).len(), 3);
        assert_eq!(encode_u32(u32::MAX).len(), MAX_VINT_LEN);
        assert_eq!(encode_u64(u64::MAX).len(), MAX_VLONG_LEN);
    }

    #[test]
    fn test_incomplete_varint() {
        let incomplete = vec![0x80];
        let err = decode_u32(&incomplete).unwrap_err();
        assert!(err.is_corruption());
        assert!(decode_u64(&incomplete).is_err());
    }

    #[test]
    fn test_overflow() {
        let overflow_data = vec![0xFF; 10];
        assert!(decode_u32(&overflow_data).is_err());

        // Five bytes but a value beyond u32::MAX.
        let too_big = encode_u64(u32::MAX as u64 + 1);
        assert!(decode_u32(&too_big).is_err());
    }
}
