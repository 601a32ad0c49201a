//! Codec headers, checksum footers and checksummed output.
//!
//! Every file starts with an index header:
//!
//! ```text
//! magic (BE u32) | codec name (vint len + bytes) | version (BE i32) | id (16 bytes) | suffix (u8 len + bytes)
//! ```
//!
//! and ends with a 16 byte footer: the inverted magic, the checksum
//! algorithm id (always 0) and the CRC32 of everything before it, widened to
//! a BE u64.

use std::io::{Read, Seek, SeekFrom, Write};

use crate::error::{BlockTreeError, Result};
use crate::storage::data::{DataInput, DataOutput};
use crate::storage::traits::{StorageInput, StorageOutput};

/// Magic number at the start of every header.
pub const CODEC_MAGIC: u32 = 0x3fd7_6c17;

/// Magic number at the start of every footer.
pub const FOOTER_MAGIC: u32 = !CODEC_MAGIC;

/// Length of the checksum footer in bytes.
pub const FOOTER_LENGTH: u64 = 16;

/// Length of a segment id.
pub const ID_LENGTH: usize = 16;

/// An output that tracks its file pointer and a running CRC32.
#[derive(Debug)]
pub struct ChecksumIndexOutput {
    name: String,
    inner: Box<dyn StorageOutput>,
    hasher: crc32fast::Hasher,
    file_pointer: u64,
}

impl ChecksumIndexOutput {
    pub fn new(name: impl Into<String>, inner: Box<dyn StorageOutput>) -> Self {
        ChecksumIndexOutput {
            name: name.into(),
            inner,
            hasher: crc32fast::Hasher::new(),
            file_pointer: 0,
        }
    }

    /// Name of the file being written.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Number of bytes written so far.
    pub fn file_pointer(&self) -> u64 {
        self.file_pointer
    }

    /// CRC32 of all bytes written so far.
    pub fn checksum(&self) -> u64 {
        self.hasher.clone().finalize() as u64
    }

    /// Flush and close the wrapped output.
    pub fn close(&mut self) -> Result<()> {
        self.inner.flush()?;
        self.inner.close()
    }
}

impl Write for ChecksumIndexOutput {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let n = self.inner.write(buf)?;
        self.hasher.update(&buf[..n]);
        self.file_pointer += n as u64;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        self.inner.flush()
    }
}

/// Number of bytes [`write_index_header`] produces.
pub fn index_header_length(codec: &str, suffix: &str) -> u64 {
    (4 + 1 + codec.len() + 4 + ID_LENGTH + 1 + suffix.len()) as u64
}

/// Write an index header.
pub fn write_index_header<W: Write + ?Sized>(
    out: &mut W,
    codec: &str,
    version: i32,
    id: &[u8; ID_LENGTH],
    suffix: &str,
) -> Result<()> {
    if !codec.is_ascii() || codec.len() >= 128 {
        return Err(BlockTreeError::illegal_argument(format!(
            "codec must be simple ASCII, less than 128 characters in length [got {codec}]"
        )));
    }
    if !suffix.is_ascii() || suffix.len() >= 256 {
        return Err(BlockTreeError::illegal_argument(format!(
            "suffix must be simple ASCII, less than 256 characters in length [got {suffix}]"
        )));
    }
    out.write_be_u32(CODEC_MAGIC)?;
    out.write_string(codec)?;
    out.write_be_i32(version)?;
    out.write_bytes(id)?;
    out.write_byte(suffix.len() as u8)?;
    out.write_bytes(suffix.as_bytes())?;
    Ok(())
}

/// Validate an index header and return its version.
pub fn check_index_header<R: Read + ?Sized>(
    input: &mut R,
    codec: &str,
    min_version: i32,
    max_version: i32,
    expected_id: &[u8; ID_LENGTH],
    expected_suffix: &str,
) -> Result<i32> {
    let magic = input.read_be_u32()?;
    if magic != CODEC_MAGIC {
        return Err(BlockTreeError::corrupt(format!(
            "codec header mismatch: actual header={magic:#x} vs expected header={CODEC_MAGIC:#x}"
        )));
    }
    let actual_codec = input.read_string()?;
    if actual_codec != codec {
        return Err(BlockTreeError::corrupt(format!(
            "codec mismatch: actual codec={actual_codec} vs expected codec={codec}"
        )));
    }
    let version = input.read_be_i32()?;
    if version < min_version || version > max_version {
        return Err(BlockTreeError::corrupt(format!(
            "unsupported format version {version} for {codec} (needs {min_version}..={max_version})"
        )));
    }
    let mut id = [0u8; ID_LENGTH];
    input.read_exact(&mut id)?;
    if &id != expected_id {
        return Err(BlockTreeError::corrupt("file mismatch: segment id differs"));
    }
    let suffix_len = input.read_byte()? as usize;
    let suffix = input.read_bytes_vec(suffix_len)?;
    if suffix != expected_suffix.as_bytes() {
        return Err(BlockTreeError::corrupt(format!(
            "file mismatch: expected suffix={expected_suffix}, got={}",
            String::from_utf8_lossy(&suffix)
        )));
    }
    Ok(version)
}

/// Write the checksum footer.
pub fn write_footer(out: &mut ChecksumIndexOutput) -> Result<()> {
    out.write_be_u32(FOOTER_MAGIC)?;
    out.write_be_i32(0)?;
    let checksum = out.checksum();
    out.write_be_u64(checksum)?;
    Ok(())
}

fn read_footer(input: &mut dyn StorageInput) -> Result<u64> {
    let magic = input.read_be_u32()?;
    if magic != FOOTER_MAGIC {
        return Err(BlockTreeError::corrupt(format!(
            "codec footer mismatch: actual footer={magic:#x} vs expected footer={FOOTER_MAGIC:#x}"
        )));
    }
    let algorithm = input.read_be_i32()?;
    if algorithm != 0 {
        return Err(BlockTreeError::corrupt(format!(
            "unknown checksum algorithm: {algorithm}"
        )));
    }
    let checksum = input.read_be_u64()?;
    if checksum & 0xFFFF_FFFF_0000_0000 != 0 {
        return Err(BlockTreeError::corrupt(format!(
            "illegal checksum: {checksum:#x}"
        )));
    }
    Ok(checksum)
}

/// Validate the footer structure and return the stored checksum without
/// reading the whole file.
pub fn retrieve_checksum(input: &mut dyn StorageInput) -> Result<u64> {
    let size = input.size()?;
    if size < FOOTER_LENGTH {
        return Err(BlockTreeError::corrupt(format!(
            "misplaced codec footer (file truncated?): length={size} but footer length={FOOTER_LENGTH}"
        )));
    }
    input.seek(SeekFrom::Start(size - FOOTER_LENGTH))?;
    read_footer(input)
}

/// Read the whole file and verify the stored checksum.
///
/// Works on a clone so the caller's position is untouched.
pub fn checksum_entire_file(input: &dyn StorageInput) -> Result<u64> {
    let mut clone = input.clone_input()?;
    let size = clone.size()?;
    if size < FOOTER_LENGTH {
        return Err(BlockTreeError::corrupt(format!(
            "misplaced codec footer (file truncated?): length={size} but footer length={FOOTER_LENGTH}"
        )));
    }

    clone.seek(SeekFrom::Start(0))?;
    let mut hasher = crc32fast::Hasher::new();
    let mut remaining = size - 8;
    let mut buf = [0u8; 8192];
    while remaining > 0 {
        let chunk = remaining.min(buf.len() as u64) as usize;
        clone.read_exact(&mut buf[..chunk])?;
        hasher.update(&buf[..chunk]);
        remaining -= chunk as u64;
    }
    let actual = hasher.finalize() as u64;

    let stored = retrieve_checksum(clone.as_mut())?;
    if stored != actual {
        return Err(BlockTreeError::corrupt(format!(
            "checksum failed (hardware problem?): expected={stored:#x} actual={actual:#x}"
        )));
    }
    Ok(actual)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::memory::MemoryStorage;
    use crate::storage::traits::Storage;

    const ID: [u8; ID_LENGTH] = [3u8; ID_LENGTH];

    fn write_file(storage: &MemoryStorage, name: &str, body: &[u8]) {
        let mut out = ChecksumIndexOutput::new(name, storage.create_output(name).unwrap());
        write_index_header(&mut out, "TestCodec", 1, &ID, "s").unwrap();
        assert_eq!(out.file_pointer(), index_header_length("TestCodec", "s"));
        out.write_all(body).unwrap();
        write_footer(&mut out).unwrap();
        out.close().unwrap();
    }

    #[test]
    fn test_header_and_footer() {
        let storage = MemoryStorage::new();
        write_file(&storage, "f", b"payload");

        let mut input = storage.open_input("f").unwrap();
        let version = check_index_header(&mut input, "TestCodec", 0, 1, &ID, "s").unwrap();
        assert_eq!(version, 1);

        let stored = retrieve_checksum(input.as_mut()).unwrap();
        assert_eq!(checksum_entire_file(input.as_ref()).unwrap(), stored);
    }

    #[test]
    fn test_header_mismatches() {
        let storage = MemoryStorage::new();
        write_file(&storage, "f", b"payload");

        let mut input = storage.open_input("f").unwrap();
        let err = check_index_header(&mut input, "Other", 0, 1, &ID, "s").unwrap_err();
        assert!(err.is_corruption());

        let mut input = storage.open_input("f").unwrap();
        let err = check_index_header(&mut input, "TestCodec", 2, 3, &ID, "s").unwrap_err();
        assert!(err.is_corruption());

        let mut input = storage.open_input("f").unwrap();
        let err = check_index_header(&mut input, "TestCodec", 0, 1, &[0u8; 16], "s").unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_checksum_detects_damage() {
        let storage = MemoryStorage::new();
        write_file(&storage, "f", b"payload");

        let mut bytes = storage.read_all("f").unwrap();
        let idx = index_header_length("TestCodec", "s") as usize + 2;
        bytes[idx] ^= 0xFF;
        storage.overwrite("f", bytes).unwrap();

        let mut input = storage.open_input("f").unwrap();
        // Footer structure is still valid.
        assert!(retrieve_checksum(input.as_mut()).is_ok());
        let err = checksum_entire_file(input.as_ref()).unwrap_err();
        assert!(err.is_corruption());
    }

    #[test]
    fn test_truncated_file() {
        let storage = MemoryStorage::new();
        let mut out = storage.create_output("short").unwrap();
        out.write_all(b"tiny").unwrap();
        out.close().unwrap();

        let mut input = storage.open_input("short").unwrap();
        assert!(retrieve_checksum(input.as_mut()).unwrap_err().is_corruption());
    }
}
