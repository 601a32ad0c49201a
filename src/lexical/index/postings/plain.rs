//! A straightforward postings format: delta-coded doc ids with inline
//! frequencies in a single `.pdoc` file.

use std::io::{Seek, SeekFrom};

use bit_vec::BitVec;
use log::debug;
use parking_lot::Mutex;

use crate::error::{BlockTreeError, Result};
use crate::lexical::index::field::FieldInfo;
use crate::lexical::index::postings::{
    BlockTermState, Impact, NO_MORE_DOCS, Posting, PostingsEnum, PostingsReaderBase,
    PostingsWriterBase,
};
use crate::lexical::index::segment::{SegmentReadState, SegmentWriteState};
use crate::storage::{
    ByteArrayInput, ChecksumIndexOutput, DataInput, DataOutput, Storage, StorageInput,
    check_index_header, checksum_entire_file, retrieve_checksum, write_footer, write_index_header,
};

pub const DOC_CODEC: &str = "PlainPostingsWriterDoc";
pub const TERMS_CODEC: &str = "PlainPostingsWriterTerms";
pub const VERSION_START: i32 = 1;
pub const VERSION_CURRENT: i32 = VERSION_START;
pub const DOC_EXTENSION: &str = "pdoc";

/// Writes the `.pdoc` file.
#[derive(Debug)]
pub struct PlainPostingsWriter {
    doc_out: Option<ChecksumIndexOutput>,
    max_doc: u32,
    has_freqs: bool,
    last_doc_start_fp: u64,
}

impl PlainPostingsWriter {
    pub fn new(storage: &dyn Storage, state: &SegmentWriteState) -> Result<Self> {
        let name = state.file_name(DOC_EXTENSION);
        let mut doc_out = ChecksumIndexOutput::new(name.clone(), storage.create_output(&name)?);
        write_index_header(
            &mut doc_out,
            DOC_CODEC,
            VERSION_CURRENT,
            &state.segment_id,
            &state.segment_suffix,
        )?;
        Ok(PlainPostingsWriter {
            doc_out: Some(doc_out),
            max_doc: state.max_doc,
            has_freqs: false,
            last_doc_start_fp: 0,
        })
    }

    fn doc_out(&mut self) -> Result<&mut ChecksumIndexOutput> {
        self.doc_out
            .as_mut()
            .ok_or_else(|| BlockTreeError::illegal_state("postings writer is closed"))
    }
}

impl PostingsWriterBase for PlainPostingsWriter {
    fn init(&mut self, terms_out: &mut ChecksumIndexOutput, state: &SegmentWriteState) -> Result<()> {
        write_index_header(
            terms_out,
            TERMS_CODEC,
            VERSION_CURRENT,
            &state.segment_id,
            &state.segment_suffix,
        )
    }

    fn set_field(&mut self, field: &FieldInfo) {
        self.has_freqs = field.has_freqs();
        self.last_doc_start_fp = 0;
    }

    fn write_term(
        &mut self,
        term: &[u8],
        postings: &[Posting],
        docs_seen: &mut BitVec,
    ) -> Result<BlockTermState> {
        if postings.is_empty() {
            return Err(BlockTreeError::illegal_argument(format!(
                "term {:?} has no postings",
                String::from_utf8_lossy(term)
            )));
        }
        let has_freqs = self.has_freqs;
        let max_doc = self.max_doc;
        let out = self.doc_out()?;
        let doc_start_fp = out.file_pointer();

        let mut last_doc: Option<u32> = None;
        let mut total_term_freq = 0u64;
        for posting in postings {
            if posting.doc_id >= max_doc {
                return Err(BlockTreeError::illegal_argument(format!(
                    "doc id {} out of bounds (maxDoc={max_doc})",
                    posting.doc_id
                )));
            }
            if last_doc.is_some_and(|last| posting.doc_id <= last) {
                return Err(BlockTreeError::illegal_argument(format!(
                    "doc ids out of order for term {:?}: {} after {:?}",
                    String::from_utf8_lossy(term),
                    posting.doc_id,
                    last_doc
                )));
            }
            let delta = posting.doc_id - last_doc.unwrap_or(0);
            if has_freqs {
                if posting.frequency == 0 {
                    return Err(BlockTreeError::illegal_argument(format!(
                        "zero frequency in doc {}",
                        posting.doc_id
                    )));
                }
                if delta > u32::MAX >> 1 {
                    return Err(BlockTreeError::illegal_argument(format!(
                        "doc delta {delta} in doc {} cannot be encoded with frequencies",
                        posting.doc_id
                    )));
                }
                if posting.frequency == 1 {
                    out.write_vint((delta << 1) | 1)?;
                } else {
                    out.write_vint(delta << 1)?;
                    out.write_vint(posting.frequency)?;
                }
                total_term_freq += u64::from(posting.frequency);
            } else {
                out.write_vint(delta)?;
            }
            docs_seen.set(posting.doc_id as usize, true);
            last_doc = Some(posting.doc_id);
        }

        let doc_freq = postings.len() as u32;
        Ok(BlockTermState {
            doc_freq,
            total_term_freq: if has_freqs {
                total_term_freq
            } else {
                u64::from(doc_freq)
            },
            term_block_ord: 0,
            doc_start_fp,
        })
    }

    fn encode_term(
        &mut self,
        out: &mut Vec<u8>,
        _field: &FieldInfo,
        state: &BlockTermState,
        absolute: bool,
    ) -> Result<()> {
        if absolute {
            self.last_doc_start_fp = 0;
        }
        out.write_vlong(state.doc_start_fp - self.last_doc_start_fp)?;
        self.last_doc_start_fp = state.doc_start_fp;
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        if let Some(mut out) = self.doc_out.take() {
            write_footer(&mut out)?;
            out.close()?;
        }
        Ok(())
    }
}

/// Reads the `.pdoc` file.
#[derive(Debug)]
pub struct PlainPostingsReader {
    doc_in: Mutex<Box<dyn StorageInput>>,
    version: i32,
}

impl PlainPostingsReader {
    pub fn open(storage: &dyn Storage, state: &SegmentReadState) -> Result<Self> {
        let name = state.file_name(DOC_EXTENSION);
        let mut doc_in = storage.open_input(&name)?;
        let version = check_index_header(
            &mut doc_in,
            DOC_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            &state.segment_id,
            &state.segment_suffix,
        )?;
        retrieve_checksum(doc_in.as_mut())?;
        debug!("opened postings file {name} (version {version})");
        Ok(PlainPostingsReader {
            doc_in: Mutex::new(doc_in),
            version,
        })
    }
}

impl PostingsReaderBase for PlainPostingsReader {
    fn init(&mut self, terms_in: &mut dyn StorageInput, state: &SegmentReadState) -> Result<()> {
        let version = check_index_header(
            terms_in,
            TERMS_CODEC,
            VERSION_START,
            VERSION_CURRENT,
            &state.segment_id,
            &state.segment_suffix,
        )?;
        if version != self.version {
            return Err(BlockTreeError::corrupt(format!(
                "postings version mismatch: terms={version} docs={}",
                self.version
            )));
        }
        Ok(())
    }

    fn decode_term(
        &self,
        input: &mut ByteArrayInput,
        _field: &FieldInfo,
        state: &mut BlockTermState,
        absolute: bool,
    ) -> Result<()> {
        if absolute {
            state.doc_start_fp = 0;
        }
        state.doc_start_fp += input.read_vlong()?;
        Ok(())
    }

    fn postings(&self, field: &FieldInfo, state: &BlockTermState) -> Result<Box<dyn PostingsEnum>> {
        let mut input = self.doc_in.lock().clone_input()?;
        input.seek(SeekFrom::Start(state.doc_start_fp))?;

        let count = state.doc_freq as usize;
        let mut docs = Vec::with_capacity(count);
        let mut freqs = Vec::with_capacity(count);
        let mut doc = 0u32;
        for _ in 0..count {
            let code = input.read_vint()?;
            let freq = if field.has_freqs() {
                doc += code >> 1;
                if code & 1 != 0 { 1 } else { input.read_vint()? }
            } else {
                doc += code;
                1
            };
            docs.push(doc);
            freqs.push(freq);
        }
        Ok(Box::new(PlainPostingsEnum::new(docs, freqs)))
    }

    fn impacts(&self, field: &FieldInfo, state: &BlockTermState) -> Result<Vec<Impact>> {
        let mut postings = self.postings(field, state)?;
        let mut max_freq = 0;
        while postings.next_doc()? != NO_MORE_DOCS {
            max_freq = max_freq.max(postings.freq());
        }
        Ok(vec![Impact {
            freq: max_freq,
            norm: 1,
        }])
    }

    fn check_integrity(&self) -> Result<()> {
        let doc_in = self.doc_in.lock();
        checksum_entire_file(&**doc_in)?;
        Ok(())
    }
}

/// Postings decoded into memory.
#[derive(Debug)]
pub struct PlainPostingsEnum {
    docs: Vec<u32>,
    freqs: Vec<u32>,
    upto: Option<usize>,
}

impl PlainPostingsEnum {
    fn new(docs: Vec<u32>, freqs: Vec<u32>) -> Self {
        PlainPostingsEnum {
            docs,
            freqs,
            upto: None,
        }
    }
}

impl PostingsEnum for PlainPostingsEnum {
    fn doc_id(&self) -> Option<u32> {
        self.upto
            .map(|i| self.docs.get(i).copied().unwrap_or(NO_MORE_DOCS))
    }

    fn next_doc(&mut self) -> Result<u32> {
        let next = self.upto.map_or(0, |i| (i + 1).min(self.docs.len()));
        self.upto = Some(next);
        Ok(self.docs.get(next).copied().unwrap_or(NO_MORE_DOCS))
    }

    fn advance(&mut self, target: u32) -> Result<u32> {
        let start = self.upto.map_or(0, |i| i + 1).min(self.docs.len());
        let idx = start + self.docs[start..].partition_point(|&d| d < target);
        self.upto = Some(idx);
        Ok(self.docs.get(idx).copied().unwrap_or(NO_MORE_DOCS))
    }

    fn freq(&self) -> u32 {
        self.upto
            .and_then(|i| self.freqs.get(i).copied())
            .unwrap_or(0)
    }

    fn cost(&self) -> u64 {
        self.docs.len() as u64
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::lexical::index::field::{FieldInfos, IndexOptions};
    use crate::lexical::index::segment::SegmentInfo;
    use crate::storage::MemoryStorage;

    fn setup() -> (MemoryStorage, SegmentInfo, Arc<FieldInfos>) {
        let storage = MemoryStorage::new();
        let info = SegmentInfo::new("_0", 100);
        let fields = FieldInfos::new(vec![
            FieldInfo::new("body", 0, IndexOptions::DocsAndFreqs),
            FieldInfo::new("id", 1, IndexOptions::Docs),
        ])
        .unwrap();
        (storage, info, Arc::new(fields))
    }

    #[test]
    fn test_write_and_read_postings() {
        let (storage, info, fields) = setup();
        let write_state = SegmentWriteState::new(&info, fields.clone());
        let body = fields.field_info(0).unwrap().clone();

        let mut writer = PlainPostingsWriter::new(&storage, &write_state).unwrap();
        writer.set_field(&body);
        let mut seen = BitVec::from_elem(100, false);
        let first = writer
            .write_term(
                b"cat",
                &[Posting::with_frequency(3, 2), Posting::new(7), Posting::with_frequency(42, 5)],
                &mut seen,
            )
            .unwrap();
        let second = writer.write_term(b"dog", &[Posting::new(7)], &mut seen).unwrap();
        assert_eq!(first.doc_freq, 3);
        assert_eq!(first.total_term_freq, 8);
        assert_eq!(seen.iter().filter(|b| *b).count(), 3);

        let mut meta = Vec::new();
        writer.encode_term(&mut meta, &body, &first, true).unwrap();
        writer.encode_term(&mut meta, &body, &second, false).unwrap();
        writer.close().unwrap();
        writer.close().unwrap();

        let read_state = SegmentReadState::new(&info, fields.clone());
        let reader = PlainPostingsReader::open(&storage, &read_state).unwrap();
        reader.check_integrity().unwrap();

        let mut input = ByteArrayInput::from_vec(meta);
        let mut state = first.clone();
        state.doc_start_fp = 999;
        reader.decode_term(&mut input, &body, &mut state, true).unwrap();
        assert_eq!(state.doc_start_fp, first.doc_start_fp);

        let mut postings = reader.postings(&body, &state).unwrap();
        assert_eq!(postings.doc_id(), None);
        assert_eq!(postings.next_doc().unwrap(), 3);
        assert_eq!(postings.freq(), 2);
        assert_eq!(postings.advance(10).unwrap(), 42);
        assert_eq!(postings.freq(), 5);
        assert_eq!(postings.next_doc().unwrap(), NO_MORE_DOCS);

        let impacts = reader.impacts(&body, &state).unwrap();
        assert_eq!(impacts, vec![Impact { freq: 5, norm: 1 }]);

        let mut state2 = second.clone();
        reader.decode_term(&mut input, &body, &mut state2, false).unwrap();
        assert_eq!(state2.doc_start_fp, second.doc_start_fp);
    }

    #[test]
    fn test_rejects_bad_postings() {
        let (storage, info, fields) = setup();
        let state = SegmentWriteState::new(&info, fields.clone());
        let mut writer = PlainPostingsWriter::new(&storage, &state).unwrap();
        writer.set_field(fields.field_info(1).unwrap());
        let mut seen = BitVec::from_elem(100, false);

        assert!(writer.write_term(b"a", &[], &mut seen).is_err());
        assert!(writer
            .write_term(b"a", &[Posting::new(5), Posting::new(5)], &mut seen)
            .is_err());
        assert!(writer.write_term(b"a", &[Posting::new(100)], &mut seen).is_err());

        let ok = writer.write_term(b"b", &[Posting::with_frequency(1, 9)], &mut seen).unwrap();
        assert_eq!(ok.total_term_freq, 1);
    }

    #[test]
    fn test_rejects_doc_delta_that_does_not_fit() {
        let (storage, _, fields) = setup();
        let info = SegmentInfo::new("_0", u32::MAX);
        let state = SegmentWriteState::new(&info, fields.clone());
        let mut writer = PlainPostingsWriter::new(&storage, &state).unwrap();
        writer.set_field(fields.field_info(0).unwrap());
        let mut seen = BitVec::from_elem(8, false);

        let err = writer
            .write_term(b"far", &[Posting::new(1 << 31)], &mut seen)
            .unwrap_err();
        assert!(err.is_usage_error());
        assert!(seen.none());
    }
}
