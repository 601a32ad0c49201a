use std::collections::BTreeMap;
use std::io::{Seek, SeekFrom};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use crate::error::{BlockTreeError, Result};
use crate::lexical::core::automaton::{AutomatonType, CompiledAutomaton};
use crate::lexical::core::terms::{Terms, TermsEnum};
use crate::lexical::index::blocktree::intersect::IntersectTermsEnum;
use crate::lexical::index::blocktree::output::Output;
use crate::lexical::index::blocktree::segment_enum::SegmentTermsEnum;
use crate::lexical::index::blocktree::stats::Stats;
use crate::lexical::index::blocktree::{
    ReaderOptions, TERMS_CODEC_NAME, TERMS_EXTENSION, TERMS_INDEX_CODEC_NAME,
    TERMS_INDEX_EXTENSION, VERSION_CURRENT, VERSION_START,
};
use crate::lexical::index::field::FieldInfo;
use crate::lexical::index::postings::PostingsReaderBase;
use crate::lexical::index::segment::SegmentReadState;
use crate::storage::{
    DataInput, FOOTER_LENGTH, Storage, StorageInput, check_index_header, checksum_entire_file,
    retrieve_checksum,
};
use crate::util::fst::Fst;

type SharedInput = Arc<Mutex<Box<dyn StorageInput>>>;

/// Reads the block file and index file written by
/// [`BlockTreeTermsWriter`](super::BlockTreeTermsWriter).
///
/// Opening validates both headers and footers and decodes the per-field
/// summaries. Index FSTs are loaded on first use.
pub struct BlockTreeTermsReader {
    segment: String,
    terms_in: SharedInput,
    index_in: SharedInput,
    postings_reader: Arc<dyn PostingsReaderBase>,
    fields: BTreeMap<String, FieldReader>,
}

impl std::fmt::Debug for BlockTreeTermsReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockTreeTermsReader")
            .field("segment", &self.segment)
            .field("fields", &self.fields.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Seek to the trailer that records where the per-field directory starts.
fn seek_dir(input: &mut dyn StorageInput) -> Result<()> {
    let size = input.size()?;
    let trailer = size.checked_sub(FOOTER_LENGTH + 8).ok_or_else(|| {
        BlockTreeError::corrupt(format!("file too short for a directory trailer: {size} bytes"))
    })?;
    input.seek(SeekFrom::Start(trailer))?;
    let dir_offset = input.read_be_u64()?;
    if dir_offset > trailer {
        return Err(BlockTreeError::corrupt(format!(
            "directory offset {dir_offset} past trailer at {trailer}"
        )));
    }
    input.seek(SeekFrom::Start(dir_offset))?;
    Ok(())
}

impl BlockTreeTermsReader {
    pub fn open(
        storage: &dyn Storage,
        state: &SegmentReadState,
        mut postings_reader: Box<dyn PostingsReaderBase>,
        options: ReaderOptions,
    ) -> Result<Self> {
        let terms_name = state.file_name(TERMS_EXTENSION);
        let index_name = state.file_name(TERMS_INDEX_EXTENSION);

        let mut terms_in = storage.open_input(&terms_name)?;
        let version = check_index_header(
            &mut terms_in,
            TERMS_CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &state.segment_id,
            &state.segment_suffix,
        )?;
        let mut index_in = storage.open_input(&index_name)?;
        let index_version = check_index_header(
            &mut index_in,
            TERMS_INDEX_CODEC_NAME,
            VERSION_START,
            VERSION_CURRENT,
            &state.segment_id,
            &state.segment_suffix,
        )?;
        if version != index_version {
            return Err(BlockTreeError::corrupt(format!(
                "mismatched version files: {terms_name}={version},{index_name}={index_version}"
            )));
        }

        postings_reader.init(terms_in.as_mut(), state)?;

        // Validate footer structure up front; full checksums are left to
        // check_integrity.
        retrieve_checksum(index_in.as_mut())?;
        retrieve_checksum(terms_in.as_mut())?;

        seek_dir(terms_in.as_mut())?;
        seek_dir(index_in.as_mut())?;

        let num_fields = terms_in.read_vint()?;
        let mut metas = Vec::with_capacity(num_fields as usize);
        for _ in 0..num_fields {
            let field = terms_in.read_vint()?;
            let num_terms = terms_in.read_vlong()?;
            if num_terms == 0 {
                return Err(BlockTreeError::corrupt(format!(
                    "illegal numTerms for field number: {field}"
                )));
            }
            let root_len = terms_in.read_vint()? as usize;
            let root_code = terms_in.read_bytes_vec(root_len)?;
            let field_info = state.field_infos.field_info(field).cloned().ok_or_else(|| {
                BlockTreeError::corrupt(format!("invalid field number: {field}"))
            })?;
            let sum_doc_freq_or_ttf = terms_in.read_vlong()?;
            let (sum_total_term_freq, sum_doc_freq) = if field_info.has_freqs() {
                (sum_doc_freq_or_ttf, terms_in.read_vlong()?)
            } else {
                (sum_doc_freq_or_ttf, sum_doc_freq_or_ttf)
            };
            let doc_count = terms_in.read_vint()?;
            let min_term = terms_in.read_len_prefixed()?;
            let max_term = terms_in.read_len_prefixed()?;

            if doc_count > state.max_doc {
                return Err(BlockTreeError::corrupt(format!(
                    "invalid docCount: {doc_count} maxDoc: {}",
                    state.max_doc
                )));
            }
            if sum_doc_freq < u64::from(doc_count) {
                return Err(BlockTreeError::corrupt(format!(
                    "invalid sumDocFreq: {sum_doc_freq} docCount: {doc_count}"
                )));
            }
            if sum_total_term_freq < sum_doc_freq {
                return Err(BlockTreeError::corrupt(format!(
                    "invalid sumTotalTermFreq: {sum_total_term_freq} sumDocFreq: {sum_doc_freq}"
                )));
            }
            if min_term > max_term {
                return Err(BlockTreeError::corrupt(format!(
                    "min term greater than max term for field {}",
                    field_info.name
                )));
            }
            let index_start_fp = index_in.read_vlong()?;
            metas.push(FieldMeta {
                field_info,
                num_terms,
                root_code,
                sum_total_term_freq,
                sum_doc_freq,
                doc_count,
                min_term,
                max_term,
                index_start_fp,
            });
        }

        let terms_in: SharedInput = Arc::new(Mutex::new(terms_in));
        let index_in: SharedInput = Arc::new(Mutex::new(index_in));
        let postings_reader: Arc<dyn PostingsReaderBase> = Arc::from(postings_reader);

        let mut fields = BTreeMap::new();
        for meta in metas {
            let name = meta.field_info.name.clone();
            let reader = FieldReader::new(
                meta,
                &state.segment_name,
                terms_in.clone(),
                options.load_terms_index.then(|| index_in.clone()),
                postings_reader.clone(),
            )?;
            if fields.insert(name.clone(), reader).is_some() {
                return Err(BlockTreeError::corrupt(format!("duplicate field: {name}")));
            }
        }

        debug!(
            "opened terms dictionary {terms_name} (version {version}, {} fields, index {})",
            fields.len(),
            if options.load_terms_index { "loaded" } else { "skipped" }
        );

        Ok(BlockTreeTermsReader {
            segment: state.segment_name.clone(),
            terms_in,
            index_in,
            postings_reader,
            fields,
        })
    }

    /// The terms of `field`, or `None` if the field has no terms in this segment.
    pub fn terms(&self, field: &str) -> Option<&FieldReader> {
        self.fields.get(field)
    }

    /// Names of the fields with terms, in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn segment(&self) -> &str {
        &self.segment
    }

    /// Verify the checksums of both files and of the postings.
    pub fn check_integrity(&self) -> Result<()> {
        checksum_entire_file(&**self.terms_in.lock())?;
        checksum_entire_file(&**self.index_in.lock())?;
        self.postings_reader.check_integrity()
    }
}

struct FieldMeta {
    field_info: Arc<FieldInfo>,
    num_terms: u64,
    root_code: Vec<u8>,
    sum_total_term_freq: u64,
    sum_doc_freq: u64,
    doc_count: u32,
    min_term: Vec<u8>,
    max_term: Vec<u8>,
    index_start_fp: u64,
}

/// The terms of one field.
pub struct FieldReader {
    pub(crate) field_info: Arc<FieldInfo>,
    segment: String,
    num_terms: u64,
    pub(crate) root_code: Output,
    root_block_fp: u64,
    sum_total_term_freq: u64,
    sum_doc_freq: u64,
    doc_count: u32,
    min_term: Vec<u8>,
    max_term: Vec<u8>,
    index_start_fp: u64,
    terms_in: SharedInput,
    index_in: Option<SharedInput>,
    index: Mutex<Option<Arc<Fst<Output>>>>,
    pub(crate) postings_reader: Arc<dyn PostingsReaderBase>,
}

impl std::fmt::Debug for FieldReader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FieldReader")
            .field("field", &self.field_info.name)
            .field("num_terms", &self.num_terms)
            .field("root_block_fp", &self.root_block_fp)
            .field("index_start_fp", &self.index_start_fp)
            .field("has_index", &self.index_in.is_some())
            .finish()
    }
}

impl FieldReader {
    fn new(
        meta: FieldMeta,
        segment: &str,
        terms_in: SharedInput,
        index_in: Option<SharedInput>,
        postings_reader: Arc<dyn PostingsReaderBase>,
    ) -> Result<Self> {
        let mut code = meta.root_code.as_slice();
        let root_block_fp = code.read_vlong()? >> super::OUTPUT_FLAGS_NUM_BITS;
        let end_ord = i64::try_from(meta.num_terms - 1)
            .map_err(|_| BlockTreeError::corrupt(format!("numTerms {} too large", meta.num_terms)))?;
        let root_code = Output::new(meta.root_code, 0, i64::MAX - end_ord);
        Ok(FieldReader {
            field_info: meta.field_info,
            segment: segment.to_string(),
            num_terms: meta.num_terms,
            root_code,
            root_block_fp,
            sum_total_term_freq: meta.sum_total_term_freq,
            sum_doc_freq: meta.sum_doc_freq,
            doc_count: meta.doc_count,
            min_term: meta.min_term,
            max_term: meta.max_term,
            index_start_fp: meta.index_start_fp,
            terms_in,
            index_in,
            index: Mutex::new(None),
            postings_reader,
        })
    }

    pub fn field_info(&self) -> &FieldInfo {
        &self.field_info
    }

    pub fn root_block_fp(&self) -> u64 {
        self.root_block_fp
    }

    pub fn has_index(&self) -> bool {
        self.index_in.is_some()
    }

    /// A private handle on the block file.
    pub(crate) fn terms_input(&self) -> Result<Box<dyn StorageInput>> {
        self.terms_in.lock().clone_input()
    }

    /// The index FST, loading it on first call. `None` when the reader was
    /// opened without the terms index.
    pub(crate) fn index(&self) -> Result<Option<Arc<Fst<Output>>>> {
        let Some(index_in) = &self.index_in else {
            return Ok(None);
        };
        let mut index = self.index.lock();
        if let Some(fst) = index.as_ref() {
            return Ok(Some(fst.clone()));
        }
        let mut input = index_in.lock().clone_input()?;
        input.seek(SeekFrom::Start(self.index_start_fp))?;
        let fst = Arc::new(Fst::load(&mut input)?);
        debug!(
            "loaded terms index of field {} ({} bytes)",
            self.field_info.name,
            fst.num_bytes()
        );
        *index = Some(fst.clone());
        Ok(Some(fst))
    }

    /// Walk every block of the field and collect block statistics.
    pub fn stats(&self) -> Result<Stats> {
        let mut stats = Stats::new(&self.segment, &self.field_info.name);
        if let Some(index) = self.index()? {
            stats.index_num_bytes = index.num_bytes() as u64;
        }
        SegmentTermsEnum::new(self)?.compute_block_stats(&mut stats)?;
        Ok(stats)
    }

    /// A seekable enumerator over every term of the field.
    pub fn segment_terms(&self) -> Result<SegmentTermsEnum<'_>> {
        SegmentTermsEnum::new(self)
    }
}

impl Terms for FieldReader {
    fn iterator(&self) -> Result<Box<dyn TermsEnum + '_>> {
        Ok(Box::new(SegmentTermsEnum::new(self)?))
    }

    fn intersect<'a>(
        &'a self,
        compiled: &'a CompiledAutomaton,
        start_term: Option<&[u8]>,
    ) -> Result<Box<dyn TermsEnum + 'a>> {
        if compiled.kind() != AutomatonType::Normal {
            return Err(BlockTreeError::illegal_argument(
                "please use CompiledAutomaton::terms_enum instead",
            ));
        }
        Ok(Box::new(IntersectTermsEnum::new(self, compiled, start_term)?))
    }

    fn size(&self) -> u64 {
        self.num_terms
    }

    fn sum_doc_freq(&self) -> u64 {
        self.sum_doc_freq
    }

    fn sum_total_term_freq(&self) -> u64 {
        self.sum_total_term_freq
    }

    fn doc_count(&self) -> u32 {
        self.doc_count
    }

    fn has_freqs(&self) -> bool {
        self.field_info.has_freqs()
    }

    fn min_term(&self) -> &[u8] {
        &self.min_term
    }

    fn max_term(&self) -> &[u8] {
        &self.max_term
    }
}
