//! Per-field metadata shared by the writer and the reader.

use std::collections::{BTreeMap, HashMap};
use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{BlockTreeError, Result};
use crate::lexical::index::segment::segment_file_name;
use crate::storage::Storage;

/// Extension of the field infos file.
pub const FIELD_INFOS_EXTENSION: &str = "fnm";

/// What is recorded in the postings of a field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOptions {
    /// Not indexed.
    None,
    /// Only document ids.
    Docs,
    /// Document ids and term frequencies.
    DocsAndFreqs,
    /// Document ids, frequencies and positions.
    DocsAndFreqsAndPositions,
}

impl IndexOptions {
    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    pub fn is_indexed(self) -> bool {
        self != IndexOptions::None
    }
}

/// Name, number and indexing options of a field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub number: u32,
    pub index_options: IndexOptions,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, number: u32, index_options: IndexOptions) -> Self {
        FieldInfo {
            name: name.into(),
            number,
            index_options,
        }
    }

    pub fn has_freqs(&self) -> bool {
        self.index_options.has_freqs()
    }
}

/// The fields of a segment, addressable by number and by name.
#[derive(Debug, Clone, Default)]
pub struct FieldInfos {
    by_number: BTreeMap<u32, Arc<FieldInfo>>,
    by_name: HashMap<String, u32>,
}

impl FieldInfos {
    pub fn new(fields: Vec<FieldInfo>) -> Result<Self> {
        let mut infos = FieldInfos::default();
        for field in fields {
            if infos.by_number.contains_key(&field.number) {
                return Err(BlockTreeError::illegal_argument(format!(
                    "duplicate field number {} ({})",
                    field.number, field.name
                )));
            }
            if infos.by_name.contains_key(&field.name) {
                return Err(BlockTreeError::illegal_argument(format!(
                    "duplicate field name {}",
                    field.name
                )));
            }
            infos.by_name.insert(field.name.clone(), field.number);
            infos.by_number.insert(field.number, Arc::new(field));
        }
        Ok(infos)
    }

    pub fn field_info(&self, number: u32) -> Option<&Arc<FieldInfo>> {
        self.by_number.get(&number)
    }

    pub fn field_info_by_name(&self, name: &str) -> Option<&Arc<FieldInfo>> {
        self.by_name
            .get(name)
            .and_then(|number| self.by_number.get(number))
    }

    /// Fields in ascending number order.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<FieldInfo>> {
        self.by_number.values()
    }

    pub fn len(&self) -> usize {
        self.by_number.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_number.is_empty()
    }

    pub fn has_freqs(&self) -> bool {
        self.iter().any(|f| f.has_freqs())
    }

    /// Persist as `<segment>.fnm`.
    pub fn write_json(&self, storage: &dyn Storage, segment: &str) -> Result<()> {
        let fields: Vec<&FieldInfo> = self.iter().map(|f| f.as_ref()).collect();
        let json = serde_json::to_vec_pretty(&fields)?;
        let mut output = storage.create_output(&segment_file_name(segment, "", FIELD_INFOS_EXTENSION))?;
        output.write_all(&json)?;
        output.flush_and_sync()?;
        output.close()
    }

    pub fn read_json(storage: &dyn Storage, segment: &str) -> Result<Self> {
        let mut input = storage.open_input(&segment_file_name(segment, "", FIELD_INFOS_EXTENSION))?;
        let mut json = Vec::new();
        input.read_to_end(&mut json)?;
        let fields: Vec<FieldInfo> = serde_json::from_slice(&json)?;
        Self::new(fields)
    }
}
