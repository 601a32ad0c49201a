//! Segment identity and the state handed to per-segment writers and readers.

use std::io::{Read, Write};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::Result;
use crate::lexical::index::field::FieldInfos;
use crate::storage::{ID_LENGTH, Storage};

/// Extension of the segment info file.
pub const SEGMENT_INFO_EXTENSION: &str = "si";

/// Build `<segment>[_<suffix>][.<ext>]`.
pub fn segment_file_name(segment: &str, suffix: &str, ext: &str) -> String {
    let mut name = String::from(segment);
    if !suffix.is_empty() {
        name.push('_');
        name.push_str(suffix);
    }
    if !ext.is_empty() {
        name.push('.');
        name.push_str(ext);
    }
    name
}

/// A new random segment id.
pub fn random_id() -> [u8; ID_LENGTH] {
    Uuid::new_v4().into_bytes()
}

/// Identity of a segment.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SegmentInfo {
    pub name: String,
    pub id: [u8; ID_LENGTH],
    pub max_doc: u32,
}

impl SegmentInfo {
    pub fn new(name: impl Into<String>, max_doc: u32) -> Self {
        SegmentInfo {
            name: name.into(),
            id: random_id(),
            max_doc,
        }
    }

    /// Persist as `<name>.si`.
    pub fn write(&self, storage: &dyn Storage) -> Result<()> {
        let json = serde_json::to_vec_pretty(self)?;
        let mut output =
            storage.create_output(&segment_file_name(&self.name, "", SEGMENT_INFO_EXTENSION))?;
        output.write_all(&json)?;
        output.flush_and_sync()?;
        output.close()
    }

    pub fn read(storage: &dyn Storage, name: &str) -> Result<Self> {
        let mut input = storage.open_input(&segment_file_name(name, "", SEGMENT_INFO_EXTENSION))?;
        let mut json = Vec::new();
        input.read_to_end(&mut json)?;
        Ok(serde_json::from_slice(&json)?)
    }
}

/// Everything a per-segment writer needs to name and stamp its files.
#[derive(Debug, Clone)]
pub struct SegmentWriteState {
    pub segment_name: String,
    pub segment_suffix: String,
    pub segment_id: [u8; ID_LENGTH],
    pub max_doc: u32,
    pub field_infos: Arc<FieldInfos>,
}

impl SegmentWriteState {
    pub fn new(info: &SegmentInfo, field_infos: Arc<FieldInfos>) -> Self {
        SegmentWriteState {
            segment_name: info.name.clone(),
            segment_suffix: String::new(),
            segment_id: info.id,
            max_doc: info.max_doc,
            field_infos,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.segment_suffix = suffix.into();
        self
    }

    pub fn file_name(&self, ext: &str) -> String {
        segment_file_name(&self.segment_name, &self.segment_suffix, ext)
    }
}

/// Everything a per-segment reader needs to locate and verify its files.
#[derive(Debug, Clone)]
pub struct SegmentReadState {
    pub segment_name: String,
    pub segment_suffix: String,
    pub segment_id: [u8; ID_LENGTH],
    pub max_doc: u32,
    pub field_infos: Arc<FieldInfos>,
}

impl SegmentReadState {
    pub fn new(info: &SegmentInfo, field_infos: Arc<FieldInfos>) -> Self {
        SegmentReadState {
            segment_name: info.name.clone(),
            segment_suffix: String::new(),
            segment_id: info.id,
            max_doc: info.max_doc,
            field_infos,
        }
    }

    pub fn with_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.segment_suffix = suffix.into();
        self
    }

    pub fn file_name(&self, ext: &str) -> String {
        segment_file_name(&self.segment_name, &self.segment_suffix, ext)
    }
}
