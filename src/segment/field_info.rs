//! Field metadata supplied by the host engine

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// What is indexed per posting. Ordered: each option includes the ones before it.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexOptions {
    Docs,
    DocsAndFreqs,
    DocsAndFreqsAndPositions,
    DocsAndFreqsAndPositionsAndOffsets,
}

impl IndexOptions {
    pub fn has_freqs(self) -> bool {
        self >= IndexOptions::DocsAndFreqs
    }

    pub fn has_positions(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositions
    }

    pub fn has_offsets(self) -> bool {
        self >= IndexOptions::DocsAndFreqsAndPositionsAndOffsets
    }

    pub fn to_byte(self) -> u8 {
        match self {
            IndexOptions::Docs => 0,
            IndexOptions::DocsAndFreqs => 1,
            IndexOptions::DocsAndFreqsAndPositions => 2,
            IndexOptions::DocsAndFreqsAndPositionsAndOffsets => 3,
        }
    }

    pub fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(IndexOptions::Docs),
            1 => Some(IndexOptions::DocsAndFreqs),
            2 => Some(IndexOptions::DocsAndFreqsAndPositions),
            3 => Some(IndexOptions::DocsAndFreqsAndPositionsAndOffsets),
            _ => None,
        }
    }
}

/// Per-field metadata
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldInfo {
    pub name: String,
    pub index_options: IndexOptions,
}

impl FieldInfo {
    pub fn new(name: impl Into<String>, index_options: IndexOptions) -> Self {
        Self {
            name: name.into(),
            index_options,
        }
    }
}

/// Source of field metadata, consulted when writing and reading a field
pub trait FieldMetadata: Send + Sync {
    fn field_info(&self, name: &str) -> Option<FieldInfo>;
}

/// Field metadata held in a map
#[derive(Clone, Debug, Default)]
pub struct FieldInfos {
    by_name: HashMap<String, FieldInfo>,
}

impl FieldInfos {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, info: FieldInfo) {
        self.by_name.insert(info.name.clone(), info);
    }

    pub fn with(mut self, name: &str, index_options: IndexOptions) -> Self {
        self.add(FieldInfo::new(name, index_options));
        self
    }

    pub fn len(&self) -> usize {
        self.by_name.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_name.is_empty()
    }
}

impl FieldMetadata for FieldInfos {
    fn field_info(&self, name: &str) -> Option<FieldInfo> {
        self.by_name.get(name).cloned()
    }
}

impl FromIterator<FieldInfo> for FieldInfos {
    fn from_iter<I: IntoIterator<Item = FieldInfo>>(iter: I) -> Self {
        let mut infos = FieldInfos::new();
        for info in iter {
            infos.add(info);
        }
        infos
    }
}
