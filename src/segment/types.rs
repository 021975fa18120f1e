//! Core types for encrypted segments

use serde::{Deserialize, Serialize};
use std::fmt;

/// Dense document number within a segment (0..max_doc)
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct DocNo(pub u32);

impl DocNo {
    pub const MAX: DocNo = DocNo(u32::MAX);

    pub fn new(n: u32) -> Self {
        Self(n)
    }

    pub fn as_u32(self) -> u32 {
        self.0
    }

    pub fn as_usize(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for DocNo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "doc_{}", self.0)
    }
}

/// Where a term's postings live and how many there are
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TermMeta {
    /// Offset of the length prefix of the postings span
    pub postings_offset: u64,
    pub doc_freq: u32,
    pub total_term_freq: u64,
}

/// Statistics a caller declares when closing a term
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TermStats {
    pub doc_freq: u32,
    pub total_term_freq: u64,
}

impl TermStats {
    pub fn new(doc_freq: u32, total_term_freq: u64) -> Self {
        Self {
            doc_freq,
            total_term_freq,
        }
    }
}

/// A term and its metadata
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermEntry {
    pub term: Vec<u8>,
    pub meta: TermMeta,
}

impl TermEntry {
    pub fn new(term: impl Into<Vec<u8>>, meta: TermMeta) -> Self {
        Self {
            term: term.into(),
            meta,
        }
    }

    /// Term as UTF-8 if it is valid UTF-8
    pub fn term_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.term).ok()
    }
}

/// Outcome of a ceiling seek
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SeekStatus {
    /// The target term exists
    Found(TermEntry),
    /// The target is absent; carries the smallest term greater than it
    NotFound(TermEntry),
    /// Every term is smaller than the target
    End,
}

impl SeekStatus {
    pub fn entry(&self) -> Option<&TermEntry> {
        match self {
            SeekStatus::Found(e) | SeekStatus::NotFound(e) => Some(e),
            SeekStatus::End => None,
        }
    }

    pub fn is_found(&self) -> bool {
        matches!(self, SeekStatus::Found(_))
    }
}
