//! Term dictionary using FST (Finite State Transducer)
//!
//! Built once per field from the decoded term table. The FST maps term bytes
//! to an ordinal into a parallel metadata array. A hash map variant exists as
//! a fallback; it supports exact lookup and iteration but not ceiling seeks.

use std::collections::HashMap;
use std::mem;

use fst::{IntoStreamer, Map, MapBuilder, Streamer};
use serde::{Deserialize, Serialize};

use super::types::{SeekStatus, TermEntry, TermMeta};
use crate::error::{Result, SealdexError};

/// Which term index implementation readers build
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TermIndexKind {
    #[default]
    Fst,
    HashMap,
}

/// Sorted term lookup for one field
pub trait TermDictionary: Send + Sync {
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, term: &[u8]) -> Option<TermMeta>;

    /// Smallest term >= `target`
    fn seek_ceil(&self, target: &[u8]) -> Result<SeekStatus>;

    /// First term after `term`, or the first term when `term` is `None`
    fn next_after(&self, term: Option<&[u8]>) -> Result<Option<TermEntry>>;

    /// All terms starting with `prefix`, in order
    fn prefix_search(&self, prefix: &[u8]) -> Result<Vec<TermEntry>> {
        let mut results = Vec::new();
        let mut current = match self.seek_ceil(prefix)? {
            SeekStatus::Found(e) | SeekStatus::NotFound(e) => Some(e),
            SeekStatus::End => None,
        };
        while let Some(entry) = current {
            if !entry.term.starts_with(prefix) {
                break;
            }
            current = self.next_after(Some(&entry.term))?;
            results.push(entry);
        }
        Ok(results)
    }

    fn ram_bytes_used(&self) -> usize;
}

/// Term dictionary backed by FST
pub struct FstTermIndex {
    /// FST mapping term -> index in metadata array
    fst: Map<Vec<u8>>,
    metadata: Vec<TermMeta>,
}

impl FstTermIndex {
    fn entry(&self, key: &[u8], ord: u64) -> Result<TermEntry> {
        let meta = self.metadata.get(ord as usize).copied().ok_or_else(|| {
            SealdexError::InvalidState(format!(
                "term ordinal {} outside {} entries",
                ord,
                self.metadata.len()
            ))
        })?;
        Ok(TermEntry::new(key.to_vec(), meta))
    }
}

impl TermDictionary for FstTermIndex {
    fn len(&self) -> usize {
        self.metadata.len()
    }

    fn get(&self, term: &[u8]) -> Option<TermMeta> {
        self.fst
            .get(term)
            .and_then(|ord| self.metadata.get(ord as usize).copied())
    }

    fn seek_ceil(&self, target: &[u8]) -> Result<SeekStatus> {
        let mut stream = self.fst.range().ge(target).into_stream();
        match stream.next() {
            Some((key, ord)) if key == target => Ok(SeekStatus::Found(self.entry(key, ord)?)),
            Some((key, ord)) => Ok(SeekStatus::NotFound(self.entry(key, ord)?)),
            None => Ok(SeekStatus::End),
        }
    }

    fn next_after(&self, term: Option<&[u8]>) -> Result<Option<TermEntry>> {
        let mut stream = match term {
            Some(term) => self.fst.range().gt(term).into_stream(),
            None => self.fst.range().into_stream(),
        };
        match stream.next() {
            Some((key, ord)) => Ok(Some(self.entry(key, ord)?)),
            None => Ok(None),
        }
    }

    fn prefix_search(&self, prefix: &[u8]) -> Result<Vec<TermEntry>> {
        let mut results = Vec::new();
        let mut stream = self.fst.range().ge(prefix).into_stream();
        while let Some((key, ord)) = stream.next() {
            if !key.starts_with(prefix) {
                break;
            }
            results.push(self.entry(key, ord)?);
        }
        Ok(results)
    }

    fn ram_bytes_used(&self) -> usize {
        self.fst.as_fst().as_bytes().len() + self.metadata.len() * mem::size_of::<TermMeta>()
    }
}

/// Exact-match term dictionary backed by a hash map
pub struct HashTermIndex {
    ords: HashMap<Vec<u8>, usize>,
    /// Terms in ascending order with their metadata
    entries: Vec<(Vec<u8>, TermMeta)>,
}

impl TermDictionary for HashTermIndex {
    fn len(&self) -> usize {
        self.entries.len()
    }

    fn get(&self, term: &[u8]) -> Option<TermMeta> {
        self.ords.get(term).map(|&ord| self.entries[ord].1)
    }

    fn seek_ceil(&self, _target: &[u8]) -> Result<SeekStatus> {
        Err(SealdexError::UnsupportedOperation(
            "seek_ceil on a hash map term index",
        ))
    }

    fn next_after(&self, term: Option<&[u8]>) -> Result<Option<TermEntry>> {
        let next = match term {
            None => 0,
            Some(term) => match self.ords.get(term) {
                Some(&ord) => ord + 1,
                None => {
                    return Err(SealdexError::UnsupportedOperation(
                        "next_after an absent term on a hash map term index",
                    ))
                }
            },
        };
        Ok(self
            .entries
            .get(next)
            .map(|(term, meta)| TermEntry::new(term.clone(), *meta)))
    }

    fn prefix_search(&self, prefix: &[u8]) -> Result<Vec<TermEntry>> {
        Ok(self
            .entries
            .iter()
            .filter(|(term, _)| term.starts_with(prefix))
            .map(|(term, meta)| TermEntry::new(term.clone(), *meta))
            .collect())
    }

    fn ram_bytes_used(&self) -> usize {
        let term_bytes: usize = self.entries.iter().map(|(t, _)| t.len()).sum();
        // terms are held twice: map keys and ordered entries
        2 * term_bytes
            + self.entries.len()
                * (mem::size_of::<(Vec<u8>, TermMeta)>() + mem::size_of::<(Vec<u8>, usize)>())
    }
}

/// Builds a term dictionary from terms fed in ascending byte order
pub struct TermIndexBuilder {
    kind: TermIndexKind,
    fst: MapBuilder<Vec<u8>>,
    entries: Vec<(Vec<u8>, TermMeta)>,
    last: Option<Vec<u8>>,
}

impl TermIndexBuilder {
    pub fn new(kind: TermIndexKind) -> Self {
        Self {
            kind,
            fst: MapBuilder::memory(),
            entries: Vec::new(),
            last: None,
        }
    }

    /// Add the next term. Terms must be strictly ascending.
    pub fn add(&mut self, term: &[u8], meta: TermMeta) -> Result<()> {
        if let Some(last) = &self.last {
            if term <= last.as_slice() {
                return Err(SealdexError::corruption(
                    meta.postings_offset,
                    format!(
                        "term '{}' does not sort after '{}'",
                        term.escape_ascii(),
                        last.escape_ascii()
                    ),
                ));
            }
        }

        match self.kind {
            TermIndexKind::Fst => {
                let ord = self.entries.len() as u64;
                self.fst
                    .insert(term, ord)
                    .map_err(|e| SealdexError::corruption(meta.postings_offset, e.to_string()))?;
                self.entries.push((Vec::new(), meta));
            }
            TermIndexKind::HashMap => self.entries.push((term.to_vec(), meta)),
        }
        self.last = Some(term.to_vec());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn build(self) -> Result<Box<dyn TermDictionary>> {
        match self.kind {
            TermIndexKind::Fst => {
                let fst_data = self
                    .fst
                    .into_inner()
                    .map_err(|e| SealdexError::InvalidState(format!("fst build failed: {}", e)))?;
                let fst = Map::new(fst_data)
                    .map_err(|e| SealdexError::InvalidState(format!("fst load failed: {}", e)))?;
                let metadata = self.entries.into_iter().map(|(_, meta)| meta).collect();
                Ok(Box::new(FstTermIndex { fst, metadata }))
            }
            TermIndexKind::HashMap => {
                let ords = self
                    .entries
                    .iter()
                    .enumerate()
                    .map(|(ord, (term, _))| (term.clone(), ord))
                    .collect();
                Ok(Box::new(HashTermIndex {
                    ords,
                    entries: self.entries,
                }))
            }
        }
    }
}
