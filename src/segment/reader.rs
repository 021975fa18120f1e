//! Reader for encrypted postings files
//!
//! The collection header and fields table are read eagerly at open. A
//! field's term table is decrypted and indexed when its terms are requested.

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, warn};

use super::field_info::{FieldMetadata, IndexOptions};
use super::live_docs::LiveDocs;
use super::postings::{PostingsCursor, PostingsSource};
use super::term_dict::{TermDictionary, TermIndexBuilder};
use super::types::{SeekStatus, TermEntry, TermMeta};
use crate::cipher::{CipherSuite, SegmentSalt};
use crate::config::CodecSettings;
use crate::error::{Result, SealdexError};
use crate::format::{
    CollectionHeader, DataInput, FieldHeader, FieldStats, FieldsTable, SegmentInput, TermTable,
};
use crate::keys::{DerivedKey, KeyScope, KeyScopeMode, KeyStore};
use crate::policy::{EncryptedFieldSet, EncryptionPolicy};
use crate::sealed::SealedSpan;

#[derive(Clone, Debug)]
struct FieldEntry {
    header_offset: u64,
    /// First byte after the field header
    payload_start: u64,
    header: FieldHeader,
}

/// Reads the encrypted fields of one segment
pub struct FieldsReader {
    input: SegmentInput,
    keys: Arc<KeyStore>,
    policy: Arc<dyn EncryptionPolicy>,
    field_infos: Arc<dyn FieldMetadata>,
    settings: CodecSettings,
    salt: SegmentSalt,
    fields: BTreeMap<String, FieldEntry>,
}

impl FieldsReader {
    pub fn open<P: AsRef<Path>>(
        path: P,
        keys: Arc<KeyStore>,
        field_infos: Arc<dyn FieldMetadata>,
        settings: CodecSettings,
    ) -> Result<Self> {
        debug!(path = %path.as_ref().display(), "opening encrypted postings file");
        let input = SegmentInput::open(path)?;
        let policy = Arc::new(EncryptedFieldSet::from_settings(&settings));
        Self::from_input(input, keys, field_infos, settings, policy)
    }

    pub fn from_input(
        input: SegmentInput,
        keys: Arc<KeyStore>,
        field_infos: Arc<dyn FieldMetadata>,
        settings: CodecSettings,
        policy: Arc<dyn EncryptionPolicy>,
    ) -> Result<Self> {
        settings.validate()?;
        let (salt, fields) = read_fields(&input)?;
        debug!(fields = fields.len(), "encrypted fields table loaded");
        Ok(Self {
            input,
            keys,
            policy,
            field_infos,
            settings,
            salt,
            fields,
        })
    }

    /// Salt read from the collection header
    pub fn salt(&self) -> &SegmentSalt {
        &self.salt
    }

    /// Names of the fields present in the file, in sorted order
    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Header statistics; readable without a key
    pub fn field_stats(&self, name: &str) -> Option<FieldStats> {
        self.fields.get(name).map(|f| f.header.stats)
    }

    /// Terms of a field.
    ///
    /// `None` when the field is absent, not configured for encryption, or
    /// its key is unavailable in this process.
    pub fn terms(&self, name: &str) -> Result<Option<FieldTerms>> {
        if !self.policy.is_encrypted(name) {
            debug!(field = name, "field is not encrypted");
            return Ok(None);
        }
        let Some(entry) = self.fields.get(name) else {
            return Ok(None);
        };
        let Some(info) = self.field_infos.field_info(name) else {
            debug!(field = name, "no field metadata");
            return Ok(None);
        };
        if info.index_options != entry.header.index_options {
            return Err(SealdexError::corruption(
                entry.header_offset,
                format!(
                    "written with {:?} but field metadata says {:?}",
                    entry.header.index_options, info.index_options
                ),
            )
            .in_field(name));
        }
        let Some(key) = self.keys.get_or_derive(&KeyScope::field(name)) else {
            warn!(field = name, "no key for encrypted field, treating it as absent");
            return Ok(None);
        };

        self.load_terms(entry, key)
            .map(Some)
            .map_err(|e| e.in_field(name))
    }

    /// Bytes held by the reader itself
    pub fn ram_bytes_used(&self) -> usize {
        self.input.len() as usize
    }

    fn load_terms(&self, entry: &FieldEntry, key: DerivedKey) -> Result<FieldTerms> {
        let stats = entry.header.stats;
        let suite = self.settings.cipher_suite;
        let mut table =
            SealedSpan::open_at(&self.input, stats.terms_table_offset, &key, suite, &self.salt)?;
        let terms = TermTable::read(&mut table)?;
        if table.remaining() != 0 {
            return Err(SealdexError::corruption(
                table.position(),
                format!("{} bytes follow the term table", table.remaining()),
            ));
        }
        if terms.len() as u64 != stats.term_count as u64 {
            return Err(SealdexError::corruption(
                entry.header_offset,
                format!(
                    "header declares {} terms, table holds {}",
                    stats.term_count,
                    terms.len()
                ),
            ));
        }

        let mut builder = TermIndexBuilder::new(self.settings.term_index);
        let mut sum_doc_freq = 0u64;
        let mut sum_total_term_freq = 0u64;
        let mut prev_offset = None;
        for term in &terms {
            let offset = term.postings_offset;
            let in_payload = offset >= entry.payload_start && offset < stats.terms_table_offset;
            if !in_payload || prev_offset.map_or(false, |prev| offset <= prev) {
                return Err(SealdexError::corruption(
                    offset,
                    format!(
                        "postings of '{}' break the forward chain",
                        term.term.escape_ascii()
                    ),
                ));
            }
            prev_offset = Some(offset);

            builder.add(
                &term.term,
                TermMeta {
                    postings_offset: offset,
                    doc_freq: term.doc_freq,
                    total_term_freq: term.total_term_freq,
                },
            )?;
            sum_doc_freq = sum_doc_freq
                .checked_add(term.doc_freq as u64)
                .ok_or_else(|| {
                    SealdexError::corruption(entry.header_offset, "sumDocFreq overflows")
                })?;
            sum_total_term_freq = sum_total_term_freq
                .checked_add(term.total_term_freq)
                .ok_or_else(|| {
                    SealdexError::corruption(entry.header_offset, "sumTotalTermFreq overflows")
                })?;
        }

        if sum_doc_freq != stats.sum_doc_freq || sum_total_term_freq != stats.sum_total_term_freq {
            return Err(SealdexError::corruption(
                entry.header_offset,
                format!(
                    "header declares sumDocFreq={} sumTotalTermFreq={}, terms sum to {} and {}",
                    stats.sum_doc_freq, stats.sum_total_term_freq, sum_doc_freq, sum_total_term_freq
                ),
            ));
        }

        let dict = builder.build()?;
        debug!(
            field = %entry.header.name,
            terms = dict.len(),
            ram = dict.ram_bytes_used(),
            "term index built"
        );
        Ok(FieldTerms {
            name: entry.header.name.clone(),
            index_options: entry.header.index_options,
            stats,
            dict: Arc::from(dict),
            input: self.input.clone(),
            keys: Arc::clone(&self.keys),
            field_key: key,
            suite,
            salt: self.salt,
            key_scope: self.settings.key_scope,
        })
    }
}

fn read_fields(input: &SegmentInput) -> Result<(SegmentSalt, BTreeMap<String, FieldEntry>)> {
    let mut input = input.clone();
    let CollectionHeader { salt, stats: header } = CollectionHeader::read(&mut input)?;
    let first_field = input.position();
    let end = header.fields_table_offset;
    if end < first_field {
        return Err(SealdexError::corruption(
            first_field,
            format!("fields table offset {} points into the header", end),
        ));
    }

    input.seek(end)?;
    let table = FieldsTable::read(&mut input)?;
    if table.len() as u64 != header.field_count as u64 {
        return Err(SealdexError::corruption(
            end,
            format!(
                "header declares {} fields, table holds {}",
                header.field_count,
                table.len()
            ),
        ));
    }

    let mut fields = BTreeMap::new();
    let mut min_offset = first_field;
    for (name, header_offset) in table {
        if header_offset < min_offset || header_offset >= end {
            return Err(SealdexError::corruption(
                header_offset,
                format!("field '{}' breaks the forward chain", name),
            ));
        }
        input.seek(header_offset)?;
        let field = FieldHeader::read(&mut input)?;
        let payload_start = input.position();
        if field.name != name {
            return Err(SealdexError::corruption(
                header_offset,
                format!("fields table names '{}' but header names '{}'", name, field.name),
            ));
        }
        let terms_at = field.stats.terms_table_offset;
        if terms_at < payload_start || terms_at >= end {
            return Err(SealdexError::corruption(
                header_offset,
                format!("term table offset {} outside field payload", terms_at),
            ));
        }
        min_offset = terms_at + 1;
        fields.insert(
            name,
            FieldEntry {
                header_offset,
                payload_start,
                header: field,
            },
        );
    }
    Ok((salt, fields))
}

/// Decrypted term index of one field plus access to its postings.
///
/// Cheap to clone; clones share the term index and file bytes.
#[derive(Clone)]
pub struct FieldTerms {
    name: String,
    index_options: IndexOptions,
    stats: FieldStats,
    dict: Arc<dyn TermDictionary>,
    input: SegmentInput,
    keys: Arc<KeyStore>,
    field_key: DerivedKey,
    suite: CipherSuite,
    salt: SegmentSalt,
    key_scope: KeyScopeMode,
}

impl FieldTerms {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn index_options(&self) -> IndexOptions {
        self.index_options
    }

    pub fn stats(&self) -> FieldStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.dict.len()
    }

    pub fn is_empty(&self) -> bool {
        self.dict.is_empty()
    }

    pub fn get(&self, term: &[u8]) -> Option<TermMeta> {
        self.dict.get(term)
    }

    pub fn seek_ceil(&self, target: &[u8]) -> Result<SeekStatus> {
        self.dict.seek_ceil(target)
    }

    pub fn prefix_search(&self, prefix: &[u8]) -> Result<Vec<TermEntry>> {
        self.dict.prefix_search(prefix)
    }

    /// Enumerate terms in ascending order
    pub fn iter(&self) -> TermsEnum<'_> {
        TermsEnum {
            terms: self,
            current: None,
            done: false,
        }
    }

    /// Postings of `term`, `None` if the term is absent or undecryptable
    pub fn postings_for(
        &self,
        term: &[u8],
        live_docs: Option<Arc<dyn LiveDocs>>,
    ) -> Result<Option<PostingsCursor>> {
        match self.dict.get(term) {
            Some(meta) => self.postings(&TermEntry::new(term, meta), live_docs),
            None => Ok(None),
        }
    }

    pub fn ram_bytes_used(&self) -> usize {
        self.dict.ram_bytes_used()
    }

    fn postings_key(&self, term: &[u8]) -> Option<DerivedKey> {
        match self.key_scope.postings_scope(&self.name, term) {
            KeyScope::Field(_) => Some(self.field_key.clone()),
            scope @ KeyScope::Term(..) => self.keys.get_or_derive(&scope),
        }
    }
}

impl PostingsSource for FieldTerms {
    fn postings(
        &self,
        term: &TermEntry,
        live_docs: Option<Arc<dyn LiveDocs>>,
    ) -> Result<Option<PostingsCursor>> {
        let Some(key) = self.postings_key(&term.term) else {
            warn!(
                field = %self.name,
                term_len = term.term.len(),
                "no key for term postings, treating them as absent"
            );
            return Ok(None);
        };
        let offset = term.meta.postings_offset;
        let span = SealedSpan::open_at(&self.input, offset, &key, self.suite, &self.salt)
            .map_err(|e| e.in_field(&self.name))?;
        Ok(Some(PostingsCursor::new(
            span,
            self.index_options,
            term.meta.doc_freq,
            live_docs,
        )))
    }
}

/// Cursor over the terms of a field
pub struct TermsEnum<'a> {
    terms: &'a FieldTerms,
    current: Option<TermEntry>,
    done: bool,
}

impl<'a> TermsEnum<'a> {
    /// Move to the next term in order
    pub fn next_term(&mut self) -> Result<Option<&TermEntry>> {
        if self.done {
            return Ok(None);
        }
        let next = self
            .terms
            .dict
            .next_after(self.current.as_ref().map(|e| e.term.as_slice()))?;
        self.done = next.is_none();
        self.current = next;
        Ok(self.current.as_ref())
    }

    /// Position on `term` if it exists
    pub fn seek_exact(&mut self, term: &[u8]) -> bool {
        match self.terms.dict.get(term) {
            Some(meta) => {
                self.current = Some(TermEntry::new(term, meta));
                self.done = false;
                true
            }
            None => false,
        }
    }

    /// Position on the smallest term >= `target`
    pub fn seek_ceil(&mut self, target: &[u8]) -> Result<SeekStatus> {
        let status = self.terms.dict.seek_ceil(target)?;
        self.current = status.entry().cloned();
        self.done = self.current.is_none();
        Ok(status)
    }

    pub fn term(&self) -> Option<&TermEntry> {
        self.current.as_ref()
    }

    /// Postings of the current term
    pub fn postings(&self, live_docs: Option<Arc<dyn LiveDocs>>) -> Result<Option<PostingsCursor>> {
        match &self.current {
            Some(entry) => self.terms.postings(entry, live_docs),
            None => Err(SealdexError::InvalidState(
                "terms enum is not positioned".to_string(),
            )),
        }
    }
}

impl<'a> Iterator for TermsEnum<'a> {
    type Item = Result<TermEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let next = self.next_term().map(|entry| entry.cloned());
        match next {
            Ok(Some(entry)) => Some(Ok(entry)),
            Ok(None) => None,
            Err(e) => {
                self.done = true;
                Some(Err(e))
            }
        }
    }
}
