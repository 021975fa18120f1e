//! Writer for encrypted postings files
//!
//! Fields are written one at a time. Each term's postings go into their own
//! sealed span; the field's term table is sealed under the field key after
//! the last term. Header values only known at the end are backpatched.

use std::fs::File;
use std::io::{BufWriter, Seek, Write};
use std::path::Path;
use std::sync::Arc;

use roaring::RoaringBitmap;
use tracing::{debug, info};

use super::field_info::FieldInfo;
use super::types::{DocNo, TermMeta, TermStats};
use crate::cipher::SegmentSalt;
use crate::config::CodecSettings;
use crate::error::{Result, SealdexError};
use crate::format::{
    backpatch, write_doc_record, write_position, CollectionHeader, CollectionStats, DataOutput,
    FieldHeader, FieldStats, FieldsTable, Placeholder, Position, TermHeader, TermTable,
};
use crate::keys::{DerivedKey, KeyScope, KeyStore};
use crate::policy::{EncryptedFieldSet, EncryptionPolicy};
use crate::sealed::{SealedSpanWriter, SealedStorage};

/// Writes the encrypted fields of one segment
pub struct FieldsWriter<W: Write + Seek> {
    out: SealedSpanWriter<W>,
    keys: Arc<KeyStore>,
    policy: Arc<dyn EncryptionPolicy>,
    settings: CodecSettings,
    header: Placeholder<CollectionStats>,
    fields: Vec<(String, u64)>,
}

impl FieldsWriter<BufWriter<File>> {
    /// Create a postings file at `path`
    pub fn create<P: AsRef<Path>>(path: P, keys: Arc<KeyStore>, settings: CodecSettings) -> Result<Self> {
        let file = File::create(path.as_ref())?;
        debug!(path = %path.as_ref().display(), "creating encrypted postings file");
        Self::new(BufWriter::new(file), keys, settings)
    }
}

impl<W: Write + Seek> FieldsWriter<W> {
    pub fn new(sink: W, keys: Arc<KeyStore>, settings: CodecSettings) -> Result<Self> {
        let policy = Arc::new(EncryptedFieldSet::from_settings(&settings));
        Self::with_policy(sink, keys, settings, policy)
    }

    pub fn with_policy(
        sink: W,
        keys: Arc<KeyStore>,
        settings: CodecSettings,
        policy: Arc<dyn EncryptionPolicy>,
    ) -> Result<Self> {
        settings.validate()?;
        let salt = SegmentSalt::random();
        let mut out = SealedSpanWriter::with_chunk_size(
            sink,
            settings.cipher_suite,
            salt,
            settings.span_chunk_size,
        );
        let header = CollectionHeader::write_placeholder(&mut out, &salt)?;
        Ok(Self {
            out,
            keys,
            policy,
            settings,
            header,
            fields: Vec::new(),
        })
    }

    /// Start writing a field.
    ///
    /// Fails before anything is written when the field is not configured for
    /// encryption or its key is unavailable; the segment stays writable.
    pub fn add_field(&mut self, info: &FieldInfo) -> Result<FieldWriter<'_, W>> {
        let name = info.name.as_str();
        if !self.policy.is_encrypted(name) {
            return Err(SealdexError::InvalidInput(format!(
                "field '{}' is not configured for encryption",
                name
            )));
        }
        if self.fields.iter().any(|(f, _)| f == name) {
            return Err(SealdexError::InvalidInput(format!(
                "field '{}' already written",
                name
            )));
        }
        if self.out.is_sealing() {
            return Err(SealdexError::InvalidState(
                "previous field was not finished".to_string(),
            ));
        }
        let key = self
            .keys
            .require(&KeyScope::field(name))
            .map_err(|e| e.in_field(name))?;

        let header_offset = self.out.position();
        let stats = FieldHeader::write_placeholder(&mut self.out, name, info.index_options)
            .map_err(|e| e.in_field(name))?;

        Ok(FieldWriter {
            parent: self,
            info: info.clone(),
            key,
            header_offset,
            stats,
            terms: Vec::new(),
            docs: RoaringBitmap::new(),
            sum_doc_freq: 0,
            sum_total_term_freq: 0,
            term: None,
        })
    }

    /// Salt mixed into the IV of every span in this segment
    pub fn salt(&self) -> &SegmentSalt {
        self.out.salt()
    }

    /// Names of the fields finished so far
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    /// Write the fields table and complete the collection header
    pub fn finish(mut self) -> Result<W> {
        let fields_table_offset = self.out.position();
        FieldsTable::write(&mut self.out, &self.fields)?;
        let stats = CollectionStats {
            field_count: self.fields.len() as u32,
            fields_table_offset,
        };
        backpatch(&mut self.out, self.header, &stats)?;
        info!(fields = self.fields.len(), "encrypted postings written");
        self.out.finish()
    }
}

struct TermState {
    term: Vec<u8>,
    postings_offset: u64,
    doc_freq: u32,
    total_term_freq: u64,
    last_doc: Option<DocNo>,
    /// Merged into the field's docs once the term is accepted
    docs: RoaringBitmap,
    doc: Option<DocState>,
}

struct DocState {
    doc: DocNo,
    freq: u32,
    positions: u32,
    last_position: u32,
    last_start_offset: u32,
    next: Option<Placeholder<u64>>,
}

/// Writes the terms of one field. Must be closed with [`finish`](Self::finish).
pub struct FieldWriter<'a, W: Write + Seek> {
    parent: &'a mut FieldsWriter<W>,
    info: FieldInfo,
    key: DerivedKey,
    header_offset: u64,
    stats: Placeholder<FieldStats>,
    terms: Vec<TermHeader>,
    docs: RoaringBitmap,
    sum_doc_freq: u64,
    sum_total_term_freq: u64,
    term: Option<TermState>,
}

impl<'a, W: Write + Seek> FieldWriter<'a, W> {
    pub fn info(&self) -> &FieldInfo {
        &self.info
    }

    /// Open the next term. Terms must arrive in ascending byte order.
    pub fn start_term(&mut self, term: &[u8]) -> Result<()> {
        let result = self.start_term_inner(term);
        self.in_field(result)
    }

    /// Open a document under the current term, closing the previous one
    pub fn start_doc(&mut self, doc: DocNo, freq: u32) -> Result<()> {
        let result = self.start_doc_inner(doc, freq);
        self.in_field(result)
    }

    /// Append a position to the current document
    pub fn add_position(&mut self, position: &Position) -> Result<()> {
        let result = self.add_position_inner(position);
        self.in_field(result)
    }

    /// Close the current document
    pub fn finish_doc(&mut self) -> Result<()> {
        let result = self.finish_doc_inner();
        self.in_field(result)
    }

    /// Close the current term. `stats` must match the records written.
    pub fn finish_term(&mut self, stats: TermStats) -> Result<TermMeta> {
        let result = self.finish_term_inner(stats);
        self.in_field(result)
    }

    /// Seal the term table and backpatch the field header
    pub fn finish(self) -> Result<FieldStats> {
        let name = self.info.name.clone();
        self.finish_inner().map_err(|e| e.in_field(&name))
    }

    fn in_field<T>(&self, result: Result<T>) -> Result<T> {
        result.map_err(|e| e.in_field(&self.info.name))
    }

    fn start_term_inner(&mut self, term: &[u8]) -> Result<()> {
        if self.term.is_some() {
            return Err(SealdexError::InvalidState(
                "previous term was not finished".to_string(),
            ));
        }
        if let Some(last) = self.terms.last() {
            if term <= last.term.as_slice() {
                return Err(SealdexError::InvalidInput(format!(
                    "term '{}' does not sort after '{}'",
                    term.escape_ascii(),
                    last.term.escape_ascii()
                )));
            }
        }

        let scope = self
            .parent
            .settings
            .key_scope
            .postings_scope(&self.info.name, term);
        let key = match scope {
            KeyScope::Field(_) => self.key.clone(),
            KeyScope::Term(..) => self.parent.keys.require(&scope)?,
        };

        let postings_offset = self.parent.out.position();
        self.parent.out.begin_seal(key)?;
        self.term = Some(TermState {
            term: term.to_vec(),
            postings_offset,
            doc_freq: 0,
            total_term_freq: 0,
            last_doc: None,
            docs: RoaringBitmap::new(),
            doc: None,
        });
        Ok(())
    }

    fn start_doc_inner(&mut self, doc: DocNo, freq: u32) -> Result<()> {
        self.finish_doc_inner()?;
        let options = self.info.index_options;
        let term = self
            .term
            .as_mut()
            .ok_or_else(|| SealdexError::InvalidState("start_doc outside a term".to_string()))?;

        if let Some(last) = term.last_doc {
            if doc <= last {
                return Err(SealdexError::InvalidInput(format!(
                    "{} does not follow {}",
                    doc, last
                )));
            }
        }
        let freq = if options.has_freqs() { freq } else { 1 };
        if freq == 0 {
            return Err(SealdexError::InvalidInput(format!("{} has zero frequency", doc)));
        }

        let next = write_doc_record(&mut self.parent.out, options, doc, freq)?;
        term.last_doc = Some(doc);
        term.doc = Some(DocState {
            doc,
            freq,
            positions: 0,
            last_position: 0,
            last_start_offset: 0,
            next,
        });
        Ok(())
    }

    fn add_position_inner(&mut self, position: &Position) -> Result<()> {
        let options = self.info.index_options;
        if !options.has_positions() {
            return Err(SealdexError::InvalidInput(
                "positions are not indexed for this field".to_string(),
            ));
        }
        let doc = self
            .term
            .as_mut()
            .and_then(|t| t.doc.as_mut())
            .ok_or_else(|| SealdexError::InvalidState("add_position outside a document".to_string()))?;

        if doc.positions == doc.freq {
            return Err(SealdexError::InvalidInput(format!(
                "{} declared {} positions",
                doc.doc, doc.freq
            )));
        }
        if doc.positions > 0 && position.position < doc.last_position {
            return Err(SealdexError::InvalidInput(format!(
                "position {} goes backwards from {}",
                position.position, doc.last_position
            )));
        }
        if options.has_offsets() {
            let (start, end) = position.offsets.ok_or_else(|| {
                SealdexError::InvalidInput("offsets are indexed but missing".to_string())
            })?;
            if end < start {
                return Err(SealdexError::InvalidInput(format!(
                    "end offset {} before start offset {}",
                    end, start
                )));
            }
            if start < doc.last_start_offset {
                return Err(SealdexError::InvalidInput(format!(
                    "start offset {} goes backwards from {}",
                    start, doc.last_start_offset
                )));
            }
            doc.last_start_offset = start;
        }

        write_position(&mut self.parent.out, options, position)?;
        doc.positions += 1;
        doc.last_position = position.position;
        Ok(())
    }

    fn finish_doc_inner(&mut self) -> Result<()> {
        let options = self.info.index_options;
        let Some(term) = self.term.as_mut() else {
            return Ok(());
        };
        let Some(doc) = term.doc.take() else {
            return Ok(());
        };

        if options.has_positions() && doc.positions != doc.freq {
            return Err(SealdexError::InvalidInput(format!(
                "{} has {} positions but frequency {}",
                doc.doc, doc.positions, doc.freq
            )));
        }
        if let Some(next) = doc.next {
            let here = self.parent.out.position();
            backpatch(&mut self.parent.out, next, &here)?;
        }

        term.doc_freq += 1;
        term.total_term_freq += doc.freq as u64;
        term.docs.insert(doc.doc.as_u32());
        Ok(())
    }

    fn finish_term_inner(&mut self, stats: TermStats) -> Result<TermMeta> {
        self.finish_doc_inner()?;
        let term = self
            .term
            .take()
            .ok_or_else(|| SealdexError::InvalidState("finish_term outside a term".to_string()))?;
        self.parent.out.end_seal()?;

        if stats.doc_freq != term.doc_freq || stats.total_term_freq != term.total_term_freq {
            return Err(SealdexError::InvalidInput(format!(
                "term '{}' declared docFreq={} totalTermFreq={} but wrote {} and {}",
                term.term.escape_ascii(),
                stats.doc_freq,
                stats.total_term_freq,
                term.doc_freq,
                term.total_term_freq
            )));
        }

        let meta = TermMeta {
            postings_offset: term.postings_offset,
            doc_freq: term.doc_freq,
            total_term_freq: term.total_term_freq,
        };
        self.sum_doc_freq += term.doc_freq as u64;
        self.sum_total_term_freq += term.total_term_freq;
        self.docs |= &term.docs;
        self.terms.push(TermHeader {
            term: term.term,
            doc_freq: meta.doc_freq,
            total_term_freq: meta.total_term_freq,
            postings_offset: meta.postings_offset,
        });
        Ok(meta)
    }

    fn finish_inner(mut self) -> Result<FieldStats> {
        if self.term.is_some() {
            return Err(SealdexError::InvalidState(
                "field finished inside an open term".to_string(),
            ));
        }
        let out = &mut self.parent.out;

        let terms_table_offset = out.position();
        out.begin_seal(self.key.clone())?;
        TermTable::write(out, &self.terms)?;
        out.end_seal()?;

        let stats = FieldStats {
            term_count: self.terms.len() as u32,
            doc_count: self.docs.len() as u32,
            sum_doc_freq: self.sum_doc_freq,
            sum_total_term_freq: self.sum_total_term_freq,
            terms_table_offset,
        };
        backpatch(out, self.stats, &stats)?;
        self.parent
            .fields
            .push((self.info.name.clone(), self.header_offset));

        info!(
            field = %self.info.name,
            terms = stats.term_count,
            docs = stats.doc_count,
            "field sealed"
        );
        Ok(stats)
    }
}
