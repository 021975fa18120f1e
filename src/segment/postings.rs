//! Postings decoding over a decrypted span
//!
//! Records are decoded one at a time. There is no skip data: `advance`
//! decodes forward until it reaches the target.

use std::fmt;
use std::sync::Arc;

use super::field_info::IndexOptions;
use super::live_docs::LiveDocs;
use super::types::{DocNo, TermEntry};
use crate::error::{Result, SealdexError};
use crate::format::{read_doc_record, read_position, DataInput, DocRecord, Position};
use crate::sealed::SealedSpan;

/// Opens postings for a term of a field
pub trait PostingsSource {
    /// `None` when the postings cannot be decrypted in this process
    fn postings(
        &self,
        term: &TermEntry,
        live_docs: Option<Arc<dyn LiveDocs>>,
    ) -> Result<Option<PostingsCursor>>;
}

/// Sequential cursor over one term's document records.
///
/// Clones share the decrypted span and decode independently.
#[derive(Clone)]
pub struct PostingsCursor {
    span: SealedSpan,
    options: IndexOptions,
    doc_freq: u32,
    decoded: u32,
    current: Option<DocRecord>,
    positions_read: u32,
    live_docs: Option<Arc<dyn LiveDocs>>,
}

impl PostingsCursor {
    pub fn new(
        span: SealedSpan,
        options: IndexOptions,
        doc_freq: u32,
        live_docs: Option<Arc<dyn LiveDocs>>,
    ) -> Self {
        Self {
            span,
            options,
            doc_freq,
            decoded: 0,
            current: None,
            positions_read: 0,
            live_docs,
        }
    }

    /// Decode up to the next live document. `None` once records run out.
    pub fn next_doc(&mut self) -> Result<Option<DocNo>> {
        loop {
            self.skip_to_next_record()?;
            if self.decoded == self.doc_freq {
                self.check_fully_consumed()?;
                self.current = None;
                return Ok(None);
            }

            let at = self.span.position();
            let record = read_doc_record(&mut self.span, self.options)?;
            if let Some(prev) = self.current {
                if record.doc <= prev.doc {
                    return Err(SealdexError::corruption(
                        at,
                        format!("{} does not follow {}", record.doc, prev.doc),
                    ));
                }
            }
            if let Some(next) = record.next_offset {
                if next < self.span.position() || next > self.span.end() {
                    return Err(SealdexError::corruption(
                        at,
                        format!(
                            "next record offset {} outside [{}, {}]",
                            next,
                            self.span.position(),
                            self.span.end()
                        ),
                    ));
                }
            }

            self.decoded += 1;
            self.current = Some(record);
            self.positions_read = 0;

            let live = self
                .live_docs
                .as_ref()
                .map_or(true, |live| live.is_live(record.doc));
            if live {
                return Ok(Some(record.doc));
            }
        }
    }

    /// Decode forward to the first live document >= `target`
    pub fn advance(&mut self, target: DocNo) -> Result<Option<DocNo>> {
        if let Some(current) = self.current {
            if current.doc >= target {
                return Ok(Some(current.doc));
            }
        }
        while let Some(doc) = self.next_doc()? {
            if doc >= target {
                return Ok(Some(doc));
            }
        }
        Ok(None)
    }

    /// Current document, `None` before the first `next_doc` and after exhaustion
    pub fn doc(&self) -> Option<DocNo> {
        self.current.map(|r| r.doc)
    }

    /// Term frequency in the current document; 1 when frequencies are not indexed
    pub fn freq(&self) -> u32 {
        self.current.map_or(0, |r| r.freq)
    }

    /// Decode the next position of the current document
    pub fn next_position(&mut self) -> Result<Position> {
        if !self.options.has_positions() {
            return Err(SealdexError::UnsupportedOperation(
                "positions are not indexed for this field",
            ));
        }
        let record = self.current.ok_or_else(|| {
            SealdexError::InvalidState("next_position without a current document".to_string())
        })?;
        if self.positions_read >= record.freq {
            return Err(SealdexError::InvalidState(format!(
                "all {} positions of {} already read",
                record.freq, record.doc
            )));
        }
        let position = read_position(&mut self.span, self.options)?;
        self.positions_read += 1;
        Ok(position)
    }

    /// Upper bound on the number of documents this cursor yields
    pub fn cost(&self) -> u64 {
        self.doc_freq as u64
    }

    pub fn index_options(&self) -> IndexOptions {
        self.options
    }

    /// Position chained records skip unread positions
    fn skip_to_next_record(&mut self) -> Result<()> {
        if let Some(next) = self.current.and_then(|r| r.next_offset) {
            self.span.seek(next)?;
        }
        Ok(())
    }

    fn check_fully_consumed(&self) -> Result<()> {
        if self.span.remaining() != 0 {
            return Err(SealdexError::corruption(
                self.span.position(),
                format!(
                    "{} bytes follow the {} declared records",
                    self.span.remaining(),
                    self.doc_freq
                ),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for PostingsCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PostingsCursor")
            .field("options", &self.options)
            .field("doc_freq", &self.doc_freq)
            .field("decoded", &self.decoded)
            .field("doc", &self.doc())
            .finish()
    }
}
