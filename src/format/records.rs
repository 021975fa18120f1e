//! Per-document records inside a postings span
//!
//! The record shape follows the field's index options:
//! - `Docs`: `{u32 doc}`
//! - `DocsAndFreqs`: `{u32 doc, u32 freq}`
//! - with positions: `{u32 doc, u32 freq, u64 nextOffset}` followed by
//!   `freq` position records `{u32 position, [u32 start, u32 end],
//!   u32 payloadLen, payload}`. `nextOffset` is the logical offset of the
//!   following record.

use super::headers::Placeholder;
use super::io::{DataInput, DataOutput};
use crate::error::Result;
use crate::segment::{DocNo, IndexOptions};

/// Decoded record head
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DocRecord {
    pub doc: DocNo,
    pub freq: u32,
    pub next_offset: Option<u64>,
}

/// One occurrence of a term within a document
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Position {
    pub position: u32,
    pub offsets: Option<(u32, u32)>,
    pub payload: Vec<u8>,
}

impl Position {
    pub fn new(position: u32) -> Self {
        Self {
            position,
            ..Default::default()
        }
    }

    pub fn with_offsets(mut self, start: u32, end: u32) -> Self {
        self.offsets = Some((start, end));
        self
    }

    pub fn with_payload(mut self, payload: impl Into<Vec<u8>>) -> Self {
        self.payload = payload.into();
        self
    }
}

/// Write a record head. With positions indexed the returned placeholder
/// must be backpatched with the offset of the following record.
pub fn write_doc_record<O: DataOutput + ?Sized>(
    out: &mut O,
    options: IndexOptions,
    doc: DocNo,
    freq: u32,
) -> Result<Option<Placeholder<u64>>> {
    out.write_u32(doc.as_u32())?;
    if !options.has_freqs() {
        return Ok(None);
    }
    out.write_u32(freq)?;
    if !options.has_positions() {
        return Ok(None);
    }
    Placeholder::reserve(out).map(Some)
}

pub fn read_doc_record<I: DataInput + ?Sized>(input: &mut I, options: IndexOptions) -> Result<DocRecord> {
    let doc = DocNo::new(input.read_u32()?);
    let freq = if options.has_freqs() { input.read_u32()? } else { 1 };
    let next_offset = if options.has_positions() {
        Some(input.read_u64()?)
    } else {
        None
    };
    Ok(DocRecord {
        doc,
        freq,
        next_offset,
    })
}

pub fn write_position<O: DataOutput + ?Sized>(
    out: &mut O,
    options: IndexOptions,
    position: &Position,
) -> Result<()> {
    out.write_u32(position.position)?;
    if options.has_offsets() {
        let (start, end) = position.offsets.unwrap_or((0, 0));
        out.write_u32(start)?;
        out.write_u32(end)?;
    }
    out.write_byte_string(&position.payload)
}

pub fn read_position<I: DataInput + ?Sized>(input: &mut I, options: IndexOptions) -> Result<Position> {
    let position = input.read_u32()?;
    let offsets = if options.has_offsets() {
        Some((input.read_u32()?, input.read_u32()?))
    } else {
        None
    };
    let payload = input.read_byte_string()?;
    Ok(Position {
        position,
        offsets,
        payload,
    })
}
