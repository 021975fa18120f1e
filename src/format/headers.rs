//! Collection, field and term headers and their tables
//!
//! Values unknown when a header is written are emitted as zeroed
//! placeholders and filled in later through [`backpatch`].

use std::marker::PhantomData;

use super::io::{DataInput, DataOutput};
use crate::cipher::{SegmentSalt, SALT_LEN};
use crate::error::{Result, SealdexError};
use crate::sealed::SealedStorage;
use crate::segment::IndexOptions;

pub const COLLECTION_PREAMBLE: &[u8] = b"Collection";
pub const FIELD_PREAMBLE: &[u8] = b"Field";
pub const TERMS_PREAMBLE: &[u8] = b"Terms";
pub const TERM_PREAMBLE: &[u8] = b"Term";
pub const FIELDS_PREAMBLE: &[u8] = b"Fields";

/// On-disk format version
pub const FORMAT_VERSION: u32 = 2;

/// Fixed-width value that can be written over a placeholder
pub trait PatchValue {
    fn encode<O: DataOutput + ?Sized>(&self, out: &mut O) -> Result<()>;
}

impl PatchValue for u64 {
    fn encode<O: DataOutput + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_u64(*self)
    }
}

/// Handle to bytes reserved for a value that is not known yet.
///
/// Consumed by [`backpatch`], so each placeholder is filled exactly once.
#[must_use = "a placeholder must be backpatched"]
#[derive(Debug)]
pub struct Placeholder<T> {
    offset: u64,
    _value: PhantomData<T>,
}

impl<T: PatchValue + Default> Placeholder<T> {
    /// Reserve room for a `T` at the current position
    pub fn reserve<O: DataOutput + ?Sized>(out: &mut O) -> Result<Self> {
        let offset = out.position();
        T::default().encode(out)?;
        Ok(Self {
            offset,
            _value: PhantomData,
        })
    }

    pub fn offset(&self) -> u64 {
        self.offset
    }
}

/// Overwrite a placeholder and return to the current position
pub fn backpatch<S, T>(out: &mut S, placeholder: Placeholder<T>, value: &T) -> Result<()>
where
    S: SealedStorage + ?Sized,
    T: PatchValue,
{
    let here = out.position();
    out.seek(placeholder.offset)?;
    value.encode(out)?;
    out.seek(here)
}

/// Backpatched part of the collection header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CollectionStats {
    pub field_count: u32,
    pub fields_table_offset: u64,
}

impl PatchValue for CollectionStats {
    fn encode<O: DataOutput + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_u32(self.field_count)?;
        out.write_u64(self.fields_table_offset)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CollectionHeader {
    /// Mixed into the IV of every CTR span in the segment
    pub salt: SegmentSalt,
    pub stats: CollectionStats,
}

impl CollectionHeader {
    pub fn write_placeholder<O: DataOutput + ?Sized>(
        out: &mut O,
        salt: &SegmentSalt,
    ) -> Result<Placeholder<CollectionStats>> {
        out.write_preamble(COLLECTION_PREAMBLE)?;
        out.write_u32(FORMAT_VERSION)?;
        out.write_bytes(salt.as_bytes())?;
        Placeholder::reserve(out)
    }

    pub fn read<I: DataInput + ?Sized>(input: &mut I) -> Result<Self> {
        input.expect_preamble(COLLECTION_PREAMBLE)?;
        let at = input.position();
        let version = input.read_u32()?;
        if version != FORMAT_VERSION {
            return Err(SealdexError::corruption(
                at,
                format!("unsupported format version {}", version),
            ));
        }
        let mut salt = [0u8; SALT_LEN];
        input.read_into(&mut salt)?;
        Ok(Self {
            salt: SegmentSalt::from_bytes(salt),
            stats: CollectionStats {
                field_count: input.read_u32()?,
                fields_table_offset: input.read_u64()?,
            },
        })
    }
}

/// Backpatched statistics of a field header
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FieldStats {
    pub term_count: u32,
    pub doc_count: u32,
    pub sum_doc_freq: u64,
    pub sum_total_term_freq: u64,
    pub terms_table_offset: u64,
}

impl PatchValue for FieldStats {
    fn encode<O: DataOutput + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_u32(self.term_count)?;
        out.write_u32(self.doc_count)?;
        out.write_u64(self.sum_doc_freq)?;
        out.write_u64(self.sum_total_term_freq)?;
        out.write_u64(self.terms_table_offset)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldHeader {
    pub name: String,
    pub index_options: IndexOptions,
    pub stats: FieldStats,
}

impl FieldHeader {
    pub fn write_placeholder<O: DataOutput + ?Sized>(
        out: &mut O,
        name: &str,
        index_options: IndexOptions,
    ) -> Result<Placeholder<FieldStats>> {
        out.write_preamble(FIELD_PREAMBLE)?;
        out.write_byte_string(name.as_bytes())?;
        out.write_u8(index_options.to_byte())?;
        Placeholder::reserve(out)
    }

    pub fn read<I: DataInput + ?Sized>(input: &mut I) -> Result<Self> {
        input.expect_preamble(FIELD_PREAMBLE)?;
        let name = input.read_string()?;
        let at = input.position();
        let options = input.read_u8()?;
        let index_options = IndexOptions::from_byte(options).ok_or_else(|| {
            SealdexError::corruption(at, format!("unknown index options {}", options))
        })?;
        let stats = FieldStats {
            term_count: input.read_u32()?,
            doc_count: input.read_u32()?,
            sum_doc_freq: input.read_u64()?,
            sum_total_term_freq: input.read_u64()?,
            terms_table_offset: input.read_u64()?,
        };
        Ok(Self {
            name,
            index_options,
            stats,
        })
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TermHeader {
    pub term: Vec<u8>,
    pub doc_freq: u32,
    pub total_term_freq: u64,
    /// Offset of the length prefix of the term's postings span
    pub postings_offset: u64,
}

impl TermHeader {
    pub fn write<O: DataOutput + ?Sized>(&self, out: &mut O) -> Result<()> {
        out.write_preamble(TERM_PREAMBLE)?;
        out.write_byte_string(&self.term)?;
        out.write_u32(self.doc_freq)?;
        out.write_u64(self.total_term_freq)?;
        out.write_u64(self.postings_offset)
    }

    pub fn read<I: DataInput + ?Sized>(input: &mut I) -> Result<Self> {
        input.expect_preamble(TERM_PREAMBLE)?;
        Ok(Self {
            term: input.read_byte_string()?,
            doc_freq: input.read_u32()?,
            total_term_freq: input.read_u64()?,
            postings_offset: input.read_u64()?,
        })
    }
}

/// A field's term headers, written after all its postings
pub struct TermTable;

impl TermTable {
    pub fn write<O: DataOutput + ?Sized>(out: &mut O, terms: &[TermHeader]) -> Result<()> {
        out.write_preamble(TERMS_PREAMBLE)?;
        out.write_u32(table_len(terms.len())?)?;
        for term in terms {
            term.write(out)?;
        }
        Ok(())
    }

    pub fn read<I: DataInput + ?Sized>(input: &mut I) -> Result<Vec<TermHeader>> {
        input.expect_preamble(TERMS_PREAMBLE)?;
        let count = input.read_u32()? as usize;
        // each entry takes at least 28 bytes
        let mut terms = Vec::with_capacity(count.min(input.remaining() as usize / 28));
        for _ in 0..count {
            terms.push(TermHeader::read(input)?);
        }
        Ok(terms)
    }
}

/// Name and header offset of every field, written last
pub struct FieldsTable;

impl FieldsTable {
    pub fn write<O: DataOutput + ?Sized>(out: &mut O, fields: &[(String, u64)]) -> Result<()> {
        out.write_preamble(FIELDS_PREAMBLE)?;
        out.write_u32(table_len(fields.len())?)?;
        for (name, offset) in fields {
            out.write_byte_string(name.as_bytes())?;
            out.write_u64(*offset)?;
        }
        Ok(())
    }

    pub fn read<I: DataInput + ?Sized>(input: &mut I) -> Result<Vec<(String, u64)>> {
        input.expect_preamble(FIELDS_PREAMBLE)?;
        let count = input.read_u32()? as usize;
        let mut fields = Vec::with_capacity(count.min(input.remaining() as usize / 12));
        for _ in 0..count {
            let name = input.read_string()?;
            let offset = input.read_u64()?;
            fields.push((name, offset));
        }
        Ok(fields)
    }
}

fn table_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .map_err(|_| SealdexError::InvalidInput(format!("table of {} entries is too large", len)))
}
