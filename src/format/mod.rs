//! Binary layout of the encrypted postings file
//!
//! All integers are big-endian; byte strings are `{u32 length}{bytes}`.
//!
//! ```text
//! "Collection" u32 version u8[16] salt u32 fieldCount* u64 fieldsTableOffset*
//! per field:
//!   "Field" str name u8 indexOptions
//!     u32 termCount* u32 docCount* u64 sumDocFreq* u64 sumTotalTermFreq*
//!     u64 termsTableOffset*
//!   per term: sealed postings span
//!   sealed term table: "Terms" u32 count { "Term" str term u32 docFreq
//!     u64 totalTermFreq u64 postingsOffset }
//! "Fields" u32 count { str name u64 fieldHeaderOffset }
//! ```
//! `*` marks backpatched values.

mod headers;
mod io;
mod records;

pub use headers::*;
pub use io::*;
pub use records::*;
