//! Encrypted postings segments
//!
//! # Architecture
//!
//! - `FieldsWriter` / `FieldWriter`: write fields, terms and per-document
//!   records, sealing each term's postings under the field (or term) key
//! - `FieldsReader` / `FieldTerms`: open a segment, decrypt a field's term
//!   table into an in-memory term index, open postings cursors
//! - `TermDictionary`: FST term index with ceiling seeks, or a hash map
//!   fallback without them
//! - `PostingsCursor`: sequential record decoding filtered by `LiveDocs`

mod types;
mod field_info;
mod live_docs;
mod term_dict;
mod postings;
mod reader;
mod writer;

pub use types::*;
pub use field_info::*;
pub use live_docs::*;
pub use term_dict::*;
pub use postings::*;
pub use reader::*;
pub use writer::*;
