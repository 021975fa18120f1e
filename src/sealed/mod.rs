//! Sealed spans: length-prefixed, atomically encrypted byte ranges
//!
//! The writer buffers a whole span in memory and emits
//! `{u64 ciphertextLen}{ciphertext}` only when the span is closed. The reader
//! decrypts a whole span at once and serves bounded random access over the
//! plaintext.

mod reader;
mod writer;

pub use reader::*;
pub use writer::*;

use crate::error::Result;
use crate::format::DataOutput;
use crate::keys::DerivedKey;

/// Positioned sink that can seal spans and rewrite earlier bytes
pub trait SealedStorage: DataOutput {
    /// Start buffering a span encrypted under `key`
    fn begin_seal(&mut self, key: DerivedKey) -> Result<()>;

    /// Encrypt the buffered span and splice it into the sink.
    /// Returns the ciphertext length.
    fn end_seal(&mut self) -> Result<u64>;

    /// Move to an absolute logical position already written
    fn seek(&mut self, pos: u64) -> Result<()>;

    fn is_sealing(&self) -> bool;
}
