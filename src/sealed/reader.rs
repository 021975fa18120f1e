use std::sync::Arc;

use crate::cipher::{CipherSuite, SegmentSalt};
use crate::error::{Result, SealdexError};
use crate::format::{DataInput, SegmentInput};
use crate::keys::DerivedKey;

/// Decrypted sealed span with a bounded cursor.
///
/// Logical positions run over `[start, start + len)` where `start` is the
/// file offset of the first ciphertext byte. Clones share the plaintext and
/// own their position.
#[derive(Clone, Debug)]
pub struct SealedSpan {
    plaintext: Arc<[u8]>,
    start: u64,
    pos: usize,
}

impl SealedSpan {
    /// Read and decrypt the span whose length prefix is at the input's
    /// current position. The input is left just past the span.
    pub fn open(
        input: &mut SegmentInput,
        key: &DerivedKey,
        suite: CipherSuite,
        salt: &SegmentSalt,
    ) -> Result<Self> {
        let length_prefix_at = input.position();
        let ciphertext_len = input.read_u64()?;
        let start = input.position();
        if ciphertext_len > input.remaining() {
            return Err(SealdexError::corruption(
                length_prefix_at,
                format!(
                    "sealed span of {} bytes truncated to {}",
                    ciphertext_len,
                    input.remaining()
                ),
            ));
        }

        let mut ciphertext = vec![0u8; ciphertext_len as usize];
        input.read_into(&mut ciphertext)?;
        let plaintext = suite.open_span(key, salt, start, ciphertext)?;

        Ok(Self {
            plaintext: Arc::from(plaintext),
            start,
            pos: 0,
        })
    }

    /// Open the span whose length prefix is at `offset`
    pub fn open_at(
        input: &SegmentInput,
        offset: u64,
        key: &DerivedKey,
        suite: CipherSuite,
        salt: &SegmentSalt,
    ) -> Result<Self> {
        let mut input = input.clone();
        input.seek(offset)?;
        Self::open(&mut input, key, suite, salt)
    }

    /// Logical offset of the first plaintext byte
    pub fn start(&self) -> u64 {
        self.start
    }

    /// Logical offset one past the last plaintext byte
    pub fn end(&self) -> u64 {
        self.start + self.plaintext.len() as u64
    }

    pub fn len(&self) -> usize {
        self.plaintext.len()
    }

    pub fn is_empty(&self) -> bool {
        self.plaintext.is_empty()
    }

    pub fn seek(&mut self, pos: u64) -> Result<()> {
        if pos < self.start || pos > self.end() {
            return Err(SealdexError::EndOfSpan {
                pos,
                len: 0,
                start: self.start,
                end: self.end(),
            });
        }
        self.pos = (pos - self.start) as usize;
        Ok(())
    }

    /// Heap bytes held by the decrypted buffer
    pub fn ram_bytes_used(&self) -> usize {
        self.plaintext.len()
    }
}

impl DataInput for SealedSpan {
    fn read_into(&mut self, buf: &mut [u8]) -> Result<()> {
        let end = self.pos + buf.len();
        if end > self.plaintext.len() {
            return Err(SealdexError::EndOfSpan {
                pos: self.position(),
                len: buf.len(),
                start: self.start,
                end: self.end(),
            });
        }
        buf.copy_from_slice(&self.plaintext[self.pos..end]);
        self.pos = end;
        Ok(())
    }

    fn position(&self) -> u64 {
        self.start + self.pos as u64
    }

    fn remaining(&self) -> u64 {
        (self.plaintext.len() - self.pos) as u64
    }
}
