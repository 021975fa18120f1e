use std::io::{Seek, SeekFrom, Write};
use std::mem;

use tracing::debug;

use super::SealedStorage;
use crate::cipher::{CipherSuite, SegmentSalt};
use crate::config::DEFAULT_SPAN_CHUNK_SIZE;
use crate::error::{Result, SealdexError};
use crate::format::DataOutput;
use crate::keys::DerivedKey;

/// Length of the ciphertext length prefix
pub const SPAN_LENGTH_PREFIX: u64 = 8;

/// Forward-only sink that can seal spans.
///
/// Outside a span, writes pass straight through to the underlying sink.
/// Inside a span, writes land in a chunked in-memory buffer and nothing
/// reaches the sink until [`end_seal`](SealedStorage::end_seal).
pub struct SealedSpanWriter<W: Write + Seek> {
    inner: W,
    inner_pos: u64,
    inner_end: u64,
    suite: CipherSuite,
    salt: SegmentSalt,
    chunk_size: usize,
    state: SealState,
}

enum SealState {
    Idle,
    Sealing(ActiveSeal),
    Poisoned,
}

struct ActiveSeal {
    key: DerivedKey,
    length_prefix_at: u64,
    span_start: u64,
    chunks: Vec<Vec<u8>>,
    chunk: usize,
    offset: usize,
    len: usize,
}

impl ActiveSeal {
    fn buffer_pos(&self, chunk_size: usize) -> usize {
        self.chunk * chunk_size + self.offset
    }

    fn write(&mut self, mut buf: &[u8], chunk_size: usize) {
        while !buf.is_empty() {
            if self.chunk == self.chunks.len() {
                self.chunks.push(vec![0u8; chunk_size]);
            }
            let n = (chunk_size - self.offset).min(buf.len());
            self.chunks[self.chunk][self.offset..self.offset + n].copy_from_slice(&buf[..n]);
            self.offset += n;
            buf = &buf[n..];
            if self.offset == chunk_size {
                self.chunk += 1;
                self.offset = 0;
            }
        }
        self.len = self.len.max(self.buffer_pos(chunk_size));
    }

    fn seek(&mut self, pos: u64, chunk_size: usize) -> Result<()> {
        let end = self.span_start + self.len as u64;
        if pos < self.span_start || pos > end {
            return Err(SealdexError::OutOfRange {
                pos,
                start: self.span_start,
                end,
            });
        }
        // at the end of a full chunk this addresses a chunk not yet
        // allocated; the next write allocates it
        let rel = (pos - self.span_start) as usize;
        self.chunk = rel / chunk_size;
        self.offset = rel % chunk_size;
        Ok(())
    }

    fn plaintext(self) -> (DerivedKey, Vec<u8>) {
        let mut plain = Vec::with_capacity(self.len);
        for chunk in &self.chunks {
            plain.extend_from_slice(chunk);
        }
        plain.truncate(self.len);
        (self.key, plain)
    }
}

impl<W: Write + Seek> SealedSpanWriter<W> {
    pub fn new(inner: W, suite: CipherSuite, salt: SegmentSalt) -> Self {
        Self::with_chunk_size(inner, suite, salt, DEFAULT_SPAN_CHUNK_SIZE)
    }

    pub fn with_chunk_size(
        inner: W,
        suite: CipherSuite,
        salt: SegmentSalt,
        chunk_size: usize,
    ) -> Self {
        Self {
            inner,
            inner_pos: 0,
            inner_end: 0,
            suite,
            salt,
            chunk_size: chunk_size.max(1),
            state: SealState::Idle,
        }
    }

    pub fn suite(&self) -> CipherSuite {
        self.suite
    }

    pub fn salt(&self) -> &SegmentSalt {
        &self.salt
    }

    pub fn is_poisoned(&self) -> bool {
        matches!(self.state, SealState::Poisoned)
    }

    /// Flush and hand back the underlying sink
    pub fn finish(mut self) -> Result<W> {
        match self.state {
            SealState::Idle => {}
            SealState::Sealing(_) => {
                return Err(SealdexError::InvalidState(
                    "finish called inside an open sealed span".to_string(),
                ))
            }
            SealState::Poisoned => return Err(poisoned()),
        }
        self.inner.flush()?;
        Ok(self.inner)
    }

    fn write_through(&mut self, buf: &[u8]) -> Result<()> {
        if let Err(e) = self.inner.write_all(buf) {
            self.state = SealState::Poisoned;
            return Err(e.into());
        }
        self.inner_pos += buf.len() as u64;
        self.inner_end = self.inner_end.max(self.inner_pos);
        Ok(())
    }

    fn seek_through(&mut self, pos: u64) -> Result<()> {
        if let Err(e) = self.inner.seek(SeekFrom::Start(pos)) {
            self.state = SealState::Poisoned;
            return Err(e.into());
        }
        self.inner_pos = pos;
        Ok(())
    }

    fn flush_seal(&mut self, seal: ActiveSeal) -> Result<u64> {
        let length_prefix_at = seal.length_prefix_at;
        let span_start = seal.span_start;
        let (key, plaintext) = seal.plaintext();
        let plaintext_len = plaintext.len();

        let ciphertext = self.suite.seal_span(&key, &self.salt, span_start, plaintext)?;
        let expected = self.suite.ciphertext_len(plaintext_len);
        if ciphertext.len() != expected {
            return Err(SealdexError::CipherFailure(format!(
                "{} produced {} ciphertext bytes for {} plaintext bytes, expected {}",
                self.suite.id(),
                ciphertext.len(),
                plaintext_len,
                expected
            )));
        }

        let ciphertext_len = ciphertext.len() as u64;
        self.seek_through(length_prefix_at)?;
        self.write_through(&ciphertext_len.to_be_bytes())?;
        self.write_through(&ciphertext)?;

        debug!(
            offset = length_prefix_at,
            plaintext_len, ciphertext_len, "sealed span"
        );
        Ok(ciphertext_len)
    }
}

fn poisoned() -> SealdexError {
    SealdexError::InvalidState("writer is poisoned by an earlier failure".to_string())
}

impl<W: Write + Seek> DataOutput for SealedSpanWriter<W> {
    fn write_bytes(&mut self, buf: &[u8]) -> Result<()> {
        let chunk_size = self.chunk_size;
        match &mut self.state {
            SealState::Idle => self.write_through(buf),
            SealState::Sealing(seal) => {
                seal.write(buf, chunk_size);
                Ok(())
            }
            SealState::Poisoned => Err(poisoned()),
        }
    }

    fn position(&self) -> u64 {
        match &self.state {
            SealState::Sealing(seal) => {
                seal.span_start + seal.buffer_pos(self.chunk_size) as u64
            }
            SealState::Idle | SealState::Poisoned => self.inner_pos,
        }
    }
}

impl<W: Write + Seek> SealedStorage for SealedSpanWriter<W> {
    fn begin_seal(&mut self, key: DerivedKey) -> Result<()> {
        match self.state {
            SealState::Idle => {}
            SealState::Sealing(_) => {
                return Err(SealdexError::InvalidState(
                    "sealed spans do not nest".to_string(),
                ))
            }
            SealState::Poisoned => return Err(poisoned()),
        }
        if self.inner_pos != self.inner_end {
            return Err(SealdexError::InvalidState(format!(
                "sealed span must start at end of output ({}), not {}",
                self.inner_end, self.inner_pos
            )));
        }

        let length_prefix_at = self.inner_pos;
        self.write_through(&[0u8; SPAN_LENGTH_PREFIX as usize])?;
        self.state = SealState::Sealing(ActiveSeal {
            key,
            length_prefix_at,
            span_start: self.inner_pos,
            chunks: Vec::new(),
            chunk: 0,
            offset: 0,
            len: 0,
        });
        Ok(())
    }

    fn end_seal(&mut self) -> Result<u64> {
        let seal = match mem::replace(&mut self.state, SealState::Poisoned) {
            SealState::Sealing(seal) => seal,
            SealState::Idle => {
                self.state = SealState::Idle;
                return Err(SealdexError::InvalidState(
                    "end_seal without an open sealed span".to_string(),
                ));
            }
            SealState::Poisoned => return Err(poisoned()),
        };

        // stays poisoned unless the whole span reached the sink
        let ciphertext_len = self.flush_seal(seal)?;
        self.state = SealState::Idle;
        Ok(ciphertext_len)
    }

    fn seek(&mut self, pos: u64) -> Result<()> {
        let chunk_size = self.chunk_size;
        match &mut self.state {
            SealState::Sealing(seal) => seal.seek(pos, chunk_size),
            SealState::Idle => {
                if pos > self.inner_end {
                    return Err(SealdexError::OutOfRange {
                        pos,
                        start: 0,
                        end: self.inner_end,
                    });
                }
                self.seek_through(pos)
            }
            SealState::Poisoned => Err(poisoned()),
        }
    }

    fn is_sealing(&self) -> bool {
        matches!(self.state, SealState::Sealing(_))
    }
}
