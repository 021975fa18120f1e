use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::cipher::CipherSuite;
use crate::error::{Result, SealdexError};
use crate::keys::KeyScopeMode;
use crate::segment::TermIndexKind;

/// Default chunk size for buffering sealed spans
pub const DEFAULT_SPAN_CHUNK_SIZE: usize = 4096;

/// Codec settings shared by writers and readers of a segment
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct CodecSettings {
    /// Fields whose postings and stored values are encrypted (case-insensitive)
    pub encrypted_fields: Vec<String>,
    pub cipher_suite: CipherSuite,
    pub key_scope: KeyScopeMode,
    pub term_index: TermIndexKind,
    /// Append-only diagnostic log of key material, disabled when `None`
    pub key_log_path: Option<PathBuf>,
    pub span_chunk_size: usize,
}

impl Default for CodecSettings {
    fn default() -> Self {
        Self {
            encrypted_fields: Vec::new(),
            cipher_suite: CipherSuite::default(),
            key_scope: KeyScopeMode::default(),
            term_index: TermIndexKind::default(),
            key_log_path: None,
            span_chunk_size: DEFAULT_SPAN_CHUNK_SIZE,
        }
    }
}

impl CodecSettings {
    /// Create settings that encrypt the given fields
    pub fn new<I, S>(encrypted_fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            encrypted_fields: encrypted_fields.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Load settings from a JSON document
    pub fn from_json(data: &[u8]) -> Result<Self> {
        let settings: CodecSettings = serde_json::from_slice(data)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Load settings from a JSON file
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let data = std::fs::read(path)?;
        Self::from_json(&data)
    }

    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    pub fn validate(&self) -> Result<()> {
        if self.span_chunk_size == 0 {
            return Err(SealdexError::Config(
                "span_chunk_size must be greater than zero".to_string(),
            ));
        }
        if let Some(empty) = self.encrypted_fields.iter().position(|f| f.trim().is_empty()) {
            return Err(SealdexError::Config(format!(
                "encrypted_fields[{}] is empty",
                empty
            )));
        }
        Ok(())
    }

    pub fn with_cipher_suite(mut self, suite: CipherSuite) -> Self {
        self.cipher_suite = suite;
        self
    }

    pub fn with_key_scope(mut self, mode: KeyScopeMode) -> Self {
        self.key_scope = mode;
        self
    }

    pub fn with_term_index(mut self, kind: TermIndexKind) -> Self {
        self.term_index = kind;
        self
    }

    pub fn with_key_log<P: Into<PathBuf>>(mut self, path: P) -> Self {
        self.key_log_path = Some(path.into());
        self
    }

    pub fn with_span_chunk_size(mut self, size: usize) -> Self {
        self.span_chunk_size = size;
        self
    }
}
