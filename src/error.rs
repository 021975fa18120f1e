use thiserror::Error;

/// Main error type for sealdex operations
#[derive(Error, Debug)]
pub enum SealdexError {
    #[error("No key available for {identity}")]
    MissingKey { identity: String },

    #[error("Format corruption at offset {offset}: {detail}")]
    FormatCorruption { offset: u64, detail: String },

    #[error("Cipher failure: {0}")]
    CipherFailure(String),

    #[error("Position {pos} out of range [{start}, {end}]")]
    OutOfRange { pos: u64, start: u64, end: u64 },

    #[error("Read of {len} bytes at {pos} runs past sealed span [{start}, {end})")]
    EndOfSpan {
        pos: u64,
        len: usize,
        start: u64,
        end: u64,
    },

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Unsupported operation: {0}")]
    UnsupportedOperation(&'static str),

    #[error("Invalid key: {0}")]
    InvalidKey(String),

    #[error("Master key already set")]
    KeyAlreadySet,

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Field '{field}': {source}")]
    Field {
        field: String,
        #[source]
        source: Box<SealdexError>,
    },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for sealdex operations
pub type Result<T> = std::result::Result<T, SealdexError>;

impl SealdexError {
    pub fn corruption(offset: u64, detail: impl Into<String>) -> Self {
        SealdexError::FormatCorruption {
            offset,
            detail: detail.into(),
        }
    }

    pub fn missing_key(identity: impl Into<String>) -> Self {
        SealdexError::MissingKey {
            identity: identity.into(),
        }
    }

    /// Attach the field name to an error. Already-wrapped errors are left alone.
    pub fn in_field(self, field: &str) -> Self {
        match self {
            e @ SealdexError::Field { .. } => e,
            e => SealdexError::Field {
                field: field.to_string(),
                source: Box::new(e),
            },
        }
    }

    /// Unwrap field context and return the underlying error
    pub fn root(&self) -> &SealdexError {
        match self {
            SealdexError::Field { source, .. } => source.root(),
            e => e,
        }
    }

    /// A missing key only disables the affected field, never the segment
    pub fn is_missing_key(&self) -> bool {
        matches!(self.root(), SealdexError::MissingKey { .. })
    }

    pub fn is_corruption(&self) -> bool {
        matches!(self.root(), SealdexError::FormatCorruption { .. })
    }

    /// Whether the error should abort the whole segment operation
    pub fn is_fatal(&self) -> bool {
        !matches!(
            self.root(),
            SealdexError::MissingKey { .. } | SealdexError::InvalidInput(_)
        )
    }
}
