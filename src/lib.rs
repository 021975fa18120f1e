pub mod cipher;
pub mod config;
pub mod error;
pub mod format;
pub mod keys;
pub mod policy;
pub mod sealed;
pub mod segment;
pub mod stored;

pub use cipher::{CipherSuite, SegmentSalt};
pub use config::CodecSettings;
pub use error::{Result, SealdexError};
pub use keys::{DerivedKey, KeyScope, KeyScopeMode, KeyStore, MasterKey};
pub use policy::{EncryptedFieldSet, EncryptionPolicy};
pub use sealed::{SealedSpan, SealedSpanWriter, SealedStorage};
pub use segment::{
    FieldInfo, FieldInfos, FieldTerms, FieldsReader, FieldsWriter, IndexOptions, PostingsCursor,
    TermDictionary, TermIndexKind,
};
pub use stored::{StoredField, StoredFieldsCipher, StoredValue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
