//! Which fields are encrypted

use std::collections::HashSet;

use crate::config::CodecSettings;

/// Decides per field whether its postings and stored values are encrypted.
/// Treated as static for the lifetime of a segment.
pub trait EncryptionPolicy: Send + Sync {
    fn is_encrypted(&self, field: &str) -> bool;
}

/// Case-insensitive set of encrypted field names
#[derive(Clone, Debug, Default)]
pub struct EncryptedFieldSet {
    fields: HashSet<String>,
}

impl EncryptedFieldSet {
    pub fn new<I, S>(fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Self {
            fields: fields
                .into_iter()
                .map(|f| f.as_ref().trim().to_lowercase())
                .collect(),
        }
    }

    pub fn from_settings(settings: &CodecSettings) -> Self {
        Self::new(&settings.encrypted_fields)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

impl EncryptionPolicy for EncryptedFieldSet {
    fn is_encrypted(&self, field: &str) -> bool {
        self.fields.contains(&field.to_lowercase())
    }
}
