//! Encrypted stored field values
//!
//! A value of an encrypted field is stored as `IV || CBC(tag || value)`
//! where `tag` identifies the value type and numbers are big-endian.
//! Values of other fields pass through untouched.

use std::sync::Arc;

use tracing::warn;

use crate::cipher;
use crate::config::CodecSettings;
use crate::error::{Result, SealdexError};
use crate::keys::{KeyScope, KeyStore};
use crate::policy::{EncryptedFieldSet, EncryptionPolicy};

const TYPE_STRING: u8 = 1;
const TYPE_BINARY: u8 = 2;
const TYPE_INT: u8 = 3;
const TYPE_FLOAT: u8 = 4;
const TYPE_LONG: u8 = 5;
const TYPE_DOUBLE: u8 = 6;

/// A stored field value
#[derive(Clone, Debug, PartialEq)]
pub enum StoredValue {
    Str(String),
    Binary(Vec<u8>),
    Int(i32),
    Float(f32),
    Long(i64),
    Double(f64),
}

impl StoredValue {
    fn type_tag(&self) -> u8 {
        match self {
            StoredValue::Str(_) => TYPE_STRING,
            StoredValue::Binary(_) => TYPE_BINARY,
            StoredValue::Int(_) => TYPE_INT,
            StoredValue::Float(_) => TYPE_FLOAT,
            StoredValue::Long(_) => TYPE_LONG,
            StoredValue::Double(_) => TYPE_DOUBLE,
        }
    }

    fn encode(&self) -> Vec<u8> {
        let mut out = vec![self.type_tag()];
        match self {
            StoredValue::Str(s) => out.extend_from_slice(s.as_bytes()),
            StoredValue::Binary(b) => out.extend_from_slice(b),
            StoredValue::Int(v) => out.extend_from_slice(&v.to_be_bytes()),
            StoredValue::Float(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
            StoredValue::Long(v) => out.extend_from_slice(&v.to_be_bytes()),
            StoredValue::Double(v) => out.extend_from_slice(&v.to_bits().to_be_bytes()),
        }
        out
    }

    fn decode(bytes: &[u8]) -> Result<Self> {
        let (&tag, body) = bytes
            .split_first()
            .ok_or_else(|| SealdexError::corruption(0, "empty stored value"))?;
        let value = match tag {
            TYPE_STRING => StoredValue::Str(
                String::from_utf8(body.to_vec())
                    .map_err(|_| SealdexError::corruption(1, "stored string is not UTF-8"))?,
            ),
            TYPE_BINARY => StoredValue::Binary(body.to_vec()),
            TYPE_INT => StoredValue::Int(i32::from_be_bytes(fixed(body)?)),
            TYPE_FLOAT => StoredValue::Float(f32::from_bits(u32::from_be_bytes(fixed(body)?))),
            TYPE_LONG => StoredValue::Long(i64::from_be_bytes(fixed(body)?)),
            TYPE_DOUBLE => StoredValue::Double(f64::from_bits(u64::from_be_bytes(fixed(body)?))),
            other => {
                return Err(SealdexError::corruption(
                    0,
                    format!("unknown stored value type {}", other),
                ))
            }
        };
        Ok(value)
    }
}

fn fixed<const N: usize>(body: &[u8]) -> Result<[u8; N]> {
    body.try_into().map_err(|_| {
        SealdexError::corruption(1, format!("expected {} value bytes, found {}", N, body.len()))
    })
}

/// A value as handed to the host's stored fields writer
#[derive(Clone, Debug, PartialEq)]
pub enum StoredField {
    Plain(StoredValue),
    Sealed(Vec<u8>),
}

/// Seals and opens stored values of encrypted fields
pub struct StoredFieldsCipher {
    keys: Arc<KeyStore>,
    policy: Arc<dyn EncryptionPolicy>,
}

impl StoredFieldsCipher {
    pub fn new(keys: Arc<KeyStore>, settings: &CodecSettings) -> Self {
        Self::with_policy(keys, Arc::new(EncryptedFieldSet::from_settings(settings)))
    }

    pub fn with_policy(keys: Arc<KeyStore>, policy: Arc<dyn EncryptionPolicy>) -> Self {
        Self { keys, policy }
    }

    pub fn is_encrypted(&self, field: &str) -> bool {
        self.policy.is_encrypted(field)
    }

    /// Encrypt `value` if `field` is encrypted, otherwise pass it through
    pub fn seal(&self, field: &str, value: &StoredValue) -> Result<StoredField> {
        if !self.is_encrypted(field) {
            return Ok(StoredField::Plain(value.clone()));
        }
        let key = self
            .keys
            .require(&KeyScope::field(field))
            .map_err(|e| e.in_field(field))?;
        let sealed = cipher::seal_value(&key, &value.encode()).map_err(|e| e.in_field(field))?;
        Ok(StoredField::Sealed(sealed))
    }

    /// Decrypt a stored value, surfacing every failure
    pub fn try_open(&self, field: &str, stored: &StoredField) -> Result<StoredValue> {
        match stored {
            StoredField::Plain(value) => Ok(value.clone()),
            StoredField::Sealed(bytes) => {
                let key = self
                    .keys
                    .require(&KeyScope::field(field))
                    .map_err(|e| e.in_field(field))?;
                let plain = cipher::open_value(&key, bytes).map_err(|e| e.in_field(field))?;
                StoredValue::decode(&plain).map_err(|e| e.in_field(field))
            }
        }
    }

    /// Decrypt a stored value. A value that cannot be decrypted is returned
    /// as the uppercase hex of its stored bytes.
    pub fn open(&self, field: &str, stored: &StoredField) -> StoredValue {
        match self.try_open(field, stored) {
            Ok(value) => value,
            Err(e) => {
                warn!(field, error = %e, "stored value not decryptable, returning raw bytes");
                match stored {
                    StoredField::Sealed(bytes) => StoredValue::Str(hex::encode_upper(bytes)),
                    StoredField::Plain(value) => value.clone(),
                }
            }
        }
    }
}
