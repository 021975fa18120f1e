//! Key derivation and caching
//!
//! A process holds at most one master key. Per-identity keys are derived as
//! `HMAC-SHA256(master, identity)` truncated to 128 bits and cached for the
//! lifetime of the owning [`KeyStore`].

mod key_log;
mod scope;
mod store;

pub use key_log::*;
pub use scope::*;
pub use store::*;

use hmac::{Hmac, Mac};
use sha2::Sha256;
use std::fmt;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, SealdexError};

/// Length of derived keys in bytes (AES-128)
pub const KEY_LEN: usize = 16;

type HmacSha256 = Hmac<Sha256>;

/// Symmetric key bound to one identity
#[derive(Clone, PartialEq, Eq, Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a key from 32 hex digits
    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| SealdexError::InvalidKey(format!("not hex: {}", e)))?;
        let bytes: [u8; KEY_LEN] = bytes.as_slice().try_into().map_err(|_| {
            SealdexError::InvalidKey(format!("expected {} bytes, got {}", KEY_LEN, bytes.len()))
        })?;
        Ok(Self(bytes))
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode_upper(self.0)
    }
}

impl fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DerivedKey(..)")
    }
}

/// Process-wide secret all derived keys come from
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct MasterKey(Vec<u8>);

impl MasterKey {
    pub fn new(bytes: impl Into<Vec<u8>>) -> Result<Self> {
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(SealdexError::InvalidKey("master key is empty".to_string()));
        }
        Ok(Self(bytes))
    }

    pub fn from_hex(hex_key: &str) -> Result<Self> {
        let bytes = hex::decode(hex_key.trim())
            .map_err(|e| SealdexError::InvalidKey(format!("not hex: {}", e)))?;
        Self::new(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl fmt::Debug for MasterKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MasterKey({} bytes)", self.0.len())
    }
}

/// Derive the key for `identity`. Pure: equal inputs give equal keys.
pub fn derive_key(master: &MasterKey, identity: &[u8]) -> Result<DerivedKey> {
    let mut mac = <HmacSha256 as Mac>::new_from_slice(master.as_bytes())
        .map_err(|e| SealdexError::InvalidKey(e.to_string()))?;
    mac.update(identity);
    let digest = mac.finalize().into_bytes();

    let mut key = [0u8; KEY_LEN];
    key.copy_from_slice(&digest[..KEY_LEN]);
    Ok(DerivedKey(key))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_is_deterministic() {
        let master = MasterKey::new(b"0123456789abcdef".to_vec()).unwrap();
        let a = derive_key(&master, b"manu").unwrap();
        let b = derive_key(&master, b"manu").unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_derive_distinct_identities() {
        let master = MasterKey::new(b"0123456789abcdef".to_vec()).unwrap();
        let identities: [&[u8]; 5] = [b"manu", b"mg", b"manu_id_s", b"manuacme", b""];
        let keys: Vec<DerivedKey> = identities
            .iter()
            .map(|id| derive_key(&master, id).unwrap())
            .collect();
        for i in 0..keys.len() {
            for j in (i + 1)..keys.len() {
                assert_ne!(keys[i], keys[j], "{:?} vs {:?}", identities[i], identities[j]);
            }
        }
    }

    #[test]
    fn test_derive_known_vector() {
        // RFC 4231 test case 2, truncated to 128 bits
        let master = MasterKey::new(b"Jefe".to_vec()).unwrap();
        let key = derive_key(&master, b"what do ya want for nothing?").unwrap();
        assert_eq!(key.to_hex(), "5BDCC146BF60754E6A042426089575C7");
    }

    #[test]
    fn test_hex_parsing() {
        let key = DerivedKey::from_hex("000102030405060708090a0b0c0d0e0f").unwrap();
        assert_eq!(key.as_bytes()[15], 0x0f);
        assert!(matches!(
            DerivedKey::from_hex("0001"),
            Err(SealdexError::InvalidKey(_))
        ));
        assert!(matches!(
            DerivedKey::from_hex("zz"),
            Err(SealdexError::InvalidKey(_))
        ));
        assert!(MasterKey::from_hex("").is_err());
    }

    #[test]
    fn test_debug_hides_material() {
        let key = DerivedKey::from_bytes([7; KEY_LEN]);
        assert_eq!(format!("{:?}", key), "DerivedKey(..)");
    }
}
