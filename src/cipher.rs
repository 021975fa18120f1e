//! Cipher primitives for sealed spans and stored values
//!
//! Two span ciphers are supported:
//! - `Aes128Ctr`: length preserving. The IV is the segment's random
//!   [`SegmentSalt`] with the span's ciphertext start offset XORed into its
//!   first eight bytes, so no two spans share a keystream.
//! - `Aes128Ecb`: AES-128-ECB with PKCS#7 padding, the layout produced by a
//!   bare JCE `"AES"` cipher. Deterministic; kept for format compatibility.
//!
//! Stored values use AES-128-CBC with PKCS#7 padding and a random IV prefix.

use aes::Aes128;
use cbc::cipher::block_padding::Pkcs7;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyInit, KeyIvInit, StreamCipher};
use rand::RngCore;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SealdexError};
use crate::keys::DerivedKey;

/// AES block length in bytes
pub const BLOCK_LEN: usize = 16;

/// Length of the per-segment salt stored in the collection header
pub const SALT_LEN: usize = 16;

type CtrCipher = ctr::Ctr128BE<Aes128>;
type EcbEnc = ecb::Encryptor<Aes128>;
type EcbDec = ecb::Decryptor<Aes128>;
type CbcEnc = cbc::Encryptor<Aes128>;
type CbcDec = cbc::Decryptor<Aes128>;

/// Random value written once per segment and mixed into every span IV
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct SegmentSalt([u8; SALT_LEN]);

impl SegmentSalt {
    pub fn random() -> Self {
        let mut salt = [0u8; SALT_LEN];
        rand::thread_rng().fill_bytes(&mut salt);
        Self(salt)
    }

    pub fn from_bytes(bytes: [u8; SALT_LEN]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; SALT_LEN] {
        &self.0
    }

    fn span_iv(&self, span_start: u64) -> [u8; BLOCK_LEN] {
        let mut iv = self.0;
        for (b, o) in iv[..8].iter_mut().zip(span_start.to_be_bytes()) {
            *b ^= o;
        }
        iv
    }
}

/// Cipher used to seal postings spans
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CipherSuite {
    #[default]
    Aes128Ctr,
    Aes128Ecb,
}

impl CipherSuite {
    pub fn id(&self) -> &'static str {
        match self {
            CipherSuite::Aes128Ctr => "aes-128-ctr",
            CipherSuite::Aes128Ecb => "aes-128-ecb-pkcs7",
        }
    }

    /// Expected ciphertext length for a plaintext of `plaintext_len` bytes
    pub fn ciphertext_len(&self, plaintext_len: usize) -> usize {
        match self {
            CipherSuite::Aes128Ctr => plaintext_len,
            CipherSuite::Aes128Ecb => (plaintext_len / BLOCK_LEN + 1) * BLOCK_LEN,
        }
    }

    /// Encrypt a whole span in one call.
    ///
    /// `span_start` is the absolute file offset of the first ciphertext byte.
    /// ECB ignores both `salt` and `span_start`.
    pub fn seal_span(
        &self,
        key: &DerivedKey,
        salt: &SegmentSalt,
        span_start: u64,
        mut plaintext: Vec<u8>,
    ) -> Result<Vec<u8>> {
        match self {
            CipherSuite::Aes128Ctr => {
                let mut cipher = CtrCipher::new_from_slices(key.as_bytes(), &salt.span_iv(span_start))
                    .map_err(|e| SealdexError::CipherFailure(e.to_string()))?;
                cipher.apply_keystream(&mut plaintext);
                Ok(plaintext)
            }
            CipherSuite::Aes128Ecb => {
                let cipher = EcbEnc::new_from_slice(key.as_bytes())
                    .map_err(|e| SealdexError::CipherFailure(e.to_string()))?;
                Ok(cipher.encrypt_padded_vec_mut::<Pkcs7>(&plaintext))
            }
        }
    }

    /// Decrypt a whole span in one call.
    pub fn open_span(
        &self,
        key: &DerivedKey,
        salt: &SegmentSalt,
        span_start: u64,
        mut ciphertext: Vec<u8>,
    ) -> Result<Vec<u8>> {
        match self {
            CipherSuite::Aes128Ctr => {
                let mut cipher = CtrCipher::new_from_slices(key.as_bytes(), &salt.span_iv(span_start))
                    .map_err(|e| SealdexError::CipherFailure(e.to_string()))?;
                cipher.apply_keystream(&mut ciphertext);
                Ok(ciphertext)
            }
            CipherSuite::Aes128Ecb => {
                let cipher = EcbDec::new_from_slice(key.as_bytes())
                    .map_err(|e| SealdexError::CipherFailure(e.to_string()))?;
                cipher
                    .decrypt_padded_vec_mut::<Pkcs7>(&ciphertext)
                    .map_err(|_| {
                        SealdexError::CipherFailure(format!(
                            "bad padding in {} byte span at {}",
                            ciphertext.len(),
                            span_start
                        ))
                    })
            }
        }
    }
}

/// Encrypt a stored value as `IV || AES-128-CBC(plaintext)`
pub fn seal_value(key: &DerivedKey, plaintext: &[u8]) -> Result<Vec<u8>> {
    let mut iv = [0u8; BLOCK_LEN];
    rand::thread_rng().fill_bytes(&mut iv);

    let cipher = CbcEnc::new_from_slices(key.as_bytes(), &iv)
        .map_err(|e| SealdexError::CipherFailure(e.to_string()))?;
    let ciphertext = cipher.encrypt_padded_vec_mut::<Pkcs7>(plaintext);

    let mut sealed = Vec::with_capacity(BLOCK_LEN + ciphertext.len());
    sealed.extend_from_slice(&iv);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Decrypt a value produced by [`seal_value`]
pub fn open_value(key: &DerivedKey, sealed: &[u8]) -> Result<Vec<u8>> {
    if sealed.len() < 2 * BLOCK_LEN {
        return Err(SealdexError::CipherFailure(format!(
            "sealed value too short: {} bytes",
            sealed.len()
        )));
    }
    let (iv, ciphertext) = sealed.split_at(BLOCK_LEN);
    let cipher = CbcDec::new_from_slices(key.as_bytes(), iv)
        .map_err(|e| SealdexError::CipherFailure(e.to_string()))?;
    cipher
        .decrypt_padded_vec_mut::<Pkcs7>(ciphertext)
        .map_err(|_| SealdexError::CipherFailure("bad padding in sealed value".to_string()))
}
