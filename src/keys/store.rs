use parking_lot::RwLock;
use rand::RngCore;
use std::collections::HashMap;
use std::path::PathBuf;

use tracing::{debug, info, warn};

use super::{derive_key, DerivedKey, KeyLog, KeyScope, MasterKey, KEY_LEN};
use crate::config::CodecSettings;
use crate::error::{Result, SealdexError};

/// Derives, caches and hands out per-identity keys.
///
/// Shared by every writer and reader of a codec instance through an `Arc`.
/// The cache is unbounded and lives as long as the store.
#[derive(Debug, Default)]
pub struct KeyStore {
    master: RwLock<Option<MasterKey>>,
    cache: RwLock<HashMap<Vec<u8>, DerivedKey>>,
    log: Option<KeyLog>,
}

impl KeyStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store that mirrors key events to an append-only log file
    pub fn with_key_log<P: Into<PathBuf>>(path: P) -> Self {
        Self {
            log: Some(KeyLog::new(path)),
            ..Default::default()
        }
    }

    pub fn from_settings(settings: &CodecSettings) -> Self {
        match &settings.key_log_path {
            Some(path) => Self::with_key_log(path.clone()),
            None => Self::new(),
        }
    }

    /// Install the master key. Only one master key may be present at a time.
    pub fn set_master_key(&self, key: MasterKey) -> Result<()> {
        let mut master = self.master.write();
        if master.is_some() {
            return Err(SealdexError::KeyAlreadySet);
        }
        if let Some(log) = &self.log {
            log.record(b"", key.as_bytes());
        }
        *master = Some(key);
        info!("master key installed");
        Ok(())
    }

    pub fn has_master_key(&self) -> bool {
        self.master.read().is_some()
    }

    pub fn clear_master_key(&self) {
        *self.master.write() = None;
    }

    /// True when a key for `scope` is cached or can be derived
    pub fn has_key(&self, scope: &KeyScope) -> bool {
        self.has_master_key() || self.cache.read().contains_key(&scope.identity())
    }

    /// Return the cached key for `scope`, deriving and caching it on a miss.
    ///
    /// `None` means no master key is set and nothing is cached.
    pub fn get_or_derive(&self, scope: &KeyScope) -> Option<DerivedKey> {
        let identity = scope.identity();
        if let Some(key) = self.cache.read().get(&identity) {
            return Some(key.clone());
        }

        let key = {
            let master = self.master.read();
            let master = master.as_ref()?;
            match derive_key(master, &identity) {
                Ok(key) => key,
                Err(e) => {
                    warn!(%scope, error = %e, "key derivation failed");
                    return None;
                }
            }
        };

        // racing derivations produce the same key
        self.cache.write().insert(identity.clone(), key.clone());
        debug!(identity_len = identity.len(), "derived key");
        if let Some(log) = &self.log {
            log.record(&identity, key.as_bytes());
        }
        Some(key)
    }

    /// Like [`get_or_derive`](Self::get_or_derive) but absence is a `MissingKey` error
    pub fn require(&self, scope: &KeyScope) -> Result<DerivedKey> {
        self.get_or_derive(scope)
            .ok_or_else(|| SealdexError::missing_key(scope.to_string()))
    }

    /// Insert an externally supplied key, replacing any cached one
    pub fn add_key(&self, scope: &KeyScope, key: DerivedKey) {
        let identity = scope.identity();
        if let Some(log) = &self.log {
            log.record(&identity, key.as_bytes());
        }
        self.cache.write().insert(identity, key);
    }

    /// Drop the cached key for `scope`. Returns whether one was cached.
    pub fn forget(&self, scope: &KeyScope) -> bool {
        self.cache.write().remove(&scope.identity()).is_some()
    }

    /// Drop the master key and every cached key
    pub fn forget_all(&self) {
        self.clear_master_key();
        self.cache.write().clear();
        info!("all keys forgotten");
    }

    pub fn cached_len(&self) -> usize {
        self.cache.read().len()
    }

    /// Parse a hex encoded 128-bit key
    pub fn parse_key(hex_key: &str) -> Result<DerivedKey> {
        DerivedKey::from_hex(hex_key)
    }

    /// Random 128-bit master key
    pub fn generate_master_key() -> MasterKey {
        let mut bytes = vec![0u8; KEY_LEN];
        rand::thread_rng().fill_bytes(&mut bytes);
        MasterKey(bytes)
    }
}
