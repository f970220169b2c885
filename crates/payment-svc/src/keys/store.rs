//! [`DekBytes`] and [`DekCache`]: in-memory holders for plaintext data keys.

use std::{collections::HashMap, sync::Arc};
use thiserror::Error;
use tokio::sync::RwLock;

use crate::crypto::KEY_LEN;

/// Errors produced by the DEK layer.
#[derive(Debug, Error)]
pub enum DekError {
    /// The decrypted key material has an unexpected length.
    #[error("DEK has invalid length: expected {KEY_LEN} bytes, got {0}")]
    InvalidLength(usize),
}

/// Fixed-size key buffer that holds exactly [`KEY_LEN`] bytes.
///
/// When this type is dropped, the memory is overwritten with zeroes to
/// minimise the window during which plaintext key material lives in RAM.
#[derive(Clone)]
pub struct DekBytes(pub Box<[u8; KEY_LEN]>);

impl DekBytes {
    /// Copy `key_bytes` into a new buffer.
    ///
    /// # Errors
    ///
    /// Returns [`DekError::InvalidLength`] if the slice is not [`KEY_LEN`] bytes.
    pub fn from_slice(key_bytes: &[u8]) -> Result<Self, DekError> {
        if key_bytes.len() != KEY_LEN {
            return Err(DekError::InvalidLength(key_bytes.len()));
        }
        let mut buf = Box::new([0u8; KEY_LEN]);
        buf.copy_from_slice(key_bytes);
        Ok(Self(buf))
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0[..]
    }
}

impl Drop for DekBytes {
    fn drop(&mut self) {
        // Zero the key material on drop.
        self.0.iter_mut().for_each(|b| *b = 0);
    }
}

impl std::fmt::Debug for DekBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DekBytes([REDACTED])")
    }
}

/// Thread-safe cache of unwrapped DEKs, keyed by their wrapped form.
///
/// Populated with the active key at startup and on key rotation, and with any
/// older key the KMS unwraps while reading data written before a rotation.
#[derive(Clone, Debug, Default)]
pub struct DekCache {
    inner: Arc<RwLock<HashMap<Vec<u8>, DekBytes>>>,
}

impl DekCache {
    /// Create a new, empty [`DekCache`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of cached keys.
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    /// Look up the plaintext DEK for `wrapped`.
    pub async fn get(&self, wrapped: &[u8]) -> Option<DekBytes> {
        self.inner.read().await.get(wrapped).cloned()
    }

    /// Store (or replace) the plaintext DEK for `wrapped`.
    pub async fn insert(&self, wrapped: Vec<u8>, dek: DekBytes) {
        self.inner.write().await.insert(wrapped, dek);
    }

    /// Drop every key except `keep`. Returns the number evicted.
    pub async fn retain(&self, keep: &[u8]) -> usize {
        let mut inner = self.inner.write().await;
        let before = inner.len();
        inner.retain(|wrapped, _| wrapped.as_slice() == keep);
        before - inner.len()
    }
}
