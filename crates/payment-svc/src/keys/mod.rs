//! Envelope key lifecycle: KEK handle, active DEK, and previously used DEKs.
//!
//! # Lifecycle
//!
//! 1. At startup, [`KeyProvider::connect`] parses the key URI, builds the
//!    matching [`KmsClient`], and asks the KMS for a fresh data key. Any
//!    failure here is fatal: the service must not serve without cryptography.
//! 2. The plaintext DEK lives only in process memory; its wrapped form is
//!    embedded in every ciphertext sealed under it.
//! 3. [`KeyProvider::rotate_key`] swaps in a newly generated DEK without
//!    blocking readers of the old one.
//! 4. Ciphertexts sealed under an older DEK resolve through one KMS unwrap,
//!    after which the key is cached.
//!
//! # Security invariants
//!
//! - The plaintext DEK is **never** written to disk, logged, or included in traces.
//!   Logs carry a short SHA-256 fingerprint of the wrapped key only.

pub mod store;

pub use store::{DekBytes, DekCache, DekError};

use std::sync::Arc;

use arc_swap::ArcSwap;
use sha2::{Digest, Sha256};
use thiserror::Error;
use tracing::{debug, info};

use crate::kms::{self, InvalidKeyUri, KeyUri, KmsClient, KmsError};

/// Errors produced while obtaining or resolving envelope keys.
#[derive(Debug, Error)]
pub enum KeyProviderError {
    #[error(transparent)]
    InvalidKeyUri(#[from] InvalidKeyUri),

    #[error("key management service error: {0}")]
    Kms(#[from] KmsError),

    #[error("invalid key material: {0}")]
    InvalidKeyMaterial(#[from] DekError),
}

/// A data key: plaintext DEK plus the KMS-wrapped form stored alongside data.
#[derive(Debug)]
pub struct DataKey {
    pub dek: DekBytes,
    pub wrapped: Vec<u8>,
}

impl DataKey {
    /// Short, non-secret identifier of this key, safe to log.
    pub fn fingerprint(&self) -> String {
        fingerprint(&self.wrapped)
    }
}

/// Process-wide owner of the envelope key material.
pub struct KeyProvider {
    kms: Arc<dyn KmsClient>,
    active: ArcSwap<DataKey>,
    cache: DekCache,
}

impl KeyProvider {
    /// Parse `key_uri`, connect to the KMS it names, and initialise a provider.
    ///
    /// # Errors
    ///
    /// Returns [`KeyProviderError::InvalidKeyUri`] for a malformed URI and any
    /// error of [`KeyProvider::initialize`].
    pub async fn connect(
        key_uri: &str,
        endpoint_url: Option<&str>,
    ) -> Result<Self, KeyProviderError> {
        let uri: KeyUri = key_uri.parse()?;
        let client = kms::connect(&uri, endpoint_url).await;
        Self::initialize(client).await
    }

    /// Generate the first active DEK through `kms`.
    ///
    /// # Errors
    ///
    /// Returns [`KeyProviderError::Kms`] if the KMS is unreachable or refuses
    /// the request, and [`KeyProviderError::InvalidKeyMaterial`] if it returns
    /// a key of the wrong size.
    pub async fn initialize(kms: Arc<dyn KmsClient>) -> Result<Self, KeyProviderError> {
        let key = generate(kms.as_ref()).await?;
        let cache = DekCache::new();
        cache.insert(key.wrapped.clone(), key.dek.clone()).await;
        info!(key = %key.fingerprint(), "data key initialised");

        Ok(Self {
            kms,
            active: ArcSwap::from_pointee(key),
            cache,
        })
    }

    /// The key new ciphertexts are sealed under. Lock-free.
    pub fn active(&self) -> Arc<DataKey> {
        self.active.load_full()
    }

    /// Return the plaintext DEK for a wrapped DEK found in a ciphertext.
    ///
    /// # Errors
    ///
    /// Returns [`KeyProviderError::Kms`] if the key is not cached and the KMS
    /// refuses to unwrap it.
    pub async fn resolve(&self, wrapped: &[u8]) -> Result<DekBytes, KeyProviderError> {
        let active = self.active.load();
        if active.wrapped == wrapped {
            return Ok(active.dek.clone());
        }
        if let Some(dek) = self.cache.get(wrapped).await {
            return Ok(dek);
        }

        let plaintext = self.kms.unwrap_key(wrapped).await?;
        let dek = DekBytes::from_slice(&plaintext)?;
        self.cache.insert(wrapped.to_vec(), dek.clone()).await;
        let cached = self.cache.len().await;
        debug!(key = %fingerprint(wrapped), cached, "unwrapped previous data key");
        Ok(dek)
    }

    /// Replace the active DEK with a freshly generated one.
    ///
    /// Data sealed under the previous key stays readable; it is re-sealed
    /// under the new key by the next data rotation.
    ///
    /// # Errors
    ///
    /// Returns an error if the KMS cannot generate a key. The previous key
    /// stays active in that case.
    pub async fn rotate_key(&self) -> Result<(), KeyProviderError> {
        let key = generate(self.kms.as_ref()).await?;
        self.cache.insert(key.wrapped.clone(), key.dek.clone()).await;
        let previous = self.active.swap(Arc::new(key));
        info!(
            previous = %previous.fingerprint(),
            current = %self.active.load().fingerprint(),
            "data key rotated"
        );
        Ok(())
    }

    /// Evict every cached DEK other than the active one.
    ///
    /// Called once stored data no longer references older keys. An evicted
    /// key that is still needed is unwrapped again on demand.
    pub async fn prune_cache(&self) -> usize {
        let active = self.active.load();
        let evicted = self.cache.retain(&active.wrapped).await;
        if evicted > 0 {
            debug!(evicted, key = %active.fingerprint(), "pruned data key cache");
        }
        evicted
    }

    #[cfg(test)]
    pub async fn cached_keys(&self) -> usize {
        self.cache.len().await
    }
}

async fn generate(kms: &dyn KmsClient) -> Result<DataKey, KeyProviderError> {
    let generated = kms.generate_data_key().await?;
    let dek = DekBytes::from_slice(&generated.plaintext)?;
    Ok(DataKey {
        dek,
        wrapped: generated.wrapped,
    })
}

fn fingerprint(wrapped: &[u8]) -> String {
    Sha256::digest(wrapped)
        .iter()
        .take(8)
        .map(|b| format!("{b:02x}"))
        .collect()
}
