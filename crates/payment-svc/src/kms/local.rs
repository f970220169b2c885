//! In-process [`KmsClient`] for development and tests.
//!
//! Wrapped keys are `nonce || AES-256-GCM-SIV(dek)` under the local KEK.

use std::fmt;

use async_trait::async_trait;

use super::{GeneratedKey, KmsClient, KmsError};
use crate::crypto::{
    cipher::{open, random_key, seal, NONCE_LEN},
    KEY_LEN,
};

const WRAP_AAD: &[u8] = b"local-kms/dek";

/// A KMS stand-in holding the KEK in memory.
pub struct LocalKms {
    kek: [u8; KEY_LEN],
}

impl LocalKms {
    pub fn new(kek: [u8; KEY_LEN]) -> Self {
        Self { kek }
    }
}

impl Drop for LocalKms {
    fn drop(&mut self) {
        self.kek.iter_mut().for_each(|b| *b = 0);
    }
}

impl fmt::Debug for LocalKms {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("LocalKms([REDACTED])")
    }
}

#[async_trait]
impl KmsClient for LocalKms {
    async fn generate_data_key(&self) -> Result<GeneratedKey, KmsError> {
        let dek = random_key();
        let sealed =
            seal(&dek, WRAP_AAD, &self.kek).map_err(|e| KmsError::Request(e.to_string()))?;

        let mut wrapped = Vec::with_capacity(NONCE_LEN + sealed.ciphertext.len());
        wrapped.extend_from_slice(&sealed.nonce);
        wrapped.extend_from_slice(&sealed.ciphertext);

        Ok(GeneratedKey {
            plaintext: dek.to_vec(),
            wrapped,
        })
    }

    async fn unwrap_key(&self, wrapped: &[u8]) -> Result<Vec<u8>, KmsError> {
        if wrapped.len() <= NONCE_LEN {
            return Err(KmsError::InvalidWrappedKey);
        }
        let (nonce_bytes, ciphertext) = wrapped.split_at(NONCE_LEN);
        let mut nonce = [0u8; NONCE_LEN];
        nonce.copy_from_slice(nonce_bytes);
        open(&nonce, ciphertext, WRAP_AAD, &self.kek).map_err(|_| KmsError::InvalidWrappedKey)
    }
}
