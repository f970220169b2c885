//! [`FieldCipher`]: authenticated encryption of one value bound to associated data.

use std::sync::Arc;

use thiserror::Error;

use super::cipher::{open, seal, EncryptedField};
use crate::keys::{KeyProvider, KeyProviderError};

/// Errors surfaced by [`FieldCipher`].
///
/// Never retried: none of these can succeed without different inputs.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// The AEAD primitive rejected the input.
    #[error("encryption failed")]
    EncryptionFailure,

    /// The stored text is not a well-formed envelope (corrupted data).
    #[error("ciphertext is not a valid envelope")]
    DecodingFailure,

    /// The tag did not verify: wrong key, wrong associated data, or tampering.
    #[error("ciphertext failed authentication")]
    AuthenticationFailure,

    /// The data key named by the envelope could not be unwrapped.
    #[error("data key unavailable")]
    KeyUnavailable(#[source] KeyProviderError),
}

/// Envelope AEAD over the process-wide [`KeyProvider`].
#[derive(Clone)]
pub struct FieldCipher {
    keys: Arc<KeyProvider>,
}

impl FieldCipher {
    pub fn new(keys: Arc<KeyProvider>) -> Self {
        Self { keys }
    }

    /// Seal `plaintext` under the active data key, bound to `associated_data`.
    ///
    /// Pure computation; two calls with the same inputs yield different output.
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::EncryptionFailure`] if the primitive rejects the input.
    /// The active key is always [`KEY_LEN`](super::KEY_LEN) bytes, so this only
    /// happens for a plaintext beyond the AES-GCM-SIV limit of 2^36 bytes,
    /// which no validated record approaches.
    pub fn encrypt(&self, plaintext: &[u8], associated_data: &[u8]) -> Result<String, CryptoError> {
        let key = self.keys.active();
        let sealed = seal(plaintext, associated_data, key.dek.as_bytes())
            .map_err(|_| CryptoError::EncryptionFailure)?;

        Ok(EncryptedField {
            wrapped_dek: key.wrapped.clone(),
            nonce: sealed.nonce,
            ciphertext: sealed.ciphertext,
        }
        .to_string_repr())
    }

    /// Open an envelope produced by [`FieldCipher::encrypt`].
    ///
    /// Only touches the KMS when the envelope names a data key not seen before
    /// by this process.
    ///
    /// # Errors
    ///
    /// - [`CryptoError::DecodingFailure`] if `encoded` is malformed.
    /// - [`CryptoError::KeyUnavailable`] if its data key cannot be unwrapped.
    /// - [`CryptoError::AuthenticationFailure`] if `associated_data` differs
    ///   from the value used at encryption, or the data was altered.
    pub async fn decrypt(
        &self,
        encoded: &str,
        associated_data: &[u8],
    ) -> Result<Vec<u8>, CryptoError> {
        let field = EncryptedField::parse(encoded).map_err(|_| CryptoError::DecodingFailure)?;
        let dek = self
            .keys
            .resolve(&field.wrapped_dek)
            .await
            .map_err(CryptoError::KeyUnavailable)?;
        open(&field.nonce, &field.ciphertext, associated_data, dek.as_bytes())
            .map_err(|_| CryptoError::AuthenticationFailure)
    }
}
