//! Field encryption: AES-256-GCM-SIV primitives and the envelope field cipher.
//!
//! [`cipher`] is free of KMS and HTTP dependencies and works on raw key bytes.
//! [`FieldCipher`] layers the envelope on top: it seals under the active data
//! key and resolves the data key named by a ciphertext when opening it.
//!
//! # Ciphertext format
//!
//! ```text
//! v1.<base64url-no-pad(wrapped DEK)>.<base64url-no-pad(nonce)>.<base64url-no-pad(ciphertext+tag)>
//! ```
//!
//! The `v1` prefix enables future algorithm migration without breaking existing
//! ciphertext.

pub mod aead;
pub mod cipher;

pub use aead::{CryptoError, FieldCipher};
pub use cipher::KEY_LEN;
