//! [`UserRepository`]: plaintext records in, ciphertext rows out.

use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use super::{Backend, PersistenceError, Scope, StoredUser, Transaction};
use crate::payment::{CodecError, FieldCodec, User};

/// Errors returned by [`UserRepository`].
#[derive(Debug, Error)]
pub enum StoreError {
    /// A record could not be encrypted before a write or decrypted after a read.
    #[error("record codec failure: {0}")]
    Codec(#[from] CodecError),

    #[error(transparent)]
    Persistence(#[from] PersistenceError),
}

/// Record store for [`User`] aggregates.
///
/// Every write goes through [`FieldCodec::encrypt_user`] first and every read
/// through [`FieldCodec::decrypt_user`], so the [`Backend`] only ever holds
/// ciphertext for sensitive fields.
#[derive(Clone)]
pub struct UserRepository {
    backend: Arc<dyn Backend>,
    codec: FieldCodec,
}

impl UserRepository {
    pub fn new(backend: Arc<dyn Backend>, codec: FieldCodec) -> Self {
        Self { backend, codec }
    }

    pub fn codec(&self) -> &FieldCodec {
        &self.codec
    }

    /// Encrypt and insert a new user with its cards.
    pub async fn save(&self, user: &User) -> Result<(), StoreError> {
        let stored = self.codec.encrypt_user(user)?;
        self.backend.insert(stored).await?;
        debug!(user_id = %user.id, cards = user.credit_cards.len(), "user saved");
        Ok(())
    }

    /// Load one live user. Soft-deleted users are reported as absent.
    pub async fn find_by_id(&self, id: Uuid) -> Result<Option<User>, StoreError> {
        match self.backend.fetch(id).await? {
            Some(mut stored) if !stored.user.meta.is_deleted() => {
                stored.cards.retain(|c| !c.meta.is_deleted());
                Ok(Some(self.decrypt(stored).await?))
            }
            _ => Ok(None),
        }
    }

    /// Load every live user, oldest first.
    pub async fn find_all(&self) -> Result<Vec<User>, StoreError> {
        self.load(Scope::Live).await
    }

    /// Load every user, soft-deleted ones included.
    pub async fn find_all_including_deleted(&self) -> Result<Vec<User>, StoreError> {
        self.load(Scope::All).await
    }

    /// Soft delete a user and its cards. Returns `false` if no live user has `id`.
    pub async fn soft_delete(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.backend.soft_delete(id).await?)
    }

    /// Open a backend transaction for bulk rewrites of existing rows.
    pub async fn begin(&self) -> Result<Box<dyn Transaction>, PersistenceError> {
        self.backend.begin().await
    }

    async fn load(&self, scope: Scope) -> Result<Vec<User>, StoreError> {
        let rows = self.backend.fetch_all(scope).await?;
        let mut users = Vec::with_capacity(rows.len());
        for stored in rows {
            users.push(self.decrypt(stored).await?);
        }
        Ok(users)
    }

    async fn decrypt(&self, stored: StoredUser) -> Result<User, StoreError> {
        self.codec.decrypt_user(stored).await.map_err(|e| {
            warn!(record = %e.record, field = e.field, error = %e.source, "failed to load record");
            StoreError::Codec(e)
        })
    }
}
