//! Re-encryption of every stored record under the active data key.
//!
//! A rotation runs as one unit of work:
//!
//! 1. Optionally replace the active data key.
//! 2. Load and decrypt every user, soft-deleted ones included. A single
//!    unreadable record aborts the rotation before anything is written.
//! 3. Re-encrypt each user and stage the result in one backend transaction.
//! 4. Commit. The backend rejects the commit if any row changed since it was
//!    loaded, in which case nothing is applied.
//!
//! Any failure drops the transaction uncommitted, so a partially re-encrypted
//! data set is never visible.

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

use crate::keys::{KeyProvider, KeyProviderError};
use crate::payment::CodecError;
use crate::store::{PersistenceError, StoreError, UserRepository};

/// Errors returned by [`RotationCoordinator::rotate_all`].
#[derive(Debug, Error)]
pub enum RotationError {
    #[error("data key rotation failed: {0}")]
    KeyRotation(#[from] KeyProviderError),

    #[error("failed to load records: {0}")]
    Load(#[source] StoreError),

    /// Sealing failed. Only reachable for a field larger than the AEAD
    /// plaintext limit; validated records are always far below it.
    #[error("failed to re-encrypt record: {0}")]
    Encrypt(#[source] CodecError),

    #[error("failed to stage record {id}: {source}")]
    Persist {
        id: Uuid,
        #[source]
        source: PersistenceError,
    },

    /// The transaction could not be opened or committed.
    #[error("rotation transaction failed: {0}")]
    Commit(#[source] PersistenceError),

    #[error("rotation cancelled")]
    Cancelled,
}

/// Counts of records rewritten by a rotation.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RotationReport {
    pub users: usize,
    pub cards: usize,
}

/// Drives full-data-set re-encryption.
pub struct RotationCoordinator {
    repo: UserRepository,
    keys: Arc<KeyProvider>,
    rotate_data_key: bool,
    // One rotation at a time; a second would only conflict with the first.
    running: Mutex<()>,
}

impl RotationCoordinator {
    /// `rotate_data_key` controls whether each rotation first replaces the
    /// active data key or only re-seals data under the current one.
    pub fn new(repo: UserRepository, keys: Arc<KeyProvider>, rotate_data_key: bool) -> Self {
        Self {
            repo,
            keys,
            rotate_data_key,
            running: Mutex::new(()),
        }
    }

    /// Re-encrypt every user and card atomically.
    ///
    /// `cancel` interrupts waiting for a running rotation, the key swap and
    /// the load, and is checked again between records and before the commit.
    ///
    /// # Errors
    ///
    /// Returns the first [`RotationError`] encountered. Stored data is
    /// unchanged in every error case; only [`RotationError::KeyRotation`]
    /// can occur before loading, and a successful key swap is kept even if
    /// the re-encryption later fails.
    pub async fn rotate_all(
        &self,
        cancel: &CancellationToken,
    ) -> Result<RotationReport, RotationError> {
        let _running = until_cancelled(cancel, self.running.lock()).await?;

        if self.rotate_data_key {
            until_cancelled(cancel, self.keys.rotate_key()).await??;
        }

        let users = until_cancelled(cancel, self.repo.find_all_including_deleted())
            .await?
            .map_err(RotationError::Load)?;
        if users.is_empty() {
            let evicted = self.keys.prune_cache().await;
            info!(evicted, "rotation found no records");
            return Ok(RotationReport::default());
        }

        let codec = self.repo.codec();
        let mut tx = self.repo.begin().await.map_err(RotationError::Commit)?;
        let mut report = RotationReport::default();

        for user in &users {
            if cancel.is_cancelled() {
                warn!(staged = report.users, "rotation cancelled; rolling back");
                return Err(RotationError::Cancelled);
            }
            let stored = codec.encrypt_user(user).map_err(RotationError::Encrypt)?;
            tx.update(stored)
                .await
                .map_err(|source| RotationError::Persist {
                    id: user.id,
                    source,
                })?;
            report.users += 1;
            report.cards += user.credit_cards.len();
        }

        if cancel.is_cancelled() {
            warn!(staged = report.users, "rotation cancelled before commit");
            return Err(RotationError::Cancelled);
        }
        tx.commit().await.map_err(|e| {
            warn!(error = %e, "rotation commit rejected");
            RotationError::Commit(e)
        })?;

        let evicted = self.keys.prune_cache().await;
        info!(
            users = report.users,
            cards = report.cards,
            evicted,
            key = %self.keys.active().fingerprint(),
            "rotation committed"
        );
        Ok(report)
    }
}

async fn until_cancelled<F: Future>(
    cancel: &CancellationToken,
    fut: F,
) -> Result<F::Output, RotationError> {
    tokio::select! {
        biased;
        () = cancel.cancelled() => {
            warn!("rotation cancelled before staging");
            Err(RotationError::Cancelled)
        }
        out = fut => Ok(out),
    }
}
