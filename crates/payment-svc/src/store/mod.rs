//! Persistence of encrypted user and card rows.
//!
//! # Responsibilities
//!
//! - [`Backend`] / [`Transaction`]: the storage seam. Rows crossing it hold
//!   ciphertext only; a backend never sees a plaintext sensitive field.
//! - [`MemoryBackend`]: transactional in-process implementation.
//! - [`UserRepository`]: the record store. Encrypts immediately before every
//!   write and decrypts immediately after every read.
//!
//! # Concurrency
//!
//! Every row carries a `version`. A [`Transaction`] commits only if every row
//! it stages still has the version it was read at; otherwise nothing is
//! applied and the commit fails with [`PersistenceError::Conflict`].

pub mod memory;
pub mod repository;

pub use memory::MemoryBackend;
pub use repository::{StoreError, UserRepository};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;
use uuid::Uuid;

/// Administrative metadata carried by every record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMeta {
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Soft-delete marker.
    pub deleted_at: Option<DateTime<Utc>>,
    /// Optimistic-concurrency counter, bumped on every committed change.
    pub version: u64,
}

impl RecordMeta {
    /// Metadata for a record created at `now`, before its first write.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            created_at: now,
            updated_at: now,
            deleted_at: None,
            version: 0,
        }
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted_at.is_some()
    }
}

/// Stored form of a user. `name` is an envelope ciphertext.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRow {
    pub id: Uuid,
    pub name: String,
    pub meta: RecordMeta,
}

/// Stored form of a card. `number`, `expire_at` and `cva` are envelope ciphertexts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CardRow {
    pub id: Uuid,
    pub user_id: Uuid,
    pub number: String,
    pub expire_at: String,
    pub cva: String,
    pub meta: RecordMeta,
}

/// A user row together with its card rows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredUser {
    pub user: UserRow,
    pub cards: Vec<CardRow>,
}

/// Which rows a bulk read returns.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scope {
    /// Rows without a soft-delete marker.
    Live,
    /// Every row, soft-deleted ones included.
    All,
}

/// Errors returned by a [`Backend`].
#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("record {0} already exists")]
    Duplicate(Uuid),

    /// The record changed (or disappeared) since it was read.
    #[error("record {0} was modified concurrently")]
    Conflict(Uuid),
}

/// Storage for encrypted user aggregates.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Insert a new aggregate. Fails with [`PersistenceError::Duplicate`] if the id exists.
    async fn insert(&self, user: StoredUser) -> Result<(), PersistenceError>;

    /// Fetch one aggregate by user id, soft-deleted or not.
    async fn fetch(&self, id: Uuid) -> Result<Option<StoredUser>, PersistenceError>;

    /// Fetch every aggregate in `scope`, ordered by creation time.
    async fn fetch_all(&self, scope: Scope) -> Result<Vec<StoredUser>, PersistenceError>;

    /// Mark a user and its cards deleted. Returns `false` if no live user has this id.
    async fn soft_delete(&self, id: Uuid) -> Result<bool, PersistenceError>;

    /// Open a transaction for bulk updates.
    async fn begin(&self) -> Result<Box<dyn Transaction>, PersistenceError>;
}

/// A unit of work over existing aggregates.
///
/// Dropping a transaction without calling [`Transaction::commit`] discards
/// every staged update.
#[async_trait]
pub trait Transaction: Send {
    /// Stage a replacement for an existing aggregate.
    async fn update(&mut self, user: StoredUser) -> Result<(), PersistenceError>;

    /// Apply every staged update atomically. Returns the number of aggregates written.
    async fn commit(self: Box<Self>) -> Result<usize, PersistenceError>;
}
