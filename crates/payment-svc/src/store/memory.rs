//! In-memory [`Backend`] with optimistic-concurrency transactions.

use std::{collections::HashMap, sync::Arc};

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{Backend, CardRow, PersistenceError, RecordMeta, Scope, StoredUser, Transaction};

/// Thread-safe in-memory storage of user aggregates.
///
/// Cloning yields another handle to the same rows.
#[derive(Clone, Debug, Default)]
pub struct MemoryBackend {
    rows: Arc<RwLock<HashMap<Uuid, StoredUser>>>,
}

impl MemoryBackend {
    /// Create a new, empty [`MemoryBackend`].
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn insert(&self, mut user: StoredUser) -> Result<(), PersistenceError> {
        let mut rows = self.rows.write().await;
        if rows.contains_key(&user.user.id) {
            return Err(PersistenceError::Duplicate(user.user.id));
        }
        let now = Utc::now();
        touch(&mut user.user.meta, now);
        for card in &mut user.cards {
            touch(&mut card.meta, now);
        }
        rows.insert(user.user.id, user);
        Ok(())
    }

    async fn fetch(&self, id: Uuid) -> Result<Option<StoredUser>, PersistenceError> {
        Ok(self.rows.read().await.get(&id).cloned())
    }

    async fn fetch_all(&self, scope: Scope) -> Result<Vec<StoredUser>, PersistenceError> {
        let rows = self.rows.read().await;
        let mut users: Vec<StoredUser> = rows
            .values()
            .filter(|u| scope == Scope::All || !u.user.meta.is_deleted())
            .cloned()
            .map(|mut u| {
                if scope == Scope::Live {
                    u.cards.retain(|c| !c.meta.is_deleted());
                }
                u
            })
            .collect();
        users.sort_by(|a, b| {
            a.user
                .meta
                .created_at
                .cmp(&b.user.meta.created_at)
                .then(a.user.id.cmp(&b.user.id))
        });
        Ok(users)
    }

    async fn soft_delete(&self, id: Uuid) -> Result<bool, PersistenceError> {
        let mut rows = self.rows.write().await;
        let Some(user) = rows.get_mut(&id) else {
            return Ok(false);
        };
        if user.user.meta.is_deleted() {
            return Ok(false);
        }
        let now = Utc::now();
        user.user.meta.deleted_at = Some(now);
        touch(&mut user.user.meta, now);
        for card in user.cards.iter_mut().filter(|c| !c.meta.is_deleted()) {
            card.meta.deleted_at = Some(now);
            touch(&mut card.meta, now);
        }
        Ok(true)
    }

    async fn begin(&self) -> Result<Box<dyn Transaction>, PersistenceError> {
        Ok(Box::new(MemoryTransaction {
            rows: self.rows.clone(),
            staged: Vec::new(),
        }))
    }
}

/// Staged updates against a [`MemoryBackend`].
struct MemoryTransaction {
    rows: Arc<RwLock<HashMap<Uuid, StoredUser>>>,
    staged: Vec<StoredUser>,
}

#[async_trait]
impl Transaction for MemoryTransaction {
    async fn update(&mut self, user: StoredUser) -> Result<(), PersistenceError> {
        self.staged.push(user);
        Ok(())
    }

    async fn commit(self: Box<Self>) -> Result<usize, PersistenceError> {
        let MemoryTransaction { rows, staged } = *self;
        let mut rows = rows.write().await;

        // Validate everything before touching anything.
        for staged in &staged {
            let current = rows
                .get(&staged.user.id)
                .ok_or(PersistenceError::Conflict(staged.user.id))?;
            if current.user.meta.version != staged.user.meta.version
                || !cards_unchanged(&current.cards, &staged.cards)
            {
                return Err(PersistenceError::Conflict(staged.user.id));
            }
        }

        let now = Utc::now();
        let count = staged.len();
        for mut staged in staged {
            touch(&mut staged.user.meta, now);
            for card in &mut staged.cards {
                touch(&mut card.meta, now);
            }
            rows.insert(staged.user.id, staged);
        }
        Ok(count)
    }
}

/// `true` if `staged` covers exactly the cards in `current`, each at the same version.
fn cards_unchanged(current: &[CardRow], staged: &[CardRow]) -> bool {
    current.len() == staged.len()
        && current.iter().all(|c| {
            staged
                .iter()
                .any(|s| s.id == c.id && s.meta.version == c.meta.version)
        })
}

fn touch(meta: &mut RecordMeta, now: chrono::DateTime<Utc>) {
    meta.version += 1;
    meta.updated_at = now;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::UserRow;

    fn aggregate(name: &str) -> StoredUser {
        let now = Utc::now();
        let user_id = Uuid::new_v4();
        StoredUser {
            user: UserRow {
                id: user_id,
                name: name.into(),
                meta: RecordMeta::new(now),
            },
            cards: vec![CardRow {
                id: Uuid::new_v4(),
                user_id,
                number: "n".into(),
                expire_at: "e".into(),
                cva: "c".into(),
                meta: RecordMeta::new(now),
            }],
        }
    }

    #[tokio::test]
    async fn insert_and_fetch() {
        let backend = MemoryBackend::new();
        let row = aggregate("ct-1");
        backend.insert(row.clone()).await.unwrap();

        let fetched = backend.fetch(row.user.id).await.unwrap().unwrap();
        assert_eq!(fetched.user.name, "ct-1");
        assert_eq!(fetched.user.meta.version, 1);
        assert_eq!(fetched.cards[0].meta.version, 1);
    }

    #[tokio::test]
    async fn duplicate_insert_rejected() {
        let backend = MemoryBackend::new();
        let row = aggregate("ct-1");
        backend.insert(row.clone()).await.unwrap();
        assert!(matches!(
            backend.insert(row).await,
            Err(PersistenceError::Duplicate(_))
        ));
    }

    #[tokio::test]
    async fn soft_delete_hides_from_live_scope() {
        let backend = MemoryBackend::new();
        let row = aggregate("ct-1");
        backend.insert(row.clone()).await.unwrap();

        assert!(backend.soft_delete(row.user.id).await.unwrap());
        assert!(!backend.soft_delete(row.user.id).await.unwrap());
        assert!(backend.fetch_all(Scope::Live).await.unwrap().is_empty());

        let all = backend.fetch_all(Scope::All).await.unwrap();
        assert_eq!(all.len(), 1);
        assert!(all[0].user.meta.is_deleted());
        assert!(all[0].cards[0].meta.is_deleted());
    }

    #[tokio::test]
    async fn soft_delete_unknown_returns_false() {
        let backend = MemoryBackend::new();
        assert!(!backend.soft_delete(Uuid::new_v4()).await.unwrap());
    }

    #[tokio::test]
    async fn commit_applies_all_staged_updates() {
        let backend = MemoryBackend::new();
        let a = aggregate("a-old");
        let b = aggregate("b-old");
        backend.insert(a.clone()).await.unwrap();
        backend.insert(b.clone()).await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        for mut row in backend.fetch_all(Scope::All).await.unwrap() {
            row.user.name = row.user.name.replace("old", "new");
            tx.update(row).await.unwrap();
        }
        assert_eq!(tx.commit().await.unwrap(), 2);

        let a = backend.fetch(a.user.id).await.unwrap().unwrap();
        assert_eq!(a.user.name, "a-new");
        assert_eq!(a.user.meta.version, 2);
        assert_eq!(a.cards[0].meta.version, 2);
    }

    #[tokio::test]
    async fn dropped_transaction_applies_nothing() {
        let backend = MemoryBackend::new();
        let row = aggregate("old");
        backend.insert(row.clone()).await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        let mut staged = backend.fetch(row.user.id).await.unwrap().unwrap();
        staged.user.name = "new".into();
        tx.update(staged).await.unwrap();
        drop(tx);

        let stored = backend.fetch(row.user.id).await.unwrap().unwrap();
        assert_eq!(stored.user.name, "old");
    }

    #[tokio::test]
    async fn stale_version_conflicts_and_applies_nothing() {
        let backend = MemoryBackend::new();
        let a = aggregate("a-old");
        let b = aggregate("b-old");
        backend.insert(a.clone()).await.unwrap();
        backend.insert(b.clone()).await.unwrap();

        let snapshot = backend.fetch_all(Scope::All).await.unwrap();
        // A concurrent writer changes `b` after the snapshot was taken.
        backend.soft_delete(b.user.id).await.unwrap();

        let mut tx = backend.begin().await.unwrap();
        for mut row in snapshot {
            row.user.name = "rewritten".into();
            tx.update(row).await.unwrap();
        }
        assert!(matches!(
            tx.commit().await,
            Err(PersistenceError::Conflict(id)) if id == b.user.id
        ));

        let a = backend.fetch(a.user.id).await.unwrap().unwrap();
        assert_eq!(a.user.name, "a-old");
    }

    #[tokio::test]
    async fn fetch_all_orders_by_creation() {
        let backend = MemoryBackend::new();
        let mut first = aggregate("first");
        first.user.meta.created_at = Utc::now() - chrono::Duration::seconds(10);
        let second = aggregate("second");
        backend.insert(second).await.unwrap();
        backend.insert(first).await.unwrap();

        let names: Vec<String> = backend
            .fetch_all(Scope::Live)
            .await
            .unwrap()
            .into_iter()
            .map(|u| u.user.name)
            .collect();
        assert_eq!(names, ["first", "second"]);
    }
}
