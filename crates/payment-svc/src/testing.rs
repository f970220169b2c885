//! Fixtures shared by unit tests across modules.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::crypto::{cipher::random_key, FieldCipher};
use crate::keys::KeyProvider;
use crate::kms::LocalKms;
use crate::payment::{FieldCodec, User, UserBuilder};
use crate::rotation::RotationCoordinator;
use crate::server::{middleware, state::AppState};
use crate::store::{
    Backend, MemoryBackend, PersistenceError, Scope, StoredUser, Transaction, UserRepository,
};

/// A provider over a fresh in-process KEK.
pub async fn key_provider() -> Arc<KeyProvider> {
    let kms = Arc::new(LocalKms::new(random_key()));
    Arc::new(KeyProvider::initialize(kms).await.unwrap())
}

pub async fn codec() -> FieldCodec {
    FieldCodec::new(FieldCipher::new(key_provider().await))
}

/// A repository and a second handle to the backend behind it.
pub async fn repository() -> (UserRepository, MemoryBackend) {
    let backend = MemoryBackend::new();
    let repo = UserRepository::new(Arc::new(backend.clone()), codec().await);
    (repo, backend)
}

pub fn user(name: &str, number: &str) -> User {
    UserBuilder::new(name)
        .add_card(number, "03/25", "123")
        .build()
        .unwrap()
}

pub fn alice() -> User {
    user("Alice", "4000000000000002")
}

/// Application state over a fresh backend, with data-key rotation disabled.
pub async fn app_state() -> (AppState, MemoryBackend) {
    let backend = MemoryBackend::new();
    let state = app_state_over(Arc::new(backend.clone()), middleware::REQUEST_TIMEOUT).await;
    (state, backend)
}

/// Application state over `backend` with the given request deadline.
pub async fn app_state_over(backend: Arc<dyn Backend>, request_timeout: Duration) -> AppState {
    let keys = key_provider().await;
    let repo = UserRepository::new(backend, FieldCodec::new(FieldCipher::new(keys.clone())));
    let rotation = RotationCoordinator::new(repo.clone(), keys, false);
    AppState::new(repo, rotation, CancellationToken::new(), request_timeout)
}

/// A backend whose bulk reads take `delay` before answering.
pub struct SlowBackend {
    inner: MemoryBackend,
    delay: Duration,
}

impl SlowBackend {
    pub fn new(inner: MemoryBackend, delay: Duration) -> Self {
        Self { inner, delay }
    }
}

#[async_trait]
impl Backend for SlowBackend {
    async fn insert(&self, user: StoredUser) -> Result<(), PersistenceError> {
        self.inner.insert(user).await
    }
    async fn fetch(&self, id: Uuid) -> Result<Option<StoredUser>, PersistenceError> {
        self.inner.fetch(id).await
    }
    async fn fetch_all(&self, scope: Scope) -> Result<Vec<StoredUser>, PersistenceError> {
        tokio::time::sleep(self.delay).await;
        self.inner.fetch_all(scope).await
    }
    async fn soft_delete(&self, id: Uuid) -> Result<bool, PersistenceError> {
        self.inner.soft_delete(id).await
    }
    async fn begin(&self) -> Result<Box<dyn Transaction>, PersistenceError> {
        self.inner.begin().await
    }
}
