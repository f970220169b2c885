//! Shared application state injected into every Axum handler.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::rotation::RotationCoordinator;
use crate::store::UserRepository;

/// Application state shared across all request handlers.
///
/// Every field is cheap to clone so Axum can clone the state per request.
#[derive(Clone)]
pub struct AppState {
    /// Record store for users and their cards.
    pub users: UserRepository,
    /// Full-data-set re-encryption.
    pub rotation: Arc<RotationCoordinator>,
    /// Cancelled when the process begins shutting down.
    pub shutdown: CancellationToken,
    /// Upper bound on a single request, rotations included.
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(
        users: UserRepository,
        rotation: RotationCoordinator,
        shutdown: CancellationToken,
        request_timeout: Duration,
    ) -> Self {
        Self {
            users,
            rotation: Arc::new(rotation),
            shutdown,
            request_timeout,
        }
    }
}
