//! Request and response types of the public HTTP API.
//!
//! Sensitive values only ever travel inbound in plaintext (create requests).
//! Outbound views carry the redacted card number and never the CVA.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

// ---------------------------------------------------------------------------
// Users
// ---------------------------------------------------------------------------

/// Request body for `POST /users/`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateUserRequest {
    /// Full name of the card holder.
    pub name: String,
    /// Cards owned by the user. At least one is required.
    #[serde(default)]
    pub credit_cards: Vec<CreateCardRequest>,
}

/// A single card inside [`CreateUserRequest`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateCardRequest {
    /// Primary account number, digits only.
    pub number: String,
    /// Expiry in `MM/YY` form.
    pub expire_at: String,
    /// Card verification code.
    pub cva: String,
}

/// Outward representation of a user.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserView {
    pub id: Uuid,
    pub name: String,
    pub credit_cards: Vec<CreditCardView>,
}

/// Outward representation of a card.
///
/// `number` is always the redacted form, e.g. `************1111`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreditCardView {
    pub created_at: DateTime<Utc>,
    pub number: String,
    pub expire_at: String,
}

// ---------------------------------------------------------------------------
// Rotation
// ---------------------------------------------------------------------------

/// Response body for a successful `POST /users/rotate`. Serialises as `{}`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RotateResponse {}

// ---------------------------------------------------------------------------
// Error response
// ---------------------------------------------------------------------------

/// Standard error response body returned on any non-2xx status.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Short machine-readable error code (e.g. `"bad_request"`).
    pub code: String,
    /// Human-readable description safe to expose to callers.
    pub message: String,
}

impl ErrorResponse {
    /// Construct an [`ErrorResponse`] from a code and message.
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            message: message.into(),
        }
    }
}
