//! Axum request handlers for all service endpoints.

use axum::{
    extract::{rejection::JsonRejection, Path, State},
    BoxError,
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use common::{
    protocol::{CreateUserRequest, ErrorResponse, RotateResponse, UserView},
    ServiceError,
};
use tower::timeout::error::Elapsed;
use tracing::{info, warn};
use uuid::Uuid;

use super::{error::ApiError, state::AppState};
use crate::payment::UserBuilder;

/// `GET /` — liveness check.
pub async fn liveness() -> &'static str {
    "ok"
}

/// `GET /users/` — every live user, card numbers redacted.
pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<UserView>>, ApiError> {
    let users = state.users.find_all().await?;
    Ok(Json(users.iter().map(|u| u.to_view()).collect()))
}

/// `POST /users/` — validate, encrypt and persist a user with its cards.
///
/// Responds with the record as re-read from storage, so a successful
/// response proves the stored ciphertext decrypts.
pub async fn create_user(
    State(state): State<AppState>,
    body: Result<Json<CreateUserRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = body?;
    let user = req
        .credit_cards
        .into_iter()
        .fold(UserBuilder::new(req.name), |b, c| {
            b.add_card(c.number, c.expire_at, c.cva)
        })
        .build()?;

    state.users.save(&user).await?;
    let stored = state.users.find_by_id(user.id).await?.ok_or_else(|| {
        ServiceError::Internal(format!("user {} vanished after insert", user.id))
    })?;

    info!(user_id = %stored.id, cards = stored.credit_cards.len(), "user created");
    Ok((StatusCode::CREATED, Json(stored.to_view())))
}

/// `GET /users/:id` — one live user.
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserView>, ApiError> {
    let id = parse_id(&id)?;
    let user = state
        .users
        .find_by_id(id)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("user {id}")))?;
    Ok(Json(user.to_view()))
}

/// `DELETE /users/:id` — soft delete a user and its cards.
pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let id = parse_id(&id)?;
    if state.users.soft_delete(id).await? {
        info!(user_id = %id, "user deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(ServiceError::NotFound(format!("user {id}")).into())
    }
}

/// `POST /users/rotate` — re-encrypt every stored record.
///
/// The rotation is cancelled at shutdown or once the request deadline
/// passes, whichever comes first.
pub async fn rotate(State(state): State<AppState>) -> Result<Json<RotateResponse>, ApiError> {
    let cancel = state.shutdown.child_token();
    let deadline = tokio::spawn({
        let cancel = cancel.clone();
        let timeout = state.request_timeout;
        async move {
            tokio::time::sleep(timeout).await;
            cancel.cancel();
        }
    });

    let result = state.rotation.rotate_all(&cancel).await;
    deadline.abort();
    result?;
    Ok(Json(RotateResponse::default()))
}

/// Renders errors raised by the timeout layer.
pub async fn timed_out(err: BoxError) -> ApiError {
    if err.is::<Elapsed>() {
        warn!("request deadline exceeded");
        ServiceError::Unavailable("request timed out".into()).into()
    } else {
        ServiceError::Internal(err.to_string()).into()
    }
}

/// Catch-all 404 handler.
pub async fn not_found() -> impl IntoResponse {
    let err = ErrorResponse::new("not_found", "the requested resource does not exist");
    (StatusCode::NOT_FOUND, Json(err))
}

fn parse_id(raw: &str) -> Result<Uuid, ApiError> {
    Uuid::parse_str(raw)
        .map_err(|_| ServiceError::BadRequest("user id must be a UUID".into()).into())
}
