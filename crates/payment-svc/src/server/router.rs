//! Axum router construction.

use axum::{
    error_handling::HandleErrorLayer,
    routing::{get, post},
    Router,
};
use tower::{timeout::TimeoutLayer, ServiceBuilder};
use tower_http::compression::CompressionLayer;

use super::{handlers, middleware, state::AppState};

/// Build the application [`Router`] with all routes and middleware attached.
///
/// Requests that exceed `state.request_timeout` are answered with a JSON
/// `503`. The rotate route is outside that layer: it receives the same
/// deadline as a cancellation and reports it through its own error.
pub fn build(state: AppState) -> Router {
    let deadline = ServiceBuilder::new()
        .layer(HandleErrorLayer::new(handlers::timed_out))
        .layer(TimeoutLayer::new(state.request_timeout));

    Router::new()
        .route("/", get(handlers::liveness))
        .route(
            "/users",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/",
            get(handlers::list_users).post(handlers::create_user),
        )
        .route(
            "/users/:id",
            get(handlers::get_user).delete(handlers::delete_user),
        )
        .layer(deadline)
        .route("/users/rotate", post(handlers::rotate))
        .fallback(handlers::not_found)
        .layer(middleware::trace_layer())
        .layer(CompressionLayer::new())
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{body::Body, http::Request};
    use axum_test::TestServer;
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use std::{sync::Arc, time::Duration};

    use crate::store::{Backend, MemoryBackend};
    use crate::testing;

    async fn slow_server(timeout: Duration) -> TestServer {
        let slow = testing::SlowBackend::new(MemoryBackend::new(), Duration::from_secs(30));
        let state = testing::app_state_over(Arc::new(slow), timeout).await;
        TestServer::new(build(state)).unwrap()
    }

    async fn server() -> (TestServer, crate::store::MemoryBackend) {
        let (state, backend) = testing::app_state().await;
        let app = build(state);
        (TestServer::new(app).unwrap(), backend)
    }

    fn alice_body() -> Value {
        json!({
            "name": "Alice",
            "credit_cards": [
                {"number": "4000000000000002", "expire_at": "03/25", "cva": "123"}
            ]
        })
    }

    #[tokio::test]
    async fn unknown_route_returns_404() {
        let app = build(testing::app_state().await.0);
        let req = Request::builder()
            .uri("/unknown")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), 404);
    }

    #[tokio::test]
    async fn liveness_route_exists() {
        let (server, _) = server().await;
        let resp = server.get("/").await;
        resp.assert_status_ok();
        assert_eq!(resp.text(), "ok");
    }

    #[tokio::test]
    async fn alice_end_to_end() {
        let (server, backend) = server().await;

        let resp = server.post("/users/").json(&alice_body()).await;
        resp.assert_status(axum::http::StatusCode::CREATED);
        let created: Value = resp.json();
        assert_eq!(created["name"], "Alice");
        assert_eq!(created["credit_cards"][0]["number"], "************0002");
        assert_eq!(created["credit_cards"][0]["expire_at"], "03/25");
        assert!(created["credit_cards"][0].get("cva").is_none());

        let id: uuid::Uuid = created["id"].as_str().unwrap().parse().unwrap();
        let row = backend.fetch(id).await.unwrap().unwrap();
        assert!(!row.user.name.contains("Alice"));
        assert!(!row.cards[0].number.contains("4000000000000002"));

        let listed: Value = server.get("/users/").await.json();
        assert_eq!(listed.as_array().unwrap().len(), 1);
        assert_eq!(listed[0]["id"], created["id"]);
        assert_eq!(listed[0]["name"], "Alice");
        assert_eq!(listed[0]["credit_cards"][0]["number"], "************0002");
        assert_eq!(listed[0]["credit_cards"][0]["expire_at"], "03/25");
        assert!(listed[0]["credit_cards"][0].get("cva").is_none());

        let fetched: Value = server.get(&format!("/users/{id}")).await.json();
        assert_eq!(fetched["name"], "Alice");
    }

    #[tokio::test]
    async fn rotate_with_no_users_returns_empty_object() {
        let (server, _) = server().await;
        let resp = server.post("/users/rotate").await;
        resp.assert_status_ok();
        assert_eq!(resp.json::<Value>(), json!({}));
    }

    #[tokio::test]
    async fn rotate_keeps_users_readable() {
        let (server, backend) = server().await;
        let created: Value = server.post("/users/").json(&alice_body()).await.json();
        let id: uuid::Uuid = created["id"].as_str().unwrap().parse().unwrap();
        let before = backend.fetch(id).await.unwrap().unwrap();

        server.post("/users/rotate").await.assert_status_ok();

        let after = backend.fetch(id).await.unwrap().unwrap();
        assert_ne!(before.user.name, after.user.name);
        let fetched: Value = server.get(&format!("/users/{id}")).await.json();
        assert_eq!(fetched["name"], "Alice");
        assert_eq!(fetched["credit_cards"][0]["number"], "************0002");
    }

    #[tokio::test]
    async fn invalid_create_is_400_without_echoing_input() {
        let (server, _) = server().await;
        let resp = server
            .post("/users/")
            .json(&json!({
                "name": "Alice",
                "credit_cards": [{"number": "4000-0000", "expire_at": "03/25", "cva": "123"}]
            }))
            .await;
        resp.assert_status_bad_request();
        let body: Value = resp.json();
        assert_eq!(body["code"], "bad_request");
        assert!(!resp.text().contains("4000-0000"));
    }

    #[tokio::test]
    async fn create_without_cards_is_400() {
        let (server, _) = server().await;
        let resp = server.post("/users/").json(&json!({"name": "Alice"})).await;
        resp.assert_status_bad_request();
    }

    #[tokio::test]
    async fn malformed_body_is_400() {
        let (server, _) = server().await;
        let resp = server.post("/users/").json(&json!({"credit_cards": 7})).await;
        resp.assert_status_bad_request();
        assert_eq!(resp.json::<Value>()["code"], "bad_request");
    }

    #[tokio::test]
    async fn delete_hides_user_and_second_delete_is_404() {
        let (server, backend) = server().await;
        let created: Value = server.post("/users/").json(&alice_body()).await.json();
        let id = created["id"].as_str().unwrap().to_owned();

        server
            .delete(&format!("/users/{id}"))
            .await
            .assert_status(axum::http::StatusCode::NO_CONTENT);
        server
            .get(&format!("/users/{id}"))
            .await
            .assert_status_not_found();
        server
            .delete(&format!("/users/{id}"))
            .await
            .assert_status_not_found();

        let listed: Value = server.get("/users/").await.json();
        assert!(listed.as_array().unwrap().is_empty());
        let rows = backend.fetch_all(crate::store::Scope::All).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert!(rows[0].user.meta.is_deleted());
    }

    #[tokio::test]
    async fn slow_request_times_out_with_json_503() {
        let server = slow_server(Duration::from_millis(50)).await;
        let resp = server.get("/users/").await;
        resp.assert_status(axum::http::StatusCode::SERVICE_UNAVAILABLE);
        let body: Value = resp.json();
        assert_eq!(body["code"], "service_unavailable");
        assert_eq!(body["message"], "request timed out");
    }

    #[tokio::test]
    async fn slow_rotation_is_cancelled_at_the_deadline() {
        let server = slow_server(Duration::from_millis(50)).await;
        let resp = tokio::time::timeout(Duration::from_secs(5), server.post("/users/rotate"))
            .await
            .expect("rotation outlived its deadline");
        resp.assert_status(axum::http::StatusCode::INTERNAL_SERVER_ERROR);
        let body: Value = resp.json();
        assert_eq!(body["code"], "internal_error");
        assert_eq!(body["message"], "rotation cancelled");
    }
}
