//! End-to-end API tests against a live Postgres database.
//!
//! Builds the real router with a per-test database and drives it with
//! in-process requests. Sessions are carried as bearer tokens; the
//! cookie path is asserted on the Set-Cookie headers.

use axum::{
    body::Body,
    http::{header, Request, StatusCode},
    Router,
};
use http_body_util::BodyExt;
use salestrackr_common::{config::AppConfig, db::DbPool};
use salestrackr_gateway::{create_router, AppState};
use sea_orm::SqlxPostgresConnector;
use serde_json::{json, Value};
use std::sync::Arc;
use tower::ServiceExt;

fn test_app(pool: sqlx::PgPool) -> Router {
    let primary = SqlxPostgresConnector::from_sqlx_postgres_pool(pool);
    let state = AppState {
        config: Arc::new(AppConfig::default()),
        db: DbPool {
            primary,
            replica: None,
        },
    };
    create_router(state)
}

async fn send(
    app: &Router,
    method: &str,
    path: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value, Option<String>) {
    let mut builder = Request::builder().method(method).uri(path);
    if let Some(token) = token {
        builder = builder.header(header::AUTHORIZATION, format!("Bearer {token}"));
    }

    let request = match body {
        Some(body) => builder
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .map(String::from);

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };

    (status, body, cookie)
}

async fn register(app: &Router, name: &str, email: &str) -> String {
    let (status, body, _) = send(
        app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "name": name, "email": email, "password": "secret1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["token"].as_str().unwrap().to_string()
}

async fn create_client(app: &Router, token: &str, name: &str) -> String {
    let (status, body, _) = send(
        app,
        "POST",
        "/api/clients",
        Some(token),
        Some(json!({
            "name": name,
            "address": "1 Main St",
            "lat": 40.7,
            "lng": -74.0,
            "region": "North"
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    body["client"]["id"].as_str().unwrap().to_string()
}

#[sqlx::test(migrations = "../../migrations")]
async fn full_visit_lifecycle(pool: sqlx::PgPool) {
    let app = test_app(pool);

    // Register, session cookie bound
    let (status, body, cookie) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "name": "Alice", "email": "alice@x.com", "password": "secret1" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "alice@x.com");
    assert_eq!(body["user"]["role"], "agent");
    let cookie = cookie.unwrap();
    assert!(cookie.contains("HttpOnly"));
    let token = body["token"].as_str().unwrap().to_string();

    // Current user
    let (status, body, _) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["user"]["name"], "Alice");

    // Check in
    let client_id = create_client(&app, &token, "Acme Foods").await;
    let (status, body, _) = send(
        &app,
        "POST",
        "/api/visits/check-in",
        Some(&token),
        Some(json!({ "clientId": client_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["visit"]["client"]["name"], "Acme Foods");
    assert!(body["visit"].get("checkOutTime").is_none());
    let visit_id = body["visit"]["id"].as_str().unwrap().to_string();

    // Second check-in conflicts while the first is open
    let (status, body, _) = send(
        &app,
        "POST",
        "/api/visits/check-in",
        Some(&token),
        Some(json!({ "clientId": client_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "ACTIVE_VISIT_EXISTS");

    // Active visit reflects the open one
    let (status, body, _) = send(&app, "GET", "/api/visits/active", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["visit"]["id"], visit_id.as_str());

    // Check out
    let (status, body, _) = send(
        &app,
        "POST",
        "/api/visits/check-out",
        Some(&token),
        Some(json!({ "visitId": visit_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["visit"]["checkOutTime"].is_string());
    assert!(body["visit"]["durationMinutes"].is_i64());

    // Double checkout conflicts
    let (status, body, _) = send(
        &app,
        "POST",
        "/api/visits/check-out",
        Some(&token),
        Some(json!({ "visitId": visit_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "VISIT_ALREADY_CLOSED");

    // No open visit left
    let (status, body, _) = send(&app, "GET", "/api/visits/active", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["visit"].is_null());

    // History lists the closed visit
    let (status, body, _) = send(&app, "GET", "/api/visits", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["visits"].as_array().unwrap().len(), 1);

    // Logout clears the cookie and kills the session
    let (status, _, cookie) = send(&app, "POST", "/api/auth/logout", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert!(cookie.unwrap().contains("Max-Age=0"));

    let (status, _, _) = send(&app, "GET", "/api/auth/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[sqlx::test(migrations = "../../migrations")]
async fn login_failures_are_indistinguishable(pool: sqlx::PgPool) {
    let app = test_app(pool);
    register(&app, "Alice", "alice@x.com").await;

    let (wrong_password_status, wrong_password_body, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "alice@x.com", "password": "not-it" })),
    )
    .await;
    let (unknown_email_status, unknown_email_body, _) = send(
        &app,
        "POST",
        "/api/auth/login",
        None,
        Some(json!({ "email": "nobody@x.com", "password": "secret1" })),
    )
    .await;

    assert_eq!(wrong_password_status, StatusCode::UNAUTHORIZED);
    assert_eq!(unknown_email_status, StatusCode::UNAUTHORIZED);
    assert_eq!(wrong_password_body, unknown_email_body);
}

#[sqlx::test(migrations = "../../migrations")]
async fn login_issues_a_fresh_token(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let old_token = register(&app, "Alice", "alice@x.com").await;

    // Logging in while carrying a session destroys it and mints a new one
    let request = Request::builder()
        .method("POST")
        .uri("/api/auth/login")
        .header(header::AUTHORIZATION, format!("Bearer {old_token}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(
            json!({ "email": "alice@x.com", "password": "secret1" }).to_string(),
        ))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body: Value = serde_json::from_slice(&bytes).unwrap();
    let new_token = body["token"].as_str().unwrap().to_string();

    assert_ne!(new_token, old_token);

    // The pre-login token is dead
    let (status, _, _) = send(&app, "GET", "/api/auth/me", Some(&old_token), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _, _) = send(&app, "GET", "/api/auth/me", Some(&new_token), None).await;
    assert_eq!(status, StatusCode::OK);
}

#[sqlx::test(migrations = "../../migrations")]
async fn checkout_requires_ownership(pool: sqlx::PgPool) {
    let app = test_app(pool);
    let alice = register(&app, "Alice", "alice@x.com").await;
    let bob = register(&app, "Bob", "bob@x.com").await;

    let client_id = create_client(&app, &alice, "Acme Foods").await;
    let (status, body, _) = send(
        &app,
        "POST",
        "/api/visits/check-in",
        Some(&alice),
        Some(json!({ "clientId": client_id })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let visit_id = body["visit"]["id"].as_str().unwrap().to_string();

    let (status, body, _) = send(
        &app,
        "POST",
        "/api/visits/check-out",
        Some(&bob),
        Some(json!({ "visitId": visit_id })),
    )
    .await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(body["error"]["code"], "FORBIDDEN");

    // Alice can still close it
    let (status, _, _) = send(
        &app,
        "POST",
        "/api/visits/check-out",
        Some(&alice),
        Some(json!({ "visitId": visit_id })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
}

#[sqlx::test(migrations = "../../migrations")]
async fn protected_routes_reject_anonymous_and_garbage_tokens(pool: sqlx::PgPool) {
    let app = test_app(pool);

    let (status, body, _) = send(&app, "GET", "/api/visits", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "UNAUTHORIZED");

    let (status, body, cookie) =
        send(&app, "GET", "/api/visits", Some("sts_bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["error"]["code"], "INVALID_SESSION");
    // The gate clears the dead cookie so the client stops replaying it
    assert!(cookie.unwrap().contains("Max-Age=0"));
}

#[sqlx::test(migrations = "../../migrations")]
async fn duplicate_registration_is_a_bad_request(pool: sqlx::PgPool) {
    let app = test_app(pool);
    register(&app, "Alice", "alice@x.com").await;

    let (status, body, _) = send(
        &app,
        "POST",
        "/api/auth/register",
        None,
        Some(json!({ "name": "Alice2", "email": "ALICE@X.COM", "password": "secret1" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "DUPLICATE_EMAIL");
}
