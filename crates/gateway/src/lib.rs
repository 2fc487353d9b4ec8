//! SalesTrackr API Gateway
//!
//! Router construction and shared application state. The binary in
//! `main.rs` wires this up; integration tests build the same router
//! against a test database.

pub mod handlers;
pub mod middleware;

use axum::{
    extract::Request,
    middleware::Next,
    routing::{get, post},
    Router,
};
use salestrackr_common::{config::AppConfig, db::DbPool};
use std::sync::Arc;
use tower_http::{
    cors::{Any, CorsLayer},
    request_id::{MakeRequestUuid, PropagateRequestIdLayer, SetRequestIdLayer},
    timeout::TimeoutLayer,
    trace::TraceLayer,
};

use crate::middleware::rate_limit::{create_rate_limiter, rate_limit_middleware};

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub db: DbPool,
}

/// Create the main application router
pub fn create_router(state: AppState) -> Router {
    // CORS configuration
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    // Request ID propagation
    let request_id = SetRequestIdLayer::x_request_id(MakeRequestUuid);
    let propagate_id = PropagateRequestIdLayer::x_request_id();

    // Credential endpoints carry the brute-force rate limit
    let mut credential_routes = Router::new()
        .route("/auth/register", post(handlers::auth::register))
        .route("/auth/login", post(handlers::auth::login));

    if state.config.rate_limit.enabled {
        let limiter = create_rate_limiter(
            state.config.rate_limit.requests_per_second,
            state.config.rate_limit.burst,
        );
        credential_routes = credential_routes.layer(axum::middleware::from_fn(
            move |request: Request, next: Next| rate_limit_middleware(request, next, limiter.clone()),
        ));
    }

    // Everything past the auth gate
    let protected_routes = Router::new()
        .route("/auth/me", get(handlers::auth::me))
        .route("/clients", get(handlers::clients::list_clients))
        .route("/clients", post(handlers::clients::create_client))
        .route("/clients/{id}", get(handlers::clients::get_client))
        .route("/visits", get(handlers::visits::list_visits))
        .route("/visits/active", get(handlers::visits::active_visit))
        .route("/visits/check-in", post(handlers::visits::check_in))
        .route("/visits/check-out", post(handlers::visits::check_out))
        .route("/visits/{id}", get(handlers::visits::get_visit))
        .route_layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth::require_auth,
        ));

    let api_routes = Router::new()
        // Health endpoints (no auth)
        .route("/health", get(handlers::health::health))
        .route("/ready", get(handlers::health::ready))
        // Logout is public so a client with a dead session can still clear it
        .route("/auth/logout", post(handlers::auth::logout))
        .merge(credential_routes)
        .merge(protected_routes);

    // Compose the app
    Router::new()
        .nest("/api", api_routes)
        .layer(axum::middleware::from_fn(middleware::metrics::track_metrics))
        .layer(TraceLayer::new_for_http())
        .layer(TimeoutLayer::new(state.config.request_timeout()))
        .layer(cors)
        .layer(request_id)
        .layer(propagate_id)
        .with_state(state)
}
