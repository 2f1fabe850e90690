//! HTTP API for the phonebook authentication service.
//!
//! # Modules
//!
//! - [`auth`]: Registration, login, session rotation, password and Google flows
//! - [`cookies`]: `sessionId` / `refreshToken` cookie handling
//! - [`error`]: Error type and response envelope
//! - [`middleware`]: Bearer authentication for protected endpoints
//! - [`request_id`]: Request correlation ids
//!
//! # Endpoints Overview
//!
//! ## Public
//! - `POST /auth/register` - Register and log in
//! - `POST /auth/login` - Login with email and password
//! - `POST /auth/logout` - Delete the cookie session
//! - `POST /auth/refresh` - Rotate the cookie session (also `/auth/refreshToken`)
//! - `POST /auth/send-reset-email` - Email a reset link
//! - `POST /auth/reset-pwd` - Redeem a reset link
//! - `GET /auth/get-oauth-url` - Google consent URL
//! - `POST /auth/confirm-oauth` - Google sign-in with an authorization code
//!
//! ## Bearer Token Required
//! - `POST /auth/send-set-pwd-email` - Email a set-password link
//! - `POST /auth/set-password` - Redeem a set-password link
//! - `GET /auth/refresh-user` - Current user's profile
//!
//! ## Health Check
//! - `GET /health` - Server health status

pub mod auth;
pub mod cookies;
pub mod error;
pub mod middleware;
pub mod request_id;

use axum::{
    Router,
    extract::State,
    http::{HeaderValue, Method, StatusCode, header},
    response::{IntoResponse, Json},
    routing::{get, post},
};
use phonebook::{AuthManager, db::Database};
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

/// Application state shared across all HTTP handlers.
///
/// # Fields
///
/// - `auth_manager`: Runs every authentication flow
/// - `database`: Pool for health checks; `None` when running on in-memory stores
/// - `cookie_secure`: Whether session cookies carry the `Secure` flag
#[derive(Clone)]
pub struct AppState {
    pub auth_manager: Arc<AuthManager>,
    pub database: Option<Database>,
    pub cookie_secure: bool,
}

/// Create the complete API router with all endpoints and middleware.
///
/// # Example
///
/// ```rust,no_run
/// # use pb_server::api::{create_router, AppState};
/// # async fn example() -> Result<(), Box<dyn std::error::Error>> {
/// # let state: AppState = unimplemented!();
/// let app = create_router(state);
/// let listener = tokio::net::TcpListener::bind("0.0.0.0:3000").await?;
/// axum::serve(listener, app).await?;
/// # Ok(())
/// # }
/// ```
pub fn create_router(state: AppState) -> Router {
    // Public routes (no authentication middleware)
    let public_routes = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login))
        .route("/auth/logout", post(auth::logout))
        .route("/auth/refresh", post(auth::refresh))
        .route("/auth/refreshToken", post(auth::refresh))
        .route("/auth/send-reset-email", post(auth::send_reset_email))
        .route("/auth/reset-pwd", post(auth::reset_password))
        .route("/auth/get-oauth-url", get(auth::get_oauth_url))
        .route("/auth/confirm-oauth", post(auth::confirm_oauth));

    // Protected routes (require a bearer access token)
    let protected_routes = Router::new()
        .route("/auth/send-set-pwd-email", post(auth::send_set_password_email))
        .route("/auth/set-password", post(auth::set_password))
        .route("/auth/refresh-user", get(auth::refresh_user))
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::auth_middleware,
        ));

    Router::new()
        .route("/health", get(health_check))
        .merge(public_routes)
        .merge(protected_routes)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}

/// CORS for the configured front-end origins, with credentials so the
/// session cookies travel.
///
/// Origins that are not valid header values are skipped with a warning.
pub fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| match HeaderValue::from_str(origin) {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "Ignoring invalid CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(origins)
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

/// Health check endpoint for monitoring and load balancers.
///
/// Returns `200 OK` when the database answers (or no database is in use),
/// `503 Service Unavailable` otherwise.
///
/// ```bash
/// curl http://localhost:3000/health
/// # {"status":"healthy","version":"1.0.0","database":true,"timestamp":"2026-01-01T10:30:00Z"}
/// ```
async fn health_check(State(state): State<AppState>) -> impl IntoResponse {
    let db_healthy = match &state.database {
        Some(db) => Some(db.health_check().await.is_ok()),
        None => None,
    };

    let overall_healthy = db_healthy.unwrap_or(true);
    let status_code = if overall_healthy {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    let response = json!({
        "status": if overall_healthy { "healthy" } else { "unhealthy" },
        "version": env!("CARGO_PKG_VERSION"),
        "database": db_healthy,
        "timestamp": chrono::Utc::now().to_rfc3339(),
    });

    (status_code, Json(response))
}
