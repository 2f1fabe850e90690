//! Authentication middleware for protected endpoints.
//!
//! Extracts the opaque access token from the `Authorization: Bearer <token>`
//! header, resolves it through the session store and injects the
//! authenticated [`User`] into request extensions.
//!
//! # Extracting the User
//!
//! ```rust,no_run
//! use axum::extract::Extension;
//! use phonebook::auth::User;
//!
//! async fn protected_handler(Extension(user): Extension<User>) -> String {
//!     format!("Authenticated as {}", user.email)
//! }
//! # let _ = protected_handler;
//! ```

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};

use super::{AppState, error::ApiError};
use crate::logging::log_security_event;

/// Validate the bearer access token and inject the owning user.
///
/// - **Missing or malformed header**: `401`
/// - **Unknown token**: `401`
/// - **Expired access token**: `401`, the client should refresh
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(|value| value.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(ApiError::MissingBearer)?;

    let user = state.auth_manager.authenticate(token).await.map_err(|e| {
        log_security_event("rejected_access_token", None, &e.to_string());
        ApiError::from(e)
    })?;

    request.extensions_mut().insert(user);
    Ok(next.run(request).await)
}
