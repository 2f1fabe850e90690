//! Authentication API handlers.
//!
//! Every response uses the `{status, message, data}` envelope. Handlers that
//! open a session set the `sessionId` and `refreshToken` cookies; the access
//! token travels in the body and comes back as a bearer header.
//!
//! # Examples
//!
//! Register a new user:
//! ```bash
//! curl -X POST http://localhost:3000/auth/register \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Ann", "email": "ann@example.com", "password": "Pass123!"}'
//! ```
//!
//! Refresh a session from its cookies:
//! ```bash
//! curl -X POST http://localhost:3000/auth/refresh \
//!   --cookie "sessionId=...; refreshToken=..."
//! ```

use axum::{
    Extension, Json,
    extract::State,
    http::StatusCode,
};
use axum_extra::extract::cookie::CookieJar;
use phonebook::auth::{
    AuthSession, LoginRequest, PasswordChangeRequest, RefreshRequest, RegisterRequest, User,
    UserProfile,
};
use serde::{Deserialize, Serialize};

use super::{
    AppState, cookies,
    error::{ApiError, ApiResult, Envelope},
    request_id::RequestId,
};
use crate::{logging::log_security_event, metrics};

const RESET_EMAIL_MESSAGE: &str =
    "If the account exists, a password reset has been sent on email.";
const SET_EMAIL_MESSAGE: &str =
    "If the account exists, a password setter has been sent on email.";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub email: String,
    pub name: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionData {
    pub access_token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserSummary>,
}

#[derive(Debug, Serialize)]
pub struct Empty {}

#[derive(Debug, Serialize)]
pub struct OAuthUrlData {
    pub url: String,
}

#[derive(Debug, Deserialize)]
pub struct EmailPayload {
    pub email: String,
}

#[derive(Debug, Deserialize)]
pub struct OAuthCodePayload {
    pub code: String,
}

type SessionResponse = (StatusCode, CookieJar, Json<Envelope<SessionData>>);
type MessageResponse = (StatusCode, CookieJar, Json<Envelope<Empty>>);

fn session_response(
    state: &AppState,
    jar: CookieJar,
    status: StatusCode,
    message: &str,
    auth: AuthSession,
    include_user: bool,
) -> SessionResponse {
    let jar = cookies::with_session(jar, &auth.session, state.cookie_secure);
    let user = include_user.then(|| UserSummary {
        email: auth.user.email,
        name: auth.user.name,
    });

    (
        status,
        jar,
        Json(Envelope::new(
            status,
            message,
            SessionData {
                access_token: auth.session.access_token,
                user,
            },
        )),
    )
}

fn require_email(email: &str) -> ApiResult<()> {
    let email = email.trim();
    match email.split_once('@') {
        Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
        _ => Err(ApiError::Validation("A valid email is required".to_string())),
    }
}

fn require_non_empty(field: &str, value: &str) -> ApiResult<()> {
    if value.trim().is_empty() {
        return Err(ApiError::Validation(format!("{field} is required")));
    }
    Ok(())
}

/// Register a new user account and open a session.
///
/// # Request Body
///
/// ```json
/// { "name": "Ann", "email": "ann@example.com", "password": "SecurePass123!" }
/// ```
///
/// # Response
///
/// `201 Created`, session cookies, and
/// `{ "accessToken": "...", "user": { "email": "...", "name": "..." } }`.
///
/// # Errors
///
/// - `400 Bad Request`: Missing name or password, malformed email
/// - `409 Conflict`: Email in use
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<RegisterRequest>,
) -> ApiResult<SessionResponse> {
    require_non_empty("name", &request.name)?;
    require_email(&request.email)?;
    require_non_empty("password", &request.password)?;

    let auth = state.auth_manager.register(request).await?;
    metrics::registrations_total();

    Ok(session_response(
        &state,
        jar,
        StatusCode::CREATED,
        "Successfully registered a user!",
        auth,
        true,
    ))
}

/// Authenticate with email and password.
///
/// # Errors
///
/// - `404 Not Found`: No account for the email
/// - `401 Unauthorized`: Wrong password
pub async fn login(
    State(state): State<AppState>,
    request_id: RequestId,
    jar: CookieJar,
    Json(request): Json<LoginRequest>,
) -> ApiResult<SessionResponse> {
    require_email(&request.email)?;
    require_non_empty("password", &request.password)?;

    match state.auth_manager.login(request).await {
        Ok(auth) => {
            metrics::login_attempts_total(true);
            Ok(session_response(
                &state,
                jar,
                StatusCode::OK,
                "Successfully logged in a user!",
                auth,
                true,
            ))
        }
        Err(e) => {
            metrics::login_attempts_total(false);
            log_security_event(
                "failed_login",
                None,
                &format!("{} (request {})", e, request_id.as_str()),
            );
            Err(e.into())
        }
    }
}

/// Delete the session named by the `sessionId` cookie and clear cookies.
///
/// # Errors
///
/// - `401 Unauthorized`: No session cookie
pub async fn logout(State(state): State<AppState>, jar: CookieJar) -> ApiResult<(StatusCode, CookieJar)> {
    let session_id = cookies::session_id(&jar).ok_or(ApiError::MissingSession)?;
    state.auth_manager.logout(session_id).await?;

    Ok((
        StatusCode::NO_CONTENT,
        cookies::cleared(jar, state.cookie_secure),
    ))
}

/// Rotate the session named by the cookies.
///
/// The presented pair stops working; new cookies and a new access token
/// are returned.
///
/// # Errors
///
/// - `401 Unauthorized`: Cookies missing or no matching session
pub async fn refresh(State(state): State<AppState>, jar: CookieJar) -> ApiResult<SessionResponse> {
    let request = match (cookies::session_id(&jar), cookies::refresh_token(&jar)) {
        (Some(session_id), Some(refresh_token)) => RefreshRequest {
            session_id,
            refresh_token,
        },
        _ => return Err(ApiError::MissingSession),
    };
    let session_id = request.session_id;

    let session = match state.auth_manager.refresh_session(request).await {
        Ok(session) => session,
        Err(e) => {
            metrics::session_refreshes_total(false);
            log_security_event(
                "rejected_refresh",
                None,
                &format!("{} (session {})", e, session_id),
            );
            return Err(e.into());
        }
    };
    metrics::session_refreshes_total(true);

    let jar = cookies::with_session(jar, &session, state.cookie_secure);
    Ok((
        StatusCode::OK,
        jar,
        Json(Envelope::new(
            StatusCode::OK,
            "Successfully refreshed a session!",
            SessionData {
                access_token: session.access_token,
                user: None,
            },
        )),
    ))
}

/// Email a password-reset link.
///
/// Answers the same way whether or not the account exists.
///
/// # Errors
///
/// - `503 Service Unavailable`: The email could not be sent
pub async fn send_reset_email(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<EmailPayload>,
) -> ApiResult<MessageResponse> {
    require_email(&payload.email)?;
    state.auth_manager.request_reset_token(&payload.email).await?;
    metrics::password_emails_total("reset");

    Ok((
        StatusCode::OK,
        jar,
        Json(Envelope::new(StatusCode::OK, RESET_EMAIL_MESSAGE, Empty {})),
    ))
}

/// Redeem a reset token, revoke the caller's session and clear cookies.
///
/// # Errors
///
/// - `401 Unauthorized`: Token invalid, expired or already used
/// - `404 Not Found`: The token's account no longer exists
pub async fn reset_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<PasswordChangeRequest>,
) -> ApiResult<MessageResponse> {
    require_non_empty("token", &request.token)?;
    require_non_empty("password", &request.password)?;

    let session_id = cookies::session_id(&jar);
    state
        .auth_manager
        .reset_password(request, session_id)
        .await
        .inspect_err(|e| log_security_event("rejected_reset", None, &e.to_string()))?;

    Ok((
        StatusCode::OK,
        cookies::cleared(jar, state.cookie_secure),
        Json(Envelope::new(
            StatusCode::OK,
            "Password was successfully reset!",
            Empty {},
        )),
    ))
}

/// Google consent URL.
pub async fn get_oauth_url(State(state): State<AppState>) -> ApiResult<Json<Envelope<OAuthUrlData>>> {
    let url = state.auth_manager.google_auth_url()?;

    Ok(Json(Envelope::new(
        StatusCode::OK,
        "Successfully get Google OAuth url!",
        OAuthUrlData { url },
    )))
}

/// Log in (or sign up) with a Google authorization code.
///
/// # Errors
///
/// - `401 Unauthorized`: Google rejected the code or returned no email
pub async fn confirm_oauth(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(payload): Json<OAuthCodePayload>,
) -> ApiResult<SessionResponse> {
    require_non_empty("code", &payload.code)?;

    let auth = match state.auth_manager.login_or_signup_with_google(&payload.code).await {
        Ok(auth) => auth,
        Err(e) => {
            metrics::oauth_logins_total(false);
            return Err(e.into());
        }
    };
    metrics::oauth_logins_total(true);

    Ok(session_response(
        &state,
        jar,
        StatusCode::OK,
        "Successfully logged in with Google OAuth!",
        auth,
        false,
    ))
}

/// Email a set-password link to the authenticated OAuth-only account.
///
/// # Errors
///
/// - `409 Conflict`: The account already has a password
/// - `503 Service Unavailable`: The email could not be sent
pub async fn send_set_password_email(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    jar: CookieJar,
) -> ApiResult<MessageResponse> {
    state
        .auth_manager
        .request_set_password_token(&user.email)
        .await?;
    metrics::password_emails_total("set");

    Ok((
        StatusCode::OK,
        jar,
        Json(Envelope::new(StatusCode::OK, SET_EMAIL_MESSAGE, Empty {})),
    ))
}

/// Redeem a set-password token. Sessions stay valid.
pub async fn set_password(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(request): Json<PasswordChangeRequest>,
) -> ApiResult<MessageResponse> {
    require_non_empty("token", &request.token)?;
    require_non_empty("password", &request.password)?;

    state.auth_manager.set_password(request).await?;

    Ok((
        StatusCode::OK,
        jar,
        Json(Envelope::new(
            StatusCode::OK,
            "Password was successfully set!",
            Empty {},
        )),
    ))
}

/// Profile of the authenticated user.
pub async fn refresh_user(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
) -> Json<Envelope<UserProfile>> {
    Json(Envelope::new(
        StatusCode::OK,
        "Successfully refreshed a user's info!",
        state.auth_manager.refresh_user(&user),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_require_email() {
        assert!(require_email("a@x.com").is_ok());
        assert!(require_email(" a@x.com ").is_ok());
        assert!(require_email("ax.com").is_err());
        assert!(require_email("@x.com").is_err());
        assert!(require_email("a@localhost").is_err());
    }

    #[test]
    fn test_require_non_empty() {
        assert!(require_non_empty("name", "Ann").is_ok());
        assert!(matches!(
            require_non_empty("name", "   "),
            Err(ApiError::Validation(msg)) if msg == "name is required"
        ));
    }
}
