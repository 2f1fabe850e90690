//! Authentication data models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// User ID type
pub type UserId = Uuid;

/// Session ID type
pub type SessionId = Uuid;

/// User model
///
/// `password_hash` holds the configured sentinel for OAuth-only accounts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct User {
    pub id: UserId,
    pub email: String,
    pub password_hash: String,
    pub name: String,
}

/// Fields for a user row that does not exist yet
#[derive(Debug, Clone)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub name: String,
}

/// Session model
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    pub id: SessionId,
    pub user_id: UserId,
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_valid_until: DateTime<Utc>,
    pub refresh_token_valid_until: DateTime<Utc>,
}

/// Freshly issued opaque token pair with expiry instants
#[derive(Debug, Clone)]
pub struct SessionTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub access_token_valid_until: DateTime<Utc>,
    pub refresh_token_valid_until: DateTime<Utc>,
}

/// Stored reset/set password token record, one per user
#[derive(Debug, Clone)]
pub struct ResetToken {
    pub user_id: UserId,
    pub reset_password_token_hash: String,
    pub reset_password_token_valid_until: DateTime<Utc>,
}

/// A user together with the session just issued for them
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub session: Session,
}

/// Public view of the authenticated user
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserProfile {
    pub email: String,
    pub name: String,
    pub is_password_set: bool,
}

/// User registration request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

/// User login request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

/// Refresh request, read from the client's cookies
#[derive(Debug, Clone)]
pub struct RefreshRequest {
    pub session_id: SessionId,
    pub refresh_token: String,
}

/// Password reset/set confirmation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PasswordChangeRequest {
    pub token: String,
    pub password: String,
}

/// JWT claims for reset/set verification tokens
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerificationClaims {
    pub sub: UserId,
    pub email: String,
    pub exp: i64, // Expiration timestamp
    pub iat: i64, // Issued at timestamp
}

/// Profile claims returned by the identity provider after code exchange
#[derive(Debug, Clone, Default, Deserialize)]
pub struct VerifiedProfile {
    pub email: Option<String>,
    pub given_name: Option<String>,
    pub family_name: Option<String>,
    pub name: Option<String>,
}
