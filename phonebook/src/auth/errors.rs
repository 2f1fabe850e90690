//! Authentication error types.

use thiserror::Error;

use crate::{db::timeouts::TimeoutError, mail::MailError, oauth::OAuthError};

/// Logical error kinds surfaced to the boundary layer.
///
/// Every flow either completes or fails with exactly one of these.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Conflict,
    NotFound,
    Unauthorized,
    ServiceUnavailable,
    Internal,
}

/// Authentication errors
#[derive(Debug, Error)]
pub enum AuthError {
    /// Email already registered
    #[error("Email in use")]
    EmailInUse,

    /// Real password already present on a set-password request
    #[error("Password already set")]
    PasswordAlreadySet,

    /// User not found
    #[error("User not found")]
    UserNotFound,

    /// Password verification failed
    #[error("Invalid credentials")]
    InvalidCredentials,

    /// No session matches the presented identifiers
    #[error("Session not found")]
    SessionNotFound,

    /// Access token past its validity window
    #[error("Access token expired")]
    AccessTokenExpired,

    /// Verification token failed signature or claim checks
    #[error("Token for password change is expired or invalid")]
    InvalidVerificationToken,

    /// Stored reset token missing or expired
    #[error("Token for password change is expired")]
    VerificationTokenExpired,

    /// Identity provider returned no usable profile
    #[error("OAuth login rejected")]
    OAuthRejected,

    /// Transactional email could not be sent
    #[error("Failed to send the email, please try again later")]
    EmailDelivery(String),

    /// Identity provider transport or protocol failure
    #[error("Identity provider error: {0}")]
    IdentityProvider(String),

    /// Template rendering failed
    #[error("Template error: {0}")]
    Template(String),

    /// Password hashing failed
    #[error("Password hashing failed")]
    HashingFailed,

    /// JWT signing failed
    #[error("Token signing failed: {0}")]
    TokenSigning(#[from] jsonwebtoken::errors::Error),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Database call exceeded its deadline
    #[error("Database operation timed out")]
    Timeout,
}

impl AuthError {
    /// Map this error onto the logical kind the boundary layer translates.
    pub fn kind(&self) -> ErrorKind {
        match self {
            AuthError::EmailInUse | AuthError::PasswordAlreadySet => ErrorKind::Conflict,
            AuthError::UserNotFound => ErrorKind::NotFound,
            AuthError::InvalidCredentials
            | AuthError::SessionNotFound
            | AuthError::AccessTokenExpired
            | AuthError::InvalidVerificationToken
            | AuthError::VerificationTokenExpired
            | AuthError::OAuthRejected => ErrorKind::Unauthorized,
            AuthError::EmailDelivery(_) => ErrorKind::ServiceUnavailable,
            AuthError::IdentityProvider(_)
            | AuthError::Template(_)
            | AuthError::HashingFailed
            | AuthError::TokenSigning(_)
            | AuthError::Database(_)
            | AuthError::Timeout => ErrorKind::Internal,
        }
    }

    /// Get a client-safe error message that doesn't leak sensitive information
    ///
    /// Internal failures are collapsed into a generic message; the email
    /// delivery error hides the transport detail it carries.
    pub fn client_message(&self) -> String {
        match self.kind() {
            ErrorKind::Internal => "Internal server error".to_string(),
            ErrorKind::ServiceUnavailable => {
                "Failed to send the email, please try again later.".to_string()
            }
            _ => self.to_string(),
        }
    }
}

impl From<TimeoutError> for AuthError {
    fn from(err: TimeoutError) -> Self {
        match err {
            TimeoutError::Timeout(_) => AuthError::Timeout,
            TimeoutError::Database(e) => AuthError::Database(e),
        }
    }
}

impl From<MailError> for AuthError {
    fn from(err: MailError) -> Self {
        match err {
            MailError::Template(msg) => AuthError::Template(msg),
            other => AuthError::EmailDelivery(other.to_string()),
        }
    }
}

impl From<OAuthError> for AuthError {
    fn from(err: OAuthError) -> Self {
        match err {
            OAuthError::Rejected(_) => AuthError::OAuthRejected,
            OAuthError::Request(msg) => AuthError::IdentityProvider(msg),
        }
    }
}

/// Result type for authentication operations
pub type AuthResult<T> = Result<T, AuthError>;
