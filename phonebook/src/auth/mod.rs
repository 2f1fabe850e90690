//! Authentication module providing registration, login, session rotation,
//! password reset/set flows and Google sign-in.
//!
//! Sessions are opaque random tokens looked up in the session store: a
//! 15-minute access token and a 30-day refresh token that works exactly once.
//! Reset and set-password links carry a short-lived signed token whose hash
//! is kept in the reset-token store until redeemed.
//!
//! ## Example
//!
//! ```no_run
//! use phonebook::auth::{AuthConfig, AuthDeps, AuthManager, RegisterRequest};
//! use phonebook::db::{
//!     Database, PgResetTokenRepository, PgSessionRepository, PgUserRepository,
//! };
//! use phonebook::mail::{EmbeddedTemplates, RecordingEmailSender};
//! use phonebook::oauth::StubIdentityProvider;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let db = Database::new(&Default::default()).await?;
//!     let pool = db.pool().clone();
//!     let auth = AuthManager::new(
//!         AuthDeps {
//!             users: Arc::new(PgUserRepository::new(pool.clone())),
//!             sessions: Arc::new(PgSessionRepository::new(pool.clone())),
//!             reset_tokens: Arc::new(PgResetTokenRepository::new(pool)),
//!             mailer: Arc::new(RecordingEmailSender::new()),
//!             templates: Arc::new(EmbeddedTemplates::new()?),
//!             identity_provider: Arc::new(StubIdentityProvider::new()),
//!         },
//!         "secret_pepper".to_string(),
//!         AuthConfig {
//!             jwt_secret: "jwt_secret".to_string(),
//!             app_domain: "http://localhost:5173".to_string(),
//!             mail_from: "noreply@example.com".to_string(),
//!             no_password_sentinel: "oauth-account-without-password".to_string(),
//!         },
//!     );
//!
//!     let request = RegisterRequest {
//!         name: "Ann".to_string(),
//!         email: "ann@example.com".to_string(),
//!         password: "SecurePass123".to_string(),
//!     };
//!
//!     let registered = auth.register(request).await?;
//!     println!("Registered user: {}", registered.user.email);
//!     Ok(())
//! }
//! ```

pub mod errors;
pub mod manager;
pub mod models;
pub mod password;
pub mod tokens;

pub use errors::{AuthError, AuthResult, ErrorKind};
pub use manager::{AuthConfig, AuthDeps, AuthManager, DEFAULT_NO_PASSWORD_SENTINEL};
pub use models::{
    AuthSession, LoginRequest, NewUser, PasswordChangeRequest, RefreshRequest, RegisterRequest,
    ResetToken, Session, SessionId, SessionTokens, User, UserId, UserProfile, VerificationClaims,
    VerifiedProfile,
};
pub use password::PasswordHasher;
