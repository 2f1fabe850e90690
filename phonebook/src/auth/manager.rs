//! Authentication manager implementation.

use super::{
    errors::{AuthError, AuthResult},
    models::{
        AuthSession, LoginRequest, NewUser, PasswordChangeRequest, RefreshRequest,
        RegisterRequest, ResetToken, Session, SessionId, User, UserProfile,
    },
    password::PasswordHasher,
    tokens::{
        VERIFICATION_TOKEN_TTL, create_session_tokens, sign_verification_token,
        verify_verification_token,
    },
};
use crate::{
    db::{ResetTokenRepository, SessionRepository, UserRepository},
    mail::{EmailMessage, EmailSender, EmailTemplate, TemplateRenderer},
    oauth::{IdentityProvider, full_name_from_profile},
};
use chrono::Utc;
use std::{collections::HashMap, sync::Arc};

/// Sentinel stored as the password hash of accounts created through OAuth.
pub const DEFAULT_NO_PASSWORD_SENTINEL: &str = "oauth-account-without-password";

/// Settings the flows need besides their collaborators
#[derive(Debug, Clone)]
pub struct AuthConfig {
    /// HMAC secret for verification tokens
    pub jwt_secret: String,

    /// Base URL of the front end; reset/set links point below it
    pub app_domain: String,

    /// Sender address for transactional email
    pub mail_from: String,

    /// Password hash value meaning "no password set"
    pub no_password_sentinel: String,
}

/// What a successful verification-token redemption does to sessions.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Redemption {
    /// Reset flow: drop the caller's session, if it presented one.
    RevokeSession(Option<SessionId>),
    /// Set flow: leave every session alone.
    KeepSessions,
}

/// Injected stores and collaborators
pub struct AuthDeps {
    pub users: Arc<dyn UserRepository>,
    pub sessions: Arc<dyn SessionRepository>,
    pub reset_tokens: Arc<dyn ResetTokenRepository>,
    pub mailer: Arc<dyn EmailSender>,
    pub templates: Arc<dyn TemplateRenderer>,
    pub identity_provider: Arc<dyn IdentityProvider>,
}

/// Authentication manager
#[derive(Clone)]
pub struct AuthManager {
    users: Arc<dyn UserRepository>,
    sessions: Arc<dyn SessionRepository>,
    reset_tokens: Arc<dyn ResetTokenRepository>,
    mailer: Arc<dyn EmailSender>,
    templates: Arc<dyn TemplateRenderer>,
    identity_provider: Arc<dyn IdentityProvider>,
    hasher: PasswordHasher,
    config: Arc<AuthConfig>,
}

impl AuthManager {
    /// Create a new authentication manager
    ///
    /// # Arguments
    ///
    /// * `deps` - Store and collaborator handles
    /// * `pepper` - Server-side pepper for password and token hashing
    /// * `config` - Secrets, link base and sender address
    pub fn new(deps: AuthDeps, pepper: String, config: AuthConfig) -> Self {
        Self {
            users: deps.users,
            sessions: deps.sessions,
            reset_tokens: deps.reset_tokens,
            mailer: deps.mailer,
            templates: deps.templates,
            identity_provider: deps.identity_provider,
            hasher: PasswordHasher::new(pepper),
            config: Arc::new(config),
        }
    }

    /// Register a new user and open their first session
    ///
    /// # Errors
    ///
    /// * `AuthError::EmailInUse` - Email already registered
    pub async fn register(&self, request: RegisterRequest) -> AuthResult<AuthSession> {
        if self.users.find_by_email(&request.email).await?.is_some() {
            return Err(AuthError::EmailInUse);
        }

        let password_hash = self.hasher.hash(&request.password).await?;

        // The unique index still catches a racing registration
        let user = self
            .users
            .create(NewUser {
                email: request.email,
                password_hash,
                name: request.name,
            })
            .await?;

        let session = self.sessions.create(user.id, create_session_tokens()).await?;
        log::info!("Registered user {}", user.id);

        Ok(AuthSession { user, session })
    }

    /// Login a user
    ///
    /// Existing sessions of the user stay valid.
    ///
    /// # Errors
    ///
    /// * `AuthError::UserNotFound` - No user with that email
    /// * `AuthError::InvalidCredentials` - Password mismatch, including
    ///   accounts that never set a password
    pub async fn login(&self, request: LoginRequest) -> AuthResult<AuthSession> {
        let user = self
            .users
            .find_by_email(&request.email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        if !self
            .hasher
            .verify(&request.password, &user.password_hash)
            .await?
        {
            log::warn!("Failed login for user {}", user.id);
            return Err(AuthError::InvalidCredentials);
        }

        let session = self.sessions.create(user.id, create_session_tokens()).await?;
        log::info!("User {} logged in, session {}", user.id, session.id);

        Ok(AuthSession { user, session })
    }

    /// Rotate a session: the presented pair is consumed and a new session
    /// for the same user is returned.
    ///
    /// # Errors
    ///
    /// * `AuthError::SessionNotFound` - No session matches both fields, or a
    ///   concurrent refresh consumed it first
    pub async fn refresh_session(&self, request: RefreshRequest) -> AuthResult<Session> {
        let session = self
            .sessions
            .find_by_id_and_refresh_token(request.session_id, &request.refresh_token)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        let deleted = self
            .sessions
            .delete_by_id_and_refresh_token(request.session_id, &request.refresh_token)
            .await?;
        if !deleted {
            log::warn!("Session {} already rotated", request.session_id);
            return Err(AuthError::SessionNotFound);
        }

        let rotated = self
            .sessions
            .create(session.user_id, create_session_tokens())
            .await?;
        log::debug!("Rotated session {} -> {}", session.id, rotated.id);

        Ok(rotated)
    }

    /// Logout: delete the session. Unknown ids are ignored.
    pub async fn logout(&self, session_id: SessionId) -> AuthResult<()> {
        self.sessions.delete_by_id(session_id).await?;
        log::debug!("Session {} logged out", session_id);
        Ok(())
    }

    /// Resolve the user behind a bearer access token
    ///
    /// # Errors
    ///
    /// * `AuthError::SessionNotFound` - Token unknown, or its user is gone
    /// * `AuthError::AccessTokenExpired` - Token past its validity window
    pub async fn authenticate(&self, access_token: &str) -> AuthResult<User> {
        let session = self
            .sessions
            .find_by_access_token(access_token)
            .await?
            .ok_or(AuthError::SessionNotFound)?;

        if session.access_token_valid_until < Utc::now() {
            return Err(AuthError::AccessTokenExpired);
        }

        self.users
            .find_by_id(session.user_id)
            .await?
            .ok_or(AuthError::SessionNotFound)
    }

    /// Whether the user has a real password (not the OAuth sentinel)
    pub fn is_password_set(&self, user: &User) -> bool {
        user.password_hash != self.config.no_password_sentinel
    }

    /// Public profile of an authenticated user
    pub fn refresh_user(&self, user: &User) -> UserProfile {
        UserProfile {
            email: user.email.clone(),
            name: user.name.clone(),
            is_password_set: self.is_password_set(user),
        }
    }

    /// Email a password-reset link
    ///
    /// Unknown emails succeed silently. The token record is only written
    /// after the email went out.
    ///
    /// # Errors
    ///
    /// * `AuthError::EmailDelivery` - Dispatch failed; nothing persisted
    pub async fn request_reset_token(&self, email: &str) -> AuthResult<()> {
        let Some(user) = self.users.find_by_email(email).await? else {
            log::debug!("Reset requested for unknown email");
            return Ok(());
        };

        self.issue_verification_email(&user, EmailTemplate::ResetPassword)
            .await?;
        log::info!("Reset token issued for user {}", user.id);
        Ok(())
    }

    /// Email a set-password link to an OAuth-only account
    ///
    /// # Errors
    ///
    /// * `AuthError::PasswordAlreadySet` - Account already has a password
    /// * `AuthError::EmailDelivery` - Dispatch failed; nothing persisted
    pub async fn request_set_password_token(&self, email: &str) -> AuthResult<()> {
        let Some(user) = self.users.find_by_email(email).await? else {
            log::debug!("Set-password requested for unknown email");
            return Ok(());
        };

        if self.is_password_set(&user) {
            return Err(AuthError::PasswordAlreadySet);
        }

        self.issue_verification_email(&user, EmailTemplate::SetPassword)
            .await?;
        log::info!("Set-password token issued for user {}", user.id);
        Ok(())
    }

    /// Complete a password reset and revoke the caller's session
    ///
    /// # Errors
    ///
    /// * `AuthError::InvalidVerificationToken` - Bad signature or expired token
    /// * `AuthError::VerificationTokenExpired` - No live record for the token
    /// * `AuthError::InvalidCredentials` - Token does not match the record
    /// * `AuthError::UserNotFound` - Token subject no longer resolves
    pub async fn reset_password(
        &self,
        request: PasswordChangeRequest,
        session_id: Option<SessionId>,
    ) -> AuthResult<()> {
        let user = self
            .redeem_verification_token(request, Redemption::RevokeSession(session_id))
            .await?;
        log::info!("Password reset for user {}", user.id);
        Ok(())
    }

    /// Replace the sentinel password of an OAuth-only account
    ///
    /// Same failure modes as [`AuthManager::reset_password`].
    pub async fn set_password(&self, request: PasswordChangeRequest) -> AuthResult<()> {
        let user = self
            .redeem_verification_token(request, Redemption::KeepSessions)
            .await?;
        log::info!("Password set for user {}", user.id);
        Ok(())
    }

    /// Consent URL for Google sign-in
    pub fn google_auth_url(&self) -> AuthResult<String> {
        Ok(self.identity_provider.authorization_url()?)
    }

    /// Log in with a Google authorization code, creating the account on
    /// first use
    ///
    /// # Errors
    ///
    /// * `AuthError::OAuthRejected` - Exchange failed or no email in profile
    pub async fn login_or_signup_with_google(&self, code: &str) -> AuthResult<AuthSession> {
        let code = urlencoding::decode(code).map_err(|_| AuthError::OAuthRejected)?;
        let profile = self.identity_provider.exchange_code(&code).await?;
        let email = profile.email.clone().ok_or(AuthError::OAuthRejected)?;

        let user = match self.users.find_by_email(&email).await? {
            Some(user) => user,
            None => {
                let user = self
                    .users
                    .create(NewUser {
                        email,
                        password_hash: self.config.no_password_sentinel.clone(),
                        name: full_name_from_profile(&profile),
                    })
                    .await?;
                log::info!("Created user {} from Google sign-in", user.id);
                user
            }
        };

        let session = self.sessions.create(user.id, create_session_tokens()).await?;
        log::info!("User {} logged in with Google", user.id);

        Ok(AuthSession { user, session })
    }

    /// Drop reset records past their validity instant
    pub async fn purge_expired_reset_tokens(&self) -> AuthResult<u64> {
        let purged = self.reset_tokens.purge_expired().await?;
        if purged > 0 {
            log::debug!("Purged {} expired reset tokens", purged);
        }
        Ok(purged)
    }

    async fn issue_verification_email(
        &self,
        user: &User,
        template: EmailTemplate,
    ) -> AuthResult<()> {
        let token = sign_verification_token(
            user.id,
            &user.email,
            self.config.jwt_secret.as_bytes(),
            VERIFICATION_TOKEN_TTL,
        )?;

        let vars = HashMap::from([
            ("name", user.name.clone()),
            (
                "link",
                format!("{}/reset-password?token={}", self.config.app_domain, token),
            ),
        ]);
        let html = self.templates.render(template, &vars)?;

        // Send first: a failed dispatch leaves any previous record in place
        self.mailer
            .send(EmailMessage {
                from: self.config.mail_from.clone(),
                to: user.email.clone(),
                subject: template.subject().to_string(),
                html,
            })
            .await
            .map_err(|e| {
                log::warn!("Email dispatch to user {} failed: {}", user.id, e);
                AuthError::from(e)
            })?;

        let token_hash = self.hasher.hash(&token).await?;
        self.reset_tokens
            .replace_for_user(ResetToken {
                user_id: user.id,
                reset_password_token_hash: token_hash,
                reset_password_token_valid_until: Utc::now() + VERIFICATION_TOKEN_TTL,
            })
            .await
    }

    /// Shared reset/set routine.
    ///
    /// The record is claimed with an atomic compare-and-delete before any
    /// write, so of two concurrent redemptions only the one that claimed it
    /// changes the password; the other fails with nothing modified.
    async fn redeem_verification_token(
        &self,
        request: PasswordChangeRequest,
        redemption: Redemption,
    ) -> AuthResult<User> {
        let claims =
            verify_verification_token(&request.token, self.config.jwt_secret.as_bytes())?;

        let record = self
            .reset_tokens
            .find_by_user(claims.sub)
            .await?
            .ok_or(AuthError::VerificationTokenExpired)?;

        if record.reset_password_token_valid_until < Utc::now() {
            self.reset_tokens.delete_by_user(claims.sub).await?;
            return Err(AuthError::VerificationTokenExpired);
        }

        if !self
            .hasher
            .verify(&request.token, &record.reset_password_token_hash)
            .await?
        {
            log::warn!("Verification token mismatch for user {}", claims.sub);
            return Err(AuthError::InvalidCredentials);
        }

        let user = self
            .users
            .find_by_id_and_email(claims.sub, &claims.email)
            .await?
            .ok_or(AuthError::UserNotFound)?;

        // Hash before claiming so a hashing failure leaves the record usable
        let password_hash = self.hasher.hash(&request.password).await?;

        if !self
            .reset_tokens
            .claim(user.id, &record.reset_password_token_hash)
            .await?
        {
            log::warn!("Reset record for user {} consumed concurrently", user.id);
            return Err(AuthError::VerificationTokenExpired);
        }

        self.users.update_password(user.id, &password_hash).await?;

        if let Redemption::RevokeSession(Some(session_id)) = redemption {
            self.sessions.delete_by_id(session_id).await?;
        }

        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        db::memory::{MemoryResetTokenRepository, MemorySessionRepository, MemoryUserRepository},
        mail::{EmbeddedTemplates, RecordingEmailSender},
        oauth::StubIdentityProvider,
    };

    struct Harness {
        manager: AuthManager,
        sessions: Arc<MemorySessionRepository>,
        reset_tokens: Arc<MemoryResetTokenRepository>,
        mailer: Arc<RecordingEmailSender>,
    }

    fn harness() -> Harness {
        let sessions = Arc::new(MemorySessionRepository::new());
        let reset_tokens = Arc::new(MemoryResetTokenRepository::new());
        let mailer = Arc::new(RecordingEmailSender::new());

        let manager = AuthManager::new(
            AuthDeps {
                users: Arc::new(MemoryUserRepository::new()),
                sessions: sessions.clone(),
                reset_tokens: reset_tokens.clone(),
                mailer: mailer.clone(),
                templates: Arc::new(EmbeddedTemplates::new().unwrap()),
                identity_provider: Arc::new(StubIdentityProvider::new()),
            },
            "test_pepper".to_string(),
            AuthConfig {
                jwt_secret: "test_jwt_secret_that_is_long_enough".to_string(),
                app_domain: "https://app.example".to_string(),
                mail_from: "noreply@example.com".to_string(),
                no_password_sentinel: DEFAULT_NO_PASSWORD_SENTINEL.to_string(),
            },
        );

        Harness {
            manager,
            sessions,
            reset_tokens,
            mailer,
        }
    }

    fn register_request(email: &str) -> RegisterRequest {
        RegisterRequest {
            name: "Ann".to_string(),
            email: email.to_string(),
            password: "Secret123".to_string(),
        }
    }

    #[tokio::test]
    async fn test_register_opens_session() {
        let h = harness();
        let auth = h.manager.register(register_request("a@x.com")).await.unwrap();

        assert_eq!(auth.session.user_id, auth.user.id);
        assert_ne!(auth.user.password_hash, "Secret123");
        assert_eq!(h.sessions.count_for_user(auth.user.id).await, 1);
    }

    #[tokio::test]
    async fn test_authenticate_rejects_expired_access_token() {
        let h = harness();
        let auth = h.manager.register(register_request("a@x.com")).await.unwrap();

        let user = h.manager.authenticate(&auth.session.access_token).await.unwrap();
        assert_eq!(user.id, auth.user.id);

        let mut expired = auth.session.clone();
        expired.access_token_valid_until = Utc::now() - chrono::Duration::seconds(1);
        h.sessions.put(expired).await;

        let result = h.manager.authenticate(&auth.session.access_token).await;
        assert!(matches!(result, Err(AuthError::AccessTokenExpired)));

        let result = h.manager.authenticate("unknown").await;
        assert!(matches!(result, Err(AuthError::SessionNotFound)));
    }

    #[tokio::test]
    async fn test_reset_link_points_at_app_domain() {
        let h = harness();
        h.manager.register(register_request("a@x.com")).await.unwrap();
        h.manager.request_reset_token("a@x.com").await.unwrap();

        let mail = h.mailer.last().await.unwrap();
        assert_eq!(mail.subject, "Reset your password");
        assert_eq!(mail.from, "noreply@example.com");
        assert!(mail.html.contains("https://app.example/reset-password?token="));
        assert_eq!(h.reset_tokens.len().await, 1);
    }

    #[tokio::test]
    async fn test_failed_dispatch_persists_nothing() {
        let h = harness();
        h.manager.register(register_request("a@x.com")).await.unwrap();
        h.mailer.set_failing(true).await;

        let result = h.manager.request_reset_token("a@x.com").await;
        assert!(matches!(result, Err(AuthError::EmailDelivery(_))));
        assert!(h.reset_tokens.is_empty().await);
    }

    #[tokio::test]
    async fn test_redeem_expired_record_deletes_it() {
        let h = harness();
        let auth = h.manager.register(register_request("a@x.com")).await.unwrap();
        h.manager.request_reset_token("a@x.com").await.unwrap();

        let token = token_from_last_email(&h).await;
        let mut record = h
            .reset_tokens
            .find_by_user(auth.user.id)
            .await
            .unwrap()
            .unwrap();
        record.reset_password_token_valid_until = Utc::now() - chrono::Duration::seconds(1);
        h.reset_tokens.put(record).await;

        let result = h
            .manager
            .reset_password(
                PasswordChangeRequest {
                    token,
                    password: "NewSecret1".to_string(),
                },
                None,
            )
            .await;

        assert!(matches!(result, Err(AuthError::VerificationTokenExpired)));
        assert!(h.reset_tokens.is_empty().await);
    }

    #[tokio::test]
    async fn test_newer_request_supersedes_older_token() {
        let h = harness();
        let auth = h.manager.register(register_request("a@x.com")).await.unwrap();

        h.manager.request_reset_token("a@x.com").await.unwrap();
        let first = token_from_last_email(&h).await;
        let first_hash = h
            .reset_tokens
            .find_by_user(auth.user.id)
            .await
            .unwrap()
            .unwrap()
            .reset_password_token_hash;

        h.manager.request_reset_token("a@x.com").await.unwrap();
        let second_hash = h
            .reset_tokens
            .find_by_user(auth.user.id)
            .await
            .unwrap()
            .unwrap()
            .reset_password_token_hash;
        assert_ne!(first_hash, second_hash);
        assert_eq!(h.reset_tokens.len().await, 1);

        // A distinct expiry makes the newer token differ from the first
        // regardless of when it was signed
        let newer = sign_verification_token(
            auth.user.id,
            "a@x.com",
            h.manager.config.jwt_secret.as_bytes(),
            VERIFICATION_TOKEN_TTL - chrono::Duration::minutes(1),
        )
        .unwrap();
        assert_ne!(newer, first);
        h.reset_tokens
            .replace_for_user(ResetToken {
                user_id: auth.user.id,
                reset_password_token_hash: h.manager.hasher.hash(&newer).await.unwrap(),
                reset_password_token_valid_until: Utc::now() + VERIFICATION_TOKEN_TTL,
            })
            .await
            .unwrap();

        let change = |token: String| PasswordChangeRequest {
            token,
            password: "NewSecret1".to_string(),
        };

        let result = h.manager.reset_password(change(first), None).await;
        assert!(matches!(result, Err(AuthError::InvalidCredentials)));
        assert_eq!(h.reset_tokens.len().await, 1);

        h.manager.reset_password(change(newer), None).await.unwrap();
        assert!(h.reset_tokens.is_empty().await);
    }

    async fn token_from_last_email(h: &Harness) -> String {
        let html = h.mailer.last().await.unwrap().html;
        let start = html.find("token=").unwrap() + "token=".len();
        html[start..]
            .chars()
            .take_while(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
            .collect()
    }
}
