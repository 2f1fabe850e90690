//! Repository trait definitions for testability and dependency injection.
//!
//! The auth manager only sees these traits; PostgreSQL implementations live
//! here and in-memory ones in [`super::memory`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::timeouts::{PURGE_TIMEOUT, TimeoutError, with_default_timeout, with_timeout};
use crate::auth::{
    AuthError, AuthResult, NewUser, ResetToken, Session, SessionId, SessionTokens, User, UserId,
};

/// Credential store operations
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Create a new user. Fails with `EmailInUse` on a duplicate email.
    async fn create(&self, user: NewUser) -> AuthResult<User>;

    /// Find user by email
    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>>;

    /// Find user by ID
    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>>;

    /// Find user matching both ID and email
    async fn find_by_id_and_email(&self, user_id: UserId, email: &str)
    -> AuthResult<Option<User>>;

    /// Replace the stored password hash
    async fn update_password(&self, user_id: UserId, password_hash: &str) -> AuthResult<()>;
}

/// Session store operations
#[async_trait]
pub trait SessionRepository: Send + Sync {
    /// Persist a new session for the user
    async fn create(&self, user_id: UserId, tokens: SessionTokens) -> AuthResult<Session>;

    /// Find the session matching both ID and refresh token
    async fn find_by_id_and_refresh_token(
        &self,
        session_id: SessionId,
        refresh_token: &str,
    ) -> AuthResult<Option<Session>>;

    /// Find session by access token
    async fn find_by_access_token(&self, access_token: &str) -> AuthResult<Option<Session>>;

    /// Delete session by ID; missing IDs are ignored
    async fn delete_by_id(&self, session_id: SessionId) -> AuthResult<()>;

    /// Delete the session matching both ID and refresh token.
    ///
    /// Returns `false` when no row matched, which is how a concurrent
    /// duplicate redemption is detected.
    async fn delete_by_id_and_refresh_token(
        &self,
        session_id: SessionId,
        refresh_token: &str,
    ) -> AuthResult<bool>;
}

/// Reset-token store operations
#[async_trait]
pub trait ResetTokenRepository: Send + Sync {
    /// Find the user's token record, expired or not
    async fn find_by_user(&self, user_id: UserId) -> AuthResult<Option<ResetToken>>;

    /// Store a token record, replacing any prior one for the same user
    async fn replace_for_user(&self, token: ResetToken) -> AuthResult<()>;

    /// Delete the user's record. Returns whether a record existed.
    async fn delete_by_user(&self, user_id: UserId) -> AuthResult<bool>;

    /// Atomically delete the user's record only if it still carries
    /// `token_hash` and has not expired. Returns whether this call removed it;
    /// of several concurrent claims at most one sees `true`.
    async fn claim(&self, user_id: UserId, token_hash: &str) -> AuthResult<bool>;

    /// Evict every record past its validity instant. Returns the count removed.
    async fn purge_expired(&self) -> AuthResult<u64>;
}

fn is_unique_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_unique_violation())
}

fn user_from_row(r: &PgRow) -> User {
    User {
        id: r.get("id"),
        email: r.get("email"),
        password_hash: r.get("password_hash"),
        name: r.get("name"),
    }
}

fn session_from_row(r: &PgRow) -> Session {
    Session {
        id: r.get("id"),
        user_id: r.get("user_id"),
        access_token: r.get("access_token"),
        refresh_token: r.get("refresh_token"),
        access_token_valid_until: r.get::<DateTime<Utc>, _>("access_token_valid_until"),
        refresh_token_valid_until: r.get::<DateTime<Utc>, _>("refresh_token_valid_until"),
    }
}

/// Default PostgreSQL implementation of `UserRepository`
pub struct PgUserRepository {
    pool: PgPool,
}

impl PgUserRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl UserRepository for PgUserRepository {
    async fn create(&self, user: NewUser) -> AuthResult<User> {
        let result = with_default_timeout(
            sqlx::query(
                "INSERT INTO users (id, email, password_hash, name) VALUES ($1, $2, $3, $4)
                 RETURNING id, email, password_hash, name",
            )
            .bind(Uuid::new_v4())
            .bind(&user.email)
            .bind(&user.password_hash)
            .bind(&user.name)
            .fetch_one(&self.pool),
        )
        .await;

        match result {
            Ok(row) => Ok(user_from_row(&row)),
            Err(TimeoutError::Database(e)) if is_unique_violation(&e) => {
                Err(AuthError::EmailInUse)
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let row = with_default_timeout(
            sqlx::query("SELECT id, email, password_hash, name FROM users WHERE email = $1")
                .bind(email)
                .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        let row = with_default_timeout(
            sqlx::query("SELECT id, email, password_hash, name FROM users WHERE id = $1")
                .bind(user_id)
                .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn find_by_id_and_email(
        &self,
        user_id: UserId,
        email: &str,
    ) -> AuthResult<Option<User>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT id, email, password_hash, name FROM users WHERE id = $1 AND email = $2",
            )
            .bind(user_id)
            .bind(email)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.as_ref().map(user_from_row))
    }

    async fn update_password(&self, user_id: UserId, password_hash: &str) -> AuthResult<()> {
        with_default_timeout(
            sqlx::query("UPDATE users SET password_hash = $1, updated_at = NOW() WHERE id = $2")
                .bind(password_hash)
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

/// Default PostgreSQL implementation of `SessionRepository`
pub struct PgSessionRepository {
    pool: PgPool,
}

impl PgSessionRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl SessionRepository for PgSessionRepository {
    async fn create(&self, user_id: UserId, tokens: SessionTokens) -> AuthResult<Session> {
        let row = with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO sessions (id, user_id, access_token, refresh_token,
                                      access_token_valid_until, refresh_token_valid_until)
                VALUES ($1, $2, $3, $4, $5, $6)
                RETURNING id, user_id, access_token, refresh_token,
                          access_token_valid_until, refresh_token_valid_until
                "#,
            )
            .bind(Uuid::new_v4())
            .bind(user_id)
            .bind(&tokens.access_token)
            .bind(&tokens.refresh_token)
            .bind(tokens.access_token_valid_until)
            .bind(tokens.refresh_token_valid_until)
            .fetch_one(&self.pool),
        )
        .await?;

        Ok(session_from_row(&row))
    }

    async fn find_by_id_and_refresh_token(
        &self,
        session_id: SessionId,
        refresh_token: &str,
    ) -> AuthResult<Option<Session>> {
        let row = with_default_timeout(
            sqlx::query(
                r#"
                SELECT id, user_id, access_token, refresh_token,
                       access_token_valid_until, refresh_token_valid_until
                FROM sessions
                WHERE id = $1 AND refresh_token = $2
                "#,
            )
            .bind(session_id)
            .bind(refresh_token)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn find_by_access_token(&self, access_token: &str) -> AuthResult<Option<Session>> {
        let row = with_default_timeout(
            sqlx::query(
                r#"
                SELECT id, user_id, access_token, refresh_token,
                       access_token_valid_until, refresh_token_valid_until
                FROM sessions
                WHERE access_token = $1
                "#,
            )
            .bind(access_token)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.as_ref().map(session_from_row))
    }

    async fn delete_by_id(&self, session_id: SessionId) -> AuthResult<()> {
        with_default_timeout(
            sqlx::query("DELETE FROM sessions WHERE id = $1")
                .bind(session_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn delete_by_id_and_refresh_token(
        &self,
        session_id: SessionId,
        refresh_token: &str,
    ) -> AuthResult<bool> {
        let result = with_default_timeout(
            sqlx::query("DELETE FROM sessions WHERE id = $1 AND refresh_token = $2")
                .bind(session_id)
                .bind(refresh_token)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

/// Default PostgreSQL implementation of `ResetTokenRepository`
pub struct PgResetTokenRepository {
    pool: PgPool,
}

impl PgResetTokenRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ResetTokenRepository for PgResetTokenRepository {
    async fn find_by_user(&self, user_id: UserId) -> AuthResult<Option<ResetToken>> {
        let row = with_default_timeout(
            sqlx::query(
                "SELECT user_id, reset_password_token_hash, reset_password_token_valid_until
                 FROM reset_tokens WHERE user_id = $1",
            )
            .bind(user_id)
            .fetch_optional(&self.pool),
        )
        .await?;

        Ok(row.map(|r| ResetToken {
            user_id: r.get("user_id"),
            reset_password_token_hash: r.get("reset_password_token_hash"),
            reset_password_token_valid_until: r.get("reset_password_token_valid_until"),
        }))
    }

    async fn replace_for_user(&self, token: ResetToken) -> AuthResult<()> {
        with_default_timeout(
            sqlx::query(
                r#"
                INSERT INTO reset_tokens (user_id, reset_password_token_hash,
                                          reset_password_token_valid_until)
                VALUES ($1, $2, $3)
                ON CONFLICT (user_id) DO UPDATE
                SET reset_password_token_hash = EXCLUDED.reset_password_token_hash,
                    reset_password_token_valid_until = EXCLUDED.reset_password_token_valid_until,
                    created_at = NOW()
                "#,
            )
            .bind(token.user_id)
            .bind(&token.reset_password_token_hash)
            .bind(token.reset_password_token_valid_until)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn delete_by_user(&self, user_id: UserId) -> AuthResult<bool> {
        let result = with_default_timeout(
            sqlx::query("DELETE FROM reset_tokens WHERE user_id = $1")
                .bind(user_id)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn claim(&self, user_id: UserId, token_hash: &str) -> AuthResult<bool> {
        let result = with_default_timeout(
            sqlx::query(
                "DELETE FROM reset_tokens
                 WHERE user_id = $1
                   AND reset_password_token_hash = $2
                   AND reset_password_token_valid_until >= NOW()",
            )
            .bind(user_id)
            .bind(token_hash)
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        let result = with_timeout(
            PURGE_TIMEOUT,
            sqlx::query("DELETE FROM reset_tokens WHERE reset_password_token_valid_until < NOW()")
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected())
    }
}
