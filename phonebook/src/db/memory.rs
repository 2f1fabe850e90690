//! In-memory repository implementations.
//!
//! Used by the test suites and for running the server without PostgreSQL.
//! Each store is a single mutex-guarded map, so find-and-delete is atomic
//! per call just like a single SQL statement.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::Mutex;
use uuid::Uuid;

use super::repository::{ResetTokenRepository, SessionRepository, UserRepository};
use crate::auth::{
    AuthError, AuthResult, NewUser, ResetToken, Session, SessionId, SessionTokens, User, UserId,
};

#[derive(Default)]
pub struct MemoryUserRepository {
    users: Mutex<HashMap<UserId, User>>,
}

impl MemoryUserRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored users.
    pub async fn len(&self) -> usize {
        self.users.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.users.lock().await.is_empty()
    }

    /// Remove a user outright; the auth flows never do this.
    pub async fn remove(&self, user_id: UserId) -> Option<User> {
        self.users.lock().await.remove(&user_id)
    }
}

#[async_trait]
impl UserRepository for MemoryUserRepository {
    async fn create(&self, user: NewUser) -> AuthResult<User> {
        let mut users = self.users.lock().await;
        if users.values().any(|u| u.email == user.email) {
            return Err(AuthError::EmailInUse);
        }

        let created = User {
            id: Uuid::new_v4(),
            email: user.email,
            password_hash: user.password_hash,
            name: user.name,
        };
        users.insert(created.id, created.clone());
        Ok(created)
    }

    async fn find_by_email(&self, email: &str) -> AuthResult<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    async fn find_by_id(&self, user_id: UserId) -> AuthResult<Option<User>> {
        Ok(self.users.lock().await.get(&user_id).cloned())
    }

    async fn find_by_id_and_email(
        &self,
        user_id: UserId,
        email: &str,
    ) -> AuthResult<Option<User>> {
        let users = self.users.lock().await;
        Ok(users.get(&user_id).filter(|u| u.email == email).cloned())
    }

    async fn update_password(&self, user_id: UserId, password_hash: &str) -> AuthResult<()> {
        if let Some(user) = self.users.lock().await.get_mut(&user_id) {
            user.password_hash = password_hash.to_string();
        }
        Ok(())
    }
}

#[derive(Default)]
pub struct MemorySessionRepository {
    sessions: Mutex<HashMap<SessionId, Session>>,
}

impl MemorySessionRepository {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live sessions owned by the user.
    pub async fn count_for_user(&self, user_id: UserId) -> usize {
        let sessions = self.sessions.lock().await;
        sessions.values().filter(|s| s.user_id == user_id).count()
    }

    /// Overwrite a stored session, e.g. to move its expiry into the past.
    pub async fn put(&self, session: Session) {
        self.sessions.lock().await.insert(session.id, session);
    }

    pub async fn get(&self, session_id: SessionId) -> Option<Session> {
        self.sessions.lock().await.get(&session_id).cloned()
    }
}

#[async_trait]
impl SessionRepository for MemorySessionRepository {
    async fn create(&self, user_id: UserId, tokens: SessionTokens) -> AuthResult<Session> {
        let session = Session {
            id: Uuid::new_v4(),
            user_id,
            access_token: tokens.access_token,
            refresh_token: tokens.refresh_token,
            access_token_valid_until: tokens.access_token_valid_until,
            refresh_token_valid_until: tokens.refresh_token_valid_until,
        };
        self.sessions
            .lock()
            .await
            .insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_by_id_and_refresh_token(
        &self,
        session_id: SessionId,
        refresh_token: &str,
    ) -> AuthResult<Option<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .get(&session_id)
            .filter(|s| s.refresh_token == refresh_token)
            .cloned())
    }

    async fn find_by_access_token(&self, access_token: &str) -> AuthResult<Option<Session>> {
        let sessions = self.sessions.lock().await;
        Ok(sessions
            .values()
            .find(|s| s.access_token == access_token)
            .cloned())
    }

    async fn delete_by_id(&self, session_id: SessionId) -> AuthResult<()> {
        self.sessions.lock().await.remove(&session_id);
        Ok(())
    }

    async fn delete_by_id_and_refresh_token(
        &self,
        session_id: SessionId,
        refresh_token: &str,
    ) -> AuthResult<bool> {
        let mut sessions = self.sessions.lock().await;
        match sessions.get(&session_id) {
            Some(s) if s.refresh_token == refresh_token => {
                sessions.remove(&session_id);
                Ok(true)
            }
            _ => Ok(false),
        }
    }
}

#[derive(Default)]
pub struct MemoryResetTokenRepository {
    tokens: Mutex<HashMap<UserId, ResetToken>>,
}

impl MemoryResetTokenRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn len(&self) -> usize {
        self.tokens.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.tokens.lock().await.is_empty()
    }

    /// Overwrite a stored record, e.g. to move its expiry into the past.
    pub async fn put(&self, token: ResetToken) {
        self.tokens.lock().await.insert(token.user_id, token);
    }
}

#[async_trait]
impl ResetTokenRepository for MemoryResetTokenRepository {
    async fn find_by_user(&self, user_id: UserId) -> AuthResult<Option<ResetToken>> {
        Ok(self.tokens.lock().await.get(&user_id).cloned())
    }

    async fn replace_for_user(&self, token: ResetToken) -> AuthResult<()> {
        self.tokens.lock().await.insert(token.user_id, token);
        Ok(())
    }

    async fn delete_by_user(&self, user_id: UserId) -> AuthResult<bool> {
        Ok(self.tokens.lock().await.remove(&user_id).is_some())
    }

    async fn claim(&self, user_id: UserId, token_hash: &str) -> AuthResult<bool> {
        let mut tokens = self.tokens.lock().await;
        let live = tokens.get(&user_id).is_some_and(|t| {
            t.reset_password_token_hash == token_hash
                && t.reset_password_token_valid_until >= Utc::now()
        });
        if live {
            tokens.remove(&user_id);
        }
        Ok(live)
    }

    async fn purge_expired(&self) -> AuthResult<u64> {
        let now = Utc::now();
        let mut tokens = self.tokens.lock().await;
        let before = tokens.len();
        tokens.retain(|_, t| t.reset_password_token_valid_until >= now);
        Ok((before - tokens.len()) as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::tokens::create_session_tokens;
    use chrono::Duration;

    fn new_user(email: &str) -> NewUser {
        NewUser {
            email: email.to_string(),
            password_hash: "hash".to_string(),
            name: "Test User".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_user_rejects_duplicate_email() {
        let repo = MemoryUserRepository::new();
        repo.create(new_user("a@x.com")).await.unwrap();

        let result = repo.create(new_user("a@x.com")).await;
        assert!(matches!(result, Err(AuthError::EmailInUse)));
        assert_eq!(repo.len().await, 1);
    }

    #[tokio::test]
    async fn test_find_by_id_and_email_requires_both() {
        let repo = MemoryUserRepository::new();
        let user = repo.create(new_user("a@x.com")).await.unwrap();

        assert!(repo.find_by_id_and_email(user.id, "a@x.com").await.unwrap().is_some());
        assert!(repo.find_by_id_and_email(user.id, "b@x.com").await.unwrap().is_none());
        assert!(
            repo.find_by_id_and_email(Uuid::new_v4(), "a@x.com")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn test_session_delete_matches_both_fields() {
        let repo = MemorySessionRepository::new();
        let user_id = Uuid::new_v4();
        let session = repo.create(user_id, create_session_tokens()).await.unwrap();

        assert!(
            !repo
                .delete_by_id_and_refresh_token(session.id, "not-the-token")
                .await
                .unwrap()
        );
        assert!(
            repo.delete_by_id_and_refresh_token(session.id, &session.refresh_token)
                .await
                .unwrap()
        );
        assert!(
            !repo
                .delete_by_id_and_refresh_token(session.id, &session.refresh_token)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_reset_token_replace_and_purge() {
        let repo = MemoryResetTokenRepository::new();
        let user_id = Uuid::new_v4();

        repo.replace_for_user(ResetToken {
            user_id,
            reset_password_token_hash: "first".to_string(),
            reset_password_token_valid_until: Utc::now() + Duration::minutes(5),
        })
        .await
        .unwrap();
        repo.replace_for_user(ResetToken {
            user_id,
            reset_password_token_hash: "second".to_string(),
            reset_password_token_valid_until: Utc::now() - Duration::minutes(1),
        })
        .await
        .unwrap();

        assert_eq!(repo.len().await, 1);
        let stored = repo.find_by_user(user_id).await.unwrap().unwrap();
        assert_eq!(stored.reset_password_token_hash, "second");

        assert_eq!(repo.purge_expired().await.unwrap(), 1);
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_claim_removes_matching_record_once() {
        let repo = MemoryResetTokenRepository::new();
        let user_id = Uuid::new_v4();
        repo.replace_for_user(ResetToken {
            user_id,
            reset_password_token_hash: "current".to_string(),
            reset_password_token_valid_until: Utc::now() + Duration::minutes(5),
        })
        .await
        .unwrap();

        assert!(!repo.claim(user_id, "stale").await.unwrap());
        assert_eq!(repo.len().await, 1);

        assert!(repo.claim(user_id, "current").await.unwrap());
        assert!(!repo.claim(user_id, "current").await.unwrap());
        assert!(repo.is_empty().await);
    }

    #[tokio::test]
    async fn test_claim_ignores_expired_record() {
        let repo = MemoryResetTokenRepository::new();
        let user_id = Uuid::new_v4();
        repo.put(ResetToken {
            user_id,
            reset_password_token_hash: "current".to_string(),
            reset_password_token_valid_until: Utc::now() - Duration::seconds(1),
        })
        .await;

        assert!(!repo.claim(user_id, "current").await.unwrap());
        assert_eq!(repo.len().await, 1);
    }
}
