//! Google sign-in support.
//!
//! The auth manager only sees the [`IdentityProvider`] trait: a consent URL
//! and a code exchange that yields verified profile claims.

use async_trait::async_trait;
use serde::Deserialize;
use thiserror::Error;

use crate::auth::VerifiedProfile;

pub const GOOGLE_AUTH_URL: &str = "https://accounts.google.com/o/oauth2/v2/auth";
pub const GOOGLE_TOKEN_URL: &str = "https://oauth2.googleapis.com/token";
pub const GOOGLE_TOKENINFO_URL: &str = "https://oauth2.googleapis.com/tokeninfo";

const SCOPES: &str = "openid email profile";

/// Identity provider errors
#[derive(Debug, Error)]
pub enum OAuthError {
    /// The provider answered but the payload is unusable for login
    #[error("Rejected by identity provider: {0}")]
    Rejected(String),

    /// Transport or protocol failure talking to the provider
    #[error("Identity provider request failed: {0}")]
    Request(String),
}

/// Client registration with Google
#[derive(Debug, Clone)]
pub struct GoogleOAuthConfig {
    pub client_id: String,
    pub client_secret: String,
    pub redirect_uri: String,
}

/// External identity provider.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Consent URL the browser is sent to.
    fn authorization_url(&self) -> Result<String, OAuthError>;

    /// Exchange an authorization code for verified profile claims.
    async fn exchange_code(&self, code: &str) -> Result<VerifiedProfile, OAuthError>;
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    id_token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    aud: Option<String>,
    email: Option<String>,
    email_verified: Option<serde_json::Value>,
    given_name: Option<String>,
    family_name: Option<String>,
    name: Option<String>,
}

impl TokenInfo {
    // tokeninfo reports the flag as the string "true"
    fn is_email_verified(&self) -> bool {
        match &self.email_verified {
            Some(serde_json::Value::Bool(b)) => *b,
            Some(serde_json::Value::String(s)) => s == "true",
            _ => false,
        }
    }
}

/// Google OAuth 2.0 client.
pub struct GoogleOAuthClient {
    config: GoogleOAuthConfig,
    http: reqwest::Client,
    token_url: String,
    tokeninfo_url: String,
}

impl GoogleOAuthClient {
    pub fn new(config: GoogleOAuthConfig) -> Self {
        Self::with_endpoints(config, GOOGLE_TOKEN_URL, GOOGLE_TOKENINFO_URL)
    }

    /// Point the client at alternative endpoints, e.g. a local mock.
    pub fn with_endpoints(config: GoogleOAuthConfig, token_url: &str, tokeninfo_url: &str) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
            token_url: token_url.to_string(),
            tokeninfo_url: tokeninfo_url.to_string(),
        }
    }

    async fn fetch_id_token(&self, code: &str) -> Result<String, OAuthError> {
        let params = [
            ("grant_type", "authorization_code"),
            ("code", code),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.as_str()),
            ("redirect_uri", self.config.redirect_uri.as_str()),
        ];

        let resp = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| OAuthError::Request(format!("Token exchange failed: {e}")))?;

        if resp.status().is_client_error() {
            return Err(OAuthError::Rejected(format!(
                "Token endpoint answered {}",
                resp.status()
            )));
        }
        if !resp.status().is_success() {
            return Err(OAuthError::Request(format!(
                "Token endpoint answered {}",
                resp.status()
            )));
        }

        let body = resp
            .json::<TokenResponse>()
            .await
            .map_err(|e| OAuthError::Request(format!("Token response parse error: {e}")))?;

        body.id_token
            .ok_or_else(|| OAuthError::Rejected("no id_token in response".to_string()))
    }

    async fn verify_id_token(&self, id_token: &str) -> Result<TokenInfo, OAuthError> {
        let resp = self
            .http
            .get(&self.tokeninfo_url)
            .query(&[("id_token", id_token)])
            .send()
            .await
            .map_err(|e| OAuthError::Request(format!("Token verification failed: {e}")))?;

        if !resp.status().is_success() {
            return Err(OAuthError::Rejected(format!(
                "tokeninfo answered {}",
                resp.status()
            )));
        }

        resp.json::<TokenInfo>()
            .await
            .map_err(|e| OAuthError::Request(format!("tokeninfo parse error: {e}")))
    }
}

#[async_trait]
impl IdentityProvider for GoogleOAuthClient {
    fn authorization_url(&self) -> Result<String, OAuthError> {
        let url = reqwest::Url::parse_with_params(
            GOOGLE_AUTH_URL,
            &[
                ("client_id", self.config.client_id.as_str()),
                ("redirect_uri", self.config.redirect_uri.as_str()),
                ("response_type", "code"),
                ("scope", SCOPES),
            ],
        )
        .map_err(|e| OAuthError::Request(e.to_string()))?;

        Ok(url.into())
    }

    async fn exchange_code(&self, code: &str) -> Result<VerifiedProfile, OAuthError> {
        let id_token = self.fetch_id_token(code).await?;
        let info = self.verify_id_token(&id_token).await?;

        if info.aud.as_deref() != Some(self.config.client_id.as_str()) {
            return Err(OAuthError::Rejected("audience mismatch".to_string()));
        }
        if !info.is_email_verified() {
            return Err(OAuthError::Rejected("email not verified".to_string()));
        }

        Ok(VerifiedProfile {
            email: info.email,
            given_name: info.given_name,
            family_name: info.family_name,
            name: info.name,
        })
    }
}

/// Display name for a new account: given + family name, else the display
/// name, else empty.
pub fn full_name_from_profile(profile: &VerifiedProfile) -> String {
    match (&profile.given_name, &profile.family_name) {
        (Some(given), Some(family)) => format!("{given} {family}"),
        _ => profile.name.clone().unwrap_or_default(),
    }
}

/// Identity provider answering from a fixed code table.
#[derive(Default)]
pub struct StubIdentityProvider {
    profiles: std::collections::HashMap<String, VerifiedProfile>,
}

impl StubIdentityProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Accept `code` and answer with `profile`.
    pub fn with_code(mut self, code: &str, profile: VerifiedProfile) -> Self {
        self.profiles.insert(code.to_string(), profile);
        self
    }
}

#[async_trait]
impl IdentityProvider for StubIdentityProvider {
    fn authorization_url(&self) -> Result<String, OAuthError> {
        Ok(format!("{GOOGLE_AUTH_URL}?response_type=code"))
    }

    async fn exchange_code(&self, code: &str) -> Result<VerifiedProfile, OAuthError> {
        self.profiles
            .get(code)
            .cloned()
            .ok_or_else(|| OAuthError::Rejected("unknown code".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(given: Option<&str>, family: Option<&str>, name: Option<&str>) -> VerifiedProfile {
        VerifiedProfile {
            email: Some("g@x.com".to_string()),
            given_name: given.map(str::to_string),
            family_name: family.map(str::to_string),
            name: name.map(str::to_string),
        }
    }

    #[test]
    fn test_full_name_prefers_given_and_family() {
        let p = profile(Some("Ada"), Some("Lovelace"), Some("Countess"));
        assert_eq!(full_name_from_profile(&p), "Ada Lovelace");
    }

    #[test]
    fn test_full_name_falls_back_to_display_name() {
        assert_eq!(
            full_name_from_profile(&profile(Some("Ada"), None, Some("Ada L."))),
            "Ada L."
        );
        assert_eq!(full_name_from_profile(&profile(None, None, None)), "");
    }

    #[test]
    fn test_authorization_url_carries_client_and_scopes() {
        let client = GoogleOAuthClient::new(GoogleOAuthConfig {
            client_id: "client-123".to_string(),
            client_secret: "secret".to_string(),
            redirect_uri: "https://app.example/confirm-google-auth".to_string(),
        });

        let url = reqwest::Url::parse(&client.authorization_url().unwrap()).unwrap();
        let pairs: std::collections::HashMap<_, _> = url.query_pairs().into_owned().collect();

        assert_eq!(pairs["client_id"], "client-123");
        assert_eq!(pairs["redirect_uri"], "https://app.example/confirm-google-auth");
        assert_eq!(pairs["response_type"], "code");
        assert_eq!(pairs["scope"], "openid email profile");
    }

    #[test]
    fn test_email_verified_flag_forms() {
        let mut info = TokenInfo {
            aud: None,
            email: None,
            email_verified: Some(serde_json::json!("true")),
            given_name: None,
            family_name: None,
            name: None,
        };
        assert!(info.is_email_verified());

        info.email_verified = Some(serde_json::json!(true));
        assert!(info.is_email_verified());

        info.email_verified = Some(serde_json::json!("false"));
        assert!(!info.is_email_verified());

        info.email_verified = None;
        assert!(!info.is_email_verified());
    }

    #[tokio::test]
    async fn test_stub_provider() {
        let stub = StubIdentityProvider::new().with_code("good", profile(None, None, Some("G")));

        assert!(stub.exchange_code("good").await.is_ok());
        assert!(matches!(
            stub.exchange_code("bad").await,
            Err(OAuthError::Rejected(_))
        ));
    }
}
