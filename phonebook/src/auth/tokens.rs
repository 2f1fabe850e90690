//! Token issuer: opaque session tokens and signed verification tokens.

use base64::{Engine, engine::general_purpose::URL_SAFE_NO_PAD};
use chrono::{Duration, Utc};
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use rand::RngCore;

use super::{
    errors::{AuthError, AuthResult},
    models::{SessionTokens, UserId, VerificationClaims},
};

/// Random bytes behind every opaque token.
pub const TOKEN_BYTES: usize = 30;

/// Access token lifetime.
pub const ACCESS_TOKEN_TTL: Duration = Duration::minutes(15);

/// Refresh token lifetime, also the cookie horizon.
pub const REFRESH_TOKEN_TTL: Duration = Duration::days(30);

/// Reset/set verification token lifetime.
pub const VERIFICATION_TOKEN_TTL: Duration = Duration::minutes(5);

fn random_token() -> String {
    let mut bytes = [0u8; TOKEN_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    URL_SAFE_NO_PAD.encode(bytes)
}

/// Create a fresh access/refresh pair with their expiry instants.
pub fn create_session_tokens() -> SessionTokens {
    let now = Utc::now();
    SessionTokens {
        access_token: random_token(),
        refresh_token: random_token(),
        access_token_valid_until: now + ACCESS_TOKEN_TTL,
        refresh_token_valid_until: now + REFRESH_TOKEN_TTL,
    }
}

/// Sign an HS256 verification token carrying the subject id and email.
pub fn sign_verification_token(
    subject: UserId,
    email: &str,
    secret: &[u8],
    ttl: Duration,
) -> AuthResult<String> {
    let now = Utc::now();
    let claims = VerificationClaims {
        sub: subject,
        email: email.to_string(),
        exp: (now + ttl).timestamp(),
        iat: now.timestamp(),
    };

    Ok(encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret),
    )?)
}

/// Verify signature and embedded expiry of a verification token.
///
/// Any cryptographic or temporal failure maps to
/// [`AuthError::InvalidVerificationToken`].
pub fn verify_verification_token(token: &str, secret: &[u8]) -> AuthResult<VerificationClaims> {
    let mut validation = Validation::default();
    validation.leeway = 0;
    validation.set_required_spec_claims(&["exp", "sub"]);

    decode::<VerificationClaims>(token, &DecodingKey::from_secret(secret), &validation)
        .map(|data| data.claims)
        .map_err(|e| {
            log::debug!("Verification token rejected: {e}");
            AuthError::InvalidVerificationToken
        })
}
