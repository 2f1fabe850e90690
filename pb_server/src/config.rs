//! Server configuration management.
//!
//! Consolidates all environment variable reads and provides validated configuration.

use phonebook::{
    auth::DEFAULT_NO_PASSWORD_SENTINEL,
    db::DatabaseConfig,
    mail::SmtpConfig,
    oauth::GoogleOAuthConfig,
};
use std::net::SocketAddr;

/// Bind address used when neither `--bind` nor `SERVER_BIND` is given.
pub const DEFAULT_BIND: SocketAddr =
    SocketAddr::new(std::net::IpAddr::V4(std::net::Ipv4Addr::LOCALHOST), 3000);

/// Complete server configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Server bind address
    pub bind: SocketAddr,
    /// Database configuration
    pub database: DatabaseConfig,
    /// Security configuration
    pub security: SecurityConfig,
    /// Outgoing email configuration
    pub mail: MailConfig,
    /// Google sign-in client registration
    pub google: GoogleOAuthConfig,
    /// Front-end base URL used in emailed links
    pub app_domain: String,
    /// Origins allowed to call the API with credentials
    pub allowed_origins: Vec<String>,
    /// Optional Prometheus exporter address
    pub metrics_bind: Option<SocketAddr>,
    /// Interval between expired reset-token sweeps
    pub reset_token_sweep_secs: u64,
}

/// Security-related configuration
#[derive(Debug, Clone)]
pub struct SecurityConfig {
    /// Verification token signing secret (required)
    pub jwt_secret: String,
    /// Password hashing pepper (required)
    pub password_pepper: String,
    /// Password hash marker for OAuth-only accounts
    pub no_password_sentinel: String,
    /// Mark session cookies `Secure`
    pub cookie_secure: bool,
}

/// Outgoing email configuration
#[derive(Debug, Clone)]
pub struct MailConfig {
    /// SMTP relay; `None` logs emails instead of sending them
    pub smtp: Option<SmtpConfig>,
    /// Sender address
    pub from: String,
}

impl ServerConfig {
    /// Load configuration from environment variables
    ///
    /// # Arguments
    ///
    /// * `bind_override` - Optional bind address override (from CLI args)
    /// * `database_url_override` - Optional database URL override (from CLI args)
    ///
    /// # Errors
    ///
    /// Returns error if required variables are missing or unparseable
    pub fn from_env(
        bind_override: Option<SocketAddr>,
        database_url_override: Option<String>,
    ) -> Result<Self, ConfigError> {
        // Bind address
        let bind = match bind_override {
            Some(addr) => addr,
            None => parse_optional("SERVER_BIND")?.unwrap_or(DEFAULT_BIND),
        };

        // Database configuration
        let mut database = DatabaseConfig::from_env();
        if let Some(url) = database_url_override {
            database.database_url = url;
        }

        // Security configuration (REQUIRED)
        let security = SecurityConfig {
            jwt_secret: required("JWT_SECRET", "Generate with: openssl rand -hex 32")?,
            password_pepper: required("PASSWORD_PEPPER", "Generate with: openssl rand -hex 16")?,
            no_password_sentinel: std::env::var("NO_PASSWORD_FOR_OAUTH")
                .unwrap_or_else(|_| DEFAULT_NO_PASSWORD_SENTINEL.to_string()),
            cookie_secure: parse_env_or("COOKIE_SECURE", false),
        };

        // Mail
        let smtp = std::env::var("SMTP_HOST")
            .ok()
            .filter(|host| !host.is_empty())
            .map(|host| SmtpConfig {
                host,
                port: parse_env_or("SMTP_PORT", 587),
                user: std::env::var("SMTP_USER").unwrap_or_default(),
                password: std::env::var("SMTP_PASSWORD").unwrap_or_default(),
            });
        let mail = MailConfig {
            smtp,
            from: required("SMTP_FROM", "Sender address, e.g. noreply@example.com")?,
        };

        // Google sign-in
        let google = GoogleOAuthConfig {
            client_id: required("GOOGLE_AUTH_CLIENT_ID", "From the Google Cloud console")?,
            client_secret: required("GOOGLE_AUTH_CLIENT_SECRET", "From the Google Cloud console")?,
            redirect_uri: required(
                "GOOGLE_AUTH_REDIRECT_URI",
                "Front-end page receiving the authorization code",
            )?,
        };

        let allowed_origins = std::env::var("ALLOWED_ORIGINS")
            .map(|v| parse_origins(&v))
            .unwrap_or_default();

        Ok(ServerConfig {
            bind,
            database,
            security,
            mail,
            google,
            app_domain: required("APP_DOMAIN", "Front-end base URL, e.g. https://app.example.com")?,
            allowed_origins,
            metrics_bind: parse_optional("METRICS_BIND")?,
            reset_token_sweep_secs: parse_env_or("RESET_TOKEN_SWEEP_SECS", 60),
        })
    }

    /// Validate configuration after loading
    pub fn validate(&self) -> Result<(), ConfigError> {
        // Validate security params
        if self.security.jwt_secret.len() < 32 {
            return Err(ConfigError::Invalid {
                var: "JWT_SECRET".to_string(),
                reason: "Must be at least 32 characters (128-bit security)".to_string(),
            });
        }

        if self.security.password_pepper.len() < 16 {
            return Err(ConfigError::Invalid {
                var: "PASSWORD_PEPPER".to_string(),
                reason: "Must be at least 16 characters (64-bit security)".to_string(),
            });
        }

        if self.security.no_password_sentinel.is_empty() {
            return Err(ConfigError::Invalid {
                var: "NO_PASSWORD_FOR_OAUTH".to_string(),
                reason: "Must not be empty".to_string(),
            });
        }

        if !self.app_domain.starts_with("http://") && !self.app_domain.starts_with("https://") {
            return Err(ConfigError::Invalid {
                var: "APP_DOMAIN".to_string(),
                reason: "Must be an http(s) URL".to_string(),
            });
        }

        if self.app_domain.ends_with('/') {
            return Err(ConfigError::Invalid {
                var: "APP_DOMAIN".to_string(),
                reason: "Must not end with a slash".to_string(),
            });
        }

        if !self.mail.from.contains('@') {
            return Err(ConfigError::Invalid {
                var: "SMTP_FROM".to_string(),
                reason: "Must be an email address".to_string(),
            });
        }

        if self.reset_token_sweep_secs == 0 {
            return Err(ConfigError::Invalid {
                var: "RESET_TOKEN_SWEEP_SECS".to_string(),
                reason: "Must be greater than 0".to_string(),
            });
        }

        if self.database.min_connections > self.database.max_connections {
            return Err(ConfigError::Invalid {
                var: "DB_MIN_CONNECTIONS".to_string(),
                reason: format!(
                    "Cannot exceed max connections ({})",
                    self.database.max_connections
                ),
            });
        }

        Ok(())
    }
}

/// Configuration error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {var}\nHint: {hint}")]
    MissingRequired { var: String, hint: String },

    #[error("Invalid configuration for {var}: {reason}")]
    Invalid { var: String, reason: String },
}

fn required(var: &str, hint: &str) -> Result<String, ConfigError> {
    std::env::var(var).map_err(|_| ConfigError::MissingRequired {
        var: var.to_string(),
        hint: hint.to_string(),
    })
}

/// Parse an optional variable; present but malformed is an error.
fn parse_optional<T>(var: &str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(var) {
        Ok(raw) => raw.parse().map(Some).map_err(|e: T::Err| ConfigError::Invalid {
            var: var.to_string(),
            reason: e.to_string(),
        }),
        Err(_) => Ok(None),
    }
}

/// Helper to parse environment variable with default fallback
fn parse_env_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr,
{
    std::env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_config() -> ServerConfig {
        ServerConfig {
            bind: DEFAULT_BIND,
            database: DatabaseConfig::development(),
            security: SecurityConfig {
                jwt_secret: "a".repeat(32),
                password_pepper: "a".repeat(16),
                no_password_sentinel: DEFAULT_NO_PASSWORD_SENTINEL.to_string(),
                cookie_secure: false,
            },
            mail: MailConfig {
                smtp: None,
                from: "noreply@example.com".to_string(),
            },
            google: GoogleOAuthConfig {
                client_id: "client".to_string(),
                client_secret: "secret".to_string(),
                redirect_uri: "http://localhost:5173/confirm-google-auth".to_string(),
            },
            app_domain: "http://localhost:5173".to_string(),
            allowed_origins: vec!["http://localhost:5173".to_string()],
            metrics_bind: None,
            reset_token_sweep_secs: 60,
        }
    }

    #[test]
    fn test_config_error_display() {
        let err = ConfigError::MissingRequired {
            var: "JWT_SECRET".to_string(),
            hint: "Use openssl".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("JWT_SECRET"));
        assert!(msg.contains("Use openssl"));
    }

    #[test]
    fn test_valid_config_passes() {
        assert!(valid_config().validate().is_ok());
    }

    #[test]
    fn test_config_validation_short_secret() {
        let mut config = valid_config();
        config.security.jwt_secret = "short".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "JWT_SECRET"));
    }

    #[test]
    fn test_config_validation_short_pepper() {
        let mut config = valid_config();
        config.security.password_pepper = "pepper".to_string();

        let err = config.validate().unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { ref var, .. } if var == "PASSWORD_PEPPER"));
    }

    #[test]
    fn test_config_validation_app_domain() {
        let mut config = valid_config();
        config.app_domain = "localhost:5173".to_string();
        assert!(config.validate().is_err());

        config.app_domain = "http://localhost:5173/".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_validation_sweep_interval() {
        let mut config = valid_config();
        config.reset_token_sweep_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_parse_origins() {
        assert_eq!(
            parse_origins(" http://a.example , ,https://b.example"),
            vec!["http://a.example", "https://b.example"]
        );
        assert!(parse_origins("").is_empty());
    }
}
