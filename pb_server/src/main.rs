//! Phonebook authentication server.
//!
//! Serves the `/auth` API over PostgreSQL-backed stores, sends reset and
//! set-password emails over SMTP, and signs users in with Google.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Error;
use log::info;
use pb_server::{
    api,
    config::ServerConfig,
    logging, metrics, sweeper,
};
use phonebook::{
    auth::{AuthConfig, AuthDeps, AuthManager},
    db::{
        Database, MemoryResetTokenRepository, MemorySessionRepository, MemoryUserRepository,
        PgResetTokenRepository, PgSessionRepository, PgUserRepository,
    },
    mail::{EmailSender, EmbeddedTemplates, LogEmailSender, SmtpEmailSender},
    oauth::GoogleOAuthClient,
};
use pico_args::Arguments;

const HELP: &str = "\
Run the phonebook authentication server

USAGE:
  pb_server [OPTIONS]

OPTIONS:
  --bind       IP:PORT     Server socket bind address  [default: env SERVER_BIND or 127.0.0.1:3000]
  --db-url     URL         Database connection string  [default: env DATABASE_URL]

FLAGS:
  --in-memory              Keep users and sessions in memory instead of PostgreSQL
  -h, --help               Print help information

ENVIRONMENT:
  SERVER_BIND              Server bind address (e.g., 0.0.0.0:8080)
  DATABASE_URL             PostgreSQL connection string
  JWT_SECRET               Verification token signing secret
  PASSWORD_PEPPER          Password hashing pepper
  APP_DOMAIN               Front-end base URL used in emailed links
  SMTP_HOST, SMTP_FROM     Outgoing mail
  GOOGLE_AUTH_CLIENT_ID    Google sign-in client
  (See .env file for all configuration options)
";

struct Args {
    bind: Option<SocketAddr>,
    database_url: Option<String>,
    in_memory: bool,
}

#[tokio::main]
async fn main() -> Result<(), Error> {
    // Load .env file if it exists
    let _ = dotenvy::dotenv();

    let mut pargs = Arguments::from_env();

    // Help has a higher priority and should be handled separately.
    if pargs.contains(["-h", "--help"]) {
        print!("{HELP}");
        std::process::exit(0);
    }

    let args = Args {
        bind: pargs.opt_value_from_str("--bind")?,
        database_url: pargs.opt_value_from_str("--db-url")?,
        in_memory: pargs.contains("--in-memory"),
    };

    logging::init();

    let config = ServerConfig::from_env(args.bind, args.database_url)?;
    config.validate()?;

    if let Some(addr) = config.metrics_bind {
        metrics::init_metrics(addr).map_err(|e| anyhow::anyhow!(e))?;
        info!("Prometheus metrics exposed on {}", addr);
    }

    // Storage
    let (deps_stores, database) = if args.in_memory {
        log::warn!("Running on in-memory stores; all data is lost on exit");
        let stores: Stores = (
            Arc::new(MemoryUserRepository::new()),
            Arc::new(MemorySessionRepository::new()),
            Arc::new(MemoryResetTokenRepository::new()),
        );
        (stores, None)
    } else {
        info!("Connecting to database");
        let db = Database::new(&config.database)
            .await
            .map_err(|e| anyhow::anyhow!("Failed to connect to database: {}", e))?;
        db.migrate()
            .await
            .map_err(|e| anyhow::anyhow!("Failed to run migrations: {}", e))?;
        info!("Database connected and migrated");

        let pool = db.pool().clone();
        let stores: Stores = (
            Arc::new(PgUserRepository::new(pool.clone())),
            Arc::new(PgSessionRepository::new(pool.clone())),
            Arc::new(PgResetTokenRepository::new(pool)),
        );
        (stores, Some(db))
    };

    // Email
    let mailer: Arc<dyn EmailSender> = match &config.mail.smtp {
        Some(smtp) => {
            info!("Sending email through {}:{}", smtp.host, smtp.port);
            Arc::new(SmtpEmailSender::new(smtp)?)
        }
        None => {
            log::warn!("SMTP_HOST not set; emails are logged, not sent");
            Arc::new(LogEmailSender::new())
        }
    };

    let (users, sessions, reset_tokens) = deps_stores;
    let auth_manager = Arc::new(AuthManager::new(
        AuthDeps {
            users,
            sessions,
            reset_tokens,
            mailer,
            templates: Arc::new(EmbeddedTemplates::new()?),
            identity_provider: Arc::new(GoogleOAuthClient::new(config.google.clone())),
        },
        config.security.password_pepper.clone(),
        AuthConfig {
            jwt_secret: config.security.jwt_secret.clone(),
            app_domain: config.app_domain.clone(),
            mail_from: config.mail.from.clone(),
            no_password_sentinel: config.security.no_password_sentinel.clone(),
        },
    ));

    let sweeper = sweeper::spawn_reset_token_sweeper(
        auth_manager.clone(),
        Duration::from_secs(config.reset_token_sweep_secs),
    );

    let api_state = api::AppState {
        auth_manager,
        database: database.clone(),
        cookie_secure: config.security.cookie_secure,
    };

    let app = api::create_router(api_state).layer(api::cors_layer(&config.allowed_origins));

    // Start HTTP server
    let listener = tokio::net::TcpListener::bind(config.bind)
        .await
        .map_err(|e| anyhow::anyhow!("Failed to bind to {}: {}", config.bind, e))?;

    info!(
        "Server is running at http://{}. Press Ctrl+C to stop.",
        config.bind
    );

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| anyhow::anyhow!("Server error: {}", e))?;

    info!("Shutting down server...");
    sweeper.abort();
    if let Some(db) = database {
        db.close().await;
    }

    Ok(())
}

type Stores = (
    Arc<dyn phonebook::db::UserRepository>,
    Arc<dyn phonebook::db::SessionRepository>,
    Arc<dyn phonebook::db::ResetTokenRepository>,
);

/// Graceful shutdown signal
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        log::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
}
