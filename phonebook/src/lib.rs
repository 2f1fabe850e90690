//! # Phonebook
//!
//! Session-based authentication for the phonebook contacts service.
//!
//! The crate holds everything below the HTTP boundary: user, session and
//! reset-token stores, the token issuer, password hashing, transactional
//! email and Google sign-in. [`auth::AuthManager`] ties them into the
//! register, login, refresh, logout, password reset/set and OAuth flows.
//!
//! ## Core Modules
//!
//! - [`auth`]: Flows, models, token issuer and password hashing
//! - [`db`]: Repository traits with PostgreSQL and in-memory implementations
//! - [`mail`]: Email dispatch and HTML templates
//! - [`oauth`]: Google identity provider client

/// Authentication flows and their models.
pub mod auth;
pub use auth::{AuthError, AuthManager, AuthResult, AuthSession, ErrorKind};

/// Persistence: connection pool and stores.
pub mod db;

/// Transactional email.
pub mod mail;

/// External identity provider.
pub mod oauth;
