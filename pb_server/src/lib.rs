//! HTTP boundary for the phonebook authentication service.

pub mod api;
pub mod config;
pub mod logging;
pub mod metrics;
pub mod sweeper;
