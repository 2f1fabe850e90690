//! Background eviction of expired reset-token records.

use std::{sync::Arc, time::Duration};

use phonebook::AuthManager;
use tokio::task::JoinHandle;

use crate::metrics;

/// Spawn a task that purges expired reset tokens every `period`.
///
/// Failures are logged and retried on the next tick.
pub fn spawn_reset_token_sweeper(auth: Arc<AuthManager>, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            interval.tick().await;
            match auth.purge_expired_reset_tokens().await {
                Ok(0) => {}
                Ok(purged) => {
                    tracing::debug!(purged, "Swept expired reset tokens");
                    metrics::reset_tokens_purged_total(purged);
                }
                Err(e) => tracing::warn!(error = %e, "Reset token sweep failed"),
            }
        }
    })
}
