//! One-shot startup reachability probe.

use std::sync::{Arc, Weak};
use std::time::Duration;

use crate::transport::Transport;

use super::Shared;

/// Upper bound on the startup probe.
pub const HEALTH_CHECK_TIMEOUT: Duration = Duration::from_secs(5);

/// Run the probe and hand the result to the pipeline.
///
/// Timeouts and transport errors both count as a dead endpoint. The result is
/// never re-evaluated.
pub(crate) async fn probe(shared: Weak<Shared>, transport: Arc<dyn Transport>) {
    let alive = match tokio::time::timeout(
        HEALTH_CHECK_TIMEOUT,
        transport.health_check(HEALTH_CHECK_TIMEOUT),
    )
    .await
    {
        Ok(Ok(alive)) => alive,
        Ok(Err(e)) => {
            tracing::debug!(error = %e, "Health check failed");
            false
        }
        Err(_) => {
            tracing::debug!(
                timeout_ms = HEALTH_CHECK_TIMEOUT.as_millis() as u64,
                "Health check timed out"
            );
            false
        }
    };

    if let Some(shared) = shared.upgrade() {
        shared.resolve_health(alive);
    }
}
