//! Final drain at process exit.

use std::sync::Arc;
use std::time::Duration;

use crate::types::{Batch, Payload, PipelineState};

use super::{Outbound, Pipeline};

/// Upper bound on the final batch send.
pub const SHUTDOWN_FLUSH_TIMEOUT: Duration = Duration::from_millis(2000);

/// Name of the synthetic record appended to the final batch.
pub const APP_EXIT_EVENT: &str = "app_exit";

impl Pipeline {
    /// Drain everything pending into one final batch and close the pipeline.
    ///
    /// Cancels the flush scheduler, appends an `app_exit` record to the manual
    /// batch, moves the auto queue behind it and sends the result as one
    /// `/batch` request, waiting at most [`SHUTDOWN_FLUSH_TIMEOUT`]. The
    /// outcome of that send is discarded.
    ///
    /// Safe to call any number of times: only the first call on a running
    /// pipeline sends anything, later or concurrent calls return immediately.
    pub async fn shutdown(&self) {
        let (delivery, batch) = {
            let mut guard = self.shared.state.lock();
            let state = &mut *guard;
            match state.lifecycle {
                PipelineState::Closed => return,
                PipelineState::Running if !state.draining => {}
                PipelineState::Running => return,
                PipelineState::Uninitialized | PipelineState::Initializing => {
                    state.lifecycle = PipelineState::Closed;
                    tracing::debug!("Pipeline closed before initialization completed");
                    return;
                }
            }
            state.draining = true;

            if let Some(scheduler) = state.scheduler.take() {
                scheduler.cancel();
            }

            let Some(session) = state.session.as_ref() else {
                state.lifecycle = PipelineState::Closed;
                return;
            };
            let exit = session
                .factory
                .envelope(APP_EXIT_EVENT, &Payload::None, state.custom_data.as_deref());
            let delivery = session.delivery(Arc::downgrade(&self.shared));

            // Final order is manual batch, app_exit, auto queue. app_exit closes
            // the caller's manual batch, not the queued events behind it.
            state.buffer.push_manual(exit);
            let queued = state.buffer.drain_auto();
            state.buffer.extend_manual(queued);
            (delivery, Batch::new(state.buffer.drain_manual()))
        };

        if !batch.is_empty() {
            let events = batch.len();
            let send = delivery.send(Outbound::Batch(batch));
            if tokio::time::timeout(SHUTDOWN_FLUSH_TIMEOUT, send)
                .await
                .is_err()
            {
                tracing::warn!(
                    events,
                    timeout_ms = SHUTDOWN_FLUSH_TIMEOUT.as_millis() as u64,
                    "Final flush timed out; pending events dropped"
                );
            }
        }

        let mut state = self.shared.state.lock();
        state.lifecycle = PipelineState::Closed;
        state.draining = false;
        tracing::info!("Pipeline closed");
    }
}
