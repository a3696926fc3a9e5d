//! Event buffering and delivery pipeline
//!
//! ## Architecture
//!
//! ```text
//! track() → EventFactory → dispatch → { Transport | EventBuffer }
//!                                         ↓
//!                          FlushScheduler / shutdown() → Transport
//! ```
//!
//! All mutable state (both buffer collections, health, mode, lifecycle and
//! stats) sits behind one lock. Track calls only take that lock and never
//! wait on the network; every send runs as a background task on the runtime
//! captured by [`Pipeline::initialize`].
//!
//! ## Usage
//!
//! ```rust,no_run
//! use trackline_core::{Pipeline, PipelineConfig};
//!
//! # async fn run() -> trackline_core::Result<()> {
//! let pipeline = Pipeline::new();
//! pipeline.initialize(PipelineConfig::new("acme", "https://telemetry.example.com"))?;
//!
//! pipeline.track("app_open", "cold start");
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```

mod buffer;
mod dispatch;
mod factory;
mod health;
mod scheduler;
mod shutdown;

pub use buffer::EventBuffer;
pub use dispatch::{decide, decide_manual, Dispatch};
pub use factory::{encode_custom_data, Clock, EventFactory, SessionContext, SystemClock};
pub use health::HEALTH_CHECK_TIMEOUT;
pub use scheduler::FlushScheduler;
pub use shutdown::{APP_EXIT_EVENT, SHUTDOWN_FLUSH_TIMEOUT};

use std::ops::ControlFlow;
use std::sync::{Arc, Weak};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::watch;

use crate::config::PipelineConfig;
use crate::error::{Error, Result};
use crate::identity::{FileIdentityStore, IdentityStore};
use crate::transport::{HttpTransport, Transport, BATCH_ENDPOINT, TRACK_ENDPOINT};
use crate::types::{Batch, Envelope, HealthState, Payload, PipelineState};

/// External collaborators the pipeline depends on.
pub struct Collaborators {
    /// Delivery transport. `None` builds an [`HttpTransport`] from the config
    /// passed to [`Pipeline::initialize`].
    pub transport: Option<Arc<dyn Transport>>,
    pub identity: Arc<dyn IdentityStore>,
    pub clock: Arc<dyn Clock>,
}

impl Default for Collaborators {
    fn default() -> Self {
        Self {
            transport: None,
            identity: Arc::new(FileIdentityStore::default()),
            clock: Arc::new(SystemClock),
        }
    }
}

/// Delivery statistics
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PipelineStats {
    /// Events accepted by track calls while running
    pub tracked: usize,
    /// Events dispatched as single-envelope sends
    pub sent_immediately: usize,
    /// Events appended to the auto queue or manual batch
    pub enqueued: usize,
    /// Events discarded by the dispatch decision
    pub dropped: usize,
    /// Batch requests that succeeded
    pub batches_sent: usize,
    /// Events delivered successfully (single or batched)
    pub events_sent: usize,
    /// Requests that failed
    pub send_failures: usize,
}

/// Handle to the telemetry pipeline.
///
/// Cloning is cheap; all clones share the same state. The host owns the
/// pipeline and is responsible for calling [`Pipeline::shutdown`] on exit.
#[derive(Clone)]
pub struct Pipeline {
    shared: Arc<Shared>,
}

pub(crate) struct Shared {
    state: Mutex<State>,
    /// Mirrors `State::health` for hosts awaiting the probe
    health_tx: watch::Sender<HealthState>,
    collaborators: Collaborators,
}

#[derive(Default)]
struct State {
    lifecycle: PipelineState,
    health: HealthState,
    auto_batching: bool,
    /// Set while the final shutdown send is in flight
    draining: bool,
    custom_data: Option<String>,
    buffer: EventBuffer,
    stats: PipelineStats,
    session: Option<Session>,
    scheduler: Option<FlushScheduler>,
}

impl State {
    fn accepts_events(&self) -> bool {
        self.lifecycle == PipelineState::Running && !self.draining
    }
}

/// Everything established by a successful `initialize`.
struct Session {
    factory: EventFactory,
    transport: Arc<dyn Transport>,
    runtime: Handle,
    flush_interval: Duration,
}

impl Session {
    fn delivery(&self, shared: Weak<Shared>) -> Delivery {
        Delivery {
            transport: Arc::clone(&self.transport),
            runtime: self.runtime.clone(),
            shared,
        }
    }
}

/// A request waiting to be sent.
pub(crate) enum Outbound {
    Single(Envelope),
    Batch(Batch),
}

impl Outbound {
    fn endpoint(&self) -> &'static str {
        match self {
            Outbound::Single(_) => TRACK_ENDPOINT,
            Outbound::Batch(_) => BATCH_ENDPOINT,
        }
    }

    fn len(&self) -> usize {
        match self {
            Outbound::Single(_) => 1,
            Outbound::Batch(batch) => batch.len(),
        }
    }

    fn to_json(&self) -> serde_json::Result<serde_json::Value> {
        match self {
            Outbound::Single(envelope) => serde_json::to_value(envelope),
            Outbound::Batch(batch) => serde_json::to_value(batch),
        }
    }
}

/// Sends outbound requests and records the outcome.
///
/// Failures are logged and counted, never returned: a lost request is not
/// retried or re-queued.
pub(crate) struct Delivery {
    transport: Arc<dyn Transport>,
    runtime: Handle,
    shared: Weak<Shared>,
}

impl Delivery {
    pub(crate) async fn send(self, outbound: Outbound) {
        let endpoint = outbound.endpoint();
        let events = outbound.len();

        let result = match outbound.to_json() {
            Ok(body) => self.transport.send(endpoint, body).await,
            Err(e) => Err(Error::from(e)),
        };

        match &result {
            Ok(()) => tracing::debug!(endpoint, events, "Delivered events"),
            Err(e) => tracing::warn!(endpoint, events, error = %e, "Failed to deliver events"),
        }

        if let Some(shared) = self.shared.upgrade() {
            let mut state = shared.state.lock();
            match result {
                Ok(()) => {
                    state.stats.events_sent += events;
                    if endpoint == BATCH_ENDPOINT {
                        state.stats.batches_sent += 1;
                    }
                }
                Err(_) => state.stats.send_failures += 1,
            }
        }
    }

    /// Fire and forget.
    pub(crate) fn spawn(self, outbound: Outbound) {
        let runtime = self.runtime.clone();
        runtime.spawn(self.send(outbound));
    }
}

impl Pipeline {
    /// Create an uninitialized pipeline with the HTTP transport, the file
    /// identity store and the system clock.
    pub fn new() -> Self {
        Self::with_collaborators(Collaborators::default())
    }

    pub fn with_collaborators(collaborators: Collaborators) -> Self {
        let (health_tx, _) = watch::channel(HealthState::Unchecked);
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(State::default()),
                health_tx,
                collaborators,
            }),
        }
    }

    /// Validate the config, load the install identity and start the health probe.
    ///
    /// Must be called from inside a tokio runtime; background sends run on
    /// that runtime. Does not wait for the probe. On error the pipeline stays
    /// uninitialized and every track call is a no-op.
    pub fn initialize(&self, config: PipelineConfig) -> Result<()> {
        {
            let mut state = self.shared.state.lock();
            if state.lifecycle != PipelineState::Uninitialized {
                return Err(Error::Config(format!(
                    "pipeline is already {}",
                    state.lifecycle
                )));
            }
            state.lifecycle = PipelineState::Initializing;
        }

        let session = match self.shared.build_session(&config) {
            Ok(session) => session,
            Err(e) => {
                let mut state = self.shared.state.lock();
                if state.lifecycle == PipelineState::Initializing {
                    state.lifecycle = PipelineState::Uninitialized;
                }
                tracing::error!(error = %e, "Pipeline initialization failed");
                return Err(e);
            }
        };

        let mut state = self.shared.state.lock();
        if state.lifecycle != PipelineState::Initializing {
            // Shut down while we were loading the identity
            return Ok(());
        }

        let probe = health::probe(Arc::downgrade(&self.shared), Arc::clone(&session.transport));
        session.runtime.spawn(probe);

        tracing::info!(
            tenant = %session.factory.context().tenant,
            session_id = %session.factory.context().session_id,
            auto_batching = config.auto_batching,
            flush_interval_secs = config.flush_interval_secs,
            "Pipeline initialized"
        );

        state.auto_batching = config.auto_batching;
        state.session = Some(session);
        state.lifecycle = PipelineState::Running;
        Ok(())
    }

    /// Track one event. Never blocks on the network and never fails.
    ///
    /// Depending on health and mode the event is sent right away, queued for
    /// the next flush, or dropped (see [`decide`]).
    pub fn track(&self, event_name: &str, payload: impl Into<Payload>) {
        let payload = payload.into();
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if !state.accepts_events() {
            tracing::debug!(event_name, lifecycle = %state.lifecycle, "Pipeline not running; event ignored");
            return;
        }
        let Some(session) = state.session.as_ref() else {
            return;
        };

        let envelope = session
            .factory
            .envelope(event_name, &payload, state.custom_data.as_deref());
        state.stats.tracked += 1;

        match decide(state.health, state.auto_batching) {
            Dispatch::SendNow => {
                state.stats.sent_immediately += 1;
                let delivery = session.delivery(Arc::downgrade(&self.shared));
                drop(guard);
                delivery.spawn(Outbound::Single(envelope));
            }
            Dispatch::Enqueue => {
                state.buffer.push_auto(envelope);
                state.stats.enqueued += 1;
            }
            Dispatch::Drop => {
                state.stats.dropped += 1;
                tracing::debug!(event_name, "Endpoint unreachable; event dropped");
            }
        }
    }

    /// Add one event to the caller-managed manual batch.
    ///
    /// The event is kept only if the endpoint is known to be alive. Calls made
    /// before the health probe completes are dropped.
    pub fn track_batched(&self, event_name: &str, payload: impl Into<Payload>) {
        let payload = payload.into();
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if !state.accepts_events() {
            return;
        }
        let Some(session) = state.session.as_ref() else {
            return;
        };

        state.stats.tracked += 1;
        match decide_manual(state.health) {
            Dispatch::Enqueue => {
                let envelope = session
                    .factory
                    .envelope(event_name, &payload, state.custom_data.as_deref());
                state.buffer.push_manual(envelope);
                state.stats.enqueued += 1;
            }
            _ => {
                state.stats.dropped += 1;
                tracing::debug!(event_name, health = %state.health, "Manual batch event dropped");
            }
        }
    }

    /// Send the manual batch as one background `/batch` request.
    pub fn flush_manual_batch(&self) {
        let mut guard = self.shared.state.lock();
        let state = &mut *guard;
        if !state.accepts_events() {
            return;
        }
        let Some(session) = state.session.as_ref() else {
            return;
        };

        let events = state.buffer.drain_manual();
        if events.is_empty() {
            return;
        }
        let delivery = session.delivery(Arc::downgrade(&self.shared));
        drop(guard);
        delivery.spawn(Outbound::Batch(Batch::new(events)));
    }

    /// Attach custom data to every event tracked from now on.
    ///
    /// An empty map behaves like [`Pipeline::clear_custom_data`].
    pub fn set_custom_data(&self, data: serde_json::Map<String, serde_json::Value>) {
        self.shared.state.lock().custom_data = encode_custom_data(data);
    }

    pub fn clear_custom_data(&self) {
        self.shared.state.lock().custom_data = None;
    }

    pub fn state(&self) -> PipelineState {
        self.shared.state.lock().lifecycle
    }

    pub fn health(&self) -> HealthState {
        self.shared.state.lock().health
    }

    /// Wait until the health probe has resolved and return its result.
    ///
    /// Never resolves on a pipeline that was not initialized; bound it with
    /// a timeout when that is possible.
    pub async fn health_resolved(&self) -> HealthState {
        let mut rx = self.shared.health_tx.subscribe();
        loop {
            let current = *rx.borrow_and_update();
            if current.is_checked() {
                return current;
            }
            if rx.changed().await.is_err() {
                return self.health();
            }
        }
    }

    /// Events waiting in the auto queue and the manual batch
    pub fn pending_count(&self) -> usize {
        self.shared.state.lock().buffer.len()
    }

    pub fn has_pending(&self) -> bool {
        !self.shared.state.lock().buffer.is_empty()
    }

    pub fn stats(&self) -> PipelineStats {
        self.shared.state.lock().stats.clone()
    }
}

impl Default for Pipeline {
    fn default() -> Self {
        Self::new()
    }
}

impl Shared {
    fn build_session(&self, config: &PipelineConfig) -> Result<Session> {
        config.validate()?;

        let runtime = Handle::try_current().map_err(|e| {
            Error::Runtime(format!("initialize must be called within a tokio runtime: {}", e))
        })?;

        let transport: Arc<dyn Transport> = match &self.collaborators.transport {
            Some(transport) => Arc::clone(transport),
            None => Arc::new(HttpTransport::new(config)?),
        };

        let identity = self
            .collaborators
            .identity
            .load_or_create()
            .unwrap_or_else(|e| {
                tracing::warn!(error = %e, "Failed to load install identity; using an ephemeral one");
                uuid::Uuid::new_v4().to_string()
            });

        let tenant = config
            .tenant
            .clone()
            .ok_or_else(|| Error::Config("pipeline.tenant is required".to_string()))?;

        let context = SessionContext {
            tenant,
            identity,
            session_id: uuid::Uuid::new_v4().to_string(),
            platform: config.platform.clone(),
            app_version: config.app_version.clone(),
        };

        Ok(Session {
            factory: EventFactory::new(context, Arc::clone(&self.collaborators.clock)),
            transport,
            runtime,
            flush_interval: config.flush_interval(),
        })
    }

    /// Record the probe result and start delivery if the endpoint is alive.
    fn resolve_health(self: &Arc<Self>, alive: bool) {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if state.health.is_checked() {
            return;
        }
        state.health = if alive {
            HealthState::Alive
        } else {
            HealthState::Dead
        };
        tracing::info!(health = %state.health, "Health check resolved");
        self.health_tx.send_replace(state.health);

        if !alive || !state.accepts_events() {
            return;
        }
        let Some(session) = state.session.as_ref() else {
            return;
        };

        if state.auto_batching {
            let weak = Arc::downgrade(self);
            let scheduler =
                FlushScheduler::start(&session.runtime, session.flush_interval, move || {
                    let weak = weak.clone();
                    async move {
                        let Some(shared) = weak.upgrade() else {
                            return ControlFlow::Break(());
                        };
                        let due = shared.take_scheduled_batch();
                        drop(shared);
                        if let Some((delivery, batch)) = due {
                            delivery.send(Outbound::Batch(batch)).await;
                        }
                        ControlFlow::Continue(())
                    }
                });
            state.scheduler = Some(scheduler);
        } else {
            let delivery = session.delivery(Arc::downgrade(self));
            let queued = state.buffer.drain_auto();
            drop(guard);
            if !queued.is_empty() {
                delivery.spawn(Outbound::Batch(Batch::new(queued)));
            }
        }
    }

    /// Drain the auto queue for a scheduled flush. `None` when there is nothing to send.
    fn take_scheduled_batch(self: &Arc<Self>) -> Option<(Delivery, Batch)> {
        let mut guard = self.state.lock();
        let state = &mut *guard;
        if !state.health.is_alive() || !state.accepts_events() {
            return None;
        }
        let session = state.session.as_ref()?;
        let events = state.buffer.drain_auto();
        if events.is_empty() {
            return None;
        }
        Some((session.delivery(Arc::downgrade(self)), Batch::new(events)))
    }
}
