//! Per-event delivery decision.
//!
//! | checked | alive | auto batching | action  |
//! |---------|-------|---------------|---------|
//! | no      | -     | -             | enqueue |
//! | yes     | yes   | no            | send    |
//! | yes     | yes   | yes           | enqueue |
//! | yes     | no    | no            | drop    |
//! | yes     | no    | yes           | enqueue |
//!
//! The manual-batch path only looks at the alive flag, so calls made before
//! the health probe completes are dropped.

use crate::types::HealthState;

/// What to do with a freshly tracked event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    /// Deliver as a single envelope right away
    SendNow,
    /// Append to the buffer (auto queue or manual batch)
    Enqueue,
    /// Discard silently
    Drop,
}

/// Decide the fate of an event tracked through `track`.
pub fn decide(health: HealthState, auto_batching: bool) -> Dispatch {
    match (health.is_checked(), health.is_alive(), auto_batching) {
        (false, _, _) => Dispatch::Enqueue,
        (true, true, false) => Dispatch::SendNow,
        (true, true, true) => Dispatch::Enqueue,
        (true, false, false) => Dispatch::Drop,
        // Health is never re-probed, so this queue only drains at shutdown.
        (true, false, true) => Dispatch::Enqueue,
    }
}

/// Decide the fate of an event tracked through `track_batched`.
pub fn decide_manual(health: HealthState) -> Dispatch {
    if health.is_alive() {
        Dispatch::Enqueue
    } else {
        Dispatch::Drop
    }
}
