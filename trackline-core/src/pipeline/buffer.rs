//! In-memory event buffer.
//!
//! The buffer holds no lock of its own. It lives inside the pipeline state,
//! so every append and drain happens under the single pipeline lock and a
//! drain of one collection can never interleave with an append to the other.

use crate::types::Envelope;

/// Auto queue plus manual batch.
#[derive(Debug, Default)]
pub struct EventBuffer {
    auto_queue: Vec<Envelope>,
    manual_batch: Vec<Envelope>,
}

impl EventBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_auto(&mut self, envelope: Envelope) {
        self.auto_queue.push(envelope);
    }

    pub fn push_manual(&mut self, envelope: Envelope) {
        self.manual_batch.push(envelope);
    }

    /// Append already-drained envelopes to the manual batch, keeping their order.
    pub fn extend_manual(&mut self, envelopes: Vec<Envelope>) {
        self.manual_batch.extend(envelopes);
    }

    /// Swap the auto queue for an empty one and return its previous contents.
    pub fn drain_auto(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.auto_queue)
    }

    /// Swap the manual batch for an empty one and return its previous contents.
    pub fn drain_manual(&mut self) -> Vec<Envelope> {
        std::mem::take(&mut self.manual_batch)
    }

    pub fn auto_len(&self) -> usize {
        self.auto_queue.len()
    }

    pub fn manual_len(&self) -> usize {
        self.manual_batch.len()
    }

    pub fn len(&self) -> usize {
        self.auto_len() + self.manual_len()
    }

    pub fn is_empty(&self) -> bool {
        self.auto_queue.is_empty() && self.manual_batch.is_empty()
    }
}
