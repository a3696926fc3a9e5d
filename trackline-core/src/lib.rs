//! # trackline-core
//!
//! Client-side telemetry buffering and delivery.
//!
//! This library provides:
//! - Domain types for tracking records, envelopes and batches
//! - The delivery pipeline: dispatch decisions, buffering, scheduled flushes
//!   and a bounded final drain at shutdown
//! - An HTTP transport and a persistent install identity
//! - Configuration management
//! - Logging infrastructure
//!
//! ## Delivery model
//!
//! - A single health probe at startup decides whether the endpoint is usable
//! - Track calls never block on the network and never fail
//! - Failed sends are logged and counted; events are not retried
//! - The queue lives in memory only and is lost if the process crashes
//!
//! ## Example
//!
//! ```rust,no_run
//! use trackline_core::{Config, Pipeline};
//!
//! # async fn run() -> trackline_core::Result<()> {
//! let config = Config::load()?;
//!
//! let pipeline = Pipeline::new();
//! pipeline.initialize(config.pipeline)?;
//! pipeline.track("app_open", serde_json::json!({"source": "dock"}));
//!
//! pipeline.shutdown().await;
//! # Ok(())
//! # }
//! ```

// Re-export commonly used items at the crate root
pub use config::{Config, PipelineConfig};
pub use error::{Error, Result};
pub use pipeline::{Collaborators, Pipeline, PipelineStats};
pub use types::*;

// Public modules
pub mod config;
pub mod error;
pub mod identity;
pub mod logging;
pub mod pipeline;
pub mod transport;
pub mod types;
