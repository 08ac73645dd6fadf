//! Vigil - in-process observability core.
//!
//! Vigil collects application metrics, instruments inbound HTTP requests,
//! samples host resources and evaluates threshold alerts over all of them.
//!
//! # Features
//!
//! - **Metric registry**: counters, gauges and capped-window histograms keyed
//!   by name and tag set
//! - **Request instrumentation**: rolling window of completed requests with
//!   per-endpoint aggregates and a performance summary
//! - **Resource sampling**: CPU, memory, disk and network figures
//! - **Alerting**: declarative rules over a merged snapshot with
//!   firing/resolved transitions and non-blocking notifications
//! - **HTTP surface**: `/metrics`, `/health`, `/health/detailed`, `/alerts`
//!
//! # Architecture
//!
//! - `metrics`: registry, ring buffer and percentile math
//! - `requests`: request instrumentation
//! - `monitoring`: resource sampler and health probes
//! - `alerts`: rules, evaluator and notification sinks
//! - `snapshot`: merged snapshot and dotted-path lookup
//! - `api`: axum router and instrumentation middleware
//! - `core`: configuration and errors
//! - `cli`: command-line interface
//!
//! # Example
//!
//! ```no_run
//! use vigil_lib::core::Config;
//! use vigil_lib::Application;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = Config::default();
//!     let app = Application::new(config)?;
//!     app.run().await?;
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::must_use_candidate)]

pub mod alerts;
pub mod api;
pub mod application;
pub mod cli;
pub mod core;
pub mod metrics;
pub mod monitoring;
pub mod requests;
pub mod snapshot;

pub use crate::application::Application;
pub use crate::core::{Config, Result};
