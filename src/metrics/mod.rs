//! In-process metric registry.
//!
//! - Counters: monotonically non-decreasing `u64`
//! - Gauges: last written `f64`
//! - Histograms: capped FIFO sample windows with exact percentiles over the
//!   retained samples

pub mod aggregator;
pub mod registry;
pub mod ring_buffer;
pub mod timing;
pub mod types;

pub use aggregator::percentile;
pub use registry::{MetricRegistry, DEFAULT_HISTOGRAM_CAPACITY};
pub use ring_buffer::BoundedRing;
pub use timing::FunctionTimer;
pub use types::{HistogramStats, MetricKey, MetricsSnapshot, Sample};
