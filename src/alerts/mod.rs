//! Threshold alerting over the merged telemetry snapshot.
//!
//! Each rule moves through inactive, firing and resolved. A firing alert is
//! notified once; repeated evaluations only bump its count. Resolved alerts
//! move to a bounded history.

pub mod evaluator;
pub mod notify;
pub mod rule;

pub use evaluator::{Alert, AlertEvaluator, AlertState, TickReport, DEFAULT_HISTORY_CAPACITY};
pub use notify::{
    shutdown_delivery, spawn_delivery, AlertDelivery, LogDelivery, LogSink, NotificationSink,
    QueuedSink,
};
pub use rule::{default_rules, AlertRule, Comparison, Severity};
