//! Function timing guard.
//!
//! ```
//! use vigil_lib::metrics::MetricRegistry;
//!
//! let registry = MetricRegistry::default();
//! let timer = registry.start_timer("reports.render");
//! // ... work ...
//! timer.success();
//! assert_eq!(registry.counter("function.calls", &[("function", "reports.render"), ("status", "success")]), Some(1));
//! ```
//!
//! A guard dropped without `success()` (early return, `?`, panic unwind)
//! is recorded as an error.

use crate::metrics::MetricRegistry;
use std::time::Instant;

/// Records one function call into the registry when it completes
#[must_use = "dropping the timer immediately records an error outcome"]
pub struct FunctionTimer<'a> {
    registry: &'a MetricRegistry,
    function: String,
    started: Instant,
    succeeded: bool,
}

impl MetricRegistry {
    /// Start timing a call of `function`
    pub fn start_timer(&self, function: impl Into<String>) -> FunctionTimer<'_> {
        FunctionTimer {
            registry: self,
            function: function.into(),
            started: Instant::now(),
            succeeded: false,
        }
    }

    /// Time a fallible closure, recording success or error from its result
    pub fn measure<T, E>(
        &self,
        function: &str,
        f: impl FnOnce() -> std::result::Result<T, E>,
    ) -> std::result::Result<T, E> {
        let timer = self.start_timer(function);
        let result = f();
        if result.is_ok() {
            timer.success();
        }
        result
    }
}

impl FunctionTimer<'_> {
    /// Mark the call as successful and record it
    pub fn success(mut self) {
        self.succeeded = true;
    }
}

impl Drop for FunctionTimer<'_> {
    fn drop(&mut self) {
        let status = if self.succeeded { "success" } else { "error" };
        let function = self.function.as_str();

        if !self.succeeded {
            self.registry
                .increment("function.errors", &[("function", function)]);
        }
        self.registry.record_timing(
            "function",
            self.started.elapsed(),
            &[("function", function), ("status", status)],
        );
        self.registry
            .increment("function.calls", &[("function", function), ("status", status)]);
    }
}
