//! Periodic rule evaluation and the active-alert table.

use super::{AlertRule, NotificationSink, Severity};
use crate::core::Result;
use crate::metrics::{BoundedRing, MetricRegistry};
use crate::monitoring::ResourceSampler;
use crate::requests::RequestInstrumentation;
use crate::snapshot::{resolve_number, MergedSnapshot};
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

/// Resolved alerts kept by default
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

/// Lifecycle state of an alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertState {
    Firing,
    Resolved,
}

/// One firing (or, in history, resolved) occurrence of a rule
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Alert {
    /// Id of the rule that raised it
    pub id: String,
    pub message: String,
    pub severity: Severity,
    pub state: AlertState,
    pub path: String,
    /// Last observed value
    pub value: f64,
    pub threshold: f64,
    /// First time the condition held
    pub triggered_at: DateTime<Utc>,
    pub resolved_at: Option<DateTime<Utc>>,
    /// Consecutive evaluations the condition held
    pub count: u64,
}

impl Alert {
    fn firing(rule: &AlertRule, value: f64, now: DateTime<Utc>) -> Self {
        Self {
            id: rule.id.clone(),
            message: rule.message.clone(),
            severity: rule.severity,
            state: AlertState::Firing,
            path: rule.path.clone(),
            value,
            threshold: rule.threshold,
            triggered_at: now,
            resolved_at: None,
            count: 1,
        }
    }

    fn resolve(&mut self, now: DateTime<Utc>) {
        self.state = AlertState::Resolved;
        self.resolved_at = Some(now);
    }
}

/// What one evaluation pass did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub evaluated: usize,
    pub skipped: usize,
    pub fired: usize,
    pub resolved: usize,
}

#[derive(Debug)]
struct AlertTable {
    active: HashMap<String, Alert>,
    history: BoundedRing<Alert>,
}

/// Evaluates the rule set against merged snapshots
pub struct AlertEvaluator {
    registry: Arc<MetricRegistry>,
    requests: Arc<RequestInstrumentation>,
    sampler: Arc<ResourceSampler>,
    sink: Arc<dyn NotificationSink>,
    rules: Vec<AlertRule>,
    table: RwLock<AlertTable>,
    tick_lock: Mutex<()>,
    rule_budget: Duration,
}

impl std::fmt::Debug for AlertEvaluator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AlertEvaluator")
            .field("rules", &self.rules.len())
            .field("rule_budget", &self.rule_budget)
            .finish_non_exhaustive()
    }
}

impl AlertEvaluator {
    /// Create an evaluator for a fixed rule set
    pub fn new(
        registry: Arc<MetricRegistry>,
        requests: Arc<RequestInstrumentation>,
        sampler: Arc<ResourceSampler>,
        sink: Arc<dyn NotificationSink>,
        rules: Vec<AlertRule>,
    ) -> Self {
        Self {
            registry,
            requests,
            sampler,
            sink,
            rules,
            table: RwLock::new(AlertTable {
                active: HashMap::new(),
                history: BoundedRing::new(DEFAULT_HISTORY_CAPACITY),
            }),
            tick_lock: Mutex::new(()),
            rule_budget: Duration::from_millis(250),
        }
    }

    /// Keep at most `capacity` resolved alerts
    pub fn with_history_capacity(self, capacity: usize) -> Self {
        self.table.write().history = BoundedRing::new(capacity);
        self
    }

    /// Per-rule time after which a warning is logged
    pub fn with_rule_budget(mut self, budget: Duration) -> Self {
        self.rule_budget = budget;
        self
    }

    /// Registered rules
    pub fn rules(&self) -> &[AlertRule] {
        &self.rules
    }

    /// Run one evaluation pass.
    ///
    /// Blocks for the sampler's CPU interval. Passes are serialized; a caller
    /// arriving during a pass waits for it and then runs its own.
    pub fn tick(&self) -> TickReport {
        let _serial = self.tick_lock.lock();
        let timer = self.registry.start_timer("alerts.tick");

        let system = self.sampler.sample();
        system.publish(&self.registry);
        let merged = MergedSnapshot {
            app: self.registry.snapshot(),
            system,
            performance: self.requests.current_summary(),
        };
        let root = match merged.to_value() {
            Ok(root) => root,
            Err(e) => {
                tracing::error!("Failed to build alert snapshot: {}", e);
                return TickReport {
                    skipped: self.rules.len(),
                    ..TickReport::default()
                };
            },
        };

        let now = Utc::now();
        let mut report = TickReport::default();
        let mut fired = Vec::new();
        {
            let mut guard = self.table.write();
            let table = &mut *guard;
            for rule in &self.rules {
                let started = Instant::now();
                let outcome = self.check_rule(rule, &root);
                let elapsed = started.elapsed();
                if elapsed > self.rule_budget {
                    tracing::warn!(
                        rule = %rule.id,
                        "Rule evaluation took {:?}, over the {:?} budget",
                        elapsed,
                        self.rule_budget
                    );
                }

                let Some((value, triggered)) = outcome else {
                    report.skipped += 1;
                    continue;
                };
                report.evaluated += 1;

                if triggered {
                    if let Some(alert) = table.active.get_mut(&rule.id) {
                        alert.count += 1;
                        alert.value = value;
                    } else {
                        let alert = Alert::firing(rule, value, now);
                        tracing::info!(rule = %rule.id, value, "Alert firing: {}", rule.message);
                        table.active.insert(rule.id.clone(), alert.clone());
                        fired.push(alert);
                        report.fired += 1;
                    }
                } else if let Some(mut alert) = table.active.remove(&rule.id) {
                    alert.value = value;
                    alert.resolve(now);
                    tracing::info!(
                        rule = %rule.id,
                        value,
                        "Alert resolved after {} evaluations",
                        alert.count
                    );
                    table.history.push(alert);
                    report.resolved += 1;
                }
            }
        }

        for alert in &fired {
            if let Err(e) = self.sink.notify(alert) {
                tracing::error!(
                    alert = %alert.id,
                    category = e.category(),
                    "Failed to dispatch alert notification: {}",
                    e
                );
            }
        }

        tracing::debug!(
            evaluated = report.evaluated,
            skipped = report.skipped,
            fired = report.fired,
            resolved = report.resolved,
            "Alert evaluation complete"
        );
        timer.success();
        report
    }

    /// Run one pass on the blocking pool
    pub async fn tick_blocking(self: &Arc<Self>) -> Result<TickReport> {
        let evaluator = Arc::clone(self);
        Ok(tokio::task::spawn_blocking(move || evaluator.tick()).await?)
    }

    fn check_rule(&self, rule: &AlertRule, root: &serde_json::Value) -> Option<(f64, bool)> {
        let value = match resolve_number(root, &rule.path) {
            Ok(value) => value,
            Err(e) => {
                tracing::debug!(rule = %rule.id, "Skipping rule: {}", e);
                return None;
            },
        };
        let Some(triggered) = rule.operator.evaluate(value, rule.threshold) else {
            tracing::warn!(
                rule = %rule.id,
                "Skipping rule with unknown operator '{}'",
                rule.operator
            );
            return None;
        };
        Some((value, triggered))
    }

    /// Currently firing alerts, oldest first
    pub fn active_alerts(&self) -> Vec<Alert> {
        let mut active: Vec<Alert> = self.table.read().active.values().cloned().collect();
        active.sort_by(|a, b| {
            a.triggered_at
                .cmp(&b.triggered_at)
                .then_with(|| a.id.cmp(&b.id))
        });
        active
    }

    /// Newest `limit` resolved alerts, oldest first
    pub fn alert_history(&self, limit: usize) -> Vec<Alert> {
        self.table.read().history.recent(limit)
    }

    /// Tick every `interval` until the returned handle is aborted
    pub fn start(self: &Arc<Self>, interval: Duration) -> JoinHandle<()> {
        let evaluator = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(e) = evaluator.tick_blocking().await {
                    tracing::error!("Alert evaluation task failed: {}", e);
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{Comparison, LogSink};
    use crate::core::VigilError;
    use crate::monitoring::{
        CpuStats, DiskStats, MemoryStats, NetworkStats, ProcessStats, SystemProvider,
    };

    struct FixedHost {
        cpu: Arc<Mutex<f64>>,
    }

    impl SystemProvider for FixedHost {
        fn cpu(&self) -> Result<CpuStats> {
            Ok(CpuStats {
                percent: *self.cpu.lock(),
                count: 4,
            })
        }

        fn memory(&self) -> Result<MemoryStats> {
            Ok(MemoryStats {
                total: 100,
                available: 60,
                percent: 40.0,
                process_rss: None,
                process_vms: None,
            })
        }

        fn process(&self) -> Result<ProcessStats> {
            Ok(ProcessStats { rss: 10, vms: 20 })
        }

        fn disk(&self) -> Result<DiskStats> {
            Err(VigilError::sampling("no disk"))
        }

        fn network(&self) -> Result<NetworkStats> {
            Err(VigilError::sampling("no network"))
        }
    }

    #[derive(Default)]
    struct Recording {
        ids: Mutex<Vec<String>>,
    }

    impl NotificationSink for Recording {
        fn notify(&self, alert: &Alert) -> Result<()> {
            self.ids.lock().push(alert.id.clone());
            Ok(())
        }
    }

    struct Failing;

    impl NotificationSink for Failing {
        fn notify(&self, _alert: &Alert) -> Result<()> {
            Err(VigilError::notification("smtp down"))
        }
    }

    fn evaluator(
        rules: Vec<AlertRule>,
        sink: Arc<dyn NotificationSink>,
    ) -> (Arc<Mutex<f64>>, Arc<MetricRegistry>, AlertEvaluator) {
        let cpu = Arc::new(Mutex::new(0.0));
        let registry = Arc::new(MetricRegistry::default());
        let requests = Arc::new(RequestInstrumentation::new(Arc::clone(&registry), 100));
        let sampler = Arc::new(ResourceSampler::new(Box::new(FixedHost {
            cpu: Arc::clone(&cpu),
        })));
        let evaluator = AlertEvaluator::new(Arc::clone(&registry), requests, sampler, sink, rules);
        (cpu, registry, evaluator)
    }

    fn high_cpu() -> AlertRule {
        AlertRule::new(
            "high_cpu",
            "system.cpu.percent",
            Comparison::Gt,
            80.0,
            "High CPU usage detected",
            Severity::Warning,
        )
    }

    #[test]
    fn test_fire_repeat_resolve() {
        let sink = Arc::new(Recording::default());
        let (cpu, _, evaluator) = evaluator(vec![high_cpu()], Arc::clone(&sink) as Arc<dyn NotificationSink>);

        *cpu.lock() = 85.0;
        let report = evaluator.tick();
        assert_eq!(report.fired, 1);
        let active = evaluator.active_alerts();
        assert_eq!(active.len(), 1);
        assert_eq!(active[0].id, "high_cpu");
        assert_eq!(active[0].count, 1);

        *cpu.lock() = 90.0;
        let report = evaluator.tick();
        assert_eq!(report.fired, 0);
        let active = evaluator.active_alerts();
        assert_eq!(active[0].count, 2);
        assert_eq!(active[0].value, 90.0);

        *cpu.lock() = 50.0;
        let report = evaluator.tick();
        assert_eq!(report.resolved, 1);
        assert!(evaluator.active_alerts().is_empty());

        let history = evaluator.alert_history(50);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].state, AlertState::Resolved);
        assert!(history[0].resolved_at.is_some());

        assert_eq!(*sink.ids.lock(), vec!["high_cpu".to_string()]);
    }

    #[test]
    fn test_refiring_starts_a_fresh_alert() {
        let (cpu, _, evaluator) = evaluator(vec![high_cpu()], Arc::new(LogSink));

        *cpu.lock() = 95.0;
        evaluator.tick();
        evaluator.tick();
        *cpu.lock() = 10.0;
        evaluator.tick();
        *cpu.lock() = 95.0;
        evaluator.tick();

        assert_eq!(evaluator.active_alerts()[0].count, 1);
        assert_eq!(evaluator.alert_history(10)[0].count, 2);
    }

    #[test]
    fn test_bad_rules_are_skipped_individually() {
        let rules = vec![
            AlertRule::new("bogus", "system.bogus.field", Comparison::Gt, 1.0, "x", Severity::Warning),
            AlertRule::new(
                "odd",
                "system.cpu.percent",
                Comparison::from("between".to_string()),
                1.0,
                "x",
                Severity::Warning,
            ),
            AlertRule::new("no_disk", "system.disk.percent", Comparison::Gt, 1.0, "x", Severity::Warning),
            high_cpu(),
        ];
        let (cpu, _, evaluator) = evaluator(rules, Arc::new(LogSink));
        *cpu.lock() = 99.0;

        let report = evaluator.tick();
        assert_eq!(report.skipped, 3);
        assert_eq!(report.evaluated, 1);
        assert_eq!(report.fired, 1);
    }

    fn high_memory() -> AlertRule {
        AlertRule::new(
            "high_memory",
            "system.memory.percent",
            Comparison::Gt,
            10.0,
            "High memory usage detected",
            Severity::Critical,
        )
    }

    #[test]
    fn test_sink_failure_does_not_block_transition() {
        let (cpu, _, evaluator) = evaluator(vec![high_cpu(), high_memory()], Arc::new(Failing));
        *cpu.lock() = 99.0;

        let report = evaluator.tick();
        assert_eq!(report.fired, 2);
        let ids: Vec<String> = evaluator.active_alerts().into_iter().map(|a| a.id).collect();
        assert_eq!(ids.len(), 2);
        assert!(ids.contains(&"high_cpu".to_string()));
        assert!(ids.contains(&"high_memory".to_string()));
    }

    #[test]
    fn test_reads_during_ticks_are_consistent() {
        use std::collections::HashSet;
        use std::sync::atomic::{AtomicBool, Ordering};

        let (cpu, _, evaluator) = evaluator(vec![high_cpu(), high_memory()], Arc::new(LogSink));
        let evaluator = Arc::new(evaluator);
        let done = Arc::new(AtomicBool::new(false));

        let ticker = {
            let evaluator = Arc::clone(&evaluator);
            let done = Arc::clone(&done);
            std::thread::spawn(move || {
                for i in 0..200 {
                    *cpu.lock() = if i % 10 < 6 { 90.0 } else { 10.0 };
                    evaluator.tick();
                }
                done.store(true, Ordering::Release);
            })
        };

        let reader = {
            let evaluator = Arc::clone(&evaluator);
            std::thread::spawn(move || {
                let mut last_count: HashMap<String, (DateTime<Utc>, u64)> = HashMap::new();
                let mut last_history = 0;
                while !done.load(Ordering::Acquire) {
                    let active = evaluator.active_alerts();
                    let ids: HashSet<&str> = active.iter().map(|a| a.id.as_str()).collect();
                    assert_eq!(ids.len(), active.len(), "duplicate alert ids");

                    for alert in &active {
                        assert_eq!(alert.state, AlertState::Firing);
                        if let Some((triggered_at, count)) = last_count.get(&alert.id) {
                            if *triggered_at == alert.triggered_at {
                                assert!(alert.count >= *count, "count went backwards");
                            }
                        }
                        last_count.insert(alert.id.clone(), (alert.triggered_at, alert.count));
                    }

                    let history = evaluator.alert_history(usize::MAX);
                    assert!(history.len() >= last_history);
                    assert!(history.iter().all(|a| a.state == AlertState::Resolved));
                    last_history = history.len();
                }
            })
        };

        ticker.join().unwrap();
        reader.join().unwrap();

        let active = evaluator.active_alerts();
        let memory = active.iter().find(|a| a.id == "high_memory").unwrap();
        assert_eq!(memory.count, 200);
        assert_eq!(evaluator.alert_history(usize::MAX).len(), 20);
    }

    #[test]
    fn test_rules_over_app_gauges() {
        let rule = AlertRule::new(
            "queue_backlog",
            "app.gauges.queue_depth",
            Comparison::Gte,
            100.0,
            "Queue backlog",
            Severity::Critical,
        );
        let (_, registry, evaluator) = evaluator(vec![rule], Arc::new(LogSink));

        assert_eq!(evaluator.tick().skipped, 1);
        registry.set_gauge("queue_depth", 100.0, &[]);
        assert_eq!(evaluator.tick().fired, 1);
        registry.set_gauge("queue_depth", 3.0, &[]);
        assert_eq!(evaluator.tick().resolved, 1);
    }

    #[test]
    fn test_tick_publishes_system_gauges() {
        let (cpu, registry, evaluator) = evaluator(Vec::new(), Arc::new(LogSink));
        *cpu.lock() = 33.0;
        evaluator.tick();

        assert_eq!(registry.gauge("system.cpu.percent", &[]), Some(33.0));
        assert_eq!(registry.gauge("system.memory.process.rss", &[]), Some(10.0));
        assert_eq!(
            registry.counter(
                "function.calls",
                &[("function", "alerts.tick"), ("status", "success")]
            ),
            Some(1)
        );
    }

    #[test]
    fn test_history_is_bounded() {
        let (cpu, _, evaluator) = evaluator(vec![high_cpu()], Arc::new(LogSink));
        let evaluator = evaluator.with_history_capacity(2);
        for _ in 0..3 {
            *cpu.lock() = 90.0;
            evaluator.tick();
            *cpu.lock() = 0.0;
            evaluator.tick();
        }
        assert_eq!(evaluator.alert_history(10).len(), 2);
        assert_eq!(evaluator.alert_history(1).len(), 1);
    }

    #[tokio::test]
    async fn test_start_ticks_on_schedule() {
        let (cpu, _, evaluator) = evaluator(vec![high_cpu()], Arc::new(LogSink));
        *cpu.lock() = 90.0;
        let evaluator = Arc::new(evaluator);

        let handle = evaluator.start(Duration::from_millis(10));
        tokio::time::sleep(Duration::from_millis(100)).await;
        handle.abort();

        assert_eq!(evaluator.active_alerts().len(), 1);
        assert!(evaluator.active_alerts()[0].count >= 1);
    }
}
