//! Alert notification dispatch.
//!
//! The evaluator hands newly firing alerts to a [`NotificationSink`], which
//! must not block. [`QueuedSink`] buffers them in a bounded channel drained by
//! an [`AlertDelivery`] task, so slow delivery never holds up evaluation.

use super::{Alert, Severity};
use crate::core::{Result, VigilError};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;

/// Receives newly firing alerts. Implementations return promptly.
pub trait NotificationSink: Send + Sync {
    /// Dispatch one alert
    fn notify(&self, alert: &Alert) -> Result<()>;
}

/// Writes alerts to the log
#[derive(Debug, Default, Clone, Copy)]
pub struct LogSink;

impl NotificationSink for LogSink {
    fn notify(&self, alert: &Alert) -> Result<()> {
        log_alert(alert);
        Ok(())
    }
}

/// Non-blocking sink in front of a bounded queue
#[derive(Debug)]
pub struct QueuedSink {
    sender: RwLock<Option<mpsc::Sender<Alert>>>,
}

impl QueuedSink {
    /// Create the sink and the receiving end of its queue
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<Alert>) {
        let (sender, receiver) = mpsc::channel(capacity);
        let sink = Self {
            sender: RwLock::new(Some(sender)),
        };
        (sink, receiver)
    }

    /// Drop the sending end. Alerts already queued stay deliverable and
    /// later notifications fail with [`VigilError::ChannelSend`].
    pub fn close(&self) {
        self.sender.write().take();
    }
}

impl NotificationSink for QueuedSink {
    fn notify(&self, alert: &Alert) -> Result<()> {
        let sender = self.sender.read();
        let Some(sender) = sender.as_ref() else {
            return Err(VigilError::ChannelSend);
        };
        sender.try_send(alert.clone()).map_err(|e| match e {
            TrySendError::Full(alert) => VigilError::QueueFull(alert.id),
            TrySendError::Closed(_) => VigilError::ChannelSend,
        })
    }
}

/// Delivers queued alerts to their final destination
#[async_trait]
pub trait AlertDelivery: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> Result<()>;
}

/// Delivery that only logs
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDelivery;

#[async_trait]
impl AlertDelivery for LogDelivery {
    async fn deliver(&self, alert: &Alert) -> Result<()> {
        log_alert(alert);
        Ok(())
    }
}

/// Drain `receiver` into `delivery` until every sender is dropped.
///
/// Failed deliveries are logged and not retried. Transient failures log at
/// warn, anything else at error.
pub fn spawn_delivery(
    mut receiver: mpsc::Receiver<Alert>,
    delivery: Arc<dyn AlertDelivery>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(alert) = receiver.recv().await {
            if let Err(e) = delivery.deliver(&alert).await {
                if e.is_transient() {
                    tracing::warn!(
                        alert = %alert.id,
                        category = e.category(),
                        "Alert delivery failed: {}",
                        e
                    );
                } else {
                    tracing::error!(
                        alert = %alert.id,
                        category = e.category(),
                        "Alert delivery failed: {}",
                        e
                    );
                }
            }
        }
        tracing::debug!("Alert delivery stopped");
    })
}

/// Close `sink` and give the delivery task up to `grace` to flush the queue.
///
/// Returns false when the task had to be aborted with alerts still pending.
pub async fn shutdown_delivery(
    sink: &QueuedSink,
    delivery: JoinHandle<()>,
    grace: Duration,
) -> bool {
    sink.close();
    let abort = delivery.abort_handle();
    match tokio::time::timeout(grace, delivery).await {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            tracing::warn!("Alert delivery task ended abnormally: {}", e);
            false
        }
        Err(_) => {
            abort.abort();
            tracing::warn!(
                "Alert delivery did not finish within {:?}, dropping queued alerts",
                grace
            );
            false
        }
    }
}

fn log_alert(alert: &Alert) {
    match alert.severity {
        Severity::Critical => tracing::error!(
            alert = %alert.id,
            value = alert.value,
            threshold = alert.threshold,
            "ALERT: {}",
            alert.message
        ),
        Severity::Warning => tracing::warn!(
            alert = %alert.id,
            value = alert.value,
            threshold = alert.threshold,
            "ALERT: {}",
            alert.message
        ),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::alerts::{AlertState, Severity};
    use chrono::Utc;
    use parking_lot::Mutex;

    fn alert(id: &str) -> Alert {
        Alert {
            id: id.to_string(),
            message: "test".to_string(),
            severity: Severity::Warning,
            state: AlertState::Firing,
            path: "system.cpu.percent".to_string(),
            value: 90.0,
            threshold: 80.0,
            triggered_at: Utc::now(),
            resolved_at: None,
            count: 1,
        }
    }

    #[derive(Default)]
    struct Collect {
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertDelivery for Collect {
        async fn deliver(&self, alert: &Alert) -> Result<()> {
            self.seen.lock().push(alert.id.clone());
            if alert.id == "bad" {
                return Err(VigilError::notification("webhook unreachable"));
            }
            Ok(())
        }
    }

    #[test]
    fn test_full_queue_drops_without_blocking() {
        let (sink, _receiver) = QueuedSink::new(1);
        assert!(sink.notify(&alert("first")).is_ok());

        let err = sink.notify(&alert("second")).unwrap_err();
        assert!(matches!(err, VigilError::QueueFull(ref id) if id == "second"));
    }

    #[test]
    fn test_closed_queue() {
        let (sink, receiver) = QueuedSink::new(4);
        drop(receiver);
        assert!(matches!(sink.notify(&alert("a")), Err(VigilError::ChannelSend)));
    }

    #[tokio::test]
    async fn test_delivery_drains_queue_past_failures() {
        let (sink, receiver) = QueuedSink::new(8);
        let collect = Arc::new(Collect::default());
        let handle = spawn_delivery(receiver, Arc::clone(&collect) as Arc<dyn AlertDelivery>);

        sink.notify(&alert("bad")).unwrap();
        sink.notify(&alert("good")).unwrap();
        drop(sink);
        handle.await.unwrap();

        assert_eq!(*collect.seen.lock(), vec!["bad".to_string(), "good".to_string()]);
    }

    struct Slow {
        delay: Duration,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl AlertDelivery for Slow {
        async fn deliver(&self, alert: &Alert) -> Result<()> {
            tokio::time::sleep(self.delay).await;
            self.seen.lock().push(alert.id.clone());
            Ok(())
        }
    }

    fn slow(delay: Duration) -> Arc<Slow> {
        Arc::new(Slow {
            delay,
            seen: Mutex::new(Vec::new()),
        })
    }

    #[tokio::test]
    async fn test_shutdown_flushes_queued_alerts() {
        let (sink, receiver) = QueuedSink::new(8);
        let delivery = slow(Duration::from_millis(10));
        let handle = spawn_delivery(receiver, Arc::clone(&delivery) as Arc<dyn AlertDelivery>);

        for id in ["a", "b", "c"] {
            sink.notify(&alert(id)).unwrap();
        }

        assert!(shutdown_delivery(&sink, handle, Duration::from_secs(5)).await);
        assert_eq!(*delivery.seen.lock(), vec!["a", "b", "c"]);
        assert!(matches!(sink.notify(&alert("late")), Err(VigilError::ChannelSend)));
    }

    #[tokio::test]
    async fn test_shutdown_gives_up_after_grace() {
        let (sink, receiver) = QueuedSink::new(8);
        let delivery = slow(Duration::from_secs(30));
        let handle = spawn_delivery(receiver, Arc::clone(&delivery) as Arc<dyn AlertDelivery>);

        sink.notify(&alert("stuck")).unwrap();

        assert!(!shutdown_delivery(&sink, handle, Duration::from_millis(50)).await);
        assert!(delivery.seen.lock().is_empty());
    }
}
