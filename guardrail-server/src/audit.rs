//! Audit logging (§4.6): security-relevant events are enqueued on a bounded
//! channel and drained by a background writer. A full channel drops the
//! event and increments a drop counter — audit loss is preferred to
//! back-pressuring the request path.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::mpsc;

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum AuditEvent {
    AuthSuccess {
        api_key_class: &'static str,
        api_key_hash: String,
    },
    AuthFailure {
        api_key_class: &'static str,
    },
    SessionCreated {
        project_slug: String,
    },
    SessionExpired {
        token_id: uuid::Uuid,
    },
    RuleChanged {
        short_id: String,
        action: &'static str,
    },
    ValidationDenied {
        category: &'static str,
        rule_ids: Vec<String>,
    },
}

#[derive(Debug, Clone, Serialize)]
struct AuditRecord {
    at: DateTime<Utc>,
    #[serde(flatten)]
    event: AuditEvent,
}

/// Handle held by request handlers; cheap to clone, never blocks.
#[derive(Clone)]
pub struct AuditSink {
    tx: mpsc::Sender<AuditRecord>,
    dropped: Arc<AtomicU64>,
}

impl AuditSink {
    /// Enqueue `event`, dropping it silently (beyond the counter) if the
    /// channel is full (§4.6).
    pub fn record(&self, event: AuditEvent) {
        let record = AuditRecord {
            at: Utc::now(),
            event,
        };
        if self.tx.try_send(record).is_err() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            tracing::warn!(
                dropped_total = self.dropped.load(Ordering::Relaxed),
                "audit channel full, event dropped"
            );
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

/// Spawns the background drain writer and returns the sink handle callers
/// use to emit events. The writer currently emits structured `tracing`
/// lines (§10.5: "exposed only as plain structured log lines"); swapping in
/// a persistent sink later only touches this function.
pub fn spawn(capacity: usize) -> AuditSink {
    let (tx, mut rx) = mpsc::channel::<AuditRecord>(capacity);
    let dropped = Arc::new(AtomicU64::new(0));

    tokio::spawn(async move {
        while let Some(record) = rx.recv().await {
            match serde_json::to_string(&record) {
                Ok(line) => tracing::info!(target: "guardrail_audit", "{line}"),
                Err(err) => tracing::error!(%err, "failed to serialize audit record"),
            }
        }
    });

    AuditSink { tx, dropped }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn recorded_events_are_drained_without_panicking() {
        let sink = spawn(8);
        sink.record(AuditEvent::AuthSuccess {
            api_key_class: "ide",
            api_key_hash: "abcd1234".to_string(),
        });
        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        assert_eq!(sink.dropped_count(), 0);
    }

    #[tokio::test]
    async fn full_channel_drops_and_counts_instead_of_blocking() {
        let (tx, _rx) = mpsc::channel::<AuditRecord>(1);
        let sink = AuditSink {
            tx,
            dropped: Arc::new(AtomicU64::new(0)),
        };
        // Fill the channel without a consumer draining it.
        sink.record(AuditEvent::SessionExpired {
            token_id: uuid::Uuid::nil(),
        });
        sink.record(AuditEvent::SessionExpired {
            token_id: uuid::Uuid::nil(),
        });
        sink.record(AuditEvent::SessionExpired {
            token_id: uuid::Uuid::nil(),
        });
        assert!(sink.dropped_count() >= 1);
    }
}
