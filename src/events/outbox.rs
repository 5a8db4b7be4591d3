use std::sync::Arc;
use std::time::Duration;

use crate::ports::{EventPublisher, OutboxMessage, OutboxStore, RepositoryResult};

const MAX_RETRY_DELAY: Duration = Duration::from_secs(300);

/// Failures past this many attempts are logged at `error`.
pub const ALERT_AFTER_ATTEMPTS: i32 = 10;

/// Wait before retrying a message that has failed `attempts` times:
/// doubles from 2s and caps at five minutes.
pub fn retry_delay(attempts: i32) -> Duration {
    let exponent = attempts.clamp(1, 16) as u32;
    Duration::from_secs(2u64.pow(exponent)).min(MAX_RETRY_DELAY)
}

/// Drains `outbox_events` into the broker. Rows are written in the same
/// database transaction as the change they describe, so nothing is lost if
/// the broker is down when the order commits.
pub struct OutboxDispatcher {
    store: Arc<dyn OutboxStore>,
    publisher: Arc<dyn EventPublisher>,
    batch_size: i64,
    poll_interval: Duration,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DispatchReport {
    pub published: usize,
    pub failed: usize,
}

impl OutboxDispatcher {
    pub fn new(
        store: Arc<dyn OutboxStore>,
        publisher: Arc<dyn EventPublisher>,
        batch_size: i64,
        poll_interval: Duration,
    ) -> Self {
        Self {
            store,
            publisher,
            batch_size,
            poll_interval,
        }
    }

    pub async fn run(self) {
        tracing::info!(
            batch_size = self.batch_size,
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "outbox dispatcher started"
        );

        loop {
            match self.dispatch_once().await {
                // A full batch means more may be waiting.
                Ok(report) if report.published as i64 >= self.batch_size => continue,
                Ok(_) => {}
                Err(e) => tracing::error!(error = %e, "outbox dispatch failed"),
            }
            tokio::time::sleep(self.poll_interval).await;
        }
    }

    pub async fn dispatch_once(&self) -> RepositoryResult<DispatchReport> {
        let batch = self.store.claim_batch(self.batch_size).await?;
        let mut report = DispatchReport::default();

        for message in batch {
            let payload = match serde_json::to_vec(&message.payload) {
                Ok(payload) => payload,
                Err(e) => {
                    self.record_failure(&message, &e.to_string()).await?;
                    report.failed += 1;
                    continue;
                }
            };

            match self.publisher.publish(&message.routing_key, &payload).await {
                Ok(()) => {
                    self.store.mark_published(message.id).await?;
                    report.published += 1;
                    tracing::debug!(
                        event_id = %message.event_id,
                        routing_key = %message.routing_key,
                        "outbox event published"
                    );
                }
                Err(e) => {
                    self.record_failure(&message, &e.to_string()).await?;
                    report.failed += 1;
                }
            }
        }

        Ok(report)
    }

    async fn record_failure(&self, message: &OutboxMessage, error: &str) -> RepositoryResult<()> {
        let attempts = message.attempts + 1;
        let retry_in = retry_delay(attempts);

        if attempts >= ALERT_AFTER_ATTEMPTS {
            tracing::error!(
                event_id = %message.event_id,
                routing_key = %message.routing_key,
                attempts,
                retry_in_secs = retry_in.as_secs(),
                error,
                "outbox event keeps failing to publish"
            );
        } else {
            tracing::warn!(
                event_id = %message.event_id,
                attempts,
                retry_in_secs = retry_in.as_secs(),
                error,
                "outbox publish failed"
            );
        }

        self.store.mark_failed(message.id, error, retry_in).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{MemoryOutbox, RecordingPublisher};
    use serde_json::json;

    #[tokio::test]
    async fn test_publishes_pending_events_once() {
        let outbox = Arc::new(MemoryOutbox::default());
        outbox.push("merchant.stock.reduced", json!({"order_code": "A"}));
        outbox.push("merchant.stock.reduced", json!({"order_code": "B"}));
        let publisher = Arc::new(RecordingPublisher::default());

        let dispatcher = OutboxDispatcher::new(outbox.clone(), publisher.clone(), 50, Duration::from_millis(10));

        let report = dispatcher.dispatch_once().await.unwrap();
        assert_eq!(report, DispatchReport { published: 2, failed: 0 });

        let again = dispatcher.dispatch_once().await.unwrap();
        assert_eq!(again, DispatchReport::default());

        let sent = publisher.sent();
        assert_eq!(sent.len(), 2);
        assert_eq!(sent[0].0, "merchant.stock.reduced");
        assert_eq!(serde_json::from_slice::<serde_json::Value>(&sent[0].1).unwrap()["order_code"], "A");
    }

    #[test]
    fn test_retry_delay_doubles_then_caps() {
        assert_eq!(retry_delay(1), Duration::from_secs(2));
        assert_eq!(retry_delay(2), Duration::from_secs(4));
        assert_eq!(retry_delay(5), Duration::from_secs(32));
        assert_eq!(retry_delay(9), MAX_RETRY_DELAY);
        assert_eq!(retry_delay(i32::MAX), MAX_RETRY_DELAY);
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_publish_stays_pending() {
        let outbox = Arc::new(MemoryOutbox::default());
        outbox.push("merchant.stock.reduced", json!({"order_code": "A"}));
        let publisher = Arc::new(RecordingPublisher::default());
        publisher.set_failing(true);

        let dispatcher = OutboxDispatcher::new(outbox.clone(), publisher.clone(), 50, Duration::from_millis(10));

        let report = dispatcher.dispatch_once().await.unwrap();
        assert_eq!(report, DispatchReport { published: 0, failed: 1 });
        assert_eq!(outbox.pending(), 1);
        assert_eq!(outbox.attempts_of(1), Some(1));

        publisher.set_failing(false);
        // Backed off: not retried on the very next poll.
        assert_eq!(dispatcher.dispatch_once().await.unwrap(), DispatchReport::default());

        tokio::time::advance(retry_delay(1)).await;
        let report = dispatcher.dispatch_once().await.unwrap();
        assert_eq!(report.published, 1);
        assert_eq!(outbox.pending(), 0);
    }
}
