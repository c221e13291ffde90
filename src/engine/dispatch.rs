use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{debug, warn};

use super::debounce::DebounceSink;
use super::subscriptions::SubscriptionIndex;

/// Delivers a rendered notification to one text channel.
#[async_trait]
pub trait NotificationSender: Send + Sync {
    async fn emit(&self, target_id: &str, message: &str) -> Result<()>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryReport {
    pub delivered: usize,
    pub failed: usize,
}

/// Fans a settled notification out to every subscriber of its source.
pub struct NotificationDispatcher {
    subscriptions: Arc<SubscriptionIndex>,
    sender: Arc<dyn NotificationSender>,
}

impl NotificationDispatcher {
    pub fn new(subscriptions: Arc<SubscriptionIndex>, sender: Arc<dyn NotificationSender>) -> Self {
        Self {
            subscriptions,
            sender,
        }
    }

    /// Best effort: a failed target is logged and skipped, no retries.
    pub async fn dispatch(&self, source_id: &str, message: &str) -> DeliveryReport {
        let mut report = DeliveryReport::default();
        for subscription in self.subscriptions.list_by_source(source_id) {
            match self.sender.emit(&subscription.target_id, message).await {
                Ok(()) => report.delivered += 1,
                Err(err) => {
                    warn!(
                        "error sending notification to channel {}: {err}",
                        subscription.target_id
                    );
                    report.failed += 1;
                }
            }
        }
        report
    }
}

#[async_trait]
impl DebounceSink for NotificationDispatcher {
    async fn fire(&self, source_id: &str, message: String) {
        let report = self.dispatch(source_id, &message).await;
        debug!(
            "notification for source {} delivered={} failed={}",
            source_id, report.delivered, report.failed
        );
    }
}
