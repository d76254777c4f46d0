use std::sync::Arc;

use crate::live::envelope::UpdateEnvelope;
use crate::live::registry::{BroadcastReport, SubscriptionRegistry};

/// Serializes envelopes once and fans them out to the envelope's group.
///
/// Publishing is best-effort and never fails the caller: serialization errors
/// are logged and delivery problems are handled per connection by the registry.
#[derive(Debug, Clone)]
pub struct UpdatePublisher {
    registry: Arc<SubscriptionRegistry>,
}

impl UpdatePublisher {
    pub fn new(registry: Arc<SubscriptionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn publish(&self, envelope: &UpdateEnvelope) -> BroadcastReport {
        let group = envelope.group();

        let payload: Arc<str> = match serde_json::to_string(envelope) {
            Ok(json) => Arc::from(json),
            Err(e) => {
                tracing::error!(error = %e, group = %group, "Failed to serialize update envelope");
                return BroadcastReport::default();
            }
        };

        let report = self.registry.broadcast(group, payload).await;

        tracing::debug!(
            group = %group,
            sensor_id = envelope.message.sensor_id,
            delivered = report.delivered,
            dropped = report.dropped,
            evicted = report.evicted,
            "Published sensor update"
        );

        report
    }
}
