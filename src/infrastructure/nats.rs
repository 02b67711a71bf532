//! Domain events over NATS core publish.

use async_trait::async_trait;

use crate::domain::events::DomainEvent;
use crate::ports::{EventPublisher, StorageError};

pub struct NatsPublisher {
    client: async_nats::Client,
    subject: String,
}

impl NatsPublisher {
    pub async fn connect(url: &str, subject: impl Into<String>) -> Result<Self, async_nats::ConnectError> {
        let client = async_nats::connect(url).await?;
        Ok(Self { client, subject: subject.into() })
    }

    /// `<subject>.<event name>`, e.g. `marketplace.orders.status.order_placed`.
    fn subject_for(&self, event: &DomainEvent) -> String { format!("{}.{}", self.subject, event.name()) }
}

#[async_trait]
impl EventPublisher for NatsPublisher {
    async fn publish(&self, event: &DomainEvent) -> Result<(), StorageError> {
        let payload = serde_json::to_vec(event)?;
        self.client
            .publish(self.subject_for(event), payload.into())
            .await
            .map_err(|e| StorageError::Unavailable(format!("nats publish: {e}")))?;
        tracing::debug!(event = event.name(), subject = %self.subject, "event published");
        Ok(())
    }
}
