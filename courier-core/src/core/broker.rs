//! Seams to the external broker client.

use std::time::Duration;

use async_trait::async_trait;

use crate::core::error::BrokerError;
use crate::core::record::{ConsumerRecord, DeliveryCallback, ProducerRecord};

#[async_trait]
pub trait Producer<K, V>: Send + Sync {
    /// Enqueues the record. Completion is reported through `callback`.
    fn send(&self, record: ProducerRecord<K, V>, callback: DeliveryCallback) -> Result<(), BrokerError>;

    /// Blocks until every enqueued record has completed.
    async fn flush(&self) -> Result<(), BrokerError>;
}

#[async_trait]
pub trait Consumer<K, V>: Send + Sync {
    async fn subscribe(&self, topics: &[String]) -> Result<(), BrokerError>;

    /// Waits at most `timeout` for records; an empty batch is not an error.
    async fn poll(&self, timeout: Duration) -> Result<Vec<ConsumerRecord<K, V>>, BrokerError>;

    /// Commits the current position of every assigned partition, not just
    /// the last record handled.
    async fn commit_sync(&self) -> Result<(), BrokerError>;
}
