use chrono::{DateTime, Utc};

use crate::core::error::BrokerError;

/// A message on its way to the broker.
#[derive(Debug, Clone, PartialEq)]
pub struct ProducerRecord<K, V> {
    pub topic: String,
    pub key: Option<K>,
    pub value: Option<V>,
}

/// A message handed out by a poll. Owned by the consume loop; handlers get a reference.
#[derive(Debug, Clone, PartialEq)]
pub struct ConsumerRecord<K, V> {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub timestamp: DateTime<Utc>,
    pub key: Option<K>,
    pub value: Option<V>,
}

/// Where the broker put an acknowledged record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordMetadata {
    pub topic: String,
    pub partition: u32,
    pub offset: u64,
    pub timestamp: DateTime<Utc>,
}

/// Completion of a send. May run on any thread.
pub type DeliveryCallback = Box<dyn FnOnce(Result<RecordMetadata, BrokerError>) + Send + 'static>;
