use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use courier_path::PathAccessor;
use tokio::sync::watch;
use tokio::task::{JoinError, JoinHandle};
use tracing::{debug, warn};

use crate::config::ChannelConfig;
use crate::core::broker::{Consumer, Producer};
use crate::core::correlation;
use crate::core::error::{ChannelError, HandlerError};
use crate::core::flags::FlagStore;
use crate::core::record::{ConsumerRecord, DeliveryCallback, ProducerRecord};
use crate::runtime::consume::ConsumeLoop;
use crate::runtime::lifecycle::ConsumerLifecycleController;

/// What the consume loop hands a handler: a record, or an error raised while
/// polling or handling.
pub type Delivery<'a, K, V> = Result<&'a ConsumerRecord<K, V>, &'a ChannelError>;

#[async_trait]
pub trait MessageHandler<K, V>: Send + Sync {
    async fn handle(&self, delivery: Delivery<'_, K, V>) -> Result<(), HandlerError>;
}

/// Cancels an unconditional subscription. Dropping the handle cancels too.
pub struct SubscriptionHandle {
    cancel: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl SubscriptionHandle {
    pub(crate) fn new(cancel: watch::Sender<bool>, task: JoinHandle<()>) -> Self {
        Self { cancel, task }
    }

    pub fn cancel(&self) {
        // the worker may already be gone
        let _ = self.cancel.send(true);
    }

    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }

    /// Cancels and waits for the worker to exit. Errs only if it panicked.
    pub async fn stop(self) -> Result<(), JoinError> {
        self.cancel();
        self.task.await
    }
}

/// Publish/subscribe front end over one broker client pair.
pub struct MessagingChannel<K, V> {
    config: Arc<ChannelConfig>,
    producer: Option<Arc<dyn Producer<K, V>>>,
    consumer: Option<Arc<dyn Consumer<K, V>>>,
    flags: Option<Arc<FlagStore>>,
    accessor: PathAccessor,
}

impl<K, V> Clone for MessagingChannel<K, V> {
    fn clone(&self) -> Self {
        Self {
            config: Arc::clone(&self.config),
            producer: self.producer.clone(),
            consumer: self.consumer.clone(),
            flags: self.flags.clone(),
            accessor: self.accessor.clone(),
        }
    }
}

/// Either kind of running subscription.
pub enum Subscription {
    Direct(SubscriptionHandle),
    Gated(Arc<ConsumerLifecycleController>),
}

impl<K, V> MessagingChannel<K, V>
where
    K: Send + Sync + 'static,
    V: Any + Send + Sync + 'static,
{
    pub fn new(config: ChannelConfig, accessor: PathAccessor) -> Self {
        Self {
            config: Arc::new(config),
            producer: None,
            consumer: None,
            flags: None,
            accessor,
        }
    }

    pub fn with_producer(mut self, producer: Arc<dyn Producer<K, V>>) -> Self {
        self.producer = Some(producer);
        self
    }

    pub fn with_consumer(mut self, consumer: Arc<dyn Consumer<K, V>>) -> Self {
        self.consumer = Some(consumer);
        self
    }

    pub fn with_flags(mut self, flags: Arc<FlagStore>) -> Self {
        self.flags = Some(flags);
        self
    }

    pub fn config(&self) -> &ChannelConfig {
        &self.config
    }

    /// Stamps the correlation id into `value` when a path is configured, sends,
    /// then flushes. A failed stamp is logged and the value goes out unchanged.
    pub async fn publish(
        &self,
        topic: &str,
        key: Option<K>,
        mut value: Option<V>,
        callback: DeliveryCallback,
    ) -> Result<(), ChannelError> {
        let producer = self
            .producer
            .as_ref()
            .ok_or_else(|| ChannelError::Config("no producer configured".to_string()))?;

        if let (Some(path), Some(body)) = (self.config.correlation_path(), value.as_mut()) {
            let id = correlation::current_or_random();
            match self.accessor.set(body as &mut dyn Any, path, id.as_str()) {
                Ok(true) => debug!(topic, path, correlation_id = %id, "correlation id stamped"),
                Ok(false) => warn!(
                    "Failed to set correlation id '{}' at path '{}' on message for topic '{}'.",
                    id, path, topic
                ),
                Err(err) => warn!(
                    "Failed to set correlation id '{}' at path '{}' on message for topic '{}': {}",
                    id, path, topic, err
                ),
            }
        }

        let record = ProducerRecord {
            topic: topic.to_string(),
            key,
            value,
        };
        producer.send(record, callback)?;
        producer.flush().await?;
        Ok(())
    }

    /// Starts a worker that polls `topics` until the returned handle cancels it.
    /// Must be called inside a Tokio runtime.
    pub fn subscribe(
        &self,
        topics: &[&str],
        handler: Arc<dyn MessageHandler<K, V>>,
        poll_interval: Duration,
    ) -> Result<SubscriptionHandle, ChannelError> {
        let worker = self.consume_loop(topics, handler, poll_interval)?;
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let task = tokio::spawn(worker.run(cancel_rx));
        Ok(SubscriptionHandle::new(cancel_tx, task))
    }

    /// Like [`MessagingChannel::subscribe`], but the worker only runs while
    /// `flag_key` evaluates to true.
    pub fn subscribe_gated(
        &self,
        topics: &[&str],
        handler: Arc<dyn MessageHandler<K, V>>,
        flag_key: &str,
        poll_interval: Duration,
    ) -> Result<Arc<ConsumerLifecycleController>, ChannelError> {
        let flags = self
            .flags
            .as_ref()
            .ok_or_else(|| ChannelError::Config("no flag store configured".to_string()))?;
        let worker = self.consume_loop(topics, handler, poll_interval)?;
        let controller = ConsumerLifecycleController::spawn(Arc::clone(flags), flag_key, worker)?;
        Ok(controller)
    }

    /// Subscribes to the configured topic, gated when a flag key is configured.
    pub fn subscribe_configured(&self, handler: Arc<dyn MessageHandler<K, V>>) -> Result<Subscription, ChannelError> {
        let topic = self.config.topic.clone();
        let interval = self.config.poll_interval();
        match self.config.flag_key() {
            Some(flag_key) => {
                let flag_key = flag_key.to_string();
                self.subscribe_gated(&[topic.as_str()], handler, &flag_key, interval)
                    .map(Subscription::Gated)
            }
            None => self
                .subscribe(&[topic.as_str()], handler, interval)
                .map(Subscription::Direct),
        }
    }

    /// Commits the consumer's position for its whole assignment, not just
    /// `record`. Only call this from a handler running on the subscription's
    /// own worker.
    pub async fn commit(&self, record: &ConsumerRecord<K, V>) -> Result<(), ChannelError> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| ChannelError::Config("no consumer configured".to_string()))?;
        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            "committing consumer position"
        );
        consumer.commit_sync().await?;
        Ok(())
    }

    fn consume_loop(
        &self,
        topics: &[&str],
        handler: Arc<dyn MessageHandler<K, V>>,
        poll_interval: Duration,
    ) -> Result<ConsumeLoop<K, V>, ChannelError> {
        let consumer = self
            .consumer
            .as_ref()
            .ok_or_else(|| ChannelError::Config("no consumer configured".to_string()))?;

        Ok(ConsumeLoop {
            consumer: Arc::clone(consumer),
            handler,
            topics: topics.iter().map(|t| t.to_string()).collect(),
            correlation_path: self.config.correlation_path().map(str::to_string),
            accessor: self.accessor.clone(),
            poll_timeout: self.config.poll_timeout(),
            poll_interval,
        })
    }
}
