use std::any::Any;
use std::sync::Arc;
use std::time::Duration;

use courier_path::PathAccessor;
use tokio::sync::watch::Receiver;
use tracing::{debug, error, info, info_span, warn, Instrument};

use crate::core::broker::Consumer;
use crate::core::channel::MessageHandler;
use crate::core::correlation;
use crate::core::error::ChannelError;
use crate::core::record::ConsumerRecord;

/// One subscription's poll → handle loop. Cloned once per worker start.
pub(crate) struct ConsumeLoop<K, V> {
    pub(crate) consumer: Arc<dyn Consumer<K, V>>,
    pub(crate) handler: Arc<dyn MessageHandler<K, V>>,
    pub(crate) topics: Vec<String>,
    pub(crate) correlation_path: Option<String>,
    pub(crate) accessor: PathAccessor,
    pub(crate) poll_timeout: Duration,
    pub(crate) poll_interval: Duration,
}

impl<K, V> Clone for ConsumeLoop<K, V> {
    fn clone(&self) -> Self {
        Self {
            consumer: Arc::clone(&self.consumer),
            handler: Arc::clone(&self.handler),
            topics: self.topics.clone(),
            correlation_path: self.correlation_path.clone(),
            accessor: self.accessor.clone(),
            poll_timeout: self.poll_timeout,
            poll_interval: self.poll_interval,
        }
    }
}

fn cancelled(cancel: &Receiver<bool>) -> bool {
    *cancel.borrow()
}

impl<K, V> ConsumeLoop<K, V>
where
    K: Send + Sync + 'static,
    V: Any + Send + Sync + 'static,
{
    /// Runs until `cancel` flips to true or its sender is dropped.
    pub(crate) async fn run(self, mut cancel: Receiver<bool>) {
        if let Err(err) = self.consumer.subscribe(&self.topics).await {
            error!(topics = ?self.topics, %err, "consumer subscribe failed, worker exiting");
            self.deliver_error(ChannelError::Broker(err)).await;
            return;
        }
        info!(topics = ?self.topics, "consumer worker started");

        loop {
            if cancelled(&cancel) {
                break;
            }

            let polled = tokio::select! {
                polled = self.consumer.poll(self.poll_timeout) => polled,
                _ = cancel.changed() => break,
            };

            match polled {
                Ok(records) => {
                    if !records.is_empty() {
                        debug!(count = records.len(), "polled records");
                    }
                    for record in &records {
                        if cancelled(&cancel) {
                            break;
                        }
                        if let Err(err) = self.dispatch(record).await {
                            // rest of the batch is dropped; the next poll resumes
                            // from the consumer's position
                            self.deliver_error(ChannelError::Handler(err)).await;
                            break;
                        }
                    }
                }
                Err(err) => {
                    warn!(%err, "poll failed");
                    self.deliver_error(ChannelError::Broker(err)).await;
                }
            }

            if !self.poll_interval.is_zero() {
                tokio::select! {
                    _ = tokio::time::sleep(self.poll_interval) => {}
                    _ = cancel.changed() => break,
                }
            }
        }

        info!(topics = ?self.topics, "consumer worker stopped");
    }

    async fn dispatch(&self, record: &ConsumerRecord<K, V>) -> Result<(), crate::core::error::HandlerError> {
        let span = info_span!(
            "consume",
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            correlation_id = tracing::field::Empty,
        );

        match self.correlation_id(record) {
            Some(id) => {
                span.record("correlation_id", id.as_str());
                correlation::scope(id, self.handler.handle(Ok(record)).instrument(span)).await
            }
            None => self.handler.handle(Ok(record)).instrument(span).await,
        }
    }

    /// The id to run the handler under, or `None` when the record carries no
    /// value at the configured path (or no path is configured).
    fn correlation_id(&self, record: &ConsumerRecord<K, V>) -> Option<String> {
        let path = self.correlation_path.as_deref()?;
        let value = record.value.as_ref()?;

        let found = match self.accessor.get(value as &dyn Any, path) {
            Ok(node) => node.as_str().map(str::to_string),
            Err(err) => {
                debug!(path, %err, "correlation path unreadable");
                None
            }
        };

        let chosen = match found.as_deref() {
            Some(id) if correlation::is_valid(id) => id.to_string(),
            _ => correlation::current_or_random(),
        };

        let matches = found
            .as_deref()
            .is_some_and(|id| id.eq_ignore_ascii_case(&chosen));
        if !matches {
            warn!(
                "Message from topic '{}' partition '{}' offset '{}' had invalid correlation id at '{}': '{}'. Using '{}'.",
                record.topic,
                record.partition,
                record.offset,
                path,
                found.as_deref().unwrap_or("null"),
                chosen
            );
        }
        Some(chosen)
    }

    async fn deliver_error(&self, err: ChannelError) {
        if let Err(handler_err) = self.handler.handle(Err(&err)).await {
            error!(%err, %handler_err, "handler failed while processing a delivery error");
        }
    }
}
