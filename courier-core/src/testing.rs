//! In-process doubles for the external broker and flag clients.
//!
//! Only compiled for this crate's unit tests or with the `testing` feature,
//! which the integration tests enable through the dev-dependency on `courier`.

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::Instant;
use xxhash_rust::xxh3::xxh3_64;

use crate::core::broker::{Consumer, Producer};
use crate::core::channel::{Delivery, MessageHandler};
use crate::core::correlation;
use crate::core::error::{BrokerError, ChannelError, FlagError, HandlerError};
use crate::core::flags::{EvaluationContext, FlagChange, FlagClient, FlagListener, ListenerHandle};
use crate::core::record::{ConsumerRecord, DeliveryCallback, ProducerRecord, RecordMetadata};

fn locked<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Partition chosen for a keyed record.
pub fn partition_for_key(key: &[u8], partitions: u32) -> u32 {
    (xxh3_64(key) % partitions as u64) as u32
}

struct BrokerState<K, V> {
    logs: HashMap<String, Vec<Vec<ConsumerRecord<K, V>>>>,
    round_robin: HashMap<String, u32>,
    pending: Vec<(Result<RecordMetadata, BrokerError>, DeliveryCallback)>,
    subscriptions: Vec<String>,
    positions: HashMap<(String, u32), u64>,
    committed: HashMap<(String, u32), u64>,
    commits: usize,
    send_failures: VecDeque<BrokerError>,
    poll_failures: VecDeque<BrokerError>,
    commit_failures: VecDeque<BrokerError>,
}

/// A single-group broker that is both producer and consumer.
///
/// Sends are appended immediately and acknowledged on `flush`. Keyed records
/// are partitioned by hash of the key, unkeyed ones round robin. A poll
/// returns everything past the consumer's position on subscribed topics.
pub struct MemoryBroker<K, V> {
    partitions: u32,
    max_poll_records: usize,
    state: Mutex<BrokerState<K, V>>,
    arrivals: Notify,
}

impl<K, V> MemoryBroker<K, V>
where
    K: AsRef<[u8]> + Clone,
    V: Clone,
{
    pub fn new(partitions: u32) -> Self {
        Self {
            partitions: partitions.max(1),
            max_poll_records: 500,
            state: Mutex::new(BrokerState {
                logs: HashMap::new(),
                round_robin: HashMap::new(),
                pending: Vec::new(),
                subscriptions: Vec::new(),
                positions: HashMap::new(),
                committed: HashMap::new(),
                commits: 0,
                send_failures: VecDeque::new(),
                poll_failures: VecDeque::new(),
                commit_failures: VecDeque::new(),
            }),
            arrivals: Notify::new(),
        }
    }

    pub fn with_max_poll_records(mut self, max: usize) -> Self {
        self.max_poll_records = max.max(1);
        self
    }

    /// Writes a record straight into the log, bypassing the producer path.
    pub fn append(&self, topic: &str, key: Option<K>, value: Option<V>) -> RecordMetadata {
        let metadata = self.store(&mut locked(&self.state), topic, key, value);
        self.arrivals.notify_waiters();
        metadata
    }

    fn store(&self, state: &mut BrokerState<K, V>, topic: &str, key: Option<K>, value: Option<V>) -> RecordMetadata {
        let partition = match &key {
            Some(k) => partition_for_key(k.as_ref(), self.partitions),
            None => {
                let next = state.round_robin.entry(topic.to_string()).or_insert(0);
                let chosen = *next % self.partitions;
                *next = next.wrapping_add(1);
                chosen
            }
        };

        let partitions = self.partitions as usize;
        let log = state
            .logs
            .entry(topic.to_string())
            .or_insert_with(|| (0..partitions).map(|_| Vec::new()).collect());
        let records = &mut log[partition as usize];

        let record = ConsumerRecord {
            topic: topic.to_string(),
            partition,
            offset: records.len() as u64,
            timestamp: Utc::now(),
            key,
            value,
        };
        let metadata = RecordMetadata {
            topic: record.topic.clone(),
            partition,
            offset: record.offset,
            timestamp: record.timestamp,
        };
        records.push(record);
        metadata
    }

    pub fn fail_next_send(&self, err: BrokerError) {
        locked(&self.state).send_failures.push_back(err);
    }

    pub fn fail_next_poll(&self, err: BrokerError) {
        locked(&self.state).poll_failures.push_back(err);
        self.arrivals.notify_waiters();
    }

    pub fn fail_next_commit(&self, err: BrokerError) {
        locked(&self.state).commit_failures.push_back(err);
    }

    /// Everything stored on `topic`, partition by partition.
    pub fn records(&self, topic: &str) -> Vec<ConsumerRecord<K, V>> {
        locked(&self.state)
            .logs
            .get(topic)
            .map(|log| log.iter().flatten().cloned().collect())
            .unwrap_or_default()
    }

    pub fn pending_deliveries(&self) -> usize {
        locked(&self.state).pending.len()
    }

    pub fn subscriptions(&self) -> Vec<String> {
        locked(&self.state).subscriptions.clone()
    }

    /// Next offset the consumer will read.
    pub fn position(&self, topic: &str, partition: u32) -> u64 {
        let state = locked(&self.state);
        state
            .positions
            .get(&(topic.to_string(), partition))
            .copied()
            .unwrap_or(0)
    }

    pub fn committed(&self, topic: &str, partition: u32) -> Option<u64> {
        locked(&self.state)
            .committed
            .get(&(topic.to_string(), partition))
            .copied()
    }

    pub fn commit_count(&self) -> usize {
        locked(&self.state).commits
    }

    fn take_batch(&self) -> Result<Vec<ConsumerRecord<K, V>>, BrokerError> {
        let mut guard = locked(&self.state);
        let state = &mut *guard;
        if let Some(err) = state.poll_failures.pop_front() {
            return Err(err);
        }

        let mut batch = Vec::new();
        for topic in &state.subscriptions {
            let Some(log) = state.logs.get(topic) else {
                continue;
            };
            for (partition, records) in log.iter().enumerate() {
                let position = state
                    .positions
                    .entry((topic.clone(), partition as u32))
                    .or_insert(0);
                while (*position as usize) < records.len() && batch.len() < self.max_poll_records {
                    batch.push(records[*position as usize].clone());
                    *position += 1;
                }
            }
        }
        Ok(batch)
    }
}

#[async_trait]
impl<K, V> Producer<K, V> for MemoryBroker<K, V>
where
    K: AsRef<[u8]> + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    fn send(&self, record: ProducerRecord<K, V>, callback: DeliveryCallback) -> Result<(), BrokerError> {
        let mut state = locked(&self.state);
        let outcome = match state.send_failures.pop_front() {
            Some(err) => Err(err),
            None => Ok(self.store(&mut state, &record.topic, record.key, record.value)),
        };
        state.pending.push((outcome, callback));
        drop(state);
        self.arrivals.notify_waiters();
        Ok(())
    }

    async fn flush(&self) -> Result<(), BrokerError> {
        let pending = std::mem::take(&mut locked(&self.state).pending);
        for (outcome, callback) in pending {
            callback(outcome);
        }
        Ok(())
    }
}

#[async_trait]
impl<K, V> Consumer<K, V> for MemoryBroker<K, V>
where
    K: AsRef<[u8]> + Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn subscribe(&self, topics: &[String]) -> Result<(), BrokerError> {
        locked(&self.state).subscriptions = topics.to_vec();
        Ok(())
    }

    async fn poll(&self, timeout: Duration) -> Result<Vec<ConsumerRecord<K, V>>, BrokerError> {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            let batch = self.take_batch()?;
            if !batch.is_empty() {
                return Ok(batch);
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return Ok(Vec::new());
            }
        }
    }

    async fn commit_sync(&self) -> Result<(), BrokerError> {
        let mut state = locked(&self.state);
        if let Some(err) = state.commit_failures.pop_front() {
            return Err(err);
        }
        state.committed = state.positions.clone();
        state.commits += 1;
        Ok(())
    }
}

/// A flag client backed by an in-memory map.
#[derive(Default)]
pub struct StaticFlagClient {
    values: DashMap<String, bool>,
    listeners: DashMap<String, Vec<FlagListener>>,
    next_handle: AtomicU64,
    failure: Mutex<Option<String>>,
    evaluations: AtomicUsize,
}

impl StaticFlagClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` and notifies listeners if it changed.
    pub fn set(&self, key: &str, value: bool) {
        let old = self.values.insert(key.to_string(), value);
        if old != Some(value) {
            self.fire(FlagChange {
                key: key.to_string(),
                old,
                new: value,
            });
        }
    }

    pub fn set_silently(&self, key: &str, value: bool) {
        self.values.insert(key.to_string(), value);
    }

    /// Stores `value` and notifies listeners even when nothing changed.
    pub fn emit(&self, key: &str, value: bool) {
        let old = self.values.insert(key.to_string(), value);
        self.fire(FlagChange {
            key: key.to_string(),
            old,
            new: value,
        });
    }

    pub fn fail_with(&self, message: &str) {
        *locked(&self.failure) = Some(message.to_string());
    }

    pub fn recover(&self) {
        *locked(&self.failure) = None;
    }

    pub fn evaluations(&self) -> usize {
        self.evaluations.load(Ordering::SeqCst)
    }

    fn check(&self) -> Result<(), FlagError> {
        match &*locked(&self.failure) {
            Some(message) => Err(FlagError::Client(message.clone())),
            None => Ok(()),
        }
    }

    fn fire(&self, change: FlagChange) {
        // listeners run without any map lock held
        let listeners = self
            .listeners
            .get(&change.key)
            .map(|entry| entry.value().clone())
            .unwrap_or_default();
        for listener in listeners {
            listener(&change);
        }
    }
}

impl FlagClient for StaticFlagClient {
    fn bool_variation(&self, key: &str, _context: &EvaluationContext, default: bool) -> Result<bool, FlagError> {
        self.check()?;
        self.evaluations.fetch_add(1, Ordering::SeqCst);
        Ok(self.values.get(key).map(|v| *v.value()).unwrap_or(default))
    }

    fn add_listener(
        &self,
        key: &str,
        _context: &EvaluationContext,
        listener: FlagListener,
    ) -> Result<ListenerHandle, FlagError> {
        self.check()?;
        self.listeners.entry(key.to_string()).or_default().push(listener);
        Ok(ListenerHandle(self.next_handle.fetch_add(1, Ordering::SeqCst)))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Behaviour {
    Record,
    FailAt(u64),
    PanicAt(u64),
}

/// Handler that remembers every delivery and the correlation id it ran under.
pub struct RecordingHandler<K, V> {
    behaviour: Behaviour,
    records: Mutex<Vec<ConsumerRecord<K, V>>>,
    errors: Mutex<Vec<ChannelError>>,
    correlation_ids: Mutex<Vec<Option<String>>>,
    arrivals: Notify,
}

impl<K: Clone, V: Clone> RecordingHandler<K, V> {
    pub fn new() -> Self {
        Self::with_behaviour(Behaviour::Record)
    }

    /// Returns an error for the record at `offset`, after recording it.
    pub fn failing_at(offset: u64) -> Self {
        Self::with_behaviour(Behaviour::FailAt(offset))
    }

    /// Panics on the record at `offset`, after recording it.
    pub fn panicking_at(offset: u64) -> Self {
        Self::with_behaviour(Behaviour::PanicAt(offset))
    }

    fn with_behaviour(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            records: Mutex::new(Vec::new()),
            errors: Mutex::new(Vec::new()),
            correlation_ids: Mutex::new(Vec::new()),
            arrivals: Notify::new(),
        }
    }

    pub fn records(&self) -> Vec<ConsumerRecord<K, V>> {
        locked(&self.records).clone()
    }

    pub fn errors(&self) -> Vec<ChannelError> {
        locked(&self.errors).clone()
    }

    pub fn correlation_ids(&self) -> Vec<Option<String>> {
        locked(&self.correlation_ids).clone()
    }

    pub async fn wait_for_records(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(|h| locked(&h.records).len() >= count, timeout).await
    }

    pub async fn wait_for_errors(&self, count: usize, timeout: Duration) -> bool {
        self.wait_until(|h| locked(&h.errors).len() >= count, timeout).await
    }

    async fn wait_until(&self, done: impl Fn(&Self) -> bool, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        loop {
            let notified = self.arrivals.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if done(self) {
                return true;
            }
            if tokio::time::timeout_at(deadline, notified).await.is_err() {
                return done(self);
            }
        }
    }
}

impl<K: Clone, V: Clone> Default for RecordingHandler<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl<K, V> MessageHandler<K, V> for RecordingHandler<K, V>
where
    K: Clone + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
{
    async fn handle(&self, delivery: Delivery<'_, K, V>) -> Result<(), HandlerError> {
        let outcome = match delivery {
            Ok(record) => {
                locked(&self.records).push(record.clone());
                locked(&self.correlation_ids).push(correlation::current());
                match self.behaviour {
                    Behaviour::FailAt(offset) if record.offset == offset => {
                        Err(HandlerError::new(format!("rejected offset {offset}")))
                    }
                    Behaviour::PanicAt(offset) if record.offset == offset => {
                        self.arrivals.notify_waiters();
                        panic!("handler panicked at offset {offset}");
                    }
                    _ => Ok(()),
                }
            }
            Err(err) => {
                locked(&self.errors).push(err.clone());
                Ok(())
            }
        };
        self.arrivals.notify_waiters();
        outcome
    }
}
