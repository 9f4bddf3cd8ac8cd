use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use tracing::{debug, info};

use crate::core::error::FlagError;

/// Who the flags are being evaluated for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationContext {
    pub key: String,
    pub kind: String,
    pub name: Option<String>,
    pub attributes: BTreeMap<String, String>,
}

impl EvaluationContext {
    pub fn application(key: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            kind: "application".to_string(),
            name: Some(name.into()),
            attributes: BTreeMap::new(),
        }
    }

    pub fn with_attribute(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(name.into(), value.into());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FlagChange {
    pub key: String,
    pub old: Option<bool>,
    pub new: bool,
}

pub type FlagListener = Arc<dyn Fn(&FlagChange) + Send + Sync>;

/// Called with the full transition each time a subscribed flag changes. The
/// cache already holds `change.new` when it runs.
pub type ChangeHandler = Arc<dyn Fn(&FlagChange) + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerHandle(pub u64);

/// The external flag-evaluation service.
pub trait FlagClient: Send + Sync {
    fn bool_variation(&self, key: &str, context: &EvaluationContext, default: bool) -> Result<bool, FlagError>;

    /// Registers a listener for value changes of `key`.
    fn add_listener(
        &self,
        key: &str,
        context: &EvaluationContext,
        listener: FlagListener,
    ) -> Result<ListenerHandle, FlagError>;
}

/// Caches the last seen value of each flag and fans change events out to handlers.
///
/// Entries are created on first evaluation or subscription, overwritten on
/// every later evaluation or change event, and never removed.
pub struct FlagStore {
    client: Arc<dyn FlagClient>,
    context: EvaluationContext,
    cache: Arc<DashMap<String, bool>>,
    listeners: DashMap<String, Vec<ListenerHandle>>,
}

impl FlagStore {
    pub fn new(client: Arc<dyn FlagClient>, context: EvaluationContext) -> Self {
        Self {
            client,
            context,
            cache: Arc::new(DashMap::new()),
            listeners: DashMap::new(),
        }
    }

    pub fn context(&self) -> &EvaluationContext {
        &self.context
    }

    /// Asks the client for the current value and caches it. `default` is
    /// only passed through to the client.
    pub fn evaluate(&self, key: &str, default: bool) -> Result<bool, FlagError> {
        let value = self.client.bool_variation(key, &self.context, default)?;
        self.cache.insert(key.to_string(), value);
        debug!(key, value, "flag evaluated");
        Ok(value)
    }

    pub fn cached(&self, key: &str) -> Result<bool, FlagError> {
        self.cache
            .get(key)
            .map(|entry| *entry.value())
            .ok_or_else(|| FlagError::NotFound(key.to_string()))
    }

    /// Listens for changes of `key`, then primes the cache with one
    /// evaluation (default `false`).
    ///
    /// On each change: cache update, then `handler`, then an info log of the
    /// transition. There is no unsubscribe; the listener handle is kept for
    /// the life of the store.
    pub fn subscribe_to_changes(&self, key: &str, handler: Option<ChangeHandler>) -> Result<(), FlagError> {
        let cache = Arc::clone(&self.cache);
        let watched = key.to_string();

        let listener: FlagListener = Arc::new(move |change: &FlagChange| {
            if change.key != watched {
                return;
            }
            cache.insert(change.key.clone(), change.new);
            if let Some(handler) = &handler {
                handler(change);
            }
            info!(
                "The feature flag with key '{}' changed value from '{}' to '{}'.",
                change.key,
                change
                    .old
                    .map(|old| old.to_string())
                    .unwrap_or_else(|| "unknown".to_string()),
                change.new
            );
        });

        let handle = self.client.add_listener(key, &self.context, listener)?;
        self.listeners
            .entry(key.to_string())
            .or_default()
            .push(handle);

        self.evaluate(key, false)?;
        Ok(())
    }

    pub fn listener_count(&self, key: &str) -> usize {
        self.listeners.get(key).map(|handles| handles.len()).unwrap_or(0)
    }
}
