#![allow(dead_code)]

use std::io::Write;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use courier::config::ChannelConfig;
use courier::testing::{MemoryBroker, StaticFlagClient};
use courier::{EvaluationContext, FlagStore, MessagingChannel};
use courier_path::{Object, PathAccessor, SchemaBuilder, SchemaRegistry};
use tracing_subscriber::fmt::MakeWriter;

pub const TOPIC: &str = "orders";
pub const FLAG: &str = "orders-consumer-enabled";
pub const WAIT: Duration = Duration::from_secs(3);

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Order {
    pub id: i64,
    pub customer: String,
    pub meta: Option<Meta>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Meta {
    pub trace_id: Option<String>,
}

impl Object for Meta {}

impl Order {
    pub fn new(id: i64, customer: &str) -> Self {
        Self {
            id,
            customer: customer.to_string(),
            meta: None,
        }
    }

    pub fn trace_id(&self) -> Option<&str> {
        self.meta.as_ref()?.trace_id.as_deref()
    }
}

pub fn registry() -> SchemaRegistry {
    let mut registry = SchemaRegistry::new();
    registry
        .register(
            SchemaBuilder::<Order>::new("Order")
                .scalar("id", |o| &o.id, |o| &mut o.id)
                .scalar("customer", |o| &o.customer, |o| &mut o.customer)
                .object("meta", |o| &o.meta, |o| &mut o.meta)
                .build(),
        )
        .register(
            SchemaBuilder::<Meta>::new("Meta")
                .scalar("traceId", |m| &m.trace_id, |m| &mut m.trace_id)
                .build(),
        )
        .creatable::<Meta>();
    registry
}

pub type OrderBroker = MemoryBroker<String, Order>;
pub type OrderChannel = MessagingChannel<String, Order>;

/// Channel wired to one in-memory broker for both directions.
pub fn channel(config: ChannelConfig, broker: &Arc<OrderBroker>) -> OrderChannel {
    MessagingChannel::new(config, PathAccessor::new(registry()))
        .with_producer(broker.clone())
        .with_consumer(broker.clone())
}

pub fn flag_store(client: &Arc<StaticFlagClient>) -> Arc<FlagStore> {
    Arc::new(FlagStore::new(
        client.clone(),
        EvaluationContext::application("courier-tests", "courier tests").with_attribute("env", "test"),
    ))
}

pub fn folder_to_use() -> PathBuf {
    tempfile::Builder::new()
        .prefix("courier_test_")
        .tempdir()
        .expect("failed to create temp dir")
        .into_path()
}

/// Collects formatted log output of the current thread.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let subscriber = tracing_subscriber::fmt()
            .with_writer(self.clone())
            .with_max_level(tracing::Level::DEBUG)
            .with_ansi(false)
            .finish();
        tracing::subscriber::set_default(subscriber)
    }

    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for LogCapture {
    type Writer = LogCapture;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
