pub mod config;
pub mod core;
pub mod logging;
pub mod runtime;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use crate::core::{channel, correlation, flags};
pub use crate::runtime::lifecycle;

pub use config::{ChannelConfig, ClientProperties, ConfigError, CourierConfig, SerializationFormat};
pub use crate::core::channel::{Delivery, MessageHandler, MessagingChannel, Subscription, SubscriptionHandle};
pub use crate::core::error::{BrokerError, ChannelError, FlagError, HandlerError};
pub use crate::core::flags::{EvaluationContext, FlagClient, FlagStore};
pub use crate::core::record::{ConsumerRecord, DeliveryCallback, ProducerRecord, RecordMetadata};
pub use logging::MinLogLevel;
pub use runtime::lifecycle::{ConsumerLifecycleController, LifecycleState};
