use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::core::flags::EvaluationContext;
use crate::logging::MinLogLevel;

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required config: {0}")]
    Missing(String),

    #[error("Invalid value for config '{key}': '{value}'")]
    Invalid { key: String, value: String },
}

impl ConfigError {
    fn invalid(key: &str, value: &str) -> Self {
        ConfigError::Invalid {
            key: key.to_string(),
            value: value.to_string(),
        }
    }
}

/// Wire format of keys and values, which picks the broker client's serializers.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SerializationFormat {
    #[default]
    Json,
    Avro,
}

impl FromStr for SerializationFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "json" => Ok(SerializationFormat::Json),
            "avro" => Ok(SerializationFormat::Avro),
            _ => Err(ConfigError::invalid(options::SERIALIZATION_FORMAT, s)),
        }
    }
}

/// Everything one messaging channel needs. Immutable once built.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChannelConfig {
    pub topic: String,

    pub format: SerializationFormat,

    /// Path inside message values that carries the correlation id. Blank means off.
    pub correlation_path: Option<String>,

    /// Pause between poll iterations. Zero polls back to back.
    pub poll_interval_secs: f64,

    /// Bounded wait of a single poll.
    pub poll_timeout_ms: u64,

    /// Flag that gates the consumer, if any.
    pub flag_key: Option<String>,
}

impl Default for ChannelConfig {
    fn default() -> Self {
        Self {
            topic: String::new(),
            format: SerializationFormat::Json,
            correlation_path: None,
            poll_interval_secs: 0.0,
            poll_timeout_ms: 500,
            flag_key: None,
        }
    }
}

impl ChannelConfig {
    pub fn new(topic: impl Into<String>) -> Self {
        Self {
            topic: topic.into(),
            ..Self::default()
        }
    }

    pub fn with_correlation_path(mut self, path: impl Into<String>) -> Self {
        self.correlation_path = Some(path.into());
        self
    }

    pub fn with_poll_timeout(mut self, timeout: Duration) -> Self {
        self.poll_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    pub fn with_flag_key(mut self, key: impl Into<String>) -> Self {
        self.flag_key = Some(key.into());
        self
    }

    pub fn correlation_path(&self) -> Option<&str> {
        self.correlation_path
            .as_deref()
            .filter(|path| !path.trim().is_empty())
    }

    pub fn flag_key(&self) -> Option<&str> {
        self.flag_key.as_deref().filter(|key| !key.trim().is_empty())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_secs).unwrap_or_default()
    }

    pub fn poll_timeout(&self) -> Duration {
        Duration::from_millis(self.poll_timeout_ms)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SchemaRegistryConfig {
    pub url: String,
    pub cache_capacity: u32,
}

impl Default for SchemaRegistryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            cache_capacity: 1000,
        }
    }
}

/// Connection details for the flag-evaluation client.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlagClientConfig {
    pub sdk_key: Option<String>,
    pub context_key: Option<String>,
    pub context_name: Option<String>,
    pub env: Option<String>,
}

impl FlagClientConfig {
    /// An `application` context keyed by `context_key`, tagged with `env`.
    pub fn context(&self) -> Option<EvaluationContext> {
        let key = self.context_key.as_deref()?;
        let name = self.context_name.as_deref().unwrap_or(key);
        let mut context = EvaluationContext::application(key, name);
        if let Some(env) = &self.env {
            context = context.with_attribute("env", env.as_str());
        }
        Some(context)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CourierConfig {
    pub channel: ChannelConfig,
    pub schema_registry: SchemaRegistryConfig,
    pub flags: FlagClientConfig,
    pub log_level: Option<String>,
}

/// Keys recognised by [`CourierConfig::from_options`].
pub mod options {
    pub const TOPIC: &str = "topic";
    pub const CORRELATION_ID_PATH: &str = "correlation.id.path";
    pub const POLL_INTERVAL_SECONDS: &str = "poll.interval.seconds";
    pub const POLL_TIMEOUT_MS: &str = "poll.timeout.ms";
    pub const FLAG_KEY: &str = "flag.key";
    pub const SERIALIZATION_FORMAT: &str = "serialization.format";
    pub const SCHEMA_REGISTRY_URL: &str = "schema.registry.url";
    pub const SCHEMA_REGISTRY_CACHE_CAPACITY: &str = "schema.registry.cache.capacity";
    pub const LOG_LEVEL: &str = "log.level";
    pub const FLAGS_SDK_KEY: &str = "flags.sdk.key";
    pub const FLAGS_CONTEXT_KEY: &str = "flags.context.key";
    pub const FLAGS_CONTEXT_NAME: &str = "flags.context.name";
    pub const FLAGS_ENV: &str = "flags.env";
}

fn lookup<'a>(opts: &'a HashMap<String, String>, key: &str) -> Option<&'a str> {
    opts.get(key)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

fn required(opts: &HashMap<String, String>, key: &str) -> std::result::Result<String, ConfigError> {
    lookup(opts, key)
        .map(str::to_string)
        .ok_or_else(|| ConfigError::Missing(key.to_string()))
}

fn parsed<T: FromStr>(opts: &HashMap<String, String>, key: &str, default: T) -> std::result::Result<T, ConfigError> {
    match lookup(opts, key) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::invalid(key, raw)),
        None => Ok(default),
    }
}

impl CourierConfig {
    /// Reads `path` when one is given. With no path the defaults are returned
    /// as-is; call [`CourierConfig::validate`] before using either.
    pub fn load_or_default<P: AsRef<Path>>(path: Option<P>) -> Result<Self> {
        path.map_or_else(|| Ok(Self::default()), |p| Self::from_toml_file(p.as_ref()))
    }

    /// Parses one TOML file. Errors name the file they came from.
    pub fn from_toml_file(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).with_context(|| format!("cannot read config file {}", path.display()))?;
        Self::from_toml_str(&text).with_context(|| format!("invalid config file {}", path.display()))
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        Ok(toml::from_str(text)?)
    }

    /// Builds a config from flat `key = value` options (see [`options`]),
    /// validating as it goes.
    pub fn from_options(opts: &HashMap<String, String>) -> std::result::Result<Self, ConfigError> {
        let poll_interval_secs: f64 = parsed(opts, options::POLL_INTERVAL_SECONDS, 0.0)?;
        if !poll_interval_secs.is_finite() || poll_interval_secs < 0.0 {
            return Err(ConfigError::invalid(
                options::POLL_INTERVAL_SECONDS,
                &poll_interval_secs.to_string(),
            ));
        }

        let log_level = lookup(opts, options::LOG_LEVEL).map(str::to_string);
        MinLogLevel::parse(log_level.as_deref())?;

        let owned = |key: &str| lookup(opts, key).map(str::to_string);

        let cfg = CourierConfig {
            channel: ChannelConfig {
                topic: required(opts, options::TOPIC)?,
                format: parsed(opts, options::SERIALIZATION_FORMAT, SerializationFormat::Json)?,
                correlation_path: owned(options::CORRELATION_ID_PATH),
                poll_interval_secs,
                poll_timeout_ms: parsed(opts, options::POLL_TIMEOUT_MS, 500)?,
                flag_key: owned(options::FLAG_KEY),
            },
            schema_registry: SchemaRegistryConfig {
                url: required(opts, options::SCHEMA_REGISTRY_URL)?,
                cache_capacity: parsed(opts, options::SCHEMA_REGISTRY_CACHE_CAPACITY, 1000)?,
            },
            flags: FlagClientConfig {
                sdk_key: owned(options::FLAGS_SDK_KEY),
                context_key: owned(options::FLAGS_CONTEXT_KEY),
                context_name: owned(options::FLAGS_CONTEXT_NAME),
                env: owned(options::FLAGS_ENV),
            },
            log_level,
        };
        Ok(cfg)
    }

    /// Same checks as [`CourierConfig::from_options`], for configs loaded from TOML.
    pub fn validate(&self) -> std::result::Result<(), ConfigError> {
        if self.channel.topic.trim().is_empty() {
            return Err(ConfigError::Missing(options::TOPIC.to_string()));
        }
        if self.schema_registry.url.trim().is_empty() {
            return Err(ConfigError::Missing(options::SCHEMA_REGISTRY_URL.to_string()));
        }
        let interval = self.channel.poll_interval_secs;
        if !interval.is_finite() || interval < 0.0 {
            return Err(ConfigError::invalid(
                options::POLL_INTERVAL_SECONDS,
                &interval.to_string(),
            ));
        }
        self.min_log_level()?;
        Ok(())
    }

    pub fn min_log_level(&self) -> std::result::Result<MinLogLevel, ConfigError> {
        MinLogLevel::parse(self.log_level.as_deref())
    }
}

/// Effective property maps handed to the broker client.
pub struct ClientProperties;

impl ClientProperties {
    pub const SCHEMA_REGISTRY_URL: &'static str = "schema.registry.url";
    pub const AUTO_REGISTER_SCHEMAS: &'static str = "auto.register.schemas";
    pub const ACKS: &'static str = "acks";
    pub const ENABLE_IDEMPOTENCE: &'static str = "enable.idempotence";
    pub const KEY_SERIALIZER: &'static str = "key.serializer";
    pub const VALUE_SERIALIZER: &'static str = "value.serializer";
    pub const ALLOW_AUTO_CREATE_TOPICS: &'static str = "allow.auto.create.topics";
    pub const ENABLE_AUTO_COMMIT: &'static str = "enable.auto.commit";
    pub const KEY_DESERIALIZER: &'static str = "key.deserializer";
    pub const VALUE_DESERIALIZER: &'static str = "value.deserializer";

    /// `base` plus registry URL, no schema auto-registration, full acks,
    /// idempotence and the serializers for the configured format.
    pub fn producer(config: &CourierConfig, base: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let serializer = match config.channel.format {
            SerializationFormat::Avro => "io.confluent.kafka.serializers.KafkaAvroSerializer",
            SerializationFormat::Json => "io.confluent.kafka.serializers.json.KafkaJsonSchemaSerializer",
        };

        let mut props = base.clone();
        props.insert(Self::SCHEMA_REGISTRY_URL.into(), config.schema_registry.url.clone());
        props.insert(Self::AUTO_REGISTER_SCHEMAS.into(), "false".into());
        props.insert(Self::ACKS.into(), "all".into());
        props.insert(Self::ENABLE_IDEMPOTENCE.into(), "true".into());
        props.insert(Self::KEY_SERIALIZER.into(), serializer.into());
        props.insert(Self::VALUE_SERIALIZER.into(), serializer.into());
        props
    }

    /// `base` plus registry URL, no topic auto-creation, manual commits and
    /// the deserializers for the configured format.
    pub fn consumer(config: &CourierConfig, base: &BTreeMap<String, String>) -> BTreeMap<String, String> {
        let deserializer = match config.channel.format {
            SerializationFormat::Avro => "io.confluent.kafka.serializers.KafkaAvroDeserializer",
            SerializationFormat::Json => "io.confluent.kafka.serializers.json.KafkaJsonSchemaDeserializer",
        };

        let mut props = base.clone();
        props.insert(Self::SCHEMA_REGISTRY_URL.into(), config.schema_registry.url.clone());
        props.insert(Self::ALLOW_AUTO_CREATE_TOPICS.into(), "false".into());
        props.insert(Self::ENABLE_AUTO_COMMIT.into(), "false".into());
        props.insert(Self::KEY_DESERIALIZER.into(), deserializer.into());
        props.insert(Self::VALUE_DESERIALIZER.into(), deserializer.into());
        props
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn opts(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_apply_to_absent_options() {
        let cfg = CourierConfig::from_options(&opts(&[
            ("topic", "orders"),
            ("schema.registry.url", "http://registry:8081"),
        ]))
        .unwrap();

        assert_eq!(cfg.channel.topic, "orders");
        assert_eq!(cfg.channel.format, SerializationFormat::Json);
        assert_eq!(cfg.channel.poll_timeout(), Duration::from_millis(500));
        assert_eq!(cfg.channel.poll_interval(), Duration::ZERO);
        assert_eq!(cfg.channel.correlation_path(), None);
        assert_eq!(cfg.schema_registry.cache_capacity, 1000);
        assert_eq!(cfg.min_log_level(), Ok(MinLogLevel::Warning));
    }

    #[test]
    fn missing_and_invalid_options_are_reported() {
        assert_eq!(
            CourierConfig::from_options(&opts(&[("topic", "orders")])),
            Err(ConfigError::Missing("schema.registry.url".to_string()))
        );
        assert_eq!(
            CourierConfig::from_options(&opts(&[
                ("topic", "orders"),
                ("schema.registry.url", "http://r"),
                ("schema.registry.cache.capacity", "lots"),
            ])),
            Err(ConfigError::Invalid {
                key: "schema.registry.cache.capacity".to_string(),
                value: "lots".to_string()
            })
        );
        assert!(matches!(
            CourierConfig::from_options(&opts(&[
                ("topic", "orders"),
                ("schema.registry.url", "http://r"),
                ("poll.interval.seconds", "-1"),
            ])),
            Err(ConfigError::Invalid { .. })
        ));
    }

    #[test]
    fn blank_correlation_path_means_disabled() {
        let cfg = ChannelConfig::new("t").with_correlation_path("   ");
        assert_eq!(cfg.correlation_path(), None);
    }

    #[test]
    fn consumer_properties_disable_auto_commit() {
        let mut cfg = CourierConfig::default();
        cfg.schema_registry.url = "http://r".into();
        cfg.channel.format = SerializationFormat::Avro;

        let base = BTreeMap::from([
            ("bootstrap.servers".to_string(), "localhost:9092".to_string()),
            ("enable.auto.commit".to_string(), "true".to_string()),
        ]);
        let props = ClientProperties::consumer(&cfg, &base);

        assert_eq!(props["bootstrap.servers"], "localhost:9092");
        assert_eq!(props["enable.auto.commit"], "false");
        assert_eq!(props["allow.auto.create.topics"], "false");
        assert_eq!(
            props["value.deserializer"],
            "io.confluent.kafka.serializers.KafkaAvroDeserializer"
        );
        assert!(!props.contains_key("acks"));
    }
}
