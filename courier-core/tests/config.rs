mod common;

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::time::Duration;

use common::folder_to_use;
use courier::config::options;
use courier::{ClientProperties, ConfigError, CourierConfig, MinLogLevel, SerializationFormat};

const FULL: &str = r#"
log_level = "info"

[channel]
topic = "orders"
format = "avro"
correlation_path = "meta.traceId"
poll_interval_secs = 0.25
flag_key = "orders-consumer-enabled"

[schema_registry]
url = "http://registry:8081"

[flags]
sdk_key = "sdk-123"
context_key = "orders-service"
env = "staging"
"#;

/// Test: A TOML file loads with defaults for everything it leaves out
///
/// ✅ Verifies:
/// - explicit values are read from their sections
/// - `poll_timeout_ms` and `cache_capacity` fall back to their defaults
/// - the flag context is an `application` context carrying `env`
#[test]
fn loads_toml_with_defaults() {
    let dir = folder_to_use();
    let path = dir.join("courier.toml");
    fs::write(&path, FULL).unwrap();

    let cfg = CourierConfig::load_or_default(Some(&path)).unwrap();
    cfg.validate().unwrap();

    assert_eq!(cfg.channel.topic, "orders");
    assert_eq!(cfg.channel.format, SerializationFormat::Avro);
    assert_eq!(cfg.channel.correlation_path(), Some("meta.traceId"));
    assert_eq!(cfg.channel.poll_interval(), Duration::from_millis(250));
    assert_eq!(cfg.channel.poll_timeout(), Duration::from_millis(500));
    assert_eq!(cfg.channel.flag_key(), Some("orders-consumer-enabled"));
    assert_eq!(cfg.schema_registry.cache_capacity, 1000);
    assert_eq!(cfg.min_log_level(), Ok(MinLogLevel::Information));

    let context = cfg.flags.context().unwrap();
    assert_eq!(context.kind, "application");
    assert_eq!(context.key, "orders-service");
    assert_eq!(context.attributes.get("env").map(String::as_str), Some("staging"));
}

#[test]
fn missing_file_is_an_error_and_no_file_is_default() {
    let dir = folder_to_use();
    assert!(CourierConfig::load_or_default(Some(dir.join("absent.toml"))).is_err());

    let cfg = CourierConfig::load_or_default(None::<&str>).unwrap();
    assert_eq!(cfg, CourierConfig::default());
    assert_eq!(
        cfg.validate(),
        Err(ConfigError::Missing(options::TOPIC.to_string()))
    );
}

/// Test: Load failures say which file they came from
///
/// ✅ Verifies:
/// - an unreadable path and malformed TOML both fail
/// - the error chain names the offending file
/// - a TOML string with only a topic parses with every other default
#[test]
fn load_errors_name_the_file() {
    let dir = folder_to_use();
    let absent = dir.join("absent.toml");
    let err = CourierConfig::load_or_default(Some(&absent)).unwrap_err();
    assert!(format!("{err:#}").contains("absent.toml"));

    let broken = dir.join("broken.toml");
    fs::write(&broken, "[channel\ntopic = ").unwrap();
    let err = CourierConfig::from_toml_file(&broken).unwrap_err();
    assert!(format!("{err:#}").contains("broken.toml"));

    let cfg = CourierConfig::from_toml_str("[channel]\ntopic = \"orders\"\n").unwrap();
    assert_eq!(cfg.channel, courier::ChannelConfig::new("orders"));
}

#[test]
fn invalid_log_level_fails_validation() {
    let dir = folder_to_use();
    let path = dir.join("courier.toml");
    fs::write(&path, FULL.replace("\"info\"", "\"chatty\"")).unwrap();

    let cfg = CourierConfig::load_or_default(Some(&path)).unwrap();
    assert_eq!(
        cfg.validate(),
        Err(ConfigError::Invalid {
            key: "log.level".to_string(),
            value: "chatty".to_string()
        })
    );
}

/// Test: Flat options produce the same config as the TOML sections
///
/// ✅ Verifies:
/// - every recognised key lands in its field
/// - producer and consumer property maps carry the format's serializers
#[test]
fn options_and_client_properties() {
    let opts: HashMap<String, String> = [
        (options::TOPIC, "orders"),
        (options::SERIALIZATION_FORMAT, "JSON"),
        (options::SCHEMA_REGISTRY_URL, "http://registry:8081"),
        (options::SCHEMA_REGISTRY_CACHE_CAPACITY, "50"),
        (options::POLL_TIMEOUT_MS, "1500"),
        (options::FLAG_KEY, "orders-consumer-enabled"),
        (options::FLAGS_CONTEXT_KEY, "orders-service"),
        (options::LOG_LEVEL, "warn"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    let cfg = CourierConfig::from_options(&opts).unwrap();
    assert_eq!(cfg.channel.format, SerializationFormat::Json);
    assert_eq!(cfg.channel.poll_timeout(), Duration::from_millis(1500));
    assert_eq!(cfg.schema_registry.cache_capacity, 50);
    assert_eq!(cfg.flags.context_key.as_deref(), Some("orders-service"));

    let base = BTreeMap::from([("bootstrap.servers".to_string(), "kafka:9092".to_string())]);
    let producer = ClientProperties::producer(&cfg, &base);
    assert_eq!(producer["acks"], "all");
    assert_eq!(producer["enable.idempotence"], "true");
    assert_eq!(producer["auto.register.schemas"], "false");
    assert_eq!(producer["schema.registry.url"], "http://registry:8081");
    assert_eq!(
        producer["value.serializer"],
        "io.confluent.kafka.serializers.json.KafkaJsonSchemaSerializer"
    );

    let consumer = ClientProperties::consumer(&cfg, &base);
    assert_eq!(consumer["bootstrap.servers"], "kafka:9092");
    assert_eq!(consumer["enable.auto.commit"], "false");
    assert_eq!(
        consumer["key.deserializer"],
        "io.confluent.kafka.serializers.json.KafkaJsonSchemaDeserializer"
    );
}

#[test]
fn unparsable_options_name_the_key() {
    let opts: HashMap<String, String> = [
        (options::TOPIC, "orders"),
        (options::SCHEMA_REGISTRY_URL, "http://registry:8081"),
        (options::SERIALIZATION_FORMAT, "protobuf"),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v.to_string()))
    .collect();

    assert_eq!(
        CourierConfig::from_options(&opts),
        Err(ConfigError::Invalid {
            key: options::SERIALIZATION_FORMAT.to_string(),
            value: "protobuf".to_string()
        })
    );
}
