use std::str::FromStr;

use tracing::Level;

use crate::config::ConfigError;

/// Environment variable consulted by [`MinLogLevel::from_env`].
pub const LOG_LEVEL_ENV: &str = "COURIER_LOG_LEVEL";

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum MinLogLevel {
    Trace,
    Debug,
    Information,
    Warning,
    Error,
    Critical,
}

impl MinLogLevel {
    /// Absent means `Warning`; anything unrecognised is an error.
    pub fn parse(value: Option<&str>) -> Result<Self, ConfigError> {
        match value {
            None => Ok(MinLogLevel::Warning),
            Some(raw) => raw.parse(),
        }
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::parse(std::env::var(LOG_LEVEL_ENV).ok().as_deref())
    }

    /// `Critical` has no tracing counterpart and maps to `ERROR`.
    pub fn as_level(self) -> Level {
        match self {
            MinLogLevel::Trace => Level::TRACE,
            MinLogLevel::Debug => Level::DEBUG,
            MinLogLevel::Information => Level::INFO,
            MinLogLevel::Warning => Level::WARN,
            MinLogLevel::Error | MinLogLevel::Critical => Level::ERROR,
        }
    }
}

impl FromStr for MinLogLevel {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "trace" => Ok(MinLogLevel::Trace),
            "debug" => Ok(MinLogLevel::Debug),
            "information" | "info" => Ok(MinLogLevel::Information),
            "warning" | "warn" => Ok(MinLogLevel::Warning),
            "error" => Ok(MinLogLevel::Error),
            "critical" | "fatal" => Ok(MinLogLevel::Critical),
            _ => Err(ConfigError::Invalid {
                key: "log.level".to_string(),
                value: s.to_string(),
            }),
        }
    }
}

/// Installs the global fmt subscriber. Call once, from the binary.
pub fn init(level: MinLogLevel) {
    tracing_subscriber::fmt()
        .with_max_level(level.as_level())
        .with_target(false)
        .with_thread_ids(true)
        .compact()
        .init();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aliases_and_default() {
        assert_eq!(MinLogLevel::parse(None), Ok(MinLogLevel::Warning));
        assert_eq!("INFO".parse::<MinLogLevel>(), Ok(MinLogLevel::Information));
        assert_eq!("warn".parse::<MinLogLevel>(), Ok(MinLogLevel::Warning));
        assert_eq!("fatal".parse::<MinLogLevel>(), Ok(MinLogLevel::Critical));
        assert_eq!(MinLogLevel::Critical.as_level(), Level::ERROR);
    }

    #[test]
    fn unknown_levels_are_rejected() {
        assert_eq!(
            MinLogLevel::parse(Some("verbose")),
            Err(ConfigError::Invalid {
                key: "log.level".to_string(),
                value: "verbose".to_string()
            })
        );
    }
}
