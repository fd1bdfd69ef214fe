//! Process configuration from environment variables.
//!
//! Every option has a `GDNOTIFY_`-prefixed variable; durations use the
//! compound form `168h`, `1h30m`, `45s`. Invalid configuration is fatal at
//! startup.

use std::path::PathBuf;

use thiserror::Error;

/// Errors from configuration loading.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown storage type: {0} (expected \"dynamodb\" or \"file\")")]
    UnknownStorageType(String),

    #[error("unknown notification type: {0} (expected \"eventbridge\" or \"file\")")]
    UnknownNotificationType(String),

    #[error("invalid duration for {name}: {value}")]
    InvalidDuration { name: &'static str, value: String },

    #[error("invalid port: {0}")]
    InvalidPort(String),

    #[error("expiration must be positive")]
    NonPositiveExpiration,

    #[error("{0} is required")]
    Required(&'static str),
}

/// Channel store backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageType {
    DynamoDb,
    File,
}

/// Emitter backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationType {
    EventBridge,
    File,
}

/// Full process configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub storage_type: StorageType,
    pub table_name: String,
    pub auto_create: bool,
    pub data_file: PathBuf,
    pub lock_file: PathBuf,

    pub notification_type: NotificationType,
    pub event_bus: String,
    pub event_file: PathBuf,

    /// Explicit public webhook URL; empty means auto-detect from the first
    /// inbound request.
    pub webhook: String,
    /// Requested channel lifetime.
    pub expiration: chrono::Duration,
    /// Stale-change filter window; unset disables the filter.
    pub within_modified_time: Option<chrono::Duration>,
    /// Path to the copy-rule document; unset disables the copier.
    pub s3_copy_config: Option<PathBuf>,

    pub port: u16,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            storage_type: StorageType::DynamoDb,
            table_name: "gdnotify".to_string(),
            auto_create: false,
            data_file: PathBuf::from("gdnotify.dat"),
            lock_file: PathBuf::from("gdnotify.lock"),
            notification_type: NotificationType::EventBridge,
            event_bus: "default".to_string(),
            event_file: PathBuf::from("gdnotify.json"),
            webhook: String::new(),
            expiration: chrono::Duration::hours(168),
            within_modified_time: None,
            s3_copy_config: None,
            port: 25254,
        }
    }
}

impl Config {
    /// Loads configuration from the environment, falling back to defaults,
    /// then validates it.
    pub fn from_env() -> Result<Self, ConfigError> {
        let mut config = Config::default();

        if let Ok(value) = std::env::var("GDNOTIFY_STORAGE_TYPE") {
            config.storage_type = match value.as_str() {
                "dynamodb" => StorageType::DynamoDb,
                "file" => StorageType::File,
                other => return Err(ConfigError::UnknownStorageType(other.to_string())),
            };
        }
        if let Ok(value) = std::env::var("GDNOTIFY_DDB_TABLE_NAME") {
            config.table_name = value;
        }
        if let Ok(value) = std::env::var("GDNOTIFY_DDB_AUTO_CREATE") {
            config.auto_create = matches!(value.as_str(), "true" | "1");
        }
        if let Ok(value) = std::env::var("GDNOTIFY_FILE_STORAGE_DATA_FILE") {
            config.data_file = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("GDNOTIFY_FILE_STORAGE_LOCK_FILE") {
            config.lock_file = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("GDNOTIFY_NOTIFICATION_TYPE") {
            config.notification_type = match value.as_str() {
                "eventbridge" => NotificationType::EventBridge,
                "file" => NotificationType::File,
                other => return Err(ConfigError::UnknownNotificationType(other.to_string())),
            };
        }
        if let Ok(value) = std::env::var("GDNOTIFY_EVENTBRIDGE_EVENT_BUS") {
            config.event_bus = value;
        }
        if let Ok(value) = std::env::var("GDNOTIFY_EVENT_FILE") {
            config.event_file = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("GDNOTIFY_WEBHOOK") {
            config.webhook = value;
        }
        if let Ok(value) = std::env::var("GDNOTIFY_EXPIRATION") {
            config.expiration = parse_duration(&value).ok_or(ConfigError::InvalidDuration {
                name: "GDNOTIFY_EXPIRATION",
                value: value.clone(),
            })?;
        }
        if let Ok(value) = std::env::var("GDNOTIFY_WITHIN_MODIFIED_TIME") {
            if !value.is_empty() {
                config.within_modified_time =
                    Some(parse_duration(&value).ok_or(ConfigError::InvalidDuration {
                        name: "GDNOTIFY_WITHIN_MODIFIED_TIME",
                        value: value.clone(),
                    })?);
            }
        }
        if let Ok(value) = std::env::var("GDNOTIFY_S3_COPY_CONFIG") {
            if !value.is_empty() {
                config.s3_copy_config = Some(PathBuf::from(value));
            }
        }
        if let Ok(value) = std::env::var("GDNOTIFY_PORT") {
            config.port = value
                .parse()
                .map_err(|_| ConfigError::InvalidPort(value.clone()))?;
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.expiration <= chrono::Duration::zero() {
            return Err(ConfigError::NonPositiveExpiration);
        }
        match self.storage_type {
            StorageType::DynamoDb if self.table_name.is_empty() => {
                return Err(ConfigError::Required("storage table name"));
            }
            StorageType::File if self.data_file.as_os_str().is_empty() => {
                return Err(ConfigError::Required("storage data file"));
            }
            _ => {}
        }
        match self.notification_type {
            NotificationType::EventBridge if self.event_bus.is_empty() => {
                return Err(ConfigError::Required("event bus name"));
            }
            NotificationType::File if self.event_file.as_os_str().is_empty() => {
                return Err(ConfigError::Required("event file path"));
            }
            _ => {}
        }
        Ok(())
    }
}

/// Parses compound durations: `168h`, `1h30m`, `45s`, `200ms`. Returns
/// `None` on empty or malformed input.
pub fn parse_duration(input: &str) -> Option<chrono::Duration> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    let mut total = chrono::Duration::zero();
    let mut digits = String::new();
    let mut chars = input.chars().peekable();
    let mut matched_any = false;

    while let Some(c) = chars.next() {
        if c.is_ascii_digit() {
            digits.push(c);
            continue;
        }
        if digits.is_empty() {
            return None;
        }
        let n: i64 = digits.parse().ok()?;
        digits.clear();
        let unit = match c {
            'h' => chrono::Duration::hours(n),
            's' => chrono::Duration::seconds(n),
            'm' => {
                if chars.peek() == Some(&'s') {
                    chars.next();
                    chrono::Duration::milliseconds(n)
                } else {
                    chrono::Duration::minutes(n)
                }
            }
            _ => return None,
        };
        total = total + unit;
        matched_any = true;
    }
    if !digits.is_empty() || !matched_any {
        return None;
    }
    Some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.storage_type, StorageType::DynamoDb);
        assert_eq!(config.table_name, "gdnotify");
        assert_eq!(config.event_bus, "default");
        assert_eq!(config.expiration, chrono::Duration::hours(168));
        assert_eq!(config.port, 25254);
    }

    #[test]
    fn parse_simple_durations() {
        assert_eq!(parse_duration("168h"), Some(chrono::Duration::hours(168)));
        assert_eq!(parse_duration("90m"), Some(chrono::Duration::minutes(90)));
        assert_eq!(parse_duration("45s"), Some(chrono::Duration::seconds(45)));
        assert_eq!(
            parse_duration("200ms"),
            Some(chrono::Duration::milliseconds(200))
        );
    }

    #[test]
    fn parse_compound_durations() {
        assert_eq!(
            parse_duration("1h30m"),
            Some(chrono::Duration::minutes(90))
        );
        assert_eq!(
            parse_duration("1m30s"),
            Some(chrono::Duration::seconds(90))
        );
    }

    #[test]
    fn parse_rejects_malformed() {
        assert_eq!(parse_duration(""), None);
        assert_eq!(parse_duration("h"), None);
        assert_eq!(parse_duration("10"), None);
        assert_eq!(parse_duration("10x"), None);
        assert_eq!(parse_duration("10h5"), None);
    }

    #[test]
    fn zero_expiration_is_rejected() {
        let config = Config {
            expiration: chrono::Duration::zero(),
            ..Default::default()
        };
        assert_eq!(config.validate(), Err(ConfigError::NonPositiveExpiration));
    }

    #[test]
    fn missing_event_bus_is_rejected() {
        let config = Config {
            event_bus: String::new(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Required("event bus name"))
        );
    }

    #[test]
    fn missing_table_name_is_rejected() {
        let config = Config {
            table_name: String::new(),
            ..Default::default()
        };
        assert_eq!(
            config.validate(),
            Err(ConfigError::Required("storage table name"))
        );
    }
}
