use thiserror::Error;

pub const DEFAULT_TOPIC: &str = "default-topic";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KernelConfig {
    pub topic_name: String,
    pub partition_id: u32,
    /// Number of compiled deployments kept in memory.
    pub workflow_cache_size: usize,
    /// Upper bound for payloads produced by input and output mappings.
    pub max_payload_size: usize,
    /// Take a snapshot after this many processed events; `None` disables it.
    pub snapshot_interval: Option<u64>,
    pub recover_from_snapshot: bool,
}

impl Default for KernelConfig {
    fn default() -> Self {
        Self {
            topic_name: DEFAULT_TOPIC.into(),
            partition_id: 0,
            workflow_cache_size: 32,
            max_payload_size: 64 * 1024,
            snapshot_interval: None,
            recover_from_snapshot: true,
        }
    }
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value '{value}' for {key}: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

impl KernelConfig {
    /// Defaults overridden by `BROOK_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(topic) = lookup("BROOK_TOPIC") {
            if topic.trim().is_empty() {
                return Err(ConfigError::InvalidValue {
                    key: "BROOK_TOPIC",
                    value: topic,
                    reason: "must not be empty".into(),
                });
            }
            config.topic_name = topic;
        }
        if let Some(value) = lookup("BROOK_PARTITION") {
            config.partition_id = parse("BROOK_PARTITION", value)?;
        }
        if let Some(value) = lookup("BROOK_WORKFLOW_CACHE_SIZE") {
            config.workflow_cache_size = parse("BROOK_WORKFLOW_CACHE_SIZE", value)?;
        }
        if let Some(value) = lookup("BROOK_MAX_PAYLOAD_SIZE") {
            config.max_payload_size = parse("BROOK_MAX_PAYLOAD_SIZE", value)?;
        }
        if let Some(value) = lookup("BROOK_SNAPSHOT_INTERVAL") {
            let interval: u64 = parse("BROOK_SNAPSHOT_INTERVAL", value)?;
            config.snapshot_interval = (interval > 0).then_some(interval);
        }
        Ok(config)
    }
}

fn parse<T>(key: &'static str, value: String) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value.trim().parse::<T>() {
        Ok(parsed) => Ok(parsed),
        Err(err) => Err(ConfigError::InvalidValue {
            key,
            reason: err.to_string(),
            value,
        }),
    }
}
