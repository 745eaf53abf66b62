use super::ConfigError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::str::FromStr;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    pub database: DatabaseConfig,
    pub eventbrite: EventbriteConfig,
    pub collection: CollectionConfig,
    pub retention: RetentionConfig,
    pub schedule: ScheduleConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub max_connections: Option<u32>,
    pub min_connections: Option<u32>,
}

impl DatabaseConfig {
    pub fn db_type(&self) -> DbType {
        let url = self.connection_string();
        if url.starts_with("sqlite://") || url.ends_with(".db") || url.ends_with(".sqlite") {
            DbType::Sqlite
        } else {
            DbType::Postgres
        }
    }

    pub fn connection_string(&self) -> String {
        self.url.clone().unwrap_or_default()
    }

    pub fn sqlite_path(&self) -> Option<String> {
        if let DbType::Sqlite = self.db_type() {
            let url = self.connection_string();
            let path = url.strip_prefix("sqlite://").unwrap_or(&url);
            (!path.is_empty()).then(|| path.to_string())
        } else {
            None
        }
    }

    pub fn max_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.max_connections,
            DbType::Sqlite => Some(1),
        }
    }

    pub fn min_connections(&self) -> Option<u32> {
        match self.db_type() {
            DbType::Postgres => self.min_connections,
            DbType::Sqlite => Some(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbType {
    Postgres,
    Sqlite,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct EventbriteConfig {
    pub app_key: Option<String>,
    pub api_url: String,
    pub event_pages: u32,
    pub request_timeout_secs: u64,
    pub extra_params: BTreeMap<String, String>,
}

impl Default for EventbriteConfig {
    fn default() -> Self {
        Self {
            app_key: None,
            api_url: "https://www.eventbriteapi.com/v3/".to_string(),
            event_pages: 40,
            request_timeout_secs: 30,
            extra_params: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct CollectionConfig {
    pub interval_secs: u64,
    pub latitude: f64,
    pub longitude: f64,
    pub radius: String,
    pub failure_policy: FailurePolicy,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        // Vancouver
        Self {
            interval_secs: 3600,
            latitude: 49.241,
            longitude: -123.1073,
            radius: "10km".to_string(),
            failure_policy: FailurePolicy::FailFast,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    #[default]
    FailFast,
    Skip,
}

impl FromStr for FailurePolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "fail_fast" | "fail-fast" => Ok(Self::FailFast),
            "skip" => Ok(Self::Skip),
            other => Err(format!("unknown failure policy {other:?}")),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RetentionConfig {
    pub stale_event_days: u32,
}

impl Default for RetentionConfig {
    fn default() -> Self {
        Self {
            stale_event_days: 5,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub sweep_cron: String,
    pub categories_cron: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            sweep_cron: "0 0 4 * * *".to_string(),
            categories_cron: "0 15 4 * * *".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LoggingConfig {
    pub level: String,
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}

impl Config {
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) => Self::load_from_file(path),
            None => {
                let config_path =
                    std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config.yaml".to_string());
                if Path::new(&config_path).exists() {
                    Self::load_from_file(&config_path)
                } else {
                    let mut config = Config::default();
                    config.apply_env_overrides()?;
                    config.validate()?;
                    Ok(config)
                }
            }
        }
    }

    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = serde_yaml::from_str(&content)?;
        config.apply_env_overrides()?;
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides_from(|name| std::env::var(name).ok())
    }

    pub(crate) fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(value) = lookup("DATABASE_URL") {
            self.database.url = Some(value);
        }
        if let Some(value) = lookup("EVENTBRITE_APP_KEY") {
            self.eventbrite.app_key = Some(value);
        }
        if let Some(value) = lookup("EVENTBRITE_API_URL") {
            self.eventbrite.api_url = value;
        }
        if let Some(value) = lookup("EVENTBRITE_EVENT_PAGES") {
            self.eventbrite.event_pages = parse_env("EVENTBRITE_EVENT_PAGES", value)?;
        }
        if let Some(value) = lookup("COLLECTION_INTERVAL") {
            self.collection.interval_secs = parse_env("COLLECTION_INTERVAL", value)?;
        }
        if let Some(value) = lookup("STALE_EVENT_DAYS") {
            self.retention.stale_event_days = parse_env("STALE_EVENT_DAYS", value)?;
        }
        if let Some(value) = lookup("INGEST_FAILURE_POLICY") {
            self.collection.failure_policy = parse_env("INGEST_FAILURE_POLICY", value)?;
        }
        Ok(())
    }
}

fn parse_env<T: FromStr>(name: &'static str, value: String) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidEnv { name, value })
}
