use thiserror::Error;
use tokio_cron_scheduler::Job;

use super::parser::{Config, DbType};

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Yaml(#[from] serde_yaml::Error),
    #[error("invalid value for {name}: {value:?}")]
    InvalidEnv { name: &'static str, value: String },
    #[error("invalid config: {0}")]
    InvalidConfig(String),
}

impl Config {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.database.connection_string().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "database url cannot be empty".to_string(),
            ));
        }

        if self.database.db_type() == DbType::Sqlite && self.database.sqlite_path().is_none() {
            return Err(ConfigError::InvalidConfig(
                "sqlite database url has no file path".to_string(),
            ));
        }

        if self.eventbrite.event_pages == 0 {
            return Err(ConfigError::InvalidConfig(
                "eventbrite.event_pages must be at least 1".to_string(),
            ));
        }

        if self.collection.interval_secs == 0 {
            return Err(ConfigError::InvalidConfig(
                "collection.interval_secs must be at least 1".to_string(),
            ));
        }

        if !(-90.0..=90.0).contains(&self.collection.latitude) {
            return Err(ConfigError::InvalidConfig(format!(
                "collection.latitude {} is outside [-90, 90]",
                self.collection.latitude
            )));
        }

        if !(-180.0..=180.0).contains(&self.collection.longitude) {
            return Err(ConfigError::InvalidConfig(format!(
                "collection.longitude {} is outside [-180, 180]",
                self.collection.longitude
            )));
        }

        if self.collection.radius.trim().is_empty() {
            return Err(ConfigError::InvalidConfig(
                "collection.radius cannot be empty".to_string(),
            ));
        }

        check_cron("schedule.sweep_cron", &self.schedule.sweep_cron)?;
        check_cron("schedule.categories_cron", &self.schedule.categories_cron)?;

        Ok(())
    }
}

// Parsed by the same code path the scheduler uses when registering the job.
fn check_cron(field: &str, expression: &str) -> Result<(), ConfigError> {
    Job::new_async(expression, |_uuid, _l| Box::pin(async {}))
        .map(|_| ())
        .map_err(|e| {
            ConfigError::InvalidConfig(format!(
                "{field} {expression:?} is not a valid cron expression: {e}"
            ))
        })
}
