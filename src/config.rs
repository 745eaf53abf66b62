pub use self::parser::{
    CollectionConfig, Config, DatabaseConfig, DbType, EventbriteConfig, FailurePolicy,
    LoggingConfig,
};
pub use self::validator::ConfigError;

mod parser;
mod validator;
