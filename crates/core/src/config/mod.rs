//! 配置管理
//!
//! Layered configuration for the task engine: a TOML file (explicit path or
//! one of the default search paths) overridden by `TASKDECK_*` environment
//! variables. Every section validates itself through [`ConfigValidator`].
//!
//! ```toml
//! [dispatcher]
//! history_capacity = 100
//! poll_interval_ms = 1000
//!
//! [observability]
//! log_level = "info"
//! log_format = "pretty"
//!
//! [[jobs]]
//! id = "nightly_sync"
//! task_type = "library_sync"
//! cron = "0 3 * * *"
//! ```

pub mod models;

pub use models::*;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {0}")]
    NotFound(String),

    #[error("failed to load configuration: {0}")]
    Load(#[from] config::ConfigError),

    #[error("failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize TOML: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("invalid configuration: {0}")]
    Validation(String),
}

impl ConfigError {
    pub fn validation<S: Into<String>>(msg: S) -> Self {
        Self::Validation(msg.into())
    }
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// 配置验证接口
pub trait ConfigValidator {
    fn validate(&self) -> ConfigResult<()>;
}
