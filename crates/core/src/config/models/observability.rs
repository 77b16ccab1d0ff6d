use std::net::SocketAddr;

use serde::{Deserialize, Serialize};

use crate::config::{ConfigError, ConfigResult, ConfigValidator};

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];
const LOG_FORMATS: [&str; 2] = ["pretty", "json"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
    pub metrics_enabled: bool,
    pub metrics_bind_address: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_format: "pretty".to_string(),
            metrics_enabled: false,
            metrics_bind_address: "127.0.0.1:9464".to_string(),
        }
    }
}

impl ConfigValidator for ObservabilityConfig {
    fn validate(&self) -> ConfigResult<()> {
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(ConfigError::validation(format!(
                "invalid log level: {}, supported: {:?}",
                self.log_level, LOG_LEVELS
            )));
        }

        if !LOG_FORMATS.contains(&self.log_format.as_str()) {
            return Err(ConfigError::validation(format!(
                "invalid log format: {}, supported: {:?}",
                self.log_format, LOG_FORMATS
            )));
        }

        if self.metrics_enabled && self.metrics_bind_address.parse::<SocketAddr>().is_err() {
            return Err(ConfigError::validation(format!(
                "invalid metrics bind address: {}",
                self.metrics_bind_address
            )));
        }

        Ok(())
    }
}
