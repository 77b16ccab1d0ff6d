//! taskdeck 核心库
//!
//! Shared building blocks of the task engine: task and job models, the
//! handler contract, the handler registry, configuration and errors.

pub mod config;
pub mod errors;
pub mod handler_registry;
pub mod models;
pub mod traits;

pub use config::{AppConfig, ConfigError, ConfigResult, ConfigValidator};
pub use errors::*;
pub use handler_registry::HandlerRegistry;
pub use models::*;
pub use traits::*;
