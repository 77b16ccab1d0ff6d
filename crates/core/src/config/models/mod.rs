pub mod app_config;
pub mod dispatcher;
pub mod jobs;
pub mod observability;

pub use app_config::AppConfig;
pub use dispatcher::{DispatcherConfig, SchedulerConfig};
pub use jobs::JobConfig;
pub use observability::ObservabilityConfig;
