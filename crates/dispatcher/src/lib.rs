//! taskdeck 调度与执行
//!
//! The dispatcher (queue, worker loop, history), the trigger scheduler for
//! cron/interval/date jobs, and the [`TaskEngine`] control surface that
//! composes them.

pub mod cron_utils;
pub mod dispatcher;
pub mod engine;
pub mod history;
pub mod metrics;
pub mod scheduler;
pub mod trigger;

pub use cron_utils::CronScheduler;
pub use dispatcher::{DispatcherStats, TaskDispatcher};
pub use engine::{EngineStats, TaskEngine};
pub use history::TaskHistory;
pub use metrics::DispatchMetrics;
pub use scheduler::JobScheduler;
pub use trigger::TriggerSchedule;
