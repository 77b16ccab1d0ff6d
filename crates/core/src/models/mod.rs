//! # 数据模型
//!
//! Core data types of the task engine.
//!
//! ## Task - 任务
//! One unit of submitted work. Created `pending` on submission, mutated only
//! by the dispatcher's worker loop and frozen once it lands in history.
//!
//! ```text
//! pending → running → success
//!    │         ├────→ failed
//!    │         └────→ cancelled
//!    └──────────────→ cancelled / failed
//! ```
//!
//! ## Job - 定时任务
//! A schedule definition (cron, interval or one-shot date) that submits tasks
//! over time. A job id maps to exactly one live trigger.
//!
//! ## TaskEvent - 任务事件
//! Updates broadcast while tasks are queued, started, report progress and finish.

pub mod event;
pub mod job;
pub mod task;

pub use event::*;
pub use job::*;
pub use task::*;
