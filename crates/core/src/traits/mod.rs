pub mod submitter;
pub mod task_handler;

pub use submitter::*;
pub use task_handler::*;
