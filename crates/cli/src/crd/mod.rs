pub mod task;
pub mod taskrun;

pub use task::{Task, TaskSpec};
pub use taskrun::{Condition, TaskRun, TaskRunRequestedState, TaskRunSpec, TaskRunStatus};
