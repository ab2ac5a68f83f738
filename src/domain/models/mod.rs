//! Domain models: plain data types with no I/O, shared by services and
//! adapters.

mod checkpoint;
mod dependency;
mod task;

pub use checkpoint::Checkpoint;
pub use dependency::TaskDependency;
pub use task::{
    BlockedTask, DependencyType, FeatureBranchSummary, PruneResult, QueueStatus, Task, TaskSource,
    TaskStatus, MAX_SUMMARY_LEN,
};
