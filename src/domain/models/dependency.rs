//! `TaskDependency`: an edge in the prerequisite DAG, disjoint from the
//! `parent_task_id` hierarchy tree.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::task::DependencyType;

/// An ordered pair `(dependent_task, prerequisite_task)`. `dependent_task`
/// cannot transition to `Ready` until `prerequisite_task` is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskDependency {
    pub dependent_task_id: Uuid,
    pub prerequisite_task_id: Uuid,
    pub dependency_type: DependencyType,
}

impl TaskDependency {
    pub fn sequential(dependent_task_id: Uuid, prerequisite_task_id: Uuid) -> Self {
        Self {
            dependent_task_id,
            prerequisite_task_id,
            dependency_type: DependencyType::Sequential,
        }
    }

    pub fn parallel(dependent_task_id: Uuid, prerequisite_task_id: Uuid) -> Self {
        Self {
            dependent_task_id,
            prerequisite_task_id,
            dependency_type: DependencyType::Parallel,
        }
    }
}
