//! The weighted `PriorityCalculator` (`spec.md` §4.3): five normalized
//! terms combined with fixed weights, mirroring the orphaned
//! `services::priority_calculator` module's `calculate_deadline_boost`
//! ratio idiom for the urgency term, rebuilt around the current five-term
//! formula instead of its three-term additive one.

use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::errors::QueueResult;
use crate::domain::models::Task;
use crate::domain::ports::{self as ports, hours_until, Clock, DependencyResolver, PriorityCalculator, Store};

/// Weight of the author-assigned base priority.
pub const WEIGHT_BASE: f64 = 0.35;
/// Weight of dependency depth (deeper in the DAG scores slightly higher:
/// it's unblocking more downstream work per completion).
pub const WEIGHT_DEPTH: f64 = 0.15;
/// Weight of deadline urgency.
pub const WEIGHT_URGENCY: f64 = 0.25;
/// Weight of the originating source.
pub const WEIGHT_SOURCE: f64 = 0.10;
/// Weight of how many non-terminal tasks are waiting on this one.
pub const WEIGHT_BLOCKING: f64 = 0.15;

/// Depth at or beyond which the depth term saturates at `1.0`.
const DEPTH_SATURATION: f64 = 10.0;
/// Downstream-blocked-task count at or beyond which the blocking term
/// saturates at `1.0`.
const BLOCKING_SATURATION: f64 = 20.0;
/// Hours-until-deadline horizon (one week) beyond which urgency is `0.0`;
/// at or past the deadline urgency is `1.0`.
const URGENCY_HORIZON_HOURS: f64 = 168.0;

pub struct WeightedPriorityCalculator<S, R, C> {
    store: Arc<S>,
    resolver: Arc<R>,
    clock: Arc<C>,
}

impl<S, R, C> WeightedPriorityCalculator<S, R, C>
where
    S: Store,
    R: DependencyResolver,
    C: Clock,
{
    pub fn new(store: Arc<S>, resolver: Arc<R>, clock: Arc<C>) -> Self {
        Self { store, resolver, clock }
    }

    fn urgency_term(&self, task: &Task) -> f64 {
        match task.deadline {
            None => 0.0,
            Some(deadline) => {
                let hours = hours_until(self.clock.now(), deadline);
                (1.0 - hours / URGENCY_HORIZON_HOURS).clamp(0.0, 1.0)
            }
        }
    }
}

#[async_trait]
impl<S, R, C> PriorityCalculator for WeightedPriorityCalculator<S, R, C>
where
    S: Store,
    R: DependencyResolver,
    C: Clock,
{
    async fn calculate_priority(&self, task: &Task) -> QueueResult<f64> {
        let depth = self.resolver.calculate_dependency_depth(task.id).await?;
        let blocking = self.store.count_blocked_downstream(task.id).await?;

        let base_norm = f64::from(task.priority) / 10.0;
        let depth_norm = (f64::from(depth) / DEPTH_SATURATION).min(1.0);
        let urgency = self.urgency_term(task);
        let source_norm = task.source.priority_weight();
        let blocking_norm = (blocking as f64 / BLOCKING_SATURATION).min(1.0);

        let score = WEIGHT_BASE * base_norm
            + WEIGHT_DEPTH * depth_norm
            + WEIGHT_URGENCY * urgency
            + WEIGHT_SOURCE * source_norm
            + WEIGHT_BLOCKING * blocking_norm;

        let scaled = (score * 100.0 * 100.0).round() / 100.0;
        Ok(scaled)
    }

    async fn recalculate_priorities(&self, tasks: &[Task]) -> QueueResult<Vec<(Uuid, f64)>> {
        let mut results = Vec::with_capacity(tasks.len());
        for task in tasks {
            let score = self.calculate_priority(task).await?;
            results.push((task.id, score));
        }
        Ok(results)
    }
}
