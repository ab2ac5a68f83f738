//! Property tests over arbitrary prerequisite DAGs (`spec.md` §8
//! "testable properties": acyclicity is preserved, depth is `1 +
//! max(prereq depths)`). Grounded on the teacher's
//! `tests/property_dependency_resolver.rs` shape — `proptest!` generating
//! a random chain-with-skips graph — adapted to this crate's async
//! `DependencyResolver` via a `tokio::runtime::Runtime` driven inline,
//! since `proptest!` bodies are synchronous.

use std::collections::HashMap;
use std::sync::Arc;

use proptest::prelude::*;
use uuid::Uuid;

use abathur_queue::adapters::sqlite::{create_migrated_test_pool, SqliteStore};
use abathur_queue::domain::ports::{DependencyResolver, SystemClock};
use abathur_queue::services::dependency_resolver::InMemoryDependencyResolver;
use abathur_queue::services::task_queue::{EnqueueRequest, TaskQueue};
use abathur_queue::services::priority_calculator::WeightedPriorityCalculator;

type Resolver = InMemoryDependencyResolver<SqliteStore, SystemClock>;
type Calculator = WeightedPriorityCalculator<SqliteStore, Resolver, SystemClock>;

/// Builds a chain-with-skips DAG of `size` tasks: task `i` (for `i > 0`
/// and `i` even) depends on task `i - 1`; all other tasks are roots.
/// Returns the ids in enqueue order and the expected depth of each.
async fn build_chain(resolver_ttl_secs: u64, size: usize) -> (Arc<SqliteStore>, Arc<Resolver>, Vec<Uuid>, HashMap<Uuid, u32>) {
    let pool = create_migrated_test_pool().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));
    let clock = Arc::new(SystemClock);
    let resolver = Arc::new(InMemoryDependencyResolver::with_ttl(
        store.clone(),
        clock.clone(),
        std::time::Duration::from_secs(resolver_ttl_secs.max(1)),
    ));
    let calculator = Arc::new(WeightedPriorityCalculator::new(store.clone(), resolver.clone(), clock));
    let queue = TaskQueue::new(store.clone(), resolver.clone(), calculator);

    let mut ids = Vec::with_capacity(size);
    let mut expected_depth = HashMap::new();

    for i in 0..size {
        let prerequisites = if i > 0 && i % 2 == 0 { vec![ids[i - 1]] } else { vec![] };
        let depth = prerequisites
            .iter()
            .map(|p| expected_depth.get(p).copied().unwrap_or(0) + 1)
            .max()
            .unwrap_or(0);

        let id = queue
            .enqueue(EnqueueRequest {
                prompt: format!("task-{i}"),
                agent_type: "implementation".to_string(),
                created_by: "property-test".to_string(),
                priority: 5,
                prerequisites,
                ..Default::default()
            })
            .await
            .unwrap();

        ids.push(id);
        expected_depth.insert(id, depth);
    }

    (store, resolver, ids, expected_depth)
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Depth is `1 + max(prereq depths)`, and a second (cache-hit) call
    /// returns the identical value as the first (cold) call.
    #[test]
    fn depth_matches_formula_and_is_memoized(size in 1usize..30) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (_store, resolver, ids, expected_depth) = build_chain(60, size).await;

            for id in &ids {
                let cold = resolver.calculate_dependency_depth(*id).await.unwrap();
                let warm = resolver.calculate_dependency_depth(*id).await.unwrap();
                prop_assert_eq!(cold, warm);
                prop_assert_eq!(cold, expected_depth[id]);
            }
            Ok(())
        })?;
    }

    /// For any acyclic graph the resolver builds, proposing the reverse
    /// edge (root depending on its own descendant) is always rejected as
    /// a cycle, and the graph itself is never self-reported as cyclic.
    #[test]
    fn reverse_edge_is_always_detected_as_a_cycle(size in 2usize..30) {
        let rt = tokio::runtime::Runtime::new().unwrap();
        rt.block_on(async {
            let (_store, resolver, ids, _depth) = build_chain(60, size).await;

            // Find one real edge (i % 2 == 0 depends on i - 1) to reverse.
            if let Some(dependent_index) = (1..size).find(|i| i % 2 == 0) {
                let dependent = ids[dependent_index];
                let prerequisite = ids[dependent_index - 1];

                // The graph as built is acyclic: no prerequisite depends on
                // something that (transitively) depends on it.
                let no_cycle = resolver
                    .detect_circular_dependencies(dependent, &[prerequisite])
                    .await
                    .unwrap();
                prop_assert!(!no_cycle, "freshly built chain must not self-report as cyclic");

                // Reversing the edge (prerequisite depending on dependent,
                // which is reachable back to prerequisite) must close a cycle.
                let closes_cycle = resolver
                    .detect_circular_dependencies(prerequisite, &[dependent])
                    .await
                    .unwrap();
                prop_assert!(closes_cycle, "reversing a real edge must be detected as a cycle");
            }
            Ok(())
        })?;
    }
}
