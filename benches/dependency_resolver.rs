//! Cycle detection and execution-plan batching cost as the prerequisite
//! DAG grows, with and without a warm cache (`spec.md` §4.2 TTL cache).

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

use abathur_queue::adapters::sqlite::{create_migrated_test_pool, SqliteStore};
use abathur_queue::domain::ports::{DependencyResolver, SystemClock};
use abathur_queue::services::dependency_resolver::InMemoryDependencyResolver;
use abathur_queue::services::priority_calculator::WeightedPriorityCalculator;
use abathur_queue::services::task_queue::{EnqueueRequest, TaskQueue};

type Resolver = InMemoryDependencyResolver<SqliteStore, SystemClock>;
type Calculator = WeightedPriorityCalculator<SqliteStore, Resolver, SystemClock>;

/// A straight chain of `len` tasks, each depending on the previous one.
async fn chain(len: usize) -> (Arc<SqliteStore>, Arc<Resolver>, Vec<Uuid>) {
    let pool = create_migrated_test_pool().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));
    let clock = Arc::new(SystemClock);
    let resolver = Arc::new(InMemoryDependencyResolver::new(store.clone(), clock.clone()));
    let calculator = Arc::new(WeightedPriorityCalculator::new(store.clone(), resolver.clone(), clock));
    let queue = TaskQueue::new(store.clone(), resolver.clone(), calculator);

    let mut ids = Vec::with_capacity(len);
    let mut prior: Option<Uuid> = None;
    for i in 0..len {
        let mut req = EnqueueRequest {
            prompt: format!("task-{i}"),
            agent_type: "implementation".to_string(),
            created_by: "bench".to_string(),
            priority: 5,
            ..Default::default()
        };
        if let Some(p) = prior {
            req.prerequisites = vec![p];
        }
        let id = queue.enqueue(req).await.unwrap();
        ids.push(id);
        prior = Some(id);
    }
    (store, resolver, ids)
}

fn bench_calculate_dependency_depth(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("calculate_dependency_depth");

    for len in [10usize, 50, 200] {
        let (_store, resolver, ids) = rt.block_on(chain(len));
        let leaf = *ids.last().unwrap();

        group.bench_with_input(BenchmarkId::new("cold_cache", len), &leaf, |b, &leaf| {
            b.to_async(&rt).iter_batched(
                || rt.block_on(resolver.invalidate_cache()),
                |()| async { black_box(resolver.calculate_dependency_depth(leaf).await.unwrap()) },
                criterion::BatchSize::SmallInput,
            );
        });

        group.bench_with_input(BenchmarkId::new("warm_cache", len), &leaf, |b, &leaf| {
            b.to_async(&rt)
                .iter(|| async { black_box(resolver.calculate_dependency_depth(leaf).await.unwrap()) });
        });
    }
    group.finish();
}

fn bench_get_execution_plan(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("get_execution_plan");

    for len in [10usize, 50, 200] {
        let (_store, resolver, ids) = rt.block_on(chain(len));

        group.bench_with_input(BenchmarkId::from_parameter(len), &ids, |b, ids| {
            b.to_async(&rt)
                .iter(|| async { black_box(resolver.get_execution_plan(ids).await.unwrap()) });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_calculate_dependency_depth, bench_get_execution_plan);
criterion_main!(benches);
