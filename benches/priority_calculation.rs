//! Single-task vs batched priority recomputation cost (`spec.md` §4.3),
//! the path `TaskQueue::complete_task`'s dependent cascade runs hot.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use abathur_queue::adapters::sqlite::{create_migrated_test_pool, SqliteStore};
use abathur_queue::domain::ports::{PriorityCalculator, Store, SystemClock, TaskFilter};
use abathur_queue::services::dependency_resolver::InMemoryDependencyResolver;
use abathur_queue::services::priority_calculator::WeightedPriorityCalculator;
use abathur_queue::services::task_queue::{EnqueueRequest, TaskQueue};

type Resolver = InMemoryDependencyResolver<SqliteStore, SystemClock>;
type Calculator = WeightedPriorityCalculator<SqliteStore, Resolver, SystemClock>;

async fn seeded(count: usize) -> (Arc<SqliteStore>, Arc<Calculator>) {
    let pool = create_migrated_test_pool().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));
    let clock = Arc::new(SystemClock);
    let resolver = Arc::new(InMemoryDependencyResolver::new(store.clone(), clock.clone()));
    let calculator = Arc::new(WeightedPriorityCalculator::new(store.clone(), resolver.clone(), clock));
    let queue = TaskQueue::new(store.clone(), resolver, calculator.clone());

    for i in 0..count {
        queue
            .enqueue(EnqueueRequest {
                prompt: format!("task-{i}"),
                agent_type: "implementation".to_string(),
                created_by: "bench".to_string(),
                priority: (i % 10) as u8,
                ..Default::default()
            })
            .await
            .unwrap();
    }
    (store, calculator)
}

fn bench_calculate_priority(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let (store, calculator) = rt.block_on(seeded(1));
    let task = rt
        .block_on(store.list_tasks(&TaskFilter::default(), 1))
        .unwrap()
        .remove(0);

    c.bench_function("calculate_priority_single", |b| {
        b.to_async(&rt)
            .iter(|| async { black_box(calculator.calculate_priority(&task).await.unwrap()) });
    });
}

fn bench_recalculate_priorities(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("recalculate_priorities");

    for count in [10usize, 100, 500] {
        let (store, calculator) = rt.block_on(seeded(count));
        let tasks = rt.block_on(store.list_tasks(&TaskFilter::default(), count as i64)).unwrap();

        group.bench_with_input(BenchmarkId::from_parameter(count), &tasks, |b, tasks| {
            b.to_async(&rt)
                .iter(|| async { black_box(calculator.recalculate_priorities(tasks).await.unwrap()) });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_calculate_priority, bench_recalculate_priorities);
criterion_main!(benches);
