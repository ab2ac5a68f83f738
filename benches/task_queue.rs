//! Enqueue and completion throughput against an in-memory store.

use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use abathur_queue::adapters::sqlite::{create_migrated_test_pool, SqliteStore};
use abathur_queue::domain::ports::SystemClock;
use abathur_queue::services::dependency_resolver::InMemoryDependencyResolver;
use abathur_queue::services::priority_calculator::WeightedPriorityCalculator;
use abathur_queue::services::task_queue::{EnqueueRequest, TaskQueue};

type Resolver = InMemoryDependencyResolver<SqliteStore, SystemClock>;
type Calculator = WeightedPriorityCalculator<SqliteStore, Resolver, SystemClock>;
type Queue = TaskQueue<SqliteStore, Resolver, Calculator>;

async fn queue() -> Queue {
    let pool = create_migrated_test_pool().await.unwrap();
    let store = Arc::new(SqliteStore::new(pool));
    let clock = Arc::new(SystemClock);
    let resolver = Arc::new(InMemoryDependencyResolver::new(store.clone(), clock.clone()));
    let calculator = Arc::new(WeightedPriorityCalculator::new(store.clone(), resolver.clone(), clock));
    TaskQueue::new(store, resolver, calculator)
}

fn request(prompt: String) -> EnqueueRequest {
    EnqueueRequest {
        prompt,
        agent_type: "implementation".to_string(),
        created_by: "bench".to_string(),
        priority: 5,
        ..Default::default()
    }
}

fn bench_enqueue(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("enqueue");

    for depth in [0usize, 10, 50] {
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, &depth| {
            b.to_async(&rt).iter_batched(
                || rt.block_on(queue()),
                |queue| async move {
                    let mut prior = None;
                    for i in 0..depth.max(1) {
                        let mut req = request(format!("task-{i}"));
                        if let Some(p) = prior {
                            req.prerequisites = vec![p];
                        }
                        prior = Some(black_box(queue.enqueue(req).await.unwrap()));
                    }
                },
                criterion::BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_get_next_task(c: &mut Criterion) {
    let rt = tokio::runtime::Runtime::new().unwrap();
    c.bench_function("get_next_task_from_100_ready", |b| {
        b.to_async(&rt).iter_batched(
            || {
                rt.block_on(async {
                    let queue = queue().await;
                    for i in 0..100 {
                        queue.enqueue(request(format!("task-{i}"))).await.unwrap();
                    }
                    queue
                })
            },
            |queue| async move {
                black_box(queue.get_next_task().await.unwrap());
            },
            criterion::BatchSize::SmallInput,
        );
    });
}

criterion_group!(benches, bench_enqueue, bench_get_next_task);
criterion_main!(benches);
