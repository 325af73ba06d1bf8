//! Queue and dequeue throughput of a single pool.

use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use esox_workbroker::ObjectPool;

fn fill(pool: &ObjectPool, objects: usize, groups: usize) {
    let mut state = pool.lock();
    for i in 0..objects {
        state.queue(&format!("o{i}"), &format!("g{}", i % groups));
    }
}

/// Queue then drain in batches, varying the number of groups.
fn bench_drain(c: &mut Criterion) {
    let mut group = c.benchmark_group("drain");
    let objects = 10_000;
    group.throughput(Throughput::Elements(objects as u64));

    for &groups in &[1, 16, 256] {
        group.bench_with_input(BenchmarkId::new("groups", groups), &groups, |b, &groups| {
            b.iter(|| {
                let pool = ObjectPool::new("bench");
                fill(&pool, objects, groups);
                let mut state = pool.lock();
                loop {
                    let batch = state.dequeue(32);
                    if batch.is_empty() {
                        break;
                    }
                    for key in batch {
                        black_box(state.release(key));
                    }
                }
            });
        });
    }
    group.finish();
}

fn bench_requeue_cycle(c: &mut Criterion) {
    let pool = ObjectPool::new("bench");
    fill(&pool, 1_000, 8);

    c.bench_function("requeue_cycle", |b| {
        b.iter(|| {
            let mut state = pool.lock();
            let batch = state.dequeue(16);
            for key in batch {
                black_box(state.requeue(key));
            }
        });
    });
}

criterion_group!(benches, bench_drain, bench_requeue_cycle);
criterion_main!(benches);
