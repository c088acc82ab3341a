use std::sync::Arc;

use async_trait::async_trait;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use serde_json::json;
use tablesync::network::{NetworkError, RemoteDispatcher, SyncManager, SyncOptions};
use tablesync::storage::{
    Action, KeyValueStore, MemoryStore, NewRecord, QueueRecord, QueueStore, SledStore, SyncStatus,
};
use tempfile::TempDir;

struct AcceptAll;

#[async_trait]
impl RemoteDispatcher for AcceptAll {
    async fn dispatch(&self, _record: &QueueRecord) -> Result<(), NetworkError> {
        Ok(())
    }
}

fn sled_queue() -> (QueueStore, TempDir) {
    let temp_dir = TempDir::new().unwrap();
    let backend: Arc<dyn KeyValueStore> = Arc::new(SledStore::open(temp_dir.path()).unwrap());
    (QueueStore::new(backend), temp_dir)
}

fn fill(queue: &QueueStore, count: usize) {
    for i in 0..count {
        queue
            .append(NewRecord::with_id(
                format!("order-{i}"),
                "orders",
                Action::Create,
                json!({"table": i % 20, "total": 12.5 + i as f64, "items": ["soup", "bread"]}),
            ))
            .unwrap();
    }
}

fn benchmark_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("append");
    for size in [10, 100] {
        group.bench_with_input(BenchmarkId::new("sled", size), &size, |b, &size| {
            b.iter(|| {
                let (queue, _temp) = sled_queue();
                fill(&queue, size);
                black_box(queue.len());
            });
        });
    }
    group.finish();
}

fn benchmark_read_and_purge(c: &mut Criterion) {
    let mut group = c.benchmark_group("read_purge");
    for size in [100, 1000] {
        let (queue, _temp) = sled_queue();
        fill(&queue, size);

        group.bench_with_input(BenchmarkId::new("read_all", size), &size, |b, _| {
            b.iter(|| black_box(queue.read_all()));
        });

        group.bench_with_input(BenchmarkId::new("purge_half", size), &size, |b, &size| {
            b.iter(|| {
                for i in (0..size).step_by(2) {
                    queue.set_status(&format!("order-{i}"), SyncStatus::Synced).unwrap();
                }
                black_box(queue.purge_synced().unwrap());
                queue.clear().unwrap();
                fill(&queue, size);
            });
        });
    }
    group.finish();
}

fn benchmark_drain(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    let mut group = c.benchmark_group("drain");
    for size in [100, 500] {
        group.bench_with_input(BenchmarkId::new("memory", size), &size, |b, &size| {
            b.to_async(&runtime).iter(|| async move {
                let queue = Arc::new(QueueStore::new(Arc::new(MemoryStore::new())));
                fill(&queue, size);
                let manager = SyncManager::new(queue, Arc::new(AcceptAll));
                black_box(manager.sync_offline_data(SyncOptions::new()).await);
            });
        });
    }
    group.finish();
}

criterion_group!(benches, benchmark_append, benchmark_read_and_purge, benchmark_drain);
criterion_main!(benches);
