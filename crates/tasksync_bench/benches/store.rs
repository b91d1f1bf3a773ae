//! Local store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tasksync_bench::{bench_user, generate_tasks, random_title};
use tasksync_core::{TaskDraft, TaskPatch};
use tasksync_storage::{FileBackend, InMemoryBackend, LocalStore, TaskStore};
use tempfile::TempDir;

fn seeded(store: TaskStore, count: usize) -> TaskStore {
    for task in generate_tasks(count) {
        store.upsert_from_remote(&task).unwrap();
    }
    store
}

/// Benchmark task creation with each mutation persisted to memory.
fn bench_create(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_create");

    for count in [0, 100, 1_000].iter() {
        group.bench_with_input(BenchmarkId::new("existing", count), count, |b, &count| {
            let store = seeded(TaskStore::open(InMemoryBackend::new()).unwrap(), count);
            let user = bench_user();

            b.iter(|| {
                store
                    .create(TaskDraft::new(user.clone(), black_box("benchmark task")))
                    .unwrap()
            });
        });
    }
    group.finish();
}

/// Benchmark updates against a file-backed store.
fn bench_file_update(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_update");

    for count in [10, 100, 1_000].iter() {
        group.throughput(Throughput::Elements(1));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let temp_dir = TempDir::new().unwrap();
            let backend = FileBackend::open(&temp_dir.path().join("tasks.json")).unwrap();
            let store = seeded(TaskStore::open(backend).unwrap(), count);
            let user = bench_user();
            let id = store.get_all(&user).unwrap()[0].id.clone();
            let patch = TaskPatch::new().title(random_title(24));

            b.iter(|| store.update(&id, &user, black_box(&patch)).unwrap());
        });
    }
    group.finish();
}

/// Benchmark the queries a sync run starts with.
fn bench_dirty_scan(c: &mut Criterion) {
    let mut group = c.benchmark_group("dirty_scan");

    for count in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*count as u64));
        group.bench_with_input(BenchmarkId::from_parameter(count), count, |b, &count| {
            let store = seeded(TaskStore::in_memory(), count);
            let user = bench_user();
            for task in store.get_all(&user).unwrap().iter().step_by(10) {
                store
                    .update(&task.id, &user, &TaskPatch::new().completed(true))
                    .unwrap();
            }

            b.iter(|| {
                let unsynced = store.get_unsynced(&user).unwrap();
                let deletes = store.get_pending_deletes(&user).unwrap();
                black_box((unsynced.len(), deletes.len()))
            });
        });
    }
    group.finish();
}

criterion_group!(benches, bench_create, bench_file_update, bench_dirty_scan);
criterion_main!(benches);
