//! 单聊 find-or-create 性能基准测试
//! 覆盖会话键生成、已存在会话的查找以及新会话创建

use std::sync::Arc;

use affinity_core::direct_pair_key;
use affinity_match::domain::model::MatchDomainConfig;
use affinity_match::domain::service::ThreadRegistry;
use affinity_match::infrastructure::persistence::memory::{BackendSession, InMemoryBackend};
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tokio::runtime::Runtime;

fn registry_for(backend: &Arc<InMemoryBackend>, user_id: &str) -> ThreadRegistry {
    let session = Arc::new(BackendSession::new(backend.clone()));
    session.sign_in(user_id);
    ThreadRegistry::new(session.clone(), session, MatchDomainConfig::default())
}

fn bench_pair_key(c: &mut Criterion) {
    c.bench_function("direct_pair_key", |b| {
        b.iter(|| direct_pair_key(black_box("user_b%42"), black_box("user_a_17")))
    });
}

fn bench_ensure_existing(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let backend = Arc::new(InMemoryBackend::new());
    let registry = registry_for(&backend, "u1");
    rt.block_on(registry.ensure_direct_thread("u1", "u2"))
        .expect("seed thread");

    c.bench_function("ensure_direct_thread_existing", |b| {
        b.to_async(&rt)
            .iter(|| async { registry.ensure_direct_thread("u1", "u2").await.unwrap() })
    });
}

fn bench_ensure_new(c: &mut Criterion) {
    let rt = Runtime::new().expect("tokio runtime");
    let mut group = c.benchmark_group("ensure_direct_thread_new");

    for existing in [0usize, 100, 1_000] {
        let backend = Arc::new(InMemoryBackend::new());
        let registry = registry_for(&backend, "u1");
        rt.block_on(async {
            for i in 0..existing {
                registry
                    .ensure_direct_thread("u1", &format!("seed-{i}"))
                    .await
                    .expect("seed thread");
            }
        });

        let mut counter = 0u64;
        group.bench_with_input(BenchmarkId::from_parameter(existing), &existing, |b, _| {
            b.to_async(&rt).iter(|| {
                counter += 1;
                let other = format!("peer-{counter}");
                let registry = &registry;
                async move { registry.ensure_direct_thread("u1", &other).await.unwrap() }
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_pair_key, bench_ensure_existing, bench_ensure_new);
criterion_main!(benches);
