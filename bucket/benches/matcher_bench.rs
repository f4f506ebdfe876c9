use std::sync::Arc;

use chrono::Utc;
use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use tzun_bucket::{
    AssignPolicy, BucketSet, Classifier, ClassifierConfig, KvBucketStore, Strategy, best_match,
};
use tzun_embed::HashEmbedder;
use tzun_kv::MemoryStore;

fn random_unit_vec(dim: usize, seed: u64) -> Vec<f32> {
    let mut v = Vec::with_capacity(dim);
    let mut state = seed;
    for _ in 0..dim {
        state = state.wrapping_mul(6364136223846793005).wrapping_add(1);
        v.push(((state >> 33) as f32) / (u32::MAX as f32) - 0.5);
    }
    let norm: f64 = v.iter().map(|&x| (x as f64) * (x as f64)).sum::<f64>().sqrt();
    if norm > 0.0 {
        let s = (1.0 / norm) as f32;
        for x in &mut v {
            *x *= s;
        }
    }
    v
}

/// `n` buckets of mutually dissimilar random vectors.
fn populated_set(n: usize, dim: usize) -> BucketSet {
    // Random high-dimensional vectors are near-orthogonal; 0.99 keeps them apart.
    let policy = AssignPolicy::new(Strategy::similarity(0.99));
    let mut set = BucketSet::new();
    for i in 0..n {
        let emb = random_unit_vec(dim, i as u64 + 1);
        policy.assign(&format!("title {i}"), &emb, &mut set, Utc::now());
    }
    set
}

fn bench_best_match(c: &mut Criterion) {
    let dim = 1536;
    let mut group = c.benchmark_group("best_match_1536d");
    for n in [100, 1_000, 5_000] {
        let set = populated_set(n, dim);
        let candidate = random_unit_vec(dim, 424242);
        group.bench_with_input(BenchmarkId::from_parameter(n), &set, |b, set| {
            b.iter(|| black_box(best_match(black_box(&candidate), &set.buckets)));
        });
    }
    group.finish();
}

fn bench_classify_memory(c: &mut Criterion) {
    let runtime = tokio::runtime::Runtime::new().unwrap();
    // Bounded examples keep the saved document from growing per iteration.
    let classifier = Classifier::new(
        ClassifierConfig {
            max_examples: Some(16),
            ..Default::default()
        },
        Arc::new(HashEmbedder::default()),
        Arc::new(KvBucketStore::new(Arc::new(MemoryStore::new()), "bench")),
    );
    let titles = [
        "Senior Software Engineer",
        "Staff Backend Engineer",
        "Product Marketing Manager",
        "Registered Nurse",
        "Data Scientist",
        "Line Cook",
    ];
    let mut i = 0usize;

    c.bench_function("classify_hash_embedder_memory_store", |b| {
        b.to_async(&runtime).iter(|| {
            i = (i + 1) % titles.len();
            let title = titles[i];
            let classifier = &classifier;
            async move { black_box(classifier.classify(title).await.is_ok()) }
        });
    });
}

criterion_group!(benches, bench_best_match, bench_classify_memory);
criterion_main!(benches);
