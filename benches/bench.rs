//! Criterion benchmarks for the corrector pipeline.
//!
//! Covers the hot paths of a suggestion run:
//! - Edit distance (unbounded and banded)
//! - Embedding nearest-neighbor lookup
//! - Full candidate generation over a batch of typos

use std::hint::black_box;
use std::sync::Arc;

use criterion::{Criterion, Throughput, criterion_group, criterion_main};
use identypo::candidates::{CandidateGenerator, GeneratorConfig};
use identypo::distance::{levenshtein, levenshtein_bounded};
use identypo::embedding::EmbeddingTable;
use identypo::index::TokenIndex;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Generate a synthetic vocabulary with embeddings for benchmarking.
fn generate_index(token_count: usize, dimension: usize) -> TokenIndex {
    let fragments = [
        "len", "width", "height", "size", "count", "index", "offset", "buf", "ptr", "node",
        "list", "map", "key", "value", "item", "temp", "result", "state", "config", "handle",
    ];

    let mut rng = StdRng::seed_from_u64(17);
    let mut entries = Vec::with_capacity(token_count);
    let mut embeddings = EmbeddingTable::new();
    for i in 0..token_count {
        let token = format!(
            "{}_{}{}",
            fragments[i % fragments.len()],
            fragments[(i * 7 + 3) % fragments.len()],
            i
        );
        let vector: Vec<f32> = (0..dimension).map(|_| rng.random_range(-1.0..1.0)).collect();
        embeddings
            .insert(token.clone(), vector)
            .expect("uniform dimension");
        entries.push((token, (token_count - i) as u64));
    }

    TokenIndex::new(entries, Arc::new(embeddings)).expect("no duplicate tokens")
}

fn bench_edit_distance(c: &mut Criterion) {
    let pairs = [
        ("lenght", "length"),
        ("receive_buffer", "recieve_buffer"),
        ("initialization", "initialisation"),
        ("completely_different", "nothing_alike_at_all"),
    ];

    let mut group = c.benchmark_group("edit_distance");
    group.throughput(Throughput::Elements(pairs.len() as u64));
    group.bench_function("levenshtein", |b| {
        b.iter(|| {
            for (s1, s2) in &pairs {
                black_box(levenshtein(black_box(s1), black_box(s2)));
            }
        })
    });
    group.bench_function("levenshtein_bounded", |b| {
        b.iter(|| {
            for (s1, s2) in &pairs {
                black_box(levenshtein_bounded(black_box(s1), black_box(s2), 3));
            }
        })
    });
    group.finish();
}

fn bench_nearest_neighbors(c: &mut Criterion) {
    let index = generate_index(5_000, 32);
    let probes: Vec<&str> = index.top_frequent(16).iter().map(String::as_str).collect();

    let mut group = c.benchmark_group("nearest_neighbors");
    group.throughput(Throughput::Elements(probes.len() as u64));
    group.bench_function("nearest_token_k20", |b| {
        b.iter(|| {
            for probe in &probes {
                black_box(index.nearest_token(black_box(probe), 20));
            }
        })
    });
    group.finish();
}

fn bench_candidate_generation(c: &mut Criterion) {
    let index = generate_index(5_000, 32);
    let generator = CandidateGenerator::new(GeneratorConfig {
        threads: 4,
        ..GeneratorConfig::default()
    })
    .expect("valid config");

    // Misspell vocabulary tokens by dropping one character.
    let typos: Vec<String> = index
        .top_frequent(64)
        .iter()
        .map(|token| {
            let mut chars: Vec<char> = token.chars().collect();
            chars.remove(chars.len() / 2);
            chars.into_iter().collect()
        })
        .collect();

    let mut group = c.benchmark_group("candidate_generation");
    group.sample_size(20);
    group.throughput(Throughput::Elements(typos.len() as u64));
    group.bench_function("generate_batch_64", |b| {
        b.iter(|| black_box(generator.generate(black_box(&index), black_box(&typos))))
    });
    group.finish();
}

criterion_group!(
    benches,
    bench_edit_distance,
    bench_nearest_neighbors,
    bench_candidate_generation
);
criterion_main!(benches);
