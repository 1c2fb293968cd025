//! Benchmarks for local-mode filtering and candidate normalization.
//!
//! Run with: cargo bench -p dynlookup-control

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use dynlookup_control::fetcher::{filter_rows, normalize};
use dynlookup_core::{LookupConfig, MatchType, Row, SearchMode};
use serde_json::{Value, json};
use std::hint::black_box;

fn fixture(n: usize) -> Vec<Row> {
    (0..n)
        .filter_map(|i| match json!({"Id": format!("{i:06}"), "Name": format!("Account {i} Ltd")}) {
            Value::Object(row) => Some(row),
            _ => None,
        })
        .collect()
}

// ============================================================================
// Filter + normalize
// ============================================================================

fn bench_local_search(c: &mut Criterion) {
    let mut group = c.benchmark_group("fetcher/local");
    let partial = LookupConfig::default().with_search_mode(SearchMode::Local);
    let exact = partial.clone().with_match_type(MatchType::Exact);

    for n in [100, 1_000, 10_000] {
        let rows = fixture(n);

        group.bench_with_input(BenchmarkId::new("partial", n), &rows, |b, rows| {
            b.iter(|| {
                let hits = normalize(filter_rows(rows, &partial, black_box("12")), &partial);
                black_box(hits)
            });
        });

        group.bench_with_input(BenchmarkId::new("exact", n), &rows, |b, rows| {
            b.iter(|| {
                let hits = normalize(
                    filter_rows(rows, &exact, black_box("account 42 ltd")),
                    &exact,
                );
                black_box(hits)
            });
        });

        group.bench_with_input(BenchmarkId::new("empty_text", n), &rows, |b, rows| {
            b.iter(|| black_box(normalize(filter_rows(rows, &partial, ""), &partial)));
        });
    }

    group.finish();
}

criterion_group!(benches, bench_local_search);
criterion_main!(benches);
