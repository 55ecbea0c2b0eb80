use criterion::{black_box, criterion_group, criterion_main, Criterion};
use request_inspection_service::core::rate_limiter::RouteCategory;
use request_inspection_service::core::{PatternCatalog, PatternRules};

fn classification_benchmark(c: &mut Criterion) {
    let catalog = PatternCatalog::new(PatternRules::default()).unwrap();

    // The common case: a clean request that walks every rule list.
    c.bench_function("classify_clean", |b| {
        b.iter(|| {
            catalog.classify(
                black_box("/api/v1/students/42/results"),
                black_box("page=2&per_page=50"),
                black_box("mozilla/5.0 (x11; linux x86_64)"),
            )
        })
    });

    c.bench_function("classify_path_hit", |b| {
        b.iter(|| catalog.classify(black_box("/wp-admin/setup.php"), "", "mozilla/5.0"))
    });

    c.bench_function("classify_user_agent_hit", |b| {
        b.iter(|| catalog.classify(black_box("/api/v1/tests"), "", black_box("sqlmap/1.7")))
    });

    c.bench_function("route_categorization", |b| {
        b.iter(|| RouteCategory::from_path(black_box("/api/v1/auth/login")))
    });
}

criterion_group!(benches, classification_benchmark);
criterion_main!(benches);
