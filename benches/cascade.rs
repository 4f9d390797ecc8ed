use std::sync::Arc;

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use namecascade::{normalize, CascadeEngine, DirectoryRecord, InMemoryDirectory};

fn make_engine(records: usize, corrections: usize) -> CascadeEngine {
    // Synthetic directory: "株式会社サンプル{i}" plus a few Latin names.
    let directory: InMemoryDirectory = (0..records)
        .map(|i| DirectoryRecord::new(format!("株式会社サンプル{i}"), format!("{i:013}"), "東京都"))
        .chain([
            DirectoryRecord::new("Acme Trading", "9000000000001", "東京都"),
            DirectoryRecord::new("Acme Trading Holdings", "9000000000002", "大阪府"),
        ])
        .collect();

    let engine = CascadeEngine::builder()
        .directory(Arc::new(directory))
        .build()
        .unwrap();

    for i in 0..corrections {
        engine
            .record_correction(&format!("Corrected {i}"), "", &format!("Corrected {i} KK"))
            .unwrap();
    }
    engine
}

fn bench_levels(c: &mut Criterion) {
    let engine = make_engine(10_000, 256);

    let mut group = c.benchmark_group("resolve");
    group.throughput(Throughput::Elements(1));

    let cases = [
        ("user_correction", "Corrected 128"),
        ("listed_alias", "トヨタ"),
        ("brand_alias", "スタバ"),
        ("directory_exact", "Acme Trading"),
        ("directory_pattern", "サンプル42"),
        ("directory_prefix", "Acme Tr"),
        ("fallback", "Unknown Widgets"),
    ];
    for (name, query) in cases {
        group.bench_with_input(BenchmarkId::from_parameter(name), query, |b, q| {
            b.iter(|| black_box(engine.resolve(black_box(q))));
        });
    }
    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    c.bench_function("normalize", |b| {
        b.iter(|| black_box(normalize(black_box("　ＡＣＭＥ Trading–Holdings（Japan）　"))));
    });
}

fn bench_correction_containment(c: &mut Criterion) {
    let mut group = c.benchmark_group("correction_containment");
    for corrections in [64usize, 1024] {
        let engine = make_engine(0, corrections);
        group.bench_with_input(
            BenchmarkId::from_parameter(corrections),
            &engine,
            |b, engine| {
                // Misses exact, scans for containment.
                b.iter(|| black_box(engine.resolve(black_box("xx Corrected 7 yy"))));
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_levels,
    bench_normalize,
    bench_correction_containment
);
criterion_main!(benches);
