//! Suppression matching benchmarks
//!
//! Measures the glob primitive and whole-catalog lookup cost for a stack
//! that matches nothing, which is the hot path when a program with many
//! distinct defects runs under a large policy file.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use memoria::callstack::{SymbolizedFrame, SymbolizedStack};
use memoria::pattern::{frames_match, text_matches_pattern, FramePattern};
use memoria::suppress::{Provenance, SuppressionCatalog};

fn build_catalog(rules: usize) -> SuppressionCatalog {
    let mut text = String::new();
    for i in 0..rules {
        text.push_str(&format!(
            "LEAK\nname=rule{i}\nlib{i}.so!alloc_{i}\n...\nlib{i}.so!entry\n"
        ));
    }
    let mut catalog = SuppressionCatalog::new();
    catalog
        .load_str(&text, Provenance::User, 20)
        .expect("bench rules should parse");
    catalog
}

fn build_stack(depth: usize) -> SymbolizedStack {
    SymbolizedStack::new(
        (0..depth)
            .map(|i| SymbolizedFrame::Module {
                module: "app".to_string(),
                offset: 0x1000 + i as u64,
                function: Some(format!("frame_{i}")),
            })
            .collect(),
    )
}

fn bench_glob(c: &mut Criterion) {
    let mut group = c.benchmark_group("glob");
    group.bench_function("literal", |b| {
        b.iter(|| text_matches_pattern(black_box("pool_grow_internal"), black_box("pool_grow_internal"), false))
    });
    group.bench_function("star_backtrack", |b| {
        b.iter(|| text_matches_pattern(black_box("operator new[](unsigned long)"), black_box("operator*[]*long)"), false))
    });
    group.finish();
}

fn bench_frames(c: &mut Criterion) {
    let stack = build_stack(16);
    let rule = vec![
        FramePattern::Ellipsis,
        FramePattern::ModuleFunction {
            module: "app".to_string(),
            function: "frame_15".to_string(),
        },
    ];
    c.bench_function("frames/ellipsis_deep_match", |b| {
        b.iter(|| frames_match(black_box(&stack.frames), black_box(&rule), false))
    });
}

fn bench_catalog_miss(c: &mut Criterion) {
    let stack = build_stack(16);
    let mut group = c.benchmark_group("catalog_miss");
    for rules in [10usize, 100, 500] {
        let mut catalog = build_catalog(rules);
        group.throughput(Throughput::Elements(rules as u64));
        group.bench_function(format!("{rules}_rules"), |b| {
            b.iter(|| {
                catalog.first_match(
                    black_box(memoria::category::DefectCategory::Leak),
                    black_box(&stack.frames),
                    "",
                    0,
                    false,
                )
            })
        });
    }
    group.finish();
}

criterion_group!(benches, bench_glob, bench_frames, bench_catalog_miss);
criterion_main!(benches);
