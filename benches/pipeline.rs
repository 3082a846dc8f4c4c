use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use opgraph_layout::config::LayoutConfig;
use opgraph_layout::ir::{Snapshot, Symbol};
use opgraph_layout::layout::discover::discover;
use opgraph_layout::layout::graph::PipelineContext;
use opgraph_layout::layout::slicing::slice_edges;
use opgraph_layout::layout::{LayeredEngine, compute_layout_blocking};
use std::hint::black_box;

/// An unrolled loop: `steps` iterations, each a chain of `ops` ops, with the hidden state
/// of one iteration feeding the next.
fn unrolled_loop(steps: usize, ops: usize) -> Snapshot {
    let data = |step: usize, i: usize| format!("D{step}_{i}");
    let op = |step: usize, i: usize| format!("O{step}_{i}");
    let mut snapshot = Snapshot::new(&data(steps - 1, ops));
    snapshot.insert("X", Symbol::data(None, None, 0));
    for step in 0..steps {
        let iteration = format!("C{step}");
        let mut contents = Vec::new();
        for i in 0..ops {
            let input = if i > 0 {
                data(step, i)
            } else if step > 0 {
                data(step - 1, ops)
            } else {
                "X".to_string()
            };
            snapshot.insert(
                &op(step, i),
                Symbol::op(Some(iteration.as_str()), &[Some(input.as_str()), Some("X")], &[]),
            );
            let creator = op(step, i);
            snapshot.insert(
                &data(step, i + 1),
                Symbol::data(Some(iteration.as_str()), Some(creator.as_str()), 0),
            );
            contents.push(op(step, i));
            contents.push(data(step, i + 1));
        }
        let contents: Vec<&str> = contents.iter().map(String::as_str).collect();
        snapshot.insert(&iteration, Symbol::container(None, &contents, step as i64));
    }
    snapshot
}

/// `depth` abstractive containers nested inside each other, one op per level.
fn nested_blocks(depth: usize) -> Snapshot {
    let mut snapshot = Snapshot::new("D0");
    snapshot.insert("D0", Symbol::data(None, Some("O0"), 0));
    for level in 0..depth {
        let parent = (level > 0).then(|| format!("B{}", level - 1));
        let block = format!("B{level}");
        let op = format!("O{level}");
        let input = format!("D{}", level + 1);
        let creator = (level + 1 < depth).then(|| format!("O{}", level + 1));
        snapshot.insert(&op, Symbol::op(Some(block.as_str()), &[Some(input.as_str())], &[]));
        snapshot.insert(&input, Symbol::data(Some(block.as_str()), creator.as_deref(), 0));
        let mut contents = vec![op.clone(), input.clone()];
        if level + 1 < depth {
            contents.push(format!("B{}", level + 1));
        }
        let contents: Vec<&str> = contents.iter().map(String::as_str).collect();
        snapshot.insert(&block, Symbol::container(parent.as_deref(), &contents, -1));
        snapshot.set_expanded(&block, true);
    }
    snapshot
}

fn cases() -> Vec<(&'static str, Snapshot)> {
    vec![
        ("loop_4x4", unrolled_loop(4, 4)),
        ("loop_16x8", unrolled_loop(16, 8)),
        ("loop_64x4", unrolled_loop(64, 4)),
        ("nested_8", nested_blocks(8)),
        ("nested_32", nested_blocks(32)),
    ]
}

fn bench_slicing(c: &mut Criterion) {
    let mut group = c.benchmark_group("slicing");
    for (name, snapshot) in cases() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &snapshot, |b, snapshot| {
            b.iter(|| {
                let mut ctx = PipelineContext::new();
                let found = discover(black_box(snapshot), &mut ctx).expect("discovery failed");
                let slicing = slice_edges(&found.index, &found.raw_edges, &mut ctx);
                black_box(slicing.hops.len());
            });
        });
    }
    group.finish();
}

fn bench_layout(c: &mut Criterion) {
    let mut group = c.benchmark_group("layout");
    let config = LayoutConfig::default();
    let engine = LayeredEngine::new(config.clone());
    for (name, snapshot) in cases() {
        group.bench_with_input(BenchmarkId::from_parameter(name), &snapshot, |b, snapshot| {
            b.iter(|| {
                let layout = compute_layout_blocking(black_box(snapshot), &config, &engine)
                    .expect("layout failed");
                black_box(layout.edges.len());
            });
        });
    }
    group.finish();
}

criterion_group!(
    name = benches;
    config = Criterion::default();
    targets = bench_slicing, bench_layout
);
criterion_main!(benches);
