//! Benchmark for matching and fusion
//!
//! Run with: cargo bench

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

use graph_fusion::fusions::{register_fake_backend_passes, FAKE_BACKEND};
use graph_fusion::graph::{Graph, Op};
use graph_fusion::pass::{DiagnosticConfig, PassPipeline, PassRegistry, PipelineConfig};
use graph_fusion::pattern::PatternGraph;
use graph_fusion::transform::match_pattern;

/// `blocks` repetitions of reorder -> conv -> bias_add -> relu -> tanh -> gelu
fn make_graph(blocks: usize) -> Graph {
    let mut graph = Graph::new();
    let mut t = graph.add_input("x");
    let w = graph.add_input("w");
    let b = graph.add_input("b");

    for i in 0..blocks {
        for (kind, extra) in [
            ("reorder", None),
            ("conv", Some(w)),
            ("bias_add", Some(b)),
            ("relu", None),
            ("tanh", None),
            ("gelu", None),
        ] {
            let out = graph.add_tensor(format!("{}_{}", kind, i));
            let inputs = std::iter::once(t).chain(extra);
            graph
                .add_op(Op::new(kind).with_inputs(inputs).with_outputs([out]))
                .expect("valid op");
            t = out;
        }
    }
    graph.mark_output(t).expect("known tensor");
    graph
}

fn conv_bias_act_pattern(registry: &PassRegistry) -> PatternGraph {
    registry
        .get(FAKE_BACKEND, "conv_bias_act")
        .expect("registered")
        .build_pattern()
        .expect("valid pattern")
}

fn match_benchmark(c: &mut Criterion) {
    let mut registry = PassRegistry::new();
    register_fake_backend_passes(&mut registry).expect("fresh registry");
    let pattern = conv_bias_act_pattern(&registry);

    let mut group = c.benchmark_group("match_pattern");
    for blocks in [8, 64, 256] {
        let graph = make_graph(blocks);
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &graph, |b, graph| {
            b.iter(|| black_box(match_pattern(graph, &pattern)))
        });
    }
    group.finish();
}

fn pipeline_benchmark(c: &mut Criterion) {
    let mut registry = PassRegistry::new();
    register_fake_backend_passes(&mut registry).expect("fresh registry");
    let config = PipelineConfig::default().with_diagnostics(DiagnosticConfig::disabled());
    let pipeline = PassPipeline::new(&registry, FAKE_BACKEND, config).expect("fake backend");

    let mut group = c.benchmark_group("pipeline");
    for blocks in [8, 64] {
        let graph = make_graph(blocks);
        group.bench_with_input(BenchmarkId::from_parameter(blocks), &graph, |b, graph| {
            b.iter(|| {
                let mut graph = graph.clone();
                black_box(pipeline.run(&mut graph).expect("pipeline run"))
            })
        });
    }
    group.finish();
}

criterion_group!(benches, match_benchmark, pipeline_benchmark);
criterion_main!(benches);
