//! Benchmarks for the flow engine: SPF alone, `calc_max_flow` under both
//! the one-shot and iterative strategies, and `FlowPolicy::place_demand`
//! under the `TE_ECMP_16_LSP` preset on a synthetic mesh.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use netgraph_flow::graph::edge_select::{EdgeSelect, EdgeSelector};
use netgraph_flow::graph::max_flow::{calc_max_flow, MaxFlowOpts};
use netgraph_flow::graph::spf::shortest_paths;
use netgraph_flow::graph::StrictMultiDiGraph;
use netgraph_flow::policy::{FlowPolicy, FlowPolicyConfig};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

fn random_graph(nodes: usize, edges: usize, seed: u64) -> StrictMultiDiGraph {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut g = StrictMultiDiGraph::new();
    let ids: Vec<String> = (0..nodes).map(|i| format!("n{i}")).collect();
    for id in &ids {
        g.add_node(id.clone());
    }
    for _ in 0..edges {
        let from = rng.gen_range(0..nodes);
        let to = rng.gen_range(0..nodes);
        if from != to {
            let cost = rng.gen_range(1..100);
            let capacity = rng.gen_range(1..50) as f64;
            g.add_edge(&ids[from], &ids[to], capacity, cost).unwrap();
        }
    }
    g
}

fn bench_spf(c: &mut Criterion) {
    let mut group = c.benchmark_group("spf");

    for (nodes, edges) in [(100, 500), (500, 2500), (1000, 5000)] {
        let g = random_graph(nodes, edges, 42);
        let source = "n0".to_string();
        let selector = EdgeSelector::new(EdgeSelect::AllMinCost);

        group.bench_with_input(BenchmarkId::new("nodes", nodes), &g, |b, graph| {
            b.iter(|| shortest_paths(black_box(graph), &source, &selector, true));
        });
    }

    group.finish();
}

fn bench_calc_max_flow(c: &mut Criterion) {
    let mut group = c.benchmark_group("calc_max_flow");

    for (nodes, edges) in [(50, 250), (200, 1000)] {
        let g = random_graph(nodes, edges, 7);
        let src = "n0".to_string();
        let dst = format!("n{}", nodes - 1);

        group.bench_with_input(BenchmarkId::new("shortest_path/nodes", nodes), &g, |b, graph| {
            let opts = MaxFlowOpts::default().shortest_path(true);
            b.iter(|| {
                let mut working = graph.clone();
                calc_max_flow(black_box(&mut working), &src, &dst, &opts, None).unwrap()
            });
        });

        group.bench_with_input(BenchmarkId::new("iterative/nodes", nodes), &g, |b, graph| {
            let opts = MaxFlowOpts::default();
            b.iter(|| {
                let mut working = graph.clone();
                calc_max_flow(black_box(&mut working), &src, &dst, &opts, None).unwrap()
            });
        });
    }

    group.finish();
}

fn bench_place_demand_te_ecmp_16_lsp(c: &mut Criterion) {
    let mut group = c.benchmark_group("place_demand_te_ecmp_16_lsp");

    let mut g = StrictMultiDiGraph::new();
    for n in ["A", "B"] {
        g.add_node(n);
    }
    for _ in 0..32 {
        g.add_edge(&"A".into(), &"B".into(), 10.0, 1).unwrap();
    }

    group.bench_function("mesh", |b| {
        b.iter(|| {
            let mut working = g.clone();
            let mut policy = FlowPolicy::preset(FlowPolicyConfig::TeEcmp16Lsp);
            policy
                .place_demand(black_box(&mut working), &"A".into(), &"B".into(), "bench", 200.0, None, "capacity", "flow", "flows")
                .unwrap()
        });
    });

    group.finish();
}

criterion_group!(benches, bench_spf, bench_calc_max_flow, bench_place_demand_te_ecmp_16_lsp);
criterion_main!(benches);
