//! Max-flow solver (C7): repeatedly runs SPF + `FlowPlacer` to saturate
//! the source-sink cut, and derives summary diagnostics (cost
//! distribution, reachability, min-cut) from the resulting graph.

use super::capacity::compute_residual_capacity;
use super::edge_select::{EdgeSelect, EdgeSelector};
use super::path_bundle::PathBundle;
use super::placement::{place_flow_on_graph, FlowPlacement};
use super::spf::shortest_paths;
use super::{EdgeKey, NodeId, StrictMultiDiGraph};
use crate::cancel::CancellationToken;
use crate::policy::FlowIndex;
use crate::types::{Cost, Flow, EPSILON, MIN_FLOW};
use crate::{Error, Result};
use bitvec::vec::BitVec;
use indexmap::{IndexMap, IndexSet};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

/// Options bundling `calc_max_flow`'s keyword-like parameters.
#[derive(Debug, Clone)]
pub struct MaxFlowOpts {
    /// One-shot augmentation along a single shortest-path DAG instead of
    /// the default iterative saturating fill.
    pub shortest_path: bool,
    /// Discipline used to split flow across parallel/branching edges.
    pub flow_placement: FlowPlacement,
    /// Attribute name holding edge capacity.
    pub capacity_attr: String,
    /// Attribute name holding placed flow.
    pub flow_attr: String,
    /// Attribute name holding the per-flow contribution map.
    pub flows_attr: String,
    /// Clone the input graph before mutating it.
    pub copy_graph: bool,
    /// Zero flow state on the working graph before computing.
    pub reset_flow_graph: bool,
    /// Populate [`MaxFlowResult::summary`].
    pub return_summary: bool,
    /// Populate [`MaxFlowResult::graph`] with the final working graph.
    pub return_graph: bool,
}

impl Default for MaxFlowOpts {
    fn default() -> Self {
        Self {
            shortest_path: false,
            flow_placement: FlowPlacement::Proportional,
            capacity_attr: "capacity".to_string(),
            flow_attr: "flow".to_string(),
            flows_attr: "flows".to_string(),
            copy_graph: true,
            reset_flow_graph: false,
            return_summary: false,
            return_graph: false,
        }
    }
}

impl MaxFlowOpts {
    /// Use one-shot shortest-path augmentation instead of iterative fill.
    pub fn shortest_path(mut self, v: bool) -> Self {
        self.shortest_path = v;
        self
    }
    /// Set the flow-placement discipline.
    pub fn flow_placement(mut self, v: FlowPlacement) -> Self {
        self.flow_placement = v;
        self
    }
    /// Use a custom capacity attribute name.
    pub fn capacity_attr(mut self, v: impl Into<String>) -> Self {
        self.capacity_attr = v.into();
        self
    }
    /// Use a custom flow attribute name.
    pub fn flow_attr(mut self, v: impl Into<String>) -> Self {
        self.flow_attr = v.into();
        self
    }
    /// Use a custom per-flow contribution attribute name.
    pub fn flows_attr(mut self, v: impl Into<String>) -> Self {
        self.flows_attr = v.into();
        self
    }
    /// Clone the input graph before mutating it (default `true`).
    pub fn copy_graph(mut self, v: bool) -> Self {
        self.copy_graph = v;
        self
    }
    /// Zero flow state on the working graph first.
    pub fn reset_flow_graph(mut self, v: bool) -> Self {
        self.reset_flow_graph = v;
        self
    }
    /// Populate the returned [`FlowSummary`].
    pub fn return_summary(mut self, v: bool) -> Self {
        self.return_summary = v;
        self
    }
    /// Populate the returned working graph.
    pub fn return_graph(mut self, v: bool) -> Self {
        self.return_graph = v;
        self
    }
}

/// Diagnostic summary of a completed `calc_max_flow` call.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FlowSummary {
    /// Total flow value.
    pub total_flow: Flow,
    /// Placed flow on every edge, keyed by `(u, v, key)`.
    pub edge_flow: IndexMap<(NodeId, NodeId, EdgeKey), Flow>,
    /// Residual capacity on every edge, keyed by `(u, v, key)`.
    pub residual_cap: IndexMap<(NodeId, NodeId, EdgeKey), Flow>,
    /// Nodes reachable from the source in the true residual graph
    /// (forward residual capacity plus reverse residual on loaded edges).
    pub reachable: IndexSet<NodeId>,
    /// Edges straddling the reachable/unreachable cut with zero residual.
    pub min_cut: Vec<(NodeId, NodeId, EdgeKey)>,
    /// Total placed volume grouped by augmentation path cost.
    pub cost_distribution: IndexMap<Cost, Flow>,
}

/// Result of a `calc_max_flow` call. Rust has no tuple-union return
/// type, so the requested shape (scalar only, plus summary, plus
/// graph, or both) is expressed as optional fields instead.
#[derive(Debug, Clone)]
pub struct MaxFlowResult {
    /// The computed max-flow value.
    pub flow: Flow,
    /// Present iff `opts.return_summary`.
    pub summary: Option<FlowSummary>,
    /// Present iff `opts.return_graph`. The final working graph (a
    /// clone, if `copy_graph`; otherwise the same graph passed in).
    pub graph: Option<StrictMultiDiGraph>,
}

/// Compute max flow from `src` to `dst`, placing flow on the working
/// graph (a clone of `graph` unless `opts.copy_graph` is false).
#[tracing::instrument(skip(graph, opts, cancel), fields(src = ?src, dst = ?dst))]
pub fn calc_max_flow(
    graph: &mut StrictMultiDiGraph,
    src: &NodeId,
    dst: &NodeId,
    opts: &MaxFlowOpts,
    cancel: Option<&CancellationToken>,
) -> Result<MaxFlowResult> {
    if !graph.has_node(src) {
        return Err(Error::unknown_node(src));
    }
    if !graph.has_node(dst) {
        return Err(Error::unknown_node(dst));
    }

    if src == dst {
        let summary = opts.return_summary.then(FlowSummary::default);
        let result_graph = opts.return_graph.then(|| graph.clone());
        return Ok(MaxFlowResult { flow: 0.0, summary, graph: result_graph });
    }

    let mut owned;
    let working: &mut StrictMultiDiGraph = if opts.copy_graph {
        owned = graph.clone();
        &mut owned
    } else {
        graph
    };

    if opts.reset_flow_graph {
        working.reset_flow_state(&opts.flow_attr, &opts.flows_attr);
    }

    let mut total_flow = 0.0;
    let mut cost_distribution: IndexMap<Cost, Flow> = IndexMap::new();
    let mut next_flow_id: u64 = 0;

    if opts.shortest_path {
        if let Some(c) = cancel {
            if c.is_cancelled() {
                return Err(Error::Cancelled);
            }
        }
        let selector = EdgeSelector::new(EdgeSelect::AllMinCost)
            .with_capacity_attr(&opts.capacity_attr)
            .with_flow_attr(&opts.flow_attr);
        let spf = shortest_paths(working, src, &selector, true);
        if let Some(&cost) = spf.cost.get(dst) {
            let bundle = PathBundle::new(src.clone(), dst.clone(), spf.pred, cost);
            let rc = compute_residual_capacity(working, &bundle, &opts.capacity_attr, &opts.flow_attr);
            let volume = match opts.flow_placement {
                FlowPlacement::Proportional => rc.max_flow.total,
                FlowPlacement::EqualBalanced => rc.max_flow.balanced,
            };
            let flow_index = FlowIndex::new(src.clone(), dst.clone(), "max_flow".to_string(), next_flow_id);
            next_flow_id += 1;
            let meta = place_flow_on_graph(
                working,
                &bundle,
                volume,
                flow_index,
                opts.flow_placement,
                &opts.capacity_attr,
                &opts.flow_attr,
                &opts.flows_attr,
            );
            total_flow += meta.placed;
            if meta.placed > MIN_FLOW {
                *cost_distribution.entry(bundle.cost).or_insert(0.0) += meta.placed;
            }
            tracing::debug!(cost = bundle.cost, placed = meta.placed, total = total_flow, "augmentation");
        }
    } else {
        loop {
            if let Some(c) = cancel {
                if c.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }

            let selector = EdgeSelector::new(EdgeSelect::AllMinCostWithCapRemaining)
                .with_capacity_attr(&opts.capacity_attr)
                .with_flow_attr(&opts.flow_attr);
            let spf = shortest_paths(working, src, &selector, true);
            let Some(&cost) = spf.cost.get(dst) else { break };

            if let Some(c) = cancel {
                if c.is_cancelled() {
                    return Err(Error::Cancelled);
                }
            }

            let bundle = PathBundle::new(src.clone(), dst.clone(), spf.pred, cost);
            let flow_index = FlowIndex::new(src.clone(), dst.clone(), "max_flow".to_string(), next_flow_id);
            next_flow_id += 1;
            let meta = place_flow_on_graph(
                working,
                &bundle,
                Flow::INFINITY,
                flow_index,
                opts.flow_placement,
                &opts.capacity_attr,
                &opts.flow_attr,
                &opts.flows_attr,
            );
            if meta.placed <= MIN_FLOW {
                break;
            }
            total_flow += meta.placed;
            *cost_distribution.entry(bundle.cost).or_insert(0.0) += meta.placed;
            tracing::debug!(cost = bundle.cost, placed = meta.placed, total = total_flow, "augmentation");
        }
    }

    let summary = if opts.return_summary {
        Some(compute_summary(working, src, &opts.capacity_attr, &opts.flow_attr, total_flow, cost_distribution))
    } else {
        None
    };
    let result_graph = opts.return_graph.then(|| working.clone());

    Ok(MaxFlowResult { flow: total_flow, summary, graph: result_graph })
}

fn compute_summary(
    graph: &StrictMultiDiGraph,
    src: &NodeId,
    capacity_attr: &str,
    flow_attr: &str,
    total_flow: Flow,
    cost_distribution: IndexMap<Cost, Flow>,
) -> FlowSummary {
    let mut edge_flow = IndexMap::new();
    let mut residual_cap = IndexMap::new();
    for key in graph.all_edge_keys() {
        let Some((u, v)) = graph.edge_endpoints(key) else { continue };
        let Some(attrs) = graph.edge_attrs(key) else { continue };
        let flow = attrs.float(flow_attr);
        let residual = (attrs.float(capacity_attr) - flow).max(0.0);
        edge_flow.insert((u.clone(), v.clone(), key), flow);
        residual_cap.insert((u, v, key), residual);
    }

    let reachable = residual_reachable(graph, src, capacity_attr, flow_attr);

    let mut min_cut = Vec::new();
    for (&(ref u, ref v, key), &residual) in &residual_cap {
        if reachable.contains(u) && !reachable.contains(v) && residual <= EPSILON {
            min_cut.push((u.clone(), v.clone(), key));
        }
    }

    FlowSummary { total_flow, edge_flow, residual_cap, reachable, min_cut, cost_distribution }
}

/// Nodes reachable from `src` in the true residual graph: forward
/// residual capacity, or backward along any edge currently carrying
/// positive flow (reverse residual).
fn residual_reachable(graph: &StrictMultiDiGraph, src: &NodeId, capacity_attr: &str, flow_attr: &str) -> IndexSet<NodeId> {
    // Dense per-node visited marks, since every node touched during this
    // BFS already has a stable 0-based position in the graph's node table;
    // cheaper to flip a bit than to hash a `NodeId` on every edge probed.
    let mut marked: BitVec = BitVec::repeat(false, graph.node_count());
    let mut reachable = IndexSet::new();
    let mut queue = VecDeque::new();

    let Some(src_pos) = graph.node_position(src) else {
        return reachable;
    };
    marked.set(src_pos, true);
    reachable.insert(src.clone());
    queue.push_back(src.clone());

    while let Some(u) = queue.pop_front() {
        for (v, key) in graph.out_edges(&u) {
            let Some(pos) = graph.node_position(&v) else { continue };
            if marked[pos] {
                continue;
            }
            let Some(attrs) = graph.edge_attrs(key) else { continue };
            let residual = attrs.float(capacity_attr) - attrs.float(flow_attr);
            if residual > EPSILON {
                marked.set(pos, true);
                reachable.insert(v.clone());
                queue.push_back(v);
            }
        }
        for (v, key) in graph.in_edges(&u) {
            let Some(pos) = graph.node_position(&v) else { continue };
            if marked[pos] {
                continue;
            }
            let Some(attrs) = graph.edge_attrs(key) else { continue };
            if attrs.float(flow_attr) > EPSILON {
                marked.set(pos, true);
                reachable.insert(v.clone());
                queue.push_back(v);
            }
        }
    }

    reachable
}

/// The min-cut edge set for the max flow from `s` to `t`. Never mutates
/// `graph`: computes on an internal clone.
pub fn saturated_edges(graph: &StrictMultiDiGraph, s: &NodeId, t: &NodeId) -> Result<Vec<(NodeId, NodeId, EdgeKey)>> {
    let mut working = graph.clone();
    let opts = MaxFlowOpts::default().return_summary(true);
    let result = calc_max_flow(&mut working, s, t, &opts, None)?;
    Ok(result.summary.unwrap_or_default().min_cut)
}

/// For each saturated edge on the `s -> t` cut, clamp its capacity by
/// `change_amount` (never below zero) on an independent clone and
/// report the resulting delta in max flow. Independent clones are
/// explored in parallel, matching the "disjoint working graphs" model
/// the engine allows callers to run concurrently.
pub fn run_sensitivity(
    graph: &StrictMultiDiGraph,
    s: &NodeId,
    t: &NodeId,
    change_amount: Flow,
) -> Result<IndexMap<(NodeId, NodeId, EdgeKey), Flow>> {
    let mut baseline_graph = graph.clone();
    let opts = MaxFlowOpts::default().return_summary(true);
    let baseline = calc_max_flow(&mut baseline_graph, s, t, &opts, None)?;
    let baseline_flow = baseline.flow;
    let edges = baseline.summary.unwrap_or_default().min_cut;

    let deltas: Vec<((NodeId, NodeId, EdgeKey), Flow)> = edges
        .par_iter()
        .map(|&(ref u, ref v, key)| {
            let mut probe = graph.clone();
            if let Some(attrs) = probe.edge_attrs_mut(key) {
                let new_cap = (attrs.float("capacity") + change_amount).max(0.0);
                attrs.set_float("capacity", new_cap);
            }
            let probe_opts = MaxFlowOpts::default();
            let probe_result = calc_max_flow(&mut probe, s, t, &probe_opts, None).map(|r| r.flow).unwrap_or(baseline_flow);
            ((u.clone(), v.clone(), key), probe_result - baseline_flow)
        })
        .collect();

    Ok(deltas.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario_a_graph() -> StrictMultiDiGraph {
        let mut g = StrictMultiDiGraph::new();
        for n in ["A", "B", "C", "D"] {
            g.add_node(n);
        }
        g.add_edge(&"A".into(), &"B".into(), 1.0, 1).unwrap();
        g.add_edge(&"A".into(), &"B".into(), 2.0, 1).unwrap();
        g.add_edge(&"B".into(), &"C".into(), 1.0, 1).unwrap();
        g.add_edge(&"B".into(), &"C".into(), 2.0, 1).unwrap();
        g.add_edge(&"A".into(), &"D".into(), 3.0, 2).unwrap();
        g.add_edge(&"D".into(), &"C".into(), 3.0, 2).unwrap();
        g
    }

    #[test]
    fn scenario_a_iterative_flow_is_six() {
        let mut g = scenario_a_graph();
        let opts = MaxFlowOpts::default().return_summary(true);
        let result = calc_max_flow(&mut g, &"A".into(), &"C".into(), &opts, None).unwrap();
        assert_eq!(result.flow, 6.0);
        let dist = &result.summary.unwrap().cost_distribution;
        assert_eq!(dist.get(&2), Some(&3.0));
        assert_eq!(dist.get(&4), Some(&3.0));
    }

    #[test]
    fn scenario_a_shortest_path_flow_is_three() {
        let mut g = scenario_a_graph();
        let opts = MaxFlowOpts::default().shortest_path(true);
        let result = calc_max_flow(&mut g, &"A".into(), &"C".into(), &opts, None).unwrap();
        assert_eq!(result.flow, 3.0);
    }

    #[test]
    fn scenario_a_shortest_path_equal_balanced_is_two() {
        let mut g = scenario_a_graph();
        let opts = MaxFlowOpts::default().shortest_path(true).flow_placement(FlowPlacement::EqualBalanced);
        let result = calc_max_flow(&mut g, &"A".into(), &"C".into(), &opts, None).unwrap();
        assert_eq!(result.flow, 2.0);
    }

    #[test]
    fn scenario_b_min_cut_needs_reverse_residual() {
        let mut g = StrictMultiDiGraph::new();
        for n in ["S", "A", "B", "T"] {
            g.add_node(n);
        }
        g.add_edge(&"S".into(), &"A".into(), 1.0, 0).unwrap();
        g.add_edge(&"A".into(), &"B".into(), 1.0, 1).unwrap();
        g.add_edge(&"B".into(), &"T".into(), 1.0, 1).unwrap();
        g.add_edge(&"S".into(), &"B".into(), 1.0, 2).unwrap();

        let opts = MaxFlowOpts::default().return_summary(true);
        let result = calc_max_flow(&mut g, &"S".into(), &"T".into(), &opts, None).unwrap();
        assert_eq!(result.flow, 1.0);
        let min_cut = result.summary.unwrap().min_cut;
        assert_eq!(min_cut.len(), 1);
        assert_eq!((min_cut[0].0.as_str(), min_cut[0].1.as_str()), ("B", "T"));
    }

    #[test]
    fn scenario_c_zero_capacity_edge_gives_zero_flow() {
        let mut g = StrictMultiDiGraph::new();
        g.add_node("A");
        g.add_node("B");
        g.add_edge(&"A".into(), &"B".into(), 0.0, 1).unwrap();
        let opts = MaxFlowOpts::default();
        let result = calc_max_flow(&mut g, &"A".into(), &"B".into(), &opts, None).unwrap();
        assert_eq!(result.flow, 0.0);
    }

    #[test]
    fn scenario_d_custom_attribute_names_match_defaults() {
        let mut g_default = scenario_a_graph();
        let mut g_custom = StrictMultiDiGraph::new();
        for n in ["A", "B", "C", "D"] {
            g_custom.add_node(n);
        }
        for (u, v, cap, cost) in [
            ("A", "B", 1.0, 1),
            ("A", "B", 2.0, 1),
            ("B", "C", 1.0, 1),
            ("B", "C", 2.0, 1),
            ("A", "D", 3.0, 2),
            ("D", "C", 3.0, 2),
        ] {
            let key = g_custom.add_edge(&u.to_string(), &v.to_string(), cap, cost).unwrap();
            let attrs = g_custom.edge_attrs_mut(key).unwrap();
            attrs.set_float("cap", cap);
        }

        let default_result = calc_max_flow(&mut g_default, &"A".into(), &"C".into(), &MaxFlowOpts::default(), None).unwrap();
        let custom_opts = MaxFlowOpts::default().capacity_attr("cap").flow_attr("flowX");
        let custom_result = calc_max_flow(&mut g_custom, &"A".into(), &"C".into(), &custom_opts, None).unwrap();
        assert_eq!(default_result.flow, custom_result.flow);
    }

    #[test]
    fn self_loop_is_zero_flow() {
        let mut g = StrictMultiDiGraph::new();
        g.add_node("A");
        let opts = MaxFlowOpts::default();
        let result = calc_max_flow(&mut g, &"A".into(), &"A".into(), &opts, None).unwrap();
        assert_eq!(result.flow, 0.0);
    }

    #[test]
    fn unknown_source_is_an_error() {
        let mut g = StrictMultiDiGraph::new();
        g.add_node("B");
        let opts = MaxFlowOpts::default();
        let err = calc_max_flow(&mut g, &"A".into(), &"B".into(), &opts, None).unwrap_err();
        assert_eq!(err, Error::unknown_node("A"));
    }

    #[test]
    fn sensitivity_clamps_at_zero_capacity() {
        let mut g = StrictMultiDiGraph::new();
        for n in ["S", "A", "T"] {
            g.add_node(n);
        }
        g.add_edge(&"S".into(), &"A".into(), 10.0, 1).unwrap();
        g.add_edge(&"A".into(), &"T".into(), 5.0, 1).unwrap();

        let deltas = run_sensitivity(&g, &"S".into(), &"T".into(), -10.0).unwrap();
        let (_, delta) = deltas.into_iter().find(|((_, v, _), _)| v == "T").unwrap();
        assert_eq!(delta, -5.0);
    }
}
