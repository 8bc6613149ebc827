//! Residual capacity and flow-fraction computation over a predecessor
//! DAG (C5). Both flow-placement disciplines are derived from the same
//! per-node bookkeeping pass rather than implemented as separate
//! algorithms.

use super::path_bundle::PathBundle;
use super::{EdgeKey, NodeId, StrictMultiDiGraph};
use crate::types::Flow;
use indexmap::IndexMap;

/// Per-node bottleneck bookkeeping produced while walking a predecessor
/// DAG from destination back to source.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct NodeCapacity {
    /// Maximum flow this node can forward under the proportional
    /// discipline, considering every downstream bottleneck.
    pub max_total_flow: Flow,
    /// Maximum flow forwardable over a single best edge-tuple.
    pub max_single_flow: Flow,
    /// Maximum flow forwardable under the equal-balanced discipline.
    pub max_balanced_flow: Flow,
    /// Share of one unit of source flow arriving here under the
    /// proportional discipline.
    pub flow_fraction_total: Flow,
    /// Share of one unit of source flow arriving here under the
    /// equal-balanced discipline.
    pub flow_fraction_balanced: Flow,
}

impl NodeCapacity {
    fn terminal() -> Self {
        Self {
            max_total_flow: Flow::INFINITY,
            max_single_flow: Flow::INFINITY,
            max_balanced_flow: Flow::INFINITY,
            flow_fraction_total: 0.0,
            flow_fraction_balanced: 0.0,
        }
    }
}

/// Scalar max-flow figures derived from the same residual walk, one per
/// flow-placement discipline (plus the theoretical single-path bound).
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct MaxFlow {
    /// Bound under the proportional discipline.
    pub total: Flow,
    /// Bound if all flow used a single best edge-tuple end to end.
    pub single: Flow,
    /// Bound under the equal-balanced discipline.
    pub balanced: Flow,
}

/// Public result of a residual-capacity computation.
#[derive(Debug, Clone, Default)]
pub struct ResidualCapacity {
    /// Per-node bottleneck bookkeeping, keyed by node id.
    pub nodes: IndexMap<NodeId, NodeCapacity>,
    /// The three scalar max-flow figures.
    pub max_flow: MaxFlow,
}

#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct TupleStat {
    pub total: Flow,
    pub single: Flow,
    pub balanced: Flow,
    pub edge_count: usize,
}

/// Internal, richer result that placement reuses to avoid recomputing
/// the residual walk: forward adjacency plus the per-tuple stats that
/// back each [`NodeCapacity`] entry.
pub(crate) struct ResidualWalk {
    pub nodes: IndexMap<NodeId, NodeCapacity>,
    pub max_flow: MaxFlow,
    /// `succ[node] = [(next_node, edge_keys, tuple_stat), ...]`.
    pub succ: IndexMap<NodeId, Vec<(NodeId, super::edge_select::EdgeKeys, TupleStat)>>,
    /// Nodes in an order where every node appears after all of its
    /// successors (i.e. reverse topological order, dst-first).
    pub backward_order: Vec<NodeId>,
}

/// Compute residual capacities and flow fractions over `bundle`.
pub fn compute_residual_capacity(
    graph: &StrictMultiDiGraph,
    bundle: &PathBundle,
    capacity_attr: &str,
    flow_attr: &str,
) -> ResidualCapacity {
    let walk = residual_walk(graph, bundle, capacity_attr, flow_attr);
    ResidualCapacity { nodes: walk.nodes, max_flow: walk.max_flow }
}

pub(crate) fn residual_walk(
    graph: &StrictMultiDiGraph,
    bundle: &PathBundle,
    capacity_attr: &str,
    flow_attr: &str,
) -> ResidualWalk {
    if bundle.is_empty() {
        return ResidualWalk {
            nodes: IndexMap::new(),
            max_flow: MaxFlow::default(),
            succ: IndexMap::new(),
            backward_order: Vec::new(),
        };
    }

    // Invert pred (keyed by successor) into succ (keyed by predecessor),
    // preserving pred's insertion order so traversal stays deterministic.
    let mut succ: IndexMap<NodeId, Vec<(NodeId, super::edge_select::EdgeKeys, TupleStat)>> = IndexMap::new();
    for (node, preds) in &bundle.pred {
        for (prev, keys) in preds {
            let residuals: Vec<Flow> = keys
                .iter()
                .filter_map(|&k| {
                    let a = graph.edge_attrs(k)?;
                    Some((a.float(capacity_attr) - a.float(flow_attr)).max(0.0))
                })
                .collect();
            let total: Flow = residuals.iter().sum();
            let single: Flow = residuals.iter().cloned().fold(0.0, Flow::max);
            let min_residual = residuals.iter().cloned().fold(Flow::INFINITY, Flow::min);
            let balanced = if residuals.is_empty() { 0.0 } else { min_residual * residuals.len() as Flow };
            let stat = TupleStat { total, single, balanced, edge_count: keys.len() };
            succ.entry(prev.clone()).or_default().push((node.clone(), keys.clone(), stat));
        }
    }

    // Reverse-topological order (dst first, src last): a plain DFS
    // postorder over succ starting at src visits every child before its
    // parent, which is exactly the order each node's downstream bottleneck
    // must already be finalized in.
    let mut backward_order = Vec::new();
    let mut visited = indexmap::IndexSet::new();
    postorder(&succ, bundle.src.clone(), &mut visited, &mut backward_order);

    let mut nodes: IndexMap<NodeId, NodeCapacity> = IndexMap::new();
    nodes.insert(bundle.dst.clone(), NodeCapacity::terminal());

    for node in &backward_order {
        if *node == bundle.dst {
            continue;
        }
        let Some(tuples) = succ.get(node) else {
            nodes.insert(node.clone(), NodeCapacity::default());
            continue;
        };

        let mut total_flow = 0.0;
        let mut single_flow: Flow = 0.0;
        let mut balanced_terms: Vec<(Flow, usize)> = Vec::new();
        let mut total_edges = 0usize;

        for (next, _, stat) in tuples {
            let downstream = nodes.get(next).copied().unwrap_or_default();
            let c_total = stat.total.min(downstream.max_total_flow);
            let c_single = stat.single.min(downstream.max_single_flow);
            let c_balanced = stat.balanced.min(downstream.max_balanced_flow);

            total_flow += c_total;
            single_flow = single_flow.max(c_single);
            if stat.edge_count > 0 {
                balanced_terms.push((c_balanced / stat.edge_count as Flow, stat.edge_count));
            }
            total_edges += stat.edge_count;
        }

        let balanced_flow = if balanced_terms.is_empty() {
            0.0
        } else {
            let min_per_edge = balanced_terms.iter().map(|(v, _)| *v).fold(Flow::INFINITY, Flow::min);
            min_per_edge * total_edges as Flow
        };

        nodes.insert(
            node.clone(),
            NodeCapacity {
                max_total_flow: total_flow,
                max_single_flow: single_flow,
                max_balanced_flow: balanced_flow,
                flow_fraction_total: 0.0,
                flow_fraction_balanced: 0.0,
            },
        );
    }

    // Forward pass: push one unit of flow from src, splitting it under
    // both disciplines at every node, in topological order (src first).
    let forward_order: Vec<NodeId> = backward_order.iter().rev().cloned().collect();
    if let Some(src_cap) = nodes.get_mut(&bundle.src) {
        src_cap.flow_fraction_total = 1.0;
        src_cap.flow_fraction_balanced = 1.0;
    }

    for node in &forward_order {
        let (frac_total, frac_balanced) = nodes.get(node).map_or((0.0, 0.0), |c| (c.flow_fraction_total, c.flow_fraction_balanced));
        let node_total = nodes.get(node).map_or(0.0, |c| c.max_total_flow);
        let Some(tuples) = succ.get(node) else { continue };
        let total_edges: usize = tuples.iter().map(|(_, _, s)| s.edge_count).sum();

        for (next, _, stat) in tuples {
            let downstream = nodes.get(next).copied().unwrap_or_default();
            let c_total = stat.total.min(downstream.max_total_flow);

            let total_contrib = if node_total > 0.0 { frac_total * (c_total / node_total) } else { 0.0 };
            let balanced_contrib = if total_edges > 0 {
                frac_balanced * (stat.edge_count as Flow / total_edges as Flow)
            } else {
                0.0
            };

            if let Some(next_cap) = nodes.get_mut(next) {
                next_cap.flow_fraction_total += total_contrib;
                next_cap.flow_fraction_balanced += balanced_contrib;
            }
        }
    }

    let src_cap = nodes.get(&bundle.src).copied().unwrap_or_default();
    let balanced_bound = nodes
        .values()
        .filter(|c| c.flow_fraction_balanced > 0.0)
        .map(|c| c.max_balanced_flow / c.flow_fraction_balanced)
        .fold(Flow::INFINITY, Flow::min);

    let max_flow = MaxFlow {
        total: src_cap.max_total_flow,
        single: src_cap.max_single_flow,
        balanced: if balanced_bound.is_finite() { balanced_bound } else { 0.0 },
    };

    ResidualWalk { nodes, max_flow, succ, backward_order }
}

fn postorder(
    succ: &IndexMap<NodeId, Vec<(NodeId, super::edge_select::EdgeKeys, TupleStat)>>,
    node: NodeId,
    visited: &mut indexmap::IndexSet<NodeId>,
    out: &mut Vec<NodeId>,
) {
    if !visited.insert(node.clone()) {
        return;
    }
    if let Some(children) = succ.get(&node) {
        for (next, _, _) in children {
            postorder(succ, next.clone(), visited, out);
        }
    }
    out.push(node);
}

/// A single saturated-edge candidate identified by its endpoints and key.
pub type EdgeRef = (NodeId, NodeId, EdgeKey);
