//! Writes flow onto (or removes it from) a graph along a predecessor
//! DAG, under one of the two placement disciplines (C6).

use super::capacity::residual_walk;
use super::path_bundle::PathBundle;
use super::{EdgeKey, NodeId, StrictMultiDiGraph};
use crate::policy::FlowIndex;
use crate::types::{round_flow, Flow, MIN_FLOW};
use indexmap::IndexSet;

/// How placed flow is split across parallel/branching edges.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPlacement {
    /// Split capacity-proportionally: each edge gets a share
    /// proportional to its own residual capacity.
    Proportional,
    /// Split evenly across every edge used at a node, regardless of
    /// residual capacity.
    EqualBalanced,
}

/// Outcome of a single placement call.
#[derive(Debug, Clone, Default)]
pub struct FlowPlacementMeta {
    /// Volume actually placed.
    pub placed: Flow,
    /// Volume that could not be placed (`requested - placed`).
    pub remaining: Flow,
    /// Nodes whose outgoing edges received flow.
    pub touched_nodes: IndexSet<NodeId>,
    /// Edges that received a nonzero flow delta.
    pub touched_edges: IndexSet<EdgeKey>,
}

/// Place up to `volume` units of flow for `flow_index` along `bundle`,
/// under `placement`. Returns how much was actually placed; mutates
/// nothing if the placeable amount rounds to zero.
pub fn place_flow_on_graph(
    graph: &mut StrictMultiDiGraph,
    bundle: &PathBundle,
    volume: Flow,
    flow_index: FlowIndex,
    placement: FlowPlacement,
    capacity_attr: &str,
    flow_attr: &str,
    flows_attr: &str,
) -> FlowPlacementMeta {
    if bundle.is_empty() {
        return FlowPlacementMeta { placed: 0.0, remaining: volume, ..Default::default() };
    }

    let walk = residual_walk(graph, bundle, capacity_attr, flow_attr);
    let max_flow = match placement {
        FlowPlacement::Proportional => walk.max_flow.total,
        FlowPlacement::EqualBalanced => walk.max_flow.balanced,
    };

    let placed = round_flow(max_flow.min(volume));
    if placed <= MIN_FLOW {
        return FlowPlacementMeta { placed: 0.0, remaining: volume, ..Default::default() };
    }

    let mut touched_nodes = IndexSet::new();
    let mut touched_edges = IndexSet::new();

    for node in &walk.backward_order {
        let Some(tuples) = walk.succ.get(node) else { continue };
        let node_cap = walk.nodes.get(node).copied().unwrap_or_default();
        let amount = match placement {
            FlowPlacement::Proportional => node_cap.flow_fraction_total * placed,
            FlowPlacement::EqualBalanced => node_cap.flow_fraction_balanced * placed,
        };
        if amount <= 0.0 {
            continue;
        }

        let all_edges: Vec<EdgeKey> = tuples.iter().flat_map(|(_, keys, _)| keys.iter().copied()).collect();
        if all_edges.is_empty() {
            continue;
        }

        match placement {
            FlowPlacement::Proportional => {
                let residuals: Vec<(EdgeKey, Flow)> = all_edges
                    .iter()
                    .filter_map(|&k| {
                        let a = graph.edge_attrs(k)?;
                        Some((k, (a.float(capacity_attr) - a.float(flow_attr)).max(0.0)))
                    })
                    .collect();
                let total_residual: Flow = residuals.iter().map(|(_, r)| *r).sum();
                if total_residual <= 0.0 {
                    continue;
                }
                for (k, residual) in residuals {
                    let delta = round_flow(amount * (residual / total_residual));
                    apply_delta(graph, k, delta, &flow_index, flow_attr, flows_attr, &mut touched_edges);
                }
            }
            FlowPlacement::EqualBalanced => {
                let n = all_edges.len() as Flow;
                let delta = round_flow(amount / n);
                for k in all_edges {
                    apply_delta(graph, k, delta, &flow_index, flow_attr, flows_attr, &mut touched_edges);
                }
            }
        }
        touched_nodes.insert(node.clone());
    }

    FlowPlacementMeta { placed, remaining: round_flow((volume - placed).max(0.0)), touched_nodes, touched_edges }
}

fn apply_delta(
    graph: &mut StrictMultiDiGraph,
    key: EdgeKey,
    delta: Flow,
    flow_index: &FlowIndex,
    flow_attr: &str,
    flows_attr: &str,
    touched_edges: &mut IndexSet<EdgeKey>,
) {
    if delta <= 0.0 {
        return;
    }
    let Some(attrs) = graph.edge_attrs_mut(key) else { return };
    let new_flow = round_flow(attrs.float(flow_attr) + delta);
    attrs.set_float(flow_attr, new_flow);
    let flows = attrs.flows_mut(flows_attr);
    let existing = flows.get(flow_index).copied().unwrap_or(0.0);
    let new_contrib = round_flow(existing + delta);
    if new_contrib > 0.0 {
        flows.insert(flow_index.clone(), new_contrib);
    }
    touched_edges.insert(key);
}

/// Undo every contribution `flow_index` made anywhere in `graph`,
/// restoring the `Σ flows == flow` invariant exactly.
pub fn remove_flow_from_graph(graph: &mut StrictMultiDiGraph, flow_index: &FlowIndex, flow_attr: &str, flows_attr: &str) {
    for key in graph.all_edge_keys() {
        let Some(attrs) = graph.edge_attrs_mut(key) else { continue };
        let Some(contribution) = attrs.flows(flows_attr).and_then(|m| m.get(flow_index).copied()) else { continue };
        let new_flow = round_flow(attrs.float(flow_attr) - contribution);
        attrs.set_float(flow_attr, new_flow.max(0.0));
        attrs.flows_mut(flows_attr).shift_remove(flow_index);
    }
}
