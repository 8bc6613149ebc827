//! Dijkstra shortest-path kernel (C3) with pluggable edge selection and
//! optional multipath predecessor merging.

use super::edge_select::{EdgeKeys, EdgeSelector};
use super::{NodeId, StrictMultiDiGraph};
use crate::types::Cost;
use indexmap::{IndexMap, IndexSet};
use std::cmp::Reverse;
use std::collections::BinaryHeap;

/// Output of a single-source shortest-path run: settled costs and the
/// predecessor DAG they imply.
#[derive(Debug, Clone, Default)]
pub struct SpfResult {
    /// Settled shortest-path cost from the source to each reached node.
    pub cost: IndexMap<NodeId, Cost>,
    /// `pred[node][prev] = edge_keys` — the edges realizing the
    /// shortest cost from `prev` to `node`. Under `multipath`, a node
    /// may have more than one entry, one per equal-cost predecessor.
    pub pred: IndexMap<NodeId, IndexMap<NodeId, EdgeKeys>>,
}

/// Run Dijkstra from `source`, relaxing edges through `selector`.
///
/// Each node is settled (removed from the heap and expanded) at most
/// once. When `multipath` is true, a neighbor reached again at exactly
/// the settled cost through a different predecessor is merged into
/// `pred` rather than discarded.
#[tracing::instrument(skip(graph, selector), fields(source = ?source))]
pub fn shortest_paths(
    graph: &StrictMultiDiGraph,
    source: &NodeId,
    selector: &EdgeSelector<'_>,
    multipath: bool,
) -> SpfResult {
    let mut result = SpfResult::default();
    let mut settled: IndexSet<NodeId> = IndexSet::new();
    let mut heap: BinaryHeap<Reverse<(Cost, NodeId)>> = BinaryHeap::new();

    result.cost.insert(source.clone(), 0);
    heap.push(Reverse((0, source.clone())));

    while let Some(Reverse((u_cost, u))) = heap.pop() {
        if settled.contains(&u) {
            continue;
        }
        if result.cost.get(&u).copied() != Some(u_cost) {
            continue;
        }
        settled.insert(u.clone());
        tracing::trace!(node = ?u, cost = u_cost, "settled");

        let neighbors: IndexSet<NodeId> = graph
            .out_edges(&u)
            .into_iter()
            .map(|(neighbor, _)| neighbor)
            .collect();

        for v in neighbors {
            if settled.contains(&v) {
                continue;
            }
            let Some((edge_cost, edge_keys)) = selector.select(graph, &u, &v) else {
                continue;
            };
            let candidate = u_cost + edge_cost;

            match result.cost.get(&v).copied() {
                Some(existing) if candidate < existing => {
                    result.cost.insert(v.clone(), candidate);
                    let mut preds: IndexMap<NodeId, EdgeKeys> = IndexMap::new();
                    preds.insert(u.clone(), edge_keys);
                    result.pred.insert(v.clone(), preds);
                    heap.push(Reverse((candidate, v)));
                }
                Some(existing) if multipath && candidate == existing => {
                    result
                        .pred
                        .entry(v.clone())
                        .or_default()
                        .insert(u.clone(), edge_keys);
                }
                Some(_) => {}
                None => {
                    result.cost.insert(v.clone(), candidate);
                    let mut preds: IndexMap<NodeId, EdgeKeys> = IndexMap::new();
                    preds.insert(u.clone(), edge_keys);
                    result.pred.insert(v.clone(), preds);
                    heap.push(Reverse((candidate, v)));
                }
            }
        }
    }

    result
}

/// Convenience for `find whether `dst` is reachable and at what cost`.
pub fn cost_to(result: &SpfResult, dst: &NodeId) -> Option<Cost> {
    result.cost.get(dst).copied()
}
