//! Graph algorithms — the capacitated multigraph kernel (C1) and the
//! shortest-path / max-flow machinery built on top of it (C2–C7).
//!
//! ## Graph Representation
//!
//! [`StrictMultiDiGraph`] wraps [`petgraph`]'s `StableDiGraph`: node and
//! edge indices stay stable across removals, which is exactly the
//! "stable integer edge key" the flow engine's bookkeeping relies on.
//! Parallel edges between the same pair of nodes are first-class — the
//! engine never collapses them before [`edge_select`] picks which ones
//! are admissible for a given search.
//!
//! ## Example: Max Flow
//!
//! ```rust
//! use netgraph_flow::graph::{StrictMultiDiGraph, max_flow::{calc_max_flow, MaxFlowOpts}};
//!
//! let mut g = StrictMultiDiGraph::new();
//! g.add_node("A");
//! g.add_node("B");
//! g.add_edge(&"A".into(), &"B".into(), 10.0, 1).unwrap();
//!
//! let result = calc_max_flow(&mut g, &"A".into(), &"B".into(), &MaxFlowOpts::default(), None).unwrap();
//! assert_eq!(result.flow, 10.0);
//! ```

pub mod capacity;
pub mod edge_select;
pub mod max_flow;
pub mod path_bundle;
pub mod placement;
pub mod spf;

pub use edge_select::{EdgeSelect, EdgeSelector};
pub use path_bundle::PathBundle;

use crate::policy::FlowIndex;
use crate::types::Flow;
use crate::{Cost, Error, Result};
use indexmap::IndexMap;
use petgraph::stable_graph::StableDiGraph;
use petgraph::visit::EdgeRef;
use petgraph::{Directed, Direction};
use std::collections::HashMap;

/// External, user-chosen node identifier.
pub type NodeId = String;

/// Process-unique, monotonically increasing edge key. Never reused, even
/// after the edge it named is removed.
pub type EdgeKey = u64;

type PetNodeIndex = petgraph::stable_graph::NodeIndex<u32>;
type PetEdgeIndex = petgraph::stable_graph::EdgeIndex<u32>;

/// A typed value in an edge's or node's generic attribute bag, mirroring
/// the attribute dictionaries of the network model this engine serves.
#[derive(Debug, Clone, PartialEq)]
pub enum AttrValue {
    /// A scalar floating point attribute (capacity, flow, or user data).
    Float(Flow),
    /// A per-flow contribution map, e.g. the `flows` attribute.
    Flows(IndexMap<FlowIndex, Flow>),
}

impl AttrValue {
    fn as_float(&self) -> Flow {
        match self {
            AttrValue::Float(v) => *v,
            AttrValue::Flows(_) => 0.0,
        }
    }
}

/// Per-edge attribute bag: a fixed `cost` (the SPF weight, never
/// renamed) plus a generic, string-keyed bag that holds `capacity`,
/// `flow`, and `flows` under whatever attribute names the caller chose,
/// alongside any additional metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct EdgeAttrs {
    /// Stable key identifying this edge within the graph.
    pub key: EdgeKey,
    /// Dijkstra edge weight. Not subject to custom naming.
    pub cost: Cost,
    attrs: IndexMap<String, AttrValue>,
}

impl EdgeAttrs {
    fn new(key: EdgeKey, capacity: Flow, cost: Cost) -> Self {
        let mut attrs = IndexMap::new();
        attrs.insert("capacity".to_string(), AttrValue::Float(capacity));
        attrs.insert("flow".to_string(), AttrValue::Float(0.0));
        attrs.insert("flows".to_string(), AttrValue::Flows(IndexMap::new()));
        Self { key, cost, attrs }
    }

    /// Read a float-valued attribute by name; attributes that don't
    /// exist, or that hold a non-float value, read as `0.0`.
    pub fn float(&self, name: &str) -> Flow {
        self.attrs.get(name).map_or(0.0, AttrValue::as_float)
    }

    /// Overwrite a float-valued attribute by name.
    pub fn set_float(&mut self, name: &str, value: Flow) {
        self.attrs.insert(name.to_string(), AttrValue::Float(value));
    }

    /// Read the per-flow contribution map under `name`.
    pub fn flows(&self, name: &str) -> Option<&IndexMap<FlowIndex, Flow>> {
        match self.attrs.get(name) {
            Some(AttrValue::Flows(m)) => Some(m),
            _ => None,
        }
    }

    /// Mutably access the per-flow contribution map under `name`,
    /// creating an empty one if absent.
    pub fn flows_mut(&mut self, name: &str) -> &mut IndexMap<FlowIndex, Flow> {
        match self
            .attrs
            .entry(name.to_string())
            .or_insert_with(|| AttrValue::Flows(IndexMap::new()))
        {
            AttrValue::Flows(m) => m,
            other => {
                *other = AttrValue::Flows(IndexMap::new());
                match other {
                    AttrValue::Flows(m) => m,
                    AttrValue::Float(_) => unreachable!(),
                }
            }
        }
    }

    /// Set an arbitrary extra attribute, beyond capacity/flow/flows.
    pub fn set_attr(&mut self, name: impl Into<String>, value: AttrValue) {
        self.attrs.insert(name.into(), value);
    }
}

/// Directed multigraph with per-edge capacity/cost/flow attributes and
/// stable edge keys, built atop a [`petgraph::stable_graph::StableDiGraph`].
#[derive(Debug, Clone, Default)]
pub struct StrictMultiDiGraph {
    inner: StableDiGraph<NodeId, EdgeAttrs, Directed, u32>,
    node_index: IndexMap<NodeId, PetNodeIndex>,
    edge_index: IndexMap<EdgeKey, PetEdgeIndex>,
    next_edge_key: EdgeKey,
}

impl StrictMultiDiGraph {
    /// Create an empty graph.
    pub fn new() -> Self {
        Self::default()
    }

    /// Idempotently add a node. Re-adding an existing id is a no-op.
    pub fn add_node(&mut self, id: impl Into<NodeId>) -> NodeId {
        let id = id.into();
        if !self.node_index.contains_key(&id) {
            let idx = self.inner.add_node(id.clone());
            self.node_index.insert(id.clone(), idx);
        }
        id
    }

    /// Whether `id` names a node currently in the graph.
    pub fn has_node(&self, id: &NodeId) -> bool {
        self.node_index.contains_key(id)
    }

    /// Iterate node ids in insertion order.
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.node_index.keys()
    }

    /// Number of nodes.
    pub fn node_count(&self) -> usize {
        self.node_index.len()
    }

    /// Number of edges.
    pub fn edge_count(&self) -> usize {
        self.edge_index.len()
    }

    fn node_idx(&self, id: &NodeId) -> Option<PetNodeIndex> {
        self.node_index.get(id).copied()
    }

    /// Dense 0-based position of `id` among the graph's current nodes, in
    /// insertion order. Used to index bitset-backed per-node markers.
    pub(crate) fn node_position(&self, id: &NodeId) -> Option<usize> {
        self.node_index.get_index_of(id)
    }

    /// Add a directed edge `u -> v` with the given capacity and cost.
    /// Both endpoints must already exist.
    pub fn add_edge(&mut self, u: &NodeId, v: &NodeId, capacity: Flow, cost: Cost) -> Result<EdgeKey> {
        let ui = self.node_idx(u).ok_or_else(|| Error::unknown_endpoint(u))?;
        let vi = self.node_idx(v).ok_or_else(|| Error::unknown_endpoint(v))?;
        let key = self.next_edge_key;
        self.next_edge_key += 1;
        let attrs = EdgeAttrs::new(key, capacity, cost);
        let pidx = self.inner.add_edge(ui, vi, attrs);
        self.edge_index.insert(key, pidx);
        Ok(key)
    }

    /// Remove a single edge by key, or every `(u, v)` edge if `key` is
    /// `None`. Silently does nothing if the edge or endpoints are absent.
    pub fn remove_edge(&mut self, u: &NodeId, v: &NodeId, key: Option<EdgeKey>) {
        match key {
            Some(k) => {
                if let Some((eu, ev)) = self.edge_endpoints(k) {
                    if &eu == u && &ev == v {
                        if let Some(pidx) = self.edge_index.shift_remove(&k) {
                            self.inner.remove_edge(pidx);
                        }
                    }
                }
            }
            None => {
                let keys = self.edges_between(u, v);
                for k in keys {
                    self.remove_edge(u, v, Some(k));
                }
            }
        }
    }

    /// Remove a node and every edge touching it. No-op if absent.
    pub fn remove_node(&mut self, id: &NodeId) {
        let Some(idx) = self.node_idx(id) else { return };
        let touching: Vec<EdgeKey> = self
            .inner
            .edges_directed(idx, Direction::Outgoing)
            .chain(self.inner.edges_directed(idx, Direction::Incoming))
            .map(|e| e.weight().key)
            .collect();
        for k in touching {
            self.edge_index.shift_remove(&k);
        }
        self.inner.remove_node(idx);
        self.node_index.shift_remove(id);
    }

    /// Deep clone of this graph, including all edge attribute maps.
    pub fn copy(&self) -> Self {
        self.clone()
    }

    /// Outgoing `(neighbor, edge_key)` pairs from `u`, one per edge.
    pub fn out_edges(&self, u: &NodeId) -> Vec<(NodeId, EdgeKey)> {
        let Some(idx) = self.node_idx(u) else { return Vec::new() };
        self.inner
            .edges_directed(idx, Direction::Outgoing)
            .map(|e| (self.inner[e.target()].clone(), e.weight().key))
            .collect()
    }

    /// Incoming `(neighbor, edge_key)` pairs into `v`, one per edge.
    pub fn in_edges(&self, v: &NodeId) -> Vec<(NodeId, EdgeKey)> {
        let Some(idx) = self.node_idx(v) else { return Vec::new() };
        self.inner
            .edges_directed(idx, Direction::Incoming)
            .map(|e| (self.inner[e.source()].clone(), e.weight().key))
            .collect()
    }

    /// All parallel edge keys directed `u -> v`.
    pub fn edges_between(&self, u: &NodeId, v: &NodeId) -> Vec<EdgeKey> {
        let (Some(ui), Some(vi)) = (self.node_idx(u), self.node_idx(v)) else {
            return Vec::new();
        };
        self.inner
            .edges_directed(ui, Direction::Outgoing)
            .filter(|e| e.target() == vi)
            .map(|e| e.weight().key)
            .collect()
    }

    /// Every edge key currently in the graph, in insertion order.
    pub fn all_edge_keys(&self) -> Vec<EdgeKey> {
        self.edge_index.keys().copied().collect()
    }

    /// Attributes of edge `key`, if it still exists.
    pub fn edge_attrs(&self, key: EdgeKey) -> Option<&EdgeAttrs> {
        let pidx = self.edge_index.get(&key)?;
        self.inner.edge_weight(*pidx)
    }

    /// Mutable attributes of edge `key`, if it still exists.
    pub fn edge_attrs_mut(&mut self, key: EdgeKey) -> Option<&mut EdgeAttrs> {
        let pidx = *self.edge_index.get(&key)?;
        self.inner.edge_weight_mut(pidx)
    }

    /// `(u, v)` endpoints of edge `key`, if it still exists.
    pub fn edge_endpoints(&self, key: EdgeKey) -> Option<(NodeId, NodeId)> {
        let pidx = *self.edge_index.get(&key)?;
        let (ui, vi) = self.inner.edge_endpoints(pidx)?;
        Some((self.inner[ui].clone(), self.inner[vi].clone()))
    }

    /// Zero the `flow`/`flows` attributes on every edge in place.
    pub fn reset_flow_state(&mut self, flow_attr: &str, flows_attr: &str) {
        let keys = self.all_edge_keys();
        for k in keys {
            if let Some(a) = self.edge_attrs_mut(k) {
                a.set_float(flow_attr, 0.0);
                *a.flows_mut(flows_attr) = IndexMap::new();
            }
        }
    }

    /// Residual (`capacity - flow`, clamped at zero) of every edge,
    /// indexed by edge key. Used by reachability/min-cut computation.
    pub fn residual_by_key(&self, capacity_attr: &str, flow_attr: &str) -> HashMap<EdgeKey, Flow> {
        self.edge_index
            .keys()
            .filter_map(|&k| {
                let a = self.edge_attrs(k)?;
                Some((k, (a.float(capacity_attr) - a.float(flow_attr)).max(0.0)))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn add_node_is_idempotent() {
        let mut g = StrictMultiDiGraph::new();
        g.add_node("A");
        g.add_node("A");
        assert_eq!(g.node_count(), 1);
    }

    #[test]
    fn add_edge_requires_known_endpoints() {
        let mut g = StrictMultiDiGraph::new();
        g.add_node("A");
        let err = g.add_edge(&"A".into(), &"B".into(), 1.0, 0).unwrap_err();
        assert_eq!(err, Error::unknown_endpoint("B"));
    }

    #[test]
    fn parallel_edges_are_distinct() {
        let mut g = StrictMultiDiGraph::new();
        g.add_node("A");
        g.add_node("B");
        let k1 = g.add_edge(&"A".into(), &"B".into(), 1.0, 1).unwrap();
        let k2 = g.add_edge(&"A".into(), &"B".into(), 2.0, 1).unwrap();
        assert_ne!(k1, k2);
        assert_eq!(g.edges_between(&"A".into(), &"B".into()).len(), 2);
    }

    #[test]
    fn edge_keys_never_reused() {
        let mut g = StrictMultiDiGraph::new();
        g.add_node("A");
        g.add_node("B");
        let k1 = g.add_edge(&"A".into(), &"B".into(), 1.0, 0).unwrap();
        g.remove_edge(&"A".into(), &"B".into(), Some(k1));
        let k2 = g.add_edge(&"A".into(), &"B".into(), 1.0, 0).unwrap();
        assert_ne!(k1, k2);
    }

    #[test]
    fn remove_node_drops_incident_edges() {
        let mut g = StrictMultiDiGraph::new();
        g.add_node("A");
        g.add_node("B");
        g.add_edge(&"A".into(), &"B".into(), 1.0, 0).unwrap();
        g.remove_node(&"A".into());
        assert_eq!(g.edge_count(), 0);
        assert!(!g.has_node(&"A".into()));
    }

    #[test]
    fn custom_attribute_names_round_trip() {
        let mut g = StrictMultiDiGraph::new();
        g.add_node("A");
        g.add_node("B");
        let k = g.add_edge(&"A".into(), &"B".into(), 5.0, 1).unwrap();
        let a = g.edge_attrs_mut(k).unwrap();
        a.set_float("cap", 9.0);
        assert_eq!(g.edge_attrs(k).unwrap().float("cap"), 9.0);
        assert_eq!(g.edge_attrs(k).unwrap().float("capacity"), 5.0);
    }
}
