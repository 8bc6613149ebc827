//! Flow policy (C8): creates, places, reoptimizes, and removes named
//! Flows realizing a demand, subject to flow-count and path-cost bounds.

use crate::graph::capacity::compute_residual_capacity;
use crate::graph::edge_select::{EdgeSelect, EdgeSelector};
use crate::graph::placement::{place_flow_on_graph, remove_flow_from_graph, FlowPlacement};
use crate::graph::spf::shortest_paths;
use crate::graph::path_bundle::PathBundle;
use crate::graph::{NodeId, StrictMultiDiGraph};
use crate::types::Flow as Volume;
use crate::types::{round_flow, Cost, MIN_FLOW};
use crate::{Error, Result};
use indexmap::IndexMap;
use std::collections::HashSet;

const WATCHDOG_LIMIT: usize = 10_000;

/// Unique key identifying one flow's contribution within a process: a
/// 4-tuple of endpoints, an opaque class label, and a per-policy
/// monotonic id.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct FlowIndex {
    /// Flow source.
    pub src: NodeId,
    /// Flow destination.
    pub dst: NodeId,
    /// Opaque, caller-chosen classification label.
    pub flow_class: String,
    /// Monotonic id scoped to the owning [`FlowPolicy`].
    pub flow_id: u64,
}

impl FlowIndex {
    /// Build a new flow index.
    pub fn new(src: NodeId, dst: NodeId, flow_class: String, flow_id: u64) -> Self {
        Self { src, dst, flow_class, flow_id }
    }
}

/// A single placed (or partially placed) flow: its path bundle, the
/// exclusions it was searched under, and how much volume it currently
/// carries. Owns no graph storage; all graph mutation happens through
/// [`crate::graph::placement`].
#[derive(Debug, Clone)]
pub struct Flow {
    /// Identity of this flow within its owning policy.
    pub flow_index: FlowIndex,
    /// The predecessor DAG this flow is currently placed along.
    pub path_bundle: PathBundle,
    /// Edges excluded from this flow's path search.
    pub excluded_edges: HashSet<crate::graph::EdgeKey>,
    /// Nodes excluded from this flow's path search.
    pub excluded_nodes: HashSet<NodeId>,
    /// Volume currently placed on the graph for this flow.
    pub placed_flow: Volume,
}

/// Path-finding algorithm a [`FlowPolicy`] uses. Only SPF is implemented;
/// the variant exists so a caller's explicit `PathAlg::Spf` reads the
/// same way the policy's other enums do.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathAlg {
    /// Dijkstra-based shortest-path-first kernel.
    Spf,
}

/// One of the five required configuration presets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowPolicyConfig {
    /// SPF, EQUAL_BALANCED, ALL_MIN_COST, multipath, `max_flow_count = 1`.
    ShortestPathsEcmp,
    /// SPF, PROPORTIONAL, ALL_MIN_COST, multipath, `max_flow_count = 1`.
    ShortestPathsUcmp,
    /// SPF, PROPORTIONAL, ALL_MIN_COST_WITH_CAP_REMAINING, single-path.
    TeUcmpUnlimited,
    /// SPF, EQUAL_BALANCED, ALL_MIN_COST_WITH_CAP_REMAINING, single-path,
    /// `max_flow_count = 256`.
    TeEcmpUpTo256Lsp,
    /// Same as [`Self::TeEcmpUpTo256Lsp`] with `min_flow_count = max_flow_count = 16`.
    TeEcmp16Lsp,
}

/// Builder for a [`FlowPolicy`], used directly by [`FlowPolicyConfig`]'s
/// presets and available for fully custom configurations.
#[derive(Debug, Clone)]
pub struct FlowPolicyBuilder {
    path_alg: PathAlg,
    flow_placement: FlowPlacement,
    edge_select: EdgeSelect,
    multipath: bool,
    min_flow_count: usize,
    max_flow_count: Option<usize>,
    max_path_cost: Option<Cost>,
    max_path_cost_factor: Option<f64>,
    static_paths: Option<Vec<PathBundle>>,
}

impl Default for FlowPolicyBuilder {
    fn default() -> Self {
        Self {
            path_alg: PathAlg::Spf,
            flow_placement: FlowPlacement::Proportional,
            edge_select: EdgeSelect::AllMinCost,
            multipath: true,
            min_flow_count: 1,
            max_flow_count: None,
            max_path_cost: None,
            max_path_cost_factor: None,
            static_paths: None,
        }
    }
}

impl FlowPolicyBuilder {
    /// Start building from an empty, SPF/PROPORTIONAL default.
    pub fn new() -> Self {
        Self::default()
    }
    /// Set the flow-placement discipline.
    pub fn flow_placement(mut self, v: FlowPlacement) -> Self {
        self.flow_placement = v;
        self
    }
    /// Set the edge-selection policy.
    pub fn edge_select(mut self, v: EdgeSelect) -> Self {
        self.edge_select = v;
        self
    }
    /// Allow SPF to merge equal-cost predecessors (ECMP-style fan-out).
    pub fn multipath(mut self, v: bool) -> Self {
        self.multipath = v;
        self
    }
    /// Minimum number of flows to create on first fill.
    pub fn min_flow_count(mut self, v: usize) -> Self {
        self.min_flow_count = v;
        self
    }
    /// Upper bound on the number of flows this policy may create.
    pub fn max_flow_count(mut self, v: usize) -> Self {
        self.max_flow_count = Some(v);
        self
    }
    /// Absolute cap on an admissible path's cost.
    pub fn max_path_cost(mut self, v: Cost) -> Self {
        self.max_path_cost = Some(v);
        self
    }
    /// Cap an admissible path's cost at `factor * best_path_cost`.
    pub fn max_path_cost_factor(mut self, v: f64) -> Self {
        self.max_path_cost_factor = Some(v);
        self
    }
    /// Pin this policy to a fixed set of path bundles instead of
    /// searching for new ones.
    pub fn static_paths(mut self, v: Vec<PathBundle>) -> Self {
        self.static_paths = Some(v);
        self
    }

    /// Validate and build the policy.
    pub fn build(self) -> Result<FlowPolicy> {
        if self.flow_placement == FlowPlacement::EqualBalanced && self.max_flow_count.is_none() {
            return Err(Error::invalid_config("EQUAL_BALANCED requires a set max_flow_count"));
        }
        if let (Some(paths), Some(max)) = (&self.static_paths, self.max_flow_count) {
            if paths.len() != max {
                return Err(Error::invalid_config("static path count disagrees with max_flow_count"));
            }
        }
        if let Some(max) = self.max_flow_count {
            if max < self.min_flow_count {
                return Err(Error::invalid_config("max_flow_count must be >= min_flow_count"));
            }
        }
        Ok(FlowPolicy {
            path_alg: self.path_alg,
            flow_placement: self.flow_placement,
            edge_select: self.edge_select,
            multipath: self.multipath,
            min_flow_count: self.min_flow_count,
            max_flow_count: self.max_flow_count,
            max_path_cost: self.max_path_cost,
            max_path_cost_factor: self.max_path_cost_factor,
            static_paths: self.static_paths,
            flows: IndexMap::new(),
            best_path_cost: None,
            next_flow_id: 0,
        })
    }
}

/// Creates, places, reoptimizes, and removes named [`Flow`]s realizing a
/// demand, subject to flow-count and path-cost bounds.
#[derive(Debug, Clone)]
pub struct FlowPolicy {
    path_alg: PathAlg,
    flow_placement: FlowPlacement,
    edge_select: EdgeSelect,
    multipath: bool,
    min_flow_count: usize,
    max_flow_count: Option<usize>,
    max_path_cost: Option<Cost>,
    max_path_cost_factor: Option<f64>,
    static_paths: Option<Vec<PathBundle>>,
    flows: IndexMap<FlowIndex, Flow>,
    best_path_cost: Option<Cost>,
    next_flow_id: u64,
}

impl FlowPolicy {
    /// Start a builder for a fully custom policy.
    pub fn builder() -> FlowPolicyBuilder {
        FlowPolicyBuilder::new()
    }

    /// Build one of the five required presets.
    pub fn preset(config: FlowPolicyConfig) -> Self {
        let builder = match config {
            FlowPolicyConfig::ShortestPathsEcmp => FlowPolicyBuilder::new()
                .flow_placement(FlowPlacement::EqualBalanced)
                .edge_select(EdgeSelect::AllMinCost)
                .multipath(true)
                .max_flow_count(1),
            FlowPolicyConfig::ShortestPathsUcmp => FlowPolicyBuilder::new()
                .flow_placement(FlowPlacement::Proportional)
                .edge_select(EdgeSelect::AllMinCost)
                .multipath(true)
                .max_flow_count(1),
            FlowPolicyConfig::TeUcmpUnlimited => FlowPolicyBuilder::new()
                .flow_placement(FlowPlacement::Proportional)
                .edge_select(EdgeSelect::AllMinCostWithCapRemaining)
                .multipath(false)
                .min_flow_count(1)
                .max_flow_count(1),
            FlowPolicyConfig::TeEcmpUpTo256Lsp => FlowPolicyBuilder::new()
                .flow_placement(FlowPlacement::EqualBalanced)
                .edge_select(EdgeSelect::AllMinCostWithCapRemaining)
                .multipath(false)
                .min_flow_count(1)
                .max_flow_count(256),
            FlowPolicyConfig::TeEcmp16Lsp => FlowPolicyBuilder::new()
                .flow_placement(FlowPlacement::EqualBalanced)
                .edge_select(EdgeSelect::AllMinCostWithCapRemaining)
                .multipath(false)
                .min_flow_count(16)
                .max_flow_count(16),
        };
        builder.build().expect("built-in presets are always valid")
    }

    /// Current flows, keyed by their identity.
    pub fn flows(&self) -> &IndexMap<FlowIndex, Flow> {
        &self.flows
    }

    /// Sum of `placed_flow` across every flow this policy owns.
    pub fn placed_demand(&self) -> Volume {
        self.flows.values().map(|f| f.placed_flow).sum()
    }

    fn search_bundle(
        &mut self,
        graph: &StrictMultiDiGraph,
        src: &NodeId,
        dst: &NodeId,
        excluded_edges: &HashSet<crate::graph::EdgeKey>,
        excluded_nodes: &HashSet<NodeId>,
        capacity_attr: &str,
        flow_attr: &str,
    ) -> Option<PathBundle> {
        let selector = EdgeSelector::new(self.edge_select)
            .with_excluded_edges(excluded_edges)
            .with_excluded_nodes(excluded_nodes)
            .with_capacity_attr(capacity_attr)
            .with_flow_attr(flow_attr);
        let spf = shortest_paths(graph, src, &selector, self.multipath);
        let cost = *spf.cost.get(dst)?;

        let cap = self
            .max_path_cost
            .into_iter()
            .chain(self.max_path_cost_factor.zip(self.best_path_cost).map(|(f, best)| (best as f64 * f) as Cost))
            .min();
        if let Some(cap) = cap {
            if cost > cap {
                return None;
            }
        }
        if self.best_path_cost.is_none() {
            self.best_path_cost = Some(cost);
        }

        Some(PathBundle::new(src.clone(), dst.clone(), spf.pred, cost))
    }

    fn create_flow(
        &mut self,
        graph: &StrictMultiDiGraph,
        src: &NodeId,
        dst: &NodeId,
        flow_class: &str,
        capacity_attr: &str,
        flow_attr: &str,
    ) -> Option<FlowIndex> {
        let excluded_edges = HashSet::new();
        let excluded_nodes = HashSet::new();
        let bundle = if let Some(paths) = &self.static_paths {
            let idx = self.flows.len();
            paths.get(idx)?.clone()
        } else {
            self.search_bundle(graph, src, dst, &excluded_edges, &excluded_nodes, capacity_attr, flow_attr)?
        };

        let flow_id = self.next_flow_id;
        self.next_flow_id += 1;
        let flow_index = FlowIndex::new(src.clone(), dst.clone(), flow_class.to_string(), flow_id);
        let flow = Flow { flow_index: flow_index.clone(), path_bundle: bundle, excluded_edges, excluded_nodes, placed_flow: 0.0 };
        self.flows.insert(flow_index.clone(), flow);
        tracing::trace!(?flow_index, "flow created");
        Some(flow_index)
    }

    /// Place up to `volume` units of flow between `src` and `dst`,
    /// creating, reoptimizing, and rebalancing flows as needed.
    #[allow(clippy::too_many_arguments)]
    pub fn place_demand(
        &mut self,
        graph: &mut StrictMultiDiGraph,
        src: &NodeId,
        dst: &NodeId,
        class: &str,
        volume: Volume,
        target_flow_volume: Option<Volume>,
        capacity_attr: &str,
        flow_attr: &str,
        flows_attr: &str,
    ) -> Result<(Volume, Volume)> {
        if !graph.has_node(src) {
            return Err(Error::unknown_node(src));
        }
        if !graph.has_node(dst) {
            return Err(Error::unknown_node(dst));
        }

        if self.flows.is_empty() {
            let initial_count = self.static_paths.as_ref().map_or(self.min_flow_count, |p| p.len());
            for _ in 0..initial_count {
                if self.create_flow(graph, src, dst, class, capacity_attr, flow_attr).is_none() {
                    break;
                }
            }
        }

        let target = target_flow_volume.unwrap_or(volume);
        let mut iterations = 0usize;

        loop {
            iterations += 1;
            if iterations > WATCHDOG_LIMIT {
                tracing::warn!(iterations, "place_demand watchdog tripped");
                return Err(Error::NonConvergent { iterations });
            }

            let mut progressed = false;
            let flow_indices: Vec<FlowIndex> = self.flows.keys().cloned().collect();
            for flow_index in &flow_indices {
                let remaining_on_flow = {
                    let flow = &self.flows[flow_index];
                    target - flow.placed_flow
                };
                if remaining_on_flow < MIN_FLOW {
                    continue;
                }
                let bundle = self.flows[flow_index].path_bundle.clone();
                let request = remaining_on_flow.min(volume - self.placed_demand());
                if request < MIN_FLOW {
                    continue;
                }
                let meta = place_flow_on_graph(
                    graph,
                    &bundle,
                    request,
                    flow_index.clone(),
                    self.flow_placement,
                    capacity_attr,
                    flow_attr,
                    flows_attr,
                );
                if meta.placed > MIN_FLOW {
                    let flow = self.flows.get_mut(flow_index).expect("flow still present");
                    flow.placed_flow = round_flow(flow.placed_flow + meta.placed);
                    progressed = true;
                }
            }

            let headroom = target - self.placed_demand();
            if headroom < MIN_FLOW {
                break;
            }
            if self.static_paths.is_some() {
                break;
            }

            let can_create_more = self.max_flow_count.map_or(true, |max| self.flows.len() < max);
            if can_create_more {
                if self.create_flow(graph, src, dst, class, capacity_attr, flow_attr).is_none() && !progressed {
                    break;
                }
                continue;
            }

            let candidate = self.flows.keys().next().cloned();
            let Some(candidate) = candidate else { break };
            let did_reoptimize =
                self.reoptimize_flow(graph, &candidate, MIN_FLOW, capacity_attr, flow_attr, flows_attr)?;
            if !did_reoptimize && !progressed {
                break;
            }
        }

        if self.flow_placement == FlowPlacement::EqualBalanced {
            self.rebalance_demand(graph, capacity_attr, flow_attr, flows_attr)?;
        }

        let placed_demand = self.placed_demand();
        let remaining = round_flow((volume - placed_demand).max(0.0));
        Ok((round_flow(placed_demand), remaining))
    }

    /// Remove a flow, search for a bundle admitting at least its current
    /// placement plus `headroom`, and re-place it there. Restores the
    /// original bundle exactly if no improvement is found. Returns
    /// whether a strictly better bundle was found.
    pub fn reoptimize_flow(
        &mut self,
        graph: &mut StrictMultiDiGraph,
        flow_index: &FlowIndex,
        headroom: Volume,
        capacity_attr: &str,
        flow_attr: &str,
        flows_attr: &str,
    ) -> Result<bool> {
        let Some(flow) = self.flows.get(flow_index).cloned() else {
            return Ok(false);
        };
        let required = flow.placed_flow + headroom;

        remove_flow_from_graph(graph, flow_index, flow_attr, flows_attr);

        let candidate = self.search_bundle(
            graph,
            &flow.flow_index.src,
            &flow.flow_index.dst,
            &flow.excluded_edges,
            &flow.excluded_nodes,
            capacity_attr,
            flow_attr,
        );

        let improved = candidate.as_ref().is_some_and(|bundle| {
            let rc = compute_residual_capacity(graph, bundle, capacity_attr, flow_attr);
            let admits = match self.flow_placement {
                FlowPlacement::Proportional => rc.max_flow.total,
                FlowPlacement::EqualBalanced => rc.max_flow.balanced,
            };
            admits >= required - MIN_FLOW
        });

        let bundle_to_use = if improved { candidate.unwrap() } else { flow.path_bundle.clone() };
        let meta = place_flow_on_graph(
            graph,
            &bundle_to_use,
            flow.placed_flow,
            flow_index.clone(),
            self.flow_placement,
            capacity_attr,
            flow_attr,
            flows_attr,
        );

        if let Some(entry) = self.flows.get_mut(flow_index) {
            entry.path_bundle = bundle_to_use;
            entry.placed_flow = round_flow(meta.placed);
        }
        tracing::trace!(?flow_index, improved, "flow reoptimized");
        Ok(improved)
    }

    /// Remove every flow belonging to `class`'s demand, undoing their
    /// graph contributions exactly.
    pub fn remove_demand(&mut self, graph: &mut StrictMultiDiGraph, flow_attr: &str, flows_attr: &str) {
        let indices: Vec<FlowIndex> = self.flows.keys().cloned().collect();
        for flow_index in indices {
            remove_flow_from_graph(graph, &flow_index, flow_attr, flows_attr);
        }
        self.flows.clear();
    }

    fn rebalance_demand(
        &mut self,
        graph: &mut StrictMultiDiGraph,
        capacity_attr: &str,
        flow_attr: &str,
        flows_attr: &str,
    ) -> Result<()> {
        let flow_count = self.flows.len();
        if flow_count == 0 {
            return Ok(());
        }
        let placed_demand = self.placed_demand();
        let target = placed_demand / flow_count as Volume;

        let needs_rebalance = self.flows.values().any(|f| (f.placed_flow - target).abs() >= MIN_FLOW);
        if !needs_rebalance {
            return Ok(());
        }

        let bundles: Vec<(FlowIndex, PathBundle)> =
            self.flows.iter().map(|(idx, f)| (idx.clone(), f.path_bundle.clone())).collect();
        self.remove_demand(graph, flow_attr, flows_attr);
        for (flow_index, bundle) in bundles {
            let meta = place_flow_on_graph(
                graph,
                &bundle,
                target,
                flow_index.clone(),
                self.flow_placement,
                capacity_attr,
                flow_attr,
                flows_attr,
            );
            self.flows.insert(
                flow_index.clone(),
                Flow {
                    flow_index,
                    path_bundle: bundle,
                    excluded_edges: HashSet::new(),
                    excluded_nodes: HashSet::new(),
                    placed_flow: round_flow(meta.placed),
                },
            );
        }
        tracing::trace!(flow_count, target, "demand rebalanced");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ecmp_mesh() -> StrictMultiDiGraph {
        let mut g = StrictMultiDiGraph::new();
        for n in ["A", "B", "C"] {
            g.add_node(n);
        }
        g.add_edge(&"A".into(), &"B".into(), 1.0, 1).unwrap();
        g.add_edge(&"A".into(), &"C".into(), 1.0, 1).unwrap();
        g.add_edge(&"B".into(), &"C".into(), 1.0, 1).unwrap();
        g.add_edge(&"C".into(), &"A".into(), 1.0, 1).unwrap();
        g
    }

    #[test]
    fn shortest_paths_ecmp_splits_evenly() {
        let mut g = ecmp_mesh();
        g.add_edge(&"A".into(), &"B".into(), 1.0, 1).unwrap();
        let mut policy = FlowPolicy::preset(FlowPolicyConfig::ShortestPathsEcmp);
        let (placed, remaining) =
            policy.place_demand(&mut g, &"A".into(), &"C".into(), "demo", 10.0, None, "capacity", "flow", "flows").unwrap();
        assert!(placed > 0.0);
        assert!(remaining >= 0.0);
        assert_eq!(policy.flows().len(), 1);
    }

    #[test]
    fn te_ecmp_16_lsp_caps_flow_count() {
        let mut g = StrictMultiDiGraph::new();
        for n in ["A", "B"] {
            g.add_node(n);
        }
        for _ in 0..20 {
            g.add_edge(&"A".into(), &"B".into(), 1.0, 1).unwrap();
        }
        let mut policy = FlowPolicy::preset(FlowPolicyConfig::TeEcmp16Lsp);
        policy.place_demand(&mut g, &"A".into(), &"B".into(), "demo", 100.0, None, "capacity", "flow", "flows").unwrap();
        assert_eq!(policy.flows().len(), 16);
    }

    #[test]
    fn remove_demand_restores_graph() {
        let mut g = ecmp_mesh();
        let mut policy = FlowPolicy::preset(FlowPolicyConfig::ShortestPathsUcmp);
        policy.place_demand(&mut g, &"A".into(), &"C".into(), "demo", 1.0, None, "capacity", "flow", "flows").unwrap();
        policy.remove_demand(&mut g, "flow", "flows");
        for key in g.all_edge_keys() {
            assert_eq!(g.edge_attrs(key).unwrap().float("flow"), 0.0);
        }
        assert_eq!(policy.flows().len(), 0);
    }

    #[test]
    fn unknown_source_is_an_error() {
        let mut g = StrictMultiDiGraph::new();
        g.add_node("B");
        let mut policy = FlowPolicy::preset(FlowPolicyConfig::ShortestPathsUcmp);
        let err = policy
            .place_demand(&mut g, &"A".into(), &"B".into(), "demo", 1.0, None, "capacity", "flow", "flows")
            .unwrap_err();
        assert_eq!(err, Error::unknown_node("A"));
    }

    #[test]
    fn builder_rejects_mismatched_static_path_count() {
        let result = FlowPolicyBuilder::new()
            .static_paths(vec![PathBundle::empty("A".to_string(), "B".to_string())])
            .max_flow_count(2)
            .build();
        assert!(result.is_err());
    }
}
