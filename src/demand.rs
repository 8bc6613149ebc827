//! Volume-tracked demand (C9) that delegates placement to a
//! [`FlowPolicy`], the way the spec's policy layer realizes a request
//! through one or more [`Flow`](crate::policy::Flow)s.

use crate::graph::{NodeId, StrictMultiDiGraph};
use crate::policy::FlowPolicy;
use crate::types::{round_flow, Flow};
use crate::{Error, Result};
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_INSTANCE_ID: AtomicU64 = AtomicU64::new(0);

/// A volume-tracked request between two nodes, realized by its own
/// exclusively-owned [`FlowPolicy`].
///
/// Lower `class` is higher priority: callers that schedule many demands
/// through a min-heap should order on `class` ascending, which is what
/// this type's [`Ord`] implementation does. Ties between equal classes
/// are left to the caller's sort stability; the engine does not itself
/// break them.
#[derive(Debug, Clone)]
pub struct Demand {
    /// Demand source.
    pub src: NodeId,
    /// Demand destination.
    pub dst: NodeId,
    /// Total volume requested.
    pub volume: Flow,
    /// Priority label; lower values are served first.
    pub class: i64,
    /// The policy realizing this demand's flows.
    pub flow_policy: FlowPolicy,
    /// Volume placed so far, the sum of `placed_flow` across the
    /// policy's flows.
    pub placed_demand: Flow,
    instance_id: u64,
}

impl Demand {
    /// Build a demand. `flow_policy` defaults to
    /// [`crate::policy::FlowPolicyConfig::ShortestPathsUcmp`] when `None`.
    pub fn new(src: impl Into<NodeId>, dst: impl Into<NodeId>, volume: Flow, class: i64, flow_policy: Option<FlowPolicy>) -> Self {
        let flow_policy = flow_policy.unwrap_or_else(|| FlowPolicy::preset(crate::policy::FlowPolicyConfig::ShortestPathsUcmp));
        Self {
            src: src.into(),
            dst: dst.into(),
            volume,
            class,
            flow_policy,
            placed_demand: 0.0,
            instance_id: NEXT_INSTANCE_ID.fetch_add(1, Ordering::Relaxed),
        }
    }

    /// A flow class unique to this `Demand` instance, so two demands
    /// sharing a numeric `class` never collide inside a shared
    /// [`FlowPolicy`]'s flow map.
    fn flow_class(&self) -> String {
        format!("{}:{}->{}:{}", self.class, self.src, self.dst, self.instance_id)
    }

    /// Place up to `volume * max_fraction` (further capped by
    /// `max_placement`, if given) of this demand's remaining volume on
    /// `graph`. Returns `(placed_now, remaining)`.
    #[allow(clippy::too_many_arguments)]
    pub fn place(
        &mut self,
        graph: &mut StrictMultiDiGraph,
        max_fraction: f64,
        max_placement: Option<Flow>,
        capacity_attr: &str,
        flow_attr: &str,
        flows_attr: &str,
    ) -> Result<(Flow, Flow)> {
        if !(0.0..=1.0).contains(&max_fraction) {
            return Err(Error::invalid_config("max_fraction must be within [0, 1]"));
        }

        let headroom = (self.volume - self.placed_demand).max(0.0);

        let mut to_place = if max_fraction <= 0.0 {
            if self.volume.is_finite() {
                0.0
            } else {
                Flow::INFINITY
            }
        } else if self.volume.is_finite() {
            headroom.min(self.volume * max_fraction)
        } else {
            Flow::INFINITY
        };

        if let Some(cap) = max_placement {
            to_place = to_place.min(cap);
        }

        if to_place <= 0.0 {
            return Ok((0.0, round_flow(headroom)));
        }
        if to_place < crate::types::MIN_FLOW && headroom >= crate::types::MIN_FLOW {
            to_place = crate::types::MIN_FLOW.max(to_place).min(headroom);
        }

        let target = self.placed_demand + to_place;
        let class = self.flow_class();
        let (placed_demand, _) =
            self.flow_policy.place_demand(graph, &self.src, &self.dst, &class, target, None, capacity_attr, flow_attr, flows_attr)?;

        let placed_before = self.placed_demand;
        self.placed_demand = round_flow(placed_demand);
        let placed_now = round_flow((self.placed_demand - placed_before).max(0.0));
        let remaining = round_flow((self.volume - self.placed_demand).max(0.0));
        Ok((placed_now, remaining))
    }
}

impl PartialEq for Demand {
    fn eq(&self, other: &Self) -> bool {
        self.class == other.class
    }
}

impl Eq for Demand {}

impl PartialOrd for Demand {
    fn partial_cmp(&self, other: &Self) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Demand {
    fn cmp(&self, other: &Self) -> std::cmp::Ordering {
        self.class.cmp(&other.class)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::policy::FlowPolicyConfig;

    fn mesh() -> StrictMultiDiGraph {
        let mut g = StrictMultiDiGraph::new();
        for n in ["A", "B"] {
            g.add_node(n);
        }
        g.add_edge(&"A".into(), &"B".into(), 10.0, 1).unwrap();
        g
    }

    #[test]
    fn places_up_to_volume() {
        let mut g = mesh();
        let mut demand = Demand::new("A", "B", 5.0, 0, Some(FlowPolicy::preset(FlowPolicyConfig::ShortestPathsUcmp)));
        let (placed, remaining) = demand.place(&mut g, 1.0, None, "capacity", "flow", "flows").unwrap();
        assert_eq!(placed, 5.0);
        assert_eq!(remaining, 0.0);
        assert_eq!(demand.placed_demand, 5.0);
    }

    #[test]
    fn max_fraction_limits_request() {
        let mut g = mesh();
        let mut demand = Demand::new("A", "B", 10.0, 0, Some(FlowPolicy::preset(FlowPolicyConfig::ShortestPathsUcmp)));
        let (placed, remaining) = demand.place(&mut g, 0.5, None, "capacity", "flow", "flows").unwrap();
        assert_eq!(placed, 5.0);
        assert_eq!(remaining, 5.0);
    }

    #[test]
    fn zero_fraction_places_nothing_for_finite_volume() {
        let mut g = mesh();
        let mut demand = Demand::new("A", "B", 10.0, 0, Some(FlowPolicy::preset(FlowPolicyConfig::ShortestPathsUcmp)));
        let (placed, remaining) = demand.place(&mut g, 0.0, None, "capacity", "flow", "flows").unwrap();
        assert_eq!(placed, 0.0);
        assert_eq!(remaining, 10.0);
    }

    #[test]
    fn rejects_fraction_outside_unit_interval() {
        let mut g = mesh();
        let mut demand = Demand::new("A", "B", 10.0, 0, None);
        let err = demand.place(&mut g, 1.5, None, "capacity", "flow", "flows").unwrap_err();
        assert_eq!(err, Error::invalid_config("max_fraction must be within [0, 1]"));
    }

    #[test]
    fn lower_class_sorts_first() {
        let high_priority = Demand::new("A", "B", 1.0, -5, None);
        let low_priority = Demand::new("A", "B", 1.0, 5, None);
        assert!(high_priority < low_priority);
    }

    #[test]
    fn two_demands_sharing_a_class_do_not_collide() {
        let mut g = mesh();
        let mut d1 = Demand::new("A", "B", 3.0, 0, Some(FlowPolicy::preset(FlowPolicyConfig::ShortestPathsUcmp)));
        let mut d2 = Demand::new("A", "B", 3.0, 0, Some(FlowPolicy::preset(FlowPolicyConfig::ShortestPathsUcmp)));
        d1.place(&mut g, 1.0, None, "capacity", "flow", "flows").unwrap();
        d2.place(&mut g, 1.0, None, "capacity", "flow", "flows").unwrap();
        assert_eq!(d1.placed_demand, 3.0);
        assert_eq!(d2.placed_demand, 3.0);
        let total_flow: Flow = g.all_edge_keys().iter().map(|&k| g.edge_attrs(k).unwrap().float("flow")).sum();
        assert_eq!(total_flow, 6.0);
    }
}
