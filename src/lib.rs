//! # netgraph-flow
//!
//! The flow engine at the core of NetGraph, a network modeling and
//! capacity-analysis toolkit: a Dijkstra-based shortest-path kernel, a
//! cost-aware augmenting-path max-flow solver with two flow-placement
//! disciplines (proportional and equal-balanced), a bookkeeping layer
//! that tracks per-flow contributions on edges, and a policy layer that
//! realizes a demand through one or more flows with re-optimization.
//!
//! ## Modules
//!
//! - [`graph`] - the capacitated multigraph kernel: [`graph::StrictMultiDiGraph`],
//!   edge selection, SPF, path bundles, residual capacity, flow placement,
//!   and `calc_max_flow`.
//! - [`policy`] - [`policy::FlowPolicy`], which creates, places,
//!   reoptimizes, and removes named flows realizing a demand.
//! - [`demand`] - [`demand::Demand`], a volume-tracked request delegating
//!   placement to a `FlowPolicy`.
//! - [`cancel`] - cooperative cancellation for long-running engine calls.
//!
//! ## Quick start
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
//!
//! ## Scope
//!
//! This crate is the flow engine only: scenario parsing, blueprint
//! expansion, CLI, report generation, Monte Carlo orchestration, and
//! result serialization containers live outside it. It is usable as a
//! pure library — given a graph, a source, a sink, and configuration, it
//! returns flow values, per-edge placements, cost distributions, and
//! min-cut edge sets, and touches neither the filesystem nor the network.

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

pub mod cancel;
pub mod demand;
pub mod graph;
pub mod policy;

mod error;
mod types;

pub use error::{Error, Result};
pub use types::{round_flow, Cost, Flow, EPSILON, MIN_FLOW};

/// Prelude for common imports.
pub mod prelude {
    pub use crate::cancel::CancellationToken;
    pub use crate::demand::Demand;
    pub use crate::graph::max_flow::{calc_max_flow, run_sensitivity, saturated_edges, FlowSummary, MaxFlowOpts};
    pub use crate::graph::placement::FlowPlacement;
    pub use crate::graph::{EdgeKey, EdgeSelect, NodeId, PathBundle, StrictMultiDiGraph};
    pub use crate::policy::{Flow as PlacedFlow, FlowIndex, FlowPolicy, FlowPolicyConfig};
    pub use crate::Error;
    pub use crate::Result;
}
