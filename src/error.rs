//! Error taxonomy for the flow engine.

use thiserror::Error;

/// Result type alias using [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

/// Errors the flow engine can raise.
///
/// The engine recovers locally only from expected "no path" outcomes
/// (those are reported as zero flow, not as an error); every other
/// failure mode below propagates unchanged to the caller.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    /// Operation referenced a node absent from the graph.
    #[error("unknown node: {node}")]
    UnknownNode {
        /// The node identifier that could not be found.
        node: String,
    },

    /// `add_edge` referenced an endpoint absent from the graph.
    #[error("unknown edge endpoint: {node}")]
    UnknownEndpoint {
        /// The endpoint identifier that could not be found.
        node: String,
    },

    /// Invalid configuration, e.g. EQUAL_BALANCED without `max_flow_count`,
    /// static paths whose count disagrees with `max_flow_count`, or a
    /// `max_fraction` outside `[0, 1]`.
    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// `FlowPolicy::place_demand`'s internal watchdog tripped (> 10,000
    /// iterations). Should not occur on well-formed inputs.
    #[error("did not converge after {iterations} iterations")]
    NonConvergent {
        /// Iterations completed before the watchdog tripped.
        iterations: usize,
    },

    /// A cooperative cancellation token was observed to be signalled.
    /// Partial state (all `flows[i]` entries still sum to `flow`) is valid.
    #[error("operation cancelled")]
    Cancelled,

    /// `path_alg` named an algorithm other than SPF.
    #[error("unsupported path algorithm: {0}")]
    UnsupportedAlgorithm(String),
}

impl Error {
    /// Build an [`Error::UnknownNode`] from anything `Display`-able.
    pub fn unknown_node(node: impl ToString) -> Self {
        Self::UnknownNode { node: node.to_string() }
    }

    /// Build an [`Error::UnknownEndpoint`] from anything `Display`-able.
    pub fn unknown_endpoint(node: impl ToString) -> Self {
        Self::UnknownEndpoint { node: node.to_string() }
    }

    /// Build an [`Error::InvalidConfig`].
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Build an [`Error::UnsupportedAlgorithm`].
    pub fn unsupported_algorithm(msg: impl Into<String>) -> Self {
        Self::UnsupportedAlgorithm(msg.into())
    }
}
