//! Error types for building and running workloads.

use thiserror::Error;

/// Errors detected while building a [`Workload`](crate::Workload).
///
/// All of these are fatal: a workload with an invalid configuration never starts.
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    /// The session count must be at least one.
    #[error("session count must be greater than zero")]
    NoSessions,

    /// The aggregate throughput must be a positive, finite number.
    #[error("throughput must be positive, got {0}")]
    InvalidThroughput(f64),

    /// The total duration is zero or longer than a year, or the ramps do not fit into it.
    #[error("invalid duration: total={total}s, ramp_up={ramp_up}s, ramp_down={ramp_down}s")]
    InvalidDuration {
        /// Total duration in seconds.
        total: u64,
        /// Ramp-up window in seconds.
        ramp_up: u64,
        /// Ramp-down window in seconds.
        ramp_down: u64,
    },

    /// The request graph does not declare any request.
    #[error("request graph is empty")]
    EmptyGraph,

    /// The request graph does not declare the start node.
    #[error("request graph has no `{}` node", crate::graph::START)]
    MissingStart,

    /// An edge carries a weight that cannot be used for sampling.
    #[error("invalid weight {weight} on edge `{from}` -> `{to}`")]
    InvalidWeight {
        /// Source request of the edge.
        from: String,
        /// Target request of the edge.
        to: String,
        /// The offending weight.
        weight: f64,
    },

    /// A declared request has no outgoing edges.
    #[error("request `{0}` has no successors")]
    NoSuccessors(String),

    /// A surge interval cannot be applied.
    #[error("invalid surge #{index}: {reason}")]
    InvalidSurge {
        /// Position of the surge in the configured list.
        index: usize,
        /// Human readable description of the problem.
        reason: &'static str,
    },

    /// A request that can be reached in the graph has no handler.
    #[error("no handler registered for request `{0}`")]
    MissingHandler(String),
}

/// Errors raised while traversing a [`RequestGraph`](crate::RequestGraph).
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    /// The current request is not a node of the graph.
    #[error("unknown request `{0}`")]
    UnknownRequest(String),

    /// The current request has no outgoing edges.
    #[error("request `{0}` has no successors")]
    NoSuccessors(String),
}
