//! The weighted request graph that drives session behavior.
//!
//! Every node of the graph is a request name, and every edge carries a positive weight. A session
//! walks the graph by repeatedly picking a successor of its current request, with a probability
//! proportional to the edge weight. Weights do not need to sum up to one, they are normalized per
//! node.

use indexmap::IndexMap;
use rand::Rng;
use rand_distr::Distribution;
use rand_distr::weighted::WeightedIndex;

use crate::error::{ConfigError, GraphError};

/// The request every session starts from.
pub const START: &str = "main";

/// Adjacency list as it is declared in the configuration, preserving declaration order.
pub type Edges = IndexMap<String, IndexMap<String, f64>>;

#[derive(Debug)]
struct Node {
    successors: Vec<String>,
    /// `None` for terminal requests without outgoing edges.
    distribution: Option<WeightedIndex<f64>>,
}

/// An immutable, weighted directed graph over request names.
///
/// The graph is built once and shared read-only between all sessions, see
/// [`next`](Self::next) for the traversal rule.
#[derive(Debug)]
pub struct RequestGraph {
    nodes: IndexMap<String, Node>,
}

impl RequestGraph {
    /// Builds a graph from the declared adjacency list.
    ///
    /// The graph must declare the [`START`] node with at least one successor, and all weights
    /// must be positive and finite. Successors that are not declared as nodes themselves and
    /// declared nodes without successors are accepted, but a session reaching them will stop.
    pub fn new(edges: Edges) -> Result<Self, ConfigError> {
        if edges.is_empty() {
            return Err(ConfigError::EmptyGraph);
        }
        match edges.get(START) {
            None => return Err(ConfigError::MissingStart),
            Some(successors) if successors.is_empty() => {
                return Err(ConfigError::NoSuccessors(START.to_owned()));
            }
            Some(_) => {}
        }

        let mut nodes = IndexMap::with_capacity(edges.len());
        for (from, successors) in &edges {
            for (to, &weight) in successors {
                if !weight.is_finite() || weight <= 0.0 {
                    return Err(ConfigError::InvalidWeight {
                        from: from.clone(),
                        to: to.clone(),
                        weight,
                    });
                }
                if !edges.contains_key(to) {
                    tracing::warn!(
                        %from,
                        %to,
                        "request is not declared in the graph, sessions reaching it will stop"
                    );
                }
            }

            let distribution = if successors.is_empty() {
                tracing::warn!(
                    request = %from,
                    "request has no successors, sessions reaching it will stop"
                );
                None
            } else {
                let distribution = WeightedIndex::new(successors.values().copied()).map_err(|_| {
                    // Individually valid weights can still overflow when summed up.
                    let (to, &weight) = successors.last().unwrap_or((from, &f64::INFINITY));
                    ConfigError::InvalidWeight {
                        from: from.clone(),
                        to: to.clone(),
                        weight,
                    }
                })?;
                Some(distribution)
            };

            let node = Node {
                successors: successors.keys().cloned().collect(),
                distribution,
            };
            nodes.insert(from.clone(), node);
        }

        Ok(Self { nodes })
    }

    /// Picks the successor of `current`.
    ///
    /// Draws a uniform value in `[0, sum of weights)` and returns the first successor, in
    /// declaration order, whose cumulative weight exceeds that value. With a seeded `rng`, the
    /// walk is therefore reproducible.
    pub fn next<R: Rng + ?Sized>(&self, current: &str, rng: &mut R) -> Result<&str, GraphError> {
        let node = self
            .nodes
            .get(current)
            .ok_or_else(|| GraphError::UnknownRequest(current.to_owned()))?;
        let distribution = node
            .distribution
            .as_ref()
            .ok_or_else(|| GraphError::NoSuccessors(current.to_owned()))?;

        Ok(&node.successors[distribution.sample(rng)])
    }

    /// Iterates all request names that a session can be sent to, in declaration order.
    ///
    /// This is the set of names that need a request handler. The start node is only included if
    /// some edge points back to it.
    pub fn reachable(&self) -> impl Iterator<Item = &str> {
        let mut seen = indexmap::IndexSet::new();
        for node in self.nodes.values() {
            for successor in &node.successors {
                seen.insert(successor.as_str());
            }
        }
        seen.into_iter()
    }
}
