//! Terse construction of request graphs.

use loadgen::graph::Edges;

/// Builds an adjacency list from `(from, to, weight)` triples, in the given order.
///
/// ```
/// let edges = loadgen_test::graph::edges(&[("main", "a", 1.0), ("a", "main", 1.0)]);
/// assert_eq!(edges["main"]["a"], 1.0);
/// ```
pub fn edges(spec: &[(&str, &str, f64)]) -> Edges {
    let mut edges = Edges::new();
    for &(from, to, weight) in spec {
        edges
            .entry(from.to_owned())
            .or_default()
            .insert(to.to_owned(), weight);
    }
    edges
}

/// A graph alternating between `main` and `a`.
pub fn ping_pong() -> Edges {
    edges(&[("main", "a", 1.0), ("a", "main", 1.0)])
}
