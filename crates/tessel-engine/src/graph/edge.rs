use serde::{Deserialize, Serialize};

/// A static reachability declaration: `to` may legally follow `from`.
///
/// The edge list is consumed by build-time validation and observability
/// tooling; per-step dispatch is the supervisor's job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    pub from: String,
    pub to: String,
}

impl Edge {
    pub fn new(from: impl Into<String>, to: impl Into<String>) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
        }
    }
}

/// The standard shape for supervisor-routed graphs: the supervisor fans out
/// to every domain node and each node reports back, plus a terminal edge.
pub fn hub_edges(supervisor: &str, nodes: &[&str]) -> Vec<Edge> {
    let mut edges = Vec::with_capacity(nodes.len() * 2 + 1);
    for node in nodes {
        edges.push(Edge::new(supervisor, *node));
        edges.push(Edge::new(*node, supervisor));
    }
    edges.push(Edge::new(supervisor, crate::supervisor::END));
    edges
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::supervisor::END;

    #[test]
    fn test_hub_edges_shape() {
        let edges = hub_edges("supervisor", &["analyzer", "writer"]);
        assert_eq!(edges.len(), 5);
        assert!(edges.contains(&Edge::new("supervisor", "analyzer")));
        assert!(edges.contains(&Edge::new("analyzer", "supervisor")));
        assert!(edges.contains(&Edge::new("supervisor", END)));
    }

    #[test]
    fn test_serialization() {
        let edge = Edge::new("writer", "supervisor");
        let json = serde_json::to_string(&edge).unwrap();
        let parsed: Edge = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, edge);
    }
}
