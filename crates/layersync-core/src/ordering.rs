//! Dependency-correct processing order
//!
//! Records without dependency edges are ordered by level and sort hint.
//! When any edge is present the whole set goes through Kahn's topological
//! sort. A set the sort cannot fully order (a cycle, or an edge naming a key
//! outside the set) degrades to level order instead of failing.

use std::collections::{BTreeSet, HashMap, HashSet};

use crate::model::EntityRecord;

/// Weight of one level when combining it with the sort hint
pub const LEVEL_WEIGHT: i64 = 1000;

/// A sortable node
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderNode {
    pub key: String,
    pub alias: String,
    pub level: i32,
    pub sort_hint: i32,
}

impl OrderNode {
    pub fn new(key: impl Into<String>, alias: impl Into<String>, level: i32, sort_hint: i32) -> Self {
        Self {
            key: key.into(),
            alias: alias.into(),
            level,
            sort_hint,
        }
    }

    fn rank(&self) -> i64 {
        i64::from(self.level) * LEVEL_WEIGHT + i64::from(self.sort_hint)
    }
}

impl From<&EntityRecord> for OrderNode {
    fn from(record: &EntityRecord) -> Self {
        Self::new(
            record.key.clone(),
            record.alias.clone(),
            record.level,
            record.sort_hint,
        )
    }
}

/// `before` must be processed ahead of `after`
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DependencyEdge {
    pub before: String,
    pub after: String,
}

impl DependencyEdge {
    pub fn new(before: impl Into<String>, after: impl Into<String>) -> Self {
        Self {
            before: before.into(),
            after: after.into(),
        }
    }

    fn is_self_edge(&self) -> bool {
        self.before == self.after
    }
}

/// How the final order was produced
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OrderStrategy {
    /// No edges; level and sort hint
    Level,
    Topological,
    /// Edges formed a cycle or named an unknown key; level then key
    LevelFallback,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Ordering {
    pub keys: Vec<String>,
    pub strategy: OrderStrategy,
}

/// Order `nodes` so that every edge is respected.
///
/// Returns every node key exactly once. Keys that only appear as edge
/// endpoints are never part of the output.
pub fn order(nodes: &[OrderNode], edges: &[DependencyEdge]) -> Ordering {
    let edges: Vec<&DependencyEdge> = edges.iter().filter(|e| !e.is_self_edge()).collect();

    if edges.is_empty() {
        return Ordering {
            keys: level_order(nodes),
            strategy: OrderStrategy::Level,
        };
    }

    match topological_order(nodes, &edges) {
        Some(keys) => Ordering {
            keys,
            strategy: OrderStrategy::Topological,
        },
        None => {
            tracing::warn!(
                node_count = nodes.len(),
                edge_count = edges.len(),
                "dependencies cannot be fully ordered, falling back to level order"
            );
            Ordering {
                keys: fallback_order(nodes),
                strategy: OrderStrategy::LevelFallback,
            }
        }
    }
}

/// Order loaded records.
///
/// Graph edges declared by the records switch the sort to topological; in
/// that case parent links between loaded records become edges too.
pub fn order_records(records: &[EntityRecord]) -> Ordering {
    let nodes: Vec<OrderNode> = records.iter().map(OrderNode::from).collect();

    let mut edges: Vec<DependencyEdge> = records
        .iter()
        .flat_map(|r| {
            r.graph_edges
                .iter()
                .map(move |dep| DependencyEdge::new(dep.clone(), r.key.clone()))
        })
        .collect();

    if edges.iter().any(|e| !e.is_self_edge()) {
        let loaded: HashSet<&str> = records.iter().map(|r| r.key.as_str()).collect();
        for record in records {
            if let Some(parent) = record.parent_key.as_deref() {
                if loaded.contains(parent) {
                    edges.push(DependencyEdge::new(parent, record.key.clone()));
                }
            }
        }
    }

    order(&nodes, &edges)
}

fn level_order(nodes: &[OrderNode]) -> Vec<String> {
    let mut sorted: Vec<&OrderNode> = nodes.iter().collect();
    sorted.sort_by(|a, b| {
        a.rank()
            .cmp(&b.rank())
            .then_with(|| a.alias.cmp(&b.alias))
            .then_with(|| a.key.cmp(&b.key))
    });
    sorted.into_iter().map(|n| n.key.clone()).collect()
}

fn fallback_order(nodes: &[OrderNode]) -> Vec<String> {
    let mut sorted: Vec<&OrderNode> = nodes.iter().collect();
    sorted.sort_by(|a, b| a.level.cmp(&b.level).then_with(|| a.key.cmp(&b.key)));
    sorted.into_iter().map(|n| n.key.clone()).collect()
}

/// Kahn's algorithm with a deterministic ready queue.
///
/// Returns `None` when an edge names a key outside `nodes` or a cycle
/// prevents some node from being emitted.
fn topological_order(nodes: &[OrderNode], edges: &[&DependencyEdge]) -> Option<Vec<String>> {
    let by_key: HashMap<&str, &OrderNode> = nodes.iter().map(|n| (n.key.as_str(), n)).collect();

    if let Some(edge) = edges
        .iter()
        .find(|e| !by_key.contains_key(e.before.as_str()) || !by_key.contains_key(e.after.as_str()))
    {
        tracing::debug!(
            before = edge.before.as_str(),
            after = edge.after.as_str(),
            "edge names a key outside the ordered set"
        );
        return None;
    }

    // Ready queue entries sort by rank, alias, key
    let sort_key = |key: &str| -> (i64, String, String) {
        match by_key.get(key) {
            Some(n) => (n.rank(), n.alias.clone(), n.key.clone()),
            None => (i64::MIN, String::new(), key.to_string()),
        }
    };

    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, BTreeSet<&str>> = HashMap::new();

    for node in nodes {
        in_degree.entry(node.key.as_str()).or_insert(0);
    }
    for edge in edges {
        let newly_added = dependents
            .entry(edge.before.as_str())
            .or_default()
            .insert(edge.after.as_str());
        // Duplicate edges count once
        if newly_added {
            *in_degree.entry(edge.after.as_str()).or_insert(0) += 1;
        }
    }

    let mut ready: BTreeSet<(i64, String, String)> = in_degree
        .iter()
        .filter(|(_, deg)| **deg == 0)
        .map(|(key, _)| sort_key(*key))
        .collect();

    let total = in_degree.len();
    let mut emitted = 0usize;
    let mut ordered = Vec::with_capacity(nodes.len());

    while let Some(first) = ready.iter().next().cloned() {
        ready.remove(&first);
        let key = first.2;
        emitted += 1;

        if let Some(next) = dependents.get(key.as_str()) {
            for dep in next {
                let Some(deg) = in_degree.get_mut(dep) else {
                    continue;
                };
                *deg = deg.saturating_sub(1);
                if *deg == 0 {
                    ready.insert(sort_key(*dep));
                }
            }
        }

        if by_key.contains_key(key.as_str()) {
            ordered.push(key);
        }
    }

    if emitted < total {
        return None;
    }
    Some(ordered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::SnapshotDocument;
    use proptest::prelude::*;

    fn node(key: &str, level: i32, sort_hint: i32) -> OrderNode {
        OrderNode::new(key, key.to_uppercase(), level, sort_hint)
    }

    fn position(keys: &[String], key: &str) -> usize {
        keys.iter().position(|k| k == key).unwrap()
    }

    #[test]
    fn test_level_order_without_edges() {
        let nodes = vec![node("c", 1, 0), node("a", 0, 5), node("b", 0, 1)];

        let result = order(&nodes, &[]);
        assert_eq!(result.strategy, OrderStrategy::Level);
        assert_eq!(result.keys, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_level_ties_break_on_alias() {
        let nodes = vec![
            OrderNode::new("k1", "Zeta", 0, 0),
            OrderNode::new("k2", "Alpha", 0, 0),
        ];

        let result = order(&nodes, &[]);
        assert_eq!(result.keys, vec!["k2", "k1"]);
    }

    #[test]
    fn test_self_edges_are_ignored() {
        let nodes = vec![node("a", 1, 0), node("b", 0, 0)];
        let edges = vec![DependencyEdge::new("a", "a")];

        let result = order(&nodes, &edges);
        assert_eq!(result.strategy, OrderStrategy::Level);
        assert_eq!(result.keys, vec!["b", "a"]);
    }

    #[test]
    fn test_edges_override_level() {
        // "a" sits deeper but "b" depends on it
        let nodes = vec![node("a", 3, 0), node("b", 0, 0)];
        let edges = vec![DependencyEdge::new("a", "b")];

        let result = order(&nodes, &edges);
        assert_eq!(result.strategy, OrderStrategy::Topological);
        assert_eq!(result.keys, vec!["a", "b"]);
    }

    #[test]
    fn test_unknown_edge_key_falls_back_and_is_dropped() {
        let nodes = vec![node("a", 5, 0), node("b", 0, 0)];
        let edges = vec![DependencyEdge::new("outside", "a")];

        let result = order(&nodes, &edges);
        assert_eq!(result.strategy, OrderStrategy::LevelFallback);
        assert_eq!(result.keys, vec!["b", "a"]);

        let reversed = vec![DependencyEdge::new("b", "missing")];
        let result = order(&nodes, &reversed);
        assert_eq!(result.strategy, OrderStrategy::LevelFallback);
        assert_eq!(result.keys, vec!["b", "a"]);
    }

    #[test]
    fn test_cycle_falls_back_to_level_then_key() {
        let nodes = vec![node("b", 1, 0), node("a", 1, 0), node("root", 0, 0)];
        let edges = vec![DependencyEdge::new("a", "b"), DependencyEdge::new("b", "a")];

        let result = order(&nodes, &edges);
        assert_eq!(result.strategy, OrderStrategy::LevelFallback);
        assert_eq!(result.keys, vec!["root", "a", "b"]);
    }

    #[test]
    fn test_order_records_adds_parent_edges() {
        let mut parent = SnapshotDocument::new("content", "p", "Parent");
        // Parent deliberately ranked after the child
        parent.level = 2;
        let mut child = SnapshotDocument::new("content", "c", "Child");
        child.parent_key = Some("p".to_string());
        child.dependencies = vec!["o".to_string()];
        let other = SnapshotDocument::new("content", "o", "Other");

        let records = vec![
            EntityRecord::from_document(child, "c.config", "c.config"),
            EntityRecord::from_document(parent, "p.config", "p.config"),
            EntityRecord::from_document(other, "o.config", "o.config"),
        ];

        let result = order_records(&records);
        assert_eq!(result.strategy, OrderStrategy::Topological);
        assert_eq!(result.keys, vec!["o", "p", "c"]);
    }

    fn arb_dag() -> impl Strategy<Value = (Vec<OrderNode>, Vec<DependencyEdge>)> {
        (1usize..12).prop_flat_map(|n| {
            let nodes = prop::collection::vec((0i32..4, 0i32..10), n);
            let edges = prop::collection::vec((0..n, 0..n), 0..(n * 2));
            (nodes, edges).prop_map(|(attrs, pairs)| {
                let nodes: Vec<OrderNode> = attrs
                    .into_iter()
                    .enumerate()
                    .map(|(i, (level, hint))| node(&format!("n{i}"), level, hint))
                    .collect();
                // Edges only run from lower to higher index, so no cycles
                let edges = pairs
                    .into_iter()
                    .filter(|(a, b)| a < b)
                    .map(|(a, b)| DependencyEdge::new(format!("n{a}"), format!("n{b}")))
                    .collect();
                (nodes, edges)
            })
        })
    }

    proptest! {
        #[test]
        fn prop_dag_respects_every_edge((nodes, edges) in arb_dag()) {
            let result = order(&nodes, &edges);

            prop_assert_eq!(result.keys.len(), nodes.len());
            for edge in &edges {
                prop_assert!(position(&result.keys, &edge.before) < position(&result.keys, &edge.after));
            }
        }

        #[test]
        fn prop_cycles_return_every_key((nodes, mut edges) in arb_dag()) {
            let last = format!("n{}", nodes.len() - 1);
            edges.push(DependencyEdge::new("n0", last.clone()));
            edges.push(DependencyEdge::new(last, "n0"));

            let result = order(&nodes, &edges);

            let mut got = result.keys.clone();
            got.sort();
            let mut expected: Vec<String> = nodes.iter().map(|n| n.key.clone()).collect();
            expected.sort();
            prop_assert_eq!(got, expected);
        }

        #[test]
        fn prop_order_is_deterministic((nodes, edges) in arb_dag()) {
            let mut reversed = nodes.clone();
            reversed.reverse();

            prop_assert_eq!(order(&nodes, &edges).keys, order(&reversed, &edges).keys);
        }
    }
}
