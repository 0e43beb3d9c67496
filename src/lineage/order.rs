use std::collections::{BTreeMap, BTreeSet};
use serde::Serialize;
use tracing::warn;
use crate::reference::TableReference;
use super::graph::{DependencyEdge, DependencyGraph};

/// Refresh order for a set of nodes. `cyclic` holds the nodes appended by the
/// cycle fallback, in the order they were appended.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PlannedOrder {
    pub order: Vec<TableReference>,
    pub cyclic: Vec<TableReference>,
}

impl PlannedOrder {
    pub fn for_graph(graph: &DependencyGraph) -> Self {
        order(&graph.nodes, &graph.edges)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn has_cycles(&self) -> bool {
        !self.cyclic.is_empty()
    }
}

/// Kahn's algorithm by levels. Each level is emitted in canonical order; if a
/// cycle blocks progress the remaining nodes are appended sorted and reported
/// as cyclic.
pub fn order(nodes: &BTreeSet<TableReference>, edges: &BTreeSet<DependencyEdge>) -> PlannedOrder {
    let mut in_degree: BTreeMap<&TableReference, usize> = nodes.iter().map(|n| (n, 0)).collect();
    let mut dependents: BTreeMap<&TableReference, Vec<&TableReference>> = BTreeMap::new();

    for edge in edges {
        if !nodes.contains(&edge.referenced) || !nodes.contains(&edge.referencing) {
            continue;
        }
        if edge.referenced == edge.referencing {
            continue;
        }
        if let Some(degree) = in_degree.get_mut(&edge.referencing) {
            *degree += 1;
        }
        dependents.entry(&edge.referenced).or_default().push(&edge.referencing);
    }

    let mut planned = PlannedOrder::default();

    while !in_degree.is_empty() {
        let ready: Vec<&TableReference> = in_degree
            .iter()
            .filter(|(_, &degree)| degree == 0)
            .map(|(node, _)| *node)
            .collect();

        if ready.is_empty() {
            let remaining: Vec<TableReference> = in_degree.keys().map(|n| (*n).clone()).collect();
            warn!(
                "Circular dependency among {} views, appending them in name order: {}",
                remaining.len(),
                remaining.iter().map(|r| r.fqn()).collect::<Vec<_>>().join(", ")
            );
            planned.order.extend(remaining.iter().cloned());
            planned.cyclic = remaining;
            break;
        }

        for node in ready {
            in_degree.remove(node);
            if let Some(children) = dependents.get(node) {
                for child in children {
                    if let Some(degree) = in_degree.get_mut(child) {
                        *degree = degree.saturating_sub(1);
                    }
                }
            }
            planned.order.push(node.clone());
        }
    }

    planned
}

#[cfg(test)]
mod tests {
    use super::*;

    fn r(table: &str) -> TableReference {
        TableReference::new("p", "d", table)
    }

    fn nodes(names: &[&str]) -> BTreeSet<TableReference> {
        names.iter().map(|n| r(n)).collect()
    }

    /// `(referenced, referencing)` pairs.
    fn edges(pairs: &[(&str, &str)]) -> BTreeSet<DependencyEdge> {
        pairs.iter().map(|(a, b)| DependencyEdge::new(r(a), r(b))).collect()
    }

    fn position(plan: &PlannedOrder, name: &str) -> usize {
        plan.order.iter().position(|n| n == &r(name)).unwrap()
    }

    #[test]
    fn test_dependencies_come_first() {
        // v reads a and b, a reads base, b reads base
        let plan = order(
            &nodes(&["v", "a", "b", "base"]),
            &edges(&[("a", "v"), ("b", "v"), ("base", "a"), ("base", "b")]),
        );

        assert_eq!(plan.order, vec![r("base"), r("a"), r("b"), r("v")]);
        assert!(!plan.has_cycles());
    }

    #[test]
    fn test_every_edge_respected_in_wider_graph() {
        let all = nodes(&["a", "b", "c", "d", "e", "f"]);
        let deps = edges(&[("f", "a"), ("e", "a"), ("d", "b"), ("c", "b"), ("f", "c"), ("e", "d"), ("b", "a")]);
        let plan = order(&all, &deps);

        assert_eq!(plan.len(), all.len());
        for edge in &deps {
            assert!(
                position(&plan, &edge.referenced.table) < position(&plan, &edge.referencing.table),
                "{} should precede {}",
                edge.referenced,
                edge.referencing
            );
        }
    }

    #[test]
    fn test_two_node_cycle() {
        let plan = order(&nodes(&["a", "b"]), &edges(&[("a", "b"), ("b", "a")]));
        assert_eq!(plan.order, vec![r("a"), r("b")]);
        assert_eq!(plan.cyclic, vec![r("a"), r("b")]);
    }

    #[test]
    fn test_cycle_after_acyclic_prefix() {
        // base feeds a cycle between x and y; z reads y
        let plan = order(
            &nodes(&["base", "x", "y", "z"]),
            &edges(&[("base", "x"), ("x", "y"), ("y", "x"), ("y", "z")]),
        );

        assert_eq!(plan.order[0], r("base"));
        assert_eq!(plan.len(), 4);
        assert_eq!(plan.cyclic, vec![r("x"), r("y"), r("z")]);
        let unique: BTreeSet<_> = plan.order.iter().collect();
        assert_eq!(unique.len(), 4);
    }

    #[test]
    fn test_edges_outside_node_set_ignored() {
        let plan = order(&nodes(&["a", "b"]), &edges(&[("outside", "a"), ("a", "b")]));
        assert_eq!(plan.order, vec![r("a"), r("b")]);
        assert!(plan.cyclic.is_empty());
    }

    #[test]
    fn test_empty_and_singleton() {
        assert!(order(&BTreeSet::new(), &BTreeSet::new()).is_empty());
        let plan = order(&nodes(&["only"]), &edges(&[("only", "only")]));
        assert_eq!(plan.order, vec![r("only")]);
        assert!(!plan.has_cycles());
    }
}
