use std::collections::{BTreeMap, BTreeSet, VecDeque};
use serde::Serialize;
use tracing::{debug, info, warn};
use crate::error::{BqWizardError, Result};
use crate::reference::{ReferenceContext, TableReference};
use crate::warehouse::{ViewDefinition, Warehouse};
use super::parser::extract_references;

pub const DEFAULT_MAX_DEPTH: usize = 10;

/// `referencing`'s SQL names `referenced`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct DependencyEdge {
    pub referenced: TableReference,
    pub referencing: TableReference,
}

impl DependencyEdge {
    pub fn new(referenced: TableReference, referencing: TableReference) -> Self {
        Self { referenced, referencing }
    }
}

/// Upstream neighbourhood of `start`, discovered fresh for one invocation.
#[derive(Debug, Clone, Serialize)]
pub struct DependencyGraph {
    pub start: TableReference,
    pub nodes: BTreeSet<TableReference>,
    pub edges: BTreeSet<DependencyEdge>,
    /// Nodes whose metadata could not be fetched; kept in `nodes` but never expanded.
    pub unresolved: BTreeMap<TableReference, String>,
}

impl DependencyGraph {
    /// Nodes `node` reads from.
    pub fn dependencies_of(&self, node: &TableReference) -> Vec<&TableReference> {
        self.edges
            .iter()
            .filter(|e| &e.referencing == node)
            .map(|e| &e.referenced)
            .collect()
    }

    /// Nodes that read from `node`.
    pub fn dependents_of(&self, node: &TableReference) -> Vec<&TableReference> {
        self.edges
            .iter()
            .filter(|e| &e.referenced == node)
            .map(|e| &e.referencing)
            .collect()
    }

    pub fn contains(&self, node: &TableReference) -> bool {
        self.nodes.contains(node)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Walks from a starting view inward to everything its SQL reads from.
pub struct GraphBuilder<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
    max_depth: usize,
}

impl<'a, W: Warehouse + ?Sized> GraphBuilder<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self {
            warehouse,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    /// Fails only if `start` itself cannot be resolved. A missing start is
    /// `ReferenceNotFound`; other lookup errors are returned as they are.
    pub async fn build(&self, start: &TableReference) -> Result<DependencyGraph> {
        let start_definition = self.resolve_start(start).await?;

        let mut visited: BTreeSet<TableReference> = BTreeSet::new();
        let mut edges: BTreeSet<DependencyEdge> = BTreeSet::new();
        let mut unresolved: BTreeMap<TableReference, String> = BTreeMap::new();
        let mut worklist: VecDeque<(TableReference, usize)> = VecDeque::new();

        visited.insert(start.clone());
        worklist.push_back((start.clone(), 0));
        let mut start_definition = Some(start_definition);

        while let Some((node, depth)) = worklist.pop_front() {
            if depth >= self.max_depth {
                debug!("{} at depth {} not expanded (max depth {})", node, depth, self.max_depth);
                continue;
            }

            let definition = match start_definition.take() {
                Some(def) if def.reference == node => def,
                _ => match self.warehouse.get_definition(&node).await {
                    Ok(def) => def,
                    Err(e) => {
                        warn!("Could not fetch {}: {}", node, e);
                        unresolved.insert(node.clone(), e.to_string());
                        continue;
                    }
                },
            };

            for neighbor in upstream_of(&definition) {
                if neighbor == node {
                    debug!("{} references itself, ignoring", node);
                    continue;
                }
                edges.insert(DependencyEdge::new(neighbor.clone(), node.clone()));
                if visited.insert(neighbor.clone()) {
                    worklist.push_back((neighbor, depth + 1));
                }
            }
        }

        edges.retain(|e| visited.contains(&e.referenced) && visited.contains(&e.referencing));

        info!(
            "Discovered {} nodes and {} edges from {}",
            visited.len(),
            edges.len(),
            start
        );

        Ok(DependencyGraph {
            start: start.clone(),
            nodes: visited,
            edges,
            unresolved,
        })
    }

    async fn resolve_start(&self, start: &TableReference) -> Result<ViewDefinition> {
        self.warehouse.get_definition(start).await.map_err(|e| {
            if e.is_not_found() {
                BqWizardError::ReferenceNotFound(start.fqn())
            } else {
                e
            }
        })
    }
}

/// Direct upstream references of a view; empty for anything that is not a view.
fn upstream_of(definition: &ViewDefinition) -> BTreeSet<TableReference> {
    match (&definition.sql_text, definition.is_view()) {
        (Some(sql), true) => {
            let context = ReferenceContext::new(definition.reference.project.as_str());
            resolve_candidates(extract_references(sql), &context, &definition.reference)
        }
        _ => BTreeSet::new(),
    }
}

/// Normalizes parser output, dropping candidates that are not valid references.
fn resolve_candidates(
    candidates: impl IntoIterator<Item = String>,
    context: &ReferenceContext,
    referencing: &TableReference,
) -> BTreeSet<TableReference> {
    candidates
        .into_iter()
        .filter_map(|candidate| match TableReference::parse(&candidate, context) {
            Ok(reference) => Some(reference),
            Err(e) => {
                warn!("Dropping reference in {}: {}", referencing, e);
                None
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::warehouse::MockWarehouse;

    fn r(table: &str) -> TableReference {
        TableReference::new("p", "d", table)
    }

    #[test]
    fn test_resolve_candidates_drops_malformed() {
        let candidates = vec!["onlytable".to_string(), "d.a".to_string(), "x.y.z".to_string()];
        let resolved = resolve_candidates(candidates, &ReferenceContext::new("p"), &r("v"));
        let expected: BTreeSet<TableReference> =
            [r("a"), TableReference::new("x", "y", "z")].into_iter().collect();
        assert_eq!(resolved, expected);
    }

    #[test]
    fn test_two_part_candidates_take_the_view_project() {
        let def = ViewDefinition::view(TableReference::new("proj-a", "d", "v"), "SELECT * FROM other.t");
        let upstream = upstream_of(&def);
        assert!(upstream.contains(&TableReference::new("proj-a", "other", "t")));
    }

    #[tokio::test]
    async fn test_chain_is_fully_discovered() {
        let wh = MockWarehouse::new()
            .with_view(r("v"), "SELECT * FROM d.a")
            .with_view(r("a"), "SELECT * FROM d.b")
            .with_table(r("b"));

        let graph = GraphBuilder::new(&wh).build(&r("v")).await.unwrap();

        assert_eq!(graph.len(), 3);
        assert_eq!(graph.dependencies_of(&r("v")), vec![&r("a")]);
        assert_eq!(graph.dependents_of(&r("b")), vec![&r("a")]);
        assert!(graph.unresolved.is_empty());
    }

    #[tokio::test]
    async fn test_max_depth_one() {
        let wh = MockWarehouse::new()
            .with_view(r("v"), "SELECT * FROM d.a")
            .with_view(r("a"), "SELECT * FROM d.b")
            .with_view(r("b"), "SELECT * FROM d.c")
            .with_table(r("c"));

        let graph = GraphBuilder::new(&wh).with_max_depth(1).build(&r("v")).await.unwrap();

        let expected: BTreeSet<TableReference> = [r("v"), r("a")].into_iter().collect();
        assert_eq!(graph.nodes, expected);
        assert!(!graph.contains(&r("b")));
        assert!(!graph.contains(&r("c")));
    }

    #[tokio::test]
    async fn test_max_depth_zero_keeps_only_start() {
        let wh = MockWarehouse::new().with_view(r("v"), "SELECT * FROM d.a").with_table(r("a"));
        let graph = GraphBuilder::new(&wh).with_max_depth(0).build(&r("v")).await.unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.edges.is_empty());
    }

    #[tokio::test]
    async fn test_cycle_terminates_and_expands_each_node_once() {
        let wh = MockWarehouse::new()
            .with_view(r("a"), "SELECT * FROM d.b")
            .with_view(r("b"), "SELECT * FROM d.a");

        let graph = GraphBuilder::new(&wh).build(&r("a")).await.unwrap();

        assert_eq!(graph.len(), 2);
        assert_eq!(graph.edges.len(), 2);
        // start is fetched once and reused
        assert_eq!(wh.lookups().await, vec![r("a"), r("b")]);
    }

    #[tokio::test]
    async fn test_self_reference_ignored() {
        let wh = MockWarehouse::new().with_view(r("v"), "SELECT * FROM `p.d.v`");
        let graph = GraphBuilder::new(&wh).build(&r("v")).await.unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.edges.is_empty());
    }

    #[tokio::test]
    async fn test_missing_start_is_fatal() {
        let wh = MockWarehouse::new();
        let err = GraphBuilder::new(&wh).build(&r("nope")).await.unwrap_err();
        assert!(matches!(err, BqWizardError::ReferenceNotFound(ref s) if s == "p.d.nope"));
    }

    #[tokio::test]
    async fn test_start_lookup_error_keeps_its_cause() {
        let wh = MockWarehouse::new()
            .with_view(r("v"), "SELECT 1")
            .fail_lookup(r("v"), "Access Denied: Table p:d.v");

        let err = GraphBuilder::new(&wh).build(&r("v")).await.unwrap_err();

        assert!(matches!(err, BqWizardError::QueryExecution(ref m) if m.starts_with("Access Denied")));
    }

    #[tokio::test]
    async fn test_unresolved_neighbor_does_not_stop_other_branches() {
        let wh = MockWarehouse::new()
            .with_view(r("v"), "SELECT * FROM d.gone JOIN d.a ON TRUE")
            .with_view(r("a"), "SELECT * FROM d.b")
            .with_table(r("b"));

        let graph = GraphBuilder::new(&wh).build(&r("v")).await.unwrap();

        assert!(graph.contains(&r("gone")));
        assert!(graph.unresolved.contains_key(&r("gone")));
        assert!(graph.contains(&r("b")));
    }

    #[tokio::test]
    async fn test_tables_are_leaves() {
        let wh = MockWarehouse::new().with_table(r("t"));
        let graph = GraphBuilder::new(&wh).build(&r("t")).await.unwrap();
        assert_eq!(graph.len(), 1);
        assert!(graph.edges.is_empty());
    }
}
