mod executor;

pub use executor::{refresh_statement, NodeOutcome, RefreshExecutor, RefreshOutcome, RefreshReport};

use tracing::{info, warn};
use crate::error::Result;
use crate::lineage::{GraphBuilder, PlannedOrder, DEFAULT_MAX_DEPTH};
use crate::reference::TableReference;
use crate::warehouse::Warehouse;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshOptions {
    pub max_depth: usize,
    pub dry_run: bool,
}

impl Default for RefreshOptions {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            dry_run: false,
        }
    }
}

impl RefreshOptions {
    pub fn dry_run() -> Self {
        Self {
            dry_run: true,
            ..Self::default()
        }
    }

    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }
}

/// Discovers everything `start` reads from, orders it and rebuilds each view.
///
/// Returns `Err` only when `start` cannot be resolved.
pub async fn refresh_recursive<W: Warehouse + ?Sized>(
    warehouse: &W,
    start: &TableReference,
    options: RefreshOptions,
) -> Result<RefreshReport> {
    let graph = GraphBuilder::new(warehouse)
        .with_max_depth(options.max_depth)
        .build(start)
        .await?;

    let plan = PlannedOrder::for_graph(&graph);
    if plan.has_cycles() {
        warn!("{} views are part of a dependency cycle", plan.cyclic.len());
    }

    info!(
        "{} {} nodes starting from {}",
        if options.dry_run { "Planning" } else { "Refreshing" },
        plan.len(),
        start
    );

    let mut report = RefreshExecutor::new(warehouse)
        .execute(start, &plan, options.dry_run)
        .await;
    report.unresolved = graph.unresolved;

    Ok(report)
}
