mod parser;
mod graph;
mod order;
mod dependents;

pub use parser::{extract_references, SqlReferences};
pub use graph::{DependencyEdge, DependencyGraph, GraphBuilder, DEFAULT_MAX_DEPTH};
pub use order::{order, PlannedOrder};
pub use dependents::DependentsFinder;
