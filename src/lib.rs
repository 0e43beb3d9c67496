pub mod error;
pub mod reference;
pub mod lineage;
pub mod warehouse;
pub mod refresh;
pub mod config;

pub use error::{BqWizardError, Result};
pub use reference::{DatasetReference, ReferenceContext, TableReference};
pub use lineage::{extract_references, DependencyEdge, DependencyGraph, DependentsFinder, GraphBuilder, PlannedOrder};
pub use warehouse::{BqClient, MockWarehouse, TableKind, ViewDefinition, ViewSource, Warehouse};
pub use refresh::{refresh_recursive, NodeOutcome, RefreshExecutor, RefreshOptions, RefreshOutcome, RefreshReport};
pub use config::Settings;
