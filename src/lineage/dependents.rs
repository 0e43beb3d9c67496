use std::collections::BTreeSet;
use tracing::{debug, info, warn};
use crate::error::Result;
use crate::reference::{DatasetReference, ReferenceContext, TableReference};
use crate::warehouse::Warehouse;
use super::parser::extract_references;

/// Finds views that read directly from a table or view.
///
/// The catalog search is a substring match on the table name, so every hit is
/// re-checked by parsing its SQL before it is reported.
pub struct DependentsFinder<'a, W: Warehouse + ?Sized> {
    warehouse: &'a W,
}

impl<'a, W: Warehouse + ?Sized> DependentsFinder<'a, W> {
    pub fn new(warehouse: &'a W) -> Self {
        Self { warehouse }
    }

    /// Searches `datasets`, or the target's own dataset when empty.
    pub async fn find(
        &self,
        target: &TableReference,
        datasets: &[DatasetReference],
    ) -> Result<Vec<TableReference>> {
        let searched: BTreeSet<DatasetReference> = if datasets.is_empty() {
            std::iter::once(target.dataset_reference()).collect()
        } else {
            datasets.iter().cloned().collect()
        };

        let mut found: BTreeSet<TableReference> = BTreeSet::new();

        for dataset in &searched {
            let candidates = match self.warehouse.search_view_definitions(dataset, &target.table).await {
                Ok(c) => c,
                Err(e) => {
                    warn!("Search of {} failed: {}", dataset, e);
                    continue;
                }
            };

            debug!("{} candidate views in {}", candidates.len(), dataset);

            for view in candidates {
                if &view.reference == target {
                    continue;
                }
                let context = ReferenceContext::new(view.reference.project.as_str());
                let names_target = extract_references(&view.sql_text)
                    .iter()
                    .filter_map(|c| TableReference::parse(c, &context).ok())
                    .any(|r| &r == target);
                if names_target {
                    found.insert(view.reference);
                }
            }
        }

        info!("{} views read from {}", found.len(), target);
        Ok(found.into_iter().collect())
    }
}
