use async_trait::async_trait;
use gcp_bigquery_client::Client;
use gcp_bigquery_client::model::get_query_results_parameters::GetQueryResultsParameters;
use gcp_bigquery_client::model::get_query_results_response::GetQueryResultsResponse;
use gcp_bigquery_client::model::query_request::QueryRequest;
use gcp_bigquery_client::model::query_response::{QueryResponse, ResultSet};
use gcp_bigquery_client::table::ListOptions;
use tracing::debug;
use crate::error::{BigQueryError, BqWizardError, Result, parse_bq_error, ErrorContext};
use crate::reference::{DatasetReference, TableReference};
use super::{TableKind, ViewDefinition, ViewSource, Warehouse};

/// Server-side wait per `getQueryResults` call while a job is still running.
const RESULTS_WAIT_MS: i32 = 10_000;

/// Live warehouse backed by the BigQuery REST API.
#[derive(Clone)]
pub struct BqClient {
    client: Client,
    project_id: String,
}

impl BqClient {
    /// Authenticates with application default credentials. Jobs are billed to `project_id`.
    pub async fn new(project_id: impl Into<String>) -> Result<Self> {
        let client = Client::from_application_default_credentials()
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation("client_init");
                BqWizardError::BigQuery(parse_bq_error(e, ctx))
            })?;

        Ok(Self {
            client,
            project_id: project_id.into(),
        })
    }

    pub fn project_id(&self) -> &str {
        &self.project_id
    }

    /// Runs `sql` and waits for the job to finish, returning the first page of rows.
    async fn query(&self, sql: &str, operation: &str) -> Result<QueryResponse> {
        debug!("{}: {}", operation, sql.trim());
        let request = QueryRequest::new(sql);

        let response = self.client
            .job()
            .query(&self.project_id, request)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation(operation)
                    .with_sql(sql);
                BqWizardError::BigQuery(parse_bq_error(e, ctx))
            })?;

        let job = match PendingJob::from_response(&response, operation, &self.project_id)? {
            Some(job) => job,
            None => return Ok(response),
        };

        let mut polls = 0u32;
        loop {
            polls += 1;
            debug!("{}: waiting for job {} (poll {})", operation, job.job_id, polls);
            let results = self.get_results(&job, None, operation).await?;
            if results.job_complete == Some(true) {
                return Ok(QueryResponse::from(results));
            }
        }
    }

    /// Runs `sql` and collects every page of its result.
    async fn query_all_pages(&self, sql: &str, operation: &str) -> Result<Vec<ResultSet>> {
        let first = self.query(sql, operation).await?;
        let job = PendingJob::from_reference(&first, &self.project_id);
        let mut page_token = first.page_token.clone().filter(|t| !t.is_empty());
        let mut pages = vec![ResultSet::new_from_query_response(first)];

        while let Some(token) = page_token.take() {
            let job = job.as_ref().ok_or_else(|| BqWizardError::BigQuery(BigQueryError::JobIncomplete {
                operation: operation.to_string(),
            }))?;
            let page = self.get_results(job, Some(token), operation).await?;
            page_token = page.page_token.clone().filter(|t| !t.is_empty());
            pages.push(ResultSet::new_from_get_query_results_response(page));
        }

        Ok(pages)
    }

    async fn get_results(
        &self,
        job: &PendingJob,
        page_token: Option<String>,
        operation: &str,
    ) -> Result<GetQueryResultsResponse> {
        self.client
            .job()
            .get_query_results(&job.project_id, &job.job_id, job.parameters(page_token))
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new().with_operation(operation);
                BqWizardError::BigQuery(parse_bq_error(e, ctx))
            })
    }
}

/// Identifies a `jobs.query` job whose results must be fetched with `getQueryResults`.
#[derive(Debug, Clone, PartialEq, Eq)]
struct PendingJob {
    project_id: String,
    job_id: String,
    location: Option<String>,
}

impl PendingJob {
    /// `None` when the response already carries a finished job.
    fn from_response(response: &QueryResponse, operation: &str, default_project: &str) -> Result<Option<Self>> {
        if response.job_complete != Some(false) {
            return Ok(None);
        }

        Self::from_reference(response, default_project)
            .map(Some)
            .ok_or_else(|| BqWizardError::BigQuery(BigQueryError::JobIncomplete {
                operation: operation.to_string(),
            }))
    }

    fn from_reference(response: &QueryResponse, default_project: &str) -> Option<Self> {
        let reference = response.job_reference.as_ref()?;
        Some(Self {
            project_id: reference.project_id.clone().unwrap_or_else(|| default_project.to_string()),
            job_id: reference.job_id.clone()?,
            location: reference.location.clone(),
        })
    }

    fn parameters(&self, page_token: Option<String>) -> GetQueryResultsParameters {
        GetQueryResultsParameters {
            location: self.location.clone(),
            page_token,
            timeout_ms: Some(RESULTS_WAIT_MS),
            ..Default::default()
        }
    }
}

#[async_trait]
impl Warehouse for BqClient {
    async fn get_definition(&self, reference: &TableReference) -> Result<ViewDefinition> {
        let table = self.client
            .table()
            .get(&reference.project, &reference.dataset, &reference.table, None)
            .await
            .map_err(|e| {
                let ctx = ErrorContext::new()
                    .with_operation("get_definition")
                    .with_reference(reference);
                BqWizardError::BigQuery(parse_bq_error(e, ctx))
            })?;

        let kind = table.r#type
            .as_deref()
            .map(TableKind::from_api)
            .unwrap_or(TableKind::Table);

        let (sql_text, use_legacy_sql) = match (&kind, table.view) {
            (TableKind::View, Some(view)) => (Some(view.query), view.use_legacy_sql.unwrap_or(false)),
            _ => (None, false),
        };

        Ok(ViewDefinition {
            reference: reference.clone(),
            kind,
            sql_text,
            use_legacy_sql,
        })
    }

    async fn list_tables(&self, dataset: &DatasetReference) -> Result<Vec<TableReference>> {
        let mut references: Vec<TableReference> = Vec::new();
        let mut page_token: Option<String> = None;

        loop {
            let options = match page_token.take() {
                Some(token) => ListOptions::default().page_token(token),
                None => ListOptions::default(),
            };

            let page = self.client
                .table()
                .list(&dataset.project, &dataset.dataset, options)
                .await
                .map_err(|e| {
                    let ctx = ErrorContext::new()
                        .with_operation("list_tables")
                        .with_dataset(dataset.project.as_str(), dataset.dataset.as_str());
                    BqWizardError::BigQuery(parse_bq_error(e, ctx))
                })?;

            references.extend(page.tables.unwrap_or_default().into_iter().map(|t| TableReference::new(
                t.table_reference.project_id,
                t.table_reference.dataset_id,
                t.table_reference.table_id,
            )));

            match page.next_page_token {
                Some(token) if !token.is_empty() => page_token = Some(token),
                _ => break,
            }
        }

        references.sort();
        Ok(references)
    }

    async fn search_view_definitions(
        &self,
        dataset: &DatasetReference,
        pattern: &str,
    ) -> Result<Vec<ViewSource>> {
        let sql = format!(
            r#"
            SELECT table_catalog, table_schema, table_name, view_definition
            FROM `{project}.{dataset}`.INFORMATION_SCHEMA.VIEWS
            WHERE STRPOS(view_definition, '{pattern}') > 0
            ORDER BY table_name
            "#,
            project = dataset.project,
            dataset = dataset.dataset,
            pattern = escape_string_literal(pattern),
        );

        let pages = self.query_all_pages(&sql, "search_view_definitions").await?;
        let mut views = Vec::new();

        for mut rs in pages {
            while rs.next_row() {
                views.push(ViewSource {
                    reference: TableReference::new(
                        string_column(&rs, "table_catalog")?,
                        string_column(&rs, "table_schema")?,
                        string_column(&rs, "table_name")?,
                    ),
                    sql_text: string_column(&rs, "view_definition")?,
                });
            }
        }

        Ok(views)
    }

    async fn run_query(&self, sql: &str) -> Result<()> {
        self.query(sql, "run_query").await.map(|_| ())
    }
}

fn string_column(rs: &ResultSet, name: &str) -> Result<String> {
    rs.get_string_by_name(name)
        .map_err(|e| BqWizardError::Client(format!("Failed to read {}: {}", name, e)))
        .map(|v| v.unwrap_or_default())
}

fn escape_string_literal(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

#[cfg(test)]
mod tests {
    use super::*;
    use gcp_bigquery_client::model::job_reference::JobReference;

    fn response(job_complete: Option<bool>, job_id: Option<&str>) -> QueryResponse {
        QueryResponse {
            job_complete,
            job_reference: job_id.map(|id| JobReference {
                job_id: Some(id.to_string()),
                location: Some("EU".to_string()),
                project_id: None,
            }),
            ..Default::default()
        }
    }

    #[test]
    fn test_running_job_is_polled_not_failed() {
        let job = PendingJob::from_response(&response(Some(false), Some("job_1")), "run_query", "proj")
            .unwrap()
            .unwrap();

        assert_eq!(job.job_id, "job_1");
        assert_eq!(job.project_id, "proj");

        let params = job.parameters(Some("page-2".to_string()));
        assert_eq!(params.location.as_deref(), Some("EU"));
        assert_eq!(params.page_token.as_deref(), Some("page-2"));
        assert_eq!(params.timeout_ms, Some(RESULTS_WAIT_MS));
    }

    #[test]
    fn test_finished_job_needs_no_polling() {
        assert!(PendingJob::from_response(&response(Some(true), Some("job_1")), "run_query", "proj")
            .unwrap()
            .is_none());
        assert!(PendingJob::from_response(&response(None, None), "run_query", "proj")
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_running_job_without_reference_is_incomplete() {
        let err = PendingJob::from_response(&response(Some(false), None), "run_query", "proj").unwrap_err();
        assert!(matches!(err, BqWizardError::BigQuery(BigQueryError::JobIncomplete { .. })));
    }

    #[test]
    fn test_escape_string_literal() {
        assert_eq!(escape_string_literal("orders"), "orders");
        assert_eq!(escape_string_literal("o'brien"), "o\\'brien");
        assert_eq!(escape_string_literal("a\\b"), "a\\\\b");
    }
}
