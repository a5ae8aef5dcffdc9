//! Table data fetcher
//!
//! Orchestrates one page read: validate the page request, resolve the
//! table against the catalog, read its columns, build the statements and
//! run them through the engine. Nothing reaches the database before the
//! table name has matched the catalog.

use std::time::Instant;

use studio_core::{
    DataEngine, EngineError, EngineResult, PageLimits, PageMeta, PageResult, QueryId,
    TableDataRequest,
};
use studio_query::build_page_statements;
use tracing::instrument;

use crate::metrics;

/// Fetches one page of `request.table`.
///
/// `default_schema` applies when the request names no schema.
#[instrument(
    skip(engine, request, default_schema, limits),
    fields(
        query_id = %QueryId::new().0,
        driver = engine.driver_id(),
        database = ?request.database,
        schema = request.schema.as_deref().unwrap_or(default_schema),
        table = %request.table,
        page = request.page.page,
        page_size = request.page.page_size,
    )
)]
pub async fn fetch_table_data(
    engine: &dyn DataEngine,
    request: &TableDataRequest,
    default_schema: &str,
    limits: &PageLimits,
) -> EngineResult<PageResult> {
    let start = Instant::now();
    let result = fetch(engine, request, default_schema, limits).await;
    let elapsed_ms = start.elapsed().as_secs_f64() * 1000.0;

    match &result {
        Ok(page) => {
            metrics::record_fetch(elapsed_ms, page.data.len());
            tracing::info!(
                total = page.meta.total,
                returned = page.data.len(),
                elapsed_ms,
                "Table data fetched"
            );
        }
        Err(err) => {
            metrics::record_failure(elapsed_ms, err);
            if err.is_client_error() {
                tracing::info!(code = err.code(), error = %err, "Table data request rejected");
            } else {
                tracing::error!(code = err.code(), error = %err, elapsed_ms, "Table data fetch failed");
            }
        }
    }

    result
}

async fn fetch(
    engine: &dyn DataEngine,
    request: &TableDataRequest,
    default_schema: &str,
    limits: &PageLimits,
) -> EngineResult<PageResult> {
    request.page.validate(limits)?;

    let schema = request.schema.as_deref().unwrap_or(default_schema);
    let catalog = engine.list_tables(schema).await?;
    let table = catalog.resolve(&request.table)?;

    let columns = engine.describe_columns(&table).await?;
    if columns.is_empty() {
        // Dropped between the catalog read and the column read
        return Err(EngineError::unknown_table(table.name()));
    }

    let statements = build_page_statements(request, &catalog, &columns, limits)?;
    let fetched = engine.fetch_page(&statements).await?;

    Ok(PageResult {
        meta: PageMeta::new(request.page.page as u64, statements.limit, fetched.total),
        data: fetched.rows,
    })
}
