//! Table browsing commands
//!
//! `params` are the raw query parameters of the request (see
//! [`studio_query::params`] for the accepted keys).

use std::collections::HashMap;

use studio_core::{EngineResult, PageResult, TableList, TableSchema};
use studio_query::params::{PARAM_DATABASE, PARAM_SCHEMA};
use studio_query::{parse_table_data_request, parse_table_list_options};
use tracing::instrument;

use super::CommandResponse;
use crate::engine::registry::DatabaseInfo;
use crate::engine::table_data::fetch_table_data;
use crate::metrics;
use crate::StudioState;

fn param<'a>(params: &'a HashMap<String, String>, name: &str) -> Option<&'a str> {
    params
        .get(name)
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
}

/// Returns one page of rows of `table`.
#[instrument(skip(state, params), fields(table = %table))]
pub async fn get_table_data(
    state: &StudioState,
    table: &str,
    params: &HashMap<String, String>,
) -> CommandResponse<PageResult> {
    let limits = state.page_limits();

    let prepared = parse_table_data_request(table, params, &limits).and_then(|request| {
        let engine = state.registry.get(request.database.as_deref())?;
        Ok((request, engine))
    });
    let (request, engine) = match prepared {
        Ok(prepared) => prepared,
        Err(err) => {
            // Rejected before reaching the fetcher
            metrics::record_failure(0.0, &err);
            tracing::info!(code = err.code(), error = %err, "Table data request rejected");
            return CommandResponse::from(Err(err));
        }
    };

    fetch_table_data(engine.as_ref(), &request, state.default_schema(), &limits)
        .await
        .into()
}

/// Lists browsable tables with kind and row estimates.
///
/// Accepts `search`, `page`, `pageSize`, `schema` and `database`.
#[instrument(skip(state, params))]
pub async fn list_tables(
    state: &StudioState,
    params: &HashMap<String, String>,
) -> CommandResponse<TableList> {
    let result: EngineResult<TableList> = async {
        let options = parse_table_list_options(params)?;
        let engine = state.registry.get(param(params, PARAM_DATABASE))?;
        let schema = param(params, PARAM_SCHEMA).unwrap_or(state.default_schema());
        engine.list_table_summaries(schema, &options).await
    }
    .await;

    if let Err(err) = &result {
        tracing::warn!(code = err.code(), error = %err, "Failed to list tables");
    }
    result.into()
}

/// Columns, keys and row estimate of `table`.
#[instrument(skip(state, params), fields(table = %table))]
pub async fn describe_table(
    state: &StudioState,
    table: &str,
    params: &HashMap<String, String>,
) -> CommandResponse<TableSchema> {
    let result: EngineResult<TableSchema> = async {
        let engine = state.registry.get(param(params, PARAM_DATABASE))?;
        let schema = param(params, PARAM_SCHEMA).unwrap_or(state.default_schema());
        let catalog = engine.list_tables(schema).await?;
        let identifier = catalog.resolve(table)?;
        engine.describe_table(&identifier).await
    }
    .await;

    if let Err(err) = &result {
        tracing::warn!(code = err.code(), error = %err, "Failed to describe table");
    }
    result.into()
}

/// Configured databases, sorted by name
pub fn list_databases(state: &StudioState) -> CommandResponse<Vec<DatabaseInfo>> {
    CommandResponse::Ok(state.registry.list())
}
