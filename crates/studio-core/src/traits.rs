//! DataEngine trait definition
//!
//! The seam between the table-data service and a concrete database. Each
//! engine owns its connection pool; the service only ever talks to this
//! trait, which keeps it testable against in-memory fakes.

use async_trait::async_trait;

use crate::error::EngineResult;
use crate::types::{
    ColumnDescriptor, FetchedPage, PageStatements, TableCatalog, TableIdentifier, TableList,
    TableListOptions, TableSchema,
};

#[async_trait]
pub trait DataEngine: Send + Sync {
    /// Returns the unique identifier for this driver (e.g. "postgres")
    fn driver_id(&self) -> &'static str;

    /// Returns a human-readable name for this driver
    fn driver_name(&self) -> &'static str;

    /// Round-trips a trivial statement to verify the database is reachable
    async fn ping(&self) -> EngineResult<()>;

    /// Names of all browsable relations in `schema`.
    ///
    /// System schemas yield an empty catalog.
    async fn list_tables(&self, schema: &str) -> EngineResult<TableCatalog>;

    /// Relations of `schema` with kind and row estimates, filtered and paginated
    async fn list_table_summaries(
        &self,
        schema: &str,
        options: &TableListOptions,
    ) -> EngineResult<TableList>;

    /// Column descriptors in ordinal order; empty when the table is gone
    async fn describe_columns(&self, table: &TableIdentifier)
        -> EngineResult<Vec<ColumnDescriptor>>;

    /// Columns, keys and row estimate for one table
    async fn describe_table(&self, table: &TableIdentifier) -> EngineResult<TableSchema>;

    /// Executes the count and data statements within one read snapshot
    async fn fetch_page(&self, statements: &PageStatements) -> EngineResult<FetchedPage>;

    /// Closes the underlying pool
    async fn close(&self);
}
