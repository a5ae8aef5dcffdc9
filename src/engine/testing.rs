//! In-memory [`DataEngine`] for unit tests.
//!
//! Tables live in one schema. `fetch_page` ignores the SQL and slices the
//! stored rows by the statements' limit and offset; every call is counted
//! so tests can assert which stages ran.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use studio_core::{
    ColumnDescriptor, DataEngine, EngineError, EngineResult, FetchedPage, ForeignKey,
    PageStatements, Row, TableCatalog, TableIdentifier, TableKind, TableList, TableListOptions,
    TableSchema, TableSummary, Value,
};

pub(crate) struct MemoryTable {
    pub name: String,
    pub kind: TableKind,
    pub columns: Vec<ColumnDescriptor>,
    pub rows: Vec<Row>,
}

impl MemoryTable {
    pub fn new(name: &str, columns: Vec<ColumnDescriptor>) -> Self {
        Self {
            name: name.to_string(),
            kind: TableKind::Table,
            columns,
            rows: Vec::new(),
        }
    }

    /// `users(id integer pk, name text)` with `count` rows
    pub fn users(count: i64) -> Self {
        let mut table = Self::new(
            "users",
            vec![
                ColumnDescriptor::new("id", "integer").primary_key(),
                ColumnDescriptor::new("name", "text"),
            ],
        );
        table.rows = (1..=count)
            .map(|id| {
                Row::new()
                    .with_column("id", Value::Int(id))
                    .with_column("name", Value::Text(format!("user-{id}")))
            })
            .collect();
        table
    }
}

#[derive(Default)]
pub(crate) struct CallCounts {
    pub list_tables: AtomicUsize,
    pub describe_columns: AtomicUsize,
    pub fetch_page: AtomicUsize,
}

impl CallCounts {
    pub fn fetches(&self) -> usize {
        self.fetch_page.load(Ordering::SeqCst)
    }

    pub fn catalog_reads(&self) -> usize {
        self.list_tables.load(Ordering::SeqCst)
    }
}

pub(crate) struct MemoryEngine {
    pub schema: String,
    pub tables: Vec<MemoryTable>,
    pub calls: CallCounts,
    pub fail_with: Option<EngineError>,
    pub last_statements: Mutex<Option<PageStatements>>,
}

impl MemoryEngine {
    pub fn new() -> Self {
        Self {
            schema: "public".to_string(),
            tables: Vec::new(),
            calls: CallCounts::default(),
            fail_with: None,
            last_statements: Mutex::new(None),
        }
    }

    pub fn with_table(mut self, table: MemoryTable) -> Self {
        self.tables.push(table);
        self
    }

    /// Makes every data-path call fail with `error`
    pub fn failing(mut self, error: EngineError) -> Self {
        self.fail_with = Some(error);
        self
    }

    fn check_failure(&self) -> EngineResult<()> {
        match &self.fail_with {
            Some(err) => Err(err.clone()),
            None => Ok(()),
        }
    }

    fn table(&self, table: &TableIdentifier) -> Option<&MemoryTable> {
        if table.schema() != self.schema {
            return None;
        }
        self.tables.iter().find(|t| t.name == table.name())
    }
}

#[async_trait]
impl DataEngine for MemoryEngine {
    fn driver_id(&self) -> &'static str {
        "memory"
    }

    fn driver_name(&self) -> &'static str {
        "In-memory"
    }

    async fn ping(&self) -> EngineResult<()> {
        self.check_failure()
    }

    async fn list_tables(&self, schema: &str) -> EngineResult<TableCatalog> {
        self.calls.list_tables.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        let tables = if schema == self.schema {
            self.tables.iter().map(|t| t.name.clone()).collect()
        } else {
            Vec::new()
        };
        Ok(TableCatalog::new(schema, tables))
    }

    async fn list_table_summaries(
        &self,
        schema: &str,
        options: &TableListOptions,
    ) -> EngineResult<TableList> {
        self.check_failure()?;
        let needle = options.search.as_deref().map(str::to_lowercase);
        let matching: Vec<TableSummary> = self
            .tables
            .iter()
            .filter(|_| schema == self.schema)
            .filter(|t| match &needle {
                Some(needle) => t.name.to_lowercase().contains(needle),
                None => true,
            })
            .map(|t| TableSummary {
                name: t.name.clone(),
                kind: t.kind,
                row_count_estimate: Some(t.rows.len() as u64),
            })
            .collect();

        let total_count = matching.len() as u64;
        let tables = match options.page_size {
            Some(size) => {
                let page = options.page.unwrap_or(1).max(1);
                matching
                    .into_iter()
                    .skip(((page - 1) * size) as usize)
                    .take(size as usize)
                    .collect()
            }
            None => matching,
        };

        Ok(TableList {
            schema: schema.to_string(),
            tables,
            total_count,
        })
    }

    async fn describe_columns(
        &self,
        table: &TableIdentifier,
    ) -> EngineResult<Vec<ColumnDescriptor>> {
        self.calls.describe_columns.fetch_add(1, Ordering::SeqCst);
        self.check_failure()?;
        Ok(self
            .table(table)
            .map(|t| t.columns.clone())
            .unwrap_or_default())
    }

    async fn describe_table(&self, table: &TableIdentifier) -> EngineResult<TableSchema> {
        self.check_failure()?;
        let found = self
            .table(table)
            .ok_or_else(|| EngineError::unknown_table(table.name()))?;

        let primary_key: Vec<String> = found
            .columns
            .iter()
            .filter(|c| c.is_primary_key)
            .map(|c| c.name.to_string())
            .collect();
        let foreign_keys = found
            .columns
            .iter()
            .filter_map(|c| {
                Some(ForeignKey {
                    column: c.name.to_string(),
                    referenced_table: c.referenced_table.clone()?,
                    referenced_column: c.referenced_column.clone()?,
                    constraint_name: None,
                })
            })
            .collect();

        Ok(TableSchema {
            schema: self.schema.clone(),
            table: found.name.clone(),
            columns: found.columns.clone(),
            primary_key: if primary_key.is_empty() {
                None
            } else {
                Some(primary_key)
            },
            foreign_keys,
            row_count_estimate: Some(found.rows.len() as u64),
        })
    }

    async fn fetch_page(&self, statements: &PageStatements) -> EngineResult<FetchedPage> {
        self.calls.fetch_page.fetch_add(1, Ordering::SeqCst);
        if let Ok(mut last) = self.last_statements.lock() {
            *last = Some(statements.clone());
        }
        self.check_failure()?;

        let rows = self
            .table(&statements.table)
            .map(|t| t.rows.as_slice())
            .unwrap_or_default();
        Ok(FetchedPage {
            total: rows.len() as u64,
            rows: rows
                .iter()
                .skip(statements.offset as usize)
                .take(statements.limit as usize)
                .cloned()
                .collect(),
        })
    }

    async fn close(&self) {}
}
