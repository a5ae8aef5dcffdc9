//! Universal data types for the table-data query layer
//!
//! Catalog metadata, request shapes, generated statements and page results
//! shared by the builder, the drivers and the command layer.

use compact_str::CompactString;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::error::{EngineError, EngineResult};

/// Unique identifier for one table-data fetch, used to correlate log lines
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct QueryId(pub Uuid);

impl QueryId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for QueryId {
    fn default() -> Self {
        Self::new()
    }
}

/// Universal value representation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Text(String),
    Bytes(#[serde(with = "base64_bytes")] Vec<u8>),
    // Before `Json` so untagged input arrays decode element-wise.
    Array(Vec<Value>),
    Json(serde_json::Value),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }
}

mod base64_bytes {
    use base64::{engine::general_purpose::STANDARD, Engine};
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(&STANDARD.encode(bytes))
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Vec<u8>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        STANDARD.decode(&s).map_err(serde::de::Error::custom)
    }
}

// ==================== Catalog Types ====================

/// Kind of relation listed by the metadata reader
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TableKind {
    Table,
    PartitionedTable,
    View,
    MaterializedView,
    ForeignTable,
}

/// Allow-list of relation names in one non-system schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableCatalog {
    pub schema: String,
    pub tables: Vec<String>,
}

impl TableCatalog {
    pub fn new(schema: impl Into<String>, tables: Vec<String>) -> Self {
        Self {
            schema: schema.into(),
            tables,
        }
    }

    pub fn contains(&self, name: &str) -> bool {
        self.tables.iter().any(|t| t == name)
    }

    /// Exact, case-sensitive lookup. This is the only way to obtain a
    /// [`TableIdentifier`].
    pub fn resolve(&self, name: &str) -> EngineResult<TableIdentifier> {
        if self.contains(name) {
            Ok(TableIdentifier {
                schema: self.schema.clone(),
                name: name.to_string(),
            })
        } else {
            Err(EngineError::unknown_table(name))
        }
    }
}

/// A table name that was matched against catalog metadata
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct TableIdentifier {
    schema: String,
    name: String,
}

impl TableIdentifier {
    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

/// Column metadata read from the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDescriptor {
    pub name: CompactString,
    /// Display type including modifiers, e.g. `character varying(255)`
    pub data_type: CompactString,
    /// Base type without modifiers, used to cast bound parameters
    pub cast_type: CompactString,
    pub nullable: bool,
    pub is_primary_key: bool,
    pub is_foreign_key: bool,
    pub referenced_table: Option<String>,
    pub referenced_column: Option<String>,
    pub default_value: Option<String>,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<CompactString>, data_type: impl Into<CompactString>) -> Self {
        let data_type = data_type.into();
        Self {
            name: name.into(),
            cast_type: data_type.clone(),
            data_type,
            nullable: true,
            is_primary_key: false,
            is_foreign_key: false,
            referenced_table: None,
            referenced_column: None,
            default_value: None,
        }
    }

    pub fn primary_key(mut self) -> Self {
        self.is_primary_key = true;
        self.nullable = false;
        self
    }

    pub fn references(mut self, table: impl Into<String>, column: impl Into<String>) -> Self {
        self.is_foreign_key = true;
        self.referenced_table = Some(table.into());
        self.referenced_column = Some(column.into());
        self
    }
}

/// Foreign Key definition
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKey {
    pub column: String,
    pub referenced_table: String,
    pub referenced_column: String,
    pub constraint_name: Option<String>,
}

/// Table schema metadata
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSchema {
    pub schema: String,
    pub table: String,
    pub columns: Vec<ColumnDescriptor>,
    pub primary_key: Option<Vec<String>>,
    pub foreign_keys: Vec<ForeignKey>,
    /// Planner estimate; `None` when the table was never analyzed
    pub row_count_estimate: Option<u64>,
}

// ==================== Table List Types ====================

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TableListOptions {
    pub search: Option<String>,
    pub page: Option<u32>,
    pub page_size: Option<u32>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableSummary {
    pub name: String,
    pub kind: TableKind,
    pub row_count_estimate: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableList {
    pub schema: String,
    pub tables: Vec<TableSummary>,
    pub total_count: u64,
}

// ==================== Table Query Types ====================

/// Sort direction for query results
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    #[default]
    Asc,
    Desc,
}

impl SortDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDirection::Asc => "ASC",
            SortDirection::Desc => "DESC",
        }
    }
}

/// One `ORDER BY` key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SortKey {
    pub column_name: String,
    #[serde(default)]
    pub direction: SortDirection,
}

impl SortKey {
    pub fn new(column_name: impl Into<String>, direction: SortDirection) -> Self {
        Self {
            column_name: column_name.into(),
            direction,
        }
    }
}

/// Ordered sort keys; the first entry is the primary key of the ordering
pub type SortSpec = Vec<SortKey>;

/// Filter operator for WHERE clauses
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    #[default]
    Eq,
    Neq,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    #[serde(rename = "ilike")]
    ILike,
    In,
    IsNull,
    IsNotNull,
}

/// Column filter for WHERE clauses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnFilter {
    pub column_name: String,
    pub operator: FilterOperator,
    #[serde(default = "null_value")]
    pub value: Value,
}

fn null_value() -> Value {
    Value::Null
}

impl ColumnFilter {
    pub fn new(column_name: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            column_name: column_name.into(),
            operator,
            value,
        }
    }
}

/// Filters combined with `AND`
pub type FilterSpec = Vec<ColumnFilter>;

/// Requested page; values are validated by the builder, so they may be
/// out of range here
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub page: i64,
    pub page_size: i64,
}

impl PageRequest {
    pub fn new(page: i64, page_size: i64) -> Self {
        Self { page, page_size }
    }

    /// Rejects non-positive values, page sizes above `limits.max_page_size`
    /// and pages whose offset does not fit a PostgreSQL `bigint`
    pub fn validate(&self, limits: &PageLimits) -> EngineResult<()> {
        if self.page < 1 {
            return Err(EngineError::invalid_page(format!(
                "page must be >= 1, got {}",
                self.page
            )));
        }
        if self.page_size < 1 {
            return Err(EngineError::invalid_page(format!(
                "pageSize must be >= 1, got {}",
                self.page_size
            )));
        }
        if self.page_size > limits.max_page_size as i64 {
            return Err(EngineError::invalid_page(format!(
                "pageSize must be <= {}, got {}",
                limits.max_page_size, self.page_size
            )));
        }
        if (self.page - 1).checked_mul(self.page_size).is_none() {
            return Err(EngineError::invalid_page(format!(
                "page {} is out of range for pageSize {}",
                self.page, self.page_size
            )));
        }
        Ok(())
    }

    /// `(page - 1) * page_size`, zero for invalid requests
    pub fn offset(&self) -> u64 {
        (self.page.max(1) as u64 - 1).saturating_mul(self.page_size.max(0) as u64)
    }
}

/// Pagination bounds from configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLimits {
    pub default_page_size: u32,
    pub max_page_size: u32,
}

impl Default for PageLimits {
    fn default() -> Self {
        Self {
            default_page_size: 50,
            max_page_size: 1000,
        }
    }
}

/// Normalized table-data request, independent of the wire format
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDataRequest {
    pub database: Option<String>,
    pub schema: Option<String>,
    pub table: String,
    pub page: PageRequest,
    pub sort: SortSpec,
    pub filters: FilterSpec,
}

impl TableDataRequest {
    pub fn new(table: impl Into<String>, page: PageRequest) -> Self {
        Self {
            database: None,
            schema: None,
            table: table.into(),
            page,
            sort: Vec::new(),
            filters: Vec::new(),
        }
    }

    pub fn with_sort(mut self, key: SortKey) -> Self {
        self.sort.push(key);
        self
    }

    pub fn with_filter(mut self, filter: ColumnFilter) -> Self {
        self.filters.push(filter);
        self
    }
}

// ==================== Statements ====================

/// Parameter bound out-of-band from the statement text, in its textual
/// input form
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BindParam {
    Scalar(Option<String>),
    List(Vec<Option<String>>),
}

/// Parameterized SQL statement
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<BindParam>,
}

/// The two statements needed to serve one page
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PageStatements {
    pub table: TableIdentifier,
    pub data: Statement,
    pub count: Statement,
    pub limit: u64,
    pub offset: u64,
}

/// Raw outcome of executing [`PageStatements`]
#[derive(Debug, Clone, Default)]
pub struct FetchedPage {
    pub total: u64,
    pub rows: Vec<Row>,
}

// ==================== Results ====================

/// A single row of data, serialized as an object in column order
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Row {
    fields: Vec<(CompactString, Value)>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            fields: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, column: impl Into<CompactString>, value: Value) {
        self.fields.push((column.into(), value));
    }

    pub fn with_column(mut self, column: impl Into<CompactString>, value: Value) -> Self {
        self.push(column, value);
        self
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.fields
            .iter()
            .find(|(name, _)| name.as_str() == column)
            .map(|(_, value)| value)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &Value)> {
        self.fields.iter().map(|(name, value)| (name.as_str(), value))
    }
}

impl Serialize for Row {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (name, value) in &self.fields {
            map.serialize_entry(name.as_str(), value)?;
        }
        map.end()
    }
}

/// Pagination metadata returned next to the rows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_pages: u64,
    pub has_next_page: bool,
    pub has_previous_page: bool,
}

impl PageMeta {
    pub fn new(page: u64, limit: u64, total: u64) -> Self {
        let total_pages = if limit == 0 { 0 } else { total.div_ceil(limit) };
        Self {
            page,
            limit,
            total,
            total_pages,
            has_next_page: page < total_pages,
            has_previous_page: page > 1,
        }
    }
}

/// One page of table data
#[derive(Debug, Clone, Serialize)]
pub struct PageResult {
    pub data: Vec<Row>,
    pub meta: PageMeta,
}
