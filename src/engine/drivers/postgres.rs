// SPDX-License-Identifier: Apache-2.0

//! PostgreSQL Driver
//!
//! Implements [`DataEngine`] on top of a SQLx connection pool. The pool is
//! created from a [`ConnectionConfig`] and owned by the driver; nothing else
//! in the process opens connections.
//!
//! ## Snapshot reads
//!
//! `fetch_page` runs the count and the data statement on one connection
//! inside a `REPEATABLE READ, READ ONLY` transaction, so the total and the
//! rows describe the same snapshot. Dropping the transaction guard on an
//! early return rolls back and hands the connection back to the pool.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions, PgSslMode};
use studio_core::{
    ColumnDescriptor, DataEngine, EngineError, EngineResult, FetchedPage, ForeignKey,
    PageStatements, TableCatalog, TableIdentifier, TableKind, TableList, TableListOptions,
    TableSchema, TableSummary,
};
use tracing::instrument;

use super::postgres_utils::{bind_param, bind_param_as, convert_row};
use crate::config::ConnectionConfig;
use crate::engine::connection_url::SslMode;

const DEFAULT_MAX_CONNECTIONS: u32 = 5;
const DEFAULT_MIN_CONNECTIONS: u32 = 0;
const DEFAULT_ACQUIRE_TIMEOUT_SECS: u32 = 30;
const APPLICATION_NAME: &str = "dbstudio";

/// Relation kinds shown in the table browser: ordinary, partitioned, view,
/// materialized view, foreign
const BROWSABLE_RELKINDS: &str = "('r', 'p', 'v', 'm', 'f')";

/// PostgreSQL driver implementation
pub struct PostgresDriver {
    pool: PgPool,
}

impl PostgresDriver {
    /// Opens the pool and establishes the configured minimum of connections.
    pub async fn connect(config: &ConnectionConfig) -> EngineResult<Self> {
        let pool = Self::pool_options(config)
            .connect_with(Self::connect_options(config))
            .await
            .map_err(classify_error)?;
        Ok(Self { pool })
    }

    /// Creates the pool without connecting; the first query connects.
    ///
    /// Must be called from within a tokio runtime.
    pub fn connect_lazy(config: &ConnectionConfig) -> Self {
        let pool = Self::pool_options(config).connect_lazy_with(Self::connect_options(config));
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub(crate) fn connect_options(config: &ConnectionConfig) -> PgConnectOptions {
        let mut options = PgConnectOptions::new()
            .host(&config.host)
            .port(config.port)
            .username(&config.username)
            .database(config.database.as_deref().unwrap_or("postgres"))
            .ssl_mode(pg_ssl_mode(config.ssl_mode))
            .application_name(APPLICATION_NAME);

        if let Some(root_cert) = &config.ssl_root_cert {
            options = options.ssl_root_cert(root_cert);
        }

        if !config.password.expose().is_empty() {
            options = options.password(config.password.expose());
        }
        options
    }

    fn pool_options(config: &ConnectionConfig) -> PgPoolOptions {
        let max_connections = config
            .pool_max_connections
            .unwrap_or(DEFAULT_MAX_CONNECTIONS)
            .max(1);
        let min_connections = config
            .pool_min_connections
            .unwrap_or(DEFAULT_MIN_CONNECTIONS)
            .min(max_connections);
        let acquire_timeout = config
            .pool_acquire_timeout_secs
            .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS);

        PgPoolOptions::new()
            .max_connections(max_connections)
            .min_connections(min_connections)
            .acquire_timeout(Duration::from_secs(acquire_timeout as u64))
    }
}

fn pg_ssl_mode(mode: SslMode) -> PgSslMode {
    match mode {
        SslMode::Disable => PgSslMode::Disable,
        SslMode::Allow => PgSslMode::Allow,
        SslMode::Prefer => PgSslMode::Prefer,
        SslMode::Require => PgSslMode::Require,
        SslMode::VerifyCa => PgSslMode::VerifyCa,
        SslMode::VerifyFull => PgSslMode::VerifyFull,
    }
}

/// Schemas that never show up in the browser
pub(crate) fn is_system_schema(schema: &str) -> bool {
    schema == "pg_catalog"
        || schema == "information_schema"
        || schema.starts_with("pg_toast")
        || schema.starts_with("pg_temp_")
}

fn table_kind(relkind: &str) -> TableKind {
    match relkind {
        "p" => TableKind::PartitionedTable,
        "v" => TableKind::View,
        "m" => TableKind::MaterializedView,
        "f" => TableKind::ForeignTable,
        _ => TableKind::Table,
    }
}

/// `reltuples` is -1 (or 0 before PG 14) until the table is analyzed
fn row_estimate(reltuples: f64) -> Option<u64> {
    if reltuples.is_finite() && reltuples >= 0.0 {
        Some(reltuples as u64)
    } else {
        None
    }
}

/// SQLSTATEs that mean the server cannot be used right now
pub(crate) fn is_unavailable_sqlstate(code: &str) -> bool {
    code.starts_with("08") || matches!(code, "57P01" | "57P02" | "57P03" | "53300")
}

/// Maps a SQLx error onto the engine taxonomy.
pub(crate) fn classify_error(err: sqlx::Error) -> EngineError {
    match &err {
        sqlx::Error::Io(_)
        | sqlx::Error::Tls(_)
        | sqlx::Error::PoolTimedOut
        | sqlx::Error::PoolClosed
        | sqlx::Error::WorkerCrashed => EngineError::unavailable(err.to_string()),
        sqlx::Error::Database(db_err) => {
            let message = db_err.message().to_string();
            match db_err.code() {
                Some(code) if is_unavailable_sqlstate(&code) => EngineError::unavailable(message),
                Some(code) => EngineError::execution_failed(format!("{} (SQLSTATE {})", message, code)),
                None => EngineError::execution_failed(message),
            }
        }
        _ => EngineError::execution_failed(err.to_string()),
    }
}

#[async_trait]
impl DataEngine for PostgresDriver {
    fn driver_id(&self) -> &'static str {
        "postgres"
    }

    fn driver_name(&self) -> &'static str {
        "PostgreSQL"
    }

    async fn ping(&self) -> EngineResult<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(classify_error)?;
        Ok(())
    }

    #[instrument(skip(self), level = "debug")]
    async fn list_tables(&self, schema: &str) -> EngineResult<TableCatalog> {
        if is_system_schema(schema) {
            return Ok(TableCatalog::new(schema, Vec::new()));
        }

        let query = format!(
            r#"
            SELECT c.relname::text
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
              AND c.relkind IN {}
            ORDER BY c.relname
            "#,
            BROWSABLE_RELKINDS
        );

        let rows: Vec<(String,)> = sqlx::query_as(&query)
            .bind(schema)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_error)?;

        Ok(TableCatalog::new(
            schema,
            rows.into_iter().map(|(name,)| name).collect(),
        ))
    }

    #[instrument(skip(self, options), level = "debug")]
    async fn list_table_summaries(
        &self,
        schema: &str,
        options: &TableListOptions,
    ) -> EngineResult<TableList> {
        if is_system_schema(schema) {
            return Ok(TableList {
                schema: schema.to_string(),
                tables: Vec::new(),
                total_count: 0,
            });
        }

        let search = options
            .search
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty());

        let filter = format!(
            r#"
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1
              AND c.relkind IN {}
              AND ($2::text IS NULL OR strpos(lower(c.relname), lower($2::text)) > 0)
            "#,
            BROWSABLE_RELKINDS
        );

        let count_query = format!("SELECT COUNT(*) {}", filter);
        let (total_count,): (i64,) = sqlx::query_as(&count_query)
            .bind(schema)
            .bind(search)
            .fetch_one(&self.pool)
            .await
            .map_err(classify_error)?;

        let limit = options.page_size.map(i64::from);
        let offset = match (options.page, options.page_size) {
            (Some(page), Some(size)) => (i64::from(page.max(1)) - 1) * i64::from(size),
            _ => 0,
        };

        let list_query = format!(
            "SELECT c.relname::text, c.relkind::text, c.reltuples::float8 {} ORDER BY c.relname LIMIT $3 OFFSET $4",
            filter
        );
        let rows: Vec<(String, String, f64)> = sqlx::query_as(&list_query)
            .bind(schema)
            .bind(search)
            .bind(limit)
            .bind(offset)
            .fetch_all(&self.pool)
            .await
            .map_err(classify_error)?;

        let tables = rows
            .into_iter()
            .map(|(name, relkind, reltuples)| {
                let kind = table_kind(&relkind);
                let row_count_estimate = match kind {
                    TableKind::View | TableKind::ForeignTable => None,
                    _ => row_estimate(reltuples),
                };
                TableSummary {
                    name,
                    kind,
                    row_count_estimate,
                }
            })
            .collect();

        Ok(TableList {
            schema: schema.to_string(),
            tables,
            total_count: total_count.max(0) as u64,
        })
    }

    #[instrument(skip(self, table), fields(schema = %table.schema(), table = %table.name()), level = "debug")]
    async fn describe_columns(
        &self,
        table: &TableIdentifier,
    ) -> EngineResult<Vec<ColumnDescriptor>> {
        let rows: Vec<(
            String,
            String,
            String,
            bool,
            Option<String>,
            bool,
            Option<String>,
            Option<String>,
        )> = sqlx::query_as(
            r#"
            SELECT
                a.attname::text,
                format_type(a.atttypid, a.atttypmod),
                format_type(a.atttypid, NULL),
                NOT a.attnotnull,
                pg_get_expr(d.adbin, d.adrelid),
                EXISTS (
                    SELECT 1 FROM pg_catalog.pg_constraint pk
                    WHERE pk.conrelid = c.oid
                      AND pk.contype = 'p'
                      AND a.attnum = ANY(pk.conkey)
                ),
                fk.referenced_table,
                fk.referenced_column
            FROM pg_catalog.pg_attribute a
            JOIN pg_catalog.pg_class c ON c.oid = a.attrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            LEFT JOIN pg_catalog.pg_attrdef d ON d.adrelid = a.attrelid AND d.adnum = a.attnum
            LEFT JOIN LATERAL (
                SELECT rc.relname::text AS referenced_table,
                       ra.attname::text AS referenced_column
                FROM pg_catalog.pg_constraint con
                JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
                JOIN pg_catalog.pg_attribute ra
                  ON ra.attrelid = con.confrelid
                 AND ra.attnum = con.confkey[array_position(con.conkey, a.attnum)]
                WHERE con.conrelid = c.oid
                  AND con.contype = 'f'
                  AND a.attnum = ANY(con.conkey)
                ORDER BY con.conname
                LIMIT 1
            ) fk ON TRUE
            WHERE n.nspname = $1
              AND c.relname = $2
              AND a.attnum > 0
              AND NOT a.attisdropped
            ORDER BY a.attnum
            "#,
        )
        .bind(table.schema())
        .bind(table.name())
        .fetch_all(&self.pool)
        .await
        .map_err(classify_error)?;

        let columns = rows
            .into_iter()
            .map(
                |(
                    name,
                    data_type,
                    cast_type,
                    nullable,
                    default_value,
                    is_primary_key,
                    referenced_table,
                    referenced_column,
                )| ColumnDescriptor {
                    name: name.into(),
                    data_type: data_type.into(),
                    cast_type: cast_type.into(),
                    nullable,
                    is_primary_key,
                    is_foreign_key: referenced_table.is_some(),
                    referenced_table,
                    referenced_column,
                    default_value,
                },
            )
            .collect();

        Ok(columns)
    }

    #[instrument(skip(self, table), fields(schema = %table.schema(), table = %table.name()))]
    async fn describe_table(&self, table: &TableIdentifier) -> EngineResult<TableSchema> {
        let columns = self.describe_columns(table).await?;
        if columns.is_empty() {
            return Err(EngineError::unknown_table(table.name()));
        }

        let pk_rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT a.attname::text
            FROM pg_catalog.pg_constraint con
            JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            JOIN pg_catalog.pg_attribute a
              ON a.attrelid = con.conrelid AND a.attnum = ANY(con.conkey)
            WHERE con.contype = 'p'
              AND n.nspname = $1
              AND c.relname = $2
            ORDER BY array_position(con.conkey, a.attnum)
            "#,
        )
        .bind(table.schema())
        .bind(table.name())
        .fetch_all(&self.pool)
        .await
        .map_err(classify_error)?;

        let pk_columns: Vec<String> = pk_rows.into_iter().map(|(name,)| name).collect();

        let fk_rows: Vec<(String, String, String, String)> = sqlx::query_as(
            r#"
            SELECT
                a.attname::text,
                rc.relname::text,
                ra.attname::text,
                con.conname::text
            FROM pg_catalog.pg_constraint con
            JOIN pg_catalog.pg_class c ON c.oid = con.conrelid
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            CROSS JOIN LATERAL unnest(con.conkey, con.confkey) AS k(attnum, refnum)
            JOIN pg_catalog.pg_attribute a ON a.attrelid = con.conrelid AND a.attnum = k.attnum
            JOIN pg_catalog.pg_class rc ON rc.oid = con.confrelid
            JOIN pg_catalog.pg_attribute ra ON ra.attrelid = con.confrelid AND ra.attnum = k.refnum
            WHERE con.contype = 'f'
              AND n.nspname = $1
              AND c.relname = $2
            ORDER BY con.conname, a.attnum
            "#,
        )
        .bind(table.schema())
        .bind(table.name())
        .fetch_all(&self.pool)
        .await
        .map_err(classify_error)?;

        let foreign_keys = fk_rows
            .into_iter()
            .map(
                |(column, referenced_table, referenced_column, constraint_name)| ForeignKey {
                    column,
                    referenced_table,
                    referenced_column,
                    constraint_name: Some(constraint_name),
                },
            )
            .collect();

        let count_row: Option<(f64, String)> = sqlx::query_as(
            r#"
            SELECT c.reltuples::float8, c.relkind::text
            FROM pg_catalog.pg_class c
            JOIN pg_catalog.pg_namespace n ON n.oid = c.relnamespace
            WHERE n.nspname = $1 AND c.relname = $2
            "#,
        )
        .bind(table.schema())
        .bind(table.name())
        .fetch_optional(&self.pool)
        .await
        .map_err(classify_error)?;

        let row_count_estimate = count_row.and_then(|(reltuples, relkind)| {
            match table_kind(&relkind) {
                TableKind::View | TableKind::ForeignTable => None,
                _ => row_estimate(reltuples),
            }
        });

        Ok(TableSchema {
            schema: table.schema().to_string(),
            table: table.name().to_string(),
            columns,
            primary_key: if pk_columns.is_empty() {
                None
            } else {
                Some(pk_columns)
            },
            foreign_keys,
            row_count_estimate,
        })
    }

    #[instrument(
        skip(self, statements),
        fields(
            schema = %statements.table.schema(),
            table = %statements.table.name(),
            limit = statements.limit,
            offset = statements.offset,
        )
    )]
    async fn fetch_page(&self, statements: &PageStatements) -> EngineResult<FetchedPage> {
        let start = Instant::now();

        let mut tx = self.pool.begin().await.map_err(classify_error)?;
        sqlx::query("SET TRANSACTION ISOLATION LEVEL REPEATABLE READ, READ ONLY")
            .execute(&mut *tx)
            .await
            .map_err(classify_error)?;

        let mut count_query = sqlx::query_as::<_, (i64,)>(&statements.count.sql);
        for param in &statements.count.params {
            count_query = bind_param_as(count_query, param);
        }
        let (total,) = count_query
            .fetch_one(&mut *tx)
            .await
            .map_err(classify_error)?;

        let mut data_query = sqlx::query(&statements.data.sql);
        for param in &statements.data.params {
            data_query = bind_param(data_query, param);
        }
        let pg_rows = data_query
            .fetch_all(&mut *tx)
            .await
            .map_err(classify_error)?;

        if let Err(e) = tx.rollback().await {
            tracing::warn!(error = %e, "Failed to end read-only transaction");
        }

        let rows: Vec<_> = pg_rows.iter().map(convert_row).collect();
        tracing::debug!(
            total,
            returned = rows.len(),
            elapsed_ms = start.elapsed().as_secs_f64() * 1000.0,
            "Page fetched"
        );

        Ok(FetchedPage {
            total: total.max(0) as u64,
            rows,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::observability::Sensitive;

    fn config() -> ConnectionConfig {
        ConnectionConfig {
            host: "db.internal".to_string(),
            port: 6432,
            username: "studio".to_string(),
            password: Sensitive::new("pass".to_string()),
            database: Some("shop".to_string()),
            ssl_mode: SslMode::Disable,
            ssl_root_cert: None,
            pool_max_connections: Some(3),
            pool_min_connections: Some(10),
            pool_acquire_timeout_secs: Some(2),
        }
    }

    #[test]
    fn test_connect_options() {
        let options = PostgresDriver::connect_options(&config());
        assert_eq!(options.get_host(), "db.internal");
        assert_eq!(options.get_port(), 6432);
        assert_eq!(options.get_username(), "studio");
        assert_eq!(options.get_database(), Some("shop"));
        assert!(matches!(options.get_ssl_mode(), PgSslMode::Disable));
        assert_eq!(options.get_application_name(), Some(APPLICATION_NAME));

        let mut no_db = config();
        no_db.database = None;
        let options = PostgresDriver::connect_options(&no_db);
        assert_eq!(options.get_database(), Some("postgres"));
    }

    #[test]
    fn test_connect_options_ssl_modes() {
        let cases = [
            (SslMode::Disable, PgSslMode::Disable),
            (SslMode::Allow, PgSslMode::Allow),
            (SslMode::Prefer, PgSslMode::Prefer),
            (SslMode::Require, PgSslMode::Require),
            (SslMode::VerifyCa, PgSslMode::VerifyCa),
            (SslMode::VerifyFull, PgSslMode::VerifyFull),
        ];
        for (mode, expected) in cases {
            let mut conn = config();
            conn.ssl_mode = mode;
            let options = PostgresDriver::connect_options(&conn);
            assert_eq!(
                std::mem::discriminant(&options.get_ssl_mode()),
                std::mem::discriminant(&expected),
                "sslmode {}",
                mode
            );
        }
    }

    #[test]
    fn test_connect_options_from_verify_full_url() {
        let conn = ConnectionConfig::from_url(
            "postgres://studio@[::1]:6432/shop?sslmode=verify-full&sslrootcert=%2Fcerts%2Fca.pem",
        )
        .unwrap();
        let options = PostgresDriver::connect_options(&conn);
        assert_eq!(options.get_host(), "::1");
        assert!(matches!(options.get_ssl_mode(), PgSslMode::VerifyFull));
    }

    #[test]
    fn test_pool_options_clamp_min_to_max() {
        let options = PostgresDriver::pool_options(&config());
        assert_eq!(options.get_max_connections(), 3);
        assert_eq!(options.get_min_connections(), 3);
        assert_eq!(options.get_acquire_timeout(), Duration::from_secs(2));
    }

    #[test]
    fn test_system_schemas() {
        assert!(is_system_schema("pg_catalog"));
        assert!(is_system_schema("information_schema"));
        assert!(is_system_schema("pg_toast"));
        assert!(is_system_schema("pg_temp_3"));
        assert!(!is_system_schema("public"));
        assert!(!is_system_schema("pgstuff"));
    }

    #[test]
    fn test_table_kind_and_estimates() {
        assert_eq!(table_kind("r"), TableKind::Table);
        assert_eq!(table_kind("p"), TableKind::PartitionedTable);
        assert_eq!(table_kind("v"), TableKind::View);
        assert_eq!(table_kind("m"), TableKind::MaterializedView);
        assert_eq!(table_kind("f"), TableKind::ForeignTable);

        assert_eq!(row_estimate(-1.0), None);
        assert_eq!(row_estimate(1234.0), Some(1234));
    }

    #[test]
    fn test_unavailable_sqlstates() {
        assert!(is_unavailable_sqlstate("08006"));
        assert!(is_unavailable_sqlstate("08001"));
        assert!(is_unavailable_sqlstate("57P01"));
        assert!(is_unavailable_sqlstate("53300"));
        assert!(!is_unavailable_sqlstate("42P01"));
        assert!(!is_unavailable_sqlstate("22P02"));
    }

    #[test]
    fn test_classify_error() {
        let err = classify_error(sqlx::Error::PoolTimedOut);
        assert_eq!(err.code(), "DATABASE_UNAVAILABLE");
        assert_eq!(err.status_code(), 503);

        let io = std::io::Error::new(std::io::ErrorKind::ConnectionRefused, "refused");
        assert_eq!(classify_error(sqlx::Error::Io(io)).code(), "DATABASE_UNAVAILABLE");

        let err = classify_error(sqlx::Error::Protocol("unexpected message".to_string()));
        assert_eq!(err.code(), "QUERY_EXECUTION_FAILED");
        assert!(err.to_string().contains("unexpected message"));
    }

    #[tokio::test]
    async fn test_lazy_pool_does_not_connect() {
        let driver = PostgresDriver::connect_lazy(&config());
        assert_eq!(driver.pool().size(), 0);
        assert_eq!(driver.driver_id(), "postgres");
        driver.close().await;
    }
}
