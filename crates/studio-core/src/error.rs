// SPDX-License-Identifier: Apache-2.0

//! Normalized error types for the table-data query layer
//!
//! Driver-specific failures are classified into these variants close to
//! where they happen, so callers never see a raw driver error.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Unified error type for all engine operations
#[derive(Debug, Clone, Error, Serialize, Deserialize, PartialEq, Eq)]
pub enum EngineError {
    #[error("Unknown table: {table}")]
    UnknownTable { table: String },

    #[error("Unknown column: {column}")]
    UnknownColumn { column: String },

    #[error("Invalid page request: {message}")]
    InvalidPageRequest { message: String },

    #[error("Invalid request: {message}")]
    InvalidRequest { message: String },

    #[error("Unknown database: {database}")]
    UnknownDatabase { database: String },

    #[error("Database unavailable: {message}")]
    DatabaseUnavailable { message: String },

    #[error("Query execution failed: {message}")]
    QueryExecutionFailed { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl EngineError {
    pub fn unknown_table(table: impl Into<String>) -> Self {
        Self::UnknownTable { table: table.into() }
    }

    pub fn unknown_column(column: impl Into<String>) -> Self {
        Self::UnknownColumn {
            column: column.into(),
        }
    }

    pub fn invalid_page(msg: impl Into<String>) -> Self {
        Self::InvalidPageRequest {
            message: msg.into(),
        }
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::InvalidRequest {
            message: msg.into(),
        }
    }

    pub fn unknown_database(database: impl Into<String>) -> Self {
        Self::UnknownDatabase {
            database: database.into(),
        }
    }

    pub fn unavailable(msg: impl Into<String>) -> Self {
        Self::DatabaseUnavailable {
            message: msg.into(),
        }
    }

    pub fn execution_failed(msg: impl Into<String>) -> Self {
        Self::QueryExecutionFailed {
            message: msg.into(),
        }
    }

    pub fn internal(msg: impl Into<String>) -> Self {
        Self::Internal {
            message: msg.into(),
        }
    }

    /// Stable machine-readable code reported to callers
    pub fn code(&self) -> &'static str {
        match self {
            Self::UnknownTable { .. } => "UNKNOWN_TABLE",
            Self::UnknownColumn { .. } => "UNKNOWN_COLUMN",
            Self::InvalidPageRequest { .. } => "INVALID_PAGE_REQUEST",
            Self::InvalidRequest { .. } => "INVALID_REQUEST",
            Self::UnknownDatabase { .. } => "UNKNOWN_DATABASE",
            Self::DatabaseUnavailable { .. } => "DATABASE_UNAVAILABLE",
            Self::QueryExecutionFailed { .. } => "QUERY_EXECUTION_FAILED",
            Self::Internal { .. } => "INTERNAL",
        }
    }

    /// HTTP-equivalent status for the error
    pub fn status_code(&self) -> u16 {
        match self {
            Self::UnknownTable { .. } | Self::UnknownDatabase { .. } => 404,
            Self::UnknownColumn { .. }
            | Self::InvalidPageRequest { .. }
            | Self::InvalidRequest { .. } => 400,
            Self::DatabaseUnavailable { .. } => 503,
            Self::QueryExecutionFailed { .. } | Self::Internal { .. } => 500,
        }
    }

    /// True for failures caused by the request itself rather than the database
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

/// Result type alias for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
