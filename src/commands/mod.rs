//! Command handlers
//!
//! Transport-agnostic entry points: each takes the shared state plus raw
//! request parameters and returns a [`CommandResponse`] carrying the HTTP
//! status and the JSON body. The CLI calls them directly; an HTTP adapter
//! only has to copy `status()` and the serialized body onto its response.

pub mod metrics;
pub mod table_data;

use serde::Serialize;
use studio_core::{EngineError, EngineResult};

/// `{"error": {"code": ..., "message": ...}}`
#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    #[serde(skip)]
    pub status: u16,
}

#[derive(Debug, Clone, Serialize, PartialEq, Eq)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

impl From<&EngineError> for ErrorResponse {
    fn from(err: &EngineError) -> Self {
        Self {
            error: ErrorBody {
                code: err.code(),
                message: err.to_string(),
            },
            status: err.status_code(),
        }
    }
}

/// Success payload or error body, serialized without a wrapper
#[derive(Debug, Serialize)]
#[serde(untagged)]
pub enum CommandResponse<T> {
    Ok(T),
    Err(ErrorResponse),
}

impl<T> CommandResponse<T> {
    pub fn status(&self) -> u16 {
        match self {
            CommandResponse::Ok(_) => 200,
            CommandResponse::Err(err) => err.status,
        }
    }

    pub fn is_ok(&self) -> bool {
        matches!(self, CommandResponse::Ok(_))
    }

    pub fn ok(self) -> Option<T> {
        match self {
            CommandResponse::Ok(value) => Some(value),
            CommandResponse::Err(_) => None,
        }
    }

    pub fn err(self) -> Option<ErrorResponse> {
        match self {
            CommandResponse::Ok(_) => None,
            CommandResponse::Err(err) => Some(err),
        }
    }
}

impl<T> From<EngineResult<T>> for CommandResponse<T> {
    fn from(result: EngineResult<T>) -> Self {
        match result {
            Ok(value) => CommandResponse::Ok(value),
            Err(err) => CommandResponse::Err(ErrorResponse::from(&err)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_error_body_shape() {
        let response: CommandResponse<()> =
            Err(EngineError::unknown_column("droptable;--")).into();
        assert_eq!(response.status(), 400);

        let body = serde_json::to_value(&response).unwrap();
        assert_eq!(body["error"]["code"], json!("UNKNOWN_COLUMN"));
        assert!(body["error"]["message"]
            .as_str()
            .unwrap()
            .contains("droptable;--"));
        assert!(body.get("status").is_none());
    }

    #[test]
    fn test_success_is_unwrapped() {
        let response: CommandResponse<Vec<u32>> = Ok(vec![1, 2]).into();
        assert_eq!(response.status(), 200);
        assert_eq!(serde_json::to_value(&response).unwrap(), json!([1, 2]));
    }
}
