//! Error types surfaced by the networking layer.
//!
//! # Design
//! `ApiError` is what callers see in their failure callback. It is a value,
//! not a classification: whatever message, code and status the backend gave
//! are carried through, and an empty error stands for "something failed and
//! there is nothing more to say" (decode mismatches land here).
//!
//! `TransportError` and `DecodeError` describe the lower layers and never
//! reach a failure callback directly.

use std::fmt;

use serde_json::{Map, Value};

use crate::response::{ApiResponse, MISSING_CODE};

/// Message shown when neither the error nor the caller supplies one.
pub const DEFAULT_ERROR_MESSAGE: &str = "Something went wrong. Please try again later.";

/// A user-facing failure.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiError {
    /// The backend's `message`, if any.
    pub message: Option<String>,

    /// The backend's `code`, `-1` when absent.
    pub code: i64,

    /// The nested `data` object of the failing response.
    pub extra_info: Map<String, Value>,

    /// HTTP status, absent when no response arrived.
    pub status_code: Option<u16>,
}

impl ApiError {
    pub fn new(
        message: Option<String>,
        code: i64,
        extra_info: Map<String, Value>,
        status_code: Option<u16>,
    ) -> Self {
        Self {
            message,
            code,
            extra_info,
            status_code,
        }
    }

    pub fn from_response(response: &ApiResponse) -> Self {
        Self {
            message: response.message().map(str::to_string),
            code: response.code(),
            extra_info: response.dict().clone(),
            status_code: response.status_code(),
        }
    }

    /// An unspecified failure: no message, code `-1`, nothing else.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::empty()
    }

    /// The message to show: own message, else `fallback`, else
    /// [`DEFAULT_ERROR_MESSAGE`].
    pub fn display_message(&self, fallback: Option<&str>) -> String {
        self.message
            .as_deref()
            .or(fallback)
            .unwrap_or(DEFAULT_ERROR_MESSAGE)
            .to_string()
    }
}

impl Default for ApiError {
    fn default() -> Self {
        Self {
            message: None,
            code: MISSING_CODE,
            extra_info: Map::new(),
            status_code: None,
        }
    }
}

impl From<&ApiResponse> for ApiError {
    fn from(response: &ApiResponse) -> Self {
        Self::from_response(response)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status_code {
            Some(status) => write!(f, "HTTP {status}: {}", self.display_message(None)),
            None => write!(f, "{}", self.display_message(None)),
        }
    }
}

impl std::error::Error for ApiError {}

/// Failures below the HTTP layer. Any status code, including 4xx/5xx, is a
/// response and not a `TransportError`.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransportError {
    #[error("request cancelled")]
    Cancelled,
    #[error("network error: {0}")]
    Network(String),
}

/// A response body that does not fit the requested model.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("response body is not valid JSON: {0}")]
    Syntax(#[source] serde_json::Error),
    #[error("response body does not match the expected shape: {0}")]
    Shape(#[source] serde_json::Error),
}
