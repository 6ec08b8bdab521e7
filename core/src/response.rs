//! Normalized view of one backend reply.
//!
//! # Design
//! The backend wraps every payload in an envelope:
//! `{"message": "...", "code": 0, "data": {...}}`. `ApiResponse` pulls the
//! envelope fields out once so callers never touch the raw map. Typed models
//! are decoded from `data` (the whole envelope re-serialized), while `dict`
//! only exposes the nested `data` object for debugging.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Value of `code` when the envelope carries none.
pub const MISSING_CODE: i64 = -1;

/// Typed view of the backend envelope, for services whose result is the
/// nested `data` object: `ApiService<Envelope<Recipe>>`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Envelope<T> {
    #[serde(default)]
    pub message: Option<String>,
    #[serde(default)]
    pub code: Option<i64>,
    pub data: T,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    message: Option<String>,
    code: i64,
    dict: Map<String, Value>,
    data: Option<Vec<u8>>,
    status_code: Option<u16>,
}

impl ApiResponse {
    /// Build from the pieces a transport result yields.
    ///
    /// A missing `dict` is the empty envelope. `data` is always re-serialized
    /// from the dict, so the supplied bytes only survive if that fails. The
    /// envelope's `message` wins over the explicit `message`.
    pub fn new(
        dict: Option<Map<String, Value>>,
        data: Option<Vec<u8>>,
        message: Option<String>,
        status_code: Option<u16>,
    ) -> Self {
        let dict = dict.unwrap_or_default();
        let message = dict
            .get("message")
            .and_then(Value::as_str)
            .map(str::to_string)
            .or(message);
        let code = dict.get("code").and_then(integral).unwrap_or(MISSING_CODE);
        let nested = match dict.get("data") {
            Some(Value::Object(nested)) => nested.clone(),
            _ => Map::new(),
        };
        let data = serde_json::to_vec(&dict).ok().or(data);

        Self {
            message,
            code,
            dict: nested,
            data,
            status_code,
        }
    }

    /// A response built from a decoded envelope.
    pub fn from_dict(dict: Map<String, Value>, status_code: Option<u16>) -> Self {
        Self::new(Some(dict), None, None, status_code)
    }

    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    pub fn code(&self) -> i64 {
        self.code
    }

    /// The envelope's nested `data` object. Use it for debugging only; decode
    /// models from [`data`](Self::data).
    pub fn dict(&self) -> &Map<String, Value> {
        &self.dict
    }

    pub fn data(&self) -> Option<&[u8]> {
        self.data.as_deref()
    }

    pub fn status_code(&self) -> Option<u16> {
        self.status_code
    }
}

/// An integer, or a float with no fractional part (`7.0`).
fn integral(value: &Value) -> Option<i64> {
    value.as_i64().or_else(|| {
        value
            .as_f64()
            .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
            .map(|f| f as i64)
    })
}
