//! JSON decoding of typed results.
//!
//! The backend speaks `snake_case`. Models declare `camelCase` field names
//! (`#[serde(rename_all = "camelCase")]`) and the decoder rewrites every
//! object key before handing the tree to serde.

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};

use crate::error::DecodeError;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum KeyDecodingStrategy {
    /// Keys are passed to serde unchanged.
    UseDefaultKeys,
    /// `cook_time_minutes` becomes `cookTimeMinutes`, recursively.
    #[default]
    ConvertFromSnakeCase,
}

/// Decoder shared by every service of one [`ApiClient`](crate::client::ApiClient).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApiDecoder {
    key_strategy: KeyDecodingStrategy,
}

impl ApiDecoder {
    pub fn new(key_strategy: KeyDecodingStrategy) -> Self {
        Self { key_strategy }
    }

    pub fn key_strategy(&self) -> KeyDecodingStrategy {
        self.key_strategy
    }

    pub fn decode<T: DeserializeOwned>(&self, bytes: &[u8]) -> Result<T, DecodeError> {
        let value: Value = serde_json::from_slice(bytes).map_err(DecodeError::Syntax)?;
        self.decode_value(value)
    }

    pub fn decode_value<T: DeserializeOwned>(&self, value: Value) -> Result<T, DecodeError> {
        let value = match self.key_strategy {
            KeyDecodingStrategy::UseDefaultKeys => value,
            KeyDecodingStrategy::ConvertFromSnakeCase => convert_keys(value),
        };
        serde_json::from_value(value).map_err(DecodeError::Shape)
    }

    /// Like [`decode`](Self::decode) but discards the reason.
    pub fn decoded<T: DeserializeOwned>(&self, bytes: &[u8]) -> Option<T> {
        self.decode(bytes).ok()
    }
}

fn convert_keys(value: Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.into_iter()
                .map(|(key, value)| (snake_to_camel(&key), convert_keys(value)))
                .collect::<Map<String, Value>>(),
        ),
        Value::Array(items) => Value::Array(items.into_iter().map(convert_keys).collect()),
        other => other,
    }
}

/// Leading and trailing underscores survive; inner runs of `_` separate
/// words. A key with a single word is returned untouched.
pub fn snake_to_camel(key: &str) -> String {
    let trimmed = key.trim_matches('_');
    if trimmed.is_empty() {
        return key.to_string();
    }
    let leading = &key[..key.len() - key.trim_start_matches('_').len()];
    let trailing = &key[key.trim_end_matches('_').len()..];

    let mut words = trimmed.split('_').filter(|word| !word.is_empty());
    let Some(first) = words.next() else {
        return key.to_string();
    };
    let rest: Vec<&str> = words.collect();
    if rest.is_empty() {
        return key.to_string();
    }

    let mut out = String::with_capacity(key.len());
    out.push_str(leading);
    out.push_str(&first.to_lowercase());
    for word in rest {
        let mut chars = word.chars();
        if let Some(head) = chars.next() {
            out.extend(head.to_uppercase());
            out.push_str(&chars.as_str().to_lowercase());
        }
    }
    out.push_str(trailing);
    out
}
