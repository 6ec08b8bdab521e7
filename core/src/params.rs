//! Request parameters and the coercion rules applied when setting them.
//!
//! The backend reads every parameter as a form field, so values are stored
//! already converted to strings. Lists stay lists and are encoded as repeated
//! `key[]` fields.

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::fmt::Display;

use url::form_urlencoded;

/// A stored parameter value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamValue {
    Text(String),
    List(Vec<String>),
}

impl ParamValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            ParamValue::Text(text) => Some(text),
            ParamValue::List(_) => None,
        }
    }

    pub fn as_list(&self) -> Option<&[String]> {
        match self {
            ParamValue::Text(_) => None,
            ParamValue::List(items) => Some(items),
        }
    }
}

/// Conversion into a stored parameter.
///
/// Returning `None` means "do not touch the parameter"; that is how
/// `Option::None` assignments become no-ops.
pub trait IntoParam {
    fn into_param(self) -> Option<ParamValue>;
}

macro_rules! integer_param {
    ($($ty:ty),*) => {
        $(
            impl IntoParam for $ty {
                fn into_param(self) -> Option<ParamValue> {
                    Some(ParamValue::Text(self.to_string()))
                }
            }
        )*
    };
}

integer_param!(i8, i16, i32, i64, isize, u8, u16, u32, u64, usize);

impl IntoParam for f64 {
    fn into_param(self) -> Option<ParamValue> {
        Some(ParamValue::Text(format!("{self:.6}")))
    }
}

impl IntoParam for f32 {
    fn into_param(self) -> Option<ParamValue> {
        f64::from(self).into_param()
    }
}

impl IntoParam for bool {
    fn into_param(self) -> Option<ParamValue> {
        let text = if self { "true" } else { "false" };
        Some(ParamValue::Text(text.to_string()))
    }
}

impl IntoParam for String {
    fn into_param(self) -> Option<ParamValue> {
        Some(ParamValue::Text(self))
    }
}

impl IntoParam for &str {
    fn into_param(self) -> Option<ParamValue> {
        Some(ParamValue::Text(self.to_string()))
    }
}

impl IntoParam for &String {
    fn into_param(self) -> Option<ParamValue> {
        self.as_str().into_param()
    }
}

impl<T: Display> IntoParam for Vec<T> {
    fn into_param(self) -> Option<ParamValue> {
        self.as_slice().into_param()
    }
}

impl<T: Display> IntoParam for &[T] {
    fn into_param(self) -> Option<ParamValue> {
        Some(ParamValue::List(self.iter().map(ToString::to_string).collect()))
    }
}

impl IntoParam for ParamValue {
    fn into_param(self) -> Option<ParamValue> {
        Some(self)
    }
}

impl<T: IntoParam> IntoParam for Option<T> {
    fn into_param(self) -> Option<ParamValue> {
        self.and_then(IntoParam::into_param)
    }
}

/// Parameters of one request, ordered by key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Parameters(BTreeMap<String, ParamValue>);

impl Parameters {
    pub fn new() -> Self {
        Self::default()
    }

    /// Store `value` under `key` after coercion. A value that converts to
    /// nothing (`None`) leaves any existing entry untouched.
    pub fn set(&mut self, key: impl Into<String>, value: impl IntoParam) {
        if let Some(value) = value.into_param() {
            self.0.insert(key.into(), value);
        }
    }

    pub fn get(&self, key: &str) -> Option<&ParamValue> {
        self.0.get(key)
    }

    pub fn remove(&mut self, key: &str) -> Option<ParamValue> {
        self.0.remove(key)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, ParamValue> {
        self.0.iter()
    }

    /// Encode as an `application/x-www-form-urlencoded` body, or `None` when
    /// there is nothing to send.
    pub fn to_form_body(&self) -> Option<String> {
        if self.0.is_empty() {
            return None;
        }
        let mut form = form_urlencoded::Serializer::new(String::new());
        for (key, value) in &self.0 {
            match value {
                ParamValue::Text(text) => {
                    form.append_pair(key, text);
                }
                ParamValue::List(items) => {
                    let list_key = format!("{key}[]");
                    for item in items {
                        form.append_pair(&list_key, item);
                    }
                }
            }
        }
        Some(form.finish())
    }
}

impl<'a> IntoIterator for &'a Parameters {
    type Item = (&'a String, &'a ParamValue);
    type IntoIter = btree_map::Iter<'a, String, ParamValue>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.iter()
    }
}
