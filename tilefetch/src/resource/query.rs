//! Query parameter model.
//!
//! Parameters are kept in a `BTreeMap` so serialization order is stable.
//! A query string with no `=` anywhere (`?flag`) parses to a single
//! [`QueryValue::Flag`] key and serializes back to the same bare key.

use std::collections::BTreeMap;

use percent_encoding::{percent_decode_str, utf8_percent_encode, AsciiSet, NON_ALPHANUMERIC};

/// Characters `encodeURIComponent` leaves alone: `A-Z a-z 0-9 - _ . ! ~ * ' ( )`.
const URI_COMPONENT: &AsciiSet = &NON_ALPHANUMERIC
    .remove(b'-')
    .remove(b'_')
    .remove(b'.')
    .remove(b'!')
    .remove(b'~')
    .remove(b'*')
    .remove(b'\'')
    .remove(b'(')
    .remove(b')');

/// Value of one query parameter.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum QueryValue {
    /// Key present without a value.
    Flag,
    Single(String),
    Multiple(Vec<String>),
}

impl QueryValue {
    /// All values, in order. A flag has none.
    pub fn values(&self) -> Vec<String> {
        match self {
            Self::Flag => Vec::new(),
            Self::Single(value) => vec![value.clone()],
            Self::Multiple(values) => values.clone(),
        }
    }

    /// First value, if any.
    pub fn first(&self) -> Option<&str> {
        match self {
            Self::Flag => None,
            Self::Single(value) => Some(value),
            Self::Multiple(values) => values.first().map(String::as_str),
        }
    }

    pub fn is_flag(&self) -> bool {
        matches!(self, Self::Flag)
    }

    fn push(&mut self, value: String) {
        *self = match std::mem::replace(self, Self::Flag) {
            Self::Flag => Self::Single(value),
            Self::Single(existing) => Self::Multiple(vec![existing, value]),
            Self::Multiple(mut values) => {
                values.push(value);
                Self::Multiple(values)
            }
        };
    }

    /// `[self..., other...]`, used when both sides carry a value.
    fn concat(&self, other: &QueryValue) -> QueryValue {
        match (self, other) {
            (Self::Flag, _) => other.clone(),
            (_, Self::Flag) => self.clone(),
            _ => {
                let mut values = self.values();
                values.extend(other.values());
                Self::Multiple(values)
            }
        }
    }
}

impl From<&str> for QueryValue {
    fn from(value: &str) -> Self {
        Self::Single(value.to_string())
    }
}

impl From<String> for QueryValue {
    fn from(value: String) -> Self {
        Self::Single(value)
    }
}

impl From<Vec<String>> for QueryValue {
    fn from(values: Vec<String>) -> Self {
        Self::Multiple(values)
    }
}

impl<const N: usize> From<[&str; N]> for QueryValue {
    fn from(values: [&str; N]) -> Self {
        Self::Multiple(values.iter().map(|v| v.to_string()).collect())
    }
}

/// Query parameters by key.
pub type QueryParameters = BTreeMap<String, QueryValue>;

/// Builds a [`QueryParameters`] map from `(key, value)` pairs.
pub fn query<K, V, I>(pairs: I) -> QueryParameters
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<QueryValue>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Merges two parameter maps.
///
/// Without `preserve`, `q2` overrides `q1` key by key. With `preserve`, a key
/// present on both sides becomes `[q1 values..., q2 values...]`; keys on one
/// side only are copied through.
pub fn combine_query_parameters(
    q1: &QueryParameters,
    q2: &QueryParameters,
    preserve: bool,
) -> QueryParameters {
    let mut result = q1.clone();
    for (key, value) in q2 {
        let merged = match result.get(key) {
            Some(existing) if preserve => existing.concat(value),
            _ => value.clone(),
        };
        result.insert(key.clone(), merged);
    }
    result
}

/// Parses a query string (without the leading `?`).
pub fn parse_query_string(query: &str) -> QueryParameters {
    let mut result = QueryParameters::new();
    if query.is_empty() {
        return result;
    }
    if !query.contains('=') {
        result.insert(query.to_string(), QueryValue::Flag);
        return result;
    }

    for segment in query.split('&').filter(|s| !s.is_empty()) {
        let (name, value) = segment.split_once('=').unwrap_or((segment, ""));
        let name = decode_component(name);
        let value = decode_component(value);
        match result.get_mut(&name) {
            Some(existing) => existing.push(value),
            None => {
                result.insert(name, QueryValue::Single(value));
            }
        }
    }
    result
}

/// Serializes parameters, including the leading `?`. Empty maps give `""`.
pub fn stringify_query(parameters: &QueryParameters) -> String {
    if parameters.is_empty() {
        return String::new();
    }
    if parameters.len() == 1 {
        if let Some((key, QueryValue::Flag)) = parameters.iter().next() {
            return format!("?{}", key);
        }
    }

    let mut parts = Vec::new();
    for (key, value) in parameters {
        let key = encode_uri_component(key);
        match value {
            QueryValue::Flag => parts.push(key),
            QueryValue::Single(value) => {
                parts.push(format!("{}={}", key, encode_uri_component(value)))
            }
            QueryValue::Multiple(values) => {
                for value in values {
                    parts.push(format!("{}={}", key, encode_uri_component(value)));
                }
            }
        }
    }
    format!("?{}", parts.join("&"))
}

/// Percent-encodes like `encodeURIComponent`.
pub fn encode_uri_component(value: &str) -> String {
    utf8_percent_encode(value, URI_COMPONENT).to_string()
}

fn decode_component(value: &str) -> String {
    let value = value.replace('+', " ");
    percent_decode_str(&value).decode_utf8_lossy().into_owned()
}
