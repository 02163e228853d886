//! Document model shared by every `DocumentStore` adapter.

use crate::CoreError;
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

/// A stored JSON document with its key and write version.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub id: String,
    pub version: u64,
    pub data: Value,
}

impl Document {
    /// Deserialize the document body into a domain type.
    pub fn decode<T: DeserializeOwned>(&self) -> Result<T, CoreError> {
        serde_json::from_value(self.data.clone()).map_err(|e| {
            CoreError::Serialization(format!("document {} is malformed: {}", self.id, e))
        })
    }
}

/// Serialize a domain type into a document body.
pub fn encode<T: Serialize>(value: &T) -> Result<Value, CoreError> {
    Ok(serde_json::to_value(value)?)
}

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    /// The value at `path` equals `value`.
    Eq { path: String, value: Value },
    /// A non-null value exists at `path`.
    Exists { path: String },
}

impl Filter {
    pub fn eq(path: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq {
            path: path.into(),
            value: value.into(),
        }
    }

    pub fn exists(path: impl Into<String>) -> Self {
        Filter::Exists { path: path.into() }
    }

    pub fn path(&self) -> &str {
        match self {
            Filter::Eq { path, .. } | Filter::Exists { path } => path,
        }
    }

    pub fn matches(&self, data: &Value) -> bool {
        match self {
            Filter::Eq { path, value } => lookup(data, path) == Some(value),
            Filter::Exists { path } => lookup(data, path).is_some_and(|v| !v.is_null()),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct OrderBy {
    pub path: String,
    pub descending: bool,
}

/// Conjunction of filters with an optional sort and limit.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub order_by: Option<OrderBy>,
    pub limit: Option<usize>,
}

impl Query {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter);
        self
    }

    pub fn where_eq(self, path: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::eq(path, value))
    }

    pub fn order_by(mut self, path: impl Into<String>, descending: bool) -> Self {
        self.order_by = Some(OrderBy {
            path: path.into(),
            descending,
        });
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn matches(&self, data: &Value) -> bool {
        self.filters.iter().all(|f| f.matches(data))
    }

    /// Apply filters, ordering and limit to an in-process candidate set.
    /// Ties keep key order so results are deterministic.
    pub fn apply(&self, mut docs: Vec<Document>) -> Vec<Document> {
        docs.retain(|d| self.matches(&d.data));
        docs.sort_by(|a, b| a.id.cmp(&b.id));
        if let Some(order) = &self.order_by {
            docs.sort_by(|a, b| {
                let ord = compare_values(lookup(&a.data, &order.path), lookup(&b.data, &order.path));
                if order.descending {
                    ord.reverse()
                } else {
                    ord
                }
            });
        }
        if let Some(limit) = self.limit {
            docs.truncate(limit);
        }
        docs
    }
}

/// Split a dotted path (`roles.tenant-1`) into its segments.
pub fn path_segments(path: &str) -> Vec<String> {
    path.split('.').map(str::to_string).collect()
}

/// Resolve a dotted path inside a JSON object.
pub fn lookup<'a>(data: &'a Value, path: &str) -> Option<&'a Value> {
    path.split('.')
        .try_fold(data, |current, segment| current.as_object()?.get(segment))
}

// Missing values sort first, then by JSON type, then by value.
fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Less,
        (Some(_), None) => Ordering::Greater,
        (Some(a), Some(b)) => match (a, b) {
            (Value::Number(x), Value::Number(y)) => x
                .as_f64()
                .partial_cmp(&y.as_f64())
                .unwrap_or(Ordering::Equal),
            (Value::String(x), Value::String(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => type_rank(a).cmp(&type_rank(b)),
        },
    }
}

fn type_rank(v: &Value) -> u8 {
    match v {
        Value::Null => 0,
        Value::Bool(_) => 1,
        Value::Number(_) => 2,
        Value::String(_) => 3,
        Value::Array(_) => 4,
        Value::Object(_) => 5,
    }
}
