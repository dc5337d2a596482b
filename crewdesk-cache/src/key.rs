//! Hierarchical query keys.
//!
//! A key is an ordered sequence of typed segments. Narrower keys extend
//! broader ones, so invalidating `["jobs"]` reaches `["jobs","list",...]`
//! and `["jobs","detail","42"]` alike.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A scalar or list value used in an equality filter.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
    List(Vec<FilterValue>),
}

impl FilterValue {
    pub fn to_json(&self) -> Value {
        match self {
            FilterValue::Null => Value::Null,
            FilterValue::Bool(b) => Value::Bool(*b),
            FilterValue::Int(i) => Value::from(*i),
            FilterValue::Text(s) => Value::String(s.clone()),
            FilterValue::List(items) => Value::Array(items.iter().map(Self::to_json).collect()),
        }
    }

    /// Filter value for a JSON value; floats and objects have no filter form.
    pub fn from_json(value: &Value) -> Option<Self> {
        match value {
            Value::Null => Some(FilterValue::Null),
            Value::Bool(b) => Some(FilterValue::Bool(*b)),
            Value::Number(n) => n.as_i64().map(FilterValue::Int),
            Value::String(s) => Some(FilterValue::Text(s.clone())),
            Value::Array(items) => items
                .iter()
                .map(Self::from_json)
                .collect::<Option<Vec<_>>>()
                .map(FilterValue::List),
            Value::Object(_) => None,
        }
    }
}

impl From<&str> for FilterValue {
    fn from(value: &str) -> Self {
        FilterValue::Text(value.to_string())
    }
}

impl From<String> for FilterValue {
    fn from(value: String) -> Self {
        FilterValue::Text(value)
    }
}

impl From<bool> for FilterValue {
    fn from(value: bool) -> Self {
        FilterValue::Bool(value)
    }
}

impl From<i64> for FilterValue {
    fn from(value: i64) -> Self {
        FilterValue::Int(value)
    }
}

impl From<i32> for FilterValue {
    fn from(value: i32) -> Self {
        FilterValue::Int(value.into())
    }
}

impl<T: Into<FilterValue>> From<Option<T>> for FilterValue {
    fn from(value: Option<T>) -> Self {
        value.map_or(FilterValue::Null, Into::into)
    }
}

impl<T: Into<FilterValue>> From<Vec<T>> for FilterValue {
    fn from(value: Vec<T>) -> Self {
        FilterValue::List(value.into_iter().map(Into::into).collect())
    }
}

/// Field -> value equality filters, keyed by camelCase field name.
///
/// Ordered, so two sets with the same pairs compare and hash equal no matter
/// the insertion order.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterSet(BTreeMap<String, FilterValue>);

impl FilterSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, field: impl Into<String>, value: impl Into<FilterValue>) -> Self {
        self.insert(field, value);
        self
    }

    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<FilterValue>) {
        self.0.insert(field.into(), value.into());
    }

    pub fn get(&self, field: &str) -> Option<&FilterValue> {
        self.0.get(field)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FilterValue)> {
        self.0.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_json(&self) -> Value {
        Value::Object(
            self.0
                .iter()
                .map(|(k, v)| (k.clone(), v.to_json()))
                .collect::<Map<_, _>>(),
        )
    }
}

impl<K: Into<String>, V: Into<FilterValue>> FromIterator<(K, V)> for FilterSet {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}

/// Sort column and direction, camelCase.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OrderBy {
    pub column: String,
    pub ascending: bool,
}

impl OrderBy {
    pub fn asc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: true,
        }
    }

    pub fn desc(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            ascending: false,
        }
    }
}

/// Ordering and pagination of a list query.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ListWindow {
    pub order_by: Option<OrderBy>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

impl ListWindow {
    pub fn is_empty(&self) -> bool {
        self.order_by.is_none() && self.limit.is_none() && self.offset.is_none()
    }

    pub fn to_json(&self) -> Value {
        let mut map = Map::new();
        if let Some(order) = &self.order_by {
            map.insert("orderBy".into(), Value::String(order.column.clone()));
            map.insert("ascending".into(), Value::Bool(order.ascending));
        }
        if let Some(limit) = self.limit {
            map.insert("limit".into(), Value::from(limit));
        }
        if let Some(offset) = self.offset {
            map.insert("offset".into(), Value::from(offset));
        }
        Value::Object(map)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum KeySegment {
    Name(String),
    List,
    Detail,
    Filters(FilterSet),
    Window(ListWindow),
    Id(String),
}

impl KeySegment {
    pub fn to_json(&self) -> Value {
        match self {
            KeySegment::Name(name) => Value::String(name.clone()),
            KeySegment::List => Value::String("list".into()),
            KeySegment::Detail => Value::String("detail".into()),
            KeySegment::Filters(filters) => filters.to_json(),
            KeySegment::Window(window) => window.to_json(),
            KeySegment::Id(id) => Value::String(id.clone()),
        }
    }
}

/// An immutable cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct QueryKey(Vec<KeySegment>);

impl QueryKey {
    /// Single-segment key, e.g. `["jobs"]`.
    pub fn root(name: impl Into<String>) -> Self {
        Self(vec![KeySegment::Name(name.into())])
    }

    /// A new key with `segment` appended.
    pub fn child(&self, segment: KeySegment) -> Self {
        let mut segments = Vec::with_capacity(self.0.len() + 1);
        segments.extend_from_slice(&self.0);
        segments.push(segment);
        Self(segments)
    }

    pub fn segments(&self) -> &[KeySegment] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Whether `other` starts with every segment of `self`. A key is a prefix
    /// of itself.
    pub fn is_prefix_of(&self, other: &QueryKey) -> bool {
        other.0.starts_with(&self.0)
    }

    pub fn to_json(&self) -> Value {
        Value::Array(self.0.iter().map(KeySegment::to_json).collect())
    }
}

impl fmt::Display for QueryKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_json())
    }
}

impl From<&str> for QueryKey {
    fn from(name: &str) -> Self {
        QueryKey::root(name)
    }
}

/// Key factory for one entity.
///
/// ```
/// use crewdesk_cache::{FilterSet, QueryKeys};
///
/// let jobs = QueryKeys::new("jobs");
/// let key = jobs.list(Some(&FilterSet::new().with("status", "AVAILABLE")));
/// assert_eq!(key.to_string(), r#"["jobs","list",{"status":"AVAILABLE"}]"#);
/// assert!(jobs.all().is_prefix_of(&key));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct QueryKeys {
    entity: String,
}

impl QueryKeys {
    pub fn new(entity: impl Into<String>) -> Self {
        Self {
            entity: entity.into(),
        }
    }

    pub fn entity(&self) -> &str {
        &self.entity
    }

    pub fn all(&self) -> QueryKey {
        QueryKey::root(self.entity.clone())
    }

    pub fn lists(&self) -> QueryKey {
        self.all().child(KeySegment::List)
    }

    /// Without filters this is [`lists`](Self::lists) itself.
    pub fn list(&self, filters: Option<&FilterSet>) -> QueryKey {
        match filters {
            Some(filters) => self.lists().child(KeySegment::Filters(filters.clone())),
            None => self.lists(),
        }
    }

    /// [`list`](Self::list) plus a window segment when ordering or pagination
    /// is set.
    pub fn list_window(&self, filters: Option<&FilterSet>, window: Option<&ListWindow>) -> QueryKey {
        let key = self.list(filters);
        match window {
            Some(window) if !window.is_empty() => key.child(KeySegment::Window(window.clone())),
            _ => key,
        }
    }

    pub fn details(&self) -> QueryKey {
        self.all().child(KeySegment::Detail)
    }

    pub fn detail(&self, id: impl Into<String>) -> QueryKey {
        self.details().child(KeySegment::Id(id.into()))
    }
}
