//! Query descriptors and pagination
//!
//! A [`QueryDescriptor`] is the typed form of the JSON body accepted by the
//! `getList` routes:
//!
//! ```json
//! {
//!   "filter": { "status": true, "role": { "$in": ["ADMIN", "CURATOR"] } },
//!   "projection": { "name": 1, "email": 1 },
//!   "sort": { "name": 1 },
//!   "limit": 10,
//!   "skip": 0,
//!   "page": 1,
//!   "population": [{ "path": "image", "match": { "status": true }, "select": { "url": 1 } }]
//! }
//! ```
//!
//! Field names are not checked here; the query translator validates them
//! against the entity descriptor before anything reaches the store.

use crate::core::store::{Document, ID_FIELD};
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::cmp::Ordering;

// =============================================================================
// Filter
// =============================================================================

/// Conjunction of per-field conditions
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter(IndexMap<String, Condition>);

/// Condition on a single field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Condition {
    /// `{ "$gt": 3, "$lt": 9 }` style operator object
    Operators(Operators),
    /// Plain value, matched by equality
    Equals(Value),
}

/// Supported comparison operators
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Operators {
    #[serde(rename = "$eq", default, skip_serializing_if = "Option::is_none")]
    pub eq: Option<Value>,
    #[serde(rename = "$ne", default, skip_serializing_if = "Option::is_none")]
    pub ne: Option<Value>,
    #[serde(rename = "$in", default, skip_serializing_if = "Option::is_none")]
    pub in_list: Option<Vec<Value>>,
    #[serde(rename = "$nin", default, skip_serializing_if = "Option::is_none")]
    pub not_in_list: Option<Vec<Value>>,
    #[serde(rename = "$gt", default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(rename = "$gte", default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(rename = "$lt", default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    #[serde(rename = "$lte", default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
    #[serde(rename = "$exists", default, skip_serializing_if = "Option::is_none")]
    pub exists: Option<bool>,
}

impl Filter {
    /// Empty filter (matches everything)
    pub fn new() -> Self {
        Self::default()
    }

    /// Single equality condition
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        Self::new().and(field, Condition::Equals(value.into()))
    }

    /// Match a document by its id
    pub fn by_id(id: &str) -> Self {
        Self::eq(ID_FIELD, id)
    }

    /// Add a condition (replaces any existing condition on the same field)
    pub fn and(mut self, field: impl Into<String>, condition: Condition) -> Self {
        self.0.insert(field.into(), condition);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Condition)> {
        self.0.iter()
    }

    /// Evaluate the filter against a document
    pub fn matches(&self, doc: &Document) -> bool {
        self.0
            .iter()
            .all(|(path, condition)| condition.matches(lookup(doc, path)))
    }
}

impl Condition {
    /// `{ "$in": values }`
    pub fn in_list(values: Vec<Value>) -> Self {
        Condition::Operators(Operators {
            in_list: Some(values),
            ..Default::default()
        })
    }

    /// First `$`-prefixed key inside an equality value
    ///
    /// Such a key names an operator outside [`Operators`]; the stores would
    /// disagree on it, so queries carrying one are rejected.
    pub fn unsupported_operator(&self) -> Option<&str> {
        match self {
            Condition::Equals(value) => operator_key(value),
            Condition::Operators(_) => None,
        }
    }

    fn matches(&self, actual: Option<&Value>) -> bool {
        match self {
            Condition::Equals(expected) => equals(actual, expected),
            Condition::Operators(ops) => ops.matches(actual),
        }
    }
}

impl Operators {
    /// True when no operator is set
    pub fn is_empty(&self) -> bool {
        *self == Operators::default()
    }

    fn matches(&self, actual: Option<&Value>) -> bool {
        if let Some(expected) = &self.eq
            && !equals(actual, expected)
        {
            return false;
        }
        if let Some(expected) = &self.ne
            && equals(actual, expected)
        {
            return false;
        }
        if let Some(list) = &self.in_list
            && !list.iter().any(|expected| equals(actual, expected))
        {
            return false;
        }
        if let Some(list) = &self.not_in_list
            && list.iter().any(|expected| equals(actual, expected))
        {
            return false;
        }
        if let Some(flag) = self.exists
            && actual.is_some() != flag
        {
            return false;
        }

        let within = |bound: &Option<Value>, accepted: &[Ordering]| match bound {
            None => true,
            Some(bound) => compares(actual, bound, accepted),
        };
        within(&self.gt, &[Ordering::Greater])
            && within(&self.gte, &[Ordering::Greater, Ordering::Equal])
            && within(&self.lt, &[Ordering::Less])
            && within(&self.lte, &[Ordering::Less, Ordering::Equal])
    }
}

fn operator_key(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => map.iter().find_map(|(key, inner)| {
            if key.starts_with('$') {
                Some(key.as_str())
            } else {
                operator_key(inner)
            }
        }),
        Value::Array(items) => items.iter().find_map(operator_key),
        _ => None,
    }
}

/// Resolve a dotted path (`preferences.language`) inside a document
pub fn lookup<'a>(doc: &'a Document, path: &str) -> Option<&'a Value> {
    let mut segments = path.split('.');
    let mut current = doc.get(segments.next()?)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// Equality with array-membership semantics: an array field equals a scalar
/// when any of its elements does. A missing field equals `null`.
fn equals(actual: Option<&Value>, expected: &Value) -> bool {
    match actual {
        None => expected.is_null(),
        Some(Value::Array(items)) if !expected.is_array() => {
            items.iter().any(|item| values_equal(item, expected))
        }
        Some(value) => values_equal(value, expected),
    }
}

/// Structural equality that treats `1` and `1.0` as the same number
pub fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        _ => a == b,
    }
}

fn compares(actual: Option<&Value>, bound: &Value, accepted: &[Ordering]) -> bool {
    match actual {
        None => false,
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| compare_scalar(item, bound).is_some_and(|o| accepted.contains(&o))),
        Some(value) => compare_scalar(value, bound).is_some_and(|o| accepted.contains(&o)),
    }
}

/// Ordering between two values of the same scalar type
fn compare_scalar(a: &Value, b: &Value) -> Option<Ordering> {
    match (a, b) {
        (Value::Number(x), Value::Number(y)) => x.as_f64()?.partial_cmp(&y.as_f64()?),
        (Value::String(x), Value::String(y)) => Some(x.cmp(y)),
        (Value::Bool(x), Value::Bool(y)) => Some(x.cmp(y)),
        _ => None,
    }
}

/// Total order used for sorting: missing/null < numbers < strings < objects
/// < arrays < booleans
pub fn compare_for_sort(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match rank(a).cmp(&rank(b)) {
        Ordering::Equal => match (a, b) {
            (Some(x), Some(y)) => compare_scalar(x, y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
        other => other,
    }
}

// =============================================================================
// Projection
// =============================================================================

/// Field projection (`{ "name": 1, "email": true }`)
///
/// Any truthy entry makes the projection inclusive: only the listed fields
/// (plus `id`, unless `id` is explicitly excluded) are returned. Otherwise
/// the listed fields are removed. Entries address top-level fields; a dotted
/// key applies to its first segment.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(from = "IndexMap<String, ProjectionFlag>", into = "IndexMap<String, bool>")]
pub struct Projection(IndexMap<String, bool>);

/// Accepts both `true/false` and `1/0`
#[derive(Debug, Clone, Copy, Deserialize)]
#[serde(untagged)]
pub enum ProjectionFlag {
    Bool(bool),
    Int(i64),
}

impl From<IndexMap<String, ProjectionFlag>> for Projection {
    fn from(raw: IndexMap<String, ProjectionFlag>) -> Self {
        Self(
            raw.into_iter()
                .map(|(field, flag)| {
                    let include = match flag {
                        ProjectionFlag::Bool(b) => b,
                        ProjectionFlag::Int(n) => n != 0,
                    };
                    (field, include)
                })
                .collect(),
        )
    }
}

impl From<Projection> for IndexMap<String, bool> {
    fn from(projection: Projection) -> Self {
        projection.0
    }
}

impl Projection {
    /// Inclusive projection over the given fields
    pub fn include(fields: &[&str]) -> Self {
        Self(fields.iter().map(|f| (f.to_string(), true)).collect())
    }

    /// Exclusive projection over the given fields
    pub fn exclude(fields: &[&str]) -> Self {
        Self(fields.iter().map(|f| (f.to_string(), false)).collect())
    }

    pub fn fields(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(|k| k.as_str())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = (&str, bool)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    fn is_inclusive(&self) -> bool {
        self.0.values().any(|include| *include)
    }

    /// True when inclusions and exclusions are combined (the id field aside)
    pub fn is_mixed(&self) -> bool {
        let mut non_id = self.0.iter().filter(|(k, _)| k.as_str() != ID_FIELD);
        let Some((_, first)) = non_id.next() else {
            return false;
        };
        non_id.any(|(_, include)| include != first)
    }

    /// Apply the projection to a document
    pub fn apply(&self, doc: &Document) -> Document {
        if self.0.is_empty() {
            return doc.clone();
        }

        let top_level = |key: &str| key.split('.').next().unwrap_or(key).to_string();

        if self.is_inclusive() {
            let keep_id = self.0.get(ID_FIELD).copied().unwrap_or(true);
            doc.iter()
                .filter(|(key, _)| {
                    (key.as_str() == ID_FIELD && keep_id)
                        || self
                            .0
                            .iter()
                            .any(|(field, include)| *include && top_level(field) == **key)
                })
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect()
        } else {
            let mut projected = doc.clone();
            for field in self.0.keys() {
                projected.shift_remove(&top_level(field));
            }
            projected
        }
    }
}

// =============================================================================
// Sort
// =============================================================================

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "SortFlag", into = "i64")]
pub enum SortOrder {
    Ascending,
    Descending,
}

/// Accepts `1`, `-1`, `"asc"`, `"desc"`, `"ascending"`, `"descending"`
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum SortFlag {
    Int(i64),
    Text(String),
}

impl TryFrom<SortFlag> for SortOrder {
    type Error = String;

    fn try_from(flag: SortFlag) -> Result<Self, Self::Error> {
        match flag {
            SortFlag::Int(1) => Ok(SortOrder::Ascending),
            SortFlag::Int(-1) => Ok(SortOrder::Descending),
            SortFlag::Text(s) => match s.to_ascii_lowercase().as_str() {
                "asc" | "ascending" => Ok(SortOrder::Ascending),
                "desc" | "descending" => Ok(SortOrder::Descending),
                _ => Err(format!("invalid sort direction '{}'", s)),
            },
            SortFlag::Int(n) => Err(format!("invalid sort direction {}", n)),
        }
    }
}

impl From<SortOrder> for i64 {
    fn from(order: SortOrder) -> Self {
        match order {
            SortOrder::Ascending => 1,
            SortOrder::Descending => -1,
        }
    }
}

/// Multi-key sort, applied in declaration order
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sort(IndexMap<String, SortOrder>);

impl Sort {
    pub fn by(field: impl Into<String>, order: SortOrder) -> Self {
        let mut keys = IndexMap::new();
        keys.insert(field.into(), order);
        Self(keys)
    }

    pub fn then(mut self, field: impl Into<String>, order: SortOrder) -> Self {
        self.0.insert(field.into(), order);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, SortOrder)> {
        self.0.iter().map(|(k, v)| (k.as_str(), *v))
    }

    pub fn compare(&self, a: &Document, b: &Document) -> Ordering {
        for (field, order) in &self.0 {
            let ordering = compare_for_sort(lookup(a, field), lookup(b, field));
            let ordering = match order {
                SortOrder::Ascending => ordering,
                SortOrder::Descending => ordering.reverse(),
            };
            if ordering != Ordering::Equal {
                return ordering;
            }
        }
        Ordering::Equal
    }
}

// =============================================================================
// Population
// =============================================================================

/// Request to expand a reference field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PopulateRequest {
    /// Bare path (`"image"`)
    Path(String),
    /// Path with a match filter on the referenced documents and a projection
    Spec {
        path: String,
        #[serde(rename = "match", default, skip_serializing_if = "Option::is_none")]
        filter: Option<Filter>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        select: Option<Projection>,
    },
}

impl PopulateRequest {
    pub fn path(&self) -> &str {
        match self {
            PopulateRequest::Path(path) => path,
            PopulateRequest::Spec { path, .. } => path,
        }
    }

    pub fn filter(&self) -> Option<&Filter> {
        match self {
            PopulateRequest::Path(_) => None,
            PopulateRequest::Spec { filter, .. } => filter.as_ref(),
        }
    }

    pub fn select(&self) -> Option<&Projection> {
        match self {
            PopulateRequest::Path(_) => None,
            PopulateRequest::Spec { select, .. } => select.as_ref(),
        }
    }
}

fn one_or_many<'de, D>(deserializer: D) -> Result<Vec<PopulateRequest>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum OneOrMany {
        Many(Vec<PopulateRequest>),
        One(PopulateRequest),
    }

    Ok(match Option::<OneOrMany>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(OneOrMany::Many(items)) => items,
        Some(OneOrMany::One(item)) => vec![item],
    })
}

// =============================================================================
// Query descriptor and paginated result
// =============================================================================

/// Declarative description of a paginated fetch
///
/// `limit == 0` disables pagination: every matching record is returned as a
/// single logical page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct QueryDescriptor {
    pub filter: Filter,
    pub projection: Option<Projection>,
    pub sort: Sort,
    pub limit: u64,
    pub skip: Option<u64>,
    pub page: u64,
    #[serde(deserialize_with = "one_or_many")]
    pub population: Vec<PopulateRequest>,
}

impl QueryDescriptor {
    /// Page number, starting at 1
    pub fn page(&self) -> u64 {
        self.page.max(1)
    }

    /// Documents to skip
    ///
    /// An explicit `skip` wins. Otherwise it is derived from `page` and
    /// `limit`.
    pub fn skip(&self) -> u64 {
        match self.skip {
            Some(skip) => skip,
            None if self.limit > 0 => self.page().saturating_sub(1).saturating_mul(self.limit),
            None => 0,
        }
    }
}

/// One page of results plus page metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaginatedResult<T> {
    /// Total number of matching records
    pub count: u64,
    /// Requested page
    pub page: u64,
    /// See [`total_pages`]
    pub total_pages: u64,
    pub data: Vec<T>,
}

/// `floor(count / limit)`, or `1` when pagination is disabled
///
/// This truncates: 25 records at 10 per page yields 2, not 3. Consumers of
/// the API rely on this value as is.
pub fn total_pages(count: u64, limit: u64) -> u64 {
    if limit != 0 { count / limit } else { 1 }
}
