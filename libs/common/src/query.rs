//! Reusable filter / search / sort / paginate composition for list endpoints
//!
//! A [`QueryBuilder`] reads the raw string parameters of a list request and
//! composes them, stage by stage, into a [`ListQuery`]. Nothing runs until
//! [`QueryBuilder::build`] or [`QueryBuilder::meta`] is awaited; both hand
//! the same predicate to a [`QuerySource`], which is either a Postgres table
//! (see [`sql`]) or an in-memory collection evaluated with
//! [`ListQuery::apply`].
//!
//! ```rust,no_run
//! # use common::query::{QueryBuilder, QuerySource, QueryParams};
//! # async fn run<S: QuerySource>(source: &S, params: &QueryParams) {
//! let paged = QueryBuilder::new(source, params)
//!     .filter()
//!     .search(&["trackingId", "receiverAddress"])
//!     .sort()
//!     .paginate()
//!     .execute()
//!     .await;
//! # }
//! ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::{cmp::Ordering, collections::HashMap};
use uuid::Uuid;

use crate::error::DatabaseResult;

pub mod sql;

/// Parameters that drive the builder instead of becoming equality filters
pub const RESERVED_PARAMS: [&str; 6] = ["searchTerm", "sortBy", "sortOrder", "page", "limit", "fields"];

pub const DEFAULT_SORT_FIELD: &str = "createdAt";
pub const DEFAULT_PAGE: u64 = 1;
pub const DEFAULT_LIMIT: u64 = 10;
/// Largest page size a caller may request
pub const MAX_LIMIT: u64 = 100;

/// Raw query-string parameters of a list request
pub type QueryParams = HashMap<String, String>;

/// Type of a named entity field
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    Text,
    Number,
    Bool,
    Timestamp,
    Id,
}

impl FieldKind {
    /// Read a raw query-string value as this kind
    ///
    /// Text is taken verbatim; other kinds are trimmed first. `None` means
    /// the value cannot equal any field of this kind.
    pub fn parse(self, raw: &str) -> Option<FieldValue> {
        let trimmed = raw.trim();
        match self {
            FieldKind::Text => Some(FieldValue::Text(raw.to_string())),
            FieldKind::Number => trimmed.parse().ok().map(FieldValue::Number),
            FieldKind::Bool => trimmed.parse().ok().map(FieldValue::Bool),
            FieldKind::Timestamp => DateTime::parse_from_rfc3339(trimmed)
                .ok()
                .map(|value| FieldValue::Timestamp(value.with_timezone(&Utc))),
            FieldKind::Id => Uuid::parse_str(trimmed).ok().map(FieldValue::Id),
        }
    }
}

/// Typed value of a named entity field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Bool(bool),
    Timestamp(DateTime<Utc>),
    Id(Uuid),
}

impl FieldValue {
    pub fn kind(&self) -> FieldKind {
        match self {
            FieldValue::Text(_) => FieldKind::Text,
            FieldValue::Number(_) => FieldKind::Number,
            FieldValue::Bool(_) => FieldKind::Bool,
            FieldValue::Timestamp(_) => FieldKind::Timestamp,
            FieldValue::Id(_) => FieldKind::Id,
        }
    }

    /// Exact equality against a raw query-string value
    pub fn matches_param(&self, raw: &str) -> bool {
        self.kind().parse(raw).is_some_and(|value| value == *self)
    }

    /// Case-insensitive substring match; `needle` must already be lowercase
    pub fn contains_lowercase(&self, needle: &str) -> bool {
        match self {
            FieldValue::Text(value) => value.to_lowercase().contains(needle),
            FieldValue::Id(value) => value.to_string().contains(needle),
            _ => false,
        }
    }

    fn compare(&self, other: &Self) -> Ordering {
        match (self, other) {
            (FieldValue::Text(a), FieldValue::Text(b)) => a.cmp(b),
            (FieldValue::Number(a), FieldValue::Number(b)) => {
                a.partial_cmp(b).unwrap_or(Ordering::Equal)
            }
            (FieldValue::Bool(a), FieldValue::Bool(b)) => a.cmp(b),
            (FieldValue::Timestamp(a), FieldValue::Timestamp(b)) => a.cmp(b),
            (FieldValue::Id(a), FieldValue::Id(b)) => a.cmp(b),
            _ => Ordering::Equal,
        }
    }
}

/// An entity whose fields can be addressed by their wire names
pub trait Record {
    /// Field names that filters, searches and sort keys may refer to
    const FIELDS: &'static [&'static str];

    /// Value of a field, `None` when the field is unset on this record
    fn field(&self, name: &str) -> Option<FieldValue>;
}

/// Equality condition on a named field
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Condition {
    pub field: String,
    pub value: String,
}

/// Case-insensitive substring search over several fields
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Search {
    pub term: String,
    pub fields: Vec<String>,
}

/// Sort key, written `field` for ascending and `-field` for descending
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortKey {
    pub field: String,
    pub descending: bool,
}

impl SortKey {
    pub fn parse(encoded: &str) -> Self {
        match encoded.strip_prefix('-') {
            Some(field) => SortKey {
                field: field.to_string(),
                descending: true,
            },
            None => SortKey {
                field: encoded.to_string(),
                descending: false,
            },
        }
    }

    pub fn encoded(&self) -> String {
        if self.descending {
            format!("-{}", self.field)
        } else {
            self.field.clone()
        }
    }
}

impl Default for SortKey {
    fn default() -> Self {
        SortKey {
            field: DEFAULT_SORT_FIELD.to_string(),
            descending: true,
        }
    }
}

/// One-based page window
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Page {
    pub page: u64,
    pub limit: u64,
}

impl Page {
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

impl Default for Page {
    fn default() -> Self {
        Page {
            page: DEFAULT_PAGE,
            limit: DEFAULT_LIMIT,
        }
    }
}

/// Composed retrieval request over a homogeneous collection
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ListQuery {
    pub conditions: Vec<Condition>,
    pub search: Option<Search>,
    pub sort: Option<SortKey>,
    pub page: Option<Page>,
}

impl ListQuery {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a scope condition, e.g. restricting a listing to one sender
    pub fn with_condition(mut self, field: impl Into<String>, value: impl Into<String>) -> Self {
        self.conditions.push(Condition {
            field: field.into(),
            value: value.into(),
        });
        self
    }

    /// The same predicate without its page window
    pub fn without_page(&self) -> Self {
        ListQuery {
            page: None,
            ..self.clone()
        }
    }

    /// Whether a record satisfies the filter and search stages
    ///
    /// Conditions on fields the record type does not know are ignored.
    pub fn matches<R: Record>(&self, record: &R) -> bool {
        let filtered = self
            .conditions
            .iter()
            .filter(|condition| R::FIELDS.contains(&condition.field.as_str()))
            .all(|condition| {
                record
                    .field(&condition.field)
                    .is_some_and(|value| value.matches_param(&condition.value))
            });

        if !filtered {
            return false;
        }

        match &self.search {
            Some(search) => {
                let needle = search.term.to_lowercase();
                search.fields.iter().any(|field| {
                    record
                        .field(field)
                        .is_some_and(|value| value.contains_lowercase(&needle))
                })
            }
            None => true,
        }
    }

    /// Number of records matching the predicate, ignoring the page window
    pub fn count<R: Record>(&self, records: &[R]) -> u64 {
        records.iter().filter(|record| self.matches(*record)).count() as u64
    }

    /// Evaluate filter, search, sort and page window over a collection
    pub fn apply<R: Record + Clone>(&self, records: &[R]) -> Vec<R> {
        let mut matching: Vec<R> = records
            .iter()
            .filter(|record| self.matches(*record))
            .cloned()
            .collect();

        if let Some(sort) = &self.sort {
            let field = if R::FIELDS.contains(&sort.field.as_str()) {
                sort.field.as_str()
            } else {
                DEFAULT_SORT_FIELD
            };
            matching.sort_by(|a, b| {
                // unset values order after set ones, as NULLs do in Postgres
                let ordering = match (a.field(field), b.field(field)) {
                    (Some(x), Some(y)) => x.compare(&y),
                    (Some(_), None) => Ordering::Less,
                    (None, Some(_)) => Ordering::Greater,
                    (None, None) => Ordering::Equal,
                };
                if sort.descending {
                    ordering.reverse()
                } else {
                    ordering
                }
            });
        }

        match self.page {
            Some(page) => matching
                .into_iter()
                .skip(page.offset() as usize)
                .take(page.limit as usize)
                .collect(),
            None => matching,
        }
    }
}

/// Pagination metadata returned next to a page of items
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    pub page: u64,
    pub limit: u64,
    pub total: u64,
    pub total_page: u64,
}

impl PageMeta {
    pub fn new(page: Page, total: u64) -> Self {
        PageMeta {
            page: page.page,
            limit: page.limit,
            total,
            total_page: total.div_ceil(page.limit.max(1)),
        }
    }
}

/// A page of items with its metadata
#[derive(Debug, Clone, Serialize)]
pub struct Paged<T> {
    pub data: Vec<T>,
    pub meta: PageMeta,
}

/// A collection the builder can run a [`ListQuery`] against
#[async_trait]
pub trait QuerySource: Send + Sync {
    type Item: Send;

    /// Items matching the full query, page window included
    async fn fetch(&self, query: &ListQuery) -> DatabaseResult<Vec<Self::Item>>;

    /// Number of items matching the predicate; the page window is ignored
    async fn count(&self, query: &ListQuery) -> DatabaseResult<u64>;
}

/// Stage-by-stage composer of a [`ListQuery`] from request parameters
pub struct QueryBuilder<'a, S: QuerySource + ?Sized> {
    source: &'a S,
    params: &'a QueryParams,
    query: ListQuery,
}

impl<'a, S: QuerySource + ?Sized> QueryBuilder<'a, S> {
    pub fn new(source: &'a S, params: &'a QueryParams) -> Self {
        Self::scoped(source, ListQuery::new(), params)
    }

    /// Start from a base scope that every stage is AND-ed with
    pub fn scoped(source: &'a S, base: ListQuery, params: &'a QueryParams) -> Self {
        Self {
            source,
            params,
            query: base,
        }
    }

    /// Turn every non-reserved parameter into an equality condition
    pub fn filter(mut self) -> Self {
        let mut conditions: Vec<Condition> = self
            .params
            .iter()
            .filter(|(key, _)| !RESERVED_PARAMS.contains(&key.as_str()))
            .map(|(key, value)| Condition {
                field: key.clone(),
                value: value.clone(),
            })
            .collect();
        conditions.sort_by(|a, b| a.field.cmp(&b.field));
        self.query.conditions.extend(conditions);
        self
    }

    /// OR together substring matches of `searchTerm` over `fields`
    pub fn search(mut self, fields: &[&str]) -> Self {
        let term = self.params.get("searchTerm").map(String::as_str).unwrap_or("");
        if !term.is_empty() && !fields.is_empty() {
            self.query.search = Some(Search {
                term: term.to_string(),
                fields: fields.iter().map(|field| field.to_string()).collect(),
            });
        }
        self
    }

    pub fn sort(mut self) -> Self {
        let field = self
            .params
            .get("sortBy")
            .map(|value| value.trim())
            .filter(|value| !value.is_empty())
            .unwrap_or(DEFAULT_SORT_FIELD);
        let ascending = self.params.get("sortOrder").is_some_and(|order| order == "asc");
        self.query.sort = Some(SortKey {
            field: field.to_string(),
            descending: !ascending,
        });
        self
    }

    /// Compute the page window; unparsable values fall back to defaults
    pub fn paginate(mut self) -> Self {
        let page = positive_param(self.params, "page").unwrap_or(DEFAULT_PAGE);
        let limit = positive_param(self.params, "limit")
            .unwrap_or(DEFAULT_LIMIT)
            .min(MAX_LIMIT);
        self.query.page = Some(Page { page, limit });
        self
    }

    pub fn query(&self) -> &ListQuery {
        &self.query
    }

    /// Run the composed query and return the matching items
    pub async fn build(&self) -> DatabaseResult<Vec<S::Item>> {
        self.source.fetch(&self.query).await
    }

    /// Count the filter+search predicate and describe the page window
    pub async fn meta(&self) -> DatabaseResult<PageMeta> {
        let total = self.source.count(&self.query.without_page()).await?;
        Ok(PageMeta::new(self.query.page.unwrap_or_default(), total))
    }

    /// Run [`build`](Self::build) and [`meta`](Self::meta) concurrently
    pub async fn execute(&self) -> DatabaseResult<Paged<S::Item>> {
        let (data, meta) = tokio::try_join!(self.build(), self.meta())?;
        Ok(Paged { data, meta })
    }
}

fn positive_param(params: &QueryParams, key: &str) -> Option<u64> {
    params
        .get(key)
        .and_then(|value| value.trim().parse::<u64>().ok())
        .filter(|value| *value >= 1)
}
