//! Query model and request-parameter parser.
//!
//! Malformed numeric or boolean parameters never fail a request; each one falls back to a
//! documented default:
//! - `limit`: -1 (no pagination)
//! - `page`: 1
//! - `sortBy`: `creationTimestamp`
//! - `ascending`: false
//! - `labelSelector`: kept verbatim, resolved by [`Query::selector`] which treats a
//!   malformed selector as "select everything"

use std::collections::BTreeMap;
use std::convert::Infallible;
use std::ops::Range;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::selector::LabelSelector;
use crate::{fields, params, Field, Value};

/// Windowing request. `limit == -1` disables pagination.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Pagination {
    /// items per page
    pub limit: i64,
    pub offset: i64,
    pub page: i64,
}

/// Sentinel meaning "return everything".
pub const NO_PAGINATION: Pagination = Pagination { limit: -1, offset: 0, page: 1 };

impl Pagination {
    pub fn new(limit: i64, offset: i64, page: i64) -> Self { Self { limit, offset, page } }

    /// Clamp this request to a `[start, end)` window over `total` items.
    ///
    /// Out-of-range requests (negative limit/offset, offset past the end) yield an empty
    /// window instead of an error.
    pub fn valid_window(&self, total: usize) -> Range<usize> {
        if self.limit == NO_PAGINATION.limit {
            return 0..total;
        }
        if self.limit < 0 || self.offset < 0 || self.offset as u64 > total as u64 {
            return 0..0;
        }
        let start = self.offset as usize;
        let end = (self.offset as u64).saturating_add(self.limit as u64).min(total as u64) as usize;
        start..end
    }
}

impl Default for Pagination {
    fn default() -> Self { NO_PAGINATION }
}

/// A parsed list request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Query {
    pub pagination: Option<Pagination>,
    /// Sort key; the parser defaults it to `creationTimestamp`.
    pub sort_by: Field,
    /// Descending unless set.
    pub ascending: bool,
    pub filters: BTreeMap<Field, Value>,
    pub label_selector: String,
}

impl Default for Query {
    fn default() -> Self { Self::new() }
}

impl Query {
    pub fn new() -> Self {
        Self {
            pagination: Some(NO_PAGINATION),
            sort_by: Field::default(),
            ascending: false,
            filters: BTreeMap::new(),
            label_selector: String::new(),
        }
    }

    /// Effective pagination; a missing block means [`NO_PAGINATION`].
    pub fn pagination(&self) -> Pagination { self.pagination.unwrap_or(NO_PAGINATION) }

    /// Parsed label selector. A selector that fails to parse selects everything.
    pub fn selector(&self) -> LabelSelector {
        match self.label_selector.parse::<LabelSelector>() {
            Ok(sel) => sel,
            Err(e) => {
                debug!(selector = %self.label_selector, error = %e, "invalid label selector; selecting everything");
                LabelSelector::everything()
            }
        }
    }

    pub fn with_filter(mut self, field: impl Into<Field>, value: impl Into<Value>) -> Self {
        self.filters.insert(field.into(), value.into());
        self
    }

    pub fn with_sort(mut self, field: impl Into<Field>, ascending: bool) -> Self {
        self.sort_by = field.into();
        self.ascending = ascending;
        self
    }

    pub fn with_pagination(mut self, limit: i64, page: i64) -> Self {
        self.pagination = Some(Pagination::new(limit, page.saturating_sub(1).saturating_mul(limit), page));
        self
    }
}

/// Build a [`Query`] from request parameters, given in arrival order.
///
/// Repeated keys are allowed: the numeric/boolean parameters read the first occurrence,
/// filter clauses keep the last one.
pub fn parse_query<I, K, V>(params_iter: I) -> Query
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: AsRef<str>,
{
    let pairs: Vec<(K, V)> = params_iter.into_iter().collect();
    let first = |key: &str| -> &str {
        pairs.iter().find(|(k, _)| k.as_ref() == key).map(|(_, v)| v.as_ref()).unwrap_or("")
    };

    let limit = first(params::LIMIT).parse::<i64>().unwrap_or(-1);
    let page = first(params::PAGE).parse::<i64>().unwrap_or(1);

    let mut q = Query::new();
    q.pagination = Some(Pagination::new(limit, page.saturating_sub(1).saturating_mul(limit), page));
    q.sort_by = Field::from(default_str(first(params::SORT_BY), fields::CREATION_TIMESTAMP));
    q.ascending = parse_bool(first(params::ASCENDING)).unwrap_or(false);
    q.label_selector = first(params::LABEL_SELECTOR).to_string();

    for (k, v) in pairs.iter() {
        let key = k.as_ref();
        if params::RESERVED.contains(&key) {
            continue;
        }
        q.filters.insert(Field::from(key), Value::from(v.as_ref()));
    }
    q
}

impl FromStr for Query {
    type Err = Infallible;

    /// Parse a raw `k=v&k2=v2` string. Values are taken literally (no percent-decoding).
    fn from_str(s: &str) -> Result<Self, Self::Err> { Ok(parse_query(query_pairs(s))) }
}

/// Split a raw `k=v&k2=v2` string into pairs. A part without `=` has an empty value;
/// only the first `=` separates key from value.
pub fn query_pairs(s: &str) -> impl Iterator<Item = (&str, &str)> {
    s.split('&').filter(|part| !part.is_empty()).map(|part| part.split_once('=').unwrap_or((part, "")))
}

fn default_str<'a>(value: &'a str, default: &'a str) -> &'a str {
    if value.is_empty() { default } else { value }
}

/// Boolean spellings accepted by the `ascending` parameter.
fn parse_bool(s: &str) -> Option<bool> {
    match s {
        "1" | "t" | "T" | "TRUE" | "true" | "True" => Some(true),
        "0" | "f" | "F" | "FALSE" | "false" | "False" => Some(false),
        _ => None,
    }
}
