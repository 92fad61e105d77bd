//! kquery core types: fields, filters, result envelope and the metadata capability.

#![forbid(unsafe_code)]

use std::borrow::Borrow;
use std::fmt;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use serde::{Deserialize, Serialize};

pub mod query;
pub mod selector;

pub use query::{parse_query, query_pairs, Pagination, Query, NO_PAGINATION};
pub use selector::{LabelSelector, SelectorError};

/// Name of a sortable/filterable attribute.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Field(pub String);

/// Opaque payload of a filter clause.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Value(pub String);

macro_rules! string_newtype {
    ($t:ident) => {
        impl $t {
            pub fn as_str(&self) -> &str { &self.0 }
            pub fn is_empty(&self) -> bool { self.0.is_empty() }
        }
        impl From<&str> for $t {
            fn from(s: &str) -> Self { Self(s.to_string()) }
        }
        impl From<String> for $t {
            fn from(s: String) -> Self { Self(s) }
        }
        impl Borrow<str> for $t {
            fn borrow(&self) -> &str { &self.0 }
        }
        impl AsRef<str> for $t {
            fn as_ref(&self) -> &str { &self.0 }
        }
        impl PartialEq<str> for $t {
            fn eq(&self, other: &str) -> bool { self.0 == other }
        }
        impl PartialEq<&str> for $t {
            fn eq(&self, other: &&str) -> bool { self.0 == *other }
        }
        impl fmt::Display for $t {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result { f.write_str(&self.0) }
        }
    };
}

string_newtype!(Field);
string_newtype!(Value);

/// One matching clause: `field` must be satisfied by `value`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Filter {
    pub field: Field,
    pub value: Value,
}

impl Filter {
    pub fn new(field: impl Into<Field>, value: impl Into<Value>) -> Self {
        Self { field: field.into(), value: value.into() }
    }
}

/// Well-known filter and sort fields.
pub mod fields {
    pub const NAMES: &str = "names";
    pub const NAME: &str = "name";
    pub const UID: &str = "uid";
    pub const NAMESPACE: &str = "namespace";
    pub const OWNER_REFERENCE: &str = "ownerReference";
    pub const OWNER_KIND: &str = "ownerKind";
    pub const ANNOTATION: &str = "annotation";
    pub const LABEL: &str = "label";
    /// Boolean DSL over annotations (`a=b||c=d,e=f`).
    pub const DOGO: &str = "dogo";

    pub const CREATION_TIMESTAMP: &str = "creationTimestamp";
    pub const CREATE_TIME: &str = "createTime";
    pub const UPDATE_TIME: &str = "updateTime";
    pub const LAST_UPDATE_TIMESTAMP: &str = "lastUpdateTimestamp";

    pub const STATUS: &str = "status";
    pub const STORAGE_CLASS_NAME: &str = "storageClassName";
    pub const NODE_NAME: &str = "nodeName";
    pub const PVC_NAME: &str = "pvcName";
    pub const SERVICE_NAME: &str = "serviceName";
}

/// Request parameter keys understood by the parser.
pub mod params {
    pub const NAME: &str = "name";
    pub const LABEL_SELECTOR: &str = "labelSelector";
    pub const FIELD_SELECTOR: &str = "fieldSelector";
    pub const PAGE: &str = "page";
    pub const LIMIT: &str = "limit";
    pub const SORT_BY: &str = "sortBy";
    pub const ASCENDING: &str = "ascending";

    /// Keys consumed by the parser; everything else becomes a filter clause.
    pub const RESERVED: [&str; 5] = [PAGE, LIMIT, SORT_BY, ASCENDING, LABEL_SELECTOR];
}

/// Anything carrying standard Kubernetes object metadata.
pub trait HasMetadata {
    fn object_meta(&self) -> &ObjectMeta;
}

impl<K> HasMetadata for K
where
    K: k8s_openapi::Metadata<Ty = ObjectMeta>,
{
    fn object_meta(&self) -> &ObjectMeta { self.metadata() }
}

/// Pagination block of a list response. `total` counts items after filtering.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct PageInfo {
    pub limit: i64,
    pub total: usize,
    pub offset: i64,
    pub page: i64,
}

/// One page of objects plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ListResult<T> {
    pub data: Vec<T>,
    pub pagination: PageInfo,
}

impl<T> ListResult<T> {
    /// Convert items while keeping pagination metadata.
    pub fn map<U>(self, f: impl FnMut(T) -> U) -> ListResult<U> {
        ListResult { data: self.data.into_iter().map(f).collect(), pagination: self.pagination }
    }

    /// Fallible variant of [`ListResult::map`].
    pub fn try_map<U, E>(self, f: impl FnMut(T) -> Result<U, E>) -> Result<ListResult<U>, E> {
        let data = self.data.into_iter().map(f).collect::<Result<Vec<_>, _>>()?;
        Ok(ListResult { data, pagination: self.pagination })
    }
}

pub mod prelude {
    pub use super::{fields, params, Field, Filter, HasMetadata, LabelSelector, ListResult, PageInfo, Pagination, Query, Value, NO_PAGINATION};
}
