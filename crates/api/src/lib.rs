//! Query façade over Kubernetes objects.
//!
//! Frontends name a resource, optionally a namespace, and pass a [`Query`]; the
//! [`Registry`] resolves the resource to a getter that fetches from its source, applies
//! the kind's status, filter and sort rules, and returns one page as JSON.

#![forbid(unsafe_code)]

pub mod dynobj;
pub mod error;
pub mod getter;
pub mod kinds;
pub mod quantity;
pub mod registry;
pub mod source;

pub use dynobj::{typed_compare, typed_filter, DynKind, DynObject};
pub use error::{ApiError, ApiResult};
pub use getter::{Adapter, Defaults, Getter, ResourceGetter, ResourceInfo};
pub use kquery_core::{parse_query, query_pairs, LabelSelector, ListResult, PageInfo, Query};
pub use quantity::Milli;
pub use registry::{KubeSources, MemorySources, Object, Registry, SourceFactory};
pub use source::{MemorySource, ObjectSource};
