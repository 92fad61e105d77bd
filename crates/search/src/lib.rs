//! kquery search: label matching, metadata comparators and the generic list engine.
//!
//! Every object kind shares one evaluation path ([`list::default_list`]); kinds differ
//! only in the comparator, filter and transforms they hand in.

#![forbid(unsafe_code)]

pub mod list;
pub mod matcher;
pub mod meta;

pub use kquery_core::{parse_query, Field, Filter, LabelSelector, ListResult, PageInfo, Pagination, Query, Value, NO_PAGINATION};
pub use list::default_list;
pub use matcher::{custom_match, label_match};
pub use meta::{default_compare, default_filter, default_meta_compare, default_meta_filter, CompareFn, FilterFn, TransformFn};
