//! Default comparator and filter over standard object metadata.
//!
//! Per-kind adapters handle their own fields first and delegate everything else here.

use std::collections::BTreeMap;

use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kquery_core::{fields, Field, Filter, HasMetadata};

use crate::matcher::{custom_match, label_match};

static EMPTY: BTreeMap<String, String> = BTreeMap::new();

// Closures may borrow per-request state for `'a`.

/// `true` when `left` should sort before `right` in descending order.
pub type CompareFn<'a, T> = dyn Fn(&T, &T, &Field) -> bool + Send + Sync + 'a;
/// `true` when the object satisfies one clause.
pub type FilterFn<'a, T> = dyn Fn(&T, &Filter) -> bool + Send + Sync + 'a;
/// Post-filter enrichment applied to each surviving object.
pub type TransformFn<'a, T> = dyn Fn(T) -> T + Send + Sync + 'a;

fn name_of(meta: &ObjectMeta) -> &str { meta.name.as_deref().unwrap_or("") }

fn map_or_empty(m: &Option<BTreeMap<String, String>>) -> &BTreeMap<String, String> {
    m.as_ref().unwrap_or(&EMPTY)
}

/// `name` sorts by name; any other field sorts by creation time with name as tie-break.
pub fn default_meta_compare(left: &ObjectMeta, right: &ObjectMeta, sort_by: &Field) -> bool {
    match sort_by.as_str() {
        fields::NAME => name_of(left) > name_of(right),
        // creationTimestamp, createTime and unknown fields
        _ => {
            let l = left.creation_timestamp.as_ref().map(|t| t.0);
            let r = right.creation_timestamp.as_ref().map(|t| t.0);
            if l == r {
                name_of(left) > name_of(right)
            } else {
                l > r
            }
        }
    }
}

/// Filter dispatch over the common metadata fields. Unknown fields never match.
pub fn default_meta_filter(meta: &ObjectMeta, filter: &Filter) -> bool {
    let value = filter.value.as_str();
    match filter.field.as_str() {
        fields::NAMES => value.split(',').any(|n| name_of(meta) == n),
        fields::NAME => name_of(meta).contains(value),
        fields::UID => meta.uid.as_deref().unwrap_or("") == value,
        fields::NAMESPACE => meta.namespace.as_deref().unwrap_or("") == value,
        fields::OWNER_REFERENCE => meta.owner_references.iter().flatten().any(|o| o.uid == value),
        fields::OWNER_KIND => meta.owner_references.iter().flatten().any(|o| o.kind == value),
        fields::ANNOTATION => label_match(map_or_empty(&meta.annotations), value),
        fields::LABEL => label_match(map_or_empty(&meta.labels), value),
        fields::DOGO => custom_match(map_or_empty(&meta.annotations), value),
        _ => false,
    }
}

pub fn default_compare<T: HasMetadata>(left: &T, right: &T, sort_by: &Field) -> bool {
    default_meta_compare(left.object_meta(), right.object_meta(), sort_by)
}

pub fn default_filter<T: HasMetadata>(object: &T, filter: &Filter) -> bool {
    default_meta_filter(object.object_meta(), filter)
}
