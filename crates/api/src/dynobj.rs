//! Objects of several kinds in one list.
//!
//! Comparators and filters are written per kind. When one is applied to an object of
//! another kind it answers "not greater" and "no match".

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::Metadata;
use kquery_core::{Field, Filter};
use kquery_search::{default_compare, default_filter};
use serde::Serialize;

use crate::error::{ApiError, ApiResult};
use crate::kinds::nodes::filter_nodes;
use crate::kinds::pods::filter_pods;
use crate::kinds::storage::{filter_claims, filter_volumes};
use crate::kinds::workloads::{
    compare_deployments, compare_jobs, filter_daemonsets, filter_deployments, filter_jobs, filter_statefulsets,
};

/// A kind that can be pulled back out of a [`DynObject`].
pub trait DynKind: Sized {
    fn from_dyn(o: &DynObject) -> Option<&Self>;
}

macro_rules! dyn_objects {
    ($( $variant:ident($ty:ty) { compare: $cmp:expr, filter: $flt:expr } )*) => {
        /// One object of any served kind. Serializes as the bare object.
        #[derive(Debug, Clone, PartialEq, Serialize)]
        #[serde(untagged)]
        pub enum DynObject {
            $( $variant($ty), )*
        }

        impl DynObject {
            pub fn kind(&self) -> &'static str {
                match self {
                    $( DynObject::$variant(_) => <$ty as k8s_openapi::Resource>::KIND, )*
                }
            }

            pub fn meta(&self) -> &ObjectMeta {
                match self {
                    $( DynObject::$variant(o) => o.metadata(), )*
                }
            }

            /// The kind's own comparator; `false` across kinds.
            pub fn compare(&self, other: &DynObject, field: &Field) -> bool {
                match (self, other) {
                    $( (DynObject::$variant(l), DynObject::$variant(r)) => ($cmp)(l, r, field), )*
                    _ => false,
                }
            }

            pub fn filter(&self, filter: &Filter) -> bool {
                match self {
                    $( DynObject::$variant(o) => ($flt)(o, filter), )*
                }
            }

            /// Rebuild from JSON carrying a `kind` field.
            pub fn from_value(value: serde_json::Value) -> ApiResult<Self> {
                let kind = value.get("kind").and_then(|k| k.as_str()).unwrap_or_default().to_string();
                $(
                    if kind == <$ty as k8s_openapi::Resource>::KIND {
                        return Ok(DynObject::$variant(serde_json::from_value(value)?));
                    }
                )*
                Err(ApiError::Validation(format!("unsupported kind {kind:?}")))
            }
        }

        $(
            impl From<$ty> for DynObject {
                fn from(o: $ty) -> Self { DynObject::$variant(o) }
            }

            impl DynKind for $ty {
                fn from_dyn(o: &DynObject) -> Option<&Self> {
                    match o {
                        DynObject::$variant(v) => Some(v),
                        #[allow(unreachable_patterns)]
                        _ => None,
                    }
                }
            }
        )*
    };
}

dyn_objects! {
    Deployment(Deployment) { compare: compare_deployments, filter: filter_deployments }
    StatefulSet(StatefulSet) { compare: default_compare::<StatefulSet>, filter: filter_statefulsets }
    DaemonSet(DaemonSet) { compare: default_compare::<DaemonSet>, filter: filter_daemonsets }
    Job(Job) { compare: compare_jobs, filter: filter_jobs }
    CronJob(CronJob) { compare: default_compare::<CronJob>, filter: default_filter::<CronJob> }
    Pod(Pod) { compare: default_compare::<Pod>, filter: filter_pods }
    Node(Node) { compare: default_compare::<Node>, filter: filter_nodes }
    PersistentVolumeClaim(PersistentVolumeClaim) { compare: default_compare::<PersistentVolumeClaim>, filter: filter_claims }
    PersistentVolume(PersistentVolume) { compare: default_compare::<PersistentVolume>, filter: filter_volumes }
    Namespace(Namespace) { compare: default_compare::<Namespace>, filter: default_filter::<Namespace> }
    ConfigMap(ConfigMap) { compare: default_compare::<ConfigMap>, filter: default_filter::<ConfigMap> }
    Secret(Secret) { compare: default_compare::<Secret>, filter: default_filter::<Secret> }
    Service(Service) { compare: default_compare::<Service>, filter: default_filter::<Service> }
    ServiceAccount(ServiceAccount) { compare: default_compare::<ServiceAccount>, filter: default_filter::<ServiceAccount> }
    Ingress(Ingress) { compare: default_compare::<Ingress>, filter: default_filter::<Ingress> }
    Role(Role) { compare: default_compare::<Role>, filter: default_filter::<Role> }
    RoleBinding(RoleBinding) { compare: default_compare::<RoleBinding>, filter: default_filter::<RoleBinding> }
    StorageClass(StorageClass) { compare: default_compare::<StorageClass>, filter: default_filter::<StorageClass> }
}

/// Lift a per-kind comparator onto mixed objects.
pub fn typed_compare<K: DynKind>(f: impl Fn(&K, &K, &Field) -> bool) -> impl Fn(&DynObject, &DynObject, &Field) -> bool {
    move |l: &DynObject, r: &DynObject, field: &Field| match (K::from_dyn(l), K::from_dyn(r)) {
        (Some(l), Some(r)) => f(l, r, field),
        _ => false,
    }
}

/// Lift a per-kind filter onto mixed objects.
pub fn typed_filter<K: DynKind>(f: impl Fn(&K, &Filter) -> bool) -> impl Fn(&DynObject, &Filter) -> bool {
    move |o: &DynObject, filter: &Filter| K::from_dyn(o).is_some_and(|o| f(o, filter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::apps::v1::DeploymentStatus;
    use kquery_core::Query;
    use kquery_search::default_list;

    fn meta(name: &str) -> ObjectMeta { ObjectMeta { name: Some(name.into()), namespace: Some("default".into()), ..Default::default() } }

    fn deployment(name: &str) -> DynObject {
        Deployment { metadata: meta(name), status: Some(DeploymentStatus::default()), ..Default::default() }.into()
    }

    fn config_map(name: &str) -> DynObject { ConfigMap { metadata: meta(name), ..Default::default() }.into() }

    #[test]
    fn mismatched_kinds_never_outrank() {
        let (d, c) = (deployment("b"), config_map("a"));
        assert!(!d.compare(&c, &Field::from("name")));
        assert!(!c.compare(&d, &Field::from("name")));
        assert!(config_map("b").compare(&c, &Field::from("name")));
    }

    #[test]
    fn typed_helpers_reject_other_kinds() {
        let status = typed_filter(filter_deployments);
        assert!(status(&deployment("web"), &Filter::new("status", "stopped")));
        assert!(!status(&config_map("web"), &Filter::new("status", "stopped")));
        assert!(!status(&config_map("web"), &Filter::new("name", "web")));

        let by_name = typed_compare(default_compare::<ConfigMap>);
        assert!(by_name(&config_map("b"), &config_map("a"), &Field::from("name")));
        assert!(!by_name(&deployment("b"), &config_map("a"), &Field::from("name")));
    }

    #[test]
    fn kind_specific_filters_dispatch_by_variant() {
        assert!(deployment("web").filter(&Filter::new("status", "stopped")));
        assert!(!config_map("web").filter(&Filter::new("status", "stopped")));
        assert!(config_map("web").filter(&Filter::new("name", "web")));
    }

    #[test]
    fn json_round_trip_uses_kind() {
        let value = serde_json::to_value(&config_map("settings")).unwrap();
        assert_eq!(value["kind"], "ConfigMap");
        let back = DynObject::from_value(value).unwrap();
        assert_eq!(back.kind(), "ConfigMap");
        assert_eq!(back.meta().name.as_deref(), Some("settings"));

        let err = DynObject::from_value(serde_json::json!({ "kind": "Widget" })).unwrap_err();
        assert!(matches!(err, ApiError::Validation(_)));
    }

    #[test]
    fn mixed_list_filters_and_pages() {
        let objects = vec![deployment("api"), config_map("api-config"), deployment("web"), config_map("web-config")];
        let q = Query::new().with_filter("names", "api").with_pagination(10, 1);
        let res = default_list(objects, &q, &DynObject::compare, &DynObject::filter, &[]);
        assert_eq!(res.pagination.total, 1);
        assert_eq!(res.data[0].kind(), "Deployment");
    }
}
