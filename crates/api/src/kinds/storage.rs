use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{PersistentVolume, PersistentVolumeClaim, Pod};
use kquery_core::{fields, Filter, LabelSelector, Query};
use kquery_search::default_filter;
use rustc_hash::FxHashSet;

use super::pods::pod_claims;
use crate::error::ApiResult;
use crate::getter::Adapter;
use crate::source::ObjectSource;

/// Set on every returned claim: `"true"` when a pod in its namespace mounts it.
pub const ANNOTATION_IN_USE: &str = "example.com/in-use";

pub fn filter_claims(pvc: &PersistentVolumeClaim, filter: &Filter) -> bool {
    let value = filter.value.as_str();
    match filter.field.as_str() {
        fields::STATUS => pvc.status.as_ref().and_then(|s| s.phase.as_deref()).unwrap_or("").eq_ignore_ascii_case(value),
        fields::STORAGE_CLASS_NAME => pvc.spec.as_ref().and_then(|s| s.storage_class_name.as_deref()) == Some(value),
        _ => default_filter(pvc, filter),
    }
}

pub fn filter_volumes(pv: &PersistentVolume, filter: &Filter) -> bool {
    let value = filter.value.as_str();
    match filter.field.as_str() {
        fields::STATUS => pv.status.as_ref().and_then(|s| s.phase.as_deref()).unwrap_or("").eq_ignore_ascii_case(value),
        fields::STORAGE_CLASS_NAME => {
            let class = pv.spec.as_ref().and_then(|s| s.storage_class_name.as_deref()).unwrap_or("");
            !class.is_empty() && class == value
        }
        _ => default_filter(pv, filter),
    }
}

/// Claims mounted by some pod, as (namespace, claim name).
#[derive(Debug, Default)]
pub struct ClaimUsage {
    mounted: FxHashSet<(String, String)>,
}

impl ClaimUsage {
    pub fn from_pods(pods: &[Pod]) -> Self {
        let mut mounted = FxHashSet::default();
        for p in pods {
            let ns = p.metadata.namespace.clone().unwrap_or_default();
            for claim in pod_claims(p) {
                mounted.insert((ns.clone(), claim.to_string()));
            }
        }
        Self { mounted }
    }

    pub fn in_use(&self, pvc: &PersistentVolumeClaim) -> bool {
        let key = (pvc.metadata.namespace.clone().unwrap_or_default(), pvc.metadata.name.clone().unwrap_or_default());
        self.mounted.contains(&key)
    }

    pub fn annotate(&self, mut pvc: PersistentVolumeClaim) -> PersistentVolumeClaim {
        let in_use = self.in_use(&pvc);
        pvc.metadata.annotations.get_or_insert_with(Default::default).insert(ANNOTATION_IN_USE.to_string(), in_use.to_string());
        pvc
    }
}

pub struct Claims {
    pods: Arc<dyn ObjectSource<Pod>>,
}

impl Claims {
    pub fn new(pods: Arc<dyn ObjectSource<Pod>>) -> Self { Self { pods } }
}

#[async_trait]
impl Adapter<PersistentVolumeClaim> for Claims {
    type Context = ClaimUsage;

    async fn context(&self, namespace: Option<&str>, _q: &Query) -> ApiResult<ClaimUsage> {
        let pods = self.pods.fetch_all(namespace, &LabelSelector::everything()).await?;
        Ok(ClaimUsage::from_pods(&pods))
    }

    fn filter(&self, _: &ClaimUsage, pvc: &PersistentVolumeClaim, f: &Filter) -> bool { filter_claims(pvc, f) }

    fn enrich(&self, usage: &ClaimUsage, pvc: PersistentVolumeClaim) -> PersistentVolumeClaim { usage.annotate(pvc) }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct Volumes;

#[async_trait]
impl Adapter<PersistentVolume> for Volumes {
    type Context = ();
    async fn context(&self, _: Option<&str>, _: &Query) -> ApiResult<()> { Ok(()) }
    fn filter(&self, _: &(), pv: &PersistentVolume, f: &Filter) -> bool { filter_volumes(pv, f) }
}
