use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Pod, Service};
use kquery_core::{fields, Filter, LabelSelector, Query};
use kquery_search::default_filter;
use rustc_hash::FxHashMap;

use crate::error::ApiResult;
use crate::getter::Adapter;
use crate::source::ObjectSource;

pub fn pod_phase(p: &Pod) -> &str { p.status.as_ref().and_then(|s| s.phase.as_deref()).unwrap_or("") }

pub fn pod_node(p: &Pod) -> &str { p.spec.as_ref().and_then(|s| s.node_name.as_deref()).unwrap_or("") }

/// Names of the claims mounted by the pod.
pub fn pod_claims(p: &Pod) -> impl Iterator<Item = &str> {
    p.spec
        .iter()
        .flat_map(|s| s.volumes.iter().flatten())
        .filter_map(|v| v.persistent_volume_claim.as_ref().map(|c| c.claim_name.as_str()))
}

pub fn pod_uses_claim(p: &Pod, claim: &str) -> bool { pod_claims(p).any(|c| c == claim) }

/// Pods that still hold node resources.
pub fn is_terminated(p: &Pod) -> bool { matches!(pod_phase(p), "Succeeded" | "Failed") }

/// Filters that need nothing beyond the pod itself.
pub fn filter_pods(p: &Pod, filter: &Filter) -> bool {
    let value = filter.value.as_str();
    match filter.field.as_str() {
        fields::NODE_NAME => pod_node(p) == value,
        fields::PVC_NAME => pod_uses_claim(p, value),
        fields::STATUS => pod_phase(p) == value,
        fields::SERVICE_NAME => false,
        _ => default_filter(p, filter),
    }
}

/// Service selectors keyed by (namespace, name).
#[derive(Debug, Default)]
pub struct PodContext {
    services: FxHashMap<(String, String), BTreeMap<String, String>>,
}

impl PodContext {
    pub fn from_services(services: Vec<Service>) -> Self {
        let services = services
            .into_iter()
            .map(|s| {
                let key = (s.metadata.namespace.unwrap_or_default(), s.metadata.name.unwrap_or_default());
                (key, s.spec.and_then(|spec| spec.selector).unwrap_or_default())
            })
            .collect();
        Self { services }
    }

    /// Selected by the named service in the pod's own namespace. An empty selector selects nothing.
    pub fn belongs_to(&self, p: &Pod, service: &str) -> bool {
        let ns = p.metadata.namespace.clone().unwrap_or_default();
        let Some(selector) = self.services.get(&(ns, service.to_string())) else { return false };
        if selector.is_empty() {
            return false;
        }
        let labels = p.metadata.labels.as_ref();
        selector.iter().all(|(k, v)| labels.and_then(|l| l.get(k)) == Some(v))
    }
}

pub struct Pods {
    services: Arc<dyn ObjectSource<Service>>,
}

impl Pods {
    pub fn new(services: Arc<dyn ObjectSource<Service>>) -> Self { Self { services } }
}

#[async_trait]
impl Adapter<Pod> for Pods {
    type Context = PodContext;

    // Services are only fetched when the query filters on one.
    async fn context(&self, namespace: Option<&str>, q: &Query) -> ApiResult<PodContext> {
        if !q.filters.contains_key(fields::SERVICE_NAME) {
            return Ok(PodContext::default());
        }
        let services = self.services.fetch_all(namespace, &LabelSelector::everything()).await?;
        Ok(PodContext::from_services(services))
    }

    fn filter(&self, ctx: &PodContext, p: &Pod, filter: &Filter) -> bool {
        match filter.field.as_str() {
            fields::SERVICE_NAME => ctx.belongs_to(p, filter.value.as_str()),
            _ => filter_pods(p, filter),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use k8s_openapi::api::core::v1::{PersistentVolumeClaimVolumeSource, PodSpec, PodStatus, ServiceSpec, Volume};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;

    fn pod(name: &str, node: &str, phase: &str, claim: Option<&str>) -> Pod {
        Pod {
            metadata: ObjectMeta {
                name: Some(name.into()),
                namespace: Some("default".into()),
                labels: Some([("app".to_string(), "web".to_string())].into_iter().collect()),
                ..Default::default()
            },
            spec: Some(PodSpec {
                node_name: Some(node.into()),
                volumes: claim.map(|c| {
                    vec![Volume {
                        name: "data".into(),
                        persistent_volume_claim: Some(PersistentVolumeClaimVolumeSource { claim_name: c.into(), read_only: None }),
                        ..Default::default()
                    }]
                }),
                ..Default::default()
            }),
            status: Some(PodStatus { phase: Some(phase.into()), ..Default::default() }),
        }
    }

    fn service(name: &str, selector: &[(&str, &str)]) -> Service {
        Service {
            metadata: ObjectMeta { name: Some(name.into()), namespace: Some("default".into()), ..Default::default() },
            spec: Some(ServiceSpec {
                selector: Some(selector.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()),
                ..Default::default()
            }),
            ..Default::default()
        }
    }

    #[test]
    fn spec_and_status_filters() {
        let p = pod("web-0", "node-a", "Running", Some("data-web-0"));
        assert!(filter_pods(&p, &Filter::new("nodeName", "node-a")));
        assert!(!filter_pods(&p, &Filter::new("nodeName", "node-b")));
        assert!(filter_pods(&p, &Filter::new("pvcName", "data-web-0")));
        assert!(!filter_pods(&pod("x", "n", "Running", None), &Filter::new("pvcName", "data-web-0")));
        assert!(filter_pods(&p, &Filter::new("status", "Running")));
        assert!(!filter_pods(&p, &Filter::new("status", "running")));
        assert!(filter_pods(&p, &Filter::new("name", "web")));
    }

    #[test]
    fn service_membership() {
        let ctx = PodContext::from_services(vec![service("web", &[("app", "web")]), service("headless", &[]), service("db", &[("app", "db")])]);
        let p = pod("web-0", "node-a", "Running", None);
        let pods = Pods::new(Arc::new(crate::source::MemorySource::<Service>::default()));
        assert!(pods.filter(&ctx, &p, &Filter::new("serviceName", "web")));
        assert!(!pods.filter(&ctx, &p, &Filter::new("serviceName", "db")));
        assert!(!pods.filter(&ctx, &p, &Filter::new("serviceName", "headless")));
        assert!(!pods.filter(&ctx, &p, &Filter::new("serviceName", "missing")));
        assert!(!filter_pods(&p, &Filter::new("serviceName", "web")));
    }

    #[test]
    fn terminated_phases() {
        assert!(is_terminated(&pod("a", "n", "Succeeded", None)));
        assert!(is_terminated(&pod("a", "n", "Failed", None)));
        assert!(!is_terminated(&pod("a", "n", "Pending", None)));
    }
}
