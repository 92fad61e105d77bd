//! Resource-name lookup over every served kind.

use std::any::{Any, TypeId};
use std::collections::BTreeMap;
use std::fmt::Debug;
use std::sync::Arc;

use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::{CronJob, Job};
use k8s_openapi::api::core::v1::{
    ConfigMap, Namespace, Node, PersistentVolume, PersistentVolumeClaim, Pod, Secret, Service, ServiceAccount,
};
use k8s_openapi::api::networking::v1::Ingress;
use k8s_openapi::api::rbac::v1::{Role, RoleBinding};
use k8s_openapi::api::storage::v1::StorageClass;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kquery_core::{ListResult, Query, NO_PAGINATION};
use kquery_search::default_list;
use kquery_kubehub::KubeSource;
use rustc_hash::FxHashMap;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::dynobj::DynObject;
use crate::error::{ApiError, ApiResult};
use crate::getter::{Adapter, Defaults, Getter, ResourceGetter, ResourceInfo};
use crate::kinds::{Claims, DaemonSets, Deployments, Jobs, Nodes, Pods, StatefulSets, Volumes};
use crate::source::{MemorySource, ObjectSource};

/// A Kubernetes object type the registry can serve.
pub trait Object:
    k8s_openapi::Resource + k8s_openapi::Metadata<Ty = ObjectMeta> + Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static
{
}

impl<K> Object for K where
    K: k8s_openapi::Resource + k8s_openapi::Metadata<Ty = ObjectMeta> + Clone + Debug + DeserializeOwned + Serialize + Send + Sync + 'static
{
}

/// Builds one source per kind.
pub trait SourceFactory {
    fn namespaced<K: Object + k8s_openapi::Resource<Scope = NamespaceResourceScope>>(&self) -> Arc<dyn ObjectSource<K>>;
    fn cluster<K: Object + k8s_openapi::Resource<Scope = ClusterResourceScope>>(&self) -> Arc<dyn ObjectSource<K>>;
}

/// Live cluster sources sharing one client.
pub struct KubeSources {
    client: kube::Client,
}

impl KubeSources {
    pub fn new(client: kube::Client) -> Self { Self { client } }
}

impl SourceFactory for KubeSources {
    fn namespaced<K: Object + k8s_openapi::Resource<Scope = NamespaceResourceScope>>(&self) -> Arc<dyn ObjectSource<K>> {
        Arc::new(KubeSource::<K>::namespaced(self.client.clone()))
    }

    fn cluster<K: Object + k8s_openapi::Resource<Scope = ClusterResourceScope>>(&self) -> Arc<dyn ObjectSource<K>> {
        Arc::new(KubeSource::<K>::cluster(self.client.clone()))
    }
}

/// In-memory objects keyed by type; kinds never added serve an empty set.
#[derive(Default)]
pub struct MemorySources {
    by_type: FxHashMap<TypeId, Box<dyn Any + Send + Sync>>,
}

impl MemorySources {
    pub fn new() -> Self { Self::default() }

    pub fn with<K: Object>(mut self, objects: Vec<K>) -> Self {
        let source: Arc<dyn ObjectSource<K>> = Arc::new(MemorySource::new(objects));
        self.by_type.insert(TypeId::of::<K>(), Box::new(source));
        self
    }

    fn source<K: Object>(&self) -> Arc<dyn ObjectSource<K>> {
        self.by_type
            .get(&TypeId::of::<K>())
            .and_then(|b| b.downcast_ref::<Arc<dyn ObjectSource<K>>>())
            .cloned()
            .unwrap_or_else(|| Arc::new(MemorySource::<K>::default()))
    }
}

impl SourceFactory for MemorySources {
    fn namespaced<K: Object + k8s_openapi::Resource<Scope = NamespaceResourceScope>>(&self) -> Arc<dyn ObjectSource<K>> { self.source::<K>() }

    fn cluster<K: Object + k8s_openapi::Resource<Scope = ClusterResourceScope>>(&self) -> Arc<dyn ObjectSource<K>> { self.source::<K>() }
}

pub struct Registry {
    getters: BTreeMap<&'static str, Arc<dyn ResourceGetter>>,
}

impl Registry {
    /// Every served kind backed by the live cluster.
    pub fn with_client(client: kube::Client) -> Self { Self::from_sources(&KubeSources::new(client)) }

    pub fn from_sources<F: SourceFactory>(f: &F) -> Self {
        let mut r = Registry { getters: BTreeMap::new() };
        let pods = f.namespaced::<Pod>();

        r.add::<Deployment, _>("deployments", true, f.namespaced(), Deployments);
        r.add::<StatefulSet, _>("statefulsets", true, f.namespaced(), StatefulSets);
        r.add::<DaemonSet, _>("daemonsets", true, f.namespaced(), DaemonSets);
        r.add::<Job, _>("jobs", true, f.namespaced(), Jobs);
        r.add::<CronJob, _>("cronjobs", true, f.namespaced(), Defaults);
        r.add::<Pod, _>("pods", true, pods.clone(), Pods::new(f.namespaced::<Service>()));
        r.add::<Node, _>("nodes", false, f.cluster(), Nodes::new(pods.clone()));
        r.add::<PersistentVolumeClaim, _>("persistentvolumeclaims", true, f.namespaced(), Claims::new(pods));
        r.add::<PersistentVolume, _>("persistentvolumes", false, f.cluster(), Volumes);
        r.add::<Namespace, _>("namespaces", false, f.cluster(), Defaults);
        r.add::<ConfigMap, _>("configmaps", true, f.namespaced(), Defaults);
        r.add::<Secret, _>("secrets", true, f.namespaced(), Defaults);
        r.add::<Service, _>("services", true, f.namespaced(), Defaults);
        r.add::<ServiceAccount, _>("serviceaccounts", true, f.namespaced(), Defaults);
        r.add::<Ingress, _>("ingresses", true, f.namespaced(), Defaults);
        r.add::<Role, _>("roles", true, f.namespaced(), Defaults);
        r.add::<RoleBinding, _>("rolebindings", true, f.namespaced(), Defaults);
        r.add::<StorageClass, _>("storageclasses", false, f.cluster(), Defaults);
        debug!(resources = r.getters.len(), "registry built");
        r
    }

    fn add<K, A>(&mut self, name: &'static str, namespaced: bool, source: Arc<dyn ObjectSource<K>>, adapter: A)
    where
        K: Object,
        A: Adapter<K>,
    {
        let info = ResourceInfo { name, kind: K::KIND, namespaced };
        self.getters.insert(name, Arc::new(Getter::new(info, source, adapter)));
    }

    /// Served resources in name order.
    pub fn resources(&self) -> Vec<ResourceInfo> { self.getters.values().map(|g| g.info()).collect() }

    /// Look up by plural name (`deployments`) or kind (`Deployment`, any case).
    pub fn getter(&self, resource: &str) -> ApiResult<Arc<dyn ResourceGetter>> {
        if let Some(g) = self.getters.get(resource) {
            return Ok(g.clone());
        }
        self.getters
            .values()
            .find(|g| g.info().kind.eq_ignore_ascii_case(resource) || g.info().name.eq_ignore_ascii_case(resource))
            .cloned()
            .ok_or_else(|| ApiError::UnsupportedResource(resource.to_string()))
    }

    pub async fn get(&self, resource: &str, namespace: Option<&str>, name: &str) -> ApiResult<serde_json::Value> {
        self.getter(resource)?.get(namespace, name).await
    }

    pub async fn list(&self, resource: &str, namespace: Option<&str>, q: &Query) -> ApiResult<ListResult<serde_json::Value>> {
        self.getter(resource)?.list(namespace, q).await
    }

    /// One page over several resources. Each resource applies the query's filters with
    /// its own adapter; the merged set is then sorted and windowed as a whole, objects of
    /// different kinds never outranking each other.
    pub async fn list_mixed(&self, resources: &[&str], namespace: Option<&str>, q: &Query) -> ApiResult<ListResult<DynObject>> {
        let mut per_kind = q.clone();
        per_kind.pagination = Some(NO_PAGINATION);
        let mut objects = Vec::new();
        for resource in resources {
            let page = self.list(resource, namespace, &per_kind).await?;
            for value in page.data {
                objects.push(DynObject::from_value(value)?);
            }
        }
        let mut merged = q.clone();
        merged.filters.clear();
        let keep = |_: &DynObject, _: &kquery_core::Filter| true;
        Ok(default_list(objects, &merged, &DynObject::compare, &keep, &[]))
    }
}
