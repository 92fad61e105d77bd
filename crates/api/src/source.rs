//! Where objects come from: the live cluster or an in-memory set.

use std::fmt::Debug;

use async_trait::async_trait;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::ObjectMeta;
use kquery_core::{HasMetadata, LabelSelector};
use kquery_kubehub::KubeSource;
use kube::Resource;
use serde::de::DeserializeOwned;

use crate::error::{ApiError, ApiResult};

/// Fetches objects of one kind. `namespace = None` means every namespace.
#[async_trait]
pub trait ObjectSource<K>: Send + Sync {
    async fn fetch_one(&self, namespace: Option<&str>, name: &str) -> ApiResult<K>;
    async fn fetch_all(&self, namespace: Option<&str>, selector: &LabelSelector) -> ApiResult<Vec<K>>;
}

#[async_trait]
impl<K> ObjectSource<K> for KubeSource<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    async fn fetch_one(&self, namespace: Option<&str>, name: &str) -> ApiResult<K> {
        KubeSource::fetch_one(self, namespace, name).await.map_err(ApiError::from_source)
    }

    async fn fetch_all(&self, namespace: Option<&str>, selector: &LabelSelector) -> ApiResult<Vec<K>> {
        KubeSource::fetch_all(self, namespace, selector).await.map_err(ApiError::from_source)
    }
}

/// Fixed set of objects, evaluated like the API server would: namespace scoping and
/// label selector applied on fetch.
#[derive(Debug, Clone)]
pub struct MemorySource<K> {
    objects: Vec<K>,
}

impl<K> Default for MemorySource<K> {
    fn default() -> Self { Self { objects: Vec::new() } }
}

impl<K> MemorySource<K> {
    pub fn new(objects: Vec<K>) -> Self { Self { objects } }
}

impl<K: HasMetadata> MemorySource<K> {
    pub fn with(mut self, object: K) -> Self {
        self.objects.push(object);
        self
    }
}

fn in_namespace(meta: &ObjectMeta, namespace: Option<&str>) -> bool {
    match namespace {
        Some(ns) if !ns.is_empty() => meta.namespace.as_deref() == Some(ns),
        _ => true,
    }
}

#[async_trait]
impl<K> ObjectSource<K> for MemorySource<K>
where
    K: k8s_openapi::Resource + HasMetadata + Clone + Send + Sync,
{
    async fn fetch_one(&self, namespace: Option<&str>, name: &str) -> ApiResult<K> {
        self.objects
            .iter()
            .find(|o| {
                let meta = o.object_meta();
                meta.name.as_deref() == Some(name) && in_namespace(meta, namespace)
            })
            .cloned()
            .ok_or_else(|| ApiError::NotFound(format!("{} {name:?} not found", K::KIND)))
    }

    async fn fetch_all(&self, namespace: Option<&str>, selector: &LabelSelector) -> ApiResult<Vec<K>> {
        Ok(self
            .objects
            .iter()
            .filter(|o| {
                let meta = o.object_meta();
                in_namespace(meta, namespace) && selector.matches(meta.labels.as_ref())
            })
            .cloned()
            .collect())
    }
}
