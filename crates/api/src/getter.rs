//! Per-resource getters: fetch from a source, then run the list engine with the kind's
//! comparator, filter and transform.

use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use kquery_core::{Field, Filter, HasMetadata, ListResult, Query};
use kquery_search::{default_compare, default_filter, default_list};
use serde::Serialize;
use tracing::info;

use crate::error::ApiResult;
use crate::source::ObjectSource;

/// Static description of a served resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ResourceInfo {
    /// Plural lower-case name used on the command line (`deployments`).
    pub name: &'static str,
    pub kind: &'static str,
    pub namespaced: bool,
}

/// Kind-specific query behavior.
///
/// `context` runs once per request, before the engine, and gathers whatever the hooks
/// need beyond the object itself (related pods, services).
#[async_trait]
pub trait Adapter<K: HasMetadata>: Send + Sync + 'static {
    type Context: Send + Sync;

    async fn context(&self, namespace: Option<&str>, q: &Query) -> ApiResult<Self::Context>;

    fn compare(&self, left: &K, right: &K, field: &Field) -> bool { default_compare(left, right, field) }

    /// Runs on every fetched object before filtering, so filters see its output.
    fn enrich(&self, _ctx: &Self::Context, object: K) -> K { object }

    fn filter(&self, _ctx: &Self::Context, object: &K, filter: &Filter) -> bool { default_filter(object, filter) }

    /// Runs on filter survivors only.
    fn transform(&self, _ctx: &Self::Context, object: K) -> K { object }
}

/// Object-safe view of a getter, with objects rendered as JSON.
#[async_trait]
pub trait ResourceGetter: Send + Sync {
    fn info(&self) -> ResourceInfo;

    async fn get(&self, namespace: Option<&str>, name: &str) -> ApiResult<serde_json::Value>;

    async fn list(&self, namespace: Option<&str>, q: &Query) -> ApiResult<ListResult<serde_json::Value>>;
}

pub struct Getter<K, A> {
    info: ResourceInfo,
    source: Arc<dyn ObjectSource<K>>,
    adapter: A,
}

impl<K, A> Getter<K, A>
where
    K: HasMetadata + Send + Sync + 'static,
    A: Adapter<K>,
{
    pub fn new(info: ResourceInfo, source: Arc<dyn ObjectSource<K>>, adapter: A) -> Self { Self { info, source, adapter } }

    // Cluster-scoped kinds ignore the namespace argument.
    fn scope<'a>(&self, namespace: Option<&'a str>) -> Option<&'a str> {
        if self.info.namespaced { namespace.filter(|ns| !ns.is_empty()) } else { None }
    }

    pub async fn get_object(&self, namespace: Option<&str>, name: &str) -> ApiResult<K> {
        let ns = self.scope(namespace);
        let object = self.source.fetch_one(ns, name).await?;
        let ctx = self.adapter.context(ns, &Query::new()).await?;
        let object = self.adapter.enrich(&ctx, object);
        Ok(self.adapter.transform(&ctx, object))
    }

    pub async fn list_objects(&self, namespace: Option<&str>, q: &Query) -> ApiResult<ListResult<K>> {
        let ns = self.scope(namespace);
        let objects = self.source.fetch_all(ns, &q.selector()).await?;
        let ctx = self.adapter.context(ns, q).await?;
        let adapter = &self.adapter;
        let objects: Vec<K> = objects.into_iter().map(|o| adapter.enrich(&ctx, o)).collect();
        let compare = |l: &K, r: &K, f: &Field| adapter.compare(l, r, f);
        let filter = |o: &K, f: &Filter| adapter.filter(&ctx, o, f);
        let transform = |o: K| adapter.transform(&ctx, o);
        Ok(default_list(objects, q, &compare, &filter, &[&transform]))
    }
}

#[async_trait]
impl<K, A> ResourceGetter for Getter<K, A>
where
    K: HasMetadata + Serialize + Send + Sync + 'static,
    A: Adapter<K>,
{
    fn info(&self) -> ResourceInfo { self.info }

    async fn get(&self, namespace: Option<&str>, name: &str) -> ApiResult<serde_json::Value> {
        let t0 = Instant::now();
        info!(resource = %self.info.name, ns = %namespace.unwrap_or("(all)"), name = %name, "api: get start");
        let object = self.get_object(namespace, name).await?;
        let value = serde_json::to_value(&object)?;
        info!(took_ms = %t0.elapsed().as_millis(), "api: get ok");
        Ok(value)
    }

    async fn list(&self, namespace: Option<&str>, q: &Query) -> ApiResult<ListResult<serde_json::Value>> {
        let t0 = Instant::now();
        info!(resource = %self.info.name, ns = %namespace.unwrap_or("(all)"), filters = q.filters.len(), "api: list start");
        metrics::counter!("api_list_total", 1u64, "resource" => self.info.name);
        let page = self.list_objects(namespace, q).await?;
        let out = page.try_map(|o| serde_json::to_value(&o))?;
        info!(total = out.pagination.total, returned = out.data.len(), took_ms = %t0.elapsed().as_millis(), "api: list ok");
        Ok(out)
    }
}

/// Context-free adapter for kinds queried purely by metadata.
#[derive(Debug, Clone, Copy, Default)]
pub struct Defaults;

#[async_trait]
impl<K: HasMetadata + Send + Sync + 'static> Adapter<K> for Defaults {
    type Context = ();

    async fn context(&self, _namespace: Option<&str>, _q: &Query) -> ApiResult<()> { Ok(()) }
}
