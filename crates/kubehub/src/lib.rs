//! kquery kubehub: cluster client bootstrap and paged list/get against the API server.

#![forbid(unsafe_code)]

use std::fmt::Debug;
use std::time::Instant;

use anyhow::{Context, Result};
use futures::{Stream, TryStreamExt};
use kquery_core::LabelSelector;
use k8s_openapi::{ClusterResourceScope, NamespaceResourceScope};
use kube::{api::ListParams, Api, Client, Resource};
use serde::de::DeserializeOwned;
use tracing::{debug, info};

/// Default number of objects requested per list call.
pub const DEFAULT_PAGE_SIZE: u32 = 500;

/// Object lookup that found nothing. Travels inside `anyhow::Error`; callers downcast.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{kind} {name:?} not found")]
pub struct NotFound {
    pub kind: String,
    pub name: String,
}

/// Client from kubeconfig or the in-cluster service account.
pub async fn client() -> Result<Client> {
    Client::try_default().await.context("building kube client")
}

/// `KQUERY_FETCH_PAGE_SIZE`, falling back to [`DEFAULT_PAGE_SIZE`]. Zero is ignored.
pub fn page_size_from_env() -> u32 {
    std::env::var("KQUERY_FETCH_PAGE_SIZE")
        .ok()
        .and_then(|s| s.parse().ok())
        .filter(|n: &u32| *n > 0)
        .unwrap_or(DEFAULT_PAGE_SIZE)
}

type MakeApi<K> = fn(Client, Option<&str>) -> Api<K>;

/// Typed access to one resource kind.
pub struct KubeSource<K> {
    client: Client,
    make_api: MakeApi<K>,
    page_size: u32,
}

impl<K> Clone for KubeSource<K> {
    fn clone(&self) -> Self {
        Self { client: self.client.clone(), make_api: self.make_api, page_size: self.page_size }
    }
}

impl<K> KubeSource<K>
where
    K: Resource<DynamicType = (), Scope = NamespaceResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Namespaced kind; no namespace (or an empty one) lists across all namespaces.
    pub fn namespaced(client: Client) -> Self {
        Self::from_parts(client, |client, ns| match ns {
            Some(ns) if !ns.is_empty() => Api::namespaced(client, ns),
            _ => Api::all(client),
        })
    }
}

impl<K> KubeSource<K>
where
    K: Resource<DynamicType = (), Scope = ClusterResourceScope> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    /// Cluster-scoped kind; namespace arguments are ignored.
    pub fn cluster(client: Client) -> Self {
        Self::from_parts(client, |client, _| Api::all(client))
    }
}

impl<K> KubeSource<K>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug + Send + Sync + 'static,
{
    fn from_parts(client: Client, make_api: MakeApi<K>) -> Self {
        Self { client, make_api, page_size: page_size_from_env() }
    }

    fn api(&self, namespace: Option<&str>) -> Api<K> { (self.make_api)(self.client.clone(), namespace) }

    pub async fn fetch_one(&self, namespace: Option<&str>, name: &str) -> Result<K> {
        let kind = K::kind(&()).to_string();
        let started = Instant::now();
        let found = self
            .api(namespace)
            .get_opt(name)
            .await
            .with_context(|| format!("getting {kind} {name:?}"))?;
        metrics::histogram!("kube_get_ms", started.elapsed().as_secs_f64() * 1000.0);
        found.ok_or_else(|| NotFound { kind, name: name.to_string() }.into())
    }

    /// Every object of the kind, following `continue` tokens until the server is done.
    pub async fn fetch_all(&self, namespace: Option<&str>, selector: &LabelSelector) -> Result<Vec<K>> {
        let started = Instant::now();
        let items: Vec<K> = self.pages(namespace, selector).try_concat().await?;
        let took_ms = started.elapsed().as_secs_f64() * 1000.0;
        info!(kind = %K::kind(&()), ns = ?namespace, selector = %selector, count = items.len(), took_ms, "fetched objects");
        metrics::histogram!("kube_list_ms", took_ms);
        Ok(items)
    }

    /// One item per server page.
    pub fn pages(&self, namespace: Option<&str>, selector: &LabelSelector) -> impl Stream<Item = Result<Vec<K>>> + Send + 'static {
        let api = self.api(namespace);
        let params = list_params(selector, self.page_size);
        futures::stream::try_unfold(Some(params), move |state| next_page(api.clone(), state))
    }
}

async fn next_page<K>(api: Api<K>, state: Option<ListParams>) -> Result<Option<(Vec<K>, Option<ListParams>)>>
where
    K: Resource<DynamicType = ()> + Clone + DeserializeOwned + Debug,
{
    let Some(params) = state else { return Ok(None) };
    let list = api.list(&params).await.with_context(|| format!("listing {}", K::plural(&())))?;
    metrics::counter!("kube_list_pages_total", 1u64);
    debug!(kind = %K::kind(&()), items = list.items.len(), more = list.metadata.continue_.is_some(), "list page");
    let next = next_params(&params, list.metadata.continue_);
    Ok(Some((list.items, next)))
}

fn list_params(selector: &LabelSelector, page_size: u32) -> ListParams {
    ListParams { label_selector: selector.to_param(), limit: Some(page_size), ..Default::default() }
}

// An empty or missing token ends the listing.
fn next_params(current: &ListParams, token: Option<String>) -> Option<ListParams> {
    let token = token.filter(|t| !t.is_empty())?;
    let mut next = current.clone();
    next.continue_token = Some(token);
    Some(next)
}
