//! Nodes: health status and capacity annotations from the pods scheduled on them.

use std::sync::Arc;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kquery_core::{fields, Filter, LabelSelector, Query};
use kquery_search::default_filter;
use rustc_hash::FxHashMap;

use super::pods::{is_terminated, pod_node};
use crate::error::ApiResult;
use crate::getter::Adapter;
use crate::quantity::Milli;
use crate::source::ObjectSource;

pub const NODE_CPU_REQUESTS: &str = "node.example.com/cpu-requests";
pub const NODE_MEMORY_REQUESTS: &str = "node.example.com/memory-requests";
pub const NODE_CPU_LIMITS: &str = "node.example.com/cpu-limits";
pub const NODE_MEMORY_LIMITS: &str = "node.example.com/memory-limits";
pub const NODE_CPU_REQUESTS_FRACTION: &str = "node.example.com/cpu-requests-fraction";
pub const NODE_CPU_LIMITS_FRACTION: &str = "node.example.com/cpu-limits-fraction";
pub const NODE_MEMORY_REQUESTS_FRACTION: &str = "node.example.com/memory-requests-fraction";
pub const NODE_MEMORY_LIMITS_FRACTION: &str = "node.example.com/memory-limits-fraction";

pub const STATUS_UNSCHEDULABLE: &str = "unschedulable";
pub const STATUS_WARNING: &str = "warning";

// condition type -> healthy status
const EXPECTED_CONDITIONS: [(&str, &str); 7] = [
    ("MemoryPressure", "False"),
    ("DiskPressure", "False"),
    ("PIDPressure", "False"),
    ("NetworkUnavailable", "False"),
    ("ConfigOK", "True"),
    ("KubeletReady", "True"),
    ("Ready", "True"),
];

pub fn node_status(n: &Node) -> &'static str {
    if n.spec.as_ref().and_then(|s| s.unschedulable).unwrap_or(false) {
        return STATUS_UNSCHEDULABLE;
    }
    let conditions = n.status.as_ref().and_then(|s| s.conditions.as_ref());
    let unhealthy = conditions.into_iter().flatten().any(|c| {
        EXPECTED_CONDITIONS.iter().any(|(ty, expected)| c.type_ == *ty && c.status != *expected)
    });
    if unhealthy { STATUS_WARNING } else { super::STATUS_RUNNING }
}

pub fn filter_nodes(n: &Node, filter: &Filter) -> bool {
    match filter.field.as_str() {
        fields::STATUS => node_status(n) == filter.value.as_str(),
        _ => default_filter(n, filter),
    }
}

/// Summed container requests and limits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Usage {
    pub cpu_requests: Milli,
    pub cpu_limits: Milli,
    pub memory_requests: Milli,
    pub memory_limits: Milli,
}

impl std::ops::AddAssign for Usage {
    fn add_assign(&mut self, o: Usage) {
        self.cpu_requests = self.cpu_requests + o.cpu_requests;
        self.cpu_limits = self.cpu_limits + o.cpu_limits;
        self.memory_requests = self.memory_requests + o.memory_requests;
        self.memory_limits = self.memory_limits + o.memory_limits;
    }
}

/// Effective pod requests/limits: the larger of the summed app containers and any single
/// init container, plus pod overhead.
pub fn pod_usage(p: &Pod) -> Usage {
    let Some(spec) = p.spec.as_ref() else { return Usage::default() };
    let container_usage = |c: &k8s_openapi::api::core::v1::Container| {
        let res = c.resources.as_ref();
        let req = res.and_then(|r| r.requests.as_ref());
        let lim = res.and_then(|r| r.limits.as_ref());
        Usage {
            cpu_requests: Milli::from_quantity(req.and_then(|m| m.get("cpu"))),
            memory_requests: Milli::from_quantity(req.and_then(|m| m.get("memory"))),
            cpu_limits: Milli::from_quantity(lim.and_then(|m| m.get("cpu"))),
            memory_limits: Milli::from_quantity(lim.and_then(|m| m.get("memory"))),
        }
    };
    let mut total = Usage::default();
    for c in &spec.containers {
        total += container_usage(c);
    }
    for c in spec.init_containers.iter().flatten() {
        let init = container_usage(c);
        total.cpu_requests = total.cpu_requests.max(init.cpu_requests);
        total.cpu_limits = total.cpu_limits.max(init.cpu_limits);
        total.memory_requests = total.memory_requests.max(init.memory_requests);
        total.memory_limits = total.memory_limits.max(init.memory_limits);
    }
    if let Some(overhead) = spec.overhead.as_ref() {
        let cpu = Milli::from_quantity(overhead.get("cpu"));
        let mem = Milli::from_quantity(overhead.get("memory"));
        total += Usage { cpu_requests: cpu, cpu_limits: cpu, memory_requests: mem, memory_limits: mem };
    }
    total
}

/// Per-node usage of the non-terminated pods.
#[derive(Debug, Default)]
pub struct NodeUsage {
    by_node: FxHashMap<String, Usage>,
}

impl NodeUsage {
    pub fn from_pods(pods: &[Pod]) -> Self {
        let mut by_node: FxHashMap<String, Usage> = FxHashMap::default();
        for p in pods.iter().filter(|p| !is_terminated(p)) {
            let node = pod_node(p);
            if node.is_empty() {
                continue;
            }
            *by_node.entry(node.to_string()).or_default() += pod_usage(p);
        }
        Self { by_node }
    }

    pub fn usage(&self, node: &str) -> Usage { self.by_node.get(node).copied().unwrap_or_default() }

    /// Write absolute amounts and percentages of allocatable into the node's annotations.
    pub fn annotate(&self, mut n: Node) -> Node {
        let name = n.metadata.name.clone().unwrap_or_default();
        let u = self.usage(&name);
        let alloc = n.status.as_ref().and_then(|s| s.allocatable.as_ref());
        let alloc_cpu = Milli::from_quantity(alloc.and_then(|a| a.get("cpu")));
        let alloc_mem = Milli::from_quantity(alloc.and_then(|a| a.get("memory")));
        let pct = |v: Milli, of: Milli| format!("{}%", v.percent_of(of));

        let annotations = n.metadata.annotations.get_or_insert_with(Default::default);
        let mut set = |k: &str, v: String| {
            annotations.insert(k.to_string(), v);
        };
        set(NODE_CPU_REQUESTS, u.cpu_requests.cpu().to_string());
        set(NODE_CPU_LIMITS, u.cpu_limits.cpu().to_string());
        set(NODE_MEMORY_REQUESTS, u.memory_requests.bytes().to_string());
        set(NODE_MEMORY_LIMITS, u.memory_limits.bytes().to_string());
        set(NODE_CPU_REQUESTS_FRACTION, pct(u.cpu_requests, alloc_cpu));
        set(NODE_CPU_LIMITS_FRACTION, pct(u.cpu_limits, alloc_cpu));
        set(NODE_MEMORY_REQUESTS_FRACTION, pct(u.memory_requests, alloc_mem));
        set(NODE_MEMORY_LIMITS_FRACTION, pct(u.memory_limits, alloc_mem));
        n
    }
}

pub struct Nodes {
    pods: Arc<dyn ObjectSource<Pod>>,
}

impl Nodes {
    pub fn new(pods: Arc<dyn ObjectSource<Pod>>) -> Self { Self { pods } }
}

#[async_trait]
impl Adapter<Node> for Nodes {
    type Context = NodeUsage;

    async fn context(&self, _namespace: Option<&str>, _q: &Query) -> ApiResult<NodeUsage> {
        let pods = self.pods.fetch_all(None, &LabelSelector::everything()).await?;
        Ok(NodeUsage::from_pods(&pods))
    }

    fn filter(&self, _: &NodeUsage, n: &Node, f: &Filter) -> bool { filter_nodes(n, f) }

    fn transform(&self, usage: &NodeUsage, n: Node) -> Node { usage.annotate(n) }
}
