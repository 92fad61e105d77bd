//! Workload controllers: status derivation and update-time ordering.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use k8s_openapi::api::apps::v1::{DaemonSet, Deployment, StatefulSet};
use k8s_openapi::api::batch::v1::Job;
use kquery_core::{fields, Field, Filter, Query};
use kquery_search::{default_compare, default_filter};

use super::{STATUS_RUNNING, STATUS_STOPPED, STATUS_UPDATING};
use crate::error::ApiResult;
use crate::getter::Adapter;

pub const JOB_COMPLETED: &str = "completed";
pub const JOB_FAILED: &str = "failed";
pub const JOB_RUNNING: &str = "running";

fn replica_status(ready: i32, desired: i32) -> &'static str {
    if ready == 0 && desired == 0 {
        STATUS_STOPPED
    } else if ready == desired {
        STATUS_RUNNING
    } else {
        STATUS_UPDATING
    }
}

fn is_update_time(field: &Field) -> bool {
    matches!(field.as_str(), fields::UPDATE_TIME | fields::LAST_UPDATE_TIMESTAMP)
}

// ----------------- deployments -----------------

pub fn deployment_status(d: &Deployment) -> &'static str {
    let status = d.status.as_ref();
    let ready = status.and_then(|s| s.ready_replicas).unwrap_or(0);
    let replicas = status.and_then(|s| s.replicas).unwrap_or(0);
    replica_status(ready, replicas)
}

/// Latest condition update, never earlier than creation.
pub fn deployment_last_update(d: &Deployment) -> Option<DateTime<Utc>> {
    let created = d.metadata.creation_timestamp.as_ref().map(|t| t.0);
    let conditions = d.status.as_ref().and_then(|s| s.conditions.as_ref());
    conditions.into_iter().flatten().filter_map(|c| c.last_update_time.as_ref().map(|t| t.0)).fold(created, |acc, t| acc.max(Some(t)))
}

pub fn compare_deployments(left: &Deployment, right: &Deployment, field: &Field) -> bool {
    if is_update_time(field) {
        return deployment_last_update(left) > deployment_last_update(right);
    }
    default_compare(left, right, field)
}

pub fn filter_deployments(d: &Deployment, filter: &Filter) -> bool {
    match filter.field.as_str() {
        fields::STATUS => deployment_status(d) == filter.value.as_str(),
        _ => default_filter(d, filter),
    }
}

// ----------------- statefulsets -----------------

/// Missing `spec.replicas` reads as stopped.
pub fn statefulset_status(s: &StatefulSet) -> &'static str {
    let Some(desired) = s.spec.as_ref().and_then(|spec| spec.replicas) else { return STATUS_STOPPED };
    let ready = s.status.as_ref().and_then(|st| st.ready_replicas).unwrap_or(0);
    replica_status(ready, desired)
}

pub fn filter_statefulsets(s: &StatefulSet, filter: &Filter) -> bool {
    match filter.field.as_str() {
        fields::STATUS => statefulset_status(s) == filter.value.as_str(),
        _ => default_filter(s, filter),
    }
}

// ----------------- daemonsets -----------------

pub fn daemonset_status(d: &DaemonSet) -> &'static str {
    let (desired, ready) = d.status.as_ref().map(|s| (s.desired_number_scheduled, s.number_ready)).unwrap_or((0, 0));
    replica_status(ready, desired)
}

pub fn filter_daemonsets(d: &DaemonSet, filter: &Filter) -> bool {
    match filter.field.as_str() {
        fields::STATUS => daemonset_status(d) == filter.value.as_str(),
        _ => default_filter(d, filter),
    }
}

// ----------------- jobs -----------------

/// First `Complete`/`Failed` condition that is `True` decides; otherwise running.
pub fn job_status(j: &Job) -> &'static str {
    let conditions = j.status.as_ref().and_then(|s| s.conditions.as_ref());
    for c in conditions.into_iter().flatten() {
        if c.status != "True" {
            continue;
        }
        match c.type_.as_str() {
            "Complete" => return JOB_COMPLETED,
            "Failed" => return JOB_FAILED,
            _ => {}
        }
    }
    JOB_RUNNING
}

/// Latest condition transition, never earlier than creation.
pub fn job_last_update(j: &Job) -> Option<DateTime<Utc>> {
    let created = j.metadata.creation_timestamp.as_ref().map(|t| t.0);
    let conditions = j.status.as_ref().and_then(|s| s.conditions.as_ref());
    conditions.into_iter().flatten().filter_map(|c| c.last_transition_time.as_ref().map(|t| t.0)).fold(created, |acc, t| acc.max(Some(t)))
}

pub fn compare_jobs(left: &Job, right: &Job, field: &Field) -> bool {
    if is_update_time(field) {
        return job_last_update(left) > job_last_update(right);
    }
    if field.as_str() == fields::STATUS {
        return job_status(left) > job_status(right);
    }
    default_compare(left, right, field)
}

pub fn filter_jobs(j: &Job, filter: &Filter) -> bool {
    match filter.field.as_str() {
        fields::STATUS => job_status(j) == filter.value.as_str(),
        _ => default_filter(j, filter),
    }
}

// ----------------- adapters -----------------

#[derive(Debug, Clone, Copy, Default)]
pub struct Deployments;

#[derive(Debug, Clone, Copy, Default)]
pub struct StatefulSets;

#[derive(Debug, Clone, Copy, Default)]
pub struct DaemonSets;

#[derive(Debug, Clone, Copy, Default)]
pub struct Jobs;

#[async_trait]
impl Adapter<Deployment> for Deployments {
    type Context = ();
    async fn context(&self, _: Option<&str>, _: &Query) -> ApiResult<()> { Ok(()) }
    fn compare(&self, l: &Deployment, r: &Deployment, f: &Field) -> bool { compare_deployments(l, r, f) }
    fn filter(&self, _: &(), o: &Deployment, f: &Filter) -> bool { filter_deployments(o, f) }
}

#[async_trait]
impl Adapter<StatefulSet> for StatefulSets {
    type Context = ();
    async fn context(&self, _: Option<&str>, _: &Query) -> ApiResult<()> { Ok(()) }
    fn filter(&self, _: &(), o: &StatefulSet, f: &Filter) -> bool { filter_statefulsets(o, f) }
}

#[async_trait]
impl Adapter<DaemonSet> for DaemonSets {
    type Context = ();
    async fn context(&self, _: Option<&str>, _: &Query) -> ApiResult<()> { Ok(()) }
    fn filter(&self, _: &(), o: &DaemonSet, f: &Filter) -> bool { filter_daemonsets(o, f) }
}

#[async_trait]
impl Adapter<Job> for Jobs {
    type Context = ();
    async fn context(&self, _: Option<&str>, _: &Query) -> ApiResult<()> { Ok(()) }
    fn compare(&self, l: &Job, r: &Job, f: &Field) -> bool { compare_jobs(l, r, f) }
    fn filter(&self, _: &(), o: &Job, f: &Filter) -> bool { filter_jobs(o, f) }
}
