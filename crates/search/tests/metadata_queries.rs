use std::collections::BTreeMap;

use chrono::{TimeZone, Utc};
use k8s_openapi::api::core::v1::ConfigMap;
use k8s_openapi::apimachinery::pkg::apis::meta::v1::{ObjectMeta, Time};
use kquery_search::{default_compare, default_filter, default_list, parse_query, ListResult, Query};

fn cm(name: &str, ts: i64, labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> ConfigMap {
    let map = |pairs: &[(&str, &str)]| -> Option<BTreeMap<String, String>> {
        if pairs.is_empty() {
            None
        } else {
            Some(pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect())
        }
    };
    ConfigMap {
        metadata: ObjectMeta {
            name: Some(name.to_string()),
            namespace: Some("default".to_string()),
            uid: Some(format!("uid-{name}")),
            creation_timestamp: Some(Time(Utc.timestamp_opt(ts, 0).unwrap())),
            labels: map(labels),
            annotations: map(annotations),
            ..Default::default()
        },
        ..Default::default()
    }
}

fn fixture() -> Vec<ConfigMap> {
    vec![
        cm("web-config", 300, &[("app", "web")], &[("team", "platform"), ("tier", "frontend")]),
        cm("api-config", 100, &[("app", "api")], &[("team", "platform-core")]),
        cm("db-config", 200, &[("app", "db")], &[("team", "storage")]),
        cm("web-extra", 200, &[("app", "web")], &[]),
    ]
}

fn run(q: &Query) -> ListResult<ConfigMap> {
    default_list(fixture(), q, &default_compare::<ConfigMap>, &default_filter::<ConfigMap>, &[])
}

fn names(res: &ListResult<ConfigMap>) -> Vec<&str> {
    res.data.iter().map(|c| c.metadata.name.as_deref().unwrap_or("")).collect()
}

fn query(s: &str) -> Query { s.parse().unwrap() }

#[test]
fn default_sort_is_newest_first_with_name_tie_break() {
    let res = run(&query(""));
    // db-config and web-extra share a timestamp; the larger name ranks first
    assert_eq!(names(&res), vec!["web-config", "web-extra", "db-config", "api-config"]);
}

#[test]
fn ascending_by_name() {
    let res = run(&query("sortBy=name&ascending=true"));
    assert_eq!(names(&res), vec!["api-config", "db-config", "web-config", "web-extra"]);
}

#[test]
fn label_filter_and_pagination() {
    let res = run(&query("label=app=web&limit=1&page=2"));
    assert_eq!(names(&res), vec!["web-extra"]);
    assert_eq!(res.pagination.total, 2);
    assert_eq!(res.pagination.offset, 1);
}

#[test]
fn dsl_over_annotations() {
    let res = run(&query("dogo=team=platform,tier||missing"));
    assert_eq!(names(&res), vec!["web-config"]);
    let res = run(&query("dogo=team=platform||team=stor"));
    assert_eq!(names(&res), vec!["web-config", "db-config", "api-config"]);
}

#[test]
fn names_and_substring_name() {
    assert_eq!(names(&run(&query("names=db-config,api-config"))), vec!["db-config", "api-config"]);
    assert_eq!(names(&run(&query("name=web"))), vec!["web-config", "web-extra"]);
}

#[test]
fn unknown_filter_field_yields_empty_page() {
    let res = run(&query("fieldSelector=metadata.name=web-config"));
    assert!(res.data.is_empty());
    assert_eq!(res.pagination.total, 0);
}

#[test]
fn parse_query_accepts_repeated_pairs() {
    let q = parse_query(vec![("limit", "2"), ("limit", "9"), ("namespace", "default")]);
    let res = run(&q);
    assert_eq!(res.data.len(), 2);
    assert_eq!(res.pagination.limit, 2);
    assert_eq!(res.pagination.total, 4);
}

#[test]
fn envelope_serializes_objects() {
    let res = run(&query("names=api-config"));
    let v = serde_json::to_value(&res).unwrap();
    assert_eq!(v["data"][0]["metadata"]["name"], "api-config");
    assert_eq!(v["pagination"]["total"], 1);
    assert_eq!(v["pagination"]["limit"], -1);
}
