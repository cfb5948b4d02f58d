// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

use ResourceEvent as E;
use ResourceState as S;

#[parameterized(
    held = { S::Initial, E::Held, S::Queued },
    sent_from_initial = { S::Initial, E::Sent, S::Pending },
    sent_from_queued = { S::Queued, E::Sent, S::Pending },
    loaded = { S::Pending, E::Loaded, S::Ready },
    reloaded = { S::Ready, E::Loaded, S::Ready },
    failed_pending = { S::Pending, E::Failed, S::Canceled },
    failed_ready = { S::Ready, E::Failed, S::Canceled },
    lost_pending = { S::Pending, E::ConnectionLost, S::Canceled },
    lost_ready = { S::Ready, E::ConnectionLost, S::Obsolete },
    lost_restoring = { S::Restoring, E::ConnectionLost, S::Obsolete },
    refetch_obsolete = { S::Obsolete, E::Refetch, S::Restoring },
    refetch_canceled = { S::Canceled, E::Refetch, S::Initial },
    restoring_sent = { S::Restoring, E::Sent, S::Restoring },
    restored = { S::Restoring, E::Loaded, S::Ready },
    refetch_ready_ignored = { S::Ready, E::Refetch, S::Ready },
    loaded_canceled_ignored = { S::Canceled, E::Loaded, S::Canceled },
    lost_queued_ignored = { S::Queued, E::ConnectionLost, S::Queued },
)]
fn resource_transitions(from: ResourceState, event: ResourceEvent, to: ResourceState) {
    assert_eq!(from.transition(event), to);
}

fn spec(name: &str, params: serde_json::Value) -> ResourceSpec {
    let params = match Value::from(params) {
        Value::Array(items) => items,
        other => vec![other],
    };
    ResourceSpec {
        connection_id: "c1".into(),
        name: name.into(),
        params,
        properties: Value::Null,
        priority: 0,
    }
}

#[test]
fn find_dedupes_by_deep_equal_identity() {
    let mut table = ResourceTable::new(ResourceKind::Subscription);
    table.create("s1".into(), spec("feed", json!([{ "a": 1, "b": 2 }])));

    assert_eq!(table.find(&spec("feed", json!([{ "b": 2, "a": 1 }]))), Some("s1"));
    assert_eq!(table.find(&spec("feed", json!([{ "a": 2 }]))), None);
    assert_eq!(table.find(&spec("other", json!([{ "a": 1, "b": 2 }]))), None);

    let mut elsewhere = spec("feed", json!([{ "a": 1, "b": 2 }]));
    elsewhere.connection_id = "c2".into();
    assert_eq!(table.find(&elsewhere), None);
}

#[test]
fn properties_are_part_of_identity() {
    let mut table = ResourceTable::new(ResourceKind::Query);
    let mut with_props = spec("list", json!([]));
    with_props.properties = Value::from(json!({ "limit": 10 }));
    table.create("q1".into(), with_props.clone());

    assert_eq!(table.find(&with_props), Some("q1"));
    assert_eq!(table.find(&spec("list", json!([]))), None);
}

#[test]
fn retain_and_release_count_users() {
    let mut table = ResourceTable::new(ResourceKind::Subscription);
    table.create("s1".into(), spec("feed", json!([])));
    assert_eq!(table.get("s1").unwrap().users, 1);

    assert_eq!(table.retain("s1"), None);
    assert_eq!(table.get("s1").unwrap().users, 2);
    assert_eq!(table.release("s1"), Some(1));
    assert_eq!(table.release("s1"), Some(0));
    assert_eq!(table.release("s1"), Some(0));
    assert_eq!(table.release("missing"), None);
}

#[test]
fn connection_lost_splits_by_progress() {
    let mut table = ResourceTable::new(ResourceKind::Subscription);
    table.create("s1".into(), spec("a", json!([])));
    table.create("s2".into(), spec("b", json!([])));
    table.create("s3".into(), spec("c", json!([])));
    table.apply("s1", E::Sent);
    table.apply("s2", E::Sent);
    table.apply("s2", E::Loaded);
    table.apply("s3", E::Held);

    let lost = table.connection_lost("c1");
    assert_eq!(lost, vec!["s1".to_string(), "s2".to_string()]);
    assert_eq!(table.get("s1").unwrap().state, S::Canceled);
    assert_eq!(table.get("s2").unwrap().state, S::Obsolete);
    assert_eq!(table.get("s3").unwrap().state, S::Queued);

    assert_eq!(table.restorable("c1"), vec!["s2".to_string()]);
    table.release("s2");
    assert!(table.restorable("c1").is_empty());
}

#[test]
fn by_fetch_method_finds_query() {
    let mut table = ResourceTable::new(ResourceKind::Query);
    table.create("q1".into(), spec("list", json!([]))).fetch_method = Some("7".into());
    assert_eq!(table.by_fetch_method("7"), Some("q1"));
    assert_eq!(table.by_fetch_method("8"), None);
}
