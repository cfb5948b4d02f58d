// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

use MethodEvent as E;
use MethodState as S;

#[parameterized(
    sent = { S::Queued, E::Sent, S::Pending },
    updated_first = { S::Pending, E::Updated, S::Updated },
    returned_first = { S::Pending, E::Returned, S::Returned },
    updated_then_returned = { S::Updated, E::Returned, S::Completed },
    returned_then_updated = { S::Returned, E::Updated, S::Completed },
    duplicate_updated = { S::Updated, E::Updated, S::Updated },
    duplicate_returned = { S::Returned, E::Returned, S::Returned },
    completed_is_terminal = { S::Completed, E::Updated, S::Completed },
    queued_ignores_result = { S::Queued, E::Returned, S::Queued },
)]
fn method_transitions(from: MethodState, event: MethodEvent, to: MethodState) {
    assert_eq!(from.transition(event), to);
}

fn record(id: &str, connection: &str) -> MethodRecord {
    let (sender, _handle) = MethodHandle::channel(id);
    MethodRecord::new(id, "inc", vec![Value::from(1)], connection, 100, Reply::Caller(sender))
}

#[test]
fn table_filters_by_connection() {
    let mut table = MethodTable::new();
    table.insert(record("1", "c1"));
    table.insert(record("2", "c2"));
    table.insert(record("3", "c1"));

    assert_eq!(table.on_connection("c1"), vec!["1".to_string(), "3".to_string()]);
    table.get_mut("3").unwrap().awaiting_retry = true;
    assert_eq!(table.awaiting_retry("c1"), vec!["3".to_string()]);
}

#[test]
fn apply_walks_both_orders() {
    let mut table = MethodTable::new();
    table.insert(record("1", "c1"));
    table.insert(record("2", "c1"));
    for id in ["1", "2"] {
        table.apply(id, E::Sent);
    }

    table.apply("1", E::Updated);
    assert_eq!(table.apply("1", E::Returned), Some(S::Completed));
    table.apply("2", E::Returned);
    assert_eq!(table.apply("2", E::Updated), Some(S::Completed));
    assert_eq!(table.apply("missing", E::Sent), None);
}

#[test]
fn internal_replies() {
    assert!(Reply::Resource("q1".into()).is_internal());
    assert!(Reply::Login { resume: true, caller: None }.is_internal());
    assert!(!Reply::Login { resume: false, caller: None }.is_internal());
}

#[test]
fn try_result_reports_settlement() {
    let (sender, mut handle) = MethodHandle::channel("7");
    assert_eq!(handle.id(), "7");
    assert!(handle.try_result().is_none());
    sender.send(Ok(Value::from(5))).unwrap();
    assert_eq!(handle.try_result().unwrap().unwrap(), Value::from(5));
}

#[test]
fn dropped_sender_reads_as_canceled() {
    let (sender, mut handle) = MethodHandle::channel("7");
    drop(sender);
    assert!(handle.try_result().unwrap().unwrap_err().is_canceled());
}

#[tokio::test]
async fn handle_resolves_as_future() {
    let (sender, handle) = MethodHandle::channel("1");
    sender.send(Err(MethodError::new("500", "boom"))).unwrap();
    let error = handle.await.unwrap_err();
    assert_eq!(error.error, "500");

    let settled = MethodHandle::settled("2", Ok(Value::from("done")));
    assert_eq!(settled.await.unwrap(), Value::from("done"));
}
