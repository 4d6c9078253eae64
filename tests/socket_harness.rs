use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::{poll, FutureExt, StreamExt};
use scrapbox_socket::retry::RetryPolicy;
use scrapbox_socket::socket::error::{FailureKind, ResultEnvelope};
use scrapbox_socket::socket::proto::{
    Change, Commit, CommitData, CommitResponseData, SocketIoRequest, SocketIoRequestData,
    SocketIoResponse, COMMIT_EVENT, SOCKET_IO_REQUEST_EVENT,
};
use scrapbox_socket::transport::memory::MemoryTransport;
use scrapbox_socket::transport::DISCONNECT_EVENT;
use scrapbox_socket::{DomainErrorKind, RequestError, Socket};
use serde_json::{json, Value};
use tracing_subscriber::EnvFilter;

const TEST_PROJECT_ID: &str = "5ee4b8f7bd41ca001e0d4e07";
const TEST_PAGE_ID: &str = "5f2d0a8cdd8b7a001c4c6b4a";
const TEST_PARENT_ID: &str = "5f2d0a8cdd8b7a001c4c6b49";
const TEST_USER_ID: &str = "5ee4b8e1bd41ca001e0d4e05";

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn sample_commit() -> CommitData {
    CommitData::page(
        TEST_PROJECT_ID,
        TEST_PAGE_ID,
        TEST_PARENT_ID,
        TEST_USER_ID,
        vec![Change::insert("_end", "line-1", "hello")],
    )
}

fn answering(ack: Value) -> MemoryTransport {
    MemoryTransport::new().with_responder(move |_, _| Some(ack.clone()))
}

fn envelope<T: serde::Serialize>(result: &Result<T, RequestError>) -> Value {
    serde_json::to_value(ResultEnvelope(result)).expect("serialize envelope")
}

#[tokio::test]
async fn immediate_ack_resolves_on_first_poll() {
    init_tracing();
    let socket = Socket::new(answering(json!({ "data": { "commitId": "c1" } })));

    let result = socket
        .commit(sample_commit())
        .now_or_never()
        .expect("resolved without yielding");
    assert_eq!(
        result,
        Ok(CommitResponseData {
            commit_id: "c1".to_string()
        })
    );
}

#[tokio::test]
async fn commit_round_trip_reports_commit_id() {
    init_tracing();
    let transport = MemoryTransport::new().with_responder(|event, payload| {
        assert_eq!(event, SOCKET_IO_REQUEST_EVENT);
        assert_eq!(payload["method"], "commit");
        assert_eq!(payload["data"]["kind"], "page");
        assert_eq!(payload["data"]["changes"][0]["_insert"], "_end");
        Some(json!({ "data": { "commitId": "abc123" } }))
    });
    let socket = Socket::new(transport.clone());

    let result = socket.commit(sample_commit()).await;
    assert_eq!(
        envelope(&result),
        json!({ "ok": true, "value": { "commitId": "abc123" } })
    );
    assert_eq!(transport.emitted().len(), 1);
    assert_eq!(transport.total_listener_count(), 0);
}

#[tokio::test]
async fn domain_errors_pass_through_unchanged() {
    init_tracing();
    for kind in DomainErrorKind::ALL {
        let error = json!({ "name": kind.as_str(), "message": "rejected" });
        let socket = Socket::new(answering(json!({ "error": error.clone() })));

        let result = socket.commit(sample_commit()).await;
        assert_eq!(
            result.as_ref().map_err(RequestError::kind),
            Err(FailureKind::Domain(kind))
        );
        assert_eq!(envelope(&result), json!({ "ok": false, "value": error }));
    }
}

#[tokio::test]
async fn unknown_errors_are_wrapped_as_unexpected() {
    init_tracing();
    let error = json!({ "name": "RangeError", "message": "boom" });
    let socket = Socket::new(answering(json!({ "error": error.clone() })));

    let result = socket.commit(sample_commit()).await;
    assert_eq!(
        result,
        Err(RequestError::Unexpected {
            value: error.clone()
        })
    );
    assert_eq!(
        envelope(&result),
        json!({ "ok": false, "value": { "kind": "UnexpectedError", "value": error } })
    );
}

#[tokio::test]
async fn ack_without_data_or_error_resolves_as_protocol_violation() {
    init_tracing();
    let socket = Socket::new(answering(json!({})));

    let result = socket.request_raw(SOCKET_IO_REQUEST_EVENT, json!({})).await;
    assert_eq!(
        result,
        Err(RequestError::ProtocolViolation {
            response: json!({})
        })
    );
    assert_eq!(
        envelope(&result),
        json!({ "ok": false, "value": { "kind": "UnexpectedError", "value": {} } })
    );
}

#[tokio::test]
async fn protocol_violation_reports_the_raw_ack() {
    init_tracing();
    let ack = json!({ "error": null, "status": 1 });
    let socket = Socket::new(answering(ack.clone()));

    let result = socket.commit(sample_commit()).await;
    assert_eq!(
        result,
        Err(RequestError::ProtocolViolation {
            response: ack.clone()
        })
    );
    assert_eq!(
        envelope(&result),
        json!({ "ok": false, "value": { "kind": "UnexpectedError", "value": ack } })
    );
}

#[tokio::test(start_paused = true)]
async fn timeout_reports_exact_shape_and_releases_listener() {
    init_tracing();
    let transport = MemoryTransport::new();
    let socket = Socket::new(transport.clone()).with_request_timeout(Duration::from_millis(100));

    let result = socket.commit(sample_commit()).await;
    assert_eq!(
        envelope(&result),
        json!({
            "ok": false,
            "value": { "kind": "TimeoutError", "message": "Timeout: exceeded 100ms" }
        })
    );
    assert_eq!(transport.listener_count(DISCONNECT_EVENT), 0);

    // The ack arrives after the deadline and is ignored.
    transport
        .next_pending()
        .expect("ack still pending")
        .reply(json!({ "data": { "commitId": "late" } }));
}

#[tokio::test]
async fn disconnect_during_request_resolves_as_disconnected() {
    init_tracing();
    let transport = MemoryTransport::new();
    let socket = Socket::new(transport.clone());

    let request = socket.request_raw(SOCKET_IO_REQUEST_EVENT, json!({ "method": "commit" }));
    tokio::pin!(request);
    assert!(poll!(request.as_mut()).is_pending());
    assert_eq!(transport.listener_count(DISCONNECT_EVENT), 1);

    assert_eq!(transport.disconnect("transport close"), 1);
    let result = request.await;
    assert_eq!(
        result,
        Err(RequestError::Disconnected {
            reason: json!("transport close")
        })
    );
    assert!(result.as_ref().is_err_and(RequestError::is_transient));
    assert_eq!(
        envelope(&result),
        json!({ "ok": false, "value": { "kind": "DisconnectError", "message": "transport close" } })
    );
    assert_eq!(transport.listener_count(DISCONNECT_EVENT), 0);
}

#[tokio::test]
async fn disconnect_after_ack_changes_nothing() {
    init_tracing();
    let transport = answering(json!({ "data": { "commitId": "c2" } }));
    let socket = Socket::new(transport.clone());

    let result = socket.commit(sample_commit()).await;
    assert_eq!(transport.disconnect("io server disconnect"), 0);
    assert_eq!(
        result,
        Ok(CommitResponseData {
            commit_id: "c2".to_string()
        })
    );
}

#[tokio::test]
async fn concurrent_requests_settle_independently() {
    init_tracing();
    let transport = MemoryTransport::new();
    let socket = Socket::new(transport.clone());

    let first = socket.request_raw(SOCKET_IO_REQUEST_EVENT, json!({ "n": 1 }));
    let second = socket.request_raw(SOCKET_IO_REQUEST_EVENT, json!({ "n": 2 }));
    tokio::pin!(first);
    tokio::pin!(second);
    assert!(poll!(first.as_mut()).is_pending());
    assert!(poll!(second.as_mut()).is_pending());
    assert_eq!(transport.listener_count(DISCONNECT_EVENT), 2);

    let mut pending = transport.take_pending();
    assert_eq!(pending.len(), 2);
    let ack_second = pending.pop().expect("second ack");
    let ack_first = pending.pop().expect("first ack");
    assert_eq!(ack_second.payload["n"], 2);

    ack_second.reply(json!({ "error": { "name": "NotFastForwardError" } }));
    ack_first.reply(json!({ "data": "first" }));

    assert_eq!(first.await, Ok(json!("first")));
    assert_eq!(
        second.await.map_err(|error| error.kind()),
        Err(FailureKind::Domain(DomainErrorKind::NotFastForward))
    );
    assert_eq!(transport.listener_count(DISCONNECT_EVENT), 0);
}

#[tokio::test(start_paused = true)]
async fn retry_resends_after_timeout() {
    init_tracing();
    let attempts = Arc::new(AtomicUsize::new(0));
    let seen = Arc::clone(&attempts);
    let transport = MemoryTransport::new().with_responder(move |_, _| {
        if seen.fetch_add(1, Ordering::SeqCst) == 0 {
            None
        } else {
            Some(json!({ "data": { "commitId": "retried" } }))
        }
    });
    let socket = Socket::new(transport).with_request_timeout(Duration::from_millis(50));
    let policy = RetryPolicy {
        max_attempts: 2,
        initial_backoff: Duration::from_millis(10),
        max_backoff: Duration::from_millis(10),
    };

    let response = socket
        .request_with_retry::<SocketIoRequest>(
            &SocketIoRequestData::Commit(sample_commit()),
            &policy,
        )
        .await
        .expect("second attempt succeeds");
    assert_eq!(
        response,
        SocketIoResponse::Commit(CommitResponseData {
            commit_id: "retried".to_string()
        })
    );
    assert_eq!(attempts.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn domain_errors_are_not_retried() {
    init_tracing();
    let transport = answering(json!({ "error": { "name": "DuplicateTitleError" } }));
    let socket = Socket::new(transport.clone());

    let result = socket
        .request_with_retry::<SocketIoRequest>(
            &SocketIoRequestData::Commit(sample_commit()),
            &RetryPolicy::after_reconnect(),
        )
        .await;
    assert!(matches!(result, Err(RequestError::Domain(_))));
    assert_eq!(transport.emitted().len(), 1);
}

#[tokio::test]
async fn stream_delivers_values_pushed_while_pull_was_pending() {
    init_tracing();
    let transport = MemoryTransport::new();
    let socket = Socket::new(transport.clone());
    let mut commits = socket.response_raw([COMMIT_EVENT]);

    assert_eq!(transport.listener_count(COMMIT_EVENT), 0);
    assert!(poll!(commits.next()).is_pending());
    assert_eq!(transport.listener_count(COMMIT_EVENT), 1);

    transport.dispatch(COMMIT_EVENT, json!("A"));
    transport.dispatch(COMMIT_EVENT, json!("B"));

    assert_eq!(commits.next().await, Some(json!("A")));
    assert_eq!(commits.next().await, Some(json!("B")));
}

#[tokio::test]
async fn stream_keeps_only_latest_value_between_pulls() {
    init_tracing();
    let transport = MemoryTransport::new();
    let socket = Socket::new(transport.clone());
    let mut commits = socket.response_raw([COMMIT_EVENT]);
    assert!(poll!(commits.next()).is_pending());

    transport.dispatch(COMMIT_EVENT, json!(1));
    assert_eq!(commits.next().await, Some(json!(1)));

    transport.dispatch(COMMIT_EVENT, json!(2));
    transport.dispatch(COMMIT_EVENT, json!(3));
    assert_eq!(commits.next().await, Some(json!(3)));
    assert!(poll!(commits.next()).is_pending());
}

#[tokio::test]
async fn stream_fans_in_every_event_name() {
    init_tracing();
    let transport = MemoryTransport::new();
    let socket = Socket::new(transport.clone());
    let mut updates = socket.response_raw(["projectUpdatesStream:commit", "projectUpdatesStream:event"]);
    assert!(poll!(updates.next()).is_pending());

    transport.dispatch("projectUpdatesStream:event", json!({ "type": "member.join" }));
    assert_eq!(
        updates.next().await,
        Some(json!({ "type": "member.join" }))
    );
    transport.dispatch("projectUpdatesStream:commit", json!({ "id": "c" }));
    assert_eq!(updates.next().await, Some(json!({ "id": "c" })));
}

#[tokio::test]
async fn dropping_stream_removes_listeners_and_a_new_stream_restarts() {
    init_tracing();
    let transport = MemoryTransport::new();
    let socket = Socket::new(transport.clone());

    let mut first = socket.response_raw([COMMIT_EVENT, "cursor"]);
    assert!(poll!(first.next()).is_pending());
    assert_eq!(transport.total_listener_count(), 2);
    drop(first);
    assert_eq!(transport.total_listener_count(), 0);
    assert_eq!(transport.dispatch(COMMIT_EVENT, json!("missed")), 0);

    let mut second = socket.response_raw([COMMIT_EVENT]);
    assert!(poll!(second.next()).is_pending());
    transport.dispatch(COMMIT_EVENT, json!("fresh"));
    assert_eq!(second.next().await, Some(json!("fresh")));
}

#[tokio::test]
async fn typed_stream_skips_payloads_that_do_not_decode() {
    init_tracing();
    let transport = MemoryTransport::new();
    let socket = Socket::new(transport.clone());
    let mut commits = socket.response::<Commit>();
    assert!(poll!(commits.next()).is_pending());

    transport.dispatch(COMMIT_EVENT, json!({ "unexpected": true }));
    assert!(poll!(commits.next()).is_pending());

    transport.dispatch(
        COMMIT_EVENT,
        json!({
            "id": "commit-1",
            "kind": "page",
            "parentId": TEST_PARENT_ID,
            "projectId": TEST_PROJECT_ID,
            "pageId": TEST_PAGE_ID,
            "userId": TEST_USER_ID,
            "changes": [{ "_update": "line-1", "lines": { "text": "edited" } }],
            "cursor": null,
            "freeze": true
        }),
    );
    let notification = commits.next().await.expect("commit notification");
    assert_eq!(notification.id, "commit-1");
    assert_eq!(notification.commit.changes, vec![Change::update("line-1", "edited")]);
}
