//! Fan-out tests for the multi-session scheduler.

mod common;

use std::sync::{Arc, Mutex};

use common::MockTransport;
use httpkit::{Method, MultiSession, Request};

#[test]
fn completions_dispatch_to_the_right_callbacks() {
    let transport = MockTransport::new();
    transport.push_reply(200, &[], b"1");
    transport.push_reply(200, &[], b"2");
    transport.push_failure(7, "connection refused");

    let mut multi = MultiSession::with_transport(transport.clone()).unwrap();

    let bodies = Arc::new(Mutex::new(Vec::new()));
    let failures = Arc::new(Mutex::new(Vec::new()));

    for path in ["one", "two", "three"] {
        let bodies = bodies.clone();
        let failures = failures.clone();
        multi
            .add_request(
                Request::new().url(format!("http://x/{path}")),
                move |response| bodies.lock().unwrap().push(response.into_body()),
                move |err| failures.lock().unwrap().push(err.code()),
            )
            .unwrap();
    }

    assert_eq!(multi.pending(), 3);
    multi.perform().unwrap();
    assert_eq!(multi.pending(), 0);

    let mut bodies = bodies.lock().unwrap().clone();
    bodies.sort();
    assert_eq!(bodies, vec![b"1".to_vec(), b"2".to_vec()]);
    assert_eq!(*failures.lock().unwrap(), vec![7]);
}

#[test]
fn a_failing_transfer_does_not_abort_its_siblings() {
    let transport = MockTransport::new();
    transport.push_failure(28, "timed out");
    transport.push_reply(200, &[], b"ok");

    let mut multi = MultiSession::with_transport(transport.clone()).unwrap();
    let successes = Arc::new(Mutex::new(0u32));
    let errors = Arc::new(Mutex::new(0u32));

    for _ in 0..2 {
        let successes = successes.clone();
        let errors = errors.clone();
        multi
            .add_request(
                Request::new().url("http://x/mixed"),
                move |_| *successes.lock().unwrap() += 1,
                move |_| *errors.lock().unwrap() += 1,
            )
            .unwrap();
    }

    multi.perform().unwrap();
    assert_eq!(*successes.lock().unwrap(), 1);
    assert_eq!(*errors.lock().unwrap(), 1);
}

#[test]
fn requests_are_resolved_like_session_transfers() {
    let transport = MockTransport::new();
    transport.push_reply(200, &[], b"");

    let mut multi = MultiSession::with_transport(transport.clone()).unwrap();
    multi
        .add_request(
            Request::new()
                .method(Method::Post)
                .url("http://x/submit")
                .header("X-Batch", "42")
                .body(b"payload".to_vec()),
            |_| {},
            |_| {},
        )
        .unwrap();
    multi.perform().unwrap();

    let performed = transport.performed();
    assert_eq!(performed.len(), 1);
    assert_eq!(performed[0].method, Method::Post);
    assert_eq!(performed[0].header("X-Batch"), Some("42"));
    assert_eq!(performed[0].body, b"payload");
}

#[test]
fn an_unresolvable_request_is_rejected_at_add_time() {
    let transport = MockTransport::new();
    let mut multi = MultiSession::with_transport(transport.clone()).unwrap();

    // No URL: resolution fails before anything is queued.
    let err = multi.add_request(Request::new(), |_| {}, |_| {}).unwrap_err();
    assert_eq!(err.code(), 3);

    multi.perform().unwrap();
    assert_eq!(transport.perform_count(), 0);
}

#[test]
fn responses_carry_status_headers_and_body() {
    let transport = MockTransport::new();
    transport.push_reply(418, &[("X-Kind", "teapot")], b"short and stout");

    let mut multi = MultiSession::with_transport(transport).unwrap();
    let captured = Arc::new(Mutex::new(None));
    {
        let captured = captured.clone();
        multi
            .add_request(
                Request::new().url("http://x/teapot"),
                move |response| *captured.lock().unwrap() = Some(response),
                |_| {},
            )
            .unwrap();
    }
    multi.perform().unwrap();

    let response = captured.lock().unwrap().take().unwrap();
    assert_eq!(response.status(), 418);
    assert_eq!(response.header("X-Kind"), Some("teapot"));
    assert_eq!(response.body(), b"short and stout");
}
