mod support;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use netlayer::{Client, Error, Poller, Request, TransportError};
use serde::Deserialize;
use support::{Foo, MockTransport, Reply};
use tokio::sync::oneshot;
use tokio::time::Instant;

const BASE: &str = "https://mockurlawfgafwafawf.com";

#[derive(Debug, Deserialize)]
struct Job {
    done: bool,
}

fn poller<T>(mock: &MockTransport) -> Poller<T> {
    Poller::new(Client::with_transport(mock.clone()), Request::get(BASE).build())
}

#[tokio::test(start_paused = true)]
async fn rejected_responses_use_the_whole_budget() {
    let mock = MockTransport::new();
    let poller = poller::<Foo>(&mock).max_retries(4);
    let mut seen = 0;

    let decoded = poller
        .poll(|_| {
            seen += 1;
            false
        })
        .await
        .unwrap();

    assert_eq!(mock.call_count(), 5);
    assert_eq!(seen, 4);
    assert_eq!(decoded.value().foo, "test");
    assert_eq!(poller.attempts(), 0);
    assert!(!poller.is_polling());
}

#[tokio::test(start_paused = true)]
async fn failures_surface_after_the_budget() {
    let mock = MockTransport::new().fallback(Reply::Fail);
    let poller = poller::<Foo>(&mock).max_retries(4);

    let error = poller.poll(|_| true).await.unwrap_err();

    assert_eq!(mock.call_count(), 5);
    assert!(matches!(
        error,
        Error::Response {
            source: TransportError::Network { code: -1009, .. },
            ..
        }
    ));
    assert_eq!(poller.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn accepted_response_stops_early() {
    let mock = MockTransport::new()
        .then(Reply::ok(r#"{"done":false}"#))
        .then(Reply::ok(r#"{"done":false}"#))
        .fallback(Reply::ok(r#"{"done":true}"#));
    let poller = poller::<Job>(&mock);

    let decoded = poller.poll(|d| d.value().done).await.unwrap();

    assert!(decoded.value().done);
    assert_eq!(mock.call_count(), 3);
    assert_eq!(poller.attempts(), 0);
}

#[tokio::test(start_paused = true)]
async fn failures_before_acceptance_are_retried() {
    let mock = MockTransport::new()
        .then(Reply::Fail)
        .then(Reply::ok("not json"))
        .fallback(Reply::ok(r#"{"done":true}"#));
    let poller = poller::<Job>(&mock);

    let decoded = poller.poll(|d| d.value().done).await.unwrap();

    assert!(decoded.value().done);
    assert_eq!(mock.call_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn waits_between_cycles_but_not_before_the_first() {
    let mock = MockTransport::new();
    let poller = poller::<Foo>(&mock)
        .delay(Duration::from_millis(500))
        .max_retries(4);

    let start = Instant::now();
    poller.poll(|_| true).await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);

    let start = Instant::now();
    poller.poll(|_| false).await.unwrap();
    assert!(start.elapsed() >= Duration::from_millis(2000));
    assert!(start.elapsed() < Duration::from_millis(2500));
}

#[tokio::test(start_paused = true)]
async fn zero_retries_means_a_single_attempt() {
    let mock = MockTransport::new();
    let poller = poller::<Foo>(&mock).max_retries(0);

    poller.poll(|_| false).await.unwrap();
    assert_eq!(mock.call_count(), 1);
}

#[tokio::test(start_paused = true)]
async fn reset_restarts_the_budget() {
    let mock = MockTransport::new();
    let poller = Arc::new(poller::<Foo>(&mock).max_retries(2));
    let resetter = poller.clone();
    let cycles = AtomicUsize::new(0);

    poller
        .poll(|_| {
            if cycles.fetch_add(1, Ordering::SeqCst) == 1 {
                resetter.reset();
            }
            false
        })
        .await
        .unwrap();

    // Two cycles, then a fresh budget of three
    assert_eq!(mock.call_count(), 5);
}

#[tokio::test(start_paused = true)]
async fn abandoned_sequence_leaves_a_full_budget() {
    let mock = MockTransport::new().then(Reply::Fail).then(Reply::Hang);
    let poller = poller::<Foo>(&mock).max_retries(4);

    let abandoned = tokio::time::timeout(Duration::from_secs(2), poller.poll(|_| false)).await;
    assert!(abandoned.is_err());
    assert_eq!(mock.call_count(), 2);
    assert_eq!(poller.attempts(), 0);
    assert!(!poller.is_polling());

    let start = Instant::now();
    poller.poll(|_| true).await.unwrap();
    assert_eq!(start.elapsed(), Duration::ZERO);
    assert_eq!(mock.call_count(), 3);

    poller.poll(|_| false).await.unwrap();
    assert_eq!(mock.call_count(), 8);
}

#[tokio::test(start_paused = true)]
async fn callback_flavour_delivers_the_outcome() {
    let mock = MockTransport::new()
        .then(Reply::ok(r#"{"done":false}"#))
        .fallback(Reply::ok(r#"{"done":true}"#));
    let poller = Arc::new(poller::<Job>(&mock));
    let (tx, rx) = oneshot::channel();

    let task = poller.poll_with(
        |d| d.value().done,
        move |result| {
            let _ = tx.send(result);
        },
    );

    let decoded = rx.await.unwrap().unwrap();
    task.await.unwrap();
    assert!(decoded.value().done);
    assert_eq!(mock.call_count(), 2);
}
