use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;

use errata::engine::{RelayEvent, Task};
use errata::error::ErrorKind;
use errata::persistence::ProblemStore;
use errata::providers::ChatMessage;
use errata::stream::SessionStatus;

use super::session_harness::{
    CountingStore, HangingUpstream, collect_events, engine_with_store, provider,
    truncating_upstream,
};

#[tokio::test]
async fn client_disconnect_cancels_upstream_and_skips_persistence() {
    let upstream =
        HangingUpstream::start("{\"choices\":[{\"delta\":{\"content\":\"错误类型：\"}}]}").await;
    let store = CountingStore::new().await;
    let problem_id = store.insert_problem("1+1=?").await;
    let engine = engine_with_store(
        vec![provider("ds", &upstream.endpoint, 1)],
        Arc::clone(&store) as Arc<dyn ProblemStore>,
    );

    let handle = engine
        .start(Task::new(vec![ChatMessage::user("1+1=?")]).with_problem(problem_id))
        .unwrap();
    let mut events = handle.events;

    let first = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .expect("first chunk should arrive")
        .expect("stream should be open");
    assert!(matches!(first, RelayEvent::Chunk(_)));

    // The caller goes away mid-stream.
    drop(events);

    let outcome = tokio::time::timeout(Duration::from_secs(5), handle.outcome)
        .await
        .expect("session should stop promptly")
        .unwrap();
    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(outcome.failure, Some(ErrorKind::ClientCancelled));
    assert_eq!(outcome.provider_used.as_deref(), Some("ds"));
    assert!(outcome.extraction.is_none());
    assert!(outcome.save.is_none());

    tokio::time::timeout(Duration::from_secs(5), upstream.closed)
        .await
        .expect("upstream connection should be dropped")
        .unwrap();

    assert_eq!(store.reads(), 0);
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn disconnect_before_connect_fails_session_without_traffic() {
    let upstream = HangingUpstream::start("{}").await;
    let store = CountingStore::new().await;
    let engine = engine_with_store(
        vec![provider("ds", &upstream.endpoint, 1)],
        Arc::clone(&store) as Arc<dyn ProblemStore>,
    );

    let handle = engine
        .start(Task::new(vec![ChatMessage::user("题")]).with_problem(1))
        .unwrap();
    drop(handle.events);

    let outcome = handle.outcome.await.unwrap();
    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(outcome.failure, Some(ErrorKind::ClientCancelled));
    assert_eq!(store.writes(), 0);
}

#[tokio::test]
async fn upstream_dropping_mid_stream_fails_with_connection_error() {
    let endpoint =
        truncating_upstream("{\"choices\":[{\"delta\":{\"content\":\"错误类型：\"}}]}").await;
    let store = CountingStore::new().await;
    let problem_id = store.insert_problem("1+1=?").await;
    let engine = engine_with_store(
        vec![provider("ds", &endpoint, 1)],
        Arc::clone(&store) as Arc<dyn ProblemStore>,
    );

    let handle = engine
        .start(Task::new(vec![ChatMessage::user("1+1=?")]).with_problem(problem_id))
        .unwrap();
    let events = tokio::time::timeout(Duration::from_secs(5), collect_events(handle.events))
        .await
        .expect("relay should end after the upstream closes");
    let outcome = handle.outcome.await.unwrap();

    assert_eq!(events.len(), 3, "{events:?}");
    assert!(matches!(events[0], RelayEvent::Chunk(_)));
    assert!(matches!(
        events[1],
        RelayEvent::Error {
            kind: ErrorKind::ConnectionError,
            ..
        }
    ));
    assert!(matches!(events[2], RelayEvent::Done));

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(outcome.failure, Some(ErrorKind::ConnectionError));
    assert_eq!(outcome.provider_used.as_deref(), Some("ds"));
    assert!(outcome.extraction.is_none());
    assert!(outcome.save.is_none());
    assert_eq!(store.writes(), 0);

    let health = engine.health().snapshot("ds").unwrap();
    assert_eq!(health.failures, 1);
    assert!(health.last_error.is_some());
}
