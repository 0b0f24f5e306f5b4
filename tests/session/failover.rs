use std::time::Duration;

use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use errata::engine::{RelayEvent, Task};
use errata::error::{AnalysisError, ErrorKind};
use errata::providers::{Capability, ChatMessage};
use errata::stream::SessionStatus;

use super::session_harness::{collect_events, engine, provider, sse_answer};

#[tokio::test]
async fn timed_out_primary_fails_over_to_secondary() {
    let slow = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_answer("错误类型：慢"), "text/event-stream")
                .set_delay(Duration::from_secs(5)),
        )
        .mount(&slow)
        .await;

    let fast = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/chat/completions"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_raw(sse_answer("错误类型：计算错误"), "text/event-stream"),
        )
        .mount(&fast)
        .await;

    let mut p1 = provider("p1", &slow.uri(), 1);
    p1.read_timeout_ms = 300;
    let p2 = provider("p2", &fast.uri(), 2);
    let engine = engine(vec![p2, p1]);

    let handle = engine
        .start(Task::new(vec![ChatMessage::user("题")]))
        .unwrap();
    let events = collect_events(handle.events).await;
    let outcome = handle.outcome.await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.provider_used.as_deref(), Some("p2"));
    assert_eq!(events.last(), Some(&RelayEvent::Done));

    let p1_health = engine.health().snapshot("p1").unwrap();
    assert_eq!(p1_health.failures, 1);
    assert!(p1_health.last_error.is_some());
    assert_eq!(engine.health().snapshot("p2").unwrap().successes, 1);
}

#[tokio::test]
async fn missing_capability_is_rejected_without_network_calls() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let engine = engine(vec![provider("text-only", &server.uri(), 1)]);
    let task = Task::new(vec![ChatMessage::user_with_image("看图", "image/png", "AAAA")]);
    assert_eq!(task.required_capability, Capability::Vision);

    let err = engine.start(task).err().expect("vision task must be rejected");
    assert!(matches!(
        err,
        AnalysisError::ProviderUnavailable {
            capability: Capability::Vision
        }
    ));
    assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn empty_registry_is_provider_unavailable() {
    let engine = engine(Vec::new());
    let err = engine
        .start(Task::new(vec![ChatMessage::user("题")]))
        .err()
        .expect("no providers configured");
    assert_eq!(err.kind(), ErrorKind::ProviderUnavailable);
}

#[tokio::test]
async fn inactive_provider_is_never_contacted() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let mut off = provider("off", &server.uri(), 1);
    off.active = false;
    let engine = engine(vec![off]);

    assert!(
        engine
            .start(Task::new(vec![ChatMessage::user("题")]))
            .is_err()
    );
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn auth_failure_skips_to_next_provider_and_reports_exhaustion_last() {
    let denied = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(403).set_body_string("forbidden"))
        .expect(1)
        .mount(&denied)
        .await;

    let broken = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502).set_body_string("bad gateway"))
        .mount(&broken)
        .await;

    let mut retried = provider("broken", &broken.uri(), 2);
    retried.max_retries = 1;
    let mut denied_provider = provider("denied", &denied.uri(), 1);
    denied_provider.max_retries = 3;
    let engine = engine(vec![denied_provider, retried]);

    let handle = engine
        .start(Task::new(vec![ChatMessage::user("题")]))
        .unwrap();
    let events = collect_events(handle.events).await;
    let outcome = handle.outcome.await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Failed);
    assert_eq!(outcome.failure, Some(ErrorKind::ProviderUnavailable));
    assert!(outcome.provider_used.is_none());

    assert_eq!(events.len(), 2);
    let RelayEvent::Error { kind, message } = &events[0] else {
        panic!("expected error event, got {:?}", events[0]);
    };
    assert_eq!(*kind, ErrorKind::ProviderUnavailable);
    assert!(message.contains("denied attempt 1/4"));
    assert!(message.contains("broken attempt 2/2"));
    assert_eq!(events[1], RelayEvent::Done);

    assert_eq!(broken.received_requests().await.unwrap().len(), 2);
}
