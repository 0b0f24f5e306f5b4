use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use errata::engine::{RelayEvent, Task};
use errata::providers::{ChatMessage, ProviderKind};
use errata::stream::SessionStatus;

use super::session_harness::{collect_events, engine, provider};

async fn serve(body: Vec<u8>) -> MockServer {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
        .mount(&server)
        .await;
    server
}

fn chunks(events: &[RelayEvent]) -> Vec<&serde_json::Value> {
    events
        .iter()
        .filter_map(|event| match event {
            RelayEvent::Chunk(chunk) => Some(chunk),
            _ => None,
        })
        .collect()
}

#[tokio::test]
async fn malformed_lines_degrade_to_placeholders_and_stream_completes() {
    let mut body = Vec::new();
    body.extend_from_slice(b": keep-alive\n\n");
    body.extend_from_slice(b"data: {\"choices\":[{\"delta\":{\"content\":\"\\u9519\\u8bef\\u7c7b\\u578b\"}}]}\n\n");
    // LaTeX escape that is not valid JSON.
    body.extend_from_slice(b"data: {\"choices\":[{\"delta\":{\"content\":\"\\uff1a\\(x\\)\"}}]}\n\n");
    // Missing the data: prefix.
    body.extend_from_slice(b"{\"choices\":[{\"delta\":{\"content\":\"\\n\"}}]}\n\n");
    // Truncated object.
    body.extend_from_slice(b"data: {\"choices\":[{\"delta\":{\"content\":\"lost\n\n");
    // Latin-1 byte in an otherwise valid line.
    body.extend_from_slice(b"data: {\"choices\":[{\"delta\":{\"content\":\"caf\xe9\"}}]}\n\n");
    body.extend_from_slice(b"data: [DONE]\n\n");

    let server = serve(body).await;
    let engine = engine(vec![provider("ds", &server.uri(), 1)]);
    let handle = engine
        .start(Task::new(vec![ChatMessage::user("题")]))
        .unwrap();
    let events = collect_events(handle.events).await;
    let outcome = handle.outcome.await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    assert_eq!(outcome.answer, "错误类型：\\(x\\)\ncafé");
    assert_eq!(outcome.extraction.unwrap().error_type, "\\(x\\)");

    let relayed = chunks(&events);
    let placeholders: Vec<_> = relayed
        .iter()
        .filter(|chunk| chunk.get("decode_error").is_some())
        .collect();
    assert_eq!(placeholders.len(), 1);
    assert_eq!(placeholders[0]["decode_error"]["kind"], "DECODE_ERROR");
    assert_eq!(placeholders[0]["choices"][0]["delta"]["content"], "");
    assert_eq!(events.last(), Some(&RelayEvent::Done));
}

#[tokio::test]
async fn gemini_chunks_are_relayed_in_openai_shape() {
    let body = concat!(
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"想\",\"thought\":true}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"错误类型：审题错误\"}]}}]}\n\n",
        "data: {\"candidates\":[{\"content\":{\"parts\":[{\"text\":\"\"}]},\"finishReason\":\"STOP\"}]}\n\n",
    );
    let server = serve(body.as_bytes().to_vec()).await;

    let mut gemini = provider("gemini", &server.uri(), 1);
    gemini.kind = ProviderKind::Gemini;
    gemini.model = "gemini-2.0-flash".into();
    let engine = engine(vec![gemini]);

    let handle = engine
        .start(Task::new(vec![ChatMessage::user("题")]))
        .unwrap();
    let events = collect_events(handle.events).await;
    let outcome = handle.outcome.await.unwrap();

    assert_eq!(outcome.reasoning, "想");
    assert_eq!(outcome.answer, "错误类型：审题错误");

    let relayed = chunks(&events);
    assert_eq!(relayed.len(), 3);
    assert_eq!(relayed[1]["choices"][0]["delta"]["content"], "错误类型：审题错误");
    assert_eq!(relayed[2]["choices"][0]["finish_reason"], "stop");
    assert_eq!(relayed[2]["result_object"]["error_type"], "审题错误");

    let requests = server.received_requests().await.unwrap();
    assert!(
        requests[0]
            .url
            .path()
            .ends_with("/models/gemini-2.0-flash:streamGenerateContent")
    );
}

#[tokio::test]
async fn chunks_after_completion_are_relayed_but_not_accumulated() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"难度：2\"},\"finish_reason\":\"stop\"}]}\n\n",
        "data: {\"choices\":[{\"delta\":{\"content\":\"trailing\"}}]}\n\n",
        "data: [DONE]\n\n",
    );
    let server = serve(body.as_bytes().to_vec()).await;
    let engine = engine(vec![provider("ds", &server.uri(), 1)]);

    let handle = engine
        .start(Task::new(vec![ChatMessage::user("题")]))
        .unwrap();
    let events = collect_events(handle.events).await;
    let outcome = handle.outcome.await.unwrap();

    assert_eq!(outcome.answer, "难度：2");
    let relayed = chunks(&events);
    assert_eq!(relayed.len(), 2);
    assert!(relayed[0].get("result_object").is_some());
    assert_eq!(relayed[1]["choices"][0]["delta"]["content"], "trailing");
}

#[tokio::test]
async fn null_delta_stop_chunk_completes_the_answer() {
    let body = concat!(
        "data: {\"choices\":[{\"delta\":{\"content\":\"错误类型：计算错误\"}}]}\n\n",
        "data: {\"choices\":[{\"delta\":null,\"finish_reason\":\"stop\"}]}\n\n",
        "data: [DONE]\n\n",
    );
    let server = serve(body.as_bytes().to_vec()).await;
    let engine = engine(vec![provider("ds", &server.uri(), 1)]);

    let handle = engine
        .start(Task::new(vec![ChatMessage::user("题")]))
        .unwrap();
    let events = collect_events(handle.events).await;
    let outcome = handle.outcome.await.unwrap();

    assert_eq!(outcome.status, SessionStatus::Completed);
    let relayed = chunks(&events);
    // No synthetic closing chunk: the upstream stop chunk carries the result.
    assert_eq!(relayed.len(), 2);
    assert!(relayed[1]["choices"][0]["delta"].is_null());
    assert_eq!(relayed[1]["result_object"]["error_type"], "计算错误");
}
