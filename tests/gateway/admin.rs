use serde_json::{Value, json};
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

use errata::engine::Task;
use errata::providers::ChatMessage;

use super::session_harness::{engine, provider, spawn_gateway, sse_answer};

#[tokio::test]
async fn provider_health_reflects_completed_sessions() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_raw(sse_answer("难度：3"), "text/event-stream"),
        )
        .mount(&server)
        .await;

    let engine = engine(vec![
        provider("ds", &server.uri(), 1),
        provider("idle", "http://127.0.0.1:9", 2),
    ]);
    let handle = engine
        .start(Task::new(vec![ChatMessage::user("题")]))
        .unwrap();
    handle.outcome.await.unwrap();

    let dir = tempfile::TempDir::new().unwrap();
    let base = spawn_gateway(engine, None, dir.path().join("config.toml")).await;

    let body: Value = reqwest::get(format!("{base}/api/providers/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    let providers = body["providers"].as_array().unwrap();
    assert_eq!(providers.len(), 2);
    assert_eq!(providers[0]["id"], "ds");
    assert_eq!(providers[0]["kind"], "deepseek");
    assert_eq!(providers[0]["health"]["successes"], 1);
    assert_eq!(providers[0]["health"]["consecutive_failures"], 0);
    assert!(providers[1]["health"].is_null());

    let health: Value = reqwest::get(format!("{base}/health"))
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(health["status"], "ok");
    assert_eq!(health["providers"], 2);
}

#[tokio::test]
async fn reload_replaces_provider_list_atomically() {
    let engine = engine(vec![provider("old", "http://127.0.0.1:9", 1)]);
    let dir = tempfile::TempDir::new().unwrap();
    let base = spawn_gateway(engine.clone(), None, dir.path().join("config.toml")).await;
    let client = reqwest::Client::new();

    let response = client
        .post(format!("{base}/api/providers/reload"))
        .json(&json!({ "providers": [
            { "id": "a", "kind": "qwen", "model": "qwen-vl-max",
              "endpoint": "https://dashscope.aliyuncs.com/compatible-mode/v1",
              "capabilities": ["text", "vision"] },
            { "id": "b", "kind": "gemini", "model": "gemini-2.0-flash",
              "endpoint": "https://generativelanguage.googleapis.com/v1beta" },
        ]}))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["providers"], 2);

    let snapshot = engine.registry().snapshot();
    assert_eq!(snapshot[0].id, "a");
    assert_eq!(snapshot[1].id, "b");

    let rejected = client
        .post(format!("{base}/api/providers/reload"))
        .json(&json!({ "providers": [
            { "id": "dup", "kind": "qwen", "model": "m", "endpoint": "http://x" },
            { "id": "dup", "kind": "qwen", "model": "m", "endpoint": "http://y" },
        ]}))
        .send()
        .await
        .unwrap();
    assert_eq!(rejected.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
    assert_eq!(engine.registry().len(), 2);
}

#[tokio::test]
async fn reload_body_with_credentials_is_refused() {
    let engine = engine(vec![provider("kept", "http://127.0.0.1:9", 1)]);
    let dir = tempfile::TempDir::new().unwrap();
    let base = spawn_gateway(engine.clone(), None, dir.path().join("config.toml")).await;
    let client = reqwest::Client::new();

    for credential in [json!({ "api_key_env": "HOME" }), json!({ "api_key": "sk-x" })] {
        let mut entry = json!({
            "id": "mine", "kind": "openai_compat", "model": "m",
            "endpoint": "http://attacker.invalid",
        });
        for (key, value) in credential.as_object().unwrap() {
            entry[key] = value.clone();
        }

        let response = client
            .post(format!("{base}/api/providers/reload"))
            .json(&json!({ "providers": [entry] }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), reqwest::StatusCode::UNPROCESSABLE_ENTITY);
        let body: Value = response.json().await.unwrap();
        assert!(body["error"]["message"].as_str().unwrap().contains("mine"));
    }

    let snapshot = engine.registry().snapshot();
    assert_eq!(snapshot.len(), 1);
    assert_eq!(snapshot[0].id, "kept");
}

#[tokio::test]
async fn empty_reload_rereads_config_file() {
    let dir = tempfile::TempDir::new().unwrap();
    let config_path = dir.path().join("config.toml");
    std::fs::write(
        &config_path,
        r#"
        [[providers]]
        id = "from-disk"
        kind = "deepseek"
        model = "deepseek-chat"
        endpoint = "https://api.deepseek.com"
        "#,
    )
    .unwrap();

    let engine = engine(Vec::new());
    let base = spawn_gateway(engine.clone(), None, config_path).await;

    let response = reqwest::Client::new()
        .post(format!("{base}/api/providers/reload"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    assert_eq!(engine.registry().snapshot()[0].id, "from-disk");
}
