#![allow(dead_code)]

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures_util::StreamExt;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::sync::oneshot;

use errata::config::Config;
use errata::engine::{AnalysisEngine, RelayEvent};
use errata::persistence::{FieldValue, ProblemStore, SqliteProblemStore, StoredProblem};
use errata::providers::{HealthTracker, ProviderConfig, ProviderKind, ProviderRegistry};

pub const FULL_ANSWER: &str = "题目内容：解方程 2x+3=7\n学科：数学\n题型：一元一次方程\n错误类型：移项错误\n错误分析：移项时没有变号\n正确解法：2x=7-3，x=2\n难度：2\n知识点标签：移项、一元一次方程";

/// DeepSeek-style provider without retries and with short timeouts.
pub fn provider(id: &str, endpoint: &str, priority: u32) -> ProviderConfig {
    let mut cfg = ProviderConfig::new(id, ProviderKind::DeepSeek, "deepseek-chat", endpoint);
    cfg.priority = priority;
    cfg.max_retries = 0;
    cfg.connect_timeout_ms = 200;
    cfg.read_timeout_ms = 2_000;
    cfg
}

pub fn test_config() -> Config {
    let mut config = Config::default();
    config.reliability.base_backoff_ms = 10;
    config.reliability.max_backoff_ms = 20;
    config
}

pub fn engine(providers: Vec<ProviderConfig>) -> Arc<AnalysisEngine> {
    Arc::new(build_engine(providers))
}

pub fn engine_with_store(
    providers: Vec<ProviderConfig>,
    store: Arc<dyn ProblemStore>,
) -> Arc<AnalysisEngine> {
    Arc::new(build_engine(providers).with_store(store))
}

fn build_engine(providers: Vec<ProviderConfig>) -> AnalysisEngine {
    AnalysisEngine::new(
        Arc::new(ProviderRegistry::new(providers)),
        Arc::new(HealthTracker::new()),
        &test_config(),
    )
}

/// OpenAI-style SSE body carrying `text` as content deltas, one per line,
/// followed by a stop chunk and `[DONE]`.
pub fn sse_answer(text: &str) -> String {
    let mut body = String::new();
    for line in text.split_inclusive('\n') {
        let chunk = serde_json::json!({ "choices": [{ "delta": { "content": line } }] });
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: {\"choices\":[{\"delta\":{},\"finish_reason\":\"stop\"}]}\n\n");
    body.push_str("data: [DONE]\n\n");
    body
}

pub async fn collect_events(events: impl futures_util::Stream<Item = RelayEvent>) -> Vec<RelayEvent> {
    events.collect().await
}

/// SQLite store that counts how often the engine touches it.
pub struct CountingStore {
    inner: SqliteProblemStore,
    pub reads: AtomicUsize,
    pub writes: AtomicUsize,
}

impl CountingStore {
    pub async fn new() -> Arc<Self> {
        Arc::new(Self {
            inner: SqliteProblemStore::in_memory()
                .await
                .expect("in-memory store should open"),
            reads: AtomicUsize::new(0),
            writes: AtomicUsize::new(0),
        })
    }

    pub async fn insert_problem(&self, source_text: &str) -> i64 {
        self.inner
            .insert_problem(source_text)
            .await
            .expect("problem row should insert")
    }

    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn writes(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

impl ProblemStore for CountingStore {
    fn name(&self) -> &str {
        "counting"
    }

    fn get_by_id(
        &self,
        id: i64,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<Option<StoredProblem>>> + Send + '_>> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_by_id(id)
    }

    fn update_fields(
        &self,
        id: i64,
        fields: Vec<(&'static str, FieldValue)>,
    ) -> Pin<Box<dyn Future<Output = anyhow::Result<()>> + Send + '_>> {
        self.writes.fetch_add(1, Ordering::SeqCst);
        self.inner.update_fields(id, fields)
    }
}

/// Upstream that sends SSE headers and one content chunk, then holds the
/// connection open. The receiver fires once the client hangs up.
pub struct HangingUpstream {
    pub endpoint: String,
    pub closed: oneshot::Receiver<()>,
}

impl HangingUpstream {
    pub async fn start(first_chunk: &str) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("hanging upstream should bind");
        let addr = listener.local_addr().expect("local addr");
        let (closed_tx, closed) = oneshot::channel();
        let first_chunk = format!("data: {first_chunk}\n\n");

        tokio::spawn(async move {
            let Ok((mut socket, _)) = listener.accept().await else {
                return;
            };
            let mut request = vec![0u8; 16 * 1024];
            let _ = socket.read(&mut request).await;

            let head = "HTTP/1.1 200 OK\r\n\
                        Content-Type: text/event-stream\r\n\
                        Cache-Control: no-cache\r\n\
                        Connection: close\r\n\r\n";
            if socket.write_all(head.as_bytes()).await.is_err()
                || socket.write_all(first_chunk.as_bytes()).await.is_err()
            {
                return;
            }
            let _ = socket.flush().await;

            let mut buf = [0u8; 1024];
            loop {
                match socket.read(&mut buf).await {
                    Ok(0) | Err(_) => break,
                    Ok(_) => {}
                }
            }
            let _ = closed_tx.send(());
        });

        Self {
            endpoint: format!("http://{addr}"),
            closed,
        }
    }
}

/// Upstream that promises a long body, sends one SSE chunk and then closes
/// the connection. Returns its endpoint.
pub async fn truncating_upstream(first_chunk: &str) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("truncating upstream should bind");
    let addr = listener.local_addr().expect("local addr");
    let first_chunk = format!("data: {first_chunk}\n\n");

    tokio::spawn(async move {
        let Ok((mut socket, _)) = listener.accept().await else {
            return;
        };
        let mut request = vec![0u8; 16 * 1024];
        let _ = socket.read(&mut request).await;

        let head = "HTTP/1.1 200 OK\r\n\
                    Content-Type: text/event-stream\r\n\
                    Content-Length: 100000\r\n\r\n";
        let _ = socket.write_all(head.as_bytes()).await;
        let _ = socket.write_all(first_chunk.as_bytes()).await;
        let _ = socket.flush().await;
        tokio::time::sleep(std::time::Duration::from_millis(50)).await;
        let _ = socket.shutdown().await;
    });

    format!("http://{addr}")
}

/// Serve the gateway router on an ephemeral port; returns its base URL.
pub async fn spawn_gateway(
    engine: Arc<AnalysisEngine>,
    store: Option<Arc<dyn ProblemStore>>,
    config_path: std::path::PathBuf,
) -> String {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("gateway listener should bind");
    let addr = listener.local_addr().expect("local addr");
    let state = errata::gateway::AppState {
        engine,
        store,
        config_path,
    };
    let app = errata::gateway::build_app(state, &[], 1 << 20);
    tokio::spawn(async move { axum::serve(listener, app).await });
    format!("http://{addr}")
}

/// Split an SSE body into its `data:` payloads.
pub fn sse_payloads(body: &str) -> Vec<String> {
    body.split("\n\n")
        .filter_map(|frame| frame.strip_prefix("data: "))
        .map(str::to_string)
        .collect()
}
