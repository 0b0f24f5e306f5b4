use anyhow::{Context, Result, bail};
use base64::Engine as _;
use futures_util::StreamExt;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::cli::commands::{Cli, Commands};
use errata::config::Config;
use errata::engine::{AnalysisEngine, RelayEvent, Task};
use errata::gateway;
use errata::persistence::{FieldValue, ProblemStore, SqliteProblemStore};
use errata::providers::selector::build_chain;
use errata::providers::{Capability, ChatMessage, HealthTracker, ProviderRegistry};

pub async fn dispatch(cli: Cli, mut config: Config) -> Result<()> {
    match cli.command {
        Commands::Serve { port, host } => {
            if let Some(port) = port {
                config.gateway.port = port;
            }
            if let Some(host) = host {
                config.gateway.host = host;
            }
            gateway::run_gateway(config).await
        }
        Commands::Providers { capability } => {
            print_chain(&config, capability);
            Ok(())
        }
        Commands::Analyze {
            problem_id,
            prompt,
            image,
            subject,
            review,
        } => {
            run_analyze(
                config,
                AnalyzeArgs {
                    problem_id,
                    prompt,
                    image,
                    subject,
                    review,
                },
            )
            .await
        }
    }
}

fn print_chain(config: &Config, capability: Capability) {
    let chain = build_chain(&config.providers, capability);
    if chain.is_empty() {
        println!("No active provider supports {capability}.");
        return;
    }
    println!("Failover chain for {capability}:");
    for (position, provider) in chain.iter().enumerate() {
        println!(
            "  {}. {} ({}, {}) priority={} cost={}",
            position + 1,
            provider.id,
            provider.kind,
            provider.model,
            provider.priority,
            provider.cost_per_1k_tokens
        );
    }
}

struct AnalyzeArgs {
    problem_id: Option<i64>,
    prompt: Option<String>,
    image: Option<PathBuf>,
    subject: Option<String>,
    review: bool,
}

async fn run_analyze(config: Config, args: AnalyzeArgs) -> Result<()> {
    let registry = Arc::new(ProviderRegistry::from_config(&config));
    let health = Arc::new(HealthTracker::new());
    let mut engine = AnalysisEngine::new(registry, health, &config);

    let mut stored_text = None;
    if let Some(problem_id) = args.problem_id {
        let store = SqliteProblemStore::open(&config.database_path()).await?;
        stored_text = store
            .get_by_id(problem_id)
            .await?
            .and_then(|problem| match problem.fields.get("source_text") {
                Some(FieldValue::Text(text)) => Some(text.clone()),
                _ => None,
            });
        engine = engine.with_store(Arc::new(store));
    }

    let Some(prompt) = args.prompt.or(stored_text) else {
        bail!("nothing to analyze: pass --prompt or a --problem-id with stored text");
    };
    let message = match &args.image {
        Some(path) => {
            let (media_type, data) = read_image(path)?;
            ChatMessage::user_with_image(prompt, media_type, data)
        }
        None => ChatMessage::user(prompt),
    };

    let mut task = Task::new(vec![message]).with_review_mode(args.review);
    if let Some(problem_id) = args.problem_id {
        task = task.with_problem(problem_id);
    }
    if let Some(subject) = args.subject {
        task = task.with_subject(subject);
    }

    let engine = Arc::new(engine);
    let handle = engine.start(task)?;
    let mut events = handle.events;
    let mut stdout = std::io::stdout();
    while let Some(event) = events.next().await {
        match event {
            RelayEvent::Chunk(chunk) => {
                if let Some(text) = chunk["choices"][0]["delta"]["content"].as_str() {
                    write!(stdout, "{text}")?;
                    stdout.flush()?;
                }
            }
            RelayEvent::SaveResult(outcome) => {
                writeln!(stdout, "\n[save] {} ({})", outcome.success, outcome.message)?;
            }
            RelayEvent::Error { kind, message } => {
                writeln!(stdout, "\n[error] {kind}: {message}")?;
            }
            RelayEvent::Done => break,
        }
    }

    let outcome = handle.outcome.await.context("analysis task panicked")?;
    writeln!(stdout)?;
    writeln!(stdout, "{}", serde_json::to_string_pretty(&outcome)?)?;
    Ok(())
}

fn read_image(path: &Path) -> Result<(&'static str, String)> {
    let media_type = match path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase)
        .as_deref()
    {
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("gif") => "image/gif",
        _ => bail!("unsupported image type: {}", path.display()),
    };
    let bytes =
        std::fs::read(path).with_context(|| format!("read image {}", path.display()))?;
    Ok((media_type, base64::engine::general_purpose::STANDARD.encode(bytes)))
}
