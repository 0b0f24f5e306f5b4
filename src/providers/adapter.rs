//! Per-kind request building and chunk interpretation.
//!
//! The stream pipeline is provider-agnostic: it only ever sees a parsed
//! JSON payload and asks the adapter for the kind to pull out a
//! [`ChunkDelta`] and an OpenAI-shaped value to relay to the caller.

use reqwest::{Client, RequestBuilder};
use serde_json::{Value, json};

use super::gemini_types::{
    Content, GeminiInlineData, GenerateContentRequest, GenerateContentResponse, GenerationConfig,
    Part,
};
use super::openai_types::{
    ChatCompletionChunk, ChatRequest, ContentPart as OpenAiPart, ImageUrlContent, Message,
    MessageContent,
};
use super::types::{ChatMessage, ContentPart, MessageRole, ProviderConfig, ProviderKind};

/// What one decoded chunk contributes to the session.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChunkDelta {
    pub content: Option<String>,
    pub reasoning: Option<String>,
    pub finish_reason: Option<String>,
}

impl ChunkDelta {
    pub fn is_empty(&self) -> bool {
        self.content.as_deref().is_none_or(str::is_empty)
            && self.reasoning.as_deref().is_none_or(str::is_empty)
            && self.finish_reason.is_none()
    }
}

pub trait ProviderAdapter: Send + Sync {
    /// Full streaming URL for this provider.
    fn url(&self, provider: &ProviderConfig) -> String;

    /// `(header, value)` carrying the credential.
    fn auth_header(&self, api_key: &str) -> (&'static str, String);

    fn body(&self, provider: &ProviderConfig, messages: &[ChatMessage]) -> Value;

    fn parse_chunk(&self, value: &Value) -> ChunkDelta;

    /// Payload forwarded to the caller. Defaults to the upstream value.
    fn relay_value(&self, value: Value, _delta: &ChunkDelta, _provider: &ProviderConfig) -> Value {
        value
    }
}

/// Adapter for a provider kind. DeepSeek and Qwen speak the OpenAI
/// chat-completions dialect.
pub fn adapter_for(kind: ProviderKind) -> &'static dyn ProviderAdapter {
    match kind {
        ProviderKind::OpenAiCompat | ProviderKind::DeepSeek | ProviderKind::Qwen => {
            &OpenAiCompatAdapter
        }
        ProviderKind::Gemini => &GeminiAdapter,
    }
}

/// Assemble the streaming POST for `provider`.
pub fn build_request(
    client: &Client,
    provider: &ProviderConfig,
    messages: &[ChatMessage],
) -> RequestBuilder {
    let adapter = adapter_for(provider.kind);
    let mut request = client
        .post(adapter.url(provider))
        .header("Accept", "text/event-stream")
        .json(&adapter.body(provider, messages));
    if let Some(key) = provider.resolved_api_key() {
        let (name, value) = adapter.auth_header(&key);
        request = request.header(name, value);
    }
    request
}

// ─── OpenAI-compatible ───────────────────────────────────────────────────────

pub struct OpenAiCompatAdapter;

fn openai_role(role: MessageRole) -> &'static str {
    match role {
        MessageRole::System => "system",
        MessageRole::User => "user",
        MessageRole::Assistant => "assistant",
    }
}

fn openai_content(message: &ChatMessage) -> MessageContent {
    if !message.has_image() {
        return MessageContent::Text(message.text());
    }
    let parts = message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => OpenAiPart::Text { text: text.clone() },
            ContentPart::Image { media_type, data } => OpenAiPart::ImageUrl {
                image_url: ImageUrlContent {
                    url: format!("data:{media_type};base64,{data}"),
                },
            },
        })
        .collect();
    MessageContent::Parts(parts)
}

impl ProviderAdapter for OpenAiCompatAdapter {
    fn url(&self, provider: &ProviderConfig) -> String {
        let base = provider.endpoint.trim_end_matches('/');
        if base.contains("chat/completions") {
            base.to_string()
        } else {
            format!("{base}/chat/completions")
        }
    }

    fn auth_header(&self, api_key: &str) -> (&'static str, String) {
        ("Authorization", format!("Bearer {api_key}"))
    }

    fn body(&self, provider: &ProviderConfig, messages: &[ChatMessage]) -> Value {
        let request = ChatRequest {
            model: provider.model.clone(),
            messages: messages
                .iter()
                .map(|m| Message {
                    role: openai_role(m.role),
                    content: openai_content(m),
                })
                .collect(),
            stream: true,
            max_tokens: provider.max_tokens,
        };
        serde_json::to_value(request).unwrap_or(Value::Null)
    }

    fn parse_chunk(&self, value: &Value) -> ChunkDelta {
        let chunk: ChatCompletionChunk =
            serde_json::from_value(value.clone()).unwrap_or_default();
        let Some(choice) = chunk.choices.into_iter().next() else {
            return ChunkDelta::default();
        };
        let delta = choice.delta.unwrap_or_default();
        ChunkDelta {
            content: delta.content,
            reasoning: delta.reasoning_content,
            finish_reason: choice.finish_reason.filter(|r| !r.is_empty()),
        }
    }
}

// ─── Gemini ──────────────────────────────────────────────────────────────────

pub struct GeminiAdapter;

fn gemini_parts(message: &ChatMessage) -> Vec<Part> {
    message
        .content
        .iter()
        .map(|part| match part {
            ContentPart::Text { text } => Part::text(text.clone()),
            ContentPart::Image { media_type, data } => Part {
                text: None,
                inline_data: Some(GeminiInlineData {
                    mime_type: media_type.clone(),
                    data: data.clone(),
                }),
            },
        })
        .collect()
}

fn gemini_finish_reason(reason: &str) -> String {
    match reason {
        "STOP" => "stop".to_string(),
        "MAX_TOKENS" => "length".to_string(),
        other => other.to_ascii_lowercase(),
    }
}

impl ProviderAdapter for GeminiAdapter {
    fn url(&self, provider: &ProviderConfig) -> String {
        let base = provider.endpoint.trim_end_matches('/');
        if base.contains(":streamGenerateContent") {
            return base.to_string();
        }
        let model = provider.model.trim_start_matches("models/");
        format!("{base}/models/{model}:streamGenerateContent?alt=sse")
    }

    fn auth_header(&self, api_key: &str) -> (&'static str, String) {
        ("x-goog-api-key", api_key.to_string())
    }

    fn body(&self, provider: &ProviderConfig, messages: &[ChatMessage]) -> Value {
        let system_parts: Vec<Part> = messages
            .iter()
            .filter(|m| m.role == MessageRole::System)
            .flat_map(gemini_parts)
            .collect();
        let contents = messages
            .iter()
            .filter(|m| m.role != MessageRole::System)
            .map(|m| Content {
                role: Some(if m.role == MessageRole::Assistant {
                    "model"
                } else {
                    "user"
                }),
                parts: gemini_parts(m),
            })
            .collect();

        let request = GenerateContentRequest {
            contents,
            system_instruction: (!system_parts.is_empty()).then_some(Content {
                role: None,
                parts: system_parts,
            }),
            generation_config: GenerationConfig {
                max_output_tokens: provider.max_tokens,
            },
        };
        serde_json::to_value(request).unwrap_or(Value::Null)
    }

    fn parse_chunk(&self, value: &Value) -> ChunkDelta {
        let response: GenerateContentResponse =
            serde_json::from_value(value.clone()).unwrap_or_default();
        let Some(candidate) = response.candidates.into_iter().next() else {
            return ChunkDelta::default();
        };

        let mut content = String::new();
        let mut reasoning = String::new();
        for part in candidate.content.parts {
            let Some(text) = part.text else { continue };
            if part.thought.unwrap_or(false) {
                reasoning.push_str(&text);
            } else {
                content.push_str(&text);
            }
        }

        ChunkDelta {
            content: (!content.is_empty()).then_some(content),
            reasoning: (!reasoning.is_empty()).then_some(reasoning),
            finish_reason: candidate
                .finish_reason
                .as_deref()
                .filter(|r| !r.is_empty() && *r != "FINISH_REASON_UNSPECIFIED")
                .map(gemini_finish_reason),
        }
    }

    /// Callers consume one dialect, so Gemini chunks are reshaped into
    /// chat-completion chunks.
    fn relay_value(&self, value: Value, delta: &ChunkDelta, provider: &ProviderConfig) -> Value {
        if value.get("decode_error").is_some() {
            return value;
        }
        let mut out_delta = json!({ "content": delta.content.clone().unwrap_or_default() });
        if let Some(reasoning) = &delta.reasoning {
            out_delta["reasoning_content"] = json!(reasoning);
        }
        json!({
            "object": "chat.completion.chunk",
            "model": provider.model,
            "choices": [{
                "index": 0,
                "delta": out_delta,
                "finish_reason": delta.finish_reason,
            }],
        })
    }
}
