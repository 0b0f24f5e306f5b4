use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

/// Wire family of an upstream backend. Selects the request/stream adapter.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, strum::Display, strum::AsRefStr,
)]
pub enum ProviderKind {
    #[serde(rename = "openai_compat")]
    #[strum(serialize = "openai_compat")]
    OpenAiCompat,
    #[serde(rename = "deepseek")]
    #[strum(serialize = "deepseek")]
    DeepSeek,
    #[serde(rename = "qwen")]
    #[strum(serialize = "qwen")]
    Qwen,
    #[serde(rename = "gemini")]
    #[strum(serialize = "gemini")]
    Gemini,
}

/// What a provider/model can process.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    PartialOrd,
    Ord,
    Serialize,
    Deserialize,
    strum::Display,
    strum::EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum Capability {
    Text,
    Vision,
}

/// One configured upstream backend. Immutable once it is part of a
/// registry snapshot.
#[derive(Clone, Serialize, Deserialize)]
pub struct ProviderConfig {
    pub id: String,
    pub kind: ProviderKind,
    pub model: String,
    pub endpoint: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Environment variable consulted when `api_key` is unset or empty.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key_env: Option<String>,
    /// Ascending: 1 is preferred over 2.
    #[serde(default = "default_priority")]
    pub priority: u32,
    #[serde(default = "default_capabilities")]
    pub capabilities: BTreeSet<Capability>,
    #[serde(default)]
    pub cost_per_1k_tokens: f64,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,
    #[serde(default = "default_read_timeout_ms")]
    pub read_timeout_ms: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_true")]
    pub active: bool,
}

fn default_priority() -> u32 {
    100
}

fn default_capabilities() -> BTreeSet<Capability> {
    BTreeSet::from([Capability::Text])
}

fn default_max_tokens() -> u32 {
    4096
}

fn default_connect_timeout_ms() -> u64 {
    5_000
}

fn default_read_timeout_ms() -> u64 {
    90_000
}

fn default_max_retries() -> u32 {
    3
}

fn default_true() -> bool {
    true
}

impl ProviderConfig {
    /// Minimal active text provider; remaining fields take their defaults.
    pub fn new(
        id: impl Into<String>,
        kind: ProviderKind,
        model: impl Into<String>,
        endpoint: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            kind,
            model: model.into(),
            endpoint: endpoint.into(),
            api_key: None,
            api_key_env: None,
            priority: default_priority(),
            capabilities: default_capabilities(),
            cost_per_1k_tokens: 0.0,
            max_tokens: default_max_tokens(),
            connect_timeout_ms: default_connect_timeout_ms(),
            read_timeout_ms: default_read_timeout_ms(),
            max_retries: default_max_retries(),
            active: true,
        }
    }

    pub fn supports(&self, capability: Capability) -> bool {
        self.capabilities.contains(&capability)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn resolved_api_key(&self) -> Option<String> {
        self.api_key
            .as_deref()
            .filter(|key| !key.trim().is_empty())
            .map(str::to_string)
            .or_else(|| {
                self.api_key_env
                    .as_deref()
                    .and_then(|var| std::env::var(var).ok())
                    .filter(|key| !key.trim().is_empty())
            })
    }
}

impl fmt::Debug for ProviderConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderConfig")
            .field("id", &self.id)
            .field("kind", &self.kind)
            .field("model", &self.model)
            .field("endpoint", &self.endpoint)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("api_key_env", &self.api_key_env)
            .field("priority", &self.priority)
            .field("capabilities", &self.capabilities)
            .field("cost_per_1k_tokens", &self.cost_per_1k_tokens)
            .field("max_tokens", &self.max_tokens)
            .field("connect_timeout_ms", &self.connect_timeout_ms)
            .field("read_timeout_ms", &self.read_timeout_ms)
            .field("max_retries", &self.max_retries)
            .field("active", &self.active)
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    /// Base64-encoded image bytes.
    Image { media_type: String, data: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: MessageRole,
    pub content: Vec<ContentPart>,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::System,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![ContentPart::Text { text: text.into() }],
        }
    }

    pub fn user_with_image(
        text: impl Into<String>,
        media_type: impl Into<String>,
        data: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::User,
            content: vec![
                ContentPart::Text { text: text.into() },
                ContentPart::Image {
                    media_type: media_type.into(),
                    data: data.into(),
                },
            ],
        }
    }

    /// Text parts joined by newlines; images are skipped.
    pub fn text(&self) -> String {
        self.content
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(text.as_str()),
                ContentPart::Image { .. } => None,
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn has_image(&self) -> bool {
        self.content
            .iter()
            .any(|part| matches!(part, ContentPart::Image { .. }))
    }
}
