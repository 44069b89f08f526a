pub mod providers;

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use thiserror::Error;

use crate::core::config::RuntimeConfig;
use providers::google::GoogleProvider;

/// Who produced a transcript entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    User,
    Model,
    Tool,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Model => "model",
            Role::Tool => "tool",
        }
    }
}

/// One piece of a transcript entry or model reply. A `Signature` part is an
/// opaque provider token that annotates the part immediately before it and
/// must be replayed verbatim (or substituted wholesale) on later requests.
#[derive(Debug, Clone, PartialEq)]
pub enum Part {
    Text(String),
    ToolCall {
        name: String,
        args: serde_json::Value,
    },
    ToolResult {
        name: String,
        response: serde_json::Value,
    },
    Signature(Vec<u8>),
}

/// One entry in the conversation transcript sent to the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct Content {
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Content {
    pub fn user(parts: Vec<Part>) -> Self {
        Self { role: Role::User, parts }
    }

    pub fn model(parts: Vec<Part>) -> Self {
        Self { role: Role::Model, parts }
    }

    pub fn tool(parts: Vec<Part>) -> Self {
        Self { role: Role::Tool, parts }
    }
}

/// A callable capability advertised to the model. `parameters` is a JSON
/// Schema object in the provider's function-declaration dialect.
#[derive(Debug, Clone)]
pub struct ToolDeclaration {
    pub name: &'static str,
    pub description: String,
    pub parameters: serde_json::Value,
}

/// The provider's reply to one exchange: ordered parts, already mapped back
/// into the neutral `Part` variant set.
#[derive(Debug, Clone, Default)]
pub struct ModelReply {
    pub parts: Vec<Part>,
}

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("provider API error (status {status}): {message}")]
    Api { status: u16, message: String },

    #[error("provider transport failure: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("malformed provider payload: {0}")]
    Payload(String),
}

#[async_trait]
pub trait ChatProvider: Send + Sync {
    async fn generate(
        &self,
        model: &str,
        transcript: &[Content],
        tools: &[ToolDeclaration],
    ) -> Result<ModelReply, ProviderError>;
}

#[async_trait]
pub trait Embedder: Send + Sync {
    async fn embed(&self, model: &str, text: &str) -> Result<Vec<f32>, ProviderError>;
}

/// TTL-scoped handle around the configured provider. The credential is read
/// when the handle is built and again on every refresh, so a rotated API key
/// is picked up within one TTL without restarting the daemon. Callers check
/// `is_expired` and rebuild through `refresh`; the handle itself never
/// reaches into ambient global state.
pub struct ProviderHandle {
    provider: Arc<GoogleProvider>,
    issued_at: Instant,
    ttl: Duration,
}

impl ProviderHandle {
    pub fn new(provider: GoogleProvider, ttl: Duration) -> Self {
        Self {
            provider: Arc::new(provider),
            issued_at: Instant::now(),
            ttl,
        }
    }

    pub fn build(config: &RuntimeConfig) -> anyhow::Result<Self> {
        let provider = GoogleProvider::from_env()?;
        Ok(Self::new(
            provider,
            Duration::from_secs(config.provider_key_ttl_secs),
        ))
    }

    pub fn provider(&self) -> Arc<GoogleProvider> {
        self.provider.clone()
    }

    pub fn is_expired(&self) -> bool {
        self.issued_at.elapsed() >= self.ttl
    }

    pub fn refresh(&mut self, config: &RuntimeConfig) -> anyhow::Result<()> {
        let rebuilt = Self::build(config)?;
        *self = rebuilt;
        Ok(())
    }
}
