use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::core::llm::ProviderError;

/// Outcome recorded on a persisted conversation turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TurnStatus {
    Pending,
    Completed,
    Error,
}

impl TurnStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TurnStatus::Pending => "pending",
            TurnStatus::Completed => "completed",
            TurnStatus::Error => "error",
        }
    }

    pub fn from_status(value: &str) -> Option<Self> {
        match value {
            "pending" => Some(TurnStatus::Pending),
            "completed" => Some(TurnStatus::Completed),
            "error" => Some(TurnStatus::Error),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCallRecord {
    pub name: String,
    pub args: serde_json::Value,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolResponseRecord {
    pub name: String,
    pub response: serde_json::Value,
}

/// Ordered record of the tool activity inside one turn. `responses` aligns
/// positionally with `calls`; a call without a matching response means the
/// turn was interrupted mid-exchange.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ToolTrace {
    pub calls: Vec<ToolCallRecord>,
    pub responses: Vec<ToolResponseRecord>,
}

impl ToolTrace {
    pub fn is_empty(&self) -> bool {
        self.calls.is_empty() && self.responses.is_empty()
    }
}

/// One persisted conversation turn: the inbound message, the final answer
/// (absent when the turn failed), the provider's latest thought signature,
/// and bookkeeping. Exactly one of these is written per inbound message.
#[derive(Debug, Clone)]
pub struct TurnRecord {
    pub message_id: Uuid,
    pub user_id: Uuid,
    pub conversation_id: Uuid,
    pub user_message: String,
    pub llm_response: Option<String>,
    pub thought_signature: Option<Vec<u8>>,
    pub model_name: String,
    pub latency_ms: i64,
    pub tool_trace: ToolTrace,
    pub error_message: Option<String>,
    pub status: TurnStatus,
}

/// What `converse` hands back on success.
#[derive(Debug, Clone)]
pub struct TurnOutcome {
    pub answer: String,
    pub signature: Option<Vec<u8>>,
    pub trace: ToolTrace,
}

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("model returned no usable content")]
    EmptyReply,

    #[error("no final answer after {0} tool exchanges")]
    TurnLimitExceeded(usize),

    #[error(transparent)]
    Provider(#[from] ProviderError),

    /// Failure reading the persisted conversation while rebuilding history.
    #[error("conversation store failure: {0}")]
    Store(anyhow::Error),
}

impl From<anyhow::Error> for EngineError {
    fn from(err: anyhow::Error) -> Self {
        EngineError::Store(err)
    }
}

/// Terminal failure of a turn, carrying whatever tool activity had already
/// completed so the audit row still records it.
#[derive(Debug)]
pub struct TurnFailure {
    pub error: EngineError,
    pub trace: ToolTrace,
}

impl TurnFailure {
    pub fn bare(error: impl Into<EngineError>) -> Self {
        Self {
            error: error.into(),
            trace: ToolTrace::default(),
        }
    }
}

impl std::fmt::Display for TurnFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        self.error.fmt(f)
    }
}

impl std::error::Error for TurnFailure {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(&self.error)
    }
}
