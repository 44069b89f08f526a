pub mod tasks;

use serde::Deserialize;
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

use crate::core::llm::ToolDeclaration;

pub const TASK_TOOL: &str = "task.manage";

#[derive(Debug, Error)]
pub enum ToolError {
    /// The model supplied arguments that do not fit the declared shape.
    #[error("{0}")]
    InvalidArguments(String),

    /// A business-rule violation the model can act on (missing field,
    /// ambiguous task reference, no match).
    #[error("{0}")]
    Execution(String),

    /// Store-level failure; callers log it and hand the model a generic
    /// error instead of the raw message.
    #[error("task store failure: {0}")]
    Backend(#[from] rusqlite::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskAction {
    Create,
    Update,
    Delete,
    List,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Todo,
    InProgress,
    Done,
}

impl TaskStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TaskStatus::Todo => "todo",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Done => "done",
        }
    }
}

/// Validated `task.manage` arguments. `conversation_id` is always injected
/// by the engine from the turn being processed; anything the model sends
/// under that key is discarded, so a task can never be attached to (or
/// resolved against) someone else's conversation.
#[derive(Debug, Clone)]
pub struct TaskToolArgs {
    pub action: TaskAction,
    pub query: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub conversation_id: Uuid,
}

#[derive(Deserialize)]
struct RawTaskArgs {
    action: TaskAction,
    #[serde(default)]
    query: Option<String>,
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    status: Option<TaskStatus>,
}

pub fn parse_task_args(
    raw: serde_json::Value,
    conversation_id: Uuid,
) -> Result<TaskToolArgs, ToolError> {
    let raw: RawTaskArgs = serde_json::from_value(raw)
        .map_err(|e| ToolError::InvalidArguments(format!("invalid task.manage arguments: {}", e)))?;

    Ok(TaskToolArgs {
        action: raw.action,
        query: raw.query,
        title: raw.title,
        description: raw.description,
        status: raw.status,
        conversation_id,
    })
}

/// Every capability advertised to the model. One entry today; the shape is
/// already a list so further tools only add declarations and a dispatch arm.
pub fn declarations() -> Vec<ToolDeclaration> {
    vec![task_declaration()]
}

fn task_declaration() -> ToolDeclaration {
    ToolDeclaration {
        name: TASK_TOOL,
        description: "Unified manager for the user's personal tasks: create, update, delete or \
                      list them, picking the action from the user's intent. Never invent or \
                      guess task IDs; identify existing tasks with a short natural-language \
                      phrase taken from the user's wording (for example 'finish the report') \
                      and the backend resolves it. If several tasks could match, ask the user \
                      to be more specific instead of retrying. For create, produce a concise \
                      title and optional description. For list, pass a short keyword only when \
                      the user is looking for something specific. Summarize tool output \
                      rather than echoing it. If the tool returns an error you cannot fix \
                      from its message, stop calling it and tell the user to try again later."
            .to_string(),
        parameters: json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["create", "update", "delete", "list"],
                    "description": "The task operation to perform."
                },
                "query": {
                    "type": "string",
                    "description": "Short natural-language phrase identifying an existing task.",
                    "nullable": true
                },
                "title": {
                    "type": "string",
                    "description": "Title for a new task, or the updated title.",
                    "nullable": true
                },
                "description": {
                    "type": "string",
                    "description": "Optional longer task description.",
                    "nullable": true
                },
                "status": {
                    "type": "string",
                    "enum": ["todo", "in_progress", "done"],
                    "description": "Task status to set.",
                    "nullable": true
                }
            },
            "required": ["action"]
        }),
    }
}
