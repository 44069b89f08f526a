use anyhow::{Context as _, Result, anyhow};
use rusqlite::params;
use uuid::Uuid;

use super::ChatStore;
use crate::core::orchestrator::types::{ToolTrace, TurnRecord, TurnStatus};

impl ChatStore {
    /// Persist one conversation turn. Called exactly once per inbound
    /// message, whatever the turn's outcome was.
    pub async fn append_turn(&self, record: &TurnRecord) -> Result<()> {
        let trace_json = if record.tool_trace.is_empty() {
            None
        } else {
            Some(serde_json::to_string(&record.tool_trace)?)
        };

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO chat_messages (
                message_id, user_id, conversation_id, user_message,
                llm_response, thought_signature, model_name, latency_ms,
                tool_trace, error_message, status
             ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
            params![
                record.message_id.to_string(),
                record.user_id.to_string(),
                record.conversation_id.to_string(),
                record.user_message,
                record.llm_response,
                record.thought_signature,
                record.model_name,
                record.latency_ms,
                trace_json,
                record.error_message,
                record.status.as_str(),
            ],
        )?;
        Ok(())
    }

    /// All turns of one conversation, oldest first. Scoped by owner so a
    /// guessed conversation id from another user reads as empty history.
    pub async fn turns_for_conversation(
        &self,
        conversation_id: Uuid,
        user_id: Uuid,
    ) -> Result<Vec<TurnRecord>> {
        let db = self.db.lock().await;
        let mut stmt = db.prepare(
            "SELECT message_id, user_message, llm_response, thought_signature,
                    model_name, latency_ms, tool_trace, error_message, status
             FROM chat_messages
             WHERE conversation_id = ?1 AND user_id = ?2
             ORDER BY created_at ASC, rowid ASC",
        )?;

        let rows = stmt.query_map(
            params![conversation_id.to_string(), user_id.to_string()],
            |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Option<Vec<u8>>>(3)?,
                    row.get::<_, Option<String>>(4)?,
                    row.get::<_, Option<i64>>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            },
        )?;

        let mut turns = Vec::new();
        for row in rows {
            let (
                message_id,
                user_message,
                llm_response,
                thought_signature,
                model_name,
                latency_ms,
                trace_json,
                error_message,
                status,
            ) = row?;

            let tool_trace: ToolTrace = match trace_json {
                Some(raw) => serde_json::from_str(&raw)
                    .with_context(|| format!("corrupt tool trace on turn {}", message_id))?,
                None => ToolTrace::default(),
            };

            turns.push(TurnRecord {
                message_id: Uuid::parse_str(&message_id)?,
                user_id,
                conversation_id,
                user_message,
                llm_response,
                thought_signature,
                model_name: model_name.unwrap_or_default(),
                latency_ms: latency_ms.unwrap_or(0),
                tool_trace,
                error_message,
                status: TurnStatus::from_status(&status)
                    .ok_or_else(|| anyhow!("unknown turn status: {}", status))?,
            });
        }
        Ok(turns)
    }
}
