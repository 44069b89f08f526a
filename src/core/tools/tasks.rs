use rusqlite::{Transaction, params};
use serde_json::{Value, json};
use uuid::Uuid;

use super::{TaskAction, TaskStatus, TaskToolArgs, ToolError};
use crate::core::store::ChatStore;

struct TaskRow {
    task_id: String,
    title: String,
    status: String,
}

/// Execute one validated `task.manage` invocation inside its own
/// transaction. Any error leaves the transaction uncommitted, so it rolls
/// back on drop and a failed call can never leave partial writes behind.
pub async fn run(store: &ChatStore, args: &TaskToolArgs, user_id: Uuid) -> Result<Value, ToolError> {
    let db = store.db();
    let mut db = db.lock().await;
    let tx = db.transaction()?;

    let result = match args.action {
        TaskAction::Create => create_task(&tx, args, user_id),
        TaskAction::Update => update_task(&tx, args, user_id),
        TaskAction::Delete => delete_task(&tx, args, user_id),
        TaskAction::List => list_tasks(&tx, args, user_id),
    };

    match result {
        Ok(value) => {
            tx.commit()?;
            Ok(value)
        }
        Err(err) => Err(err),
    }
}

fn nonempty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

/// Resolve a free-text reference to exactly one task owned by `user_id`.
/// Zero or multiple matches are both refusals; the system never guesses
/// among ambiguous tasks.
fn resolve_single_task(
    tx: &Transaction,
    query: &str,
    user_id: Uuid,
) -> Result<TaskRow, ToolError> {
    let pattern = format!("%{}%", query);
    let mut stmt = tx.prepare(
        "SELECT task_id, title, status FROM tasks
         WHERE created_by_user_id = ?1
           AND (title LIKE ?2 OR IFNULL(description, '') LIKE ?2)
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![user_id.to_string(), pattern], |row| {
        Ok(TaskRow {
            task_id: row.get(0)?,
            title: row.get(1)?,
            status: row.get(2)?,
        })
    })?;

    let mut matches = Vec::new();
    for row in rows {
        matches.push(row?);
    }

    match matches.len() {
        0 => Err(ToolError::Execution("No matching task found".to_string())),
        1 => Ok(matches.remove(0)),
        _ => Err(ToolError::Execution(
            "Multiple matching tasks found".to_string(),
        )),
    }
}

fn create_task(tx: &Transaction, args: &TaskToolArgs, user_id: Uuid) -> Result<Value, ToolError> {
    let title = nonempty(&args.title)
        .ok_or_else(|| ToolError::Execution("title is required".to_string()))?;
    let status = args.status.unwrap_or(TaskStatus::Todo);

    tx.execute(
        "INSERT INTO tasks (task_id, conversation_id, created_by_user_id, title, description, status)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            Uuid::new_v4().to_string(),
            args.conversation_id.to_string(),
            user_id.to_string(),
            title,
            nonempty(&args.description),
            status.as_str(),
        ],
    )?;

    Ok(json!({ "title": title, "status": status.as_str() }))
}

fn update_task(tx: &Transaction, args: &TaskToolArgs, user_id: Uuid) -> Result<Value, ToolError> {
    let query = nonempty(&args.query)
        .ok_or_else(|| ToolError::Execution("query is required".to_string()))?;
    let task = resolve_single_task(tx, query, user_id)?;

    let title = nonempty(&args.title);
    let description = nonempty(&args.description);
    if args.status.is_none() && title.is_none() && description.is_none() {
        return Err(ToolError::Execution(
            "No fields provided to update".to_string(),
        ));
    }

    let mut updated_fields = Vec::new();
    if let Some(status) = args.status {
        tx.execute(
            "UPDATE tasks SET status = ?1 WHERE task_id = ?2",
            params![status.as_str(), task.task_id],
        )?;
        updated_fields.push("status");
    }
    if let Some(title) = title {
        tx.execute(
            "UPDATE tasks SET title = ?1 WHERE task_id = ?2",
            params![title, task.task_id],
        )?;
        updated_fields.push("title");
    }
    if let Some(description) = description {
        tx.execute(
            "UPDATE tasks SET description = ?1 WHERE task_id = ?2",
            params![description, task.task_id],
        )?;
        updated_fields.push("description");
    }

    let status = args
        .status
        .map(|s| s.as_str().to_string())
        .unwrap_or(task.status);

    Ok(json!({
        "updated": true,
        "updated_fields": updated_fields,
        "status": status,
    }))
}

fn delete_task(tx: &Transaction, args: &TaskToolArgs, user_id: Uuid) -> Result<Value, ToolError> {
    let query = nonempty(&args.query).ok_or_else(|| {
        ToolError::Execution("query is required to identify the task to delete".to_string())
    })?;
    let task = resolve_single_task(tx, query, user_id)?;

    tx.execute(
        "DELETE FROM tasks WHERE task_id = ?1",
        params![task.task_id],
    )?;

    Ok(json!({
        "action": "delete",
        "deleted": true,
        "task": { "title": task.title, "status": task.status },
    }))
}

fn list_tasks(tx: &Transaction, args: &TaskToolArgs, user_id: Uuid) -> Result<Value, ToolError> {
    let status = args.status.map(TaskStatus::as_str);
    let pattern = nonempty(&args.query).map(|q| format!("%{}%", q));

    let mut stmt = tx.prepare(
        "SELECT title, status, created_at FROM tasks
         WHERE created_by_user_id = ?1
           AND (?2 IS NULL OR status = ?2)
           AND (?3 IS NULL OR title LIKE ?3 OR IFNULL(description, '') LIKE ?3)
         ORDER BY created_at DESC, rowid DESC",
    )?;
    let rows = stmt.query_map(params![user_id.to_string(), status, pattern], |row| {
        Ok((
            row.get::<_, String>(0)?,
            row.get::<_, String>(1)?,
            row.get::<_, String>(2)?,
        ))
    })?;

    let mut tasks = Vec::new();
    for row in rows {
        let (title, status, created_at) = row?;
        tasks.push(json!({
            "title": title,
            "status": status,
            "created_at": created_at,
        }));
    }

    Ok(json!({
        "action": "list",
        "filter_applied": { "status": status, "query": nonempty(&args.query) },
        "count": tasks.len(),
        "tasks": tasks,
    }))
}
