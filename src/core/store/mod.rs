mod turns;
mod users;

pub use users::UserRecord;

use std::path::Path;
use std::sync::Arc;

use anyhow::Result;
use rusqlite::{Connection, ffi::sqlite3_auto_extension};
use tokio::sync::Mutex;
use tracing::info;

/// SQLite-backed store for conversation turns, tasks, users and the
/// document/vector tables behind retrieval. One connection guarded by an
/// async mutex; tool execution takes an explicit transaction on it so a
/// failed tool call rolls back without touching anything else.
pub struct ChatStore {
    db: Arc<Mutex<Connection>>,
}

impl ChatStore {
    pub fn open<P: AsRef<Path>>(data_dir: P) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        std::fs::create_dir_all(data_dir)?;

        // Load sqlite-vec globally for rusqlite before opening the connection
        unsafe {
            sqlite3_auto_extension(Some(std::mem::transmute::<
                *const (),
                unsafe extern "C" fn(
                    *mut rusqlite::ffi::sqlite3,
                    *mut *mut std::os::raw::c_char,
                    *const rusqlite::ffi::sqlite3_api_routines,
                ) -> std::os::raw::c_int,
            >(
                sqlite_vec::sqlite3_vec_init as *const ()
            )));
        }

        let db_path = data_dir.join("colloquy.db");
        let db = Connection::open(&db_path)?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS users (
                id TEXT PRIMARY KEY,
                name TEXT NOT NULL,
                token_hash TEXT NOT NULL UNIQUE,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                message_id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                conversation_id TEXT NOT NULL,
                user_message TEXT NOT NULL,
                llm_response TEXT,
                thought_signature BLOB,
                model_name TEXT,
                latency_ms INTEGER,
                tool_trace TEXT,
                error_message TEXT,
                status TEXT NOT NULL DEFAULT 'pending',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_chat_user_created
             ON chat_messages(user_id, created_at)",
            [],
        )?;
        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_chat_conversation
             ON chat_messages(conversation_id)",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS tasks (
                task_id TEXT PRIMARY KEY,
                conversation_id TEXT NOT NULL,
                created_by_user_id TEXT NOT NULL,
                title TEXT NOT NULL,
                description TEXT,
                status TEXT NOT NULL DEFAULT 'todo',
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE INDEX IF NOT EXISTS idx_tasks_owner
             ON tasks(created_by_user_id)",
            [],
        )?;

        db.execute(
            "CREATE TABLE IF NOT EXISTS documents (
                rowid INTEGER PRIMARY KEY,
                user_id TEXT NOT NULL,
                source TEXT NOT NULL,
                chunk_index INTEGER NOT NULL,
                content TEXT NOT NULL,
                created_at DATETIME DEFAULT CURRENT_TIMESTAMP
            )",
            [],
        )?;

        db.execute(
            "CREATE VIRTUAL TABLE IF NOT EXISTS vec_documents USING vec0(
                embedding float[768]
            )",
            [],
        )?;

        info!("Chat store ready at {}", db_path.display());

        Ok(Self {
            db: Arc::new(Mutex::new(db)),
        })
    }

    pub fn db(&self) -> Arc<Mutex<Connection>> {
        self.db.clone()
    }
}

/// Open a ChatStore in a unique temp directory. Test-only.
#[cfg(test)]
pub fn test_store() -> (tempfile::TempDir, Arc<ChatStore>) {
    let dir = tempfile::tempdir().expect("temp dir should be created");
    let store = ChatStore::open(dir.path()).expect("store should open");
    (dir, Arc::new(store))
}
