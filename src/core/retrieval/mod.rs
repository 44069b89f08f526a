use std::sync::Arc;

use anyhow::Result;
use rusqlite::params;
use tracing::info;
use uuid::Uuid;

use crate::core::llm::Embedder;
use crate::core::store::ChatStore;

/// Upper bound on one stored chunk.
const CHUNK_CHARS: usize = 1200;

/// The vector table cannot filter by owner, so KNN over-fetches and the
/// owner filter is applied on the joined rows.
const OVERFETCH_FACTOR: usize = 4;

fn embedding_to_bytes(embedding: &[f32]) -> Vec<u8> {
    embedding.iter().flat_map(|v| v.to_le_bytes()).collect()
}

/// Embeds document chunks into the store's vector table and answers
/// similarity queries with a formatted context block. Consumes whatever
/// `Embedder` the caller hands it, so tests run without a provider.
pub struct Retriever {
    store: Arc<ChatStore>,
    embedder: Arc<dyn Embedder>,
    model: String,
}

impl Retriever {
    pub fn new(store: Arc<ChatStore>, embedder: Arc<dyn Embedder>, model: String) -> Self {
        Self {
            store,
            embedder,
            model,
        }
    }

    /// Pack paragraphs into chunks of at most CHUNK_CHARS; an oversized
    /// paragraph becomes its own chunk rather than being split mid-sentence.
    fn chunk_text(text: &str) -> Vec<String> {
        let mut chunks = Vec::new();
        let mut current = String::new();
        for paragraph in text.split("\n\n") {
            let paragraph = paragraph.trim();
            if paragraph.is_empty() {
                continue;
            }
            if !current.is_empty() && current.len() + paragraph.len() + 2 > CHUNK_CHARS {
                chunks.push(std::mem::take(&mut current));
            }
            if !current.is_empty() {
                current.push_str("\n\n");
            }
            current.push_str(paragraph);
        }
        if !current.is_empty() {
            chunks.push(current);
        }
        chunks
    }

    /// Chunk, embed and store one plain-text document. Returns the number
    /// of chunks indexed.
    pub async fn add_document(&self, user_id: Uuid, source: &str, text: &str) -> Result<usize> {
        let chunks = Self::chunk_text(text);
        for (index, chunk) in chunks.iter().enumerate() {
            let embedding = self.embedder.embed(&self.model, chunk).await?;
            let bytes = embedding_to_bytes(&embedding);

            let db = self.store.db();
            let db = db.lock().await;
            db.execute(
                "INSERT INTO documents (user_id, source, chunk_index, content)
                 VALUES (?1, ?2, ?3, ?4)",
                params![user_id.to_string(), source, index as i64, chunk],
            )?;
            let rowid = db.last_insert_rowid();
            db.execute(
                "INSERT INTO vec_documents (rowid, embedding) VALUES (?1, ?2)",
                params![rowid, bytes],
            )?;
        }
        info!(
            "Indexed {} chunk(s) from '{}' for user {}",
            chunks.len(),
            source,
            user_id
        );
        Ok(chunks.len())
    }

    /// Nearest chunks owned by `user_id`, formatted as a context block.
    /// An empty document store yields an empty context, never an error.
    pub async fn retrieve(&self, query: &str, top_k: usize, user_id: Uuid) -> Result<String> {
        {
            let db = self.store.db();
            let db = db.lock().await;
            let count: i64 = db.query_row(
                "SELECT COUNT(*) FROM documents WHERE user_id = ?1",
                params![user_id.to_string()],
                |row| row.get(0),
            )?;
            if count == 0 {
                return Ok(String::new());
            }
        }

        let embedding = self.embedder.embed(&self.model, query).await?;
        let bytes = embedding_to_bytes(&embedding);

        let db = self.store.db();
        let db = db.lock().await;
        let mut stmt = db.prepare(
            "SELECT rowid, distance FROM vec_documents
             WHERE embedding MATCH ?1 AND k = ?2
             ORDER BY distance",
        )?;
        let hits = stmt.query_map(
            params![bytes, (top_k * OVERFETCH_FACTOR) as i64],
            |row| Ok((row.get::<_, i64>(0)?, row.get::<_, f64>(1)?)),
        )?;

        let mut blocks = Vec::new();
        for hit in hits {
            if blocks.len() >= top_k {
                break;
            }
            let (rowid, distance) = hit?;
            let row = db.query_row(
                "SELECT user_id, source, chunk_index, content FROM documents WHERE rowid = ?1",
                params![rowid],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )?;
            let (owner, source, chunk_index, content) = row;
            if owner != user_id.to_string() {
                continue;
            }
            blocks.push(format!(
                "[distance={:.4} | {} | chunk {}]\n{}",
                distance, source, chunk_index, content
            ));
        }

        Ok(blocks.join("\n\n---\n\n"))
    }
}
