use anyhow::Result;
use rusqlite::{OptionalExtension as _, params};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use super::ChatStore;

#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: Uuid,
    pub name: String,
}

fn hash_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn generate_raw_token() -> String {
    let bytes: [u8; 16] = rand::random();
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    format!("clq_{}", hex)
}

impl ChatStore {
    /// Create a user and return the raw bearer token exactly once; only the
    /// hash is stored.
    pub async fn create_user(&self, name: &str) -> Result<(String, UserRecord)> {
        let raw_token = generate_raw_token();
        let token_hash = hash_token(&raw_token);
        let id = Uuid::new_v4();

        let db = self.db.lock().await;
        db.execute(
            "INSERT INTO users (id, name, token_hash) VALUES (?1, ?2, ?3)",
            params![id.to_string(), name, token_hash],
        )?;

        Ok((
            raw_token,
            UserRecord {
                id,
                name: name.to_string(),
            },
        ))
    }

    pub async fn user_for_token(&self, raw_token: &str) -> Result<Option<UserRecord>> {
        let token_hash = hash_token(raw_token);
        let db = self.db.lock().await;
        let row = db
            .query_row(
                "SELECT id, name FROM users WHERE token_hash = ?1",
                params![token_hash],
                |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)),
            )
            .optional()?;

        match row {
            Some((id, name)) => Ok(Some(UserRecord {
                id: Uuid::parse_str(&id)?,
                name,
            })),
            None => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::store::test_store;

    #[tokio::test]
    async fn created_token_resolves_to_its_user() {
        let (_dir, store) = test_store();
        let (token, user) = store
            .create_user("ada")
            .await
            .expect("user should be created");
        assert!(token.starts_with("clq_"));

        let resolved = store
            .user_for_token(&token)
            .await
            .expect("lookup should work")
            .expect("token should resolve");
        assert_eq!(resolved.id, user.id);
        assert_eq!(resolved.name, "ada");
    }

    #[tokio::test]
    async fn unknown_token_resolves_to_none() {
        let (_dir, store) = test_store();
        let resolved = store
            .user_for_token("clq_doesnotexist")
            .await
            .expect("lookup should work");
        assert!(resolved.is_none());
    }
}
