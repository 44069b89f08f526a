use std::path::PathBuf;

use anyhow::{Context as _, Result};
use serde::Deserialize;

/// Daemon configuration. Values come from an optional `colloquy.toml`
/// (path in `COLLOQUY_CONFIG`, default `./colloquy.toml`), overridden by
/// environment variables, overridden again by CLI flags. The provider API
/// key is deliberately not part of this struct: it is read from the
/// environment each time the provider handle is (re)built, so key rotation
/// takes effect within one TTL.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    pub api_host: String,
    pub api_port: u16,
    pub data_dir: PathBuf,
    pub chat_model: String,
    pub embedding_model: String,
    pub provider_key_ttl_secs: u64,
    pub retrieval_top_k: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            api_host: "127.0.0.1".to_string(),
            api_port: 8420,
            data_dir: PathBuf::from("./colloquy-data"),
            chat_model: "gemini-2.5-flash".to_string(),
            embedding_model: "text-embedding-004".to_string(),
            provider_key_ttl_secs: 3600,
            retrieval_top_k: 5,
        }
    }
}

impl RuntimeConfig {
    pub fn load() -> Result<Self> {
        let path = std::env::var("COLLOQUY_CONFIG").unwrap_or_else(|_| "colloquy.toml".to_string());

        let mut config = match std::fs::read_to_string(&path) {
            Ok(raw) => {
                toml::from_str(&raw).with_context(|| format!("invalid config file: {}", path))?
            }
            Err(_) => Self::default(),
        };

        if let Ok(host) = std::env::var("COLLOQUY_API_HOST") {
            config.api_host = host;
        }
        if let Ok(port) = std::env::var("COLLOQUY_API_PORT") {
            config.api_port = port.parse().context("COLLOQUY_API_PORT is not a port")?;
        }
        if let Ok(dir) = std::env::var("COLLOQUY_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Ok(model) = std::env::var("COLLOQUY_CHAT_MODEL") {
            config.chat_model = model;
        }
        if let Ok(model) = std::env::var("COLLOQUY_EMBEDDING_MODEL") {
            config.embedding_model = model;
        }

        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_sane() {
        let config = RuntimeConfig::default();
        assert_eq!(config.api_host, "127.0.0.1");
        assert_eq!(config.retrieval_top_k, 5);
        assert_eq!(config.provider_key_ttl_secs, 3600);
    }

    #[test]
    fn toml_overrides_defaults() {
        let parsed: RuntimeConfig =
            toml::from_str("api_port = 9000\nchat_model = \"gemini-2.5-pro\"\n")
                .expect("config should parse");
        assert_eq!(parsed.api_port, 9000);
        assert_eq!(parsed.chat_model, "gemini-2.5-pro");
        assert_eq!(parsed.api_host, "127.0.0.1");
    }
}
