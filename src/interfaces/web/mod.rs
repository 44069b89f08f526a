pub(crate) mod auth;
mod handlers;
mod router;

use std::sync::Arc;

use anyhow::Result;
use tokio::sync::RwLock;
use tracing::info;

use crate::core::config::RuntimeConfig;
use crate::core::llm::ProviderHandle;
use crate::core::llm::providers::google::GoogleProvider;
use crate::core::store::ChatStore;

#[derive(Clone)]
pub(crate) struct AppState {
    pub(crate) store: Arc<ChatStore>,
    pub(crate) llm: Arc<RwLock<ProviderHandle>>,
    pub(crate) config: Arc<RuntimeConfig>,
}

impl AppState {
    /// Current provider, rebuilding the TTL-scoped handle (and re-reading
    /// the API key) once it has expired.
    pub(crate) async fn chat_provider(&self) -> Result<Arc<GoogleProvider>> {
        {
            let handle = self.llm.read().await;
            if !handle.is_expired() {
                return Ok(handle.provider());
            }
        }
        let mut handle = self.llm.write().await;
        if handle.is_expired() {
            handle.refresh(&self.config)?;
            info!("Provider credential handle refreshed");
        }
        Ok(handle.provider())
    }
}

pub struct ApiServer {
    state: AppState,
}

impl ApiServer {
    pub fn new(
        store: Arc<ChatStore>,
        llm: Arc<RwLock<ProviderHandle>>,
        config: Arc<RuntimeConfig>,
    ) -> Self {
        Self {
            state: AppState { store, llm, config },
        }
    }

    pub async fn serve(self) -> Result<()> {
        let addr = format!(
            "{}:{}",
            self.state.config.api_host, self.state.config.api_port
        );
        let app = router::build_api_router(self.state.clone());
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!("colloquy API listening on {}", addr);
        axum::serve(listener, app).await?;
        Ok(())
    }
}
