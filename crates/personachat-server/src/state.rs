//! Shared application state.

use personachat_chat::ChatService;
use personachat_core::ChatConfig;

/// Shared application state accessible from all route handlers.
///
/// Everything here is read-only after startup.
pub struct AppState {
    pub chat: ChatService,
}

impl AppState {
    pub fn new(chat: ChatService) -> Self {
        Self { chat }
    }

    /// State with the real provider adapters built from `config`.
    pub fn from_config(config: &ChatConfig) -> anyhow::Result<Self> {
        let chat = ChatService::from_config(config)
            .map_err(|e| anyhow::anyhow!("Failed to build HTTP client: {}", e))?;
        Ok(Self::new(chat))
    }
}
