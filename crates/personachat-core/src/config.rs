//! Configuration: optional JSON file, environment fallback, defaults.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::types::ProviderId;

pub const DEFAULT_OPENAI_MODEL: &str = "gpt-4o-mini";
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-2.5-flash";
pub const DEFAULT_OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_GEMINI_API_BASE: &str = "https://generativelanguage.googleapis.com/v1beta";
pub const DEFAULT_PORT: u16 = 3000;
pub const DEFAULT_MAX_TOKENS: u32 = 1000;
pub const DEFAULT_CONFIG_FILE: &str = "personachat.json";

/// Connection and call settings for one provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderSettings {
    /// Server-side key. Never serialized back out.
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub model: String,
    pub api_base: String,
}

/// Top-level PersonaChat configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatConfig {
    pub port: u16,
    pub default_provider: ProviderId,
    pub openai: ProviderSettings,
    pub gemini: ProviderSettings,
    pub max_tokens: u32,
    pub connect_timeout_secs: u64,
    /// Total budget for a single-shot completion.
    pub request_timeout_secs: u64,
    /// Longest wait between two chunks of a provider stream.
    pub stream_idle_timeout_secs: u64,
    /// Total budget for the evaluation call.
    pub evaluation_timeout_secs: u64,
    #[serde(skip)]
    pub config_path: PathBuf,
}

/// On-disk shape. Every field is optional so that the environment can fill
/// whatever the file leaves out.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct FileConfig {
    port: Option<u16>,
    default_provider: Option<ProviderId>,
    openai_api_key: Option<String>,
    gemini_api_key: Option<String>,
    openai_model: Option<String>,
    gemini_model: Option<String>,
    openai_api_base: Option<String>,
    gemini_api_base: Option<String>,
    max_tokens: Option<u32>,
    connect_timeout_secs: Option<u64>,
    request_timeout_secs: Option<u64>,
    stream_idle_timeout_secs: Option<u64>,
    evaluation_timeout_secs: Option<u64>,
}

/// Key-free view of the configuration for the status endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct ConfigStatus {
    #[serde(rename = "defaultProvider")]
    pub default_provider: ProviderId,
    #[serde(rename = "openaiConfigured")]
    pub openai_configured: bool,
    #[serde(rename = "geminiConfigured")]
    pub gemini_configured: bool,
    #[serde(rename = "openaiModel")]
    pub openai_model: String,
    #[serde(rename = "geminiModel")]
    pub gemini_model: String,
}

impl Default for ChatConfig {
    fn default() -> Self {
        Self {
            port: DEFAULT_PORT,
            default_provider: ProviderId::Gemini,
            openai: ProviderSettings {
                api_key: None,
                model: DEFAULT_OPENAI_MODEL.into(),
                api_base: DEFAULT_OPENAI_API_BASE.into(),
            },
            gemini: ProviderSettings {
                api_key: None,
                model: DEFAULT_GEMINI_MODEL.into(),
                api_base: DEFAULT_GEMINI_API_BASE.into(),
            },
            max_tokens: DEFAULT_MAX_TOKENS,
            connect_timeout_secs: 10,
            request_timeout_secs: 60,
            stream_idle_timeout_secs: 30,
            evaluation_timeout_secs: 30,
            config_path: PathBuf::new(),
        }
    }
}

impl ChatConfig {
    /// Config file location: `PERSONACHAT_CONFIG` or `./personachat.json`.
    pub fn default_path() -> PathBuf {
        std::env::var("PERSONACHAT_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE))
    }

    /// Load config from file, falling back to env vars and defaults.
    pub fn load(config_path: &Path) -> Self {
        Self::load_with(config_path, |name| std::env::var(name).ok())
    }

    /// Same as [`ChatConfig::load`] with an injectable environment lookup.
    pub fn load_with(config_path: &Path, env: impl Fn(&str) -> Option<String>) -> Self {
        let file: FileConfig = match std::fs::read_to_string(config_path) {
            Ok(s) => match serde_json::from_str(&s) {
                Ok(parsed) => {
                    info!("Loaded config from {}", config_path.display());
                    parsed
                }
                Err(e) => {
                    warn!("Ignoring unparsable config {}: {}", config_path.display(), e);
                    FileConfig::default()
                }
            },
            Err(_) => FileConfig::default(),
        };

        let var = |name: &str| env(name).and_then(non_empty);
        let defaults = ChatConfig::default();

        let default_provider = file
            .default_provider
            .or_else(|| var("DEFAULT_PROVIDER").and_then(|v| ProviderId::parse(&v).ok()))
            .unwrap_or(defaults.default_provider);

        Self {
            port: file
                .port
                .or_else(|| var("PORT").and_then(|p| p.parse().ok()))
                .unwrap_or(defaults.port),
            default_provider,
            openai: ProviderSettings {
                api_key: file
                    .openai_api_key
                    .and_then(non_empty)
                    .or_else(|| var("OPENAI_API_KEY")),
                model: file
                    .openai_model
                    .or_else(|| var("OPENAI_MODEL"))
                    .unwrap_or(defaults.openai.model),
                api_base: file
                    .openai_api_base
                    .or_else(|| var("OPENAI_API_BASE"))
                    .unwrap_or(defaults.openai.api_base),
            },
            gemini: ProviderSettings {
                api_key: file
                    .gemini_api_key
                    .and_then(non_empty)
                    .or_else(|| var("GEMINI_API_KEY")),
                model: file
                    .gemini_model
                    .or_else(|| var("GEMINI_MODEL"))
                    .unwrap_or(defaults.gemini.model),
                api_base: file
                    .gemini_api_base
                    .or_else(|| var("GEMINI_API_BASE"))
                    .unwrap_or(defaults.gemini.api_base),
            },
            max_tokens: file.max_tokens.unwrap_or(defaults.max_tokens),
            connect_timeout_secs: file
                .connect_timeout_secs
                .unwrap_or(defaults.connect_timeout_secs),
            request_timeout_secs: file
                .request_timeout_secs
                .unwrap_or(defaults.request_timeout_secs),
            stream_idle_timeout_secs: file
                .stream_idle_timeout_secs
                .unwrap_or(defaults.stream_idle_timeout_secs),
            evaluation_timeout_secs: file
                .evaluation_timeout_secs
                .unwrap_or(defaults.evaluation_timeout_secs),
            config_path: config_path.to_path_buf(),
        }
    }

    pub fn provider(&self, id: ProviderId) -> &ProviderSettings {
        match id {
            ProviderId::OpenAI => &self.openai,
            ProviderId::Gemini => &self.gemini,
        }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn stream_idle_timeout(&self) -> Duration {
        Duration::from_secs(self.stream_idle_timeout_secs)
    }

    pub fn evaluation_timeout(&self) -> Duration {
        Duration::from_secs(self.evaluation_timeout_secs)
    }

    pub fn status(&self) -> ConfigStatus {
        ConfigStatus {
            default_provider: self.default_provider,
            openai_configured: self.openai.api_key.is_some(),
            gemini_configured: self.gemini.api_key.is_some(),
            openai_model: self.openai.model.clone(),
            gemini_model: self.gemini.model.clone(),
        }
    }
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
