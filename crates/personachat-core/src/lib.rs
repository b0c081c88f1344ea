//! PersonaChat core: provider ids, configuration, error taxonomy.

pub mod config;
pub mod error;
pub mod types;

pub use config::{ChatConfig, ConfigStatus, ProviderSettings};
pub use error::{ChatError, ProviderError, ProviderErrorKind, Result};
pub use types::ProviderId;
