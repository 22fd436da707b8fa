//! jtx: declarative, propagation-aware transaction coordination.
//!
//! A [`TransactionManager`] coordinates transactions over pluggable
//! [`ResourceManager`]s. Units of work request transactions with a
//! [`TransactionMode`]; propagation decides whether they join, suspend or
//! reject the ambient transaction of their [`TransactionContext`].
//! [`TransactionAdvice`] drives the same lifecycle from declarative metadata.

use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod advice;
pub mod context;
pub mod error;
pub mod resource;
pub mod scope;
pub mod transaction;

pub use advice::{
    AdviceConfig, ChainedMetadataProvider, MetadataCache, MetadataProvider, MetadataTable,
    MethodFingerprint, TransactionAdvice, TransactionAnnotation,
};
pub use context::TransactionContext;
pub use error::{JtxError, ResourceError, Result};
pub use resource::{ResourceGuard, ResourceManager, ResourceType};
pub use scope::ScopeResolver;
pub use transaction::{
    IsolationLevel, PropagationAction, PropagationBehavior, Transaction, TransactionId,
    TransactionManager, TransactionManagerConfig, TransactionMode, TransactionStatus,
};

/// Engine configuration
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub manager: TransactionManagerConfig,
    pub advice: AdviceConfig,
}

impl Config {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Config = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path)?;
        let config = Self::from_json_str(&json)?;
        log::info!("Loaded transaction configuration from {:?}", path);
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.manager.max_resources_per_transaction == Some(0) {
            return Err(JtxError::Configuration(
                "max resources per transaction must be at least 1".into(),
            ));
        }
        if self.advice.scope_pattern.as_deref() == Some("") {
            return Err(JtxError::Configuration(
                "scope pattern must not be empty (omit it to disable scoping)".into(),
            ));
        }
        Ok(())
    }

    /// Build a transaction manager with this configuration
    pub fn build_manager(&self) -> TransactionManager {
        TransactionManager::with_config(self.manager)
    }

    /// Build the advice for `manager` with this configuration
    pub fn build_advice(
        &self,
        manager: Arc<TransactionManager>,
        provider: Arc<dyn MetadataProvider>,
    ) -> TransactionAdvice {
        TransactionAdvice::with_config(manager, provider, self.advice.clone())
    }
}
