//! Declarative transaction advice.
//!
//! [`TransactionAdvice`] wraps a unit of work in a transaction chosen from
//! declarative metadata. Whatever intercepts the call (a decorator, a
//! middleware layer, a macro) hands over a [`MethodFingerprint`] and the work
//! itself; the advice resolves the mode, requests the transaction, runs the
//! work and commits or rolls back depending on its outcome.
//!
//! The business error of a failed call is always returned unchanged. A
//! rollback that fails afterwards is logged and suppressed.

pub mod cache;
pub mod metadata;

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub use cache::MetadataCache;
pub use metadata::{
    ChainedMetadataProvider, MetadataProvider, MetadataTable, MethodFingerprint,
    TransactionAnnotation,
};

use crate::context::{task, TransactionContext};
use crate::error::JtxError;
use crate::scope::ScopeResolver;
use crate::transaction::{Transaction, TransactionManager, TransactionMode};

/// Advice configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct AdviceConfig {
    /// Scope key pattern with `$class` and `$method` placeholders (None = unscoped)
    pub scope_pattern: Option<String>,
    /// Mode for call sites without metadata
    pub default_mode: TransactionMode,
}

pub struct TransactionAdvice {
    manager: Arc<TransactionManager>,
    provider: Arc<dyn MetadataProvider>,
    cache: MetadataCache,
    scopes: ScopeResolver,
    default_mode: TransactionMode,
}

impl TransactionAdvice {
    pub fn new(manager: Arc<TransactionManager>, provider: Arc<dyn MetadataProvider>) -> Self {
        Self::with_config(manager, provider, AdviceConfig::default())
    }

    pub fn with_config(
        manager: Arc<TransactionManager>,
        provider: Arc<dyn MetadataProvider>,
        config: AdviceConfig,
    ) -> Self {
        Self {
            manager,
            provider,
            cache: MetadataCache::new(),
            scopes: ScopeResolver::new(config.scope_pattern),
            default_mode: config.default_mode,
        }
    }

    pub fn manager(&self) -> &Arc<TransactionManager> {
        &self.manager
    }

    pub fn cache(&self) -> &MetadataCache {
        &self.cache
    }

    pub fn default_mode(&self) -> TransactionMode {
        self.default_mode
    }

    /// Transaction mode declared for `method`
    pub fn resolve_mode(&self, method: &MethodFingerprint) -> TransactionMode {
        self.cache
            .resolve(method, self.provider.as_ref(), &self.default_mode)
    }

    /// Scope key for `method`
    pub fn resolve_scope(&self, method: &MethodFingerprint) -> Option<String> {
        self.scopes.resolve(&method.type_name, &method.method_name)
    }

    /// Run `call` inside the transaction declared for `method`.
    ///
    /// `call` receives the context (for nested advised calls) and the
    /// transaction (for resource requests). On `Ok` the transaction is
    /// committed and a commit failure becomes the result; on `Err` the
    /// transaction is rolled back and the original error is returned.
    pub fn invoke<T, E, F>(
        &self,
        ctx: &mut TransactionContext,
        method: &MethodFingerprint,
        call: F,
    ) -> Result<T, E>
    where
        F: FnOnce(&mut TransactionContext, &Transaction) -> Result<T, E>,
        E: From<JtxError> + fmt::Display,
    {
        let mode = self.resolve_mode(method);
        let scope = self.resolve_scope(method);
        let tx = self.manager.request_transaction(ctx, mode, scope.as_deref())?;

        match call(ctx, &tx) {
            Ok(value) => {
                self.manager.commit_transaction(ctx, &tx)?;
                Ok(value)
            }
            Err(err) => {
                if let Err(rollback_err) = self.manager.rollback_transaction(ctx, &tx, Some(&err)) {
                    log::error!(
                        "Rollback of transaction {} after {} failed: {} \
                         (suppressed, original error: {})",
                        tx,
                        method,
                        rollback_err,
                        err
                    );
                }
                Err(err)
            }
        }
    }

    /// [`invoke`](Self::invoke) against the task-local context of the calling task.
    ///
    /// Must run inside [`task::scope`]; `call` receives the borrowed context
    /// and must use it for nested advised calls.
    pub fn invoke_current<T, E, F>(&self, method: &MethodFingerprint, call: F) -> Result<T, E>
    where
        F: FnOnce(&mut TransactionContext, &Transaction) -> Result<T, E>,
        E: From<JtxError> + fmt::Display,
    {
        task::with_current(|ctx| self.invoke(ctx, method, call))?
    }
}

impl fmt::Debug for TransactionAdvice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionAdvice")
            .field("scopes", &self.scopes)
            .field("default_mode", &self.default_mode)
            .field("cached_modes", &self.cache.len())
            .finish()
    }
}
