//! Transaction Manager for jtx
//!
//! ## Responsibilities
//!
//! - Owns the ordered registry of resource managers
//! - Resolves the ambient transaction of a `TransactionContext` slot and asks the
//!   propagation engine what a request must do with it
//! - Binds resources to transactions lazily, on first request
//! - Completes transactions against their resources
//!
//! ## Reference counting
//!
//! Every `request_transaction` that returns a transaction must be balanced by
//! exactly one `commit_transaction` or `rollback_transaction` for it. Joining
//! requests only increase the reference count; completion against resources
//! happens when the count drops to zero:
//! 1. COMMIT: resources commit in registration order. All are attempted; failures
//!    are aggregated and leave the transaction rolled back.
//! 2. ROLLBACK: resources roll back in reverse registration order, aggregating
//!    failures the same way.
//! 3. A rollback from a joined level only marks the owning transaction
//!    rollback-only; the owner's commit then rolls back and reports it.
//!
//! ## Nested transactions
//!
//! A NESTED child shares its parent's resources (no savepoints), but keeps its own
//! reference count so it completes on its own schedule. Completing a child never
//! touches resources; rolling it back marks the parent rollback-only.

use std::any::{type_name, TypeId};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::mode::{IsolationLevel, TransactionMode};
use super::propagation::{self, PropagationAction};
use super::types::{BoundResource, Transaction, TransactionId, TransactionStatus};
use crate::context::TransactionContext;
use crate::error::{JtxError, Result};
use crate::resource::registry::{self, RegisteredManager, ResourceRegistry};
use crate::resource::{ResourceGuard, ResourceManager, ResourceType};

/// Transaction manager configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TransactionManagerConfig {
    /// Maximum number of resources one transaction may bind (None = unlimited)
    pub max_resources_per_transaction: Option<usize>,
    /// Accept exactly one resource manager
    pub single_resource_manager: bool,
    /// Check isolation and read-only compatibility when joining an existing transaction
    pub validate_existing_transaction: bool,
    /// Map every scope to the single unscoped slot
    pub ignore_scope: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Completion {
    Commit,
    Rollback,
}

impl fmt::Display for Completion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Completion::Commit => write!(f, "commit"),
            Completion::Rollback => write!(f, "rollback"),
        }
    }
}

/// The Transaction Manager
///
/// Shared between execution contexts (wrap it in an `Arc`); each context keeps
/// its ambient transactions in its own `TransactionContext`.
pub struct TransactionManager {
    /// Registered resource managers, in commit order
    registry: RwLock<ResourceRegistry>,
    config: RwLock<TransactionManagerConfig>,
    /// Next transaction ID
    next_txn_id: AtomicU64,
}

impl TransactionManager {
    /// Create a transaction manager with default configuration
    pub fn new() -> Self {
        Self::with_config(TransactionManagerConfig::default())
    }

    pub fn with_config(config: TransactionManagerConfig) -> Self {
        Self {
            registry: RwLock::new(ResourceRegistry::new()),
            config: RwLock::new(config),
            next_txn_id: AtomicU64::new(1),
        }
    }

    pub fn config(&self) -> TransactionManagerConfig {
        *self.config.read()
    }

    /// Register a resource manager. Registration order is commit order.
    pub fn register_resource_manager<M: ResourceManager>(&self, manager: M) -> Result<()> {
        let config = self.config();
        let mut registry = self.registry.write();

        if config.single_resource_manager && !registry.is_empty() {
            return Err(JtxError::Configuration(format!(
                "single resource manager mode already holds {}",
                registry.resource_types()[0]
            )));
        }
        if let Some(max) = config.max_resources_per_transaction {
            if registry.len() + 1 > max {
                return Err(JtxError::Configuration(format!(
                    "registering {} would exceed the limit of {} resources per transaction",
                    manager.resource_name(),
                    max
                )));
            }
        }

        let resource_type = registry.register(Arc::new(manager))?;
        log::info!(
            "Registered resource manager for {} (position {})",
            resource_type,
            registry.len() - 1
        );
        Ok(())
    }

    /// Limit the number of resources one transaction may bind
    pub fn set_max_resources_per_transaction(&self, max: usize) -> Result<()> {
        if max == 0 {
            return Err(JtxError::Configuration(
                "max resources per transaction must be at least 1".into(),
            ));
        }
        let registered = self.registry.read().len();
        if registered > max {
            return Err(JtxError::Configuration(format!(
                "{} resource managers are already registered, limit {} is too low",
                registered, max
            )));
        }
        self.config.write().max_resources_per_transaction = Some(max);
        Ok(())
    }

    /// Switch single-resource-manager mode on or off
    pub fn set_single_resource_manager(&self, single: bool) -> Result<()> {
        let registered = self.registry.read().len();
        if single && registered > 1 {
            return Err(JtxError::Configuration(format!(
                "{} resource managers are already registered",
                registered
            )));
        }
        self.config.write().single_resource_manager = single;
        Ok(())
    }

    pub fn set_validate_existing_transaction(&self, validate: bool) {
        self.config.write().validate_existing_transaction = validate;
    }

    pub fn set_ignore_scope(&self, ignore: bool) {
        self.config.write().ignore_scope = ignore;
    }

    pub fn resource_manager_count(&self) -> usize {
        self.registry.read().len()
    }

    /// Registered resource types, in registration order
    pub fn resource_types(&self) -> Vec<ResourceType> {
        self.registry.read().resource_types()
    }

    pub fn has_resource_manager<R: 'static>(&self) -> bool {
        self.registry.read().lookup(TypeId::of::<R>()).is_some()
    }

    /// Scope slot used for a requested scope
    fn slot(&self, scope: Option<&str>) -> Option<String> {
        if self.config().ignore_scope {
            None
        } else {
            scope.map(str::to_owned)
        }
    }

    /// Ambient transaction of the calling context for `scope`
    pub fn get_transaction(
        &self,
        ctx: &TransactionContext,
        scope: Option<&str>,
    ) -> Option<Transaction> {
        let slot = self.slot(scope);
        ctx.current(slot.as_deref()).cloned()
    }

    /// Request a transaction for a unit of work.
    ///
    /// Depending on the mode's propagation behavior the ambient transaction of
    /// the scope is joined, suspended or rejected, or a new transaction starts.
    pub fn request_transaction(
        &self,
        ctx: &mut TransactionContext,
        mode: TransactionMode,
        scope: Option<&str>,
    ) -> Result<Transaction> {
        let slot = self.slot(scope);
        let ambient = ctx.current(slot.as_deref()).cloned();

        // An inactive ambient transaction does not count as an existing transaction
        let existing = ambient.filter(|tx| tx.is_active() && !tx.is_completed());
        let action = propagation::decide(mode.propagation, existing.is_some());

        match (action, existing) {
            (PropagationAction::JoinExisting, Some(tx)) => {
                self.validate_join(&tx, &mode)?;
                let ref_count = tx.join();
                log::debug!("Joined transaction {} ({}, ref count {})", tx, mode, ref_count);
                Ok(tx)
            }
            (PropagationAction::FailNoTransaction, _) => {
                Err(JtxError::NoTransaction { scope: slot })
            }
            (PropagationAction::FailExistingTransaction, _) => {
                Err(JtxError::ExistingTransaction { scope: slot })
            }
            (PropagationAction::StartNestedChild, Some(parent)) => {
                Ok(self.start(ctx, mode, slot, true, Some(parent)))
            }
            (action, existing) => {
                if let Some(suspended) = existing.filter(|_| action.suspends_ambient()) {
                    suspended.suspend();
                    log::debug!("Suspended transaction {}", suspended);
                }
                Ok(self.start(ctx, mode, slot, action.starts_active(), None))
            }
        }
    }

    fn start(
        &self,
        ctx: &mut TransactionContext,
        mode: TransactionMode,
        slot: Option<String>,
        active: bool,
        parent: Option<Transaction>,
    ) -> Transaction {
        let id = TransactionId::new(self.next_txn_id.fetch_add(1, Ordering::SeqCst));
        let tx = Transaction::new(id, mode, slot.clone(), active, parent);
        log::debug!(
            "Started {} transaction {} ({}, scope {:?}, parent {:?})",
            if active { "active" } else { "inactive" },
            tx,
            mode,
            slot,
            tx.parent().map(|p| p.id())
        );
        ctx.push(slot, tx.clone());
        tx
    }

    fn validate_join(&self, existing: &Transaction, requested: &TransactionMode) -> Result<()> {
        if !self.config().validate_existing_transaction {
            return Ok(());
        }
        let current = existing.mode();
        if current.isolation != IsolationLevel::Default
            && requested.isolation != IsolationLevel::Default
            && current.isolation != requested.isolation
        {
            return Err(JtxError::IncompatibleTransaction(format!(
                "transaction {} uses isolation {}, but {} was requested",
                existing, current.isolation, requested.isolation
            )));
        }
        if current.read_only && !requested.read_only {
            return Err(JtxError::IncompatibleTransaction(format!(
                "transaction {} is read-only, but a read-write transaction was requested",
                existing
            )));
        }
        Ok(())
    }

    /// Access the resource of type `R` bound to a transaction.
    ///
    /// The resource is begun through its resource manager on first request;
    /// later requests return the same resource. Joiners and NESTED children
    /// resolve to the resources of the owning transaction.
    ///
    /// Each resource has its own lock: guards of different resources can be
    /// held together, and the transaction stays usable while they are held.
    /// A resource already borrowed fails with `ResourceInUse`.
    pub fn request_resource<R: Send + 'static>(
        &self,
        tx: &Transaction,
    ) -> Result<ResourceGuard<R>> {
        let status = tx.status();
        if status.is_completed() {
            return Err(JtxError::InvalidState { id: tx.id(), status });
        }

        let owner = tx.owner();
        let RegisteredManager { position, manager } = self
            .registry
            .read()
            .lookup(TypeId::of::<R>())
            .ok_or_else(|| JtxError::ResourceNotRegistered(type_name::<R>().to_string()))?;

        let resource = {
            let mut state = owner.state();
            if state.status.is_completed() {
                return Err(JtxError::InvalidState { id: owner.id(), status: state.status });
            }
            match state.resources.get(&position) {
                Some(bound) => Arc::clone(&bound.resource),
                None => {
                    let resource_type = manager.resource_type();
                    let resource = manager
                        .begin(owner.mode(), owner.is_active())
                        .map_err(|source| JtxError::ResourceBegin {
                            resource: resource_type.to_string(),
                            source,
                        })?;
                    log::debug!(
                        "Bound {} resource to transaction {} (active: {})",
                        resource_type,
                        owner,
                        owner.is_active()
                    );
                    state.resources.insert(
                        position,
                        BoundResource { manager, resource: Arc::clone(&resource) },
                    );
                    resource
                }
            }
        };

        let cell = registry::cell::<R>(&resource)
            .ok_or_else(|| JtxError::ResourceNotRegistered(type_name::<R>().to_string()))?;
        cell.try_lock_arc()
            .ok_or_else(|| JtxError::ResourceInUse(type_name::<R>().to_string()))
    }

    /// Commit a transaction.
    ///
    /// Joined levels only release their reference. The last reference commits
    /// every bound resource, or rolls back if the transaction is rollback-only.
    pub fn commit_transaction(&self, ctx: &mut TransactionContext, tx: &Transaction) -> Result<()> {
        if !self.release(ctx, tx)? {
            log::debug!("Released joined reference to transaction {}", tx);
            return Ok(());
        }

        if tx.status() == TransactionStatus::RollbackOnly {
            log::warn!(
                "Transaction {} is rollback-only (cause: {}), rolling back instead of committing",
                tx,
                tx.rollback_cause().unwrap_or_else(|| "not recorded".to_string())
            );
            let mut errors = vec![JtxError::RollbackOnly { id: tx.id() }];
            if let Err(e) = self.complete(ctx, tx, Completion::Rollback) {
                errors.push(e);
            }
            return Err(
                JtxError::aggregate(errors).unwrap_or(JtxError::RollbackOnly { id: tx.id() })
            );
        }

        self.complete(ctx, tx, Completion::Commit)
    }

    /// Roll back a transaction.
    ///
    /// Joined levels mark the owning transaction rollback-only and release their
    /// reference; the last reference rolls back every bound resource.
    pub fn rollback_transaction(
        &self,
        ctx: &mut TransactionContext,
        tx: &Transaction,
        cause: Option<&dyn fmt::Display>,
    ) -> Result<()> {
        let cause = cause.map(|c| c.to_string());
        if !self.release(ctx, tx)? {
            tx.mark_rollback_only(cause);
            log::debug!("Marked transaction {} rollback-only from a joined level", tx);
            return Ok(());
        }
        {
            let mut state = tx.state();
            if state.rollback_cause.is_none() {
                state.rollback_cause = cause;
            }
        }
        self.complete(ctx, tx, Completion::Rollback)
    }

    /// Drop one reference. Returns true if it was the last one.
    fn release(&self, ctx: &TransactionContext, tx: &Transaction) -> Result<bool> {
        let mut state = tx.state();
        if state.status.is_completed() {
            return Err(JtxError::InvalidState { id: tx.id(), status: state.status });
        }
        if state.ref_count <= 1 {
            if !ctx.is_current(tx) {
                return Err(JtxError::NotCurrent { id: tx.id() });
            }
            // Completion needs every resource back from the caller
            let borrowed = state.resources.values().find(|b| Arc::strong_count(&b.resource) > 1);
            if let Some(bound) = borrowed {
                return Err(JtxError::ResourceInUse(bound.manager.resource_type().to_string()));
            }
        }
        state.ref_count = state.ref_count.saturating_sub(1);
        Ok(state.ref_count == 0)
    }

    /// Finish a transaction whose reference count reached zero.
    fn complete(
        &self,
        ctx: &mut TransactionContext,
        tx: &Transaction,
        completion: Completion,
    ) -> Result<()> {
        let errors = if tx.parent().is_some() {
            // Resources belong to the parent
            if completion == Completion::Rollback {
                let cause = tx.rollback_cause();
                tx.mark_rollback_only(cause);
            }
            Vec::new()
        } else {
            let resources = std::mem::take(&mut tx.state().resources);
            let mut errors = Vec::new();
            let bound: Vec<BoundResource> = match completion {
                Completion::Commit => resources.into_values().collect(),
                Completion::Rollback => resources.into_values().rev().collect(),
            };
            for BoundResource { manager, resource } in bound {
                let resource_type = manager.resource_type();
                let result = match completion {
                    Completion::Commit => manager.commit(resource).map_err(|source| {
                        JtxError::ResourceCommit {
                            resource: resource_type.to_string(),
                            source,
                        }
                    }),
                    Completion::Rollback => manager.rollback(resource).map_err(|source| {
                        JtxError::ResourceRollback {
                            resource: resource_type.to_string(),
                            source,
                        }
                    }),
                };
                if let Err(e) = result {
                    log::error!("Transaction {}: {}", tx, e);
                    errors.push(e);
                }
            }
            errors
        };

        let status = if completion == Completion::Commit && errors.is_empty() {
            TransactionStatus::Committed
        } else {
            TransactionStatus::RolledBack
        };
        tx.state().status = status;

        if let Some(restored) = ctx.pop(tx) {
            restored.resume();
            log::debug!("Transaction {} is ambient again", restored);
        }
        log::debug!(
            "Completed {} of transaction {}: {} ({:?} elapsed)",
            completion,
            tx,
            status,
            tx.elapsed()
        );

        match JtxError::aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Close every resource manager, in registration order, and empty the registry.
    pub fn close(&self) -> Result<()> {
        let managers = self.registry.write().drain();
        let mut errors = Vec::new();
        for manager in managers {
            let resource_type = manager.resource_type();
            if let Err(source) = manager.close() {
                log::error!("Failed to close {} resource manager: {}", resource_type, source);
                errors.push(JtxError::ResourceClose {
                    resource: resource_type.to_string(),
                    source,
                });
            }
        }
        log::info!("Transaction manager closed");
        match JtxError::aggregate(errors) {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Default for TransactionManager {
    fn default() -> Self {
        Self::new()
    }
}
