//! Core transaction types and state management

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::{Mutex, MutexGuard};

use super::mode::TransactionMode;
use crate::resource::registry::{BoxedResource, ErasedResourceManager};

/// Unique identifier of a transaction within one transaction manager
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(u64);

impl TransactionId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn value(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "tx{}", self.0)
    }
}

/// Transaction status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    /// A real transaction, open and current
    Active,
    /// Runs without an underlying transaction
    Inactive,
    /// Put aside while a REQUIRES_NEW / NOT_SUPPORTED request runs
    Suspended,
    /// Can only end in a rollback
    RollbackOnly,
    Committed,
    RolledBack,
}

impl TransactionStatus {
    pub fn is_completed(&self) -> bool {
        matches!(self, Self::Committed | Self::RolledBack)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Active => write!(f, "active"),
            Self::Inactive => write!(f, "inactive"),
            Self::Suspended => write!(f, "suspended"),
            Self::RollbackOnly => write!(f, "rollback-only"),
            Self::Committed => write!(f, "committed"),
            Self::RolledBack => write!(f, "rolled back"),
        }
    }
}

/// A resource bound to a transaction, with the manager that created it
pub(crate) struct BoundResource {
    pub(crate) manager: Arc<dyn ErasedResourceManager>,
    pub(crate) resource: BoxedResource,
}

/// Mutable part of a transaction
pub(crate) struct TransactionState {
    pub(crate) status: TransactionStatus,
    /// Number of requests currently sharing this transaction
    pub(crate) ref_count: usize,
    /// Bound resources keyed by registry position
    pub(crate) resources: BTreeMap<usize, BoundResource>,
    pub(crate) rollback_cause: Option<String>,
}

struct TransactionInner {
    id: TransactionId,
    mode: TransactionMode,
    scope: Option<String>,
    active: bool,
    parent: Option<Transaction>,
    started: Instant,
    state: Mutex<TransactionState>,
}

/// A logical unit of work.
///
/// Cloning yields another handle to the same transaction; equality is identity.
/// A transaction belongs to the execution context that created it.
#[derive(Clone)]
pub struct Transaction {
    inner: Arc<TransactionInner>,
}

impl Transaction {
    pub(crate) fn new(
        id: TransactionId,
        mode: TransactionMode,
        scope: Option<String>,
        active: bool,
        parent: Option<Transaction>,
    ) -> Self {
        let status = if active {
            TransactionStatus::Active
        } else {
            TransactionStatus::Inactive
        };
        Self {
            inner: Arc::new(TransactionInner {
                id,
                mode,
                scope,
                active,
                parent,
                started: Instant::now(),
                state: Mutex::new(TransactionState {
                    status,
                    ref_count: 1,
                    resources: BTreeMap::new(),
                    rollback_cause: None,
                }),
            }),
        }
    }

    pub fn id(&self) -> TransactionId {
        self.inner.id
    }

    pub fn mode(&self) -> &TransactionMode {
        &self.inner.mode
    }

    /// Scope slot the transaction is ambient in (`None` = unscoped)
    pub fn scope(&self) -> Option<&str> {
        self.inner.scope.as_deref()
    }

    pub fn status(&self) -> TransactionStatus {
        self.inner.state.lock().status
    }

    pub fn ref_count(&self) -> usize {
        self.inner.state.lock().ref_count
    }

    /// True if this transaction was started as a real transaction,
    /// i.e. its resources begin underlying transactions.
    pub fn is_active(&self) -> bool {
        self.inner.active
    }

    pub fn is_no_transaction(&self) -> bool {
        !self.inner.active
    }

    pub fn is_completed(&self) -> bool {
        self.status().is_completed()
    }

    pub fn is_rollback_only(&self) -> bool {
        self.status() == TransactionStatus::RollbackOnly
    }

    /// Mark this transaction, and every transaction it is nested in, rollback-only.
    pub fn set_rollback_only(&self) {
        self.mark_rollback_only(None);
    }

    /// Message of the error that caused the transaction to be marked rollback-only
    pub fn rollback_cause(&self) -> Option<String> {
        self.inner.state.lock().rollback_cause.clone()
    }

    /// Parent transaction of a NESTED child
    pub fn parent(&self) -> Option<&Transaction> {
        self.inner.parent.as_ref()
    }

    /// The top-level transaction that owns the resources of this one
    pub fn owner(&self) -> &Transaction {
        let mut current = self;
        while let Some(parent) = current.parent() {
            current = parent;
        }
        current
    }

    /// Number of resources bound to the owning transaction
    pub fn resource_count(&self) -> usize {
        self.owner().inner.state.lock().resources.len()
    }

    /// Time since the transaction was created
    pub fn elapsed(&self) -> Duration {
        self.inner.started.elapsed()
    }

    /// True if both handles refer to the same transaction
    pub fn same(a: &Transaction, b: &Transaction) -> bool {
        Arc::ptr_eq(&a.inner, &b.inner)
    }

    pub(crate) fn state(&self) -> MutexGuard<'_, TransactionState> {
        self.inner.state.lock()
    }

    /// Add a joiner
    pub(crate) fn join(&self) -> usize {
        let mut state = self.state();
        state.ref_count += 1;
        state.ref_count
    }

    pub(crate) fn suspend(&self) {
        let mut state = self.state();
        if state.status == TransactionStatus::Active {
            state.status = TransactionStatus::Suspended;
        }
    }

    pub(crate) fn resume(&self) {
        let mut state = self.state();
        if state.status == TransactionStatus::Suspended {
            state.status = TransactionStatus::Active;
        }
    }

    /// Mark this transaction and its ancestors rollback-only, keeping the first cause.
    pub(crate) fn mark_rollback_only(&self, cause: Option<String>) {
        let mut current = Some(self);
        while let Some(tx) = current {
            {
                let mut state = tx.state();
                if matches!(
                    state.status,
                    TransactionStatus::Active | TransactionStatus::Suspended
                ) {
                    state.status = TransactionStatus::RollbackOnly;
                }
                if state.rollback_cause.is_none() {
                    state.rollback_cause = cause.clone();
                }
            }
            current = tx.parent();
        }
    }
}

impl PartialEq for Transaction {
    fn eq(&self, other: &Self) -> bool {
        Transaction::same(self, other)
    }
}

impl Eq for Transaction {}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state();
        f.debug_struct("Transaction")
            .field("id", &self.inner.id)
            .field("mode", &self.inner.mode)
            .field("scope", &self.inner.scope)
            .field("status", &state.status)
            .field("ref_count", &state.ref_count)
            .field("resources", &state.resources.len())
            .field("parent", &self.inner.parent.as_ref().map(|p| p.id()))
            .finish()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.inner.id)
    }
}
