use std::sync::Arc;

use crate::error::ResourceError;
use crate::transaction::TransactionMode;

/// Trait defining the standard interface for all transactional resource types.
/// The transaction manager drives every registered resource manager through this
/// uniform API, regardless of what the resource is (database session, message
/// queue producer, in-memory journal...).
///
/// A resource manager owns the lifecycle of the resources of one type. The
/// transaction manager binds at most one resource per transaction, lazily, on
/// the first request for it.
pub trait ResourceManager: Send + Sync + 'static {
    /// The resource handed out to units of work
    type Resource: Send + 'static;

    /// Human-readable name of the resource type, used in errors and logs
    fn resource_name(&self) -> &'static str {
        std::any::type_name::<Self::Resource>()
    }

    /// Create a resource for a transaction.
    ///
    /// When `active` is false the resource must still be usable (e.g. for reads),
    /// but no underlying transaction may be started.
    fn begin_transaction(
        &self,
        mode: &TransactionMode,
        active: bool,
    ) -> Result<Self::Resource, ResourceError>;

    /// Commit the work done through the resource and release it.
    /// Must be a no-op for resources that never began a transaction.
    fn commit_transaction(&self, resource: Self::Resource) -> Result<(), ResourceError>;

    /// Roll back the work done through the resource and release it.
    /// Must be a no-op for resources that never began a transaction.
    fn rollback_transaction(&self, resource: Self::Resource) -> Result<(), ResourceError>;

    /// Release manager-wide resources. Called once, when the transaction manager closes.
    fn close(&self) -> Result<(), ResourceError> {
        Ok(()) // Default: nothing to release
    }
}

impl<M: ResourceManager> ResourceManager for Arc<M> {
    type Resource = M::Resource;

    fn resource_name(&self) -> &'static str {
        (**self).resource_name()
    }

    fn begin_transaction(
        &self,
        mode: &TransactionMode,
        active: bool,
    ) -> Result<Self::Resource, ResourceError> {
        (**self).begin_transaction(mode, active)
    }

    fn commit_transaction(&self, resource: Self::Resource) -> Result<(), ResourceError> {
        (**self).commit_transaction(resource)
    }

    fn rollback_transaction(&self, resource: Self::Resource) -> Result<(), ResourceError> {
        (**self).rollback_transaction(resource)
    }

    fn close(&self) -> Result<(), ResourceError> {
        (**self).close()
    }
}
