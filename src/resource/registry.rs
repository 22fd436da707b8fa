//! Ordered registry of resource managers.
//!
//! Registration order is the commit order; rollback walks it backwards.

use std::any::{Any, TypeId};
use std::sync::Arc;

use parking_lot::Mutex;

use super::handler::ResourceManager;
use super::ResourceType;
use crate::error::{JtxError, ResourceError, Result};
use crate::transaction::TransactionMode;

/// A resource as stored inside a transaction: an `Arc<Mutex<R>>`, type erased.
///
/// Each resource has its own lock so that several resources of one
/// transaction can be held at the same time.
pub(crate) type BoxedResource = Arc<dyn Any + Send + Sync>;

type ErasedResult<T> = std::result::Result<T, ResourceError>;

/// Object-safe view of a [`ResourceManager`], with the resource type erased.
pub(crate) trait ErasedResourceManager: Send + Sync {
    fn resource_type(&self) -> ResourceType;
    fn begin(&self, mode: &TransactionMode, active: bool) -> ErasedResult<BoxedResource>;
    fn commit(&self, resource: BoxedResource) -> ErasedResult<()>;
    fn rollback(&self, resource: BoxedResource) -> ErasedResult<()>;
    fn close(&self) -> ErasedResult<()>;
}

impl<M: ResourceManager> ErasedResourceManager for M {
    fn resource_type(&self) -> ResourceType {
        ResourceType::new(TypeId::of::<M::Resource>(), self.resource_name())
    }

    fn begin(&self, mode: &TransactionMode, active: bool) -> ErasedResult<BoxedResource> {
        let resource = self.begin_transaction(mode, active)?;
        Ok(Arc::new(Mutex::new(resource)))
    }

    fn commit(&self, resource: BoxedResource) -> ErasedResult<()> {
        let resource = take::<M::Resource>(resource, self.resource_name())?;
        self.commit_transaction(resource)
    }

    fn rollback(&self, resource: BoxedResource) -> ErasedResult<()> {
        let resource = take::<M::Resource>(resource, self.resource_name())?;
        self.rollback_transaction(resource)
    }

    fn close(&self) -> ErasedResult<()> {
        ResourceManager::close(self)
    }
}

/// Typed cell of a bound resource
pub(crate) fn cell<R: Send + 'static>(resource: &BoxedResource) -> Option<Arc<Mutex<R>>> {
    Arc::clone(resource).downcast::<Mutex<R>>().ok()
}

/// Unwrap a resource for completion; fails if it is still borrowed.
fn take<R: Send + 'static>(resource: BoxedResource, name: &str) -> ErasedResult<R> {
    let cell = resource
        .downcast::<Mutex<R>>()
        .map_err(|_| -> ResourceError { format!("resource is not a {}", name).into() })?;
    Arc::try_unwrap(cell)
        .map(Mutex::into_inner)
        .map_err(|_| format!("{} resource is still in use", name).into())
}

/// A registered manager together with its position in the registry
#[derive(Clone)]
pub(crate) struct RegisteredManager {
    pub(crate) position: usize,
    pub(crate) manager: Arc<dyn ErasedResourceManager>,
}

#[derive(Default)]
pub(crate) struct ResourceRegistry {
    managers: Vec<Arc<dyn ErasedResourceManager>>,
}

impl ResourceRegistry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.managers.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.managers.is_empty()
    }

    /// Append a manager; a resource type may only be registered once.
    pub(crate) fn register(
        &mut self,
        manager: Arc<dyn ErasedResourceManager>,
    ) -> Result<ResourceType> {
        let resource_type = manager.resource_type();
        if self.managers.iter().any(|m| m.resource_type() == resource_type) {
            return Err(JtxError::Configuration(format!(
                "resource manager for {} is already registered",
                resource_type
            )));
        }
        self.managers.push(manager);
        Ok(resource_type)
    }

    pub(crate) fn lookup(&self, id: TypeId) -> Option<RegisteredManager> {
        self.managers
            .iter()
            .position(|m| m.resource_type().id() == id)
            .map(|position| RegisteredManager {
                position,
                manager: Arc::clone(&self.managers[position]),
            })
    }

    pub(crate) fn resource_types(&self) -> Vec<ResourceType> {
        self.managers.iter().map(|m| m.resource_type()).collect()
    }

    /// Remove every manager, in registration order
    pub(crate) fn drain(&mut self) -> Vec<Arc<dyn ErasedResourceManager>> {
        std::mem::take(&mut self.managers)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Journal;
    struct Outbox;

    struct JournalManager;
    struct OutboxManager;

    impl ResourceManager for JournalManager {
        type Resource = Journal;

        fn begin_transaction(
            &self,
            _mode: &TransactionMode,
            _active: bool,
        ) -> ErasedResult<Journal> {
            Ok(Journal)
        }

        fn commit_transaction(&self, _resource: Journal) -> ErasedResult<()> {
            Ok(())
        }

        fn rollback_transaction(&self, _resource: Journal) -> ErasedResult<()> {
            Ok(())
        }
    }

    impl ResourceManager for OutboxManager {
        type Resource = Outbox;

        fn resource_name(&self) -> &'static str {
            "outbox"
        }

        fn begin_transaction(
            &self,
            _mode: &TransactionMode,
            _active: bool,
        ) -> ErasedResult<Outbox> {
            Ok(Outbox)
        }

        fn commit_transaction(&self, _resource: Outbox) -> ErasedResult<()> {
            Ok(())
        }

        fn rollback_transaction(&self, _resource: Outbox) -> ErasedResult<()> {
            Ok(())
        }
    }

    #[test]
    fn test_registration_order_is_kept() {
        let mut registry = ResourceRegistry::new();
        registry.register(Arc::new(JournalManager)).unwrap();
        registry.register(Arc::new(OutboxManager)).unwrap();

        assert_eq!(registry.len(), 2);
        assert_eq!(registry.lookup(TypeId::of::<Journal>()).unwrap().position, 0);
        assert_eq!(registry.lookup(TypeId::of::<Outbox>()).unwrap().position, 1);
        assert_eq!(registry.resource_types()[1].name(), "outbox");
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut registry = ResourceRegistry::new();
        registry.register(Arc::new(JournalManager)).unwrap();
        let err = registry.register(Arc::new(JournalManager)).unwrap_err();
        assert!(matches!(err, JtxError::Configuration(_)));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_lookup_unknown_type() {
        let registry = ResourceRegistry::new();
        assert!(registry.is_empty());
        assert!(registry.lookup(TypeId::of::<Journal>()).is_none());
    }

    #[test]
    fn test_erased_commit_rejects_foreign_resource() {
        let manager: Arc<dyn ErasedResourceManager> = Arc::new(JournalManager);
        let err = manager.commit(Arc::new(Mutex::new(Outbox))).unwrap_err();
        assert!(err.to_string().contains("is not a"));
    }

    #[test]
    fn test_erased_commit_rejects_borrowed_resource() {
        let manager: Arc<dyn ErasedResourceManager> = Arc::new(OutboxManager);
        let resource = manager.begin(&TransactionMode::required(), true).unwrap();
        let held = cell::<Outbox>(&resource).unwrap();
        let _guard = held.lock();

        let err = manager.commit(resource).unwrap_err();
        assert_eq!(err.to_string(), "outbox resource is still in use");
    }

    #[test]
    fn test_cell_is_typed() {
        let manager: Arc<dyn ErasedResourceManager> = Arc::new(JournalManager);
        let resource = manager.begin(&TransactionMode::required(), false).unwrap();
        assert!(cell::<Journal>(&resource).is_some());
        assert!(cell::<Outbox>(&resource).is_none());
        manager.rollback(resource).unwrap();
    }
}
