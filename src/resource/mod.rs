//! Resource managers for jtx
//!
//! Every transactional resource type is driven through a [`ResourceManager`]:
//! - `begin_transaction`: create a resource bound to one transaction
//! - `commit_transaction` / `rollback_transaction`: finish and release it
//! - `close`: release manager-wide state at shutdown
//!
//! Resource managers are registered once, at startup, into the transaction
//! manager. Registration order is significant: resources commit in that order
//! and roll back in reverse.

pub mod handler;
pub(crate) mod registry;

pub use handler::ResourceManager;

use std::any::TypeId;
use std::fmt;
use std::hash::{Hash, Hasher};

/// Exclusive access to a resource bound to a transaction.
///
/// Owns its lock, so it does not borrow the transaction it came from. The
/// transaction cannot complete while a guard of one of its resources is alive.
pub type ResourceGuard<R> = parking_lot::lock_api::ArcMutexGuard<parking_lot::RawMutex, R>;

/// Identifies the resource type a manager is responsible for.
/// Equality and hashing use the type only; the name is informational.
#[derive(Debug, Clone, Copy)]
pub struct ResourceType {
    id: TypeId,
    name: &'static str,
}

impl ResourceType {
    pub fn new(id: TypeId, name: &'static str) -> Self {
        Self { id, name }
    }

    /// Resource type of `R`
    pub fn of<R: 'static>() -> Self {
        Self::new(TypeId::of::<R>(), std::any::type_name::<R>())
    }

    pub fn id(&self) -> TypeId {
        self.id
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl PartialEq for ResourceType {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for ResourceType {}

impl Hash for ResourceType {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for ResourceType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.name)
    }
}
