//! Transaction management
//!
//! - `mode`: propagation behavior, isolation level and the immutable `TransactionMode`
//! - `propagation`: the pure decision table behind every transaction request
//! - `types`: transaction identity, status and the `Transaction` aggregate
//! - `manager`: the `TransactionManager`, which owns the resource registry and
//!   drives transactions through their lifecycle

pub mod manager;
pub mod mode;
pub mod propagation;
pub mod types;

// Public API
pub use manager::{TransactionManager, TransactionManagerConfig};
pub use mode::{IsolationLevel, PropagationBehavior, TransactionMode};
pub use propagation::{decide, PropagationAction};
pub use types::{Transaction, TransactionId, TransactionStatus};
