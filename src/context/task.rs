//! Task-local transaction contexts for tokio callers.
//!
//! `scope` gives a future its own [`TransactionContext`]; code running inside
//! that future reaches it through `with_current`. Each spawned task needs its
//! own `scope`, so contexts never leak between tasks.

use std::cell::RefCell;
use std::future::Future;

use super::TransactionContext;
use crate::error::{JtxError, Result};

tokio::task_local! {
    static CURRENT: RefCell<TransactionContext>;
}

/// Run `future` with a fresh task-local transaction context.
pub async fn scope<F: Future>(future: F) -> F::Output {
    CURRENT
        .scope(RefCell::new(TransactionContext::new()), future)
        .await
}

/// Borrow the task-local transaction context.
///
/// Fails with `NoExecutionContext` outside of [`scope`], and with
/// `ContextInUse` when called re-entrantly from inside `f`.
pub fn with_current<R>(f: impl FnOnce(&mut TransactionContext) -> R) -> Result<R> {
    CURRENT
        .try_with(|cell| {
            let mut ctx = cell.try_borrow_mut().map_err(|_| JtxError::ContextInUse)?;
            Ok(f(&mut ctx))
        })
        .map_err(|_| JtxError::NoExecutionContext)?
}
