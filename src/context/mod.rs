//! Execution contexts
//!
//! A [`TransactionContext`] holds the ambient transactions of one execution
//! context (a thread, a task, a request handler...). It is an explicit value
//! owned by that context and passed by `&mut` into the transaction manager.
//!
//! Ambient transactions are kept as one stack per scope slot: starting a
//! transaction pushes it, completing it pops it and resumes whatever it
//! suspended. The top of a slot's stack is the ambient transaction of that slot.

pub mod task;

use std::collections::HashMap;

use crate::transaction::Transaction;

/// Ambient transaction stacks of one execution context
#[derive(Debug, Default)]
pub struct TransactionContext {
    /// Scope slot -> stack of transactions, innermost last
    stacks: HashMap<Option<String>, Vec<Transaction>>,
}

impl TransactionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ambient transaction of a scope slot
    pub fn current(&self, slot: Option<&str>) -> Option<&Transaction> {
        self.stacks
            .get(&slot.map(str::to_owned))
            .and_then(|stack| stack.last())
    }

    pub(crate) fn push(&mut self, slot: Option<String>, tx: Transaction) {
        self.stacks.entry(slot).or_default().push(tx);
    }

    /// True if `tx` is the innermost transaction of its slot
    pub(crate) fn is_current(&self, tx: &Transaction) -> bool {
        self.current(tx.scope()).map_or(false, |top| top == tx)
    }

    /// Pop `tx` off its slot and return the transaction that becomes ambient.
    pub(crate) fn pop(&mut self, tx: &Transaction) -> Option<Transaction> {
        let slot = tx.scope().map(str::to_owned);
        let stack = self.stacks.get_mut(&slot)?;
        if stack.last() != Some(tx) {
            return None;
        }
        stack.pop();
        let restored = stack.last().cloned();
        if stack.is_empty() {
            self.stacks.remove(&slot);
        }
        restored
    }

    /// Number of transactions on all stacks
    pub fn total_transactions(&self) -> usize {
        self.stacks.values().map(Vec::len).sum()
    }

    /// Number of real, not yet completed transactions on all stacks
    pub fn total_active_transactions(&self) -> usize {
        self.stacks
            .values()
            .flatten()
            .filter(|tx| tx.is_active() && !tx.is_completed())
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.stacks.is_empty()
    }
}
