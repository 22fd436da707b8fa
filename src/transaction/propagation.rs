//! Propagation decisions.
//!
//! Maps a propagation behavior and the presence of an ambient transaction to
//! the action the transaction manager must take. Pure: no manager state is
//! read or written here.

use std::fmt;

use super::mode::PropagationBehavior;

/// What a transaction request must do
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PropagationAction {
    /// Share the ambient transaction (reference count + 1)
    JoinExisting,
    /// Start a fresh transaction
    StartNew,
    /// Produce an inactive transaction with no underlying resource transaction
    RunWithoutTransaction,
    /// Suspend the ambient transaction, then start a fresh one
    SuspendAndStartNew,
    /// Suspend the ambient transaction, then run without a transaction
    SuspendAndRunWithoutTransaction,
    /// Start a child transaction whose parent is the ambient one
    StartNestedChild,
    /// Fail: a transaction was required but none exists
    FailNoTransaction,
    /// Fail: a transaction exists but none is allowed
    FailExistingTransaction,
}

impl PropagationAction {
    /// True if the ambient transaction gets suspended
    pub fn suspends_ambient(&self) -> bool {
        matches!(
            self,
            PropagationAction::SuspendAndStartNew
                | PropagationAction::SuspendAndRunWithoutTransaction
        )
    }

    /// True if the created transaction begins real resource transactions
    pub fn starts_active(&self) -> bool {
        matches!(
            self,
            PropagationAction::StartNew
                | PropagationAction::SuspendAndStartNew
                | PropagationAction::StartNestedChild
        )
    }
}

impl fmt::Display for PropagationAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PropagationAction::JoinExisting => "join existing",
            PropagationAction::StartNew => "start new",
            PropagationAction::RunWithoutTransaction => "run without transaction",
            PropagationAction::SuspendAndStartNew => "suspend and start new",
            PropagationAction::SuspendAndRunWithoutTransaction => {
                "suspend and run without transaction"
            }
            PropagationAction::StartNestedChild => "start nested child",
            PropagationAction::FailNoTransaction => "fail (no transaction)",
            PropagationAction::FailExistingTransaction => "fail (existing transaction)",
        };
        write!(f, "{}", name)
    }
}

/// Decide the action for a request with the given behavior.
pub fn decide(behavior: PropagationBehavior, has_ambient: bool) -> PropagationAction {
    use PropagationAction::*;
    use PropagationBehavior::*;

    match (behavior, has_ambient) {
        (Required, true) => JoinExisting,
        (Required, false) => StartNew,
        (Supports, true) => JoinExisting,
        (Supports, false) => RunWithoutTransaction,
        (Mandatory, true) => JoinExisting,
        (Mandatory, false) => FailNoTransaction,
        (RequiresNew, true) => SuspendAndStartNew,
        (RequiresNew, false) => StartNew,
        (NotSupported, true) => SuspendAndRunWithoutTransaction,
        (NotSupported, false) => RunWithoutTransaction,
        (Never, true) => FailExistingTransaction,
        (Never, false) => RunWithoutTransaction,
        (Nested, true) => StartNestedChild,
        (Nested, false) => StartNew,
    }
}
