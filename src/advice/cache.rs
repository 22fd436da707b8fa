use std::collections::HashMap;

use parking_lot::RwLock;

use super::metadata::{MetadataProvider, MethodFingerprint};
use crate::transaction::TransactionMode;

/// Resolved transaction modes, computed once per call site
#[derive(Debug, Default)]
pub struct MetadataCache {
    modes: RwLock<HashMap<MethodFingerprint, TransactionMode>>,
}

impl MetadataCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Mode for `method`, asking `provider` on first use.
    ///
    /// Methods without metadata resolve to `default`.
    pub fn resolve(
        &self,
        method: &MethodFingerprint,
        provider: &dyn MetadataProvider,
        default: &TransactionMode,
    ) -> TransactionMode {
        if let Some(mode) = self.modes.read().get(method) {
            return *mode;
        }

        let mode = match provider.metadata(method) {
            Some(annotation) => annotation.resolve(default),
            None => *default,
        };

        // A concurrent first call may have filled the entry already; keep it
        let mut modes = self.modes.write();
        let cached = *modes.entry(method.clone()).or_insert(mode);
        log::debug!("Cached transaction mode for {}: {}", method, cached);
        cached
    }

    pub fn contains(&self, method: &MethodFingerprint) -> bool {
        self.modes.read().contains_key(method)
    }

    pub fn len(&self) -> usize {
        self.modes.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.read().is_empty()
    }

    pub fn clear(&self) {
        self.modes.write().clear();
    }
}
