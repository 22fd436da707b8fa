//! Declarative transaction metadata.
//!
//! Call sites are identified by a [`MethodFingerprint`]. A [`MetadataProvider`]
//! maps fingerprints to an optional [`TransactionAnnotation`]; where the
//! annotations come from (code, config maps, JSON files) is up to the provider.

use std::collections::HashMap;
use std::fmt;
use std::path::Path;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::error::{JtxError, Result};
use crate::transaction::{IsolationLevel, PropagationBehavior, TransactionMode};

/// Identity of an intercepted call site
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodFingerprint {
    pub type_name: String,
    pub method_name: String,
    /// Distinguishes overloads sharing a method name
    pub signature: Option<String>,
}

impl MethodFingerprint {
    pub fn new(type_name: impl Into<String>, method_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            method_name: method_name.into(),
            signature: None,
        }
    }

    /// Fingerprint for a method of `T`, named by its short type name
    /// (module path and generic arguments stripped).
    pub fn of<T: ?Sized>(method_name: impl Into<String>) -> Self {
        Self::new(short_type_name::<T>(), method_name)
    }

    pub fn with_signature(mut self, signature: impl Into<String>) -> Self {
        self.signature = Some(signature.into());
        self
    }

    /// `"Type#method"`
    pub fn method_key(&self) -> String {
        format!("{}#{}", self.type_name, self.method_name)
    }

    /// `"Type#method(signature)"`, if a signature is known
    pub fn signature_key(&self) -> Option<String> {
        self.signature
            .as_ref()
            .map(|sig| format!("{}({})", self.method_key(), sig))
    }
}

impl fmt::Display for MethodFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.signature_key() {
            Some(key) => write!(f, "{}", key),
            None => write!(f, "{}", self.method_key()),
        }
    }
}

fn short_type_name<T: ?Sized>() -> &'static str {
    let full = std::any::type_name::<T>();
    let base = full.split('<').next().unwrap_or(full);
    base.rsplit("::").next().unwrap_or(base)
}

/// Declared transaction attributes of a call site.
///
/// Unset attributes fall back to the configured default mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct TransactionAnnotation {
    pub propagation: Option<PropagationBehavior>,
    pub isolation: Option<IsolationLevel>,
    pub read_only: Option<bool>,
    /// Timeout in seconds
    pub timeout: Option<u32>,
}

impl TransactionAnnotation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn propagation(mut self, propagation: PropagationBehavior) -> Self {
        self.propagation = Some(propagation);
        self
    }

    pub fn isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = Some(isolation);
        self
    }

    pub fn read_only(mut self, read_only: bool) -> Self {
        self.read_only = Some(read_only);
        self
    }

    pub fn timeout(mut self, seconds: u32) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Complete this annotation into a mode
    pub fn resolve(&self, default: &TransactionMode) -> TransactionMode {
        TransactionMode {
            propagation: self.propagation.unwrap_or(default.propagation),
            isolation: self.isolation.unwrap_or(default.isolation),
            read_only: self.read_only.unwrap_or(default.read_only),
            timeout: self.timeout.or(default.timeout),
        }
    }
}

/// Source of declarative metadata
pub trait MetadataProvider: Send + Sync {
    /// Annotation declared for `method`, if any
    fn metadata(&self, method: &MethodFingerprint) -> Option<TransactionAnnotation>;
}

impl<F> MetadataProvider for F
where
    F: Fn(&MethodFingerprint) -> Option<TransactionAnnotation> + Send + Sync,
{
    fn metadata(&self, method: &MethodFingerprint) -> Option<TransactionAnnotation> {
        self(method)
    }
}

/// Explicit metadata map.
///
/// Keys are `"Type#method(signature)"`, `"Type#method"` or `"Type"`; the most
/// specific key present wins.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MetadataTable {
    entries: HashMap<String, TransactionAnnotation>,
}

impl MetadataTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Annotate every method of a type
    pub fn with_type(mut self, type_name: &str, annotation: TransactionAnnotation) -> Self {
        self.entries.insert(type_name.to_string(), annotation);
        self
    }

    /// Annotate one method (all overloads)
    pub fn with_method(
        mut self,
        type_name: &str,
        method_name: &str,
        annotation: TransactionAnnotation,
    ) -> Self {
        self.entries
            .insert(format!("{}#{}", type_name, method_name), annotation);
        self
    }

    /// Annotate the call site identified by `method`, signature included
    pub fn with_fingerprint(
        mut self,
        method: &MethodFingerprint,
        annotation: TransactionAnnotation,
    ) -> Self {
        let key = method.signature_key().unwrap_or_else(|| method.method_key());
        self.entries.insert(key, annotation);
        self
    }

    pub fn insert(&mut self, key: impl Into<String>, annotation: TransactionAnnotation) {
        self.entries.insert(key.into(), annotation);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Parse a table from a JSON object of key → annotation
    pub fn from_json_str(json: &str) -> Result<Self> {
        let table: MetadataTable = serde_json::from_str(json)?;
        if let Some(key) = table.entries.keys().find(|k| !valid_key(k)) {
            return Err(JtxError::Metadata(format!("invalid metadata key '{}'", key)));
        }
        Ok(table)
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

fn valid_key(key: &str) -> bool {
    let mut parts = key.splitn(2, '#');
    let type_name = parts.next().unwrap_or("");
    if type_name.is_empty() || type_name.contains(['(', ')']) {
        return false;
    }
    match parts.next() {
        None => true,
        Some(rest) => match rest.find('(') {
            None => !rest.is_empty() && !rest.contains(')'),
            Some(open) => open > 0 && rest.ends_with(')'),
        },
    }
}

impl MetadataProvider for MetadataTable {
    fn metadata(&self, method: &MethodFingerprint) -> Option<TransactionAnnotation> {
        method
            .signature_key()
            .and_then(|key| self.entries.get(&key))
            .or_else(|| self.entries.get(&method.method_key()))
            .or_else(|| self.entries.get(&method.type_name))
            .copied()
    }
}

/// Asks each provider in turn; the first annotation found wins
#[derive(Clone, Default)]
pub struct ChainedMetadataProvider {
    providers: Vec<Arc<dyn MetadataProvider>>,
}

impl ChainedMetadataProvider {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, provider: impl MetadataProvider + 'static) -> Self {
        self.providers.push(Arc::new(provider));
        self
    }

    pub fn push(&mut self, provider: Arc<dyn MetadataProvider>) {
        self.providers.push(provider);
    }

    pub fn len(&self) -> usize {
        self.providers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}

impl MetadataProvider for ChainedMetadataProvider {
    fn metadata(&self, method: &MethodFingerprint) -> Option<TransactionAnnotation> {
        self.providers.iter().find_map(|p| p.metadata(method))
    }
}

impl fmt::Debug for ChainedMetadataProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChainedMetadataProvider")
            .field("providers", &self.providers.len())
            .finish()
    }
}
