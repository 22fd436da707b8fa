//! Scope resolution.
//!
//! A scope key partitions the ambient transactions of an execution context:
//! requests with different keys never join each other's transactions.
//! Keys are built from a pattern with `$class` and `$method` placeholders.

/// Pattern that gives every method its own scope
pub const DEFAULT_SCOPE_PATTERN: &str = "$class#$method";

const CLASS_PLACEHOLDER: &str = "$class";
const METHOD_PLACEHOLDER: &str = "$method";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeResolver {
    pattern: Option<String>,
}

impl ScopeResolver {
    /// Resolver for `pattern`; `None` maps every call to the unscoped slot
    pub fn new(pattern: Option<String>) -> Self {
        Self { pattern }
    }

    /// Resolver that scopes per method (`"$class#$method"`)
    pub fn per_method() -> Self {
        Self::new(Some(DEFAULT_SCOPE_PATTERN.to_string()))
    }

    /// Resolver that never scopes
    pub fn unscoped() -> Self {
        Self::new(None)
    }

    pub fn pattern(&self) -> Option<&str> {
        self.pattern.as_deref()
    }

    /// Scope key for a call to `method_name` on `type_name`
    pub fn resolve(&self, type_name: &str, method_name: &str) -> Option<String> {
        self.pattern.as_deref().map(|pattern| {
            pattern
                .replace(CLASS_PLACEHOLDER, type_name)
                .replace(METHOD_PLACEHOLDER, method_name)
        })
    }
}
