//! Transaction modes: propagation behavior, isolation level, read-only flag and timeout.

use std::fmt;

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};

/// Propagation behavior selection
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PropagationBehavior {
    /// Join the ambient transaction, or start a new one when there is none.
    #[default]
    Required,
    /// Join the ambient transaction, or run without one.
    Supports,
    /// Join the ambient transaction; fail when there is none.
    Mandatory,
    /// Always start a new transaction, suspending the ambient one.
    RequiresNew,
    /// Always run without a transaction, suspending the ambient one.
    NotSupported,
    /// Run without a transaction; fail when there is an ambient one.
    Never,
    /// Start a child of the ambient transaction, or a new one when there is none.
    Nested,
}

impl fmt::Display for PropagationBehavior {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PropagationBehavior::Required => write!(f, "Required"),
            PropagationBehavior::Supports => write!(f, "Supports"),
            PropagationBehavior::Mandatory => write!(f, "Mandatory"),
            PropagationBehavior::RequiresNew => write!(f, "RequiresNew"),
            PropagationBehavior::NotSupported => write!(f, "NotSupported"),
            PropagationBehavior::Never => write!(f, "Never"),
            PropagationBehavior::Nested => write!(f, "Nested"),
        }
    }
}

impl PropagationBehavior {
    const NAMES: &'static [&'static str] = &[
        "REQUIRED",
        "SUPPORTS",
        "MANDATORY",
        "REQUIRES_NEW",
        "NOT_SUPPORTED",
        "NEVER",
        "NESTED",
    ];

    /// Parse a behavior from its name (case-insensitive, underscores optional)
    pub fn from_name(name: &str) -> Option<Self> {
        match normalize(name).as_str() {
            "REQUIRED" => Some(PropagationBehavior::Required),
            "SUPPORTS" => Some(PropagationBehavior::Supports),
            "MANDATORY" => Some(PropagationBehavior::Mandatory),
            "REQUIRESNEW" => Some(PropagationBehavior::RequiresNew),
            "NOTSUPPORTED" => Some(PropagationBehavior::NotSupported),
            "NEVER" => Some(PropagationBehavior::Never),
            "NESTED" => Some(PropagationBehavior::Nested),
            _ => None,
        }
    }
}

/// Isolation level requested from resource managers.
///
/// Advisory only: each resource manager decides how (and whether) to apply it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IsolationLevel {
    /// Whatever the resource manager uses by default
    #[default]
    Default,
    None,
    ReadUncommitted,
    ReadCommitted,
    RepeatableRead,
    Serializable,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::Default => write!(f, "Default"),
            IsolationLevel::None => write!(f, "None"),
            IsolationLevel::ReadUncommitted => write!(f, "ReadUncommitted"),
            IsolationLevel::ReadCommitted => write!(f, "ReadCommitted"),
            IsolationLevel::RepeatableRead => write!(f, "RepeatableRead"),
            IsolationLevel::Serializable => write!(f, "Serializable"),
        }
    }
}

impl IsolationLevel {
    const NAMES: &'static [&'static str] = &[
        "DEFAULT",
        "NONE",
        "READ_UNCOMMITTED",
        "READ_COMMITTED",
        "REPEATABLE_READ",
        "SERIALIZABLE",
    ];

    /// Parse an isolation level from its name (case-insensitive, underscores optional)
    pub fn from_name(name: &str) -> Option<Self> {
        match normalize(name).as_str() {
            "DEFAULT" => Some(IsolationLevel::Default),
            "NONE" => Some(IsolationLevel::None),
            "READUNCOMMITTED" => Some(IsolationLevel::ReadUncommitted),
            "READCOMMITTED" => Some(IsolationLevel::ReadCommitted),
            "REPEATABLEREAD" => Some(IsolationLevel::RepeatableRead),
            "SERIALIZABLE" => Some(IsolationLevel::Serializable),
            _ => None,
        }
    }
}

// Configuration and metadata accept the same spellings as `from_name`
impl<'de> Deserialize<'de> for PropagationBehavior {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::from_name(&name).ok_or_else(|| de::Error::unknown_variant(&name, Self::NAMES))
    }
}

impl<'de> Deserialize<'de> for IsolationLevel {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        Self::from_name(&name).ok_or_else(|| de::Error::unknown_variant(&name, Self::NAMES))
    }
}

fn normalize(name: &str) -> String {
    name.chars()
        .filter(|c| *c != '_' && *c != '-')
        .collect::<String>()
        .to_uppercase()
}

/// Immutable description of how a unit of work must be demarcated.
///
/// `timeout` is in seconds; `None` means no timeout. It is forwarded to
/// resource managers and never enforced by the transaction manager itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct TransactionMode {
    pub propagation: PropagationBehavior,
    pub isolation: IsolationLevel,
    pub read_only: bool,
    pub timeout: Option<u32>,
}

impl TransactionMode {
    pub fn new(propagation: PropagationBehavior) -> Self {
        Self {
            propagation,
            ..Self::default()
        }
    }

    pub fn required() -> Self {
        Self::new(PropagationBehavior::Required)
    }

    pub fn supports() -> Self {
        Self::new(PropagationBehavior::Supports)
    }

    pub fn mandatory() -> Self {
        Self::new(PropagationBehavior::Mandatory)
    }

    pub fn requires_new() -> Self {
        Self::new(PropagationBehavior::RequiresNew)
    }

    pub fn not_supported() -> Self {
        Self::new(PropagationBehavior::NotSupported)
    }

    pub fn never() -> Self {
        Self::new(PropagationBehavior::Never)
    }

    pub fn nested() -> Self {
        Self::new(PropagationBehavior::Nested)
    }

    pub fn with_propagation(mut self, propagation: PropagationBehavior) -> Self {
        self.propagation = propagation;
        self
    }

    pub fn with_isolation(mut self, isolation: IsolationLevel) -> Self {
        self.isolation = isolation;
        self
    }

    pub fn with_read_only(mut self, read_only: bool) -> Self {
        self.read_only = read_only;
        self
    }

    pub fn with_timeout(mut self, seconds: Option<u32>) -> Self {
        self.timeout = seconds;
        self
    }
}

impl fmt::Display for TransactionMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "jtx{{{},{},{},timeout=",
            self.propagation,
            self.isolation,
            if self.read_only { "readOnly" } else { "readWrite" }
        )?;
        match self.timeout {
            Some(seconds) => write!(f, "{}s}}", seconds),
            None => write!(f, "none}}"),
        }
    }
}
