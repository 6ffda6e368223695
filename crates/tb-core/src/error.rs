//! Error and diagnostic types.

use std::fmt;

/// Why a single rule (or surrogate pattern) was skipped.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DiagnosticKind {
    #[error("invalid pattern: {0}")]
    InvalidPattern(String),
    #[error("pattern is {len} bytes, limit is {max}")]
    PatternTooLong { len: usize, max: usize },
    #[error("pattern has a quantified group containing another quantifier")]
    NestedQuantifier,
    #[error("unknown resource type: {0}")]
    UnknownResourceType(String),
    #[error("tracker record has an empty domain")]
    EmptyDomain,
    #[error("empty pattern")]
    EmptyPattern,
}

/// A skipped rule. Compilation carries on without it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuleDiagnostic {
    /// Tracker domain (or surrogate name) the rule belonged to
    pub owner: String,
    /// Index of the rule within its record, `None` when the whole record
    /// was skipped
    pub rule_index: Option<usize>,
    /// The offending pattern, if any
    pub pattern: Option<String>,
    pub kind: DiagnosticKind,
}

impl fmt::Display for RuleDiagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.owner)?;
        if let Some(index) = self.rule_index {
            write!(f, " rule #{}", index)?;
        }
        if let Some(pattern) = &self.pattern {
            write!(f, " ({:?})", pattern)?;
        }
        write!(f, ": {}", self.kind)
    }
}

/// Failure reported by a host primitive.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HostError {
    #[error("page context is gone")]
    PageGone,
    #[error("host rejected the operation: {0}")]
    Rejected(String),
}

/// Error type for configuration loading.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid configuration: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid configuration value for `{field}`: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}
