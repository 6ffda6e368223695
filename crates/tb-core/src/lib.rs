//! TrackerBlock Core Library
//!
//! This crate provides the runtime side of the TrackerBlock content blocker:
//! the compiled rule set, the matching engine, surrogate scripts, per-page
//! request interception and statistics.
//!
//! # Architecture
//!
//! A tracker dataset is compiled (by `tb-compiler`) into an immutable
//! [`CompiledRuleSet`] that is published into an [`Engine`]. Every page
//! session evaluates its resource loads against whichever rule set is
//! current; publishing a new one is a single atomic swap and never blocks
//! evaluation.
//!
//! # Modules
//!
//! - `types`: Resource types, tracker actions, request context, decisions
//! - `url`: Host extraction without allocation
//! - `psl`: Public Suffix List for registrable-domain extraction
//! - `pattern`: Bounded regex compilation for tracker patterns
//! - `ruleset`: Compiled rule set and its builder
//! - `surrogate`: Surrogate script registry
//! - `matcher`: Core request matching
//! - `engine`: Hot-swappable engine shared by page sessions
//! - `interceptor`: Per-page interception state machine
//! - `stats`: Block/allow counters
//! - `config`: Engine configuration
//! - `error`: Diagnostics and error types

pub mod config;
pub mod engine;
pub mod error;
pub mod interceptor;
pub mod matcher;
pub mod pattern;
pub mod psl;
pub mod ruleset;
pub mod stats;
pub mod surrogate;
pub mod types;
pub mod url;

// Re-export commonly used types
pub use config::{CompileLimits, EngineConfig, InterceptorConfig, PendingPolicy};
pub use engine::Engine;
pub use error::{ConfigError, DiagnosticKind, HostError, RuleDiagnostic};
pub use interceptor::{BatchSummary, Enforcement, LoadOrigin, PageHost, PageSession, ResourceLoad, SessionState};
pub use matcher::{evaluate, Matcher};
pub use psl::SuffixList;
pub use ruleset::{CompiledRule, CompiledRuleSet, ExceptionDomains};
pub use stats::{StatisticsCollector, StatsSnapshot};
pub use surrogate::{SurrogateEntry, SurrogateRegistry, SurrogateSeed};
pub use types::{Decision, RequestContext, ResourceType, ResourceTypes, TrackerAction};
