//! TrackerBlock Dataset Compiler
//!
//! This crate turns a tracker-intelligence dataset (JSON) into the
//! `CompiledRuleSet` the `tb-core` engine matches against, and publishes
//! new versions into a running `Engine`.

pub mod builder;
pub mod parser;
pub mod reload;

pub use builder::{compile, compile_rule, compile_with, CompileResult};
pub use parser::{parse_dataset, DatasetError, MatchRule, RuleDataset, TrackerRecord};
pub use reload::{reload, DatasetLoader, LoadReport};
