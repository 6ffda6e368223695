//! Dataset loading into a live engine.
//!
//! A load parses and compiles the new dataset entirely off to the side and
//! only then publishes it. A document that fails to parse leaves the
//! engine's current rule set in place.

use std::sync::Arc;

use tb_core::config::{CompileLimits, EngineConfig};
use tb_core::engine::Engine;
use tb_core::error::RuleDiagnostic;
use tb_core::psl::SuffixList;

use crate::builder::compile_with;
use crate::parser::{parse_dataset, DatasetError, RuleDataset};

/// What a successful load published.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadReport {
    pub version: String,
    pub domain_count: usize,
    pub rule_count: usize,
    pub diagnostics: Vec<RuleDiagnostic>,
}

/// Compiles datasets and publishes them into an [`Engine`].
#[derive(Debug, Clone, Default)]
pub struct DatasetLoader {
    limits: CompileLimits,
    suffixes: Option<Arc<SuffixList>>,
}

impl DatasetLoader {
    pub fn new(limits: CompileLimits) -> Self {
        Self { limits, suffixes: None }
    }

    pub fn from_config(config: &EngineConfig) -> Self {
        Self::new(config.compile.clone())
    }

    /// Use a host-supplied public suffix list for every rule set this
    /// loader builds.
    pub fn with_suffix_list(mut self, suffixes: SuffixList) -> Self {
        self.suffixes = Some(Arc::new(suffixes));
        self
    }

    pub fn limits(&self) -> &CompileLimits {
        &self.limits
    }

    /// Parse, compile and publish a JSON dataset.
    ///
    /// On a [`DatasetError`] nothing is published.
    pub fn load_json(&self, engine: &Engine, text: &str) -> Result<LoadReport, DatasetError> {
        let dataset = match parse_dataset(text) {
            Ok(dataset) => dataset,
            Err(e) => {
                log::error!(
                    "Rejected dataset update ({}), keeping rule set version {:?}",
                    e,
                    engine.version()
                );
                return Err(e);
            }
        };
        Ok(self.load(engine, &dataset))
    }

    /// Compile and publish an already parsed dataset.
    pub fn load(&self, engine: &Engine, dataset: &RuleDataset) -> LoadReport {
        let result = compile_with(dataset, &self.limits, self.suffixes.clone());
        let report = LoadReport {
            version: result.rule_set.version().to_string(),
            domain_count: result.rule_set.domain_count(),
            rule_count: result.rule_set.rule_count(),
            diagnostics: result.diagnostics,
        };

        engine.publish(result.rule_set);
        log::info!(
            "Loaded dataset {:?}: {} domains, {} rules, {} skipped",
            report.version,
            report.domain_count,
            report.rule_count,
            report.diagnostics.len()
        );
        report
    }
}

/// Load a JSON dataset into `engine` with default limits.
pub fn reload(engine: &Engine, text: &str) -> Result<LoadReport, DatasetError> {
    DatasetLoader::default().load_json(engine, text)
}
