//! Rule compiler: RuleDataset -> CompiledRuleSet.
//!
//! A single pass over the dataset. Each record's rules are compiled in
//! order and appended under the record's domain; rules that cannot be
//! compiled are skipped and reported as diagnostics. The dataset itself is
//! only borrowed.

use std::sync::Arc;

use tb_core::config::CompileLimits;
use tb_core::error::{DiagnosticKind, RuleDiagnostic};
use tb_core::pattern::compile_pattern;
use tb_core::psl::SuffixList;
use tb_core::ruleset::{CompiledRule, CompiledRuleSet, ExceptionDomains};
use tb_core::types::{ResourceType, ResourceTypes, TrackerAction};

use crate::parser::{MatchRule, RuleDataset};

/// Output of a compile: the rule set plus every skipped rule.
#[derive(Debug)]
pub struct CompileResult {
    pub rule_set: CompiledRuleSet,
    pub diagnostics: Vec<RuleDiagnostic>,
}

/// Compile with default limits and the embedded suffix list.
pub fn compile(dataset: &RuleDataset) -> CompileResult {
    compile_with(dataset, &CompileLimits::default(), None)
}

/// Compile with explicit limits, optionally attaching a host-supplied
/// public suffix list.
pub fn compile_with(
    dataset: &RuleDataset,
    limits: &CompileLimits,
    suffixes: Option<Arc<SuffixList>>,
) -> CompileResult {
    let mut builder = CompiledRuleSet::builder(dataset.version.as_str());
    if let Some(suffixes) = suffixes {
        builder.suffix_list(suffixes);
    }
    let mut diagnostics = Vec::new();

    for record in &dataset.trackers {
        let domain = match normalize_domain(&record.domain) {
            Some(domain) => domain,
            None => {
                let diag = RuleDiagnostic {
                    owner: record.domain.clone(),
                    rule_index: None,
                    pattern: None,
                    kind: DiagnosticKind::EmptyDomain,
                };
                log::warn!("Skipping tracker record: {}", diag);
                diagnostics.push(diag);
                continue;
            }
        };

        // Duplicate records land in the same list, in dataset order
        builder.ensure_domain(&domain);

        for (index, rule) in record.rules.iter().enumerate() {
            match compile_rule(rule, record.default_action, limits) {
                Ok(compiled) => {
                    builder.push(&domain, compiled);
                }
                Err(kind) => {
                    let diag = RuleDiagnostic {
                        owner: domain.clone(),
                        rule_index: Some(index),
                        pattern: Some(rule.pattern.clone()),
                        kind,
                    };
                    log::warn!("Skipping rule: {}", diag);
                    diagnostics.push(diag);
                }
            }
        }
    }

    let rule_set = builder.build();
    log::debug!(
        "Compiled dataset {:?}: {} domains, {} rules, {} skipped",
        rule_set.version(),
        rule_set.domain_count(),
        rule_set.rule_count(),
        diagnostics.len()
    );

    CompileResult { rule_set, diagnostics }
}

/// Compile one rule. `default_action` is the owning record's.
pub fn compile_rule(
    rule: &MatchRule,
    default_action: TrackerAction,
    limits: &CompileLimits,
) -> Result<CompiledRule, DiagnosticKind> {
    let resource_types = parse_resource_types(&rule.resource_types)?;
    let pattern = compile_pattern(&rule.pattern, limits)?;
    let exceptions: ExceptionDomains = rule.exception_domains.iter().map(String::as_str).collect();
    let action = rule.action.unwrap_or(default_action);

    Ok(CompiledRule::new(pattern, resource_types, exceptions, action))
}

fn parse_resource_types(names: &[String]) -> Result<ResourceTypes, DiagnosticKind> {
    let mut types = ResourceTypes::empty();
    for name in names {
        match ResourceType::parse(name) {
            Some(ty) => types.insert_type(ty),
            None => return Err(DiagnosticKind::UnknownResourceType(name.clone())),
        }
    }
    Ok(types)
}

fn normalize_domain(domain: &str) -> Option<String> {
    let trimmed = domain.trim().trim_matches('.');
    if trimmed.is_empty() {
        return None;
    }
    Some(trimmed.to_ascii_lowercase())
}
