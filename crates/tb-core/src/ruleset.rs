//! Compiled rule set
//!
//! The compiled rule set is the immutable snapshot the matcher runs
//! against. It is built once per dataset version (by `tb-compiler`) and
//! shared behind an `Arc`; nothing mutates it after `build()`.

use std::collections::HashMap;
use std::sync::Arc;

use regex::Regex;

use crate::psl::SuffixList;
use crate::types::{ResourceTypes, TrackerAction};

// =============================================================================
// Exception Domains
// =============================================================================

/// Initiator domains for which a rule does not apply.
///
/// Plain entries match only by exact equality. `*.`-prefixed entries match
/// the bare suffix and any subdomain of it.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExceptionDomains {
    exact: Vec<String>,
    /// Bare suffixes of `*.` entries ("*.example.com" stored as "example.com")
    wildcard: Vec<String>,
}

impl ExceptionDomains {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an entry. Entries are lowercased; blank entries are ignored.
    pub fn insert(&mut self, entry: &str) {
        let entry = entry.trim().to_ascii_lowercase();
        if let Some(suffix) = entry.strip_prefix("*.") {
            let suffix = suffix.trim_end_matches('.');
            if !suffix.is_empty() {
                self.wildcard.push(suffix.to_string());
            }
        } else {
            let entry = entry.trim_end_matches('.');
            if !entry.is_empty() {
                self.exact.push(entry.to_string());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        self.exact.is_empty() && self.wildcard.is_empty()
    }

    pub fn len(&self) -> usize {
        self.exact.len() + self.wildcard.len()
    }

    /// Whether `initiator` is excepted. An empty initiator never is.
    #[inline]
    pub fn matches(&self, initiator: &str) -> bool {
        let initiator = initiator.trim_end_matches('.');
        if initiator.is_empty() {
            return false;
        }

        if self.exact.iter().any(|d| d.eq_ignore_ascii_case(initiator)) {
            return true;
        }

        self.wildcard.iter().any(|suffix| is_same_or_subdomain(initiator, suffix))
    }
}

impl<'a> FromIterator<&'a str> for ExceptionDomains {
    fn from_iter<I: IntoIterator<Item = &'a str>>(iter: I) -> Self {
        let mut domains = Self::new();
        for entry in iter {
            domains.insert(entry);
        }
        domains
    }
}

/// `host == suffix` or `host` ends with `"." + suffix`, ASCII case-insensitive.
#[inline]
fn is_same_or_subdomain(host: &str, suffix: &str) -> bool {
    let host = host.as_bytes();
    let suffix = suffix.as_bytes();
    if host.len() == suffix.len() {
        return host.eq_ignore_ascii_case(suffix);
    }
    if host.len() <= suffix.len() {
        return false;
    }
    let split = host.len() - suffix.len();
    host[split - 1] == b'.' && host[split..].eq_ignore_ascii_case(suffix)
}

// =============================================================================
// Compiled Rule
// =============================================================================

/// One tracker rule with its pattern compiled.
#[derive(Debug, Clone)]
pub struct CompiledRule {
    pattern: Regex,
    resource_types: ResourceTypes,
    exceptions: ExceptionDomains,
    action: TrackerAction,
}

impl CompiledRule {
    /// `action` is the effective action: the rule's own override, or its
    /// record's default.
    pub fn new(
        pattern: Regex,
        resource_types: ResourceTypes,
        exceptions: ExceptionDomains,
        action: TrackerAction,
    ) -> Self {
        Self {
            pattern,
            resource_types,
            exceptions,
            action,
        }
    }

    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    pub fn resource_types(&self) -> ResourceTypes {
        self.resource_types
    }

    pub fn exceptions(&self) -> &ExceptionDomains {
        &self.exceptions
    }

    pub fn action(&self) -> TrackerAction {
        self.action
    }

    #[inline]
    pub(crate) fn is_match(&self, url: &str) -> bool {
        self.pattern.is_match(url)
    }
}

// =============================================================================
// Compiled Rule Set
// =============================================================================

/// Rules indexed by tracker domain.
#[derive(Debug)]
pub struct CompiledRuleSet {
    version: String,
    by_domain: HashMap<String, Vec<CompiledRule>>,
    suffixes: Arc<SuffixList>,
    rule_count: usize,
}

impl CompiledRuleSet {
    /// Start building a rule set for dataset `version`.
    pub fn builder(version: impl Into<String>) -> RuleSetBuilder {
        RuleSetBuilder {
            version: version.into(),
            by_domain: HashMap::new(),
            suffixes: None,
            rule_count: 0,
        }
    }

    /// An empty rule set: every request is allowed.
    pub fn empty() -> Self {
        Self::builder("").build()
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    /// Rules for an exact tracker domain, in dataset order.
    #[inline]
    pub fn rules_for(&self, domain: &str) -> Option<&[CompiledRule]> {
        self.by_domain.get(domain).map(Vec::as_slice)
    }

    pub fn contains_domain(&self, domain: &str) -> bool {
        self.by_domain.contains_key(domain)
    }

    pub fn domains(&self) -> impl Iterator<Item = &str> {
        self.by_domain.keys().map(String::as_str)
    }

    pub fn domain_count(&self) -> usize {
        self.by_domain.len()
    }

    pub fn rule_count(&self) -> usize {
        self.rule_count
    }

    pub fn suffixes(&self) -> &SuffixList {
        &self.suffixes
    }
}

/// Builder for [`CompiledRuleSet`].
pub struct RuleSetBuilder {
    version: String,
    by_domain: HashMap<String, Vec<CompiledRule>>,
    suffixes: Option<Arc<SuffixList>>,
    rule_count: usize,
}

impl RuleSetBuilder {
    /// Append a rule to `domain`'s list. Order of calls is preserved.
    pub fn push(&mut self, domain: &str, rule: CompiledRule) -> &mut Self {
        self.by_domain.entry(domain.to_string()).or_default().push(rule);
        self.rule_count += 1;
        self
    }

    /// Register a domain with no rules yet. Lookups for it find an empty
    /// list and allow.
    pub fn ensure_domain(&mut self, domain: &str) -> &mut Self {
        self.by_domain.entry(domain.to_string()).or_default();
        self
    }

    /// Use `suffixes` for registrable-domain extraction instead of the
    /// embedded list.
    pub fn suffix_list(&mut self, suffixes: Arc<SuffixList>) -> &mut Self {
        self.suffixes = Some(suffixes);
        self
    }

    pub fn build(self) -> CompiledRuleSet {
        CompiledRuleSet {
            version: self.version,
            by_domain: self.by_domain,
            suffixes: self.suffixes.unwrap_or_else(|| Arc::new(SuffixList::embedded())),
            rule_count: self.rule_count,
        }
    }
}
