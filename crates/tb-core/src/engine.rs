//! Hot-swappable engine.
//!
//! The engine owns the current [`CompiledRuleSet`] behind an `ArcSwap` so
//! that request evaluation is lock-free and a dataset update is a single
//! atomic pointer swap.
//!
//! ```text
//! Request -> Engine::evaluate() -> ArcSwap::load() -> CompiledRuleSet
//!                                        |
//!                                 (lock-free read)
//!
//! Update  -> Engine::publish()  -> ArcSwap::swap() -> old set dropped
//!                                        |            when readers finish
//!                                  (atomic swap)
//! ```
//!
//! A call to `evaluate` loads the snapshot once and uses it for the whole
//! call, so it sees either the old rule set or the new one in full.

use std::collections::HashSet;
use std::sync::Arc;

use arc_swap::{ArcSwap, ArcSwapOption};

use crate::matcher::evaluate;
use crate::psl::get_parent_domain;
use crate::ruleset::CompiledRuleSet;
use crate::surrogate::SurrogateRegistry;
use crate::types::{Decision, RequestContext};

/// Shared blocking engine.
///
/// `Engine` is `Send + Sync`; wrap it in an `Arc` and hand clones to every
/// page session.
pub struct Engine {
    /// Current rules; `None` until the first dataset is published
    rules: ArcSwapOption<CompiledRuleSet>,
    /// Fixed at startup
    surrogates: Arc<SurrogateRegistry>,
    /// Sites with protection disabled by the user
    trusted_sites: ArcSwap<HashSet<String>>,
}

impl Engine {
    /// Create an engine with no rules. Until [`Engine::publish`] is called
    /// it is not ready and allows everything.
    pub fn new(surrogates: SurrogateRegistry) -> Self {
        Self {
            rules: ArcSwapOption::empty(),
            surrogates: Arc::new(surrogates),
            trusted_sites: ArcSwap::from_pointee(HashSet::new()),
        }
    }

    /// Create an engine that is ready immediately.
    pub fn with_rules(rules: CompiledRuleSet, surrogates: SurrogateRegistry) -> Self {
        let engine = Self::new(surrogates);
        engine.publish(rules);
        engine
    }

    /// Whether a rule set has been published.
    pub fn is_ready(&self) -> bool {
        self.rules.load().is_some()
    }

    /// Atomically replace the current rule set. Returns the previous one.
    pub fn publish(&self, rules: CompiledRuleSet) -> Option<Arc<CompiledRuleSet>> {
        log::info!(
            "Publishing rule set version {:?}: {} domains, {} rules",
            rules.version(),
            rules.domain_count(),
            rules.rule_count()
        );
        self.rules.swap(Some(Arc::new(rules)))
    }

    /// The current rule set, if any.
    pub fn rules(&self) -> Option<Arc<CompiledRuleSet>> {
        self.rules.load_full()
    }

    /// Version of the current rule set.
    pub fn version(&self) -> Option<String> {
        self.rules.load().as_ref().map(|rules| rules.version().to_string())
    }

    pub fn surrogates(&self) -> &Arc<SurrogateRegistry> {
        &self.surrogates
    }

    /// Evaluate a request against the current snapshot.
    ///
    /// Allows when no rule set is published yet or when the initiator is a
    /// trusted site.
    pub fn evaluate(&self, ctx: &RequestContext<'_>) -> Decision {
        if self.is_trusted(ctx.initiator_domain) {
            return Decision::Allow;
        }

        let guard = self.rules.load();
        match guard.as_ref() {
            Some(rules) => evaluate(ctx, rules, &self.surrogates),
            None => Decision::Allow,
        }
    }

    // =========================================================================
    // Trusted sites
    // =========================================================================

    /// Replace the whole trusted-site set.
    pub fn set_trusted_sites<I, S>(&self, sites: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let set: HashSet<String> = sites
            .into_iter()
            .filter_map(|site| normalize_site(site.as_ref()))
            .collect();
        self.trusted_sites.store(Arc::new(set));
    }

    /// Add a site to the trusted list (bypass all blocking).
    pub fn add_trusted_site(&self, site: &str) {
        if let Some(site) = normalize_site(site) {
            self.trusted_sites.rcu(|current| {
                let mut set = HashSet::clone(current);
                set.insert(site.clone());
                set
            });
        }
    }

    /// Remove a site from the trusted list.
    pub fn remove_trusted_site(&self, site: &str) {
        if let Some(site) = normalize_site(site) {
            self.trusted_sites.rcu(|current| {
                let mut set = HashSet::clone(current);
                set.remove(&site);
                set
            });
        }
    }

    /// Whether `domain` or one of its parents is trusted.
    pub fn is_trusted(&self, domain: &str) -> bool {
        let trusted = self.trusted_sites.load();
        if trusted.is_empty() || domain.is_empty() {
            return false;
        }

        let domain = domain.trim_end_matches('.').to_ascii_lowercase();
        let mut current = Some(domain.as_str());
        while let Some(candidate) = current {
            if trusted.contains(candidate) {
                return true;
            }
            current = get_parent_domain(candidate);
        }
        false
    }
}

fn normalize_site(site: &str) -> Option<String> {
    let site = site.trim().trim_end_matches('.').to_ascii_lowercase();
    if site.is_empty() {
        None
    } else {
        Some(site)
    }
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::*;
    use crate::ruleset::{CompiledRule, ExceptionDomains};
    use crate::types::{ResourceType, ResourceTypes, TrackerAction};

    fn rule_set(version: &str, action: TrackerAction) -> CompiledRuleSet {
        let mut builder = CompiledRuleSet::builder(version);
        builder.push(
            "tracker.com",
            CompiledRule::new(
                Regex::new("tracker").expect("valid regex"),
                ResourceTypes::empty(),
                ExceptionDomains::new(),
                action,
            ),
        );
        builder.build()
    }

    #[test]
    fn not_ready_engine_allows() {
        let engine = Engine::new(SurrogateRegistry::empty());
        assert!(!engine.is_ready());
        assert_eq!(engine.version(), None);
        let ctx = RequestContext::new("https://tracker.com/t.js", ResourceType::Script, "site.com");
        assert_eq!(engine.evaluate(&ctx), Decision::Allow);
    }

    #[test]
    fn publish_swaps_rules() {
        let engine = Engine::with_rules(rule_set("v1", TrackerAction::Block), SurrogateRegistry::empty());
        let ctx = RequestContext::new("https://tracker.com/t.js", ResourceType::Script, "site.com");
        assert!(engine.is_ready());
        assert!(!engine.evaluate(&ctx).is_allow());

        let previous = engine.publish(rule_set("v2", TrackerAction::Ignore));
        assert_eq!(previous.map(|p| p.version().to_string()), Some("v1".to_string()));
        assert_eq!(engine.version().as_deref(), Some("v2"));
        assert!(engine.evaluate(&ctx).is_allow());
    }

    #[test]
    fn held_snapshot_survives_swap() {
        let engine = Engine::with_rules(rule_set("v1", TrackerAction::Block), SurrogateRegistry::empty());
        let held = engine.rules().expect("rules published");
        engine.publish(rule_set("v2", TrackerAction::Ignore));
        assert_eq!(held.version(), "v1");
        assert_eq!(held.rule_count(), 1);
    }

    #[test]
    fn trusted_sites_bypass_blocking() {
        let engine = Engine::with_rules(rule_set("v1", TrackerAction::Block), SurrogateRegistry::empty());
        engine.add_trusted_site("Site.com");

        let from_trusted = RequestContext::new("https://tracker.com/t.js", ResourceType::Script, "www.site.com");
        assert!(engine.evaluate(&from_trusted).is_allow());

        let from_other = RequestContext::new("https://tracker.com/t.js", ResourceType::Script, "othersite.com");
        assert!(!engine.evaluate(&from_other).is_allow());

        engine.remove_trusted_site("site.com");
        assert!(!engine.evaluate(&from_trusted).is_allow());

        engine.set_trusted_sites(["othersite.com", ""]);
        assert!(engine.is_trusted("othersite.com"));
        assert!(!engine.is_trusted("site.com"));
        assert!(!engine.is_trusted(""));
    }
}
