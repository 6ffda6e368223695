//! Core Matching Engine
//!
//! This is the hot path - every request goes through here.
//! `evaluate` is a pure function of its inputs: no I/O, no locks, no
//! shared mutable state. It never fails; anything it cannot make sense of
//! is allowed.

use crate::psl::walk_host_suffixes;
use crate::ruleset::{CompiledRule, CompiledRuleSet};
use crate::surrogate::SurrogateRegistry;
use crate::types::{Decision, RequestContext, TrackerAction};
use crate::url::extract_host;

// =============================================================================
// Matcher
// =============================================================================

/// A rule set paired with a surrogate registry.
#[derive(Clone, Copy)]
pub struct Matcher<'a> {
    rules: &'a CompiledRuleSet,
    surrogates: &'a SurrogateRegistry,
}

impl<'a> Matcher<'a> {
    pub fn new(rules: &'a CompiledRuleSet, surrogates: &'a SurrogateRegistry) -> Self {
        Self { rules, surrogates }
    }

    /// Match a request and return the decision.
    pub fn match_request(&self, ctx: &RequestContext<'_>) -> Decision {
        evaluate(ctx, self.rules, self.surrogates)
    }
}

/// Evaluate one request against a rule set and surrogate registry.
///
/// 1. Extract the request host and its registrable domain; fail open if
///    the URL cannot be parsed.
/// 2. Walk the host's suffixes from most specific down to the registrable
///    domain, looking each up in the rule set. A dataset keyed by
///    registrable domain is found on the last step.
/// 3. Within a tracker's rule list the first rule (in dataset order) that
///    passes the type filter, matches the URL and is not excepted for the
///    initiator decides.
/// 4. A deciding rule with action Block yields Replace when a surrogate
///    matches the URL, Block otherwise. Ignore yields Allow.
pub fn evaluate(ctx: &RequestContext<'_>, rules: &CompiledRuleSet, surrogates: &SurrogateRegistry) -> Decision {
    let host = match extract_host(ctx.url) {
        Some(host) => host.to_ascii_lowercase(),
        None => {
            log::trace!("Unparsable URL, allowing: {:?}", ctx.url);
            return Decision::Allow;
        }
    };

    let registrable = match rules.suffixes().registrable_domain(&host) {
        Some(domain) => domain,
        None => return Decision::Allow,
    };

    for candidate in walk_host_suffixes(&host, &registrable) {
        let tracker_rules = match rules.rules_for(candidate) {
            Some(tracker_rules) => tracker_rules,
            None => continue,
        };

        if let Some(rule) = first_applicable(tracker_rules, ctx) {
            return resolve(rule, candidate, ctx, surrogates);
        }
    }

    Decision::Allow
}

/// First rule that applies to `ctx`, in stored order.
#[inline]
fn first_applicable<'r>(rules: &'r [CompiledRule], ctx: &RequestContext<'_>) -> Option<&'r CompiledRule> {
    rules.iter().find(|rule| {
        rule.resource_types().allows(ctx.resource_type)
            && rule.is_match(ctx.url)
            && !rule.exceptions().matches(ctx.initiator_domain)
    })
}

fn resolve(
    rule: &CompiledRule,
    tracker_domain: &str,
    ctx: &RequestContext<'_>,
    surrogates: &SurrogateRegistry,
) -> Decision {
    match rule.action() {
        TrackerAction::Ignore => {
            log::trace!("{} matched ignore rule {:?}", ctx.url, rule.pattern());
            Decision::Allow
        }
        TrackerAction::Block => match surrogates.lookup(ctx.url) {
            Some(surrogate) => {
                log::debug!("Replacing {} with surrogate '{}'", ctx.url, surrogate.name());
                Decision::Replace {
                    tracker_domain: tracker_domain.to_string(),
                    surrogate: surrogate.clone(),
                }
            }
            None => {
                log::debug!("Blocking {} (tracker {})", ctx.url, tracker_domain);
                Decision::Block {
                    tracker_domain: tracker_domain.to_string(),
                }
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use regex::Regex;

    use super::*;
    use crate::config::CompileLimits;
    use crate::ruleset::ExceptionDomains;
    use crate::surrogate::SurrogateSeed;
    use crate::types::ResourceType;

    fn rule(pattern: &str, types: &[ResourceType], exceptions: &[&str], action: TrackerAction) -> CompiledRule {
        CompiledRule::new(
            Regex::new(pattern).expect("valid regex"),
            types.iter().copied().collect(),
            exceptions.iter().copied().collect::<ExceptionDomains>(),
            action,
        )
    }

    fn single(domain: &str, rules: Vec<CompiledRule>) -> CompiledRuleSet {
        let mut builder = CompiledRuleSet::builder("test");
        for r in rules {
            builder.push(domain, r);
        }
        builder.build()
    }

    fn gtm_surrogates() -> SurrogateRegistry {
        let (registry, _) = SurrogateRegistry::from_seeds(
            vec![SurrogateSeed {
                name: "gtm".to_string(),
                match_patterns: vec![r"ads\.example/gtm\.js".to_string()],
                replacement_source: "(function(){})();".to_string(),
            }],
            &CompileLimits::default(),
        );
        registry
    }

    fn ctx<'a>(url: &'a str, ty: ResourceType, initiator: &'a str) -> RequestContext<'a> {
        RequestContext::new(url, ty, initiator)
    }

    #[test]
    fn blocks_matching_tracker() {
        let rules = single("ads.example", vec![rule(r".*ads\.example.*", &[], &[], TrackerAction::Block)]);
        let decision = evaluate(
            &ctx("https://ads.example/x.js", ResourceType::Script, "news.example"),
            &rules,
            &SurrogateRegistry::empty(),
        );
        assert_eq!(
            decision,
            Decision::Block {
                tracker_domain: "ads.example".to_string()
            }
        );
    }

    #[test]
    fn exception_domain_allows() {
        let rules = single(
            "ads.example",
            vec![rule(r".*ads\.example.*", &[], &["news.example"], TrackerAction::Block)],
        );
        let decision = evaluate(
            &ctx("https://ads.example/x.js", ResourceType::Script, "news.example"),
            &rules,
            &SurrogateRegistry::empty(),
        );
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn surrogate_takes_precedence_over_block() {
        let rules = single("ads.example", vec![rule(r".*ads\.example.*", &[], &[], TrackerAction::Block)]);
        let surrogates = gtm_surrogates();
        let decision = evaluate(
            &ctx("https://ads.example/gtm.js", ResourceType::Script, "news.example"),
            &rules,
            &surrogates,
        );
        match decision {
            Decision::Replace {
                tracker_domain,
                surrogate,
            } => {
                assert_eq!(tracker_domain, "ads.example");
                assert_eq!(surrogate.name(), "gtm");
            }
            other => panic!("expected Replace, got {:?}", other),
        }
    }

    #[test]
    fn unparsable_url_fails_open() {
        let rules = single("ads.example", vec![rule(".*", &[], &[], TrackerAction::Block)]);
        for url in ["not a url", "", "https://", "https:///x.js", "javascript:void(0)"] {
            let decision = evaluate(&ctx(url, ResourceType::Script, "news.example"), &rules, &gtm_surrogates());
            assert_eq!(decision, Decision::Allow, "url {:?}", url);
        }
    }

    #[test]
    fn type_restriction_excludes_request() {
        let rules = single(
            "ads.example",
            vec![rule(r".*ads\.example.*", &[ResourceType::Image], &[], TrackerAction::Block)],
        );
        let surrogates = SurrogateRegistry::empty();
        assert_eq!(
            evaluate(&ctx("https://ads.example/x.js", ResourceType::Script, "news.example"), &rules, &surrogates),
            Decision::Allow
        );
        assert!(!evaluate(&ctx("https://ads.example/x.gif", ResourceType::Image, "news.example"), &rules, &surrogates)
            .is_allow());
    }

    #[test]
    fn unknown_domain_is_allowed() {
        let rules = single("ads.example", vec![rule(".*", &[], &[], TrackerAction::Block)]);
        let decision = evaluate(
            &ctx("https://cdn.other.example/ads.example.js", ResourceType::Script, "news.example"),
            &rules,
            &SurrogateRegistry::empty(),
        );
        assert_eq!(decision, Decision::Allow);
    }

    #[test]
    fn first_applicable_rule_wins() {
        let rules = single(
            "tracker.com",
            vec![
                rule(r"tracker\.com/lib", &[], &[], TrackerAction::Ignore),
                rule(r"tracker\.com/", &[], &[], TrackerAction::Block),
            ],
        );
        let surrogates = SurrogateRegistry::empty();
        assert_eq!(
            evaluate(&ctx("https://tracker.com/lib/x.js", ResourceType::Script, "site.com"), &rules, &surrogates),
            Decision::Allow
        );
        assert_eq!(
            evaluate(&ctx("https://tracker.com/pixel", ResourceType::Image, "site.com"), &rules, &surrogates),
            Decision::Block {
                tracker_domain: "tracker.com".to_string()
            }
        );
    }

    #[test]
    fn excepted_rule_falls_through_to_next() {
        let rules = single(
            "tracker.com",
            vec![
                rule(r"tracker\.com/", &[], &["*.partner.com"], TrackerAction::Block),
                rule(r"tracker\.com/collect", &[], &[], TrackerAction::Block),
            ],
        );
        let surrogates = SurrogateRegistry::empty();
        assert_eq!(
            evaluate(&ctx("https://tracker.com/lib.js", ResourceType::Script, "www.partner.com"), &rules, &surrogates),
            Decision::Allow
        );
        assert!(!evaluate(
            &ctx("https://tracker.com/collect?id=1", ResourceType::Ping, "www.partner.com"),
            &rules,
            &surrogates
        )
        .is_allow());
    }

    #[test]
    fn empty_initiator_is_never_excepted() {
        let rules = single(
            "tracker.com",
            vec![rule(r"tracker\.com", &[], &["*.site.com"], TrackerAction::Block)],
        );
        let decision = evaluate(
            &ctx("https://tracker.com/", ResourceType::MainFrame, ""),
            &rules,
            &SurrogateRegistry::empty(),
        );
        assert!(!decision.is_allow());
    }

    #[test]
    fn subdomain_requests_use_registrable_domain() {
        let rules = single("tracker.co.uk", vec![rule(r"pixel", &[], &[], TrackerAction::Block)]);
        let decision = evaluate(
            &ctx("https://a.b.tracker.co.uk/pixel.gif", ResourceType::Image, "site.com"),
            &rules,
            &SurrogateRegistry::empty(),
        );
        assert_eq!(
            decision,
            Decision::Block {
                tracker_domain: "tracker.co.uk".to_string()
            }
        );
    }

    #[test]
    fn most_specific_record_first() {
        let mut builder = CompiledRuleSet::builder("test");
        builder
            .push("stats.tracker.com", rule(r"stats", &[], &[], TrackerAction::Ignore))
            .push("tracker.com", rule(r"tracker", &[], &[], TrackerAction::Block))
            .push("tracker.com", rule(r"stats", &[], &[], TrackerAction::Block));
        let rules = builder.build();
        let surrogates = SurrogateRegistry::empty();

        assert_eq!(
            evaluate(&ctx("https://stats.tracker.com/s.js", ResourceType::Script, "site.com"), &rules, &surrogates),
            Decision::Allow
        );
        assert_eq!(
            evaluate(&ctx("https://www.tracker.com/t.js", ResourceType::Script, "site.com"), &rules, &surrogates),
            Decision::Block {
                tracker_domain: "tracker.com".to_string()
            }
        );
    }

    #[test]
    fn matcher_wraps_evaluate() {
        let rules = single("ads.example", vec![rule(r"ads", &[], &[], TrackerAction::Block)]);
        let surrogates = SurrogateRegistry::empty();
        let matcher = Matcher::new(&rules, &surrogates);
        let request = ctx("https://ads.example/x.js", ResourceType::Script, "news.example");
        assert!(!matcher.match_request(&request).is_allow());
        assert_eq!(matcher.match_request(&request), evaluate(&request, &rules, &surrogates));
    }
}
