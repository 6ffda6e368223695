//! Surrogate scripts
//!
//! A surrogate is a harmless script run in place of a blocked tracker
//! script so that page code expecting the tracker's globals keeps working.
//! The registry is an ordered list of entries; lookup returns the first
//! entry (in insertion order) with a pattern matching the URL.

use std::fmt;
use std::sync::Arc;

use regex::Regex;
use serde::Deserialize;

use crate::config::CompileLimits;
use crate::error::RuleDiagnostic;
use crate::pattern::compile_pattern;

/// Built-in surrogate seeds, in lookup order.
const EMBEDDED_SEEDS: &[(&str, &[&str], &str)] = &[
    (
        "analytics.js",
        &[
            r"google-analytics\.com/analytics\.js",
            r"google-analytics\.com/analytics_debug\.js",
        ],
        include_str!("../surrogates/analytics.js"),
    ),
    (
        "ga.js",
        &[r"google-analytics\.com/ga\.js", r"google-analytics\.com/urchin\.js"],
        include_str!("../surrogates/ga.js"),
    ),
    (
        "gtm.js",
        &[r"googletagmanager\.com/gtm\.js", r"googletagmanager\.com/gtag/js"],
        include_str!("../surrogates/gtm.js"),
    ),
    (
        "gpt.js",
        &[
            r"googletagservices\.com/tag/js/gpt\.js",
            r"securepubads\.g\.doubleclick\.net/tag/js/gpt\.js",
        ],
        include_str!("../surrogates/gpt.js"),
    ),
    (
        "fbevents.js",
        &[r"connect\.facebook\.net/[^/]+/fbevents\.js"],
        include_str!("../surrogates/fbevents.js"),
    ),
    (
        "apstag.js",
        &[r"amazon-adsystem\.com/aax2/apstag\.js"],
        include_str!("../surrogates/apstag.js"),
    ),
];

// =============================================================================
// Surrogate Entry
// =============================================================================

/// Seed data for one surrogate, as embedded or supplied by the host.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct SurrogateSeed {
    /// Optional; an unnamed seed is named after its first pattern
    #[serde(default)]
    pub name: String,
    #[serde(alias = "matchPatterns")]
    pub match_patterns: Vec<String>,
    #[serde(alias = "replacementSource")]
    pub replacement_source: String,
}

/// A compiled surrogate.
pub struct SurrogateEntry {
    name: String,
    sources: Vec<String>,
    patterns: Vec<Regex>,
    replacement_source: String,
}

impl SurrogateEntry {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The match patterns, in the order they are tried.
    pub fn match_patterns(&self) -> &[String] {
        &self.sources
    }

    /// Script body to run in the page in place of the blocked resource.
    pub fn replacement_source(&self) -> &str {
        &self.replacement_source
    }

    /// Whether any of the entry's patterns matches `url`.
    #[inline]
    pub fn matches(&self, url: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(url))
    }
}

impl fmt::Debug for SurrogateEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SurrogateEntry")
            .field("name", &self.name)
            .field("match_patterns", &self.sources)
            .field("replacement_len", &self.replacement_source.len())
            .finish()
    }
}

impl PartialEq for SurrogateEntry {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
            && self.sources == other.sources
            && self.replacement_source == other.replacement_source
    }
}

impl Eq for SurrogateEntry {}

// =============================================================================
// Surrogate Registry
// =============================================================================

/// Ordered, immutable set of surrogates.
#[derive(Debug, Default)]
pub struct SurrogateRegistry {
    entries: Vec<Arc<SurrogateEntry>>,
}

impl SurrogateRegistry {
    /// An empty registry: every blocked request stays a plain Block.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry seeded from the built-in surrogate scripts.
    pub fn embedded() -> Self {
        let seeds = EMBEDDED_SEEDS.iter().map(|(name, patterns, source)| SurrogateSeed {
            name: (*name).to_string(),
            match_patterns: patterns.iter().map(|p| (*p).to_string()).collect(),
            replacement_source: (*source).to_string(),
        });
        let (registry, diagnostics) = Self::from_seeds(seeds, &CompileLimits::default());
        debug_assert!(diagnostics.is_empty(), "embedded surrogates must compile");
        registry
    }

    /// Build a registry from seeds, preserving their order.
    ///
    /// Patterns that fail to compile are skipped and reported; an entry
    /// left with no usable pattern is dropped.
    pub fn from_seeds<I>(seeds: I, limits: &CompileLimits) -> (Self, Vec<RuleDiagnostic>)
    where
        I: IntoIterator<Item = SurrogateSeed>,
    {
        let mut entries = Vec::new();
        let mut diagnostics = Vec::new();

        for mut seed in seeds {
            if seed.name.is_empty() {
                seed.name = seed.match_patterns.first().cloned().unwrap_or_default();
            }
            let mut sources = Vec::with_capacity(seed.match_patterns.len());
            let mut patterns = Vec::with_capacity(seed.match_patterns.len());

            for (index, source) in seed.match_patterns.into_iter().enumerate() {
                match compile_pattern(&source, limits) {
                    Ok(re) => {
                        patterns.push(re);
                        sources.push(source);
                    }
                    Err(kind) => {
                        let diag = RuleDiagnostic {
                            owner: seed.name.clone(),
                            rule_index: Some(index),
                            pattern: Some(source),
                            kind,
                        };
                        log::warn!("Skipping surrogate pattern: {}", diag);
                        diagnostics.push(diag);
                    }
                }
            }

            if patterns.is_empty() {
                log::warn!("Surrogate '{}' has no usable patterns, dropping it", seed.name);
                continue;
            }

            entries.push(Arc::new(SurrogateEntry {
                name: seed.name,
                sources,
                patterns,
                replacement_source: seed.replacement_source,
            }));
        }

        (Self { entries }, diagnostics)
    }

    /// Build a registry from a JSON array of seeds.
    pub fn from_json(text: &str, limits: &CompileLimits) -> Result<(Self, Vec<RuleDiagnostic>), serde_json::Error> {
        let seeds: Vec<SurrogateSeed> = serde_json::from_str(text)?;
        Ok(Self::from_seeds(seeds, limits))
    }

    /// First entry, in insertion order, with a pattern matching `url`.
    #[inline]
    pub fn lookup(&self, url: &str) -> Option<&Arc<SurrogateEntry>> {
        self.entries.iter().find(|entry| entry.matches(url))
    }

    /// Look up an entry by name.
    pub fn get(&self, name: &str) -> Option<&Arc<SurrogateEntry>> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SurrogateEntry>> {
        self.entries.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn seed(name: &str, patterns: &[&str]) -> SurrogateSeed {
        SurrogateSeed {
            name: name.to_string(),
            match_patterns: patterns.iter().map(|p| p.to_string()).collect(),
            replacement_source: format!("/* {} */", name),
        }
    }

    #[test]
    fn embedded_registry_compiles() {
        let registry = SurrogateRegistry::embedded();
        assert_eq!(registry.len(), EMBEDDED_SEEDS.len());

        let entry = registry
            .lookup("https://www.google-analytics.com/analytics.js")
            .expect("analytics.js surrogate");
        assert_eq!(entry.name(), "analytics.js");
        assert!(entry.replacement_source().contains("window[name] = ga"));

        let entry = registry
            .lookup("https://connect.facebook.net/en_US/fbevents.js")
            .expect("fbevents surrogate");
        assert_eq!(entry.name(), "fbevents.js");

        assert!(registry.lookup("https://cdn.example.com/app.js").is_none());
    }

    #[test]
    fn lookup_is_first_match_in_insertion_order() {
        let (registry, diagnostics) = SurrogateRegistry::from_seeds(
            vec![seed("first", &["tracker\\.test/a"]), seed("second", &["tracker\\.test/"])],
            &CompileLimits::default(),
        );
        assert!(diagnostics.is_empty());

        assert_eq!(registry.lookup("https://tracker.test/a.js").map(|e| e.name()), Some("first"));
        assert_eq!(registry.lookup("https://tracker.test/b.js").map(|e| e.name()), Some("second"));
    }

    #[test]
    fn bad_patterns_are_skipped() {
        let (registry, diagnostics) = SurrogateRegistry::from_seeds(
            vec![
                seed("partial", &["(", "ok\\.test/x\\.js"]),
                seed("broken", &["(a+)+"]),
            ],
            &CompileLimits::default(),
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(diagnostics.len(), 2);
        assert_eq!(diagnostics[0].owner, "partial");
        assert_eq!(diagnostics[0].rule_index, Some(0));

        let entry = registry.get("partial").expect("partial entry kept");
        assert_eq!(entry.match_patterns(), &["ok\\.test/x\\.js".to_string()]);
    }

    #[test]
    fn loads_from_json() {
        let json = r#"[{"name": "noop", "matchPatterns": ["noop\\.test/x\\.js"], "replacementSource": "(function(){})();"}]"#;
        let (registry, diagnostics) =
            SurrogateRegistry::from_json(json, &CompileLimits::default()).expect("json should parse");
        assert!(diagnostics.is_empty());
        assert_eq!(
            registry.lookup("https://noop.test/x.js").map(|e| e.replacement_source()),
            Some("(function(){})();")
        );
    }

    #[test]
    fn loads_unnamed_seeds_from_json() {
        let json = r#"[{"matchPatterns": ["x\\.test/a\\.js"], "replacementSource": "void 0;"}]"#;
        let (registry, diagnostics) =
            SurrogateRegistry::from_json(json, &CompileLimits::default()).expect("json should parse");
        assert!(diagnostics.is_empty());
        let entry = registry.lookup("https://x.test/a.js").expect("unnamed seed registered");
        assert_eq!(entry.name(), "x\\.test/a\\.js");
        assert_eq!(entry.replacement_source(), "void 0;");
    }
}
