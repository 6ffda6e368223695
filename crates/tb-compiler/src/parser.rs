//! Tracker dataset model and JSON ingestion.
//!
//! The dataset is a JSON document with a `trackers` field holding either a
//! list of records or an object keyed by tracker domain:
//!
//! ```json
//! {
//!   "version": "2024.06.01",
//!   "trackers": [
//!     {
//!       "domain": "tracker.com",
//!       "owner": "Tracker Inc.",
//!       "defaultAction": "block",
//!       "rules": [
//!         { "pattern": "tracker\\.com/lib/", "action": "ignore" },
//!         { "pattern": "tracker\\.com/collect", "resourceTypes": ["image", "ping"],
//!           "exceptionDomains": ["*.partner.com"] }
//!       ]
//!     }
//!   ]
//! }
//! ```
//!
//! Resource types are kept as strings here; unknown ones are reported per
//! rule by the compiler instead of failing the whole document.

use std::collections::BTreeMap;

use serde::{Deserialize, Deserializer, Serialize};
use tb_core::types::TrackerAction;

/// Errors that reject a whole dataset document.
#[derive(Debug, thiserror::Error)]
pub enum DatasetError {
    #[error("malformed dataset: {0}")]
    Json(#[from] serde_json::Error),
    #[error("dataset has no `trackers` field")]
    MissingTrackers,
}

/// Immutable, versioned collection of tracker records.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RuleDataset {
    pub version: String,
    pub trackers: Vec<TrackerRecord>,
}

impl RuleDataset {
    pub fn new(version: impl Into<String>, trackers: Vec<TrackerRecord>) -> Self {
        Self {
            version: version.into(),
            trackers,
        }
    }

    pub fn from_json(text: &str) -> Result<Self, DatasetError> {
        parse_dataset(text)
    }

    /// Total number of rules across all records.
    pub fn rule_count(&self) -> usize {
        self.trackers.iter().map(|t| t.rules.len()).sum()
    }
}

/// One tracked domain.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TrackerRecord {
    /// Filled from the object key when trackers are given as a map
    #[serde(default)]
    pub domain: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub owner: Option<String>,
    #[serde(default, rename = "defaultAction", alias = "default", alias = "default_action")]
    pub default_action: TrackerAction,
    #[serde(default)]
    pub rules: Vec<MatchRule>,
}

impl TrackerRecord {
    pub fn new(domain: impl Into<String>, default_action: TrackerAction) -> Self {
        Self {
            domain: domain.into(),
            owner: None,
            default_action,
            rules: Vec::new(),
        }
    }

    pub fn with_rule(mut self, rule: MatchRule) -> Self {
        self.rules.push(rule);
        self
    }
}

/// One URL pattern of a tracker.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatchRule {
    #[serde(alias = "rule")]
    pub pattern: String,
    /// Empty means every type
    #[serde(default, rename = "resourceTypes", alias = "types", alias = "resource_types")]
    pub resource_types: Vec<String>,
    #[serde(
        default,
        rename = "exceptionDomains",
        alias = "exceptions",
        alias = "exception_domains",
        deserialize_with = "deserialize_exceptions"
    )]
    pub exception_domains: Vec<String>,
    /// Overrides the record's default action
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub action: Option<TrackerAction>,
}

impl MatchRule {
    pub fn new(pattern: impl Into<String>) -> Self {
        Self {
            pattern: pattern.into(),
            ..Self::default()
        }
    }

    pub fn types<I, S>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.resource_types = types.into_iter().map(Into::into).collect();
        self
    }

    pub fn exceptions<I, S>(mut self, domains: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.exception_domains = domains.into_iter().map(Into::into).collect();
        self
    }

    pub fn action(mut self, action: TrackerAction) -> Self {
        self.action = Some(action);
        self
    }
}

// =============================================================================
// JSON Parsing
// =============================================================================

#[derive(Deserialize)]
struct RawDataset {
    #[serde(default)]
    version: Option<String>,
    #[serde(default)]
    trackers: Option<RawTrackers>,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum RawTrackers {
    List(Vec<TrackerRecord>),
    ByDomain(BTreeMap<String, TrackerRecord>),
}

/// Exceptions may be a bare list or an object with a `domains` list.
#[derive(Deserialize)]
#[serde(untagged)]
enum RawExceptions {
    List(Vec<String>),
    Object {
        #[serde(default)]
        domains: Vec<String>,
    },
}

fn deserialize_exceptions<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match RawExceptions::deserialize(deserializer)? {
        RawExceptions::List(domains) | RawExceptions::Object { domains } => domains,
    })
}

/// Parse a dataset document.
///
/// Fails only on structural problems; individual bad rules are left for the
/// compiler to skip.
pub fn parse_dataset(text: &str) -> Result<RuleDataset, DatasetError> {
    let raw: RawDataset = serde_json::from_str(text)?;

    let trackers = match raw.trackers.ok_or(DatasetError::MissingTrackers)? {
        RawTrackers::List(trackers) => trackers,
        RawTrackers::ByDomain(map) => map
            .into_iter()
            .map(|(key, mut record)| {
                if record.domain.is_empty() {
                    record.domain = key;
                }
                record
            })
            .collect(),
    };

    Ok(RuleDataset {
        version: raw.version.unwrap_or_default(),
        trackers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_list_form() {
        let dataset = parse_dataset(
            r#"{
                "version": "2024.06.01",
                "trackers": [
                    {
                        "domain": "tracker.com",
                        "owner": "Tracker Inc.",
                        "defaultAction": "block",
                        "rules": [
                            { "pattern": "tracker\\.com/lib/", "action": "ignore" },
                            { "pattern": "tracker\\.com/collect",
                              "resourceTypes": ["image", "ping"],
                              "exceptionDomains": ["*.partner.com"] }
                        ]
                    }
                ]
            }"#,
        )
        .expect("dataset should parse");

        assert_eq!(dataset.version, "2024.06.01");
        assert_eq!(dataset.trackers.len(), 1);
        assert_eq!(dataset.rule_count(), 2);

        let record = &dataset.trackers[0];
        assert_eq!(record.domain, "tracker.com");
        assert_eq!(record.owner.as_deref(), Some("Tracker Inc."));
        assert_eq!(record.default_action, TrackerAction::Block);
        assert_eq!(record.rules[0].action, Some(TrackerAction::Ignore));
        assert_eq!(record.rules[1].resource_types, vec!["image", "ping"]);
        assert_eq!(record.rules[1].exception_domains, vec!["*.partner.com"]);
        assert_eq!(record.rules[1].action, None);
    }

    #[test]
    fn parses_map_form_with_aliases() {
        let dataset = parse_dataset(
            r#"{
                "trackers": {
                    "ads.example": {
                        "default": "ignore",
                        "rules": [
                            { "rule": "ads\\.example/px", "types": ["image"],
                              "exceptions": { "domains": ["news.example"] } }
                        ]
                    }
                }
            }"#,
        )
        .expect("dataset should parse");

        assert_eq!(dataset.version, "");
        let record = &dataset.trackers[0];
        assert_eq!(record.domain, "ads.example");
        assert_eq!(record.default_action, TrackerAction::Ignore);
        assert_eq!(record.rules[0].pattern, "ads\\.example/px");
        assert_eq!(record.rules[0].resource_types, vec!["image"]);
        assert_eq!(record.rules[0].exception_domains, vec!["news.example"]);
    }

    #[test]
    fn defaults_apply() {
        let dataset = parse_dataset(r#"{"trackers": [{"domain": "t.com", "rules": [{"pattern": "t"}]}]}"#)
            .expect("dataset should parse");
        let record = &dataset.trackers[0];
        assert_eq!(record.default_action, TrackerAction::Block);
        assert!(record.rules[0].resource_types.is_empty());
        assert!(record.rules[0].exception_domains.is_empty());
    }

    #[test]
    fn empty_tracker_list_is_valid() {
        let dataset = parse_dataset(r#"{"version": "empty", "trackers": []}"#).expect("dataset should parse");
        assert!(dataset.trackers.is_empty());
    }

    #[test]
    fn structural_errors() {
        assert!(matches!(parse_dataset(r#"{"version": "1"}"#), Err(DatasetError::MissingTrackers)));
        assert!(matches!(parse_dataset("{not json"), Err(DatasetError::Json(_))));
        assert!(matches!(parse_dataset(r#"{"trackers": 5}"#), Err(DatasetError::Json(_))));
        assert!(matches!(
            parse_dataset(r#"{"trackers": [{"domain": "t.com", "defaultAction": "explode"}]}"#),
            Err(DatasetError::Json(_))
        ));
    }

    #[test]
    fn builder_helpers() {
        let record = TrackerRecord::new("t.com", TrackerAction::Block).with_rule(
            MatchRule::new("t\\.com/")
                .types(["script"])
                .exceptions(["*.site.com"])
                .action(TrackerAction::Ignore),
        );
        assert_eq!(record.rules[0].resource_types, vec!["script"]);
        assert_eq!(record.rules[0].exception_domains, vec!["*.site.com"]);
        assert_eq!(record.rules[0].action, Some(TrackerAction::Ignore));
    }
}
