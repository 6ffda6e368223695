//! Engine configuration.
//!
//! Every field has a default, so an empty JSON object is a valid
//! configuration.

use serde::Deserialize;

use crate::error::ConfigError;

/// Top-level engine configuration.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    pub compile: CompileLimits,
    pub interceptor: InterceptorConfig,
}

impl EngineConfig {
    /// Parse and validate a JSON configuration document.
    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.compile.max_pattern_len == 0 {
            return Err(ConfigError::InvalidValue {
                field: "compile.max_pattern_len",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.compile.regex_size_limit == 0 {
            return Err(ConfigError::InvalidValue {
                field: "compile.regex_size_limit",
                reason: "must be greater than zero".to_string(),
            });
        }
        if self.interceptor.pending_policy == PendingPolicy::Queue && self.interceptor.queue_capacity == 0 {
            return Err(ConfigError::InvalidValue {
                field: "interceptor.queue_capacity",
                reason: "queue policy needs a non-zero capacity".to_string(),
            });
        }
        Ok(())
    }
}

/// Bounds applied to tracker patterns at compile time.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CompileLimits {
    /// Longest accepted pattern, in bytes
    pub max_pattern_len: usize,
    /// Compiled program size limit handed to the regex builder
    pub regex_size_limit: usize,
    /// Skip patterns like `(a+)+`
    pub reject_nested_quantifiers: bool,
    pub case_insensitive: bool,
}

impl Default for CompileLimits {
    fn default() -> Self {
        Self {
            max_pattern_len: 4096,
            regex_size_limit: 1 << 20,
            reject_nested_quantifiers: true,
            case_insensitive: true,
        }
    }
}

/// What a page session does with loads seen before rules are available.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PendingPolicy {
    /// Allow and log
    #[default]
    FailOpen,
    /// Hold loads and replay them, in order, once the session is active
    Queue,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct InterceptorConfig {
    pub pending_policy: PendingPolicy,
    /// Loads beyond this many queued entries fail open
    pub queue_capacity: usize,
}

impl Default for InterceptorConfig {
    fn default() -> Self {
        Self {
            pending_policy: PendingPolicy::FailOpen,
            queue_capacity: 1024,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_object_is_default() {
        let config = EngineConfig::from_json("{}").expect("config should parse");
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.interceptor.pending_policy, PendingPolicy::FailOpen);
    }

    #[test]
    fn partial_override() {
        let config = EngineConfig::from_json(
            r#"{"interceptor": {"pending_policy": "queue", "queue_capacity": 8},
                "compile": {"max_pattern_len": 128}}"#,
        )
        .expect("config should parse");
        assert_eq!(config.interceptor.pending_policy, PendingPolicy::Queue);
        assert_eq!(config.interceptor.queue_capacity, 8);
        assert_eq!(config.compile.max_pattern_len, 128);
        assert!(config.compile.reject_nested_quantifiers);
    }

    #[test]
    fn rejects_invalid_values() {
        assert!(matches!(
            EngineConfig::from_json(r#"{"compile": {"max_pattern_len": 0}}"#),
            Err(ConfigError::InvalidValue { field: "compile.max_pattern_len", .. })
        ));
        assert!(matches!(
            EngineConfig::from_json(r#"{"interceptor": {"pending_policy": "queue", "queue_capacity": 0}}"#),
            Err(ConfigError::InvalidValue { .. })
        ));
        assert!(matches!(EngineConfig::from_json(r#"{"bogus": 1}"#), Err(ConfigError::Json(_))));
    }
}
