use serde::{Deserialize, Serialize};
use std::env;

#[derive(Debug, Clone, Deserialize, Serialize, PartialEq, Eq)]
pub struct GraphConfig {
    /// Validate request/accept/decline/cancel/remove against the local
    /// snapshot. When false, requests overwrite whatever edge exists and
    /// accepts flip the stored status without looking at it.
    #[serde(default = "default_strict_transitions")]
    pub strict_transitions: bool,
    /// How many "people you may know" entries to surface
    #[serde(default = "default_suggestion_limit")]
    pub suggestion_limit: usize,
}

fn default_strict_transitions() -> bool {
    true
}

fn default_suggestion_limit() -> usize {
    3
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            strict_transitions: default_strict_transitions(),
            suggestion_limit: default_suggestion_limit(),
        }
    }
}

impl GraphConfig {
    /// Permissive mode: overwrite-on-request, blind accept
    pub fn permissive() -> Self {
        Self {
            strict_transitions: false,
            ..Self::default()
        }
    }

    pub fn from_env() -> Result<Self, anyhow::Error> {
        // CONNECTIONS_STRICT accepts true/false/1/0; anything else is a config error
        let strict_transitions = match env::var("CONNECTIONS_STRICT") {
            Ok(v) => parse_bool(&v)
                .ok_or_else(|| anyhow::anyhow!("CONNECTIONS_STRICT must be true or false, got {v:?}"))?,
            Err(_) => default_strict_transitions(),
        };

        let suggestion_limit = env::var("SUGGESTION_LIMIT")
            .ok()
            .and_then(|v| v.parse::<usize>().ok())
            .unwrap_or_else(default_suggestion_limit);

        Ok(Self {
            strict_transitions,
            suggestion_limit,
        })
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_values() {
        let config = GraphConfig::default();
        assert!(config.strict_transitions);
        assert_eq!(config.suggestion_limit, 3);
        assert!(!GraphConfig::permissive().strict_transitions);
    }

    #[test]
    fn test_parse_bool() {
        assert_eq!(parse_bool("TRUE"), Some(true));
        assert_eq!(parse_bool(" 0 "), Some(false));
        assert_eq!(parse_bool("maybe"), None);
    }
}
