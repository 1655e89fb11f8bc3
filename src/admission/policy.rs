//! Admission rules configuration and matching.
//!
//! This module handles loading admission rules from configuration and
//! matching inbound operations against them. Each rule names the path
//! prefixes it covers and the window/limit pairs that must all hold for a
//! request to be admitted.

use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

use crate::error::{Result, TurnstileError};

/// A single window/limit pair.
///
/// A rule may carry several of these; a request is admitted only if every
/// window still has capacity (logical AND).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowRule {
    /// Length of the sliding window in seconds
    pub duration_secs: u64,
    /// Maximum admitted events within any interval of that length
    pub max_count: usize,
}

impl WindowRule {
    /// Window length in milliseconds, the unit the counters work in.
    pub fn duration_millis(&self) -> u64 {
        self.duration_secs * 1_000
    }

    /// Window length as a [`Duration`].
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }
}

/// One admission rule: which operations it covers and the limits it applies.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleConfig {
    /// Optional name for logging and debugging
    #[serde(default)]
    pub name: Option<String>,
    /// Path prefixes this rule covers
    pub paths: Vec<String>,
    /// Window/limit pairs, all of which must be satisfied
    pub windows: Vec<WindowRule>,
}

/// The complete set of configured admission rules.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AdmissionRules {
    /// Configured rules, in declaration order
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl AdmissionRules {
    /// Create an empty rule set. Everything is admitted.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load rules from a YAML file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        info!(path = %path.display(), "Loading admission rules");

        let contents = std::fs::read_to_string(path)?;
        Self::from_yaml(&contents)
    }

    /// Load rules from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let rules: AdmissionRules = serde_yaml::from_str(yaml)
            .map_err(|e| TurnstileError::Config(format!("Failed to parse admission rules: {}", e)))?;
        rules.validate()?;
        Ok(rules)
    }

    /// Reject rules that could never match or carry no enforceable window.
    pub(crate) fn validate(&self) -> Result<()> {
        for rule in &self.rules {
            if rule.paths.is_empty() {
                return Err(TurnstileError::Config(
                    "admission rule has no paths".to_string(),
                ));
            }
            if rule.windows.is_empty() {
                return Err(TurnstileError::Config(format!(
                    "admission rule for {:?} has no windows",
                    rule.paths
                )));
            }
            for window in &rule.windows {
                if window.duration_secs == 0 {
                    return Err(TurnstileError::Config(format!(
                        "admission rule for {:?} has a zero-length window",
                        rule.paths
                    )));
                }
            }
        }
        Ok(())
    }

    /// Find the rule covering an operation.
    ///
    /// Matching is by path prefix; when several rules cover the operation,
    /// the longest matching prefix wins. Returns the matched prefix (the
    /// operation component of the subject key) along with the rule.
    pub fn find_rule(&self, operation: &str) -> Option<(&str, &RuleConfig)> {
        let mut best: Option<(&str, &RuleConfig)> = None;

        for rule in &self.rules {
            for prefix in &rule.paths {
                if !operation.starts_with(prefix.as_str()) {
                    continue;
                }
                let longer = match best {
                    Some((matched, _)) => prefix.len() > matched.len(),
                    None => true,
                };
                if longer {
                    best = Some((prefix.as_str(), rule));
                }
            }
        }

        best
    }

    /// Whether any rule is configured at all.
    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
