//! Configuration management for Turnstile.

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

use crate::admission::{AdmissionRules, RuleConfig};

/// Main configuration for the Turnstile service.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TurnstileConfig {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Admission control configuration
    #[serde(default)]
    pub admission: AdmissionConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP listen address
    #[serde(default = "default_http_addr")]
    pub http_addr: SocketAddr,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            http_addr: default_http_addr(),
        }
    }
}

fn default_http_addr() -> SocketAddr {
    "127.0.0.1:8080".parse().unwrap()
}

/// Admission control configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdmissionConfig {
    /// How long a subject may stay idle before its counter is evicted,
    /// in seconds
    #[serde(default = "default_idle_eviction")]
    pub idle_eviction_secs: u64,

    /// Cadence of the background eviction sweep, in seconds
    #[serde(default = "default_sweep_interval")]
    pub sweep_interval_secs: u64,

    /// Admission rules, inline
    #[serde(default)]
    pub rules: Vec<RuleConfig>,

    /// Path to a separate admission rules file; takes precedence over
    /// inline rules when set
    pub rules_path: Option<String>,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            idle_eviction_secs: default_idle_eviction(),
            sweep_interval_secs: default_sweep_interval(),
            rules: Vec::new(),
            rules_path: None,
        }
    }
}

fn default_idle_eviction() -> u64 {
    300
}

fn default_sweep_interval() -> u64 {
    30
}

impl TurnstileConfig {
    /// Load configuration from a file path.
    pub fn from_file(path: &str) -> crate::error::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: TurnstileConfig = serde_yaml::from_str(&contents)
            .map_err(|e| crate::error::TurnstileError::Config(e.to_string()))?;
        Ok(config)
    }

    /// Resolve the effective rule set: an external rules file when
    /// configured, the inline rules otherwise.
    pub fn load_rules(&self) -> crate::error::Result<AdmissionRules> {
        match &self.admission.rules_path {
            Some(path) => AdmissionRules::from_file(path),
            None => {
                let rules = AdmissionRules {
                    rules: self.admission.rules.clone(),
                };
                rules.validate()?;
                Ok(rules)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = TurnstileConfig::default();
        assert_eq!(config.server.http_addr.port(), 8080);
        assert_eq!(config.admission.idle_eviction_secs, 300);
        assert_eq!(config.admission.sweep_interval_secs, 30);
        assert!(config.admission.rules.is_empty());
        assert!(config.load_rules().unwrap().is_empty());
    }

    #[test]
    fn test_parse_full_config() {
        let yaml = r#"
server:
  http_addr: "0.0.0.0:9000"
admission:
  idle_eviction_secs: 600
  sweep_interval_secs: 15
  rules:
    - name: login
      paths: ["/login", "/register"]
      windows:
        - { duration_secs: 60, max_count: 60 }
"#;
        let config: TurnstileConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.http_addr.port(), 9000);
        assert_eq!(config.admission.idle_eviction_secs, 600);

        let rules = config.load_rules().unwrap();
        assert_eq!(rules.rules.len(), 1);
        assert!(rules.find_rule("/register").is_some());
    }

    #[test]
    fn test_partial_config_uses_defaults() {
        let yaml = r#"
admission:
  idle_eviction_secs: 120
"#;
        let config: TurnstileConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.server.http_addr.port(), 8080);
        assert_eq!(config.admission.idle_eviction_secs, 120);
        assert_eq!(config.admission.sweep_interval_secs, 30);
    }
}
