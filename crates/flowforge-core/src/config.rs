use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{FlowforgeError, Result};

/// Top-level Flowforge configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub endpoint: EndpointConfig,
    #[serde(default)]
    pub routing: RoutingConfig,
    #[serde(default)]
    pub simulation: SimulationConfig,
}

/// Execution endpoint the composed graph is handed to for test runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndpointConfig {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Prefer the chunked streaming response shape when true.
    #[serde(default = "default_streaming")]
    pub streaming: bool,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for EndpointConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            api_key: None,
            streaming: default_streaming(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

/// Defaults applied to persona routers that do not configure their own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoutingConfig {
    #[serde(default = "default_detection_method")]
    pub method: String,
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,
    #[serde(default)]
    pub default_agent: Option<String>,
}

impl Default for RoutingConfig {
    fn default() -> Self {
        Self {
            method: default_detection_method(),
            confidence_threshold: default_confidence_threshold(),
            default_agent: None,
        }
    }
}

/// Tuning for the simulated traversal pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Artificial delay between node steps, in milliseconds.
    /// Keeps progress observable in interactive frontends.
    #[serde(default = "default_step_delay_ms")]
    pub step_delay_ms: u64,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            step_delay_ms: default_step_delay_ms(),
        }
    }
}

fn default_base_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_streaming() -> bool {
    true
}
fn default_timeout_secs() -> u64 {
    120
}
fn default_detection_method() -> String {
    "keywords".to_string()
}
fn default_confidence_threshold() -> f64 {
    0.7
}
fn default_step_delay_ms() -> u64 {
    0
}

impl AppConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|_| FlowforgeError::ConfigNotFound(path.display().to_string()))?;

        // Expand ${ENV_VAR} references
        let expanded = expand_env_vars(&content);

        toml::from_str(&expanded).map_err(|e| FlowforgeError::Config(e.to_string()))
    }
}

/// Expand `${ENV_VAR}` patterns in a string.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(c) = chars.next() {
        if c == '$' && chars.peek() == Some(&'{') {
            chars.next(); // consume '{'
            let mut var_name = String::new();
            for c in chars.by_ref() {
                if c == '}' {
                    break;
                }
                var_name.push(c);
            }
            match std::env::var(&var_name) {
                Ok(val) => result.push_str(&val),
                Err(_) => {
                    // Keep original if env var not set
                    result.push_str(&format!("${{{}}}", var_name));
                }
            }
        } else {
            result.push(c);
        }
    }
    result
}
