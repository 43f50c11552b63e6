//! Configuration management
//!
//! Settings are resolved in this order:
//! 1. Environment variables
//! 2. `vana.toml` (or the file named by `VANA_CONFIG_PATH`)
//! 3. Defaults
//!
//! `${VAR_NAME}` references inside the config file are expanded from the
//! environment before parsing.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::warn;

use crate::agents::{AgentDescriptor, AgentStatus};
use crate::Error;

/// Default config file name
pub const DEFAULT_CONFIG_FILE: &str = "vana.toml";

/// Routing limits and well-known agent names
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Maximum delegations in one conversation
    #[serde(default = "default_max_hops")]
    pub max_hops: u32,

    /// Maximum transfers between the same two agents in one conversation
    #[serde(default = "default_max_repeat_transfers")]
    pub max_repeat_transfers: usize,

    /// Agent used when no specialist matches a task
    #[serde(default = "default_fallback_agent")]
    pub fallback_agent: String,

    /// Agent that answers directly when delegation is halted
    #[serde(default = "default_root_agent")]
    pub root_agent: String,

    /// Never offer a task to the agent that submitted it
    #[serde(default = "default_exclude_requester")]
    pub exclude_requester: bool,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            max_hops: default_max_hops(),
            max_repeat_transfers: default_max_repeat_transfers(),
            fallback_agent: default_fallback_agent(),
            root_agent: default_root_agent(),
            exclude_requester: default_exclude_requester(),
        }
    }
}

fn default_max_hops() -> u32 {
    6
}

fn default_max_repeat_transfers() -> usize {
    2
}

fn default_fallback_agent() -> String {
    "vana".to_string()
}

fn default_root_agent() -> String {
    crate::agents::ROOT_REQUESTER.to_string()
}

fn default_exclude_requester() -> bool {
    true
}

/// Health probe settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HealthConfig {
    /// Timeout for one HTTP liveness check
    #[serde(default = "default_health_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_health_timeout_secs(),
        }
    }
}

fn default_health_timeout_secs() -> u64 {
    5
}

/// One roster entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub name: String,

    #[serde(default)]
    pub capabilities: Vec<String>,

    /// Liveness endpoint for the HTTP probe
    #[serde(default)]
    pub health_url: Option<String>,

    /// Initial status (defaults to available)
    #[serde(default)]
    pub status: Option<AgentStatus>,
}

impl AgentConfig {
    pub fn new(name: impl Into<String>, capabilities: &[&str]) -> Self {
        Self {
            name: name.into(),
            capabilities: capabilities.iter().map(|c| c.to_string()).collect(),
            health_url: None,
            status: None,
        }
    }

    pub fn to_descriptor(&self) -> AgentDescriptor {
        let mut agent = AgentDescriptor::new(self.name.clone(), &self.capabilities)
            .with_status(self.status.unwrap_or_default());
        if let Some(url) = &self.health_url {
            agent = agent.with_health_url(url.clone());
        }
        agent
    }
}

/// Built-in specialist roster
pub fn default_roster() -> Vec<AgentConfig> {
    vec![
        AgentConfig::new("vana", &["coordination", "general"]),
        AgentConfig::new("architecture_specialist", &["architecture", "system_design"]),
        AgentConfig::new("ui_specialist", &["ui", "frontend", "design"]),
        AgentConfig::new("devops_specialist", &["devops", "deployment", "infrastructure"]),
        AgentConfig::new("qa_specialist", &["testing", "qa", "quality"]),
        AgentConfig::new(
            "data_science_specialist",
            &["data_analysis", "statistics", "visualization"],
        ),
        AgentConfig::new("research_specialist", &["research", "search"]),
    ]
}

/// Main configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub coordinator: CoordinatorConfig,

    #[serde(default)]
    pub health: HealthConfig,

    /// Agent roster, in registration order
    #[serde(default = "default_roster")]
    pub agents: Vec<AgentConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            coordinator: CoordinatorConfig::default(),
            health: HealthConfig::default(),
            agents: default_roster(),
        }
    }
}

impl Config {
    /// Replace `${VAR_NAME}` with the variable's value; unset variables
    /// expand to an empty string.
    fn expand_env_vars(value: &str) -> String {
        let mut result = String::new();
        let mut chars = value.chars().peekable();

        while let Some(c) = chars.next() {
            if c == '$' && chars.peek() == Some(&'{') {
                chars.next();

                let mut var_name = String::new();
                for c in chars.by_ref() {
                    if c == '}' {
                        break;
                    }
                    var_name.push(c);
                }

                if let Ok(env_value) = std::env::var(&var_name) {
                    result.push_str(&env_value);
                }
            } else {
                result.push(c);
            }
        }

        result
    }

    /// Parse a TOML document, expanding environment references first
    pub fn from_toml_str(content: &str) -> crate::Result<Self> {
        let expanded = Self::expand_env_vars(content);
        toml::from_str(&expanded)
            .map_err(|e| Error::Config(format!("Failed to parse TOML: {}", e)))
    }

    /// Load a TOML config file; environment variables take precedence
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> crate::Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!(
                "Failed to read config file {}: {}",
                path.display(),
                e
            ))
        })?;

        let mut config = Self::from_toml_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Load from `VANA_CONFIG_PATH`, then `./vana.toml`, then the
    /// environment alone
    pub fn load() -> crate::Result<Self> {
        if let Ok(path) = std::env::var("VANA_CONFIG_PATH") {
            if !path.is_empty() {
                return Self::from_toml_file(path);
            }
        }

        if Path::new(DEFAULT_CONFIG_FILE).exists() {
            return Self::from_toml_file(DEFAULT_CONFIG_FILE);
        }

        Self::from_env()
    }

    /// Defaults plus environment overrides
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Self::default();
        config.apply_env_overrides();
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Some(max_hops) = env_parse("VANA_MAX_HOPS") {
            self.coordinator.max_hops = max_hops;
        }
        if let Some(max_repeat) = env_parse("VANA_MAX_REPEAT_TRANSFERS") {
            self.coordinator.max_repeat_transfers = max_repeat;
        }
        if let Ok(agent) = std::env::var("VANA_FALLBACK_AGENT") {
            if !agent.is_empty() {
                self.coordinator.fallback_agent = agent;
            }
        }
        if let Ok(agent) = std::env::var("VANA_ROOT_AGENT") {
            if !agent.is_empty() {
                self.coordinator.root_agent = agent;
            }
        }
        if let Some(timeout) = env_parse("VANA_HEALTH_TIMEOUT_SECS") {
            self.health.timeout_secs = timeout;
        }
    }

    /// Reject configurations the coordinator cannot run with
    pub fn validate(&self) -> crate::Result<()> {
        let coordinator = &self.coordinator;

        if coordinator.max_hops == 0 {
            return Err(Error::Config("max_hops must be at least 1".to_string()));
        }
        if coordinator.max_repeat_transfers == 0 {
            return Err(Error::Config(
                "max_repeat_transfers must be at least 1".to_string(),
            ));
        }
        if coordinator.root_agent.trim().is_empty() {
            return Err(Error::Config("root_agent must not be empty".to_string()));
        }

        let mut seen = HashSet::new();
        for agent in &self.agents {
            if agent.name.trim().is_empty() {
                return Err(Error::Config("agent name must not be empty".to_string()));
            }
            if !seen.insert(agent.name.as_str()) {
                return Err(Error::Config(format!(
                    "agent listed twice in roster: {}",
                    agent.name
                )));
            }
            if agent.capabilities.iter().all(|c| c.trim().is_empty()) {
                return Err(Error::Config(format!(
                    "agent {} declares no capabilities",
                    agent.name
                )));
            }
        }

        if !seen.contains(coordinator.fallback_agent.as_str()) {
            return Err(Error::Config(format!(
                "fallback agent {} is not in the roster",
                coordinator.fallback_agent
            )));
        }

        Ok(())
    }

    /// Roster as agent descriptors, in registration order
    pub fn descriptors(&self) -> Vec<AgentDescriptor> {
        self.agents.iter().map(AgentConfig::to_descriptor).collect()
    }
}

fn env_parse<T: std::str::FromStr>(key: &str) -> Option<T> {
    let value = std::env::var(key).ok()?;
    match value.trim().parse() {
        Ok(parsed) => Some(parsed),
        Err(_) => {
            warn!("Ignoring invalid value for {}: {}", key, value);
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_coordinator_config_default() {
        let config = CoordinatorConfig::default();
        assert_eq!(config.max_hops, 6);
        assert_eq!(config.max_repeat_transfers, 2);
        assert_eq!(config.fallback_agent, "vana");
        assert_eq!(config.root_agent, "root");
        assert!(config.exclude_requester);
    }

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.agents.len(), 7);
        assert_eq!(config.health.timeout_secs, 5);
    }

    #[test]
    fn test_expand_env_vars() {
        unsafe {
            std::env::set_var("VANA_TEST_EXPAND_VAR", "test_value");
        }

        let result = Config::expand_env_vars("prefix_${VANA_TEST_EXPAND_VAR}_suffix");
        assert_eq!(result, "prefix_test_value_suffix");

        let result = Config::expand_env_vars("prefix_${VANA_NONEXISTENT_VAR}_suffix");
        assert_eq!(result, "prefix__suffix");

        unsafe {
            std::env::remove_var("VANA_TEST_EXPAND_VAR");
        }
    }

    #[test]
    fn test_expand_env_vars_no_braces() {
        assert_eq!(Config::expand_env_vars("no_vars_here $HOME"), "no_vars_here $HOME");
    }

    #[test]
    fn test_toml_config_parsing() {
        let toml_content = r#"
[coordinator]
max_hops = 4
max_repeat_transfers = 3
fallback_agent = "sage"

[health]
timeout_secs = 2

[[agents]]
name = "rhea"
capabilities = ["data_analysis"]
health_url = "http://localhost:9001/health"

[[agents]]
name = "sage"
capabilities = ["research"]
status = "busy"
"#;

        let config = Config::from_toml_str(toml_content).unwrap();

        assert_eq!(config.coordinator.max_hops, 4);
        assert_eq!(config.coordinator.max_repeat_transfers, 3);
        assert_eq!(config.coordinator.fallback_agent, "sage");
        assert_eq!(config.coordinator.root_agent, "root");
        assert_eq!(config.health.timeout_secs, 2);
        assert_eq!(config.agents.len(), 2);
        assert!(config.validate().is_ok());

        let descriptors = config.descriptors();
        assert_eq!(descriptors[0].name, "rhea");
        assert_eq!(
            descriptors[0].health_url.as_deref(),
            Some("http://localhost:9001/health")
        );
        assert_eq!(descriptors[1].status, AgentStatus::Busy);
    }

    #[test]
    fn test_toml_without_agents_uses_default_roster() {
        let config = Config::from_toml_str("[coordinator]\nmax_hops = 3\n").unwrap();
        assert_eq!(config.coordinator.max_hops, 3);
        assert_eq!(config.agents, default_roster());
    }

    #[test]
    fn test_from_toml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "[coordinator]\nfallback_agent = \"rhea\"\n\n[[agents]]\nname = \"rhea\"\ncapabilities = [\"data_analysis\"]"
        )
        .unwrap();

        let config = Config::from_toml_file(file.path()).unwrap();
        assert_eq!(config.agents.len(), 1);
        assert_eq!(config.coordinator.fallback_agent, "rhea");
    }

    #[test]
    fn test_from_toml_file_missing() {
        let err = Config::from_toml_file("/nonexistent/vana.toml").unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_invalid_toml() {
        assert!(matches!(
            Config::from_toml_str("[coordinator\nmax_hops = "),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn test_validate_rejects_bad_limits() {
        let mut config = Config::default();
        config.coordinator.max_hops = 0;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.coordinator.max_repeat_transfers = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_roster_problems() {
        let mut config = Config::default();
        config.agents.push(AgentConfig::new("vana", &["other"]));
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.agents.push(AgentConfig::new("mute", &[]));
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.coordinator.fallback_agent = "ghost".to_string();
        assert!(config.validate().is_err());
    }
}
