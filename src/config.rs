//! Engine configuration
//!
//! Defaults are usable as-is. YAML files and `OB_DSL_*` environment
//! variables override them; durations are written as whole seconds.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

const DAY: Duration = Duration::from_secs(24 * 60 * 60);

pub const ENV_MAX_SESSIONS: &str = "OB_DSL_MAX_SESSIONS";
pub const ENV_SESSION_TIMEOUT_SECS: &str = "OB_DSL_SESSION_TIMEOUT_SECS";
pub const ENV_STAGE_SECONDS: &str = "OB_DSL_STAGE_SECONDS";
pub const ENV_STRICT_ARGUMENTS: &str = "OB_DSL_STRICT_ARGUMENTS";

/// Orchestrator limits and behaviour
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct OrchestratorConfig {
    pub max_concurrent_sessions: usize,
    #[serde(with = "duration_secs")]
    pub session_timeout: Duration,
    /// Base estimate for one execution stage, scaled by domain complexity
    #[serde(with = "duration_secs")]
    pub stage_base_duration: Duration,
    /// Check verb arguments against their specs, not just verb names
    pub strict_arguments: bool,
    pub persist_sessions: bool,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            max_concurrent_sessions: 100,
            session_timeout: DAY,
            stage_base_duration: Duration::from_secs(30),
            strict_arguments: false,
            persist_sessions: true,
        }
    }
}

impl OrchestratorConfig {
    pub fn from_yaml_str(yaml: &str) -> Result<Self> {
        serde_yaml::from_str(yaml).context("Failed to parse orchestrator config")
    }

    pub fn from_yaml_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let content =
            std::fs::read_to_string(path).with_context(|| format!("Failed to read {:?}", path))?;
        Self::from_yaml_str(&content).with_context(|| format!("Failed to parse {:?}", path))
    }

    /// Defaults overlaid with `OB_DSL_*` environment variables
    pub fn from_env() -> Self {
        Self::default().overlay(|key| std::env::var(key).ok())
    }

    /// Overlay values from `lookup`. Values that do not parse keep the
    /// current setting.
    pub fn overlay(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(n) = lookup(ENV_MAX_SESSIONS).and_then(|v| v.trim().parse().ok()) {
            self.max_concurrent_sessions = n;
        }
        if let Some(secs) = lookup(ENV_SESSION_TIMEOUT_SECS).and_then(|v| v.trim().parse().ok()) {
            self.session_timeout = Duration::from_secs(secs);
        }
        if let Some(secs) = lookup(ENV_STAGE_SECONDS).and_then(|v| v.trim().parse().ok()) {
            self.stage_base_duration = Duration::from_secs(secs);
        }
        if let Some(v) = lookup(ENV_STRICT_ARGUMENTS) {
            if let Some(flag) = parse_bool(&v) {
                self.strict_arguments = flag;
            }
        }
        self
    }
}

/// Per-session behaviour for [`crate::session::SessionManager`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    #[serde(with = "duration_secs")]
    pub idle_timeout: Duration,
    /// Check verb arguments on submit, not just verb names
    pub strict_arguments: bool,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            idle_timeout: DAY,
            strict_arguments: false,
        }
    }
}

impl From<&OrchestratorConfig> for SessionConfig {
    fn from(config: &OrchestratorConfig) -> Self {
        Self {
            idle_timeout: config.session_timeout,
            strict_arguments: config.strict_arguments,
        }
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    match value.trim().to_lowercase().as_str() {
        "true" | "1" | "yes" => Some(true),
        "false" | "0" | "no" => Some(false),
        _ => None,
    }
}

mod duration_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_defaults() {
        let config = OrchestratorConfig::default();
        assert_eq!(config.max_concurrent_sessions, 100);
        assert_eq!(config.session_timeout, Duration::from_secs(86_400));
        assert_eq!(config.stage_base_duration, Duration::from_secs(30));
        assert!(!config.strict_arguments);
        assert!(config.persist_sessions);
    }

    #[test]
    fn test_yaml_partial_override() {
        let config = OrchestratorConfig::from_yaml_str(
            "max_concurrent_sessions: 5\nsession_timeout: 60\nstrict_arguments: true\n",
        )
        .unwrap();
        assert_eq!(config.max_concurrent_sessions, 5);
        assert_eq!(config.session_timeout, Duration::from_secs(60));
        assert_eq!(config.stage_base_duration, Duration::from_secs(30));
        assert!(config.strict_arguments);
    }

    #[test]
    fn test_yaml_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "stage_base_duration: 10").unwrap();
        let config = OrchestratorConfig::from_yaml_file(file.path()).unwrap();
        assert_eq!(config.stage_base_duration, Duration::from_secs(10));

        assert!(OrchestratorConfig::from_yaml_file("/nonexistent/ob-dsl.yaml").is_err());
    }

    #[test]
    fn test_overlay_ignores_unparsable_values() {
        let vars: HashMap<&str, &str> = [
            (ENV_MAX_SESSIONS, "7"),
            (ENV_SESSION_TIMEOUT_SECS, "soon"),
            (ENV_STAGE_SECONDS, " 45 "),
            (ENV_STRICT_ARGUMENTS, "yes"),
        ]
        .into_iter()
        .collect();

        let config =
            OrchestratorConfig::default().overlay(|k| vars.get(k).map(|v| v.to_string()));
        assert_eq!(config.max_concurrent_sessions, 7);
        assert_eq!(config.session_timeout, DAY);
        assert_eq!(config.stage_base_duration, Duration::from_secs(45));
        assert!(config.strict_arguments);
    }

    #[test]
    fn test_session_config_follows_orchestrator() {
        let orchestrator = OrchestratorConfig {
            session_timeout: Duration::from_secs(5),
            strict_arguments: true,
            ..Default::default()
        };
        let session = SessionConfig::from(&orchestrator);
        assert_eq!(session.idle_timeout, Duration::from_secs(5));
        assert!(session.strict_arguments);
    }
}
