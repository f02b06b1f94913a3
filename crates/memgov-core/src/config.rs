//! Governance and per-agent memory configuration.
//!
//! `GovernanceConfig` deserializes from TOML with every field defaulted, so
//! a partial file only overrides what it names:
//!
//! ```toml
//! dedupe_enabled = true
//! default_rules = ["Only approvers can approve"]
//!
//! [trust]
//! required_approvals = 3
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::impact::{DEFAULT_IMPACT_DEPTH, DEFAULT_IMPACT_MAX_ITEMS};
use crate::item::Authority;
use crate::links::MAX_LINKS;
use crate::store::CommitPolicy;
use crate::trust::TrustRules;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid config {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid value for {field}: {message}")]
    Validation { field: String, message: String },
}

pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Engine-wide governance settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GovernanceConfig {
    pub trust: TrustRules,
    pub dedupe_enabled: bool,
    /// Highest authority first.
    pub authority_order: Vec<Authority>,
    /// Rule texts that are always active for every team.
    pub default_rules: Vec<String>,
    pub impact_depth: usize,
    pub impact_max_items: usize,
    pub preview_depth: usize,
    pub preview_max_items: usize,
    pub semantic_recall_limit: usize,
    pub max_links: usize,
}

impl Default for GovernanceConfig {
    fn default() -> Self {
        Self::standard()
    }
}

impl GovernanceConfig {
    pub fn standard() -> Self {
        Self {
            trust: TrustRules::standard(),
            dedupe_enabled: true,
            authority_order: Authority::DEFAULT_ORDER.to_vec(),
            default_rules: Vec::new(),
            impact_depth: DEFAULT_IMPACT_DEPTH,
            impact_max_items: DEFAULT_IMPACT_MAX_ITEMS,
            preview_depth: 1,
            preview_max_items: 5,
            semantic_recall_limit: 10,
            max_links: MAX_LINKS,
        }
    }

    pub fn from_toml_str(toml_str: &str) -> ConfigResult<Self> {
        Self::parse(toml_str, "<string>")
    }

    pub fn load(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(&content, &path.display().to_string())
    }

    fn parse(content: &str, origin: &str) -> ConfigResult<Self> {
        let config: Self = toml::from_str(content).map_err(|e| ConfigError::Parse {
            path: origin.to_string(),
            message: e.to_string(),
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> ConfigResult<()> {
        if self.max_links == 0 {
            return Err(ConfigError::Validation {
                field: "max_links".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        if self.trust.required_approvals == 0 {
            return Err(ConfigError::Validation {
                field: "trust.required_approvals".to_string(),
                message: "must be greater than 0".to_string(),
            });
        }
        Ok(())
    }

    pub fn commit_policy(&self) -> CommitPolicy {
        CommitPolicy {
            dedupe_enabled: self.dedupe_enabled,
            authority_order: self.authority_order.clone(),
        }
    }
}

/// Per-agent memory toggles.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    /// Conversational turns kept before folding into a summary; 0 disables
    /// short-term writes.
    pub short_term: usize,
    pub semantic: bool,
    pub profile: bool,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            short_term: 4,
            semantic: true,
            profile: true,
        }
    }
}

/// An AI profile as the interpreter declares it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub name: String,
    #[serde(default)]
    pub memory: MemoryConfig,
}

impl AgentProfile {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            memory: MemoryConfig::default(),
        }
    }

    pub fn with_memory(mut self, memory: MemoryConfig) -> Self {
        self.memory = memory;
        self
    }
}

/// Explicit team and project context for administrative calls.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GovernanceContext {
    pub team_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project_root: Option<PathBuf>,
    #[serde(default)]
    pub config: GovernanceConfig,
}

impl GovernanceContext {
    pub fn new(team_id: impl Into<String>) -> Self {
        Self {
            team_id: team_id.into(),
            project_root: None,
            config: GovernanceConfig::standard(),
        }
    }

    pub fn with_project_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.project_root = Some(root.into());
        self
    }

    pub fn with_config(mut self, config: GovernanceConfig) -> Self {
        self.config = config;
        self
    }

    /// Final component of the project root, else the team id.
    pub fn project_id(&self) -> String {
        self.project_root
            .as_deref()
            .and_then(Path::file_name)
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| !name.is_empty())
            .unwrap_or_else(|| self.team_id.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::trust::TrustLevel;
    use std::io::Write;

    #[test]
    fn test_partial_toml_keeps_defaults() {
        let config = GovernanceConfig::from_toml_str(
            r#"
            default_rules = ["Only approvers can approve"]

            [trust]
            required_approvals = 3
            "#,
        )
        .unwrap();
        assert_eq!(config.trust.required_approvals, 3);
        assert_eq!(config.trust.who_can_approve, TrustLevel::Approver);
        assert!(config.dedupe_enabled);
        assert_eq!(config.impact_depth, 2);
        assert_eq!(config.default_rules.len(), 1);
    }

    #[test]
    fn test_invalid_values_are_rejected() {
        let err = GovernanceConfig::from_toml_str("max_links = 0").unwrap_err();
        assert!(matches!(err, ConfigError::Validation { .. }));
        let err = GovernanceConfig::from_toml_str("max_links = \"ten\"").unwrap_err();
        assert!(matches!(err, ConfigError::Parse { .. }));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "authority_order = [\"user\", \"system\", \"tool\", \"ai\"]").unwrap();
        let config = GovernanceConfig::load(file.path()).unwrap();
        assert_eq!(config.authority_order[0], Authority::User);

        let missing = GovernanceConfig::load(Path::new("/nonexistent/governance.toml"));
        assert!(matches!(missing, Err(ConfigError::Io { .. })));
    }

    #[test]
    fn test_project_id_from_root_or_team() {
        let ctx = GovernanceContext::new("team-1");
        assert_eq!(ctx.project_id(), "team-1");
        let ctx = ctx.with_project_root("/work/demo");
        assert_eq!(ctx.project_id(), "demo");
    }
}
