//! Governor configuration, loaded from `.gv/governor.toml`.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use gv_audit::DispatcherConfig;

use crate::catalog::{EVALUATE_CAPABILITY, LIFECYCLE_CAPABILITY};
use crate::error::GovernorError;

/// Directory holding the governor's files inside a project.
pub const CONFIG_DIR: &str = ".gv";

/// Config file name inside [`CONFIG_DIR`].
pub const CONFIG_FILE: &str = "governor.toml";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GovernorConfig {
    /// Tenant this governor records events for.
    #[serde(default = "default_tenant")]
    pub tenant_id: String,

    /// Append-only audit log (JSONL).
    #[serde(default = "default_audit_log")]
    pub audit_log: PathBuf,

    /// Durable retry queue for events the dispatcher could not deliver.
    #[serde(default = "default_spool")]
    pub spool_path: PathBuf,

    /// Queue capacity and retry policy for non-blocking audit writes.
    #[serde(default)]
    pub dispatcher: DispatcherConfig,

    /// Minimum time between two identical evaluation records.
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,

    /// Capability ids accepted on audit events.
    #[serde(default = "default_capabilities")]
    pub capabilities: Vec<String>,

    /// Severity names from least to most severe. A signal's rank is its
    /// index in this list.
    #[serde(default = "default_severities")]
    pub severities: Vec<String>,
}

impl Default for GovernorConfig {
    fn default() -> Self {
        Self {
            tenant_id: default_tenant(),
            audit_log: default_audit_log(),
            spool_path: default_spool(),
            dispatcher: DispatcherConfig::default(),
            cooldown_secs: default_cooldown_secs(),
            capabilities: default_capabilities(),
            severities: default_severities(),
        }
    }
}

fn default_tenant() -> String {
    "default".to_string()
}

fn default_audit_log() -> PathBuf {
    Path::new(CONFIG_DIR).join("audit.jsonl")
}

fn default_spool() -> PathBuf {
    Path::new(CONFIG_DIR).join("audit-spool.jsonl")
}

fn default_cooldown_secs() -> u64 {
    300
}

fn default_capabilities() -> Vec<String> {
    vec![LIFECYCLE_CAPABILITY.to_string(), EVALUATE_CAPABILITY.to_string()]
}

fn default_severities() -> Vec<String> {
    ["info", "low", "medium", "high", "critical"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

impl GovernorConfig {
    /// Create a config with the standard `.gv/` layout for a project.
    pub fn for_project(project_root: impl AsRef<Path>) -> Self {
        Self::default().rooted_at(project_root)
    }

    /// Parse a config file. A missing file yields the defaults.
    pub fn load(path: &Path) -> Result<Self, GovernorError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| GovernorError::ConfigRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(toml::from_str(&content)?)
    }

    /// Load `.gv/governor.toml` under `project_root`. Relative paths in the
    /// file are taken relative to the project root.
    pub fn load_from_project(project_root: impl AsRef<Path>) -> Result<Self, GovernorError> {
        let root = project_root.as_ref();
        let config = Self::load(&root.join(CONFIG_DIR).join(CONFIG_FILE))?;
        tracing::debug!(root = %root.display(), tenant = %config.tenant_id, "governor config loaded");
        Ok(config.rooted_at(root))
    }

    pub fn cooldown(&self) -> std::time::Duration {
        std::time::Duration::from_secs(self.cooldown_secs)
    }

    fn rooted_at(mut self, root: impl AsRef<Path>) -> Self {
        let root = root.as_ref();
        if self.audit_log.is_relative() {
            self.audit_log = root.join(&self.audit_log);
        }
        if self.spool_path.is_relative() {
            self.spool_path = root.join(&self.spool_path);
        }
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn for_project_uses_gv_layout() {
        let config = GovernorConfig::for_project("/work/app");
        assert_eq!(config.audit_log, PathBuf::from("/work/app/.gv/audit.jsonl"));
        assert_eq!(
            config.spool_path,
            PathBuf::from("/work/app/.gv/audit-spool.jsonl")
        );
        assert_eq!(config.dispatcher.retry.max_attempts, 5);
        assert_eq!(config.severities.len(), 5);
    }

    #[test]
    fn missing_file_gives_defaults() {
        let dir = tempdir().unwrap();
        let config = GovernorConfig::load_from_project(dir.path()).unwrap();
        assert_eq!(config, GovernorConfig::for_project(dir.path()));
    }

    #[test]
    fn partial_file_overrides_only_what_it_names() {
        let dir = tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join(CONFIG_DIR)).unwrap();
        std::fs::write(
            dir.path().join(CONFIG_DIR).join(CONFIG_FILE),
            r#"
tenant_id = "acme"
cooldown_secs = 60
audit_log = "/var/log/gv/audit.jsonl"

[dispatcher]
queue_capacity = 16

[dispatcher.retry]
max_attempts = 3
"#,
        )
        .unwrap();

        let config = GovernorConfig::load_from_project(dir.path()).unwrap();
        assert_eq!(config.tenant_id, "acme");
        assert_eq!(config.cooldown(), std::time::Duration::from_secs(60));
        assert_eq!(config.audit_log, PathBuf::from("/var/log/gv/audit.jsonl"));
        assert_eq!(config.spool_path, dir.path().join(".gv/audit-spool.jsonl"));
        assert_eq!(config.dispatcher.queue_capacity, 16);
        assert_eq!(config.dispatcher.retry.max_attempts, 3);
        assert_eq!(config.dispatcher.retry.max_backoff_ms, 1_000);
        assert_eq!(config.capabilities, default_capabilities());
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("governor.toml");
        std::fs::write(&path, "tenant_id = [").unwrap();
        assert!(matches!(
            GovernorConfig::load(&path),
            Err(GovernorError::ConfigParse(_))
        ));
    }
}
