//! Configuration for the switchboard engine and gateway
//!
//! Read from a TOML file. A missing file yields the defaults; a malformed one
//! is an error. Secrets are never stored in the file: `catalog.token_env`
//! names the environment variable holding the catalog token.

use std::path::Path;
use std::sync::Arc;

use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::loader::Manifest;
use crate::sync::SyncMode;
use crate::validation::{BlocklistRule, CooldownRule, RuleModule, ValidationRule};

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SwitchboardConfig {
    pub catalog: CatalogConfig,
    pub access: AccessConfig,
    pub sync: SyncConfig,
    pub dispatch: DispatchConfig,
    pub validation: ValidationConfig,
    pub gateway: GatewayConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CatalogConfig {
    /// REST base URL of the remote catalog; in-memory catalog when unset
    pub base_url: Option<String>,
    pub application_id: String,
    /// Environment variable holding the catalog token
    pub token_env: String,
    /// Restricted scope ids that receive operator-only commands
    pub restricted_targets: Vec<String>,
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            application_id: String::new(),
            token_env: "SWITCHBOARD_TOKEN".to_string(),
            restricted_targets: Vec::new(),
        }
    }
}

impl CatalogConfig {
    pub fn token(&self) -> Option<String> {
        std::env::var(&self.token_env).ok().filter(|t| !t.is_empty())
    }
}

/// Restricted-scope allow-lists.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    pub developer_ids: Vec<String>,
    pub developer_groups: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub mode: SyncMode,
    pub on_startup: bool,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::Incremental,
            on_startup: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DispatchConfig {
    /// Keep retired commands invocable even though they are not synchronized
    pub dispatch_retired: bool,
}

impl Default for DispatchConfig {
    fn default() -> Self {
        Self {
            dispatch_retired: true,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationConfig {
    /// Evaluated in file order
    pub rules: Vec<RuleConfig>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RuleConfig {
    Blocklist {
        #[serde(default)]
        identities: Vec<String>,
        #[serde(default)]
        groups: Vec<String>,
    },
    Cooldown {
        seconds: i64,
        /// Limit to these commands; every command when empty
        #[serde(default)]
        commands: Vec<String>,
    },
}

impl RuleConfig {
    pub fn build(&self) -> Arc<dyn ValidationRule> {
        match self {
            RuleConfig::Blocklist { identities, groups } => {
                Arc::new(BlocklistRule::new(identities.clone(), groups.clone()))
            }
            RuleConfig::Cooldown { seconds, commands } => {
                // Out-of-range values are refused by `validate`; saturate here
                let window = Duration::try_seconds(*seconds).unwrap_or(Duration::MAX);
                let rule = CooldownRule::new(window);
                if commands.is_empty() {
                    Arc::new(rule)
                } else {
                    Arc::new(rule.for_commands(commands.clone()))
                }
            }
        }
    }

    fn label(&self) -> &'static str {
        match self {
            RuleConfig::Blocklist { .. } => "blocklist",
            RuleConfig::Cooldown { .. } => "cooldown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    pub bind_addr: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind_addr: "127.0.0.1:8844".to_string(),
        }
    }
}

impl SwitchboardConfig {
    /// Load configuration from file; defaults when the file does not exist.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn from_toml(content: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(content)
    }

    /// Rule modules in configured order, ready for `load_rules`.
    pub fn rule_manifest(&self) -> Manifest<RuleModule> {
        self.validation
            .rules
            .iter()
            .enumerate()
            .fold(Manifest::new(), |manifest, (idx, rule)| {
                manifest.register(RuleModule::new(
                    format!("config.validation.rules[{}].{}", idx, rule.label()),
                    rule.build(),
                ))
            })
    }

    /// Non-fatal configuration problems.
    pub fn validate(&self) -> Result<Vec<String>, ConfigError> {
        let mut warnings = Vec::new();

        if self.catalog.base_url.is_some() && self.catalog.application_id.is_empty() {
            return Err(ConfigError::Invalid(
                "catalog.application_id is required when catalog.base_url is set".to_string(),
            ));
        }
        for rule in &self.validation.rules {
            if let RuleConfig::Cooldown { seconds, .. } = rule {
                if *seconds < 0 {
                    return Err(ConfigError::Invalid(format!(
                        "cooldown seconds must not be negative (got {})",
                        seconds
                    )));
                }
                let representable = Duration::try_seconds(*seconds)
                    .and_then(|window| Utc::now().checked_add_signed(window))
                    .is_some();
                if !representable {
                    return Err(ConfigError::Invalid(format!(
                        "cooldown seconds is out of range (got {})",
                        seconds
                    )));
                }
            }
        }

        if !self.catalog.restricted_targets.is_empty()
            && self.access.developer_ids.is_empty()
            && self.access.developer_groups.is_empty()
        {
            warnings.push(
                "restricted targets are configured but no developer ids or groups are allowed; \
                 operator-only commands will reject everyone"
                    .to_string(),
            );
        }
        if self.catalog.base_url.is_some() && self.catalog.token().is_none() {
            warnings.push(format!(
                "catalog token environment variable {} is not set",
                self.catalog.token_env
            ));
        }
        Ok(warnings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = r#"
[catalog]
base_url = "https://catalog.example.test/api"
application_id = "1234"
restricted_targets = ["9001"]

[access]
developer_ids = ["42"]

[sync]
mode = "bulk"

[dispatch]
dispatch_retired = false

[[validation.rules]]
kind = "blocklist"
identities = ["666"]

[[validation.rules]]
kind = "cooldown"
seconds = 5
commands = ["giveaway"]
"#;

    #[test]
    fn parses_full_file() {
        let config = SwitchboardConfig::from_toml(SAMPLE).unwrap();
        assert_eq!(config.catalog.restricted_targets, vec!["9001".to_string()]);
        assert_eq!(config.sync.mode, SyncMode::Bulk);
        assert!(config.sync.on_startup);
        assert!(!config.dispatch.dispatch_retired);
        assert_eq!(
            config.validation.rules[1],
            RuleConfig::Cooldown {
                seconds: 5,
                commands: vec!["giveaway".to_string()]
            }
        );
        assert_eq!(config.gateway.bind_addr, "127.0.0.1:8844");
    }

    #[test]
    fn rule_manifest_keeps_file_order() {
        let config = SwitchboardConfig::from_toml(SAMPLE).unwrap();
        let origins: Vec<_> = config
            .rule_manifest()
            .into_entries()
            .into_iter()
            .map(|(_, module)| module.origin)
            .collect();
        assert_eq!(
            origins,
            vec![
                "config.validation.rules[0].blocklist".to_string(),
                "config.validation.rules[1].cooldown".to_string()
            ]
        );
    }

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = SwitchboardConfig::load(&dir.path().join("absent.toml")).unwrap();
        assert_eq!(config, SwitchboardConfig::default());
        assert!(config.dispatch.dispatch_retired);
    }

    #[test]
    fn malformed_file_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("switchboard.toml");
        std::fs::write(&path, "[sync]\nmode = \"sideways\"\n").unwrap();
        assert!(matches!(
            SwitchboardConfig::load(&path),
            Err(ConfigError::Parse { .. })
        ));
    }

    #[test]
    fn validate_flags_empty_allow_lists() {
        let config = SwitchboardConfig::from_toml("[catalog]\nrestricted_targets = [\"1\"]\n").unwrap();
        let warnings = config.validate().unwrap();
        assert_eq!(warnings.len(), 1);
        assert!(warnings[0].contains("restricted targets"));
    }

    #[test]
    fn validate_requires_application_id_with_base_url() {
        let config = SwitchboardConfig::from_toml("[catalog]\nbase_url = \"https://x.test\"\n").unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn validate_rejects_cooldown_past_the_calendar() {
        let config =
            SwitchboardConfig::from_toml("[[validation.rules]]\nkind = \"cooldown\"\nseconds = 9000000000000000\n")
                .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn oversized_cooldown_builds_without_panicking() {
        let config =
            SwitchboardConfig::from_toml("[[validation.rules]]\nkind = \"cooldown\"\nseconds = 100000000000000000\n")
                .unwrap();
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        assert_eq!(config.rule_manifest().into_entries().len(), 1);
    }
}
