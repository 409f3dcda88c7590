//! Configuration loading and management.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use figment::Figment;
use figment::providers::{Env, Format, Serialized, Toml};
use h2wtf_core::{EventName, EventRule, HTTP2_MODULE, LifetimeReport, RuleSet};
use serde::{Deserialize, Serialize};

/// A classification rule from the config file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RuleConfig {
    pub event: EventName,
    pub pattern: String,
    #[serde(default)]
    pub creating: bool,
    #[serde(default)]
    pub aliasing: bool,
}

/// Application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Module tag of the records to classify.
    pub module: String,
    /// Events shown as report columns, in order.
    pub columns: Vec<EventName>,
    /// Attribute FRAME records without passing `--frames`.
    pub frames: bool,
    /// Replaces the built-in httpd rules when non-empty. Order matters.
    pub rules: Vec<RuleConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            module: HTTP2_MODULE.to_string(),
            columns: LifetimeReport::default_columns(),
            frames: false,
            rules: Vec::new(),
        }
    }
}

impl Config {
    /// Loads configuration, optionally from a specific file.
    #[expect(
        clippy::result_large_err,
        reason = "figment::Error is large but only returned at startup"
    )]
    pub fn load_from(config_path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        // Load from default config location
        if let Some(config_dir) = dirs_config_path() {
            figment = figment.merge(Toml::file(config_dir.join("config.toml")));
        }

        // Load from specified config file
        if let Some(path) = config_path {
            figment = figment.merge(Toml::file(path));
        }

        // Load from environment variables (H2WTF_*)
        figment = figment.merge(Env::prefixed("H2WTF_"));

        figment.extract()
    }

    /// Compiles the classification rules, optionally with frame attribution.
    pub fn rule_set(&self, frames: bool) -> Result<RuleSet> {
        let rules = if self.rules.is_empty() {
            let builtin = RuleSet::httpd();
            RuleSet::new(self.module.clone(), builtin.rules().to_vec())
        } else {
            let rules = self
                .rules
                .iter()
                .enumerate()
                .map(|(i, rule)| {
                    let mut compiled = EventRule::new(rule.event.clone(), &rule.pattern)
                        .with_context(|| format!("invalid rule #{}", i + 1))?;
                    if rule.creating {
                        compiled = compiled.creating();
                    }
                    if rule.aliasing {
                        compiled = compiled.aliasing();
                    }
                    Ok(compiled)
                })
                .collect::<Result<Vec<_>>>()?;
            RuleSet::new(self.module.clone(), rules)
        };

        if frames || self.frames {
            Ok(rules.with_frames())
        } else {
            Ok(rules)
        }
    }
}

/// Returns the platform-specific config directory for h2wtf.
///
/// On Linux: `~/.config/h2wtf`
pub fn dirs_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|p| p.join("h2wtf"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    use tempfile::NamedTempFile;

    #[test]
    fn test_dirs_config_path_ends_with_h2wtf() {
        let path = dirs_config_path().unwrap();
        assert_eq!(path.file_name().unwrap(), "h2wtf");
    }

    #[test]
    fn test_default_config_uses_builtin_rules() {
        let config = Config::default();
        assert_eq!(config.module, "http2");
        assert_eq!(config.columns.len(), 8);

        let rules = config.rule_set(false).unwrap();
        assert_eq!(rules.module(), "http2");
        assert_eq!(rules.rules().len(), RuleSet::httpd().rules().len());

        let with_frames = config.rule_set(true).unwrap();
        assert_eq!(with_frames.rules().len(), rules.rules().len() + 1);
    }

    #[test]
    fn test_config_file_overrides_rules_and_columns() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"
module = "proxy_http2"
columns = ["started", "ended"]

[[rules]]
event = "created"
pattern = 'h2_proxy_stream\((?P<session>\d+)-(?P<stream>\d+)\): open'
creating = true

[[rules]]
event = "ended"
pattern = 'h2_proxy_stream\((?P<session>\d+)-(?P<stream>\d+)\): closed'
"#
        )
        .unwrap();

        let config = Config::load_from(Some(file.path())).unwrap();
        assert_eq!(config.module, "proxy_http2");
        assert_eq!(config.columns, [EventName::STARTED, EventName::ENDED]);

        let rules = config.rule_set(false).unwrap();
        assert_eq!(rules.module(), "proxy_http2");
        assert_eq!(rules.rules().len(), 2);
        assert!(rules.rules()[0].is_creating());
        assert!(!rules.rules()[1].is_creating());
    }

    #[test]
    fn test_rule_without_session_group_is_rejected() {
        let config = Config {
            rules: vec![RuleConfig {
                event: EventName::CREATED,
                pattern: r"h2_stream\((?P<stream>\d+)\)".to_string(),
                creating: true,
                aliasing: false,
            }],
            ..Config::default()
        };
        let err = config.rule_set(false).unwrap_err();
        assert_eq!(err.to_string(), "invalid rule #1");
        assert!(format!("{err:#}").contains("session"));
    }
}
