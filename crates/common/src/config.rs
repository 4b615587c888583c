use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::str::FromStr;

use crate::types::DeploymentMode;

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub general: General,
    pub database: Database,
    pub activity: Activity,
    pub vault: Vault,
    pub observability: Observability,
}

#[derive(Debug, Clone, Deserialize)]
pub struct General {
    pub mode: DeploymentMode,
    pub log_level: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Database {
    pub path: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Activity {
    pub default_limit: usize,
    pub max_limit: usize,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Vault {
    /// Name of the environment variable holding the encryption secret.
    /// The secret itself never lives in the config file.
    pub secret_env: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Observability {
    pub service_name: String,
    #[serde(default = "default_json_logs")]
    pub json_logs: bool,
}

fn default_json_logs() -> bool {
    true
}

impl Config {
    pub fn load(path: &str) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file: {path}"))?;
        Self::from_toml_str(&content)
    }

    pub fn from_toml_str(s: &str) -> Result<Self> {
        let config: Config = toml::from_str(s).context("failed to parse botfeed config")?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        anyhow::ensure!(
            !self.database.path.trim().is_empty(),
            "database.path must not be empty"
        );
        anyhow::ensure!(self.activity.max_limit > 0, "activity.max_limit must be > 0");
        anyhow::ensure!(
            self.activity.default_limit > 0 && self.activity.default_limit <= self.activity.max_limit,
            "activity.default_limit must be in [1, max_limit]"
        );
        anyhow::ensure!(
            !self.vault.secret_env.trim().is_empty(),
            "vault.secret_env must name an environment variable"
        );
        Ok(())
    }

    /// Read the encryption secret from the environment variable named in
    /// `[vault]`. Called once at startup; empty values count as missing.
    pub fn encryption_secret(&self) -> Option<String> {
        std::env::var(&self.vault.secret_env)
            .ok()
            .filter(|s| !s.is_empty())
    }

    pub fn default_config_path() -> String {
        let candidate = Path::new("config/default.toml");
        if candidate.exists() {
            return candidate.to_string_lossy().to_string();
        }

        // Running from inside a crate directory (cargo test).
        let candidate = Path::new("../../config/default.toml");
        if candidate.exists() {
            return candidate.to_string_lossy().to_string();
        }

        "config/default.toml".to_string()
    }
}

impl FromStr for Config {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        Self::from_toml_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_config() -> &'static str {
        r#"
[general]
mode = "development"
log_level = "info"

[database]
path = "data/botfeed.db"

[activity]
default_limit = 30
max_limit = 200

[vault]
secret_env = "BOTFEED_ENCRYPTION_SECRET"

[observability]
service_name = "botctl"
"#
    }

    #[test]
    fn test_load_default_config() {
        let config = Config::from_toml_str(include_str!("../../../config/default.toml")).unwrap();
        assert_eq!(config.general.mode, DeploymentMode::Production);
        assert_eq!(config.activity.default_limit, 30);
        assert!(config.activity.max_limit >= config.activity.default_limit);
    }

    #[test]
    fn test_parse_valid_config() {
        let config: Config = sample_config().parse().unwrap();
        assert_eq!(config.database.path, "data/botfeed.db");
        assert_eq!(config.vault.secret_env, "BOTFEED_ENCRYPTION_SECRET");
        assert_eq!(config.observability.service_name, "botctl");
        assert!(config.observability.json_logs);
    }

    #[test]
    fn test_parse_production_mode() {
        let content = sample_config().replace("\"development\"", "\"production\"");
        let config = Config::from_toml_str(&content).unwrap();
        assert_eq!(config.general.mode, DeploymentMode::Production);
    }

    #[test]
    fn test_unknown_mode_is_rejected() {
        let content = sample_config().replace("\"development\"", "\"staging\"");
        assert!(Config::from_toml_str(&content).is_err());
    }

    #[test]
    fn test_missing_section_is_rejected() {
        let bad = "
[general]
mode = \"development\"
log_level = \"info\"
";
        assert!(Config::from_toml_str(bad).is_err());
    }

    #[test]
    fn test_default_limit_above_max_is_rejected() {
        let content = sample_config().replace("default_limit = 30", "default_limit = 500");
        let err = Config::from_toml_str(&content).unwrap_err();
        assert!(err
            .to_string()
            .contains("activity.default_limit must be in [1, max_limit]"));
    }

    #[test]
    fn test_encryption_secret_reads_named_env_var() {
        let content = sample_config().replace(
            "BOTFEED_ENCRYPTION_SECRET",
            "BOTFEED_TEST_SECRET_CONFIG_RS",
        );
        let config = Config::from_toml_str(&content).unwrap();
        assert_eq!(config.encryption_secret(), None);

        std::env::set_var("BOTFEED_TEST_SECRET_CONFIG_RS", "s3cret");
        assert_eq!(config.encryption_secret().as_deref(), Some("s3cret"));

        std::env::set_var("BOTFEED_TEST_SECRET_CONFIG_RS", "");
        assert_eq!(config.encryption_secret(), None);
        std::env::remove_var("BOTFEED_TEST_SECRET_CONFIG_RS");
    }
}
