use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level configuration (loaded from coffer.toml)
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CofferConfig {
    pub master_key: MasterKeyConfig,
    pub defaults: BoxDefaults,
    pub migration: MigrationConfig,
    pub log: LogConfig,
}

/// Where the process-wide master key comes from
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MasterKeyConfig {
    /// Environment variable read on first access (default: COFFER_MASTER_KEY)
    pub env_var: String,
    /// File whose trimmed contents are the master key (takes precedence over env)
    pub file: Option<PathBuf>,
}

/// Options applied to every box unless the attribute config overrides them
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoxDefaults {
    /// Symmetric algorithm: "aes-gcm" or "xchacha20"
    pub algorithm: String,
    /// Padding block size in bytes (0 = no padding)
    pub padding: usize,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MigrationConfig {
    /// Records fetched and checkpointed per batch
    pub batch_size: usize,
    /// JSON checkpoint file shared by all migration targets
    pub checkpoint_path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Log level (default: info)
    pub level: String,
    /// Log format: "json" or "text"
    pub format: String,
}

impl Default for MasterKeyConfig {
    fn default() -> Self {
        Self {
            env_var: crate::master_key::DEFAULT_ENV_VAR.into(),
            file: None,
        }
    }
}

impl Default for BoxDefaults {
    fn default() -> Self {
        Self {
            algorithm: "aes-gcm".into(),
            padding: 0,
        }
    }
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            batch_size: 1000,
            checkpoint_path: PathBuf::from("~/.local/share/coffer/checkpoints.json"),
        }
    }
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
            format: "text".into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_full_config() {
        let toml_str = r#"
[master_key]
env_var = "APP_MASTER_KEY"
file = "/run/secrets/master_key"

[defaults]
algorithm = "xchacha20"
padding = 16

[migration]
batch_size = 250
checkpoint_path = "/var/lib/coffer/checkpoints.json"

[log]
level = "debug"
format = "json"
"#;
        let config: CofferConfig = toml::from_str(toml_str).unwrap();

        assert_eq!(config.master_key.env_var, "APP_MASTER_KEY");
        assert_eq!(
            config.master_key.file,
            Some(PathBuf::from("/run/secrets/master_key"))
        );
        assert_eq!(config.defaults.algorithm, "xchacha20");
        assert_eq!(config.defaults.padding, 16);
        assert_eq!(config.migration.batch_size, 250);
        assert_eq!(config.log.format, "json");
    }

    #[test]
    fn test_parse_defaults() {
        let config: CofferConfig = toml::from_str("").unwrap();

        assert_eq!(config.master_key.env_var, "COFFER_MASTER_KEY");
        assert!(config.master_key.file.is_none());
        assert_eq!(config.defaults.algorithm, "aes-gcm");
        assert_eq!(config.defaults.padding, 0);
        assert_eq!(config.migration.batch_size, 1000);
        assert_eq!(config.log.level, "info");
    }

    #[test]
    fn test_parse_partial_config() {
        let toml_str = r#"
[migration]
batch_size = 10
"#;
        let config: CofferConfig = toml::from_str(toml_str).unwrap();

        // Overridden
        assert_eq!(config.migration.batch_size, 10);
        // Defaults
        assert_eq!(
            config.migration.checkpoint_path,
            PathBuf::from("~/.local/share/coffer/checkpoints.json")
        );
        assert_eq!(config.defaults.algorithm, "aes-gcm");
    }

    #[test]
    fn test_serialize_roundtrip() {
        let config = CofferConfig::default();
        let toml_str = toml::to_string(&config).unwrap();
        let parsed: CofferConfig = toml::from_str(&toml_str).unwrap();

        assert_eq!(config.master_key.env_var, parsed.master_key.env_var);
        assert_eq!(config.migration.batch_size, parsed.migration.batch_size);
    }
}
