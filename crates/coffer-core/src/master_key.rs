//! Process-wide master key.
//!
//! The key is assigned at most once per process. Either a caller installs it
//! explicitly at startup ([`set_master_key`], [`init_from_config`]) or the
//! first call to [`master_key`] reads the default environment variable and
//! memoizes whatever it finds, including its absence.

use secrecy::{ExposeSecret, SecretString};
use std::sync::OnceLock;

use crate::config::MasterKeyConfig;
use crate::{CofferError, CofferResult};

/// Environment variable consulted when nothing was installed explicitly.
pub const DEFAULT_ENV_VAR: &str = "COFFER_MASTER_KEY";

static MASTER_KEY: OnceLock<Option<SecretString>> = OnceLock::new();

/// Install the process master key. Fails if a key (or its absence) was already memoized.
pub fn set_master_key(key: SecretString) -> CofferResult<()> {
    if key.expose_secret().is_empty() {
        return Err(CofferError::config("master key is empty"));
    }
    MASTER_KEY
        .set(Some(key))
        .map_err(|_| CofferError::config("master key already initialised for this process"))
}

/// The process master key, reading `COFFER_MASTER_KEY` on first access.
pub fn master_key() -> Option<&'static SecretString> {
    MASTER_KEY
        .get_or_init(|| read_env(DEFAULT_ENV_VAR))
        .as_ref()
}

/// Resolve the master key from a config section and install it.
///
/// Returns `Ok(false)` when neither the key file nor the environment variable
/// yields a key; the process then runs without a default master key.
pub fn init_from_config(cfg: &MasterKeyConfig) -> CofferResult<bool> {
    match load(cfg)? {
        Some(key) => {
            set_master_key(key)?;
            tracing::debug!(env_var = %cfg.env_var, "master key installed");
            Ok(true)
        }
        None => {
            tracing::warn!(env_var = %cfg.env_var, "no master key configured");
            Ok(false)
        }
    }
}

/// Read the master key described by `cfg` without installing it.
pub fn load(cfg: &MasterKeyConfig) -> CofferResult<Option<SecretString>> {
    if let Some(path) = &cfg.file {
        let content = std::fs::read_to_string(path).map_err(|e| {
            CofferError::config(format!("reading master key file {}: {e}", path.display()))
        })?;
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return Err(CofferError::config(format!(
                "master key file {} is empty",
                path.display()
            )));
        }
        return Ok(Some(SecretString::from(trimmed.to_string())));
    }
    Ok(read_env(&cfg.env_var))
}

fn read_env(name: &str) -> Option<SecretString> {
    std::env::var(name)
        .ok()
        .filter(|v| !v.is_empty())
        .map(SecretString::from)
}
