//! Runtime settings read from the environment.

use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

pub const NAMESPACE_VAR: &str = "NAMESPACE";
pub const BASE_DIR_VAR: &str = "BASE_DIR";
pub const DEFAULT_RESYNC_VAR: &str = "DEFAULT_RESYNC";
pub const MANIFEST_DIR_VAR: &str = "MANIFEST_DIR";

pub const DEFAULT_NAMESPACE: &str = "loki";
pub const DEFAULT_BASE_DIR: &str = "/etc/loki/rules";
pub const DEFAULT_RESYNC: Duration = Duration::from_secs(30);
pub const DEFAULT_MANIFEST_DIR: &str = "/etc/loki/manifests";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Settings {
    /// Namespace the watch is scoped to.
    pub namespace: String,
    /// Root of the per-tenant rules tree.
    pub base_dir: PathBuf,
    /// Period of full redelivery.
    pub resync: Duration,
    /// Directory of ConfigMap manifests to watch.
    pub manifest_dir: PathBuf,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            base_dir: PathBuf::from(DEFAULT_BASE_DIR),
            resync: DEFAULT_RESYNC,
            manifest_dir: PathBuf::from(DEFAULT_MANIFEST_DIR),
        }
    }
}

impl Settings {
    /// Reads settings from the process environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Reads settings through `lookup`; unset or empty values take defaults.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|value| !value.trim().is_empty());
        let defaults = Self::default();

        let resync = match get(DEFAULT_RESYNC_VAR) {
            Some(value) => parse_resync(DEFAULT_RESYNC_VAR, &value)?,
            None => defaults.resync,
        };

        Ok(Self {
            namespace: get(NAMESPACE_VAR).unwrap_or(defaults.namespace),
            base_dir: get(BASE_DIR_VAR).map(PathBuf::from).unwrap_or(defaults.base_dir),
            resync,
            manifest_dir: get(MANIFEST_DIR_VAR)
                .map(PathBuf::from)
                .unwrap_or(defaults.manifest_dir),
        })
    }
}

/// Parses a humantime duration (`30s`, `1m 30s`, `2h`), rejecting zero.
fn parse_resync(name: &str, value: &str) -> Result<Duration, ConfigError> {
    let duration =
        humantime::parse_duration(value.trim()).map_err(|e| ConfigError::InvalidDuration {
            name: name.to_string(),
            value: value.to_string(),
            reason: e.to_string(),
        })?;

    if duration.is_zero() {
        return Err(ConfigError::ZeroResync {
            name: name.to_string(),
        });
    }

    Ok(duration)
}
