//! Engine configuration.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use stackview_inventory::{Catalog, CatalogError, DefaultEnricher, Enricher};
use thiserror::Error;

pub const BATCH_DELAY_ENV: &str = "STACKVIEW_BATCH_DELAY_MS";
pub const STALL_TIMEOUT_ENV: &str = "STACKVIEW_STALL_TIMEOUT_MS";
pub const RESCAN_POLICY_ENV: &str = "STACKVIEW_RESCAN_POLICY";
pub const CATALOG_ENV: &str = "STACKVIEW_CATALOG";

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("invalid value {value:?} for {key}")]
    Invalid { key: &'static str, value: String },
}

/// What `start_scan` does while a scan is already running.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq)]
pub enum RescanPolicy {
    /// Abandon the running scan and start over with a new generation.
    #[default]
    Restart,
    /// Refuse and signal `ScanRejected`.
    Reject,
}

impl RescanPolicy {
    fn parse(raw: &str) -> Option<Self> {
        match raw.trim().to_ascii_lowercase().as_str() {
            "restart" => Some(RescanPolicy::Restart),
            "reject" => Some(RescanPolicy::Reject),
            _ => None,
        }
    }
}

/// Engine configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EngineConfig {
    /// Pause between a productive batch and the next batch request.
    pub batch_delay: Duration,
    /// A scan with no batch activity for this long is abandoned.
    pub stall_timeout: Duration,
    pub rescan_policy: RescanPolicy,
    /// Optional JSON catalog used for enrichment.
    pub catalog_path: Option<PathBuf>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            batch_delay: Duration::from_millis(550),
            stall_timeout: Duration::from_secs(30),
            rescan_policy: RescanPolicy::Restart,
            catalog_path: None,
        }
    }
}

impl EngineConfig {
    /// Defaults overridden by `STACKVIEW_*` environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overridden by whatever `lookup` returns for each key.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&'static str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(raw) = lookup(BATCH_DELAY_ENV) {
            config.batch_delay = parse_millis(BATCH_DELAY_ENV, &raw)?;
        }
        if let Some(raw) = lookup(STALL_TIMEOUT_ENV) {
            let timeout = parse_millis(STALL_TIMEOUT_ENV, &raw)?;
            if timeout.is_zero() {
                return Err(ConfigError::Invalid {
                    key: STALL_TIMEOUT_ENV,
                    value: raw,
                });
            }
            config.stall_timeout = timeout;
        }
        if let Some(raw) = lookup(RESCAN_POLICY_ENV) {
            config.rescan_policy = RescanPolicy::parse(&raw).ok_or(ConfigError::Invalid {
                key: RESCAN_POLICY_ENV,
                value: raw,
            })?;
        }
        if let Some(raw) = lookup(CATALOG_ENV).filter(|p| !p.trim().is_empty()) {
            config.catalog_path = Some(PathBuf::from(raw));
        }

        Ok(config)
    }

    pub fn with_batch_delay(mut self, delay: Duration) -> Self {
        self.batch_delay = delay;
        self
    }

    pub fn with_stall_timeout(mut self, timeout: Duration) -> Self {
        self.stall_timeout = timeout;
        self
    }

    pub fn with_rescan_policy(mut self, policy: RescanPolicy) -> Self {
        self.rescan_policy = policy;
        self
    }

    pub fn with_catalog(mut self, path: impl Into<PathBuf>) -> Self {
        self.catalog_path = Some(path.into());
        self
    }

    /// Build the enricher: the configured catalog, or class-code defaults.
    pub fn load_enricher(&self) -> Result<Arc<dyn Enricher>, CatalogError> {
        match &self.catalog_path {
            Some(path) => Ok(Arc::new(Catalog::from_path(path)?)),
            None => Ok(Arc::new(DefaultEnricher)),
        }
    }
}

fn parse_millis(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::Invalid {
            key,
            value: raw.to_string(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&'static str, &str)]) -> impl Fn(&'static str) -> Option<String> {
        let map: HashMap<&'static str, String> =
            pairs.iter().map(|(k, v)| (*k, v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = EngineConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config, EngineConfig::default());
        assert_eq!(config.batch_delay, Duration::from_millis(550));
    }

    #[test]
    fn environment_overrides_defaults() {
        let config = EngineConfig::from_lookup(lookup(&[
            (BATCH_DELAY_ENV, "100"),
            (STALL_TIMEOUT_ENV, "2000"),
            (RESCAN_POLICY_ENV, "Reject"),
            (CATALOG_ENV, "/tmp/catalog.json"),
        ]))
        .unwrap();

        assert_eq!(config.batch_delay, Duration::from_millis(100));
        assert_eq!(config.stall_timeout, Duration::from_secs(2));
        assert_eq!(config.rescan_policy, RescanPolicy::Reject);
        assert_eq!(config.catalog_path, Some(PathBuf::from("/tmp/catalog.json")));
    }

    #[test]
    fn bad_values_are_rejected() {
        let err = EngineConfig::from_lookup(lookup(&[(BATCH_DELAY_ENV, "soon")])).unwrap_err();
        assert_eq!(
            err,
            ConfigError::Invalid {
                key: BATCH_DELAY_ENV,
                value: "soon".into()
            }
        );

        assert!(EngineConfig::from_lookup(lookup(&[(STALL_TIMEOUT_ENV, "0")])).is_err());
        assert!(EngineConfig::from_lookup(lookup(&[(RESCAN_POLICY_ENV, "maybe")])).is_err());
    }

    #[test]
    fn missing_catalog_file_fails_to_load() {
        let config = EngineConfig::default().with_catalog("/nonexistent/stackview.json");
        assert!(config.load_enricher().is_err());
        assert!(EngineConfig::default().load_enricher().is_ok());
    }
}
