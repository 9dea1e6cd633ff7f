//! Process-wide configuration, read once at startup.
//!
//! Grounded on `original_source/src/core/istio_discovery.py`'s
//! `_create_discovery_config` (env-var driven, typed defaults) and on the
//! teacher's `Cli`/`Commands` split: environment variables set the
//! defaults, CLI flags (see [`crate::cli`]) override them for one-shot
//! invocations.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{GovernanceError, Result};

/// How the scheduler drives cycles.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunMode {
    /// Run cycles on `harvest_interval` forever.
    Continuous,
    /// Run exactly one cycle and exit.
    OneShot,
}

/// Process-wide configuration.
#[derive(Debug, Clone)]
pub struct Config {
    pub namespaces: Vec<String>,
    pub label_app: String,
    pub harvest_interval: Duration,
    pub max_concurrent: usize,
    pub storage_path: PathBuf,
    pub run_mode: RunMode,
    pub health_check_enabled: bool,
    pub rule_set_path: Option<PathBuf>,
    pub domain_profile_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            namespaces: vec!["default".to_string()],
            label_app: "spring-boot".to_string(),
            harvest_interval: Duration::from_secs(6 * 3600),
            max_concurrent: 10,
            storage_path: PathBuf::from("/data/api-specs"),
            run_mode: RunMode::Continuous,
            health_check_enabled: true,
            rule_set_path: None,
            domain_profile_path: None,
        }
    }
}

impl Config {
    /// Loads configuration from environment variables, falling back to
    /// the documented defaults. A malformed value is process-fatal: it is
    /// better to refuse to start than to silently run with a nonsensical
    /// setting.
    pub fn from_env() -> Result<Self> {
        let mut cfg = Config::default();

        if let Ok(v) = env::var("NAMESPACES") {
            cfg.namespaces = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
            if cfg.namespaces.is_empty() {
                return Err(GovernanceError::ProcessFatal(
                    "NAMESPACES must name at least one namespace".into(),
                ));
            }
        }

        if let Ok(v) = env::var("LABEL_APP") {
            cfg.label_app = v;
        }

        if let Ok(v) = env::var("HARVEST_INTERVAL_HOURS") {
            let hours: u64 = v.parse().map_err(|_| {
                GovernanceError::ProcessFatal(format!("HARVEST_INTERVAL_HOURS invalid: {v}"))
            })?;
            cfg.harvest_interval = Duration::from_secs(hours * 3600);
        }

        if let Ok(v) = env::var("MAX_CONCURRENT") {
            let n: usize = v.parse().map_err(|_| {
                GovernanceError::ProcessFatal(format!("MAX_CONCURRENT invalid: {v}"))
            })?;
            if n == 0 {
                return Err(GovernanceError::ProcessFatal(
                    "MAX_CONCURRENT must be >= 1".into(),
                ));
            }
            cfg.max_concurrent = n;
        }

        if let Ok(v) = env::var("STORAGE_PATH") {
            cfg.storage_path = PathBuf::from(v);
        }

        if let Ok(v) = env::var("RUN_MODE") {
            cfg.run_mode = match v.as_str() {
                "continuous" => RunMode::Continuous,
                "one-shot" => RunMode::OneShot,
                other => {
                    return Err(GovernanceError::ProcessFatal(format!(
                        "RUN_MODE must be 'continuous' or 'one-shot', got '{other}'"
                    )));
                }
            };
        }

        if let Ok(v) = env::var("HEALTH_CHECK_ENABLED") {
            cfg.health_check_enabled = v.eq_ignore_ascii_case("true");
        }

        if let Ok(v) = env::var("RULE_SET_PATH") {
            cfg.rule_set_path = Some(PathBuf::from(v));
        }

        if let Ok(v) = env::var("DOMAIN_PROFILE_PATH") {
            cfg.domain_profile_path = Some(PathBuf::from(v));
        }

        Ok(cfg)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_specification() {
        let cfg = Config::default();
        assert_eq!(cfg.max_concurrent, 10);
        assert_eq!(cfg.harvest_interval, Duration::from_secs(6 * 3600));
        assert_eq!(cfg.storage_path, PathBuf::from("/data/api-specs"));
        assert_eq!(cfg.run_mode, RunMode::Continuous);
        assert!(cfg.health_check_enabled);
    }
}
