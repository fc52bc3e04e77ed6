//! Serializable backtest configuration.
//!
//! Loaded from TOML, then environment overrides, then validated:
//!
//! ```toml
//! name = "nq_fvg"
//!
//! [engine.validator]
//! min_stop_points = 10.0
//!
//! [engine.risk]
//! max_daily_trades = 4
//! ```

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tradegate_core::config::{self as core_config, EngineConfig};

/// Unique identifier for a backtest run (content-addressable hash).
pub type RunId = String;

/// Environment variables that override individual config values.
pub const ENV_MAX_DAILY_TRADES: &str = "TRADEGATE_MAX_DAILY_TRADES";
pub const ENV_MAX_DAILY_LOSS: &str = "TRADEGATE_MAX_DAILY_LOSS";
pub const ENV_MIN_R_MULTIPLE: &str = "TRADEGATE_MIN_R_MULTIPLE";
pub const ENV_MIN_CONFIDENCE: &str = "TRADEGATE_MIN_CONFIDENCE";
pub const ENV_BASE_QUANTITY: &str = "TRADEGATE_BASE_QUANTITY";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("invalid TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("environment variable {var}={value:?} is not a valid value")]
    Env { var: &'static str, value: String },

    #[error(transparent)]
    Engine(#[from] core_config::ConfigError),
}

/// Everything needed to reproduce a backtest.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct BacktestConfig {
    /// Label used for artifact directories.
    pub name: String,
    pub engine: EngineConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self {
            name: "backtest".into(),
            engine: EngineConfig::default(),
        }
    }
}

impl BacktestConfig {
    /// Parse and validate a TOML document. Missing sections take defaults.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.engine.validate()?;
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_toml(&content)
    }

    /// Apply `TRADEGATE_*` overrides from the process environment.
    pub fn apply_env_overrides(&mut self) -> Result<(), ConfigError> {
        self.apply_overrides(|var| std::env::var(var).ok())
    }

    /// Apply overrides from an arbitrary lookup. Unset variables are skipped.
    pub fn apply_overrides<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let engine = &mut self.engine;
        if let Some(v) = parse_var(&lookup, ENV_MAX_DAILY_TRADES)? {
            engine.risk.max_daily_trades = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MAX_DAILY_LOSS)? {
            engine.risk.max_daily_loss_points = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MIN_R_MULTIPLE)? {
            engine.validator.min_r_multiple = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_MIN_CONFIDENCE)? {
            engine.validator.min_confidence = v;
        }
        if let Some(v) = parse_var(&lookup, ENV_BASE_QUANTITY)? {
            engine.sizing.base_quantity = v;
        }
        Ok(())
    }

    /// Deterministic hash of the full configuration.
    ///
    /// Two runs with identical configs share a RunId.
    pub fn run_id(&self) -> RunId {
        // Plain data: serialization is infallible.
        let json = serde_json::to_vec(self).unwrap_or_default();
        blake3::hash(&json).to_hex().to_string()
    }
}

fn parse_var<T, F>(lookup: &F, var: &'static str) -> Result<Option<T>, ConfigError>
where
    T: std::str::FromStr,
    F: Fn(&str) -> Option<String>,
{
    match lookup(var) {
        None => Ok(None),
        Some(value) => value
            .trim()
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::Env { var, value }),
    }
}

/// Load a config file (or defaults when `path` is `None`), apply environment
/// overrides, and validate the result.
pub fn load_config(path: Option<&Path>) -> Result<BacktestConfig, ConfigError> {
    let mut config = match path {
        Some(p) => BacktestConfig::from_file(p)?,
        None => BacktestConfig::default(),
    };
    config.apply_env_overrides()?;
    config.engine.validate()?;
    tracing::debug!(name = %config.name, run_id = %config.run_id(), "config loaded");
    Ok(config)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_toml_fills_defaults() {
        let config = BacktestConfig::from_toml(
            r#"
name = "nq"

[engine.validator]
min_stop_points = 10.0

[engine.risk]
max_daily_trades = 3
consecutive_loss_policy = "reset_daily"
"#,
        )
        .unwrap();
        assert_eq!(config.name, "nq");
        assert_eq!(config.engine.validator.min_stop_points, 10.0);
        assert_eq!(config.engine.validator.max_stop_points, 50.0);
        assert_eq!(config.engine.risk.max_daily_trades, 3);
        assert_eq!(
            config.engine.risk.consecutive_loss_policy,
            core_config::ConsecutiveLossPolicy::ResetDaily
        );
        assert_eq!(config.engine.exits, core_config::ExitConfig::default());
    }

    #[test]
    fn empty_toml_is_default() {
        assert_eq!(BacktestConfig::from_toml("").unwrap(), BacktestConfig::default());
    }

    #[test]
    fn inconsistent_toml_fails_validation() {
        let err = BacktestConfig::from_toml(
            r#"
[engine.exits]
first_scale_fraction = 0.6
second_scale_fraction = 0.5
"#,
        )
        .unwrap_err();
        assert!(matches!(err, ConfigError::Engine(_)));
    }

    #[test]
    fn overrides_apply_and_reject_garbage() {
        let vars: HashMap<&str, &str> = [
            (ENV_MAX_DAILY_TRADES, "2"),
            (ENV_MIN_R_MULTIPLE, "2.5"),
            (ENV_BASE_QUANTITY, " 4 "),
        ]
        .into_iter()
        .collect();
        let mut config = BacktestConfig::default();
        config
            .apply_overrides(|v| vars.get(v).map(|s| s.to_string()))
            .unwrap();
        assert_eq!(config.engine.risk.max_daily_trades, 2);
        assert_eq!(config.engine.validator.min_r_multiple, 2.5);
        assert_eq!(config.engine.sizing.base_quantity, 4);
        assert_eq!(config.engine.risk.max_daily_loss_points, 100.0);

        let err = config
            .apply_overrides(|v| (v == ENV_MAX_DAILY_LOSS).then(|| "lots".to_string()))
            .unwrap_err();
        assert!(matches!(
            err,
            ConfigError::Env {
                var: ENV_MAX_DAILY_LOSS,
                ..
            }
        ));
    }

    #[test]
    fn run_id_deterministic_and_sensitive() {
        let a = BacktestConfig::default();
        let mut b = a.clone();
        assert_eq!(a.run_id(), b.run_id());
        assert_eq!(a.run_id().len(), 64);
        b.engine.exits.trail_offset_r = 0.75;
        assert_ne!(a.run_id(), b.run_id());
    }

    #[test]
    fn missing_file_is_io_error() {
        let err = BacktestConfig::from_file(Path::new("/nonexistent/tradegate.toml")).unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }
}
