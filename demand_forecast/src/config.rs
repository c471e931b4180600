//! Pipeline configuration
//!
//! Resolved in three layers:
//! 1. Built-in defaults
//! 2. TOML file (optional)
//! 3. `SHELFCAST_*` environment variables

use crate::error::{ForecastError, Result};
use crate::inventory::InventoryPolicy;
use crate::models::forest::RandomForestConfig;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{debug, info};

/// Upper bound for every count of weekly periods in the configuration (ten years)
pub const MAX_PERIODS: usize = 520;

/// How lag and rolling offsets treat weeks with no recorded row
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum GapPolicy {
    /// Offsets count recorded periods for the entity
    #[default]
    Positional,
    /// Offsets count calendar weeks; a missing target week leaves the feature undefined
    Calendar,
}

/// How rolling features are refreshed while extrapolating
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum RollingUpdate {
    /// Recompute every window from the observed-plus-forecast history
    #[default]
    Recompute,
    /// Refresh windows no longer than the deepest lag, leave longer ones at their last observed value
    ShortWindowsOnly,
}

/// Whether calendar inputs follow the forecast periods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CalendarPolicy {
    /// Derive month, week and weekend flag from each future period start
    #[default]
    Advance,
    /// Reuse the calendar inputs of the last observed period
    Frozen,
}

/// Lag and rolling-window feature settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureConfig {
    /// Lag offsets, in periods
    pub lags: Vec<usize>,
    /// Trailing mean windows, in periods
    pub rolling_windows: Vec<usize>,
    pub gap_policy: GapPolicy,
    /// Require max(lags, windows) prior periods before a row is usable
    pub require_full_windows: bool,
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            lags: vec![1, 2, 3, 4],
            rolling_windows: vec![2, 4, 8],
            gap_policy: GapPolicy::Positional,
            require_full_windows: false,
        }
    }
}

impl FeatureConfig {
    pub fn max_lag(&self) -> usize {
        self.lags.iter().copied().max().unwrap_or(0)
    }

    pub fn max_window(&self) -> usize {
        self.rolling_windows.iter().copied().max().unwrap_or(0)
    }

    /// Number of past demand values needed to rebuild every feature
    pub fn history_depth(&self) -> usize {
        self.max_lag().max(self.max_window()).max(1)
    }

    /// Model input names in vector order
    pub fn feature_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .lags
            .iter()
            .map(|k| format!("demand_lag_{}", k))
            .collect();
        names.extend(
            self.rolling_windows
                .iter()
                .map(|w| format!("demand_rolling_{}", w)),
        );
        names.extend(["month", "week_of_year", "is_weekend"].map(String::from));
        names
    }

    pub fn validate(&self) -> Result<()> {
        if self.lags.is_empty() {
            return Err(ForecastError::InvalidParameter(
                "At least one lag is required".to_string(),
            ));
        }
        check_offsets("lag", &self.lags)?;
        check_offsets("rolling window", &self.rolling_windows)
    }
}

fn check_offsets(kind: &str, values: &[usize]) -> Result<()> {
    if values.contains(&0) {
        return Err(ForecastError::InvalidParameter(format!(
            "{} offsets must be positive",
            kind
        )));
    }
    check_periods(kind, values.iter().copied().max().unwrap_or(0))?;
    let unique: HashSet<_> = values.iter().collect();
    if unique.len() != values.len() {
        return Err(ForecastError::InvalidParameter(format!(
            "Duplicate {} offsets in {:?}",
            kind, values
        )));
    }
    Ok(())
}

fn check_periods(kind: &str, periods: usize) -> Result<()> {
    if periods > MAX_PERIODS {
        return Err(ForecastError::InvalidParameter(format!(
            "{} of {} periods exceeds the limit of {}",
            kind, periods, MAX_PERIODS
        )));
    }
    Ok(())
}

/// Train/test split settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Most recent periods held out for testing
    pub holdout_periods: usize,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self { holdout_periods: 8 }
    }
}

/// Fit and extrapolation settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForecastConfig {
    /// Future periods to forecast
    pub horizon: usize,
    /// Minimum training rows before a model is fitted
    pub min_train_rows: usize,
    pub rolling_update: RollingUpdate,
    pub calendar_policy: CalendarPolicy,
}

impl Default for ForecastConfig {
    fn default() -> Self {
        Self {
            horizon: 4,
            min_train_rows: 4,
            rolling_update: RollingUpdate::Recompute,
            calendar_policy: CalendarPolicy::Advance,
        }
    }
}

/// Complete configuration for one pipeline run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub features: FeatureConfig,
    pub split: SplitConfig,
    pub forecast: ForecastConfig,
    pub model: RandomForestConfig,
    pub inventory: InventoryPolicy,
    /// Seed for every random draw in the run
    pub seed: u64,
    /// Fan entities out over the rayon thread pool
    pub parallel: bool,
    /// Write a JSON model artifact per entity
    pub write_models: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            features: FeatureConfig::default(),
            split: SplitConfig::default(),
            forecast: ForecastConfig::default(),
            model: RandomForestConfig::default(),
            inventory: InventoryPolicy::default(),
            seed: 42,
            parallel: true,
            write_models: false,
        }
    }
}

impl PipelineConfig {
    pub fn validate(&self) -> Result<()> {
        self.features.validate()?;
        if self.forecast.horizon == 0 {
            return Err(ForecastError::InvalidParameter(
                "Forecast horizon must be positive".to_string(),
            ));
        }
        check_periods("Holdout", self.split.holdout_periods)?;
        check_periods("Forecast horizon", self.forecast.horizon)?;
        if self.forecast.min_train_rows == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_train_rows must be positive".to_string(),
            ));
        }
        self.model.validate()?;
        self.inventory.validate()
    }
}

/// Configuration loader
pub struct ConfigLoader;

impl ConfigLoader {
    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<PipelineConfig> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let config: PipelineConfig =
            toml::from_str(&content).map_err(|e| ForecastError::Config(e.to_string()))?;

        info!("Loaded config from file: {}", path.as_ref().display());
        Ok(config)
    }

    /// Apply `SHELFCAST_*` overrides from the process environment
    pub fn apply_env(config: PipelineConfig) -> Result<PipelineConfig> {
        Self::apply_overrides(config, |key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup
    pub fn apply_overrides<F>(mut config: PipelineConfig, lookup: F) -> Result<PipelineConfig>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(raw) = lookup("SHELFCAST_LAGS") {
            config.features.lags = parse_list("SHELFCAST_LAGS", &raw)?;
        }
        if let Some(raw) = lookup("SHELFCAST_ROLLING_WINDOWS") {
            config.features.rolling_windows = parse_list("SHELFCAST_ROLLING_WINDOWS", &raw)?;
        }
        if let Some(raw) = lookup("SHELFCAST_HOLDOUT_PERIODS") {
            config.split.holdout_periods = parse_value("SHELFCAST_HOLDOUT_PERIODS", &raw)?;
        }
        if let Some(raw) = lookup("SHELFCAST_HORIZON") {
            config.forecast.horizon = parse_value("SHELFCAST_HORIZON", &raw)?;
        }
        if let Some(raw) = lookup("SHELFCAST_SAFETY_STOCK") {
            config.inventory.safety_stock_multiplier = parse_value("SHELFCAST_SAFETY_STOCK", &raw)?;
        }
        if let Some(raw) = lookup("SHELFCAST_LEAD_TIME_DAYS") {
            config.inventory.lead_time_days = parse_value("SHELFCAST_LEAD_TIME_DAYS", &raw)?;
        }
        if let Some(raw) = lookup("SHELFCAST_TREES") {
            config.model.n_trees = parse_value("SHELFCAST_TREES", &raw)?;
        }
        if let Some(raw) = lookup("SHELFCAST_SEED") {
            config.seed = parse_value("SHELFCAST_SEED", &raw)?;
        }
        if let Some(raw) = lookup("SHELFCAST_PARALLEL") {
            config.parallel = parse_value("SHELFCAST_PARALLEL", &raw)?;
        }
        Ok(config)
    }

    /// Load configuration with fallback chain:
    /// 1. Config file (if path provided), otherwise defaults
    /// 2. Environment overrides
    pub fn load(config_file: Option<&Path>) -> Result<PipelineConfig> {
        let base = match config_file {
            Some(path) => Self::from_file(path)?,
            None => {
                debug!("No config file given, starting from defaults");
                PipelineConfig::default()
            }
        };

        let config = Self::apply_env(base)?;
        config.validate()?;
        Ok(config)
    }
}

fn parse_value<T: std::str::FromStr>(key: &str, raw: &str) -> Result<T> {
    raw.trim()
        .parse()
        .map_err(|_| ForecastError::Config(format!("Invalid value for {}: '{}'", key, raw)))
}

fn parse_list(key: &str, raw: &str) -> Result<Vec<usize>> {
    raw.split(',')
        .filter(|part| !part.trim().is_empty())
        .map(|part| parse_value(key, part))
        .collect()
}
