//! Lagged, rolling, calendar and economic features per weekly row
//!
//! Every feature for period `t` is computed from periods strictly before `t`
//! of the same entity. A row whose lags or rolling means cannot be formed is
//! dropped rather than imputed.

use crate::aggregate::{by_entity, AggregatedRow};
use crate::config::{FeatureConfig, GapPolicy};
use crate::data::EntityKey;
use crate::error::{ForecastError, Result};
use chrono::NaiveDate;
use demand_math::calendar::{add_weeks, weeks_between};
use demand_math::rolling::{lagged, shifted_trailing_means};
use demand_math::CalendarFeatures;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// An aggregated row with its model inputs attached
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureRow {
    pub entity: EntityKey,
    pub period_start: NaiveDate,
    pub category: String,
    pub region: String,
    /// Target: demand of this period
    pub demand: f64,
    pub inventory_level: f64,
    pub price: f64,
    pub cost: f64,
    /// Lagged demand, aligned with `FeatureConfig::lags`
    pub lags: Vec<f64>,
    /// Trailing mean demand, aligned with `FeatureConfig::rolling_windows`
    pub rolling: Vec<f64>,
    pub calendar: CalendarFeatures,
    pub inventory_turnover: f64,
    pub gross_margin: f64,
}

impl FeatureRow {
    /// Model inputs: lags, rolling means, month, week of year, weekend flag
    pub fn model_inputs(&self) -> Vec<f64> {
        let mut inputs = Vec::with_capacity(self.lags.len() + self.rolling.len() + 3);
        inputs.extend_from_slice(&self.lags);
        inputs.extend_from_slice(&self.rolling);
        inputs.extend(self.calendar.to_vec());
        inputs
    }
}

/// Demand over inventory; zero inventory counts as one unit
pub fn inventory_turnover(demand: f64, inventory_level: f64) -> f64 {
    let denominator = if inventory_level == 0.0 {
        1.0
    } else {
        inventory_level
    };
    demand / denominator
}

pub fn gross_margin(price: f64, cost: f64, demand: f64) -> f64 {
    (price - cost) * demand
}

/// Entity left out of the feature table, with the reason
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SkippedEntity {
    pub entity: EntityKey,
    pub reason: String,
}

/// Feature rows for all entities plus the entities that yielded none
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FeatureTable {
    pub rows: Vec<FeatureRow>,
    pub skipped: Vec<SkippedEntity>,
}

impl FeatureTable {
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Per-row lag and rolling values, `None` where undefined
struct Offsets {
    lags: Vec<Vec<Option<f64>>>,
    rolling: Vec<Vec<Option<f64>>>,
}

fn positional_offsets(series: &[AggregatedRow], config: &FeatureConfig) -> Result<Offsets> {
    let demand: Vec<f64> = series.iter().map(|row| row.demand).collect();
    let lags = config.lags.iter().map(|&k| lagged(&demand, k)).collect();
    let rolling = config
        .rolling_windows
        .iter()
        .map(|&w| shifted_trailing_means(&demand, w))
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(Offsets { lags, rolling })
}

fn calendar_offsets(series: &[AggregatedRow], config: &FeatureConfig) -> Offsets {
    let starts: Vec<NaiveDate> = series.iter().map(|row| row.period_start).collect();

    let lags = config
        .lags
        .iter()
        .map(|&k| {
            starts
                .iter()
                .map(|&start| {
                    i64::try_from(k)
                        .ok()
                        .and_then(|weeks| add_weeks(start, -weeks).ok())
                        .and_then(|target| starts.binary_search(&target).ok())
                        .map(|idx| series[idx].demand)
                })
                .collect()
        })
        .collect();

    let rolling = config
        .rolling_windows
        .iter()
        .map(|&w| {
            series
                .iter()
                .enumerate()
                .map(|(i, row)| {
                    let window: Vec<f64> = series[..i]
                        .iter()
                        .filter(|prior| weeks_between(prior.period_start, row.period_start) <= w as i64)
                        .map(|prior| prior.demand)
                        .collect();
                    if window.is_empty() {
                        None
                    } else {
                        Some(window.iter().sum::<f64>() / window.len() as f64)
                    }
                })
                .collect()
        })
        .collect();

    Offsets { lags, rolling }
}

fn check_series(series: &[AggregatedRow]) -> Result<()> {
    for pair in series.windows(2) {
        if pair[0].entity != pair[1].entity {
            return Err(ForecastError::DataFormat(format!(
                "Series mixes entities {} and {}",
                pair[0].entity, pair[1].entity
            )));
        }
        if pair[0].period_start >= pair[1].period_start {
            return Err(ForecastError::DataFormat(format!(
                "Series for {} is not strictly ordered at {}",
                pair[1].entity, pair[1].period_start
            )));
        }
    }
    Ok(())
}

/// Build feature rows for one entity's series (sorted by period start)
///
/// Returns `InsufficientHistory` when no row has all of its features defined.
pub fn build_entity_features(
    series: &[AggregatedRow],
    config: &FeatureConfig,
) -> Result<Vec<FeatureRow>> {
    config.validate()?;
    check_series(series)?;

    let offsets = match config.gap_policy {
        GapPolicy::Positional => positional_offsets(series, config)?,
        GapPolicy::Calendar => calendar_offsets(series, config),
    };
    let min_prior = if config.require_full_windows {
        config.history_depth()
    } else {
        0
    };

    let mut rows = Vec::new();
    for (i, row) in series.iter().enumerate() {
        if i < min_prior {
            continue;
        }

        let lags: Option<Vec<f64>> = offsets.lags.iter().map(|column| column[i]).collect();
        let rolling: Option<Vec<f64>> = offsets.rolling.iter().map(|column| column[i]).collect();
        let (Some(lags), Some(rolling)) = (lags, rolling) else {
            continue;
        };

        rows.push(FeatureRow {
            entity: row.entity.clone(),
            period_start: row.period_start,
            category: row.category.clone(),
            region: row.region.clone(),
            demand: row.demand,
            inventory_level: row.inventory_level,
            price: row.price,
            cost: row.cost,
            lags,
            rolling,
            calendar: CalendarFeatures::from_date(row.period_start),
            inventory_turnover: inventory_turnover(row.demand, row.inventory_level),
            gross_margin: gross_margin(row.price, row.cost, row.demand),
        });
    }

    if rows.is_empty() {
        let entity = series
            .first()
            .map(|row| row.entity.to_string())
            .unwrap_or_default();
        return Err(ForecastError::InsufficientHistory {
            entity,
            needed: config.max_lag().max(min_prior) + 1,
            got: series.len(),
        });
    }

    debug!(
        "{} of {} periods usable for {}",
        rows.len(),
        series.len(),
        rows[0].entity
    );
    Ok(rows)
}

/// Build the feature table for every entity in the aggregated rows
///
/// Entities without enough history are recorded in `skipped`.
pub fn build_feature_table(rows: &[AggregatedRow], config: &FeatureConfig) -> Result<FeatureTable> {
    let mut table = FeatureTable::default();

    for (entity, series) in by_entity(rows) {
        match build_entity_features(&series, config) {
            Ok(entity_rows) => table.rows.extend(entity_rows),
            Err(err @ ForecastError::InsufficientHistory { .. }) => {
                debug!("Skipping {}: {}", entity, err);
                table.skipped.push(SkippedEntity {
                    entity,
                    reason: err.to_string(),
                });
            }
            Err(err) => return Err(err),
        }
    }

    info!(
        "Built {} feature rows, {} entities skipped",
        table.rows.len(),
        table.skipped.len()
    );
    Ok(table)
}
