//! Chronological train/test split on a single global cutoff

use crate::data::EntityKey;
use crate::error::{ForecastError, Result};
use crate::features::FeatureRow;
use chrono::NaiveDate;
use demand_math::calendar::add_weeks;
use std::collections::BTreeMap;
use tracing::info;

/// Feature rows on either side of the cutoff
#[derive(Debug, Clone, PartialEq)]
pub struct DatasetSplit {
    /// Last period start included in training
    pub cutoff: NaiveDate,
    pub train: Vec<FeatureRow>,
    pub test: Vec<FeatureRow>,
}

/// One entity's share of the split
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPartition {
    pub train: Vec<FeatureRow>,
    pub test: Vec<FeatureRow>,
}

/// Cutoff = latest period start minus `holdout_periods` weeks
///
/// Rows at or before the cutoff train, rows after it test. The cutoff is shared
/// by every entity, so an entity whose history ends early may have no test rows
/// and one that starts late may have no training rows.
pub fn split_by_cutoff(rows: &[FeatureRow], holdout_periods: usize) -> Result<DatasetSplit> {
    let latest = rows
        .iter()
        .map(|row| row.period_start)
        .max()
        .ok_or_else(|| ForecastError::EmptyPartition("Feature table is empty".to_string()))?;
    let cutoff = i64::try_from(holdout_periods)
        .ok()
        .and_then(|weeks| add_weeks(latest, -weeks).ok())
        .ok_or_else(|| {
            ForecastError::InvalidParameter(format!(
                "Holdout of {} periods reaches before the supported date range",
                holdout_periods
            ))
        })?;

    let (mut train, mut test): (Vec<FeatureRow>, Vec<FeatureRow>) = rows
        .iter()
        .cloned()
        .partition(|row| row.period_start <= cutoff);

    let order = |a: &FeatureRow, b: &FeatureRow| {
        a.period_start
            .cmp(&b.period_start)
            .then_with(|| a.entity.cmp(&b.entity))
    };
    train.sort_by(order);
    test.sort_by(order);

    info!(
        "Split at {}: {} train rows, {} test rows",
        cutoff,
        train.len(),
        test.len()
    );
    Ok(DatasetSplit {
        cutoff,
        train,
        test,
    })
}

impl DatasetSplit {
    /// Regroup both partitions per entity, each side in period order
    pub fn by_entity(&self) -> BTreeMap<EntityKey, EntityPartition> {
        let mut grouped: BTreeMap<EntityKey, EntityPartition> = BTreeMap::new();
        for row in &self.train {
            grouped.entry(row.entity.clone()).or_default().train.push(row.clone());
        }
        for row in &self.test {
            grouped.entry(row.entity.clone()).or_default().test.push(row.clone());
        }
        grouped
    }
}
