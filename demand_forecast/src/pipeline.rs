//! End-to-end run: aggregate, build features, split, forecast every entity

use crate::aggregate::{aggregate_weekly, by_entity, AggregatedRow};
use crate::config::PipelineConfig;
use crate::data::{EntityKey, Event};
use crate::engine::{forecast_entity, EntityDataset, EntityForecast, EntityRun, ModelArtifact};
use crate::error::{ForecastError, Result};
use crate::features::{
    build_feature_table, gross_margin, inventory_turnover, FeatureTable, SkippedEntity,
};
use crate::models::{FittedForest, RandomForest};
use crate::split::{split_by_cutoff, DatasetSplit};
use chrono::NaiveDate;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

/// Headline figures over the aggregated weekly rows
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Kpis {
    pub total_demand: f64,
    pub mean_inventory_level: f64,
    pub mean_inventory_turnover: f64,
    pub total_gross_margin: f64,
}

impl Kpis {
    pub fn from_rows(rows: &[AggregatedRow]) -> Self {
        if rows.is_empty() {
            return Self::default();
        }
        let n = rows.len() as f64;
        Self {
            total_demand: rows.iter().map(|r| r.demand).sum(),
            mean_inventory_level: rows.iter().map(|r| r.inventory_level).sum::<f64>() / n,
            mean_inventory_turnover: rows
                .iter()
                .map(|r| inventory_turnover(r.demand, r.inventory_level))
                .sum::<f64>()
                / n,
            total_gross_margin: rows
                .iter()
                .map(|r| gross_margin(r.price, r.cost, r.demand))
                .sum(),
        }
    }
}

/// What happened to each entity in a run
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub events: usize,
    pub weekly_rows: usize,
    pub feature_rows: usize,
    pub cutoff: Option<NaiveDate>,
    pub forecasted: Vec<EntityKey>,
    pub skipped: Vec<SkippedEntity>,
    pub kpis: Kpis,
}

/// Everything a run produces
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    pub weekly: Vec<AggregatedRow>,
    pub features: FeatureTable,
    pub split: Option<DatasetSplit>,
    pub forecasts: Vec<EntityForecast>,
    /// Fitted models, kept only when `write_models` is set
    pub models: Vec<ModelArtifact>,
    pub summary: RunSummary,
}

/// Runs the forecasting stages with one configuration
#[derive(Debug, Clone)]
pub struct Pipeline {
    config: PipelineConfig,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn run(&self, events: &[Event]) -> Result<PipelineOutput> {
        if events.is_empty() {
            return Err(ForecastError::DataFormat(
                "No sales events to forecast from".to_string(),
            ));
        }

        let weekly = aggregate_weekly(events)?;
        let features = build_feature_table(&weekly, &self.config.features)?;

        let mut summary = RunSummary {
            events: events.len(),
            weekly_rows: weekly.len(),
            feature_rows: features.len(),
            skipped: features.skipped.clone(),
            kpis: Kpis::from_rows(&weekly),
            ..Default::default()
        };

        if features.is_empty() {
            warn!("No entity has enough history for features; nothing to forecast");
            return Ok(PipelineOutput {
                weekly,
                features,
                split: None,
                forecasts: Vec::new(),
                models: Vec::new(),
                summary,
            });
        }

        let split = split_by_cutoff(&features.rows, self.config.split.holdout_periods)?;
        summary.cutoff = Some(split.cutoff);

        let datasets = self.datasets(&weekly, &split);
        let results = self.forecast_all(&datasets);

        let mut forecasts = Vec::new();
        let mut models = Vec::new();
        for (entity, result) in results {
            match result {
                Ok(run) => {
                    summary.forecasted.push(entity);
                    forecasts.push(run.forecast);
                    if self.config.write_models {
                        models.push(run.model);
                    }
                }
                Err(err) => {
                    if err.is_entity_recoverable() {
                        warn!("Skipping {}: {}", entity, err);
                    } else {
                        error!("Forecast failed for {}: {}", entity, err);
                    }
                    summary.skipped.push(SkippedEntity {
                        entity,
                        reason: err.to_string(),
                    });
                }
            }
        }
        summary.skipped.sort_by(|a, b| a.entity.cmp(&b.entity));

        info!(
            "Forecast {} entities, skipped {}",
            summary.forecasted.len(),
            summary.skipped.len()
        );

        Ok(PipelineOutput {
            weekly,
            features,
            split: Some(split),
            forecasts,
            models,
            summary,
        })
    }

    fn datasets(&self, weekly: &[AggregatedRow], split: &DatasetSplit) -> Vec<EntityDataset> {
        let mut history = by_entity(weekly);
        split
            .by_entity()
            .into_iter()
            .map(|(entity, partition)| {
                let series = history
                    .remove(&entity)
                    .unwrap_or_default()
                    .into_iter()
                    .map(|row| (row.period_start, row.demand))
                    .collect();
                EntityDataset {
                    entity,
                    train: partition.train,
                    test: partition.test,
                    history: series,
                }
            })
            .collect()
    }

    fn forecast_all(
        &self,
        datasets: &[EntityDataset],
    ) -> Vec<(EntityKey, Result<EntityRun<FittedForest>>)> {
        let regressor = RandomForest::new(self.config.model.clone()).with_seed(self.config.seed);
        let run_one = |dataset: &EntityDataset| {
            (
                dataset.entity.clone(),
                forecast_entity(&regressor, dataset, &self.config),
            )
        };

        // Both branches keep the entity order of `datasets`
        if self.config.parallel {
            datasets.par_iter().map(run_one).collect()
        } else {
            datasets.iter().map(run_one).collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RandomForestConfig;
    use approx::assert_relative_eq;

    fn constant_events(product: &str, weeks: i64, demand: f64) -> Vec<Event> {
        let first = NaiveDate::from_ymd_opt(2023, 1, 2).unwrap();
        (0..weeks)
            .map(|w| Event {
                date: demand_math::calendar::add_weeks(first, w).unwrap(),
                product_id: product.to_string(),
                store_id: "S01".to_string(),
                demand,
                inventory_level: 50.0,
                category: "Food".to_string(),
                region: "North".to_string(),
                price: 10.0,
                cost: 6.0,
            })
            .collect()
    }

    fn quick_config() -> PipelineConfig {
        let mut config = PipelineConfig::default();
        config.model = RandomForestConfig::default().n_trees(5);
        config.split.holdout_periods = 2;
        config
    }

    #[test]
    fn test_empty_input_is_fatal() {
        let pipeline = Pipeline::new(quick_config()).unwrap();
        assert!(matches!(pipeline.run(&[]), Err(ForecastError::DataFormat(_))));
    }

    #[test]
    fn test_short_entities_are_skipped_not_fatal() {
        let mut events = constant_events("P001", 16, 20.0);
        events.extend(constant_events("P002", 3, 5.0));

        let output = Pipeline::new(quick_config()).unwrap().run(&events).unwrap();

        assert_eq!(output.summary.forecasted, vec![EntityKey::new("P001", "S01")]);
        assert_eq!(output.summary.skipped.len(), 1);
        assert_eq!(output.summary.skipped[0].entity, EntityKey::new("P002", "S01"));
        assert_eq!(output.forecasts.len(), 1);
        assert!(output.models.is_empty());
    }

    #[test]
    fn test_kpis() {
        let events = constant_events("P001", 4, 10.0);
        let kpis = Kpis::from_rows(&aggregate_weekly(&events).unwrap());
        assert_eq!(kpis.total_demand, 40.0);
        assert_eq!(kpis.mean_inventory_level, 50.0);
        assert_relative_eq!(kpis.mean_inventory_turnover, 0.2);
        assert_eq!(kpis.total_gross_margin, 160.0);
    }

    #[test]
    fn test_nothing_usable_is_not_an_error() {
        let output = Pipeline::new(quick_config())
            .unwrap()
            .run(&constant_events("P001", 2, 1.0))
            .unwrap();
        assert!(output.split.is_none());
        assert!(output.forecasts.is_empty());
        assert_eq!(output.summary.skipped.len(), 1);
    }
}
