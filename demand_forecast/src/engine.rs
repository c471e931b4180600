//! Per-entity fit, holdout evaluation and recursive extrapolation
//!
//! Each entity gets its own scaler and regressor. Future periods are predicted
//! one at a time: every prediction becomes the newest demand observation that
//! the next period's lags and rolling means are built from.

use crate::config::{
    CalendarPolicy, FeatureConfig, ForecastConfig, GapPolicy, PipelineConfig, RollingUpdate,
};
use crate::data::EntityKey;
use crate::error::{ForecastError, Result};
use crate::features::FeatureRow;
use crate::inventory::InventoryPolicy;
use crate::metrics::{evaluate_predictions, EvaluationMetrics};
use crate::models::{FittedForest, FittedRegressor, Regressor};
use crate::preprocessing::StandardScaler;
use chrono::NaiveDate;
use demand_math::calendar::{add_weeks, weeks_between};
use demand_math::{CalendarFeatures, LagBuffer};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Everything the engine needs for one entity
#[derive(Debug, Clone, PartialEq)]
pub struct EntityDataset {
    pub entity: EntityKey,
    pub train: Vec<FeatureRow>,
    pub test: Vec<FeatureRow>,
    /// Aggregated demand per period start, oldest first, including periods
    /// that produced no feature row
    pub history: Vec<(NaiveDate, f64)>,
}

/// A fitted scaler and regressor for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedEntityModel<M> {
    pub entity: EntityKey,
    pub feature_names: Vec<String>,
    pub scaler: StandardScaler,
    pub model: M,
    pub train_rows: usize,
}

/// Serialized form of a fitted random forest entity model
pub type ModelArtifact = FittedEntityModel<FittedForest>;

impl<M: FittedRegressor> FittedEntityModel<M> {
    /// Scale one raw input vector and predict demand
    pub fn predict_inputs(&self, inputs: &[f64]) -> Result<f64> {
        let scaled = self.scaler.transform_row(inputs)?;
        self.model.predict_one(&scaled)
    }

    pub fn predict_rows(&self, rows: &[FeatureRow]) -> Result<Vec<f64>> {
        rows.iter()
            .map(|row| self.predict_inputs(&row.model_inputs()))
            .collect()
    }

    /// Importances paired with feature names, largest first
    pub fn feature_importances(&self) -> Vec<FeatureImportance> {
        let mut pairs: Vec<FeatureImportance> = self
            .model
            .feature_importances()
            .unwrap_or_default()
            .into_iter()
            .zip(&self.feature_names)
            .map(|(importance, name)| FeatureImportance {
                feature: name.clone(),
                importance,
            })
            .collect();
        pairs.sort_by(|a, b| b.importance.total_cmp(&a.importance));
        pairs
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    pub feature: String,
    pub importance: f64,
}

/// Fit a scaler on the training rows, then the regressor on the scaled rows
pub fn fit_entity<R: Regressor>(
    regressor: &R,
    entity: &EntityKey,
    train: &[FeatureRow],
    features: &FeatureConfig,
    min_train_rows: usize,
) -> Result<FittedEntityModel<R::Fitted>> {
    if train.len() < min_train_rows.max(1) {
        return Err(ForecastError::InsufficientHistory {
            entity: entity.to_string(),
            needed: min_train_rows.max(1),
            got: train.len(),
        });
    }

    let inputs: Vec<Vec<f64>> = train.iter().map(FeatureRow::model_inputs).collect();
    let targets: Vec<f64> = train.iter().map(|row| row.demand).collect();

    let scaler = StandardScaler::fit(&inputs)?;
    let model = regressor.fit(&scaler.transform(&inputs)?, &targets)?;

    Ok(FittedEntityModel {
        entity: entity.clone(),
        feature_names: features.feature_names(),
        scaler,
        model,
        train_rows: train.len(),
    })
}

/// Unscaled model inputs for one period, plus the demand history behind them
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureState {
    pub period_start: NaiveDate,
    pub lags: Vec<f64>,
    pub rolling: Vec<f64>,
    pub calendar: CalendarFeatures,
    /// Demand of the periods before `period_start`
    history: LagBuffer,
}

impl FeatureState {
    /// State of the period right after the last one in `history`
    ///
    /// `history` is an entity's aggregated demand per period start, oldest
    /// first. Under `GapPolicy::Calendar` every week without a record becomes a
    /// gap, so lags land on the same calendar weeks as during feature building.
    pub fn after_history(
        history: &[(NaiveDate, f64)],
        features: &FeatureConfig,
        forecast: &ForecastConfig,
    ) -> Result<Self> {
        let &(last_start, _) = history.last().ok_or_else(|| {
            ForecastError::EmptyPartition("No observed periods to extrapolate from".to_string())
        })?;

        let depth = features.history_depth();
        let buffer = match features.gap_policy {
            GapPolicy::Positional => {
                let demand: Vec<f64> = history.iter().map(|&(_, demand)| demand).collect();
                LagBuffer::from_history(depth, &demand)?
            }
            GapPolicy::Calendar => {
                let mut buffer = LagBuffer::new(depth)?;
                for (i, &(start, demand)) in history.iter().enumerate() {
                    if i > 0 {
                        let missing = weeks_between(history[i - 1].0, start) - 1;
                        buffer.push_gaps(usize::try_from(missing).unwrap_or(0));
                    }
                    buffer.push(demand)?;
                }
                buffer
            }
        };

        let period_start = add_weeks(last_start, 1)?;
        let rolling = features
            .rolling_windows
            .iter()
            .map(|&window| {
                buffer
                    .trailing_mean(window)
                    .ok_or_else(|| insufficient(window, 0))
            })
            .collect::<Result<Vec<f64>>>()?;
        let calendar = match forecast.calendar_policy {
            CalendarPolicy::Advance => CalendarFeatures::from_date(period_start),
            CalendarPolicy::Frozen => CalendarFeatures::from_date(last_start),
        };

        Ok(Self {
            period_start,
            lags: lags_from(&buffer, features)?,
            rolling,
            calendar,
            history: buffer,
        })
    }

    pub fn model_inputs(&self) -> Vec<f64> {
        let mut inputs = Vec::with_capacity(self.lags.len() + self.rolling.len() + 3);
        inputs.extend_from_slice(&self.lags);
        inputs.extend_from_slice(&self.rolling);
        inputs.extend(self.calendar.to_vec());
        inputs
    }

    /// State of the following period once this period's demand is known
    pub fn advance(
        &self,
        demand: f64,
        features: &FeatureConfig,
        forecast: &ForecastConfig,
    ) -> Result<Self> {
        let history = self.history.with_pushed(demand)?;
        let period_start = add_weeks(self.period_start, 1)?;

        let max_lag = features.max_lag();
        let rolling = features
            .rolling_windows
            .iter()
            .zip(&self.rolling)
            .map(|(&window, &previous)| match forecast.rolling_update {
                RollingUpdate::ShortWindowsOnly if window > max_lag => previous,
                _ => history.trailing_mean(window).unwrap_or(previous),
            })
            .collect();

        let calendar = match forecast.calendar_policy {
            CalendarPolicy::Advance => CalendarFeatures::from_date(period_start),
            CalendarPolicy::Frozen => self.calendar,
        };

        Ok(Self {
            period_start,
            lags: lags_from(&history, features)?,
            rolling,
            calendar,
            history,
        })
    }
}

fn lags_from(history: &LagBuffer, features: &FeatureConfig) -> Result<Vec<f64>> {
    features
        .lags
        .iter()
        .map(|&k| {
            history.lag(k).ok_or_else(|| {
                let unbroken = (1..=history.len())
                    .take_while(|&j| history.lag(j).is_some())
                    .count();
                insufficient(k, unbroken)
            })
        })
        .collect()
}

/// Entity-less history error; `extrapolate` fills in the entity
fn insufficient(needed: usize, got: usize) -> ForecastError {
    ForecastError::InsufficientHistory {
        entity: String::new(),
        needed,
        got,
    }
}

/// Predict `forecast.horizon` periods past the end of `history`
///
/// `history` is the entity's full aggregated demand series, so the first
/// forecast is always for the week after the last observed one. Forecasts are
/// floored at zero before they feed the next step.
pub fn extrapolate<M: FittedRegressor>(
    model: &FittedEntityModel<M>,
    history: &[(NaiveDate, f64)],
    features: &FeatureConfig,
    forecast: &ForecastConfig,
) -> Result<Vec<(NaiveDate, f64)>> {
    let with_entity = |err: ForecastError| match err {
        ForecastError::InsufficientHistory { needed, got, .. } => {
            ForecastError::InsufficientHistory {
                entity: model.entity.to_string(),
                needed,
                got,
            }
        }
        other => other,
    };

    let mut state = FeatureState::after_history(history, features, forecast).map_err(with_entity)?;
    let mut predictions = Vec::with_capacity(forecast.horizon);
    for step in 0..forecast.horizon {
        let demand = model.predict_inputs(&state.model_inputs())?.max(0.0);
        predictions.push((state.period_start, demand));
        if step + 1 < forecast.horizon {
            state = state.advance(demand, features, forecast).map_err(with_entity)?;
        }
    }
    Ok(predictions)
}

/// One future period's forecast and stock recommendation
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForecastPoint {
    pub period_start: NaiveDate,
    pub forecasted_demand: f64,
    pub recommended_inventory: u64,
}

/// Held-out row scored by the fitted model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HoldoutPrediction {
    pub period_start: NaiveDate,
    pub actual: f64,
    pub predicted: f64,
}

/// Result of running the engine for one entity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EntityForecast {
    pub entity: EntityKey,
    pub train_rows: usize,
    pub test_rows: usize,
    /// `None` when the entity had no rows after the cutoff
    pub metrics: Option<EvaluationMetrics>,
    pub holdout: Vec<HoldoutPrediction>,
    pub forecast: Vec<ForecastPoint>,
    pub feature_importances: Vec<FeatureImportance>,
}

/// Forecast plus the model that produced it
#[derive(Debug, Clone)]
pub struct EntityRun<M> {
    pub forecast: EntityForecast,
    pub model: FittedEntityModel<M>,
}

/// Attach stock recommendations to raw forecasts
pub fn recommend_all(
    predictions: &[(NaiveDate, f64)],
    policy: &InventoryPolicy,
) -> Result<Vec<ForecastPoint>> {
    predictions
        .iter()
        .map(|&(period_start, demand)| {
            Ok(ForecastPoint {
                period_start,
                forecasted_demand: demand,
                recommended_inventory: policy.recommend(demand)?,
            })
        })
        .collect()
}

/// Fit, evaluate on the holdout and extrapolate one entity
pub fn forecast_entity<R: Regressor>(
    regressor: &R,
    dataset: &EntityDataset,
    config: &PipelineConfig,
) -> Result<EntityRun<R::Fitted>> {
    let model = fit_entity(
        regressor,
        &dataset.entity,
        &dataset.train,
        &config.features,
        config.forecast.min_train_rows,
    )?;

    let (metrics, holdout) = if dataset.test.is_empty() {
        (None, Vec::new())
    } else {
        let predicted = model.predict_rows(&dataset.test)?;
        let actual: Vec<f64> = dataset.test.iter().map(|row| row.demand).collect();
        let metrics = evaluate_predictions(&actual, &predicted)?;
        let holdout = dataset
            .test
            .iter()
            .zip(predicted)
            .map(|(row, predicted)| HoldoutPrediction {
                period_start: row.period_start,
                actual: row.demand,
                predicted,
            })
            .collect();
        (Some(metrics), holdout)
    };

    let predictions = extrapolate(&model, &dataset.history, &config.features, &config.forecast)?;
    let forecast = recommend_all(&predictions, &config.inventory)?;

    match &metrics {
        Some(m) => info!(
            "{}: MAE {:.3}, RMSE {:.3}, R2 {:.3} over {} test rows",
            dataset.entity, m.mae, m.rmse, m.r2, m.n_samples
        ),
        None => debug!("{}: no test rows, skipping evaluation", dataset.entity),
    }

    Ok(EntityRun {
        forecast: EntityForecast {
            entity: dataset.entity.clone(),
            train_rows: dataset.train.len(),
            test_rows: dataset.test.len(),
            metrics,
            holdout,
            forecast,
            feature_importances: model.feature_importances(),
        },
        model,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{RandomForest, RandomForestConfig};
    use approx::assert_relative_eq;

    fn monday(week: i64) -> NaiveDate {
        add_weeks(NaiveDate::from_ymd_opt(2023, 1, 2).unwrap(), week).unwrap()
    }

    fn row(week: i64, demand: f64, lags: Vec<f64>, rolling: Vec<f64>) -> FeatureRow {
        FeatureRow {
            entity: EntityKey::new("P001", "S01"),
            period_start: monday(week),
            category: String::new(),
            region: String::new(),
            demand,
            inventory_level: 1.0,
            price: 1.0,
            cost: 1.0,
            lags,
            rolling,
            calendar: CalendarFeatures::from_date(monday(week)),
            inventory_turnover: 0.0,
            gross_margin: 0.0,
        }
    }

    fn small_features() -> FeatureConfig {
        FeatureConfig {
            lags: vec![1, 2],
            rolling_windows: vec![2, 3],
            ..Default::default()
        }
    }

    fn weekly_history(weeks: impl IntoIterator<Item = i64>) -> Vec<(NaiveDate, f64)> {
        weeks.into_iter().map(|w| (monday(w), w as f64 + 1.0)).collect()
    }

    #[test]
    fn test_advance_shifts_lags_and_recomputes_rolling() {
        let features = small_features();
        let forecast = ForecastConfig::default();
        // Demand 1, 2, 3, 4 over weeks 0..=3
        let state = FeatureState::after_history(&weekly_history(0..4), &features, &forecast).unwrap();
        assert_eq!(state.period_start, monday(4));
        assert_eq!(state.lags, vec![4.0, 3.0]);
        assert_relative_eq!(state.rolling[0], 3.5);
        assert_relative_eq!(state.rolling[1], 3.0);

        let next = state.advance(5.0, &features, &forecast).unwrap();
        assert_eq!(next.period_start, monday(5));
        assert_eq!(next.lags, vec![5.0, 4.0]);
        assert_relative_eq!(next.rolling[0], 4.5);
        assert_relative_eq!(next.rolling[1], 4.0);
        assert_eq!(next.calendar, CalendarFeatures::from_date(monday(5)));

        // Advancing does not touch the original state
        assert_eq!(state.lags, vec![4.0, 3.0]);
        let again = state.advance(5.0, &features, &forecast).unwrap();
        assert_eq!(again, next);
    }

    #[test]
    fn test_short_windows_only_keeps_long_windows() {
        let features = small_features();
        let forecast = ForecastConfig {
            rolling_update: RollingUpdate::ShortWindowsOnly,
            calendar_policy: CalendarPolicy::Frozen,
            ..Default::default()
        };
        let state = FeatureState::after_history(&weekly_history(0..4), &features, &forecast).unwrap();
        assert_eq!(state.calendar, CalendarFeatures::from_date(monday(3)));

        let next = state.advance(5.0, &features, &forecast).unwrap();
        assert_relative_eq!(next.rolling[0], 4.5);
        assert_relative_eq!(next.rolling[1], 3.0);
        assert_eq!(next.calendar, state.calendar);
    }

    #[test]
    fn test_calendar_state_starts_after_last_week_despite_gap() {
        // Week 10 has no record
        let history = weekly_history((0..10).chain([11]));
        let forecast = ForecastConfig::default();
        let features = FeatureConfig {
            lags: vec![1],
            rolling_windows: vec![2],
            gap_policy: GapPolicy::Calendar,
            ..Default::default()
        };

        let state = FeatureState::after_history(&history, &features, &forecast).unwrap();
        assert_eq!(state.period_start, monday(12));
        assert_eq!(state.lags, vec![12.0]);
        // Only week 11 falls inside the two-week window
        assert_relative_eq!(state.rolling[0], 12.0);

        let next = state.advance(20.0, &features, &forecast).unwrap();
        assert_eq!(next.lags, vec![20.0]);
        assert_relative_eq!(next.rolling[0], 16.0);
    }

    #[test]
    fn test_calendar_gap_under_a_lag_refuses_the_forecast() {
        let history = weekly_history((0..10).chain([11]));
        let forecast = ForecastConfig::default();
        let calendar = FeatureConfig {
            lags: vec![1, 2],
            rolling_windows: vec![2],
            gap_policy: GapPolicy::Calendar,
            ..Default::default()
        };

        assert!(matches!(
            FeatureState::after_history(&history, &calendar, &forecast),
            Err(ForecastError::InsufficientHistory { needed: 2, got: 1, .. })
        ));

        // Counting recorded periods, week 9 is two periods back
        let positional = FeatureConfig {
            gap_policy: GapPolicy::Positional,
            ..calendar
        };
        let state = FeatureState::after_history(&history, &positional, &forecast).unwrap();
        assert_eq!(state.period_start, monday(12));
        assert_eq!(state.lags, vec![12.0, 10.0]);
    }

    #[test]
    fn test_empty_history_cannot_be_extrapolated() {
        assert!(matches!(
            FeatureState::after_history(&[], &small_features(), &ForecastConfig::default()),
            Err(ForecastError::EmptyPartition(_))
        ));
    }

    #[test]
    fn test_fit_refuses_small_training_set() {
        let train = vec![row(2, 1.0, vec![1.0, 1.0], vec![1.0, 1.0])];
        let result = fit_entity(
            &RandomForest::new(RandomForestConfig::default().n_trees(3)),
            &EntityKey::new("P001", "S01"),
            &train,
            &small_features(),
            4,
        );
        assert!(matches!(
            result,
            Err(ForecastError::InsufficientHistory { needed: 4, got: 1, .. })
        ));
    }

    #[test]
    fn test_constant_demand_forecasts_constant() {
        let features = small_features();
        let train: Vec<FeatureRow> = (2..10)
            .map(|w| row(w, 100.0, vec![100.0, 100.0], vec![100.0, 100.0]))
            .collect();
        let test: Vec<FeatureRow> = (10..12)
            .map(|w| row(w, 100.0, vec![100.0, 100.0], vec![100.0, 100.0]))
            .collect();
        let dataset = EntityDataset {
            entity: EntityKey::new("P001", "S01"),
            train,
            test,
            history: (0..12).map(|w| (monday(w), 100.0)).collect(),
        };
        let config = PipelineConfig {
            features,
            model: RandomForestConfig::default().n_trees(10),
            ..Default::default()
        };

        let run = forecast_entity(&RandomForest::new(config.model.clone()), &dataset, &config)
            .unwrap();
        let forecast = &run.forecast;

        let metrics = forecast.metrics.as_ref().unwrap();
        assert_relative_eq!(metrics.mae, 0.0);
        assert_eq!(forecast.forecast.len(), 4);
        assert_eq!(forecast.forecast[0].period_start, monday(12));
        for point in &forecast.forecast {
            assert_relative_eq!(point.forecasted_demand, 100.0);
            assert_eq!(point.recommended_inventory, 164);
        }
    }

    #[test]
    fn test_missing_test_rows_forecast_from_train() {
        let train: Vec<FeatureRow> = (2..8)
            .map(|w| row(w, w as f64, vec![(w - 1) as f64, (w - 2) as f64], vec![1.0, 1.0]))
            .collect();
        let dataset = EntityDataset {
            entity: EntityKey::new("P001", "S01"),
            train,
            test: vec![],
            history: (0..8).map(|w| (monday(w), w as f64)).collect(),
        };
        let config = PipelineConfig {
            features: small_features(),
            model: RandomForestConfig::default().n_trees(5),
            ..Default::default()
        };

        let run = forecast_entity(&RandomForest::new(config.model.clone()), &dataset, &config)
            .unwrap();
        assert!(run.forecast.metrics.is_none());
        assert_eq!(run.forecast.forecast[0].period_start, monday(8));
    }
}
