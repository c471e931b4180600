//! CSV and JSON output for a pipeline run

use crate::config::FeatureConfig;
use crate::engine::{EntityForecast, FittedEntityModel};
use crate::error::Result;
use crate::features::FeatureRow;
use crate::pipeline::{PipelineOutput, RunSummary};
use chrono::NaiveDate;
use serde::Serialize;
use std::fs::{self, File};
use std::io::BufWriter;
use std::path::{Path, PathBuf};
use tracing::info;

pub const FEATURES_FILE: &str = "weekly_features.csv";
pub const TRAIN_FILE: &str = "train.csv";
pub const TEST_FILE: &str = "test.csv";
pub const FORECASTS_FILE: &str = "forecasts.csv";
pub const HOLDOUT_FILE: &str = "holdout_predictions.csv";
pub const METRICS_FILE: &str = "metrics.csv";
pub const SUMMARY_FILE: &str = "summary.json";
pub const MODELS_DIR: &str = "models";

/// Write feature rows with one column per lag and rolling window
pub fn write_feature_rows<P: AsRef<Path>>(
    path: P,
    rows: &[FeatureRow],
    config: &FeatureConfig,
) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;

    let mut header: Vec<String> = [
        "Product_ID",
        "Store_ID",
        "Week_Start",
        "Category",
        "Region",
        "Sales_Quantity",
        "Inventory_Level",
        "Price",
        "Cost",
        "Inventory_Turnover",
        "Gross_Margin",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect();
    header.extend(config.feature_names());
    writer.write_record(&header)?;

    for row in rows {
        let mut record = vec![
            row.entity.product_id.clone(),
            row.entity.store_id.clone(),
            row.period_start.to_string(),
            row.category.clone(),
            row.region.clone(),
            row.demand.to_string(),
            row.inventory_level.to_string(),
            row.price.to_string(),
            row.cost.to_string(),
            row.inventory_turnover.to_string(),
            row.gross_margin.to_string(),
        ];
        record.extend(row.model_inputs().iter().map(f64::to_string));
        writer.write_record(&record)?;
    }

    writer.flush()?;
    Ok(())
}

#[derive(Debug, Serialize)]
struct ForecastRecord<'a> {
    #[serde(rename = "Product_ID")]
    product_id: &'a str,
    #[serde(rename = "Store_ID")]
    store_id: &'a str,
    #[serde(rename = "Week_Start")]
    period_start: NaiveDate,
    #[serde(rename = "Forecasted_Sales")]
    forecasted_demand: f64,
    #[serde(rename = "Optimal_Inventory")]
    recommended_inventory: u64,
}

#[derive(Debug, Serialize)]
struct HoldoutRecord<'a> {
    #[serde(rename = "Product_ID")]
    product_id: &'a str,
    #[serde(rename = "Store_ID")]
    store_id: &'a str,
    #[serde(rename = "Week_Start")]
    period_start: NaiveDate,
    #[serde(rename = "Actual_Sales")]
    actual: f64,
    #[serde(rename = "Predicted_Sales")]
    predicted: f64,
}

#[derive(Debug, Serialize)]
struct MetricsRecord<'a> {
    product_id: &'a str,
    store_id: &'a str,
    train_rows: usize,
    test_rows: usize,
    mae: Option<f64>,
    rmse: Option<f64>,
    r2: Option<f64>,
    mape: Option<f64>,
    mape_excluded: usize,
}

pub fn write_forecasts<P: AsRef<Path>>(path: P, forecasts: &[EntityForecast]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for entity in forecasts {
        for point in &entity.forecast {
            writer.serialize(ForecastRecord {
                product_id: &entity.entity.product_id,
                store_id: &entity.entity.store_id,
                period_start: point.period_start,
                forecasted_demand: point.forecasted_demand,
                recommended_inventory: point.recommended_inventory,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_holdout<P: AsRef<Path>>(path: P, forecasts: &[EntityForecast]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for entity in forecasts {
        for prediction in &entity.holdout {
            writer.serialize(HoldoutRecord {
                product_id: &entity.entity.product_id,
                store_id: &entity.entity.store_id,
                period_start: prediction.period_start,
                actual: prediction.actual,
                predicted: prediction.predicted,
            })?;
        }
    }
    writer.flush()?;
    Ok(())
}

pub fn write_metrics<P: AsRef<Path>>(path: P, forecasts: &[EntityForecast]) -> Result<()> {
    let mut writer = csv::Writer::from_path(path.as_ref())?;
    for entity in forecasts {
        let metrics = entity.metrics.as_ref();
        writer.serialize(MetricsRecord {
            product_id: &entity.entity.product_id,
            store_id: &entity.entity.store_id,
            train_rows: entity.train_rows,
            test_rows: entity.test_rows,
            mae: metrics.map(|m| m.mae),
            rmse: metrics.map(|m| m.rmse),
            r2: metrics.map(|m| m.r2),
            mape: metrics.and_then(|m| m.mape),
            mape_excluded: metrics.map_or(0, |m| m.mape_excluded),
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_summary<P: AsRef<Path>>(path: P, summary: &RunSummary) -> Result<()> {
    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer_pretty(writer, summary)?;
    Ok(())
}

pub fn write_model<P: AsRef<Path>, M: Serialize>(path: P, model: &FittedEntityModel<M>) -> Result<()> {
    let writer = BufWriter::new(File::create(path.as_ref())?);
    serde_json::to_writer(writer, model)?;
    Ok(())
}

/// Write every output of a run under `dir`, returning the paths written
pub fn export_all<P: AsRef<Path>>(
    dir: P,
    output: &PipelineOutput,
    config: &FeatureConfig,
) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir)?;
    let mut written = Vec::new();

    let path = dir.join(FEATURES_FILE);
    write_feature_rows(&path, &output.features.rows, config)?;
    written.push(path);

    if let Some(split) = &output.split {
        let path = dir.join(TRAIN_FILE);
        write_feature_rows(&path, &split.train, config)?;
        written.push(path);

        let path = dir.join(TEST_FILE);
        write_feature_rows(&path, &split.test, config)?;
        written.push(path);
    }

    let path = dir.join(FORECASTS_FILE);
    write_forecasts(&path, &output.forecasts)?;
    written.push(path);

    let path = dir.join(HOLDOUT_FILE);
    write_holdout(&path, &output.forecasts)?;
    written.push(path);

    let path = dir.join(METRICS_FILE);
    write_metrics(&path, &output.forecasts)?;
    written.push(path);

    let path = dir.join(SUMMARY_FILE);
    write_summary(&path, &output.summary)?;
    written.push(path);

    if !output.models.is_empty() {
        let models_dir = dir.join(MODELS_DIR);
        fs::create_dir_all(&models_dir)?;
        for model in &output.models {
            let path = models_dir.join(format!(
                "{}_{}.json",
                model.entity.product_id, model.entity.store_id
            ));
            write_model(&path, model)?;
            written.push(path);
        }
    }

    info!("Wrote {} files to {}", written.len(), dir.display());
    Ok(written)
}
