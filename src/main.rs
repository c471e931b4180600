//! Command line entry point
//!
//! ```text
//! shelfcast generate <out_dir>
//! shelfcast run <sales.csv> [<products.csv> <stores.csv>] <out_dir>
//! ```
//!
//! `SHELFCAST_CONFIG` may point at a TOML config file; `SHELFCAST_*` variables
//! override single settings and `RUST_LOG` controls log output.

use shelfcast::forecast::export::export_all;
use shelfcast::forecast::synthetic::{generate, SyntheticConfig};
use shelfcast::{ConfigLoader, DataLoader, Pipeline};
use std::error::Error;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage:
  shelfcast generate <out_dir>
  shelfcast run <sales.csv> [<products.csv> <stores.csv>] <out_dir>";

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .with_line_number(false)
        .init();
}

fn run_generate(out_dir: &Path) -> Result<(), Box<dyn Error>> {
    let config_file = std::env::var_os("SHELFCAST_CONFIG").map(PathBuf::from);
    let pipeline_config = ConfigLoader::load(config_file.as_deref())?;
    let config = SyntheticConfig {
        seed: pipeline_config.seed,
        ..Default::default()
    };

    let data = generate(&config)?;
    for path in data.write_csv(out_dir)? {
        info!("Wrote {}", path.display());
    }
    Ok(())
}

fn run_pipeline(inputs: &[String], out_dir: &Path) -> Result<(), Box<dyn Error>> {
    let config_file = std::env::var_os("SHELFCAST_CONFIG").map(PathBuf::from);
    let config = ConfigLoader::load(config_file.as_deref())?;

    let events = match inputs {
        [sales] => DataLoader::from_csv(sales)?,
        [sales, products, stores] => DataLoader::from_csv_with_catalogs(sales, products, stores)?,
        _ => return Err(USAGE.into()),
    };

    let output = Pipeline::new(config.clone())?.run(&events)?;
    for forecast in &output.forecasts {
        if let Some(metrics) = &forecast.metrics {
            info!("{}\n{}", forecast.entity, metrics);
        }
    }
    export_all(out_dir, &output, &config.features)?;

    info!(
        "Forecast {} entities ({} skipped), outputs in {}",
        output.summary.forecasted.len(),
        output.summary.skipped.len(),
        out_dir.display()
    );
    Ok(())
}

fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let result = match args.as_slice() {
        [command, out_dir] if command == "generate" => run_generate(Path::new(out_dir)),
        [command, rest @ .., out_dir] if command == "run" => run_pipeline(rest, Path::new(out_dir)),
        _ => Err(USAGE.into()),
    };

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{}", err);
            ExitCode::FAILURE
        }
    }
}

