//! `predict` binary: evaluate a saved checkpoint on the held-out corpus.
//!
//! Loads the weights, forecasts every action's prediction samples over a
//! configurable horizon, logs the per-action error rows and, with
//! `--visualize`, writes `<output_dir>/<action>_<i>_{truth,pred}.npy`
//! joint-coordinate sequences for an external renderer.
//!
//! # Usage
//!
//! ```bash
//! cargo run --features tch-backend --bin predict -- \
//!     --config config.json --checkpoint model/HMR_epoch_12_error_0.8123.ot --horizon 75
//! ```

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use motion_forecast_train::config::TrainingConfig;
use motion_forecast_train::dataset::{MotionSource, NpyMotionSource, SyntheticMotionConfig, SyntheticMotionSource};
use motion_forecast_train::trainer::Trainer;

/// Command-line arguments for the prediction binary.
#[derive(Parser, Debug)]
#[command(
    name = "predict",
    version,
    about = "Evaluate a motion forecasting checkpoint",
    long_about = None
)]
struct Args {
    /// Path to the JSON configuration the checkpoint was trained with.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Checkpoint (`.ot`) to load.
    #[arg(long, value_name = "FILE")]
    checkpoint: PathBuf,

    /// Frames to forecast. Defaults to the config's `prediction_horizon`.
    #[arg(long)]
    horizon: Option<usize>,

    /// Write joint-coordinate artifacts (overrides config `visualize`).
    #[arg(long, default_value_t = false)]
    visualize: bool,

    /// Override the artifact directory from the config.
    #[arg(long, value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Run on CUDA (overrides config `use_gpu`).
    #[arg(long, default_value_t = false)]
    cuda: bool,

    /// Use the deterministic synthetic corpus instead of real data.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);

    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .with_thread_ids(false)
        .init();

    info!("Motion forecasting prediction v{}", motion_forecast_train::VERSION);

    let mut config = match args.config.as_deref() {
        Some(path) => match TrainingConfig::from_json(path) {
            Ok(cfg) => cfg,
            Err(e) => {
                error!("Failed to load configuration: {e}");
                std::process::exit(1);
            }
        },
        None => TrainingConfig::default(),
    };
    if args.visualize {
        config.visualize = true;
    }
    if let Some(dir) = args.output_dir {
        config.output_dir = dir;
    }
    if args.cuda {
        config.use_gpu = true;
    }
    let horizon = args.horizon.unwrap_or(config.prediction_horizon);
    info!("Forecasting {horizon} frames with {} from {}", config.model, args.checkpoint.display());

    let result = if args.dry_run {
        let source = SyntheticMotionSource::new(SyntheticMotionConfig::default(), config.datatype);
        predict(config, &source, horizon, &args.checkpoint)
    } else {
        match NpyMotionSource::discover(&config.data_dir, config.datatype) {
            Ok(source) => predict(config, &source, horizon, &args.checkpoint),
            Err(e) => {
                error!("Failed to load dataset: {e}");
                std::process::exit(1);
            }
        }
    };

    if let Err(e) = result {
        error!("Prediction failed: {e}");
        std::process::exit(1);
    }
}

fn predict(
    config: TrainingConfig,
    source: &dyn MotionSource,
    horizon: usize,
    checkpoint: &std::path::Path,
) -> motion_forecast_train::TrainResult<()> {
    let mut trainer = Trainer::with_prediction_horizon(config, source, horizon)?;
    let matrices = trainer.predict_from_checkpoint(checkpoint)?;
    info!("Evaluated {} actions", matrices.len());
    Ok(())
}
