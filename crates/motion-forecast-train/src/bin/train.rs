//! `train` binary: entry point for the motion-forecasting training loop.
//!
//! # Usage
//!
//! ```bash
//! cargo run --features tch-backend --bin train -- --config config.json
//! cargo run --features tch-backend --bin train -- --config config.json --cuda
//! cargo run --features tch-backend --bin train -- --dry-run --model GRU
//! ```

use clap::Parser;
use std::path::PathBuf;
use tracing::{error, info};
use motion_forecast_train::config::TrainingConfig;
use motion_forecast_train::dataset::{MotionSource, NpyMotionSource, SyntheticMotionConfig, SyntheticMotionSource};
use motion_forecast_train::trainer::Trainer;

/// Command-line arguments for the training binary.
#[derive(Parser, Debug)]
#[command(
    name = "train",
    version,
    about = "Motion forecasting training pipeline",
    long_about = None
)]
struct Args {
    /// Path to the JSON configuration file.
    ///
    /// If not provided, the default `TrainingConfig` is used.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the model identifier (ST_HMR, HMR, ERD, GRU, LSTM3lr).
    #[arg(long)]
    model: Option<String>,

    /// Override the data directory from the config.
    #[arg(long, value_name = "DIR")]
    data_dir: Option<PathBuf>,

    /// Override the checkpoint directory from the config.
    #[arg(long, value_name = "DIR")]
    checkpoint_dir: Option<PathBuf>,

    /// Override the number of epochs.
    #[arg(long)]
    max_epoch: Option<usize>,

    /// Enable CUDA training (overrides config `use_gpu`).
    #[arg(long, default_value_t = false)]
    cuda: bool,

    /// Use the deterministic synthetic corpus instead of real data.
    ///
    /// This is intended for pipeline smoke-tests only, not production training.
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Frames per synthetic sequence when `--dry-run` is active.
    #[arg(long, default_value_t = 160)]
    dry_run_frames: usize,

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

    info!("Motion forecasting training pipeline v{}", motion_forecast_train::VERSION);

    let mut config = match args.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            match TrainingConfig::from_json(path) {
                Ok(cfg) => cfg,
                Err(e) => {
                    error!("Failed to load configuration: {e}");
                    std::process::exit(1);
                }
            }
        }
        None => {
            info!("No configuration file provided, using defaults");
            TrainingConfig::default()
        }
    };

    if let Some(model) = args.model {
        config.model = model;
    }
    if let Some(dir) = args.data_dir {
        config.data_dir = dir;
    }
    if let Some(dir) = args.checkpoint_dir {
        config.checkpoint_dir = dir;
    }
    if let Some(epochs) = args.max_epoch {
        config.max_epoch = epochs;
    }
    if args.cuda {
        config.use_gpu = true;
    }

    if let Err(e) = config.validate() {
        error!("Configuration validation failed: {e}");
        std::process::exit(1);
    }

    info!("Configuration validated successfully");
    info!("  model        : {}", config.model);
    info!("  datatype     : {}", config.datatype);
    info!("  windows      : {} -> {}", config.input_window_size, config.output_window_size);
    info!("  batch size   : {}", config.batch_size);
    info!("  learning rate: {}", config.learning_rate);
    info!("  epochs       : {}", config.max_epoch);
    info!("  loss         : {:?} (bone weight {})", config.loss, config.bone_loss_weight);
    info!("  device       : {}", if config.use_gpu { "GPU" } else { "CPU" });

    if args.dry_run {
        info!("DRY RUN, using synthetic corpus ({} frames per sequence)", args.dry_run_frames);
        let syn_cfg = SyntheticMotionConfig { frames_per_sequence: args.dry_run_frames, ..SyntheticMotionConfig::default() };
        let source = SyntheticMotionSource::new(syn_cfg, config.datatype);
        run_trainer(config, &source);
    } else {
        info!("Loading {} corpus from {}", config.dataset, config.data_dir.display());
        let source = match NpyMotionSource::discover(&config.data_dir, config.datatype) {
            Ok(src) => src,
            Err(e) => {
                error!("Failed to load dataset: {e}");
                error!("Expected <data_dir>/{{train,test}}/<action>/*.npy and <data_dir>/skeleton.json");
                std::process::exit(1);
            }
        };
        run_trainer(config, &source);
    }
}

fn run_trainer(config: TrainingConfig, source: &dyn MotionSource) {
    info!("Initialising trainer on {}", source.name());
    let mut trainer = match Trainer::new(config, source) {
        Ok(t) => t,
        Err(e) => {
            error!("Failed to initialise trainer: {e}");
            std::process::exit(1);
        }
    };

    match trainer.run() {
        Ok(outcome) => {
            info!(
                "Training finished: best error {:.4} at epoch {}, {} checkpoints written",
                outcome.best.error,
                outcome.best.epoch,
                outcome.checkpoints.len()
            );
            if let Some(last) = outcome.checkpoints.last() {
                info!("Best checkpoint: {}", last.display());
            }
        }
        Err(e) => {
            error!("Training failed: {e}");
            std::process::exit(1);
        }
    }
}
