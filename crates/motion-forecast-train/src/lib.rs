//! # Motion Forecasting Training Harness
//!
//! Trains and evaluates encoder/decoder networks that forecast future human
//! poses from a window of observed poses. It includes configuration
//! management, motion-corpus loading and normalization, a composite
//! reconstruction + bone-length loss, angle-space and joint-position error
//! metrics, best-error checkpointing and the training loop orchestrator.
//!
//! ## Architecture
//!
//! ```text
//! TrainingConfig ──► Trainer ──► ForecastModel (ST_HMR | HMR | ERD | GRU | LSTM3lr)
//!       │               │
//!       │         BatchPipeline ──► NormalizationStats
//!       │               │
//!       │         MotionSource (NpyMotionSource | SyntheticMotionSource)
//!       │
//!       └──► CompositeLoss / Evaluator ──► CheckpointPolicy
//! ```
//!
//! The model, loss and trainer need libtorch and are only compiled with the
//! `tch-backend` feature. Everything else is plain `ndarray` / `nalgebra`.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use motion_forecast_train::config::{Representation, TrainingConfig};
//! use motion_forecast_train::dataset::{SyntheticMotionConfig, SyntheticMotionSource};
//! use motion_forecast_train::pipeline::BatchPipeline;
//!
//! let config = TrainingConfig::default();
//! config.validate().expect("config is valid");
//!
//! let source = SyntheticMotionSource::new(SyntheticMotionConfig::default(), Representation::Lie);
//! let pipeline = BatchPipeline::new(&config, &source).unwrap();
//! for batch in pipeline.train_batches(1).iter() {
//!     let batch = batch.unwrap();
//!     println!("encoder inputs: {:?}", batch.encoder_inputs.shape());
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checkpoint;
pub mod config;
pub mod dataset;
pub mod error;
pub mod geometry;
pub mod metrics;
pub mod normalization;
pub mod pipeline;
pub mod skeleton;

#[cfg(feature = "tch-backend")]
pub mod losses;
#[cfg(feature = "tch-backend")]
pub mod model;
#[cfg(feature = "tch-backend")]
pub mod trainer;

// Convenient re-exports at the crate root.
pub use checkpoint::{BestErrorState, CheckpointPolicy, CheckpointSink};
pub use config::{LossKind, ModelKind, Representation, TrainingConfig};
pub use dataset::{
    DataLoader, MotionCorpus, MotionSequence, MotionSource, NpyMotionSource, SequenceBatch, SyntheticMotionConfig,
    SyntheticMotionSource, WindowedDataset,
};
pub use error::{ConfigError, DatasetError, TrainError, TrainResult};
pub use metrics::{aggregate_error, evaluator_for, ErrorMatrix, Evaluator, MetricKind};
pub use normalization::NormalizationStats;
pub use pipeline::{BatchPipeline, PredictionSet};
pub use skeleton::{BoneLengthTable, Skeleton};

#[cfg(feature = "tch-backend")]
pub use model::{build_model, ExecutionMode, ForecastModel, SequenceTransducer};
#[cfg(feature = "tch-backend")]
pub use trainer::{EpochSummary, TrainOutcome, Trainer};

/// Crate version string.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
