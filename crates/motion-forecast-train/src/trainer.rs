//! Training loop orchestrator.
//!
//! [`Trainer`] owns one model, one [`BatchPipeline`], the composite loss and
//! the evaluator picked for the configured representation. Every epoch runs
//! three phases strictly in sequence:
//!
//! ```text
//! train (training_size passes) ─► validate (validation_size runs) ─► predict
//!                                                                      │
//!                      CheckpointPolicy::consider(aggregate error) ◄───┘
//! ```
//!
//! The optimizer is Adam with gradient-norm clipping at
//! `config.grad_clip_norm`. A non-finite loss aborts the run.

use ndarray::{concatenate, Array3, Axis};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tch::nn::{self, OptimizerConfig};
use tch::Device;
use tracing::{debug, info, warn};

use crate::checkpoint::{BestErrorState, CheckpointPolicy};
use crate::config::TrainingConfig;
use crate::dataset::{tensor_to_array3, MotionSource, SequenceBatch};
use crate::error::{TrainError, TrainResult};
use crate::losses::CompositeLoss;
use crate::metrics::{aggregate_error, evaluator_for, format_row, ErrorMatrix, Evaluator};
use crate::model::{build_model, ExecutionMode, ForecastModel};
use crate::pipeline::{BatchPipeline, PredictionSet};

// ─────────────────────────────────────────────────────────────────────────────
// Outcome types
// ─────────────────────────────────────────────────────────────────────────────

/// Losses and errors recorded for one epoch.
#[derive(Debug, Clone)]
pub struct EpochSummary {
    /// One-based epoch index.
    pub epoch: usize,
    /// Mean composite loss over every training step.
    pub train_loss: f64,
    /// Mean composite loss of the validation runs, `None` when the
    /// validation stream is empty.
    pub validation_loss: Option<f64>,
    /// Aggregate prediction error, `None` when no checkpoint fits the horizon.
    pub aggregate_error: Option<f32>,
    /// Whether this epoch produced a new checkpoint.
    pub improved: bool,
}

/// Result of [`Trainer::run`].
#[derive(Debug, Clone)]
pub struct TrainOutcome {
    /// Best aggregate error and the matrices that produced it.
    pub best: BestErrorState,
    /// One summary per completed epoch.
    pub epochs: Vec<EpochSummary>,
    /// Checkpoint files written, oldest first.
    pub checkpoints: Vec<PathBuf>,
}

// ─────────────────────────────────────────────────────────────────────────────
// Trainer
// ─────────────────────────────────────────────────────────────────────────────

/// Drives training, validation, per-action evaluation and checkpointing.
pub struct Trainer {
    config: TrainingConfig,
    device: Device,
    model: ForecastModel,
    pipeline: BatchPipeline,
    loss: CompositeLoss,
    evaluator: Box<dyn Evaluator>,
    checkpoints: Vec<usize>,
}

impl Trainer {
    /// Build a trainer whose prediction horizon equals the training horizon.
    ///
    /// The configuration is validated and the model built before any corpus
    /// is read, so an unsupported model identifier fails without touching
    /// the data.
    pub fn new(config: TrainingConfig, source: &dyn MotionSource) -> TrainResult<Self> {
        let horizon = config.output_window_size;
        Self::with_prediction_horizon(config, source, horizon)
    }

    /// Build a trainer that evaluates `horizon` frames per prediction sample.
    pub fn with_prediction_horizon(
        config: TrainingConfig,
        source: &dyn MotionSource,
        horizon: usize,
    ) -> TrainResult<Self> {
        config.validate()?;
        tch::manual_seed(config.seed as i64);
        let device = select_device(&config);

        let skeleton = source.skeleton()?;
        let feature_dim = config.datatype.feature_dim(skeleton.num_joints());
        let model = build_model(&config, feature_dim, device)?;

        let pipeline = BatchPipeline::with_prediction_horizon(&config, source, horizon)?;
        let loss = CompositeLoss::new(&config, pipeline.stats(), &pipeline.skeleton(), device);
        let evaluator = evaluator_for(pipeline.representation(), pipeline.stats().clone(), pipeline.skeleton());

        let effective_horizon = pipeline
            .prediction_split()
            .values()
            .map(PredictionSet::horizon)
            .next()
            .unwrap_or(horizon);
        let checkpoints = config.checkpoints_within(effective_horizon);
        if checkpoints.is_empty() {
            warn!("No evaluation checkpoint lies inside the {effective_horizon}-frame horizon");
        }

        info!(
            "Trainer ready: {} on {}, device {:?}, horizon {} (checkpoints {:?})",
            model.kind(),
            source.name(),
            device,
            effective_horizon,
            checkpoints
        );

        Ok(Trainer { config, device, model, pipeline, loss, evaluator, checkpoints })
    }

    /// Active configuration.
    pub fn config(&self) -> &TrainingConfig {
        &self.config
    }

    /// The model being trained.
    pub fn model(&self) -> &ForecastModel {
        &self.model
    }

    /// The batch pipeline feeding the model.
    pub fn pipeline(&self) -> &BatchPipeline {
        &self.pipeline
    }

    /// Device holding the model.
    pub fn device(&self) -> Device {
        self.device
    }

    /// Horizon checkpoints used for the aggregate error.
    pub fn checkpoints(&self) -> &[usize] {
        &self.checkpoints
    }

    /// Run `max_epoch` epochs.
    ///
    /// # Errors
    ///
    /// [`TrainError::NumericDivergence`] on a non-finite loss,
    /// [`TrainError::ShapeMismatch`] on a malformed batch and
    /// [`TrainError::Checkpoint`] if a checkpoint cannot be written.
    pub fn run(&mut self) -> TrainResult<TrainOutcome> {
        let mut optimizer = nn::Adam::default().build(self.model.var_store(), self.config.learning_rate)?;
        let mut policy = CheckpointPolicy::new(&self.config.checkpoint_dir, self.model.kind().as_str())?;
        let mut epochs = Vec::with_capacity(self.config.max_epoch);

        info!(
            "Starting training: {} epochs, {} train windows, {} validation windows",
            self.config.max_epoch,
            self.pipeline.train_len(),
            self.pipeline.validation_len()
        );

        for epoch in 1..=self.config.max_epoch {
            let started = Instant::now();

            let train_loss = self.train_epoch(epoch, &mut optimizer)?;
            let validation_loss = self.validate_epoch(epoch)?;
            let matrices = self.evaluate()?;
            let aggregate = aggregate_error(&matrices);
            self.log_matrices(&matrices);

            let improved = policy.consider(epoch, aggregate, &matrices, &self.model)?;
            info!(
                "Epoch {epoch}/{}: train {:.5}, validation {}, error {} ({:.1}s)",
                self.config.max_epoch,
                train_loss,
                validation_loss.map_or_else(|| "n/a".to_string(), |v| format!("{v:.5}")),
                aggregate.map_or_else(|| "n/a".to_string(), |v| format!("{v:.4}")),
                started.elapsed().as_secs_f64()
            );
            policy.log_best();

            epochs.push(EpochSummary { epoch, train_loss, validation_loss, aggregate_error: aggregate, improved });
        }

        Ok(TrainOutcome { best: policy.best().clone(), epochs, checkpoints: policy.saved().to_vec() })
    }

    fn train_epoch(&self, epoch: usize, optimizer: &mut nn::Optimizer) -> TrainResult<f64> {
        let loader = self.pipeline.train_batches(epoch);
        let mut total = 0.0_f64;
        let mut step = 0_usize;

        for pass in 0..self.config.training_size {
            for batch in loader.iter() {
                let batch = batch?;
                self.check_batch(&batch)?;
                let (encoder_inputs, decoder_inputs, decoder_outputs) = batch.to_tensors(self.device);

                let prediction = self.model.forward(&encoder_inputs, &decoder_inputs, ExecutionMode::Train);
                let (loss, parts) = self.loss.forward(&prediction, &decoder_outputs);
                if !parts.total.is_finite() {
                    return Err(TrainError::NumericDivergence { epoch, step, value: parts.total as f64 });
                }

                optimizer.zero_grad();
                loss.backward();
                optimizer.clip_grad_norm(self.config.grad_clip_norm);
                optimizer.step();

                debug!(
                    "Epoch {epoch} pass {pass} step {step}: loss {:.5} (reconstruction {:.5}, bone {:.5})",
                    parts.total, parts.reconstruction, parts.bone
                );
                total += parts.total as f64;
                step += 1;
            }
        }

        Ok(if step == 0 { 0.0 } else { total / step as f64 })
    }

    fn validate_epoch(&self, epoch: usize) -> TrainResult<Option<f64>> {
        let batches = self.pipeline.validation_batches(epoch).iter().collect::<TrainResult<Vec<_>>>()?;
        let Some(all) = SequenceBatch::concatenate(&batches)? else {
            warn!("Epoch {epoch}: validation stream is empty");
            return Ok(None);
        };
        self.check_batch(&all)?;

        let (encoder_inputs, decoder_inputs, decoder_outputs) = all.to_tensors(self.device);
        let mut total = 0.0_f64;
        for run in 0..self.config.validation_size {
            let prediction = self.model.forward(&encoder_inputs, &decoder_inputs, ExecutionMode::Eval);
            let (_, parts) = tch::no_grad(|| self.loss.forward(&prediction, &decoder_outputs));
            debug!("Epoch {epoch} validation run {run}: loss {:.5}", parts.total);
            total += parts.total as f64;
        }
        Ok(Some(total / self.config.validation_size as f64))
    }

    fn check_batch(&self, batch: &SequenceBatch) -> TrainResult<()> {
        batch.check_shape(
            self.config.input_window_size,
            self.config.output_window_size,
            self.pipeline.feature_dim(),
        )
    }

    /// Autoregressive forecasts `[N, horizon, F]` (normalized) per action.
    pub fn forecast(&self) -> TrainResult<BTreeMap<String, Array3<f32>>> {
        let mut out = BTreeMap::new();
        for (action, set) in self.pipeline.prediction_split() {
            if set.is_empty() {
                continue;
            }
            let (encoder_inputs, decoder_inputs, _) = set.batch.to_tensors(self.device);
            let prediction = self.model.forward(&encoder_inputs, &decoder_inputs, ExecutionMode::Eval);
            out.insert(action.clone(), tensor_to_array3(&prediction)?);
        }
        Ok(out)
    }

    /// Forecast every action of the prediction split and score it.
    pub fn evaluate(&self) -> TrainResult<BTreeMap<String, ErrorMatrix>> {
        let forecasts = self.forecast()?;
        self.score(&forecasts)
    }

    fn score(&self, forecasts: &BTreeMap<String, Array3<f32>>) -> TrainResult<BTreeMap<String, ErrorMatrix>> {
        let mut matrices = BTreeMap::new();
        for (action, prediction) in forecasts {
            let Some(set) = self.pipeline.prediction_split().get(action) else { continue };
            let matrix =
                self.evaluator.evaluate(action, prediction.view(), set.ground_truth().view(), &self.checkpoints)?;
            matrices.insert(action.clone(), matrix);
        }
        Ok(matrices)
    }

    fn log_matrices(&self, matrices: &BTreeMap<String, ErrorMatrix>) {
        for (action, matrix) in matrices {
            for &metric in self.evaluator.metrics() {
                debug!("{action:<14} {metric:<6} [{}]", format_row(&matrix.checkpoint_row(metric)));
            }
        }
    }

    /// Load weights from `checkpoint`, evaluate the prediction split and,
    /// when `config.visualize` is set, write joint-coordinate artifacts to
    /// `config.output_dir`.
    pub fn predict_from_checkpoint(&mut self, checkpoint: &Path) -> TrainResult<BTreeMap<String, ErrorMatrix>> {
        self.model.load(checkpoint)?;
        info!("Loaded weights from {}", checkpoint.display());

        let forecasts = self.forecast()?;
        let matrices = self.score(&forecasts)?;
        for (action, matrix) in &matrices {
            for &metric in self.evaluator.metrics() {
                info!("{action:<14} {metric:<6} [{}]", format_row(&matrix.checkpoint_row(metric)));
            }
        }
        match aggregate_error(&matrices) {
            Some(err) => info!("Aggregate error over {} actions: {err:.4}", matrices.len()),
            None => warn!("Aggregate error undefined for this horizon"),
        }

        if self.config.visualize {
            let written = self.write_artifacts(&forecasts)?;
            info!("Wrote {written} prediction artifacts to {}", self.config.output_dir.display());
        }
        Ok(matrices)
    }

    /// Write `<action>_<i>_truth.npy` and `<action>_<i>_pred.npy`, each the
    /// `[history + horizon, J, 3]` joint positions of one sample. Returns the
    /// number of files written.
    fn write_artifacts(&self, forecasts: &BTreeMap<String, Array3<f32>>) -> TrainResult<usize> {
        let dir = &self.config.output_dir;
        std::fs::create_dir_all(dir)?;
        let mut written = 0;

        for (action, prediction) in forecasts {
            let Some(set) = self.pipeline.prediction_split().get(action) else { continue };
            for i in 0..set.len() {
                let history = set.batch.encoder_inputs.index_axis(Axis(0), i);
                for (tag, future) in
                    [("truth", set.ground_truth().index_axis(Axis(0), i)), ("pred", prediction.index_axis(Axis(0), i))]
                {
                    let frames = concatenate(Axis(0), &[history, future]).map_err(|_| {
                        TrainError::shape_mismatch("artifact", history.shape().to_vec(), future.shape().to_vec())
                    })?;
                    let positions = self.evaluator.positions(frames.view())?;
                    let path = dir.join(format!("{action}_{i}_{tag}.npy"));
                    ndarray_npy::write_npy(&path, &positions)
                        .map_err(|e| TrainError::Io(std::io::Error::other(format!("{}: {e}", path.display()))))?;
                    written += 1;
                }
            }
        }
        Ok(written)
    }
}

fn select_device(config: &TrainingConfig) -> Device {
    if config.use_gpu {
        if tch::Cuda::is_available() {
            return Device::Cuda(config.gpu_device_id);
        }
        warn!("CUDA requested but not available, using CPU");
    }
    Device::Cpu
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Representation;
    use crate::dataset::{SyntheticMotionConfig, SyntheticMotionSource};

    fn tiny_config(dir: &Path) -> TrainingConfig {
        TrainingConfig {
            model: "GRU".to_string(),
            input_window_size: 10,
            output_window_size: 5,
            window_stride: 20,
            hidden_size: 8,
            num_layers: 1,
            batch_size: 8,
            max_epoch: 2,
            eval_checkpoints: vec![1, 3],
            prediction_samples_per_action: 2,
            checkpoint_dir: dir.join("ckpt"),
            output_dir: dir.join("out"),
            ..TrainingConfig::default()
        }
    }

    fn source() -> SyntheticMotionSource {
        let cfg = SyntheticMotionConfig { frames_per_sequence: 60, ..SyntheticMotionConfig::default() };
        SyntheticMotionSource::new(cfg, Representation::Lie)
    }

    #[test]
    fn first_epoch_always_writes_a_checkpoint() {
        let tmp = tempfile::tempdir().unwrap();
        let mut trainer = Trainer::new(tiny_config(tmp.path()), &source()).unwrap();
        let outcome = trainer.run().unwrap();

        assert_eq!(outcome.epochs.len(), 2);
        assert!(outcome.epochs[0].improved);
        assert!(!outcome.checkpoints.is_empty());
        assert!(outcome.checkpoints.iter().all(|p| p.exists()));
        assert!(outcome.best.error.is_finite());
    }

    #[test]
    fn predict_writes_truth_and_pred_artifacts() {
        let tmp = tempfile::tempdir().unwrap();
        let mut config = tiny_config(tmp.path());
        config.max_epoch = 1;
        let mut trainer = Trainer::new(config.clone(), &source()).unwrap();
        let outcome = trainer.run().unwrap();
        let checkpoint = outcome.checkpoints.last().unwrap().clone();

        config.visualize = true;
        let mut predictor = Trainer::with_prediction_horizon(config, &source(), 8).unwrap();
        let matrices = predictor.predict_from_checkpoint(&checkpoint).unwrap();

        assert_eq!(matrices.len(), 4);
        assert!(matrices.values().all(|m| m.horizon() == 8));
        let truth: Array3<f32> = ndarray_npy::read_npy(tmp.path().join("out/walking_0_truth.npy")).unwrap();
        assert_eq!(truth.shape(), &[18, 12, 3]);
        assert!(tmp.path().join("out/walking_0_pred.npy").exists());
    }
}
