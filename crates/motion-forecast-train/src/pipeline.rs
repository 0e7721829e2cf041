//! Batch pipeline: normalized training, validation and prediction streams.
//!
//! [`BatchPipeline::new`] reads both corpora from a [`MotionSource`] exactly
//! once, fits [`NormalizationStats`] on the training corpus and applies those
//! same statistics to the validation windows and the per-action prediction
//! split. The three streams therefore share one feature dimension and one
//! normalization.

use ndarray::{s, Array3, ArrayView2};
use std::collections::BTreeMap;
use std::sync::Arc;
use tracing::info;

use crate::config::{Representation, TrainingConfig};
use crate::dataset::{DataLoader, MotionCorpus, MotionSource, SequenceBatch, WindowedDataset};
use crate::error::{ConfigError, DatasetError, TrainError, TrainResult};
use crate::normalization::NormalizationStats;
use crate::skeleton::{BoneLengthTable, Skeleton};

/// Held-out sequences for one action.
#[derive(Debug, Clone)]
pub struct PredictionSet {
    /// Encoder history, decoder seed frames and ground-truth future, all
    /// normalized. `decoder_inputs[:, 0]` is the last observed frame.
    pub batch: SequenceBatch,
    /// Names of the sequences each sample was cut from.
    pub sources: Vec<String>,
    /// First frame of each sample within its source sequence.
    pub starts: Vec<usize>,
}

impl PredictionSet {
    /// Number of samples.
    pub fn len(&self) -> usize {
        self.batch.batch_size()
    }

    /// `true` if the action contributed no samples.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Prediction horizon in frames.
    pub fn horizon(&self) -> usize {
        self.batch.decoder_outputs.shape()[1]
    }

    /// Ground-truth future `[N, horizon, F]`.
    pub fn ground_truth(&self) -> &Array3<f32> {
        &self.batch.decoder_outputs
    }
}

/// Train / validation / prediction streams built from one source.
pub struct BatchPipeline {
    stats: NormalizationStats,
    train: WindowedDataset,
    validation: WindowedDataset,
    prediction: BTreeMap<String, PredictionSet>,
    skeleton: Arc<Skeleton>,
    bone_lengths: Arc<BoneLengthTable>,
    representation: Representation,
    feature_dim: usize,
    batch_size: usize,
    seed: u64,
}

impl BatchPipeline {
    /// Build the pipeline with the prediction horizon equal to the
    /// configured `output_window_size`.
    pub fn new(config: &TrainingConfig, source: &dyn MotionSource) -> TrainResult<Self> {
        Self::with_prediction_horizon(config, source, config.output_window_size)
    }

    /// Build the pipeline with a custom prediction horizon. The horizon is
    /// reduced to the longest one every test sequence can provide.
    pub fn with_prediction_horizon(
        config: &TrainingConfig,
        source: &dyn MotionSource,
        horizon: usize,
    ) -> TrainResult<Self> {
        if source.representation() != config.datatype {
            return Err(ConfigError::IncompatibleRepresentation {
                representation: config.datatype.to_string(),
                other: format!("{} data ({})", source.representation(), source.name()),
            }
            .into());
        }

        let skeleton = source.skeleton()?;
        let feature_dim = config.datatype.feature_dim(skeleton.num_joints());

        let train_corpus = source.train_corpus()?;
        let test_corpus = source.test_corpus()?;
        for corpus in [&train_corpus, &test_corpus] {
            if corpus.feature_dim() != feature_dim {
                return Err(DatasetError::FeatureMismatch {
                    name: source.name().to_string(),
                    expected: feature_dim,
                    found: corpus.feature_dim(),
                }
                .into());
            }
        }

        let raw: Vec<_> = train_corpus.sequences().iter().map(|s| s.frames.clone()).collect();
        let stats = if config.normalize {
            NormalizationStats::fit(&raw)?
        } else {
            NormalizationStats::identity(feature_dim)
        };
        let normalize = |v: ArrayView2<f32>| stats.normalize(v);
        let train_corpus = train_corpus.map_frames(normalize);
        let test_corpus = test_corpus.map_frames(normalize);

        let history = config.input_window_size;
        let train = WindowedDataset::new(&train_corpus, history, config.output_window_size, config.window_stride);
        if train.is_empty() {
            return Err(TrainError::EmptyDataset);
        }
        let validation =
            WindowedDataset::new(&test_corpus, history, config.output_window_size, config.window_stride);

        let horizon = limit_horizon(&test_corpus, history, horizon)?;
        let prediction = build_prediction_split(&test_corpus, history, horizon, config.prediction_samples_per_action)?;

        info!(
            "BatchPipeline: {} train windows, {} validation windows, {} actions, F={feature_dim}, \
             {} constant features",
            train.len(),
            validation.len(),
            prediction.len(),
            stats.dims_to_ignore().len()
        );

        let bone_lengths = Arc::new(skeleton.bone_lengths());
        Ok(BatchPipeline {
            stats,
            train,
            validation,
            prediction,
            skeleton: Arc::new(skeleton),
            bone_lengths,
            representation: config.datatype,
            feature_dim,
            batch_size: config.batch_size,
            seed: config.seed,
        })
    }

    /// Shuffled training batches for `epoch`. Calling `iter()` on the result
    /// restarts the pass.
    pub fn train_batches(&self, epoch: usize) -> DataLoader<'_> {
        DataLoader::new(&self.train, self.batch_size, true, self.seed.wrapping_add(epoch as u64))
    }

    /// Shuffled validation batches for `epoch`.
    pub fn validation_batches(&self, epoch: usize) -> DataLoader<'_> {
        DataLoader::new(&self.validation, self.batch_size, true, self.seed.wrapping_add(epoch as u64))
    }

    /// Per-action held-out samples.
    pub fn prediction_split(&self) -> &BTreeMap<String, PredictionSet> {
        &self.prediction
    }

    /// Statistics fitted on the training corpus.
    pub fn stats(&self) -> &NormalizationStats {
        &self.stats
    }

    /// Shared skeleton.
    pub fn skeleton(&self) -> Arc<Skeleton> {
        Arc::clone(&self.skeleton)
    }

    /// Shared rest bone-length table.
    pub fn bone_lengths(&self) -> Arc<BoneLengthTable> {
        Arc::clone(&self.bone_lengths)
    }

    /// Representation of every stream.
    pub fn representation(&self) -> Representation {
        self.representation
    }

    /// Feature dimension `F` of every stream.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Number of training windows.
    pub fn train_len(&self) -> usize {
        self.train.len()
    }

    /// Number of validation windows.
    pub fn validation_len(&self) -> usize {
        self.validation.len()
    }
}

/// Largest horizon `<= requested` that every test sequence can supply after
/// `history` frames.
fn limit_horizon(corpus: &MotionCorpus, history: usize, requested: usize) -> TrainResult<usize> {
    let shortest = corpus.sequences().iter().map(|s| s.frames.nrows()).min().unwrap_or(0);
    let available = shortest.saturating_sub(history);
    if available == 0 {
        let name = corpus
            .sequences()
            .iter()
            .min_by_key(|s| s.frames.nrows())
            .map(|s| format!("{}/{}", s.action, s.name))
            .unwrap_or_default();
        return Err(DatasetError::SequenceTooShort { name, frames: shortest, required: history + 1 }.into());
    }
    if available < requested {
        info!("Prediction horizon limited to {available} frames (requested {requested})");
    }
    Ok(requested.min(available))
}

/// Pick `per_action` evenly spaced windows from each action's sequences.
fn build_prediction_split(
    corpus: &MotionCorpus,
    history: usize,
    horizon: usize,
    per_action: usize,
) -> TrainResult<BTreeMap<String, PredictionSet>> {
    let len = history + horizon;
    let mut out = BTreeMap::new();

    for action in corpus.actions() {
        let candidates: Vec<(&str, ArrayView2<f32>, usize)> = corpus
            .by_action(&action)
            .flat_map(|seq| {
                (0..=seq.frames.nrows() - len).map(move |start| {
                    (seq.name.as_str(), seq.frames.slice(s![start..start + len, ..]), start)
                })
            })
            .collect();

        let n = per_action.min(candidates.len());
        let picked: Vec<_> = (0..n).map(|i| &candidates[i * candidates.len() / n]).collect();
        let windows: Vec<ArrayView2<f32>> = picked.iter().map(|c| c.1).collect();

        let set = PredictionSet {
            batch: SequenceBatch::from_windows(&windows, history, horizon)?,
            sources: picked.iter().map(|c| c.0.to_string()).collect(),
            starts: picked.iter().map(|c| c.2).collect(),
        };
        out.insert(action.clone(), set);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dataset::{SyntheticMotionConfig, SyntheticMotionSource};

    fn small_config() -> TrainingConfig {
        TrainingConfig {
            input_window_size: 10,
            output_window_size: 5,
            batch_size: 4,
            prediction_samples_per_action: 3,
            ..TrainingConfig::default()
        }
    }

    #[test]
    fn streams_share_feature_dim() {
        let src = SyntheticMotionSource::new(SyntheticMotionConfig::default(), Representation::Lie);
        let p = BatchPipeline::new(&small_config(), &src).unwrap();
        let f = p.feature_dim();
        let train = p.train_batches(0).iter().next().unwrap().unwrap();
        let val = p.validation_batches(0).iter().next().unwrap().unwrap();
        assert_eq!(train.feature_dim(), f);
        assert_eq!(val.feature_dim(), f);
        for set in p.prediction_split().values() {
            assert_eq!(set.batch.feature_dim(), f);
            assert_eq!(set.len(), 3);
            assert_eq!(set.horizon(), 5);
        }
    }

    #[test]
    fn representation_mismatch_is_a_config_error() {
        let src = SyntheticMotionSource::new(SyntheticMotionConfig::default(), Representation::Xyz);
        let err = BatchPipeline::new(&small_config(), &src).err().unwrap();
        assert!(matches!(err, TrainError::Config(ConfigError::IncompatibleRepresentation { .. })));
    }

    #[test]
    fn prediction_horizon_is_limited_by_test_frames() {
        let cfg = SyntheticMotionConfig { frames_per_sequence: 30, ..SyntheticMotionConfig::default() };
        let src = SyntheticMotionSource::new(cfg, Representation::Lie);
        let p = BatchPipeline::with_prediction_horizon(&small_config(), &src, 75).unwrap();
        for set in p.prediction_split().values() {
            assert_eq!(set.horizon(), 20);
        }
    }
}
