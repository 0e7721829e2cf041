//! Best-model checkpoint policy.
//!
//! After every epoch the aggregate prediction error is offered to a
//! [`CheckpointPolicy`]. A new checkpoint is persisted only when the error is
//! strictly lower than every error seen so far, so the best-error sequence is
//! non-increasing and ties keep the earlier checkpoint. Files are never
//! overwritten or deleted; each improvement produces a new
//! `<model>_epoch_<epoch>_error_<err:.4>.ot` file.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::error::{TrainError, TrainResult};
use crate::metrics::{action_averaged_row, format_row, ErrorMatrix};

/// Something whose parameters can be written to a file.
pub trait CheckpointSink {
    /// Write the current parameters to `path`.
    fn persist(&self, path: &Path) -> TrainResult<()>;
}

/// The lowest aggregate error seen so far and where it came from.
#[derive(Debug, Clone)]
pub struct BestErrorState {
    /// Aggregate error; `f32::INFINITY` before the first evaluation.
    pub error: f32,
    /// Per-action matrices of the best epoch.
    pub matrices: BTreeMap<String, ErrorMatrix>,
    /// One-based epoch of the best result, `0` before the first one.
    pub epoch: usize,
}

impl Default for BestErrorState {
    fn default() -> Self {
        BestErrorState { error: f32::INFINITY, matrices: BTreeMap::new(), epoch: 0 }
    }
}

impl BestErrorState {
    /// Action-averaged checkpoint row of the primary metric.
    pub fn best_row(&self) -> Vec<f32> {
        match self.matrices.values().next().and_then(ErrorMatrix::primary) {
            Some(metric) => action_averaged_row(&self.matrices, metric),
            None => Vec::new(),
        }
    }
}

/// Decides when to persist a checkpoint and remembers the best result.
#[derive(Debug)]
pub struct CheckpointPolicy {
    dir: PathBuf,
    model_name: String,
    best: BestErrorState,
    saved: Vec<PathBuf>,
}

impl CheckpointPolicy {
    /// Create a policy writing into `dir` with file names prefixed by
    /// `model_name`. The directory is created if missing.
    pub fn new(dir: impl Into<PathBuf>, model_name: impl Into<String>) -> TrainResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .map_err(|e| TrainError::checkpoint(format!("cannot create checkpoint directory: {e}"), &dir))?;
        Ok(CheckpointPolicy { dir, model_name: model_name.into(), best: BestErrorState::default(), saved: Vec::new() })
    }

    /// File name used for an improvement at `epoch` with `error`.
    pub fn checkpoint_path(&self, epoch: usize, error: f32) -> PathBuf {
        self.dir.join(format!("{}_epoch_{}_error_{:.4}.ot", self.model_name, epoch, error))
    }

    /// Offer one epoch's result. Persists through `sink` and returns `true`
    /// iff `aggregate` is strictly below the best so far.
    ///
    /// A `None` aggregate (no checkpoint inside the horizon) never persists.
    pub fn consider(
        &mut self,
        epoch: usize,
        aggregate: Option<f32>,
        matrices: &BTreeMap<String, ErrorMatrix>,
        sink: &dyn CheckpointSink,
    ) -> TrainResult<bool> {
        let Some(error) = aggregate else {
            warn!("Epoch {epoch}: aggregate error undefined, checkpoint skipped");
            return Ok(false);
        };
        if !error.is_finite() || error >= self.best.error {
            return Ok(false);
        }

        let path = self.checkpoint_path(epoch, error);
        sink.persist(&path)?;
        info!("Epoch {epoch}: error improved {:.4} -> {error:.4}, saved {}", self.best.error, path.display());

        self.best = BestErrorState { error, matrices: matrices.clone(), epoch };
        self.saved.push(path);
        Ok(true)
    }

    /// Best result so far.
    pub fn best(&self) -> &BestErrorState {
        &self.best
    }

    /// Every file persisted, oldest first.
    pub fn saved(&self) -> &[PathBuf] {
        &self.saved
    }

    /// Log the best state's action-averaged row.
    pub fn log_best(&self) {
        if self.best.epoch == 0 {
            info!("Best error: none yet");
        } else {
            info!(
                "Best error {:.4} at epoch {}: [{}]",
                self.best.error,
                self.best.epoch,
                format_row(&self.best.best_row())
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        paths: RefCell<Vec<PathBuf>>,
    }

    impl CheckpointSink for Recorder {
        fn persist(&self, path: &Path) -> TrainResult<()> {
            self.paths.borrow_mut().push(path.to_path_buf());
            Ok(())
        }
    }

    #[test]
    fn file_name_carries_epoch_and_error() {
        let tmp = tempfile::tempdir().unwrap();
        let policy = CheckpointPolicy::new(tmp.path(), "HMR").unwrap();
        let p = policy.checkpoint_path(3, 0.123456);
        assert_eq!(p.file_name().unwrap().to_str().unwrap(), "HMR_epoch_3_error_0.1235.ot");
    }

    #[test]
    fn undefined_aggregate_never_persists() {
        let tmp = tempfile::tempdir().unwrap();
        let mut policy = CheckpointPolicy::new(tmp.path(), "GRU").unwrap();
        let sink = Recorder::default();
        assert!(!policy.consider(1, None, &BTreeMap::new(), &sink).unwrap());
        assert!(!policy.consider(2, Some(f32::NAN), &BTreeMap::new(), &sink).unwrap());
        assert!(sink.paths.borrow().is_empty());
    }
}
