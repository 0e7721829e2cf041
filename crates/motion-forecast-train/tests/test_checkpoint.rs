//! Integration tests for [`motion_forecast_train::checkpoint`].
//!
//! A recording sink stands in for the model so the policy can be exercised
//! without libtorch.

use ndarray::Array2;
use std::cell::RefCell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use motion_forecast_train::checkpoint::{CheckpointPolicy, CheckpointSink};
use motion_forecast_train::error::TrainResult;
use motion_forecast_train::metrics::{ErrorMatrix, MetricKind};

/// Writes a small marker file and remembers the path.
#[derive(Default)]
struct FileSink {
    written: RefCell<Vec<PathBuf>>,
}

impl CheckpointSink for FileSink {
    fn persist(&self, path: &Path) -> TrainResult<()> {
        std::fs::write(path, b"weights")?;
        self.written.borrow_mut().push(path.to_path_buf());
        Ok(())
    }
}

fn matrices(error: f32) -> BTreeMap<String, ErrorMatrix> {
    let mut out = BTreeMap::new();
    out.insert(
        "walking".to_string(),
        ErrorMatrix {
            action: "walking".into(),
            metrics: vec![MetricKind::EulerAngle],
            values: Array2::from_elem((10, 1), error),
            checkpoints: vec![1, 3, 7, 9],
        },
    );
    out
}

/// Aggregate errors `5.0, 5.0, 4.2`: epoch 1 saves, epoch 2 ties and does
/// not save, epoch 3 improves and saves. Two files, best 4.2 at epoch 3.
#[test]
fn tie_keeps_earlier_checkpoint() {
    let tmp = tempfile::tempdir().unwrap();
    let mut policy = CheckpointPolicy::new(tmp.path().join("model"), "HMR").unwrap();
    let sink = FileSink::default();

    let decisions: Vec<bool> = [5.0_f32, 5.0, 4.2]
        .iter()
        .enumerate()
        .map(|(i, &e)| policy.consider(i + 1, Some(e), &matrices(e), &sink).unwrap())
        .collect();

    assert_eq!(decisions, vec![true, false, true]);
    assert_eq!(sink.written.borrow().len(), 2);
    assert_eq!(policy.best().epoch, 3);
    assert!((policy.best().error - 4.2).abs() < 1e-6);
    assert_eq!(policy.best().best_row(), vec![4.2; 4]);

    let names: Vec<String> = policy
        .saved()
        .iter()
        .map(|p| p.file_name().unwrap().to_string_lossy().into_owned())
        .collect();
    assert_eq!(names, vec!["HMR_epoch_1_error_5.0000.ot", "HMR_epoch_3_error_4.2000.ot"]);
    assert!(policy.saved().iter().all(|p| p.exists()));
}

/// The best error never increases and files are only ever added.
#[test]
fn best_error_is_non_increasing() {
    let tmp = tempfile::tempdir().unwrap();
    let mut policy = CheckpointPolicy::new(tmp.path(), "GRU").unwrap();
    let sink = FileSink::default();

    let errors = [3.0_f32, 2.5, 2.7, 2.5, 1.9, 4.0, 1.95, 1.2];
    let mut previous_best = f32::INFINITY;
    let mut previous_files = 0;
    for (i, &e) in errors.iter().enumerate() {
        let saved = policy.consider(i + 1, Some(e), &matrices(e), &sink).unwrap();
        let best = policy.best().error;
        assert!(best <= previous_best, "best error rose from {previous_best} to {best}");
        assert_eq!(saved, e < previous_best);
        assert!(policy.saved().len() >= previous_files);
        previous_best = best;
        previous_files = policy.saved().len();
    }
    assert_eq!(policy.saved().len(), 4);
    assert!((policy.best().error - 1.2).abs() < 1e-6);
}

/// The checkpoint directory is created on demand.
#[test]
fn policy_creates_checkpoint_directory() {
    let tmp = tempfile::tempdir().unwrap();
    let dir = tmp.path().join("nested/ckpt");
    let _policy = CheckpointPolicy::new(&dir, "ERD").unwrap();
    assert!(dir.is_dir());
}

/// A failing sink surfaces its error and leaves the best state untouched.
#[test]
fn failed_persist_does_not_update_best() {
    struct Failing;
    impl CheckpointSink for Failing {
        fn persist(&self, path: &Path) -> TrainResult<()> {
            Err(motion_forecast_train::TrainError::checkpoint("disk full", path))
        }
    }

    let tmp = tempfile::tempdir().unwrap();
    let mut policy = CheckpointPolicy::new(tmp.path(), "ERD").unwrap();
    assert!(policy.consider(1, Some(1.0), &matrices(1.0), &Failing).is_err());
    assert_eq!(policy.best().epoch, 0);
    assert!(policy.best().error.is_infinite());
    assert!(policy.saved().is_empty());
}
