//! Multi-horizon forecast error metrics.
//!
//! This module provides:
//!
//! - **Mean Euler-angle error**: predicted and true joint rotations are
//!   converted from exponential maps to Euler angles, the root translation and
//!   rotation are zeroed, features that stay constant in the ground truth are
//!   dropped, and the per-frame Euclidean distance is averaged over sequences.
//! - **Mean per-joint position error (MPJPE)**: average Euclidean distance
//!   between predicted and true joint positions, per frame. Angle-space
//!   predictions are first placed in absolute root coordinates anchored at
//!   identity rotation and origin, then run through forward kinematics.
//!
//! Per-action results are collected into an [`ErrorMatrix`]; the reported
//! scalar is [`aggregate_error`], the mean over actions of the primary metric
//! at the selected horizon checkpoints.
//!
//! Inputs to every [`Evaluator`] are **normalized** `[N, T, F]` arrays; the
//! evaluator de-normalizes them with the statistics the pipeline fitted.

use nalgebra as na;
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2, ArrayView3, Axis};
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use crate::config::Representation;
use crate::error::{TrainError, TrainResult};
use crate::geometry::{coordinates_to_positions, expmap_frame_to_euler, forward_kinematics_sequence, revert_coordinate_space};
use crate::normalization::{NormalizationStats, STD_EPSILON};
use crate::skeleton::Skeleton;

/// Leading features zeroed before the Euler-angle comparison (root
/// translation and root rotation).
const ROOT_DIMS: usize = 6;

// ---------------------------------------------------------------------------
// MetricKind / ErrorMatrix
// ---------------------------------------------------------------------------

/// A column of the error matrix.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricKind {
    /// Mean Euler-angle error (radians).
    EulerAngle,
    /// Mean per-joint position error (skeleton units).
    JointPosition,
}

impl fmt::Display for MetricKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetricKind::EulerAngle => f.pad("euler"),
            MetricKind::JointPosition => f.pad("mpjpe"),
        }
    }
}

/// Per-step errors for one action.
///
/// `values[[t, m]]` is metric `metrics[m]` at horizon step `t`; the first
/// metric is the primary one used for checkpoint selection.
#[derive(Debug, Clone, PartialEq)]
pub struct ErrorMatrix {
    /// Action label.
    pub action: String,
    /// Column meanings.
    pub metrics: Vec<MetricKind>,
    /// `[horizon, metrics.len()]`, non-negative.
    pub values: Array2<f32>,
    /// Zero-based horizon steps reported, all `< horizon`.
    pub checkpoints: Vec<usize>,
}

impl ErrorMatrix {
    /// Number of horizon steps.
    pub fn horizon(&self) -> usize {
        self.values.nrows()
    }

    /// The primary metric.
    pub fn primary(&self) -> Option<MetricKind> {
        self.metrics.first().copied()
    }

    /// Full per-step column of `metric`.
    pub fn column(&self, metric: MetricKind) -> Option<ArrayView1<'_, f32>> {
        let m = self.metrics.iter().position(|&k| k == metric)?;
        Some(self.values.column(m))
    }

    /// Values of `metric` at the checkpoints.
    pub fn checkpoint_row(&self, metric: MetricKind) -> Vec<f32> {
        match self.column(metric) {
            Some(col) => self.checkpoints.iter().map(|&c| col[c]).collect(),
            None => Vec::new(),
        }
    }

    /// Mean of the primary metric over the checkpoints.
    pub fn checkpoint_mean(&self) -> Option<f32> {
        let row = self.checkpoint_row(self.primary()?);
        if row.is_empty() {
            None
        } else {
            Some(row.iter().sum::<f32>() / row.len() as f32)
        }
    }
}

/// Mean over actions of each action's checkpoint mean. `None` when there are
/// no actions or no checkpoint falls inside the horizon.
pub fn aggregate_error(matrices: &BTreeMap<String, ErrorMatrix>) -> Option<f32> {
    let means: Vec<f32> = matrices.values().filter_map(ErrorMatrix::checkpoint_mean).collect();
    if means.is_empty() || means.len() != matrices.len() {
        return None;
    }
    Some(means.iter().sum::<f32>() / means.len() as f32)
}

/// Checkpoint rows of `metric` averaged over actions, for logging.
pub fn action_averaged_row(matrices: &BTreeMap<String, ErrorMatrix>, metric: MetricKind) -> Vec<f32> {
    let rows: Vec<Vec<f32>> = matrices.values().map(|m| m.checkpoint_row(metric)).filter(|r| !r.is_empty()).collect();
    let width = rows.first().map(Vec::len).unwrap_or(0);
    (0..width)
        .map(|i| rows.iter().map(|r| r.get(i).copied().unwrap_or(0.0)).sum::<f32>() / rows.len() as f32)
        .collect()
}

/// Render a checkpoint row as `"0.1234 0.2345 ..."`.
pub fn format_row(row: &[f32]) -> String {
    row.iter().map(|v| format!("{v:.4}")).collect::<Vec<_>>().join(" ")
}

// ---------------------------------------------------------------------------
// Evaluator
// ---------------------------------------------------------------------------

/// Converts normalized predictions and ground truth into an [`ErrorMatrix`].
pub trait Evaluator: Send + Sync {
    /// Columns produced, primary first.
    fn metrics(&self) -> &[MetricKind];

    /// Evaluate one action. `prediction` and `ground_truth` are normalized
    /// `[N, horizon, F]` arrays.
    fn evaluate(
        &self,
        action: &str,
        prediction: ArrayView3<f32>,
        ground_truth: ArrayView3<f32>,
        checkpoints: &[usize],
    ) -> TrainResult<ErrorMatrix>;

    /// Joint positions `[T, J, 3]` of one normalized `[T, F]` sequence.
    fn positions(&self, sequence: ArrayView2<f32>) -> TrainResult<Array3<f32>>;
}

/// Pick the evaluator matching `representation`.
pub fn evaluator_for(
    representation: Representation,
    stats: NormalizationStats,
    skeleton: Arc<Skeleton>,
) -> Box<dyn Evaluator> {
    match representation {
        Representation::Lie => Box::new(AngleSpaceEvaluator::new(stats, skeleton)),
        Representation::Xyz => Box::new(CoordinateSpaceEvaluator::new(stats)),
    }
}

fn check_pair(prediction: &ArrayView3<f32>, ground_truth: &ArrayView3<f32>) -> TrainResult<()> {
    if prediction.shape() != ground_truth.shape() {
        return Err(TrainError::shape_mismatch("prediction", ground_truth.shape().to_vec(), prediction.shape().to_vec()));
    }
    Ok(())
}

fn unnormalize_all(stats: &NormalizationStats, data: ArrayView3<f32>) -> Vec<Array2<f32>> {
    data.outer_iter().map(|seq| stats.unnormalize(seq)).collect()
}

/// Angle-space (`lie`) evaluator: Euler-angle error plus MPJPE after forward
/// kinematics.
pub struct AngleSpaceEvaluator {
    stats: NormalizationStats,
    skeleton: Arc<Skeleton>,
}

impl AngleSpaceEvaluator {
    const METRICS: [MetricKind; 2] = [MetricKind::EulerAngle, MetricKind::JointPosition];

    /// Create an evaluator de-normalizing with `stats`.
    pub fn new(stats: NormalizationStats, skeleton: Arc<Skeleton>) -> Self {
        AngleSpaceEvaluator { stats, skeleton }
    }

    fn absolute_positions(&self, sequence: ArrayView2<f32>) -> TrainResult<Array3<f32>> {
        let absolute = revert_coordinate_space(sequence, na::Rotation3::identity(), na::Vector3::zeros());
        forward_kinematics_sequence(absolute.view(), &self.skeleton)
    }
}

impl Evaluator for AngleSpaceEvaluator {
    fn metrics(&self) -> &[MetricKind] {
        &Self::METRICS
    }

    fn evaluate(
        &self,
        action: &str,
        prediction: ArrayView3<f32>,
        ground_truth: ArrayView3<f32>,
        checkpoints: &[usize],
    ) -> TrainResult<ErrorMatrix> {
        check_pair(&prediction, &ground_truth)?;
        let pred = unnormalize_all(&self.stats, prediction);
        let gt = unnormalize_all(&self.stats, ground_truth);
        let horizon = prediction.shape()[1];

        let euler = mean_euler_error(&pred, &gt, horizon);

        let mut position = Array1::<f32>::zeros(horizon);
        for (p, g) in pred.iter().zip(&gt) {
            position += &per_frame_mpjpe(self.absolute_positions(p.view())?.view(), self.absolute_positions(g.view())?.view());
        }
        if !pred.is_empty() {
            position /= pred.len() as f32;
        }

        let mut values = Array2::<f32>::zeros((horizon, 2));
        values.column_mut(0).assign(&euler);
        values.column_mut(1).assign(&position);
        Ok(ErrorMatrix {
            action: action.to_string(),
            metrics: Self::METRICS.to_vec(),
            values,
            checkpoints: checkpoints.iter().copied().filter(|&c| c < horizon).collect(),
        })
    }

    fn positions(&self, sequence: ArrayView2<f32>) -> TrainResult<Array3<f32>> {
        self.absolute_positions(self.stats.unnormalize(sequence).view())
    }
}

/// Coordinate-space (`xyz`) evaluator: MPJPE on the de-normalized positions.
pub struct CoordinateSpaceEvaluator {
    stats: NormalizationStats,
}

impl CoordinateSpaceEvaluator {
    const METRICS: [MetricKind; 1] = [MetricKind::JointPosition];

    /// Create an evaluator de-normalizing with `stats`.
    pub fn new(stats: NormalizationStats) -> Self {
        CoordinateSpaceEvaluator { stats }
    }
}

impl Evaluator for CoordinateSpaceEvaluator {
    fn metrics(&self) -> &[MetricKind] {
        &Self::METRICS
    }

    fn evaluate(
        &self,
        action: &str,
        prediction: ArrayView3<f32>,
        ground_truth: ArrayView3<f32>,
        checkpoints: &[usize],
    ) -> TrainResult<ErrorMatrix> {
        check_pair(&prediction, &ground_truth)?;
        let horizon = prediction.shape()[1];
        let mut position = Array1::<f32>::zeros(horizon);
        for (p, g) in prediction.outer_iter().zip(ground_truth.outer_iter()) {
            let p = coordinates_to_positions(self.stats.unnormalize(p).view())?;
            let g = coordinates_to_positions(self.stats.unnormalize(g).view())?;
            position += &per_frame_mpjpe(p.view(), g.view());
        }
        if prediction.shape()[0] > 0 {
            position /= prediction.shape()[0] as f32;
        }
        Ok(ErrorMatrix {
            action: action.to_string(),
            metrics: Self::METRICS.to_vec(),
            values: position.insert_axis(Axis(1)),
            checkpoints: checkpoints.iter().copied().filter(|&c| c < horizon).collect(),
        })
    }

    fn positions(&self, sequence: ArrayView2<f32>) -> TrainResult<Array3<f32>> {
        coordinates_to_positions(self.stats.unnormalize(sequence).view())
    }
}

// ---------------------------------------------------------------------------
// Kernels
// ---------------------------------------------------------------------------

/// Mean Euler-angle error per horizon step over de-normalized angle-space
/// sequences `[T, F]`.
pub fn mean_euler_error(prediction: &[Array2<f32>], ground_truth: &[Array2<f32>], horizon: usize) -> Array1<f32> {
    let mut total = Array1::<f32>::zeros(horizon);
    if prediction.is_empty() {
        return total;
    }
    for (p, g) in prediction.iter().zip(ground_truth) {
        let pe = to_euler(p.view());
        let ge = to_euler(g.view());
        let used: Vec<usize> = ge
            .std_axis(Axis(0), 0.0)
            .iter()
            .enumerate()
            .filter(|(_, &s)| s > STD_EPSILON)
            .map(|(k, _)| k)
            .collect();
        for t in 0..horizon.min(pe.nrows()) {
            let sq: f32 = used.iter().map(|&k| (ge[[t, k]] - pe[[t, k]]).powi(2)).sum();
            total[t] += sq.sqrt();
        }
    }
    total / prediction.len() as f32
}

/// Convert every frame to Euler angles and zero the root features.
fn to_euler(sequence: ArrayView2<f32>) -> Array2<f32> {
    let mut out = Array2::<f32>::zeros(sequence.raw_dim());
    for (t, frame) in sequence.outer_iter().enumerate() {
        out.row_mut(t).assign(&expmap_frame_to_euler(frame));
    }
    let root = ROOT_DIMS.min(out.ncols());
    out.slice_mut(s![.., 0..root]).fill(0.0);
    out
}

/// Mean Per Joint Position Error of one frame: average Euclidean distance
/// over joints of two `[J, 3]` arrays.
pub fn mpjpe(pred: ArrayView2<f32>, gt: ArrayView2<f32>) -> f32 {
    let n = pred.nrows().min(gt.nrows());
    if n == 0 {
        return 0.0;
    }
    let total: f32 = (0..n)
        .map(|j| {
            let d = &pred.row(j) - &gt.row(j);
            d.dot(&d).sqrt()
        })
        .sum();
    total / n as f32
}

/// MPJPE for each frame of two `[T, J, 3]` arrays.
pub fn per_frame_mpjpe(pred: ArrayView3<f32>, gt: ArrayView3<f32>) -> Array1<f32> {
    pred.outer_iter().zip(gt.outer_iter()).map(|(p, g)| mpjpe(p, g)).collect()
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
