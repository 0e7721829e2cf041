//! Integration tests for [`motion_forecast_train::metrics`].
//!
//! All inputs are fixed, deterministic arrays. No tch dependency: the
//! evaluators work on host-side `ndarray` data.

use approx::assert_abs_diff_eq;
use ndarray::{Array2, Array3};
use std::collections::BTreeMap;
use std::sync::Arc;

use motion_forecast_train::config::Representation;
use motion_forecast_train::metrics::{
    action_averaged_row, aggregate_error, evaluator_for, mpjpe, per_frame_mpjpe, ErrorMatrix, MetricKind,
};
use motion_forecast_train::normalization::NormalizationStats;
use motion_forecast_train::skeleton::Skeleton;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn single_column(action: &str, metric: MetricKind, col: &[f32], checkpoints: Vec<usize>) -> ErrorMatrix {
    ErrorMatrix {
        action: action.to_string(),
        metrics: vec![metric],
        values: Array2::from_shape_vec((col.len(), 1), col.to_vec()).unwrap(),
        checkpoints,
    }
}

// ---------------------------------------------------------------------------
// Two-joint identity scenario
// ---------------------------------------------------------------------------

/// A 2-joint skeleton whose prediction and ground truth are both identity
/// rotations for every frame has zero error everywhere, and so does the
/// aggregate.
#[test]
fn two_joint_identity_has_zero_error() {
    let skeleton = Arc::new(Skeleton::chain(2, 1.0).unwrap());
    let evaluator = evaluator_for(Representation::Lie, NormalizationStats::identity(9), skeleton);

    let frames = Array3::<f32>::zeros((3, 10, 9));
    let m = evaluator.evaluate("walking", frames.view(), frames.view(), &[1, 3, 7, 9]).unwrap();

    assert_eq!(m.metrics, vec![MetricKind::EulerAngle, MetricKind::JointPosition]);
    assert_eq!(m.horizon(), 10);
    assert!(m.values.iter().all(|&v| v == 0.0), "expected all-zero matrix, got {:?}", m.values);

    let mut all = BTreeMap::new();
    all.insert("walking".to_string(), m);
    assert_eq!(aggregate_error(&all), Some(0.0));
}

/// Every value an evaluator produces is non-negative.
#[test]
fn angle_space_errors_are_non_negative_and_grow_with_perturbation() {
    let skeleton = Arc::new(Skeleton::chain(3, 1.0).unwrap());
    let evaluator = evaluator_for(Representation::Lie, NormalizationStats::identity(12), skeleton);

    // Ground truth: joint 2 swings about x over time.
    let mut gt = Array3::<f32>::zeros((2, 6, 12));
    for n in 0..2 {
        for t in 0..6 {
            gt[[n, t, 9]] = 0.1 * t as f32;
        }
    }
    let mut small = gt.clone();
    let mut large = gt.clone();
    for n in 0..2 {
        for t in 0..6 {
            small[[n, t, 9]] += 0.05;
            large[[n, t, 9]] += 0.3;
        }
    }

    let a = evaluator.evaluate("eating", small.view(), gt.view(), &[1, 3]).unwrap();
    let b = evaluator.evaluate("eating", large.view(), gt.view(), &[1, 3]).unwrap();
    assert!(a.values.iter().all(|&v| v >= 0.0));
    assert!(b.values.iter().all(|&v| v >= 0.0));
    assert!(b.checkpoint_mean().unwrap() > a.checkpoint_mean().unwrap());
}

/// Mismatched prediction / ground-truth shapes are rejected.
#[test]
fn evaluate_rejects_shape_mismatch() {
    let evaluator = evaluator_for(Representation::Xyz, NormalizationStats::identity(6), Arc::new(Skeleton::chain(2, 1.0).unwrap()));
    let p = Array3::<f32>::zeros((1, 4, 6));
    let g = Array3::<f32>::zeros((1, 5, 6));
    assert!(evaluator.evaluate("x", p.view(), g.view(), &[1]).is_err());
}

// ---------------------------------------------------------------------------
// Coordinate space
// ---------------------------------------------------------------------------

/// Shifting every joint by 0.1 along one axis gives an MPJPE of 0.1 at every
/// step, after de-normalization.
#[test]
fn coordinate_space_constant_offset() {
    let stats = NormalizationStats::fit(&[Array2::from_shape_fn((20, 6), |(t, k)| (t * 3 + k) as f32)]).unwrap();
    let evaluator = evaluator_for(Representation::Xyz, stats.clone(), Arc::new(Skeleton::chain(2, 1.0).unwrap()));
    assert_eq!(evaluator.metrics(), &[MetricKind::JointPosition]);

    let raw_gt = Array2::from_shape_fn((5, 6), |(t, k)| (t + k) as f32);
    let mut raw_pred = raw_gt.clone();
    raw_pred.column_mut(0).mapv_inplace(|v| v + 0.1);
    raw_pred.column_mut(3).mapv_inplace(|v| v + 0.1);

    let gt = stats.normalize(raw_gt.view()).insert_axis(ndarray::Axis(0));
    let pred = stats.normalize(raw_pred.view()).insert_axis(ndarray::Axis(0));
    let m = evaluator.evaluate("walking", pred.view(), gt.view(), &[0, 4]).unwrap();
    for &v in m.values.iter() {
        assert_abs_diff_eq!(v, 0.1, epsilon = 1e-4);
    }
}

/// `mpjpe` averages Euclidean distances over joints.
#[test]
fn mpjpe_known_value() {
    let gt = Array2::<f32>::zeros((2, 3));
    let pred = ndarray::array![[3.0_f32, 4.0, 0.0], [0.0, 0.0, 1.0]];
    assert_abs_diff_eq!(mpjpe(pred.view(), gt.view()), 3.0, epsilon = 1e-6);

    let seq_p = pred.clone().insert_axis(ndarray::Axis(0));
    let seq_g = gt.insert_axis(ndarray::Axis(0));
    assert_abs_diff_eq!(per_frame_mpjpe(seq_p.view(), seq_g.view())[0], 3.0, epsilon = 1e-6);
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// The aggregate is the mean over actions of the mean over checkpoints.
#[test]
fn aggregate_is_mean_of_action_means() {
    let mut all = BTreeMap::new();
    all.insert("a".into(), single_column("a", MetricKind::EulerAngle, &[0.0, 1.0, 2.0, 3.0], vec![1, 3]));
    all.insert("b".into(), single_column("b", MetricKind::EulerAngle, &[0.0, 3.0, 0.0, 5.0], vec![1, 3]));
    // a: (1 + 3) / 2 = 2, b: (3 + 5) / 2 = 4.
    assert_abs_diff_eq!(aggregate_error(&all).unwrap(), 3.0, epsilon = 1e-6);
    assert_eq!(action_averaged_row(&all, MetricKind::EulerAngle), vec![2.0, 4.0]);
}

/// With no checkpoint inside the horizon the aggregate is undefined.
#[test]
fn aggregate_without_checkpoints_is_none() {
    let mut all = BTreeMap::new();
    all.insert("a".into(), single_column("a", MetricKind::JointPosition, &[1.0, 2.0], vec![]));
    assert_eq!(aggregate_error(&all), None);
    assert_eq!(aggregate_error(&BTreeMap::new()), None);
}

/// Evaluators drop checkpoints beyond the horizon.
#[test]
fn evaluator_drops_out_of_range_checkpoints() {
    let evaluator = evaluator_for(Representation::Xyz, NormalizationStats::identity(6), Arc::new(Skeleton::chain(2, 1.0).unwrap()));
    let frames = Array3::<f32>::zeros((1, 4, 6));
    let m = evaluator.evaluate("a", frames.view(), frames.view(), &[1, 3, 7, 9]).unwrap();
    assert_eq!(m.checkpoints, vec![1, 3]);
}
