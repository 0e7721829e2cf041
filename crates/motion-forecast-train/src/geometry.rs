//! Rotation conversions and forward kinematics on host-side arrays.
//!
//! Angle-space frames use the layout
//!
//! ```text
//! [ root translation (3) | joint 0 rotation (3) | joint 1 rotation (3) | ... ]
//! ```
//!
//! so a skeleton with `J` joints has `3 + 3J` features and the exponential
//! map of joint `j` lives at `3 + 3j .. 6 + 3j`. Coordinate-space frames are
//! the flattened `[J, 3]` joint positions.
//!
//! Forward kinematics composes rotations with row vectors, the motion-capture
//! convention: `R_j = exp(w_j) * R_parent` and
//! `p_j = p_parent + offset_j * R_parent` (a row vector times the parent
//! rotation, i.e. `R_parent^T * offset_j` in column form). The root sits at
//! its offset plus the frame's translation and is rotated by its own
//! exponential map.

use nalgebra as na;
use ndarray::{s, Array1, Array2, Array3, ArrayView1, ArrayView2};

use crate::error::{TrainError, TrainResult};
use crate::skeleton::{BoneLengthTable, Skeleton};

/// Index of the first rotation feature in an angle-space frame.
pub const ROTATION_OFFSET: usize = 3;

/// Rotation matrix of an exponential-map (axis-angle) vector.
pub fn expmap_to_rotmat(w: [f32; 3]) -> na::Rotation3<f32> {
    na::Rotation3::new(na::Vector3::new(w[0], w[1], w[2]))
}

/// Exponential map of a rotation matrix, with angle in `[0, pi]`.
pub fn rotmat_to_expmap(r: &na::Rotation3<f32>) -> [f32; 3] {
    let v = r.scaled_axis();
    [v.x, v.y, v.z]
}

/// Euler angles of a rotation matrix, returned as `[E1, E2, E3]`.
///
/// `E2 = -asin(R[0,2])`. At the singularity `|R[0,2]| == 1` the third angle
/// is pinned to zero and the first absorbs the remaining rotation.
pub fn rotmat_to_euler(r: &na::Rotation3<f32>) -> [f32; 3] {
    let m = r.matrix();
    let r02 = m[(0, 2)];
    if (r02.abs() - 1.0).abs() < 1e-7 {
        let e3 = 0.0_f32;
        let delta = m[(0, 1)].atan2(r02);
        if r02 < 0.0 {
            [e3 + delta, std::f32::consts::FRAC_PI_2, e3]
        } else {
            [-e3 + delta, -std::f32::consts::FRAC_PI_2, e3]
        }
    } else {
        let e2 = -r02.clamp(-1.0, 1.0).asin();
        let c2 = e2.cos();
        let e1 = (m[(1, 2)] / c2).atan2(m[(2, 2)] / c2);
        let e3 = (m[(0, 1)] / c2).atan2(m[(0, 0)] / c2);
        [e1, e2, e3]
    }
}

/// Replace every joint's exponential map in an angle-space frame by its Euler
/// angles. The root translation is copied through unchanged.
pub fn expmap_frame_to_euler(frame: ArrayView1<f32>) -> Array1<f32> {
    let mut out = frame.to_owned();
    let mut k = ROTATION_OFFSET;
    while k + 3 <= frame.len() {
        let e = rotmat_to_euler(&expmap_to_rotmat([frame[k], frame[k + 1], frame[k + 2]]));
        out.slice_mut(s![k..k + 3]).assign(&ArrayView1::from(&e));
        k += 3;
    }
    out
}

fn check_angle_frame(len: usize, skeleton: &Skeleton) -> TrainResult<()> {
    let expected = ROTATION_OFFSET + 3 * skeleton.num_joints();
    if len != expected {
        return Err(TrainError::shape_mismatch("angle-space frame", vec![expected], vec![len]));
    }
    Ok(())
}

/// Joint positions `[J, 3]` of one angle-space frame.
pub fn forward_kinematics(frame: ArrayView1<f32>, skeleton: &Skeleton) -> TrainResult<Array2<f32>> {
    check_angle_frame(frame.len(), skeleton)?;
    let n = skeleton.num_joints();
    let mut rotations: Vec<na::Rotation3<f32>> = Vec::with_capacity(n);
    let mut positions = Array2::<f32>::zeros((n, 3));

    for j in 0..n {
        let k = ROTATION_OFFSET + 3 * j;
        let local = expmap_to_rotmat([frame[k], frame[k + 1], frame[k + 2]]);
        let [ox, oy, oz] = skeleton.offset(j);
        let offset = na::Vector3::new(ox, oy, oz);
        let (rotation, position) = match skeleton.parent(j) {
            None => (local, offset + na::Vector3::new(frame[0], frame[1], frame[2])),
            Some(p) => {
                let parent_rot = rotations[p];
                let parent_pos = na::Vector3::new(positions[[p, 0]], positions[[p, 1]], positions[[p, 2]]);
                (local * parent_rot, parent_pos + parent_rot.transpose() * offset)
            }
        };
        positions.row_mut(j).assign(&ArrayView1::from(position.as_slice()));
        rotations.push(rotation);
    }
    Ok(positions)
}

/// Joint positions `[T, J, 3]` of an angle-space sequence `[T, D]`.
pub fn forward_kinematics_sequence(
    sequence: ArrayView2<f32>,
    skeleton: &Skeleton,
) -> TrainResult<Array3<f32>> {
    let (t, d) = sequence.dim();
    check_angle_frame(d, skeleton)?;
    let mut out = Array3::<f32>::zeros((t, skeleton.num_joints(), 3));
    for (i, frame) in sequence.outer_iter().enumerate() {
        out.slice_mut(s![i, .., ..]).assign(&forward_kinematics(frame, skeleton)?);
    }
    Ok(out)
}

/// Reshape a coordinate-space sequence `[T, 3J]` into `[T, J, 3]`.
pub fn coordinates_to_positions(sequence: ArrayView2<f32>) -> TrainResult<Array3<f32>> {
    let (t, d) = sequence.dim();
    if d % 3 != 0 {
        return Err(TrainError::shape_mismatch("coordinate-space frame", vec![d - d % 3], vec![d]));
    }
    sequence
        .to_owned()
        .into_shape((t, d / 3, 3))
        .map_err(|_| TrainError::shape_mismatch("coordinate-space frame", vec![t, d / 3, 3], vec![t, d]))
}

/// Convert a sequence whose root channels are frame-relative (translation
/// expressed in the previous root frame, rotation as a delta) into absolute
/// root channels, starting from rotation `r0` and translation `t0`.
///
/// Only the first six features of each frame change.
pub fn revert_coordinate_space(
    sequence: ArrayView2<f32>,
    r0: na::Rotation3<f32>,
    t0: na::Vector3<f32>,
) -> Array2<f32> {
    let mut out = sequence.to_owned();
    let mut r_prev = r0;
    let mut t_prev = t0;
    for (i, frame) in sequence.outer_iter().enumerate() {
        let r_diff = expmap_to_rotmat([frame[3], frame[4], frame[5]]);
        let r = r_diff * r_prev;
        let t = t_prev + r_prev.transpose() * na::Vector3::new(frame[0], frame[1], frame[2]);

        let w = rotmat_to_expmap(&r);
        out.slice_mut(s![i, 3..6]).assign(&ArrayView1::from(&w));
        out.slice_mut(s![i, 0..3]).assign(&ArrayView1::from(t.as_slice()));

        r_prev = r;
        t_prev = t;
    }
    out
}

/// Length of every bone in a `[J, 3]` position array, in table order.
pub fn bone_lengths(positions: ArrayView2<f32>, table: &BoneLengthTable) -> Vec<f32> {
    table
        .iter()
        .map(|bone| {
            let d = &positions.row(bone.child) - &positions.row(bone.parent);
            d.dot(&d).sqrt()
        })
        .collect()
}
