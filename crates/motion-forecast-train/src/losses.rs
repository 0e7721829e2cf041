//! Composite loss for motion forecasting.
//!
//! Two terms are combined:
//!
//! - **Reconstruction**: distance between prediction and ground truth in the
//!   (normalized) training representation. `l2` is the squared L2 distance
//!   summed over features and averaged over batch and time. `weightlie`
//!   (angle space only) weights each joint's squared rotation error by the
//!   total rest length of the bones it moves, normalized to mean 1.
//! - **Bone-length penalty**: the prediction is de-normalized, turned into
//!   joint positions (differentiable forward kinematics in angle space, a
//!   reshape in coordinate space) and every bone's length is compared with
//!   its rest length.
//!
//! ```text
//! L_total = L_reconstruction + λ_bone · L_bone
//! ```
//!
//! The returned scalar is not clipped or rescaled; gradient clipping is left
//! to the optimizer step.

use tch::{Device, Kind, Tensor};

use crate::config::{LossKind, Representation, TrainingConfig};
use crate::geometry::ROTATION_OFFSET;
use crate::normalization::NormalizationStats;
use crate::skeleton::Skeleton;

/// Added under every square root so gradients stay finite at zero length.
const SQRT_EPS: f64 = 1e-8;

// ─────────────────────────────────────────────────────────────────────────────
// Public types
// ─────────────────────────────────────────────────────────────────────────────

/// Scalar loss values extracted for logging (not used for back-propagation).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LossComponents {
    /// Weighted total.
    pub total: f32,
    /// Reconstruction term.
    pub reconstruction: f32,
    /// Unweighted bone-length penalty.
    pub bone: f32,
}

/// Reconstruction plus weighted bone-length penalty.
pub struct CompositeLoss {
    kind: LossKind,
    representation: Representation,
    bone_weight: f64,
    /// `[1, 1, F]` de-normalization parameters.
    mean: Tensor,
    std: Tensor,
    /// `[1, 1, F]`, 1 for features that vary over the training corpus.
    use_mask: Tensor,
    /// `[groups]` weights for `weightlie` (translation first, then joints).
    group_weights: Tensor,
    parents: Vec<Option<usize>>,
    /// `[J, 3, 1]` rest offsets.
    offsets: Tensor,
    /// `(child, parent)` per bone.
    bones: Vec<(usize, usize)>,
    /// `[bones]` rest lengths.
    rest_lengths: Tensor,
}

impl CompositeLoss {
    /// Build the loss for one run.
    pub fn new(config: &TrainingConfig, stats: &NormalizationStats, skeleton: &Skeleton, device: Device) -> Self {
        let (mean, std) = stats.to_tensors(device);
        let mut mask = vec![1.0_f32; stats.dim()];
        for &k in stats.dims_to_ignore() {
            mask[k] = 0.0;
        }
        let use_mask = Tensor::from_slice(&mask).reshape([1, 1, stats.dim() as i64]).to_device(device);

        let subtree = skeleton.subtree_lengths();
        let mean_len = subtree.iter().sum::<f32>() / subtree.len().max(1) as f32;
        let mut weights = vec![1.0_f32];
        weights.extend(subtree.iter().map(|&l| if mean_len > 0.0 { l / mean_len } else { 1.0 }));
        let group_weights = Tensor::from_slice(&weights).to_device(device);

        let flat_offsets: Vec<f32> = (0..skeleton.num_joints()).flat_map(|j| skeleton.offset(j)).collect();
        let offsets = Tensor::from_slice(&flat_offsets)
            .reshape([skeleton.num_joints() as i64, 3, 1])
            .to_device(device);

        let table = skeleton.bone_lengths();
        let bones = table.iter().map(|b| (b.child, b.parent)).collect();
        let rest: Vec<f32> = table.iter().map(|b| b.rest_length).collect();
        let rest_lengths = Tensor::from_slice(&rest).to_device(device);

        CompositeLoss {
            kind: config.loss,
            representation: config.datatype,
            bone_weight: config.bone_loss_weight,
            mean,
            std,
            use_mask,
            group_weights,
            parents: skeleton.parents().to_vec(),
            offsets,
            bones,
            rest_lengths,
        }
    }

    /// Compute the loss for `[B, T, F]` prediction and ground truth.
    pub fn forward(&self, prediction: &Tensor, ground_truth: &Tensor) -> (Tensor, LossComponents) {
        let reconstruction = self.reconstruction(prediction, ground_truth);
        let bone = self.bone_penalty(prediction);
        let total = &reconstruction + &bone * self.bone_weight;

        let components = LossComponents {
            total: total.double_value(&[]) as f32,
            reconstruction: reconstruction.double_value(&[]) as f32,
            bone: bone.double_value(&[]) as f32,
        };
        (total, components)
    }

    /// Reconstruction term as a scalar tensor.
    pub fn reconstruction(&self, prediction: &Tensor, ground_truth: &Tensor) -> Tensor {
        let sq = (prediction - ground_truth).pow_tensor_scalar(2);
        match self.kind {
            LossKind::L2 => sq.sum_dim_intlist(Some(&[-1_i64][..]), false, Kind::Float).mean(Kind::Float),
            LossKind::WeightedLie => {
                let size = sq.size();
                let groups = sq.reshape([size[0], size[1], -1, 3]).sum_dim_intlist(Some(&[-1_i64][..]), false, Kind::Float);
                (groups * &self.group_weights).sum_dim_intlist(Some(&[-1_i64][..]), false, Kind::Float).mean(Kind::Float)
            }
        }
    }

    /// Mean squared deviation of predicted bone lengths from rest lengths.
    pub fn bone_penalty(&self, prediction: &Tensor) -> Tensor {
        if self.bones.is_empty() {
            return Tensor::from(0.0_f32).to_device(prediction.device());
        }
        let positions = self.positions(&self.denormalize(prediction));
        let lengths: Vec<Tensor> = self
            .bones
            .iter()
            .map(|&(child, parent)| {
                let d = positions.select(2, child as i64) - positions.select(2, parent as i64);
                (d.pow_tensor_scalar(2).sum_dim_intlist(Some(&[-1_i64][..]), false, Kind::Float) + SQRT_EPS).sqrt()
            })
            .collect();
        // [B, T, bones]
        let lengths = Tensor::stack(&lengths, -1);
        (lengths - &self.rest_lengths).pow_tensor_scalar(2).mean(Kind::Float)
    }

    /// `x * std + mean`, with constant features pinned to the mean.
    fn denormalize(&self, x: &Tensor) -> Tensor {
        let raw = x * &self.std + &self.mean;
        &raw * &self.use_mask + &self.mean * (1.0 - &self.use_mask)
    }

    /// `[B, T, F]` de-normalized frames to `[B, T, J, 3]` positions.
    fn positions(&self, frames: &Tensor) -> Tensor {
        match self.representation {
            Representation::Xyz => {
                let size = frames.size();
                frames.reshape([size[0], size[1], -1, 3])
            }
            Representation::Lie => self.forward_kinematics(frames),
        }
    }

    fn forward_kinematics(&self, frames: &Tensor) -> Tensor {
        let translation = frames.narrow(-1, 0, 3);
        let mut rotations: Vec<Tensor> = Vec::with_capacity(self.parents.len());
        let mut positions: Vec<Tensor> = Vec::with_capacity(self.parents.len());

        for (j, parent) in self.parents.iter().enumerate() {
            let w = frames.narrow(-1, (ROTATION_OFFSET + 3 * j) as i64, 3);
            let local = rodrigues(&w);
            let offset = self.offsets.get(j as i64);
            // Row-vector composition, matching `geometry::forward_kinematics`.
            let (rotation, position) = match parent {
                None => (local, &translation + offset.squeeze_dim(-1)),
                Some(p) => {
                    let parent_rot = &rotations[*p];
                    let offset = parent_rot.transpose(-2, -1).matmul(&offset).squeeze_dim(-1);
                    (local.matmul(parent_rot), &positions[*p] + offset)
                }
            };
            rotations.push(rotation);
            positions.push(position);
        }
        Tensor::stack(&positions, 2)
    }
}

/// Rotation matrices `[..., 3, 3]` of exponential maps `[..., 3]`:
/// `R = I + sin(θ) K + (1 - cos(θ)) K²` with `K` the skew matrix of the unit
/// axis.
pub fn rodrigues(w: &Tensor) -> Tensor {
    let theta = (w.pow_tensor_scalar(2).sum_dim_intlist(Some(&[-1_i64][..]), true, Kind::Float) + SQRT_EPS).sqrt();
    let k = w / &theta;
    let (kx, ky, kz) = (k.select(-1, 0), k.select(-1, 1), k.select(-1, 2));
    let zero = kx.zeros_like();
    let mut shape = w.size();
    shape.pop();
    shape.extend([3, 3]);
    let skew = Tensor::stack(&[&zero, &(-&kz), &ky, &kz, &zero, &(-&kx), &(-&ky), &kx, &zero], -1)
        .reshape(shape.as_slice());

    let eye = Tensor::eye(3, (Kind::Float, w.device()));
    let sin = theta.sin().unsqueeze(-1);
    let cos = theta.cos().unsqueeze(-1);
    eye + &skew * sin + skew.matmul(&skew) * (1.0 - cos)
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geometry::forward_kinematics;
    use ndarray::Array2;

    fn lie_loss(kind: LossKind, stats: &NormalizationStats, skeleton: &Skeleton) -> CompositeLoss {
        let config = TrainingConfig { loss: kind, bone_loss_weight: 0.5, ..TrainingConfig::default() };
        CompositeLoss::new(&config, stats, skeleton, Device::Cpu)
    }

    #[test]
    fn rodrigues_matches_host_rotation() {
        let w = [0.3_f32, -0.4, 0.2];
        let r = rodrigues(&Tensor::from_slice(&w));
        let host = crate::geometry::expmap_to_rotmat(w);
        for row in 0..3 {
            for col in 0..3 {
                let v = r.double_value(&[row as i64, col as i64]) as f32;
                assert!((v - host.matrix()[(row, col)]).abs() < 1e-4);
            }
        }
    }

    #[test]
    fn tensor_fk_matches_host_fk() {
        let skeleton = Skeleton::stick_figure();
        let dim = 3 + 3 * skeleton.num_joints();
        let frame: Vec<f32> = (0..dim).map(|k| 0.05 * k as f32 - 0.4).collect();
        let loss = lie_loss(LossKind::L2, &NormalizationStats::identity(dim), &skeleton);
        let positions = loss.forward_kinematics(&Tensor::from_slice(&frame).reshape([1, 1, dim as i64]));

        let host = forward_kinematics(ndarray::ArrayView1::from(&frame[..]), &skeleton).unwrap();
        for j in 0..skeleton.num_joints() {
            for c in 0..3 {
                let v = positions.double_value(&[0, 0, j as i64, c as i64]) as f32;
                assert!((v - host[[j, c]]).abs() < 1e-4, "joint {j} axis {c}: {v} vs {}", host[[j, c]]);
            }
        }
    }

    #[test]
    fn tensor_fk_composes_rows_like_host_fk() {
        // joint 1 +90° about z, joint 2 +90° about y: the tip lands at [1, -1, 1].
        let skeleton = Skeleton::chain(4, 1.0).unwrap();
        let mut frame = vec![0.0_f32; 15];
        frame[8] = std::f32::consts::FRAC_PI_2;
        frame[10] = std::f32::consts::FRAC_PI_2;
        let loss = lie_loss(LossKind::L2, &NormalizationStats::identity(15), &skeleton);
        let positions = loss.forward_kinematics(&Tensor::from_slice(&frame).reshape([1, 1, 15]));
        for (c, expected) in [1.0, -1.0, 1.0].into_iter().enumerate() {
            let v = positions.double_value(&[0, 0, 3, c as i64]);
            assert!((v - expected).abs() < 1e-4, "axis {c}: {v}");
        }
    }

    #[test]
    fn identical_inputs_leave_only_the_bone_term() {
        let skeleton = Skeleton::chain(3, 1.0).unwrap();
        let stats = NormalizationStats::identity(12);
        let x = Tensor::randn([2, 4, 12], (Kind::Float, Device::Cpu));
        for kind in [LossKind::L2, LossKind::WeightedLie] {
            let loss = lie_loss(kind, &stats, &skeleton);
            let (_, c) = loss.forward(&x, &x);
            assert!(c.reconstruction.abs() < 1e-6);
            assert!((c.total - 0.5 * c.bone).abs() < 1e-5);
        }
    }

    #[test]
    fn loss_is_non_negative_and_differentiable() {
        let skeleton = Skeleton::chain(3, 1.0).unwrap();
        let stats = NormalizationStats::fit(&[Array2::from_shape_fn((10, 12), |(t, k)| (t * k) as f32 * 0.01)]).unwrap();
        let loss = lie_loss(LossKind::L2, &stats, &skeleton);
        let pred = Tensor::randn([2, 4, 12], (Kind::Float, Device::Cpu)).set_requires_grad(true);
        let gt = Tensor::randn([2, 4, 12], (Kind::Float, Device::Cpu));
        let (total, c) = loss.forward(&pred, &gt);
        assert!(c.total >= 0.0 && c.reconstruction >= 0.0 && c.bone >= 0.0);
        total.backward();
        assert!(pred.grad().defined());
    }

    #[test]
    fn coordinate_bone_penalty_detects_stretch() {
        let skeleton = Skeleton::chain(2, 1.0).unwrap();
        let config = TrainingConfig {
            datatype: Representation::Xyz,
            bone_loss_weight: 1.0,
            ..TrainingConfig::default()
        };
        let loss = CompositeLoss::new(&config, &NormalizationStats::identity(6), &skeleton, Device::Cpu);
        let rest = Tensor::from_slice(&[0.0_f32, 0.0, 0.0, 1.0, 0.0, 0.0]).reshape([1, 1, 6]);
        let stretched = Tensor::from_slice(&[0.0_f32, 0.0, 0.0, 3.0, 0.0, 0.0]).reshape([1, 1, 6]);
        assert!(loss.bone_penalty(&rest).double_value(&[]) < 1e-6);
        assert!((loss.bone_penalty(&stretched).double_value(&[]) - 4.0).abs() < 1e-4);
    }
}
