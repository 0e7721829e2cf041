//! Per-feature normalization statistics.
//!
//! Statistics are fitted once on the training corpus and then applied, never
//! re-fitted, to the validation and prediction splits. Features whose
//! standard deviation falls below [`STD_EPSILON`] are recorded as ignored:
//! their std is replaced by `1.0` so normalization stays finite, and
//! [`NormalizationStats::unnormalize`] restores them to the training mean
//! exactly.

use ndarray::{Array1, Array2, ArrayView2, Axis};

use crate::error::DatasetError;

/// Standard deviation below which a feature is treated as constant.
pub const STD_EPSILON: f32 = 1e-4;

/// Mean, standard deviation and constant-feature bookkeeping.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizationStats {
    mean: Array1<f32>,
    std: Array1<f32>,
    dims_to_ignore: Vec<usize>,
    dims_to_use: Vec<usize>,
}

impl NormalizationStats {
    /// Statistics that leave data unchanged (`normalize = false`).
    pub fn identity(dim: usize) -> Self {
        NormalizationStats {
            mean: Array1::zeros(dim),
            std: Array1::ones(dim),
            dims_to_ignore: Vec::new(),
            dims_to_use: (0..dim).collect(),
        }
    }

    /// Fit statistics over every frame of every sequence.
    ///
    /// # Errors
    ///
    /// [`DatasetError::FeatureMismatch`] if sequences disagree on their
    /// feature dimension.
    pub fn fit(sequences: &[Array2<f32>]) -> Result<Self, DatasetError> {
        let dim = sequences.first().map(|s| s.ncols()).unwrap_or(0);
        let mut sum = Array1::<f64>::zeros(dim);
        let mut sum_sq = Array1::<f64>::zeros(dim);
        let mut frames = 0usize;

        for (i, seq) in sequences.iter().enumerate() {
            if seq.ncols() != dim {
                return Err(DatasetError::FeatureMismatch {
                    name: format!("sequence {i}"),
                    expected: dim,
                    found: seq.ncols(),
                });
            }
            for row in seq.outer_iter() {
                for (k, &v) in row.iter().enumerate() {
                    let v = v as f64;
                    sum[k] += v;
                    sum_sq[k] += v * v;
                }
            }
            frames += seq.nrows();
        }

        if frames == 0 {
            return Ok(NormalizationStats::identity(dim));
        }

        let n = frames as f64;
        let mean = sum.mapv(|s| s / n);
        let var = (&sum_sq / n) - &mean.mapv(|m| m * m);
        let raw_std = var.mapv(|v| v.max(0.0).sqrt() as f32);

        let mut dims_to_ignore = Vec::new();
        let mut dims_to_use = Vec::new();
        for (k, &s) in raw_std.iter().enumerate() {
            if s < STD_EPSILON {
                dims_to_ignore.push(k);
            } else {
                dims_to_use.push(k);
            }
        }
        let std = raw_std.mapv(|s| if s < STD_EPSILON { 1.0 } else { s });

        Ok(NormalizationStats { mean: mean.mapv(|m| m as f32), std, dims_to_ignore, dims_to_use })
    }

    /// Feature dimension the statistics were fitted on.
    pub fn dim(&self) -> usize {
        self.mean.len()
    }

    /// Per-feature mean.
    pub fn mean(&self) -> &Array1<f32> {
        &self.mean
    }

    /// Per-feature std, with ignored features set to `1.0`.
    pub fn std(&self) -> &Array1<f32> {
        &self.std
    }

    /// Features that were constant over the training corpus.
    pub fn dims_to_ignore(&self) -> &[usize] {
        &self.dims_to_ignore
    }

    /// Features that varied over the training corpus.
    pub fn dims_to_use(&self) -> &[usize] {
        &self.dims_to_use
    }

    /// `(x - mean) / std` row-wise.
    pub fn normalize(&self, data: ArrayView2<f32>) -> Array2<f32> {
        (&data - &self.mean.view().insert_axis(Axis(0))) / &self.std.view().insert_axis(Axis(0))
    }

    /// `x * std + mean` row-wise, with ignored features reset to the mean.
    pub fn unnormalize(&self, data: ArrayView2<f32>) -> Array2<f32> {
        let mut out = &data * &self.std.view().insert_axis(Axis(0)) + &self.mean.view().insert_axis(Axis(0));
        for &k in &self.dims_to_ignore {
            out.column_mut(k).fill(self.mean[k]);
        }
        out
    }

    /// Mean and std as `[1, 1, F]` tensors for broadcasting over `[B, T, F]`.
    #[cfg(feature = "tch-backend")]
    pub fn to_tensors(&self, device: tch::Device) -> (tch::Tensor, tch::Tensor) {
        let shape = [1_i64, 1, self.dim() as i64];
        let mean = tch::Tensor::from_slice(self.mean.as_slice().unwrap_or(&[]))
            .reshape(shape)
            .to_device(device);
        let std = tch::Tensor::from_slice(self.std.as_slice().unwrap_or(&[]))
            .reshape(shape)
            .to_device(device);
        (mean, std)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn constant_column_is_ignored() {
        let seq = array![[1.0_f32, 5.0], [3.0, 5.0]];
        let stats = NormalizationStats::fit(&[seq.clone()]).unwrap();
        assert_eq!(stats.dims_to_ignore(), &[1]);
        assert_eq!(stats.dims_to_use(), &[0]);
        assert_abs_diff_eq!(stats.std()[1], 1.0);
        assert_abs_diff_eq!(stats.std()[0], 1.0);
        assert_abs_diff_eq!(stats.mean()[0], 2.0);
    }

    #[test]
    fn normalize_then_unnormalize_restores_data() {
        let seq = array![[1.0_f32, 5.0, -2.0], [3.0, 5.0, 4.0], [8.0, 5.0, 1.0]];
        let stats = NormalizationStats::fit(&[seq.clone()]).unwrap();
        let back = stats.unnormalize(stats.normalize(seq.view()).view());
        for (a, b) in back.iter().zip(seq.iter()) {
            assert_abs_diff_eq!(*a, *b, epsilon = 1e-5);
        }
    }

    #[test]
    fn unnormalize_pins_ignored_features() {
        let seq = array![[0.0_f32, 2.0], [1.0, 2.0]];
        let stats = NormalizationStats::fit(&[seq]).unwrap();
        let drifted = array![[0.0_f32, 3.0]];
        let out = stats.unnormalize(drifted.view());
        assert_abs_diff_eq!(out[[0, 1]], 2.0);
    }

    #[test]
    fn mismatched_sequences_are_rejected() {
        let a = Array2::<f32>::zeros((2, 3));
        let b = Array2::<f32>::zeros((2, 4));
        assert!(matches!(
            NormalizationStats::fit(&[a, b]),
            Err(DatasetError::FeatureMismatch { .. })
        ));
    }
}
