//! Motion corpora, windowing and batched iteration.
//!
//! This module defines the [`MotionSource`] trait plus two concrete
//! implementations:
//!
//! - [`NpyMotionSource`]: reads per-sequence `.npy` files from disk.
//! - [`SyntheticMotionSource`]: generates fully-deterministic motion from a
//!   sinusoidal joint-rotation model; useful for unit tests, integration tests
//!   and dry runs. **Never uses random data.**
//!
//! A [`WindowedDataset`] cuts normalized sequences into `history + horizon`
//! windows and a [`DataLoader`] yields them as [`SequenceBatch`]es with an
//! optional deterministic shuffle.
//!
//! # Directory layout expected by `NpyMotionSource`
//!
//! ```text
//! <root>/
//!   skeleton.json           # {"parents": [...], "offsets": [[x, y, z], ...]}
//!   train/
//!     walking/
//!       seq_01.npy          # [T, D] float32
//!       seq_02.npy
//!     eating/
//!       ...
//!   test/
//!     walking/
//!       ...
//! ```
//!
//! # Example – synthetic source
//!
//! ```rust
//! use motion_forecast_train::config::Representation;
//! use motion_forecast_train::dataset::{MotionSource, SyntheticMotionConfig, SyntheticMotionSource};
//!
//! let src = SyntheticMotionSource::new(SyntheticMotionConfig::default(), Representation::Lie);
//! let train = src.train_corpus().unwrap();
//! assert_eq!(train.feature_dim(), 3 + 3 * 12);
//! ```

use ndarray::{s, Array2, Array3, ArrayView2, Axis};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::config::Representation;
use crate::error::{DatasetError, TrainError, TrainResult};
use crate::geometry::forward_kinematics;
use crate::skeleton::Skeleton;

// ---------------------------------------------------------------------------
// MotionSequence / MotionCorpus
// ---------------------------------------------------------------------------

/// One recorded motion clip.
#[derive(Debug, Clone)]
pub struct MotionSequence {
    /// Action label (e.g. `walking`).
    pub action: String,
    /// Identifier for logging, usually the file stem.
    pub name: String,
    /// Frames, shape `[T, D]`.
    pub frames: Array2<f32>,
}

/// A set of sequences sharing one feature dimension.
#[derive(Debug, Clone)]
pub struct MotionCorpus {
    sequences: Vec<MotionSequence>,
    feature_dim: usize,
}

impl MotionCorpus {
    /// Build a corpus, checking that every sequence has the same width.
    pub fn new(sequences: Vec<MotionSequence>) -> Result<Self, DatasetError> {
        let feature_dim = sequences.first().map(|s| s.frames.ncols()).unwrap_or(0);
        for seq in &sequences {
            if seq.frames.ncols() != feature_dim {
                return Err(DatasetError::FeatureMismatch {
                    name: format!("{}/{}", seq.action, seq.name),
                    expected: feature_dim,
                    found: seq.frames.ncols(),
                });
            }
        }
        Ok(MotionCorpus { sequences, feature_dim })
    }

    /// Feature dimension `D`.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Number of sequences.
    pub fn len(&self) -> usize {
        self.sequences.len()
    }

    /// `true` when the corpus holds no sequences.
    pub fn is_empty(&self) -> bool {
        self.sequences.is_empty()
    }

    /// Distinct action labels, sorted.
    pub fn actions(&self) -> BTreeSet<String> {
        self.sequences.iter().map(|s| s.action.clone()).collect()
    }

    /// All sequences in load order.
    pub fn sequences(&self) -> &[MotionSequence] {
        &self.sequences
    }

    /// Sequences labelled `action`.
    pub fn by_action<'a>(&'a self, action: &'a str) -> impl Iterator<Item = &'a MotionSequence> + 'a {
        self.sequences.iter().filter(move |s| s.action == action)
    }

    /// Apply `f` to every sequence's frames, keeping labels.
    pub fn map_frames<F>(&self, f: F) -> MotionCorpus
    where
        F: Fn(ArrayView2<f32>) -> Array2<f32>,
    {
        let sequences = self
            .sequences
            .iter()
            .map(|s| MotionSequence { action: s.action.clone(), name: s.name.clone(), frames: f(s.frames.view()) })
            .collect();
        MotionCorpus { sequences, feature_dim: self.feature_dim }
    }
}

// ---------------------------------------------------------------------------
// MotionSource trait
// ---------------------------------------------------------------------------

/// Common interface for all motion data providers.
///
/// Implementations must be `Send + Sync` so a source can be shared behind an
/// `Arc` without additional synchronisation.
pub trait MotionSource: Send + Sync {
    /// Sequences used for fitting normalization statistics and training.
    fn train_corpus(&self) -> Result<MotionCorpus, DatasetError>;

    /// Held-out sequences used for validation and per-action prediction.
    fn test_corpus(&self) -> Result<MotionCorpus, DatasetError>;

    /// Kinematic tree the sequences were recorded on.
    fn skeleton(&self) -> Result<Skeleton, DatasetError>;

    /// Representation of the stored frames.
    fn representation(&self) -> Representation;

    /// Human-readable name for logging.
    fn name(&self) -> &str;
}

// ---------------------------------------------------------------------------
// NpyMotionSource
// ---------------------------------------------------------------------------

/// Motion source backed by a directory of `.npy` sequences.
///
/// The directory is validated at construction; sequences are read from disk
/// on each corpus request.
pub struct NpyMotionSource {
    root: PathBuf,
    representation: Representation,
}

impl NpyMotionSource {
    /// Open `root`, checking that the split directories and skeleton exist.
    ///
    /// # Errors
    ///
    /// [`DatasetError::DirectoryNotFound`] if `root` or one of its split
    /// directories is missing.
    pub fn discover(root: &Path, representation: Representation) -> Result<Self, DatasetError> {
        for dir in [root.to_path_buf(), root.join("train"), root.join("test")] {
            if !dir.is_dir() {
                return Err(DatasetError::DirectoryNotFound { path: dir });
            }
        }
        info!("NpyMotionSource: root={} representation={representation}", root.display());
        Ok(NpyMotionSource { root: root.to_path_buf(), representation })
    }

    fn load_split(&self, split: &str) -> Result<MotionCorpus, DatasetError> {
        let split_dir = self.root.join(split);
        let mut sequences = Vec::new();

        for action_dir in sorted_entries(&split_dir, |p| p.is_dir())? {
            let action = action_dir.file_name().and_then(|n| n.to_str()).unwrap_or("").to_string();
            let files = sorted_entries(&action_dir, |p| {
                p.is_file() && p.extension().and_then(|e| e.to_str()) == Some("npy")
            })?;
            if files.is_empty() {
                debug!("Skipping {}: no .npy files", action_dir.display());
                continue;
            }
            for file in files {
                let frames = load_npy_sequence(&file)?;
                let name = file.file_stem().and_then(|n| n.to_str()).unwrap_or("").to_string();
                sequences.push(MotionSequence { action: action.clone(), name, frames });
            }
        }

        if sequences.is_empty() {
            return Err(DatasetError::NoSequences { split: split.to_string(), root: self.root.clone() });
        }
        info!("NpyMotionSource: loaded {} {split} sequences", sequences.len());
        MotionCorpus::new(sequences)
    }
}

impl MotionSource for NpyMotionSource {
    fn train_corpus(&self) -> Result<MotionCorpus, DatasetError> {
        self.load_split("train")
    }

    fn test_corpus(&self) -> Result<MotionCorpus, DatasetError> {
        self.load_split("test")
    }

    fn skeleton(&self) -> Result<Skeleton, DatasetError> {
        Skeleton::from_json(&self.root.join("skeleton.json"))
    }

    fn representation(&self) -> Representation {
        self.representation
    }

    fn name(&self) -> &str {
        "NpyMotionSource"
    }
}

/// Children of `dir` matching `keep`, sorted by path.
fn sorted_entries(dir: &Path, keep: impl Fn(&Path) -> bool) -> Result<Vec<PathBuf>, DatasetError> {
    let mut out: Vec<PathBuf> = std::fs::read_dir(dir)
        .map_err(|e| DatasetError::io_error(dir, e))?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| keep(p))
        .collect();
    out.sort();
    Ok(out)
}

/// Load a 2-D float32 NPY array `[T, D]`.
fn load_npy_sequence(path: &Path) -> Result<Array2<f32>, DatasetError> {
    use ndarray_npy::ReadNpyExt;
    let file = std::fs::File::open(path).map_err(|e| DatasetError::io_error(path, e))?;
    let arr: ndarray::ArrayD<f32> =
        ndarray::ArrayD::read_npy(file).map_err(|e| DatasetError::npy_read(path, e.to_string()))?;
    let shape = arr.shape().to_vec();
    arr.into_dimensionality::<ndarray::Ix2>().map_err(|e| {
        DatasetError::invalid_format(path, format!("expected a 2-D [T, D] array, got shape {shape:?}: {e}"))
    })
}

// ---------------------------------------------------------------------------
// SyntheticMotionSource
// ---------------------------------------------------------------------------

/// Configuration for [`SyntheticMotionSource`].
///
/// All fields are plain numbers; no randomness is involved.
#[derive(Debug, Clone)]
pub struct SyntheticMotionConfig {
    /// Action labels. Default: **walking, eating, smoking, discussion**.
    pub actions: Vec<String>,
    /// Training sequences per action. Default: **2**.
    pub train_sequences_per_action: usize,
    /// Test sequences per action. Default: **1**.
    pub test_sequences_per_action: usize,
    /// Frames per sequence. Default: **160**.
    pub frames_per_sequence: usize,
}

impl Default for SyntheticMotionConfig {
    fn default() -> Self {
        SyntheticMotionConfig {
            actions: ["walking", "eating", "smoking", "discussion"].iter().map(|s| s.to_string()).collect(),
            train_sequences_per_action: 2,
            test_sequences_per_action: 1,
            frames_per_sequence: 160,
        }
    }
}

/// Fully-deterministic motion generated from a sinusoidal rotation model on
/// [`Skeleton::stick_figure`].
///
/// ## Angle model
///
/// For action `a`, sequence `s`, frame `t`, joint `j`, component `c`:
///
/// ```text
/// w = 0.3 × sin(2π × (t × 0.02 × (a + 1) + j × 0.1 + c × 0.3 + s × 0.05))
/// ```
///
/// The root translation follows `0.1 × sin(2π × t × 0.01 + c)`. Coordinate
/// frames are produced by forward kinematics of the angle frames, so both
/// representations describe the same motion.
pub struct SyntheticMotionSource {
    config: SyntheticMotionConfig,
    skeleton: Skeleton,
    representation: Representation,
}

impl SyntheticMotionSource {
    /// Create a synthetic source in `representation`.
    pub fn new(config: SyntheticMotionConfig, representation: Representation) -> Self {
        SyntheticMotionSource { config, skeleton: Skeleton::stick_figure(), representation }
    }

    fn angle_frames(&self, action_idx: usize, seq_idx: usize) -> Array2<f32> {
        use std::f32::consts::PI;
        let dim = Representation::Lie.feature_dim(self.skeleton.num_joints());
        Array2::from_shape_fn((self.config.frames_per_sequence, dim), |(t, k)| {
            if k < 3 {
                0.1 * (2.0 * PI * t as f32 * 0.01 + k as f32).sin()
            } else {
                let j = (k - 3) / 3;
                let c = (k - 3) % 3;
                let phase = t as f32 * 0.02 * (action_idx as f32 + 1.0)
                    + j as f32 * 0.1
                    + c as f32 * 0.3
                    + seq_idx as f32 * 0.05;
                0.3 * (2.0 * PI * phase).sin()
            }
        })
    }

    fn frames(&self, action_idx: usize, seq_idx: usize) -> Result<Array2<f32>, DatasetError> {
        let angles = self.angle_frames(action_idx, seq_idx);
        match self.representation {
            Representation::Lie => Ok(angles),
            Representation::Xyz => {
                let j = self.skeleton.num_joints();
                let mut out = Array2::<f32>::zeros((angles.nrows(), 3 * j));
                for (t, frame) in angles.outer_iter().enumerate() {
                    let pos = forward_kinematics(frame, &self.skeleton)
                        .map_err(|e| DatasetError::invalid_skeleton(e.to_string()))?;
                    let flat = pos.into_shape(3 * j).map_err(|e| DatasetError::invalid_skeleton(e.to_string()))?;
                    out.row_mut(t).assign(&flat);
                }
                Ok(out)
            }
        }
    }

    fn corpus(&self, per_action: usize, seq_offset: usize) -> Result<MotionCorpus, DatasetError> {
        let mut sequences = Vec::new();
        for (a, action) in self.config.actions.iter().enumerate() {
            for s in 0..per_action {
                sequences.push(MotionSequence {
                    action: action.clone(),
                    name: format!("synthetic_{}", seq_offset + s),
                    frames: self.frames(a, seq_offset + s)?,
                });
            }
        }
        MotionCorpus::new(sequences)
    }
}

impl MotionSource for SyntheticMotionSource {
    fn train_corpus(&self) -> Result<MotionCorpus, DatasetError> {
        self.corpus(self.config.train_sequences_per_action, 0)
    }

    fn test_corpus(&self) -> Result<MotionCorpus, DatasetError> {
        self.corpus(self.config.test_sequences_per_action, self.config.train_sequences_per_action)
    }

    fn skeleton(&self) -> Result<Skeleton, DatasetError> {
        Ok(self.skeleton.clone())
    }

    fn representation(&self) -> Representation {
        self.representation
    }

    fn name(&self) -> &str {
        "SyntheticMotionSource"
    }
}

// ---------------------------------------------------------------------------
// SequenceBatch
// ---------------------------------------------------------------------------

/// One mini-batch of encoder/decoder windows.
///
/// For a window of `history + horizon` frames:
/// `encoder_inputs = frames[0..history]`,
/// `decoder_inputs = frames[history-1 .. history-1+horizon]`,
/// `decoder_outputs = frames[history .. history+horizon]`.
#[derive(Debug, Clone)]
pub struct SequenceBatch {
    /// `[B, history, F]`.
    pub encoder_inputs: Array3<f32>,
    /// `[B, horizon, F]`.
    pub decoder_inputs: Array3<f32>,
    /// `[B, horizon, F]`.
    pub decoder_outputs: Array3<f32>,
}

impl SequenceBatch {
    /// Stack windows (each `[history + horizon, F]`) into one batch.
    pub fn from_windows(windows: &[ArrayView2<f32>], history: usize, horizon: usize) -> TrainResult<Self> {
        let feature_dim = windows.first().map(|w| w.ncols()).unwrap_or(0);
        let b = windows.len();
        let mut encoder_inputs = Array3::<f32>::zeros((b, history, feature_dim));
        let mut decoder_inputs = Array3::<f32>::zeros((b, horizon, feature_dim));
        let mut decoder_outputs = Array3::<f32>::zeros((b, horizon, feature_dim));

        for (i, w) in windows.iter().enumerate() {
            if w.dim() != (history + horizon, feature_dim) {
                return Err(TrainError::shape_mismatch(
                    "window",
                    vec![history + horizon, feature_dim],
                    w.shape().to_vec(),
                ));
            }
            encoder_inputs.slice_mut(s![i, .., ..]).assign(&w.slice(s![0..history, ..]));
            decoder_inputs.slice_mut(s![i, .., ..]).assign(&w.slice(s![history - 1..history - 1 + horizon, ..]));
            decoder_outputs.slice_mut(s![i, .., ..]).assign(&w.slice(s![history..history + horizon, ..]));
        }
        Ok(SequenceBatch { encoder_inputs, decoder_inputs, decoder_outputs })
    }

    /// Number of windows `B`.
    pub fn batch_size(&self) -> usize {
        self.encoder_inputs.shape()[0]
    }

    /// Feature dimension `F`.
    pub fn feature_dim(&self) -> usize {
        self.encoder_inputs.shape()[2]
    }

    /// Check the three arrays against the configured window sizes and `F`.
    pub fn check_shape(&self, history: usize, horizon: usize, feature_dim: usize) -> TrainResult<()> {
        let b = self.batch_size();
        let checks: [(&'static str, &Array3<f32>, [usize; 3]); 3] = [
            ("encoder_inputs", &self.encoder_inputs, [b, history, feature_dim]),
            ("decoder_inputs", &self.decoder_inputs, [b, horizon, feature_dim]),
            ("decoder_outputs", &self.decoder_outputs, [b, horizon, feature_dim]),
        ];
        for (what, arr, expected) in checks {
            if arr.shape() != expected {
                return Err(TrainError::shape_mismatch(what, expected.to_vec(), arr.shape().to_vec()));
            }
        }
        Ok(())
    }

    /// Concatenate batches along the batch axis. `None` for an empty slice.
    pub fn concatenate(batches: &[SequenceBatch]) -> TrainResult<Option<SequenceBatch>> {
        if batches.is_empty() {
            return Ok(None);
        }
        Ok(Some(SequenceBatch {
            encoder_inputs: concat_field(batches, "encoder_inputs", |b| &b.encoder_inputs)?,
            decoder_inputs: concat_field(batches, "decoder_inputs", |b| &b.decoder_inputs)?,
            decoder_outputs: concat_field(batches, "decoder_outputs", |b| &b.decoder_outputs)?,
        }))
    }

    /// Copy the batch into `(encoder_inputs, decoder_inputs, decoder_outputs)`
    /// tensors on `device`.
    #[cfg(feature = "tch-backend")]
    pub fn to_tensors(&self, device: tch::Device) -> (tch::Tensor, tch::Tensor, tch::Tensor) {
        (
            array3_to_tensor(&self.encoder_inputs, device),
            array3_to_tensor(&self.decoder_inputs, device),
            array3_to_tensor(&self.decoder_outputs, device),
        )
    }
}

/// Stack one field of every batch along the batch axis.
fn concat_field<F>(batches: &[SequenceBatch], what: &'static str, field: F) -> TrainResult<Array3<f32>>
where
    F: Fn(&SequenceBatch) -> &Array3<f32>,
{
    let views: Vec<_> = batches.iter().map(|b| field(b).view()).collect();
    ndarray::concatenate(Axis(0), &views).map_err(|_| {
        let first = field(&batches[0]).shape();
        let expected = vec![batches.iter().map(|b| field(b).shape()[0]).sum(), first[1], first[2]];
        let found = views
            .iter()
            .map(|v| v.shape())
            .find(|s| s[1..] != first[1..])
            .map(|s| s.to_vec())
            .unwrap_or_default();
        TrainError::shape_mismatch(what, expected, found)
    })
}

/// Copy a host array into a `[d0, d1, d2]` float tensor.
#[cfg(feature = "tch-backend")]
pub fn array3_to_tensor(arr: &Array3<f32>, device: tch::Device) -> tch::Tensor {
    let shape: Vec<i64> = arr.shape().iter().map(|&d| d as i64).collect();
    let contiguous = arr.as_standard_layout();
    tch::Tensor::from_slice(contiguous.as_slice().unwrap_or(&[]))
        .reshape(shape)
        .to_device(device)
}

/// Copy a `[B, T, F]` float tensor back to the host.
#[cfg(feature = "tch-backend")]
pub fn tensor_to_array3(t: &tch::Tensor) -> TrainResult<Array3<f32>> {
    let size = t.size();
    if size.len() != 3 {
        return Err(TrainError::shape_mismatch("tensor", vec![0, 0, 0], size.iter().map(|&d| d as usize).collect()));
    }
    let dims = (size[0] as usize, size[1] as usize, size[2] as usize);
    let flat = t.to_kind(tch::Kind::Float).to_device(tch::Device::Cpu).contiguous().view([-1]);
    let values = Vec::<f32>::try_from(&flat)
        .map_err(|_| TrainError::shape_mismatch("tensor", vec![dims.0, dims.1, dims.2], vec![]))?;
    Array3::from_shape_vec(dims, values)
        .map_err(|_| TrainError::shape_mismatch("tensor", vec![dims.0, dims.1, dims.2], vec![]))
}

// ---------------------------------------------------------------------------
// WindowedDataset
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy)]
struct WindowIndex {
    sequence: usize,
    start: usize,
}

/// Fixed-length windows cut from a set of (already normalized) sequences.
pub struct WindowedDataset {
    sequences: Vec<Array2<f32>>,
    windows: Vec<WindowIndex>,
    history: usize,
    horizon: usize,
}

impl WindowedDataset {
    /// Index every `stride`-th window of `history + horizon` frames.
    ///
    /// Sequences shorter than one window contribute nothing and are logged.
    pub fn new(corpus: &MotionCorpus, history: usize, horizon: usize, stride: usize) -> Self {
        let len = history + horizon;
        let stride = stride.max(1);
        let mut sequences = Vec::with_capacity(corpus.len());
        let mut windows = Vec::new();

        for seq in corpus.sequences() {
            let t = seq.frames.nrows();
            if t < len {
                warn!(
                    "{}",
                    DatasetError::SequenceTooShort {
                        name: format!("{}/{}", seq.action, seq.name),
                        frames: t,
                        required: len,
                    }
                );
                continue;
            }
            let idx = sequences.len();
            windows.extend((0..=t - len).step_by(stride).map(|start| WindowIndex { sequence: idx, start }));
            sequences.push(seq.frames.clone());
        }

        debug!("WindowedDataset: {} windows from {} sequences", windows.len(), sequences.len());
        WindowedDataset { sequences, windows, history, horizon }
    }

    /// Number of windows.
    pub fn len(&self) -> usize {
        self.windows.len()
    }

    /// `true` when no sequence was long enough.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }

    /// Encoder length.
    pub fn history(&self) -> usize {
        self.history
    }

    /// Decoder length.
    pub fn horizon(&self) -> usize {
        self.horizon
    }

    /// The `[history + horizon, F]` window at `idx`.
    pub fn get(&self, idx: usize) -> Result<ArrayView2<'_, f32>, DatasetError> {
        let w = self
            .windows
            .get(idx)
            .ok_or(DatasetError::IndexOutOfBounds { idx, len: self.windows.len() })?;
        Ok(self.sequences[w.sequence].slice(s![w.start..w.start + self.history + self.horizon, ..]))
    }
}

// ---------------------------------------------------------------------------
// DataLoader
// ---------------------------------------------------------------------------

/// Batched, optionally-shuffled iterator over a [`WindowedDataset`].
///
/// The shuffle order is fully deterministic: given the same `seed` and dataset
/// length the iteration order is always identical. Every call to
/// [`DataLoader::iter`] restarts from the beginning.
pub struct DataLoader<'a> {
    dataset: &'a WindowedDataset,
    batch_size: usize,
    shuffle: bool,
    seed: u64,
}

impl<'a> DataLoader<'a> {
    /// Create a new `DataLoader`. A `batch_size` of zero is treated as one.
    pub fn new(dataset: &'a WindowedDataset, batch_size: usize, shuffle: bool, seed: u64) -> Self {
        DataLoader { dataset, batch_size: batch_size.max(1), shuffle, seed }
    }

    /// Number of complete (or partial) batches yielded per pass.
    pub fn num_batches(&self) -> usize {
        self.dataset.len().div_ceil(self.batch_size)
    }

    /// Return an iterator that yields [`SequenceBatch`]es.
    pub fn iter(&self) -> DataLoaderIter<'a> {
        let mut indices: Vec<usize> = (0..self.dataset.len()).collect();
        if self.shuffle {
            xorshift_shuffle(&mut indices, self.seed);
        }
        DataLoaderIter { dataset: self.dataset, indices, batch_size: self.batch_size, cursor: 0 }
    }
}

/// Iterator returned by [`DataLoader::iter`].
pub struct DataLoaderIter<'a> {
    dataset: &'a WindowedDataset,
    indices: Vec<usize>,
    batch_size: usize,
    cursor: usize,
}

impl<'a> Iterator for DataLoaderIter<'a> {
    type Item = TrainResult<SequenceBatch>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.cursor >= self.indices.len() {
            return None;
        }
        let end = (self.cursor + self.batch_size).min(self.indices.len());
        let batch_indices = &self.indices[self.cursor..end];
        self.cursor = end;

        let windows: Result<Vec<_>, DatasetError> = batch_indices.iter().map(|&i| self.dataset.get(i)).collect();
        Some(windows.map_err(TrainError::from).and_then(|w| {
            SequenceBatch::from_windows(&w, self.dataset.history(), self.dataset.horizon())
        }))
    }
}

// ---------------------------------------------------------------------------
// Xorshift shuffle (deterministic, no external RNG state)
// ---------------------------------------------------------------------------

/// In-place Fisher-Yates shuffle using a 64-bit Xorshift PRNG seeded with
/// `seed`. Reproducible across platforms.
fn xorshift_shuffle(indices: &mut [usize], seed: u64) {
    let n = indices.len();
    if n <= 1 {
        return;
    }
    let mut state = if seed == 0 { 0x853c49e6748fea9b } else { seed };
    for i in (1..n).rev() {
        state ^= state << 13;
        state ^= state >> 7;
        state ^= state << 17;
        let j = (state as usize) % (i + 1);
        indices.swap(i, j);
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
