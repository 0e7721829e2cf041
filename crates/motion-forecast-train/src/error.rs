//! Error types for the motion-forecasting training harness.
//!
//! Every module that produces an error imports its error type from here
//! rather than defining it inline, keeping the hierarchy in one place.
//!
//! ## Hierarchy
//!
//! ```text
//! TrainError (top-level)
//! ├── ConfigError      (config validation / file loading / model selection)
//! └── DatasetError     (corpus loading, I/O, format, skeleton)
//! ```
//!
//! Every variant is fatal for a training run: the harness has no partial
//! failure tolerance, and the last persisted checkpoint is the only
//! recovery artifact.

use std::path::PathBuf;
use thiserror::Error;

// ---------------------------------------------------------------------------
// TrainResult
// ---------------------------------------------------------------------------

/// Convenient `Result` alias used by orchestration-level functions.
pub type TrainResult<T> = Result<T, TrainError>;

// ---------------------------------------------------------------------------
// TrainError (top-level aggregator)
// ---------------------------------------------------------------------------

/// Top-level error type for the training harness.
///
/// Orchestration-level functions (e.g. [`crate::trainer::Trainer`] methods)
/// return `TrainResult<T>`. Lower-level functions in [`crate::config`] and
/// [`crate::dataset`] return their own module-specific error types which are
/// coerced into `TrainError` via [`From`].
#[derive(Debug, Error)]
pub enum TrainError {
    /// A configuration validation, loading or model-selection error.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// A dataset loading or access error.
    #[error("Dataset error: {0}")]
    Dataset(#[from] DatasetError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// An I/O error outside dataset loading (checkpoint or artifact output).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A libtorch operation (optimizer construction, device transfer) failed.
    #[cfg(feature = "tch-backend")]
    #[error("Torch error: {0}")]
    Tch(#[from] tch::TchError),

    /// The training split yielded no batches.
    #[error("Dataset is empty")]
    EmptyDataset,

    /// A batch or prediction tensor does not have the expected shape.
    #[error("Shape mismatch in {what}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        /// Which tensor was checked.
        what: &'static str,
        /// Expected shape.
        expected: Vec<usize>,
        /// Actual shape.
        actual: Vec<usize>,
    },

    /// The loss became NaN or infinite.
    #[error("Numeric divergence at epoch {epoch}, step {step}: loss = {value}")]
    NumericDivergence {
        /// One-based epoch index.
        epoch: usize,
        /// Zero-based step index within the epoch.
        step: usize,
        /// The offending loss value.
        value: f64,
    },

    /// A checkpoint could not be saved or loaded.
    #[error("Checkpoint error: {message} (path: {path:?})")]
    Checkpoint {
        /// Human-readable description.
        message: String,
        /// Path that was being accessed.
        path: PathBuf,
    },
}

impl TrainError {
    /// Construct a [`TrainError::Checkpoint`].
    pub fn checkpoint<S: Into<String>>(msg: S, path: impl Into<PathBuf>) -> Self {
        TrainError::Checkpoint { message: msg.into(), path: path.into() }
    }

    /// Construct a [`TrainError::ShapeMismatch`].
    pub fn shape_mismatch(what: &'static str, expected: Vec<usize>, actual: Vec<usize>) -> Self {
        TrainError::ShapeMismatch { what, expected, actual }
    }
}

// ---------------------------------------------------------------------------
// ConfigError
// ---------------------------------------------------------------------------

/// Errors produced when loading or validating a [`TrainingConfig`], or when
/// the configuration names something the harness does not support.
///
/// [`TrainingConfig`]: crate::config::TrainingConfig
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A field has an invalid value.
    #[error("Invalid value for `{field}`: {reason}")]
    InvalidValue {
        /// Name of the field.
        field: &'static str,
        /// Human-readable reason.
        reason: String,
    },

    /// The architecture identifier is not one of the supported models.
    #[error("Unsupported model `{name}` (expected one of: {supported})")]
    UnsupportedModel {
        /// The identifier found in the configuration.
        name: String,
        /// Comma-separated list of accepted identifiers.
        supported: String,
    },

    /// The representation cannot be used with the selected dataset or loss.
    #[error("Representation `{representation}` is incompatible with {other}")]
    IncompatibleRepresentation {
        /// The configured representation.
        representation: String,
        /// What it clashes with.
        other: String,
    },

    /// A configuration file could not be read from disk.
    #[error("Cannot read config file `{path}`: {source}")]
    FileRead {
        /// Path that was being read.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A configuration file contains malformed JSON.
    #[error("Cannot parse config file `{path}`: {source}")]
    ParseError {
        /// Path that was being parsed.
        path: PathBuf,
        /// Underlying JSON parse error.
        #[source]
        source: serde_json::Error,
    },
}

impl ConfigError {
    /// Construct a [`ConfigError::InvalidValue`].
    pub fn invalid_value<S: Into<String>>(field: &'static str, reason: S) -> Self {
        ConfigError::InvalidValue { field, reason: reason.into() }
    }
}

// ---------------------------------------------------------------------------
// DatasetError
// ---------------------------------------------------------------------------

/// Errors produced while loading motion corpora or building batches.
///
/// Training code must not silently suppress these: if data is missing the
/// run fails explicitly. [`SyntheticMotionSource`] is the only source of
/// non-file-system data and is meant for tests and dry runs.
///
/// [`SyntheticMotionSource`]: crate::dataset::SyntheticMotionSource
#[derive(Debug, Error)]
pub enum DatasetError {
    /// The data directory does not exist.
    #[error("Directory not found: {path}")]
    DirectoryNotFound {
        /// The path that was not found.
        path: PathBuf,
    },

    /// A split directory contained no usable sequences.
    #[error("No sequences found for split `{split}` under `{root}`")]
    NoSequences {
        /// Split name (`train`, `test`, ...).
        split: String,
        /// Root data directory.
        root: PathBuf,
    },

    /// A file was found but its format or shape is wrong.
    #[error("Invalid data format in `{path}`: {message}")]
    InvalidFormat {
        /// Path of the malformed file.
        path: PathBuf,
        /// Description of the problem.
        message: String,
    },

    /// A sequence is shorter than one history + horizon window.
    #[error("Sequence `{name}` has {frames} frames, need at least {required}")]
    SequenceTooShort {
        /// Identifier of the sequence.
        name: String,
        /// Frames available.
        frames: usize,
        /// Frames required.
        required: usize,
    },

    /// Sequences of one corpus disagree on their feature dimension.
    #[error("Feature dimension mismatch in `{name}`: expected {expected}, got {found}")]
    FeatureMismatch {
        /// Identifier of the offending sequence.
        name: String,
        /// Expected dimension.
        expected: usize,
        /// Dimension found.
        found: usize,
    },

    /// The skeleton description is not a valid kinematic tree.
    #[error("Invalid skeleton: {0}")]
    InvalidSkeleton(String),

    /// A sample index is out of bounds.
    #[error("Index {idx} out of bounds (dataset has {len} samples)")]
    IndexOutOfBounds {
        /// The requested index.
        idx: usize,
        /// Total length of the dataset.
        len: usize,
    },

    /// A low-level I/O error while reading a data file.
    #[error("I/O error reading `{path}`: {source}")]
    IoError {
        /// Path being read when the error occurred.
        path: PathBuf,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },

    /// A numpy array file could not be parsed.
    #[error("NumPy read error in `{path}`: {message}")]
    NpyReadError {
        /// Path of the `.npy` file.
        path: PathBuf,
        /// Error description.
        message: String,
    },

    /// An I/O error that carries no path context.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DatasetError {
    /// Construct a [`DatasetError::InvalidFormat`].
    pub fn invalid_format<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        DatasetError::InvalidFormat { path: path.into(), message: msg.into() }
    }

    /// Construct a [`DatasetError::IoError`].
    pub fn io_error(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        DatasetError::IoError { path: path.into(), source }
    }

    /// Construct a [`DatasetError::NpyReadError`].
    pub fn npy_read<S: Into<String>>(path: impl Into<PathBuf>, msg: S) -> Self {
        DatasetError::NpyReadError { path: path.into(), message: msg.into() }
    }

    /// Construct a [`DatasetError::InvalidSkeleton`].
    pub fn invalid_skeleton<S: Into<String>>(msg: S) -> Self {
        DatasetError::InvalidSkeleton(msg.into())
    }
}
