//! Training configuration for the motion-forecasting harness.
//!
//! [`TrainingConfig`] is the single source of truth for the architecture
//! choice, data representation, window sizes, optimisation hyper-parameters,
//! loss weights and infrastructure settings. It is passed explicitly to every
//! component constructor; nothing in the crate reads ambient process state.
//! It is serializable via [`serde`] so it can be stored to / restored from
//! JSON files.
//!
//! # Example
//!
//! ```rust
//! use motion_forecast_train::config::{ModelKind, Representation, TrainingConfig};
//!
//! let cfg = TrainingConfig::default();
//! cfg.validate().expect("default config is valid");
//!
//! assert_eq!(cfg.model_kind().unwrap(), ModelKind::Hmr);
//! assert_eq!(cfg.datatype, Representation::Lie);
//! assert_eq!(cfg.eval_checkpoints, vec![1, 3, 7, 9]);
//! ```

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// ModelKind
// ---------------------------------------------------------------------------

/// The closed set of forecasting architectures the harness can drive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModelKind {
    /// Spatio-temporal hierarchical motion recurrent network.
    StHmr,
    /// Hierarchical motion recurrent network.
    Hmr,
    /// Encoder-recurrent-decoder network.
    Erd,
    /// Residual GRU sequence-to-sequence network.
    Gru,
    /// Three-layer LSTM network.
    Lstm3lr,
}

impl ModelKind {
    /// Every supported architecture, in a stable order.
    pub const ALL: [ModelKind; 5] =
        [ModelKind::StHmr, ModelKind::Hmr, ModelKind::Erd, ModelKind::Gru, ModelKind::Lstm3lr];

    /// The identifier used in configuration files.
    pub fn as_str(self) -> &'static str {
        match self {
            ModelKind::StHmr => "ST_HMR",
            ModelKind::Hmr => "HMR",
            ModelKind::Erd => "ERD",
            ModelKind::Gru => "GRU",
            ModelKind::Lstm3lr => "LSTM3lr",
        }
    }
}

impl fmt::Display for ModelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ModelKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ModelKind::ALL
            .iter()
            .copied()
            .find(|k| k.as_str() == s)
            .ok_or_else(|| ConfigError::UnsupportedModel {
                name: s.to_string(),
                supported: ModelKind::ALL
                    .iter()
                    .map(|k| k.as_str())
                    .collect::<Vec<_>>()
                    .join(", "),
            })
    }
}

// ---------------------------------------------------------------------------
// Representation / LossKind
// ---------------------------------------------------------------------------

/// How a pose is encoded in a feature vector.
///
/// Angle space (`lie`) frames are laid out as
/// `[root translation (3), root rotation (3), joint 1 rotation (3), ...]`,
/// every rotation an exponential-map (axis-angle) vector relative to the
/// parent joint. Coordinate space (`xyz`) frames hold `J × 3` absolute joint
/// positions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Representation {
    /// Lie-algebra joint rotations.
    Lie,
    /// Raw joint coordinates.
    Xyz,
}

impl Representation {
    /// Full (de-normalized) feature dimension for a skeleton of `num_joints`.
    pub fn feature_dim(self, num_joints: usize) -> usize {
        match self {
            Representation::Lie => 3 + 3 * num_joints,
            Representation::Xyz => 3 * num_joints,
        }
    }

    /// Number of joints encoded by a full feature vector of width `dim`, or
    /// `None` when `dim` does not fit the layout.
    pub fn num_joints(self, dim: usize) -> Option<usize> {
        match self {
            Representation::Lie if dim >= 6 && dim % 3 == 0 => Some(dim / 3 - 1),
            Representation::Xyz if dim >= 3 && dim % 3 == 0 => Some(dim / 3),
            _ => None,
        }
    }

    /// Whether predictions must go through forward kinematics before any
    /// positional quantity can be measured.
    pub fn is_angle_space(self) -> bool {
        matches!(self, Representation::Lie)
    }
}

impl fmt::Display for Representation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Representation::Lie => f.write_str("lie"),
            Representation::Xyz => f.write_str("xyz"),
        }
    }
}

/// Reconstruction term of the composite loss.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LossKind {
    /// Squared L2 distance summed over features.
    L2,
    /// Per-joint squared rotation error weighted by downstream bone length.
    #[serde(rename = "weightlie")]
    WeightedLie,
}

// ---------------------------------------------------------------------------
// TrainingConfig
// ---------------------------------------------------------------------------

/// Complete configuration for a training or prediction run.
///
/// Use [`TrainingConfig::default()`] as a starting point, then override
/// individual fields as needed.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    // -----------------------------------------------------------------------
    // Model / data
    // -----------------------------------------------------------------------
    /// Architecture identifier: one of `ST_HMR`, `HMR`, `ERD`, `GRU`,
    /// `LSTM3lr`. Default: **HMR**.
    pub model: String,

    /// Pose representation. Default: **lie**.
    pub datatype: Representation,

    /// Dataset name used in logs and artifact names. Default: **Human**.
    pub dataset: String,

    /// Root directory holding `train/`, `test/` and `skeleton.json`.
    pub data_dir: PathBuf,

    /// Fit mean/std on the training split and normalize every split with
    /// them. Default: **true**.
    pub normalize: bool,

    /// Observed history length in frames. Default: **50**.
    pub input_window_size: usize,

    /// Forecast horizon in frames. Default: **10**.
    pub output_window_size: usize,

    /// Frame stride between consecutive training windows. Default: **10**.
    pub window_stride: usize,

    /// Hidden width of the recurrent cells. Default: **256**.
    pub hidden_size: usize,

    /// Stacked recurrent layers (where the architecture is configurable).
    /// Default: **2**.
    pub num_layers: usize,

    // -----------------------------------------------------------------------
    // Optimisation
    // -----------------------------------------------------------------------
    /// Mini-batch size. Default: **16**.
    pub batch_size: usize,

    /// Adam learning rate. Default: **1e-3**.
    pub learning_rate: f64,

    /// Number of epochs. Default: **100**.
    pub max_epoch: usize,

    /// Passes over the training stream per epoch. Default: **1**.
    pub training_size: usize,

    /// Evaluations of the concatenated validation stream per epoch.
    /// Default: **1**.
    pub validation_size: usize,

    /// Maximum gradient L2 norm. Default: **5.0**.
    pub grad_clip_norm: f64,

    // -----------------------------------------------------------------------
    // Loss
    // -----------------------------------------------------------------------
    /// Reconstruction term. Default: **l2**.
    pub loss: LossKind,

    /// Weight of the bone-length consistency term. Default: **0.1**.
    pub bone_loss_weight: f64,

    // -----------------------------------------------------------------------
    // Evaluation / checkpointing
    // -----------------------------------------------------------------------
    /// Zero-based horizon steps reported in the error matrix and averaged
    /// into the aggregate error. Default: **[1, 3, 7, 9]**.
    pub eval_checkpoints: Vec<usize>,

    /// Held-out windows drawn per action for the prediction split.
    /// Default: **8**.
    pub prediction_samples_per_action: usize,

    /// Forecast horizon used by the `predict` entry point. Default: **75**.
    pub prediction_horizon: usize,

    /// Directory where improving checkpoints are written. Default: `model`.
    pub checkpoint_dir: PathBuf,

    /// Directory where visualization artifacts are written.
    /// Default: `predictions`.
    pub output_dir: PathBuf,

    /// Write joint-coordinate sequences for an external animation renderer.
    /// Default: **false**.
    pub visualize: bool,

    // -----------------------------------------------------------------------
    // Device / reproducibility
    // -----------------------------------------------------------------------
    /// Use a CUDA GPU when available. Default: **false**.
    pub use_gpu: bool,

    /// CUDA device index when `use_gpu` is `true`. Default: **0**.
    pub gpu_device_id: usize,

    /// Seed for parameter initialisation and batch shuffling.
    /// Default: **112858**.
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            // Model / data
            model: ModelKind::Hmr.as_str().to_string(),
            datatype: Representation::Lie,
            dataset: "Human".to_string(),
            data_dir: PathBuf::from("data"),
            normalize: true,
            input_window_size: 50,
            output_window_size: 10,
            window_stride: 10,
            hidden_size: 256,
            num_layers: 2,
            // Optimisation
            batch_size: 16,
            learning_rate: 1e-3,
            max_epoch: 100,
            training_size: 1,
            validation_size: 1,
            grad_clip_norm: 5.0,
            // Loss
            loss: LossKind::L2,
            bone_loss_weight: 0.1,
            // Evaluation / checkpointing
            eval_checkpoints: vec![1, 3, 7, 9],
            prediction_samples_per_action: 8,
            prediction_horizon: 75,
            checkpoint_dir: PathBuf::from("model"),
            output_dir: PathBuf::from("predictions"),
            visualize: false,
            // Device / reproducibility
            use_gpu: false,
            gpu_device_id: 0,
            seed: 112858,
        }
    }
}

impl TrainingConfig {
    /// Load a [`TrainingConfig`] from a JSON file at `path` and validate it.
    ///
    /// Fields missing from the file take their default values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::FileRead`] if the file cannot be opened,
    /// [`ConfigError::ParseError`] if the JSON is malformed, and any
    /// validation error otherwise.
    pub fn from_json(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        let cfg: TrainingConfig = serde_json::from_str(&contents).map_err(|source| {
            ConfigError::ParseError { path: path.to_path_buf(), source }
        })?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Serialize this configuration to pretty-printed JSON and write it to
    /// `path`, creating parent directories if necessary.
    pub fn to_json(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|source| ConfigError::FileRead {
                path: parent.to_path_buf(),
                source,
            })?;
        }
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| ConfigError::invalid_value("(serialization)", e.to_string()))?;
        std::fs::write(path, json).map_err(|source| ConfigError::FileRead {
            path: path.to_path_buf(),
            source,
        })?;
        Ok(())
    }

    /// Parse the configured architecture identifier.
    pub fn model_kind(&self) -> Result<ModelKind, ConfigError> {
        self.model.parse()
    }

    /// Frames needed to cut one training window.
    pub fn window_frames(&self) -> usize {
        self.input_window_size + self.output_window_size
    }

    /// The configured horizon checkpoints that fall inside `horizon`.
    pub fn checkpoints_within(&self, horizon: usize) -> Vec<usize> {
        self.eval_checkpoints.iter().copied().filter(|&c| c < horizon).collect()
    }

    /// Validate the fields whose bad values would otherwise surface as a
    /// panic deep inside the run, returning the first problem found.
    ///
    /// # Validated invariants
    ///
    /// - `model` is one of the supported architecture identifiers.
    /// - Window sizes, batch size, hidden size and layer count are non-zero.
    /// - `learning_rate` and `grad_clip_norm` are strictly positive.
    /// - `bone_loss_weight` is non-negative.
    /// - `max_epoch`, `training_size` and `validation_size` are non-zero.
    /// - At least one evaluation checkpoint lies inside the horizon.
    /// - `weightlie` is only used with the `lie` representation.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.model_kind()?;

        if self.input_window_size == 0 {
            return Err(ConfigError::invalid_value("input_window_size", "must be > 0"));
        }
        if self.output_window_size == 0 {
            return Err(ConfigError::invalid_value("output_window_size", "must be > 0"));
        }
        if self.window_stride == 0 {
            return Err(ConfigError::invalid_value("window_stride", "must be > 0"));
        }
        if self.hidden_size == 0 {
            return Err(ConfigError::invalid_value("hidden_size", "must be > 0"));
        }
        if self.num_layers == 0 {
            return Err(ConfigError::invalid_value("num_layers", "must be > 0"));
        }

        if self.batch_size == 0 {
            return Err(ConfigError::invalid_value("batch_size", "must be > 0"));
        }
        if self.learning_rate <= 0.0 {
            return Err(ConfigError::invalid_value("learning_rate", "must be > 0.0"));
        }
        if self.grad_clip_norm <= 0.0 {
            return Err(ConfigError::invalid_value("grad_clip_norm", "must be > 0.0"));
        }
        if self.max_epoch == 0 {
            return Err(ConfigError::invalid_value("max_epoch", "must be > 0"));
        }
        if self.training_size == 0 {
            return Err(ConfigError::invalid_value("training_size", "must be > 0"));
        }
        if self.validation_size == 0 {
            return Err(ConfigError::invalid_value("validation_size", "must be > 0"));
        }

        if self.bone_loss_weight < 0.0 {
            return Err(ConfigError::invalid_value("bone_loss_weight", "must be >= 0.0"));
        }
        if self.loss == LossKind::WeightedLie && self.datatype != Representation::Lie {
            return Err(ConfigError::IncompatibleRepresentation {
                representation: self.datatype.to_string(),
                other: "the `weightlie` loss".to_string(),
            });
        }

        if self.checkpoints_within(self.output_window_size).is_empty() {
            return Err(ConfigError::invalid_value(
                "eval_checkpoints",
                format!(
                    "at least one checkpoint must be < output_window_size ({})",
                    self.output_window_size
                ),
            ));
        }
        if self.prediction_samples_per_action == 0 {
            return Err(ConfigError::invalid_value(
                "prediction_samples_per_action",
                "must be > 0",
            ));
        }
        if self.prediction_horizon == 0 {
            return Err(ConfigError::invalid_value("prediction_horizon", "must be > 0"));
        }

        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
