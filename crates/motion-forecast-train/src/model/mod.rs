//! Forecasting models behind a single adapter, using tch-rs.
//!
//! # Architecture
//!
//! ```text
//! encoder_inputs [B, history, F]      decoder_inputs [B, horizon, F]
//!          │                                   │
//!          ▼                                   ▼
//! ┌──────────────────┐   state   ┌──────────────────────────────┐
//! │  encoder (RNN)   │ ────────► │  decoder, one step per frame │
//! └──────────────────┘           └──────────────────────────────┘
//!                                              │
//!                                              ▼
//!                                 prediction [B, horizon, F]
//! ```
//!
//! Every architecture implements [`SequenceTransducer`]; [`build_model`]
//! picks one from the configured [`ModelKind`] and registers all of its
//! parameters in one `VarStore` under the `encoder` and `decoder` prefixes.
//! Layers that run on both sides (ERD's embedding and LSTM, ST-HMR's joint
//! embedding) live under `shared`.
//!
//! In [`ExecutionMode::Train`] the decoder reads `decoder_inputs[:, t]` at
//! step `t`. In [`ExecutionMode::Eval`] it runs under `tch::no_grad`, reads
//! `decoder_inputs[:, 0]` once and feeds back its own output for the
//! remaining steps.

use std::path::Path;
use tch::{nn, Device, Tensor};
use tracing::info;

use crate::checkpoint::CheckpointSink;
use crate::config::{ModelKind, TrainingConfig};
use crate::error::{TrainError, TrainResult};

pub mod erd;
pub mod gru;
pub mod hmr;
pub mod lstm3lr;
pub mod st_hmr;

pub use erd::Erd;
pub use gru::ResidualGru;
pub use hmr::Hmr;
pub use lstm3lr::Lstm3lr;
pub use st_hmr::StHmr;

// ─────────────────────────────────────────────────────────────────────────────
// Execution mode / transducer trait
// ─────────────────────────────────────────────────────────────────────────────

/// How the decoder is driven.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Decoder reads the ground-truth inputs, gradients tracked.
    Train,
    /// Autoregressive, no gradients.
    Eval,
}

/// An encoder/decoder network mapping a motion history to a forecast.
pub trait SequenceTransducer {
    /// Which architecture this is.
    fn kind(&self) -> ModelKind;

    /// `[B, history, F]` and `[B, horizon, F]` to `[B, horizon, F]`.
    fn forward(&self, encoder_inputs: &Tensor, decoder_inputs: &Tensor, mode: ExecutionMode) -> Tensor;
}

/// Run `step` once per decoder frame and stack the outputs along time.
///
/// `step` receives the frame to condition on and returns the predicted next
/// frame `[B, F]`.
pub(crate) fn unroll<F>(decoder_inputs: &Tensor, mode: ExecutionMode, mut step: F) -> Tensor
where
    F: FnMut(&Tensor) -> Tensor,
{
    let steps = decoder_inputs.size()[1];
    let mut outputs = Vec::with_capacity(steps as usize);
    let mut frame = decoder_inputs.select(1, 0);
    for t in 0..steps {
        if mode == ExecutionMode::Train {
            frame = decoder_inputs.select(1, t);
        }
        let out = step(&frame);
        frame = out.shallow_clone();
        outputs.push(out);
    }
    Tensor::stack(&outputs, 1)
}

/// Top layer of a `[num_layers, B, H]` hidden state.
pub(crate) fn top_layer(h: &Tensor) -> Tensor {
    h.select(0, -1)
}

// ─────────────────────────────────────────────────────────────────────────────
// ForecastModel
// ─────────────────────────────────────────────────────────────────────────────

/// A built network together with the `VarStore` owning its parameters.
pub struct ForecastModel {
    vs: nn::VarStore,
    net: Box<dyn SequenceTransducer>,
    feature_dim: usize,
}

impl ForecastModel {
    /// Forward pass. Output shape `[B, decoder_inputs.size(1), F]`.
    pub fn forward(&self, encoder_inputs: &Tensor, decoder_inputs: &Tensor, mode: ExecutionMode) -> Tensor {
        match mode {
            ExecutionMode::Train => self.net.forward(encoder_inputs, decoder_inputs, mode),
            ExecutionMode::Eval => tch::no_grad(|| self.net.forward(encoder_inputs, decoder_inputs, mode)),
        }
    }

    /// Architecture of the wrapped network.
    pub fn kind(&self) -> ModelKind {
        self.net.kind()
    }

    /// Feature dimension the network was built for.
    pub fn feature_dim(&self) -> usize {
        self.feature_dim
    }

    /// Device holding the parameters.
    pub fn device(&self) -> Device {
        self.vs.device()
    }

    /// Access the internal `VarStore` (e.g. to create an optimizer).
    pub fn var_store(&self) -> &nn::VarStore {
        &self.vs
    }

    /// Count trainable parameters.
    pub fn parameter_count(&self) -> usize {
        self.vs.trainable_variables().iter().map(|t| t.numel()).sum()
    }

    /// Parameters registered under the `encoder` prefix.
    pub fn encoder_parameter_count(&self) -> usize {
        self.count_prefix("encoder")
    }

    /// Parameters registered under the `decoder` prefix.
    pub fn decoder_parameter_count(&self) -> usize {
        self.count_prefix("decoder")
    }

    /// Parameters registered under the `shared` prefix, used by both the
    /// encoder and the decoder.
    pub fn shared_parameter_count(&self) -> usize {
        self.count_prefix("shared")
    }

    fn count_prefix(&self, prefix: &str) -> usize {
        self.vs
            .variables()
            .iter()
            .filter(|(name, _)| name.split('.').next() == Some(prefix))
            .map(|(_, t)| t.numel())
            .sum()
    }

    /// Save model weights to `path`.
    pub fn save(&self, path: &Path) -> TrainResult<()> {
        self.vs
            .save(path)
            .map_err(|e| TrainError::checkpoint(format!("cannot save weights: {e}"), path))
    }

    /// Load model weights from `path`. The file must come from the same
    /// architecture, feature dimension and hidden size.
    pub fn load(&mut self, path: &Path) -> TrainResult<()> {
        self.vs
            .load(path)
            .map_err(|e| TrainError::checkpoint(format!("cannot load weights: {e}"), path))
    }
}

impl CheckpointSink for ForecastModel {
    fn persist(&self, path: &Path) -> TrainResult<()> {
        self.save(path)
    }
}

/// Build the network named by `config.model` for `feature_dim` features.
///
/// # Errors
///
/// [`TrainError::Config`] if the model identifier is not supported.
pub fn build_model(config: &TrainingConfig, feature_dim: usize, device: Device) -> TrainResult<ForecastModel> {
    let kind = config.model_kind()?;
    let vs = nn::VarStore::new(device);
    let root = vs.root();
    let f = feature_dim as i64;

    let net: Box<dyn SequenceTransducer> = match kind {
        ModelKind::Erd => Box::new(Erd::new(&root, f, config)),
        ModelKind::Lstm3lr => Box::new(Lstm3lr::new(&root, f, config)),
        ModelKind::Gru => Box::new(ResidualGru::new(&root, f, config)),
        ModelKind::Hmr => Box::new(Hmr::new(&root, f, config)),
        ModelKind::StHmr => Box::new(StHmr::new(&root, f, config)),
    };

    let model = ForecastModel { vs, net, feature_dim };
    info!(
        "Built {kind} on {:?}: {} parameters (encoder {}, decoder {}, shared {})",
        device,
        model.parameter_count(),
        model.encoder_parameter_count(),
        model.decoder_parameter_count(),
        model.shared_parameter_count()
    );
    Ok(model)
}

pub(crate) fn rnn_config(num_layers: usize) -> nn::RNNConfig {
    nn::RNNConfig { num_layers: num_layers.max(1) as i64, batch_first: true, ..Default::default() }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
