//! Residual GRU sequence-to-sequence network.
//!
//! The decoder predicts a velocity: each output frame is the input frame
//! plus a linear read-out of the top GRU layer.

use tch::nn::{self, Module, RNN};
use tch::Tensor;

use super::{rnn_config, top_layer, unroll, ExecutionMode, SequenceTransducer};
use crate::config::{ModelKind, TrainingConfig};

/// Residual GRU forecaster.
pub struct ResidualGru {
    encoder: nn::GRU,
    decoder: nn::GRU,
    readout: nn::Linear,
}

impl ResidualGru {
    /// Register the layers under `root`.
    pub fn new(root: &nn::Path, feature_dim: i64, config: &TrainingConfig) -> Self {
        let h = config.hidden_size as i64;
        ResidualGru {
            encoder: nn::gru(root / "encoder" / "gru", feature_dim, h, rnn_config(config.num_layers)),
            decoder: nn::gru(root / "decoder" / "gru", feature_dim, h, rnn_config(config.num_layers)),
            readout: nn::linear(root / "decoder" / "readout", h, feature_dim, Default::default()),
        }
    }
}

impl SequenceTransducer for ResidualGru {
    fn kind(&self) -> ModelKind {
        ModelKind::Gru
    }

    fn forward(&self, encoder_inputs: &Tensor, decoder_inputs: &Tensor, mode: ExecutionMode) -> Tensor {
        let (_, mut state) = self.encoder.seq(encoder_inputs);
        unroll(decoder_inputs, mode, |frame| {
            state = self.decoder.step(frame, &state);
            frame + self.readout.forward(&top_layer(&state.0))
        })
    }
}
