//! Three-layer LSTM network.
//!
//! Separate three-layer LSTM stacks encode the history and decode the
//! forecast; the decoder starts from the encoder's final state and a linear
//! read-out maps its top layer to the next frame.

use tch::nn::{self, Module, RNN};
use tch::Tensor;

use super::{rnn_config, top_layer, unroll, ExecutionMode, SequenceTransducer};
use crate::config::{ModelKind, TrainingConfig};

const LAYERS: usize = 3;

/// LSTM-3LR forecaster. `num_layers` is ignored; the depth is fixed.
pub struct Lstm3lr {
    encoder: nn::LSTM,
    decoder: nn::LSTM,
    readout: nn::Linear,
}

impl Lstm3lr {
    /// Register the layers under `root`.
    pub fn new(root: &nn::Path, feature_dim: i64, config: &TrainingConfig) -> Self {
        let h = config.hidden_size as i64;
        Lstm3lr {
            encoder: nn::lstm(root / "encoder" / "lstm", feature_dim, h, rnn_config(LAYERS)),
            decoder: nn::lstm(root / "decoder" / "lstm", feature_dim, h, rnn_config(LAYERS)),
            readout: nn::linear(root / "decoder" / "readout", h, feature_dim, Default::default()),
        }
    }
}

impl SequenceTransducer for Lstm3lr {
    fn kind(&self) -> ModelKind {
        ModelKind::Lstm3lr
    }

    fn forward(&self, encoder_inputs: &Tensor, decoder_inputs: &Tensor, mode: ExecutionMode) -> Tensor {
        let (_, mut state) = self.encoder.seq(encoder_inputs);
        unroll(decoder_inputs, mode, |frame| {
            state = self.decoder.step(frame, &state);
            self.readout.forward(&top_layer(&state.h()))
        })
    }
}
