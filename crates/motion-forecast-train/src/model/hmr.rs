//! Hierarchical motion recurrent network.
//!
//! A GRU encoder summarises the history twice: its final state seeds the
//! decoder (local, frame-level context) and the time-average of its outputs
//! is projected to a global context vector that is appended to every decoder
//! input. The LSTM decoder predicts residuals on top of the current frame.

use tch::nn::{self, Module, RNN};
use tch::{Kind, Tensor};

use super::{rnn_config, top_layer, unroll, ExecutionMode, SequenceTransducer};
use crate::config::{ModelKind, TrainingConfig};

/// HMR forecaster.
pub struct Hmr {
    encoder: nn::GRU,
    context: nn::Linear,
    decoder: nn::LSTM,
    readout: nn::Linear,
}

impl Hmr {
    /// Register the layers under `root`.
    pub fn new(root: &nn::Path, feature_dim: i64, config: &TrainingConfig) -> Self {
        let h = config.hidden_size as i64;
        let enc = root / "encoder";
        let dec = root / "decoder";
        Hmr {
            encoder: nn::gru(&enc / "gru", feature_dim, h, rnn_config(config.num_layers)),
            context: nn::linear(&enc / "context", h, h, Default::default()),
            decoder: nn::lstm(&dec / "lstm", feature_dim + h, h, rnn_config(config.num_layers)),
            readout: nn::linear(&dec / "readout", h, feature_dim, Default::default()),
        }
    }
}

impl SequenceTransducer for Hmr {
    fn kind(&self) -> ModelKind {
        ModelKind::Hmr
    }

    fn forward(&self, encoder_inputs: &Tensor, decoder_inputs: &Tensor, mode: ExecutionMode) -> Tensor {
        let (outputs, encoded) = self.encoder.seq(encoder_inputs);
        let context = self.context.forward(&outputs.mean_dim(Some(&[1_i64][..]), false, Kind::Float)).tanh();

        let h0 = encoded.0;
        let c0 = h0.zeros_like();
        let mut state = nn::LSTMState((h0, c0));
        unroll(decoder_inputs, mode, |frame| {
            let input = Tensor::cat(&[frame, &context], 1);
            state = self.decoder.step(&input, &state);
            frame + self.readout.forward(&top_layer(&state.h()))
        })
    }
}
