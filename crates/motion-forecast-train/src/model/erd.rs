//! Encoder-Recurrent-Decoder network.
//!
//! ```text
//! frame ─► Linear ─► ReLU ─► Linear ─► LSTM ×L ─► Linear ─► ReLU ─► Linear ─► frame
//!          └───────────────── shared ─────────────┘ └──────── decoder ────────┘
//! ```
//!
//! The same embedding and recurrent stack read the history and the decoder
//! frames, so they are registered under `shared`; only the output MLP
//! belongs to the decoder.

use tch::nn::{self, Module, RNN};
use tch::Tensor;

use super::{rnn_config, top_layer, unroll, ExecutionMode, SequenceTransducer};
use crate::config::{ModelKind, TrainingConfig};

/// ERD forecaster.
pub struct Erd {
    embed1: nn::Linear,
    embed2: nn::Linear,
    lstm: nn::LSTM,
    out1: nn::Linear,
    out2: nn::Linear,
}

impl Erd {
    /// Register the layers under `root`.
    pub fn new(root: &nn::Path, feature_dim: i64, config: &TrainingConfig) -> Self {
        let h = config.hidden_size as i64;
        let shared = root / "shared";
        let dec = root / "decoder";
        Erd {
            embed1: nn::linear(&shared / "embed1", feature_dim, h, Default::default()),
            embed2: nn::linear(&shared / "embed2", h, h, Default::default()),
            lstm: nn::lstm(&shared / "lstm", h, h, rnn_config(config.num_layers)),
            out1: nn::linear(&dec / "out1", h, h, Default::default()),
            out2: nn::linear(&dec / "out2", h, feature_dim, Default::default()),
        }
    }

    fn embed(&self, x: &Tensor) -> Tensor {
        self.embed2.forward(&self.embed1.forward(x).relu())
    }
}

impl SequenceTransducer for Erd {
    fn kind(&self) -> ModelKind {
        ModelKind::Erd
    }

    fn forward(&self, encoder_inputs: &Tensor, decoder_inputs: &Tensor, mode: ExecutionMode) -> Tensor {
        let (_, mut state) = self.lstm.seq(&self.embed(encoder_inputs));
        unroll(decoder_inputs, mode, |frame| {
            state = self.lstm.step(&self.embed(frame), &state);
            let h = top_layer(&state.h());
            self.out2.forward(&self.out1.forward(&h).relu())
        })
    }
}
