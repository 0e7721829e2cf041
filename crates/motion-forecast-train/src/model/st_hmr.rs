//! Spatio-temporal hierarchical motion recurrent network.
//!
//! Each frame is split into 3-component joint chunks that share one
//! embedding; a spatial layer mixes the joint embeddings into one frame
//! code, and GRU stacks model the temporal dynamics of those codes. The
//! decoder predicts residuals on top of the current frame.

use tch::nn::{self, Module, RNN};
use tch::Tensor;

use super::{rnn_config, top_layer, unroll, ExecutionMode, SequenceTransducer};
use crate::config::{ModelKind, TrainingConfig};

const JOINT_EMBED: i64 = 16;

/// ST-HMR forecaster.
pub struct StHmr {
    joint_embed: nn::Linear,
    spatial: nn::Linear,
    encoder: nn::GRU,
    decoder: nn::GRU,
    readout: nn::Linear,
    chunks: i64,
    pad: i64,
}

impl StHmr {
    /// Register the layers under `root`.
    pub fn new(root: &nn::Path, feature_dim: i64, config: &TrainingConfig) -> Self {
        let h = config.hidden_size as i64;
        let pad = (3 - feature_dim % 3) % 3;
        let chunks = (feature_dim + pad) / 3;
        let shared = root / "shared";
        let enc = root / "encoder";
        let dec = root / "decoder";
        StHmr {
            joint_embed: nn::linear(&shared / "joint_embed", 3, JOINT_EMBED, Default::default()),
            spatial: nn::linear(&shared / "spatial", chunks * JOINT_EMBED, h, Default::default()),
            encoder: nn::gru(&enc / "gru", h, h, rnn_config(config.num_layers)),
            decoder: nn::gru(&dec / "gru", h, h, rnn_config(config.num_layers)),
            readout: nn::linear(&dec / "readout", h, feature_dim, Default::default()),
            chunks,
            pad,
        }
    }

    /// `[..., F]` frames to `[..., H]` frame codes.
    fn spatial_encode(&self, x: &Tensor) -> Tensor {
        let x = if self.pad > 0 { x.constant_pad_nd([0, self.pad]) } else { x.shallow_clone() };
        let mut shape = x.size();
        shape.pop();
        shape.extend([self.chunks, 3]);
        let joints = self.joint_embed.forward(&x.reshape(shape.as_slice())).tanh();
        self.spatial.forward(&joints.flatten(-2, -1)).relu()
    }
}

impl SequenceTransducer for StHmr {
    fn kind(&self) -> ModelKind {
        ModelKind::StHmr
    }

    fn forward(&self, encoder_inputs: &Tensor, decoder_inputs: &Tensor, mode: ExecutionMode) -> Tensor {
        let (_, mut state) = self.encoder.seq(&self.spatial_encode(encoder_inputs));
        unroll(decoder_inputs, mode, |frame| {
            state = self.decoder.step(&self.spatial_encode(frame), &state);
            frame + self.readout.forward(&top_layer(&state.0))
        })
    }
}
