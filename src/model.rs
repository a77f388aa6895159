use anyhow::Result;
use candle_core::{Tensor, D};
use candle_nn::{Module, VarBuilder};

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Width of the decoder states fed to the generator.
    pub hidden_size: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self { hidden_size: 256 }
    }
}

/// Projects decoder states onto the vocabulary as log-probabilities.
pub struct Generator {
    proj: candle_nn::Linear,
}

impl Generator {
    pub fn new(hidden_size: usize, vocab_size: usize, vb: VarBuilder) -> Result<Self> {
        let proj = candle_nn::linear(hidden_size, vocab_size, vb.pp("generator"))?;
        Ok(Self { proj })
    }

    /// `[.., hidden]` -> `[.., vocab]`
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        let logits = self.proj.forward(x)?;
        Ok(candle_nn::ops::log_softmax(&logits, D::Minus1)?)
    }
}
