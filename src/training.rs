use anyhow::{ensure, Result};
use candle_core::{DType, Tensor};
use candle_nn::optim::{AdamW, ParamsAdamW};
use candle_nn::{Optimizer, VarMap};

use crate::model::Generator;

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub learning_rate: f64,
    pub weight_decay: f64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            learning_rate: 1e-3,
            weight_decay: 1e-5,
        }
    }
}

pub fn build_optimizer(varmap: &VarMap, config: &TrainingConfig) -> Result<AdamW> {
    let params = ParamsAdamW {
        lr: config.learning_rate,
        weight_decay: config.weight_decay,
        ..Default::default()
    };
    Ok(AdamW::new(varmap.all_vars(), params)?)
}

/// Negative log-likelihood summed over targets, skipping the padding id.
#[derive(Debug, Clone, Copy)]
pub struct NllCriterion {
    pub pad_id: Option<u32>,
}

impl NllCriterion {
    /// `log_probs`: `[N, V]`, `targets`: `[N]` (u32).
    pub fn loss(&self, log_probs: &Tensor, targets: &Tensor) -> Result<Tensor> {
        let picked = log_probs
            .gather(&targets.unsqueeze(1)?.contiguous()?, 1)?
            .squeeze(1)?;
        let picked = match self.pad_id {
            Some(pad) => {
                let pad = Tensor::full(pad, targets.shape(), targets.device())?;
                let mask = targets.ne(&pad)?.to_dtype(DType::F32)?;
                picked.mul(&mask)?
            }
            None => picked,
        };
        Ok(picked.sum_all()?.neg()?)
    }
}

/// Loss computation for one batch, with an optional optimizer step.
///
/// Without an optimizer (evaluation) only the loss is computed.
pub struct LossCompute<'a> {
    generator: &'a Generator,
    criterion: NllCriterion,
    optimizer: Option<&'a mut AdamW>,
}

impl<'a> LossCompute<'a> {
    pub fn new(
        generator: &'a Generator,
        criterion: NllCriterion,
        optimizer: Option<&'a mut AdamW>,
    ) -> Self {
        Self {
            generator,
            criterion,
            optimizer,
        }
    }

    /// `x`: `[B, T, H]` decoder states, `y`: `[B, T]` target ids, `norm`:
    /// normalizing count (usually the batch size). Returns the un-normalized
    /// loss.
    pub fn compute(&mut self, x: &Tensor, y: &Tensor, norm: usize) -> Result<f32> {
        ensure!(norm > 0, "loss normalizer must be positive");
        let log_probs = self.generator.forward(x)?;
        let (b, t, v) = log_probs.dims3()?;
        let loss = self
            .criterion
            .loss(&log_probs.reshape((b * t, v))?, &y.reshape(b * t)?)?;
        let loss = loss.affine(1.0 / norm as f64, 0.0)?;

        if let Some(optimizer) = self.optimizer.as_deref_mut() {
            // Gradients are recomputed from the loss graph on every step.
            optimizer.backward_step(&loss)?;
        }

        Ok(loss.to_scalar::<f32>()? * norm as f32)
    }
}
