use anyhow::{Result, ensure};
use candle_core::{D, Tensor};
use candle_nn::ops::log_softmax;
use rand::{Rng, distr::Distribution as RandDistribution, distr::weighted::WeightedIndex};

/// Categorical distribution over discrete actions, parameterized by logits.
pub struct CategoricalDistribution;

impl CategoricalDistribution {
    /// Draws one action index per row of `probs` (`[B, n_actions]`).
    pub fn sample<R: Rng>(probs: &Tensor, rng: &mut R) -> Result<Vec<usize>> {
        ensure!(probs.rank() == 2, "expected [B, n_actions] probabilities");
        let rows: Vec<Vec<f32>> = probs.to_vec2()?;
        rows.iter()
            .map(|row| -> Result<usize> {
                let distribution = WeightedIndex::new(row)?;
                Ok(distribution.sample(rng))
            })
            .collect()
    }

    /// Log probability of `actions` (`[B]`, u32) under `logits` (`[B, n_actions]`).
    pub fn log_probs(logits: &Tensor, actions: &Tensor) -> Result<Tensor> {
        let log_probs = log_softmax(logits, D::Minus1)?;
        let logps = log_probs.gather(&actions.unsqueeze(1)?, 1)?.squeeze(1)?;
        Ok(logps)
    }
}
