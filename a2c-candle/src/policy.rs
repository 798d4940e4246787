use crate::{
    actor_critic::{ActorCritic, ActorCriticConfig},
    distributions::CategoricalDistribution,
    tensors::observation_to_tensor,
};
use a2c_core::{env::Observation, policies::Actor};
use anyhow::{Result, bail, ensure};
use candle_core::{D, DType, Device, Tensor};
use candle_nn::{VarBuilder, VarMap, ops::softmax};
use rand::{SeedableRng, rngs::StdRng};

/// The actor-critic network together with the variables it owns and the rng used for sampling.
pub struct CandlePolicy {
    pub network: ActorCritic,
    pub varmap: VarMap,
    pub device: Device,
    rng: StdRng,
    /// Batch norm normalizes with the statistics of the single acted frame when true.
    train_mode_rollouts: bool,
}

impl CandlePolicy {
    pub fn build(config: ActorCriticConfig, device: Device, seed: u64) -> Result<Self> {
        let varmap = VarMap::new();
        let vb = VarBuilder::from_varmap(&varmap, DType::F32, &device);
        let network = ActorCritic::new(config, &vb)?;
        Ok(Self {
            network,
            varmap,
            device,
            rng: StdRng::seed_from_u64(seed),
            train_mode_rollouts: true,
        })
    }

    /// Uses the running batch norm statistics instead of the per-frame ones while acting.
    pub fn eval_rollouts(mut self) -> Self {
        self.train_mode_rollouts = false;
        self
    }

    /// Logits `[1, n_actions]` and value `[1]` of a single observation, exactly as seen when
    /// acting.
    pub fn forward_observation(&self, observation: &Observation) -> Result<(Tensor, Tensor)> {
        let state = observation_to_tensor(observation, &self.device)?;
        self.network.forward_t(&state, self.train_mode_rollouts)
    }

    /// Re-evaluates recorded states one at a time so batch norm sees the same statistics it saw
    /// while acting. Returns logits `[B, n_actions]` and values `[B]`.
    pub fn evaluate(&self, states: &[Observation]) -> Result<(Tensor, Tensor)> {
        ensure!(!states.is_empty(), "cannot evaluate zero states");
        let mut logits = Vec::with_capacity(states.len());
        let mut values = Vec::with_capacity(states.len());
        for state in states {
            let (state_logits, state_value) = self.forward_observation(state)?;
            logits.push(state_logits);
            values.push(state_value);
        }
        Ok((Tensor::cat(&logits, 0)?, Tensor::cat(&values, 0)?))
    }
}

impl Actor for CandlePolicy {
    fn get_action(&mut self, observation: &Observation) -> Result<usize> {
        let (logits, _) = self.forward_observation(observation)?;
        let probs = softmax(&logits.detach(), D::Minus1)?;
        let actions = CategoricalDistribution::sample(&probs, &mut self.rng)?;
        match actions.as_slice() {
            [action] => Ok(*action),
            _ => bail!("expected a single action, sampled {}", actions.len()),
        }
    }
}

pub fn select_device(device: &str) -> Result<Device> {
    let device = match device {
        "cpu" => Device::Cpu,
        "cuda" => Device::new_cuda(0)?,
        "auto" => Device::cuda_if_available(0)?,
        other => bail!("unknown device {other}, expected cpu, cuda or auto"),
    };
    Ok(device)
}
