pub mod hooks;

use crate::HookResult;
use a2c_candle::{
    distributions::CategoricalDistribution,
    optimizer::{GradAccumulator, OptimizerWithMaxGrad},
    policy::CandlePolicy,
    tensors::{Advantages, Logps, PolicyLoss, Returns, ValueLoss, ValuesPred},
};
use a2c_core::{
    agents::{Agent, LearnStats},
    env::Observation,
    rollout_buffer::{EpisodeBuffer, discounted_returns, normalize_returns},
};
use anyhow::Result;
use candle_core::Tensor;
use hooks::A2CHooks;
use tracing::debug;

pub struct A2CParams {
    pub gamma: f32,
    /// Number of states per forward pass. Gradients of all chunks are summed into a single step.
    pub sample_size: Option<usize>,
}

impl Default for A2CParams {
    fn default() -> Self {
        Self {
            gamma: 0.99,
            sample_size: None,
        }
    }
}

/// REINFORCE with a learned state value baseline, updated once per episode.
pub struct A2C {
    pub policy: CandlePolicy,
    pub optimizer: OptimizerWithMaxGrad,
    pub params: A2CParams,
    pub hooks: Box<dyn A2CHooks>,
}

impl A2C {
    pub fn new(
        policy: CandlePolicy,
        optimizer: OptimizerWithMaxGrad,
        params: A2CParams,
        hooks: Box<dyn A2CHooks>,
    ) -> Self {
        Self {
            policy,
            optimizer,
            params,
            hooks,
        }
    }

    /// Builds the policy and value losses of a slice of the episode. States are re-evaluated the
    /// way they were acted on, and the advantage uses detached values, so the critic is trained by
    /// the value loss only.
    pub fn losses(
        &self,
        states: &[Observation],
        actions: &[usize],
        returns: &[f32],
    ) -> Result<(PolicyLoss, ValueLoss)> {
        let device = &self.policy.device;
        let actions: Vec<u32> = actions.iter().map(|a| *a as u32).collect();
        let actions = Tensor::from_vec(actions, states.len(), device)?;
        let returns = Returns(Tensor::from_slice(returns, states.len(), device)?);

        let (logits, values) = self.policy.evaluate(states)?;
        let logps = Logps(CategoricalDistribution::log_probs(&logits, &actions)?);
        let values = ValuesPred(values);
        let advantages = Advantages(returns.sub(&values.detach())?);

        let policy_loss = PolicyLoss(advantages.mul(&logps)?.neg()?.sum_all()?);
        let value_loss = ValueLoss(values.sub(&returns)?.sqr()?.sum_all()?);
        Ok((policy_loss, value_loss))
    }

    fn learning_step(&mut self, episode: &EpisodeBuffer, returns: &[f32]) -> Result<LearnStats> {
        let episode_len = episode.len();
        let chunk_size = self.params.sample_size.unwrap_or(episode_len).max(1);
        let mut accumulator = GradAccumulator::default();
        let mut stats = LearnStats::default();
        for start in (0..episode_len).step_by(chunk_size) {
            let end = (start + chunk_size).min(episode_len);
            let (policy_loss, value_loss) = self.losses(
                &episode.states[start..end],
                &episode.actions[start..end],
                &returns[start..end],
            )?;
            stats.policy_loss += policy_loss.to_scalar::<f32>()?;
            stats.value_loss += value_loss.to_scalar::<f32>()?;
            let loss = policy_loss.add(&value_loss)?;
            accumulator.accumulate(loss.backward()?, &self.policy.varmap)?;
        }
        if let Some(grads) = accumulator.take() {
            self.optimizer.step_with_grads(grads)?;
        }
        Ok(stats)
    }
}

impl Agent for A2C {
    type Actor = CandlePolicy;

    fn actor(&mut self) -> &mut Self::Actor {
        &mut self.policy
    }

    fn learn(&mut self, episode: &mut EpisodeBuffer) -> Result<LearnStats> {
        if episode.is_empty() {
            return Ok(LearnStats::default());
        }
        let mut returns = discounted_returns(&episode.rewards, self.params.gamma);
        normalize_returns(&mut returns, f32::EPSILON);
        let stats = match self.hooks.before_learning_hook(episode, &mut returns)? {
            HookResult::Continue => self.learning_step(episode, &returns)?,
            HookResult::Break => LearnStats::default(),
        };
        debug!(
            policy_loss = stats.policy_loss,
            value_loss = stats.value_loss,
            "a2c update"
        );
        episode.clear();
        Ok(stats)
    }
}

#[cfg(test)]
mod test {
    use super::{A2C, A2CParams, hooks::DefaultA2CHooks};
    use crate::HookResult;
    use a2c_candle::{
        actor_critic::ActorCriticConfig,
        optimizer::{OptimizerWithMaxGrad, adam},
        policy::CandlePolicy,
    };
    use a2c_core::{agents::Agent, env::Observation, rollout_buffer::EpisodeBuffer};
    use anyhow::Result;
    use candle_core::{D, Device, Tensor};
    use candle_nn::ops::{log_softmax, softmax};

    const SIDE: usize = 40;

    fn agent(lr: f64, params: A2CParams) -> Result<A2C> {
        let config = ActorCriticConfig::new(3, SIDE, SIDE, 2);
        let policy = CandlePolicy::build(config, Device::Cpu, 0)?;
        let optimizer = adam(&policy.varmap, lr)?;
        let optimizer = OptimizerWithMaxGrad::new(optimizer, None, policy.varmap.clone());
        Ok(A2C::new(policy, optimizer, params, Box::new(DefaultA2CHooks)))
    }

    fn frame(fill: impl Fn(usize) -> f32) -> Result<Observation> {
        let data = (0..3 * SIDE * SIDE).map(fill).collect();
        Observation::new(data, vec![3, SIDE, SIDE])
    }

    /// Action 1 pays 1, action 0 pays nothing. Every state looks the same.
    fn bandit_episode(len: usize) -> Result<EpisodeBuffer> {
        let mut episode = EpisodeBuffer::default();
        for i in 0..len {
            let action = i % 2;
            episode.push_step(frame(|_| 50.)?, action, action as f32);
        }
        Ok(episode)
    }

    fn action_one_prob(a2c: &A2C) -> Result<f32> {
        let (logits, _) = a2c.policy.forward_observation(&frame(|_| 50.)?)?;
        let probs = softmax(&logits, D::Minus1)?.squeeze(0)?;
        Ok(probs.to_vec1::<f32>()?[1])
    }

    fn textured(step: usize) -> Result<Observation> {
        frame(|i| ((i * 7 + step * 13) % 255) as f32)
    }

    #[test]
    fn rewarded_action_becomes_more_likely() -> Result<()> {
        let mut a2c = agent(
            0.05,
            A2CParams {
                gamma: 0.,
                sample_size: None,
            },
        )?;
        let before = action_one_prob(&a2c)?;
        for _ in 0..20 {
            let mut episode = bandit_episode(8)?;
            a2c.learn(&mut episode)?;
            assert!(episode.is_empty());
        }
        let after = action_one_prob(&a2c)?;
        assert!(after > before, "{after} <= {before}");
        assert!(after > 0.6);
        Ok(())
    }

    #[test]
    fn critic_is_trained_by_the_value_loss_only() -> Result<()> {
        let a2c = agent(0.01, A2CParams::default())?;
        let states: Vec<Observation> = (0..6).map(textured).collect::<Result<_>>()?;
        let actions = [0, 1, 1, 0, 1, 0];
        let returns = [1., -0.5, 0.3, 0.2, -1., 0.];
        let (policy_loss, value_loss) = a2c.losses(&states, &actions, &returns)?;
        let total = policy_loss.add(&value_loss)?;

        let data = a2c.policy.varmap.data().lock().map_err(|e| anyhow::anyhow!("{e}"))?;
        let critic_weight = data["critic_head.weight"].as_tensor().clone();
        let actor_weight = data["actor_head.weight"].as_tensor().clone();
        drop(data);

        let total_grads = total.backward()?;
        let value_grads = value_loss.backward()?;
        let policy_grads = policy_loss.backward()?;

        let from_total = total_grads.get(&critic_weight).expect("critic grad");
        let from_value = value_grads.get(&critic_weight).expect("critic grad");
        let diff = (from_total - from_value)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert!(diff < 1e-5);
        assert!(policy_grads.get(&critic_weight).is_none());
        assert!(policy_grads.get(&actor_weight).is_some());
        Ok(())
    }

    #[test]
    fn losses_match_the_reinforce_formula() -> Result<()> {
        let a2c = agent(0.01, A2CParams::default())?;
        let states: Vec<Observation> = (0..3).map(textured).collect::<Result<_>>()?;
        let actions = [1, 0, 1];
        let returns = [0.5f32, -1., 0.25];
        let (policy_loss, value_loss) = a2c.losses(&states, &actions, &returns)?;

        // every term uses the distribution the state was acted on with
        let mut expected_policy = 0.;
        let mut expected_value = 0.;
        for (i, state) in states.iter().enumerate() {
            let (logits, value) = a2c.policy.forward_observation(state)?;
            let log_probs: Vec<f32> = log_softmax(&logits, D::Minus1)?.squeeze(0)?.to_vec1()?;
            let value = value.to_vec1::<f32>()?[0];
            expected_policy -= log_probs[actions[i]] * (returns[i] - value);
            expected_value += (value - returns[i]).powi(2);
        }
        assert!((policy_loss.to_scalar::<f32>()? - expected_policy).abs() < 1e-4);
        assert!((value_loss.to_scalar::<f32>()? - expected_value).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn chunked_losses_do_not_depend_on_chunk_size() -> Result<()> {
        let a2c = agent(0.01, A2CParams::default())?;
        let states: Vec<Observation> = (0..4).map(textured).collect::<Result<_>>()?;
        let actions = [0, 1, 1, 0];
        let returns = [1f32, -0.5, 0.25, -0.75];
        let (whole_policy, whole_value) = a2c.losses(&states, &actions, &returns)?;
        let (head_policy, head_value) = a2c.losses(&states[..2], &actions[..2], &returns[..2])?;
        let (tail_policy, tail_value) = a2c.losses(&states[2..], &actions[2..], &returns[2..])?;
        let split_policy = head_policy.to_scalar::<f32>()? + tail_policy.to_scalar::<f32>()?;
        let split_value = head_value.to_scalar::<f32>()? + tail_value.to_scalar::<f32>()?;
        assert!((whole_policy.to_scalar::<f32>()? - split_policy).abs() < 1e-4);
        assert!((whole_value.to_scalar::<f32>()? - split_value).abs() < 1e-4);
        Ok(())
    }

    #[test]
    fn empty_episode_is_a_no_op() -> Result<()> {
        let mut a2c = agent(0.1, A2CParams::default())?;
        let input = Tensor::ones((1, 3, SIDE, SIDE), candle_core::DType::F32, &Device::Cpu)?;
        let (before, _) = a2c.policy.network.forward_t(&input, false)?;
        let stats = a2c.learn(&mut EpisodeBuffer::default())?;
        let (after, _) = a2c.policy.network.forward_t(&input, false)?;
        let diff = (before - after)?.abs()?.max_all()?.to_scalar::<f32>()?;
        assert_eq!(diff, 0.);
        assert_eq!(stats, Default::default());
        Ok(())
    }

    #[test]
    fn chunked_learning_reports_summed_losses() -> Result<()> {
        let mut a2c = agent(
            0.01,
            A2CParams {
                gamma: 0.9,
                sample_size: Some(3),
            },
        )?;
        let mut episode = bandit_episode(7)?;
        let stats = a2c.learn(&mut episode)?;
        assert!(episode.is_empty());
        assert!(stats.value_loss > 0.);
        assert!(stats.policy_loss.is_finite());
        Ok(())
    }

    #[test]
    fn hook_can_drop_an_episode() -> Result<()> {
        let mut a2c = agent(0.1, A2CParams::default())?;
        a2c.hooks = Box::new(
            |episode: &mut EpisodeBuffer, returns: &mut Vec<f32>| -> Result<HookResult> {
                assert_eq!(episode.len(), returns.len());
                Ok(HookResult::Break)
            },
        );
        let mut episode = bandit_episode(4)?;
        let stats = a2c.learn(&mut episode)?;
        assert_eq!(stats, Default::default());
        assert!(episode.is_empty());
        Ok(())
    }
}
