use crate::{config::TrainConfig, hooks::training_hooks::TrainingHooks};
use a2c_agents::a2c::{
    A2C, A2CParams,
    hooks::{A2CHooks, DefaultA2CHooks},
};
use a2c_candle::{
    actor_critic::ActorCriticConfig,
    checkpoint::load_checkpoint_if_exists,
    optimizer::{OptimizerWithMaxGrad, adam},
    policy::{CandlePolicy, select_device},
};
use a2c_core::{
    env::{Env, Space},
    on_policy_algorithm::{LearningSchedule, OnPolicyAlgorithm, RolloutConfig},
};
use a2c_gym::{AtariEnv, EnvBuilderTrait, FramePreprocessor, GymEnvBuilder};
use anyhow::{Result, bail};
use tracing::info;

pub type A2CAlgorithm<E> = OnPolicyAlgorithm<AtariEnv<E>, A2C, TrainingHooks>;

pub struct A2CAlgoBuilder {
    pub config: TrainConfig,
    a2c_hooks: Option<Box<dyn A2CHooks>>,
}

impl A2CAlgoBuilder {
    pub fn new(config: TrainConfig) -> Self {
        Self {
            config,
            a2c_hooks: None,
        }
    }

    pub fn set_a2c_hooks(&mut self, hooks: Box<dyn A2CHooks>) {
        self.a2c_hooks = Some(hooks);
    }

    fn learning_schedule(&self) -> LearningSchedule {
        match self.config.total_steps {
            Some(total_steps) => LearningSchedule::total_step_bound(total_steps),
            None => LearningSchedule::episode_bound(self.config.n_episodes),
        }
    }

    /// Builds the gymnasium environment named in the config.
    pub fn build_gym(self) -> Result<A2CAlgorithm<a2c_gym::GymEnv>> {
        let env_builder = GymEnvBuilder::new(&self.config.env_name).render(self.config.render);
        self.build(env_builder)
    }

    pub fn build<EB: EnvBuilderTrait>(self, env_builder: EB) -> Result<A2CAlgorithm<EB::Env>> {
        self.config.validate()?;
        let learning_schedule = self.learning_schedule();
        let config = self.config;
        let device = select_device(&config.device)?;
        info!(env = %config.env_name, device = ?device, "building a2c trainer");

        let preprocessor = FramePreprocessor::new(config.frame_width, config.frame_height);
        let env = AtariEnv::new(env_builder.build_env()?, preprocessor, config.n_frames)?;
        let env_description = env.env_description();
        let Space::Discrete(n_actions) = env_description.action_space else {
            bail!("only discrete action spaces are supported");
        };
        let [channels, height, width] = env_description.observation_shape[..] else {
            bail!(
                "expected (C, H, W) observations, got {:?}",
                env_description.observation_shape
            );
        };

        let network_config = ActorCriticConfig::new(channels, height, width, n_actions);
        let mut policy = CandlePolicy::build(network_config, device, config.seed)?;
        if let Some(checkpoint) = &config.checkpoint {
            load_checkpoint_if_exists(&mut policy.varmap, checkpoint)?;
        }
        let optimizer = adam(&policy.varmap, config.learning_rate)?;
        let optimizer =
            OptimizerWithMaxGrad::new(optimizer, config.max_grad_norm, policy.varmap.clone());
        let mut hooks = TrainingHooks::new(learning_schedule, config.log_interval);
        if let Some(checkpoint) = &config.checkpoint {
            hooks = hooks.with_checkpoint(checkpoint.clone(), policy.varmap.clone());
        }
        let agent = A2C::new(
            policy,
            optimizer,
            A2CParams {
                gamma: config.gamma,
                sample_size: config.sample_size,
            },
            self.a2c_hooks.unwrap_or_else(|| Box::new(DefaultA2CHooks)),
        );
        let rollout_config = RolloutConfig {
            max_steps: config.max_episode_steps,
            render: config.render,
        };
        Ok(OnPolicyAlgorithm::new(
            env,
            agent,
            hooks,
            rollout_config,
            config.seed,
        ))
    }
}
