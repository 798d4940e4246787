use crate::{
    Algorithm,
    agents::{Agent, LearnStats},
    env::Env,
    policies::Actor,
    rollout_buffer::EpisodeBuffer,
};
use anyhow::Result;
use rand::{Rng, SeedableRng, rngs::StdRng};
use tracing::{debug, info};

macro_rules! break_on_hook_res {
    ($hook_res:expr) => {
        if $hook_res {
            break;
        }
    };
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum LearningSchedule {
    EpisodeBound {
        total_episodes: usize,
        current_episode: usize,
    },
    TotalStepBound {
        total_steps: usize,
        current_step: usize,
    },
}

impl LearningSchedule {
    pub fn episode_bound(total_episodes: usize) -> Self {
        Self::EpisodeBound {
            total_episodes,
            current_episode: 0,
        }
    }

    pub fn total_step_bound(total_steps: usize) -> Self {
        Self::TotalStepBound {
            total_steps,
            current_step: 0,
        }
    }

    /// Accounts for a finished episode, returns true once the schedule is exhausted.
    pub fn record_episode(&mut self, episode_len: usize) -> bool {
        match self {
            Self::EpisodeBound {
                total_episodes,
                current_episode,
            } => {
                *current_episode += 1;
                current_episode >= total_episodes
            }
            Self::TotalStepBound {
                total_steps,
                current_step,
            } => {
                // an episode that ended during reset still spends budget
                *current_step += episode_len.max(1);
                current_step >= total_steps
            }
        }
    }
}

/// Exponential moving average of the episode lengths.
#[derive(Debug, Clone, Copy)]
pub struct RunningLength {
    value: f32,
    decay: f32,
}

impl Default for RunningLength {
    fn default() -> Self {
        Self {
            value: 0.,
            decay: 0.99,
        }
    }
}

impl RunningLength {
    pub fn update(&mut self, episode_len: usize) -> f32 {
        self.value = self.value * self.decay + episode_len as f32 * (1. - self.decay);
        self.value
    }

    pub fn value(&self) -> f32 {
        self.value
    }
}

#[derive(Debug, Clone, Copy)]
pub struct EpisodeStats {
    /// 1 based
    pub episode: usize,
    pub length: usize,
    pub total_reward: f32,
    pub running_length: f32,
    pub losses: LearnStats,
}

pub trait OnPolicyAlgorithmHooks {
    fn init_hook(&mut self) -> bool;

    fn post_rollout_hook(&mut self, episode: &mut EpisodeBuffer) -> bool;

    fn post_training_hook(&mut self, stats: &EpisodeStats) -> bool;

    fn shutdown_hook(&mut self) -> Result<()>;
}

pub struct DefaultOnPolicyAlgorithmHooks {
    learning_schedule: LearningSchedule,
    log_interval: usize,
}

impl DefaultOnPolicyAlgorithmHooks {
    pub fn new(learning_schedule: LearningSchedule, log_interval: usize) -> Self {
        Self {
            learning_schedule,
            log_interval: log_interval.max(1),
        }
    }
}

impl OnPolicyAlgorithmHooks for DefaultOnPolicyAlgorithmHooks {
    fn init_hook(&mut self) -> bool {
        false
    }

    fn post_rollout_hook(&mut self, _episode: &mut EpisodeBuffer) -> bool {
        false
    }

    fn post_training_hook(&mut self, stats: &EpisodeStats) -> bool {
        if stats.episode % self.log_interval == 0 {
            info!(
                "Episode {}\tLast Length: {:5}\tAverage length: {:.2}",
                stats.episode, stats.length, stats.running_length
            );
        }
        self.learning_schedule.record_episode(stats.length)
    }

    fn shutdown_hook(&mut self) -> Result<()> {
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct RolloutConfig {
    pub max_steps: usize,
    pub render: bool,
}

impl Default for RolloutConfig {
    fn default() -> Self {
        Self {
            max_steps: 10_000,
            render: false,
        }
    }
}

/// Plays one episode, filling `buffer`. Returns the number of recorded steps.
pub fn run_episode<A: Actor, E: Env>(
    actor: &mut A,
    env: &mut E,
    buffer: &mut EpisodeBuffer,
    config: RolloutConfig,
    seed: u64,
) -> Result<usize> {
    let snapshot = env.reset(seed)?;
    let mut done = snapshot.done();
    let mut state = snapshot.state;
    let mut steps = 0;
    while !done && steps < config.max_steps {
        steps += 1;
        let action = actor.get_action(&state)?;
        let snapshot = env.step(action)?;
        done = snapshot.done();
        buffer.push_step(state, action, snapshot.reward);
        state = snapshot.state;
        if config.render {
            env.render()?;
        }
    }
    Ok(steps)
}

pub struct OnPolicyAlgorithm<E: Env, A: Agent, H: OnPolicyAlgorithmHooks> {
    pub env: E,
    pub agent: A,
    pub hooks: H,
    pub rollout_config: RolloutConfig,
    seed_rng: StdRng,
    running_length: RunningLength,
    episode_buffer: EpisodeBuffer,
    episode: usize,
}

impl<E: Env, A: Agent, H: OnPolicyAlgorithmHooks> OnPolicyAlgorithm<E, A, H> {
    pub fn new(env: E, agent: A, hooks: H, rollout_config: RolloutConfig, seed: u64) -> Self {
        Self {
            env,
            agent,
            hooks,
            rollout_config,
            seed_rng: StdRng::seed_from_u64(seed),
            running_length: RunningLength::default(),
            episode_buffer: EpisodeBuffer::default(),
            episode: 0,
        }
    }

    pub fn episodes_played(&self) -> usize {
        self.episode
    }

    pub fn running_length(&self) -> f32 {
        self.running_length.value()
    }
}

impl<E: Env, A: Agent, H: OnPolicyAlgorithmHooks> Algorithm for OnPolicyAlgorithm<E, A, H> {
    fn train(&mut self) -> Result<()> {
        if self.hooks.init_hook() {
            return Ok(());
        }
        loop {
            // rollout phase
            self.episode += 1;
            let seed = self.seed_rng.random::<u64>();
            let length = run_episode(
                self.agent.actor(),
                &mut self.env,
                &mut self.episode_buffer,
                self.rollout_config,
                seed,
            )?;
            let total_reward = self.episode_buffer.total_reward();
            debug!(episode = self.episode, length, total_reward, "episode collected");
            break_on_hook_res!(self.hooks.post_rollout_hook(&mut self.episode_buffer));

            // learning phase
            let losses = self.agent.learn(&mut self.episode_buffer)?;
            let stats = EpisodeStats {
                episode: self.episode,
                length,
                total_reward,
                running_length: self.running_length.update(length),
                losses,
            };
            break_on_hook_res!(self.hooks.post_training_hook(&stats));
        }
        self.hooks.shutdown_hook()
    }
}

#[cfg(test)]
mod test {
    use super::{
        DefaultOnPolicyAlgorithmHooks, EpisodeStats, LearningSchedule, OnPolicyAlgorithm,
        OnPolicyAlgorithmHooks, RolloutConfig, RunningLength, run_episode,
    };
    use crate::{
        Algorithm,
        agents::{Agent, LearnStats},
        env::{Env, EnvironmentDescription, Observation, SnapShot, Space},
        policies::Actor,
        rollout_buffer::EpisodeBuffer,
    };
    use anyhow::Result;
    use tracing_test::traced_test;

    /// Ends the episode after `episode_len` steps, rewarding every step with 1.
    struct CountdownEnv {
        episode_len: usize,
        remaining: usize,
        renders: usize,
    }

    impl CountdownEnv {
        fn new(episode_len: usize) -> Self {
            Self {
                episode_len,
                remaining: episode_len,
                renders: 0,
            }
        }

        fn snapshot(&self, reward: f32) -> SnapShot {
            SnapShot {
                state: Observation::from_vec(vec![self.remaining as f32]),
                reward,
                terminated: self.remaining == 0,
                trancuated: false,
            }
        }
    }

    impl Env for CountdownEnv {
        fn reset(&mut self, _seed: u64) -> Result<SnapShot> {
            self.remaining = self.episode_len;
            Ok(self.snapshot(0.))
        }

        fn step(&mut self, _action: usize) -> Result<SnapShot> {
            self.remaining -= 1;
            Ok(self.snapshot(1.))
        }

        fn env_description(&self) -> EnvironmentDescription {
            EnvironmentDescription::new(vec![1], Space::Discrete(2))
        }

        fn render(&mut self) -> Result<()> {
            self.renders += 1;
            Ok(())
        }
    }

    struct FixedActor;

    impl Actor for FixedActor {
        fn get_action(&mut self, _observation: &Observation) -> Result<usize> {
            Ok(1)
        }
    }

    #[derive(Default)]
    struct CountingAgent {
        actor: Option<FixedActor>,
        episode_lens: Vec<usize>,
    }

    impl Agent for CountingAgent {
        type Actor = FixedActor;

        fn actor(&mut self) -> &mut Self::Actor {
            self.actor.get_or_insert(FixedActor)
        }

        fn learn(&mut self, episode: &mut EpisodeBuffer) -> Result<LearnStats> {
            self.episode_lens.push(episode.len());
            episode.clear();
            Ok(LearnStats::default())
        }
    }

    #[test]
    fn episode_stops_when_env_is_done() -> Result<()> {
        let mut env = CountdownEnv::new(5);
        let mut buffer = EpisodeBuffer::default();
        let config = RolloutConfig {
            max_steps: 100,
            render: true,
        };
        let steps = run_episode(&mut FixedActor, &mut env, &mut buffer, config, 0)?;
        assert_eq!(steps, 5);
        assert_eq!(buffer.len(), 5);
        assert_eq!(buffer.actions, vec![1; 5]);
        assert_eq!(buffer.total_reward(), 5.);
        // the recorded state is the one the action was chosen in
        assert_eq!(buffer.states[0].data, vec![5.]);
        assert_eq!(env.renders, 5);
        Ok(())
    }

    #[test]
    fn episode_is_capped_at_max_steps() -> Result<()> {
        let mut env = CountdownEnv::new(50);
        let mut buffer = EpisodeBuffer::default();
        let config = RolloutConfig {
            max_steps: 7,
            render: false,
        };
        let steps = run_episode(&mut FixedActor, &mut env, &mut buffer, config, 0)?;
        assert_eq!(steps, 7);
        assert_eq!(env.renders, 0);
        Ok(())
    }

    #[test]
    fn episode_done_on_reset_records_nothing() -> Result<()> {
        let mut env = CountdownEnv::new(0);
        let mut buffer = EpisodeBuffer::default();
        let steps = run_episode(
            &mut FixedActor,
            &mut env,
            &mut buffer,
            RolloutConfig::default(),
            0,
        )?;
        assert_eq!(steps, 0);
        assert!(buffer.is_empty());
        Ok(())
    }

    #[test]
    fn running_length_is_exponential_average() {
        let mut running = RunningLength::default();
        assert!((running.update(100) - 1.).abs() < 1e-5);
        assert!((running.update(100) - 1.99).abs() < 1e-5);
        assert!((running.value() - 1.99).abs() < 1e-5);
    }

    #[test]
    fn schedules() {
        let mut by_episode = LearningSchedule::episode_bound(2);
        assert!(!by_episode.record_episode(10));
        assert!(by_episode.record_episode(10));

        let mut by_step = LearningSchedule::total_step_bound(25);
        assert!(!by_step.record_episode(10));
        assert!(!by_step.record_episode(10));
        assert!(by_step.record_episode(10));

        let mut empty_episodes = LearningSchedule::total_step_bound(2);
        assert!(!empty_episodes.record_episode(0));
        assert!(empty_episodes.record_episode(0));
    }

    #[test]
    fn training_runs_the_scheduled_episodes() -> Result<()> {
        let hooks = DefaultOnPolicyAlgorithmHooks::new(LearningSchedule::episode_bound(3), 1);
        let mut algo = OnPolicyAlgorithm::new(
            CountdownEnv::new(4),
            CountingAgent::default(),
            hooks,
            RolloutConfig::default(),
            0,
        );
        algo.train()?;
        assert_eq!(algo.episodes_played(), 3);
        assert_eq!(algo.agent.episode_lens, vec![4, 4, 4]);
        let expected = ((0. * 0.99 + 0.04) * 0.99 + 0.04) * 0.99 + 0.04;
        assert!((algo.running_length() - expected).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn step_budget_is_spent_by_episodes_that_end_on_reset() -> Result<()> {
        let hooks = DefaultOnPolicyAlgorithmHooks::new(LearningSchedule::total_step_bound(3), 1);
        let mut algo = OnPolicyAlgorithm::new(
            CountdownEnv::new(0),
            CountingAgent::default(),
            hooks,
            RolloutConfig::default(),
            0,
        );
        algo.train()?;
        assert_eq!(algo.episodes_played(), 3);
        assert_eq!(algo.agent.episode_lens, vec![0, 0, 0]);
        Ok(())
    }

    fn stats(episode: usize, length: usize, running_length: f32) -> EpisodeStats {
        EpisodeStats {
            episode,
            length,
            total_reward: length as f32,
            running_length,
            losses: LearnStats::default(),
        }
    }

    #[test]
    #[traced_test]
    fn progress_is_logged_every_log_interval() {
        let mut hooks =
            DefaultOnPolicyAlgorithmHooks::new(LearningSchedule::episode_bound(100), 2);
        assert!(!hooks.post_training_hook(&stats(1, 3, 0.03)));
        assert!(!hooks.post_training_hook(&stats(2, 7, 1.5)));
        assert!(!hooks.post_training_hook(&stats(3, 12, 2.25)));
        assert!(logs_contain(
            "Episode 2\tLast Length:     7\tAverage length: 1.50"
        ));
        assert!(!logs_contain("Episode 1\t"));
        assert!(!logs_contain("Episode 3\t"));
    }

    struct StopBeforeLearning;

    impl OnPolicyAlgorithmHooks for StopBeforeLearning {
        fn init_hook(&mut self) -> bool {
            false
        }

        fn post_rollout_hook(&mut self, episode: &mut EpisodeBuffer) -> bool {
            episode.len() > 0
        }

        fn post_training_hook(&mut self, _stats: &EpisodeStats) -> bool {
            true
        }

        fn shutdown_hook(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn post_rollout_hook_can_skip_learning() -> Result<()> {
        let mut algo = OnPolicyAlgorithm::new(
            CountdownEnv::new(2),
            CountingAgent::default(),
            StopBeforeLearning,
            RolloutConfig::default(),
            0,
        );
        algo.train()?;
        assert_eq!(algo.episodes_played(), 1);
        assert!(algo.agent.episode_lens.is_empty());
        Ok(())
    }
}
