use crate::env::Observation;

/// Everything one episode produced, in step order.
#[derive(Debug, Default, Clone)]
pub struct EpisodeBuffer {
    pub states: Vec<Observation>,
    pub actions: Vec<usize>,
    pub rewards: Vec<f32>,
}

impl EpisodeBuffer {
    pub fn push_step(&mut self, state: Observation, action: usize, reward: f32) {
        self.states.push(state);
        self.actions.push(action);
        self.rewards.push(reward);
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn total_reward(&self) -> f32 {
        self.rewards.iter().sum()
    }

    pub fn clear(&mut self) {
        self.states.clear();
        self.actions.clear();
        self.rewards.clear();
    }
}

/// Discounted reward-to-go for every step: R_t = r_t + gamma * R_{t+1}, with R_T = 0.
pub fn discounted_returns(rewards: &[f32], gamma: f32) -> Vec<f32> {
    let mut returns = vec![0.; rewards.len()];
    let mut running = 0f32;
    for (i, reward) in rewards.iter().enumerate().rev() {
        running = reward + gamma * running;
        returns[i] = running;
    }
    returns
}

/// Standardizes the returns with the unbiased standard deviation. A single return has no spread
/// and ends up at zero.
pub fn normalize_returns(returns: &mut [f32], eps: f32) {
    let n = returns.len();
    if n == 0 {
        return;
    }
    let mean = returns.iter().sum::<f32>() / n as f32;
    let std = if n > 1 {
        let variance = returns.iter().map(|x| (x - mean).powi(2)).sum::<f32>() / (n - 1) as f32;
        variance.sqrt()
    } else {
        0.
    };
    for x in returns.iter_mut() {
        *x = (*x - mean) / (std + eps);
    }
}
