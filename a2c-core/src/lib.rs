pub mod agents;
pub mod env;
pub mod on_policy_algorithm;
pub mod policies;
pub mod rollout_buffer;

use anyhow::Result;

pub trait Algorithm {
    fn train(&mut self) -> Result<()>;
}
