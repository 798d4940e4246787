use crate::env::Observation;
use anyhow::Result;

/// Anything that can pick a discrete action for an observation.
pub trait Actor {
    fn get_action(&mut self, observation: &Observation) -> Result<usize>;
}
