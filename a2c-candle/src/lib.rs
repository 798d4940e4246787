pub mod actor_critic;
pub mod checkpoint;
pub mod distributions;
pub mod optimizer;
pub mod policy;
pub mod tensors;
