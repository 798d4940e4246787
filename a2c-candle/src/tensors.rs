use a2c_core::env::Observation;
use anyhow::{Result, ensure};
use candle_core::{Device, Tensor};
use derive_more::{Deref, DerefMut, Display};

#[derive(Deref, DerefMut, Debug, Display)]
pub struct Returns(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display)]
pub struct Advantages(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display)]
pub struct Logps(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display)]
pub struct ValuesPred(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display)]
pub struct PolicyLoss(pub Tensor);

#[derive(Deref, DerefMut, Debug, Display)]
pub struct ValueLoss(pub Tensor);

pub fn observation_to_tensor(observation: &Observation, device: &Device) -> Result<Tensor> {
    let tensor = Tensor::from_slice(&observation.data, observation.shape.as_slice(), device)?;
    Ok(tensor)
}

/// Stacks observations of equal shape into a single batch along a new leading axis.
pub fn stack_observations(observations: &[Observation], device: &Device) -> Result<Tensor> {
    ensure!(!observations.is_empty(), "cannot stack zero observations");
    let shape = &observations[0].shape;
    let mut data = Vec::with_capacity(observations.len() * observations[0].len());
    for observation in observations {
        ensure!(
            &observation.shape == shape,
            "observation shape {:?} differs from {:?}",
            observation.shape,
            shape
        );
        data.extend_from_slice(&observation.data);
    }
    let mut dims = Vec::with_capacity(shape.len() + 1);
    dims.push(observations.len());
    dims.extend_from_slice(shape);
    Ok(Tensor::from_vec(data, dims, device)?)
}
