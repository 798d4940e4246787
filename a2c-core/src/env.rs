use anyhow::{Result, ensure};

#[derive(Debug, Clone, PartialEq)]
pub enum Space {
    Discrete(usize),
    Continous { size: usize },
}

impl Space {
    pub fn continous_from_dims(dims: &[usize]) -> Self {
        Self::Continous {
            size: dims.iter().product(),
        }
    }

    pub fn size(&self) -> usize {
        match &self {
            Self::Discrete(size) => *size,
            Self::Continous { size } => *size,
        }
    }
}

#[derive(Debug, Clone)]
pub struct EnvironmentDescription {
    /// Channel first, (C, H, W) for pixel environments
    pub observation_shape: Vec<usize>,
    pub action_space: Space,
}

impl EnvironmentDescription {
    pub fn new(observation_shape: Vec<usize>, action_space: Space) -> Self {
        Self {
            observation_shape,
            action_space,
        }
    }

    pub fn action_size(&self) -> usize {
        self.action_space.size()
    }

    pub fn observation_size(&self) -> usize {
        self.observation_shape.iter().product()
    }
}

/// Dense f32 storage of a single observation. Backends convert it into their own tensor type.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub data: Vec<f32>,
    pub shape: Vec<usize>,
}

impl Observation {
    pub fn new(data: Vec<f32>, shape: Vec<usize>) -> Result<Self> {
        let expected: usize = shape.iter().product();
        ensure!(
            data.len() == expected,
            "observation has {} values but shape {:?} needs {expected}",
            data.len(),
            shape
        );
        Ok(Self { data, shape })
    }

    pub fn from_vec(data: Vec<f32>) -> Self {
        let shape = vec![data.len()];
        Self { data, shape }
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Concatenates channel first observations along the channel axis.
    pub fn concat_channels(frames: &[Observation]) -> Result<Self> {
        let Some(first) = frames.first() else {
            anyhow::bail!("cannot concatenate an empty list of frames");
        };
        ensure!(
            first.shape.len() == 3,
            "expected (C, H, W) frames, got shape {:?}",
            first.shape
        );
        let (height, width) = (first.shape[1], first.shape[2]);
        let mut channels = 0;
        let mut data = Vec::with_capacity(first.len() * frames.len());
        for frame in frames {
            ensure!(
                frame.shape.len() == 3 && frame.shape[1] == height && frame.shape[2] == width,
                "frame shape {:?} does not match {:?}",
                frame.shape,
                first.shape
            );
            channels += frame.shape[0];
            data.extend_from_slice(&frame.data);
        }
        Ok(Self {
            data,
            shape: vec![channels, height, width],
        })
    }
}

#[derive(Debug, Clone)]
pub struct SnapShot {
    pub state: Observation,
    pub reward: f32,
    pub terminated: bool,
    pub trancuated: bool,
}

impl SnapShot {
    pub fn done(&self) -> bool {
        self.terminated || self.trancuated
    }
}

pub trait Env {
    /// Starts a new episode. The returned snapshot carries no reward, but it can already be done
    /// when the environment consumed frames while resetting.
    fn reset(&mut self, seed: u64) -> Result<SnapShot>;
    fn step(&mut self, action: usize) -> Result<SnapShot>;
    fn env_description(&self) -> EnvironmentDescription;

    fn render(&mut self) -> Result<()> {
        Ok(())
    }
}
