use anyhow::{Result, ensure};
use candle_core::{D, Tensor};
use candle_nn::{
    BatchNorm, BatchNormConfig, Conv2d, Conv2dConfig, Linear, Module, ModuleT, VarBuilder,
    batch_norm, conv2d, linear, ops::softmax,
};

const KERNEL_SIZE: usize = 5;
const STRIDE: usize = 2;
const CONV_CHANNELS: [usize; 3] = [16, 32, 8];

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ActorCriticConfig {
    /// 3 channels per stacked RGB frame
    pub in_channels: usize,
    pub height: usize,
    pub width: usize,
    pub n_actions: usize,
}

impl ActorCriticConfig {
    pub fn new(in_channels: usize, height: usize, width: usize, n_actions: usize) -> Self {
        Self {
            in_channels,
            height,
            width,
            n_actions,
        }
    }

    /// Size of the flattened features after the conv stack.
    pub fn flat_dim(&self) -> Result<usize> {
        let mut height = self.height;
        let mut width = self.width;
        for _ in CONV_CHANNELS {
            ensure!(
                height >= KERNEL_SIZE && width >= KERNEL_SIZE,
                "input {}x{} is too small for the conv stack",
                self.height,
                self.width
            );
            height = conv_out(height);
            width = conv_out(width);
        }
        Ok(CONV_CHANNELS[CONV_CHANNELS.len() - 1] * height * width)
    }
}

fn conv_out(size: usize) -> usize {
    (size - KERNEL_SIZE) / STRIDE + 1
}

#[derive(Debug, Clone)]
struct ConvBlock {
    conv: Conv2d,
    bn: BatchNorm,
}

impl ConvBlock {
    fn new(in_channels: usize, out_channels: usize, vb: &VarBuilder, idx: usize) -> Result<Self> {
        let conv_cfg = Conv2dConfig {
            stride: STRIDE,
            ..Default::default()
        };
        let conv = conv2d(
            in_channels,
            out_channels,
            KERNEL_SIZE,
            conv_cfg,
            vb.pp(format!("conv{idx}")),
        )?;
        let bn = batch_norm(
            out_channels,
            BatchNormConfig::default(),
            vb.pp(format!("bn{idx}")),
        )?;
        Ok(Self { conv, bn })
    }

    fn forward_t(&self, xs: &Tensor, train: bool) -> candle_core::Result<Tensor> {
        let xs = self.conv.forward(xs)?;
        self.bn.forward_t(&xs, train)?.relu()
    }
}

/// Shared conv trunk with a policy head and a value head.
#[derive(Debug, Clone)]
pub struct ActorCritic {
    blocks: Vec<ConvBlock>,
    actor_head: Linear,
    critic_head: Linear,
    config: ActorCriticConfig,
}

impl ActorCritic {
    pub fn new(config: ActorCriticConfig, vb: &VarBuilder) -> Result<Self> {
        ensure!(config.in_channels > 0, "the network needs at least one input channel");
        ensure!(config.n_actions > 0, "the network needs at least one action");
        let flat_dim = config.flat_dim()?;
        let mut blocks = Vec::with_capacity(CONV_CHANNELS.len());
        let mut in_channels = config.in_channels;
        for (idx, out_channels) in CONV_CHANNELS.into_iter().enumerate() {
            blocks.push(ConvBlock::new(in_channels, out_channels, vb, idx + 1)?);
            in_channels = out_channels;
        }
        let actor_head = linear(flat_dim, config.n_actions, vb.pp("actor_head"))?;
        let critic_head = linear(flat_dim, 1, vb.pp("critic_head"))?;
        Ok(Self {
            blocks,
            actor_head,
            critic_head,
            config,
        })
    }

    pub fn config(&self) -> &ActorCriticConfig {
        &self.config
    }

    /// Returns the action logits `[B, n_actions]` and the state values `[B]`. A single
    /// `[C, H, W]` observation is treated as a batch of one.
    pub fn forward_t(&self, xs: &Tensor, train: bool) -> Result<(Tensor, Tensor)> {
        let xs = match xs.rank() {
            3 => xs.unsqueeze(0)?,
            4 => xs.clone(),
            rank => anyhow::bail!("expected a rank 3 or 4 input, got rank {rank}"),
        };
        let mut xs = xs;
        for block in self.blocks.iter() {
            xs = block.forward_t(&xs, train)?;
        }
        let features = xs.flatten_from(1)?;
        let logits = self.actor_head.forward(&features)?;
        let values = self.critic_head.forward(&features)?.squeeze(1)?;
        Ok((logits, values))
    }

    pub fn action_probs(&self, xs: &Tensor, train: bool) -> Result<(Tensor, Tensor)> {
        let (logits, values) = self.forward_t(xs, train)?;
        Ok((softmax(&logits, D::Minus1)?, values))
    }
}
