use anyhow::Result;
use candle_core::{Tensor, backprop::GradStore};
use candle_nn::{AdamW, Optimizer, ParamsAdamW, VarMap};
use std::fmt::Debug;

/// Adam is AdamW without weight decay.
pub fn adam(varmap: &VarMap, learning_rate: f64) -> Result<AdamW> {
    let params = ParamsAdamW {
        lr: learning_rate,
        weight_decay: 0.,
        ..Default::default()
    };
    Ok(AdamW::new(varmap.all_vars(), params)?)
}

fn clip_grad(grad_store: &mut GradStore, varmap: &VarMap, max_norm: f32) -> Result<f32> {
    let mut total_norm_squared = 0.0f32;
    let all_vars = varmap.all_vars();
    for var in all_vars.iter() {
        if let Some(grad) = grad_store.get(var) {
            total_norm_squared += grad.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let total_norm = total_norm_squared.sqrt();
    if total_norm > max_norm {
        let clip_coef = (max_norm / (total_norm + 1e-6)) as f64;
        for var in all_vars.iter() {
            if let Some(old_grad) = grad_store.get(var) {
                let new_grad = old_grad.affine(clip_coef, 0.)?;
                grad_store.insert(var, new_grad);
            }
        }
    }
    Ok(total_norm)
}

/// Sums gradients of several backward passes so they can be applied in one optimizer step.
#[derive(Default)]
pub struct GradAccumulator {
    grads: Option<GradStore>,
}

impl GradAccumulator {
    pub fn accumulate(&mut self, grads: GradStore, varmap: &VarMap) -> Result<()> {
        let Some(acc) = self.grads.as_mut() else {
            self.grads = Some(grads);
            return Ok(());
        };
        for var in varmap.all_vars().iter() {
            let Some(grad) = grads.get(var) else {
                continue;
            };
            let summed = match acc.get(var) {
                Some(prev) => prev.add(grad)?,
                None => grad.clone(),
            };
            acc.insert(var, summed);
        }
        Ok(())
    }

    pub fn take(&mut self) -> Option<GradStore> {
        self.grads.take()
    }
}

pub struct OptimizerWithMaxGrad {
    pub optimizer: AdamW,
    pub max_grad_norm: Option<f32>,
    pub varmap: VarMap,
}

impl Debug for OptimizerWithMaxGrad {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OptimizerWithMaxGrad")
            .field("learning_rate", &self.optimizer.learning_rate())
            .field("max_grad_norm", &self.max_grad_norm)
            .finish()
    }
}

impl OptimizerWithMaxGrad {
    pub fn new(optimizer: AdamW, max_grad_norm: Option<f32>, varmap: VarMap) -> Self {
        Self {
            optimizer,
            max_grad_norm,
            varmap,
        }
    }

    pub fn learning_rate(&self) -> f64 {
        self.optimizer.learning_rate()
    }

    pub fn backward_step(&mut self, loss: &Tensor) -> Result<()> {
        let grads = loss.backward()?;
        self.step_with_grads(grads)
    }

    pub fn step_with_grads(&mut self, mut grads: GradStore) -> Result<()> {
        if let Some(max_norm) = self.max_grad_norm {
            let norm = clip_grad(&mut grads, &self.varmap, max_norm)?;
            tracing::trace!(grad_norm = norm, "gradient norm before clipping");
        }
        self.optimizer.step(&grads)?;
        Ok(())
    }
}
