// Per-group optimisation: backprop, global-norm clipping, Adam step.
//
// A `GroupOptimizer` owns one `ParamGroup` and an Adam state over exactly
// that group's variables. Backprop of a loss produces gradients for every
// variable in the graph, but clipping and the update only ever look at the
// owned group, so the generator optimizer never moves discriminator weights
// and vice versa.
//
// Clipping follows the usual global-norm rule: with N the L2 norm over all of
// the group's gradients, every gradient is scaled by `max_norm / N` when
// N exceeds `max_norm`.

use crate::error::Result;
use crate::params::ParamGroup;
use candle_core::Tensor;
use candle_core::backprop::GradStore;
use candle_nn::{AdamW, Optimizer, ParamsAdamW};

/// Global gradient-norm ceiling applied to both groups.
pub const MAX_GRAD_NORM: f32 = 50.0;

/// Scale the gradients of `group` in `grads` so their global norm is at most
/// `max_norm`. Returns the norm before clipping. Gradients of variables
/// outside the group are left untouched.
pub fn clip_grad_norm(grads: &mut GradStore, group: &ParamGroup, max_norm: f32) -> Result<f32> {
    let mut total_sq = 0.0f32;
    for p in group.params() {
        if let Some(g) = grads.get(p.tensor()) {
            total_sq += g.sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
    }
    let norm = total_sq.sqrt();

    if norm > max_norm {
        let scale = f64::from(max_norm / norm);
        for p in group.params() {
            if let Some(g) = grads.remove(p.tensor()) {
                grads.insert(p.tensor(), g.affine(scale, 0.0)?);
            }
        }
    }
    Ok(norm)
}

/// Adam over a single parameter group.
pub struct GroupOptimizer {
    group: ParamGroup,
    adam: AdamW,
    max_grad_norm: f32,
}

impl GroupOptimizer {
    /// Adam with the standard moments (β1 0.9, β2 0.999, ε 1e-8) and no
    /// weight decay.
    pub fn new(group: ParamGroup, learning_rate: f64) -> Result<Self> {
        let params = ParamsAdamW {
            lr: learning_rate,
            weight_decay: 0.0,
            ..ParamsAdamW::default()
        };
        let adam = AdamW::new(group.vars(), params)?;
        Ok(GroupOptimizer {
            group,
            adam,
            max_grad_norm: MAX_GRAD_NORM,
        })
    }

    pub fn group(&self) -> &ParamGroup {
        &self.group
    }

    pub fn learning_rate(&self) -> f64 {
        self.adam.learning_rate()
    }

    /// Backprop `loss` and clip this group's gradients. Returns the gradient
    /// store and the pre-clip global norm.
    pub fn gradients(&self, loss: &Tensor) -> Result<(GradStore, f32)> {
        let mut grads = loss.backward()?;
        let norm = clip_grad_norm(&mut grads, &self.group, self.max_grad_norm)?;
        Ok((grads, norm))
    }

    /// Apply one Adam update from already-clipped gradients.
    pub fn apply(&mut self, grads: &GradStore) -> Result<()> {
        self.adam.step(grads)?;
        Ok(())
    }

    /// Backprop, clip and update in one go. Returns the pre-clip norm.
    pub fn step(&mut self, loss: &Tensor) -> Result<f32> {
        let (grads, norm) = self.gradients(loss)?;
        self.apply(&grads)?;
        Ok(norm)
    }
}
