// Discriminator network: scores every timestep of a sequence as real or fake.
//
//   sequence (batch, time, features)
//     -> shared input projection features -> units, ReLU
//     -> forward stack over t = 0..T and backward stack over t = T..0
//     -> concat along features: 2·units
//     -> shared output projection 2·units -> 1, sigmoid
//     -> (batch, time, 1) in (0, 1)
//
// The forward and backward stacks are independent instances with their own
// parameters. The discriminator reads whole padded sequences: padded
// timesteps are scored too, like every other timestep.
//
// One `Discriminator` value is used for both the real and the generated
// batch of a training step, so both scores come from the same weights.

use crate::cell::{CellStack, unstack_time};
use crate::error::Result;
use crate::params::{Linear, Param};
use candle_core::{DType, Device, Tensor};
use seqgan_prng::SeqRng;

/// Name prefix of every discriminator parameter.
pub const DISCRIMINATOR_PREFIX: &str = "discriminator";

#[derive(Clone, Debug)]
pub struct Discriminator {
    input: Linear,
    forward_cells: CellStack,
    backward_cells: CellStack,
    output: Linear,
}

impl Discriminator {
    pub fn new(
        feature_count: usize,
        units: usize,
        layer_count: usize,
        rng: &mut SeqRng,
        device: &Device,
    ) -> Result<Self> {
        let input = Linear::new(
            &format!("{DISCRIMINATOR_PREFIX}/input"),
            feature_count,
            units,
            true,
            rng,
            device,
        )?;
        let forward_cells = CellStack::new(
            &format!("{DISCRIMINATOR_PREFIX}/forward"),
            units,
            units,
            layer_count,
            rng,
            device,
        )?;
        let backward_cells = CellStack::new(
            &format!("{DISCRIMINATOR_PREFIX}/backward"),
            units,
            units,
            layer_count,
            rng,
            device,
        )?;
        let output = Linear::new(
            &format!("{DISCRIMINATOR_PREFIX}/output"),
            2 * units,
            1,
            true,
            rng,
            device,
        )?;
        Ok(Discriminator {
            input,
            forward_cells,
            backward_cells,
            output,
        })
    }

    /// Score `sequences` of shape `(batch, time, features)`. Passing a PRNG
    /// enables dropout in both stacks.
    pub fn forward(&self, sequences: &Tensor, mut dropout: Option<&mut SeqRng>) -> Result<Tensor> {
        let (batch, time, _) = sequences.dims3()?;
        if time == 0 {
            return Ok(Tensor::zeros((batch, 0, 1), DType::F32, sequences.device())?);
        }

        let projected = self.input.forward_sequence(sequences)?.relu()?;
        let steps = unstack_time(&projected)?;

        let forward = self.forward_cells.run(&steps, None, dropout.as_deref_mut())?;

        let reversed: Vec<Tensor> = steps.iter().rev().cloned().collect();
        let mut backward = self.backward_cells.run(&reversed, None, dropout)?;
        backward.reverse();

        let forward = Tensor::stack(&forward, 1)?;
        let backward = Tensor::stack(&backward, 1)?;
        let both = Tensor::cat(&[&forward, &backward], 2)?;

        let logits = self.output.forward_sequence(&both)?;
        Ok(candle_nn::ops::sigmoid(&logits)?)
    }

    pub fn params(&self) -> Vec<Param> {
        let mut out = self.input.params();
        out.extend(self.forward_cells.params());
        out.extend(self.backward_cells.params());
        out.extend(self.output.params());
        out
    }
}
