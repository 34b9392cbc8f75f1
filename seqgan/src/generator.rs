// Generator network: noise sequence in, feature sequence out.
//
//   noise (batch, time, 1)
//     -> shared input projection 1 -> units, ReLU
//     -> cell stack, length-masked
//     -> shared output projection units -> features (no bias), ReLU
//     -> (batch, time, features)
//
// The output projection carries no bias so that padded timesteps, where the
// stack emits zeros, stay exactly zero after projection.
//
// Every call starts from a zero recurrent state; state is not carried
// between calls.

use crate::cell::{CellStack, length_masks, unstack_time};
use crate::error::Result;
use crate::params::{Linear, Param};
use candle_core::{DType, Device, Tensor};
use seqgan_prng::SeqRng;

/// Name prefix of every generator parameter.
pub const GENERATOR_PREFIX: &str = "generator";

#[derive(Clone, Debug)]
pub struct Generator {
    input: Linear,
    cells: CellStack,
    output: Linear,
    feature_count: usize,
}

impl Generator {
    pub fn new(
        feature_count: usize,
        units: usize,
        layer_count: usize,
        rng: &mut SeqRng,
        device: &Device,
    ) -> Result<Self> {
        let input = Linear::new(&format!("{GENERATOR_PREFIX}/input"), 1, units, true, rng, device)?;
        let cells = CellStack::new(
            &format!("{GENERATOR_PREFIX}/cell"),
            units,
            units,
            layer_count,
            rng,
            device,
        )?;
        let output = Linear::new(
            &format!("{GENERATOR_PREFIX}/output"),
            units,
            feature_count,
            false,
            rng,
            device,
        )?;
        Ok(Generator {
            input,
            cells,
            output,
            feature_count,
        })
    }

    pub fn feature_count(&self) -> usize {
        self.feature_count
    }

    /// Map `noise` of shape `(batch, time, 1)` to `(batch, time, features)`.
    /// Timesteps at or beyond a sequence's entry in `lengths` produce zeros.
    /// Passing a PRNG enables dropout (training pass).
    pub fn forward(
        &self,
        noise: &Tensor,
        lengths: &[usize],
        dropout: Option<&mut SeqRng>,
    ) -> Result<Tensor> {
        let (batch, time, _) = noise.dims3()?;
        if time == 0 {
            return Ok(Tensor::zeros(
                (batch, 0, self.feature_count),
                DType::F32,
                noise.device(),
            )?);
        }

        let projected = self.input.forward_sequence(noise)?.relu()?;
        let steps = unstack_time(&projected)?;
        let masks = length_masks(lengths, time, noise.device())?;
        let hidden = self.cells.run(&steps, Some(&masks), dropout)?;
        let hidden = Tensor::stack(&hidden, 1)?;
        Ok(self.output.forward_sequence(&hidden)?.relu()?)
    }

    pub fn params(&self) -> Vec<Param> {
        let mut out = self.input.params();
        out.extend(self.cells.params());
        out.extend(self.output.params());
        out
    }
}
