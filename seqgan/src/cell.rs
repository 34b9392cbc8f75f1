// Recurrent cell stack shared by the generator and the discriminator.
//
// A stack is `layer_count` GRU cells, each wrapped in dropout. Per cell and
// timestep, with `x` the layer input and `h` the previous state:
//
//   [r, z] = sigmoid([x, h]·W_g + b_g)
//   c      = softmax([x, r∘h]·W_c + b_c)
//   h'     = z∘h + (1 − z)∘c
//
// Softmax is the cell's activation (it replaces the usual tanh on the
// candidate); the gates stay sigmoid. Dropout keeps a cell's input with
// probability 0.9 and its output with probability 0.5, inverted-scaled,
// with a fresh mask every timestep. The recurrent state itself is never
// dropped. Dropout only happens when the caller passes a PRNG (training
// passes); inference passes are deterministic.
//
// `run` walks a whole sequence from a zero state. With length masks, a
// padded timestep leaves every layer's state unchanged and emits a zero
// output, so padding never influences later real timesteps.

use crate::error::Result;
use crate::params::{Linear, Param};
use candle_core::{D, DType, Device, Tensor};
use seqgan_prng::SeqRng;

/// Probability of keeping each element of a cell's input.
pub const INPUT_KEEP_PROB: f32 = 0.9;

/// Probability of keeping each element of a cell's output.
pub const OUTPUT_KEEP_PROB: f32 = 0.5;

/// One gated recurrent cell.
#[derive(Clone, Debug)]
pub struct GruCell {
    gates: Linear,
    candidate: Linear,
    units: usize,
}

impl GruCell {
    pub fn new(
        prefix: &str,
        input_size: usize,
        units: usize,
        rng: &mut SeqRng,
        device: &Device,
    ) -> Result<Self> {
        let gates = Linear::new(
            &format!("{prefix}/gates"),
            input_size + units,
            2 * units,
            true,
            rng,
            device,
        )?;
        let candidate = Linear::new(
            &format!("{prefix}/candidate"),
            input_size + units,
            units,
            true,
            rng,
            device,
        )?;
        Ok(GruCell {
            gates,
            candidate,
            units,
        })
    }

    /// Advance one timestep: `x` is `(batch, input)`, `h` is `(batch, units)`.
    pub fn step(&self, x: &Tensor, h: &Tensor) -> Result<Tensor> {
        let xh = Tensor::cat(&[x, h], 1)?;
        let gates = candle_nn::ops::sigmoid(&self.gates.forward(&xh)?)?;
        let r = gates.narrow(1, 0, self.units)?;
        let z = gates.narrow(1, self.units, self.units)?;

        let rh = r.mul(h)?;
        let x_rh = Tensor::cat(&[x, &rh], 1)?;
        let c = candle_nn::ops::softmax(&self.candidate.forward(&x_rh)?, D::Minus1)?;

        // z∘h + (1 − z)∘c, written as c + z∘(h − c).
        Ok(c.add(&z.mul(&h.sub(&c)?)?)?)
    }

    pub fn params(&self) -> Vec<Param> {
        let mut out = self.gates.params();
        out.extend(self.candidate.params());
        out
    }
}

/// `layer_count` dropout-wrapped GRU cells applied in sequence.
#[derive(Clone, Debug)]
pub struct CellStack {
    layers: Vec<GruCell>,
    units: usize,
}

impl CellStack {
    /// Build a stack whose first layer reads `input_size` features. Layer
    /// parameters are named `{prefix}/layer_{i}/…`.
    pub fn new(
        prefix: &str,
        input_size: usize,
        units: usize,
        layer_count: usize,
        rng: &mut SeqRng,
        device: &Device,
    ) -> Result<Self> {
        let mut layers = Vec::with_capacity(layer_count);
        for i in 0..layer_count {
            let layer_input = if i == 0 { input_size } else { units };
            layers.push(GruCell::new(
                &format!("{prefix}/layer_{i}"),
                layer_input,
                units,
                rng,
                device,
            )?);
        }
        Ok(CellStack { layers, units })
    }

    pub fn units(&self) -> usize {
        self.units
    }

    pub fn layer_count(&self) -> usize {
        self.layers.len()
    }

    /// Flat list of every layer's parameters, bottom layer first.
    pub fn params(&self) -> Vec<Param> {
        self.layers.iter().flat_map(|l| l.params()).collect()
    }

    pub fn zero_state(&self, batch: usize, device: &Device) -> Result<Vec<Tensor>> {
        self.layers
            .iter()
            .map(|_| Ok(Tensor::zeros((batch, self.units), DType::F32, device)?))
            .collect()
    }

    /// One timestep through every layer. Returns the top layer's output and
    /// the new per-layer states.
    pub fn step(
        &self,
        x: &Tensor,
        state: &[Tensor],
        mut dropout: Option<&mut SeqRng>,
    ) -> Result<(Tensor, Vec<Tensor>)> {
        let mut input = x.clone();
        let mut next_state = Vec::with_capacity(self.layers.len());
        for (cell, h) in self.layers.iter().zip(state) {
            let cell_input = match dropout.as_deref_mut() {
                Some(rng) => apply_dropout(&input, INPUT_KEEP_PROB, rng)?,
                None => input.clone(),
            };
            let h_new = cell.step(&cell_input, h)?;
            input = match dropout.as_deref_mut() {
                Some(rng) => apply_dropout(&h_new, OUTPUT_KEEP_PROB, rng)?,
                None => h_new.clone(),
            };
            next_state.push(h_new);
        }
        Ok((input, next_state))
    }

    /// Run the stack over a sequence given as one `(batch, input)` tensor
    /// per timestep, starting from a zero state. `masks`, when given, holds
    /// one `(batch, 1)` tensor of 1.0 (real) / 0.0 (padding) per timestep.
    pub fn run(
        &self,
        inputs: &[Tensor],
        masks: Option<&[Tensor]>,
        mut dropout: Option<&mut SeqRng>,
    ) -> Result<Vec<Tensor>> {
        let Some(first) = inputs.first() else {
            return Ok(Vec::new());
        };
        let batch = first.dim(0)?;
        let mut state = self.zero_state(batch, first.device())?;
        let mut outputs = Vec::with_capacity(inputs.len());

        for (t, x) in inputs.iter().enumerate() {
            let (out, next) = self.step(x, &state, dropout.as_deref_mut())?;
            match masks {
                Some(masks) => {
                    let mask = &masks[t];
                    outputs.push(out.broadcast_mul(mask)?);
                    state = next
                        .iter()
                        .zip(&state)
                        .map(|(new, old)| hold_padded(new, old, mask))
                        .collect::<Result<Vec<_>>>()?;
                }
                None => {
                    outputs.push(out);
                    state = next;
                }
            }
        }
        Ok(outputs)
    }
}

/// `old + mask∘(new − old)`: take the new state where the mask is 1.
fn hold_padded(new: &Tensor, old: &Tensor, mask: &Tensor) -> Result<Tensor> {
    Ok(old.add(&new.sub(old)?.broadcast_mul(mask)?)?)
}

/// Inverted dropout on a `(rows, cols)` tensor with a mask drawn from `rng`.
pub fn apply_dropout(xs: &Tensor, keep_prob: f32, rng: &mut SeqRng) -> Result<Tensor> {
    let (rows, cols) = xs.dims2()?;
    let scale = 1.0 / keep_prob;
    let mask: Vec<f32> = (0..rows * cols)
        .map(|_| if rng.next_f32() < keep_prob { scale } else { 0.0 })
        .collect();
    let mask = Tensor::from_vec(mask, (rows, cols), xs.device())?;
    Ok(xs.mul(&mask)?)
}

/// Per-timestep `(batch, 1)` masks: 1.0 while `t < lengths[i]`, else 0.0.
pub fn length_masks(lengths: &[usize], steps: usize, device: &Device) -> Result<Vec<Tensor>> {
    (0..steps)
        .map(|t| {
            let column: Vec<f32> = lengths
                .iter()
                .map(|&len| if t < len { 1.0 } else { 0.0 })
                .collect();
            Ok(Tensor::from_vec(column, (lengths.len(), 1), device)?)
        })
        .collect()
}

/// Split a `(batch, time, features)` tensor into per-timestep
/// `(batch, features)` tensors.
pub fn unstack_time(xs: &Tensor) -> Result<Vec<Tensor>> {
    let (_, time, _) = xs.dims3()?;
    (0..time)
        .map(|t| Ok(xs.narrow(1, t, 1)?.squeeze(1)?.contiguous()?))
        .collect()
}
