// Trainable parameters and the affine projections built from them.
//
// Every trainable tensor is a `candle_core::Var` registered under a unique,
// slash-separated name (`generator/cell/layer_0/gates/weight`). Components
// expose their parameters through `params()`, and the two networks assemble
// them into a `ParamGroup` by plain composition. The generator group and the
// discriminator group are disjoint by construction (distinct name prefixes,
// distinct `Var`s), and each optimiser is handed exactly one group.
//
// Initialisation is truncated normal, std 0.1, for weights and biases alike,
// drawn from the session's `SeqRng` so seeded runs are reproducible.
//
// A group can be snapshotted to a name -> tensor map (what checkpoints
// store) and restored from one; restores check names and shapes.

use crate::error::{GanError, Result};
use candle_core::{Device, Tensor, Var};
use seqgan_prng::SeqRng;
use std::collections::HashMap;

/// Standard deviation of the truncated-normal initialiser.
pub const INIT_STDDEV: f32 = 0.1;

/// A named trainable tensor.
#[derive(Clone, Debug)]
pub struct Param {
    pub name: String,
    pub var: Var,
}

impl Param {
    /// Create a parameter of `shape` filled from the truncated-normal
    /// initialiser.
    pub fn truncated_normal(
        name: impl Into<String>,
        shape: &[usize],
        rng: &mut SeqRng,
        device: &Device,
    ) -> Result<Self> {
        let len: usize = shape.iter().product();
        let data: Vec<f32> = (0..len)
            .map(|_| rng.truncated_normal_f32(0.0, INIT_STDDEV))
            .collect();
        let tensor = Tensor::from_vec(data, shape, device)?;
        Ok(Param {
            name: name.into(),
            var: Var::from_tensor(&tensor)?,
        })
    }

    pub fn tensor(&self) -> &Tensor {
        self.var.as_tensor()
    }
}

/// An ordered, name-unique collection of parameters updated by one
/// optimiser.
#[derive(Clone, Debug)]
pub struct ParamGroup {
    name: String,
    params: Vec<Param>,
}

impl ParamGroup {
    pub fn new(name: impl Into<String>, params: Vec<Param>) -> Self {
        ParamGroup {
            name: name.into(),
            params,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }

    pub fn len(&self) -> usize {
        self.params.len()
    }

    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    pub fn get(&self, name: &str) -> Option<&Param> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Handles to the underlying variables (cheap clones sharing storage).
    pub fn vars(&self) -> Vec<Var> {
        self.params.iter().map(|p| p.var.clone()).collect()
    }

    /// Total number of scalar weights in the group.
    pub fn element_count(&self) -> usize {
        self.params.iter().map(|p| p.tensor().elem_count()).sum()
    }

    /// L2 norm over every weight in the group.
    pub fn norm(&self) -> Result<f32> {
        let mut sum_sq = 0.0f32;
        for p in &self.params {
            sum_sq += p.tensor().sqr()?.sum_all()?.to_scalar::<f32>()?;
        }
        Ok(sum_sq.sqrt())
    }

    /// Detached copies of every parameter, keyed by name.
    pub fn snapshot(&self) -> Result<HashMap<String, Tensor>> {
        let mut map = HashMap::with_capacity(self.params.len());
        for p in &self.params {
            map.insert(p.name.clone(), p.tensor().copy()?);
        }
        Ok(map)
    }

    /// Overwrite every parameter from `tensors`. Every name in the group
    /// must be present with a matching shape; extra entries are ignored
    /// (they belong to the other group).
    pub fn restore(&self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        for p in &self.params {
            let source = tensors
                .get(&p.name)
                .ok_or_else(|| GanError::MissingParameter(p.name.clone()))?;
            let expected = p.tensor().dims();
            if source.dims() != expected {
                return Err(GanError::ParameterShape {
                    name: p.name.clone(),
                    found: source.dims().to_vec(),
                    expected: expected.to_vec(),
                });
            }
            let source = source.to_device(p.tensor().device())?;
            p.var.set(&source)?;
        }
        Ok(())
    }
}

/// A shared affine map `x·W (+ b)` applied to the last axis.
#[derive(Clone, Debug)]
pub struct Linear {
    weight: Param,
    bias: Option<Param>,
    in_features: usize,
    out_features: usize,
}

impl Linear {
    pub fn new(
        prefix: &str,
        in_features: usize,
        out_features: usize,
        with_bias: bool,
        rng: &mut SeqRng,
        device: &Device,
    ) -> Result<Self> {
        let weight = Param::truncated_normal(
            format!("{prefix}/weight"),
            &[in_features, out_features],
            rng,
            device,
        )?;
        let bias = if with_bias {
            Some(Param::truncated_normal(
                format!("{prefix}/bias"),
                &[out_features],
                rng,
                device,
            )?)
        } else {
            None
        };
        Ok(Linear {
            weight,
            bias,
            in_features,
            out_features,
        })
    }

    pub fn in_features(&self) -> usize {
        self.in_features
    }

    pub fn out_features(&self) -> usize {
        self.out_features
    }

    /// Apply to a `(rows, in_features)` matrix.
    pub fn forward(&self, xs: &Tensor) -> Result<Tensor> {
        let ys = xs.contiguous()?.matmul(self.weight.tensor())?;
        match &self.bias {
            Some(b) => Ok(ys.broadcast_add(b.tensor())?),
            None => Ok(ys),
        }
    }

    /// Apply to every timestep of a `(batch, time, in_features)` tensor.
    pub fn forward_sequence(&self, xs: &Tensor) -> Result<Tensor> {
        let (batch, time, _) = xs.dims3()?;
        let flat = xs.reshape((batch * time, self.in_features))?;
        Ok(self
            .forward(&flat)?
            .reshape((batch, time, self.out_features))?)
    }

    pub fn params(&self) -> Vec<Param> {
        let mut out = vec![self.weight.clone()];
        if let Some(b) = &self.bias {
            out.push(b.clone());
        }
        out
    }
}
