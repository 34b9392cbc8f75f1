// The adversarial model: one generator, one discriminator, fixed shapes.
//
// `SequenceGan` owns both networks and exposes them as two disjoint
// parameter groups. It also knows how to run one batch through the full
// adversarial graph (noise -> G -> D on fake, D on real -> losses); the
// training loop decides what to do with the resulting losses.

use crate::batch::SequenceBatch;
use crate::config::ModelConfig;
use crate::discriminator::{DISCRIMINATOR_PREFIX, Discriminator};
use crate::error::Result;
use crate::generator::{GENERATOR_PREFIX, Generator};
use crate::loss::BatchLosses;
use crate::params::ParamGroup;
use candle_core::{Device, Tensor};
use seqgan_prng::SeqRng;
use std::collections::HashMap;

#[derive(Debug)]
pub struct SequenceGan {
    config: ModelConfig,
    generator: Generator,
    discriminator: Discriminator,
    device: Device,
}

impl SequenceGan {
    /// Build both networks with freshly initialised parameters drawn from
    /// `rng`. The configuration is validated first.
    pub fn new(config: ModelConfig, rng: &mut SeqRng, device: &Device) -> Result<Self> {
        config.validate()?;
        let generator = Generator::new(
            config.feature_count,
            config.recurrent_units,
            config.layer_count,
            rng,
            device,
        )?;
        let discriminator = Discriminator::new(
            config.feature_count,
            config.recurrent_units,
            config.layer_count,
            rng,
            device,
        )?;
        Ok(SequenceGan {
            config,
            generator,
            discriminator,
            device: device.clone(),
        })
    }

    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    pub fn device(&self) -> &Device {
        &self.device
    }

    pub fn generator(&self) -> &Generator {
        &self.generator
    }

    pub fn discriminator(&self) -> &Discriminator {
        &self.discriminator
    }

    pub fn generator_group(&self) -> ParamGroup {
        ParamGroup::new(GENERATOR_PREFIX, self.generator.params())
    }

    pub fn discriminator_group(&self) -> ParamGroup {
        ParamGroup::new(DISCRIMINATOR_PREFIX, self.discriminator.params())
    }

    /// Copies of every parameter of both groups, keyed by name.
    pub fn snapshot(&self) -> Result<HashMap<String, Tensor>> {
        let mut all = self.generator_group().snapshot()?;
        all.extend(self.discriminator_group().snapshot()?);
        Ok(all)
    }

    /// Overwrite both groups from `tensors`.
    pub fn restore(&self, tensors: &HashMap<String, Tensor>) -> Result<()> {
        self.generator_group().restore(tensors)?;
        self.discriminator_group().restore(tensors)?;
        Ok(())
    }

    /// Full adversarial forward pass for one batch. With `dropout` set this
    /// is a training pass; without it, an inference pass.
    pub fn batch_losses(
        &self,
        batch: &SequenceBatch,
        noise: &Tensor,
        mut dropout: Option<&mut SeqRng>,
    ) -> Result<BatchLosses> {
        let fake = self
            .generator
            .forward(noise, &batch.lengths, dropout.as_deref_mut())?;
        let real_scores = self
            .discriminator
            .forward(&batch.targets, dropout.as_deref_mut())?;
        let fake_scores = self.discriminator.forward(&fake, dropout)?;
        BatchLosses::from_scores(&real_scores, &fake_scores)
    }
}
