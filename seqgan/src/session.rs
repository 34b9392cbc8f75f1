// Session lifecycle.
//
// A `Session` is the only way to reach a trainable model: `start` builds it
// (fresh initialisation, or a restore from the newest checkpoint of the
// model name) and `end` writes the end-of-session checkpoint and consumes
// it. Training and sampling are methods on the session, so they cannot run
// before `start` or after `end`.
//
// The session owns everything that outlives one training call: the model,
// both optimizers (Adam moments carry over between `train` calls), the PRNG
// that drives shuffling, noise and dropout, and the two stores.
//
// With `SessionOptions::seed` set, initialisation, shuffling, noise and
// dropout are reproducible. Without it the PRNG is seeded from the wall
// clock. `generate_sequence` always uses fresh wall-clock randomness.

use crate::checkpoint::{CheckpointStore, CheckpointTag};
use crate::config::{ModelConfig, StoreConfig, TrainingConfig};
use crate::data::TrainingSet;
use crate::error::Result;
use crate::model::SequenceGan;
use crate::optim::GroupOptimizer;
use crate::sampler;
use crate::samples::{ProgressSampleStore, SampleFormat};
use crate::trainer::{Trainer, TrainingReport};
use candle_core::{Device, Tensor};
use seqgan_prng::SeqRng;
use std::path::PathBuf;
use tracing::info;

/// How a session persists artifacts and where its randomness comes from.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionOptions {
    pub checkpoint_root: PathBuf,
    pub progress_root: PathBuf,
    pub max_checkpoints: usize,
    pub keep_every_minutes: u64,
    pub sample_format: SampleFormat,
    /// Overwrite the fresh parameters with the newest checkpoint.
    pub restore: bool,
    pub seed: Option<u64>,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self::from_store(&StoreConfig::default())
    }
}

impl SessionOptions {
    pub fn from_store(store: &StoreConfig) -> Self {
        SessionOptions {
            checkpoint_root: store.checkpoint_root.clone(),
            progress_root: store.progress_root.clone(),
            max_checkpoints: store.max_checkpoints,
            keep_every_minutes: store.keep_every_minutes,
            sample_format: store.sample_format,
            restore: false,
            seed: None,
        }
    }
}

pub struct Session {
    pub(crate) model: SequenceGan,
    pub(crate) generator_opt: GroupOptimizer,
    pub(crate) discriminator_opt: GroupOptimizer,
    pub(crate) rng: SeqRng,
    pub(crate) checkpoints: CheckpointStore,
    pub(crate) samples: ProgressSampleStore,
}

impl Session {
    /// Build the model and, with `options.restore`, load the newest
    /// checkpoint of `config.name` over it.
    pub fn start(config: ModelConfig, options: SessionOptions) -> Result<Self> {
        let mut rng = SeqRng::from_optional_seed(options.seed);
        let model = SequenceGan::new(config, &mut rng, &Device::Cpu)?;
        let name = model.config().name.clone();

        let checkpoints =
            CheckpointStore::new(&options.checkpoint_root, &name, options.max_checkpoints)
                .with_keep_interval(options.keep_every_minutes);
        if options.restore {
            let tensors = checkpoints.load_latest()?;
            model.restore(&tensors)?;
            info!(model = %name, dir = %checkpoints.dir().display(), "restored parameters");
        } else {
            info!(model = %name, "initialised parameters");
        }

        let generator_opt = GroupOptimizer::new(model.generator_group(), model.config().generator_lr)?;
        let discriminator_opt =
            GroupOptimizer::new(model.discriminator_group(), model.config().discriminator_lr)?;
        let samples = ProgressSampleStore::new(
            &options.progress_root,
            &name,
            options.sample_format.writer(),
        );

        Ok(Session {
            model,
            generator_opt,
            discriminator_opt,
            rng,
            checkpoints,
            samples,
        })
    }

    /// Persist the end-of-session checkpoint and release the session.
    pub fn end(self) -> Result<PathBuf> {
        let path = self.save_checkpoint(CheckpointTag::Final)?;
        info!(model = %self.model.config().name, "session ended");
        Ok(path)
    }

    pub fn config(&self) -> &ModelConfig {
        self.model.config()
    }

    pub fn model(&self) -> &SequenceGan {
        &self.model
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    pub fn samples(&self) -> &ProgressSampleStore {
        &self.samples
    }

    /// Run the adversarial training loop over `data`.
    pub fn train(&mut self, data: &TrainingSet, config: &TrainingConfig) -> Result<TrainingReport> {
        Trainer::new(self, config)?.run(data)
    }

    /// Write the current parameters under `tag`.
    pub fn save_checkpoint(&self, tag: CheckpointTag) -> Result<PathBuf> {
        self.checkpoints.save(tag, &self.model.snapshot()?)
    }

    /// `(count, steps, features)` sequences from fresh wall-clock noise.
    pub fn generate_sequence(&self, count: usize, steps: usize) -> Result<Tensor> {
        sampler::generate(self.model.generator(), count, steps, self.model.device())
    }

    /// As `generate_sequence`, drawing the noise from `rng`.
    pub fn generate_sequence_with(
        &self,
        rng: &mut SeqRng,
        count: usize,
        steps: usize,
    ) -> Result<Tensor> {
        sampler::generate_with(self.model.generator(), rng, count, steps, self.model.device())
    }

    /// Generate from caller-provided `(count, steps, 1)` noise.
    pub fn generate_from_noise(&self, noise: &Tensor) -> Result<Tensor> {
        sampler::generate_from_noise(self.model.generator(), noise)
    }
}
