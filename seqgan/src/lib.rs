// seqgan: adversarially trained recurrent sequence generator.
//
// A GRU-stack generator turns a scalar noise sequence into a multi-feature
// sequence (a piano roll, when used for music); a bidirectional GRU-stack
// discriminator scores sequences as real or generated. The two are trained
// against each other with separate losses and optimizers, global-norm
// gradient clipping, and a discriminator update gated on its current fake
// score.
//
// Architecture:
// - config.rs: ModelConfig / TrainingConfig / StoreConfig, JSON load + save
// - error.rs: GanError taxonomy and the crate Result alias
// - params.rs: named trainable parameters, parameter groups, affine layers
// - cell.rs: dropout-wrapped GRU cell stack with length masking
// - generator.rs / discriminator.rs: the two networks
// - loss.rs: adversarial losses, finiteness check, discriminator gate
// - optim.rs: per-group backprop + global-norm clipping + Adam
// - data.rs: TrainingSet (sequences + true lengths)
// - batch.rs: per-epoch shuffling, padded batches, noise batches
// - model.rs: SequenceGan, both networks and one batch's forward pass
// - sampler.rs: noise -> generated sequences, inference only
// - checkpoint.rs: per-model safetensors checkpoints + JSON index
// - samples.rs: progress samples through MIDI or JSON writers
// - trainer.rs: the epoch/batch/report loop
// - session.rs: start/end lifecycle owning model, optimizers and stores
//
// Everything runs on the CPU, single-threaded. Given a seed, a session is
// deterministic.

pub mod batch;
pub mod cell;
pub mod checkpoint;
pub mod config;
pub mod data;
pub mod discriminator;
pub mod error;
pub mod generator;
pub mod loss;
pub mod model;
pub mod optim;
pub mod params;
pub mod sampler;
pub mod samples;
pub mod session;
pub mod trainer;

pub use checkpoint::{CheckpointStore, CheckpointTag};
pub use config::{ModelConfig, RunConfig, StoreConfig, TrainingConfig};
pub use data::TrainingSet;
pub use error::{GanError, LossKind, Result};
pub use loss::LossSignals;
pub use samples::SampleFormat;
pub use session::{Session, SessionOptions};
pub use trainer::{TrainingPhase, TrainingReport};
