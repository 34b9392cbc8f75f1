// Adversarial training loop.
//
// Phases: Idle -> (EpochRunning -> BatchRunning* -> Reporting?)* -> Finished.
//
// Per epoch the full training set is shuffled and cut into full batches.
// Per batch:
//   1. noise: Gaussian(0.5, 0.2) per real timestep, zero-padded;
//   2. training pass G(z), D(x), D(G(z)) -> both losses, checked finite;
//   3. discriminator step, only if `train_discriminator` and the mean fake
//      score is strictly inside (0.3, 0.5);
//   4. a fresh training pass against the (possibly) updated discriminator,
//      then an ungated generator step if `train_generator`.
// Each step backprops its own loss and clips its own group to global norm
// 50 before the Adam update.
//
// Every `report_interval` epochs (epoch 0 included) the losses are
// recomputed on the last batch with an inference pass, a loss-tagged
// checkpoint is written, and `sample_count` sequences of `sample_steps` go
// to the progress-sample store.
//
// Errors are not caught: a non-finite loss or an I/O failure aborts the run
// with whatever checkpoints were already written left in place.

use crate::batch::{SequenceBatch, epoch_partition};
use crate::checkpoint::CheckpointTag;
use crate::config::TrainingConfig;
use crate::data::TrainingSet;
use crate::error::{GanError, Result};
use crate::loss::{LossSignals, discriminator_update_gate};
use crate::session::Session;
use candle_core::Tensor;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use std::path::PathBuf;
use tracing::{debug, info};

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
pub enum TrainingPhase {
    Idle,
    EpochRunning,
    BatchRunning,
    Reporting,
    Finished,
}

/// Mutable state of one `train` call.
#[derive(Clone, Debug)]
pub struct RunState {
    pub epoch: usize,
    pub phase: TrainingPhase,
    /// This epoch's batches, as indices into the training set.
    pub partition: Vec<Vec<usize>>,
    pub train_generator: bool,
    pub train_discriminator: bool,
    pub batches: usize,
    pub generator_updates: usize,
    pub discriminator_updates: usize,
    pub discriminator_skips: usize,
}

/// One report's results.
#[derive(Clone, Debug, Serialize)]
pub struct ReportEvent {
    pub epoch: usize,
    pub signals: LossSignals,
    pub checkpoint: PathBuf,
    pub sample_dir: Option<PathBuf>,
}

/// Summary returned by `Session::train`.
#[derive(Clone, Debug, Default, Serialize)]
pub struct TrainingReport {
    pub epochs: usize,
    pub batches: usize,
    pub generator_updates: usize,
    pub discriminator_updates: usize,
    pub discriminator_skips: usize,
    pub reports: Vec<ReportEvent>,
    /// Training-pass signals of the last processed batch.
    pub last_signals: Option<LossSignals>,
}

pub struct Trainer<'s> {
    session: &'s mut Session,
    config: TrainingConfig,
    state: RunState,
}

impl<'s> Trainer<'s> {
    pub fn new(session: &'s mut Session, config: &TrainingConfig) -> Result<Self> {
        config.validate()?;
        let state = RunState {
            epoch: 0,
            phase: TrainingPhase::Idle,
            partition: Vec::new(),
            train_generator: config.train_generator,
            train_discriminator: config.train_discriminator,
            batches: 0,
            generator_updates: 0,
            discriminator_updates: 0,
            discriminator_skips: 0,
        };
        Ok(Trainer {
            session,
            config: config.clone(),
            state,
        })
    }

    pub fn state(&self) -> &RunState {
        &self.state
    }

    fn transition(&mut self, phase: TrainingPhase) {
        debug!(from = ?self.state.phase, to = ?phase, epoch = self.state.epoch, "phase");
        self.state.phase = phase;
    }

    /// Run every epoch over `data`.
    pub fn run(mut self, data: &TrainingSet) -> Result<TrainingReport> {
        let model_config = self.session.model.config().clone();
        data.validate(model_config.feature_count)?;
        if data.len() < model_config.batch_size {
            return Err(GanError::DatasetTooSmall {
                available: data.len(),
                batch_size: model_config.batch_size,
            });
        }

        let epochs = self.config.epochs;
        info!(
            model = %model_config.name,
            epochs,
            report_interval = self.config.report_interval,
            sequences = data.len(),
            "beginning adversarial training"
        );

        let progress = progress_bar(epochs, &model_config.name, self.config.show_progress);
        let mut report = TrainingReport {
            epochs,
            ..TrainingReport::default()
        };

        for epoch in 0..epochs {
            self.state.epoch = epoch;
            self.transition(TrainingPhase::EpochRunning);
            self.state.partition =
                epoch_partition(data.len(), model_config.batch_size, &mut self.session.rng);

            let mut last: Option<(SequenceBatch, Tensor)> = None;
            let partition = std::mem::take(&mut self.state.partition);
            for indices in &partition {
                self.transition(TrainingPhase::BatchRunning);
                let batch = SequenceBatch::assemble(
                    data,
                    indices,
                    model_config.feature_count,
                    self.session.model.device(),
                )?;
                let noise = batch.noise(&mut self.session.rng)?;
                let signals = self.train_batch(&batch, &noise)?;
                report.last_signals = Some(signals);
                last = Some((batch, noise));
                self.transition(TrainingPhase::EpochRunning);
            }
            self.state.partition = partition;

            if epoch % self.config.report_interval == 0 {
                if let Some((batch, noise)) = &last {
                    self.transition(TrainingPhase::Reporting);
                    let event = self.report(epoch, batch, noise)?;
                    progress.set_message(format!(
                        "G: {:.4}, D: {:.4}",
                        event.signals.generator_loss, event.signals.discriminator_loss
                    ));
                    report.reports.push(event);
                }
            }
            progress.inc(1);
        }

        self.transition(TrainingPhase::Finished);
        progress.finish_with_message("done");

        report.batches = self.state.batches;
        report.generator_updates = self.state.generator_updates;
        report.discriminator_updates = self.state.discriminator_updates;
        report.discriminator_skips = self.state.discriminator_skips;
        Ok(report)
    }

    /// Gated discriminator step, then generator step. Returns the signals of
    /// the discriminator-step pass.
    fn train_batch(&mut self, batch: &SequenceBatch, noise: &Tensor) -> Result<LossSignals> {
        let session = &mut *self.session;
        let losses = session
            .model
            .batch_losses(batch, noise, Some(&mut session.rng))?;
        let signals = losses.signals;

        let gate_open = discriminator_update_gate(signals.fake_score);
        if self.state.train_discriminator && gate_open {
            let norm = session.discriminator_opt.step(&losses.discriminator)?;
            self.state.discriminator_updates += 1;
            debug!(fake_score = signals.fake_score, grad_norm = norm, "discriminator updated");
        } else {
            self.state.discriminator_skips += 1;
            debug!(fake_score = signals.fake_score, gate_open, "discriminator update skipped");
        }

        if self.state.train_generator {
            let losses = session
                .model
                .batch_losses(batch, noise, Some(&mut session.rng))?;
            let norm = session.generator_opt.step(&losses.generator)?;
            self.state.generator_updates += 1;
            debug!(generator_loss = losses.signals.generator_loss, grad_norm = norm, "generator updated");
        }

        self.state.batches += 1;
        Ok(signals)
    }

    fn report(&mut self, epoch: usize, batch: &SequenceBatch, noise: &Tensor) -> Result<ReportEvent> {
        let signals = self.session.model.batch_losses(batch, noise, None)?.signals;
        let tag = CheckpointTag::PairedLoss {
            generator_loss: signals.generator_loss,
            discriminator_loss: signals.discriminator_loss,
            epoch,
            epochs: self.config.epochs,
        };
        let checkpoint = self.session.save_checkpoint(tag.clone())?;

        let sample_dir = if self.config.sample_count > 0 {
            let mut sample_rng = self.session.rng.fork();
            let samples = self.session.generate_sequence_with(
                &mut sample_rng,
                self.config.sample_count,
                self.config.sample_steps,
            )?;
            Some(self.session.samples.write(&tag, &samples)?)
        } else {
            None
        };

        info!(
            epoch,
            generator_loss = signals.generator_loss,
            discriminator_loss = signals.discriminator_loss,
            real_score = signals.real_score,
            fake_score = signals.fake_score,
            "report"
        );
        Ok(ReportEvent {
            epoch,
            signals,
            checkpoint,
            sample_dir,
        })
    }
}

fn progress_bar(epochs: usize, model_name: &str, visible: bool) -> ProgressBar {
    if !visible {
        return ProgressBar::hidden();
    }
    let pb = ProgressBar::new(epochs as u64);
    let style = ProgressStyle::default_bar()
        .template("{prefix} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
        .map(|s| s.progress_chars("##-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_prefix(format!("{model_name}.learn"));
    pb
}
