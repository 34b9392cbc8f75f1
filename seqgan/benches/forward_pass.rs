// Forward-pass and training-step benchmarks on a piano-roll sized model.
//
// Run with: cargo bench -p seqgan

use candle_core::Device;
use criterion::{Criterion, criterion_group, criterion_main};
use seqgan::batch::SequenceBatch;
use seqgan::model::SequenceGan;
use seqgan::optim::GroupOptimizer;
use seqgan::{ModelConfig, SampleFormat, Session, SessionOptions, TrainingSet};
use seqgan_prng::SeqRng;
use std::hint::black_box;

const FEATURES: usize = 156;
const UNITS: usize = 64;
const BATCH: usize = 8;
const STEPS: usize = 32;

fn session(dir: &std::path::Path) -> Session {
    let options = SessionOptions {
        checkpoint_root: dir.join("model_saves"),
        progress_root: dir.join("progress_sequences"),
        max_checkpoints: 2,
        keep_every_minutes: 0,
        sample_format: SampleFormat::Json,
        restore: false,
        seed: Some(1),
    };
    Session::start(ModelConfig::new("bench", FEATURES, UNITS, BATCH), options)
        .expect("session start")
}

fn dataset() -> TrainingSet {
    let mut rng = SeqRng::new(2);
    let sequences = (0..BATCH)
        .map(|_| {
            (0..STEPS)
                .map(|_| (0..FEATURES).map(|_| f32::from(rng.random_bool(0.05))).collect())
                .collect()
        })
        .collect();
    TrainingSet::from_sequences(sequences)
}

fn bench_forward(c: &mut Criterion) {
    let dir = tempfile::tempdir().expect("tempdir");
    let session = session(dir.path());
    let data = dataset();
    let indices: Vec<usize> = (0..BATCH).collect();
    let batch = SequenceBatch::assemble(&data, &indices, FEATURES, &Device::Cpu).expect("batch");
    let noise = batch.noise(&mut SeqRng::new(3)).expect("noise");

    c.bench_function("generator_forward", |b| {
        b.iter(|| {
            session
                .model()
                .generator()
                .forward(black_box(&noise), &batch.lengths, None)
                .expect("forward")
        })
    });

    c.bench_function("discriminator_forward", |b| {
        b.iter(|| {
            session
                .model()
                .discriminator()
                .forward(black_box(&batch.targets), None)
                .expect("forward")
        })
    });
}

/// One adversarial batch step (both optimizer steps), without the epoch
/// loop's reporting, so no checkpoint or sample I/O is timed.
fn bench_batch_step(c: &mut Criterion) {
    let mut rng = SeqRng::new(1);
    let config = ModelConfig::new("bench", FEATURES, UNITS, BATCH);
    let model = SequenceGan::new(config, &mut rng, &Device::Cpu).expect("model");
    let mut generator_opt =
        GroupOptimizer::new(model.generator_group(), model.config().generator_lr).expect("optimizer");
    let mut discriminator_opt =
        GroupOptimizer::new(model.discriminator_group(), model.config().discriminator_lr)
            .expect("optimizer");
    let data = dataset();
    let indices: Vec<usize> = (0..BATCH).collect();
    let batch = SequenceBatch::assemble(&data, &indices, FEATURES, &Device::Cpu).expect("batch");
    let noise = batch.noise(&mut rng).expect("noise");

    let mut group = c.benchmark_group("training");
    group.sample_size(10);
    group.bench_function("batch_step", |b| {
        b.iter(|| {
            let losses = model
                .batch_losses(&batch, black_box(&noise), Some(&mut rng))
                .expect("losses");
            discriminator_opt.step(&losses.discriminator).expect("discriminator step");
            let losses = model
                .batch_losses(&batch, &noise, Some(&mut rng))
                .expect("losses");
            generator_opt.step(&losses.generator).expect("generator step")
        })
    });
    group.finish();
}

criterion_group!(benches, bench_forward, bench_batch_step);
criterion_main!(benches);
