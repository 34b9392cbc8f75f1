// End-to-end tests for the adversarial training pipeline.
//
// Each test starts a real session on scratch directories and drives it
// through the public API: start -> train -> checkpoint / sample -> end ->
// restore. Progress samples are written as JSON so feature widths other
// than the piano-roll width work.
//
// Where a test depends on the discriminator gate, the discriminator's output
// layer is pinned so the fake score sits at a known value instead of
// wherever the random initialisation lands.

use candle_core::{DType, Device, Tensor};
use seqgan::batch::SequenceBatch;
use seqgan::checkpoint::CheckpointTag;
use seqgan::{
    GanError, ModelConfig, SampleFormat, Session, SessionOptions, TrainingConfig, TrainingSet,
};
use seqgan_prng::SeqRng;
use std::path::Path;

fn options(dir: &Path, seed: u64) -> SessionOptions {
    SessionOptions {
        checkpoint_root: dir.join("model_saves"),
        progress_root: dir.join("progress_sequences"),
        max_checkpoints: 20,
        keep_every_minutes: 0,
        sample_format: SampleFormat::Json,
        restore: false,
        seed: Some(seed),
    }
}

fn training(epochs: usize, report_interval: usize) -> TrainingConfig {
    TrainingConfig {
        epochs,
        report_interval,
        show_progress: false,
        ..TrainingConfig::default()
    }
}

/// Sequences of the given lengths with values in [0, 1).
fn dataset(lengths: &[usize], features: usize, seed: u64) -> TrainingSet {
    let mut rng = SeqRng::new(seed);
    let sequences = lengths
        .iter()
        .map(|&len| {
            (0..len)
                .map(|_| (0..features).map(|_| rng.next_f32()).collect())
                .collect()
        })
        .collect();
    TrainingSet::from_sequences(sequences)
}

/// Pin the discriminator's output layer so every score is close to
/// sigmoid(bias).
fn pin_discriminator_output(session: &Session, bias: f32) {
    let group = session.model().discriminator_group();
    let b = group.get("discriminator/output/bias").unwrap();
    b.var
        .set(&Tensor::new(&[bias], &Device::Cpu).unwrap())
        .unwrap();
    let w = group.get("discriminator/output/weight").unwrap();
    w.var.set(&w.tensor().affine(0.1, 0.0).unwrap()).unwrap();
}

fn files_in(dir: &Path) -> Vec<std::path::PathBuf> {
    let mut out: Vec<_> = std::fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().path())
        .collect();
    out.sort();
    out
}

#[test]
fn four_sequence_epoch() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = ModelConfig::new("e2e", 6, 8, 2);
    config.generator_lr = 0.01;
    config.discriminator_lr = 0.01;
    let mut session = Session::start(config, options(dir.path(), 42)).unwrap();
    pin_discriminator_output(&session, -0.4);

    let g_before = session.model().generator_group().norm().unwrap();
    let d_before = session.model().discriminator_group().norm().unwrap();

    let data = dataset(&[10, 12, 8, 15], 6, 1);
    let report = session.train(&data, &training(1, 1)).unwrap();

    assert_eq!(report.batches, 2);
    assert_eq!(report.generator_updates, 2);
    assert!(report.discriminator_updates >= 1);
    assert_eq!(report.reports.len(), 1);

    // One loss-tagged checkpoint.
    let index = session.checkpoints().index().unwrap();
    assert_eq!(index.entries.len(), 1);
    assert!(matches!(
        index.entries[0].tag,
        CheckpointTag::PairedLoss {
            epoch: 0,
            epochs: 1,
            ..
        }
    ));
    assert!(index.entries[0].file.starts_with('G'));

    // One progress sample of 50 steps.
    let sample_dirs = files_in(&dir.path().join("progress_sequences").join("e2e"));
    assert_eq!(sample_dirs.len(), 1);
    let samples = files_in(&sample_dirs[0]);
    assert_eq!(samples.len(), 1);
    let rows: Vec<Vec<f32>> =
        serde_json::from_str(&std::fs::read_to_string(&samples[0]).unwrap()).unwrap();
    assert_eq!(rows.len(), 50);
    assert!(rows.iter().all(|r| r.len() == 6));

    assert_ne!(session.model().generator_group().norm().unwrap(), g_before);
    assert_ne!(session.model().discriminator_group().norm().unwrap(), d_before);

    let signals = report.reports[0].signals;
    assert!(signals.generator_loss.is_finite());
    assert!(signals.discriminator_loss.is_finite());
    assert!((0.0..=1.0).contains(&signals.real_score));
    assert!((0.0..=1.0).contains(&signals.fake_score));
}

#[test]
fn gate_closed_leaves_discriminator_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        Session::start(ModelConfig::new("closed", 6, 8, 2), options(dir.path(), 3)).unwrap();
    // Fake score near 0.73: above the band.
    pin_discriminator_output(&session, 1.0);
    let d_before = session.model().discriminator_group().norm().unwrap();

    let report = session
        .train(&dataset(&[5, 6, 7, 8], 6, 2), &training(2, 10))
        .unwrap();
    assert_eq!(report.discriminator_updates, 0);
    assert_eq!(report.discriminator_skips, 4);
    assert_eq!(report.generator_updates, 4);
    assert_eq!(session.model().discriminator_group().norm().unwrap(), d_before);
}

#[test]
fn checkpoint_round_trip() {
    let dir = tempfile::tempdir().unwrap();
    let config = ModelConfig::new("roundtrip", 6, 8, 2);

    let mut session = Session::start(config.clone(), options(dir.path(), 7)).unwrap();
    session
        .train(&dataset(&[6, 6, 9, 4], 6, 3), &training(2, 1))
        .unwrap();
    let noise = Tensor::from_vec(
        SeqRng::new(99).normal_vec(2 * 10, 0.5, 0.2),
        (2, 10, 1),
        &Device::Cpu,
    )
    .unwrap();
    let expected = session.generate_from_noise(&noise).unwrap().to_vec3::<f32>().unwrap();
    let expected_snapshot = session.model().snapshot().unwrap();
    let final_path = session.end().unwrap();
    assert!(final_path.ends_with("roundtrip_end_sess.safetensors"));

    // A different seed initialises different weights; restore must replace
    // all of them.
    let restored = Session::start(
        config,
        SessionOptions {
            restore: true,
            ..options(dir.path(), 8)
        },
    )
    .unwrap();
    let snapshot = restored.model().snapshot().unwrap();
    assert_eq!(snapshot.len(), expected_snapshot.len());
    for (name, tensor) in &expected_snapshot {
        let a = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let b = snapshot[name].flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(a, b, "parameter {name}");
    }
    let actual = restored.generate_from_noise(&noise).unwrap().to_vec3::<f32>().unwrap();
    assert_eq!(actual, expected);
}

#[test]
fn restore_without_checkpoint_fails() {
    let dir = tempfile::tempdir().unwrap();
    let result = Session::start(
        ModelConfig::new("nothing", 6, 8, 2),
        SessionOptions {
            restore: true,
            ..options(dir.path(), 1)
        },
    );
    assert!(matches!(result, Err(GanError::CheckpointNotFound { .. })));
}

#[test]
fn restore_into_different_shape_fails() {
    let dir = tempfile::tempdir().unwrap();
    Session::start(ModelConfig::new("shape", 6, 8, 2), options(dir.path(), 1))
        .unwrap()
        .end()
        .unwrap();
    let result = Session::start(
        ModelConfig::new("shape", 6, 16, 2),
        SessionOptions {
            restore: true,
            ..options(dir.path(), 1)
        },
    );
    assert!(matches!(result, Err(GanError::ParameterShape { .. })));
}

#[test]
fn output_shapes_across_configurations() {
    let dir = tempfile::tempdir().unwrap();
    for (features, units, layers, count, steps) in
        [(6, 8, 1, 1, 5), (12, 4, 3, 3, 9), (156, 16, 2, 2, 4)]
    {
        let mut config = ModelConfig::new("shapes", features, units, 2);
        config.layer_count = layers;
        let session = Session::start(config, options(dir.path(), 5)).unwrap();

        let generated = session.generate_sequence(count, steps).unwrap();
        assert_eq!(generated.dims(), &[count, steps, features]);

        let scores = session
            .model()
            .discriminator()
            .forward(&generated, None)
            .unwrap();
        assert_eq!(scores.dims(), &[count, steps, 1]);
        for v in scores.flatten_all().unwrap().to_vec1::<f32>().unwrap() {
            assert!(v > 0.0 && v < 1.0);
        }
    }
}

#[test]
fn padded_batch_generator_output_keeps_max_length() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::start(ModelConfig::new("pad", 6, 8, 3), options(dir.path(), 2)).unwrap();
    let data = dataset(&[3, 9, 5], 6, 4);
    let batch = SequenceBatch::assemble(&data, &[0, 1, 2], 6, &Device::Cpu).unwrap();
    let noise = batch.noise(&mut SeqRng::new(1)).unwrap();
    let fake = session
        .model()
        .generator()
        .forward(&noise, &batch.lengths, None)
        .unwrap();
    assert_eq!(fake.dims(), &[3, 9, 6]);
    let rows = fake.to_vec3::<f32>().unwrap();
    assert!(rows[0][3..].iter().flatten().all(|v| *v == 0.0));
}

#[test]
fn sampler_uses_fresh_noise_and_does_not_mutate() {
    let dir = tempfile::tempdir().unwrap();
    let session =
        Session::start(ModelConfig::new("fresh", 12, 8, 2), options(dir.path(), 11)).unwrap();
    // Non-negative output weights so the ReLU output is not all zero.
    let group = session.model().generator_group();
    let w = group.get("generator/output/weight").unwrap();
    w.var.set(&w.tensor().abs().unwrap()).unwrap();

    let before = session.model().snapshot().unwrap();
    let a = session.generate_sequence(1, 20).unwrap().to_vec3::<f32>().unwrap();
    let b = session.generate_sequence(1, 20).unwrap().to_vec3::<f32>().unwrap();
    assert_ne!(a, b);

    let after = session.model().snapshot().unwrap();
    for (name, tensor) in &before {
        let x = tensor.flatten_all().unwrap().to_vec1::<f32>().unwrap();
        let y = after[name].flatten_all().unwrap().to_vec1::<f32>().unwrap();
        assert_eq!(x, y);
    }
}

#[test]
fn saturated_discriminator_keeps_losses_finite() {
    let dir = tempfile::tempdir().unwrap();
    let data = dataset(&[4, 4], 6, 9);
    for bias in [1000.0f32, -1000.0] {
        let mut session =
            Session::start(ModelConfig::new("saturated", 6, 8, 2), options(dir.path(), 13))
                .unwrap();
        let group = session.model().discriminator_group();
        let b = group.get("discriminator/output/bias").unwrap();
        b.var.set(&Tensor::new(&[bias], &Device::Cpu).unwrap()).unwrap();

        let batch = SequenceBatch::assemble(&data, &[0, 1], 6, &Device::Cpu).unwrap();
        let noise = batch.noise(&mut SeqRng::new(2)).unwrap();
        let signals = session
            .model()
            .batch_losses(&batch, &noise, None)
            .unwrap()
            .signals;
        let expected = if bias > 0.0 { 1.0 } else { 0.0 };
        assert_eq!(signals.fake_score, expected);
        assert!(signals.generator_loss.is_finite());
        assert!(signals.discriminator_loss.is_finite());

        // Gate closed at both extremes; training still succeeds.
        let report = session.train(&data, &training(1, 1)).unwrap();
        assert_eq!(report.discriminator_updates, 0);
    }
}

#[test]
fn non_finite_loss_aborts_before_any_report() {
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        Session::start(ModelConfig::new("diverged", 6, 8, 2), options(dir.path(), 17)).unwrap();
    let group = session.model().discriminator_group();
    let b = group.get("discriminator/output/bias").unwrap();
    b.var
        .set(&Tensor::new(&[f32::NAN], &Device::Cpu).unwrap())
        .unwrap();
    let g_before = session.model().generator_group().norm().unwrap();

    let err = session
        .train(&dataset(&[5, 6, 7, 8], 6, 3), &training(3, 1))
        .unwrap_err();
    assert!(matches!(err, GanError::NonFiniteLoss { .. }));

    assert!(session.checkpoints().index().unwrap().entries.is_empty());
    assert!(!dir.path().join("progress_sequences").exists());
    assert_eq!(session.model().generator_group().norm().unwrap(), g_before);
}

#[test]
fn mismatched_length_metadata_never_reaches_training() {
    let json = r#"{"sequences": [[[0.1, 0.1]], [[0.2, 0.2]]], "lengths": [1]}"#;
    assert!(serde_json::from_str::<TrainingSet>(json).is_err());
    assert!(TrainingSet::from_json(json).is_err());

    // The same data with matching metadata trains normally.
    let dir = tempfile::tempdir().unwrap();
    let mut session =
        Session::start(ModelConfig::new("lengths", 2, 4, 2), options(dir.path(), 19)).unwrap();
    let json = r#"{"sequences": [[[0.1, 0.1]], [[0.2, 0.2]]], "lengths": [1, 1]}"#;
    let set: TrainingSet = serde_json::from_str(json).unwrap();
    let report = session.train(&set, &training(1, 1)).unwrap();
    assert_eq!(report.batches, 1);
}

#[test]
fn seeded_sessions_train_identically() {
    let run = |dir: &Path| {
        let mut session =
            Session::start(ModelConfig::new("seeded", 6, 8, 2), options(dir, 21)).unwrap();
        session
            .train(&dataset(&[5, 7, 6, 4], 6, 5), &training(2, 5))
            .unwrap();
        session.model().generator_group().norm().unwrap()
    };
    let a = tempfile::tempdir().unwrap();
    let b = tempfile::tempdir().unwrap();
    assert_eq!(run(a.path()), run(b.path()));
}

#[test]
fn zero_noise_generates_zeros_past_length() {
    let dir = tempfile::tempdir().unwrap();
    let session = Session::start(ModelConfig::new("zeros", 6, 8, 1), options(dir.path(), 1)).unwrap();
    let noise = Tensor::zeros((1, 4, 1), DType::F32, &Device::Cpu).unwrap();
    let out = session
        .model()
        .generator()
        .forward(&noise, &[2], None)
        .unwrap()
        .to_vec3::<f32>()
        .unwrap();
    assert!(out[0][2..].iter().flatten().all(|v| *v == 0.0));
}
