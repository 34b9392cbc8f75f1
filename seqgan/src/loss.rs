// Adversarial losses and the discriminator update gate.
//
// With D(x) the discriminator's per-timestep score and ε = 1e-7:
//
//   generator loss     = −mean(log(clamp(D(G(z)), ε, 1)))
//   discriminator loss = −mean(log(clamp(D(x), ε, 1)))
//                        −mean(log(1 − clamp(D(G(z)), 0, 1 − ε)))
//
// Means run over every (sequence, timestep) score of the batch. The clamps
// keep both logs finite even when a score saturates at exactly 0 or 1.
//
// The gate decides whether a batch's discriminator update is applied: only
// when the mean fake score lies strictly inside (0.3, 0.5). Generator
// updates are never gated.

use crate::error::{GanError, LossKind, Result};
use candle_core::Tensor;
use serde::{Deserialize, Serialize};

/// Clamp margin keeping scores away from exact 0 and 1 inside the logs.
pub const SCORE_EPSILON: f32 = 1e-7;

/// Exclusive lower bound of the fake-score band that allows a
/// discriminator update.
pub const GATE_LOWER: f32 = 0.3;

/// Exclusive upper bound of the same band.
pub const GATE_UPPER: f32 = 0.5;

/// −mean(log(clamp(fake, ε, 1))).
pub fn generator_loss(fake_scores: &Tensor) -> Result<Tensor> {
    let clamped = fake_scores.clamp(SCORE_EPSILON, 1.0f32)?;
    Ok(clamped.log()?.mean_all()?.neg()?)
}

/// −mean(log(clamp(real, ε, 1))) − mean(log(1 − clamp(fake, 0, 1 − ε))).
pub fn discriminator_loss(real_scores: &Tensor, fake_scores: &Tensor) -> Result<Tensor> {
    let real_term = real_scores
        .clamp(SCORE_EPSILON, 1.0f32)?
        .log()?
        .mean_all()?
        .neg()?;
    let fake_term = fake_scores
        .clamp(0.0f32, 1.0 - SCORE_EPSILON)?
        .affine(-1.0, 1.0)?
        .log()?
        .mean_all()?
        .neg()?;
    Ok(real_term.add(&fake_term)?)
}

/// True iff a discriminator update should be applied for this batch.
pub fn discriminator_update_gate(fake_score: f32) -> bool {
    fake_score > GATE_LOWER && fake_score < GATE_UPPER
}

/// Pass `value` through, or fail with `NonFiniteLoss`.
pub fn ensure_finite(loss: LossKind, value: f32) -> Result<f32> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(GanError::NonFiniteLoss { loss, value })
    }
}

/// Scalar summary of one batch's losses and mean scores.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct LossSignals {
    pub generator_loss: f32,
    pub discriminator_loss: f32,
    /// Mean score the discriminator gives real sequences.
    pub real_score: f32,
    /// Mean score the discriminator gives generated sequences.
    pub fake_score: f32,
}

/// Loss tensors of one batch, still attached to the graph they came from.
#[derive(Debug)]
pub struct BatchLosses {
    pub generator: Tensor,
    pub discriminator: Tensor,
    pub signals: LossSignals,
}

impl BatchLosses {
    /// Compute both losses from the discriminator's scores on a real and a
    /// generated batch. Fails if either loss is NaN or infinite.
    pub fn from_scores(real_scores: &Tensor, fake_scores: &Tensor) -> Result<Self> {
        let generator = generator_loss(fake_scores)?;
        let discriminator = discriminator_loss(real_scores, fake_scores)?;
        let signals = LossSignals {
            generator_loss: ensure_finite(LossKind::Generator, generator.to_scalar::<f32>()?)?,
            discriminator_loss: ensure_finite(
                LossKind::Discriminator,
                discriminator.to_scalar::<f32>()?,
            )?,
            real_score: real_scores.mean_all()?.to_scalar::<f32>()?,
            fake_score: fake_scores.mean_all()?.to_scalar::<f32>()?,
        };
        Ok(BatchLosses {
            generator,
            discriminator,
            signals,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use candle_core::Device;

    fn scores(values: &[f32]) -> Tensor {
        Tensor::from_vec(values.to_vec(), (1, values.len(), 1), &Device::Cpu).unwrap()
    }

    #[test]
    fn gate_band_is_exclusive() {
        assert!(discriminator_update_gate(0.4));
        assert!(!discriminator_update_gate(0.2));
        assert!(!discriminator_update_gate(0.6));
        assert!(!discriminator_update_gate(0.3));
        assert!(!discriminator_update_gate(0.5));
        assert!(!discriminator_update_gate(f32::NAN));
    }

    #[test]
    fn saturated_scores_stay_finite() {
        // Discriminator fully fooled: real 0, fake 1.
        let losses = BatchLosses::from_scores(&scores(&[0.0, 0.0]), &scores(&[1.0, 1.0])).unwrap();
        assert!(losses.signals.generator_loss.is_finite());
        assert!(losses.signals.discriminator_loss.is_finite());

        // Discriminator perfect: real 1, fake 0.
        let losses = BatchLosses::from_scores(&scores(&[1.0, 1.0]), &scores(&[0.0, 0.0])).unwrap();
        assert!(losses.signals.generator_loss.is_finite());
        assert!(losses.signals.discriminator_loss.abs() < 1e-5);
    }

    #[test]
    fn generator_loss_value() {
        let loss = generator_loss(&scores(&[0.5, 0.5])).unwrap();
        let v = loss.to_scalar::<f32>().unwrap();
        assert!((v - std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn discriminator_loss_value() {
        let loss = discriminator_loss(&scores(&[0.5]), &scores(&[0.5])).unwrap();
        let v = loss.to_scalar::<f32>().unwrap();
        assert!((v - 2.0 * std::f32::consts::LN_2).abs() < 1e-6);
    }

    #[test]
    fn signals_carry_mean_scores() {
        let losses = BatchLosses::from_scores(&scores(&[0.9, 0.7]), &scores(&[0.1, 0.3])).unwrap();
        assert!((losses.signals.real_score - 0.8).abs() < 1e-6);
        assert!((losses.signals.fake_score - 0.2).abs() < 1e-6);
    }

    #[test]
    fn non_finite_is_fatal() {
        let err = ensure_finite(LossKind::Generator, f32::INFINITY).unwrap_err();
        assert!(matches!(
            err,
            GanError::NonFiniteLoss {
                loss: LossKind::Generator,
                ..
            }
        ));
        assert!(ensure_finite(LossKind::Discriminator, f32::NAN).is_err());
    }
}
