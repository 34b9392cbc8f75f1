// Sequence sampler: Gaussian noise in, generated sequences out.
//
// Sampling is a pure function of the generator's current parameters and the
// noise. It always runs an inference pass (no dropout) with every sequence
// length equal to the step count, and never touches the parameters.

use crate::batch::{NOISE_MEAN, NOISE_STDDEV};
use crate::error::Result;
use crate::generator::Generator;
use candle_core::{Device, Tensor};
use seqgan_prng::SeqRng;

/// `(count, steps, 1)` of Gaussian(0.5, 0.2) noise.
pub fn sample_noise(rng: &mut SeqRng, count: usize, steps: usize, device: &Device) -> Result<Tensor> {
    let data = rng.normal_vec(count * steps, NOISE_MEAN, NOISE_STDDEV);
    Ok(Tensor::from_vec(data, (count, steps, 1), device)?)
}

/// Run `noise` (`(count, steps, 1)`) through the generator at full length.
pub fn generate_from_noise(generator: &Generator, noise: &Tensor) -> Result<Tensor> {
    let (count, steps, _) = noise.dims3()?;
    let lengths = vec![steps; count];
    generator.forward(noise, &lengths, None)
}

/// Draw noise from `rng` and generate `(count, steps, features)`.
pub fn generate_with(
    generator: &Generator,
    rng: &mut SeqRng,
    count: usize,
    steps: usize,
    device: &Device,
) -> Result<Tensor> {
    let noise = sample_noise(rng, count, steps, device)?;
    generate_from_noise(generator, &noise)
}

/// As `generate_with`, from a fresh wall-clock-seeded generator.
pub fn generate(generator: &Generator, count: usize, steps: usize, device: &Device) -> Result<Tensor> {
    let mut rng = SeqRng::from_wall_clock();
    generate_with(generator, &mut rng, count, steps, device)
}
