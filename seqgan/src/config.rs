// Data-driven run configuration.
//
// `ModelConfig` fixes every parameter shape for the lifetime of a model:
// changing it means building a new model (and checkpoints from the old one
// will no longer restore). `TrainingConfig` controls one call of the
// adversarial loop, `StoreConfig` where checkpoints and progress samples
// land. All three are grouped in `RunConfig`, which the CLI loads from and
// writes to JSON.
//
// Defaults follow the reference training setup: generator lr 0.05,
// discriminator lr 0.001, two recurrent layers, a report every 10 epochs
// with one 50-step sample, and at most 20 retained checkpoints.

use crate::error::{GanError, Result};
use crate::samples::SampleFormat;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Immutable architecture and optimiser settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Namespace for every persisted artifact of this model.
    pub name: String,
    /// Features per timestep of real and generated sequences.
    pub feature_count: usize,
    /// Width of every recurrent layer and of both input projections.
    pub recurrent_units: usize,
    pub batch_size: usize,
    pub generator_lr: f64,
    pub discriminator_lr: f64,
    /// Stacked GRU cells per recurrent stack.
    pub layer_count: usize,
}

impl ModelConfig {
    pub fn new(
        name: impl Into<String>,
        feature_count: usize,
        recurrent_units: usize,
        batch_size: usize,
    ) -> Self {
        ModelConfig {
            name: name.into(),
            feature_count,
            recurrent_units,
            batch_size,
            generator_lr: 0.05,
            discriminator_lr: 0.001,
            layer_count: 2,
        }
    }

    /// Reject configurations that cannot describe a model.
    pub fn validate(&self) -> Result<()> {
        if self.name.is_empty() {
            return Err(GanError::InvalidConfig("model name is empty".into()));
        }
        if self.name.contains(['/', '\\']) || self.name == "." || self.name == ".." {
            return Err(GanError::InvalidConfig(format!(
                "model name '{}' is not a single path component",
                self.name
            )));
        }
        for (field, value) in [
            ("feature_count", self.feature_count),
            ("recurrent_units", self.recurrent_units),
            ("batch_size", self.batch_size),
            ("layer_count", self.layer_count),
        ] {
            if value == 0 {
                return Err(GanError::InvalidConfig(format!("{field} must be positive")));
            }
        }
        for (field, value) in [
            ("generator_lr", self.generator_lr),
            ("discriminator_lr", self.discriminator_lr),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(GanError::InvalidConfig(format!(
                    "{field} must be a positive finite number, got {value}"
                )));
            }
        }
        Ok(())
    }
}

/// Settings for one call of the adversarial training loop.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    pub epochs: usize,
    /// Report (checkpoint + progress sample) every N epochs, starting at
    /// epoch 0.
    pub report_interval: usize,
    /// Sequences generated per report.
    pub sample_count: usize,
    /// Timesteps per generated report sequence.
    pub sample_steps: usize,
    /// Initial value of the run's generator-update flag.
    pub train_generator: bool,
    /// Initial value of the run's discriminator-update flag.
    pub train_discriminator: bool,
    pub show_progress: bool,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        TrainingConfig {
            epochs: 100,
            report_interval: 10,
            sample_count: 1,
            sample_steps: 50,
            train_generator: true,
            train_discriminator: true,
            show_progress: true,
        }
    }
}

impl TrainingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.report_interval == 0 {
            return Err(GanError::InvalidConfig("report_interval must be positive".into()));
        }
        if self.sample_count > 0 && self.sample_steps == 0 {
            return Err(GanError::InvalidConfig("sample_steps must be positive".into()));
        }
        Ok(())
    }
}

/// Where persisted artifacts go.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub checkpoint_root: PathBuf,
    pub progress_root: PathBuf,
    /// Tagged checkpoints kept per model; older ones are deleted. 0 keeps
    /// every checkpoint.
    pub max_checkpoints: usize,
    /// One tagged checkpoint per this many minutes is kept regardless of
    /// `max_checkpoints`. 0 turns this off.
    pub keep_every_minutes: u64,
    pub sample_format: SampleFormat,
}

impl Default for StoreConfig {
    fn default() -> Self {
        StoreConfig {
            checkpoint_root: PathBuf::from("model_saves"),
            progress_root: PathBuf::from("progress_sequences"),
            max_checkpoints: 20,
            keep_every_minutes: 30,
            sample_format: SampleFormat::Midi,
        }
    }
}

/// Everything a `train` or `generate` invocation needs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RunConfig {
    pub model: ModelConfig,
    #[serde(default)]
    pub training: TrainingConfig,
    #[serde(default)]
    pub store: StoreConfig,
}

impl RunConfig {
    pub fn new(model: ModelConfig) -> Self {
        RunConfig {
            model,
            training: TrainingConfig::default(),
            store: StoreConfig::default(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        let config: RunConfig = serde_json::from_str(json)?;
        config.model.validate()?;
        config.training.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self> {
        let data = std::fs::read_to_string(path)?;
        Self::from_json(&data)
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        std::fs::write(path, self.to_json()?)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_setup() {
        let m = ModelConfig::new("bach", 156, 128, 100);
        assert_eq!(m.generator_lr, 0.05);
        assert_eq!(m.discriminator_lr, 0.001);
        assert_eq!(m.layer_count, 2);
        m.validate().unwrap();

        let t = TrainingConfig::default();
        assert_eq!(t.report_interval, 10);
        assert_eq!(t.sample_steps, 50);
        assert_eq!(StoreConfig::default().max_checkpoints, 20);
        assert_eq!(StoreConfig::default().keep_every_minutes, 30);
    }

    #[test]
    fn zero_sizes_are_rejected() {
        let mut m = ModelConfig::new("m", 6, 8, 2);
        m.layer_count = 0;
        assert!(matches!(m.validate(), Err(GanError::InvalidConfig(_))));

        let mut m = ModelConfig::new("m", 6, 8, 2);
        m.discriminator_lr = f64::NAN;
        assert!(m.validate().is_err());
    }

    #[test]
    fn sample_steps_only_matter_when_sampling() {
        let mut t = TrainingConfig {
            sample_steps: 0,
            ..TrainingConfig::default()
        };
        assert!(matches!(t.validate(), Err(GanError::InvalidConfig(_))));
        t.sample_count = 0;
        t.validate().unwrap();
    }

    #[test]
    fn path_like_names_are_rejected() {
        assert!(ModelConfig::new("a/b", 6, 8, 2).validate().is_err());
        assert!(ModelConfig::new("..", 6, 8, 2).validate().is_err());
        assert!(ModelConfig::new("", 6, 8, 2).validate().is_err());
    }

    #[test]
    fn json_roundtrip() {
        let mut config = RunConfig::new(ModelConfig::new("chorales", 156, 64, 16));
        config.training.epochs = 3;
        config.store.max_checkpoints = 5;
        config.store.sample_format = SampleFormat::Json;
        let json = config.to_json().unwrap();
        let restored = RunConfig::from_json(&json).unwrap();
        assert_eq!(config, restored);
    }

    #[test]
    fn sections_default_when_missing() {
        let json = r#"{"model": {"name": "m", "feature_count": 6, "recurrent_units": 8,
            "batch_size": 2, "generator_lr": 0.01, "discriminator_lr": 0.01, "layer_count": 1}}"#;
        let config = RunConfig::from_json(json).unwrap();
        assert_eq!(config.training, TrainingConfig::default());
        assert_eq!(config.store, StoreConfig::default());
    }

    #[test]
    fn invalid_model_in_json_is_rejected() {
        let json = r#"{"model": {"name": "m", "feature_count": 0, "recurrent_units": 8,
            "batch_size": 2, "generator_lr": 0.01, "discriminator_lr": 0.01, "layer_count": 1}}"#;
        assert!(RunConfig::from_json(json).is_err());
    }
}
