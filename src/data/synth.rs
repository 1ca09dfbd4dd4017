//! Seeded synthetic datasets for demos and tests.
//!
//! Points sit on an evenly spaced x grid (as a bench sweep would). Each reading
//! gets Gaussian noise with the same `SigmaConvention` the ingest side uses, so a
//! generated `Raw` file reads back with consistent error bars.

use rand::prelude::*;
use rand::rngs::StdRng;
use rand_distr::Normal;

use crate::domain::{ModelKind, Sample, SigmaConvention};
use crate::error::AppError;
use crate::models::predict;

#[derive(Debug, Clone)]
pub struct SynthConfig {
    pub model: ModelKind,
    pub params: Vec<f64>,
    pub points: usize,
    pub x_min: f64,
    pub x_max: f64,
    /// y-noise model; also the σy stored with each sample.
    pub noise: SigmaConvention,
    /// Std dev of x jitter; stored as σx. Zero disables it.
    pub sigma_x: f64,
    pub seed: u64,
}

pub fn generate_dataset(config: &SynthConfig) -> Result<Vec<Sample>, AppError> {
    if config.points < 2 {
        return Err(AppError::new(2, "Synthetic dataset needs at least 2 points."));
    }
    if !(config.x_min.is_finite() && config.x_max.is_finite() && config.x_max > config.x_min) {
        return Err(AppError::new(2, "Invalid x range for synthetic dataset."));
    }
    if config.params.len() != config.model.param_count() || !config.params.iter().all(|p| p.is_finite()) {
        return Err(AppError::new(
            2,
            format!(
                "Model {} needs {} finite parameters ({}).",
                config.model.display_name(),
                config.model.param_count(),
                config.model.param_names().join(", ")
            ),
        ));
    }
    let noise_ok = |v: f64| v.is_finite() && v >= 0.0;
    if !(noise_ok(config.noise.absolute) && noise_ok(config.noise.relative) && noise_ok(config.sigma_x)) {
        return Err(AppError::new(2, "Noise levels must be finite and non-negative."));
    }

    let mut rng = StdRng::seed_from_u64(config.seed);
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| AppError::new(4, format!("Noise distribution error: {e}")))?;

    let step = (config.x_max - config.x_min) / (config.points - 1) as f64;
    let mut samples = Vec::with_capacity(config.points);
    for i in 0..config.points {
        let x_true = config.x_min + step * i as f64;
        let y_true = predict(config.model, x_true, &config.params);
        let sigma_y = config.noise.sigma_for(y_true);

        let dy: f64 = normal.sample(&mut rng);
        let dx: f64 = normal.sample(&mut rng);
        samples.push(Sample::new(
            x_true + config.sigma_x * dx,
            y_true + sigma_y * dy,
            config.sigma_x,
            sigma_y,
        ));
    }

    Ok(samples)
}
