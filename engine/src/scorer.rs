//! Bootstrap fitness scorer
//!
//! Fitness is the bootstrap confidence interval of the mean per-question
//! accuracy, plus the median of the resampled means. Percentiles use linear
//! interpolation between closest ranks.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sdk::errors::EngineError;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::config::ScorerConfig;

/// Resampling settings
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapConfig {
    pub samples: usize,
    pub confidence_level: f64,
    pub seed: Option<u64>,
}

impl Default for BootstrapConfig {
    fn default() -> Self {
        Self {
            samples: 100_000,
            confidence_level: 0.95,
            seed: None,
        }
    }
}

impl BootstrapConfig {
    pub fn from_config(config: &ScorerConfig) -> Self {
        Self {
            samples: config.bootstrap_samples,
            confidence_level: config.confidence_level,
            seed: config.seed,
        }
    }
}

/// Interval bounds and median as fractions in `[0, 1]`
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FitnessSummary {
    pub lower: f64,
    pub upper: f64,
    pub median: f64,
    pub confidence_level: f64,
}

impl fmt::Display for FitnessSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}% Bootstrap Confidence Interval: ({:.1}%, {:.1}%), Median: {:.1}%",
            (self.confidence_level * 100.0).round(),
            self.lower * 100.0,
            self.upper * 100.0,
            self.median * 100.0
        )
    }
}

pub fn mean(data: &[f64]) -> f64 {
    if data.is_empty() {
        return 0.0;
    }
    data.iter().sum::<f64>() / data.len() as f64
}

/// Linear-interpolated percentile of already sorted data, `q` in `[0, 100]`
fn percentile(sorted: &[f64], q: f64) -> f64 {
    match sorted.len() {
        0 => 0.0,
        1 => sorted[0],
        n => {
            let rank = (q / 100.0).clamp(0.0, 1.0) * (n - 1) as f64;
            let lo = rank.floor() as usize;
            let hi = rank.ceil() as usize;
            let weight = rank - lo as f64;
            sorted[lo] + (sorted[hi] - sorted[lo]) * weight
        }
    }
}

/// Bootstrap the mean of `data`
///
/// # Errors
///
/// Returns [`EngineError::Scoring`] for empty input or a zero sample count.
pub fn bootstrap_confidence_interval(
    data: &[f64],
    config: &BootstrapConfig,
) -> Result<FitnessSummary, EngineError> {
    if data.is_empty() {
        return Err(EngineError::Scoring(
            "cannot bootstrap an empty accuracy list".to_string(),
        ));
    }
    if config.samples == 0 {
        return Err(EngineError::Scoring(
            "bootstrap needs at least one resample".to_string(),
        ));
    }

    let mut rng = match config.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };

    let n = data.len();
    let mut means: Vec<f64> = (0..config.samples)
        .map(|_| {
            let total: f64 = (0..n).map(|_| data[rng.gen_range(0..n)]).sum();
            total / n as f64
        })
        .collect();
    means.sort_by(|a, b| a.total_cmp(b));

    let lower_q = (1.0 - config.confidence_level) / 2.0;
    let upper_q = 1.0 - lower_q;

    Ok(FitnessSummary {
        lower: percentile(&means, lower_q * 100.0),
        upper: percentile(&means, upper_q * 100.0),
        median: percentile(&means, 50.0),
        confidence_level: config.confidence_level,
    })
}
