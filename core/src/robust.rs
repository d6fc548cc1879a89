//! Robust Estimation Module
//!
//! Provides a generic RANSAC implementation that can be used for any model estimation task.

use rand::rngs::StdRng;
use rand::SeedableRng;
use std::marker::PhantomData;

/// Configuration for robust estimation
///
/// The sample size comes from [`RobustModel::min_sample_size`].
#[derive(Debug, Clone)]
pub struct RobustConfig {
    pub threshold: f64,
    pub max_iterations: usize,
    pub confidence: f64,
    /// Fixed RNG seed; `None` draws from entropy.
    pub seed: Option<u64>,
}

impl Default for RobustConfig {
    fn default() -> Self {
        Self {
            threshold: 1.0,
            max_iterations: 1000,
            confidence: 0.99,
            seed: None,
        }
    }
}

/// Result of robust estimation
#[derive(Debug, Clone)]
pub struct RobustResult<M> {
    pub model: Option<M>,
    pub inliers: Vec<bool>,
    pub num_inliers: usize,
    /// Mean error over inliers.
    pub residual: f64,
    /// Samples drawn, including the ones rejected by the validity hooks.
    pub iterations: usize,
}

/// Trait for models that can be estimated robustly
pub trait RobustModel<D> {
    type Model: Clone;

    /// Minimum number of data points required to estimate the model
    fn min_sample_size(&self) -> usize;

    /// Estimate model from a minimal sample
    fn estimate(&self, data: &[&D]) -> Option<Self::Model>;

    /// Compute error for a single data point against the model
    fn compute_error(&self, model: &Self::Model, data: &D) -> f64;

    /// Cheap rejection of a sample before estimation.
    fn is_sample_valid(&self, _sample: &[&D]) -> bool {
        true
    }

    /// Rejection of an estimated model using only its sample.
    fn is_model_valid(&self, _model: &Self::Model, _sample: &[&D]) -> bool {
        true
    }
}

/// Number of draws needed to hit an all-inlier sample with `confidence`,
/// given an inlier ratio and sample size.
pub fn adaptive_iterations(
    confidence: f64,
    inlier_ratio: f64,
    sample_size: usize,
    max_iterations: usize,
) -> usize {
    if inlier_ratio <= 0.0 {
        return max_iterations;
    }
    if inlier_ratio >= 1.0 {
        return 1.min(max_iterations);
    }
    let p_good = inlier_ratio.powi(sample_size as i32);
    let denom = (1.0 - p_good).ln();
    if !denom.is_finite() || denom >= 0.0 {
        return max_iterations;
    }
    let k = ((1.0 - confidence).ln() / denom).ceil();
    if !k.is_finite() || k >= max_iterations as f64 {
        max_iterations
    } else {
        (k as usize).max(1)
    }
}

/// Generic RANSAC engine
pub struct Ransac<D, M: RobustModel<D>> {
    config: RobustConfig,
    _phantom: PhantomData<(D, M)>,
}

impl<D, M: RobustModel<D>> Ransac<D, M> {
    pub fn new(config: RobustConfig) -> Self {
        Self {
            config,
            _phantom: PhantomData,
        }
    }

    pub fn config(&self) -> &RobustConfig {
        &self.config
    }

    pub fn run(&self, estimator: &M, data: &[D]) -> RobustResult<M::Model> {
        let n = data.len();
        let k = estimator.min_sample_size();

        if n < k || k == 0 {
            return RobustResult {
                model: None,
                inliers: vec![false; n],
                num_inliers: 0,
                residual: f64::INFINITY,
                iterations: 0,
            };
        }

        let mut best_model = None;
        let mut best_inliers = vec![false; n];
        let mut best_num_inliers = 0;
        let mut best_residual = f64::INFINITY;

        let mut rng = match self.config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };

        let mut budget = self.config.max_iterations;
        let mut iterations = 0;

        while iterations < budget {
            iterations += 1;

            // 1. Sample
            let picks = rand::seq::index::sample(&mut rng, n, k);
            let sample: Vec<&D> = picks.iter().map(|i| &data[i]).collect();
            if !estimator.is_sample_valid(&sample) {
                continue;
            }

            // 2. Estimate
            let Some(model) = estimator.estimate(&sample) else {
                continue;
            };
            if !estimator.is_model_valid(&model, &sample) {
                continue;
            }

            // 3. Score
            let mut num_inliers = 0;
            let mut total_error = 0.0;
            for d in data {
                let err = estimator.compute_error(&model, d);
                if err < self.config.threshold {
                    num_inliers += 1;
                    total_error += err;
                }
            }

            let residual = if num_inliers > 0 {
                total_error / num_inliers as f64
            } else {
                f64::INFINITY
            };

            if num_inliers > best_num_inliers
                || (num_inliers == best_num_inliers && num_inliers > 0 && residual < best_residual)
            {
                best_num_inliers = num_inliers;
                best_model = Some(model);
                best_residual = residual;

                budget = adaptive_iterations(
                    self.config.confidence,
                    num_inliers as f64 / n as f64,
                    k,
                    self.config.max_iterations,
                );
            }
        }

        if let Some(model) = &best_model {
            for (j, d) in data.iter().enumerate() {
                best_inliers[j] = estimator.compute_error(model, d) < self.config.threshold;
            }
        }

        tracing::debug!(
            iterations,
            inliers = best_num_inliers,
            total = n,
            "ransac finished"
        );

        RobustResult {
            model: best_model,
            inliers: best_inliers,
            num_inliers: best_num_inliers,
            residual: best_residual,
            iterations,
        }
    }
}
