//! Senones: tied HMM states realized as Gaussian mixtures.

use std::sync::Arc;

use crate::logmath::{LogMath, LOG_ZERO};

/// A single diagonal-covariance Gaussian component.
///
/// Mean and variance transformations, when present, are folded in at
/// construction time; scoring works on the transformed parameters.
#[derive(Debug, Clone)]
pub struct MixtureComponent {
    mean: Vec<f32>,
    variance: Vec<f32>,
    /// `-0.5 * sum(ln(2 * pi * variance_i))`, the log of the Gaussian
    /// normalization factor.
    log_factor: f32,
    /// Lower bound on the log density.
    score_floor: f32,
}

impl MixtureComponent {
    /// Build a component from raw pool vectors.
    ///
    /// `mean_transform` and `variance_transform` are optional affine
    /// transformations `(matrix, vector)`; `None` means identity. The
    /// variance is floored to `variance_floor` after transformation, and
    /// densities are floored to `dist_floor` during scoring.
    pub fn new(
        mean: &[f32],
        mean_transform: Option<(&[Vec<f32>], &[f32])>,
        variance: &[f32],
        variance_transform: Option<(&[Vec<f32>], &[f32])>,
        dist_floor: f32,
        variance_floor: f32,
    ) -> Self {
        let mean = apply_transform(mean, mean_transform);
        let mut variance = apply_transform(variance, variance_transform);
        for v in variance.iter_mut() {
            if *v < variance_floor {
                *v = variance_floor;
            }
        }

        let log_factor = -0.5
            * variance
                .iter()
                .map(|&v| (2.0 * std::f32::consts::PI * v).ln())
                .sum::<f32>();
        let score_floor = if dist_floor > 0.0 {
            dist_floor.ln()
        } else {
            LOG_ZERO
        };

        Self {
            mean,
            variance,
            log_factor,
            score_floor,
        }
    }

    /// The (transformed) mean vector.
    pub fn mean(&self) -> &[f32] {
        &self.mean
    }

    /// The (transformed, floored) variance vector.
    pub fn variance(&self) -> &[f32] {
        &self.variance
    }

    /// Feature dimensionality of this component.
    pub fn dimension(&self) -> usize {
        self.mean.len()
    }

    /// Natural-log density of `feature` under this Gaussian, floored to the
    /// configured minimum density.
    pub fn score(&self, feature: &[f32]) -> f32 {
        debug_assert_eq!(feature.len(), self.mean.len());
        let mut exponent = 0.0f32;
        for i in 0..self.mean.len() {
            let diff = feature[i] - self.mean[i];
            exponent += diff * diff / self.variance[i];
        }
        let score = self.log_factor - 0.5 * exponent;
        score.max(self.score_floor)
    }
}

fn apply_transform(data: &[f32], transform: Option<(&[Vec<f32>], &[f32])>) -> Vec<f32> {
    match transform {
        None => data.to_vec(),
        Some((matrix, vector)) => {
            let mut out = vec![0.0f32; data.len()];
            for (i, row) in matrix.iter().enumerate() {
                let mut sum = 0.0f32;
                for (j, &m) in row.iter().enumerate() {
                    sum += m * data[j];
                }
                out[i] = sum + vector[i];
            }
            out
        }
    }
}

/// A Gaussian mixture over a shared feature stream.
///
/// Mixture weights are stored in the log domain, one block of
/// `num_components` weights per stream.
#[derive(Debug, Clone)]
pub struct GaussianMixture {
    id: u32,
    log_mixture_weights: Vec<f32>,
    components: Vec<MixtureComponent>,
}

impl GaussianMixture {
    /// Assemble a mixture from its weights and components.
    pub fn new(id: u32, log_mixture_weights: Vec<f32>, components: Vec<MixtureComponent>) -> Self {
        Self {
            id,
            log_mixture_weights,
            components,
        }
    }

    /// The dense senone id of this mixture.
    pub fn id(&self) -> u32 {
        self.id
    }

    /// The mixture components in order.
    pub fn components(&self) -> &[MixtureComponent] {
        &self.components
    }

    /// The log-domain mixture weights.
    pub fn log_mixture_weights(&self) -> &[f32] {
        &self.log_mixture_weights
    }

    /// Log-likelihood of `feature` under the mixture.
    pub fn score(&self, feature: &[f32], logmath: &LogMath) -> f32 {
        let mut total = LOG_ZERO;
        for (k, component) in self.components.iter().enumerate() {
            let weighted = self.log_mixture_weights[k] + component.score(feature);
            total = logmath.add_as_linear(total, weighted);
        }
        total
    }

    /// Per-component posteriors of `feature`: the weighted linear density of
    /// each component normalized over the mixture.
    ///
    /// Returns all zeros when every component underflows.
    pub fn component_posteriors(&self, feature: &[f32], logmath: &LogMath) -> Vec<f32> {
        let scores: Vec<f32> = self
            .components
            .iter()
            .enumerate()
            .map(|(k, c)| self.log_mixture_weights[k] + c.score(feature))
            .collect();
        let best = scores.iter().cloned().fold(LOG_ZERO, f32::max);
        if best <= LOG_ZERO {
            return vec![0.0; scores.len()];
        }
        let linear: Vec<f32> = scores
            .iter()
            .map(|&s| logmath.log_to_linear(s - best))
            .collect();
        let sum: f32 = linear.iter().sum();
        linear.iter().map(|&p| p / sum).collect()
    }
}

/// A tied HMM state. Polymorphic over the scoring capability set; the
/// continuous models this crate loads use Gaussian mixtures.
#[derive(Debug, Clone)]
pub enum Senone {
    /// A Gaussian mixture senone.
    GaussianMixture(GaussianMixture),
}

impl Senone {
    /// The dense senone id.
    pub fn id(&self) -> u32 {
        match self {
            Self::GaussianMixture(gmm) => gmm.id(),
        }
    }

    /// Log-likelihood of `feature` under this senone.
    pub fn score(&self, feature: &[f32], logmath: &LogMath) -> f32 {
        match self {
            Self::GaussianMixture(gmm) => gmm.score(feature, logmath),
        }
    }

    /// The underlying Gaussian mixture.
    pub fn as_gaussian_mixture(&self) -> &GaussianMixture {
        match self {
            Self::GaussianMixture(gmm) => gmm,
        }
    }
}

/// An ordered sequence of senone ids backing the emitting states of an HMM.
///
/// Senones are shared read-only handles into the senone pool; sequences are
/// shared between HMMs via `Arc`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SenoneSequence {
    senone_ids: Vec<u32>,
}

impl SenoneSequence {
    /// Wrap a list of senone ids.
    pub fn new(senone_ids: Vec<u32>) -> Arc<Self> {
        Arc::new(Self { senone_ids })
    }

    /// The senone ids in state order.
    pub fn senone_ids(&self) -> &[u32] {
        &self.senone_ids
    }

    /// Number of emitting states.
    pub fn len(&self) -> usize {
        self.senone_ids.len()
    }

    /// Whether the sequence is empty.
    pub fn is_empty(&self) -> bool {
        self.senone_ids.is_empty()
    }
}
