//! MLLR sufficient statistics accumulated from decoded results.

use std::sync::Arc;

use ndarray::{Array1, Array2};
use tracing::debug;

use crate::adapt::cluster::ClusteredDensity;
use crate::constants::adapt::MIN_POSTERIOR;
use crate::error::{ModelError, Result};
use crate::logmath::LogMath;
use crate::model::ModelStore;

/// One observed frame from a decoded utterance: the feature vector, the
/// senone active at that frame, and the state-level posterior.
#[derive(Debug, Clone)]
pub struct ObservedFrame {
    /// The frame's feature vector.
    pub features: Vec<f32>,
    /// Dense id of the senone active at this frame.
    pub senone: u32,
    /// State-level posterior of the senone at this frame.
    pub posterior: f32,
}

/// A decoded utterance result: the per-frame senone timeline produced by an
/// upstream recognizer.
#[derive(Debug, Clone, Default)]
pub struct DecodedResult {
    /// The frames of the utterance in time order.
    pub frames: Vec<ObservedFrame>,
}

impl DecodedResult {
    /// An empty result.
    pub fn new() -> Self {
        Self::default()
    }
}

/// Per-regression-class accumulators.
///
/// For each feature dimension `i`, `g[i]` is the `(d+1) x (d+1)`
/// outer-product accumulator and `z[i]` the `(d+1)` mean-weighted
/// accumulator of the per-class linear system.
#[derive(Debug, Clone)]
pub struct ClassAccumulator {
    pub(crate) g: Vec<Array2<f64>>,
    pub(crate) z: Vec<Array1<f64>>,
    /// Total posterior mass collected for this class.
    pub(crate) occupancy: f64,
}

impl ClassAccumulator {
    pub(crate) fn zeros(dim: usize) -> Self {
        Self {
            g: (0..dim).map(|_| Array2::zeros((dim + 1, dim + 1))).collect(),
            z: (0..dim).map(|_| Array1::zeros(dim + 1)).collect(),
            occupancy: 0.0,
        }
    }

    fn reset(&mut self) {
        for g in &mut self.g {
            g.fill(0.0);
        }
        for z in &mut self.z {
            z.fill(0.0);
        }
        self.occupancy = 0.0;
    }

    /// Total posterior mass collected for this class.
    pub fn occupancy(&self) -> f64 {
        self.occupancy
    }
}

/// Immutable view of the accumulated statistics handed to the solver.
#[derive(Debug, Clone, Copy)]
pub struct StatsSnapshot<'a> {
    pub(crate) classes: &'a [ClassAccumulator],
    pub(crate) dim: usize,
}

impl StatsSnapshot<'_> {
    /// Number of regression classes.
    pub fn num_classes(&self) -> usize {
        self.classes.len()
    }

    /// Feature dimensionality.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// The accumulator of one class.
    pub fn class(&self, c: usize) -> &ClassAccumulator {
        &self.classes[c]
    }
}

/// Accumulates MLLR sufficient statistics over decoded results.
///
/// Not reentrant; callers feeding results from several threads must
/// serialize. Accumulators are monotonically additive across utterances
/// until [`reset`](Self::reset).
pub struct Stats {
    store: Arc<ModelStore>,
    clusters: Arc<ClusteredDensity>,
    logmath: LogMath,
    classes: Vec<ClassAccumulator>,
    dim: usize,
    frames: u64,
}

impl Stats {
    /// Create an empty accumulator over the given model and clustering.
    ///
    /// Adaptation operates on the single feature stream of continuous
    /// models; multi-stream models are rejected.
    pub fn new(
        store: Arc<ModelStore>,
        clusters: Arc<ClusteredDensity>,
        logmath: LogMath,
    ) -> Result<Self> {
        if store.num_streams() != 1 || store.stream_vector_lengths().len() != 1 {
            return Err(ModelError::ModelMalformed(format!(
                "adaptation requires a single feature stream, model has {}",
                store.num_streams()
            )));
        }
        let dim = store.stream_vector_lengths()[0];
        let num_classes = clusters.num_classes();
        Ok(Self {
            store,
            clusters,
            logmath,
            classes: (0..num_classes).map(|_| ClassAccumulator::zeros(dim)).collect(),
            dim,
            frames: 0,
        })
    }

    /// Feature dimensionality of the accumulators.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// Number of frames folded in so far.
    pub fn frames(&self) -> u64 {
        self.frames
    }

    /// Accumulate one decoded result's frame timeline.
    pub fn collect(&mut self, result: &DecodedResult) -> Result<()> {
        let num_gaussians = self.store.num_gaussians_per_state();
        for frame in &result.frames {
            if frame.features.len() != self.dim {
                return Err(ModelError::ModelMalformed(format!(
                    "feature dimension {} does not match model dimension {}",
                    frame.features.len(),
                    self.dim
                )));
            }
            let senone_id = frame.senone as usize;
            if senone_id >= self.store.num_senones() {
                return Err(ModelError::ModelMalformed(format!(
                    "senone id {} outside [0, {})",
                    senone_id,
                    self.store.num_senones()
                )));
            }

            let gmm = self.store.senone(senone_id).as_gaussian_mixture();
            let posteriors = gmm.component_posteriors(&frame.features, &self.logmath);

            // extended observation [o_t; 1]
            let mut xi = Array1::zeros(self.dim + 1);
            for (i, &f) in frame.features.iter().enumerate() {
                xi[i] = f as f64;
            }
            xi[self.dim] = 1.0;
            let outer = outer_product(&xi);

            for (k, &component_posterior) in posteriors.iter().enumerate() {
                let gamma = frame.posterior * component_posterior;
                if gamma < MIN_POSTERIOR {
                    continue;
                }
                let gaussian_id = senone_id * num_gaussians + k;
                let class = self.clusters.class_of(gaussian_id);
                let mean = self.store.mean(gaussian_id);
                let variance = self.store.variance(gaussian_id);

                let acc = &mut self.classes[class];
                acc.occupancy += gamma as f64;
                for i in 0..self.dim {
                    let weight = gamma as f64 / variance[i] as f64;
                    acc.g[i].scaled_add(weight, &outer);
                    acc.z[i].scaled_add(weight * mean[i] as f64, &xi);
                }
            }
            self.frames += 1;
        }
        debug!("collected {} frames", self.frames);
        Ok(())
    }

    /// Zero all accumulators.
    pub fn reset(&mut self) {
        for class in &mut self.classes {
            class.reset();
        }
        self.frames = 0;
    }

    /// An immutable view of the accumulators for the solver.
    pub fn snapshot(&self) -> StatsSnapshot<'_> {
        StatsSnapshot {
            classes: &self.classes,
            dim: self.dim,
        }
    }
}

fn outer_product(xi: &Array1<f64>) -> Array2<f64> {
    let n = xi.len();
    Array2::from_shape_fn((n, n), |(r, c)| xi[r] * xi[c])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::model::testing::{write_tiny_model, TinyModel};
    use crate::model::ModelLoader;
    use tempfile::tempdir;

    fn tiny_store() -> Arc<ModelStore> {
        let dir = tempdir().unwrap();
        write_tiny_model(dir.path(), &TinyModel::default()).unwrap();
        let loader = ModelLoader::new(LoaderConfig::new(dir.path()), LogMath::new()).unwrap();
        Arc::new(loader.load().unwrap())
    }

    fn frame(features: Vec<f32>, senone: u32) -> ObservedFrame {
        ObservedFrame {
            features,
            senone,
            posterior: 1.0,
        }
    }

    #[test]
    fn test_accumulators_match_hand_computation() {
        let store = tiny_store();
        let clusters =
            Arc::new(ClusteredDensity::cluster(store.means_pool(), 1).unwrap());
        let mut stats = Stats::new(store, clusters, LogMath::new()).unwrap();

        let mut result = DecodedResult::new();
        result.frames.push(frame(vec![1.0, 3.0], 0));
        stats.collect(&result).unwrap();

        // single gaussian, unit variance: weight = 1 for every dimension
        let snapshot = stats.snapshot();
        let acc = snapshot.class(0);
        let xi = [1.0f64, 3.0, 1.0];
        for i in 0..2 {
            for r in 0..3 {
                for c in 0..3 {
                    assert!((acc.g[i][[r, c]] - xi[r] * xi[c]).abs() < 1e-9);
                }
                // mean of senone 0 is the origin, so z stays zero
                assert!(acc.z[i][r].abs() < 1e-9);
            }
        }
        assert_eq!(stats.frames(), 1);
        assert!((acc.occupancy() - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_collect_is_additive_and_reset_zeroes() {
        let store = tiny_store();
        let clusters =
            Arc::new(ClusteredDensity::cluster(store.means_pool(), 1).unwrap());
        let mut stats = Stats::new(store, clusters, LogMath::new()).unwrap();

        let mut result = DecodedResult::new();
        result.frames.push(frame(vec![0.5, 0.5], 0));
        stats.collect(&result).unwrap();
        let first = stats.snapshot().class(0).g[0][[0, 0]];
        stats.collect(&result).unwrap();
        let second = stats.snapshot().class(0).g[0][[0, 0]];
        assert!((second - 2.0 * first).abs() < 1e-9);

        stats.reset();
        assert_eq!(stats.frames(), 0);
        assert_eq!(stats.snapshot().class(0).g[0][[0, 0]], 0.0);
    }

    #[test]
    fn test_dimension_mismatch_rejected() {
        let store = tiny_store();
        let clusters =
            Arc::new(ClusteredDensity::cluster(store.means_pool(), 1).unwrap());
        let mut stats = Stats::new(store, clusters, LogMath::new()).unwrap();

        let mut result = DecodedResult::new();
        result.frames.push(frame(vec![1.0], 0));
        assert!(stats.collect(&result).is_err());
    }

    #[test]
    fn test_unknown_senone_rejected() {
        let store = tiny_store();
        let clusters =
            Arc::new(ClusteredDensity::cluster(store.means_pool(), 1).unwrap());
        let mut stats = Stats::new(store, clusters, LogMath::new()).unwrap();

        let mut result = DecodedResult::new();
        result.frames.push(frame(vec![0.0, 0.0], 7));
        assert!(stats.collect(&result).is_err());
    }
}
