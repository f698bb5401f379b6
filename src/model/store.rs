//! The in-memory acoustic model.

use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::model::hmm::HmmManager;
use crate::model::pool::{Feature, Pool};
use crate::model::senone::Senone;
use crate::model::unit::Unit;

/// A passive container of the pools and maps assembled by the loader.
///
/// Immutable after load; it may be shared read-only across threads. All
/// fields are populated except the four transformation pools and the
/// feature transform, which are absent when the model does not carry them.
#[derive(Debug)]
pub struct ModelStore {
    pub(crate) means: Pool<Vec<f32>>,
    pub(crate) variances: Pool<Vec<f32>>,
    pub(crate) mixture_weights: Pool<Vec<f32>>,
    pub(crate) transitions: Pool<Vec<Vec<f32>>>,
    pub(crate) senones: Pool<Senone>,

    pub(crate) mean_transformation_matrices: Option<Pool<Vec<Vec<f32>>>>,
    pub(crate) mean_transformation_vectors: Option<Pool<Vec<f32>>>,
    pub(crate) variance_transformation_matrices: Option<Pool<Vec<Vec<f32>>>>,
    pub(crate) variance_transformation_vectors: Option<Pool<Vec<f32>>>,

    pub(crate) transform_matrix: Option<Vec<Vec<f32>>>,

    pub(crate) context_independent_units: HashMap<String, Arc<Unit>>,
    pub(crate) hmm_manager: HmmManager,
    pub(crate) properties: HashMap<String, String>,

    /// Per-stream feature vector lengths from the means file.
    pub(crate) stream_vector_lengths: Vec<usize>,
}

impl ModelStore {
    /// The pool of Gaussian mean vectors.
    pub fn means_pool(&self) -> &Pool<Vec<f32>> {
        &self.means
    }

    /// The pool of Gaussian variance vectors.
    pub fn variance_pool(&self) -> &Pool<Vec<f32>> {
        &self.variances
    }

    /// The pool of log-domain mixture weight vectors.
    pub fn mixture_weights_pool(&self) -> &Pool<Vec<f32>> {
        &self.mixture_weights
    }

    /// The pool of log-domain transition matrices.
    pub fn transition_matrix_pool(&self) -> &Pool<Vec<Vec<f32>>> {
        &self.transitions
    }

    /// The pool of senones.
    pub fn senone_pool(&self) -> &Pool<Senone> {
        &self.senones
    }

    /// The mean transformation matrix pool, if the model carries one.
    pub fn mean_transformation_matrix_pool(&self) -> Option<&Pool<Vec<Vec<f32>>>> {
        self.mean_transformation_matrices.as_ref()
    }

    /// The mean transformation vector pool, if the model carries one.
    pub fn mean_transformation_vector_pool(&self) -> Option<&Pool<Vec<f32>>> {
        self.mean_transformation_vectors.as_ref()
    }

    /// The variance transformation matrix pool, if the model carries one.
    pub fn variance_transformation_matrix_pool(&self) -> Option<&Pool<Vec<Vec<f32>>>> {
        self.variance_transformation_matrices.as_ref()
    }

    /// The variance transformation vector pool, if the model carries one.
    pub fn variance_transformation_vector_pool(&self) -> Option<&Pool<Vec<f32>>> {
        self.variance_transformation_vectors.as_ref()
    }

    /// The front-end feature transform, if the model carries one.
    pub fn transform_matrix(&self) -> Option<&Vec<Vec<f32>>> {
        self.transform_matrix.as_ref()
    }

    /// The context-independent units by name.
    pub fn context_independent_units(&self) -> &HashMap<String, Arc<Unit>> {
        &self.context_independent_units
    }

    /// The HMM registry.
    pub fn hmm_manager(&self) -> &HmmManager {
        &self.hmm_manager
    }

    /// Model properties from `feat.params`.
    pub fn properties(&self) -> &HashMap<String, String> {
        &self.properties
    }

    /// Number of senones in the model.
    pub fn num_senones(&self) -> usize {
        self.mixture_weights.feature(Feature::NumSenones, 0) as usize
    }

    /// Number of Gaussians per tied state.
    pub fn num_gaussians_per_state(&self) -> usize {
        self.mixture_weights.feature(Feature::NumGaussiansPerState, 0) as usize
    }

    /// Number of feature streams.
    pub fn num_streams(&self) -> usize {
        self.mixture_weights.feature(Feature::NumStreams, 1) as usize
    }

    /// Per-stream feature vector lengths from the means file.
    pub fn stream_vector_lengths(&self) -> &[usize] {
        &self.stream_vector_lengths
    }

    /// A senone by dense id.
    pub fn senone(&self, id: usize) -> &Senone {
        self.senones.get(id)
    }

    /// The mean vector of Gaussian `gaussian_id`
    /// (`senone_id * num_gaussians_per_state + component`).
    pub fn mean(&self, gaussian_id: usize) -> &[f32] {
        self.means.get(gaussian_id)
    }

    /// The variance vector of Gaussian `gaussian_id`.
    pub fn variance(&self, gaussian_id: usize) -> &[f32] {
        self.variances.get(gaussian_id)
    }

    /// Log every pool's name and size, plus unit and HMM counts.
    pub fn log_info(&self) {
        self.means.log_info();
        self.variances.log_info();
        self.mixture_weights.log_info();
        self.transitions.log_info();
        self.senones.log_info();
        info!(
            "Context Independent Unit Entries: {}",
            self.context_independent_units.len()
        );
        self.hmm_manager.log_info();
    }
}
