//! Adaptation lifecycle: collect, solve, apply.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::adapt::applier::TransformApplier;
use crate::adapt::cluster::ClusteredDensity;
use crate::adapt::stats::{DecodedResult, Stats};
use crate::adapt::transform::{SolveReport, Transform};
use crate::error::{ModelError, Result};
use crate::logmath::LogMath;
use crate::model::ModelStore;

/// Lifecycle phase of an adaptation session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolverState {
    /// No statistics collected yet.
    Empty,
    /// Statistics are being accumulated.
    Collecting,
    /// A transform is available.
    Ready,
    /// The transform has been applied to a means file.
    Applied,
}

/// A single speaker-adaptation pass over a loaded model.
///
/// Owns the regression-class clustering, the statistics accumulator, and the
/// solved transform, and enforces the collect → solve → apply ordering.
/// Single-threaded; an upstream recognizer producing results concurrently
/// must serialize its calls.
pub struct AdaptationSession {
    store: Arc<ModelStore>,
    clusters: Arc<ClusteredDensity>,
    stats: Stats,
    transform: Option<Transform>,
    state: SolverState,
}

impl AdaptationSession {
    /// Start a session over `store` with `num_classes` regression classes.
    pub fn new(store: Arc<ModelStore>, num_classes: usize, logmath: LogMath) -> Result<Self> {
        let clusters = Arc::new(ClusteredDensity::cluster(store.means_pool(), num_classes)?);
        let stats = Stats::new(store.clone(), clusters.clone(), logmath)?;
        info!(
            "adaptation session: {} regression classes over {} gaussians",
            num_classes,
            store.means_pool().size()
        );
        Ok(Self {
            store,
            clusters,
            stats,
            transform: None,
            state: SolverState::Empty,
        })
    }

    /// The current lifecycle phase.
    pub fn state(&self) -> SolverState {
        self.state
    }

    /// The regression-class clustering.
    pub fn clusters(&self) -> &Arc<ClusteredDensity> {
        &self.clusters
    }

    /// The solved (or loaded) transform, once available.
    pub fn transform(&self) -> Option<&Transform> {
        self.transform.as_ref()
    }

    /// Accumulate one decoded result.
    pub fn collect(&mut self, result: &DecodedResult) -> Result<()> {
        match self.state {
            SolverState::Empty | SolverState::Collecting => {
                self.stats.collect(result)?;
                self.state = SolverState::Collecting;
                Ok(())
            }
            state => Err(ModelError::InvalidState(format!(
                "collect called in {:?}",
                state
            ))),
        }
    }

    /// Solve the per-class transforms from the accumulated statistics.
    pub fn solve(&mut self) -> Result<SolveReport> {
        if self.state != SolverState::Collecting {
            return Err(ModelError::InvalidState(format!(
                "solve called in {:?}",
                self.state
            )));
        }
        let mut transform =
            Transform::identity(self.clusters.num_classes(), self.stats.dimension());
        let report = transform.update(&self.stats.snapshot())?;
        self.transform = Some(transform);
        self.state = SolverState::Ready;
        Ok(report)
    }

    /// Seed the session from a pre-computed on-disk MLLR transform instead
    /// of estimating one.
    pub fn load_transform(&mut self, path: &Path) -> Result<()> {
        if self.state != SolverState::Empty {
            return Err(ModelError::InvalidState(format!(
                "load_transform called in {:?}",
                self.state
            )));
        }
        let transform = Transform::load(path)?;
        if transform.num_classes() != self.clusters.num_classes() {
            return Err(ModelError::Configuration(format!(
                "transform has {} classes, session expects {}",
                transform.num_classes(),
                self.clusters.num_classes()
            )));
        }
        if transform.dimension() != self.stats.dimension() {
            return Err(ModelError::Configuration(format!(
                "transform dimension {} does not match model dimension {}",
                transform.dimension(),
                self.stats.dimension()
            )));
        }
        self.transform = Some(transform);
        self.state = SolverState::Ready;
        Ok(())
    }

    /// Write the solved transform to an MLLR file.
    pub fn save_transform(&self, path: &Path) -> Result<()> {
        match &self.transform {
            Some(transform) => transform.store(path),
            None => Err(ModelError::InvalidState(format!(
                "save_transform called in {:?}",
                self.state
            ))),
        }
    }

    /// Apply the transform to the means and write the adapted means file.
    pub fn apply_to_means_file(&mut self, path: &Path) -> Result<()> {
        if self.state != SolverState::Ready {
            return Err(ModelError::InvalidState(format!(
                "apply called in {:?}",
                self.state
            )));
        }
        let transform = match &self.transform {
            Some(transform) => transform,
            None => {
                return Err(ModelError::InvalidState(
                    "apply called with no transform".to_string(),
                ))
            }
        };
        let applier = TransformApplier::new(self.store.clone(), self.clusters.clone());
        applier.write_means_file(transform, path)?;
        self.state = SolverState::Applied;
        Ok(())
    }

    /// Discard all statistics and any solved transform.
    pub fn reset(&mut self) {
        self.stats.reset();
        self.transform = None;
        self.state = SolverState::Empty;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapt::stats::ObservedFrame;
    use crate::config::LoaderConfig;
    use crate::model::testing::{write_tiny_model, TinyModel};
    use crate::model::ModelLoader;
    use tempfile::tempdir;

    fn tiny_session(dir: &Path) -> AdaptationSession {
        write_tiny_model(dir, &TinyModel::default()).unwrap();
        let loader = ModelLoader::new(LoaderConfig::new(dir), LogMath::new()).unwrap();
        let store = Arc::new(loader.load().unwrap());
        AdaptationSession::new(store, 1, LogMath::new()).unwrap()
    }

    fn observation(senone: u32, features: Vec<f32>) -> DecodedResult {
        DecodedResult {
            frames: vec![ObservedFrame {
                features,
                senone,
                posterior: 1.0,
            }],
        }
    }

    #[test]
    fn test_lifecycle_ordering() {
        let dir = tempdir().unwrap();
        let mut session = tiny_session(dir.path());
        assert_eq!(session.state(), SolverState::Empty);

        // apply and solve are invalid before collecting
        assert!(matches!(
            session.apply_to_means_file(&dir.path().join("out")),
            Err(ModelError::InvalidState(_))
        ));
        assert!(matches!(session.solve(), Err(ModelError::InvalidState(_))));

        for _ in 0..8 {
            session.collect(&observation(0, vec![0.1, -0.1])).unwrap();
            session.collect(&observation(1, vec![2.1, 1.9])).unwrap();
        }
        assert_eq!(session.state(), SolverState::Collecting);

        session.solve().unwrap();
        assert_eq!(session.state(), SolverState::Ready);

        // collecting after solve is out of order
        assert!(matches!(
            session.collect(&observation(0, vec![0.0, 0.0])),
            Err(ModelError::InvalidState(_))
        ));

        session
            .apply_to_means_file(&dir.path().join("means.adapted"))
            .unwrap();
        assert_eq!(session.state(), SolverState::Applied);

        session.reset();
        assert_eq!(session.state(), SolverState::Empty);
        assert!(session.transform().is_none());
    }

    #[test]
    fn test_load_transform_seeds_ready() {
        let dir = tempdir().unwrap();
        let mut session = tiny_session(dir.path());

        let path = dir.path().join("mllr_matrix");
        Transform::identity(1, 2).store(&path).unwrap();
        session.load_transform(&path).unwrap();
        assert_eq!(session.state(), SolverState::Ready);

        session
            .apply_to_means_file(&dir.path().join("means.adapted"))
            .unwrap();
        assert_eq!(session.state(), SolverState::Applied);
    }

    #[test]
    fn test_load_transform_rejects_mismatched_classes() {
        let dir = tempdir().unwrap();
        let mut session = tiny_session(dir.path());

        let path = dir.path().join("mllr_matrix");
        Transform::identity(3, 2).store(&path).unwrap();
        assert!(matches!(
            session.load_transform(&path),
            Err(ModelError::Configuration(_))
        ));
    }
}
