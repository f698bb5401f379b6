//! Application of solved transforms to the mean vectors.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::adapt::cluster::ClusteredDensity;
use crate::adapt::transform::Transform;
use crate::constants::s3::DENSITY_FILE_VERSION;
use crate::error::{ModelError, Result};
use crate::model::ModelStore;
use crate::s3::S3Writer;

/// Applies per-class transforms to the means pool and writes the adapted
/// means file.
///
/// The in-memory pool is never mutated; the applier materializes a fresh
/// buffer shaped exactly like the on-disk means file.
pub struct TransformApplier {
    store: Arc<ModelStore>,
    clusters: Arc<ClusteredDensity>,
}

impl TransformApplier {
    /// Create an applier over the given model and clustering.
    pub fn new(store: Arc<ModelStore>, clusters: Arc<ClusteredDensity>) -> Self {
        Self { store, clusters }
    }

    /// Produce the adapted mean vectors, one per Gaussian, in pool order.
    pub fn transformed_means(&self, transform: &Transform) -> Result<Vec<Vec<f32>>> {
        let means = self.store.means_pool();
        let mut adapted = Vec::with_capacity(means.size());
        for (gaussian_id, mean) in means.iter().enumerate() {
            if mean.len() != transform.dimension() {
                return Err(ModelError::ModelMalformed(format!(
                    "mean dimension {} does not match transform dimension {}",
                    mean.len(),
                    transform.dimension()
                )));
            }
            let class = self.clusters.class_of(gaussian_id);
            adapted.push(transform.apply(class, mean));
        }
        Ok(adapted)
    }

    /// Apply `transform` and write the adapted means to `path` in the same
    /// S3 binary layout as the input means file, with a trailing checksum.
    pub fn write_means_file(&self, transform: &Transform, path: &Path) -> Result<()> {
        let adapted = self.transformed_means(transform)?;

        let num_senones = self.store.num_senones();
        let num_streams = self.store.num_streams();
        let num_gaussians = self.store.num_gaussians_per_state();
        let vector_lengths = self.store.stream_vector_lengths();
        let raw_length: usize = num_senones
            * num_gaussians
            * vector_lengths.iter().sum::<usize>();

        let mut writer = S3Writer::create(path, DENSITY_FILE_VERSION)?;
        writer.write_int(num_senones as i32)?;
        writer.write_int(num_streams as i32)?;
        writer.write_int(num_gaussians as i32)?;
        for &length in vector_lengths {
            writer.write_int(length as i32)?;
        }
        writer.write_int(raw_length as i32)?;
        for vector in &adapted {
            writer.write_float_array(vector)?;
        }
        writer.finish()?;

        info!(
            "wrote adapted means for {} gaussians to {}",
            adapted.len(),
            path.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::LoaderConfig;
    use crate::logmath::LogMath;
    use crate::model::testing::{write_tiny_model, TinyModel};
    use crate::model::ModelLoader;
    use tempfile::tempdir;

    fn tiny_store(dir: &Path) -> Arc<ModelStore> {
        write_tiny_model(dir, &TinyModel::default()).unwrap();
        let loader = ModelLoader::new(LoaderConfig::new(dir), LogMath::new()).unwrap();
        Arc::new(loader.load().unwrap())
    }

    #[test]
    fn test_identity_writes_bit_identical_means() {
        let dir = tempdir().unwrap();
        let store = tiny_store(dir.path());
        let clusters = Arc::new(ClusteredDensity::cluster(store.means_pool(), 1).unwrap());
        let applier = TransformApplier::new(store.clone(), clusters);

        let out = dir.path().join("means.adapted");
        let identity = Transform::identity(1, 2);
        applier.write_means_file(&identity, &out).unwrap();

        let original = std::fs::read(dir.path().join("means")).unwrap();
        let adapted = std::fs::read(&out).unwrap();
        assert_eq!(original, adapted);
    }

    #[test]
    fn test_adapted_means_reload() {
        let dir = tempdir().unwrap();
        let store = tiny_store(dir.path());
        let clusters = Arc::new(ClusteredDensity::cluster(store.means_pool(), 1).unwrap());
        let applier = TransformApplier::new(store.clone(), clusters);

        let mut transform = Transform::identity(1, 2);
        // shift every mean by [1, -1]
        transform.class_b_mut(0)[0] = 1.0;
        transform.class_b_mut(0)[1] = -1.0;
        applier
            .write_means_file(&transform, &dir.path().join("means"))
            .unwrap();

        let reloaded = ModelLoader::new(LoaderConfig::new(dir.path()), LogMath::new())
            .unwrap()
            .load()
            .unwrap();
        assert_eq!(reloaded.mean(0), &[1.0, -1.0]);
        assert_eq!(reloaded.mean(1), &[3.0, 1.0]);
    }
}
