//! Partitioning of Gaussian means into regression classes.

use tracing::debug;

use crate::constants::adapt::MAX_CLUSTER_ITERATIONS;
use crate::error::{ModelError, Result};
use crate::model::Pool;

/// Assignment of every Gaussian mean to one of `K` regression classes.
///
/// Built once over the means pool by Lloyd iteration on Euclidean distance;
/// deterministic for a fixed pool and class count.
#[derive(Debug)]
pub struct ClusteredDensity {
    assignments: Vec<usize>,
    num_classes: usize,
}

impl ClusteredDensity {
    /// Cluster the means pool into `num_classes` regression classes.
    ///
    /// Centroids are seeded with every `num_means / num_classes`-th mean and
    /// refined until assignments stop changing or the iteration cap is hit.
    /// `num_classes == 1` is the global-MLLR case and returns immediately.
    pub fn cluster(means: &Pool<Vec<f32>>, num_classes: usize) -> Result<Self> {
        let num_means = means.size();
        if num_classes == 0 {
            return Err(ModelError::Configuration(
                "number of regression classes must be positive".to_string(),
            ));
        }
        if num_classes > num_means {
            return Err(ModelError::Configuration(format!(
                "{} regression classes for {} gaussians",
                num_classes, num_means
            )));
        }

        if num_classes == 1 {
            return Ok(Self {
                assignments: vec![0; num_means],
                num_classes,
            });
        }

        let stride = num_means / num_classes;
        let mut centroids: Vec<Vec<f64>> = (0..num_classes)
            .map(|c| means.get(c * stride).iter().map(|&v| v as f64).collect())
            .collect();
        let mut assignments = vec![usize::MAX; num_means];

        for iteration in 0..MAX_CLUSTER_ITERATIONS {
            // assignment step; ties go to the lowest class id
            let mut changed = false;
            for g in 0..num_means {
                let mean = means.get(g);
                let mut best_class = 0usize;
                let mut best_distance = f64::INFINITY;
                for (c, centroid) in centroids.iter().enumerate() {
                    let distance = squared_distance(mean, centroid);
                    if distance < best_distance {
                        best_distance = distance;
                        best_class = c;
                    }
                }
                if assignments[g] != best_class {
                    assignments[g] = best_class;
                    changed = true;
                }
            }
            if !changed {
                debug!("clustering converged after {} iterations", iteration);
                break;
            }

            // update step; empty classes keep their previous centroid
            let dim = centroids[0].len();
            let mut sums = vec![vec![0.0f64; dim]; num_classes];
            let mut counts = vec![0usize; num_classes];
            for (g, &c) in assignments.iter().enumerate() {
                counts[c] += 1;
                for (i, &v) in means.get(g).iter().enumerate() {
                    sums[c][i] += v as f64;
                }
            }
            for c in 0..num_classes {
                if counts[c] > 0 {
                    for i in 0..dim {
                        centroids[c][i] = sums[c][i] / counts[c] as f64;
                    }
                }
            }
        }

        // a class left empty by coincident means reclaims its seed; the
        // theft can empty the donor in turn, so repeat until stable. Once a
        // class holds its own seed nothing can take it back, so this
        // terminates within num_classes sweeps.
        let mut counts = vec![0usize; num_classes];
        for &c in &assignments {
            counts[c] += 1;
        }
        loop {
            let mut stable = true;
            for c in 0..num_classes {
                if counts[c] == 0 {
                    let seed = c * stride;
                    let donor = assignments[seed];
                    debug!(
                        "class {} empty after clustering, reclaiming seed from class {}",
                        c, donor
                    );
                    counts[donor] -= 1;
                    assignments[seed] = c;
                    counts[c] += 1;
                    stable = false;
                }
            }
            if stable {
                break;
            }
        }

        Ok(Self {
            assignments,
            num_classes,
        })
    }

    /// The regression class of Gaussian `gaussian_id`.
    pub fn class_of(&self, gaussian_id: usize) -> usize {
        self.assignments[gaussian_id]
    }

    /// Number of regression classes.
    pub fn num_classes(&self) -> usize {
        self.num_classes
    }

    /// The full assignment map, indexed by Gaussian id.
    pub fn assignments(&self) -> &[usize] {
        &self.assignments
    }
}

fn squared_distance(mean: &[f32], centroid: &[f64]) -> f64 {
    mean.iter()
        .zip(centroid)
        .map(|(&m, &c)| {
            let diff = m as f64 - c;
            diff * diff
        })
        .sum()
}
