//! Per-class affine transforms: estimation, file I/O, application.

use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;

use ndarray::{Array1, Array2};
use tracing::warn;

use crate::adapt::stats::StatsSnapshot;
use crate::constants::adapt::SINGULARITY_EPSILON;
use crate::error::{ModelError, Result};

/// Outcome of a solve: which regression classes fell back to the identity.
#[derive(Debug, Clone)]
pub struct SolveReport {
    /// Classes whose linear systems were numerically singular.
    pub degenerate_classes: Vec<usize>,
    dimension: usize,
}

impl SolveReport {
    /// Whether every class produced a proper transform.
    pub fn is_clean(&self) -> bool {
        self.degenerate_classes.is_empty()
    }

    /// Surface the first degeneracy as an error, for callers that require a
    /// fully estimated transform.
    pub fn require_clean(&self) -> Result<()> {
        match self.degenerate_classes.first() {
            Some(&class) => Err(ModelError::SingularSystem {
                class,
                dim: self.dimension,
            }),
            None => Ok(()),
        }
    }
}

/// Per-regression-class affine transform `(A, b)` over the mean vectors.
#[derive(Debug, Clone)]
pub struct Transform {
    a: Vec<Array2<f32>>,
    b: Vec<Array1<f32>>,
    dim: usize,
}

impl Transform {
    /// The identity transform for `num_classes` classes of dimension `dim`.
    pub fn identity(num_classes: usize, dim: usize) -> Self {
        Self {
            a: (0..num_classes).map(|_| Array2::eye(dim)).collect(),
            b: (0..num_classes).map(|_| Array1::zeros(dim)).collect(),
            dim,
        }
    }

    /// Number of regression classes.
    pub fn num_classes(&self) -> usize {
        self.a.len()
    }

    /// Feature dimensionality.
    pub fn dimension(&self) -> usize {
        self.dim
    }

    /// The rotation of class `c`.
    pub fn class_a(&self, c: usize) -> &Array2<f32> {
        &self.a[c]
    }

    /// The offset of class `c`.
    pub fn class_b(&self, c: usize) -> &Array1<f32> {
        &self.b[c]
    }

    /// Mutable access to the rotation of class `c`.
    pub fn class_a_mut(&mut self, c: usize) -> &mut Array2<f32> {
        &mut self.a[c]
    }

    /// Mutable access to the offset of class `c`.
    pub fn class_b_mut(&mut self, c: usize) -> &mut Array1<f32> {
        &mut self.b[c]
    }

    /// Re-estimate the transform from accumulated statistics.
    ///
    /// For each class and dimension the linear system `G w = z` is solved by
    /// Gaussian elimination with partial pivoting. A singular system leaves
    /// that row at the identity and marks the class degenerate in the
    /// returned report; degeneracy never aborts adaptation.
    pub fn update(&mut self, stats: &StatsSnapshot<'_>) -> Result<SolveReport> {
        if stats.num_classes() != self.num_classes() || stats.dimension() != self.dim {
            return Err(ModelError::Configuration(format!(
                "statistics shape ({} classes, dim {}) does not match transform ({} classes, dim {})",
                stats.num_classes(),
                stats.dimension(),
                self.num_classes(),
                self.dim
            )));
        }

        let mut report = SolveReport {
            degenerate_classes: Vec::new(),
            dimension: self.dim,
        };
        for c in 0..self.num_classes() {
            let acc = stats.class(c);
            let mut degenerate = false;
            for i in 0..self.dim {
                match solve_row(&acc.g[i], &acc.z[i]) {
                    Some(w) => {
                        for j in 0..self.dim {
                            self.a[c][[i, j]] = w[j] as f32;
                        }
                        self.b[c][i] = w[self.dim] as f32;
                    }
                    None => {
                        degenerate = true;
                        // identity fallback for this row
                        for j in 0..self.dim {
                            self.a[c][[i, j]] = if i == j { 1.0 } else { 0.0 };
                        }
                        self.b[c][i] = 0.0;
                    }
                }
            }
            if degenerate {
                warn!(
                    "singular system for regression class {}, falling back to identity",
                    c
                );
                report.degenerate_classes.push(c);
            }
        }
        Ok(report)
    }

    /// Apply class `c` to a mean vector: `A_c * mean + b_c`.
    pub fn apply(&self, c: usize, mean: &[f32]) -> Vec<f32> {
        let a = &self.a[c];
        let b = &self.b[c];
        let mut out = Vec::with_capacity(self.dim);
        for i in 0..self.dim {
            let mut sum = 0.0f64;
            for j in 0..self.dim {
                sum += a[[i, j]] as f64 * mean[j] as f64;
            }
            out.push((sum + b[i] as f64) as f32);
        }
        out
    }

    /// Write the transform in the MLLR file format: the class count, then
    /// for each class its dimension and the `d x (d+1)` rows of
    /// `[A_c | b_c]` in row-major order.
    pub fn store(&self, path: &Path) -> Result<()> {
        let mut writer = BufWriter::new(File::create(path)?);
        writeln!(writer, "{}", self.num_classes())?;
        for c in 0..self.num_classes() {
            writeln!(writer, "{}", self.dim)?;
            for i in 0..self.dim {
                for j in 0..self.dim {
                    write!(writer, "{:e} ", self.a[c][[i, j]])?;
                }
                writeln!(writer, "{:e}", self.b[c][i])?;
            }
        }
        writer.flush()?;
        Ok(())
    }

    /// Load a pre-computed transform from an MLLR file.
    pub fn load(path: &Path) -> Result<Self> {
        let reader = BufReader::new(File::open(path)?);
        let mut tokens = TokenStream::new(reader, path);

        let num_classes = tokens.next_usize("class count")?;
        if num_classes == 0 {
            return Err(ModelError::CorruptFile {
                path: path.display().to_string(),
                detail: "no regression classes".to_string(),
            });
        }

        let mut a = Vec::with_capacity(num_classes);
        let mut b = Vec::with_capacity(num_classes);
        let mut dim = 0usize;
        for c in 0..num_classes {
            let class_dim = tokens.next_usize("class dimension")?;
            if c == 0 {
                dim = class_dim;
            } else if class_dim != dim {
                return Err(ModelError::CorruptFile {
                    path: path.display().to_string(),
                    detail: format!("class {} dimension {} differs from {}", c, class_dim, dim),
                });
            }
            let mut class_a = Array2::zeros((dim, dim));
            let mut class_b = Array1::zeros(dim);
            for i in 0..dim {
                for j in 0..dim {
                    class_a[[i, j]] = tokens.next_f32("matrix entry")?;
                }
                class_b[i] = tokens.next_f32("offset entry")?;
            }
            a.push(class_a);
            b.push(class_b);
        }

        Ok(Self { a, b, dim })
    }
}

/// Solve `g w = z` by Gaussian elimination with partial pivoting.
///
/// Returns `None` when the best available pivot is smaller than the
/// singularity threshold.
fn solve_row(g: &Array2<f64>, z: &Array1<f64>) -> Option<Vec<f64>> {
    let n = z.len();
    // augmented system [g | z]
    let mut m = vec![vec![0.0f64; n + 1]; n];
    for r in 0..n {
        for c in 0..n {
            m[r][c] = g[[r, c]];
        }
        m[r][n] = z[r];
    }

    for col in 0..n {
        // partial pivot: bring the largest remaining magnitude to the diagonal
        let mut pivot_row = col;
        for r in (col + 1)..n {
            if m[r][col].abs() > m[pivot_row][col].abs() {
                pivot_row = r;
            }
        }
        if m[pivot_row][col].abs() < SINGULARITY_EPSILON {
            return None;
        }
        m.swap(col, pivot_row);

        for r in (col + 1)..n {
            let factor = m[r][col] / m[col][col];
            for c in col..=n {
                m[r][c] -= factor * m[col][c];
            }
        }
    }

    // back substitution
    let mut w = vec![0.0f64; n];
    for r in (0..n).rev() {
        let mut sum = m[r][n];
        for c in (r + 1)..n {
            sum -= m[r][c] * w[c];
        }
        w[r] = sum / m[r][r];
    }
    Some(w)
}

/// Whitespace token stream over a text transform file.
struct TokenStream<R: BufRead> {
    reader: R,
    path: String,
    tokens: Vec<String>,
    cursor: usize,
}

impl<R: BufRead> TokenStream<R> {
    fn new(reader: R, path: &Path) -> Self {
        Self {
            reader,
            path: path.display().to_string(),
            tokens: Vec::new(),
            cursor: 0,
        }
    }

    fn next_token(&mut self, what: &str) -> Result<String> {
        loop {
            if self.cursor < self.tokens.len() {
                let token = self.tokens[self.cursor].clone();
                self.cursor += 1;
                return Ok(token);
            }
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(ModelError::CorruptFile {
                    path: self.path.clone(),
                    detail: format!("unexpected end of file reading {}", what),
                });
            }
            self.tokens = line.split_whitespace().map(str::to_string).collect();
            self.cursor = 0;
        }
    }

    fn next_usize(&mut self, what: &str) -> Result<usize> {
        let token = self.next_token(what)?;
        token.parse().map_err(|_| ModelError::CorruptFile {
            path: self.path.clone(),
            detail: format!("{} is not an integer: {:?}", what, token),
        })
    }

    fn next_f32(&mut self, what: &str) -> Result<f32> {
        let token = self.next_token(what)?;
        token.parse().map_err(|_| ModelError::CorruptFile {
            path: self.path.clone(),
            detail: format!("{} is not a float: {:?}", what, token),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use tempfile::tempdir;

    #[test]
    fn test_solve_row_exact() {
        // 2x2 system with known solution [1, 2]
        let g = array![[2.0, 1.0], [1.0, 3.0]];
        let z = array![4.0, 7.0];
        let w = solve_row(&g, &z).unwrap();
        assert!((w[0] - 1.0).abs() < 1e-12);
        assert!((w[1] - 2.0).abs() < 1e-12);
    }

    #[test]
    fn test_solve_row_singular() {
        let g = array![[1.0, 1.0], [1.0, 1.0]];
        let z = array![1.0, 1.0];
        assert!(solve_row(&g, &z).is_none());
    }

    #[test]
    fn test_identity_transform_apply() {
        let t = Transform::identity(2, 3);
        let mean = [1.0f32, -2.0, 0.5];
        assert_eq!(t.apply(1, &mean), mean.to_vec());
    }

    #[test]
    fn test_update_solves_consistent_system() {
        use crate::adapt::stats::{ClassAccumulator, StatsSnapshot};

        // dim 1: observations 0 and 2 mapping onto means 0 and 2
        let mut acc = ClassAccumulator::zeros(1);
        for (x, mean) in [(0.0f64, 0.0f64), (2.0, 2.0)] {
            let xi = [x, 1.0];
            for r in 0..2 {
                for c in 0..2 {
                    acc.g[0][[r, c]] += xi[r] * xi[c];
                }
                acc.z[0][r] += mean * xi[r];
            }
        }
        let classes = [acc];
        let snapshot = StatsSnapshot {
            classes: &classes,
            dim: 1,
        };

        let mut t = Transform::identity(1, 1);
        let report = t.update(&snapshot).unwrap();
        assert!(report.is_clean());
        assert!(report.require_clean().is_ok());
        assert!((t.class_a(0)[[0, 0]] - 1.0).abs() < 1e-6);
        assert!(t.class_b(0)[0].abs() < 1e-6);
    }

    #[test]
    fn test_update_empty_accumulator_is_degenerate() {
        use crate::adapt::stats::{ClassAccumulator, StatsSnapshot};

        let classes = [ClassAccumulator::zeros(2)];
        let snapshot = StatsSnapshot {
            classes: &classes,
            dim: 2,
        };

        let mut t = Transform::identity(1, 2);
        let report = t.update(&snapshot).unwrap();
        assert_eq!(report.degenerate_classes, vec![0]);
        assert!(matches!(
            report.require_clean().unwrap_err(),
            ModelError::SingularSystem { class: 0, dim: 2 }
        ));
        // fallback rows are the identity
        assert_eq!(t.apply(0, &[1.5, -2.5]), vec![1.5, -2.5]);
    }

    #[test]
    fn test_store_load_round_trip() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mllr_matrix");

        let mut t = Transform::identity(2, 2);
        t.a[0][[0, 1]] = 0.25;
        t.b[1][0] = -1.5;
        t.store(&path).unwrap();

        let back = Transform::load(&path).unwrap();
        assert_eq!(back.num_classes(), 2);
        assert_eq!(back.dimension(), 2);
        assert_eq!(back.class_a(0)[[0, 1]], 0.25);
        assert_eq!(back.class_b(1)[0], -1.5);
    }

    #[test]
    fn test_load_rejects_truncated_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("mllr_matrix");
        std::fs::write(&path, "1\n2\n1.0 0.0 0.0\n").unwrap();
        assert!(matches!(
            Transform::load(&path).unwrap_err(),
            ModelError::CorruptFile { .. }
        ));
    }
}
