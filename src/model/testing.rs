//! On-disk model fixtures for unit tests.

use std::fs;
use std::path::Path;

use crate::constants::s3::{
    DENSITY_FILE_VERSION, MIXW_FILE_VERSION, TMAT_FILE_VERSION,
};
use crate::error::Result;
use crate::s3::S3Writer;

/// Description of a synthetic two-senone, single-stream model.
pub struct TinyModel {
    pub density_version: &'static str,
    pub means: Vec<Vec<f32>>,
    pub variances: Vec<Vec<f32>>,
    pub mixture_weights: Vec<Vec<f32>>,
    pub transition_rows: Vec<Vec<f32>>,
    pub mdef: String,
    pub feat_params: String,
}

impl Default for TinyModel {
    fn default() -> Self {
        Self {
            density_version: DENSITY_FILE_VERSION,
            means: vec![vec![0.0, 0.0], vec![2.0, 2.0]],
            variances: vec![vec![1.0, 1.0], vec![1.0, 1.0]],
            mixture_weights: vec![vec![1.0], vec![1.0]],
            transition_rows: vec![vec![0.5, 0.5]],
            mdef: "\
0.3
2 n_base
0 n_tri
4 n_state_map
2 n_tied_state
2 n_tied_ci_state
1 n_tied_tmat
# name left right position attribute tmat stid
SIL - - - filler 0 0 N
AH - - - n/a 0 1 N
"
            .to_string(),
            feat_params: "-lowerf 133.33334\n-upperf 6855.4976\n".to_string(),
        }
    }
}

/// Write the fixture's model files into `dir`.
pub fn write_tiny_model(dir: &Path, model: &TinyModel) -> Result<()> {
    let num_senones = model.means.len();
    let dim = model.means[0].len();
    let num_gaussians = model.mixture_weights[0].len();

    write_density(
        &dir.join("means"),
        model.density_version,
        &model.means,
        num_senones,
        num_gaussians,
        dim,
    )?;
    write_density(
        &dir.join("variances"),
        model.density_version,
        &model.variances,
        num_senones,
        num_gaussians,
        dim,
    )?;

    let mut writer = S3Writer::create(&dir.join("mixture_weights"), MIXW_FILE_VERSION)?;
    writer.write_int(num_senones as i32)?;
    writer.write_int(1)?;
    writer.write_int(num_gaussians as i32)?;
    writer.write_int((num_senones * num_gaussians) as i32)?;
    for weights in &model.mixture_weights {
        writer.write_float_array(weights)?;
    }
    writer.finish()?;

    let num_states = model.transition_rows[0].len();
    let mut writer = S3Writer::create(&dir.join("transition_matrices"), TMAT_FILE_VERSION)?;
    writer.write_int(1)?;
    writer.write_int((num_states - 1) as i32)?;
    writer.write_int(num_states as i32)?;
    writer.write_int((num_states * (num_states - 1)) as i32)?;
    for row in &model.transition_rows {
        writer.write_float_array(row)?;
    }
    writer.finish()?;

    fs::write(dir.join("mdef"), &model.mdef)?;
    fs::write(dir.join("feat.params"), &model.feat_params)?;
    Ok(())
}

fn write_density(
    path: &Path,
    version: &str,
    vectors: &[Vec<f32>],
    num_senones: usize,
    num_gaussians: usize,
    dim: usize,
) -> Result<()> {
    let mut writer = S3Writer::create(path, version)?;
    writer.write_int(num_senones as i32)?;
    writer.write_int(1)?;
    writer.write_int(num_gaussians as i32)?;
    writer.write_int(dim as i32)?;
    writer.write_int((num_senones * num_gaussians * dim) as i32)?;
    for vector in vectors {
        writer.write_float_array(vector)?;
    }
    writer.finish()?;
    Ok(())
}
