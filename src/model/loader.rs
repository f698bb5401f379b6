//! Loads a tied-state acoustic model generated by the Sphinx-3 trainer.
//!
//! The model is a directory of binary parameter files (`means`, `variances`,
//! `mixture_weights`, `transition_matrices`, optional `feature_transform`),
//! a text model definition, and a `feat.params` property file. Loading is
//! eager and happens once; the resulting [`ModelStore`] is immutable.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::config::LoaderConfig;
use crate::constants::mdef::{MODEL_VERSION, NO_VALUE, ROW_TERMINATOR};
use crate::constants::s3::{
    DENSITY_FILE_VERSION, MIXW_FILE_VERSION, TMAT_FILE_VERSION, TRANSFORM_FILE_VERSION,
};
use crate::constants::unit::{FILLER_ATTRIBUTE, NO_ATTRIBUTE, SILENCE_CIPHONE};
use crate::error::{ModelError, Result};
use crate::logmath::LogMath;
use crate::model::hmm::{HmmManager, SenoneHmm};
use crate::model::mdef::MdefTokenizer;
use crate::model::pool::{Feature, Pool};
use crate::model::senone::{GaussianMixture, MixtureComponent, Senone, SenoneSequence};
use crate::model::store::ModelStore;
use crate::model::unit::{HmmPosition, LeftRightContext, Unit};
use crate::s3::S3Reader;

/// Orchestrates parsing of the model files into a [`ModelStore`].
pub struct ModelLoader {
    config: LoaderConfig,
    logmath: LogMath,
}

impl ModelLoader {
    /// Create a loader for the given configuration.
    pub fn new(config: LoaderConfig, logmath: LogMath) -> Result<Self> {
        config.validate()?;
        Ok(Self { config, logmath })
    }

    /// Load the acoustic model.
    pub fn load(&self) -> Result<ModelStore> {
        info!(
            "Loading acoustic model: {}",
            self.config.location.display()
        );
        info!("    modelDefinition: {}", self.config.model_definition);
        info!("    dataLocation: {}", self.config.data_location);

        let (means, stream_vector_lengths) = self.load_density_file("means", -f32::MAX)?;
        let (variances, _) = self.load_density_file("variances", self.config.variance_floor)?;
        let mixture_weights =
            self.load_mixture_weights("mixture_weights", self.config.mixture_weight_floor)?;
        let transitions = self.load_transition_matrices("transition_matrices")?;
        let transform_matrix = self.load_transform_matrix("feature_transform")?;

        let senones = self.create_senone_pool(&means, &variances, &mixture_weights)?;

        let mdef_path = self.config.model_definition_path();
        let mdef = File::open(&mdef_path).map_err(|e| ModelError::CorruptFile {
            path: mdef_path.display().to_string(),
            detail: format!("can't open model definition: {}", e),
        })?;
        let (context_independent_units, hmm_manager) = self.load_hmm_pool(
            self.config.use_cd_units,
            MdefTokenizer::new(BufReader::new(mdef), mdef_path.display().to_string()),
            &mixture_weights,
            &transitions,
        )?;

        let properties = self.load_model_props("feat.params")?;

        let store = ModelStore {
            means,
            variances,
            mixture_weights,
            transitions,
            senones,
            mean_transformation_matrices: None,
            mean_transformation_vectors: None,
            variance_transformation_matrices: None,
            variance_transformation_vectors: None,
            transform_matrix,
            context_independent_units,
            hmm_manager,
            properties,
            stream_vector_lengths,
        };
        store.log_info();
        Ok(store)
    }

    /// Load a density file (means or variances), flooring every vector.
    ///
    /// Returns the pool and the per-stream vector lengths declared in the
    /// file header.
    fn load_density_file(&self, name: &str, floor: f32) -> Result<(Pool<Vec<f32>>, Vec<usize>)> {
        let path = self.config.data_path(name);
        debug!("Loading density file from: {}", path.display());

        let (props, mut reader) = S3Reader::open(&path)?;
        check_version(&props, &path, DENSITY_FILE_VERSION)?;
        let do_checksum = checksum_declared(&props);
        reader.reset_checksum();

        let num_states = read_count(&mut reader, &path, "number of states")?;
        let num_streams = read_count(&mut reader, &path, "number of streams")?;
        let num_gaussians_per_state = read_count(&mut reader, &path, "gaussians per state")?;

        let mut vector_lengths = Vec::with_capacity(num_streams);
        for _ in 0..num_streams {
            vector_lengths.push(read_count(&mut reader, &path, "vector length")?);
        }
        let raw_length = read_count(&mut reader, &path, "raw length")?;

        debug!("Number of states {}", num_states);
        debug!("Number of streams {}", num_streams);
        debug!("Number of gaussians per state {}", num_gaussians_per_state);
        debug!("Raw length {}", raw_length);

        let block_size: usize = vector_lengths.iter().sum();
        if raw_length != num_gaussians_per_state * block_size * num_states {
            return Err(ModelError::ModelMalformed(format!(
                "{}: raw length {} does not match {} states x {} gaussians x block {}",
                path.display(),
                raw_length,
                num_states,
                num_gaussians_per_state,
                block_size
            )));
        }

        let mut pool = Pool::new(name);
        pool.set_feature(Feature::NumSenones, num_states as i32);
        pool.set_feature(Feature::NumStreams, num_streams as i32);
        pool.set_feature(Feature::NumGaussiansPerState, num_gaussians_per_state as i32);

        for i in 0..num_states {
            for j in 0..num_streams {
                for k in 0..num_gaussians_per_state {
                    let mut density = reader.read_float_array(vector_lengths[j])?;
                    floor_data(&mut density, floor);
                    pool.put(
                        i * num_streams * num_gaussians_per_state + j * num_gaussians_per_state + k,
                        density,
                    );
                }
            }
        }

        reader.validate_checksum(do_checksum)?;
        Ok((pool, vector_lengths))
    }

    /// Load the mixture weights, normalizing, flooring, and converting each
    /// stream's weights to the log domain.
    fn load_mixture_weights(&self, name: &str, floor: f32) -> Result<Pool<Vec<f32>>> {
        let path = self.config.data_path(name);
        debug!("Loading mixture weights from: {}", path.display());

        let (props, mut reader) = S3Reader::open(&path)?;
        check_version(&props, &path, MIXW_FILE_VERSION)?;
        let do_checksum = checksum_declared(&props);
        reader.reset_checksum();

        let num_states = read_count(&mut reader, &path, "number of states")?;
        let num_streams = read_count(&mut reader, &path, "number of streams")?;
        let num_gaussians_per_state = read_count(&mut reader, &path, "gaussians per state")?;
        let num_values = read_count(&mut reader, &path, "number of values")?;

        if num_values != num_states * num_streams * num_gaussians_per_state {
            return Err(ModelError::ModelMalformed(format!(
                "{}: value count {} does not match {} states x {} streams x {} gaussians",
                path.display(),
                num_values,
                num_states,
                num_streams,
                num_gaussians_per_state
            )));
        }

        let mut pool = Pool::new(name);
        pool.set_feature(Feature::NumSenones, num_states as i32);
        pool.set_feature(Feature::NumStreams, num_streams as i32);
        pool.set_feature(Feature::NumGaussiansPerState, num_gaussians_per_state as i32);

        for i in 0..num_states {
            let mut log_mixture_weights = Vec::with_capacity(num_gaussians_per_state * num_streams);
            for _ in 0..num_streams {
                let mut stream_weights = reader.read_float_array(num_gaussians_per_state)?;
                normalize(&mut stream_weights);
                floor_data(&mut stream_weights, floor);
                self.logmath.linear_to_log_slice(&mut stream_weights);
                log_mixture_weights.extend_from_slice(&stream_weights);
            }
            pool.put(i, log_mixture_weights);
        }

        reader.validate_checksum(do_checksum)?;
        Ok(pool)
    }

    /// Load the tied transition matrices, converting each row-stochastic
    /// matrix to the log domain and appending the terminal all-zero row.
    fn load_transition_matrices(&self, name: &str) -> Result<Pool<Vec<Vec<f32>>>> {
        let path = self.config.data_path(name);
        debug!("Loading transition matrices from: {}", path.display());

        let (props, mut reader) = S3Reader::open(&path)?;
        check_version(&props, &path, TMAT_FILE_VERSION)?;
        let do_checksum = checksum_declared(&props);
        reader.reset_checksum();

        let num_matrices = read_count(&mut reader, &path, "number of matrices")?;
        let num_rows = read_count(&mut reader, &path, "number of rows")?;
        let num_states = read_count(&mut reader, &path, "number of states")?;
        let num_values = read_count(&mut reader, &path, "number of values")?;

        if num_values != num_states * num_rows * num_matrices {
            return Err(ModelError::ModelMalformed(format!(
                "{}: value count {} does not match {} matrices x {} rows x {} states",
                path.display(),
                num_values,
                num_matrices,
                num_rows,
                num_states
            )));
        }

        let mut pool = Pool::new(name);
        for i in 0..num_matrices {
            let mut matrix = Vec::with_capacity(num_states);
            for _ in 0..num_rows {
                let mut row = reader.read_float_array(num_states)?;
                non_zero_floor(&mut row, 0.0);
                normalize(&mut row);
                self.logmath.linear_to_log_slice(&mut row);
                matrix.push(row);
            }
            // terminal row: all zeros in linear, log-zero in log domain
            let mut last_row = vec![0.0f32; num_states];
            self.logmath.linear_to_log_slice(&mut last_row);
            matrix.push(last_row);
            pool.put(i, matrix);
        }

        reader.validate_checksum(do_checksum)?;
        Ok(pool)
    }

    /// Load the optional front-end feature transform. A missing file is not
    /// an error; any other failure is.
    fn load_transform_matrix(&self, name: &str) -> Result<Option<Vec<Vec<f32>>>> {
        let path = self.config.data_path(name);
        let file = match File::open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!("No feature transform at: {}", path.display());
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        debug!("Loading transform matrix from: {}", path.display());

        let (props, mut reader) =
            S3Reader::from_reader(BufReader::new(file), &path.display().to_string())?;
        check_version(&props, &path, TRANSFORM_FILE_VERSION)?;
        let do_checksum = checksum_declared(&props);
        reader.reset_checksum();

        reader.read_int()?;
        let num_rows = read_count(&mut reader, &path, "number of rows")?;
        let num_values = read_count(&mut reader, &path, "number of values")?;
        let num = read_count(&mut reader, &path, "total count")?;

        if num != num_rows * num_values {
            return Err(ModelError::ModelMalformed(format!(
                "{}: total count {} does not match {} rows x {} values",
                path.display(),
                num,
                num_rows,
                num_values
            )));
        }

        let mut result = Vec::with_capacity(num_rows);
        for _ in 0..num_rows {
            result.push(reader.read_float_array(num_values)?);
        }

        reader.validate_checksum(do_checksum)?;
        Ok(Some(result))
    }

    /// Create the senone pool from the parameter pools.
    fn create_senone_pool(
        &self,
        means: &Pool<Vec<f32>>,
        variances: &Pool<Vec<f32>>,
        mixture_weights: &Pool<Vec<f32>>,
    ) -> Result<Pool<Senone>> {
        let num_senones = mixture_weights.feature(Feature::NumSenones, 0) as usize;
        let num_gaussians_per_state =
            mixture_weights.feature(Feature::NumGaussiansPerState, 0) as usize;

        debug!("Senones {}", num_senones);
        debug!("Gaussians Per Senone {}", num_gaussians_per_state);
        debug!("MixtureWeights {}", mixture_weights.size());
        debug!("Means {}", means.size());
        debug!("Variances {}", variances.size());

        if num_gaussians_per_state == 0 {
            return Err(ModelError::ModelMalformed(
                "no gaussians per state".to_string(),
            ));
        }
        if mixture_weights.size() != num_senones {
            return Err(ModelError::ModelMalformed(format!(
                "mixture weight count {} does not match {} senones",
                mixture_weights.size(),
                num_senones
            )));
        }
        if means.size() != num_senones * num_gaussians_per_state
            || variances.size() != num_senones * num_gaussians_per_state
        {
            return Err(ModelError::ModelMalformed(format!(
                "means {} / variances {} do not match {} senones x {} gaussians",
                means.size(),
                variances.size(),
                num_senones,
                num_gaussians_per_state
            )));
        }

        let mut pool = Pool::new("senones");
        let mut which_gaussian = 0usize;
        for i in 0..num_senones {
            let mut components = Vec::with_capacity(num_gaussians_per_state);
            for _ in 0..num_gaussians_per_state {
                components.push(MixtureComponent::new(
                    means.get(which_gaussian),
                    None,
                    variances.get(which_gaussian),
                    None,
                    self.config.mixture_component_score_floor,
                    self.config.variance_floor,
                ));
                which_gaussian += 1;
            }
            let senone = Senone::GaussianMixture(GaussianMixture::new(
                i as u32,
                mixture_weights.get(i).clone(),
                components,
            ));
            pool.put(i, senone);
        }
        Ok(pool)
    }

    /// Parse the HMM definition file, building the context-independent unit
    /// map and registering HMMs.
    fn load_hmm_pool<R: BufRead>(
        &self,
        use_cd_units: bool,
        mut est: MdefTokenizer<R>,
        mixture_weights: &Pool<Vec<f32>>,
        transitions: &Pool<Vec<Vec<f32>>>,
    ) -> Result<(HashMap<String, Arc<Unit>>, HmmManager)> {
        debug!("Loading HMM file from: {}", est.path());

        est.expect(MODEL_VERSION)?;

        let num_base = est.next_int("numBase")? as usize;
        est.expect("n_base")?;
        let num_tri = est.next_int("numTri")? as usize;
        est.expect("n_tri")?;
        let num_state_map = est.next_int("numStateMap")? as usize;
        est.expect("n_state_map")?;
        let num_tied_state = est.next_int("numTiedState")? as usize;
        est.expect("n_tied_state")?;
        let num_ci_state = est.next_int("numContextIndependentTiedState")? as usize;
        est.expect("n_tied_ci_state")?;
        let num_tied_tmat = est.next_int("numTiedTransitionMatrices")? as usize;
        est.expect("n_tied_tmat")?;

        if num_base + num_tri == 0 {
            return Err(ModelError::ModelMalformed(format!(
                "{}: no phones declared",
                est.path()
            )));
        }
        let num_state_per_hmm = num_state_map / (num_base + num_tri);
        if num_state_per_hmm < 2 {
            return Err(ModelError::ModelMalformed(format!(
                "{}: state map {} leaves no emitting states for {} phones",
                est.path(),
                num_state_map,
                num_base + num_tri
            )));
        }

        if num_tied_state != mixture_weights.feature(Feature::NumSenones, 0) as usize {
            return Err(ModelError::ModelMalformed(format!(
                "{}: tied state count {} does not match {} senones",
                est.path(),
                num_tied_state,
                mixture_weights.feature(Feature::NumSenones, 0)
            )));
        }
        if num_tied_tmat != transitions.size() {
            return Err(ModelError::ModelMalformed(format!(
                "{}: tied matrix count {} does not match {} transition matrices",
                est.path(),
                num_tied_tmat,
                transitions.size()
            )));
        }

        let mut context_independent_units: HashMap<String, Arc<Unit>> = HashMap::new();
        let mut hmm_manager = HmmManager::new();

        // base (context-independent) phones
        for _ in 0..num_base {
            let name = est.next_token()?;
            let left = est.next_token()?;
            let right = est.next_token()?;
            let position = est.next_token()?;
            let attribute = est.next_token()?;
            let tmat = est.next_int("tmat")? as usize;

            let stid = self.read_tied_state_ids(
                &mut est,
                num_state_per_hmm - 1,
                0,
                num_ci_state,
            )?;

            if left != NO_VALUE || right != NO_VALUE || position != NO_VALUE {
                return Err(ModelError::ModelMalformed(format!(
                    "{}:{}: base phone {} carries context or position",
                    est.path(),
                    est.line(),
                    name
                )));
            }
            if tmat >= num_tied_tmat {
                return Err(ModelError::ModelMalformed(format!(
                    "{}:{}: transition matrix id {} out of range",
                    est.path(),
                    est.line(),
                    tmat
                )));
            }

            let unit = Arc::new(Unit::new(&name, attribute == FILLER_ATTRIBUTE));
            context_independent_units.insert(unit.name().to_string(), unit.clone());
            debug!("Loaded {}", unit);

            let ss = SenoneSequence::new(stid);
            let hmm = SenoneHmm::new(unit, ss, tmat as u32, HmmPosition::lookup(&position)?);
            hmm_manager.put(Arc::new(hmm));
        }

        if hmm_manager
            .get(HmmPosition::Undefined, &Unit::silence())
            .is_none()
        {
            return Err(ModelError::ModelMalformed(format!(
                "could not find {} unit in acoustic model",
                SILENCE_CIPHONE
            )));
        }

        // context-dependent phones; parsed even when they are not registered
        let mut last_unit_name = String::new();
        let mut last_unit: Option<Arc<Unit>> = None;
        let mut last_stid: Option<Vec<u32>> = None;
        let mut last_senone_sequence: Option<Arc<SenoneSequence>> = None;

        for _ in 0..num_tri {
            let name = est.next_token()?;
            let left = est.next_token()?;
            let right = est.next_token()?;
            let position = est.next_token()?;
            let attribute = est.next_token()?;
            let tmat = est.next_int("tmat")? as usize;

            let stid = self.read_tied_state_ids(
                &mut est,
                num_state_per_hmm - 1,
                num_ci_state,
                num_tied_state,
            )?;

            if left == NO_VALUE || right == NO_VALUE || position == NO_VALUE {
                return Err(ModelError::ModelMalformed(format!(
                    "{}:{}: triphone {} is missing context or position",
                    est.path(),
                    est.line(),
                    name
                )));
            }
            if attribute != NO_ATTRIBUTE {
                return Err(ModelError::ModelMalformed(format!(
                    "{}:{}: unexpected triphone attribute {:?}",
                    est.path(),
                    est.line(),
                    attribute
                )));
            }
            if tmat >= num_tied_tmat {
                return Err(ModelError::ModelMalformed(format!(
                    "{}:{}: transition matrix id {} out of range",
                    est.path(),
                    est.line(),
                    tmat
                )));
            }

            if !use_cd_units {
                continue;
            }

            let unit_name = format!("{} {} {}", name, left, right);
            let unit = match &last_unit {
                Some(unit) if unit_name == last_unit_name => unit.clone(),
                _ => {
                    let left_unit = context_independent_units.get(&left).ok_or_else(|| {
                        ModelError::ModelMalformed(format!(
                            "{}:{}: unknown left context {}",
                            est.path(),
                            est.line(),
                            left
                        ))
                    })?;
                    let right_unit = context_independent_units.get(&right).ok_or_else(|| {
                        ModelError::ModelMalformed(format!(
                            "{}:{}: unknown right context {}",
                            est.path(),
                            est.line(),
                            right
                        ))
                    })?;
                    let context = LeftRightContext {
                        left: left_unit.clone(),
                        right: right_unit.clone(),
                    };
                    Arc::new(Unit::with_context(&name, false, context))
                }
            };
            last_unit_name = unit_name;
            last_unit = Some(unit.clone());
            debug!("Loaded {}", unit);

            let ss = match (&last_senone_sequence, &last_stid) {
                (Some(ss), Some(prev)) if *prev == stid => ss.clone(),
                _ => SenoneSequence::new(stid.clone()),
            };
            last_senone_sequence = Some(ss.clone());
            last_stid = Some(stid);

            let hmm = SenoneHmm::new(unit, ss, tmat as u32, HmmPosition::lookup(&position)?);
            hmm_manager.put(Arc::new(hmm));
        }

        Ok((context_independent_units, hmm_manager))
    }

    /// Read the tied-state ids of a phone row and the terminating `N`,
    /// requiring each id to lie in `[lo, hi)`.
    fn read_tied_state_ids<R: BufRead>(
        &self,
        est: &mut MdefTokenizer<R>,
        count: usize,
        lo: usize,
        hi: usize,
    ) -> Result<Vec<u32>> {
        let mut stid = Vec::with_capacity(count);
        for _ in 0..count {
            let id = est.next_int("tied state id")? as usize;
            if id < lo || id >= hi {
                return Err(ModelError::ModelMalformed(format!(
                    "{}:{}: tied state id {} outside [{}, {})",
                    est.path(),
                    est.line(),
                    id,
                    lo,
                    hi
                )));
            }
            stid.push(id as u32);
        }
        est.expect(ROW_TERMINATOR)?;
        Ok(stid)
    }

    /// Load the `feat.params` key/value property file.
    fn load_model_props(&self, name: &str) -> Result<HashMap<String, String>> {
        let path = self.config.data_path(name);
        let reader = BufReader::new(File::open(&path)?);
        let mut props = HashMap::new();
        for line in reader.lines() {
            let line = line?;
            let mut tokens = line.split_whitespace();
            if let (Some(key), Some(value)) = (tokens.next(), tokens.next()) {
                props.insert(key.to_string(), value.to_string());
            }
        }
        Ok(props)
    }
}

/// Check a header-declared version string against the supported one.
fn check_version(
    props: &HashMap<String, String>,
    path: &Path,
    expected: &'static str,
) -> Result<()> {
    match props.get("version") {
        Some(version) if version == expected => Ok(()),
        found => Err(ModelError::UnsupportedVersion {
            path: path.display().to_string(),
            found: found.cloned(),
            expected,
        }),
    }
}

/// Whether the header declared a trailing checksum.
fn checksum_declared(props: &HashMap<String, String>) -> bool {
    props.get("chksum0").map(String::as_str) == Some("yes")
}

/// Read a non-negative size field.
fn read_count<R: std::io::Read>(
    reader: &mut S3Reader<R>,
    path: &Path,
    what: &str,
) -> Result<usize> {
    let value = reader.read_int()?;
    if value < 0 {
        return Err(ModelError::CorruptFile {
            path: path.display().to_string(),
            detail: format!("negative {}: {}", what, value),
        });
    }
    Ok(value as usize)
}

/// Floor every entry of `data` to `floor`.
fn floor_data(data: &mut [f32], floor: f32) {
    for value in data.iter_mut() {
        if *value < floor {
            *value = floor;
        }
    }
}

/// Floor nonzero entries to `floor`; exact zeros become the smallest
/// positive value so they survive the transition to the log domain.
fn non_zero_floor(data: &mut [f32], floor: f32) {
    for value in data.iter_mut() {
        if *value == 0.0 {
            *value = f32::MIN_POSITIVE;
        } else if *value < floor {
            *value = floor;
        }
    }
}

/// Scale `data` so it sums to one. Left untouched when the sum is zero.
fn normalize(data: &mut [f32]) {
    let sum: f32 = data.iter().sum();
    if sum != 0.0 {
        for value in data.iter_mut() {
            *value /= sum;
        }
    }
}
