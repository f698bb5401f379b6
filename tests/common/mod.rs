//! Shared fixtures: synthetic acoustic models written through the public API.

use std::fs;
use std::io::Write;
use std::path::Path;

use tiedstate_adapt::s3::S3Writer;

/// A synthetic single-stream model with one Gaussian per senone.
pub struct ModelFixture {
    pub means: Vec<Vec<f32>>,
    pub variances: Vec<Vec<f32>>,
}

impl ModelFixture {
    /// The two-senone model from the tiny-model scenario.
    pub fn tiny() -> Self {
        Self {
            means: vec![vec![0.0, 0.0], vec![2.0, 2.0]],
            variances: vec![vec![1.0, 1.0], vec![1.0, 1.0]],
        }
    }

    /// Four affinely independent means, enough to make the regression
    /// systems well-conditioned.
    pub fn square() -> Self {
        Self {
            means: vec![
                vec![0.0, 0.0],
                vec![2.0, 0.0],
                vec![0.0, 2.0],
                vec![2.0, 2.0],
            ],
            variances: vec![vec![1.0, 1.0]; 4],
        }
    }

    pub fn num_senones(&self) -> usize {
        self.means.len()
    }

    pub fn dim(&self) -> usize {
        self.means[0].len()
    }

    /// Write the complete model directory.
    pub fn write_to(&self, dir: &Path) {
        let num_senones = self.num_senones();
        let dim = self.dim();

        write_density(&dir.join("means"), &self.means, dim);
        write_density(&dir.join("variances"), &self.variances, dim);

        let mut writer = S3Writer::create(&dir.join("mixture_weights"), "1.0").unwrap();
        writer.write_int(num_senones as i32).unwrap();
        writer.write_int(1).unwrap();
        writer.write_int(1).unwrap();
        writer.write_int(num_senones as i32).unwrap();
        for _ in 0..num_senones {
            writer.write_float(1.0).unwrap();
        }
        writer.finish().unwrap();

        let mut writer = S3Writer::create(&dir.join("transition_matrices"), "1.0").unwrap();
        writer.write_int(1).unwrap();
        writer.write_int(1).unwrap();
        writer.write_int(2).unwrap();
        writer.write_int(2).unwrap();
        writer.write_float_array(&[0.5, 0.5]).unwrap();
        writer.finish().unwrap();

        fs::write(dir.join("mdef"), self.mdef()).unwrap();
        fs::write(dir.join("feat.params"), "-feat 1s_c_d_dd\n").unwrap();
    }

    /// Generate a matching model definition: one base phone per senone,
    /// silence first.
    fn mdef(&self) -> String {
        let num_senones = self.num_senones();
        let mut text = String::new();
        text.push_str("0.3\n");
        text.push_str(&format!("{} n_base\n", num_senones));
        text.push_str("0 n_tri\n");
        text.push_str(&format!("{} n_state_map\n", 2 * num_senones));
        text.push_str(&format!("{} n_tied_state\n", num_senones));
        text.push_str(&format!("{} n_tied_ci_state\n", num_senones));
        text.push_str("1 n_tied_tmat\n");
        text.push_str("SIL - - - filler 0 0 N\n");
        for s in 1..num_senones {
            text.push_str(&format!("PH{} - - - n/a 0 {} N\n", s, s));
        }
        text
    }
}

fn write_density(path: &Path, vectors: &[Vec<f32>], dim: usize) {
    let mut writer = S3Writer::create(path, "1.0").unwrap();
    writer.write_int(vectors.len() as i32).unwrap();
    writer.write_int(1).unwrap();
    writer.write_int(1).unwrap();
    writer.write_int(dim as i32).unwrap();
    writer.write_int((vectors.len() * dim) as i32).unwrap();
    for vector in vectors {
        writer.write_float_array(vector).unwrap();
    }
    writer.finish().unwrap();
}

/// One body word of a hand-written S3 file.
pub enum Word {
    Int(i32),
    Float(f32),
}

/// Write an S3 file with every body word byte-swapped relative to the host,
/// including the magic and the trailing checksum. Parsing it must yield the
/// same values as the native-order file.
pub fn write_swapped_s3(path: &Path, version: &str, words: &[Word]) {
    let mut bytes: Vec<u8> = Vec::new();
    write!(bytes, "s3\nversion {}\nchksum0 yes\nendhdr\n", version).unwrap();
    bytes.extend_from_slice(&0x1122_3344u32.swap_bytes().to_ne_bytes());

    let mut checksum = 0u32;
    for word in words {
        let host = match word {
            Word::Int(v) => *v as u32,
            Word::Float(v) => v.to_bits(),
        };
        checksum = checksum.rotate_left(20).wrapping_add(host);
        bytes.extend_from_slice(&host.swap_bytes().to_ne_bytes());
    }
    bytes.extend_from_slice(&checksum.swap_bytes().to_ne_bytes());
    fs::write(path, bytes).unwrap();
}
