//! Sequential reader for the S3 binary container.

use std::collections::HashMap;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

use byteorder::{NativeEndian, ReadBytesExt};
use tracing::debug;

use crate::constants::s3::{BYTE_ORDER_MAGIC, END_HEADER, FORMAT_TAG};
use crate::error::{ModelError, Result};

/// Stateful reader positioned after the header of an S3 binary file.
///
/// Carries the byte-swap flag detected from the magic word and a running
/// checksum over every body word read through [`read_int`](Self::read_int)
/// and [`read_float`](Self::read_float). All reads are positional and
/// sequential; the reader never seeks.
#[derive(Debug)]
pub struct S3Reader<R: Read> {
    inner: R,
    path: String,
    swap: bool,
    checksum: u32,
}

impl S3Reader<BufReader<File>> {
    /// Open an S3 binary file and parse its header.
    ///
    /// Returns the header properties (everything between the leading `s3`
    /// tag and `endhdr`) together with a reader positioned at the first
    /// body word.
    pub fn open(path: &Path) -> Result<(HashMap<String, String>, Self)> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file), &path.display().to_string())
    }
}

impl<R: Read> S3Reader<R> {
    /// Parse the S3 header from an arbitrary byte stream.
    pub fn from_reader(mut reader: R, path: &str) -> Result<(HashMap<String, String>, Self)> {
        let tag = read_word(&mut reader, path)?;
        if tag != FORMAT_TAG {
            return Err(ModelError::CorruptFile {
                path: path.to_string(),
                detail: format!("not an s3 binary file (leading token {:?})", tag),
            });
        }

        let mut props = HashMap::new();
        loop {
            let name = read_word(&mut reader, path)?;
            if name == END_HEADER {
                break;
            }
            let value = read_word(&mut reader, path)?;
            props.insert(name, value);
        }

        let word = reader.read_u32::<NativeEndian>()?;
        let swap = if word == BYTE_ORDER_MAGIC {
            debug!(path, "not byte-swapping");
            false
        } else if word.swap_bytes() == BYTE_ORDER_MAGIC {
            debug!(path, "byte-swapping");
            true
        } else {
            return Err(ModelError::CorruptFile {
                path: path.to_string(),
                detail: format!("bad byte order magic {:#010x}", word),
            });
        };

        Ok((
            props,
            Self {
                inner: reader,
                path: path.to_string(),
                swap,
                checksum: 0,
            },
        ))
    }

    /// Whether body words are byte-swapped relative to the host.
    pub fn swapped(&self) -> bool {
        self.swap
    }

    /// Reset the running checksum before a new body section.
    pub fn reset_checksum(&mut self) {
        self.checksum = 0;
    }

    /// Read a 32-bit word in host order, folding it into the checksum.
    fn read_word_u32(&mut self) -> Result<u32> {
        let mut word = self.inner.read_u32::<NativeEndian>()?;
        if self.swap {
            word = word.swap_bytes();
        }
        self.checksum = self.checksum.rotate_left(20).wrapping_add(word);
        Ok(word)
    }

    /// Read an integer, byte-swapping as necessary.
    pub fn read_int(&mut self) -> Result<i32> {
        Ok(self.read_word_u32()? as i32)
    }

    /// Read a float, byte-swapping as necessary.
    pub fn read_float(&mut self) -> Result<f32> {
        Ok(f32::from_bits(self.read_word_u32()?))
    }

    /// Read `size` floats into a vector.
    pub fn read_float_array(&mut self, size: usize) -> Result<Vec<f32>> {
        let mut data = Vec::with_capacity(size);
        for _ in 0..size {
            data.push(self.read_float()?);
        }
        Ok(data)
    }

    /// Validate the trailing checksum if the header declared one.
    ///
    /// The comparison uses the checksum accumulated so far; the trailer
    /// word itself is consumed but not folded in.
    pub fn validate_checksum(&mut self, declared: bool) -> Result<()> {
        if !declared {
            return Ok(());
        }
        let computed = self.checksum;
        let stored = self.read_int()? as u32;
        if stored != computed {
            return Err(ModelError::ChecksumMismatch {
                path: self.path.clone(),
                computed,
                stored,
            });
        }
        Ok(())
    }
}

/// Read the next whitespace-delimited ASCII token from the stream.
fn read_word<R: Read>(reader: &mut R, path: &str) -> Result<String> {
    let mut byte = [0u8; 1];
    // skip leading whitespace
    loop {
        if reader.read(&mut byte)? == 0 {
            return Err(ModelError::CorruptFile {
                path: path.to_string(),
                detail: "unexpected end of file in header".to_string(),
            });
        }
        if !byte[0].is_ascii_whitespace() {
            break;
        }
    }
    // collect the word
    let mut word = vec![byte[0]];
    loop {
        if reader.read(&mut byte)? == 0 || byte[0].is_ascii_whitespace() {
            break;
        }
        word.push(byte[0]);
    }
    String::from_utf8(word).map_err(|_| ModelError::CorruptFile {
        path: path.to_string(),
        detail: "non-ASCII header token".to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn header(props: &str) -> Vec<u8> {
        let mut bytes = format!("s3\n{}endhdr\n", props).into_bytes();
        bytes.extend_from_slice(&BYTE_ORDER_MAGIC.to_ne_bytes());
        bytes
    }

    #[test]
    fn test_header_properties_collected() {
        let bytes = header("version 1.0\nchksum0 yes\n");
        let (props, reader) = S3Reader::from_reader(Cursor::new(bytes), "mem").unwrap();
        assert_eq!(props.get("version").map(String::as_str), Some("1.0"));
        assert_eq!(props.get("chksum0").map(String::as_str), Some("yes"));
        assert!(!reader.swapped());
    }

    #[test]
    fn test_missing_format_tag_rejected() {
        let bytes = b"s4\nendhdr\n".to_vec();
        let err = S3Reader::from_reader(Cursor::new(bytes), "mem").unwrap_err();
        assert!(matches!(err, ModelError::CorruptFile { .. }));
    }

    #[test]
    fn test_bad_magic_rejected() {
        let mut bytes = b"s3\nendhdr\n".to_vec();
        bytes.extend_from_slice(&0xdead_beefu32.to_ne_bytes());
        let err = S3Reader::from_reader(Cursor::new(bytes), "mem").unwrap_err();
        assert!(matches!(err, ModelError::CorruptFile { .. }));
    }

    #[test]
    fn test_swapped_magic_detected() {
        let mut bytes = b"s3\nendhdr\n".to_vec();
        bytes.extend_from_slice(&BYTE_ORDER_MAGIC.swap_bytes().to_ne_bytes());
        bytes.extend_from_slice(&1i32.swap_bytes().to_ne_bytes());
        let (_, mut reader) = S3Reader::from_reader(Cursor::new(bytes), "mem").unwrap();
        assert!(reader.swapped());
        assert_eq!(reader.read_int().unwrap(), 1);
    }

    #[test]
    fn test_checksum_rotation() {
        // two words through the documented rotation
        let mut bytes = header("");
        bytes.extend_from_slice(&3i32.to_ne_bytes());
        bytes.extend_from_slice(&7i32.to_ne_bytes());
        let (_, mut reader) = S3Reader::from_reader(Cursor::new(bytes), "mem").unwrap();
        reader.read_int().unwrap();
        reader.read_int().unwrap();
        let expected = 3u32.rotate_left(20).wrapping_add(7);
        assert_eq!(reader.checksum, expected);
    }

    #[test]
    fn test_checksum_mismatch_detected() {
        let mut bytes = header("chksum0 yes\n");
        bytes.extend_from_slice(&42i32.to_ne_bytes());
        bytes.extend_from_slice(&0i32.to_ne_bytes()); // wrong trailer
        let (_, mut reader) = S3Reader::from_reader(Cursor::new(bytes), "mem").unwrap();
        reader.read_int().unwrap();
        let err = reader.validate_checksum(true).unwrap_err();
        assert!(matches!(err, ModelError::ChecksumMismatch { .. }));
    }

    #[test]
    fn test_checksum_skipped_when_not_declared() {
        let mut bytes = header("");
        bytes.extend_from_slice(&42i32.to_ne_bytes());
        let (_, mut reader) = S3Reader::from_reader(Cursor::new(bytes), "mem").unwrap();
        reader.read_int().unwrap();
        assert!(reader.validate_checksum(false).is_ok());
    }

    #[test]
    fn test_float_reinterprets_word() {
        let mut bytes = header("");
        bytes.extend_from_slice(&1.5f32.to_bits().to_ne_bytes());
        let (_, mut reader) = S3Reader::from_reader(Cursor::new(bytes), "mem").unwrap();
        assert_eq!(reader.read_float().unwrap(), 1.5);
    }
}
