//! Writer for the S3 binary container.
//!
//! Produces files the [`S3Reader`](super::S3Reader) parses back bit-exactly:
//! the same header fields, the magic word in host order, and a trailing
//! checksum computed with the same rotation as the reader.

use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

use byteorder::{NativeEndian, WriteBytesExt};

use crate::constants::s3::{BYTE_ORDER_MAGIC, END_HEADER, FORMAT_TAG};
use crate::error::Result;

/// Sequential writer producing an S3 binary file with `chksum0 yes`.
pub struct S3Writer<W: Write> {
    inner: W,
    checksum: u32,
}

impl S3Writer<BufWriter<File>> {
    /// Create an S3 binary file at `path` with the given version string.
    pub fn create(path: &Path, version: &str) -> Result<Self> {
        let file = File::create(path)?;
        Self::new(BufWriter::new(file), version)
    }
}

impl<W: Write> S3Writer<W> {
    /// Write the header and magic word to an arbitrary byte sink.
    pub fn new(mut writer: W, version: &str) -> Result<Self> {
        write!(
            writer,
            "{}\nversion {}\nchksum0 yes\n{}\n",
            FORMAT_TAG, version, END_HEADER
        )?;
        writer.write_u32::<NativeEndian>(BYTE_ORDER_MAGIC)?;
        Ok(Self {
            inner: writer,
            checksum: 0,
        })
    }

    /// Write a 32-bit word in host order, folding it into the checksum.
    fn write_word_u32(&mut self, word: u32) -> Result<()> {
        self.checksum = self.checksum.rotate_left(20).wrapping_add(word);
        self.inner.write_u32::<NativeEndian>(word)?;
        Ok(())
    }

    /// Write an integer body word.
    pub fn write_int(&mut self, value: i32) -> Result<()> {
        self.write_word_u32(value as u32)
    }

    /// Write a float body word.
    pub fn write_float(&mut self, value: f32) -> Result<()> {
        self.write_word_u32(value.to_bits())
    }

    /// Write a slice of floats.
    pub fn write_float_array(&mut self, values: &[f32]) -> Result<()> {
        for &value in values {
            self.write_float(value)?;
        }
        Ok(())
    }

    /// Write the trailing checksum and flush the sink.
    pub fn finish(mut self) -> Result<()> {
        let checksum = self.checksum;
        self.inner.write_u32::<NativeEndian>(checksum)?;
        self.inner.flush()?;
        Ok(())
    }
}
