//! S3 binary container codec.
//!
//! Sphinx-3 trainer output is stored in a simple framed container: an ASCII
//! header of `key value` words terminated by `endhdr`, a 4-byte magic word
//! whose byte order reveals the body's byte order, a body of 32-bit words,
//! and an optional trailing checksum. This module provides the sequential
//! reader and the matching writer.

mod reader;
mod writer;

pub use reader::S3Reader;
pub use writer::S3Writer;
