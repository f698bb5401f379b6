//! Whitespace tokenizer for the model definition text format.

use std::io::BufRead;

use crate::constants::mdef::COMMENT_CHAR;
use crate::error::{ModelError, Result};

/// Token stream over an mdef file.
///
/// Splits on whitespace, strips `#` comments to end of line, and tracks the
/// current line for error reporting.
pub struct MdefTokenizer<R: BufRead> {
    reader: R,
    path: String,
    tokens: Vec<String>,
    cursor: usize,
    line: usize,
}

impl<R: BufRead> MdefTokenizer<R> {
    /// Create a tokenizer over `reader`; `path` is used in error messages.
    pub fn new(reader: R, path: impl Into<String>) -> Self {
        Self {
            reader,
            path: path.into(),
            tokens: Vec::new(),
            cursor: 0,
            line: 0,
        }
    }

    /// The next token, or `ModelMalformed` at end of stream.
    pub fn next_token(&mut self) -> Result<String> {
        loop {
            if self.cursor < self.tokens.len() {
                let token = self.tokens[self.cursor].clone();
                self.cursor += 1;
                return Ok(token);
            }
            let mut line = String::new();
            if self.reader.read_line(&mut line)? == 0 {
                return Err(ModelError::ModelMalformed(format!(
                    "{}: unexpected end of file at line {}",
                    self.path, self.line
                )));
            }
            self.line += 1;
            let content = match line.find(COMMENT_CHAR) {
                Some(pos) => &line[..pos],
                None => &line[..],
            };
            self.tokens = content.split_whitespace().map(str::to_string).collect();
            self.cursor = 0;
        }
    }

    /// Consume the next token and require it to equal `expected`.
    pub fn expect(&mut self, expected: &str) -> Result<()> {
        let token = self.next_token()?;
        if token != expected {
            return Err(ModelError::ModelMalformed(format!(
                "{}:{}: expected {:?}, found {:?}",
                self.path, self.line, expected, token
            )));
        }
        Ok(())
    }

    /// Consume the next token and parse it as an integer; `what` names the
    /// field in error messages.
    pub fn next_int(&mut self, what: &str) -> Result<i32> {
        let token = self.next_token()?;
        token.parse().map_err(|_| {
            ModelError::ModelMalformed(format!(
                "{}:{}: {} is not an integer: {:?}",
                self.path, self.line, what, token
            ))
        })
    }

    /// The current line number (1-based).
    pub fn line(&self) -> usize {
        self.line
    }

    /// The path used in error messages.
    pub fn path(&self) -> &str {
        &self.path
    }
}
