//! Phonetic units and HMM positions.

use std::fmt;
use std::sync::Arc;

use crate::constants::unit::SILENCE_CIPHONE;
use crate::error::{ModelError, Result};

/// Left/right phonetic context of a triphone.
///
/// Context width is one unit on each side; the context units themselves are
/// always context-independent.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LeftRightContext {
    /// The unit to the left.
    pub left: Arc<Unit>,
    /// The unit to the right.
    pub right: Arc<Unit>,
}

impl fmt::Display for LeftRightContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{},{}", self.left.name(), self.right.name())
    }
}

/// A phone identifier with optional filler attribute and triphone context.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Unit {
    name: String,
    filler: bool,
    context: Option<LeftRightContext>,
}

impl Unit {
    /// Create a context-independent unit.
    pub fn new(name: impl Into<String>, filler: bool) -> Self {
        Self {
            name: name.into(),
            filler,
            context: None,
        }
    }

    /// Create a context-dependent (triphone) unit.
    pub fn with_context(name: impl Into<String>, filler: bool, context: LeftRightContext) -> Self {
        Self {
            name: name.into(),
            filler,
            context: Some(context),
        }
    }

    /// The silence unit every model must contain.
    pub fn silence() -> Self {
        Self::new(SILENCE_CIPHONE, true)
    }

    /// The phone name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Whether this unit is a filler (non-speech) phone.
    pub fn is_filler(&self) -> bool {
        self.filler
    }

    /// Whether this unit is the silence phone.
    pub fn is_silence(&self) -> bool {
        self.context.is_none() && self.name == SILENCE_CIPHONE
    }

    /// The triphone context, if any.
    pub fn context(&self) -> Option<&LeftRightContext> {
        self.context.as_ref()
    }

    /// Whether this unit is context-dependent.
    pub fn is_context_dependent(&self) -> bool {
        self.context.is_some()
    }
}

impl fmt::Display for Unit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.context {
            Some(context) => write!(f, "{}({})", self.name, context),
            None => write!(f, "{}", self.name),
        }
    }
}

/// Position of an HMM within a word.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HmmPosition {
    /// First phone of a word.
    Begin,
    /// Middle phone of a word.
    Middle,
    /// Last phone of a word.
    End,
    /// Sole phone of a single-phone word.
    Single,
    /// Word-internal phone.
    Internal,
    /// Position not specified (context-independent phones).
    Undefined,
}

impl HmmPosition {
    /// Parse the single-character position marker used by the model
    /// definition grammar.
    pub fn lookup(marker: &str) -> Result<Self> {
        match marker {
            "b" => Ok(Self::Begin),
            "m" => Ok(Self::Middle),
            "e" => Ok(Self::End),
            "s" => Ok(Self::Single),
            "i" => Ok(Self::Internal),
            "-" => Ok(Self::Undefined),
            other => Err(ModelError::ModelMalformed(format!(
                "unknown HMM position marker {:?}",
                other
            ))),
        }
    }
}

impl fmt::Display for HmmPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let marker = match self {
            Self::Begin => "b",
            Self::Middle => "m",
            Self::End => "e",
            Self::Single => "s",
            Self::Internal => "i",
            Self::Undefined => "-",
        };
        write!(f, "{}", marker)
    }
}
