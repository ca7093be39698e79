//! Error taxonomy
//!
//! Absence is never an error: lookups return `Option`. Everything in here is
//! surfaced synchronously to the immediate caller and never retried.

use std::fmt;

use thiserror::Error;

/// Result alias used across the library
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the registry, resolver, evaluator and codec
#[derive(Debug, Error)]
pub enum Error {
    /// Bad or missing registration fields, identity mismatch
    #[error("validation failed: {0}")]
    Validation(String),

    /// Missing spec for evaluation, missing required query parameter
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Malformed target criteria
    #[error(transparent)]
    Evaluation(#[from] EvaluationError),

    /// Extension payload could not be encoded or decoded
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Document store or collaborator failure
    #[error("document store: {0:#}")]
    Store(#[source] anyhow::Error),

    /// Document did not have the expected shape
    #[error("serialization: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_argument(msg: impl Into<String>) -> Self {
        Self::InvalidArgument(msg.into())
    }

    /// HTTP-style status code for transport layers sitting on top of the API
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Validation(_)
            | Self::InvalidArgument(_)
            | Self::Evaluation(_)
            | Self::Codec(_) => 400,
            Self::Serialization(_) => 500,
            Self::Store(_) => 502,
        }
    }

    /// True for errors the caller caused and can fix by changing its input
    pub fn is_client_error(&self) -> bool {
        (400..500).contains(&self.status_code())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Store(err)
    }
}

/// A target criteria string that could not be parsed or evaluated
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvaluationError {
    pub message: String,
    /// Byte offset into the criteria string, when known
    pub position: Option<usize>,
}

impl EvaluationError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            position: None,
        }
    }

    pub fn at(message: impl Into<String>, position: usize) -> Self {
        Self {
            message: message.into(),
            position: Some(position),
        }
    }
}

impl fmt::Display for EvaluationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.position {
            Some(pos) => write!(f, "invalid target criteria at {}: {}", pos, self.message),
            None => write!(f, "invalid target criteria: {}", self.message),
        }
    }
}

impl std::error::Error for EvaluationError {}

/// Extension payload codec failures
#[derive(Debug, Error)]
pub enum CodecError {
    #[error("extension payload must encode as a JSON object")]
    NotAnObject,

    #[error("extension payload has no kind discriminator")]
    MissingKind,

    #[error("extension kind mismatch: expected {expected}, found {found}")]
    KindMismatch { expected: String, found: String },

    #[error("extension kind {0} is already registered")]
    DuplicateKind(String),

    #[error("extension payload: {0}")]
    Json(#[from] serde_json::Error),
}
