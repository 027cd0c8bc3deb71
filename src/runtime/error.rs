// SPDX-License-Identifier: MIT

//! Typed error handling for sift-rs
//!
//! Every fatal condition aborts the current pipeline run and is surfaced
//! to the caller as a [`SiftError`]. Nothing here is retried or swallowed.

use std::path::PathBuf;
use thiserror::Error;

pub type SiftResult<T> = Result<T, SiftError>;

/// Top-level error type for sift-rs
#[derive(Debug, Error)]
pub enum SiftError {
    /// Invalid pipeline configuration, detected before any run starts
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Routing failure inside a run
    #[error("Routing error: {0}")]
    Routing(#[from] RoutingError),

    /// A stage produced a result of the wrong shape
    #[error("Result format error: {0}")]
    ResultFormat(#[from] ResultFormatError),

    /// Missing or unreadable model/label resources
    #[error("Resource error: {0}")]
    Resource(#[from] ResourceError),

    /// Failure reported by the inference engine
    #[error("Inference error in '{stage}': {message}")]
    Inference { stage: String, message: String },

    /// I/O errors
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error(transparent)]
    Json(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error(transparent)]
    Yaml(#[from] serde_yaml::Error),
}

/// Configuration errors, fatal at pipeline build time
#[derive(Debug, Error, PartialEq)]
pub enum ConfigError {
    #[error("no input stage configured")]
    NoEntryStage,

    #[error("cannot create two input stages ('{first}' and '{second}')")]
    MultipleEntryStages { first: String, second: String },

    #[error("stage name '{0}' is used more than once")]
    DuplicateStage(String),

    #[error("stage name '{0}' is reserved")]
    ReservedStageName(String),

    #[error("malformed condition '{condition}': {reason}")]
    MalformedCondition { condition: String, reason: String },

    #[error("unknown comparison operator '{0}'")]
    UnknownOperator(String),

    #[error("invalid action: {0}")]
    InvalidAction(String),

    #[error("unknown preprocess '{0}'")]
    UnknownPreprocess(String),

    #[error("stage '{stage}' is missing required field '{field}'")]
    MissingField { stage: String, field: String },

    #[error("stage '{stage}' does not accept field '{field}'")]
    UnexpectedField { stage: String, field: String },

    #[error("stage '{stage}' routes to unknown stage '{target}'")]
    UnknownTarget { stage: String, target: String },

    #[error("stage '{stage}' has invalid input shape {shape:?}")]
    InvalidInputShape { stage: String, shape: Vec<usize> },
}

/// Errors raised while walking the stage graph
#[derive(Debug, Error, PartialEq)]
pub enum RoutingError {
    #[error("no stage with name '{target}' to continue from '{stage}'")]
    UnknownTarget { stage: String, target: String },

    #[error("stage '{stage}' cannot route to two stages ('{first}' and '{second}')")]
    TwoSuccessors {
        stage: String,
        first: String,
        second: String,
    },

    #[error("run exceeded {limit} stage invocations (last stage '{stage}')")]
    StepLimitExceeded { limit: usize, stage: String },

    #[error("stage '{stage}' cannot consume this input: {reason}")]
    UnsupportedInput { stage: String, reason: String },
}

/// Errors about the shape of stage results and tensors
#[derive(Debug, Error, PartialEq)]
pub enum ResultFormatError {
    #[error("percentage of '{keyword}' evaluated on an empty result")]
    EmptyResult { keyword: String },

    #[error("stage '{stage}' returned {classes} classes but {values} values")]
    LengthMismatch {
        stage: String,
        classes: usize,
        values: usize,
    },

    #[error("invalid tensor: {0}")]
    InvalidTensor(String),
}

/// Resource errors, fatal at stage construction
#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("labels file '{0}' not found")]
    LabelsNotFound(PathBuf),

    #[error("malformed line {line} in labels file '{path}'")]
    MalformedLabels { path: PathBuf, line: usize },

    #[error("model '{0}' not found")]
    ModelNotFound(PathBuf),
}

impl SiftError {
    /// Create an inference error
    pub fn inference(stage: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Inference {
            stage: stage.into(),
            message: message.into(),
        }
    }

    /// True for errors that are detected before a run starts
    pub fn is_config(&self) -> bool {
        matches!(self, SiftError::Config(_))
    }
}

impl ConfigError {
    pub fn malformed(condition: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::MalformedCondition {
            condition: condition.into(),
            reason: reason.into(),
        }
    }
}
