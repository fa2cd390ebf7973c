//! Error types for graph-fusion
//!
//! This module defines all error types used throughout the crate.

use thiserror::Error;

use crate::graph::{OpId, TensorId};

/// Main error type for matching and fusion
#[derive(Error, Debug)]
pub enum FusionError {
    /// Two passes registered under the same `<backend>:<name>` key
    #[error("Duplicate pass registration: {key}")]
    DuplicatePass {
        /// The conflicting key
        key: String,
    },

    /// A pass does not own exactly one pattern factory
    #[error("Pass {pass} must own exactly one pattern, found {count}")]
    PatternCount {
        /// Pass key
        pass: String,
        /// Number of factories attached
        count: usize,
    },

    /// Pattern graph failed validation
    #[error("Invalid pattern {pattern}: {reason}")]
    InvalidPattern {
        /// Pattern name
        pattern: String,
        /// What is wrong with it
        reason: String,
    },

    /// No pass is registered for the requested backend
    #[error("No passes registered for backend: {0}")]
    UnknownBackend(String),

    /// A rewrite would leave the graph dangling or cyclic
    #[error("Fuse invariant violated by pattern {pattern} on ops {ops:?}: {reason}")]
    FuseInvariantViolation {
        /// Pattern name
        pattern: String,
        /// Ops of the offending match
        ops: Vec<OpId>,
        /// Which invariant broke
        reason: String,
    },

    /// Invalid op reference or op configuration
    #[error("Invalid op: {0}")]
    InvalidOp(String),

    /// Invalid tensor reference
    #[error("Invalid tensor {tensor}: {reason}")]
    InvalidTensor {
        /// Offending tensor
        tensor: TensorId,
        /// Reason
        reason: String,
    },

    /// Graph contains a cycle
    #[error("Graph contains a cycle through {0} ops")]
    CyclicGraph(usize),

    /// A pass failed while running
    #[error("Pass {pass} failed: {source}")]
    PassFailed {
        /// Pass key
        pass: String,
        /// Underlying error
        #[source]
        source: Box<FusionError>,
    },

    /// IO error while writing diagnostics
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl FusionError {
    /// Whether this error belongs to the configuration class
    ///
    /// Configuration errors surface while the registry or a pipeline is being
    /// set up and are never retried.
    pub fn is_configuration(&self) -> bool {
        match self {
            Self::DuplicatePass { .. }
            | Self::PatternCount { .. }
            | Self::InvalidPattern { .. }
            | Self::UnknownBackend(_) => true,
            Self::PassFailed { source, .. } => source.is_configuration(),
            _ => false,
        }
    }

    /// Whether this error is a fuse invariant violation
    pub fn is_invariant_violation(&self) -> bool {
        match self {
            Self::FuseInvariantViolation { .. } => true,
            Self::PassFailed { source, .. } => source.is_invariant_violation(),
            _ => false,
        }
    }

    pub(crate) fn invalid_pattern(pattern: &str, reason: impl Into<String>) -> Self {
        Self::InvalidPattern {
            pattern: pattern.to_string(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for fusion operations
pub type FusionResult<T> = Result<T, FusionError>;
