//! Core capability errors (structural refusals, type inference, conversion, recovery).
//!
//! Validity problems (syntax, broken dependencies, naming conflicts) are not
//! errors: they are accumulated as `Validity` flags and returned as data.

use thiserror::Error;

use super::domain::NodeKind;
use super::identity::NodeId;

/// Structural invariant violation. The operation was not applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum OperationError {
    #[error("node {id} does not exist")]
    UnknownNode { id: NodeId },
    #[error("node {id} is already registered")]
    DuplicateNode { id: NodeId },
    #[error("node {id} is a {actual}, expected a {expected}")]
    WrongKind {
        id: NodeId,
        expected: NodeKind,
        actual: NodeKind,
    },
    #[error("node {id} still has {parents} parent(s) and {children} child(ren)")]
    StillLinked {
        id: NodeId,
        parents: usize,
        children: usize,
    },
    #[error("linking {child} under {parent} would create a dependency cycle")]
    Cycle { child: NodeId, parent: NodeId },
    #[error("no edge from {child} to parent {parent}")]
    MissingEdge { child: NodeId, parent: NodeId },
    #[error("node {id} cannot be its own parent")]
    SelfEdge { id: NodeId },
    #[error("stage {stage} is shared with another case")]
    SharedStage { stage: NodeId },
    #[error("case {case} is frozen")]
    FrozenCase { case: NodeId },
    #[error("stage {stage} is in text mode")]
    TextMode { stage: NodeId },
    #[error("stage {stage} is in graphical mode")]
    GraphicalMode { stage: NodeId },
    #[error("commands of stage {stage} are referenced by later stages: {by:?}")]
    ReferencedLater { stage: NodeId, by: Vec<NodeId> },
    #[error("{what} index {index} out of range (len {len})")]
    OutOfRange {
        what: &'static str,
        index: usize,
        len: usize,
    },
    #[error("reusable stages must be a prefix of the case, got {indices:?}")]
    NonPrefixReuse { indices: Vec<usize> },
    #[error("command {target} is not visible from stage {stage}")]
    Invisible { stage: NodeId, target: NodeId },
    #[error("case {case} is not a run case")]
    NotRunCase { case: NodeId },
    #[error("no item named `{name}` in stage {stage}")]
    NoSuchName { stage: NodeId, name: String },
    #[error("`{name}` is not a valid command name")]
    InvalidName { name: String },
    #[error("registry still references removed node {id}")]
    Dangling { id: NodeId },
}

/// The result type of a command cannot be determined.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("cannot infer result type of `{command}`: {reason}")]
pub struct TypeInferenceError {
    pub command: String,
    pub reason: String,
}

/// A text⇄graphical transformation failed. The stage keeps its prior mode.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("{}", render_conversion(.line, .reason))]
pub struct ConversionError {
    pub line: Option<usize>,
    pub reason: String,
}

impl ConversionError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            line: None,
            reason: reason.into(),
        }
    }

    pub fn at_line(line: usize, reason: impl Into<String>) -> Self {
        Self {
            line: Some(line),
            reason: reason.into(),
        }
    }
}

fn render_conversion(line: &Option<usize>, reason: &str) -> String {
    match line {
        Some(line) => format!("conversion failed at line {line}: {reason}"),
        None => format!("conversion failed: {reason}"),
    }
}

/// A persisted snapshot is malformed. Nothing was applied.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("invalid study snapshot: {reason}")]
pub struct RecoveryError {
    pub reason: String,
}

impl RecoveryError {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

/// Canonical error enum for the core capability.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum CoreError {
    #[error(transparent)]
    Operation(#[from] OperationError),
    #[error(transparent)]
    TypeInference(#[from] TypeInferenceError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error(transparent)]
    Recovery(#[from] RecoveryError),
}

impl CoreError {
    /// True when the refusal is a structural invariant violation.
    pub fn is_structural(&self) -> bool {
        matches!(self, CoreError::Operation(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conversion_error_mentions_line() {
        let err = ConversionError::at_line(3, "unexpected token `)`");
        assert_eq!(
            err.to_string(),
            "conversion failed at line 3: unexpected token `)`"
        );
        let err: CoreError = ConversionError::new("boom").into();
        assert_eq!(err.to_string(), "conversion failed: boom");
        assert!(!err.is_structural());
    }

    #[test]
    fn operation_errors_are_structural() {
        let err: CoreError = OperationError::SelfEdge {
            id: NodeId::new(4),
        }
        .into();
        assert!(err.is_structural());
        assert_eq!(err.to_string(), "node #4 cannot be its own parent");
    }
}
