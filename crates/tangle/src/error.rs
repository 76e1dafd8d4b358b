use serde::Serialize;
use std::fmt;
use std::ops::Range;
use std::sync::Arc;
use thiserror::Error;

/// One problem found while compiling a cell, located by byte range in its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Diagnostic {
    pub message: String,
    pub span: Range<usize>,
}

/// Everything that can go wrong with a cell value.
///
/// None of these abort an evaluation pass. They are stored in the cache as
/// `Value::Error` and flow to dependents like any other value.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CellError {
    #[error("cell '{cell}' failed to compile: {}", summary(.diagnostics))]
    Compile {
        cell: String,
        diagnostics: Vec<Diagnostic>,
    },
    #[error("cell '{cell}' raised: {message}")]
    Runtime {
        cell: String,
        message: String,
        span: Option<Range<usize>>,
    },
    #[error("cyclic dependency: {}", .cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },
    #[error("unknown reference '{name}'{}", requested_by_suffix(.requested_by))]
    UnknownReference {
        name: String,
        requested_by: Option<String>,
    },
    #[error("'{name}' is produced by several cells: {}", .cells.join(", "))]
    DuplicateProducer { name: String, cells: Vec<String> },
}

fn summary(diagnostics: &[Diagnostic]) -> String {
    diagnostics
        .iter()
        .map(|diagnostic| diagnostic.message.as_str())
        .collect::<Vec<_>>()
        .join("; ")
}

fn requested_by_suffix(requested_by: &Option<String>) -> String {
    match requested_by {
        Some(cell) => format!(" (required by cell '{cell}')"),
        None => String::new(),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Compile,
    Runtime,
    CyclicDependency,
    UnknownReference,
    DuplicateProducer,
}

impl FailureKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compile => "compile",
            Self::Runtime => "runtime",
            Self::CyclicDependency => "cyclic_dependency",
            Self::UnknownReference => "unknown_reference",
            Self::DuplicateProducer => "duplicate_producer",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl CellError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Compile { .. } => FailureKind::Compile,
            Self::Runtime { .. } => FailureKind::Runtime,
            Self::CyclicDependency { .. } => FailureKind::CyclicDependency,
            Self::UnknownReference { .. } => FailureKind::UnknownReference,
            Self::DuplicateProducer { .. } => FailureKind::DuplicateProducer,
        }
    }

    /// The cell the failure is attributed to, if it belongs to exactly one.
    pub fn cell(&self) -> Option<&str> {
        match self {
            Self::Compile { cell, .. } | Self::Runtime { cell, .. } => Some(cell),
            Self::UnknownReference { requested_by, .. } => requested_by.as_deref(),
            Self::CyclicDependency { .. } | Self::DuplicateProducer { .. } => None,
        }
    }
}

/// Why a cell body stopped without producing its outputs.
///
/// `Raised` is a new failure that gets attributed to the running cell.
/// `Propagated` is an input failure re-raised unchanged, so consumers
/// further down still see the original error.
#[derive(Debug, Clone)]
pub enum Fault {
    Raised {
        message: String,
        span: Option<Range<usize>>,
    },
    Propagated(Arc<CellError>),
}

impl Fault {
    pub fn raise(message: impl Into<String>) -> Self {
        Self::Raised {
            message: message.into(),
            span: None,
        }
    }

    /// Attach a source location unless the fault already has one.
    pub fn at(self, location: Range<usize>) -> Self {
        match self {
            Self::Raised {
                message,
                span: None,
            } => Self::Raised {
                message,
                span: Some(location),
            },
            other => other,
        }
    }

    pub fn into_cell_error(self, cell: &str) -> Arc<CellError> {
        match self {
            Self::Raised { message, span } => Arc::new(CellError::Runtime {
                cell: cell.to_owned(),
                message,
                span,
            }),
            Self::Propagated(error) => error,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_messages() {
        let error = CellError::CyclicDependency {
            cycle: vec!["a".into(), "b".into(), "a".into()],
        };
        assert_eq!(error.to_string(), "cyclic dependency: a -> b -> a");

        let error = CellError::UnknownReference {
            name: "x".into(),
            requested_by: Some("plot".into()),
        };
        assert_eq!(error.to_string(), "unknown reference 'x' (required by cell 'plot')");
        assert_eq!(error.cell(), Some("plot"));

        let error = CellError::Compile {
            cell: "c".into(),
            diagnostics: vec![
                Diagnostic { message: "one".into(), span: 0..1 },
                Diagnostic { message: "two".into(), span: 2..3 },
            ],
        };
        assert_eq!(error.to_string(), "cell 'c' failed to compile: one; two");
        assert_eq!(error.kind(), FailureKind::Compile);
    }

    #[test]
    fn test_propagated_fault_keeps_identity() {
        let original = Arc::new(CellError::DuplicateProducer {
            name: "x".into(),
            cells: vec!["a".into(), "b".into()],
        });
        let error = Fault::Propagated(original.clone()).into_cell_error("consumer");
        assert!(Arc::ptr_eq(&original, &error));
    }

    #[test]
    fn test_raised_fault_is_attributed() {
        let error = Fault::raise("boom").at(4..8).into_cell_error("c");
        assert_eq!(
            *error,
            CellError::Runtime {
                cell: "c".into(),
                message: "boom".into(),
                span: Some(4..8),
            }
        );
    }
}
