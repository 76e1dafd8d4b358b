//! Reactive cell engine.
//!
//! Cells are small pieces of code that read free variables and produce named
//! outputs. A [`Workspace`] compiles them, infers which cell feeds which, and
//! re-runs only the cells whose inputs changed when a pass is requested.

pub mod api;
pub mod artifacts;
pub mod capture;
pub mod cell;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod graph;
pub mod interpreter;
pub mod memo;
pub mod notebook;
pub mod parser;
pub mod plot;
pub mod report;
pub mod value;
pub mod workspace;

pub use artifacts::{CallContext, Image};
pub use cell::{Cell, compile_cell, compile_cells};
pub use config::WorkspaceConfig;
pub use error::{CellError, Diagnostic, FailureKind, Fault};
pub use evaluator::{ChangeObserver, PassReport};
pub use graph::{Graph, Producer};
pub use notebook::{Notebook, NotebookError};
pub use value::Value;
pub use workspace::Workspace;
