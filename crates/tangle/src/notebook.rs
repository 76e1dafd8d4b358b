//! Notebook files: a list of cells plus optional expected values.
//!
//! Text format:
//!
//! ```text
//! %% data -> xs, ys
//! xs = List/linspace(0, tau, 50)
//! ys = Math/sin(xs)
//!
//! %% plot
//! Plot/line(xs, ys)
//!
//! %! expect data = [0, 1]
//! ```
//!
//! `%% name` starts a cell, an optional `-> a, b` declares its outputs.
//! `%!` lines are directives and never belong to a cell.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSource {
    pub name: String,
    pub source: String,
    #[serde(default)]
    pub outputs: Vec<String>,
}

/// `%! expect name = <json>`, checked by the test runner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Expectation {
    pub name: String,
    /// JSON text of the expected value.
    pub expected: String,
    #[serde(default)]
    pub line: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Notebook {
    pub cells: Vec<CellSource>,
    #[serde(default)]
    pub expectations: Vec<Expectation>,
}

#[derive(Debug, Error)]
pub enum NotebookError {
    #[error("cannot read '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("line {line}: code before the first '%%' cell header")]
    MissingHeader { line: usize },
    #[error("line {line}: invalid cell header: {message}")]
    InvalidHeader { line: usize, message: String },
    #[error("line {line}: cell '{name}' is defined twice")]
    DuplicateCell { name: String, line: usize },
    #[error("line {line}: unknown directive '{text}'")]
    InvalidDirective { line: usize, text: String },
    #[cfg(feature = "cli")]
    #[error("invalid JSON notebook: {0}")]
    Json(#[from] serde_json::Error),
}

fn is_identifier(name: &str) -> bool {
    let mut characters = name.chars();
    characters
        .next()
        .is_some_and(|first| first.is_ascii_lowercase() || first == '_')
        && characters.all(|character| character == '_' || character.is_ascii_alphanumeric())
}

fn parse_header(header: &str, line: usize) -> Result<CellSource, NotebookError> {
    let invalid = |message: String| NotebookError::InvalidHeader { line, message };
    let (name, outputs) = match header.split_once("->") {
        Some((name, outputs)) => (name.trim(), Some(outputs)),
        None => (header.trim(), None),
    };
    if !is_identifier(name) {
        return Err(invalid(format!("'{name}' is not a valid cell name")));
    }
    let outputs = match outputs {
        None => Vec::new(),
        Some(outputs) => outputs
            .split(',')
            .map(str::trim)
            .map(|output| {
                if is_identifier(output) {
                    Ok(output.to_owned())
                } else {
                    Err(invalid(format!("'{output}' is not a valid output name")))
                }
            })
            .collect::<Result<_, _>>()?,
    };
    Ok(CellSource {
        name: name.to_owned(),
        source: String::new(),
        outputs,
    })
}

fn parse_directive(directive: &str, line: usize) -> Result<Expectation, NotebookError> {
    let invalid = || NotebookError::InvalidDirective {
        line,
        text: directive.to_owned(),
    };
    let expectation = directive.trim().strip_prefix("expect").ok_or_else(invalid)?;
    let (name, expected) = expectation.split_once('=').ok_or_else(invalid)?;
    let (name, expected) = (name.trim(), expected.trim());
    if !is_identifier(name) || expected.is_empty() {
        return Err(invalid());
    }
    Ok(Expectation {
        name: name.to_owned(),
        expected: expected.to_owned(),
        line,
    })
}

#[cfg(feature = "cli")]
fn parse_file(path: &Path, text: &str) -> Result<Notebook, NotebookError> {
    if path.extension().is_some_and(|extension| extension == "json") {
        Notebook::from_json(text)
    } else {
        Notebook::parse(text)
    }
}

#[cfg(not(feature = "cli"))]
fn parse_file(_: &Path, text: &str) -> Result<Notebook, NotebookError> {
    Notebook::parse(text)
}

fn finish_cell(cell: &mut CellSource) {
    let trimmed = cell.source.trim_end().len();
    cell.source.truncate(trimmed);
}

impl Notebook {
    pub fn parse(text: &str) -> Result<Self, NotebookError> {
        let mut notebook = Notebook::default();
        let mut current: Option<CellSource> = None;
        for (index, line) in text.lines().enumerate() {
            let line_number = index + 1;
            if let Some(header) = line.strip_prefix("%%") {
                if let Some(mut cell) = current.take() {
                    finish_cell(&mut cell);
                    notebook.cells.push(cell);
                }
                let cell = parse_header(header, line_number)?;
                if notebook.cells.iter().any(|existing| existing.name == cell.name) {
                    return Err(NotebookError::DuplicateCell {
                        name: cell.name,
                        line: line_number,
                    });
                }
                current = Some(cell);
            } else if let Some(directive) = line.strip_prefix("%!") {
                notebook.expectations.push(parse_directive(directive, line_number)?);
            } else if let Some(cell) = current.as_mut() {
                if !cell.source.is_empty() || !line.trim().is_empty() {
                    cell.source.push_str(line);
                    cell.source.push('\n');
                }
            } else {
                let trimmed = line.trim();
                if !trimmed.is_empty() && !trimmed.starts_with('#') {
                    return Err(NotebookError::MissingHeader { line: line_number });
                }
            }
        }
        if let Some(mut cell) = current {
            finish_cell(&mut cell);
            notebook.cells.push(cell);
        }
        Ok(notebook)
    }

    #[cfg(feature = "cli")]
    pub fn from_json(text: &str) -> Result<Self, NotebookError> {
        Ok(serde_json::from_str(text)?)
    }

    /// Read a notebook, `.json` files with the `cli` feature, text otherwise.
    pub fn load(path: &Path) -> Result<Self, NotebookError> {
        let text = std::fs::read_to_string(path).map_err(|source| NotebookError::Io {
            path: path.to_owned(),
            source,
        })?;
        parse_file(path, &text)
    }

    pub fn sources(&self) -> IndexMap<String, String> {
        self.cells
            .iter()
            .map(|cell| (cell.name.clone(), cell.source.clone()))
            .collect()
    }

    pub fn outputs(&self) -> IndexMap<String, Vec<String>> {
        self.cells
            .iter()
            .filter(|cell| !cell.outputs.is_empty())
            .map(|cell| (cell.name.clone(), cell.outputs.clone()))
            .collect()
    }

    pub fn cell(&self, name: &str) -> Option<&CellSource> {
        self.cells.iter().find(|cell| cell.name == name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTEBOOK: &str = "\
# sine demo

%% data -> xs, ys
xs = List/linspace(0, 1, 3)
ys = xs * 2

%% total
List/sum(ys)
%! expect total = 3
";

    #[test]
    fn test_parse_cells_and_expectations() {
        let notebook = Notebook::parse(NOTEBOOK).unwrap();
        assert_eq!(notebook.cells.len(), 2);
        assert_eq!(notebook.cells[0].name, "data");
        assert_eq!(notebook.cells[0].outputs, ["xs", "ys"]);
        assert_eq!(
            notebook.cells[0].source,
            "xs = List/linspace(0, 1, 3)\nys = xs * 2"
        );
        assert_eq!(notebook.cells[1].source, "List/sum(ys)");
        assert_eq!(
            notebook.expectations,
            vec![Expectation {
                name: "total".into(),
                expected: "3".into(),
                line: 9,
            }]
        );
        assert_eq!(notebook.outputs().len(), 1);
        assert_eq!(notebook.sources()["total"], "List/sum(ys)");
    }

    #[test]
    fn test_code_before_header() {
        assert!(matches!(
            Notebook::parse("x = 1\n%% a\n"),
            Err(NotebookError::MissingHeader { line: 1 })
        ));
    }

    #[test]
    fn test_invalid_headers() {
        assert!(matches!(
            Notebook::parse("%% Data\n"),
            Err(NotebookError::InvalidHeader { line: 1, .. })
        ));
        assert!(matches!(
            Notebook::parse("%% a -> x, 2y\n"),
            Err(NotebookError::InvalidHeader { line: 1, .. })
        ));
        assert!(matches!(
            Notebook::parse("%% a\n%% a\n"),
            Err(NotebookError::DuplicateCell { line: 2, .. })
        ));
        assert!(matches!(
            Notebook::parse("%% a\n%! check a\n"),
            Err(NotebookError::InvalidDirective { line: 2, .. })
        ));
    }

    #[test]
    fn test_empty_cell() {
        let notebook = Notebook::parse("%% blank\n\n%% next\n1").unwrap();
        assert_eq!(notebook.cells[0].source, "");
        assert_eq!(notebook.cells[1].source, "1");
    }
}
