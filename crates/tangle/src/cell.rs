use crate::artifacts::CallContext;
use crate::error::{CellError, Diagnostic, Fault};
use crate::interpreter::{self, Outputs, Script};
use crate::parser::{
    Input, ParseError, Parser, SourceCode, Spanned, StaticExpression, StaticSpanned, StaticStatement, Token,
    convert_statements, lexer, parser, resolve_scope, span_at,
};
use crate::value::Value;
use indexmap::IndexMap;
use std::fmt;
use std::sync::Arc;

pub type NativeBody = Arc<dyn Fn(&[Value], &mut CallContext) -> Result<Vec<Value>, Fault> + Send + Sync>;

#[derive(Clone)]
pub enum CellBody {
    Script(Script),
    /// Host function registered with explicit input and output names.
    Native(NativeBody),
    /// Compilation failed, the error is every output's value.
    Failed(Arc<CellError>),
}

impl fmt::Debug for CellBody {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Script(script) => f.debug_tuple("Script").field(&script.statements.len()).finish(),
            Self::Native(_) => f.write_str("Native"),
            Self::Failed(error) => f.debug_tuple("Failed").field(error).finish(),
        }
    }
}

/// A compiled cell. Never mutated, an edit produces a new `Cell`.
#[derive(Debug, Clone)]
pub struct Cell {
    pub name: String,
    /// Cell code, `None` for native cells.
    pub source: Option<SourceCode>,
    /// Output names as written by the author, possibly empty.
    pub declared_outputs: Vec<String>,
    /// Names of the values the body returns, positionally.
    pub outputs: Vec<String>,
    /// Free variables of the body, bound by name on every call.
    pub inputs: Vec<String>,
    pub body: CellBody,
}

impl Cell {
    pub fn native(
        name: impl Into<String>,
        inputs: impl IntoIterator<Item = impl Into<String>>,
        outputs: impl IntoIterator<Item = impl Into<String>>,
        body: impl Fn(&[Value], &mut CallContext) -> Result<Vec<Value>, Fault> + Send + Sync + 'static,
    ) -> Self {
        let outputs: Vec<String> = outputs.into_iter().map(Into::into).collect();
        Self {
            name: name.into(),
            source: None,
            declared_outputs: outputs.clone(),
            outputs,
            inputs: inputs.into_iter().map(Into::into).collect(),
            body: CellBody::Native(Arc::new(body)),
        }
    }

    pub fn compile_error(&self) -> Option<&Arc<CellError>> {
        match &self.body {
            CellBody::Failed(error) => Some(error),
            _ => None,
        }
    }

    /// Run the body once. `arguments` follow the order of `self.inputs`.
    pub fn call(&self, arguments: &[Value], context: &mut CallContext) -> Result<Vec<Value>, Fault> {
        match &self.body {
            CellBody::Script(script) => {
                let outputs = if self.declared_outputs.is_empty() && !self.outputs.is_empty() {
                    Outputs::Implicit
                } else {
                    Outputs::Declared(&self.outputs)
                };
                interpreter::run(script, &self.inputs, arguments, outputs, context)
            }
            CellBody::Native(body) => {
                let values = body(arguments, context)?;
                if values.len() != self.outputs.len() {
                    return Err(Fault::raise(format!(
                        "native cell returned {} values for {} outputs",
                        values.len(),
                        self.outputs.len()
                    )));
                }
                Ok(values)
            }
            CellBody::Failed(error) => Err(Fault::Propagated(error.clone())),
        }
    }
}

fn diagnostics<'code, T: fmt::Display + 'code>(
    errors: impl IntoIterator<Item = ParseError<'code, T>>,
) -> Vec<Diagnostic> {
    errors
        .into_iter()
        .map(|error| Diagnostic {
            message: error.to_string(),
            span: error.span().into_range(),
        })
        .collect()
}

/// Compile one cell.
///
/// Never fails: problems produce a cell whose body is `CellBody::Failed`.
/// Without declared outputs the cell has a single output named after the
/// cell, captured from its final statement.
pub fn compile_cell(name: &str, source: &str, declared_outputs: &[String]) -> Cell {
    let source_code = SourceCode::new(source);
    let code = source_code.as_str();
    let failed = |diagnostics: Vec<Diagnostic>| {
        log::debug!("cell '{name}' failed to compile: {diagnostics:?}");
        Cell {
            name: name.to_owned(),
            source: Some(source_code.clone()),
            declared_outputs: declared_outputs.to_vec(),
            outputs: if declared_outputs.is_empty() {
                vec![name.to_owned()]
            } else {
                declared_outputs.to_vec()
            },
            inputs: Vec::new(),
            body: CellBody::Failed(Arc::new(CellError::Compile {
                cell: name.to_owned(),
                diagnostics,
            })),
        }
    };

    let (tokens, errors) = lexer().parse(code).into_output_errors();
    if !errors.is_empty() {
        return failed(diagnostics(errors));
    }
    let Some(mut tokens) = tokens else {
        return failed(Vec::new());
    };
    tokens.retain(|spanned_token| !matches!(spanned_token.node, Token::Comment(_)));

    let (statements, errors) = parser()
        .parse(tokens.map(span_at(code.len()), |Spanned { node, span }| (node, span)))
        .into_output_errors();
    if !errors.is_empty() {
        return failed(diagnostics(errors));
    }
    let Some(statements) = statements else {
        return failed(Vec::new());
    };

    if statements.is_empty() {
        if !declared_outputs.is_empty() {
            log::warn!("cell '{name}' is empty, ignoring declared outputs {declared_outputs:?}");
        }
        return Cell {
            name: name.to_owned(),
            source: Some(source_code.clone()),
            declared_outputs: declared_outputs.to_vec(),
            outputs: Vec::new(),
            inputs: Vec::new(),
            body: CellBody::Script(Script {
                source: source_code.clone(),
                statements: Vec::new(),
            }),
        };
    }

    let scope = match resolve_scope(&statements, declared_outputs, code.len()) {
        Ok(scope) => scope,
        Err(errors) => return failed(diagnostics(errors)),
    };

    let mut statements = convert_statements(source_code.clone(), &statements);
    let outputs = if declared_outputs.is_empty() {
        capture_final_statement(&mut statements);
        vec![name.to_owned()]
    } else {
        declared_outputs.to_vec()
    };
    let inputs: Vec<String> = scope.inputs.iter().map(|input| input.to_string()).collect();
    log::debug!("compiled cell '{name}': inputs {inputs:?}, outputs {outputs:?}");

    Cell {
        name: name.to_owned(),
        source: Some(source_code.clone()),
        declared_outputs: declared_outputs.to_vec(),
        outputs,
        inputs,
        body: CellBody::Script(Script {
            source: source_code,
            statements,
        }),
    }
}

/// Make the final statement store its value as the implicit output.
///
/// A bare expression is captured directly, a single-name assignment captures
/// the assigned name. A final `return` captures its value when executed.
fn capture_final_statement(statements: &mut Vec<StaticSpanned<StaticStatement>>) {
    let Some(last) = statements.pop() else {
        return;
    };
    let span = last.span;
    match last.node {
        StaticStatement::Expression(expression) => statements.push(StaticSpanned {
            span,
            node: StaticStatement::Capture(expression),
        }),
        StaticStatement::Assignment { targets, value } if targets.len() == 1 => {
            let target = targets[0].clone();
            statements.push(StaticSpanned {
                span,
                node: StaticStatement::Assignment { targets, value },
            });
            statements.push(StaticSpanned {
                span,
                node: StaticStatement::Capture(StaticSpanned {
                    span: target.span,
                    node: StaticExpression::Variable(target.node),
                }),
            });
        }
        node => statements.push(StaticSpanned { span, node }),
    }
}

/// Compile every cell of `sources`, outputs are looked up by cell name.
pub fn compile_cells(
    sources: &IndexMap<String, String>,
    outputs: &IndexMap<String, Vec<String>>,
) -> IndexMap<String, Cell> {
    sources
        .iter()
        .map(|(name, source)| {
            let declared = outputs.get(name).map(Vec::as_slice).unwrap_or_default();
            (name.clone(), compile_cell(name, source, declared))
        })
        .collect()
}
