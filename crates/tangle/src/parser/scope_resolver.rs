use super::{Expression, ParseError, Span, Spanned, Statement, Token};
use crate::api;
use indexmap::IndexSet;

/// Names every cell can read without a producer.
pub const GLOBALS: [&str; 4] = ["pi", "tau", "inf", "nan"];

pub type ResolveError<'code> = ParseError<'code, Token<'code>>;

#[derive(Debug, Clone, Default)]
pub struct Scope<'code> {
    /// Free variables in order of their first reference.
    pub inputs: Vec<&'code str>,
    /// Names bound anywhere in the body, in order of their first binding.
    pub locals: Vec<&'code str>,
}

/// Split the names used by a cell body into inputs and locals.
///
/// A name bound anywhere in the body (assignment target or loop variable) is
/// local for the whole body, even where it is read before the binding.
/// Unknown functions, wrong argument counts and declared outputs the body
/// never binds are reported as errors.
pub fn resolve_scope<'code>(
    statements: &[Spanned<Statement<'code>>],
    declared_outputs: &[String],
    source_len: usize,
) -> Result<Scope<'code>, Vec<ResolveError<'code>>> {
    let mut locals = IndexSet::new();
    collect_bindings(statements, &mut locals);

    let mut inputs = IndexSet::new();
    let mut errors = Vec::new();
    collect_references(statements, &locals, &mut inputs, &mut errors);

    for output in declared_outputs {
        if !locals.contains(output.as_str()) {
            errors.push(ResolveError::custom(
                Span::from(source_len..source_len),
                format!("Declared output '{output}' is never assigned"),
            ));
        }
    }

    if errors.is_empty() {
        Ok(Scope {
            inputs: inputs.into_iter().collect(),
            locals: locals.into_iter().collect(),
        })
    } else {
        Err(errors)
    }
}

fn collect_bindings<'code>(statements: &[Spanned<Statement<'code>>], locals: &mut IndexSet<&'code str>) {
    for statement in statements {
        match &statement.node {
            Statement::Assignment { targets, .. } => {
                locals.extend(targets.iter().map(|target| target.node));
            }
            Statement::If {
                then_branch,
                else_branch,
                ..
            } => {
                collect_bindings(then_branch, locals);
                collect_bindings(else_branch, locals);
            }
            Statement::For { variable, body, .. } => {
                locals.insert(variable.node);
                collect_bindings(body, locals);
            }
            Statement::Return { .. } | Statement::Expression(_) => {}
        }
    }
}

fn collect_references<'code>(
    statements: &[Spanned<Statement<'code>>],
    locals: &IndexSet<&'code str>,
    inputs: &mut IndexSet<&'code str>,
    errors: &mut Vec<ResolveError<'code>>,
) {
    for statement in statements {
        match &statement.node {
            Statement::Assignment { value, .. } => {
                visit_expression(value, locals, inputs, errors);
            }
            Statement::Return { value } => {
                if let Some(value) = value {
                    visit_expression(value, locals, inputs, errors);
                }
            }
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                visit_expression(condition, locals, inputs, errors);
                collect_references(then_branch, locals, inputs, errors);
                collect_references(else_branch, locals, inputs, errors);
            }
            Statement::For { iterable, body, .. } => {
                visit_expression(iterable, locals, inputs, errors);
                collect_references(body, locals, inputs, errors);
            }
            Statement::Expression(expression) => {
                visit_expression(expression, locals, inputs, errors);
            }
        }
    }
}

fn visit_expression<'code>(
    expression: &Spanned<Expression<'code>>,
    locals: &IndexSet<&'code str>,
    inputs: &mut IndexSet<&'code str>,
    errors: &mut Vec<ResolveError<'code>>,
) {
    match &expression.node {
        Expression::Literal(_) => {}
        Expression::Variable(name) => {
            if !locals.contains(name) && !GLOBALS.contains(name) {
                inputs.insert(*name);
            }
        }
        Expression::List { items } => {
            for item in items {
                visit_expression(item, locals, inputs, errors);
            }
        }
        Expression::Index { target, index } => {
            visit_expression(target, locals, inputs, errors);
            visit_expression(index, locals, inputs, errors);
        }
        Expression::FunctionCall { path, arguments } => {
            match api::function_definition(path.as_slice()) {
                Some(definition) => {
                    if !definition.arity.accepts(arguments.len()) {
                        errors.push(ResolveError::custom(
                            expression.span,
                            format!(
                                "Function '{}' expects {}, got {}",
                                path.join("/"),
                                definition.arity,
                                arguments.len()
                            ),
                        ));
                    }
                }
                None => errors.push(ResolveError::custom(
                    expression.span,
                    format!("Unknown function '{}'", path.join("/")),
                )),
            }
            for argument in arguments {
                visit_expression(argument, locals, inputs, errors);
            }
        }
        Expression::UnaryOperator { operand, .. } => {
            visit_expression(operand, locals, inputs, errors);
        }
        Expression::BinaryOperator {
            operand_a,
            operand_b,
            ..
        } => {
            visit_expression(operand_a, locals, inputs, errors);
            visit_expression(operand_b, locals, inputs, errors);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::{Input, Parser, lexer, parser, span_at};

    macro_rules! resolve_and_test {
        ($code:expr, $outputs:expr, $test:expr) => {{
            let tokens = lexer().parse($code).unwrap();
            let input = tokens.map(span_at($code.len()), |Spanned { node, span }| (node, span));
            let statements = parser().parse(input).unwrap();
            let outputs: Vec<String> = $outputs.iter().map(|o: &&str| o.to_string()).collect();
            $test(resolve_scope(&statements, &outputs, $code.len()))
        }};
    }

    #[test]
    fn test_inputs_in_first_reference_order() {
        resolve_and_test!("y = b + a\nz = a * c", ["y"], |scope: Result<Scope, _>| {
            assert_eq!(scope.unwrap().inputs, vec!["b", "a", "c"]);
        });
    }

    #[test]
    fn test_bound_names_are_local_everywhere() {
        resolve_and_test!("y = x\nx = 2", [] as [&str; 0], |scope: Result<Scope, _>| {
            let scope = scope.unwrap();
            assert!(scope.inputs.is_empty());
            assert_eq!(scope.locals, vec!["y", "x"]);
        });
    }

    #[test]
    fn test_globals_and_loop_variables_are_not_inputs() {
        resolve_and_test!(
            "total = 0\nfor t in ts {\n total = total + t * pi\n}",
            ["total"],
            |scope: Result<Scope, _>| {
                assert_eq!(scope.unwrap().inputs, vec!["ts"]);
            }
        );
    }

    #[test]
    fn test_function_arguments_are_references() {
        resolve_and_test!("Math/max(a, List/len(xs))", [] as [&str; 0], |scope: Result<Scope, _>| {
            assert_eq!(scope.unwrap().inputs, vec!["a", "xs"]);
        });
    }

    #[test]
    fn test_unknown_function_and_wrong_arity() {
        resolve_and_test!("a = Math/nope(1)\nb = Math/sin(1, 2)", ["a", "b"], |scope: Result<Scope, Vec<ResolveError>>| {
            let errors = scope.unwrap_err();
            assert_eq!(errors.len(), 2);
            assert!(errors[0].to_string().contains("Unknown function 'Math/nope'"));
            assert!(errors[1].to_string().contains("Math/sin"));
        });
    }

    #[test]
    fn test_unassigned_declared_output() {
        resolve_and_test!("a = 1", ["a", "b"], |scope: Result<Scope, Vec<ResolveError>>| {
            let errors = scope.unwrap_err();
            assert_eq!(errors.len(), 1);
            assert!(errors[0].to_string().contains("'b'"));
        });
    }
}
