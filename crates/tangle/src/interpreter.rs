use crate::api;
use crate::artifacts::CallContext;
use crate::error::Fault;
use crate::parser::{
    BinaryOperator, SourceCode, Span, StaticExpression, StaticLiteral, StaticSpanned, StaticStatement,
    UnaryOperator,
};
use crate::value::{self, Value};
use std::collections::HashMap;

/// Compiled body of a cell written in cell code.
#[derive(Debug, Clone)]
pub struct Script {
    pub source: SourceCode,
    pub statements: Vec<StaticSpanned<StaticStatement>>,
}

/// How a finished run turns its bindings into output values.
#[derive(Debug, Clone, Copy)]
pub enum Outputs<'a> {
    /// Values of these local names, in this order.
    Declared(&'a [String]),
    /// The single value stored by `StaticStatement::Capture` or `return`.
    Implicit,
}

enum Flow {
    Next,
    Return,
}

pub struct Interpreter<'s, 'x, 'c> {
    inputs: HashMap<&'s str, Value>,
    locals: HashMap<&'s str, Value>,
    captured: Option<Value>,
    implicit: bool,
    context: &'x mut CallContext<'c>,
}

fn global(name: &str) -> Option<Value> {
    match name {
        "pi" => Some(Value::Number(std::f64::consts::PI)),
        "tau" => Some(Value::Number(std::f64::consts::TAU)),
        "inf" => Some(Value::Number(f64::INFINITY)),
        "nan" => Some(Value::Number(f64::NAN)),
        _ => None,
    }
}

/// Run `script` with `arguments` bound to `input_names` by position.
pub fn run(
    script: &Script,
    input_names: &[String],
    arguments: &[Value],
    outputs: Outputs,
    context: &mut CallContext,
) -> Result<Vec<Value>, Fault> {
    let mut interpreter = Interpreter {
        inputs: input_names
            .iter()
            .map(String::as_str)
            .zip(arguments.iter().cloned())
            .collect(),
        locals: HashMap::new(),
        captured: None,
        implicit: matches!(outputs, Outputs::Implicit),
        context,
    };
    interpreter.execute_block(&script.statements)?;
    match outputs {
        Outputs::Declared(names) => names
            .iter()
            .map(|name| {
                interpreter
                    .locals
                    .get(name.as_str())
                    .cloned()
                    .ok_or_else(|| Fault::raise(format!("output '{name}' was never assigned")))
            })
            .collect(),
        Outputs::Implicit => Ok(vec![interpreter.captured.unwrap_or(Value::None)]),
    }
}

impl<'s, 'x, 'c> Interpreter<'s, 'x, 'c> {
    fn execute_block(&mut self, statements: &'s [StaticSpanned<StaticStatement>]) -> Result<Flow, Fault> {
        for statement in statements {
            if let Flow::Return = self.execute(statement)? {
                return Ok(Flow::Return);
            }
        }
        Ok(Flow::Next)
    }

    fn execute(&mut self, statement: &'s StaticSpanned<StaticStatement>) -> Result<Flow, Fault> {
        match &statement.node {
            StaticStatement::Assignment { targets, value } => {
                let value = self.evaluate(value)?;
                if let [target] = targets.as_slice() {
                    self.locals.insert(target.node.as_str(), value);
                    return Ok(Flow::Next);
                }
                let items = match value.check().map_err(|fault| fault.at(range(statement.span)))? {
                    Value::List(items) if items.len() == targets.len() => items.clone(),
                    other => {
                        return Err(Fault::raise(format!(
                            "cannot unpack {} into {} names",
                            describe_length(other),
                            targets.len()
                        ))
                        .at(range(statement.span)));
                    }
                };
                for (target, item) in targets.iter().zip(items.iter()) {
                    self.locals.insert(target.node.as_str(), item.clone());
                }
                Ok(Flow::Next)
            }
            StaticStatement::Return { value } => {
                let value = match value {
                    Some(value) => self.evaluate(value)?,
                    None => Value::None,
                };
                if self.implicit {
                    self.captured = Some(value);
                }
                Ok(Flow::Return)
            }
            StaticStatement::If {
                condition,
                then_branch,
                else_branch,
            } => {
                let condition_value = self.evaluate(condition)?;
                if condition_value.truthy().map_err(|fault| fault.at(range(condition.span)))? {
                    self.execute_block(then_branch)
                } else {
                    self.execute_block(else_branch)
                }
            }
            StaticStatement::For {
                variable,
                iterable,
                body,
            } => {
                let items = self
                    .evaluate(iterable)?
                    .iterate()
                    .map_err(|fault| fault.at(range(iterable.span)))?;
                for item in items {
                    self.locals.insert(variable.node.as_str(), item);
                    if let Flow::Return = self.execute_block(body)? {
                        return Ok(Flow::Return);
                    }
                }
                Ok(Flow::Next)
            }
            StaticStatement::Expression(expression) => {
                self.evaluate(expression)?;
                Ok(Flow::Next)
            }
            StaticStatement::Capture(expression) => {
                self.captured = Some(self.evaluate(expression)?);
                Ok(Flow::Next)
            }
        }
    }

    fn evaluate(&mut self, expression: &'s StaticSpanned<StaticExpression>) -> Result<Value, Fault> {
        self.evaluate_expression(expression)
            .map_err(|fault| fault.at(range(expression.span)))
    }

    fn evaluate_expression(&mut self, expression: &'s StaticSpanned<StaticExpression>) -> Result<Value, Fault> {
        match &expression.node {
            StaticExpression::Literal(literal) => Ok(match literal {
                StaticLiteral::Number(number) => Value::Number(*number),
                StaticLiteral::Text(text) => Value::text(text.as_str()),
                StaticLiteral::Bool(value) => Value::Bool(*value),
                StaticLiteral::None => Value::None,
            }),
            StaticExpression::Variable(name) => self.lookup(name),
            StaticExpression::List { items } => items
                .iter()
                .map(|item| self.evaluate(item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::list),
            StaticExpression::Index { target, index } => {
                let target = self.evaluate(target)?;
                let index = self.evaluate(index)?;
                target.index(&index)
            }
            StaticExpression::FunctionCall { path, arguments } => {
                let definition = api::function_definition(path.as_slice()).ok_or_else(|| {
                    Fault::raise(format!(
                        "unknown function '{}'",
                        path.iter().map(|part| part.as_str()).collect::<Vec<_>>().join("/")
                    ))
                })?;
                let arguments = arguments
                    .iter()
                    .map(|argument| {
                        let value = self.evaluate(argument)?;
                        if !definition.accepts_errors {
                            value.check().map_err(|fault| fault.at(range(argument.span)))?;
                        }
                        Ok(value)
                    })
                    .collect::<Result<Vec<_>, Fault>>()?;
                (definition.body)(&arguments, &mut *self.context)
            }
            StaticExpression::UnaryOperator { operator, operand } => {
                let operand = self.evaluate(operand)?;
                match operator {
                    UnaryOperator::Negate => value::negate(&operand),
                    UnaryOperator::Not => Ok(Value::Bool(!operand.truthy()?)),
                }
            }
            StaticExpression::BinaryOperator {
                operator: BinaryOperator::And,
                operand_a,
                operand_b,
            } => {
                let a = self.evaluate(operand_a)?;
                if a.truthy()? { self.evaluate(operand_b) } else { Ok(a) }
            }
            StaticExpression::BinaryOperator {
                operator: BinaryOperator::Or,
                operand_a,
                operand_b,
            } => {
                let a = self.evaluate(operand_a)?;
                if a.truthy()? { Ok(a) } else { self.evaluate(operand_b) }
            }
            StaticExpression::BinaryOperator {
                operator,
                operand_a,
                operand_b,
            } => {
                let a = self.evaluate(operand_a)?;
                let b = self.evaluate(operand_b)?;
                value::binary(*operator, &a, &b)
            }
        }
    }

    fn lookup(&self, name: &str) -> Result<Value, Fault> {
        self.locals
            .get(name)
            .or_else(|| self.inputs.get(name))
            .cloned()
            .or_else(|| global(name))
            .ok_or_else(|| Fault::raise(format!("name '{name}' is used before it is assigned")))
    }
}

fn range(span: Span) -> std::ops::Range<usize> {
    span.into_range()
}

fn describe_length(value: &Value) -> String {
    match value {
        Value::List(items) => format!("a list of {}", items.len()),
        other => format!("a {}", other.type_name()),
    }
}
