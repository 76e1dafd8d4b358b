//! Owned statement tree used by the interpreter.
//!
//! The parser's `Statement<'code>` borrows the cell text. A compiled cell has
//! to outlive that borrow, so the tree is converted once after scope
//! resolution: every `&'code str` becomes a `StrSlice` into the cell's
//! `SourceCode`, no identifier is copied.

use super::source::{SourceCode, StrSlice};
use super::{BinaryOperator, Expression, Literal, Span, Spanned, Statement, UnaryOperator};

#[derive(Debug, Clone)]
pub struct StaticSpanned<T> {
    pub span: Span,
    pub node: T,
}

#[derive(Debug, Clone)]
pub enum StaticStatement {
    Assignment {
        targets: Vec<StaticSpanned<StrSlice>>,
        value: StaticSpanned<StaticExpression>,
    },
    Return {
        value: Option<StaticSpanned<StaticExpression>>,
    },
    If {
        condition: StaticSpanned<StaticExpression>,
        then_branch: Vec<StaticSpanned<Self>>,
        else_branch: Vec<StaticSpanned<Self>>,
    },
    For {
        variable: StaticSpanned<StrSlice>,
        iterable: StaticSpanned<StaticExpression>,
        body: Vec<StaticSpanned<Self>>,
    },
    Expression(StaticSpanned<StaticExpression>),
    /// Stores the value as the implicit output of a cell without declared outputs.
    Capture(StaticSpanned<StaticExpression>),
}

#[derive(Debug, Clone)]
pub enum StaticExpression {
    Literal(StaticLiteral),
    Variable(StrSlice),
    List {
        items: Vec<StaticSpanned<Self>>,
    },
    Index {
        target: Box<StaticSpanned<Self>>,
        index: Box<StaticSpanned<Self>>,
    },
    FunctionCall {
        path: Vec<StrSlice>,
        arguments: Vec<StaticSpanned<Self>>,
    },
    UnaryOperator {
        operator: UnaryOperator,
        operand: Box<StaticSpanned<Self>>,
    },
    BinaryOperator {
        operator: BinaryOperator,
        operand_a: Box<StaticSpanned<Self>>,
        operand_b: Box<StaticSpanned<Self>>,
    },
}

#[derive(Debug, Clone)]
pub enum StaticLiteral {
    Number(f64),
    Text(StrSlice),
    Bool(bool),
    None,
}

pub struct StatementConverter {
    source: SourceCode,
}

impl StatementConverter {
    pub fn new(source: SourceCode) -> Self {
        Self { source }
    }

    fn str_to_slice(&self, s: &str) -> StrSlice {
        self.source.slice_from_str(s)
    }

    fn convert_name(&self, name: &Spanned<&str>) -> StaticSpanned<StrSlice> {
        StaticSpanned {
            span: name.span,
            node: self.str_to_slice(name.node),
        }
    }

    pub fn convert_block(&self, statements: &[Spanned<Statement>]) -> Vec<StaticSpanned<StaticStatement>> {
        statements
            .iter()
            .map(|statement| StaticSpanned {
                span: statement.span,
                node: self.convert_statement(&statement.node),
            })
            .collect()
    }

    pub fn convert_statement(&self, statement: &Statement) -> StaticStatement {
        match statement {
            Statement::Assignment { targets, value } => StaticStatement::Assignment {
                targets: targets.iter().map(|t| self.convert_name(t)).collect(),
                value: self.convert_spanned(value),
            },
            Statement::Return { value } => StaticStatement::Return {
                value: value.as_ref().map(|v| self.convert_spanned(v)),
            },
            Statement::If {
                condition,
                then_branch,
                else_branch,
            } => StaticStatement::If {
                condition: self.convert_spanned(condition),
                then_branch: self.convert_block(then_branch),
                else_branch: self.convert_block(else_branch),
            },
            Statement::For {
                variable,
                iterable,
                body,
            } => StaticStatement::For {
                variable: self.convert_name(variable),
                iterable: self.convert_spanned(iterable),
                body: self.convert_block(body),
            },
            Statement::Expression(expression) => {
                StaticStatement::Expression(self.convert_spanned(expression))
            }
        }
    }

    pub fn convert_spanned(&self, spanned: &Spanned<Expression>) -> StaticSpanned<StaticExpression> {
        StaticSpanned {
            span: spanned.span,
            node: self.convert_expr(&spanned.node),
        }
    }

    pub fn convert_expr(&self, expr: &Expression) -> StaticExpression {
        match expr {
            Expression::Literal(literal) => StaticExpression::Literal(match literal {
                Literal::Number(number) => StaticLiteral::Number(*number),
                Literal::Text(text) => StaticLiteral::Text(self.str_to_slice(text)),
                Literal::Bool(value) => StaticLiteral::Bool(*value),
                Literal::None => StaticLiteral::None,
            }),
            Expression::Variable(name) => StaticExpression::Variable(self.str_to_slice(name)),
            Expression::List { items } => StaticExpression::List {
                items: items.iter().map(|i| self.convert_spanned(i)).collect(),
            },
            Expression::Index { target, index } => StaticExpression::Index {
                target: Box::new(self.convert_spanned(target)),
                index: Box::new(self.convert_spanned(index)),
            },
            Expression::FunctionCall { path, arguments } => StaticExpression::FunctionCall {
                path: path.iter().map(|s| self.str_to_slice(s)).collect(),
                arguments: arguments.iter().map(|a| self.convert_spanned(a)).collect(),
            },
            Expression::UnaryOperator { operator, operand } => StaticExpression::UnaryOperator {
                operator: *operator,
                operand: Box::new(self.convert_spanned(operand)),
            },
            Expression::BinaryOperator {
                operator,
                operand_a,
                operand_b,
            } => StaticExpression::BinaryOperator {
                operator: *operator,
                operand_a: Box::new(self.convert_spanned(operand_a)),
                operand_b: Box::new(self.convert_spanned(operand_b)),
            },
        }
    }
}

/// Convert a parsed cell body to its owned form.
///
/// `source` must be the `SourceCode` the statements were parsed from.
pub fn convert_statements(
    source: SourceCode,
    statements: &[Spanned<Statement>],
) -> Vec<StaticSpanned<StaticStatement>> {
    StatementConverter::new(source).convert_block(statements)
}
