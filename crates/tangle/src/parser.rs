use chumsky::{input::ValueInput, pratt::*, prelude::*};

mod lexer;
pub use lexer::{Token, lexer};

mod scope_resolver;
pub use scope_resolver::{GLOBALS, ResolveError, Scope, resolve_scope};

mod source;
pub use source::{SourceCode, StrSlice};

mod static_statement;
pub use static_statement::*;

pub use chumsky::prelude::{Input, Parser};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

#[derive(Debug, Clone)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

/// Zero-width span at `position`, used as the end-of-input span when parsing tokens.
pub fn span_at(position: usize) -> Span {
    (position..position).into()
}

pub fn parser<'code, I>()
-> impl Parser<'code, I, Vec<Spanned<Statement<'code>>>, extra::Err<ParseError<'code, Token<'code>>>>
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let statement = recursive(|statement| {
        let separator = just(Token::Newline).repeated().at_least(1);
        let newlines = just(Token::Newline).repeated();
        let expression = expression_parser();

        let snake_case_identifier =
            select! { Token::SnakeCaseIdentifier(identifier) => identifier };

        let block = statement
            .separated_by(separator)
            .allow_leading()
            .allow_trailing()
            .collect::<Vec<_>>()
            .delimited_by(
                just(Token::BracketCurlyOpen),
                just(Token::BracketCurlyClose),
            );

        // `a, b = x` destructures, `a, b = 1, 2` packs the right side into a list first.
        let assignment = snake_case_identifier
            .clone()
            .map_with(|name, extra| Spanned {
                node: name,
                span: extra.span(),
            })
            .separated_by(just(Token::Comma))
            .at_least(1)
            .collect::<Vec<_>>()
            .then_ignore(just(Token::Assign))
            .then(
                expression
                    .clone()
                    .separated_by(just(Token::Comma))
                    .at_least(1)
                    .collect::<Vec<_>>()
                    .map_with(|mut values, extra| {
                        if values.len() == 1 {
                            values.remove(0)
                        } else {
                            Spanned {
                                node: Expression::List { items: values },
                                span: extra.span(),
                            }
                        }
                    }),
            )
            .map(|(targets, value)| Statement::Assignment { targets, value });

        let return_statement = just(Token::Return)
            .ignore_then(expression.clone().or_not())
            .map(|value| Statement::Return { value });

        let if_statement = recursive(|if_statement| {
            just(Token::If)
                .ignore_then(expression.clone())
                .then(block.clone())
                .then(
                    newlines
                        .ignore_then(just(Token::Else))
                        .ignore_then(choice((
                            if_statement.map_with(|statement, extra| {
                                vec![Spanned {
                                    node: statement,
                                    span: extra.span(),
                                }]
                            }),
                            block.clone(),
                        )))
                        .or_not(),
                )
                .map(|((condition, then_branch), else_branch)| Statement::If {
                    condition,
                    then_branch,
                    else_branch: else_branch.unwrap_or_default(),
                })
        });

        let for_statement = just(Token::For)
            .ignore_then(snake_case_identifier.map_with(|name, extra| Spanned {
                node: name,
                span: extra.span(),
            }))
            .then_ignore(just(Token::In))
            .then(expression.clone())
            .then(block)
            .map(|((variable, iterable), body)| Statement::For {
                variable,
                iterable,
                body,
            });

        let expression_statement = expression.map(Statement::Expression);

        choice((
            assignment,
            return_statement,
            if_statement,
            for_statement,
            expression_statement,
        ))
        .map_with(|statement, extra| Spanned {
            node: statement,
            span: extra.span(),
        })
    });

    statement
        .separated_by(just(Token::Newline).repeated().at_least(1))
        .allow_leading()
        .allow_trailing()
        .collect()
        .then_ignore(end())
}

fn expression_parser<'code, I>()
-> impl Parser<'code, I, Spanned<Expression<'code>>, extra::Err<ParseError<'code, Token<'code>>>> + Clone
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    recursive(|expression| {
        let comma = just(Token::Comma);
        let bracket_round_open = just(Token::BracketRoundOpen);
        let bracket_round_close = just(Token::BracketRoundClose);
        let bracket_square_open = just(Token::BracketSquareOpen);
        let bracket_square_close = just(Token::BracketSquareClose);

        let snake_case_identifier =
            select! { Token::SnakeCaseIdentifier(identifier) => identifier };
        let pascal_case_identifier =
            select! { Token::PascalCaseIdentifier(identifier) => identifier };

        let function_call = pascal_case_identifier
            .then_ignore(just(Token::Slash))
            .then(snake_case_identifier.clone())
            .then(
                expression
                    .clone()
                    .separated_by(comma.clone())
                    .allow_trailing()
                    .collect()
                    .delimited_by(bracket_round_open.clone(), bracket_round_close.clone()),
            )
            .map(|((module, function), arguments)| Expression::FunctionCall {
                path: vec![module, function],
                arguments,
            });

        let literal = select! {
            Token::Number(number) => Literal::Number(number),
            Token::Text(text) => Literal::Text(text),
            Token::True => Literal::Bool(true),
            Token::False => Literal::Bool(false),
            Token::None => Literal::None,
        };
        let expression_literal = literal.map(Expression::Literal);

        let list = expression
            .clone()
            .separated_by(comma)
            .allow_trailing()
            .collect()
            .delimited_by(bracket_square_open.clone(), bracket_square_close.clone())
            .map(|items| Expression::List { items });

        let variable = snake_case_identifier.map(Expression::Variable);

        let nested = expression
            .clone()
            .delimited_by(bracket_round_open, bracket_round_close);

        let atom = choice((expression_literal, function_call, list, variable))
            .map_with(|expression, extra| Spanned {
                node: expression,
                span: extra.span(),
            })
            .or(nested);

        let indexed = atom.foldl_with(
            expression
                .delimited_by(bracket_square_open, bracket_square_close)
                .repeated(),
            |target, index, extra| Spanned {
                node: Expression::Index {
                    target: Box::new(target),
                    index: Box::new(index),
                },
                span: extra.span(),
            },
        );

        let comparator = select! {
            Token::Equal => BinaryOperator::Equal,
            Token::NotEqual => BinaryOperator::NotEqual,
            Token::Greater => BinaryOperator::Greater,
            Token::GreaterOrEqual => BinaryOperator::GreaterOrEqual,
            Token::Less => BinaryOperator::Less,
            Token::LessOrEqual => BinaryOperator::LessOrEqual,
        };
        let additive = select! {
            Token::Plus => BinaryOperator::Add,
            Token::Minus => BinaryOperator::Subtract,
        };
        let multiplicative = select! {
            Token::Asterisk => BinaryOperator::Multiply,
            Token::Slash => BinaryOperator::Divide,
            Token::Percent => BinaryOperator::Remainder,
        };

        indexed.pratt((
            // Precedence 1 (lowest): or
            infix(left(1), just(Token::Or), |l, _, r, extra| {
                binary(BinaryOperator::Or, l, r, extra.span())
            }),
            infix(left(2), just(Token::And), |l, _, r, extra| {
                binary(BinaryOperator::And, l, r, extra.span())
            }),
            prefix(3, just(Token::Not), |_, operand, extra| {
                unary(UnaryOperator::Not, operand, extra.span())
            }),
            // Precedence 4: comparisons
            infix(left(4), comparator, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            infix(left(5), additive, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            infix(left(6), multiplicative, |l, operator, r, extra| {
                binary(operator, l, r, extra.span())
            }),
            prefix(7, just(Token::Minus), |_, operand, extra| {
                unary(UnaryOperator::Negate, operand, extra.span())
            }),
            // `-x ** 2` is `-(x ** 2)` and `2 ** 3 ** 2` is `2 ** 9`
            infix(right(8), just(Token::DoubleAsterisk), |l, _, r, extra| {
                binary(BinaryOperator::Power, l, r, extra.span())
            }),
        ))
    })
}

fn binary<'code>(
    operator: BinaryOperator,
    operand_a: Spanned<Expression<'code>>,
    operand_b: Spanned<Expression<'code>>,
    span: Span,
) -> Spanned<Expression<'code>> {
    Spanned {
        node: Expression::BinaryOperator {
            operator,
            operand_a: Box::new(operand_a),
            operand_b: Box::new(operand_b),
        },
        span,
    }
}

fn unary<'code>(
    operator: UnaryOperator,
    operand: Spanned<Expression<'code>>,
    span: Span,
) -> Spanned<Expression<'code>> {
    Spanned {
        node: Expression::UnaryOperator {
            operator,
            operand: Box::new(operand),
        },
        span,
    }
}

#[derive(Debug, Clone)]
pub enum Statement<'code> {
    Assignment {
        targets: Vec<Spanned<&'code str>>,
        value: Spanned<Expression<'code>>,
    },
    Return {
        value: Option<Spanned<Expression<'code>>>,
    },
    If {
        condition: Spanned<Expression<'code>>,
        then_branch: Vec<Spanned<Self>>,
        else_branch: Vec<Spanned<Self>>,
    },
    For {
        variable: Spanned<&'code str>,
        iterable: Spanned<Expression<'code>>,
        body: Vec<Spanned<Self>>,
    },
    Expression(Spanned<Expression<'code>>),
}

#[derive(Debug, Clone)]
pub enum Expression<'code> {
    Literal(Literal<'code>),
    Variable(&'code str),
    List {
        items: Vec<Spanned<Self>>,
    },
    Index {
        target: Box<Spanned<Self>>,
        index: Box<Spanned<Self>>,
    },
    FunctionCall {
        path: Vec<&'code str>,
        arguments: Vec<Spanned<Self>>,
    },
    UnaryOperator {
        operator: UnaryOperator,
        operand: Box<Spanned<Self>>,
    },
    BinaryOperator {
        operator: BinaryOperator,
        operand_a: Box<Spanned<Self>>,
        operand_b: Box<Spanned<Self>>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Literal<'code> {
    Number(f64),
    Text(&'code str),
    Bool(bool),
    None,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Negate,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOperator {
    Or,
    And,
    Equal,
    NotEqual,
    Greater,
    GreaterOrEqual,
    Less,
    LessOrEqual,
    Add,
    Subtract,
    Multiply,
    Divide,
    Remainder,
    Power,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            Self::Or => "or",
            Self::And => "and",
            Self::Equal => "==",
            Self::NotEqual => "!=",
            Self::Greater => ">",
            Self::GreaterOrEqual => ">=",
            Self::Less => "<",
            Self::LessOrEqual => "<=",
            Self::Add => "+",
            Self::Subtract => "-",
            Self::Multiply => "*",
            Self::Divide => "/",
            Self::Remainder => "%",
            Self::Power => "**",
        }
    }
}
