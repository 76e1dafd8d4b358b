use super::{ParseError, Spanned};
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketRoundOpen,
    BracketRoundClose,
    BracketCurlyOpen,
    BracketCurlyClose,
    BracketSquareOpen,
    BracketSquareClose,
    Comment(&'code str),
    Number(f64),
    Comma,
    Newline,
    Assign,
    NotEqual,
    GreaterOrEqual,
    Greater,
    LessOrEqual,
    Less,
    Equal,
    Minus,
    Plus,
    DoubleAsterisk,
    Asterisk,
    Slash,
    Percent,
    Text(&'code str),
    SnakeCaseIdentifier(&'code str),
    PascalCaseIdentifier(&'code str),
    Return,
    If,
    Else,
    For,
    In,
    And,
    Or,
    Not,
    True,
    False,
    None,
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketRoundOpen => "(".into(),
            Self::BracketRoundClose => ")".into(),
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::Comment(comment) => comment.into(),
            Self::Number(number) => number.to_string().into(),
            Self::Comma => ",".into(),
            Self::Newline => "\n".into(),
            Self::Assign => "=".into(),
            Self::NotEqual => "!=".into(),
            Self::GreaterOrEqual => ">=".into(),
            Self::Greater => ">".into(),
            Self::LessOrEqual => "<=".into(),
            Self::Less => "<".into(),
            Self::Equal => "==".into(),
            Self::Minus => "-".into(),
            Self::Plus => "+".into(),
            Self::DoubleAsterisk => "**".into(),
            Self::Asterisk => "*".into(),
            Self::Slash => "/".into(),
            Self::Percent => "%".into(),
            Self::Text(text) => text.into(),
            Self::SnakeCaseIdentifier(identifier) => identifier.into(),
            Self::PascalCaseIdentifier(identifier) => identifier.into(),
            Self::Return => "return".into(),
            Self::If => "if".into(),
            Self::Else => "else".into(),
            Self::For => "for".into(),
            Self::In => "in".into(),
            Self::And => "and".into(),
            Self::Or => "or".into(),
            Self::Not => "not".into(),
            Self::True => "true".into(),
            Self::False => "false".into(),
            Self::None => "none".into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('(').to(Token::BracketRoundOpen),
        just(')').to(Token::BracketRoundClose),
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
    ));

    // Longer operators first so `==` never lexes as two assignments.
    let comparator_or_assign = choice((
        just("==").to(Token::Equal),
        just("!=").to(Token::NotEqual),
        just(">=").to(Token::GreaterOrEqual),
        just('>').to(Token::Greater),
        just("<=").to(Token::LessOrEqual),
        just('<').to(Token::Less),
        just('=').to(Token::Assign),
    ));

    let arithmetic_operator_or_path_separator = choice((
        just('-').to(Token::Minus),
        just('+').to(Token::Plus),
        just("**").to(Token::DoubleAsterisk),
        just('*').to(Token::Asterisk),
        just('/').to(Token::Slash),
        just('%').to(Token::Percent),
    ));

    let comment = just('#')
        .ignore_then(none_of("\r\n").repeated())
        .to_slice()
        .map(Token::Comment);

    // Negative numbers are unary minus applied to a literal.
    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10));
    let number = text::int(10)
        .then(just('.').then(text::digits(10)).or_not())
        .then(exponent.or_not())
        .to_slice()
        .from_str()
        .unwrapped()
        .map(Token::Number);

    let text = choice((
        just('"')
            .ignore_then(none_of("\"\r\n").repeated().to_slice())
            .then_ignore(just('"')),
        just('\'')
            .ignore_then(none_of("'\r\n").repeated().to_slice())
            .then_ignore(just('\'')),
    ))
    .map(Token::Text);

    let snake_case_identifier_or_keyword = any()
        .filter(|character: &char| character.is_ascii_lowercase() || *character == '_')
        .then(
            any()
                .filter(|character: &char| {
                    *character == '_' || character.is_ascii_alphanumeric()
                })
                .repeated(),
        )
        .to_slice()
        .map(|identifier| match identifier {
            "return" => Token::Return,
            "if" => Token::If,
            "else" => Token::Else,
            "for" => Token::For,
            "in" => Token::In,
            "and" => Token::And,
            "or" => Token::Or,
            "not" => Token::Not,
            "true" => Token::True,
            "false" => Token::False,
            "none" => Token::None,
            _ => Token::SnakeCaseIdentifier(identifier),
        });

    let pascal_case_identifier = any()
        .filter(char::is_ascii_uppercase)
        .then(any().filter(char::is_ascii_alphanumeric).repeated())
        .to_slice()
        .map(Token::PascalCaseIdentifier);

    let token = choice((
        bracket,
        comment,
        number,
        just(',').to(Token::Comma),
        text::newline().to(Token::Newline),
        just(';').to(Token::Newline),
        comparator_or_assign,
        arithmetic_operator_or_path_separator,
        text,
        snake_case_identifier_or_keyword,
        pascal_case_identifier,
    ));

    let token = token
        .map_with(|token, extra| Spanned {
            node: token,
            span: extra.span(),
        })
        .then_ignore(text::inline_whitespace())
        .recover_with(skip_then_retry_until(any().ignored(), end()));

    text::inline_whitespace().ignore_then(token.repeated().collect())
}
