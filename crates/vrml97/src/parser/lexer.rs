use super::{ParseError, Spanned};
use crate::node::InterfaceKind;
use chumsky::prelude::*;
use std::borrow::Cow;
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Token<'code> {
    BracketCurlyOpen,
    BracketCurlyClose,
    BracketSquareOpen,
    BracketSquareClose,
    Period,
    // Kept as text so SFInt32, SFFloat and SFTime each parse it at their own precision
    Number(&'code str),
    // Raw contents between the quotes, escapes still in place
    Text(&'code str),
    Identifier(&'code str),
    Def,
    Use,
    Proto,
    ExternProto,
    Route,
    To,
    Is,
    Null,
    True,
    False,
    Interface(InterfaceKind),
}

impl<'code> Token<'code> {
    pub fn into_cow_str(self) -> Cow<'code, str> {
        match self {
            Self::BracketCurlyOpen => "{".into(),
            Self::BracketCurlyClose => "}".into(),
            Self::BracketSquareOpen => "[".into(),
            Self::BracketSquareClose => "]".into(),
            Self::Period => ".".into(),
            Self::Number(number) => number.into(),
            Self::Text(text) => format!("\"{text}\"").into(),
            Self::Identifier(identifier) => identifier.into(),
            Self::Def => "DEF".into(),
            Self::Use => "USE".into(),
            Self::Proto => "PROTO".into(),
            Self::ExternProto => "EXTERNPROTO".into(),
            Self::Route => "ROUTE".into(),
            Self::To => "TO".into(),
            Self::Is => "IS".into(),
            Self::Null => "NULL".into(),
            Self::True => "TRUE".into(),
            Self::False => "FALSE".into(),
            Self::Interface(kind) => kind.keyword().into(),
        }
    }
}

impl fmt::Display for Token<'_> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.into_cow_str())
    }
}

/// VRML97 IdFirstChar.
fn is_id_first_char(character: char) -> bool {
    !character.is_ascii_digit() && !matches!(character, '+' | '-') && is_id_rest_char(character)
}

/// VRML97 IdRestChars.
fn is_id_rest_char(character: char) -> bool {
    !matches!(
        character,
        '\u{0}'..='\u{20}' | '"' | '#' | '\'' | ',' | '.' | '[' | '\\' | ']' | '{' | '}' | '\u{7f}'
    )
}

fn keyword_or_identifier(identifier: &str) -> Token<'_> {
    match identifier {
        "DEF" => Token::Def,
        "USE" => Token::Use,
        "PROTO" => Token::Proto,
        "EXTERNPROTO" => Token::ExternProto,
        "ROUTE" => Token::Route,
        "TO" => Token::To,
        "IS" => Token::Is,
        "NULL" => Token::Null,
        "TRUE" => Token::True,
        "FALSE" => Token::False,
        "field" | "initializeOnly" => Token::Interface(InterfaceKind::Field),
        "exposedField" | "inputOutput" => Token::Interface(InterfaceKind::ExposedField),
        "eventIn" | "inputOnly" => Token::Interface(InterfaceKind::EventIn),
        "eventOut" | "outputOnly" => Token::Interface(InterfaceKind::EventOut),
        _ => Token::Identifier(identifier),
    }
}

pub fn lexer<'code>()
-> impl Parser<'code, &'code str, Vec<Spanned<Token<'code>>>, extra::Err<ParseError<'code, char>>> {
    let bracket = choice((
        just('{').to(Token::BracketCurlyOpen),
        just('}').to(Token::BracketCurlyClose),
        just('[').to(Token::BracketSquareOpen),
        just(']').to(Token::BracketSquareClose),
    ));

    let hex_number = just('0')
        .then(one_of("xX"))
        .then(any().filter(char::is_ascii_hexdigit).repeated().at_least(1))
        .to_slice()
        .map(Token::Number);

    let exponent = one_of("eE")
        .then(one_of("+-").or_not())
        .then(text::digits(10));

    let decimal_number = one_of("+-")
        .or_not()
        .then(choice((
            text::digits(10)
                .then(just('.').then(text::digits(10).or_not()).or_not())
                .ignored(),
            just('.').then(text::digits(10)).ignored(),
        )))
        .then(exponent.or_not())
        .to_slice()
        .map(Token::Number);

    let text = just('"')
        .ignore_then(
            choice((just('\\').then(any()).ignored(), none_of("\\\"").ignored()))
                .repeated()
                .to_slice(),
        )
        .then_ignore(just('"'))
        .map(Token::Text);

    let identifier = any()
        .filter(|character: &char| is_id_first_char(*character))
        .then(any().filter(|character: &char| is_id_rest_char(*character)).repeated())
        .to_slice()
        .map(keyword_or_identifier);

    // Commas are whitespace in VRML97
    let comment = just('#').then(none_of("\r\n").repeated()).ignored();
    let separator = choice((one_of(" \t\r\n,").ignored(), comment)).repeated();

    let token = choice((
        bracket,
        hex_number,
        decimal_number,
        just('.').to(Token::Period),
        text,
        identifier,
    ));

    separator.clone().ignore_then(
        token
            .map_with(|token, extra| Spanned {
                node: token,
                span: extra.span(),
            })
            .then_ignore(separator)
            .recover_with(skip_then_retry_until(any().ignored(), end()))
            .repeated()
            .collect(),
    )
}
