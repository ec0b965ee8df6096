use chumsky::{input::ValueInput, prelude::*};

mod lexer;
pub use lexer::{Token, lexer};

mod ast;
pub use ast::*;

mod diagnostics;
pub use diagnostics::render_errors;

pub use chumsky::prelude::{Input, Parser};

use crate::error::{Result, VrmlError};

pub type Span = SimpleSpan;
pub type ParseError<'code, T> = Rich<'code, T, Span>;

type Extra<'code> = extra::Err<ParseError<'code, Token<'code>>>;

#[derive(Debug, Clone, PartialEq)]
pub struct Spanned<T> {
    pub span: Span,
    pub node: T,
}

impl<T> Spanned<T> {
    pub fn new(node: T, span: Span) -> Self {
        Self { span, node }
    }
}

/// Empty span at `offset`, used as the end-of-input position.
pub fn span_at(offset: usize) -> Span {
    SimpleSpan::from(offset..offset)
}

fn unescape(text: &str) -> String {
    let mut unescaped = String::with_capacity(text.len());
    let mut characters = text.chars();
    while let Some(character) = characters.next() {
        if character == '\\' {
            if let Some(escaped) = characters.next() {
                unescaped.push(escaped);
            }
        } else {
            unescaped.push(character);
        }
    }
    unescaped
}

/// Builds the statement grammar and the stand-alone field value grammar,
/// which share the node rules.
fn grammar<'code, I>() -> (
    impl Parser<'code, I, Vec<Spanned<Statement>>, Extra<'code>> + Clone,
    impl Parser<'code, I, Spanned<RawValue>, Extra<'code>> + Clone,
)
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    let bracket_curly_open = just(Token::BracketCurlyOpen);
    let bracket_curly_close = just(Token::BracketCurlyClose);
    let bracket_square_open = just(Token::BracketSquareOpen);
    let bracket_square_close = just(Token::BracketSquareClose);
    let period = just(Token::Period);

    let identifier = select! { Token::Identifier(identifier) => identifier.to_string() }
        .map_with(|identifier, extra| Spanned {
            node: identifier,
            span: extra.span(),
        });

    let scalar = select! {
        Token::Number(number) => Scalar::Number(number.to_string()),
        Token::Text(text) => Scalar::Text(unescape(text)),
        Token::True => Scalar::Bool(true),
        Token::False => Scalar::Bool(false),
    };

    let mut statement = Recursive::declare();
    let mut node = Recursive::declare();

    let value = choice((
        just(Token::Null).to(RawValue::Null),
        choice((
            scalar.clone().map(ListItem::Scalar),
            node.clone().map(ListItem::Node),
        ))
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(bracket_square_open.clone(), bracket_square_close.clone())
        .map(RawValue::List),
        node.clone()
            .map(|node: Spanned<NodeStatement>| RawValue::Node(Box::new(node))),
        scalar
            .repeated()
            .at_least(1)
            .collect::<Vec<_>>()
            .map(RawValue::Scalars),
    ))
    .map_with(|value, extra| Spanned {
        node: value,
        span: extra.span(),
    });

    let interface = select! { Token::Interface(kind) => kind }
        .then(identifier.clone())
        .then(identifier.clone())
        .then(value.clone().or_not())
        .map_with(|(((kind, field_type), id), value), extra| Spanned {
            node: InterfaceDeclaration {
                kind,
                field_type,
                id,
                value,
            },
            span: extra.span(),
        });

    let interfaces = interface
        .repeated()
        .collect::<Vec<_>>()
        .delimited_by(bracket_square_open, bracket_square_close);

    let proto = just(Token::Proto)
        .ignore_then(identifier.clone())
        .then(interfaces.clone())
        .then(
            statement
                .clone()
                .repeated()
                .collect::<Vec<_>>()
                .delimited_by(bracket_curly_open.clone(), bracket_curly_close.clone()),
        )
        .map(|((id, interfaces), body)| ProtoDeclaration {
            id,
            interfaces,
            body,
        });

    let extern_proto = just(Token::ExternProto)
        .ignore_then(identifier.clone())
        .then(interfaces)
        .then(value.clone())
        .map(|((id, interfaces), urls)| ExternProtoDeclaration {
            id,
            interfaces,
            urls,
        });

    let route = just(Token::Route)
        .ignore_then(identifier.clone())
        .then_ignore(period.clone())
        .then(identifier.clone())
        .then_ignore(just(Token::To))
        .then(identifier.clone())
        .then_ignore(period)
        .then(identifier.clone())
        .map(|(((from_node, from_event), to_node), to_event)| RouteStatement {
            from_node,
            from_event,
            to_node,
            to_event,
        });

    let body_element = choice((
        route.clone().map(BodyElement::Route),
        proto.clone().map(BodyElement::Proto),
        extern_proto.clone().map(BodyElement::ExternProto),
        identifier
            .clone()
            .then_ignore(just(Token::Is))
            .then(identifier.clone())
            .map(|(id, proto_id)| BodyElement::Is { id, proto_id }),
        identifier
            .clone()
            .then(value.clone())
            .map(|(id, value)| BodyElement::Field { id, value }),
    ))
    .map_with(|element, extra| Spanned {
        node: element,
        span: extra.span(),
    });

    let instance = identifier.clone().then(
        body_element
            .repeated()
            .collect::<Vec<_>>()
            .delimited_by(bracket_curly_open, bracket_curly_close),
    );

    node.define(
        choice((
            just(Token::Def)
                .ignore_then(identifier.clone())
                .then(instance.clone())
                .map(|(name, (type_id, body))| NodeStatement::Instance {
                    name: Some(name),
                    type_id,
                    body,
                }),
            just(Token::Use)
                .ignore_then(identifier)
                .map(NodeStatement::Use),
            instance.map(|(type_id, body)| NodeStatement::Instance {
                name: None,
                type_id,
                body,
            }),
        ))
        .map_with(|node, extra| Spanned {
            node,
            span: extra.span(),
        }),
    );

    statement.define(
        choice((
            proto.map(Statement::Proto),
            extern_proto.map(Statement::ExternProto),
            route.map(Statement::Route),
            node.clone().map(Statement::Node),
        ))
        .map_with(|statement, extra| Spanned {
            node: statement,
            span: extra.span(),
        }),
    );

    (statement.repeated().collect(), value)
}

pub fn parser<'code, I>() -> impl Parser<'code, I, Vec<Spanned<Statement>>, Extra<'code>> + Clone
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    grammar().0
}

pub fn value_parser<'code, I>() -> impl Parser<'code, I, Spanned<RawValue>, Extra<'code>> + Clone
where
    I: ValueInput<'code, Token = Token<'code>, Span = Span>,
{
    grammar().1
}

/// Lexes `source`, failing with rendered diagnostics.
fn tokenize<'code>(source: &'code str, file_name: &str) -> Result<Vec<Spanned<Token<'code>>>> {
    let (tokens, errors) = lexer().parse(source).into_output_errors();
    if !errors.is_empty() {
        return Err(VrmlError::InvalidVrml(render_errors(errors, file_name, source)));
    }
    tokens.ok_or_else(|| VrmlError::InvalidVrml(format!("{file_name}: no tokens")))
}

pub const VRML97_HEADER: &str = "#VRML V2.0";

/// Parses a complete `.wrl` document.
///
/// The `#VRML V2.0` header is mandatory; any syntax error fails the whole
/// document.
pub fn parse_document(source: &str, file_name: &str) -> Result<Vec<Spanned<Statement>>> {
    if !source.starts_with(VRML97_HEADER) {
        return Err(VrmlError::InvalidVrml(format!(
            "{file_name}: missing \"{VRML97_HEADER} utf8\" header"
        )));
    }
    let tokens = tokenize(source, file_name)?;
    let input = tokens.as_slice().map(
        span_at(source.len()),
        |Spanned { node, span }| (node, span),
    );
    let (statements, errors) = parser().parse(input).into_output_errors();
    if !errors.is_empty() {
        return Err(VrmlError::InvalidVrml(render_errors(errors, file_name, source)));
    }
    statements.ok_or_else(|| VrmlError::InvalidVrml(format!("{file_name}: empty parse")))
}

/// Parses one untyped field value, e.g. `[ 1 2 3, 4 5 6 ]`.
pub fn parse_raw_value(source: &str) -> Result<Spanned<RawValue>> {
    let tokens = tokenize(source, "<value>")?;
    let input = tokens.as_slice().map(
        span_at(source.len()),
        |Spanned { node, span }| (node, span),
    );
    let (value, errors) = value_parser().parse(input).into_output_errors();
    if !errors.is_empty() {
        return Err(VrmlError::InvalidVrml(render_errors(errors, "<value>", source)));
    }
    value.ok_or_else(|| VrmlError::InvalidVrml("empty value".to_string()))
}
