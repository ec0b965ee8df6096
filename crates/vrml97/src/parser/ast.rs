use std::fmt;

use super::Spanned;
use crate::field::format_string;
use crate::node::InterfaceKind;

#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Node(Spanned<NodeStatement>),
    Proto(ProtoDeclaration),
    ExternProto(ExternProtoDeclaration),
    Route(RouteStatement),
}

#[derive(Debug, Clone, PartialEq)]
pub enum NodeStatement {
    Instance {
        name: Option<Spanned<String>>,
        type_id: Spanned<String>,
        body: Vec<Spanned<BodyElement>>,
    },
    Use(Spanned<String>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum BodyElement {
    Field {
        id: Spanned<String>,
        value: Spanned<RawValue>,
    },
    Is {
        id: Spanned<String>,
        proto_id: Spanned<String>,
    },
    Route(RouteStatement),
    Proto(ProtoDeclaration),
    ExternProto(ExternProtoDeclaration),
}

/// A field value before it is typed by the interface it is assigned to.
#[derive(Debug, Clone, PartialEq)]
pub enum RawValue {
    Null,
    Scalars(Vec<Scalar>),
    Node(Box<Spanned<NodeStatement>>),
    List(Vec<ListItem>),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Scalar {
    Number(String),
    Text(String),
    Bool(bool),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListItem {
    Scalar(Scalar),
    Node(Spanned<NodeStatement>),
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceDeclaration {
    pub kind: InterfaceKind,
    pub field_type: Spanned<String>,
    pub id: Spanned<String>,
    pub value: Option<Spanned<RawValue>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ProtoDeclaration {
    pub id: Spanned<String>,
    pub interfaces: Vec<Spanned<InterfaceDeclaration>>,
    pub body: Vec<Spanned<Statement>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ExternProtoDeclaration {
    pub id: Spanned<String>,
    pub interfaces: Vec<Spanned<InterfaceDeclaration>>,
    pub urls: Spanned<RawValue>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RouteStatement {
    pub from_node: Spanned<String>,
    pub from_event: Spanned<String>,
    pub to_node: Spanned<String>,
    pub to_event: Spanned<String>,
}

impl Scalar {
    pub fn describe(&self) -> String {
        match self {
            Self::Number(number) => format!("number {number}"),
            Self::Text(text) => format!("string {}", format_string(text)),
            Self::Bool(value) => format!("boolean {}", if *value { "TRUE" } else { "FALSE" }),
        }
    }
}

impl RawValue {
    pub fn describe(&self) -> String {
        match self {
            Self::Null => "NULL".to_string(),
            Self::Scalars(scalars) => match scalars.first() {
                Some(first) if scalars.len() == 1 => first.describe(),
                _ => format!("{} values", scalars.len()),
            },
            Self::Node(_) => "a node".to_string(),
            Self::List(items) => format!("a list of {} items", items.len()),
        }
    }

    /// String values of an MFString-shaped value, used for url lists.
    pub fn strings(&self) -> Option<Vec<String>> {
        let scalars: Vec<&Scalar> = match self {
            Self::Scalars(scalars) => scalars.iter().collect(),
            Self::List(items) => items
                .iter()
                .map(|item| match item {
                    ListItem::Scalar(scalar) => Some(scalar),
                    ListItem::Node(_) => None,
                })
                .collect::<Option<_>>()?,
            _ => return None,
        };
        scalars
            .into_iter()
            .map(|scalar| match scalar {
                Scalar::Text(text) => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

// Printing syntax back as VRML is used for PROTO declarations, whose bodies
// stay in syntax form until instantiated.

struct Indent(usize);

impl fmt::Display for Indent {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{:width$}", "", width = self.0 * 2)
    }
}

impl fmt::Display for Scalar {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::Number(number) => f.write_str(number),
            Self::Text(text) => f.write_str(&format_string(text)),
            Self::Bool(value) => f.write_str(if *value { "TRUE" } else { "FALSE" }),
        }
    }
}

pub(crate) fn write_value(f: &mut impl fmt::Write, value: &RawValue, depth: usize) -> fmt::Result {
    match value {
        RawValue::Null => f.write_str("NULL"),
        RawValue::Scalars(scalars) => {
            for (index, scalar) in scalars.iter().enumerate() {
                if index > 0 {
                    f.write_str(" ")?;
                }
                write!(f, "{scalar}")?;
            }
            Ok(())
        }
        RawValue::Node(node) => write_node(f, &node.node, depth),
        RawValue::List(items) => {
            f.write_str("[")?;
            for item in items {
                match item {
                    ListItem::Scalar(scalar) => write!(f, " {scalar}")?,
                    ListItem::Node(node) => {
                        write!(f, "\n{}", Indent(depth + 1))?;
                        write_node(f, &node.node, depth + 1)?;
                    }
                }
            }
            f.write_str(" ]")
        }
    }
}

pub(crate) fn write_node(f: &mut impl fmt::Write, node: &NodeStatement, depth: usize) -> fmt::Result {
    match node {
        NodeStatement::Use(name) => write!(f, "USE {}", name.node),
        NodeStatement::Instance {
            name,
            type_id,
            body,
        } => {
            if let Some(name) = name {
                write!(f, "DEF {} ", name.node)?;
            }
            write!(f, "{} {{", type_id.node)?;
            for element in body {
                write!(f, "\n{}", Indent(depth + 1))?;
                match &element.node {
                    BodyElement::Field { id, value } => {
                        write!(f, "{} ", id.node)?;
                        write_value(f, &value.node, depth + 1)?;
                    }
                    BodyElement::Is { id, proto_id } => write!(f, "{} IS {}", id.node, proto_id.node)?,
                    BodyElement::Route(route) => write!(f, "{route}")?,
                    BodyElement::Proto(proto) => write_proto(f, proto, depth + 1)?,
                    BodyElement::ExternProto(proto) => write_extern_proto(f, proto, depth + 1)?,
                }
            }
            write!(f, "\n{}}}", Indent(depth))
        }
    }
}

fn write_interfaces(
    f: &mut impl fmt::Write,
    interfaces: &[Spanned<InterfaceDeclaration>],
    depth: usize,
) -> fmt::Result {
    f.write_str(" [")?;
    for interface in interfaces {
        let InterfaceDeclaration {
            kind,
            field_type,
            id,
            value,
        } = &interface.node;
        write!(f, "\n{}{kind} {} {}", Indent(depth + 1), field_type.node, id.node)?;
        if let Some(value) = value {
            f.write_str(" ")?;
            write_value(f, &value.node, depth + 1)?;
        }
    }
    write!(f, "\n{}]", Indent(depth))
}

pub(crate) fn write_proto(f: &mut impl fmt::Write, proto: &ProtoDeclaration, depth: usize) -> fmt::Result {
    write!(f, "PROTO {}", proto.id.node)?;
    write_interfaces(f, &proto.interfaces, depth)?;
    f.write_str(" {")?;
    for statement in &proto.body {
        write!(f, "\n{}", Indent(depth + 1))?;
        write_statement(f, &statement.node, depth + 1)?;
    }
    write!(f, "\n{}}}", Indent(depth))
}

fn write_extern_proto(
    f: &mut impl fmt::Write,
    proto: &ExternProtoDeclaration,
    depth: usize,
) -> fmt::Result {
    write!(f, "EXTERNPROTO {}", proto.id.node)?;
    write_interfaces(f, &proto.interfaces, depth)?;
    f.write_str(" ")?;
    write_value(f, &proto.urls.node, depth)
}

pub(crate) fn write_statement(f: &mut impl fmt::Write, statement: &Statement, depth: usize) -> fmt::Result {
    match statement {
        Statement::Node(node) => write_node(f, &node.node, depth),
        Statement::Proto(proto) => write_proto(f, proto, depth),
        Statement::ExternProto(proto) => write_extern_proto(f, proto, depth),
        Statement::Route(route) => write!(f, "{route}"),
    }
}

impl fmt::Display for RouteStatement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(
            f,
            "ROUTE {}.{} TO {}.{}",
            self.from_node.node, self.from_event.node, self.to_node.node, self.to_event.node
        )
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write_statement(f, self, 0)
    }
}
