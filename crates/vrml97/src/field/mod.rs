//! Typed field values.
//!
//! A [`FieldValue`] is a tagged union over every VRML97 field type. The tag is
//! fixed at construction; [`FieldValue::assign`] refuses values of another type
//! and nothing converts between types implicitly.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::engine::arena::NodeId;
use crate::error::{Result, VrmlError};

mod basetypes;
mod text;

pub use basetypes::{Color, Image, Rotation, Vec2f, Vec3f};
pub use text::{decode_value, format_float, format_string};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    SfBool,
    SfColor,
    SfFloat,
    SfImage,
    SfInt32,
    SfNode,
    SfRotation,
    SfString,
    SfTime,
    SfVec2f,
    SfVec3f,
    MfBool,
    MfColor,
    MfFloat,
    MfInt32,
    MfNode,
    MfRotation,
    MfString,
    MfTime,
    MfVec2f,
    MfVec3f,
}

impl FieldType {
    pub const ALL: [FieldType; 21] = [
        Self::SfBool,
        Self::SfColor,
        Self::SfFloat,
        Self::SfImage,
        Self::SfInt32,
        Self::SfNode,
        Self::SfRotation,
        Self::SfString,
        Self::SfTime,
        Self::SfVec2f,
        Self::SfVec3f,
        Self::MfBool,
        Self::MfColor,
        Self::MfFloat,
        Self::MfInt32,
        Self::MfNode,
        Self::MfRotation,
        Self::MfString,
        Self::MfTime,
        Self::MfVec2f,
        Self::MfVec3f,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Self::SfBool => "SFBool",
            Self::SfColor => "SFColor",
            Self::SfFloat => "SFFloat",
            Self::SfImage => "SFImage",
            Self::SfInt32 => "SFInt32",
            Self::SfNode => "SFNode",
            Self::SfRotation => "SFRotation",
            Self::SfString => "SFString",
            Self::SfTime => "SFTime",
            Self::SfVec2f => "SFVec2f",
            Self::SfVec3f => "SFVec3f",
            Self::MfBool => "MFBool",
            Self::MfColor => "MFColor",
            Self::MfFloat => "MFFloat",
            Self::MfInt32 => "MFInt32",
            Self::MfNode => "MFNode",
            Self::MfRotation => "MFRotation",
            Self::MfString => "MFString",
            Self::MfTime => "MFTime",
            Self::MfVec2f => "MFVec2f",
            Self::MfVec3f => "MFVec3f",
        }
    }

    pub fn is_multi(self) -> bool {
        matches!(
            self,
            Self::MfBool
                | Self::MfColor
                | Self::MfFloat
                | Self::MfInt32
                | Self::MfNode
                | Self::MfRotation
                | Self::MfString
                | Self::MfTime
                | Self::MfVec2f
                | Self::MfVec3f
        )
    }

    pub fn is_node(self) -> bool {
        matches!(self, Self::SfNode | Self::MfNode)
    }

    /// The single-valued counterpart of a multi-valued type.
    pub fn element(self) -> FieldType {
        match self {
            Self::MfBool => Self::SfBool,
            Self::MfColor => Self::SfColor,
            Self::MfFloat => Self::SfFloat,
            Self::MfInt32 => Self::SfInt32,
            Self::MfNode => Self::SfNode,
            Self::MfRotation => Self::SfRotation,
            Self::MfString => Self::SfString,
            Self::MfTime => Self::SfTime,
            Self::MfVec2f => Self::SfVec2f,
            Self::MfVec3f => Self::SfVec3f,
            single => single,
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for FieldType {
    type Err = VrmlError;

    fn from_str(name: &str) -> Result<Self> {
        Self::ALL
            .into_iter()
            .find(|field_type| field_type.name() == name)
            .ok_or_else(|| VrmlError::InvalidVrml(format!("unknown field type {name}")))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    SfBool(bool),
    SfColor(Color),
    SfFloat(f32),
    SfImage(Image),
    SfInt32(i32),
    SfNode(Option<NodeId>),
    SfRotation(Rotation),
    SfString(String),
    SfTime(f64),
    SfVec2f(Vec2f),
    SfVec3f(Vec3f),
    MfBool(Vec<bool>),
    MfColor(Vec<Color>),
    MfFloat(Vec<f32>),
    MfInt32(Vec<i32>),
    MfNode(Vec<NodeId>),
    MfRotation(Vec<Rotation>),
    MfString(Vec<String>),
    MfTime(Vec<f64>),
    MfVec2f(Vec<Vec2f>),
    MfVec3f(Vec<Vec3f>),
}

impl FieldValue {
    /// The VRML97 initial value for a field of `field_type`.
    pub fn default_for(field_type: FieldType) -> Self {
        match field_type {
            FieldType::SfBool => Self::SfBool(false),
            FieldType::SfColor => Self::SfColor(Color::BLACK),
            FieldType::SfFloat => Self::SfFloat(0.0),
            FieldType::SfImage => Self::SfImage(Image::default()),
            FieldType::SfInt32 => Self::SfInt32(0),
            FieldType::SfNode => Self::SfNode(None),
            FieldType::SfRotation => Self::SfRotation(Rotation::default()),
            FieldType::SfString => Self::SfString(String::new()),
            FieldType::SfTime => Self::SfTime(0.0),
            FieldType::SfVec2f => Self::SfVec2f(Vec2f::default()),
            FieldType::SfVec3f => Self::SfVec3f(Vec3f::ZERO),
            FieldType::MfBool => Self::MfBool(Vec::new()),
            FieldType::MfColor => Self::MfColor(Vec::new()),
            FieldType::MfFloat => Self::MfFloat(Vec::new()),
            FieldType::MfInt32 => Self::MfInt32(Vec::new()),
            FieldType::MfNode => Self::MfNode(Vec::new()),
            FieldType::MfRotation => Self::MfRotation(Vec::new()),
            FieldType::MfString => Self::MfString(Vec::new()),
            FieldType::MfTime => Self::MfTime(Vec::new()),
            FieldType::MfVec2f => Self::MfVec2f(Vec::new()),
            FieldType::MfVec3f => Self::MfVec3f(Vec::new()),
        }
    }

    pub fn field_type(&self) -> FieldType {
        match self {
            Self::SfBool(_) => FieldType::SfBool,
            Self::SfColor(_) => FieldType::SfColor,
            Self::SfFloat(_) => FieldType::SfFloat,
            Self::SfImage(_) => FieldType::SfImage,
            Self::SfInt32(_) => FieldType::SfInt32,
            Self::SfNode(_) => FieldType::SfNode,
            Self::SfRotation(_) => FieldType::SfRotation,
            Self::SfString(_) => FieldType::SfString,
            Self::SfTime(_) => FieldType::SfTime,
            Self::SfVec2f(_) => FieldType::SfVec2f,
            Self::SfVec3f(_) => FieldType::SfVec3f,
            Self::MfBool(_) => FieldType::MfBool,
            Self::MfColor(_) => FieldType::MfColor,
            Self::MfFloat(_) => FieldType::MfFloat,
            Self::MfInt32(_) => FieldType::MfInt32,
            Self::MfNode(_) => FieldType::MfNode,
            Self::MfRotation(_) => FieldType::MfRotation,
            Self::MfString(_) => FieldType::MfString,
            Self::MfTime(_) => FieldType::MfTime,
            Self::MfVec2f(_) => FieldType::MfVec2f,
            Self::MfVec3f(_) => FieldType::MfVec3f,
        }
    }

    /// Fails with a type mismatch unless `self` has type `expected`.
    pub fn expect_type(&self, expected: FieldType) -> Result<()> {
        let found = self.field_type();
        if found == expected {
            Ok(())
        } else {
            Err(VrmlError::type_mismatch(expected, found.name()))
        }
    }

    /// Replaces the value in place. The tag never changes.
    pub fn assign(&mut self, value: FieldValue) -> Result<()> {
        value.expect_type(self.field_type())?;
        *self = value;
        Ok(())
    }

    /// Parses the VRML text encoding of a single value of `field_type`.
    ///
    /// Node-valued types only accept `NULL` and `[]` here; nodes are built by
    /// the scene builder.
    pub fn from_vrml(field_type: FieldType, text: &str) -> Result<Self> {
        text::parse_value(field_type, text)
    }

    /// Number of elements of a multi-valued field, 1 for single values.
    pub fn len(&self) -> usize {
        match self {
            Self::MfBool(values) => values.len(),
            Self::MfColor(values) => values.len(),
            Self::MfFloat(values) => values.len(),
            Self::MfInt32(values) => values.len(),
            Self::MfNode(values) => values.len(),
            Self::MfRotation(values) => values.len(),
            Self::MfString(values) => values.len(),
            Self::MfTime(values) => values.len(),
            Self::MfVec2f(values) => values.len(),
            Self::MfVec3f(values) => values.len(),
            _ => 1,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Node ids referenced by an SFNode or MFNode value.
    pub fn node_refs(&self) -> Vec<NodeId> {
        match self {
            Self::SfNode(node) => node.iter().copied().collect(),
            Self::MfNode(nodes) => nodes.clone(),
            _ => Vec::new(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Self::SfBool(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_f32(&self) -> Option<f32> {
        match self {
            Self::SfFloat(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_i32(&self) -> Option<i32> {
        match self {
            Self::SfInt32(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_time(&self) -> Option<f64> {
        match self {
            Self::SfTime(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_color(&self) -> Option<Color> {
        match self {
            Self::SfColor(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_vec3f(&self) -> Option<Vec3f> {
        match self {
            Self::SfVec3f(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_rotation(&self) -> Option<Rotation> {
        match self {
            Self::SfRotation(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_node(&self) -> Option<NodeId> {
        match self {
            Self::SfNode(value) => *value,
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::SfString(value) => Some(value),
            _ => None,
        }
    }

    pub fn as_strings(&self) -> Option<&[String]> {
        match self {
            Self::MfString(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_floats(&self) -> Option<&[f32]> {
        match self {
            Self::MfFloat(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_int32s(&self) -> Option<&[i32]> {
        match self {
            Self::MfInt32(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_vec3fs(&self) -> Option<&[Vec3f]> {
        match self {
            Self::MfVec3f(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_colors(&self) -> Option<&[Color]> {
        match self {
            Self::MfColor(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_rotations(&self) -> Option<&[Rotation]> {
        match self {
            Self::MfRotation(values) => Some(values),
            _ => None,
        }
    }

    pub fn as_nodes(&self) -> Option<&[NodeId]> {
        match self {
            Self::MfNode(values) => Some(values),
            _ => None,
        }
    }
}

fn write_list<T>(
    f: &mut fmt::Formatter,
    values: &[T],
    mut write_one: impl FnMut(&mut fmt::Formatter, &T) -> fmt::Result,
) -> fmt::Result {
    if values.len() == 1 {
        return write_one(f, &values[0]);
    }
    f.write_str("[")?;
    for (index, value) in values.iter().enumerate() {
        f.write_str(if index == 0 { " " } else { ", " })?;
        write_one(f, value)?;
    }
    f.write_str(if values.is_empty() { "]" } else { " ]" })
}

/// VRML text encoding. Node references print as `NULL` or arena ids; use
/// [`crate::Scene::write_vrml`] to print node graphs.
impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Self::SfBool(value) => f.write_str(if *value { "TRUE" } else { "FALSE" }),
            Self::SfColor(value) => write!(f, "{value}"),
            Self::SfFloat(value) => f.write_str(&format_float(*value)),
            Self::SfImage(value) => write!(f, "{value}"),
            Self::SfInt32(value) => write!(f, "{value}"),
            Self::SfNode(None) => f.write_str("NULL"),
            Self::SfNode(Some(node)) => write!(f, "{node}"),
            Self::SfRotation(value) => write!(f, "{value}"),
            Self::SfString(value) => f.write_str(&format_string(value)),
            Self::SfTime(value) => write!(f, "{value}"),
            Self::SfVec2f(value) => write!(f, "{value}"),
            Self::SfVec3f(value) => write!(f, "{value}"),
            Self::MfBool(values) => write_list(f, values, |f, v| {
                f.write_str(if *v { "TRUE" } else { "FALSE" })
            }),
            Self::MfColor(values) => write_list(f, values, |f, v| write!(f, "{v}")),
            Self::MfFloat(values) => write_list(f, values, |f, v| f.write_str(&format_float(*v))),
            Self::MfInt32(values) => write_list(f, values, |f, v| write!(f, "{v}")),
            Self::MfNode(values) => write_list(f, values, |f, v| write!(f, "{v}")),
            Self::MfRotation(values) => write_list(f, values, |f, v| write!(f, "{v}")),
            Self::MfString(values) => write_list(f, values, |f, v| f.write_str(&format_string(v))),
            Self::MfTime(values) => write_list(f, values, |f, v| write!(f, "{v}")),
            Self::MfVec2f(values) => write_list(f, values, |f, v| write!(f, "{v}")),
            Self::MfVec3f(values) => write_list(f, values, |f, v| write!(f, "{v}")),
        }
    }
}
