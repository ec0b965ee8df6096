use super::{Color, FieldType, FieldValue, Image, Rotation, Vec2f, Vec3f};
use crate::error::{Result, VrmlError};
use crate::parser::{self, ListItem, RawValue, Scalar};

pub fn format_float(value: f32) -> String {
    value.to_string()
}

pub fn format_string(value: &str) -> String {
    let mut quoted = String::with_capacity(value.len() + 2);
    quoted.push('"');
    for character in value.chars() {
        if matches!(character, '"' | '\\') {
            quoted.push('\\');
        }
        quoted.push(character);
    }
    quoted.push('"');
    quoted
}

pub(super) fn parse_value(field_type: FieldType, text: &str) -> Result<FieldValue> {
    let raw = parser::parse_raw_value(text)?;
    decode_value(field_type, &raw.node)
}

/// Types an untyped field value.
///
/// Node-valued types only accept `NULL` and `[]`; node syntax is turned into
/// nodes by the scene builder before it reaches here.
pub fn decode_value(field_type: FieldType, raw: &RawValue) -> Result<FieldValue> {
    if field_type.is_node() {
        return match (field_type, raw) {
            (FieldType::SfNode, RawValue::Null) => Ok(FieldValue::SfNode(None)),
            (FieldType::MfNode, RawValue::List(items)) if items.is_empty() => {
                Ok(FieldValue::MfNode(Vec::new()))
            }
            _ => Err(VrmlError::type_mismatch(field_type, raw.describe())),
        };
    }

    let scalars: Vec<&Scalar> = match raw {
        RawValue::Scalars(scalars) => scalars.iter().collect(),
        RawValue::List(items) if field_type.is_multi() => items
            .iter()
            .map(|item| match item {
                ListItem::Scalar(scalar) => Ok(scalar),
                ListItem::Node(_) => Err(VrmlError::type_mismatch(field_type, "a node")),
            })
            .collect::<Result<_>>()?,
        _ => return Err(VrmlError::type_mismatch(field_type, raw.describe())),
    };

    let mut atoms = Atoms {
        scalars: scalars.into_iter(),
        field_type,
    };
    let value = if field_type.is_multi() {
        decode_multi(field_type, &mut atoms)?
    } else {
        decode_single(field_type, &mut atoms)?
    };
    atoms.finish()?;

    // Brackets are only optional around a single element
    if let RawValue::Scalars(_) = raw {
        if field_type.is_multi() && value.len() != 1 {
            return Err(VrmlError::type_mismatch(field_type, raw.describe()));
        }
    }
    Ok(value)
}

struct Atoms<'a> {
    scalars: std::vec::IntoIter<&'a Scalar>,
    field_type: FieldType,
}

impl<'a> Atoms<'a> {
    fn is_empty(&self) -> bool {
        self.scalars.len() == 0
    }

    fn mismatch(&self, found: impl Into<String>) -> VrmlError {
        VrmlError::type_mismatch(self.field_type, found)
    }

    fn next(&mut self) -> Result<&'a Scalar> {
        let field_type = self.field_type;
        self.scalars
            .next()
            .ok_or_else(|| VrmlError::type_mismatch(field_type, "end of value"))
    }

    fn number(&mut self) -> Result<&'a str> {
        match self.next()? {
            Scalar::Number(number) => Ok(number),
            other => {
                let found = other.describe();
                Err(self.mismatch(found))
            }
        }
    }

    fn float(&mut self) -> Result<f32> {
        let number = self.number()?;
        number
            .parse::<f32>()
            .map_err(|_| VrmlError::type_mismatch(self.field_type, format!("number {number}")))
    }

    fn double(&mut self) -> Result<f64> {
        let number = self.number()?;
        number
            .parse::<f64>()
            .map_err(|_| VrmlError::type_mismatch(self.field_type, format!("number {number}")))
    }

    /// Decimal or `0x` hex; hex values up to `0xFFFFFFFF` wrap into `i32` (SFImage pixels).
    fn integer(&mut self) -> Result<i32> {
        let field_type = self.field_type;
        let number = self.number()?;
        parse_integer(number)
            .ok_or_else(|| VrmlError::type_mismatch(field_type, format!("number {number}")))
    }

    fn boolean(&mut self) -> Result<bool> {
        match self.next()? {
            Scalar::Bool(value) => Ok(*value),
            other => {
                let found = other.describe();
                Err(self.mismatch(found))
            }
        }
    }

    fn string(&mut self) -> Result<String> {
        match self.next()? {
            Scalar::Text(text) => Ok(text.clone()),
            other => {
                let found = other.describe();
                Err(self.mismatch(found))
            }
        }
    }

    fn vec2f(&mut self) -> Result<Vec2f> {
        Ok(Vec2f::new(self.float()?, self.float()?))
    }

    fn vec3f(&mut self) -> Result<Vec3f> {
        Ok(Vec3f::new(self.float()?, self.float()?, self.float()?))
    }

    fn color(&mut self) -> Result<Color> {
        Ok(Color::new(self.float()?, self.float()?, self.float()?))
    }

    fn rotation(&mut self) -> Result<Rotation> {
        Ok(Rotation::new(self.float()?, self.float()?, self.float()?, self.float()?))
    }

    fn image(&mut self) -> Result<Image> {
        let width = self.integer()?;
        let height = self.integer()?;
        let components = self.integer()?;
        let (Ok(width), Ok(height), Ok(components)) =
            (u32::try_from(width), u32::try_from(height), u8::try_from(components))
        else {
            return Err(self.mismatch("negative image dimensions"));
        };
        if components > 4 {
            return Err(self.mismatch(format!("{components}-component image")));
        }
        // One value per pixel must follow, so the reservation is bounded by the input.
        let remaining = self.scalars.len();
        let Some(count) = (width as usize)
            .checked_mul(height as usize)
            .filter(|count| *count <= remaining)
        else {
            return Err(self.mismatch(format!("{width}x{height} image with {remaining} pixel values")));
        };
        let mut pixels = Vec::with_capacity(count * components as usize);
        for _ in 0..count {
            let packed = self.integer()? as u32;
            for byte in (0..components).rev() {
                pixels.push((packed >> (byte as u32 * 8)) as u8);
            }
        }
        Image::new(width, height, components, pixels)
            .ok_or_else(|| self.mismatch("malformed image"))
    }

    fn finish(&self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(self.mismatch("trailing values"))
        }
    }
}

fn parse_integer(number: &str) -> Option<i32> {
    let (negative, digits) = match number.strip_prefix('-') {
        Some(rest) => (true, rest),
        None => (false, number.strip_prefix('+').unwrap_or(number)),
    };
    match digits.strip_prefix("0x").or_else(|| digits.strip_prefix("0X")) {
        Some(hex) => {
            let magnitude = i64::from_str_radix(hex, 16).ok()?;
            let value = if negative { -magnitude } else { magnitude };
            (i32::MIN as i64..=u32::MAX as i64)
                .contains(&value)
                .then_some(value as i32)
        }
        None => number.parse::<i32>().ok(),
    }
}

fn decode_single(field_type: FieldType, atoms: &mut Atoms) -> Result<FieldValue> {
    Ok(match field_type {
        FieldType::SfBool => FieldValue::SfBool(atoms.boolean()?),
        FieldType::SfColor => FieldValue::SfColor(atoms.color()?),
        FieldType::SfFloat => FieldValue::SfFloat(atoms.float()?),
        FieldType::SfImage => FieldValue::SfImage(atoms.image()?),
        FieldType::SfInt32 => FieldValue::SfInt32(atoms.integer()?),
        FieldType::SfRotation => FieldValue::SfRotation(atoms.rotation()?),
        FieldType::SfString => FieldValue::SfString(atoms.string()?),
        FieldType::SfTime => FieldValue::SfTime(atoms.double()?),
        FieldType::SfVec2f => FieldValue::SfVec2f(atoms.vec2f()?),
        FieldType::SfVec3f => FieldValue::SfVec3f(atoms.vec3f()?),
        other => return Err(VrmlError::type_mismatch(other, "a single value")),
    })
}

fn collect<'a, T>(
    atoms: &mut Atoms<'a>,
    mut read: impl FnMut(&mut Atoms<'a>) -> Result<T>,
) -> Result<Vec<T>> {
    let mut values = Vec::new();
    while !atoms.is_empty() {
        values.push(read(atoms)?);
    }
    Ok(values)
}

fn decode_multi(field_type: FieldType, atoms: &mut Atoms) -> Result<FieldValue> {
    Ok(match field_type {
        FieldType::MfBool => FieldValue::MfBool(collect(atoms, Atoms::boolean)?),
        FieldType::MfColor => FieldValue::MfColor(collect(atoms, Atoms::color)?),
        FieldType::MfFloat => FieldValue::MfFloat(collect(atoms, Atoms::float)?),
        FieldType::MfInt32 => FieldValue::MfInt32(collect(atoms, Atoms::integer)?),
        FieldType::MfRotation => FieldValue::MfRotation(collect(atoms, Atoms::rotation)?),
        FieldType::MfString => FieldValue::MfString(collect(atoms, Atoms::string)?),
        FieldType::MfTime => FieldValue::MfTime(collect(atoms, Atoms::double)?),
        FieldType::MfVec2f => FieldValue::MfVec2f(collect(atoms, Atoms::vec2f)?),
        FieldType::MfVec3f => FieldValue::MfVec3f(collect(atoms, Atoms::vec3f)?),
        other => return Err(VrmlError::type_mismatch(other, "a list")),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn round_trip(value: FieldValue) {
        let text = value.to_string();
        let parsed = FieldValue::from_vrml(value.field_type(), &text)
            .unwrap_or_else(|error| panic!("{text}: {error}"));
        assert_eq!(parsed, value, "{text}");
    }

    #[test]
    fn every_value_type_round_trips_through_text() {
        round_trip(FieldValue::SfBool(true));
        round_trip(FieldValue::SfColor(Color::new(0.8, 0.25, 1.0)));
        round_trip(FieldValue::SfFloat(-0.125));
        round_trip(FieldValue::SfFloat(1.0e-7));
        round_trip(FieldValue::SfImage(
            Image::new(2, 1, 2, vec![0xAB, 0x01, 0x00, 0xFF]).unwrap(),
        ));
        round_trip(FieldValue::SfInt32(i32::MIN));
        round_trip(FieldValue::SfNode(None));
        round_trip(FieldValue::SfRotation(Rotation::new(0.0, 0.6, 0.8, 3.14159)));
        round_trip(FieldValue::SfString("a \"quoted\" \\ string".into()));
        round_trip(FieldValue::SfTime(1_234_567.891_011));
        round_trip(FieldValue::SfVec2f(Vec2f::new(0.5, -2.0)));
        round_trip(FieldValue::SfVec3f(Vec3f::new(1.0, 2.5, -3.75)));
        round_trip(FieldValue::MfBool(vec![true, false, true]));
        round_trip(FieldValue::MfColor(vec![Color::WHITE, Color::BLACK]));
        round_trip(FieldValue::MfFloat(vec![0.1, 0.2, 0.3]));
        round_trip(FieldValue::MfInt32(vec![0, -1, 2, -1]));
        round_trip(FieldValue::MfNode(Vec::new()));
        round_trip(FieldValue::MfRotation(vec![Rotation::default()]));
        round_trip(FieldValue::MfString(vec!["one".into(), "".into()]));
        round_trip(FieldValue::MfTime(vec![0.0, 2.5]));
        round_trip(FieldValue::MfVec2f(vec![Vec2f::new(1.0, 0.0)]));
        round_trip(FieldValue::MfVec3f(vec![Vec3f::ZERO, Vec3f::new(1.0, 1.0, 1.0)]));
    }

    #[test]
    fn wrong_literal_kinds_are_type_mismatches() {
        for (field_type, text) in [
            (FieldType::SfFloat, "\"red\""),
            (FieldType::SfInt32, "1.5"),
            (FieldType::SfBool, "1"),
            (FieldType::SfString, "TRUE"),
            (FieldType::SfVec3f, "1 2"),
            (FieldType::SfColor, "1 2 3 4"),
            (FieldType::MfVec2f, "[ 1 2 3 ]"),
            (FieldType::SfNode, "1"),
            (FieldType::SfFloat, "[ 1 ]"),
        ] {
            let error = FieldValue::from_vrml(field_type, text).unwrap_err();
            assert!(
                matches!(error, VrmlError::TypeMismatch { expected, .. } if expected == field_type),
                "{field_type} {text}: {error}"
            );
        }
    }

    #[test]
    fn unbracketed_multi_value_holds_exactly_one_element() {
        assert_eq!(
            FieldValue::from_vrml(FieldType::MfVec3f, "1 2 3").unwrap(),
            FieldValue::MfVec3f(vec![Vec3f::new(1.0, 2.0, 3.0)])
        );
        assert!(FieldValue::from_vrml(FieldType::MfFloat, "1 2").is_err());
    }

    #[test]
    fn integers_accept_hex() {
        assert_eq!(
            FieldValue::from_vrml(FieldType::SfInt32, "0x10").unwrap(),
            FieldValue::SfInt32(16)
        );
        assert_eq!(
            FieldValue::from_vrml(FieldType::SfInt32, "0xFFFFFFFF").unwrap(),
            FieldValue::SfInt32(-1)
        );
        assert!(FieldValue::from_vrml(FieldType::SfInt32, "0x1FFFFFFFF").is_err());
    }

    #[test]
    fn image_dimensions_must_match_the_pixels_given() {
        for text in ["2147483647 2147483647 4", "65536 65536 4 0xFF", "2 2 1 0xFF 0x00", "1 1 5 0"] {
            let error = FieldValue::from_vrml(FieldType::SfImage, text).unwrap_err();
            assert!(
                matches!(error, VrmlError::TypeMismatch { expected: FieldType::SfImage, .. }),
                "{text}: {error}"
            );
        }
        assert_eq!(
            FieldValue::from_vrml(FieldType::SfImage, "0 0 0").unwrap(),
            FieldValue::SfImage(Image::new(0, 0, 0, Vec::new()).unwrap())
        );
    }

    #[test]
    fn float_fields_read_integer_literals() {
        assert_eq!(
            FieldValue::from_vrml(FieldType::SfFloat, "2").unwrap(),
            FieldValue::SfFloat(2.0)
        );
    }
}
