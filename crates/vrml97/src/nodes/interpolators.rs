//! Linear keyframe interpolators driven by `set_fraction`.
//!
//! Fractions below the first key produce the first keyValue, fractions
//! above the last key the last one. An interpolator with no keys or no
//! keyValues stays silent.

use std::rc::Rc;

use log::trace;

use crate::engine::NodeId;
use crate::error::Result;
use crate::field::{Color, FieldType, FieldValue, Rotation, Vec3f};
use crate::node::{BuiltinMetatype, NodeBehavior, NodeInterface, NodeMetatype};
use crate::scene::Scene;

fn interpolator(id: &str, key_value: FieldValue, kind: Interpolator) -> Rc<dyn NodeMetatype> {
    let value_type = kind.value_type();
    BuiltinMetatype::builder(id)
        .event_in("set_fraction", FieldType::SfFloat)
        .exposed_field("key", FieldValue::MfFloat(Vec::new()))
        .exposed_field("keyValue", key_value)
        .event_out("value_changed", value_type)
        .behavior(kind)
        .build()
}

pub(super) fn scalar_interpolator() -> Rc<dyn NodeMetatype> {
    interpolator("ScalarInterpolator", FieldValue::MfFloat(Vec::new()), Interpolator::Scalar)
}

pub(super) fn position_interpolator() -> Rc<dyn NodeMetatype> {
    interpolator("PositionInterpolator", FieldValue::MfVec3f(Vec::new()), Interpolator::Position)
}

pub(super) fn color_interpolator() -> Rc<dyn NodeMetatype> {
    interpolator("ColorInterpolator", FieldValue::MfColor(Vec::new()), Interpolator::Color)
}

pub(super) fn orientation_interpolator() -> Rc<dyn NodeMetatype> {
    interpolator("OrientationInterpolator", FieldValue::MfRotation(Vec::new()), Interpolator::Orientation)
}

/// Where a fraction falls among the keys.
#[derive(Debug, Clone, Copy, PartialEq)]
enum Segment {
    At(usize),
    Between(usize, f32),
}

fn locate(keys: &[f32], fraction: f32) -> Option<Segment> {
    let (first, last) = (keys.first()?, keys.last()?);
    if fraction <= *first {
        return Some(Segment::At(0));
    }
    if fraction >= *last {
        return Some(Segment::At(keys.len() - 1));
    }
    keys.windows(2).enumerate().find_map(|(i, pair)| {
        let (from, to) = (pair[0], pair[1]);
        if !(from <= fraction && fraction <= to) {
            return None;
        }
        let span = to - from;
        Some(if span > 0.0 {
            Segment::Between(i, (fraction - from) / span)
        } else {
            Segment::At(i + 1)
        })
    })
}

/// Interpolate among `values` keyed by `keys`. Missing trailing values
/// repeat the last one.
fn sample<T: Copy>(keys: &[f32], values: &[T], fraction: f32, mix: impl Fn(T, T, f32) -> T) -> Option<T> {
    let last = values.len().checked_sub(1)?;
    let at = |index: usize| values[index.min(last)];
    Some(match locate(keys, fraction)? {
        Segment::At(i) => at(i),
        Segment::Between(i, t) => mix(at(i), at(i + 1), t),
    })
}

/// HSV interpolation with the hue going the short way around.
fn mix_colors(from: Color, to: Color, t: f32) -> Color {
    let [mut h1, s1, v1] = from.to_hsv();
    let [mut h2, s2, v2] = to.to_hsv();
    if (h2 - h1).abs() > 180.0 {
        if h2 > h1 {
            h1 += 360.0;
        } else {
            h2 += 360.0;
        }
    }
    let mut h = h1 + t * (h2 - h1);
    if h >= 360.0 {
        h -= 360.0;
    } else if h < 0.0 {
        h += 360.0;
    }
    Color::from_hsv([h, s1 + t * (s2 - s1), v1 + t * (v2 - v1)])
}

fn lerp(from: f32, to: f32, t: f32) -> f32 {
    from + t * (to - from)
}

#[derive(Debug, Clone, Copy)]
enum Interpolator {
    Scalar,
    Position,
    Color,
    Orientation,
}

impl Interpolator {
    fn value_type(self) -> FieldType {
        match self {
            Self::Scalar => FieldType::SfFloat,
            Self::Position => FieldType::SfVec3f,
            Self::Color => FieldType::SfColor,
            Self::Orientation => FieldType::SfRotation,
        }
    }

    fn evaluate(self, keys: &[f32], key_value: &FieldValue, fraction: f32) -> Option<FieldValue> {
        match (self, key_value) {
            (Self::Scalar, FieldValue::MfFloat(values)) => sample(keys, values, fraction, lerp).map(FieldValue::SfFloat),
            (Self::Position, FieldValue::MfVec3f(values)) => {
                sample(keys, values, fraction, Vec3f::lerp).map(FieldValue::SfVec3f)
            }
            (Self::Color, FieldValue::MfColor(values)) => {
                sample(keys, values, fraction, mix_colors).map(FieldValue::SfColor)
            }
            (Self::Orientation, FieldValue::MfRotation(values)) => {
                sample(keys, values, fraction, Rotation::slerp).map(FieldValue::SfRotation)
            }
            _ => None,
        }
    }
}

impl NodeBehavior for Interpolator {
    fn process_event(
        &self,
        scene: &mut Scene,
        node: NodeId,
        interface: &NodeInterface,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        if interface.id != "set_fraction" {
            return scene.apply_event(node, interface, value, timestamp);
        }
        let fraction = value.as_f32().unwrap_or_default();
        scene.store_value(node, &interface.id, value)?;

        let interpolator = scene.node(node)?;
        let keys = interpolator.get("key").and_then(FieldValue::as_floats).unwrap_or_default();
        let result = interpolator
            .get("keyValue")
            .and_then(|key_value| self.evaluate(keys, key_value, fraction));
        match result {
            Some(result) => scene.emit_event(node, "value_changed", result, timestamp),
            None => {
                trace!("{node} has nothing to interpolate at {fraction}");
                Ok(())
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserConfig;
    use crate::node::MetatypeRegistry;

    fn interpolate(node: &str, fraction: f32) -> Option<FieldValue> {
        let source = format!("#VRML V2.0 utf8\nDEF I {node}");
        let mut scene =
            Scene::load(&source, "test.wrl", MetatypeRegistry::with_builtins(), BrowserConfig::default()).unwrap();
        let id = scene.find_node("I").unwrap();
        let before = scene.pending_events();
        scene.send_event(id, "set_fraction", FieldValue::SfFloat(fraction), 1.0).unwrap();
        (scene.pending_events() > before).then(|| scene.event_value(id, "value_changed").unwrap().clone())
    }

    #[test]
    fn locates_segments() {
        let keys = [0.0, 0.5, 1.0];
        assert_eq!(locate(&keys, -1.0), Some(Segment::At(0)));
        assert_eq!(locate(&keys, 0.25), Some(Segment::Between(0, 0.5)));
        assert_eq!(locate(&keys, 0.75), Some(Segment::Between(1, 0.5)));
        assert_eq!(locate(&keys, 2.0), Some(Segment::At(2)));
        assert_eq!(locate(&[], 0.5), None);
    }

    #[test]
    fn scalar_values_are_piecewise_linear() {
        let node = "ScalarInterpolator { key [ 0 0.5 1 ] keyValue [ 0 10 0 ] }";
        assert_eq!(interpolate(node, 0.25), Some(FieldValue::SfFloat(5.0)));
        assert_eq!(interpolate(node, 0.5), Some(FieldValue::SfFloat(10.0)));
        assert_eq!(interpolate(node, 0.75), Some(FieldValue::SfFloat(5.0)));
    }

    #[test]
    fn fractions_outside_the_keys_clamp() {
        let node = "PositionInterpolator { key [ 0.25 0.75 ] keyValue [ 0 0 0, 6 0 0 ] }";
        assert_eq!(interpolate(node, 0.0), Some(FieldValue::SfVec3f(Vec3f::ZERO)));
        assert_eq!(interpolate(node, 1.0), Some(FieldValue::SfVec3f(Vec3f::new(6.0, 0.0, 0.0))));
        assert_eq!(interpolate(node, 0.5), Some(FieldValue::SfVec3f(Vec3f::new(3.0, 0.0, 0.0))));
    }

    #[test]
    fn empty_interpolators_emit_nothing() {
        assert_eq!(interpolate("ScalarInterpolator { }", 0.5), None);
        assert_eq!(interpolate("ScalarInterpolator { key [ 0 1 ] }", 0.5), None);
    }

    #[test]
    fn colors_take_the_short_way_around_the_hue_circle() {
        // Hues 340 and 20 meet at 0 (red), not at 180 (cyan)
        let from = Color::from_hsv([340.0, 1.0, 1.0]);
        let to = Color::from_hsv([20.0, 1.0, 1.0]);
        let mid = mix_colors(from, to, 0.5);
        let [h, s, v] = mid.to_hsv();
        assert!(h < 1e-3 || h > 359.999, "hue {h}");
        assert!((s - 1.0).abs() < 1e-5 && (v - 1.0).abs() < 1e-5);
    }

    #[test]
    fn color_interpolator_emits_colors() {
        let node = "ColorInterpolator { key [ 0 1 ] keyValue [ 0 0 0, 1 1 1 ] }";
        let Some(FieldValue::SfColor(color)) = interpolate(node, 0.5) else {
            panic!("expected a color");
        };
        assert!((color.r - 0.5).abs() < 1e-5 && (color.g - 0.5).abs() < 1e-5);
    }

    #[test]
    fn orientations_are_slerped() {
        let node = "OrientationInterpolator { key [ 0 1 ] keyValue [ 0 1 0 0, 0 1 0 1.5707964 ] }";
        let Some(FieldValue::SfRotation(rotation)) = interpolate(node, 0.5) else {
            panic!("expected a rotation");
        };
        assert!((rotation.angle() - std::f32::consts::FRAC_PI_4).abs() < 1e-4);
        assert!((rotation.axis().y - 1.0).abs() < 1e-4);
    }
}
