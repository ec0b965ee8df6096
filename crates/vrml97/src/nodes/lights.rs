use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};
use std::rc::Rc;

use crate::engine::NodeId;
use crate::error::Result;
use crate::field::{Color, FieldValue, Vec3f};
use crate::node::{BuiltinMetatype, NodeBehavior, NodeMetatype, Renderable};
use crate::scene::Scene;
use crate::viewer::{RenderingContext, SpotLightProperties, Viewer};

pub(super) fn directional_light() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("DirectionalLight")
        .exposed_field("ambientIntensity", FieldValue::SfFloat(0.0))
        .exposed_field("color", FieldValue::SfColor(Color::WHITE))
        .exposed_field("direction", FieldValue::SfVec3f(Vec3f::new(0.0, 0.0, -1.0)))
        .exposed_field("intensity", FieldValue::SfFloat(1.0))
        .exposed_field("on", FieldValue::SfBool(true))
        .behavior(Light::Directional)
        .build()
}

pub(super) fn point_light() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("PointLight")
        .exposed_field("ambientIntensity", FieldValue::SfFloat(0.0))
        .exposed_field("attenuation", FieldValue::SfVec3f(Vec3f::new(1.0, 0.0, 0.0)))
        .exposed_field("color", FieldValue::SfColor(Color::WHITE))
        .exposed_field("intensity", FieldValue::SfFloat(1.0))
        .exposed_field("location", FieldValue::SfVec3f(Vec3f::ZERO))
        .exposed_field("on", FieldValue::SfBool(true))
        .exposed_field("radius", FieldValue::SfFloat(100.0))
        .behavior(Light::Point)
        .build()
}

pub(super) fn spot_light() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("SpotLight")
        .exposed_field("ambientIntensity", FieldValue::SfFloat(0.0))
        .exposed_field("attenuation", FieldValue::SfVec3f(Vec3f::new(1.0, 0.0, 0.0)))
        .exposed_field("beamWidth", FieldValue::SfFloat(FRAC_PI_2))
        .exposed_field("color", FieldValue::SfColor(Color::WHITE))
        .exposed_field("cutOffAngle", FieldValue::SfFloat(FRAC_PI_4))
        .exposed_field("direction", FieldValue::SfVec3f(Vec3f::new(0.0, 0.0, -1.0)))
        .exposed_field("intensity", FieldValue::SfFloat(1.0))
        .exposed_field("location", FieldValue::SfVec3f(Vec3f::ZERO))
        .exposed_field("on", FieldValue::SfBool(true))
        .exposed_field("radius", FieldValue::SfFloat(100.0))
        .behavior(Light::Spot)
        .build()
}

enum Light {
    Directional,
    Point,
    Spot,
}

impl NodeBehavior for Light {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }
}

impl Renderable for Light {
    fn render(
        &self,
        scene: &mut Scene,
        node: NodeId,
        viewer: &mut dyn Viewer,
        _context: &RenderingContext,
    ) -> Result<()> {
        let light = scene.node(node)?;
        if !light.bool_or("on", true) {
            return Ok(());
        }
        let ambient_intensity = light.f32_or("ambientIntensity", 0.0);
        let color = light.color_or("color", Color::WHITE);
        let intensity = light.f32_or("intensity", 1.0);
        match self {
            Self::Directional => {
                let direction = light.vec3f_or("direction", Vec3f::new(0.0, 0.0, -1.0));
                viewer.insert_dir_light(ambient_intensity, intensity, color, direction);
            }
            Self::Point => {
                viewer.insert_point_light(
                    ambient_intensity,
                    light.vec3f_or("attenuation", Vec3f::new(1.0, 0.0, 0.0)),
                    color,
                    intensity,
                    light.vec3f_or("location", Vec3f::ZERO),
                    light.f32_or("radius", 100.0),
                );
            }
            Self::Spot => {
                viewer.insert_spot_light(&SpotLightProperties {
                    ambient_intensity,
                    attenuation: light.vec3f_or("attenuation", Vec3f::new(1.0, 0.0, 0.0)),
                    beam_width: light.f32_or("beamWidth", FRAC_PI_2),
                    color,
                    cut_off_angle: light.f32_or("cutOffAngle", FRAC_PI_4),
                    direction: light.vec3f_or("direction", Vec3f::new(0.0, 0.0, -1.0)),
                    intensity,
                    location: light.vec3f_or("location", Vec3f::ZERO),
                    radius: light.f32_or("radius", 100.0),
                });
            }
        }
        Ok(())
    }
}
