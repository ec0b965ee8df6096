use std::rc::Rc;

use crate::bounding_volume::BoundingSphere;
use crate::engine::NodeId;
use crate::error::Result;
use crate::field::{Color, FieldValue};
use crate::node::{BoundedVolume, BuiltinMetatype, Node, NodeBehavior, NodeMetatype, Renderable};
use crate::scene::Scene;
use crate::viewer::{MaterialProperties, RenderingContext, Viewer};

pub(super) fn shape() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("Shape")
        .exposed_field("appearance", FieldValue::SfNode(None))
        .exposed_field("geometry", FieldValue::SfNode(None))
        .behavior(Shape)
        .build()
}

pub(super) fn appearance() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("Appearance")
        .exposed_field("material", FieldValue::SfNode(None))
        .exposed_field("texture", FieldValue::SfNode(None))
        .exposed_field("textureTransform", FieldValue::SfNode(None))
        .build()
}

pub(super) fn material() -> Rc<dyn NodeMetatype> {
    let defaults = MaterialProperties::default();
    BuiltinMetatype::builder("Material")
        .exposed_field("ambientIntensity", FieldValue::SfFloat(defaults.ambient_intensity))
        .exposed_field("diffuseColor", FieldValue::SfColor(defaults.diffuse_color))
        .exposed_field("emissiveColor", FieldValue::SfColor(defaults.emissive_color))
        .exposed_field("shininess", FieldValue::SfFloat(defaults.shininess))
        .exposed_field("specularColor", FieldValue::SfColor(defaults.specular_color))
        .exposed_field("transparency", FieldValue::SfFloat(defaults.transparency))
        .build()
}

/// Viewer material of a Material node.
pub fn material_properties(node: &Node) -> MaterialProperties {
    let defaults = MaterialProperties::default();
    MaterialProperties {
        ambient_intensity: node.f32_or("ambientIntensity", defaults.ambient_intensity),
        diffuse_color: node.color_or("diffuseColor", defaults.diffuse_color),
        emissive_color: node.color_or("emissiveColor", Color::BLACK),
        shininess: node.f32_or("shininess", defaults.shininess),
        specular_color: node.color_or("specularColor", Color::BLACK),
        transparency: node.f32_or("transparency", defaults.transparency),
    }
}

struct Shape;

impl NodeBehavior for Shape {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }

    fn as_bounded_volume(&self) -> Option<&dyn BoundedVolume> {
        Some(self)
    }
}

impl Renderable for Shape {
    fn render(
        &self,
        scene: &mut Scene,
        node: NodeId,
        viewer: &mut dyn Viewer,
        _context: &RenderingContext,
    ) -> Result<()> {
        let shape = scene.node(node)?;
        let geometry = shape.node_ref("geometry");
        let material = shape
            .node_ref("appearance")
            .map(|appearance| scene.implementation(appearance))
            .and_then(|appearance| scene.node(appearance).ok()?.node_ref("material"))
            .map(|material| scene.implementation(material))
            .and_then(|material| scene.node(material).ok())
            .map(material_properties);

        // No material means unlit, drawn in the emissive white of VRML97
        match material {
            Some(material) => {
                viewer.enable_lighting(true);
                viewer.set_material(&material);
            }
            None => viewer.enable_lighting(false),
        }
        if let Some(geometry) = geometry {
            scene.render_geometry(geometry, viewer);
        }
        Ok(())
    }
}

impl BoundedVolume for Shape {
    fn bounding_sphere(&self, scene: &mut Scene, node: NodeId) -> BoundingSphere {
        match scene.node(node).ok().and_then(|shape| shape.node_ref("geometry")) {
            Some(geometry) => scene.bounding_sphere(geometry),
            None => BoundingSphere::EMPTY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserConfig;
    use crate::node::MetatypeRegistry;
    use crate::viewer::{RecordingViewer, ViewerCall};

    fn render(source: &str) -> Vec<ViewerCall> {
        let mut scene =
            Scene::load(source, "test.wrl", MetatypeRegistry::with_builtins(), BrowserConfig::default()).unwrap();
        let mut viewer = RecordingViewer::new();
        scene.render(&mut viewer);
        viewer.take_calls()
    }

    #[test]
    fn material_is_set_before_geometry() {
        let calls = render(
            "#VRML V2.0 utf8\n\
             Shape {\n\
               appearance Appearance { material Material { diffuseColor 1 0 0 shininess 0.5 } }\n\
               geometry Cone { }\n\
             }",
        );
        let ViewerCall::SetMaterial { material } = &calls[1] else {
            panic!("expected a material, got {:?}", calls[1]);
        };
        assert_eq!(calls[0], ViewerCall::EnableLighting { enabled: true });
        assert_eq!(material.diffuse_color, Color::new(1.0, 0.0, 0.0));
        assert_eq!(material.shininess, 0.5);
        assert_eq!(material.ambient_intensity, 0.2);
        assert!(matches!(
            calls[2],
            ViewerCall::InsertCone { height, radius, bottom: true, side: true, .. } if height == 2.0 && radius == 1.0
        ));
    }

    #[test]
    fn shape_without_appearance_is_unlit() {
        let calls = render("#VRML V2.0 utf8\nShape { geometry Box { size 1 2 3 } }");
        assert_eq!(calls[0], ViewerCall::EnableLighting { enabled: false });
        assert!(matches!(calls[1], ViewerCall::InsertBox { .. }));
    }

    #[test]
    fn empty_shape_draws_nothing() {
        let calls = render("#VRML V2.0 utf8\nShape { appearance Appearance { } }");
        assert_eq!(calls, vec![ViewerCall::EnableLighting { enabled: false }]);
    }
}
