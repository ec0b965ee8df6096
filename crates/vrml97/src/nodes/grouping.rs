use std::rc::Rc;

use glam::Mat4;

use crate::bounding_volume::BoundingSphere;
use crate::engine::NodeId;
use crate::error::Result;
use crate::field::{FieldType, FieldValue, Rotation, Vec3f};
use crate::node::{
    BoundedVolume, BuiltinMetatype, BuiltinMetatypeBuilder, Capability, Node, NodeBehavior, NodeInterface,
    NodeMetatype, Renderable,
};
use crate::scene::Scene;
use crate::viewer::{RenderingContext, Viewer};

const NO_BBOX: Vec3f = Vec3f::new(-1.0, -1.0, -1.0);

fn with_children(builder: BuiltinMetatypeBuilder) -> BuiltinMetatypeBuilder {
    builder
        .event_in("addChildren", FieldType::MfNode)
        .event_in("removeChildren", FieldType::MfNode)
}

fn with_bbox(builder: BuiltinMetatypeBuilder) -> BuiltinMetatypeBuilder {
    builder
        .field("bboxCenter", FieldValue::SfVec3f(Vec3f::ZERO))
        .field("bboxSize", FieldValue::SfVec3f(NO_BBOX))
}

pub(super) fn group() -> Rc<dyn NodeMetatype> {
    let builder = with_children(BuiltinMetatype::builder("Group"))
        .exposed_field("children", FieldValue::MfNode(Vec::new()));
    with_bbox(builder).behavior(Grouping { transform: false }).build()
}

pub(super) fn transform() -> Rc<dyn NodeMetatype> {
    let builder = with_children(BuiltinMetatype::builder("Transform"))
        .exposed_field("center", FieldValue::SfVec3f(Vec3f::ZERO))
        .exposed_field("children", FieldValue::MfNode(Vec::new()))
        .exposed_field("rotation", FieldValue::SfRotation(Rotation::default()))
        .exposed_field("scale", FieldValue::SfVec3f(Vec3f::new(1.0, 1.0, 1.0)))
        .exposed_field("scaleOrientation", FieldValue::SfRotation(Rotation::default()))
        .exposed_field("translation", FieldValue::SfVec3f(Vec3f::ZERO));
    with_bbox(builder).behavior(Grouping { transform: true }).build()
}

/// Local matrix of a Transform: `T * C * R * SR * S * -SR * -C`.
pub fn transform_matrix(node: &Node) -> Mat4 {
    let center = node.vec3f_or("center", Vec3f::ZERO).to_glam();
    let rotation = node.rotation_or("rotation", Rotation::default()).to_quat();
    let scale = node.vec3f_or("scale", Vec3f::new(1.0, 1.0, 1.0)).to_glam();
    let scale_orientation = node.rotation_or("scaleOrientation", Rotation::default()).to_quat();
    let translation = node.vec3f_or("translation", Vec3f::ZERO).to_glam();

    Mat4::from_translation(translation + center)
        * Mat4::from_quat(rotation)
        * Mat4::from_quat(scale_orientation)
        * Mat4::from_scale(scale)
        * Mat4::from_quat(scale_orientation.inverse())
        * Mat4::from_translation(-center)
}

fn is_identity(matrix: &Mat4) -> bool {
    matrix.abs_diff_eq(Mat4::IDENTITY, f32::EPSILON)
}

struct Grouping {
    transform: bool,
}

impl Grouping {
    fn local_matrix(&self, node: &Node) -> Option<Mat4> {
        self.transform
            .then(|| transform_matrix(node))
            .filter(|matrix| !is_identity(matrix))
    }
}

impl NodeBehavior for Grouping {
    fn process_event(
        &self,
        scene: &mut Scene,
        node: NodeId,
        interface: &NodeInterface,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        let adding = match interface.id.as_str() {
            "addChildren" => true,
            "removeChildren" => false,
            _ => return scene.apply_event(node, interface, value, timestamp),
        };
        let nodes = value.node_refs();
        let mut children = scene.node(node)?.node_refs("children");
        if adding {
            for child in nodes {
                if !children.contains(&child) {
                    children.push(child);
                }
            }
        } else {
            children.retain(|child| !nodes.contains(child));
        }
        scene.store_value(node, &interface.id, value)?;
        scene.store_value(node, "children", FieldValue::MfNode(children.clone()))?;
        scene.emit_event(node, "children", FieldValue::MfNode(children), timestamp)
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }

    fn as_bounded_volume(&self) -> Option<&dyn BoundedVolume> {
        Some(self)
    }
}

impl Renderable for Grouping {
    fn render(
        &self,
        scene: &mut Scene,
        node: NodeId,
        viewer: &mut dyn Viewer,
        context: &RenderingContext,
    ) -> Result<()> {
        let group = scene.node(node)?;
        let children = group.node_refs("children");
        let name = group.name().map(str::to_string);
        let matrix = self.local_matrix(group);

        viewer.begin_object(name.as_deref());
        let context = match &matrix {
            Some(matrix) => {
                viewer.transform(matrix);
                context.transformed(matrix)
            }
            None => *context,
        };
        let sensitive = children
            .iter()
            .any(|child| scene.has_capability(*child, Capability::PointingDeviceSensor));
        if sensitive {
            viewer.set_sensitive(Some(node));
        }

        let mut result = Ok(());
        for child in children {
            let rendered = scene.render_node(child, viewer, &context);
            if result.is_ok() {
                result = rendered;
            }
        }

        if sensitive {
            viewer.set_sensitive(None);
        }
        viewer.end_object();
        result
    }
}

impl BoundedVolume for Grouping {
    fn bounding_sphere(&self, scene: &mut Scene, node: NodeId) -> BoundingSphere {
        let Ok(group) = scene.node(node) else {
            return BoundingSphere::EMPTY;
        };
        let matrix = self.local_matrix(group);
        let bbox_size = group.vec3f_or("bboxSize", NO_BBOX);
        let local = if bbox_size.x >= 0.0 && bbox_size.y >= 0.0 && bbox_size.z >= 0.0 {
            let center = group.vec3f_or("bboxCenter", Vec3f::ZERO);
            BoundingSphere::new(center, bbox_size.length() * 0.5)
        } else {
            let children = group.node_refs("children");
            scene.bounding_sphere_of(&children)
        };
        match matrix {
            Some(matrix) => local.transformed(&matrix),
            None => local,
        }
    }
}
