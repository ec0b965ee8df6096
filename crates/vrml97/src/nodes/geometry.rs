use std::rc::Rc;

use crate::bounding_volume::BoundingSphere;
use crate::engine::NodeId;
use crate::error::Result;
use crate::field::{FieldType, FieldValue, Vec3f};
use crate::node::{BoundedVolume, BuiltinMetatype, Geometry, Node, NodeBehavior, NodeInterface, NodeMetatype};
use crate::scene::Scene;
use crate::viewer::{ObjectHandle, Shell, Viewer};

pub(super) fn box_geometry() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("Box")
        .field("size", FieldValue::SfVec3f(Vec3f::new(2.0, 2.0, 2.0)))
        .behavior(Primitive::Box)
        .build()
}

pub(super) fn sphere() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("Sphere")
        .field("radius", FieldValue::SfFloat(1.0))
        .behavior(Primitive::Sphere)
        .build()
}

pub(super) fn cone() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("Cone")
        .field("bottomRadius", FieldValue::SfFloat(1.0))
        .field("height", FieldValue::SfFloat(2.0))
        .field("side", FieldValue::SfBool(true))
        .field("bottom", FieldValue::SfBool(true))
        .behavior(Primitive::Cone)
        .build()
}

pub(super) fn cylinder() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("Cylinder")
        .field("bottom", FieldValue::SfBool(true))
        .field("height", FieldValue::SfFloat(2.0))
        .field("radius", FieldValue::SfFloat(1.0))
        .field("side", FieldValue::SfBool(true))
        .field("top", FieldValue::SfBool(true))
        .behavior(Primitive::Cylinder)
        .build()
}

pub(super) fn coordinate() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("Coordinate")
        .exposed_field("point", FieldValue::MfVec3f(Vec::new()))
        .build()
}

pub(super) fn indexed_face_set() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("IndexedFaceSet")
        .event_in("set_colorIndex", FieldType::MfInt32)
        .event_in("set_coordIndex", FieldType::MfInt32)
        .event_in("set_normalIndex", FieldType::MfInt32)
        .event_in("set_texCoordIndex", FieldType::MfInt32)
        .exposed_field("color", FieldValue::SfNode(None))
        .exposed_field("coord", FieldValue::SfNode(None))
        .exposed_field("normal", FieldValue::SfNode(None))
        .exposed_field("texCoord", FieldValue::SfNode(None))
        .field("ccw", FieldValue::SfBool(true))
        .field("colorIndex", FieldValue::MfInt32(Vec::new()))
        .field("colorPerVertex", FieldValue::SfBool(true))
        .field("convex", FieldValue::SfBool(true))
        .field("coordIndex", FieldValue::MfInt32(Vec::new()))
        .field("creaseAngle", FieldValue::SfFloat(0.0))
        .field("normalIndex", FieldValue::MfInt32(Vec::new()))
        .field("normalPerVertex", FieldValue::SfBool(true))
        .field("solid", FieldValue::SfBool(true))
        .field("texCoordIndex", FieldValue::MfInt32(Vec::new()))
        .behavior(IndexedFaceSet)
        .build()
}

enum Primitive {
    Box,
    Sphere,
    Cone,
    Cylinder,
}

impl NodeBehavior for Primitive {
    fn as_geometry(&self) -> Option<&dyn Geometry> {
        Some(self)
    }

    fn as_bounded_volume(&self) -> Option<&dyn BoundedVolume> {
        Some(self)
    }
}

impl Geometry for Primitive {
    fn insert_geometry(&self, _scene: &Scene, node: &Node, viewer: &mut dyn Viewer) -> ObjectHandle {
        match self {
            Self::Box => viewer.insert_box(node.vec3f_or("size", Vec3f::new(2.0, 2.0, 2.0))),
            Self::Sphere => viewer.insert_sphere(node.f32_or("radius", 1.0)),
            Self::Cone => viewer.insert_cone(
                node.f32_or("height", 2.0),
                node.f32_or("bottomRadius", 1.0),
                node.bool_or("bottom", true),
                node.bool_or("side", true),
            ),
            Self::Cylinder => viewer.insert_cylinder(
                node.f32_or("height", 2.0),
                node.f32_or("radius", 1.0),
                node.bool_or("bottom", true),
                node.bool_or("side", true),
                node.bool_or("top", true),
            ),
        }
    }
}

impl BoundedVolume for Primitive {
    fn bounding_sphere(&self, scene: &mut Scene, node: NodeId) -> BoundingSphere {
        let Ok(node) = scene.node(node) else {
            return BoundingSphere::EMPTY;
        };
        let radius = match self {
            Self::Box => node.vec3f_or("size", Vec3f::new(2.0, 2.0, 2.0)).length() * 0.5,
            Self::Sphere => node.f32_or("radius", 1.0),
            Self::Cone => half_diagonal(node.f32_or("bottomRadius", 1.0), node.f32_or("height", 2.0)),
            Self::Cylinder => half_diagonal(node.f32_or("radius", 1.0), node.f32_or("height", 2.0)),
        };
        BoundingSphere::new(Vec3f::ZERO, radius)
    }
}

/// Radius of the sphere around a centered solid of revolution.
fn half_diagonal(radius: f32, height: f32) -> f32 {
    (radius * radius + height * height * 0.25).sqrt()
}

struct IndexedFaceSet;

impl IndexedFaceSet {
    fn points(scene: &Scene, node: &Node) -> Vec<Vec3f> {
        node.node_ref("coord")
            .map(|coord| scene.implementation(coord))
            .and_then(|coord| scene.node(coord).ok())
            .and_then(|coord| coord.get("point"))
            .and_then(FieldValue::as_vec3fs)
            .map(<[Vec3f]>::to_vec)
            .unwrap_or_default()
    }
}

impl NodeBehavior for IndexedFaceSet {
    fn process_event(
        &self,
        scene: &mut Scene,
        node: NodeId,
        interface: &NodeInterface,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        match interface.id.strip_prefix("set_") {
            Some(field @ ("colorIndex" | "coordIndex" | "normalIndex" | "texCoordIndex")) => {
                scene.store_value(node, &interface.id, value.clone())?;
                scene.store_value(node, field, value)
            }
            _ => scene.apply_event(node, interface, value, timestamp),
        }
    }

    fn as_geometry(&self) -> Option<&dyn Geometry> {
        Some(self)
    }

    fn as_bounded_volume(&self) -> Option<&dyn BoundedVolume> {
        Some(self)
    }
}

impl Geometry for IndexedFaceSet {
    fn insert_geometry(&self, scene: &Scene, faces: &Node, viewer: &mut dyn Viewer) -> ObjectHandle {
        let shell = Shell {
            points: Self::points(scene, faces),
            coord_index: faces
                .get("coordIndex")
                .and_then(FieldValue::as_int32s)
                .map(<[i32]>::to_vec)
                .unwrap_or_default(),
            ccw: faces.bool_or("ccw", true),
            convex: faces.bool_or("convex", true),
            solid: faces.bool_or("solid", true),
        };
        viewer.insert_shell(&shell)
    }
}

impl BoundedVolume for IndexedFaceSet {
    fn bounding_sphere(&self, scene: &mut Scene, node: NodeId) -> BoundingSphere {
        match scene.node(node) {
            Ok(faces) => BoundingSphere::from_points(&Self::points(scene, faces)),
            Err(_) => BoundingSphere::EMPTY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::BrowserConfig;
    use crate::node::MetatypeRegistry;
    use crate::viewer::{RecordingViewer, ViewerCall};

    fn load(source: &str) -> Scene {
        Scene::load(source, "test.wrl", MetatypeRegistry::with_builtins(), BrowserConfig::default()).unwrap()
    }

    const SQUARE: &str = "#VRML V2.0 utf8\n\
        Shape { geometry DEF Faces IndexedFaceSet {\n\
          coord DEF Points Coordinate { point [ 0 0 0, 2 0 0, 2 2 0, 0 2 0 ] }\n\
          coordIndex [ 0 1 2 3 -1 ]\n\
          solid FALSE\n\
        } }";

    #[test]
    fn face_sets_become_shells() {
        let mut scene = load(SQUARE);
        let mut viewer = RecordingViewer::new();
        scene.render(&mut viewer);
        let shell = viewer
            .calls()
            .iter()
            .find_map(|call| match call {
                ViewerCall::InsertShell { shell, .. } => Some(shell.clone()),
                _ => None,
            })
            .unwrap();
        assert_eq!(shell.points.len(), 4);
        assert_eq!(shell.coord_index, vec![0, 1, 2, 3, -1]);
        assert!(!shell.solid);
        assert!(shell.ccw);
    }

    #[test]
    fn set_coord_index_replaces_the_faces() {
        let mut scene = load(SQUARE);
        let faces = scene.find_node("Faces").unwrap();
        scene
            .send_event(faces, "set_coordIndex", FieldValue::MfInt32(vec![0, 1, 2, -1]), 1.0)
            .unwrap();
        assert_eq!(
            scene.get_field(faces, "coordIndex").unwrap(),
            &FieldValue::MfInt32(vec![0, 1, 2, -1])
        );
    }

    #[test]
    fn changed_points_reinsert_the_shell() {
        let mut scene = load(SQUARE);
        let mut viewer = RecordingViewer::new();
        scene.render(&mut viewer);
        viewer.take_calls();

        let points = scene.find_node("Points").unwrap();
        scene
            .set_field(points, "point", FieldValue::MfVec3f(vec![Vec3f::ZERO, Vec3f::new(1.0, 0.0, 0.0)]))
            .unwrap();
        scene.render(&mut viewer);
        let calls = viewer.take_calls();
        assert!(calls.iter().any(|call| matches!(call, ViewerCall::RemoveObject { .. })));
        assert!(calls.iter().any(|call| matches!(call, ViewerCall::InsertShell { shell, .. } if shell.points.len() == 2)));
    }

    #[test]
    fn primitive_bounds() {
        let mut scene = load(
            "#VRML V2.0 utf8\n\
             DEF B Box { size 2 2 2 }\n\
             DEF S Sphere { radius 3 }\n\
             DEF C Cylinder { radius 3 height 8 }",
        );
        let b = scene.find_node("B").unwrap();
        let s = scene.find_node("S").unwrap();
        let c = scene.find_node("C").unwrap();
        assert!((scene.bounding_sphere(b).radius() - 3f32.sqrt()).abs() < 1e-5);
        assert_eq!(scene.bounding_sphere(s).radius(), 3.0);
        assert!((scene.bounding_sphere(c).radius() - 5.0).abs() < 1e-5);
    }

    #[test]
    fn face_set_bounds_cover_the_points() {
        let mut scene = load(SQUARE);
        let faces = scene.find_node("Faces").unwrap();
        let bounds = scene.bounding_sphere(faces);
        for corner in [Vec3f::ZERO, Vec3f::new(2.0, 2.0, 0.0)] {
            let offset = corner.to_glam() - bounds.center().to_glam();
            assert!(offset.length() <= bounds.radius() + 1e-5);
        }
    }
}
