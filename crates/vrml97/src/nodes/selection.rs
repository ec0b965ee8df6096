//! Grouping nodes that render one of their children: Switch by index, LOD
//! by distance from the viewer.

use std::rc::Rc;

use crate::bounding_volume::BoundingSphere;
use crate::engine::NodeId;
use crate::error::Result;
use crate::field::{FieldValue, Vec3f};
use crate::node::{BoundedVolume, BuiltinMetatype, NodeBehavior, NodeMetatype, Renderable};
use crate::scene::Scene;
use crate::viewer::{RenderingContext, Viewer};

pub(super) fn switch() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("Switch")
        .exposed_field("choice", FieldValue::MfNode(Vec::new()))
        .exposed_field("whichChoice", FieldValue::SfInt32(-1))
        .behavior(Switch)
        .build()
}

pub(super) fn lod() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("LOD")
        .exposed_field("level", FieldValue::MfNode(Vec::new()))
        .field("center", FieldValue::SfVec3f(Vec3f::ZERO))
        .field("range", FieldValue::MfFloat(Vec::new()))
        .behavior(Lod)
        .build()
}

struct Switch;

impl Switch {
    /// `choice[whichChoice]`; out-of-range indices choose nothing.
    fn chosen(scene: &Scene, node: NodeId) -> Result<Option<NodeId>> {
        let switch = scene.node(node)?;
        let which = switch.i32_or("whichChoice", -1);
        Ok(usize::try_from(which)
            .ok()
            .and_then(|index| switch.node_refs("choice").get(index).copied()))
    }
}

impl NodeBehavior for Switch {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }

    fn as_bounded_volume(&self) -> Option<&dyn BoundedVolume> {
        Some(self)
    }
}

impl Renderable for Switch {
    fn render(
        &self,
        scene: &mut Scene,
        node: NodeId,
        viewer: &mut dyn Viewer,
        context: &RenderingContext,
    ) -> Result<()> {
        match Self::chosen(scene, node)? {
            Some(child) => scene.render_node(child, viewer, context),
            None => Ok(()),
        }
    }
}

impl BoundedVolume for Switch {
    fn bounding_sphere(&self, scene: &mut Scene, node: NodeId) -> BoundingSphere {
        match Self::chosen(scene, node) {
            Ok(Some(child)) => scene.bounding_sphere(child),
            _ => BoundingSphere::EMPTY,
        }
    }
}

struct Lod;

/// The first level whose range limit is beyond `distance`. Without ranges,
/// or with fewer levels than ranges, the last level stands in.
fn level_index(distance: f32, range: &[f32], levels: usize) -> Option<usize> {
    let last = levels.checked_sub(1)?;
    let index = if range.is_empty() {
        last
    } else {
        range
            .iter()
            .position(|limit| distance < *limit)
            .unwrap_or(range.len())
    };
    Some(index.min(last))
}

impl NodeBehavior for Lod {
    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }

    fn as_bounded_volume(&self) -> Option<&dyn BoundedVolume> {
        Some(self)
    }
}

impl Renderable for Lod {
    fn render(
        &self,
        scene: &mut Scene,
        node: NodeId,
        viewer: &mut dyn Viewer,
        context: &RenderingContext,
    ) -> Result<()> {
        let lod = scene.node(node)?;
        let levels = lod.node_refs("level");
        let range = lod.get("range").and_then(FieldValue::as_floats).unwrap_or(&[]).to_vec();
        let center = context.model.transform_point3(lod.vec3f_or("center", Vec3f::ZERO).to_glam());
        let distance = center.distance(scene.viewer_position().to_glam());
        match level_index(distance, &range, levels.len()) {
            Some(index) => scene.render_node(levels[index], viewer, context),
            None => Ok(()),
        }
    }
}

impl BoundedVolume for Lod {
    /// Every level, so the bounds hold whichever one is showing.
    fn bounding_sphere(&self, scene: &mut Scene, node: NodeId) -> BoundingSphere {
        let Ok(lod) = scene.node(node) else {
            return BoundingSphere::EMPTY;
        };
        let levels = lod.node_refs("level");
        scene.bounding_sphere_of(&levels)
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

    /// Kinds of geometry inserted by one render.
    fn rendered(scene: &mut Scene) -> Vec<&'static str> {
        let mut viewer = RecordingViewer::new();
        scene.render(&mut viewer);
        viewer
            .take_calls()
            .iter()
            .filter_map(|call| match call {
                ViewerCall::InsertBox { .. } => Some("box"),
                ViewerCall::InsertSphere { .. } => Some("sphere"),
                ViewerCall::InsertCone { .. } => Some("cone"),
                _ => None,
            })
            .collect()
    }

    #[test]
    fn switch_renders_only_the_chosen_child() {
        let mut scene = load(
            "#VRML V2.0 utf8\n\
             DEF S Switch { whichChoice 1 choice [ Shape { geometry Box { } } Shape { geometry Sphere { } } ] }",
        );
        let s = scene.find_node("S").unwrap();
        assert_eq!(rendered(&mut scene), vec!["sphere"]);
        assert!((scene.bounding_sphere(s).radius() - 1.0).abs() < 1e-5);

        scene.set_field(s, "whichChoice", FieldValue::SfInt32(0)).unwrap();
        assert_eq!(rendered(&mut scene), vec!["box"]);

        for which in [-1, 2] {
            scene.set_field(s, "whichChoice", FieldValue::SfInt32(which)).unwrap();
            assert!(rendered(&mut scene).is_empty(), "whichChoice {which}");
            assert!(scene.bounding_sphere(s).is_empty());
        }
    }

    #[test]
    fn lod_levels_follow_the_viewer_distance() {
        let mut scene = load(
            "#VRML V2.0 utf8\n\
             DEF L LOD { range [ 5 20 ] level [\n\
               Shape { geometry Box { } }\n\
               Shape { geometry Sphere { } }\n\
               Shape { geometry Cone { } }\n\
             ] }\n\
             DEF V Viewpoint { position 0 0 2 }",
        );
        // Unbound: the default position is 10 away.
        assert_eq!(rendered(&mut scene), vec!["sphere"]);

        scene.update(0.0);
        assert_eq!(rendered(&mut scene), vec!["box"]);

        let v = scene.find_node("V").unwrap();
        scene.set_field(v, "position", FieldValue::SfVec3f(Vec3f::new(0.0, 0.0, 50.0))).unwrap();
        assert_eq!(rendered(&mut scene), vec!["cone"]);
    }

    #[test]
    fn lod_center_moves_with_its_transform() {
        let mut scene = load(
            "#VRML V2.0 utf8\n\
             Transform { translation 0 0 8 children LOD { range [ 5 ] level [\n\
               Shape { geometry Box { } }\n\
               Shape { geometry Sphere { } }\n\
             ] } }",
        );
        assert_eq!(rendered(&mut scene), vec!["box"]);
    }

    #[test]
    fn level_choice_edges() {
        assert_eq!(level_index(3.0, &[], 3), Some(2));
        assert_eq!(level_index(3.0, &[1.0, 2.0, 4.0], 2), Some(1));
        assert_eq!(level_index(100.0, &[1.0], 3), Some(1));
        assert_eq!(level_index(0.0, &[1.0], 0), None);
    }

    #[test]
    fn lod_bounds_cover_every_level() {
        let mut scene = load(
            "#VRML V2.0 utf8\n\
             DEF L LOD { level [ Shape { geometry Sphere { radius 3 } } Shape { geometry Sphere { } } ] }",
        );
        let l = scene.find_node("L").unwrap();
        assert!((scene.bounding_sphere(l).radius() - 3.0).abs() < 1e-5);
    }
}
