use std::rc::Rc;

use crate::bounding_volume::BoundingSphere;
use crate::engine::NodeId;
use crate::error::Result;
use crate::field::{FieldValue, Vec3f};
use crate::node::{
    BoundedVolume, BuiltinMetatype, NodeBehavior, NodeInterface, NodeMetatype, NodeState, Renderable,
};
use crate::resource::resolve_url;
use crate::scene::{LoadPurpose, Scene};
use crate::scope::Scope;
use crate::viewer::{RenderingContext, Viewer};

pub(super) fn inline() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("Inline")
        .exposed_field("url", FieldValue::MfString(Vec::new()))
        .field("bboxCenter", FieldValue::SfVec3f(Vec3f::ZERO))
        .field("bboxSize", FieldValue::SfVec3f(Vec3f::new(-1.0, -1.0, -1.0)))
        .behavior(Inline)
        .build()
}

/// Content of an Inline once its world has loaded.
#[derive(Debug, Default)]
pub struct InlineState {
    /// Root nodes of the loaded world.
    pub children: Vec<NodeId>,
    pub loaded_url: Option<String>,
    /// Scope of the loaded world; its DEF names stay private to it.
    pub scope: Option<Rc<Scope>>,
}

struct Inline;

impl Inline {
    fn children(scene: &Scene, node: NodeId) -> Vec<NodeId> {
        match scene.node(node).map(|inline| inline.state()) {
            Ok(NodeState::Inline(state)) => state.children.clone(),
            _ => Vec::new(),
        }
    }

    /// Ask for the world named by `url`, relative to the document the
    /// Inline appears in.
    fn request(scene: &mut Scene, node: NodeId) -> Result<()> {
        let inline = scene.node(node)?;
        let base = inline.scope().document_url().to_string();
        let urls: Vec<String> = inline
            .get("url")
            .and_then(FieldValue::as_strings)
            .unwrap_or_default()
            .iter()
            .map(|url| resolve_url(&base, url))
            .collect();
        if !urls.is_empty() {
            scene.request_load(LoadPurpose::Inline(node), urls);
        }
        Ok(())
    }
}

impl NodeBehavior for Inline {
    fn initialize(&self, scene: &mut Scene, node: NodeId, _timestamp: f64) -> Result<()> {
        Self::request(scene, node)
    }

    fn process_event(
        &self,
        scene: &mut Scene,
        node: NodeId,
        interface: &NodeInterface,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        scene.apply_event(node, interface, value, timestamp)?;
        if interface.id == "url" && scene.node(node)?.initialized {
            Self::request(scene, node)?;
        }
        Ok(())
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        Some(self)
    }

    fn as_bounded_volume(&self) -> Option<&dyn BoundedVolume> {
        Some(self)
    }
}

impl Renderable for Inline {
    fn render(
        &self,
        scene: &mut Scene,
        node: NodeId,
        viewer: &mut dyn Viewer,
        context: &RenderingContext,
    ) -> Result<()> {
        let mut result = Ok(());
        for child in Self::children(scene, node) {
            let rendered = scene.render_node(child, viewer, context);
            if result.is_ok() {
                result = rendered;
            }
        }
        result
    }
}

impl BoundedVolume for Inline {
    fn bounding_sphere(&self, scene: &mut Scene, node: NodeId) -> BoundingSphere {
        let Ok(inline) = scene.node(node) else {
            return BoundingSphere::EMPTY;
        };
        let size = inline.vec3f_or("bboxSize", Vec3f::new(-1.0, -1.0, -1.0));
        if size.x >= 0.0 && size.y >= 0.0 && size.z >= 0.0 {
            return BoundingSphere::new(inline.vec3f_or("bboxCenter", Vec3f::ZERO), size.length() * 0.5);
        }
        let children = Self::children(scene, node);
        scene.bounding_sphere_of(&children)
    }
}
