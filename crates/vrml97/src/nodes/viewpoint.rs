use std::rc::Rc;

use log::{debug, warn};

use crate::engine::NodeId;
use crate::error::Result;
use crate::field::{FieldType, FieldValue, Rotation};
use crate::node::{BuiltinMetatype, NodeBehavior, NodeInterface, NodeMetatype};
use crate::scene::{DEFAULT_FIELD_OF_VIEW, DEFAULT_VIEWPOINT_POSITION, Scene};

pub(super) fn viewpoint() -> Rc<dyn NodeMetatype> {
    BuiltinMetatype::builder("Viewpoint")
        .event_in("set_bind", FieldType::SfBool)
        .exposed_field("fieldOfView", FieldValue::SfFloat(DEFAULT_FIELD_OF_VIEW))
        .exposed_field("jump", FieldValue::SfBool(true))
        .exposed_field("orientation", FieldValue::SfRotation(Rotation::default()))
        .exposed_field("position", FieldValue::SfVec3f(DEFAULT_VIEWPOINT_POSITION))
        .field("description", FieldValue::SfString(String::new()))
        .event_out("bindTime", FieldType::SfTime)
        .event_out("isBound", FieldType::SfBool)
        .behavior(Viewpoint)
        .build()
}

struct Viewpoint;

impl Viewpoint {
    /// Put `node` on top of the bind stack. The node it covers sends
    /// `isBound FALSE`; `node` sends `isBound TRUE` and `bindTime`.
    fn bind(scene: &mut Scene, node: NodeId, timestamp: f64) -> Result<()> {
        if scene.bound_viewpoint() == Some(node) {
            return Ok(());
        }
        if let Some(previous) = scene.viewpoints_mut().push(node) {
            scene.emit_event(previous, "isBound", FieldValue::SfBool(false), timestamp)?;
        }
        debug!("viewpoint {node} bound at {timestamp}");
        Self::announce(scene, node, timestamp)
    }

    /// Take `node` off the bind stack. Only the bound node sends events, and
    /// the one it uncovers becomes bound.
    fn unbind(scene: &mut Scene, node: NodeId, timestamp: f64) -> Result<()> {
        if !scene.viewpoints_mut().remove(node) {
            return Ok(());
        }
        scene.emit_event(node, "isBound", FieldValue::SfBool(false), timestamp)?;
        match scene.bound_viewpoint() {
            Some(next) => Self::announce(scene, next, timestamp),
            None => Ok(()),
        }
    }

    fn announce(scene: &mut Scene, node: NodeId, timestamp: f64) -> Result<()> {
        scene.emit_event(node, "isBound", FieldValue::SfBool(true), timestamp)?;
        scene.emit_event(node, "bindTime", FieldValue::SfTime(timestamp), timestamp)
    }
}

impl NodeBehavior for Viewpoint {
    /// The first Viewpoint initialized while none is bound becomes bound.
    fn initialize(&self, scene: &mut Scene, node: NodeId, timestamp: f64) -> Result<()> {
        if scene.bound_viewpoint().is_none() {
            Self::bind(scene, node, timestamp)?;
        }
        Ok(())
    }

    fn shutdown(&self, scene: &mut Scene, node: NodeId, timestamp: f64) {
        if let Err(err) = Self::unbind(scene, node, timestamp) {
            warn!("unbinding viewpoint {node} failed: {err}");
        }
    }

    fn process_event(
        &self,
        scene: &mut Scene,
        node: NodeId,
        interface: &NodeInterface,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        let bind = match (interface.id.as_str(), &value) {
            ("set_bind", FieldValue::SfBool(bind)) => *bind,
            _ => return scene.apply_event(node, interface, value, timestamp),
        };
        scene.apply_event(node, interface, value, timestamp)?;
        if bind {
            Self::bind(scene, node, timestamp)
        } else {
            Self::unbind(scene, node, timestamp)
        }
    }
}
