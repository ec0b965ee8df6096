use super::Node;
use super::interface::NodeInterface;
use crate::bounding_volume::BoundingSphere;
use crate::engine::arena::NodeId;
use crate::error::Result;
use crate::field::{FieldValue, Vec3f};
use crate::scene::Scene;
use crate::viewer::{ObjectHandle, RenderingContext, Viewer};

/// What nodes of one kind do: event handling, lifecycle hooks and the
/// capabilities they implement.
///
/// Behaviors are stateless; per-node state lives in the node
/// ([`super::NodeState`]).
pub trait NodeBehavior {
    fn initialize(&self, _scene: &mut Scene, _node: NodeId, _timestamp: f64) -> Result<()> {
        Ok(())
    }

    fn shutdown(&self, _scene: &mut Scene, _node: NodeId, _timestamp: f64) {}

    /// Handle an event sent to `interface`, which accepts events and has the
    /// value's type.
    fn process_event(
        &self,
        scene: &mut Scene,
        node: NodeId,
        interface: &NodeInterface,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        scene.apply_event(node, interface, value, timestamp)
    }

    fn as_renderable(&self) -> Option<&dyn Renderable> {
        None
    }

    fn as_geometry(&self) -> Option<&dyn Geometry> {
        None
    }

    fn as_time_dependent(&self) -> Option<&dyn TimeDependent> {
        None
    }

    fn as_pointing_device_sensor(&self) -> Option<&dyn PointingDeviceSensor> {
        None
    }

    fn as_bounded_volume(&self) -> Option<&dyn BoundedVolume> {
        None
    }
}

/// Plain field storage with the standard exposedField semantics.
#[derive(Debug, Default)]
pub struct DefaultBehavior;

impl NodeBehavior for DefaultBehavior {}

/// Nodes visited by the render traversal.
pub trait Renderable {
    fn render(
        &self,
        scene: &mut Scene,
        node: NodeId,
        viewer: &mut dyn Viewer,
        context: &RenderingContext,
    ) -> Result<()>;
}

/// Geometry nodes, inserted into the viewer by their Shape.
pub trait Geometry {
    fn insert_geometry(&self, scene: &Scene, node: &Node, viewer: &mut dyn Viewer) -> ObjectHandle;
}

/// Nodes updated every frame while registered with the scene.
pub trait TimeDependent {
    fn update(&self, scene: &mut Scene, node: NodeId, time: f64) -> Result<()>;
}

/// Sensors activated by pointer input on sibling geometry.
pub trait PointingDeviceSensor {
    fn activate(
        &self,
        scene: &mut Scene,
        node: NodeId,
        timestamp: f64,
        over: bool,
        active: bool,
        hit_point: Vec3f,
    ) -> Result<()>;
}

pub trait BoundedVolume {
    fn bounding_sphere(&self, scene: &mut Scene, node: NodeId) -> BoundingSphere;
}

/// Capabilities a node kind may implement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Capability {
    Renderable,
    Geometry,
    TimeDependent,
    PointingDeviceSensor,
    BoundedVolume,
}

impl Capability {
    pub const ALL: [Capability; 5] = [
        Self::Renderable,
        Self::Geometry,
        Self::TimeDependent,
        Self::PointingDeviceSensor,
        Self::BoundedVolume,
    ];

    pub fn supported_by(self, behavior: &dyn NodeBehavior) -> bool {
        match self {
            Self::Renderable => behavior.as_renderable().is_some(),
            Self::Geometry => behavior.as_geometry().is_some(),
            Self::TimeDependent => behavior.as_time_dependent().is_some(),
            Self::PointingDeviceSensor => behavior.as_pointing_device_sensor().is_some(),
            Self::BoundedVolume => behavior.as_bounded_volume().is_some(),
        }
    }
}
