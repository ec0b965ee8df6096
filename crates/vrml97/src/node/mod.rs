//! Node instances, node types and the metatypes that produce them.

use std::rc::Rc;

mod behavior;
mod interface;
mod metatype;
mod proto;
mod registry;

pub use behavior::{
    BoundedVolume, Capability, DefaultBehavior, Geometry, NodeBehavior, PointingDeviceSensor,
    Renderable, TimeDependent,
};
pub use interface::{InterfaceKind, NodeInterface, NodeInterfaceSet};
pub use metatype::{BuiltinMetatype, BuiltinMetatypeBuilder, NodeMetatype, NodeType};
pub use proto::{
    ExternProtoMetatype, ProtoBehavior, ProtoDefault, ProtoDefinition, ProtoInstance, ProtoMetatype,
};
pub use registry::MetatypeRegistry;

use crate::bounding_volume::BoundingSphere;
use crate::engine::arena::NodeId;
use crate::field::{Color, FieldValue, Rotation, Vec3f};
use crate::nodes::{InlineState, TimeSensorState, TouchSensorState};
use crate::scope::Scope;
use crate::viewer::ObjectHandle;

/// Per-instance runtime state of the node kinds that need more than field
/// values.
#[derive(Debug, Default)]
pub enum NodeState {
    #[default]
    None,
    TimeSensor(TimeSensorState),
    TouchSensor(TouchSensorState),
    Proto(ProtoInstance),
    Inline(InlineState),
}

/// An instance of a [`NodeType`].
///
/// Holds one value per interface of its type, in interface order. Field and
/// exposedField slots hold the current value, eventIn slots the last value
/// received and eventOut slots the last value emitted.
pub struct Node {
    node_type: Rc<NodeType>,
    scope: Rc<Scope>,
    name: Option<String>,
    values: Vec<FieldValue>,
    modified: bool,
    pub(crate) initialized: bool,
    pub(crate) state: NodeState,
    /// Nodes created on this node's behalf (PROTO bodies, Inline content).
    /// They are freed together with it.
    pub(crate) owned: Vec<NodeId>,
    pub(crate) viewer_object: Option<ObjectHandle>,
    pub(crate) bounds: Option<BoundingSphere>,
}

impl Node {
    pub(crate) fn new(node_type: Rc<NodeType>, scope: Rc<Scope>, name: Option<String>) -> Self {
        let metatype = node_type.metatype();
        let values = node_type
            .interfaces()
            .iter()
            .map(|interface| {
                metatype
                    .default_value(&interface.id)
                    .filter(|value| value.field_type() == interface.field_type)
                    .unwrap_or_else(|| FieldValue::default_for(interface.field_type))
            })
            .collect();
        Self {
            node_type,
            scope,
            name,
            values,
            modified: true,
            initialized: false,
            state: NodeState::None,
            owned: Vec::new(),
            viewer_object: None,
            bounds: None,
        }
    }

    pub fn node_type(&self) -> &Rc<NodeType> {
        &self.node_type
    }

    pub fn type_id(&self) -> &str {
        self.node_type.id()
    }

    pub fn scope(&self) -> &Rc<Scope> {
        &self.scope
    }

    /// The DEF name, if any.
    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn state(&self) -> &NodeState {
        &self.state
    }

    /// Whether rendering-relevant state changed since the last render.
    pub fn is_modified(&self) -> bool {
        self.modified
    }

    pub(crate) fn set_modified(&mut self, modified: bool) {
        self.modified = modified;
    }

    /// Value stored for the interface named exactly `id`.
    pub fn get(&self, id: &str) -> Option<&FieldValue> {
        self.node_type.interfaces().slot(id).and_then(|slot| self.values.get(slot))
    }

    pub fn values(&self) -> &[FieldValue] {
        &self.values
    }

    pub(crate) fn slot_mut(&mut self, slot: usize) -> Option<&mut FieldValue> {
        self.values.get_mut(slot)
    }

    /// Store `value` in the slot of `id`. The caller has checked the type.
    pub(crate) fn store(&mut self, id: &str, value: FieldValue) -> bool {
        match self.node_type.interfaces().slot(id).and_then(|slot| self.values.get_mut(slot)) {
            Some(slot) => slot.assign(value).is_ok(),
            None => false,
        }
    }

    pub fn bool_or(&self, id: &str, default: bool) -> bool {
        self.get(id).and_then(FieldValue::as_bool).unwrap_or(default)
    }

    pub fn f32_or(&self, id: &str, default: f32) -> f32 {
        self.get(id).and_then(FieldValue::as_f32).unwrap_or(default)
    }

    pub fn i32_or(&self, id: &str, default: i32) -> i32 {
        self.get(id).and_then(FieldValue::as_i32).unwrap_or(default)
    }

    pub fn time_or(&self, id: &str, default: f64) -> f64 {
        self.get(id).and_then(FieldValue::as_time).unwrap_or(default)
    }

    pub fn vec3f_or(&self, id: &str, default: Vec3f) -> Vec3f {
        self.get(id).and_then(FieldValue::as_vec3f).unwrap_or(default)
    }

    pub fn color_or(&self, id: &str, default: Color) -> Color {
        self.get(id).and_then(FieldValue::as_color).unwrap_or(default)
    }

    pub fn rotation_or(&self, id: &str, default: Rotation) -> Rotation {
        self.get(id).and_then(FieldValue::as_rotation).unwrap_or(default)
    }

    /// Target of an SFNode field.
    pub fn node_ref(&self, id: &str) -> Option<NodeId> {
        self.get(id).and_then(FieldValue::as_node)
    }

    /// Targets of an MFNode field.
    pub fn node_refs(&self, id: &str) -> Vec<NodeId> {
        self.get(id).map(FieldValue::node_refs).unwrap_or_default()
    }

    /// Every node referenced from any SFNode or MFNode slot.
    pub fn children(&self) -> Vec<NodeId> {
        self.node_type
            .interfaces()
            .iter()
            .zip(&self.values)
            .filter(|(interface, _)| interface.kind.has_value())
            .flat_map(|(_, value)| value.node_refs())
            .collect()
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("type", &self.node_type.id())
            .field("name", &self.name)
            .field("modified", &self.modified)
            .field("state", &self.state)
            .finish()
    }
}
