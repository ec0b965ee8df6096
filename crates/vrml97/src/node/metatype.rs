use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::behavior::{DefaultBehavior, NodeBehavior};
use super::interface::{NodeInterface, NodeInterfaceSet};
use super::proto::{ExternProtoMetatype, ProtoMetatype};
use crate::engine::arena::NodeId;
use crate::error::{Result, VrmlError};
use crate::field::{FieldType, FieldValue};
use crate::scene::Scene;

/// Factory for one kind of node, built in or declared by a PROTO.
pub trait NodeMetatype {
    fn id(&self) -> &str;

    /// Every interface a node type of this kind may expose.
    fn supported_interfaces(&self) -> &NodeInterfaceSet;

    /// Initial value of a field, eventIn or eventOut of this kind.
    fn default_value(&self, interface_id: &str) -> Option<FieldValue>;

    /// Event handling and capabilities shared by all nodes of this kind.
    fn behavior(&self) -> Rc<dyn NodeBehavior>;

    /// Runs once a new node has its initial field values.
    fn expand(&self, _scene: &mut Scene, _node: NodeId) -> Result<()> {
        Ok(())
    }

    fn as_proto(&self) -> Option<&ProtoMetatype> {
        None
    }

    fn as_extern_proto(&self) -> Option<&ExternProtoMetatype> {
        None
    }
}

/// A named set of interfaces bound to the metatype that implements them.
pub struct NodeType {
    id: String,
    metatype: Rc<dyn NodeMetatype>,
    interfaces: NodeInterfaceSet,
}

impl NodeType {
    /// Bind `requested` to `metatype`, in the order given.
    ///
    /// Every requested interface must match a supported one exactly (name,
    /// kind and type); otherwise nothing is created.
    pub fn create(
        metatype: Rc<dyn NodeMetatype>,
        id: impl Into<String>,
        requested: &[NodeInterface],
    ) -> Result<Rc<Self>> {
        let supported = metatype.supported_interfaces();
        let mut interfaces = NodeInterfaceSet::new();
        for interface in requested {
            if !supported.contains(interface) {
                return Err(VrmlError::unsupported(metatype.id(), interface.id.clone()));
            }
            interfaces.add(interface.clone())?;
        }
        Ok(Rc::new(Self {
            id: id.into(),
            metatype,
            interfaces,
        }))
    }

    /// A type exposing everything `metatype` supports, named after it.
    pub fn with_all_interfaces(metatype: Rc<dyn NodeMetatype>) -> Rc<Self> {
        Self::declared(metatype.id().to_string(), metatype)
    }

    /// A type named `id` exposing everything `metatype` supports. PROTO
    /// declarations bind their metatype this way.
    pub fn declared(id: impl Into<String>, metatype: Rc<dyn NodeMetatype>) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            interfaces: metatype.supported_interfaces().clone(),
            metatype,
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn metatype(&self) -> &Rc<dyn NodeMetatype> {
        &self.metatype
    }

    pub fn interfaces(&self) -> &NodeInterfaceSet {
        &self.interfaces
    }
}

impl fmt::Debug for NodeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("NodeType")
            .field("id", &self.id)
            .field("metatype", &self.metatype.id())
            .field("interfaces", &self.interfaces.len())
            .finish()
    }
}

/// Metatype of a built-in node kind, described by a table of interfaces and
/// their defaults.
pub struct BuiltinMetatype {
    id: String,
    interfaces: NodeInterfaceSet,
    defaults: HashMap<String, FieldValue>,
    behavior: Rc<dyn NodeBehavior>,
}

impl BuiltinMetatype {
    pub fn builder(id: impl Into<String>) -> BuiltinMetatypeBuilder {
        BuiltinMetatypeBuilder {
            id: id.into(),
            interfaces: NodeInterfaceSet::new(),
            defaults: HashMap::new(),
            behavior: Rc::new(DefaultBehavior),
        }
    }
}

impl NodeMetatype for BuiltinMetatype {
    fn id(&self) -> &str {
        &self.id
    }

    fn supported_interfaces(&self) -> &NodeInterfaceSet {
        &self.interfaces
    }

    fn default_value(&self, interface_id: &str) -> Option<FieldValue> {
        self.defaults.get(interface_id).cloned()
    }

    fn behavior(&self) -> Rc<dyn NodeBehavior> {
        self.behavior.clone()
    }
}

pub struct BuiltinMetatypeBuilder {
    id: String,
    interfaces: NodeInterfaceSet,
    defaults: HashMap<String, FieldValue>,
    behavior: Rc<dyn NodeBehavior>,
}

impl BuiltinMetatypeBuilder {
    fn with(mut self, interface: NodeInterface, default: Option<FieldValue>) -> Self {
        let id = interface.id.clone();
        let added = self.interfaces.add(interface);
        debug_assert!(added.is_ok(), "{}: duplicate interface {id}", self.id);
        if let Some(default) = default {
            self.defaults.insert(id, default);
        }
        self
    }

    pub fn field(self, id: &str, default: FieldValue) -> Self {
        let interface = NodeInterface::field(default.field_type(), id);
        self.with(interface, Some(default))
    }

    pub fn exposed_field(self, id: &str, default: FieldValue) -> Self {
        let interface = NodeInterface::exposed_field(default.field_type(), id);
        self.with(interface, Some(default))
    }

    pub fn event_in(self, id: &str, field_type: FieldType) -> Self {
        self.with(NodeInterface::event_in(field_type, id), None)
    }

    pub fn event_out(self, id: &str, field_type: FieldType) -> Self {
        self.with(NodeInterface::event_out(field_type, id), None)
    }

    pub fn behavior(mut self, behavior: impl NodeBehavior + 'static) -> Self {
        self.behavior = Rc::new(behavior);
        self
    }

    pub fn build(self) -> Rc<dyn NodeMetatype> {
        Rc::new(BuiltinMetatype {
            id: self.id,
            interfaces: self.interfaces,
            defaults: self.defaults,
            behavior: self.behavior,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::Color;

    fn appearance() -> Rc<dyn NodeMetatype> {
        BuiltinMetatype::builder("Appearance")
            .exposed_field("material", FieldValue::SfNode(None))
            .exposed_field("texture", FieldValue::SfNode(None))
            .build()
    }

    #[test]
    fn unsupported_interface_fails_the_whole_type() {
        let result = NodeType::create(
            appearance(),
            "Appearance",
            &[
                NodeInterface::exposed_field(FieldType::SfNode, "material"),
                NodeInterface::exposed_field(FieldType::SfNode, "bogus"),
            ],
        );
        assert!(matches!(
            result,
            Err(VrmlError::UnsupportedInterface { ref interface, .. }) if interface == "bogus"
        ));
    }

    #[test]
    fn interfaces_match_by_kind_and_type_too() {
        let wrong_kind = NodeType::create(
            appearance(),
            "Appearance",
            &[NodeInterface::field(FieldType::SfNode, "material")],
        );
        assert!(wrong_kind.is_err());
        let wrong_type = NodeType::create(
            appearance(),
            "Appearance",
            &[NodeInterface::exposed_field(FieldType::MfNode, "material")],
        );
        assert!(wrong_type.is_err());
    }

    #[test]
    fn requested_order_is_kept() {
        let node_type = NodeType::create(
            appearance(),
            "Appearance",
            &[
                NodeInterface::exposed_field(FieldType::SfNode, "texture"),
                NodeInterface::exposed_field(FieldType::SfNode, "material"),
            ],
        )
        .unwrap();
        assert_eq!(node_type.interfaces().slot("texture"), Some(0));
        assert_eq!(node_type.interfaces().slot("material"), Some(1));
    }

    #[test]
    fn builder_records_defaults() {
        let material = BuiltinMetatype::builder("Material")
            .exposed_field("ambientIntensity", FieldValue::SfFloat(0.2))
            .exposed_field("diffuseColor", FieldValue::SfColor(Color::new(0.8, 0.8, 0.8)))
            .build();
        assert_eq!(
            material.default_value("ambientIntensity"),
            Some(FieldValue::SfFloat(0.2))
        );
        assert_eq!(material.supported_interfaces().len(), 2);
        let full = NodeType::with_all_interfaces(material);
        assert_eq!(full.id(), "Material");
        assert_eq!(full.interfaces().len(), 2);
    }
}
