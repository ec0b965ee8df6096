use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::error::{Result, VrmlError};
use crate::field::FieldType;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InterfaceKind {
    EventIn,
    EventOut,
    ExposedField,
    Field,
}

impl InterfaceKind {
    pub fn keyword(self) -> &'static str {
        match self {
            Self::EventIn => "eventIn",
            Self::EventOut => "eventOut",
            Self::ExposedField => "exposedField",
            Self::Field => "field",
        }
    }

    /// Can receive events (eventIn or exposedField).
    pub fn accepts_events(self) -> bool {
        matches!(self, Self::EventIn | Self::ExposedField)
    }

    /// Can emit events (eventOut or exposedField).
    pub fn emits_events(self) -> bool {
        matches!(self, Self::EventOut | Self::ExposedField)
    }

    /// Holds an initial value settable from the scene text.
    pub fn has_value(self) -> bool {
        matches!(self, Self::Field | Self::ExposedField)
    }
}

impl fmt::Display for InterfaceKind {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.keyword())
    }
}

/// One named slot of a node type.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeInterface {
    pub kind: InterfaceKind,
    pub field_type: FieldType,
    pub id: String,
}

impl NodeInterface {
    pub fn new(kind: InterfaceKind, field_type: FieldType, id: impl Into<String>) -> Self {
        Self {
            kind,
            field_type,
            id: id.into(),
        }
    }

    pub fn field(field_type: FieldType, id: impl Into<String>) -> Self {
        Self::new(InterfaceKind::Field, field_type, id)
    }

    pub fn exposed_field(field_type: FieldType, id: impl Into<String>) -> Self {
        Self::new(InterfaceKind::ExposedField, field_type, id)
    }

    pub fn event_in(field_type: FieldType, id: impl Into<String>) -> Self {
        Self::new(InterfaceKind::EventIn, field_type, id)
    }

    pub fn event_out(field_type: FieldType, id: impl Into<String>) -> Self {
        Self::new(InterfaceKind::EventOut, field_type, id)
    }

    /// Names under which this interface receives events: `foo` and
    /// `set_foo` for an exposedField.
    fn matches_event_in(&self, name: &str) -> bool {
        match self.kind {
            InterfaceKind::EventIn => self.id == name,
            InterfaceKind::ExposedField => {
                self.id == name || name.strip_prefix("set_") == Some(self.id.as_str())
            }
            _ => false,
        }
    }

    /// Names under which this interface emits events: `foo` and
    /// `foo_changed` for an exposedField.
    fn matches_event_out(&self, name: &str) -> bool {
        match self.kind {
            InterfaceKind::EventOut => self.id == name,
            InterfaceKind::ExposedField => {
                self.id == name || name.strip_suffix("_changed") == Some(self.id.as_str())
            }
            _ => false,
        }
    }

    /// Whether the two interfaces would claim a common name.
    fn conflicts_with(&self, other: &NodeInterface) -> bool {
        if self.id == other.id {
            return true;
        }
        match (self.kind, other.kind) {
            (InterfaceKind::ExposedField, _) => {
                other.matches_event_in(&format!("set_{}", self.id))
                    || other.matches_event_out(&format!("{}_changed", self.id))
            }
            (_, InterfaceKind::ExposedField) => other.conflicts_with(self),
            _ => false,
        }
    }
}

impl fmt::Display for NodeInterface {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{} {} {}", self.kind, self.field_type, self.id)
    }
}

/// Interfaces of a node type, unique by name and kept in declaration order.
///
/// The position of an interface in the set is its storage slot in node
/// instances.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeInterfaceSet {
    interfaces: IndexMap<String, NodeInterface>,
}

impl NodeInterfaceSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rejects interfaces whose name collides with one already present,
    /// including the implicit `set_` and `_changed` names of exposedFields.
    pub fn add(&mut self, interface: NodeInterface) -> Result<()> {
        if self.interfaces.values().any(|existing| existing.conflicts_with(&interface)) {
            return Err(VrmlError::DuplicateInterface(interface.id));
        }
        self.interfaces.insert(interface.id.clone(), interface);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.interfaces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.interfaces.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &NodeInterface> {
        self.interfaces.values()
    }

    pub fn get(&self, id: &str) -> Option<&NodeInterface> {
        self.interfaces.get(id)
    }

    pub fn get_index(&self, slot: usize) -> Option<&NodeInterface> {
        self.interfaces.get_index(slot).map(|(_, interface)| interface)
    }

    /// Exact identity match: name, kind and type.
    pub fn contains(&self, interface: &NodeInterface) -> bool {
        self.interfaces.get(&interface.id) == Some(interface)
    }

    /// Storage slot of the interface named `id`.
    pub fn slot(&self, id: &str) -> Option<usize> {
        self.interfaces.get_index_of(id)
    }

    /// A field or exposedField named `id`.
    pub fn find_field(&self, id: &str) -> Option<(usize, &NodeInterface)> {
        let (slot, _, interface) = self.interfaces.get_full(id)?;
        interface.kind.has_value().then_some((slot, interface))
    }

    /// The interface receiving events sent to `name`.
    pub fn find_event_in(&self, name: &str) -> Option<(usize, &NodeInterface)> {
        self.interfaces
            .values()
            .enumerate()
            .find(|(_, interface)| interface.matches_event_in(name))
    }

    /// The interface emitting events named `name`.
    pub fn find_event_out(&self, name: &str) -> Option<(usize, &NodeInterface)> {
        self.interfaces
            .values()
            .enumerate()
            .find(|(_, interface)| interface.matches_event_out(name))
    }
}

impl FromIterator<NodeInterface> for NodeInterfaceSet {
    /// Later duplicates are dropped.
    fn from_iter<T: IntoIterator<Item = NodeInterface>>(iter: T) -> Self {
        let mut set = Self::new();
        for interface in iter {
            let _ = set.add(interface);
        }
        set
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn duplicate_names_are_rejected() {
        let mut set = NodeInterfaceSet::new();
        set.add(NodeInterface::field(FieldType::SfFloat, "radius")).unwrap();
        let error = set
            .add(NodeInterface::exposed_field(FieldType::SfFloat, "radius"))
            .unwrap_err();
        assert!(matches!(error, VrmlError::DuplicateInterface(id) if id == "radius"));
        assert_eq!(set.len(), 1);
    }

    #[test]
    fn exposed_field_claims_implicit_event_names() {
        let mut set = NodeInterfaceSet::new();
        set.add(NodeInterface::exposed_field(FieldType::SfVec3f, "translation"))
            .unwrap();
        assert!(set
            .add(NodeInterface::event_in(FieldType::SfVec3f, "set_translation"))
            .is_err());
        assert!(set
            .add(NodeInterface::event_out(FieldType::SfVec3f, "translation_changed"))
            .is_err());
        assert!(set
            .add(NodeInterface::event_out(FieldType::SfVec3f, "translation_moved"))
            .is_ok());
    }

    #[test]
    fn event_lookup_understands_exposed_field_aliases() {
        let set: NodeInterfaceSet = [
            NodeInterface::exposed_field(FieldType::SfFloat, "intensity"),
            NodeInterface::event_in(FieldType::SfFloat, "set_fraction"),
            NodeInterface::event_out(FieldType::SfFloat, "value_changed"),
            NodeInterface::field(FieldType::SfBool, "on"),
        ]
        .into_iter()
        .collect();

        assert_eq!(set.find_event_in("set_intensity").map(|(slot, _)| slot), Some(0));
        assert_eq!(set.find_event_in("intensity").map(|(slot, _)| slot), Some(0));
        assert_eq!(set.find_event_out("intensity_changed").map(|(slot, _)| slot), Some(0));
        assert_eq!(set.find_event_in("set_fraction").map(|(slot, _)| slot), Some(1));
        assert!(set.find_event_in("value_changed").is_none());
        assert!(set.find_event_out("on").is_none());
        assert!(set.find_field("on").is_some());
        assert!(set.find_field("set_fraction").is_none());
    }
}
