//! Namespaces for node types and DEF names.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::engine::arena::NodeId;
use crate::node::NodeType;

/// A namespace: the node types declared in it and the nodes named with `DEF`.
///
/// The document root scope has no parent. Every PROTO instance expands its
/// body into a child scope of the scope the PROTO was declared in, so type
/// lookup sees outer declarations while names stay local to the instance.
pub struct Scope {
    id: String,
    parent: Option<Rc<Scope>>,
    /// Declaration order.
    types: RefCell<Vec<Rc<NodeType>>>,
    named_nodes: RefCell<HashMap<String, NodeId>>,
}

impl Scope {
    pub fn new(id: impl Into<String>, parent: Option<Rc<Scope>>) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            parent,
            types: RefCell::new(Vec::new()),
            named_nodes: RefCell::new(HashMap::new()),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn parent(&self) -> Option<&Rc<Scope>> {
        self.parent.as_ref()
    }

    /// Add `node_type` unless a type with the same id is already declared in
    /// this scope. Returns the type that is now visible under that id and
    /// whether `node_type` was inserted.
    pub fn add_type(&self, node_type: Rc<NodeType>) -> (Rc<NodeType>, bool) {
        let mut types = self.types.borrow_mut();
        if let Some(existing) = types.iter().find(|existing| existing.id() == node_type.id()) {
            return (existing.clone(), false);
        }
        types.push(node_type.clone());
        (node_type, true)
    }

    /// Find a type declared here or in an enclosing scope; the innermost
    /// declaration wins.
    pub fn find_type(&self, id: &str) -> Option<Rc<NodeType>> {
        let local = self
            .types
            .borrow()
            .iter()
            .find(|node_type| node_type.id() == id)
            .cloned();
        local.or_else(|| self.parent.as_ref().and_then(|parent| parent.find_type(id)))
    }

    /// The first type declared in this scope.
    pub fn first_type(&self) -> Option<Rc<NodeType>> {
        self.types.borrow().first().cloned()
    }

    pub fn types(&self) -> Vec<Rc<NodeType>> {
        self.types.borrow().clone()
    }

    /// Look up a DEF name. Enclosing scopes are not searched.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.named_nodes.borrow().get(name).copied()
    }

    /// Bind `name` to `node`, replacing an earlier binding.
    pub fn define_node(&self, name: impl Into<String>, node: NodeId) -> Option<NodeId> {
        self.named_nodes.borrow_mut().insert(name.into(), node)
    }

    /// Remove the binding of `name` if it still refers to `node`.
    pub fn undefine_node(&self, name: &str, node: NodeId) {
        let mut named_nodes = self.named_nodes.borrow_mut();
        if named_nodes.get(name) == Some(&node) {
            named_nodes.remove(name);
        }
    }

    /// `#`-joined scope ids from the root down to this scope.
    pub fn path(&self) -> String {
        match &self.parent {
            Some(parent) => format!("{}#{}", parent.path(), self.id),
            None => self.id.clone(),
        }
    }

    /// Id of the outermost scope, which is the URL of the document.
    pub fn document_url(&self) -> &str {
        match &self.parent {
            Some(parent) => parent.document_url(),
            None => &self.id,
        }
    }

    /// Whether `self` is `other` or nested inside it.
    pub fn is_within(&self, other: &Scope) -> bool {
        std::ptr::eq(self, other) || self.parent.as_ref().is_some_and(|parent| parent.is_within(other))
    }
}

impl fmt::Debug for Scope {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("Scope")
            .field("path", &self.path())
            .field("types", &self.types.borrow().len())
            .field("named_nodes", &self.named_nodes.borrow().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{FieldType, FieldValue};
    use crate::node::{BuiltinMetatype, NodeInterface};

    fn foo_type(id: &str) -> Rc<NodeType> {
        let metatype = BuiltinMetatype::builder(id)
            .exposed_field("value", FieldValue::SfFloat(0.0))
            .build();
        NodeType::create(
            metatype,
            id,
            &[NodeInterface::exposed_field(FieldType::SfFloat, "value")],
        )
        .unwrap()
    }

    #[test]
    fn proto_local_types_are_invisible_outside() {
        let root = Scope::new("world.wrl", None);
        let child = Scope::new("MyProto", Some(root.clone()));
        let foo = foo_type("Foo");
        let (added, was_added) = child.add_type(foo.clone());
        assert!(was_added);
        assert!(Rc::ptr_eq(&added, &foo));

        assert!(root.find_type("Foo").is_none());
        assert!(Rc::ptr_eq(&child.find_type("Foo").unwrap(), &foo));
        assert_eq!(child.path(), "world.wrl#MyProto");
    }

    #[test]
    fn inner_declarations_shadow_outer_ones() {
        let parent = Scope::new("P", None);
        let child = Scope::new("C", Some(parent.clone()));
        let outer_foo = foo_type("Foo");
        let inner_foo = foo_type("Foo");
        let bar = foo_type("Bar");
        parent.add_type(outer_foo.clone());
        parent.add_type(bar.clone());
        child.add_type(inner_foo.clone());

        assert!(Rc::ptr_eq(&child.find_type("Foo").unwrap(), &inner_foo));
        assert!(Rc::ptr_eq(&child.find_type("Bar").unwrap(), &bar));
        assert!(child.find_type("Baz").is_none());
    }

    #[test]
    fn redeclaration_in_the_same_scope_keeps_the_first() {
        let scope = Scope::new("S", None);
        let first = foo_type("Foo");
        scope.add_type(first.clone());
        let (winner, added) = scope.add_type(foo_type("Foo"));
        assert!(!added);
        assert!(Rc::ptr_eq(&winner, &first));
        assert!(Rc::ptr_eq(&scope.first_type().unwrap(), &first));
    }

    #[test]
    fn node_names_do_not_leak_between_scopes() {
        let parent = Scope::new("P", None);
        let child = Scope::new("C", Some(parent.clone()));
        let node = NodeId { index: 3, generation: 0 };
        parent.define_node("Lamp", node);
        assert_eq!(parent.find_node("Lamp"), Some(node));
        assert_eq!(child.find_node("Lamp"), None);

        parent.undefine_node("Lamp", NodeId { index: 4, generation: 0 });
        assert_eq!(parent.find_node("Lamp"), Some(node));
        parent.undefine_node("Lamp", node);
        assert_eq!(parent.find_node("Lamp"), None);
    }
}
