use std::rc::Rc;

use indexmap::IndexMap;

use super::metatype::{NodeMetatype, NodeType};
use crate::nodes;
use crate::scope::Scope;

/// Metatypes known to one browser, keyed by id.
///
/// Built once with the built-in kinds; every scene works on its own copy so
/// PROTOs declared by one world never leak into the next.
#[derive(Clone, Default)]
pub struct MetatypeRegistry {
    metatypes: IndexMap<String, Rc<dyn NodeMetatype>>,
}

impl MetatypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        for metatype in nodes::builtin_metatypes() {
            registry.register(metatype);
        }
        registry
    }

    /// Register `metatype` unless its id is taken. Returns the registered
    /// metatype for that id and whether `metatype` was inserted.
    pub fn register(&mut self, metatype: Rc<dyn NodeMetatype>) -> (Rc<dyn NodeMetatype>, bool) {
        if let Some(existing) = self.metatypes.get(metatype.id()) {
            return (existing.clone(), false);
        }
        self.metatypes.insert(metatype.id().to_string(), metatype.clone());
        (metatype, true)
    }

    pub fn find(&self, id: &str) -> Option<Rc<dyn NodeMetatype>> {
        self.metatypes.get(id).cloned()
    }

    pub fn ids(&self) -> impl Iterator<Item = &str> {
        self.metatypes.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.metatypes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.metatypes.is_empty()
    }

    /// Declare a full-interface type for every built-in kind in `scope`.
    pub fn populate_scope(&self, scope: &Scope) {
        for metatype in self.metatypes.values() {
            if metatype.as_proto().is_some() || metatype.as_extern_proto().is_some() {
                continue;
            }
            scope.add_type(NodeType::with_all_interfaces(metatype.clone()));
        }
    }
}
