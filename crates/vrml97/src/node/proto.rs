//! Node kinds declared in scene text with PROTO and EXTERNPROTO.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::{Rc, Weak};

use log::{debug, warn};

use super::behavior::NodeBehavior;
use super::interface::{NodeInterface, NodeInterfaceSet};
use super::metatype::NodeMetatype;
use super::NodeState;
use crate::engine::arena::NodeId;
use crate::error::{Result, VrmlError};
use crate::field::FieldValue;
use crate::parser::{RawValue, Spanned, Statement};
use crate::scene::{Builder, LoadPurpose, Scene};
use crate::scope::Scope;

/// Default of a PROTO interface.
#[derive(Debug, Clone)]
pub enum ProtoDefault {
    Value(FieldValue),
    /// SFNode/MFNode defaults are built anew for every instance.
    Nodes(Spanned<RawValue>),
}

/// A PROTO declaration: its interface, defaults and body, plus where it was
/// declared.
pub struct ProtoDefinition {
    pub(crate) name: String,
    pub(crate) interfaces: NodeInterfaceSet,
    pub(crate) defaults: HashMap<String, ProtoDefault>,
    pub(crate) body: Rc<[Spanned<Statement>]>,
    /// Scope of the declaration; instance scopes are its children. Weak so
    /// a scope and the PROTOs declared in it do not keep each other alive.
    pub(crate) scope: Weak<Scope>,
    /// Document the declaration came from, for relative URLs.
    pub(crate) url: String,
}

impl ProtoDefinition {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn interfaces(&self) -> &NodeInterfaceSet {
        &self.interfaces
    }

    /// Expand the body for `instance` into a fresh child scope.
    pub(crate) fn expand(&self, scene: &mut Scene, instance: NodeId) -> Result<()> {
        let parent = self.scope.upgrade().ok_or_else(|| {
            VrmlError::InvalidVrml(format!("PROTO {}: its declaring scope is gone", self.name))
        })?;
        if scene.expanding.iter().any(|expanding| std::ptr::eq(*expanding, self)) {
            return Err(VrmlError::InvalidVrml(format!("PROTO {} instantiates itself", self.name)));
        }
        let scope = Scope::new(self.name.clone(), Some(parent));
        debug!("expanding PROTO {} for {instance} in {}", self.name, scope.path());
        scene.expanding.push(self);
        let result = Builder::new(scene, &self.url).expand_proto(self, instance, scope);
        scene.expanding.pop();
        result
    }
}

impl fmt::Debug for ProtoDefinition {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("ProtoDefinition")
            .field("name", &self.name)
            .field("scope", &self.scope.upgrade().map(|scope| scope.path()))
            .field("interfaces", &self.interfaces.len())
            .field("body", &self.body.len())
            .finish()
    }
}

/// State of an expanded PROTO instance.
#[derive(Debug)]
pub struct ProtoInstance {
    pub scope: Rc<Scope>,
    /// Top-level body nodes; the first is the implementation root.
    pub roots: Vec<NodeId>,
    /// PROTO interface -> inner (node, eventIn) pairs it forwards to.
    pub event_links: HashMap<String, Vec<(NodeId, String)>>,
}

impl ProtoInstance {
    pub fn new(scope: Rc<Scope>) -> Self {
        Self {
            scope,
            roots: Vec::new(),
            event_links: HashMap::new(),
        }
    }

    pub fn implementation_root(&self) -> Option<NodeId> {
        self.roots.first().copied()
    }
}

/// Events sent to a PROTO instance go to the inner interfaces mapped with
/// `IS`; with no mapping they are stored like on any other node.
#[derive(Debug, Default)]
pub struct ProtoBehavior;

impl NodeBehavior for ProtoBehavior {
    fn process_event(
        &self,
        scene: &mut Scene,
        node: NodeId,
        interface: &NodeInterface,
        value: FieldValue,
        timestamp: f64,
    ) -> Result<()> {
        let targets = scene.proto_event_targets(node, &interface.id);
        if targets.is_empty() {
            return scene.apply_event(node, interface, value, timestamp);
        }
        scene.store_value(node, &interface.id, value.clone())?;
        for (inner, event_in) in targets {
            scene.deliver_event_in(inner, &event_in, value.clone(), timestamp);
        }
        Ok(())
    }
}

pub struct ProtoMetatype {
    id: String,
    definition: Rc<ProtoDefinition>,
    behavior: Rc<dyn NodeBehavior>,
}

impl ProtoMetatype {
    pub fn new(id: impl Into<String>, definition: Rc<ProtoDefinition>) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            definition,
            behavior: Rc::new(ProtoBehavior),
        })
    }

    pub fn definition(&self) -> &Rc<ProtoDefinition> {
        &self.definition
    }
}

impl NodeMetatype for ProtoMetatype {
    fn id(&self) -> &str {
        &self.id
    }

    fn supported_interfaces(&self) -> &NodeInterfaceSet {
        &self.definition.interfaces
    }

    fn default_value(&self, interface_id: &str) -> Option<FieldValue> {
        match self.definition.defaults.get(interface_id)? {
            ProtoDefault::Value(value) => Some(value.clone()),
            ProtoDefault::Nodes(_) => None,
        }
    }

    fn behavior(&self) -> Rc<dyn NodeBehavior> {
        self.behavior.clone()
    }

    fn expand(&self, scene: &mut Scene, node: NodeId) -> Result<()> {
        self.definition.expand(scene, node)
    }

    fn as_proto(&self) -> Option<&ProtoMetatype> {
        Some(self)
    }
}

#[derive(Debug)]
enum ExternState {
    Unrequested,
    Loading,
    Resolved(Rc<ProtoDefinition>),
    Failed,
}

/// An EXTERNPROTO: its interface is known up front, the implementation
/// arrives asynchronously from the first reachable URL.
///
/// Instances created before that are empty placeholders and are expanded
/// once the implementation is resolved.
pub struct ExternProtoMetatype {
    id: String,
    interfaces: NodeInterfaceSet,
    defaults: HashMap<String, FieldValue>,
    urls: Vec<String>,
    state: RefCell<ExternState>,
    waiting: RefCell<Vec<NodeId>>,
    behavior: Rc<dyn NodeBehavior>,
}

impl ExternProtoMetatype {
    pub fn new(
        id: impl Into<String>,
        interfaces: NodeInterfaceSet,
        defaults: HashMap<String, FieldValue>,
        urls: Vec<String>,
    ) -> Rc<Self> {
        Rc::new(Self {
            id: id.into(),
            interfaces,
            defaults,
            urls,
            state: RefCell::new(ExternState::Unrequested),
            waiting: RefCell::new(Vec::new()),
            behavior: Rc::new(ProtoBehavior),
        })
    }

    pub fn urls(&self) -> &[String] {
        &self.urls
    }

    pub fn is_resolved(&self) -> bool {
        matches!(*self.state.borrow(), ExternState::Resolved(_))
    }

    /// Install the loaded implementation, or give up on it, and expand the
    /// instances that were waiting.
    pub(crate) fn resolve(&self, scene: &mut Scene, definition: std::result::Result<Rc<ProtoDefinition>, String>) {
        let definition = match definition {
            Ok(definition) => match self
                .interfaces
                .iter()
                .find(|interface| !definition.interfaces.contains(interface))
            {
                Some(missing) => Err(format!(
                    "PROTO {} does not declare \"{missing}\"",
                    definition.name
                )),
                None => Ok(definition),
            },
            Err(error) => Err(error),
        };

        let waiting = std::mem::take(&mut *self.waiting.borrow_mut());
        match definition {
            Ok(definition) => {
                debug!("EXTERNPROTO {} resolved to {}", self.id, definition.name);
                *self.state.borrow_mut() = ExternState::Resolved(definition.clone());
                for instance in waiting {
                    if !scene.is_valid(instance) {
                        continue;
                    }
                    if let Err(error) = definition.expand(scene, instance) {
                        scene.warn(format!("EXTERNPROTO {}: {error}", self.id), None);
                    }
                    scene.mark_modified(instance);
                }
            }
            Err(error) => {
                warn!("EXTERNPROTO {} left empty: {error}", self.id);
                scene.warn(format!("EXTERNPROTO {} left empty: {error}", self.id), None);
                *self.state.borrow_mut() = ExternState::Failed;
            }
        }
    }
}

impl NodeMetatype for ExternProtoMetatype {
    fn id(&self) -> &str {
        &self.id
    }

    fn supported_interfaces(&self) -> &NodeInterfaceSet {
        &self.interfaces
    }

    fn default_value(&self, interface_id: &str) -> Option<FieldValue> {
        match &*self.state.borrow() {
            ExternState::Resolved(definition) => match definition.defaults.get(interface_id)? {
                ProtoDefault::Value(value) => Some(value.clone()),
                ProtoDefault::Nodes(_) => None,
            },
            _ => self.defaults.get(interface_id).cloned(),
        }
    }

    fn behavior(&self) -> Rc<dyn NodeBehavior> {
        self.behavior.clone()
    }

    fn expand(&self, scene: &mut Scene, node: NodeId) -> Result<()> {
        let resolved = match &*self.state.borrow() {
            ExternState::Resolved(definition) => Some(definition.clone()),
            _ => None,
        };
        if let Some(definition) = resolved {
            return definition.expand(scene, node);
        }

        let request = matches!(*self.state.borrow(), ExternState::Unrequested);
        if request {
            *self.state.borrow_mut() = ExternState::Loading;
            scene.request_load(LoadPurpose::ExternProto(self.id.clone()), self.urls.clone());
        }
        if matches!(*self.state.borrow(), ExternState::Loading) {
            self.waiting.borrow_mut().push(node);
        }
        Ok(())
    }

    fn as_extern_proto(&self) -> Option<&ExternProtoMetatype> {
        Some(self)
    }
}

impl NodeState {
    pub fn as_proto(&self) -> Option<&ProtoInstance> {
        match self {
            Self::Proto(instance) => Some(instance),
            _ => None,
        }
    }

    pub fn as_proto_mut(&mut self) -> Option<&mut ProtoInstance> {
        match self {
            Self::Proto(instance) => Some(instance),
            _ => None,
        }
    }
}
