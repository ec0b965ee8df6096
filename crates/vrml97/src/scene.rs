//! The node graph of one world and the operations that drive it.
//!
//! A [`Scene`] owns every node in an [`Arena`]; SFNode/MFNode values and
//! routes refer to nodes by [`NodeId`], so cycles in the graph are harmless
//! and teardown is explicit: routes are dropped first, then the nodes.

use std::collections::HashSet;
use std::rc::Rc;

use log::{debug, error, warn};
use smallvec::SmallVec;

mod builder;
mod printer;

pub use builder::{Builder, LoadWarning};

use crate::bounding_volume::BoundingSphere;
use crate::config::BrowserConfig;
use crate::engine::{Arena, BindStack, CascadeReport, Delivery, EventLoop, NodeId, Route, RouteTarget, RoutingTable};
use crate::error::{ResourceError, Result, VrmlError};
use crate::field::{FieldValue, Rotation, Vec3f};
use crate::node::{
    Capability, InterfaceKind, MetatypeRegistry, Node, NodeBehavior, NodeInterface, NodeState, NodeType,
    ProtoDefinition,
};
use crate::parser::{Span, Statement, parse_document};
use crate::scope::Scope;
use crate::viewer::{ObjectHandle, RenderingContext, Viewer};

/// Viewpoint defaults, also used while no Viewpoint is bound.
pub const DEFAULT_VIEWPOINT_POSITION: Vec3f = Vec3f::new(0.0, 0.0, 10.0);
pub const DEFAULT_FIELD_OF_VIEW: f32 = std::f32::consts::FRAC_PI_4;

/// Why the scene wants a resource loaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum LoadPurpose {
    /// Children of an Inline node.
    Inline(NodeId),
    /// Implementation of the EXTERNPROTO metatype with this id.
    ExternProto(String),
}

/// A resource the scene is waiting for. The first URL that loads wins.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    pub purpose: LoadPurpose,
    pub urls: Vec<String>,
}

pub struct Scene {
    url: String,
    config: BrowserConfig,
    registry: MetatypeRegistry,
    arena: Arena<Node>,
    routing: RoutingTable,
    events: EventLoop,
    root_scope: Rc<Scope>,
    /// Top-level nodes in document order.
    roots: Vec<NodeId>,
    /// Top-level PROTO and EXTERNPROTO declarations, kept for printing.
    declarations: Vec<Statement>,
    time_dependent: Vec<NodeId>,
    viewpoints: BindStack,
    uninitialized: Vec<NodeId>,
    load_requests: Vec<LoadRequest>,
    /// Scopes of loaded PROTO libraries, which nothing else owns.
    library_scopes: Vec<Rc<Scope>>,
    warnings: Vec<LoadWarning>,
    /// PROTO definitions whose bodies are being built right now, innermost
    /// last.
    pub(crate) expanding: Vec<*const ProtoDefinition>,
    /// Nodes on the path of the render traversal in progress.
    rendering: Vec<NodeId>,
    /// Nodes on the path of the bounding-sphere computation in progress.
    bounding: Vec<NodeId>,
    now: f64,
}

impl Scene {
    /// An empty world whose root scope knows every metatype in `registry`.
    pub fn new(url: impl Into<String>, registry: MetatypeRegistry, config: BrowserConfig) -> Self {
        let url = url.into();
        let root_scope = Scope::new(url.clone(), None);
        registry.populate_scope(&root_scope);
        Self {
            events: EventLoop::new(&config),
            url,
            config,
            registry,
            arena: Arena::new(),
            routing: RoutingTable::new(),
            root_scope,
            roots: Vec::new(),
            declarations: Vec::new(),
            time_dependent: Vec::new(),
            viewpoints: BindStack::new(),
            uninitialized: Vec::new(),
            load_requests: Vec::new(),
            library_scopes: Vec::new(),
            warnings: Vec::new(),
            expanding: Vec::new(),
            rendering: Vec::new(),
            bounding: Vec::new(),
            now: 0.0,
        }
    }

    /// Parse and build a `.wrl` document.
    ///
    /// Syntax errors fail the load; problems inside single statements are
    /// collected as [`LoadWarning`]s and the offending statement is skipped.
    pub fn load(source: &str, url: &str, registry: MetatypeRegistry, config: BrowserConfig) -> Result<Self> {
        let statements = parse_document(source, url)?;
        let mut scene = Self::new(url, registry, config);
        Builder::new(&mut scene, url).build_document(&statements);
        debug!(
            "loaded {url}: {} nodes, {} routes, {} warnings",
            scene.arena.len(),
            scene.routing.routes().len(),
            scene.warnings.len()
        );
        Ok(scene)
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn config(&self) -> &BrowserConfig {
        &self.config
    }

    pub fn registry(&self) -> &MetatypeRegistry {
        &self.registry
    }

    pub(crate) fn registry_mut(&mut self) -> &mut MetatypeRegistry {
        &mut self.registry
    }

    pub fn root_scope(&self) -> &Rc<Scope> {
        &self.root_scope
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn add_root(&mut self, node: NodeId) -> Result<()> {
        self.node(node)?;
        if !self.roots.contains(&node) {
            self.roots.push(node);
        }
        Ok(())
    }

    pub fn declarations(&self) -> &[Statement] {
        &self.declarations
    }

    pub fn warnings(&self) -> &[LoadWarning] {
        &self.warnings
    }

    pub(crate) fn push_warning(&mut self, warning: LoadWarning) {
        warn!("{warning}");
        self.warnings.push(warning);
    }

    pub(crate) fn warn(&mut self, message: impl Into<String>, span: Option<Span>) {
        self.push_warning(LoadWarning {
            message: message.into(),
            span,
        });
    }

    /// Logical time of the last update or processing pass.
    pub fn now(&self) -> f64 {
        self.now
    }

    pub fn node_count(&self) -> usize {
        self.arena.len()
    }

    pub fn is_valid(&self, id: NodeId) -> bool {
        self.arena.is_valid(id)
    }

    pub fn node(&self, id: NodeId) -> Result<&Node> {
        self.arena.get(id).ok_or(VrmlError::InvalidNode(id))
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> Result<&mut Node> {
        self.arena.get_mut(id).ok_or(VrmlError::InvalidNode(id))
    }

    pub fn nodes(&self) -> impl Iterator<Item = (NodeId, &Node)> {
        self.arena.iter()
    }

    /// A node named with DEF at the top level of the document.
    pub fn find_node(&self, name: &str) -> Option<NodeId> {
        self.root_scope.find_node(name)
    }

    pub fn find_type(&self, id: &str) -> Option<Rc<NodeType>> {
        self.root_scope.find_type(id)
    }

    pub fn behavior(&self, id: NodeId) -> Option<Rc<dyn NodeBehavior>> {
        self.arena.get(id).map(|node| node.node_type().metatype().behavior())
    }

    // Construction

    /// Allocate a node with default values. Call [`Scene::finish_node`] once
    /// its initial field values are set.
    pub fn allocate_node(&mut self, node_type: Rc<NodeType>, scope: Rc<Scope>, name: Option<String>) -> NodeId {
        self.arena.alloc(Node::new(node_type, scope, name))
    }

    /// Complete construction (PROTO instances expand their body here) and
    /// queue the node for initialization.
    pub fn finish_node(&mut self, id: NodeId) -> Result<()> {
        let metatype = self.node(id)?.node_type().metatype().clone();
        metatype.expand(self, id)?;
        self.uninitialized.push(id);
        Ok(())
    }

    /// Create a node of `node_type` in the root scope.
    pub fn create_node(&mut self, node_type: &Rc<NodeType>) -> Result<NodeId> {
        let id = self.allocate_node(node_type.clone(), self.root_scope.clone(), None);
        if let Err(error) = self.finish_node(id) {
            self.free_node(id);
            return Err(error);
        }
        Ok(id)
    }

    /// Create a node of the type declared as `type_id` in the root scope.
    pub fn create_node_of(&mut self, type_id: &str) -> Result<NodeId> {
        let node_type = self
            .find_type(type_id)
            .ok_or_else(|| VrmlError::UnknownNodeType(type_id.to_string()))?;
        self.create_node(&node_type)
    }

    /// Free a node together with the nodes created on its behalf.
    pub fn free_node(&mut self, id: NodeId) {
        let Some(node) = self.arena.get(id) else {
            return;
        };
        if node.initialized {
            let behavior = node.node_type().metatype().behavior();
            behavior.shutdown(self, id, self.now);
        }
        let Some(node) = self.arena.free(id) else {
            return;
        };
        if let Some(name) = node.name() {
            node.scope().undefine_node(name, id);
        }
        self.routing.remove_node(id);
        self.roots.retain(|root| *root != id);
        self.uninitialized.retain(|pending| *pending != id);
        self.time_dependent.retain(|registered| *registered != id);
        self.viewpoints.remove(id);
        for owned in node.owned {
            self.free_node(owned);
        }
    }

    pub(crate) fn set_state(&mut self, id: NodeId, state: NodeState) -> Result<()> {
        self.node_mut(id)?.state = state;
        Ok(())
    }

    /// Nodes of an expanded PROTO instance that events sent to `interface`
    /// are forwarded to.
    pub(crate) fn proto_event_targets(&self, instance: NodeId, interface: &str) -> Vec<(NodeId, String)> {
        self.arena
            .get(instance)
            .and_then(|node| node.state.as_proto())
            .and_then(|proto| proto.event_links.get(interface))
            .cloned()
            .unwrap_or_default()
    }

    /// Follow PROTO instances down to the node that implements them.
    pub fn implementation(&self, id: NodeId) -> NodeId {
        let mut current = id;
        while let Some(root) = self
            .arena
            .get(current)
            .and_then(|node| node.state.as_proto())
            .and_then(|proto| proto.implementation_root())
        {
            current = root;
        }
        current
    }

    pub fn has_capability(&self, id: NodeId, capability: Capability) -> bool {
        self.behavior(self.implementation(id))
            .is_some_and(|behavior| capability.supported_by(behavior.as_ref()))
    }

    // Fields

    /// Set a field or exposedField. Setting an exposedField is the same as
    /// sending it an event at the scene's current time, so it emits
    /// `<name>_changed`.
    pub fn set_field(&mut self, id: NodeId, name: &str, value: FieldValue) -> Result<()> {
        self.set_field_at(id, name, value, self.now)
    }

    /// [`Scene::set_field`] with the exposedField event stamped `timestamp`.
    pub fn set_field_at(&mut self, id: NodeId, name: &str, value: FieldValue, timestamp: f64) -> Result<()> {
        let node_type = self.node(id)?.node_type().clone();
        let Some((slot, interface)) = node_type.interfaces().find_field(name) else {
            return Err(VrmlError::unsupported(node_type.id(), name));
        };
        value.expect_type(interface.field_type)?;
        if interface.kind == InterfaceKind::ExposedField {
            let behavior = node_type.metatype().behavior();
            return behavior.process_event(self, id, interface, value, timestamp);
        }
        let node = self.node_mut(id)?;
        if let Some(stored) = node.slot_mut(slot) {
            stored.assign(value)?;
        }
        node.set_modified(true);
        Ok(())
    }

    /// Current value of a field or exposedField.
    pub fn get_field(&self, id: NodeId, name: &str) -> Result<&FieldValue> {
        let node = self.node(id)?;
        let (slot, _) = node
            .node_type()
            .interfaces()
            .find_field(name)
            .ok_or_else(|| VrmlError::unsupported(node.type_id(), name))?;
        node.values().get(slot).ok_or(VrmlError::InvalidNode(id))
    }

    /// Last value emitted from an eventOut (or current exposedField value).
    pub fn event_value(&self, id: NodeId, event_out: &str) -> Result<&FieldValue> {
        let node = self.node(id)?;
        let (slot, _) = node
            .node_type()
            .interfaces()
            .find_event_out(event_out)
            .ok_or_else(|| VrmlError::unsupported(node.type_id(), event_out))?;
        node.values().get(slot).ok_or(VrmlError::InvalidNode(id))
    }

    /// Store a value without any event semantics.
    pub(crate) fn store_value(&mut self, id: NodeId, interface: &str, value: FieldValue) -> Result<()> {
        let node = self.node_mut(id)?;
        let type_id = node.type_id().to_string();
        if !node.store(interface, value) {
            return Err(VrmlError::unsupported(type_id, interface));
        }
        node.set_modified(true);
        Ok(())
    }

    pub fn mark_modified(&mut self, id: NodeId) {
        if let Some(node) = self.arena.get_mut(id) {
            node.set_modified(true);
        }
    }

    /// Standard handling of an incoming event: store it, and for an
    /// exposedField emit the new value.
    pub fn apply_event(&mut self, id: NodeId, interface: &NodeInterface, value: FieldValue, timestamp: f64) -> Result<()> {
        match interface.kind {
            InterfaceKind::ExposedField => {
                self.store_value(id, &interface.id, value.clone())?;
                self.emit_event(id, &interface.id, value, timestamp)
            }
            InterfaceKind::EventIn => self.store_value(id, &interface.id, value),
            _ => Err(VrmlError::unsupported(self.node(id)?.type_id(), interface.id.clone())),
        }
    }

    // Events and routes

    /// Add a ROUTE. Both ends must exist with exactly the same type. Adding an
    /// existing route again changes nothing and returns `false`.
    pub fn add_route(&mut self, from: NodeId, event_out: &str, to: NodeId, event_in: &str) -> Result<bool> {
        let (event_out, event_in) = self.route_endpoints(from, event_out, to, event_in)?;
        let added = self.routing.add_route(from, &event_out, to, &event_in);
        if added {
            debug!("ROUTE {from}.{event_out} TO {to}.{event_in}");
        }
        Ok(added)
    }

    pub fn delete_route(&mut self, from: NodeId, event_out: &str, to: NodeId, event_in: &str) -> Result<bool> {
        let (event_out, event_in) = self.route_endpoints(from, event_out, to, event_in)?;
        let removed = self.routing.remove_route(from, &event_out, to, &event_in);
        if removed {
            debug!("removed ROUTE {from}.{event_out} TO {to}.{event_in}");
        }
        Ok(removed)
    }

    /// Canonical interface ids of both ends of a route.
    fn route_endpoints(&self, from: NodeId, event_out: &str, to: NodeId, event_in: &str) -> Result<(String, String)> {
        let from_node = self.node(from)?;
        let to_node = self.node(to)?;
        let (_, source) = from_node
            .node_type()
            .interfaces()
            .find_event_out(event_out)
            .ok_or_else(|| VrmlError::unsupported(from_node.type_id(), event_out))?;
        let (_, target) = to_node
            .node_type()
            .interfaces()
            .find_event_in(event_in)
            .ok_or_else(|| VrmlError::unsupported(to_node.type_id(), event_in))?;
        if source.field_type != target.field_type {
            return Err(VrmlError::type_mismatch(target.field_type, source.field_type.name()));
        }
        Ok((source.id.clone(), target.id.clone()))
    }

    pub fn routes(&self) -> &[Route] {
        self.routing.routes()
    }

    pub(crate) fn routing_mut(&mut self) -> &mut RoutingTable {
        &mut self.routing
    }

    /// Emit `value` from an eventOut (or exposedField) of `id`. Routed
    /// deliveries happen in the next [`Scene::process_events`].
    pub fn emit_event(&mut self, id: NodeId, event_out: &str, value: FieldValue, timestamp: f64) -> Result<()> {
        let node = self.node_mut(id)?;
        let node_type = node.node_type().clone();
        let (slot, interface) = node_type
            .interfaces()
            .find_event_out(event_out)
            .ok_or_else(|| VrmlError::unsupported(node_type.id(), event_out))?;
        value.expect_type(interface.field_type)?;
        if let Some(stored) = node.slot_mut(slot) {
            stored.assign(value.clone())?;
        }
        self.events.enqueue(id, &interface.id, value, timestamp);
        Ok(())
    }

    /// Send an event straight to an eventIn of `id`, running its handler now.
    pub fn send_event(&mut self, id: NodeId, event_in: &str, value: FieldValue, timestamp: f64) -> Result<()> {
        let node_type = self.node(id)?.node_type().clone();
        let (_, interface) = node_type
            .interfaces()
            .find_event_in(event_in)
            .ok_or_else(|| VrmlError::unsupported(node_type.id(), event_in))?;
        value.expect_type(interface.field_type)?;
        let behavior = node_type.metatype().behavior();
        behavior.process_event(self, id, interface, value, timestamp)
    }

    /// Route delivery: handler failures are logged, never propagated.
    pub(crate) fn deliver_event_in(&mut self, id: NodeId, event_in: &str, value: FieldValue, timestamp: f64) {
        if let Err(err) = self.send_event(id, event_in, value, timestamp) {
            error!("delivering {event_in} to {id} failed: {err}");
        }
    }

    /// Drain the event queue at `timestamp`, including every cascade the
    /// deliveries cause.
    pub fn process_events(&mut self, timestamp: f64) -> CascadeReport {
        self.now = timestamp;
        self.events.begin_pass(timestamp);
        while let Some(event) = self.events.next() {
            let targets: SmallVec<[RouteTarget; 2]> = self
                .routing
                .get_subscribers(event.source, &event.event_out)
                .iter()
                .cloned()
                .collect();
            for target in targets {
                match target.delivery {
                    Delivery::EventIn => {
                        self.deliver_event_in(target.node, &target.event, event.value.clone(), event.timestamp)
                    }
                    Delivery::Reemit => {
                        if let Err(err) = self.emit_event(target.node, &target.event, event.value.clone(), event.timestamp) {
                            error!("forwarding {} from {} failed: {err}", target.event, target.node);
                        }
                    }
                }
            }
        }
        let report = self.events.end_pass();
        if report.truncated {
            warn!(
                "event pass at t={timestamp} truncated: {} delivered, {} dropped",
                report.delivered, report.dropped
            );
        }
        report
    }

    pub fn pending_events(&self) -> usize {
        self.events.len()
    }

    // Time

    pub fn add_time_dependent(&mut self, id: NodeId) {
        if !self.time_dependent.contains(&id) {
            self.time_dependent.push(id);
        }
    }

    pub fn remove_time_dependent(&mut self, id: NodeId) {
        self.time_dependent.retain(|registered| *registered != id);
    }

    pub fn time_dependent(&self) -> &[NodeId] {
        &self.time_dependent
    }

    // Bindable nodes

    /// The Viewpoint at the top of the bind stack.
    pub fn bound_viewpoint(&self) -> Option<NodeId> {
        self.viewpoints.top()
    }

    pub(crate) fn viewpoints_mut(&mut self) -> &mut BindStack {
        &mut self.viewpoints
    }

    /// Where the user is: the bound Viewpoint's position, or the default
    /// Viewpoint's when none is bound.
    pub fn viewer_position(&self) -> Vec3f {
        self.bound_viewpoint()
            .and_then(|viewpoint| self.node(viewpoint).ok())
            .map_or(DEFAULT_VIEWPOINT_POSITION, |viewpoint| {
                viewpoint.vec3f_or("position", DEFAULT_VIEWPOINT_POSITION)
            })
    }

    /// Run `initialize` on every finished node that has not had it yet.
    pub fn initialize_pending(&mut self, timestamp: f64) {
        while !self.uninitialized.is_empty() {
            for id in std::mem::take(&mut self.uninitialized) {
                let Some(node) = self.arena.get_mut(id) else {
                    continue;
                };
                if node.initialized {
                    continue;
                }
                node.initialized = true;
                let behavior = node.node_type().metatype().behavior();
                if let Err(err) = behavior.initialize(self, id, timestamp) {
                    self.warn(format!("initializing {id} failed: {err}"), None);
                }
            }
        }
    }

    /// One simulation step: initialize new nodes, update time-dependent
    /// nodes, then deliver every event of `time`.
    pub fn update(&mut self, time: f64) -> CascadeReport {
        self.now = time;
        self.initialize_pending(time);
        for id in self.time_dependent.clone() {
            let Some(behavior) = self.behavior(id) else {
                continue;
            };
            if let Some(time_dependent) = behavior.as_time_dependent() {
                if let Err(err) = time_dependent.update(self, id, time) {
                    error!("updating {id} failed: {err}");
                }
            }
        }
        self.process_events(time)
    }

    /// Pointer input on geometry rendered while `node` was sensitive: the
    /// pointing-device sensors among its children are activated.
    pub fn sensitive_event(&mut self, node: NodeId, timestamp: f64, over: bool, active: bool, hit_point: Vec3f) -> Result<()> {
        let group = self.implementation(node);
        let children = self.node(group)?.node_refs("children");
        for child in children {
            let child = self.implementation(child);
            let Some(behavior) = self.behavior(child) else {
                continue;
            };
            if let Some(sensor) = behavior.as_pointing_device_sensor() {
                sensor.activate(self, child, timestamp, over, active, hit_point)?;
            }
        }
        Ok(())
    }

    // Resources

    pub(crate) fn request_load(&mut self, purpose: LoadPurpose, urls: Vec<String>) {
        debug!("requesting {urls:?} for {purpose:?}");
        self.load_requests.push(LoadRequest { purpose, urls });
    }

    pub(crate) fn keep_scope(&mut self, scope: Rc<Scope>) {
        self.library_scopes.push(scope);
    }

    pub fn take_load_requests(&mut self) -> Vec<LoadRequest> {
        std::mem::take(&mut self.load_requests)
    }

    /// Hand a finished load to whoever asked for it. `result` carries the
    /// URL that was loaded and its text.
    pub fn complete_load(&mut self, purpose: &LoadPurpose, result: std::result::Result<(String, String), ResourceError>) {
        match purpose {
            LoadPurpose::Inline(inline) => builder::complete_inline(self, *inline, result),
            LoadPurpose::ExternProto(metatype_id) => builder::complete_extern_proto(self, metatype_id, result),
        }
    }

    // Rendering

    /// Whether any node changed since the last render.
    pub fn is_modified(&self) -> bool {
        self.arena.iter().any(|(_, node)| node.is_modified())
    }

    /// `id` or anything reachable from its node-valued fields was modified.
    pub fn is_modified_deep(&self, id: NodeId) -> bool {
        let mut visited = HashSet::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            if !visited.insert(current) {
                continue;
            }
            let Some(node) = self.arena.get(current) else {
                continue;
            };
            if node.is_modified() {
                return true;
            }
            stack.extend(node.children());
            if let NodeState::Inline(inline) = &node.state {
                stack.extend(inline.children.iter().copied());
            }
            if let Some(proto) = node.state.as_proto() {
                stack.extend(proto.roots.iter().copied());
            }
        }
        false
    }

    /// Render the root nodes in document order, then clear every `modified`
    /// flag. Cached bounds are dropped with the flags they depended on.
    pub fn render(&mut self, viewer: &mut dyn Viewer) {
        let context = RenderingContext::default();
        if let Some(viewpoint) = self.bound_viewpoint().and_then(|id| self.arena.get(id)) {
            viewer.set_viewpoint(
                viewpoint.vec3f_or("position", DEFAULT_VIEWPOINT_POSITION),
                viewpoint.rotation_or("orientation", Rotation::default()),
                viewpoint.f32_or("fieldOfView", DEFAULT_FIELD_OF_VIEW),
            );
        }
        for root in self.roots.clone() {
            if let Err(err) = self.render_node(root, viewer, &context) {
                error!("rendering {root} failed: {err}");
            }
        }
        let changed = self.is_modified();
        for id in self.arena.ids() {
            if let Some(node) = self.arena.get_mut(id) {
                node.set_modified(false);
                if changed {
                    node.bounds = None;
                }
            }
        }
    }

    /// Render `id` below `context`. A node that is already being rendered
    /// further up (a group among its own descendants) is skipped.
    pub fn render_node(&mut self, id: NodeId, viewer: &mut dyn Viewer, context: &RenderingContext) -> Result<()> {
        let id = self.implementation(id);
        let Some(behavior) = self.behavior(id) else {
            return Ok(());
        };
        let Some(renderable) = behavior.as_renderable() else {
            return Ok(());
        };
        if self.rendering.contains(&id) {
            warn!("{id} contains itself; not rendering it again");
            return Ok(());
        }
        self.rendering.push(id);
        let result = renderable.render(self, id, viewer, context);
        self.rendering.pop();
        result
    }

    /// Insert the geometry of `id`, reusing the viewer object from the last
    /// frame while the geometry is unchanged.
    pub fn render_geometry(&mut self, id: NodeId, viewer: &mut dyn Viewer) -> Option<ObjectHandle> {
        let id = self.implementation(id);
        let behavior = self.behavior(id)?;
        let geometry = behavior.as_geometry()?;
        let modified = self.is_modified_deep(id);
        let previous = self.arena.get(id)?.viewer_object;
        match previous {
            Some(object) if !modified => {
                viewer.insert_reference(object);
                Some(object)
            }
            _ => {
                if let Some(object) = previous {
                    viewer.remove_object(object);
                }
                let object = geometry.insert_geometry(self, self.arena.get(id)?, viewer);
                if let Some(node) = self.arena.get_mut(id) {
                    node.viewer_object = Some(object);
                }
                Some(object)
            }
        }
    }

    /// Bounding sphere of the subgraph at `id`, cached until it changes.
    pub fn bounding_sphere(&mut self, id: NodeId) -> BoundingSphere {
        let id = self.implementation(id);
        let modified = self.is_modified_deep(id);
        if let Some(bounds) = self.arena.get(id).and_then(|node| node.bounds) {
            if !modified {
                return bounds;
            }
        }
        let Some(behavior) = self.behavior(id) else {
            return BoundingSphere::EMPTY;
        };
        if self.bounding.contains(&id) {
            return BoundingSphere::EMPTY;
        }
        self.bounding.push(id);
        let bounds = behavior
            .as_bounded_volume()
            .map_or(BoundingSphere::EMPTY, |volume| volume.bounding_sphere(self, id));
        self.bounding.pop();
        if let Some(node) = self.arena.get_mut(id) {
            node.bounds = Some(bounds);
        }
        bounds
    }

    /// Union of the bounding spheres of `nodes`.
    pub fn bounding_sphere_of(&mut self, nodes: &[NodeId]) -> BoundingSphere {
        let mut bounds = BoundingSphere::EMPTY;
        for node in nodes {
            bounds.extend(&self.bounding_sphere(*node));
        }
        bounds
    }

    // Teardown

    /// Shut every node down, drop all routes and pending events, then free
    /// the nodes.
    pub fn shutdown(&mut self) {
        let now = self.now;
        for id in self.arena.ids() {
            let Some(node) = self.arena.get_mut(id) else {
                continue;
            };
            if !node.initialized {
                continue;
            }
            node.initialized = false;
            let behavior = node.node_type().metatype().behavior();
            behavior.shutdown(self, id, now);
        }
        self.routing.clear();
        self.events.clear();
        self.time_dependent.clear();
        self.viewpoints.clear();
        self.uninitialized.clear();
        self.load_requests.clear();
        self.roots.clear();
        self.arena.clear();
        self.library_scopes.clear();
    }

    /// The world as VRML97 text.
    pub fn write_vrml(&self) -> String {
        printer::write_scene(self)
    }
}

impl Drop for Scene {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{Color, FieldType};
    use crate::node::BuiltinMetatype;
    use crate::viewer::{RecordingViewer, ViewerCall};

    fn empty_scene() -> Scene {
        Scene::new("test.wrl", MetatypeRegistry::with_builtins(), BrowserConfig::default())
    }

    fn load(source: &str) -> Scene {
        Scene::load(source, "test.wrl", MetatypeRegistry::with_builtins(), BrowserConfig::default()).unwrap()
    }

    /// Copies every `in` event to `out`.
    struct Relay;

    impl NodeBehavior for Relay {
        fn process_event(
            &self,
            scene: &mut Scene,
            node: NodeId,
            interface: &NodeInterface,
            value: FieldValue,
            timestamp: f64,
        ) -> Result<()> {
            scene.apply_event(node, interface, value.clone(), timestamp)?;
            scene.emit_event(node, "out", value, timestamp)
        }
    }

    fn relay_scene(config: BrowserConfig) -> (Scene, Rc<NodeType>) {
        let mut registry = MetatypeRegistry::with_builtins();
        let relay = BuiltinMetatype::builder("Relay")
            .event_in("in", FieldType::SfFloat)
            .event_out("out", FieldType::SfFloat)
            .behavior(Relay)
            .build();
        registry.register(relay);
        let scene = Scene::new("test.wrl", registry, config);
        let relay_type = scene.find_type("Relay").unwrap();
        (scene, relay_type)
    }

    #[test]
    fn material_fields_are_typed() {
        let mut scene = empty_scene();
        let metatype = scene.registry().find("Material").unwrap();
        let material_type = NodeType::create(
            metatype,
            "Material",
            &[
                NodeInterface::exposed_field(FieldType::SfFloat, "ambientIntensity"),
                NodeInterface::exposed_field(FieldType::SfColor, "diffuseColor"),
            ],
        )
        .unwrap();
        let material = scene.create_node(&material_type).unwrap();

        assert_eq!(
            scene.get_field(material, "ambientIntensity").unwrap(),
            &FieldValue::SfFloat(0.2)
        );
        scene.set_field(material, "ambientIntensity", FieldValue::SfFloat(0.5)).unwrap();
        assert_eq!(
            scene.get_field(material, "ambientIntensity").unwrap(),
            &FieldValue::SfFloat(0.5)
        );
        let error = scene
            .set_field(material, "ambientIntensity", FieldValue::SfString("red".into()))
            .unwrap_err();
        assert!(matches!(error, VrmlError::TypeMismatch { expected: FieldType::SfFloat, .. }));
        assert!(matches!(
            scene.set_field(material, "shininess", FieldValue::SfFloat(1.0)),
            Err(VrmlError::UnsupportedInterface { .. })
        ));
        assert_eq!(
            scene.get_field(material, "diffuseColor").unwrap(),
            &FieldValue::SfColor(Color::new(0.8, 0.8, 0.8))
        );
    }

    #[test]
    fn set_field_rejects_every_wrong_type() {
        let mut scene = empty_scene();
        let transform = scene.create_node_of("Transform").unwrap();
        let declared = scene.get_field(transform, "translation").unwrap().field_type();
        for field_type in FieldType::ALL {
            if field_type == declared {
                continue;
            }
            let result = scene.set_field(transform, "translation", FieldValue::default_for(field_type));
            assert!(matches!(result, Err(VrmlError::TypeMismatch { .. })), "{field_type} was accepted");
        }
    }

    #[test]
    fn routed_event_reaches_the_target() {
        let (mut scene, relay_type) = relay_scene(BrowserConfig::default());
        let a = scene.create_node(&relay_type).unwrap();
        let b = scene.create_node(&relay_type).unwrap();
        scene.render(&mut RecordingViewer::new());
        assert!(!scene.node(b).unwrap().is_modified());

        assert!(scene.add_route(a, "out", b, "in").unwrap());
        scene.emit_event(a, "out", FieldValue::SfFloat(3.14), 1.0).unwrap();
        let report = scene.process_events(1.0);

        assert_eq!(scene.node(b).unwrap().get("in"), Some(&FieldValue::SfFloat(3.14)));
        assert!(scene.node(b).unwrap().is_modified());
        assert_eq!(report.delivered, 2);
    }

    #[test]
    fn duplicate_routes_deliver_once() {
        let (mut scene, relay_type) = relay_scene(BrowserConfig::default());
        let a = scene.create_node(&relay_type).unwrap();
        let b = scene.create_node(&relay_type).unwrap();
        let c = scene.create_node(&relay_type).unwrap();
        assert!(scene.add_route(a, "out", b, "in").unwrap());
        assert!(!scene.add_route(a, "out", b, "in").unwrap());
        scene.add_route(b, "out", c, "in").unwrap();

        scene.emit_event(a, "out", FieldValue::SfFloat(0.5), 1.0).unwrap();
        let report = scene.process_events(1.0);
        // a.out, b.out, c.out
        assert_eq!(report.delivered, 3);
    }

    #[test]
    fn cascade_finishes_within_the_timestamp_in_order() {
        let (mut scene, relay_type) = relay_scene(BrowserConfig::default());
        let a = scene.create_node(&relay_type).unwrap();
        let b = scene.create_node(&relay_type).unwrap();
        let c = scene.create_node(&relay_type).unwrap();
        scene.add_route(a, "out", b, "in").unwrap();
        scene.add_route(b, "out", c, "in").unwrap();

        scene.emit_event(a, "out", FieldValue::SfFloat(1.0), 1.0).unwrap();
        scene.process_events(1.0);
        assert_eq!(scene.node(c).unwrap().get("in"), Some(&FieldValue::SfFloat(1.0)));
        assert_eq!(scene.pending_events(), 0);

        // Each hop is queued behind the event that caused it.
        scene.emit_event(a, "out", FieldValue::SfFloat(2.0), 2.0).unwrap();
        scene.events.begin_pass(2.0);
        let first = scene.events.next().unwrap();
        assert_eq!(first.source, a);
        scene.deliver_event_in(b, "in", first.value, 2.0);
        assert_eq!(scene.node(c).unwrap().get("in"), Some(&FieldValue::SfFloat(1.0)));
        let second = scene.events.next().unwrap();
        assert_eq!((second.source, second.depth), (b, 1));
        scene.events.end_pass();
    }

    #[test]
    fn route_cycles_are_cut_at_the_depth_bound() {
        let config = BrowserConfig {
            max_cascade_depth: 16,
            ..BrowserConfig::default()
        };
        let (mut scene, relay_type) = relay_scene(config);
        let a = scene.create_node(&relay_type).unwrap();
        let b = scene.create_node(&relay_type).unwrap();
        scene.add_route(a, "out", b, "in").unwrap();
        scene.add_route(b, "out", a, "in").unwrap();

        scene.emit_event(a, "out", FieldValue::SfFloat(1.0), 1.0).unwrap();
        let report = scene.process_events(1.0);
        assert!(report.truncated);
        assert_eq!(report.delivered, 17);
        assert_eq!(scene.pending_events(), 0);

        // The next timestamp starts fresh.
        scene.emit_event(a, "out", FieldValue::SfFloat(2.0), 2.0).unwrap();
        let report = scene.process_events(2.0);
        assert_eq!(report.delivered, 17);
        assert_eq!(scene.node(b).unwrap().get("in"), Some(&FieldValue::SfFloat(2.0)));
    }

    #[test]
    fn one_event_per_eventout_breaks_cycles_early() {
        let config = BrowserConfig {
            one_event_per_eventout: true,
            ..BrowserConfig::default()
        };
        let (mut scene, relay_type) = relay_scene(config);
        let a = scene.create_node(&relay_type).unwrap();
        let b = scene.create_node(&relay_type).unwrap();
        scene.add_route(a, "out", b, "in").unwrap();
        scene.add_route(b, "out", a, "in").unwrap();

        scene.emit_event(a, "out", FieldValue::SfFloat(1.0), 1.0).unwrap();
        let report = scene.process_events(1.0);
        assert_eq!(report.delivered, 2);
        assert!(!report.truncated);
        assert_eq!(report.dropped, 1);
    }

    #[test]
    fn route_endpoints_are_checked() {
        let (mut scene, relay_type) = relay_scene(BrowserConfig::default());
        let a = scene.create_node(&relay_type).unwrap();
        let transform = scene.create_node_of("Transform").unwrap();
        assert!(matches!(
            scene.add_route(a, "out", transform, "set_translation"),
            Err(VrmlError::TypeMismatch { .. })
        ));
        assert!(matches!(
            scene.add_route(a, "nowhere", transform, "set_translation"),
            Err(VrmlError::UnsupportedInterface { .. })
        ));
        assert!(scene.routes().is_empty());
    }

    #[test]
    fn deleted_routes_stop_delivering() {
        let (mut scene, relay_type) = relay_scene(BrowserConfig::default());
        let a = scene.create_node(&relay_type).unwrap();
        let b = scene.create_node(&relay_type).unwrap();
        scene.add_route(a, "out", b, "in").unwrap();
        assert!(scene.delete_route(a, "out", b, "in").unwrap());
        assert!(!scene.delete_route(a, "out", b, "in").unwrap());
        scene.emit_event(a, "out", FieldValue::SfFloat(9.0), 1.0).unwrap();
        scene.process_events(1.0);
        assert_eq!(scene.node(b).unwrap().get("in"), Some(&FieldValue::SfFloat(0.0)));
    }

    #[test]
    fn exposed_field_aliases_route() {
        let mut scene = load(
            "#VRML V2.0 utf8\n\
             DEF A Transform { translation 1 2 3 }\n\
             DEF B Transform { }\n\
             ROUTE A.translation_changed TO B.set_translation",
        );
        let a = scene.find_node("A").unwrap();
        let b = scene.find_node("B").unwrap();
        assert_eq!(scene.routes().len(), 1);
        assert_eq!(scene.routes()[0].event_out, "translation");

        scene
            .set_field(a, "translation", FieldValue::SfVec3f(Vec3f::new(4.0, 5.0, 6.0)))
            .unwrap();
        scene.process_events(0.5);
        assert_eq!(
            scene.get_field(b, "translation").unwrap(),
            &FieldValue::SfVec3f(Vec3f::new(4.0, 5.0, 6.0))
        );
    }

    /// Records the timestamp of the last `level` event in `at`.
    struct Stamp;

    impl NodeBehavior for Stamp {
        fn process_event(
            &self,
            scene: &mut Scene,
            node: NodeId,
            interface: &NodeInterface,
            value: FieldValue,
            timestamp: f64,
        ) -> Result<()> {
            scene.apply_event(node, interface, value, timestamp)?;
            scene.store_value(node, "at", FieldValue::SfTime(timestamp))
        }
    }

    #[test]
    fn exposed_field_events_carry_the_given_time() {
        let mut registry = MetatypeRegistry::with_builtins();
        let stamp = BuiltinMetatype::builder("Stamp")
            .exposed_field("level", FieldValue::SfFloat(0.0))
            .field("at", FieldValue::SfTime(-1.0))
            .behavior(Stamp)
            .build();
        registry.register(stamp);
        let mut scene = Scene::new("test.wrl", registry, BrowserConfig::default());
        let stamp_type = scene.find_type("Stamp").unwrap();
        let a = scene.create_node(&stamp_type).unwrap();
        let b = scene.create_node(&stamp_type).unwrap();
        scene.add_route(a, "level_changed", b, "set_level").unwrap();

        scene.set_field_at(a, "level", FieldValue::SfFloat(0.5), 1.0).unwrap();
        assert_eq!(scene.get_field(a, "at").unwrap(), &FieldValue::SfTime(1.0));
        scene.process_events(1.0);
        assert_eq!(scene.get_field(b, "at").unwrap(), &FieldValue::SfTime(1.0));

        // Set between passes: handled when the next pass runs, at its time.
        scene.set_field(a, "level", FieldValue::SfFloat(0.75)).unwrap();
        let report = scene.process_events(2.0);
        assert_eq!(report.delivered, 2);
        assert_eq!(scene.get_field(b, "level").unwrap(), &FieldValue::SfFloat(0.75));
        assert_eq!(scene.get_field(b, "at").unwrap(), &FieldValue::SfTime(2.0));
    }

    #[test]
    fn stale_ids_are_rejected() {
        let mut scene = empty_scene();
        let group = scene.create_node_of("Group").unwrap();
        scene.free_node(group);
        assert!(matches!(scene.node(group), Err(VrmlError::InvalidNode(id)) if id == group));
        assert!(scene.set_field(group, "children", FieldValue::MfNode(vec![])).is_err());
    }

    #[test]
    fn unchanged_geometry_is_reinserted_by_reference() {
        let mut scene = load("#VRML V2.0 utf8\nShape { geometry DEF Ball Sphere { radius 2 } }");
        let mut viewer = RecordingViewer::new();
        scene.render(&mut viewer);
        let first = viewer.take_calls();
        assert!(first
            .iter()
            .any(|call| matches!(call, ViewerCall::InsertSphere { radius, .. } if *radius == 2.0)));

        scene.render(&mut viewer);
        let second = viewer.take_calls();
        assert!(!second.iter().any(ViewerCall::is_geometry_insert));
        assert!(second.iter().any(|call| matches!(call, ViewerCall::InsertReference { .. })));

        let ball = scene.find_node("Ball").unwrap();
        scene.set_field(ball, "radius", FieldValue::SfFloat(3.0)).unwrap();
        scene.render(&mut viewer);
        let third = viewer.take_calls();
        assert!(third.iter().any(|call| matches!(call, ViewerCall::RemoveObject { .. })));
        assert!(third.iter().any(|call| matches!(call, ViewerCall::InsertSphere { radius, .. } if *radius == 3.0)));
    }

    #[test]
    fn bounding_spheres_follow_changes() {
        let mut scene = load(
            "#VRML V2.0 utf8\n\
             DEF T Transform { translation 10 0 0 children Shape { geometry DEF Ball Sphere { radius 2 } } }",
        );
        let root = scene.find_node("T").unwrap();
        let bounds = scene.bounding_sphere(root);
        assert_eq!(bounds.center(), Vec3f::new(10.0, 0.0, 0.0));
        assert_eq!(bounds.radius(), 2.0);

        scene.render(&mut RecordingViewer::new());
        let ball = scene.find_node("Ball").unwrap();
        scene.set_field(ball, "radius", FieldValue::SfFloat(5.0)).unwrap();
        assert_eq!(scene.bounding_sphere(root).radius(), 5.0);

        // A change rendered before anyone asked for the bounds.
        scene.set_field(ball, "radius", FieldValue::SfFloat(1.0)).unwrap();
        scene.render(&mut RecordingViewer::new());
        assert_eq!(scene.bounding_sphere(root).radius(), 1.0);
    }

    #[test]
    fn shutdown_drops_routes_then_nodes() {
        let mut scene = load(
            "#VRML V2.0 utf8\n\
             DEF Clock TimeSensor { loop TRUE }\n\
             DEF Fader ScalarInterpolator { key [0 1] keyValue [0 1] }\n\
             ROUTE Clock.fraction_changed TO Fader.set_fraction",
        );
        scene.update(0.0);
        assert_eq!(scene.time_dependent().len(), 1);
        scene.shutdown();
        assert!(scene.routes().is_empty());
        assert_eq!(scene.node_count(), 0);
        assert!(scene.time_dependent().is_empty());
    }
}
