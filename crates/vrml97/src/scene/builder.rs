use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use log::{debug, warn};

use super::Scene;
use crate::engine::NodeId;
use crate::error::{ResourceError, Result, VrmlError};
use crate::field::{FieldType, FieldValue, decode_value};
use crate::node::{
    ExternProtoMetatype, InterfaceKind, NodeInterface, NodeInterfaceSet, NodeMetatype, NodeState, NodeType,
    ProtoDefault, ProtoDefinition, ProtoInstance, ProtoMetatype,
};
use crate::nodes::InlineState;
use crate::parser::{
    BodyElement, ExternProtoDeclaration, InterfaceDeclaration, ListItem, NodeStatement, ProtoDeclaration, RawValue,
    RouteStatement, Span, Spanned, Statement, parse_document,
};
use crate::resource::resolve_url;
use crate::scope::Scope;

/// A problem that made the builder skip part of a document.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadWarning {
    pub message: String,
    pub span: Option<Span>,
}

impl fmt::Display for LoadWarning {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match &self.span {
            Some(span) => write!(f, "{} (at {}..{})", self.message, span.start, span.end),
            None => f.write_str(&self.message),
        }
    }
}

/// The PROTO instance whose body is being built.
struct ProtoContext {
    instance: NodeId,
    name: String,
    interfaces: NodeInterfaceSet,
    defaults: HashMap<String, ProtoDefault>,
}

/// Turns parsed statements into nodes of a [`Scene`].
///
/// One builder handles one scope: a document, a PROTO body or Inline content.
/// ROUTEs are collected while building and added once every node of the
/// scope exists, so they may refer to nodes defined after them.
pub struct Builder<'s> {
    scene: &'s mut Scene,
    url: String,
    allocated: Vec<NodeId>,
    routes: Vec<RouteStatement>,
    proto: Option<ProtoContext>,
}

impl<'s> Builder<'s> {
    pub fn new(scene: &'s mut Scene, url: &str) -> Self {
        Self {
            scene,
            url: url.to_string(),
            allocated: Vec::new(),
            routes: Vec::new(),
            proto: None,
        }
    }

    /// Build a whole document into the scene's root scope.
    pub fn build_document(mut self, statements: &[Spanned<Statement>]) {
        let scope = self.scene.root_scope.clone();
        let roots = self.build_statements(statements, &scope);
        self.scene.roots.extend(roots);
        self.scene.declarations.extend(
            statements
                .iter()
                .filter(|statement| matches!(statement.node, Statement::Proto(_) | Statement::ExternProto(_)))
                .map(|statement| statement.node.clone()),
        );
    }

    /// Build `statements` in `scope` and return the top-level nodes.
    ///
    /// A statement that fails is skipped with a warning, and every node it
    /// allocated is freed again.
    pub fn build_statements(&mut self, statements: &[Spanned<Statement>], scope: &Rc<Scope>) -> Vec<NodeId> {
        let mut roots = Vec::new();
        for statement in statements {
            let (node_mark, route_mark) = (self.allocated.len(), self.routes.len());
            match self.build_statement(statement, scope) {
                Ok(Some(node)) => roots.push(node),
                Ok(None) => {}
                Err(error) => {
                    self.routes.truncate(route_mark);
                    for id in self.allocated.drain(node_mark..).rev() {
                        self.scene.free_node(id);
                    }
                    self.warn(error, Some(statement.span));
                }
            }
        }

        for route in std::mem::take(&mut self.routes) {
            if let Err(error) = self.add_route(&route, scope) {
                let span = Span::from(route.from_node.span.start..route.to_event.span.end);
                self.warn(error, Some(span));
            }
        }
        roots
    }

    fn build_statement(&mut self, statement: &Spanned<Statement>, scope: &Rc<Scope>) -> Result<Option<NodeId>> {
        match &statement.node {
            Statement::Node(node) => self.build_node(node, scope).map(Some),
            Statement::Proto(proto) => self.declare_proto(proto, scope).map(|_| None),
            Statement::ExternProto(proto) => self.declare_extern_proto(proto, scope).map(|_| None),
            Statement::Route(route) => {
                self.routes.push(route.clone());
                Ok(None)
            }
        }
    }

    fn build_node(&mut self, statement: &Spanned<NodeStatement>, scope: &Rc<Scope>) -> Result<NodeId> {
        let (name, type_id, body) = match &statement.node {
            NodeStatement::Use(name) => {
                return scope.find_node(&name.node).ok_or_else(|| VrmlError::UnknownNode {
                    name: name.node.clone(),
                    scope: scope.path(),
                });
            }
            NodeStatement::Instance { name, type_id, body } => (name, type_id, body),
        };

        let node_type = scope
            .find_type(&type_id.node)
            .ok_or_else(|| VrmlError::UnknownNodeType(type_id.node.clone()))?;
        let id = self
            .scene
            .allocate_node(node_type.clone(), scope.clone(), name.as_ref().map(|name| name.node.clone()));
        self.allocated.push(id);

        for element in body {
            self.apply_body_element(id, &node_type, &element.node, scope)?;
        }
        self.scene.finish_node(id)?;

        // A DEF name is visible from the end of its node on
        if let Some(name) = name {
            scope.define_node(name.node.clone(), id);
        }
        Ok(id)
    }

    fn apply_body_element(
        &mut self,
        id: NodeId,
        node_type: &Rc<NodeType>,
        element: &BodyElement,
        scope: &Rc<Scope>,
    ) -> Result<()> {
        match element {
            BodyElement::Field { id: field, value } => {
                let (slot, interface) = node_type
                    .interfaces()
                    .find_field(&field.node)
                    .ok_or_else(|| VrmlError::unsupported(node_type.id(), field.node.clone()))?;
                let value = self.build_value(interface.field_type, value, scope)?;
                if let Some(stored) = self.scene.node_mut(id)?.slot_mut(slot) {
                    stored.assign(value)?;
                }
                Ok(())
            }
            BodyElement::Is { id: inner, proto_id } => self.link_is(id, node_type, &inner.node, &proto_id.node),
            BodyElement::Route(route) => {
                self.routes.push(route.clone());
                Ok(())
            }
            BodyElement::Proto(proto) => self.declare_proto(proto, scope),
            BodyElement::ExternProto(proto) => self.declare_extern_proto(proto, scope),
        }
    }

    /// Type a field value, building the nodes of SFNode/MFNode values.
    fn build_value(&mut self, field_type: FieldType, raw: &Spanned<RawValue>, scope: &Rc<Scope>) -> Result<FieldValue> {
        match (field_type, &raw.node) {
            (FieldType::SfNode, RawValue::Node(node)) => Ok(FieldValue::SfNode(Some(self.build_node(node, scope)?))),
            (FieldType::MfNode, RawValue::Node(node)) => Ok(FieldValue::MfNode(vec![self.build_node(node, scope)?])),
            (FieldType::MfNode, RawValue::List(items)) => {
                let mut nodes = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        ListItem::Node(node) => nodes.push(self.build_node(node, scope)?),
                        ListItem::Scalar(scalar) => {
                            return Err(VrmlError::type_mismatch(field_type, scalar.describe()));
                        }
                    }
                }
                Ok(FieldValue::MfNode(nodes))
            }
            _ => decode_value(field_type, &raw.node),
        }
    }

    fn add_route(&mut self, route: &RouteStatement, scope: &Scope) -> Result<()> {
        let lookup = |name: &Spanned<String>| {
            scope.find_node(&name.node).ok_or_else(|| VrmlError::UnknownNode {
                name: name.node.clone(),
                scope: scope.path(),
            })
        };
        let from = lookup(&route.from_node)?;
        let to = lookup(&route.to_node)?;
        self.scene
            .add_route(from, &route.from_event.node, to, &route.to_event.node)
            .map_err(|error| VrmlError::InvalidRoute(format!("{route}: {error}")))?;
        Ok(())
    }

    fn declare_interfaces(
        declarations: &[Spanned<InterfaceDeclaration>],
        keep_defaults: bool,
    ) -> Result<(NodeInterfaceSet, HashMap<String, ProtoDefault>)> {
        let mut interfaces = NodeInterfaceSet::new();
        let mut defaults = HashMap::new();
        for declaration in declarations {
            let InterfaceDeclaration {
                kind,
                field_type,
                id,
                value,
            } = &declaration.node;
            let field_type: FieldType = field_type.node.parse()?;
            interfaces.add(NodeInterface::new(*kind, field_type, id.node.clone()))?;
            let Some(value) = value.as_ref().filter(|_| keep_defaults) else {
                continue;
            };
            let default = if field_type.is_node() {
                ProtoDefault::Nodes(value.clone())
            } else {
                ProtoDefault::Value(decode_value(field_type, &value.node)?)
            };
            defaults.insert(id.node.clone(), default);
        }
        Ok((interfaces, defaults))
    }

    /// Registry id for a type declared as `name` in `scope`. Instances of the
    /// same PROTO give their inner declarations identical scope paths, so
    /// later ones get a numbered id.
    fn metatype_id(&self, scope: &Scope, name: &str) -> String {
        let base = format!("{}#{name}", scope.path());
        let registry = self.scene.registry();
        if registry.find(&base).is_none() {
            return base;
        }
        (2..)
            .map(|n| format!("{base}~{n}"))
            .find(|id| registry.find(id).is_none())
            .unwrap_or(base)
    }

    fn declare_type(&mut self, name: &Spanned<String>, metatype: Rc<dyn NodeMetatype>, scope: &Scope) {
        let (metatype, _) = self.scene.registry_mut().register(metatype);
        let (_, added) = scope.add_type(NodeType::declared(name.node.clone(), metatype));
        if !added {
            self.warn(
                format!("{} is already declared in {}; keeping the first declaration", name.node, scope.path()),
                Some(name.span),
            );
        }
    }

    fn declare_proto(&mut self, proto: &ProtoDeclaration, scope: &Rc<Scope>) -> Result<()> {
        let (interfaces, defaults) = Self::declare_interfaces(&proto.interfaces, true)?;
        let definition = Rc::new(ProtoDefinition {
            name: proto.id.node.clone(),
            interfaces,
            defaults,
            body: Rc::from(proto.body.clone()),
            scope: Rc::downgrade(scope),
            url: self.url.clone(),
        });
        let metatype = ProtoMetatype::new(self.metatype_id(scope, &proto.id.node), definition);
        debug!("PROTO {} declared in {}", proto.id.node, scope.path());
        self.declare_type(&proto.id, metatype, scope);
        Ok(())
    }

    fn declare_extern_proto(&mut self, proto: &ExternProtoDeclaration, scope: &Rc<Scope>) -> Result<()> {
        let (interfaces, _) = Self::declare_interfaces(&proto.interfaces, false)?;
        let urls = proto
            .urls
            .node
            .strings()
            .ok_or_else(|| VrmlError::type_mismatch(FieldType::MfString, proto.urls.node.describe()))?
            .iter()
            .map(|url| resolve_url(&self.url, url))
            .collect();
        let metatype = ExternProtoMetatype::new(
            self.metatype_id(scope, &proto.id.node),
            interfaces,
            HashMap::new(),
            urls,
        );
        debug!("EXTERNPROTO {} declared in {}", proto.id.node, scope.path());
        self.declare_type(&proto.id, metatype, scope);
        Ok(())
    }

    /// Build the body of `definition` for `instance` into `scope`.
    pub fn expand_proto(&mut self, definition: &ProtoDefinition, instance: NodeId, scope: Rc<Scope>) -> Result<()> {
        self.proto = Some(ProtoContext {
            instance,
            name: definition.name.clone(),
            interfaces: definition.interfaces.clone(),
            defaults: definition.defaults.clone(),
        });
        self.scene
            .set_state(instance, NodeState::Proto(ProtoInstance::new(scope.clone())))?;

        // Node-valued defaults are fresh nodes for every instance
        for interface in definition.interfaces.iter() {
            let Some(ProtoDefault::Nodes(raw)) = definition.defaults.get(&interface.id) else {
                continue;
            };
            let unset = self
                .scene
                .node(instance)?
                .get(&interface.id)
                .is_none_or(|value| value.node_refs().is_empty());
            if unset {
                let value = self.build_value(interface.field_type, raw, &scope)?;
                self.scene.node_mut(instance)?.store(&interface.id, value);
            }
        }

        let roots = self.build_statements(&definition.body, &scope);
        let owned = std::mem::take(&mut self.allocated);
        let node = self.scene.node_mut(instance)?;
        if let Some(proto) = node.state.as_proto_mut() {
            proto.roots = roots;
        }
        node.owned.extend(owned);
        Ok(())
    }

    /// Map `inner_id` of a body node onto `proto_id` of the instance being
    /// expanded. Depending on both interface kinds the value is copied,
    /// incoming events are forwarded inwards, and inner emissions are
    /// re-emitted by the instance.
    fn link_is(&mut self, node: NodeId, node_type: &NodeType, inner_id: &str, proto_id: &str) -> Result<()> {
        let context = self.proto.as_ref().ok_or_else(|| {
            VrmlError::InvalidVrml(format!("{inner_id} IS {proto_id} outside a PROTO body"))
        })?;
        let outer = context
            .interfaces
            .get(proto_id)
            .cloned()
            .ok_or_else(|| VrmlError::unsupported(context.name.clone(), proto_id))?;
        let interfaces = node_type.interfaces();
        let inner = interfaces
            .get(inner_id)
            .or_else(|| interfaces.find_event_in(inner_id).map(|(_, interface)| interface))
            .or_else(|| interfaces.find_event_out(inner_id).map(|(_, interface)| interface))
            .cloned()
            .ok_or_else(|| VrmlError::unsupported(node_type.id(), inner_id))?;
        if inner.field_type != outer.field_type {
            return Err(VrmlError::type_mismatch(outer.field_type, inner.field_type.name()));
        }

        use InterfaceKind::*;
        let (copy, forward, reemit) = match (inner.kind, outer.kind) {
            (ExposedField, ExposedField) => (true, true, true),
            (Field | ExposedField, Field) | (Field, ExposedField) => (true, false, false),
            (EventIn | ExposedField, EventIn) | (EventIn, ExposedField) => (false, true, false),
            (EventOut | ExposedField, EventOut) | (EventOut, ExposedField) => (false, false, true),
            _ => {
                return Err(VrmlError::InvalidVrml(format!(
                    "{} {inner_id} cannot be mapped to {} {proto_id}",
                    inner.kind, outer.kind
                )));
            }
        };

        let instance = context.instance;
        if copy {
            let value = match self.scene.node(instance)?.get(&outer.id) {
                Some(value) => value.clone(),
                None => match context.defaults.get(&outer.id) {
                    Some(ProtoDefault::Value(value)) => value.clone(),
                    _ => FieldValue::default_for(outer.field_type),
                },
            };
            self.scene.node_mut(node)?.store(&inner.id, value);
        }
        if forward {
            if let Some(proto) = self.scene.node_mut(instance)?.state.as_proto_mut() {
                proto
                    .event_links
                    .entry(outer.id.clone())
                    .or_default()
                    .push((node, inner.id.clone()));
            }
        }
        if reemit {
            self.scene
                .routing_mut()
                .add_is_link(node, &inner.id, instance, &outer.id);
        }
        Ok(())
    }

    fn warn(&mut self, message: impl fmt::Display, span: Option<Span>) {
        self.scene.push_warning(LoadWarning {
            message: format!("{}: {message}", self.url),
            span,
        });
    }
}

/// Replace the children of an Inline node with the loaded document.
pub(super) fn complete_inline(
    scene: &mut Scene,
    inline: NodeId,
    result: std::result::Result<(String, String), ResourceError>,
) {
    if !scene.is_valid(inline) {
        return;
    }
    let (url, text) = match result {
        Ok(loaded) => loaded,
        Err(error) => {
            scene.warn(format!("Inline {inline}: {error}"), None);
            return;
        }
    };
    let statements = match parse_document(&text, &url) {
        Ok(statements) => statements,
        Err(error) => {
            scene.warn(format!("Inline {inline}: {error}"), None);
            return;
        }
    };

    // Everything built for the previous world goes, not just its roots
    let previous = scene
        .node_mut(inline)
        .map(|node| std::mem::take(&mut node.owned))
        .unwrap_or_default();
    for id in previous {
        scene.free_node(id);
    }

    let scope = Scope::new(url.clone(), None);
    scene.registry().populate_scope(&scope);
    let mut builder = Builder::new(scene, &url);
    let children = builder.build_statements(&statements, &scope);
    let owned = std::mem::take(&mut builder.allocated);

    debug!("Inline {inline} loaded {url}: {} nodes", children.len());
    if let Ok(node) = scene.node_mut(inline) {
        node.owned = owned;
        node.state = NodeState::Inline(InlineState {
            children,
            loaded_url: Some(url),
            scope: Some(scope),
        });
    }
    scene.mark_modified(inline);
}

/// Resolve an EXTERNPROTO from a loaded document. A `#name` fragment picks
/// the PROTO; without one the first PROTO of the document is used.
pub(super) fn complete_extern_proto(
    scene: &mut Scene,
    metatype_id: &str,
    result: std::result::Result<(String, String), ResourceError>,
) {
    let Some(metatype) = scene.registry().find(metatype_id) else {
        warn!("EXTERNPROTO {metatype_id} is no longer registered");
        return;
    };
    let Some(extern_proto) = metatype.as_extern_proto() else {
        return;
    };
    let definition = result
        .map_err(|error| error.to_string())
        .and_then(|(url, text)| load_definition(scene, &url, &text));
    extern_proto.resolve(scene, definition);
}

fn load_definition(scene: &mut Scene, url: &str, text: &str) -> std::result::Result<Rc<ProtoDefinition>, String> {
    let (document, fragment) = match url.split_once('#') {
        Some((document, fragment)) => (document, Some(fragment)),
        None => (url, None),
    };
    let statements = parse_document(text, document).map_err(|error| error.to_string())?;
    let name = match fragment {
        Some(fragment) => fragment.to_string(),
        None => statements
            .iter()
            .find_map(|statement| match &statement.node {
                Statement::Proto(proto) => Some(proto.id.node.clone()),
                _ => None,
            })
            .ok_or_else(|| format!("{document} declares no PROTO"))?,
    };

    let declarations: Vec<Spanned<Statement>> = statements
        .into_iter()
        .filter(|statement| matches!(statement.node, Statement::Proto(_) | Statement::ExternProto(_)))
        .collect();
    let scope = Scope::new(document, None);
    scene.registry().populate_scope(&scope);
    Builder::new(scene, document).build_statements(&declarations, &scope);

    let node_type = scope
        .find_type(&name)
        .ok_or_else(|| format!("{document} has no PROTO {name}"))?;
    let definition = node_type
        .metatype()
        .as_proto()
        .map(|proto| proto.definition().clone())
        .ok_or_else(|| format!("{name} in {document} is not a PROTO"))?;
    // Keep the document scope alive for as long as the definition is used.
    scene.keep_scope(scope);
    Ok(definition)
}

#[cfg(test)]
mod tests {
    use crate::config::BrowserConfig;
    use crate::error::ResourceError;
    use crate::field::{FieldValue, Vec3f};
    use crate::node::MetatypeRegistry;
    use crate::scene::{LoadPurpose, Scene};

    fn load(source: &str) -> Scene {
        Scene::load(source, "test.wrl", MetatypeRegistry::with_builtins(), BrowserConfig::default()).unwrap()
    }

    #[test]
    fn def_and_use_share_one_node() {
        let scene = load(
            "#VRML V2.0 utf8\n\
             Group { children [ DEF Ball Shape { geometry Sphere { } } USE Ball ] }",
        );
        let group = scene.roots()[0];
        let children = scene.node(group).unwrap().node_refs("children");
        assert_eq!(children.len(), 2);
        assert_eq!(children[0], children[1]);
        assert_eq!(scene.find_node("Ball"), Some(children[0]));
    }

    #[test]
    fn bad_statements_are_skipped_with_a_warning() {
        let scene = load(
            "#VRML V2.0 utf8\n\
             Transform { children Shape { } translation \"up\" }\n\
             Unknown { }\n\
             DEF Kept Group { }",
        );
        assert_eq!(scene.roots().len(), 1);
        assert_eq!(scene.warnings().len(), 2);
        assert!(scene.find_node("Kept").is_some());
        // The Shape allocated inside the failed Transform is gone too.
        assert_eq!(scene.node_count(), 1);
    }

    #[test]
    fn routes_may_precede_their_nodes() {
        let scene = load(
            "#VRML V2.0 utf8\n\
             ROUTE A.translation_changed TO B.set_translation\n\
             DEF A Transform { }\n\
             DEF B Transform { }",
        );
        assert!(scene.warnings().is_empty());
        assert_eq!(scene.routes().len(), 1);
    }

    #[test]
    fn use_before_def_is_an_error() {
        let scene = load("#VRML V2.0 utf8\nGroup { children USE Later }\nDEF Later Group { }");
        assert_eq!(scene.roots().len(), 1);
        assert!(scene.warnings()[0].message.contains("Later"));
    }

    const BOUNCER: &str = "#VRML V2.0 utf8\n\
        PROTO Bouncer [\n\
          exposedField SFVec3f position 0 0 0\n\
          field SFFloat size 1\n\
          eventIn SFVec3f set_target\n\
          eventOut SFVec3f position_echo\n\
          exposedField SFNode look NULL\n\
        ] {\n\
          DEF Body Transform {\n\
            translation IS position\n\
            children Shape { geometry Sphere { radius IS size } }\n\
          }\n\
          DEF Mover PositionInterpolator { key [0 1] keyValue [0 0 0, 1 1 1] }\n\
        }\n";

    #[test]
    fn proto_fields_are_copied_into_the_body() {
        let scene = load(&format!("{BOUNCER}DEF B Bouncer {{ position 1 2 3 size 4 }}"));
        let instance = scene.find_node("B").unwrap();
        let body = scene.implementation(instance);
        assert_ne!(body, instance);
        assert_eq!(scene.node(body).unwrap().type_id(), "Transform");
        assert_eq!(
            scene.get_field(body, "translation").unwrap(),
            &FieldValue::SfVec3f(Vec3f::new(1.0, 2.0, 3.0))
        );
        let shape = scene.node(body).unwrap().node_refs("children")[0];
        let sphere = scene.node(shape).unwrap().node_ref("geometry").unwrap();
        assert_eq!(scene.get_field(sphere, "radius").unwrap(), &FieldValue::SfFloat(4.0));
        // Body names stay inside the instance.
        assert_eq!(scene.find_node("Body"), None);
    }

    #[test]
    fn events_cross_is_links_both_ways() {
        let mut scene = load(&format!(
            "{BOUNCER}\
             DEF B Bouncer {{ }}\n\
             DEF Watcher Transform {{ }}\n\
             ROUTE B.position_changed TO Watcher.set_translation"
        ));
        let instance = scene.find_node("B").unwrap();
        let body = scene.implementation(instance);
        let watcher = scene.find_node("Watcher").unwrap();

        scene
            .send_event(instance, "set_position", FieldValue::SfVec3f(Vec3f::new(0.0, 5.0, 0.0)), 1.0)
            .unwrap();
        scene.process_events(1.0);

        assert_eq!(
            scene.get_field(body, "translation").unwrap(),
            &FieldValue::SfVec3f(Vec3f::new(0.0, 5.0, 0.0))
        );
        assert_eq!(
            scene.get_field(watcher, "translation").unwrap(),
            &FieldValue::SfVec3f(Vec3f::new(0.0, 5.0, 0.0))
        );
    }

    #[test]
    fn every_instance_gets_its_own_body() {
        let scene = load(&format!("{BOUNCER}DEF A Bouncer {{ }}\nDEF B Bouncer {{ }}"));
        let a = scene.implementation(scene.find_node("A").unwrap());
        let b = scene.implementation(scene.find_node("B").unwrap());
        assert_ne!(a, b);
    }

    #[test]
    fn freeing_an_instance_frees_its_body() {
        let mut scene = load(&format!("{BOUNCER}DEF B Bouncer {{ }}"));
        let instance = scene.find_node("B").unwrap();
        let body = scene.implementation(instance);
        scene.free_node(instance);
        assert!(!scene.is_valid(body));
        assert_eq!(scene.node_count(), 0);
    }

    #[test]
    fn self_instantiating_protos_are_cut_off() {
        let scene = load(
            "#VRML V2.0 utf8\n\
             PROTO Foo [ ] { Foo { } }\n\
             PROTO Ping [ ] { Group { children [ Pong { } ] } }\n\
             PROTO Pong [ ] { Ping { } }\n\
             DEF F Foo { }\n\
             DEF P Ping { }",
        );
        let foo = scene.find_node("F").unwrap();
        assert_eq!(scene.implementation(foo), foo);
        assert!(scene.find_node("P").is_some());
        assert!(scene.expanding.is_empty());
        assert!(
            scene
                .warnings()
                .iter()
                .any(|warning| warning.message.contains("Foo instantiates itself"))
        );
        assert!(
            scene
                .warnings()
                .iter()
                .any(|warning| warning.message.contains("Ping instantiates itself"))
        );
    }

    #[test]
    fn is_outside_a_proto_is_rejected() {
        let scene = load("#VRML V2.0 utf8\nTransform { translation IS position }");
        assert!(scene.roots().is_empty());
        assert_eq!(scene.warnings().len(), 1);
    }

    #[test]
    fn extern_proto_instances_wait_for_their_implementation() {
        let mut scene = load(
            "#VRML V2.0 utf8\n\
             EXTERNPROTO Lamp [ exposedField SFColor color ] [ \"lamps.wrl#Lamp\" ]\n\
             DEF L Lamp { color 1 0 0 }",
        );
        let lamp = scene.find_node("L").unwrap();
        assert_eq!(scene.implementation(lamp), lamp);

        let requests = scene.take_load_requests();
        assert_eq!(requests.len(), 1);
        assert_eq!(requests[0].urls, vec!["lamps.wrl#Lamp".to_string()]);
        let LoadPurpose::ExternProto(_) = &requests[0].purpose else {
            panic!("expected an EXTERNPROTO request");
        };

        let library = "#VRML V2.0 utf8\n\
            PROTO Lamp [ exposedField SFColor color 1 1 1 ] {\n\
              PointLight { color IS color }\n\
            }";
        scene.complete_load(
            &requests[0].purpose,
            Ok(("lamps.wrl#Lamp".to_string(), library.to_string())),
        );
        let light = scene.implementation(lamp);
        assert_ne!(light, lamp);
        assert_eq!(scene.node(light).unwrap().type_id(), "PointLight");
        assert_eq!(
            scene.get_field(light, "color").unwrap(),
            &FieldValue::SfColor(crate::field::Color::new(1.0, 0.0, 0.0))
        );
    }

    #[test]
    fn failed_extern_proto_leaves_instances_empty() {
        let mut scene = load(
            "#VRML V2.0 utf8\n\
             EXTERNPROTO Lamp [ exposedField SFColor color ] \"missing.wrl\"\n\
             DEF L Lamp { }",
        );
        let requests = scene.take_load_requests();
        scene.complete_load(
            &requests[0].purpose,
            Err(ResourceError::unreachable("missing.wrl", "not found")),
        );
        let lamp = scene.find_node("L").unwrap();
        assert_eq!(scene.implementation(lamp), lamp);
        assert!(scene.warnings().iter().any(|warning| warning.message.contains("left empty")));
    }
}
