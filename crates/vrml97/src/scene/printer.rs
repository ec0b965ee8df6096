use std::collections::HashSet;
use std::fmt::Write;

use super::Scene;
use crate::engine::NodeId;
use crate::field::FieldValue;

struct Printer<'a> {
    scene: &'a Scene,
    /// Named nodes already printed once; later references print as USE.
    defined: HashSet<NodeId>,
    /// Nodes being written, outermost first.
    path: Vec<NodeId>,
    out: String,
}

pub(super) fn write_scene(scene: &Scene) -> String {
    let mut printer = Printer {
        scene,
        defined: HashSet::new(),
        path: Vec::new(),
        out: String::from("#VRML V2.0 utf8\n"),
    };
    for declaration in scene.declarations() {
        let _ = write!(printer.out, "\n{declaration}\n");
    }
    for root in scene.roots() {
        printer.out.push('\n');
        printer.write_node(*root, 0);
        printer.out.push('\n');
    }

    // Routes between nodes named in the document itself
    let root_scope = scene.root_scope();
    let name_of = |id: NodeId| {
        let name = scene.node(id).ok()?.name()?;
        (root_scope.find_node(name) == Some(id)).then_some(name)
    };
    let mut wrote_route = false;
    for route in scene.routes() {
        let (Some(from), Some(to)) = (name_of(route.from), name_of(route.to)) else {
            continue;
        };
        if !wrote_route {
            printer.out.push('\n');
            wrote_route = true;
        }
        let _ = writeln!(
            printer.out,
            "ROUTE {from}.{} TO {to}.{}",
            route.event_out, route.event_in
        );
    }
    printer.out
}

impl Printer<'_> {
    fn indent(&mut self, depth: usize) {
        for _ in 0..depth {
            self.out.push_str("  ");
        }
    }

    fn write_node(&mut self, id: NodeId, depth: usize) {
        let Ok(node) = self.scene.node(id) else {
            self.out.push_str("NULL");
            return;
        };
        // An unnamed node inside itself has no text form
        if node.name().is_none() && self.path.contains(&id) {
            self.out.push_str("NULL");
            return;
        }
        if let Some(name) = node.name() {
            if !self.defined.insert(id) {
                let _ = write!(self.out, "USE {name}");
                return;
            }
            let _ = write!(self.out, "DEF {name} ");
        }
        let _ = write!(self.out, "{} {{", node.type_id());
        self.path.push(id);

        let metatype = node.node_type().metatype();
        let mut wrote_field = false;
        for (interface, value) in node.node_type().interfaces().iter().zip(node.values()) {
            if !interface.kind.has_value() {
                continue;
            }
            let default = metatype
                .default_value(&interface.id)
                .unwrap_or_else(|| FieldValue::default_for(interface.field_type));
            if *value == default {
                continue;
            }
            self.out.push('\n');
            self.indent(depth + 1);
            let _ = write!(self.out, "{} ", interface.id);
            self.write_value(value, depth + 1);
            wrote_field = true;
        }

        self.path.pop();
        if wrote_field {
            self.out.push('\n');
            self.indent(depth);
            self.out.push('}');
        } else {
            self.out.push_str(" }");
        }
    }

    fn write_value(&mut self, value: &FieldValue, depth: usize) {
        match value {
            FieldValue::SfNode(Some(node)) => self.write_node(*node, depth),
            FieldValue::MfNode(nodes) if !nodes.is_empty() => {
                self.out.push('[');
                for node in nodes {
                    self.out.push('\n');
                    self.indent(depth + 1);
                    self.write_node(*node, depth + 1);
                }
                self.out.push('\n');
                self.indent(depth);
                self.out.push(']');
            }
            other => {
                let _ = write!(self.out, "{other}");
            }
        }
    }
}
