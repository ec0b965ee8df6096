use std::collections::HashMap;

use smallvec::SmallVec;

use super::arena::NodeId;

/// How an event travels along an edge.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Delivery {
    /// ROUTE: the target's eventIn handler runs.
    EventIn,
    /// PROTO `IS` link: the target re-emits the event from its own eventOut.
    Reemit,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RouteTarget {
    pub node: NodeId,
    pub event: String,
    pub delivery: Delivery,
}

/// A user-visible ROUTE.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct Route {
    pub from: NodeId,
    pub event_out: String,
    pub to: NodeId,
    pub event_in: String,
}

/// Routes events between nodes.
///
/// Event names are the canonical interface ids of the endpoints (an
/// exposedField is keyed by its own name, never `set_x`/`x_changed`).
#[derive(Debug, Default)]
pub struct RoutingTable {
    /// (source node, eventOut) -> targets, in insertion order
    routes: HashMap<(NodeId, String), SmallVec<[RouteTarget; 2]>>,
    /// Insertion order of user routes, for printing
    order: Vec<Route>,
}

impl RoutingTable {
    pub fn new() -> Self {
        Self::default()
    }

    fn insert(&mut self, source: NodeId, event_out: &str, target: RouteTarget) -> bool {
        let targets = self.routes.entry((source, event_out.to_string())).or_default();
        if targets.contains(&target) {
            return false;
        }
        targets.push(target);
        true
    }

    /// Add a route from source to target. Adding an existing route again has
    /// no effect and returns `false`.
    pub fn add_route(&mut self, from: NodeId, event_out: &str, to: NodeId, event_in: &str) -> bool {
        let added = self.insert(
            from,
            event_out,
            RouteTarget {
                node: to,
                event: event_in.to_string(),
                delivery: Delivery::EventIn,
            },
        );
        if added {
            self.order.push(Route {
                from,
                event_out: event_out.to_string(),
                to,
                event_in: event_in.to_string(),
            });
        }
        added
    }

    /// Connect an eventOut inside a PROTO body to the instance's eventOut.
    pub fn add_is_link(&mut self, inner: NodeId, inner_event: &str, instance: NodeId, instance_event: &str) -> bool {
        self.insert(
            inner,
            inner_event,
            RouteTarget {
                node: instance,
                event: instance_event.to_string(),
                delivery: Delivery::Reemit,
            },
        )
    }

    /// Remove a user route. `IS` links are never removed this way.
    pub fn remove_route(&mut self, from: NodeId, event_out: &str, to: NodeId, event_in: &str) -> bool {
        let Some(targets) = self.routes.get_mut(&(from, event_out.to_string())) else {
            return false;
        };
        let before = targets.len();
        targets.retain(|target| {
            !(target.node == to && target.event == event_in && target.delivery == Delivery::EventIn)
        });
        let removed = targets.len() != before;
        if targets.is_empty() {
            self.routes.remove(&(from, event_out.to_string()));
        }
        if removed {
            self.order.retain(|route| {
                !(route.from == from && route.event_out == event_out && route.to == to && route.event_in == event_in)
            });
        }
        removed
    }

    /// Get all targets subscribed to a source eventOut.
    pub fn get_subscribers(&self, source: NodeId, event_out: &str) -> &[RouteTarget] {
        self.routes
            .get(&(source, event_out.to_string()))
            .map(|targets| targets.as_slice())
            .unwrap_or(&[])
    }

    /// User routes in the order they were added.
    pub fn routes(&self) -> &[Route] {
        &self.order
    }

    /// Remove all routes involving a node (when freed).
    pub fn remove_node(&mut self, node: NodeId) {
        self.routes.retain(|(source, _), targets| {
            if *source == node {
                return false;
            }
            targets.retain(|target| target.node != node);
            !targets.is_empty()
        });
        self.order.retain(|route| route.from != node && route.to != node);
    }

    pub fn clear(&mut self) {
        self.routes.clear();
        self.order.clear();
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(index: u32) -> NodeId {
        NodeId { index, generation: 0 }
    }

    #[test]
    fn routing_add_remove() {
        let mut rt = RoutingTable::new();
        let (s1, s2, s3) = (id(1), id(2), id(3));

        assert!(rt.add_route(s1, "value", s2, "set_value"));
        assert!(rt.add_route(s1, "value", s3, "set_value"));

        let subs = rt.get_subscribers(s1, "value");
        assert_eq!(subs.len(), 2);
        assert_eq!(subs[0].node, s2);

        assert!(rt.remove_route(s1, "value", s2, "set_value"));
        assert!(!rt.remove_route(s1, "value", s2, "set_value"));
        let subs = rt.get_subscribers(s1, "value");
        assert_eq!(subs.len(), 1);
        assert_eq!(rt.routes().len(), 1);
    }

    #[test]
    fn duplicate_routes_are_idempotent() {
        let mut rt = RoutingTable::new();
        assert!(rt.add_route(id(1), "out", id(2), "in"));
        assert!(!rt.add_route(id(1), "out", id(2), "in"));
        assert_eq!(rt.get_subscribers(id(1), "out").len(), 1);
        assert_eq!(rt.routes().len(), 1);
    }

    #[test]
    fn is_links_survive_route_removal() {
        let mut rt = RoutingTable::new();
        rt.add_is_link(id(5), "value_changed", id(1), "out");
        assert!(!rt.remove_route(id(5), "value_changed", id(1), "out"));
        assert_eq!(rt.get_subscribers(id(5), "value_changed")[0].delivery, Delivery::Reemit);
        assert!(rt.routes().is_empty());
    }

    #[test]
    fn routing_remove_node() {
        let mut rt = RoutingTable::new();
        let (s1, s2, s3) = (id(1), id(2), id(3));

        rt.add_route(s1, "out", s2, "in");
        rt.add_route(s3, "out", s1, "in");
        rt.add_route(s3, "out", s2, "in");
        rt.remove_node(s1);

        assert!(rt.get_subscribers(s1, "out").is_empty());
        assert_eq!(rt.get_subscribers(s3, "out").len(), 1);
        assert_eq!(rt.routes().len(), 1);
    }
}
