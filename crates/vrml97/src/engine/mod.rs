//! Node storage and event propagation.

pub mod arena;
pub mod bind_stack;
pub mod event_loop;
pub mod routing;

pub use arena::{Arena, NodeId};
pub use bind_stack::BindStack;
pub use event_loop::{CascadeReport, EventLoop, PendingEvent};
pub use routing::{Delivery, Route, RouteTarget, RoutingTable};
