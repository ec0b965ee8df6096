//! VRML97 scene graph engine.
//!
//! Text is lexed and parsed by [`parser`], turned into nodes living in an
//! [`engine::arena::Arena`] by the scene builder, wired together by ROUTEs in
//! the [`engine::routing::RoutingTable`] and driven frame by frame through
//! [`browser::Browser`].

pub mod bounding_volume;
pub mod browser;
pub mod config;
pub mod engine;
pub mod error;
pub mod field;
pub mod node;
pub mod nodes;
pub mod parser;
pub mod resource;
pub mod scene;
pub mod scope;
pub mod viewer;

pub use browser::{Browser, BrowserState};
pub use config::BrowserConfig;
pub use engine::arena::NodeId;
pub use error::{ResourceError, Result, VrmlError};
pub use field::{FieldType, FieldValue};
pub use node::{InterfaceKind, NodeInterface, NodeInterfaceSet, NodeType};
pub use scene::Scene;
pub use scope::Scope;
