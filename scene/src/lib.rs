//! Scene hierarchy, animation controllers and transform caching for the
//! skope model viewer.
//!
//! A [`Scene`] is built from any [`source::SourceModel`]. Nodes live in a
//! [`NodeArena`] and are shared between [`NodeList`]s by reference count;
//! parents are weak keys. World and view transforms are memoized per pass.

pub use skope_common as common;

mod controller;
mod interpolate;
mod node;
mod node_arena;
mod node_list;
mod options;
mod property;
mod scene;
pub mod shape;
pub mod source;
mod tree;

pub use controller::{
    Controller, ControllerKind, ControllerType, Extrapolation, TimeMapping, TransformController,
    VisibilityController,
};
pub use interpolate::{Interpolate, Interpolation, Key, KeyGroup};
pub use node::{Node, NodeFlags, NodeId};
pub use node_arena::{NodeArena, NodeKey};
pub use node_list::NodeList;
pub use options::{CullPattern, OptionsError, SceneOptions};
pub use property::{Property, PropertyKind, PropertyList};
pub use scene::{CollisionOutline, NodeMarker, Scene, TransformCache, HAVOK_SCALE};
pub use tree::{walk_tree, CollectVisitor, TreeVisitor};
