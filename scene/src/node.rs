use std::rc::Rc;

use bitflags::bitflags;
use skope_common::Transform;

use crate::controller::Controller;
use crate::node_arena::NodeKey;
use crate::node_list::NodeList;
use crate::property::{Property, PropertyKind, PropertyList};
use crate::source::{RecordId, SourceModel};

/// Identifier of a node within a loaded scene: the number of its source
/// record.
pub type NodeId = u32;

bitflags! {
    /// Node flag bits as stored in the source. Unknown bits are kept.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct NodeFlags: u32 {
        const HIDDEN = 1 << 0;
    }
}

/// A node in the scene hierarchy.
///
/// The parent edge is a weak key that may outlive the parent. Children are
/// held through a [`NodeList`], so each child carries one share per parent
/// membership. Hierarchy edits go through [`crate::Scene`] to keep both
/// directions consistent.
#[derive(Debug, Default)]
pub struct Node {
    id: NodeId,
    record: Option<RecordId>,
    pub name: String,
    flags: NodeFlags,
    pub local: Transform,

    // Hierarchy
    parent: Option<NodeKey>,
    children: NodeList,

    properties: PropertyList,
    controllers: Vec<Controller>,
    collision: Option<RecordId>,
}

impl Node {
    /// Creates a node backed by the given source record.
    pub fn new(record: RecordId) -> Self {
        Self {
            id: record,
            record: Some(record),
            ..Self::default()
        }
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    /// Backing record, `None` once the node has been cleared.
    pub fn record(&self) -> Option<RecordId> {
        self.record
    }

    /// Returns true if the backing record still exists in `source`.
    pub fn is_valid<S: SourceModel>(&self, source: &S) -> bool {
        self.record.is_some_and(|r| source.is_valid(r))
    }

    pub fn flags(&self) -> NodeFlags {
        self.flags
    }

    pub fn set_flags(&mut self, flags: NodeFlags) {
        self.flags = flags;
    }

    /// The node's own hidden bit. Ancestors and display options are not
    /// considered; see [`crate::Scene::is_hidden`].
    pub fn is_hidden_flag(&self) -> bool {
        self.flags.contains(NodeFlags::HIDDEN)
    }

    pub fn set_hidden(&mut self, hidden: bool) {
        self.flags.set(NodeFlags::HIDDEN, hidden);
    }

    // Hierarchy management

    pub fn parent(&self) -> Option<NodeKey> {
        self.parent
    }

    /// Sets the parent key (internal use only - use Scene methods to maintain consistency).
    pub(crate) fn set_parent(&mut self, parent: Option<NodeKey>) {
        self.parent = parent;
    }

    pub fn children(&self) -> &NodeList {
        &self.children
    }

    pub(crate) fn children_mut(&mut self) -> &mut NodeList {
        &mut self.children
    }

    pub(crate) fn into_children(self) -> NodeList {
        self.children
    }

    // Properties

    pub fn properties(&self) -> &PropertyList {
        &self.properties
    }

    pub(crate) fn set_properties(&mut self, properties: PropertyList) {
        self.properties = properties;
    }

    /// First attached property of the given kind.
    pub fn find_property(&self, kind: PropertyKind) -> Option<&Rc<Property>> {
        self.properties.find(kind)
    }

    // Controllers

    pub fn controllers(&self) -> &[Controller] {
        &self.controllers
    }

    pub(crate) fn controllers_mut(&mut self) -> &mut Vec<Controller> {
        &mut self.controllers
    }

    pub(crate) fn has_controller(&self, record: RecordId) -> bool {
        self.controllers.iter().any(|c| c.record() == record)
    }

    /// Record of the attached collision object, if any.
    pub fn collision(&self) -> Option<RecordId> {
        self.collision
    }

    pub(crate) fn set_collision(&mut self, collision: Option<RecordId>) {
        self.collision = collision;
    }

    /// Resets everything read from the source. The children list is handed
    /// back so the caller can release it against the arena.
    pub(crate) fn clear(&mut self) -> NodeList {
        self.id = 0;
        self.record = None;
        self.name.clear();
        self.flags = NodeFlags::empty();
        self.local = Transform::identity();
        self.properties.clear();
        self.controllers.clear();
        self.collision = None;
        std::mem::take(&mut self.children)
    }
}
