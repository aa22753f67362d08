use crate::node::Node;
use crate::node_arena::{NodeArena, NodeKey};

/// Trait for implementing tree traversal operations.
///
/// Implementors of this trait can be passed to [`walk_tree`] to perform
/// arbitrary operations on each node during traversal.
pub trait TreeVisitor {
    /// Called when entering a node (before processing its children).
    ///
    /// Returns true to continue traversing children, false to skip the subtree.
    fn enter_node(&mut self, key: NodeKey, node: &Node) -> bool;

    /// Called when exiting a node (after processing its children).
    fn exit_node(&mut self, _key: NodeKey, _node: &Node) {}
}

/// Walks the hierarchy depth-first starting from a given node.
pub fn walk_tree<V: TreeVisitor>(nodes: &NodeArena, key: NodeKey, visitor: &mut V) {
    let Some(node) = nodes.get(key) else {
        return;
    };

    if visitor.enter_node(key, node) {
        for child in node.children().iter() {
            walk_tree(nodes, child, visitor);
        }
    }

    visitor.exit_node(key, node);
}

/// Collects the keys of every visited node in pre-order.
#[derive(Debug, Default)]
pub struct CollectVisitor {
    pub keys: Vec<NodeKey>,
}

impl TreeVisitor for CollectVisitor {
    fn enter_node(&mut self, key: NodeKey, _node: &Node) -> bool {
        self.keys.push(key);
        true
    }
}
