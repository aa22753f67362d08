use std::cmp::Ordering;

use crate::node_arena::{NodeArena, NodeKey};
use crate::property::PropertyKind;
use crate::source::{RecordId, SourceModel};

/// An ordered list of shared node references.
///
/// Every membership holds one share of the node's reference count in the
/// [`NodeArena`]. Lists are not `Clone`: copying goes through [`assign`],
/// which keeps the counts exact.
///
/// [`assign`]: NodeList::assign
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NodeList {
    nodes: Vec<NodeKey>,
}

impl NodeList {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.nodes.contains(&key)
    }

    pub fn iter(&self) -> impl Iterator<Item = NodeKey> + '_ {
        self.nodes.iter().copied()
    }

    pub fn as_slice(&self) -> &[NodeKey] {
        &self.nodes
    }

    /// Appends a node and takes a share of it, unless it is already listed or
    /// no longer alive.
    pub fn add(&mut self, arena: &mut NodeArena, key: NodeKey) {
        if self.contains(key) {
            return;
        }
        if arena.acquire(key) {
            self.nodes.push(key);
        }
    }

    /// Removes every occurrence of a node and releases that many shares.
    pub fn del(&mut self, arena: &mut NodeArena, key: NodeKey) {
        let before = self.nodes.len();
        self.nodes.retain(|n| *n != key);
        let removed = (before - self.nodes.len()) as u32;
        if removed > 0 {
            arena.release(key, removed);
        }
    }

    /// Returns the first node backed by `record`.
    pub fn get(&self, arena: &NodeArena, record: RecordId) -> Option<NodeKey> {
        self.iter()
            .find(|&key| arena.get(key).and_then(|n| n.record()) == Some(record))
    }

    /// Drops every node whose backing record is no longer valid.
    pub fn validate<S: SourceModel>(&mut self, arena: &mut NodeArena, source: &S) {
        let invalid: Vec<NodeKey> = self
            .iter()
            .filter(|&key| !arena.get(key).is_some_and(|n| n.is_valid(source)))
            .collect();
        for key in invalid {
            self.del(arena, key);
        }
    }

    /// Releases every node. Calling it on an empty list does nothing.
    pub fn clear(&mut self, arena: &mut NodeArena) {
        while let Some(&key) = self.nodes.first() {
            self.del(arena, key);
        }
    }

    /// Replaces the contents with the nodes of `other`.
    pub fn assign(&mut self, arena: &mut NodeArena, other: &NodeList) {
        // Take the new shares first so nodes held by both lists survive
        let mut fresh = NodeList::new();
        for key in other.iter() {
            fresh.add(arena, key);
        }
        self.clear(arena);
        self.nodes = std::mem::take(&mut fresh.nodes);
    }

    /// Orders the list for drawing.
    ///
    /// Opaque nodes come first by ascending depth, then nodes carrying an
    /// alpha property by descending depth. Equal keys keep their order.
    pub fn sort(&mut self, arena: &NodeArena, depth: impl Fn(NodeKey) -> f32) {
        let mut keyed: Vec<(bool, f32, NodeKey)> = self
            .iter()
            .map(|key| {
                let translucent = arena
                    .get(key)
                    .is_some_and(|n| n.find_property(PropertyKind::Alpha).is_some());
                (translucent, depth(key), key)
            })
            .collect();

        keyed.sort_by(|a, b| match (a.0, b.0) {
            (false, true) => Ordering::Less,
            (true, false) => Ordering::Greater,
            (false, false) => a.1.total_cmp(&b.1),
            (true, true) => b.1.total_cmp(&a.1),
        });

        self.nodes = keyed.into_iter().map(|(_, _, key)| key).collect();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Node;

    fn arena_with(ids: &[u32]) -> (NodeArena, Vec<NodeKey>) {
        let mut arena = NodeArena::new();
        let keys = ids
            .iter()
            .map(|&id| arena.insert(Node::new(id)))
            .collect();
        (arena, keys)
    }

    #[test]
    fn test_add_takes_one_share() {
        let (mut arena, keys) = arena_with(&[0]);
        let mut list = NodeList::new();

        list.add(&mut arena, keys[0]);
        list.add(&mut arena, keys[0]);

        assert_eq!(list.len(), 1);
        assert_eq!(arena.ref_count(keys[0]), 1);
    }

    #[test]
    fn test_shares_across_lists() {
        let (mut arena, keys) = arena_with(&[0]);
        let mut a = NodeList::new();
        let mut b = NodeList::new();

        a.add(&mut arena, keys[0]);
        b.add(&mut arena, keys[0]);
        assert_eq!(arena.ref_count(keys[0]), 2);

        a.del(&mut arena, keys[0]);
        assert!(arena.contains(keys[0]));
        assert_eq!(arena.ref_count(keys[0]), 1);

        b.del(&mut arena, keys[0]);
        assert!(!arena.contains(keys[0]));
    }

    #[test]
    fn test_del_absent_is_noop() {
        let (mut arena, keys) = arena_with(&[0, 1]);
        let mut a = NodeList::new();
        let mut b = NodeList::new();
        a.add(&mut arena, keys[0]);
        b.add(&mut arena, keys[1]);

        a.del(&mut arena, keys[1]);

        assert_eq!(arena.ref_count(keys[1]), 1);
        assert_eq!(a.len(), 1);
    }

    #[test]
    fn test_add_stale_key_is_ignored() {
        let (mut arena, keys) = arena_with(&[0]);
        let mut a = NodeList::new();
        a.add(&mut arena, keys[0]);
        a.clear(&mut arena);

        a.add(&mut arena, keys[0]);
        assert!(a.is_empty());
    }

    #[test]
    fn test_get_by_record() {
        let (mut arena, keys) = arena_with(&[4, 7, 7]);
        let mut list = NodeList::new();
        for &key in &keys {
            list.add(&mut arena, key);
        }

        assert_eq!(list.get(&arena, 7), Some(keys[1]));
        assert_eq!(list.get(&arena, 4), Some(keys[0]));
        assert_eq!(list.get(&arena, 99), None);
    }

    #[test]
    fn test_clear_is_idempotent() {
        let (mut arena, keys) = arena_with(&[0, 1]);
        let mut list = NodeList::new();
        list.add(&mut arena, keys[0]);
        list.add(&mut arena, keys[1]);

        list.clear(&mut arena);
        list.clear(&mut arena);

        assert!(list.is_empty());
        assert!(arena.is_empty());
    }

    #[test]
    fn test_assign_keeps_counts_exact() {
        let (mut arena, keys) = arena_with(&[0, 1, 2]);
        let mut a = NodeList::new();
        let mut b = NodeList::new();
        a.add(&mut arena, keys[0]);
        a.add(&mut arena, keys[1]);
        b.add(&mut arena, keys[1]);
        b.add(&mut arena, keys[2]);

        a.assign(&mut arena, &b);

        assert_eq!(a.as_slice(), b.as_slice());
        assert!(!arena.contains(keys[0]));
        assert_eq!(arena.ref_count(keys[1]), 2);
        assert_eq!(arena.ref_count(keys[2]), 2);
    }

    #[test]
    fn test_validate_drops_invalid_records() {
        use crate::source::{Record, RecordTable};

        let mut table = RecordTable::new();
        let r0 = table.insert(Record::new("NiNode"));
        let r1 = table.insert(Record::new("NiNode"));

        let (mut arena, keys) = arena_with(&[r0, r1]);
        let mut list = NodeList::new();
        list.add(&mut arena, keys[0]);
        list.add(&mut arena, keys[1]);

        table.remove(r1);
        list.validate(&mut arena, &table);

        assert_eq!(list.as_slice(), &[keys[0]]);
        assert!(!arena.contains(keys[1]));
    }

    #[test]
    fn test_sort_opaque_ascending_is_stable() {
        let (mut arena, keys) = arena_with(&[0, 1, 2, 3]);
        let mut list = NodeList::new();
        for &key in &keys {
            list.add(&mut arena, key);
        }
        let depths = [3.0, 1.0, 2.0, 1.0];

        list.sort(&arena, |key| depths[key.index() as usize]);

        assert_eq!(list.as_slice(), &[keys[1], keys[3], keys[2], keys[0]]);
    }
}
