use crate::node::Node;
use crate::node_list::NodeList;

/// Generation-checked handle to a node in a [`NodeArena`].
///
/// Keys stay valid until the node is destroyed. After that every lookup
/// through the key fails, even if the slot is reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeKey {
    index: u32,
    generation: u32,
}

impl NodeKey {
    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }
}

#[derive(Debug)]
struct Entry {
    refs: u32,
    node: Node,
}

#[derive(Debug, Default)]
struct Slot {
    generation: u32,
    entry: Option<Entry>,
}

/// Storage for every node of a scene together with its shared reference
/// count.
///
/// A node's count is the number of [`NodeList`] memberships it holds. When a
/// release drops the count to zero the node is destroyed: its children list
/// is cleared and surviving children lose their parent back-reference.
#[derive(Debug, Default)]
pub struct NodeArena {
    slots: Vec<Slot>,
    free_indices: Vec<usize>,
    len: usize,
}

impl NodeArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a node with a reference count of zero.
    ///
    /// The caller is expected to add the key to a list straight away.
    pub fn insert(&mut self, node: Node) -> NodeKey {
        let entry = Some(Entry { refs: 0, node });
        self.len += 1;

        if let Some(index) = self.free_indices.pop() {
            let slot = &mut self.slots[index];
            slot.entry = entry;
            return NodeKey {
                index: index as u32,
                generation: slot.generation,
            };
        }

        self.slots.push(Slot {
            generation: 0,
            entry,
        });
        NodeKey {
            index: (self.slots.len() - 1) as u32,
            generation: 0,
        }
    }

    fn entry(&self, key: NodeKey) -> Option<&Entry> {
        self.slots
            .get(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_ref())
    }

    fn entry_mut(&mut self, key: NodeKey) -> Option<&mut Entry> {
        self.slots
            .get_mut(key.index as usize)
            .filter(|slot| slot.generation == key.generation)
            .and_then(|slot| slot.entry.as_mut())
    }

    pub fn get(&self, key: NodeKey) -> Option<&Node> {
        self.entry(key).map(|e| &e.node)
    }

    pub fn get_mut(&mut self, key: NodeKey) -> Option<&mut Node> {
        self.entry_mut(key).map(|e| &mut e.node)
    }

    pub fn contains(&self, key: NodeKey) -> bool {
        self.entry(key).is_some()
    }

    /// Current shared reference count, zero for a destroyed node.
    pub fn ref_count(&self, key: NodeKey) -> u32 {
        self.entry(key).map_or(0, |e| e.refs)
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[cfg(test)]
    pub(crate) fn iter(&self) -> impl Iterator<Item = (NodeKey, &Node)> {
        self.slots.iter().enumerate().filter_map(|(index, slot)| {
            slot.entry.as_ref().map(|entry| {
                (
                    NodeKey {
                        index: index as u32,
                        generation: slot.generation,
                    },
                    &entry.node,
                )
            })
        })
    }

    /// Adds one share. Returns false if the node is gone.
    pub(crate) fn acquire(&mut self, key: NodeKey) -> bool {
        match self.entry_mut(key) {
            Some(entry) => {
                entry.refs += 1;
                true
            }
            None => false,
        }
    }

    /// Releases `count` shares, destroying the node once none remain.
    pub(crate) fn release(&mut self, key: NodeKey, count: u32) {
        let Some(entry) = self.entry_mut(key) else {
            return;
        };
        if entry.refs <= count {
            self.destroy(key);
        } else {
            entry.refs -= count;
        }
    }

    fn destroy(&mut self, key: NodeKey) {
        let index = key.index as usize;
        let Some(entry) = self.slots[index].entry.take() else {
            return;
        };
        self.slots[index].generation = self.slots[index].generation.wrapping_add(1);
        self.free_indices.push(index);
        self.len -= 1;

        log::trace!("Destroyed node {} (slot {})", entry.node.id(), index);

        let mut children = entry.node.into_children();
        for child in children.iter() {
            if let Some(node) = self.get_mut(child) {
                if node.parent() == Some(key) {
                    node.set_parent(None);
                }
            }
        }
        children.clear(self);
    }

    /// Runs `f` on a node's children list.
    ///
    /// The list is moved out of the node while `f` runs so that `f` can
    /// mutate the arena. Returns `None` if the node is gone.
    pub(crate) fn with_children<R>(
        &mut self,
        key: NodeKey,
        f: impl FnOnce(&mut NodeList, &mut NodeArena) -> R,
    ) -> Option<R> {
        let mut children = std::mem::take(self.get_mut(key)?.children_mut());
        let result = f(&mut children, self);
        match self.get_mut(key) {
            Some(node) => *node.children_mut() = children,
            None => children.clear(self),
        }
        Some(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_and_get() {
        let mut arena = NodeArena::new();
        let key = arena.insert(Node::new(3));

        assert!(arena.contains(key));
        assert_eq!(arena.get(key).unwrap().id(), 3);
        assert_eq!(arena.ref_count(key), 0);
        assert_eq!(arena.len(), 1);
    }

    #[test]
    fn test_release_destroys_at_zero() {
        let mut arena = NodeArena::new();
        let key = arena.insert(Node::new(1));
        arena.acquire(key);
        arena.acquire(key);

        arena.release(key, 1);
        assert_eq!(arena.ref_count(key), 1);

        arena.release(key, 1);
        assert!(!arena.contains(key));
        assert_eq!(arena.ref_count(key), 0);
        assert!(arena.is_empty());
    }

    #[test]
    fn test_release_more_than_held_destroys() {
        let mut arena = NodeArena::new();
        let key = arena.insert(Node::new(1));
        arena.acquire(key);

        arena.release(key, 5);
        assert!(!arena.contains(key));
    }

    #[test]
    fn test_stale_key_after_slot_reuse() {
        let mut arena = NodeArena::new();
        let old = arena.insert(Node::new(1));
        arena.acquire(old);
        arena.release(old, 1);

        let new = arena.insert(Node::new(2));
        assert_eq!(old.index(), new.index());
        assert_ne!(old.generation(), new.generation());
        assert!(arena.get(old).is_none());
        assert_eq!(arena.get(new).unwrap().id(), 2);
        assert!(!arena.acquire(old));
    }

    #[test]
    fn test_destroy_detaches_surviving_children() {
        let mut arena = NodeArena::new();
        let mut keep = NodeList::new();

        let parent = arena.insert(Node::new(0));
        let child = arena.insert(Node::new(1));
        keep.add(&mut arena, parent);
        keep.add(&mut arena, child);

        arena.with_children(parent, |children, arena| children.add(arena, child));
        arena.get_mut(child).unwrap().set_parent(Some(parent));
        assert_eq!(arena.ref_count(child), 2);

        keep.del(&mut arena, parent);

        assert!(!arena.contains(parent));
        assert!(arena.contains(child));
        assert_eq!(arena.ref_count(child), 1);
        assert_eq!(arena.get(child).unwrap().parent(), None);
    }

    #[test]
    fn test_destroy_cascades_to_unshared_children() {
        let mut arena = NodeArena::new();
        let mut keep = NodeList::new();

        let parent = arena.insert(Node::new(0));
        let child = arena.insert(Node::new(1));
        keep.add(&mut arena, parent);
        arena.with_children(parent, |children, arena| children.add(arena, child));

        keep.clear(&mut arena);

        assert!(!arena.contains(parent));
        assert!(!arena.contains(child));
        assert!(arena.is_empty());
    }

    #[test]
    fn test_iter_skips_destroyed() {
        let mut arena = NodeArena::new();
        let mut keep = NodeList::new();
        let a = arena.insert(Node::new(10));
        let b = arena.insert(Node::new(11));
        keep.add(&mut arena, a);
        keep.add(&mut arena, b);
        keep.del(&mut arena, a);

        let ids: Vec<_> = arena.iter().map(|(_, node)| node.id()).collect();
        assert_eq!(ids, vec![11]);
    }
}
