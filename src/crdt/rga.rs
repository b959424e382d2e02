//! Replicated Growable Array (RGA) position resolver.
//!
//! The document is a tree. Every resolved insert is a node whose parent is
//! the element it was anchored after (or the root), and document order is a
//! preorder walk: a node, then its children's subtrees in sibling order,
//! then the node's next sibling. Text typed after a character therefore
//! appears after that character and before anything that was already
//! following it from a concurrent anchor.
//!
//! Key design decisions:
//!
//! 1. **Arena**: nodes live in a `Vec` and refer to each other by index.
//!    Parent and child links are plain `u32`s, so there are no ownership
//!    cycles and the whole tree can be cloned or walked without borrow
//!    juggling.
//!
//! 2. **Id index**: an `FxHashMap` from `OpId` to arena index resolves
//!    anchors and delete targets in O(1).
//!
//! 3. **Sorted children**: each node keeps its children sorted by
//!    `SiblingKey`, so integrating a concurrent insert is a binary search
//!    and the result never depends on arrival order.
//!
//! 4. **Tombstones stay**: deleting only flips a flag. The node keeps its
//!    place and remains a valid anchor.
//!
//! 5. **Iterative walks**: traversal keeps an explicit stack, so a long
//!    chain of characters typed one after another cannot overflow the call
//!    stack.

use rustc_hash::FxHashMap;
use smallvec::SmallVec;

use super::conflict;
use super::conflict::SiblingKey;
use super::primitives::Anchor;
use super::primitives::ClientId;
use super::primitives::OpId;
use super::primitives::ROOT;

/// Index of a node in the arena.
pub type NodeIdx = u32;

/// The root sentinel always lives at index 0.
pub const ROOT_IDX: NodeIdx = 0;

/// An element of the document.
#[derive(Clone, Debug)]
pub struct Node {
    /// The insert that created this element.
    pub id: OpId,
    /// The client that created it, for tie-breaking.
    pub client: ClientId,
    /// The character. The root holds `'\0'` and is never visible.
    pub ch: char,
    /// The element this one was anchored after.
    pub parent: NodeIdx,
    /// Elements anchored after this one, sorted by `SiblingKey`.
    /// Most elements have at most one child (the next character typed).
    pub children: SmallVec<[NodeIdx; 2]>,
    /// Whether the element has been deleted.
    pub deleted: bool,
}

impl Node {
    fn key(&self) -> SiblingKey<'_> {
        return SiblingKey::new(&self.client, &self.id);
    }
}

/// Result of integrating an insert.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Inserted {
    /// A new node was attached at this index.
    New(NodeIdx),
    /// The op id was already present; nothing changed.
    Duplicate(NodeIdx),
}

/// The anchor an insert refers to has not been resolved yet.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Unresolved(pub OpId);

/// The causal tree of one document.
#[derive(Clone, Debug)]
pub struct Rga {
    /// All nodes, root first, in the order they were integrated.
    nodes: Vec<Node>,
    /// Maps an insert's op id to its node.
    index: FxHashMap<OpId, NodeIdx>,
    /// Number of nodes that are not tombstoned (root excluded).
    live: usize,
}

impl Rga {
    /// Create a tree holding only the root.
    pub fn new() -> Rga {
        let root = Node {
            id: OpId::new(ROOT),
            client: ClientId::new(""),
            ch: '\0',
            parent: ROOT_IDX,
            children: SmallVec::new(),
            deleted: true,
        };
        return Rga {
            nodes: vec![root],
            index: FxHashMap::default(),
            live: 0,
        };
    }

    /// Number of visible elements.
    pub fn len(&self) -> usize {
        return self.live;
    }

    pub fn is_empty(&self) -> bool {
        return self.live == 0;
    }

    /// Number of elements ever inserted, tombstones included.
    pub fn node_count(&self) -> usize {
        return self.nodes.len() - 1;
    }

    /// Whether the insert `id` has been integrated.
    pub fn contains(&self, id: &str) -> bool {
        return self.index.contains_key(id);
    }

    /// Arena index of the element created by `id`.
    pub fn lookup(&self, id: &str) -> Option<NodeIdx> {
        return self.index.get(id).copied();
    }

    pub fn node(&self, idx: NodeIdx) -> &Node {
        return &self.nodes[idx as usize];
    }

    /// Resolve an anchor to a node index.
    pub fn resolve(&self, anchor: &Anchor) -> Option<NodeIdx> {
        match anchor {
            Anchor::Root => Some(ROOT_IDX),
            Anchor::After(id) => self.lookup(id.as_str()),
        }
    }

    /// Attach a new element after `anchor`.
    ///
    /// The element is placed among the anchor's existing children by
    /// `SiblingKey`. Applying the same op id twice is a no-op that reports
    /// `Duplicate`.
    pub fn apply_insert(
        &mut self,
        id: &OpId,
        client: &ClientId,
        ch: char,
        anchor: &Anchor,
    ) -> Result<Inserted, Unresolved> {
        if let Some(existing) = self.lookup(id.as_str()) {
            return Ok(Inserted::Duplicate(existing));
        }
        let parent = match self.resolve(anchor) {
            Some(parent) => parent,
            None => {
                let missing = anchor.op_id().cloned().unwrap_or_else(|| OpId::new(ROOT));
                return Err(Unresolved(missing));
            }
        };

        let idx = self.nodes.len() as NodeIdx;
        let key = SiblingKey::new(client, id);
        let nodes = &self.nodes;
        let siblings = &nodes[parent as usize].children;
        let pos = match conflict::place(siblings, key, |s| nodes[s as usize].key()) {
            Ok(pos) | Err(pos) => pos,
        };

        self.nodes[parent as usize].children.insert(pos, idx);
        self.nodes.push(Node {
            id: id.clone(),
            client: client.clone(),
            ch,
            parent,
            children: SmallVec::new(),
            deleted: false,
        });
        self.index.insert(id.clone(), idx);
        self.live += 1;

        log::trace!("attached {} under {} at sibling slot {}", id, self.nodes[parent as usize].id, pos);
        return Ok(Inserted::New(idx));
    }

    /// Flag a node as deleted. Returns false if it already was.
    pub(crate) fn mark_deleted(&mut self, idx: NodeIdx) -> bool {
        let node = &mut self.nodes[idx as usize];
        if node.deleted {
            return false;
        }
        node.deleted = true;
        self.live -= 1;
        return true;
    }

    /// Walk every element (tombstones included) in document order.
    pub fn iter(&self) -> Preorder<'_> {
        return Preorder::new(self);
    }

    /// Visible index of the element created by `id`, if it is live.
    pub fn position_of(&self, id: &str) -> Option<usize> {
        let target = self.lookup(id)?;
        if self.node(target).deleted {
            return None;
        }
        let mut pos = 0;
        for idx in self.iter() {
            if idx == target {
                return Some(pos);
            }
            if !self.node(idx).deleted {
                pos += 1;
            }
        }
        return None;
    }

    /// The op id of the visible element at `index`.
    pub fn id_at(&self, index: usize) -> Option<&OpId> {
        return self
            .iter()
            .filter(|&idx| !self.node(idx).deleted)
            .nth(index)
            .map(|idx| &self.node(idx).id);
    }
}

impl Default for Rga {
    fn default() -> Self {
        return Self::new();
    }
}

/// Preorder iterator over the tree, root excluded.
///
/// Holds an explicit stack of pending subtrees rather than recursing.
/// The iterator is cheap to create, so restarting a walk means calling
/// `Rga::iter` again.
pub struct Preorder<'a> {
    rga: &'a Rga,
    stack: Vec<NodeIdx>,
}

impl<'a> Preorder<'a> {
    fn new(rga: &'a Rga) -> Preorder<'a> {
        let root = rga.node(ROOT_IDX);
        let stack = root.children.iter().rev().copied().collect();
        return Preorder { rga, stack };
    }
}

impl Iterator for Preorder<'_> {
    type Item = NodeIdx;

    fn next(&mut self) -> Option<NodeIdx> {
        let idx = self.stack.pop()?;
        // Children go on in reverse so the first sibling is visited first
        let node = self.rga.node(idx);
        self.stack.extend(node.children.iter().rev().copied());
        return Some(idx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn insert(rga: &mut Rga, id: &str, client: &str, ch: char, after: &str) -> Inserted {
        return rga
            .apply_insert(&OpId::new(id), &ClientId::new(client), ch, &Anchor::parse(after))
            .unwrap();
    }

    fn text(rga: &Rga) -> String {
        return rga
            .iter()
            .map(|idx| rga.node(idx))
            .filter(|node| !node.deleted)
            .map(|node| node.ch)
            .collect();
    }

    #[test]
    fn empty_tree() {
        let rga = Rga::new();
        assert_eq!(rga.len(), 0);
        assert!(rga.is_empty());
        assert_eq!(rga.node_count(), 0);
        assert_eq!(text(&rga), "");
        assert_eq!(rga.iter().count(), 0);
    }

    #[test]
    fn sequential_typing_forms_a_chain() {
        let mut rga = Rga::new();
        insert(&mut rga, "a1", "alice", 'h', "root");
        insert(&mut rga, "a2", "alice", 'i', "a1");
        insert(&mut rga, "a3", "alice", '!', "a2");
        assert_eq!(text(&rga), "hi!");
        assert_eq!(rga.len(), 3);
    }

    #[test]
    fn insert_in_middle_goes_between_anchor_and_its_old_successor() {
        let mut rga = Rga::new();
        insert(&mut rga, "a1", "alice", 'h', "root");
        insert(&mut rga, "a2", "alice", 'l', "a1");
        insert(&mut rga, "a3", "alice", 'o', "a2");
        // "e" anchored after "h" sorts before the existing child "l"
        insert(&mut rga, "a0", "alice", 'e', "a1");
        assert_eq!(text(&rga), "helo");
    }

    #[test]
    fn concurrent_siblings_sorted_by_client() {
        let mut rga = Rga::new();
        insert(&mut rga, "b1", "bob", 'B', "root");
        insert(&mut rga, "a1", "alice", 'A', "root");
        insert(&mut rga, "c1", "carol", 'C', "root");
        assert_eq!(text(&rga), "ABC");
    }

    #[test]
    fn subtree_stays_with_its_anchor() {
        let mut rga = Rga::new();
        insert(&mut rga, "a1", "alice", 'a', "root");
        insert(&mut rga, "b1", "bob", 'x', "root");
        insert(&mut rga, "a2", "alice", 'b', "a1");
        insert(&mut rga, "b2", "bob", 'y', "b1");
        // Each client's run stays contiguous
        assert_eq!(text(&rga), "abxy");
    }

    #[test]
    fn duplicate_insert_is_reported_and_ignored() {
        let mut rga = Rga::new();
        let first = insert(&mut rga, "a1", "alice", 'h', "root");
        let second = insert(&mut rga, "a1", "alice", 'h', "root");
        assert_eq!(first, Inserted::New(1));
        assert_eq!(second, Inserted::Duplicate(1));
        assert_eq!(rga.len(), 1);
        assert_eq!(rga.node(ROOT_IDX).children.len(), 1);
    }

    #[test]
    fn unresolved_anchor_is_an_error() {
        let mut rga = Rga::new();
        let result = rga.apply_insert(&OpId::new("a2"), &ClientId::new("alice"), 'x', &Anchor::parse("a1"));
        assert_eq!(result, Err(Unresolved(OpId::new("a1"))));
        assert_eq!(rga.node_count(), 0);
    }

    #[test]
    fn tombstone_keeps_position_and_anchors() {
        let mut rga = Rga::new();
        insert(&mut rga, "a1", "alice", 'h', "root");
        insert(&mut rga, "a2", "alice", 'i', "a1");
        let idx = rga.lookup("a1").unwrap();
        assert!(rga.mark_deleted(idx));
        assert!(!rga.mark_deleted(idx));
        assert_eq!(text(&rga), "i");
        assert_eq!(rga.len(), 1);
        assert_eq!(rga.node_count(), 2);

        // Anchoring after a tombstone still works
        insert(&mut rga, "b1", "bob", 'o', "a1");
        assert_eq!(text(&rga), "io");
    }

    #[test]
    fn position_and_id_lookup() {
        let mut rga = Rga::new();
        insert(&mut rga, "a1", "alice", 'a', "root");
        insert(&mut rga, "a2", "alice", 'b', "a1");
        insert(&mut rga, "a3", "alice", 'c', "a2");
        let idx = rga.lookup("a2").unwrap();
        rga.mark_deleted(idx);

        assert_eq!(rga.position_of("a1"), Some(0));
        assert_eq!(rga.position_of("a2"), None);
        assert_eq!(rga.position_of("a3"), Some(1));
        assert_eq!(rga.position_of("zz"), None);

        assert_eq!(rga.id_at(0), Some(&OpId::new("a1")));
        assert_eq!(rga.id_at(1), Some(&OpId::new("a3")));
        assert_eq!(rga.id_at(2), None);
    }

    #[test]
    fn long_chain_does_not_recurse() {
        let mut rga = Rga::new();
        let mut prev = "root".to_string();
        for i in 0..50_000 {
            let id = format!("op{:06}", i);
            insert(&mut rga, &id, "alice", 'x', &prev);
            prev = id;
        }
        assert_eq!(rga.iter().count(), 50_000);
        assert_eq!(rga.position_of(&prev), Some(49_999));
    }
}
