//! Nested-set tree arena.
//!
//! A [`NestedSet`] holds every node of one scope (a site's draft tree or its
//! published tree) keyed by id, with `lft`/`rgt`/`depth` boundaries that are
//! renumbered on every structural mutation. The arena is only ever built from
//! rows loaded inside a store session and is dropped with it, so boundary
//! values are never reused across transactions.
//!
//! Every mutator records the ids whose boundaries or parent changed; the
//! owner drains them with [`NestedSet::take_touched`] to know which rows to
//! write back.

use std::collections::{HashMap, HashSet};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Nested-set boundaries of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Bounds {
    pub lft: i32,
    pub rgt: i32,
    pub depth: i32,
}

impl Bounds {
    /// Number of boundary slots used by the node and its descendants.
    pub fn width(&self) -> i32 {
        self.rgt - self.lft + 1
    }

    /// True when `other` lies strictly inside this interval.
    pub fn contains(&self, other: &Bounds) -> bool {
        self.lft < other.lft && other.rgt < self.rgt
    }
}

/// A value that can live in a [`NestedSet`].
pub trait NestedNode: Clone {
    fn node_id(&self) -> Uuid;
    fn parent_id(&self) -> Option<Uuid>;
    fn set_parent_id(&mut self, parent: Option<Uuid>);
    fn bounds(&self) -> Bounds;
    fn set_bounds(&mut self, bounds: Bounds);
}

/// Structural errors raised by tree primitives.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node {0} is not in this tree")]
    NodeNotFound(Uuid),

    #[error("node {0} is already in this tree")]
    DuplicateNode(Uuid),

    #[error("node {0} cannot be positioned relative to itself")]
    SelfReference(Uuid),

    #[error("node {node} cannot be placed relative to its own descendant {target}")]
    Cycle { node: Uuid, target: Uuid },

    #[error("malformed nested set: {0}")]
    Malformed(String),
}

/// Where a moved subtree lands relative to its target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    After,
    Before,
    LastChild,
}

/// Arena of nodes for a single scope.
#[derive(Debug, Clone)]
pub struct NestedSet<T> {
    nodes: HashMap<Uuid, T>,
    by_lft: HashMap<i32, Uuid>,
    by_rgt: HashMap<i32, Uuid>,
    touched: HashSet<Uuid>,
}

impl<T> Default for NestedSet<T> {
    fn default() -> Self {
        Self {
            nodes: HashMap::new(),
            by_lft: HashMap::new(),
            by_rgt: HashMap::new(),
            touched: HashSet::new(),
        }
    }
}

impl<T: NestedNode> NestedSet<T> {
    /// Create an empty tree.
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a tree from stored nodes, rejecting malformed numbering.
    pub fn from_nodes(nodes: impl IntoIterator<Item = T>) -> Result<Self, TreeError> {
        let mut tree = Self::new();
        for node in nodes {
            let id = node.node_id();
            if tree.nodes.insert(id, node).is_some() {
                return Err(TreeError::DuplicateNode(id));
            }
        }
        tree.reindex();
        tree.verify()?;
        Ok(tree)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn contains(&self, id: Uuid) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn get(&self, id: Uuid) -> Option<&T> {
        self.nodes.get(&id)
    }

    /// Nodes in unspecified order.
    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.nodes.values()
    }

    /// All nodes in tree order (ascending `lft`).
    pub fn ordered(&self) -> Vec<&T> {
        let mut nodes: Vec<&T> = self.nodes.values().collect();
        nodes.sort_by_key(|n| n.bounds().lft);
        nodes
    }

    /// Nodes without a parent, in tree order.
    pub fn roots(&self) -> Vec<&T> {
        self.ordered()
            .into_iter()
            .filter(|n| n.parent_id().is_none())
            .collect()
    }

    /// Modify non-structural attributes of a node.
    ///
    /// Bounds and parent are restored after `f` runs; use the move
    /// operations to change position.
    pub fn modify<R>(&mut self, id: Uuid, f: impl FnOnce(&mut T) -> R) -> Option<R> {
        let node = self.nodes.get_mut(&id)?;
        let bounds = node.bounds();
        let parent = node.parent_id();
        let out = f(node);
        node.set_bounds(bounds);
        node.set_parent_id(parent);
        self.touched.insert(id);
        Some(out)
    }

    /// Drain the ids changed since the last call.
    pub fn take_touched(&mut self) -> HashSet<Uuid> {
        std::mem::take(&mut self.touched)
    }

    /// Previous sibling: the same-parent node ending right before `id` starts.
    pub fn sibling_before(&self, id: Uuid) -> Option<&T> {
        let node = self.nodes.get(&id)?;
        let candidate = self
            .by_rgt
            .get(&(node.bounds().lft - 1))
            .and_then(|cid| self.nodes.get(cid))?;
        (candidate.parent_id() == node.parent_id()).then_some(candidate)
    }

    /// Next sibling: the same-parent node starting right after `id` ends.
    pub fn sibling_after(&self, id: Uuid) -> Option<&T> {
        let node = self.nodes.get(&id)?;
        let candidate = self
            .by_lft
            .get(&(node.bounds().rgt + 1))
            .and_then(|cid| self.nodes.get(cid))?;
        (candidate.parent_id() == node.parent_id()).then_some(candidate)
    }

    /// Direct children of `id` in order.
    pub fn children(&self, id: Uuid) -> Vec<&T> {
        self.descendants(id)
            .into_iter()
            .filter(|n| n.parent_id() == Some(id))
            .collect()
    }

    /// Same-parent nodes other than `id`, in order.
    pub fn siblings(&self, id: Uuid) -> Vec<&T> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let parent = node.parent_id();
        self.ordered()
            .into_iter()
            .filter(|n| n.parent_id() == parent && n.node_id() != id)
            .collect()
    }

    /// Every node strictly inside `id`'s interval, in tree order.
    pub fn descendants(&self, id: Uuid) -> Vec<&T> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let outer = node.bounds();
        let mut out: Vec<&T> = self
            .nodes
            .values()
            .filter(|n| outer.contains(&n.bounds()))
            .collect();
        out.sort_by_key(|n| n.bounds().lft);
        out
    }

    /// Every node whose interval strictly contains `id`'s, root first.
    pub fn ancestors(&self, id: Uuid) -> Vec<&T> {
        let Some(node) = self.nodes.get(&id) else {
            return Vec::new();
        };
        let inner = node.bounds();
        let mut out: Vec<&T> = self
            .nodes
            .values()
            .filter(|n| n.bounds().contains(&inner))
            .collect();
        out.sort_by_key(|n| n.bounds().lft);
        out
    }

    /// True when `id` lies inside `ancestor`'s subtree.
    pub fn is_descendant_of(&self, id: Uuid, ancestor: Uuid) -> bool {
        match (self.nodes.get(&id), self.nodes.get(&ancestor)) {
            (Some(n), Some(a)) => a.bounds().contains(&n.bounds()),
            _ => false,
        }
    }

    /// Append `node` as a new root after every existing node.
    pub fn insert_root(&mut self, mut node: T) -> Result<(), TreeError> {
        let id = node.node_id();
        if self.nodes.contains_key(&id) {
            return Err(TreeError::DuplicateNode(id));
        }
        let lft = self.max_rgt() + 1;
        node.set_parent_id(None);
        node.set_bounds(Bounds {
            lft,
            rgt: lft + 1,
            depth: 0,
        });
        self.nodes.insert(id, node);
        self.touched.insert(id);
        self.reindex();
        Ok(())
    }

    /// Append `node` as the last child of `parent_id`.
    pub fn insert_child(&mut self, parent_id: Uuid, mut node: T) -> Result<(), TreeError> {
        let id = node.node_id();
        if self.nodes.contains_key(&id) {
            return Err(TreeError::DuplicateNode(id));
        }
        let parent = self
            .nodes
            .get(&parent_id)
            .map(NestedNode::bounds)
            .ok_or(TreeError::NodeNotFound(parent_id))?;

        self.shift_from(parent.rgt, 2);
        node.set_parent_id(Some(parent_id));
        node.set_bounds(Bounds {
            lft: parent.rgt,
            rgt: parent.rgt + 1,
            depth: parent.depth + 1,
        });
        self.nodes.insert(id, node);
        self.touched.insert(id);
        self.reindex();
        Ok(())
    }

    /// Remove `id` and its descendants, closing the gap they leave.
    ///
    /// Removed nodes are returned in tree order.
    pub fn remove_subtree(&mut self, id: Uuid) -> Result<Vec<T>, TreeError> {
        let bounds = self
            .nodes
            .get(&id)
            .map(NestedNode::bounds)
            .ok_or(TreeError::NodeNotFound(id))?;

        let mut removed = self.detach(bounds);
        removed.sort_by_key(|n| n.bounds().lft);
        self.shift_from(bounds.rgt + 1, -bounds.width());
        self.reindex();
        Ok(removed)
    }

    /// Reposition `id` (with its subtree) immediately after `target`.
    pub fn move_as_next_sibling_of(&mut self, id: Uuid, target: Uuid) -> Result<(), TreeError> {
        if self.sibling_before(id).map(NestedNode::node_id) == Some(target) {
            return Ok(());
        }
        self.move_subtree(id, target, Placement::After)
    }

    /// Reposition `id` (with its subtree) immediately before `target`.
    pub fn move_as_previous_sibling_of(
        &mut self,
        id: Uuid,
        target: Uuid,
    ) -> Result<(), TreeError> {
        if self.sibling_after(id).map(NestedNode::node_id) == Some(target) {
            return Ok(());
        }
        self.move_subtree(id, target, Placement::Before)
    }

    /// Reposition `id` (with its subtree) as the last child of `parent`.
    pub fn move_as_last_child_of(&mut self, id: Uuid, parent: Uuid) -> Result<(), TreeError> {
        let in_place = match (self.nodes.get(&id), self.nodes.get(&parent)) {
            (Some(node), Some(target)) => {
                node.parent_id() == Some(parent) && node.bounds().rgt + 1 == target.bounds().rgt
            }
            _ => false,
        };
        if in_place {
            return Ok(());
        }
        self.move_subtree(id, parent, Placement::LastChild)
    }

    /// Check nested-set well-formedness.
    ///
    /// Boundaries must be unique and fill `1..=2n`, every interval must have
    /// `lft < rgt`, intervals must nest or be disjoint, and each node's
    /// closest enclosing interval must be its parent at depth + 1.
    pub fn verify(&self) -> Result<(), TreeError> {
        let mut seen = HashSet::with_capacity(self.nodes.len() * 2);
        for node in self.nodes.values() {
            let b = node.bounds();
            if b.lft >= b.rgt {
                return Err(TreeError::Malformed(format!(
                    "node {} has lft {} >= rgt {}",
                    node.node_id(),
                    b.lft,
                    b.rgt
                )));
            }
            if !seen.insert(b.lft) || !seen.insert(b.rgt) {
                return Err(TreeError::Malformed(format!(
                    "node {} shares a boundary value",
                    node.node_id()
                )));
            }
        }
        let expected = i32::try_from(self.nodes.len() * 2)
            .map_err(|_| TreeError::Malformed("tree too large".to_string()))?;
        if (1..=expected).any(|v| !seen.contains(&v)) {
            return Err(TreeError::Malformed(
                "boundaries are not contiguous".to_string(),
            ));
        }

        let mut open: Vec<&T> = Vec::new();
        for node in self.ordered() {
            let b = node.bounds();
            while open.last().is_some_and(|top| top.bounds().rgt < b.lft) {
                open.pop();
            }
            match open.last() {
                Some(enclosing) => {
                    let eb = enclosing.bounds();
                    if b.rgt > eb.rgt {
                        return Err(TreeError::Malformed(format!(
                            "node {} overlaps {}",
                            node.node_id(),
                            enclosing.node_id()
                        )));
                    }
                    if node.parent_id() != Some(enclosing.node_id()) || b.depth != eb.depth + 1 {
                        return Err(TreeError::Malformed(format!(
                            "node {} is not numbered under its parent",
                            node.node_id()
                        )));
                    }
                }
                None => {
                    if node.parent_id().is_some() || b.depth != 0 {
                        return Err(TreeError::Malformed(format!(
                            "node {} lies outside its parent",
                            node.node_id()
                        )));
                    }
                }
            }
            open.push(node);
        }
        Ok(())
    }

    fn max_rgt(&self) -> i32 {
        self.nodes
            .values()
            .map(|n| n.bounds().rgt)
            .max()
            .unwrap_or(0)
    }

    /// Add `delta` to every boundary at or beyond `from`.
    fn shift_from(&mut self, from: i32, delta: i32) {
        for node in self.nodes.values_mut() {
            let mut b = node.bounds();
            let mut changed = false;
            if b.lft >= from {
                b.lft += delta;
                changed = true;
            }
            if b.rgt >= from {
                b.rgt += delta;
                changed = true;
            }
            if changed {
                node.set_bounds(b);
                self.touched.insert(node.node_id());
            }
        }
    }

    /// Take every node inside `bounds` (inclusive) out of the arena.
    fn detach(&mut self, bounds: Bounds) -> Vec<T> {
        let ids: Vec<Uuid> = self
            .nodes
            .values()
            .filter(|n| {
                let b = n.bounds();
                b.lft >= bounds.lft && b.rgt <= bounds.rgt
            })
            .map(NestedNode::node_id)
            .collect();

        ids.into_iter()
            .filter_map(|id| {
                self.touched.remove(&id);
                self.nodes.remove(&id)
            })
            .collect()
    }

    fn move_subtree(
        &mut self,
        id: Uuid,
        target: Uuid,
        placement: Placement,
    ) -> Result<(), TreeError> {
        let node = self
            .nodes
            .get(&id)
            .map(NestedNode::bounds)
            .ok_or(TreeError::NodeNotFound(id))?;
        let target_bounds = self
            .nodes
            .get(&target)
            .map(NestedNode::bounds)
            .ok_or(TreeError::NodeNotFound(target))?;
        if id == target {
            return Err(TreeError::SelfReference(id));
        }
        if node.contains(&target_bounds) {
            return Err(TreeError::Cycle { node: id, target });
        }

        let width = node.width();
        let subtree = self.detach(node);
        self.shift_from(node.rgt + 1, -width);

        // The target sits outside the subtree, so it survived the detach.
        let Some(anchor) = self.nodes.get(&target) else {
            return Err(TreeError::NodeNotFound(target));
        };
        let anchor_bounds = anchor.bounds();
        let (dest, parent, depth) = match placement {
            Placement::After => (anchor_bounds.rgt + 1, anchor.parent_id(), anchor_bounds.depth),
            Placement::Before => (anchor_bounds.lft, anchor.parent_id(), anchor_bounds.depth),
            Placement::LastChild => (anchor_bounds.rgt, Some(target), anchor_bounds.depth + 1),
        };

        self.shift_from(dest, width);
        for mut moved in subtree {
            let b = moved.bounds();
            moved.set_bounds(Bounds {
                lft: dest + (b.lft - node.lft),
                rgt: dest + (b.rgt - node.lft),
                depth: b.depth + (depth - node.depth),
            });
            if moved.node_id() == id {
                moved.set_parent_id(parent);
            }
            self.touched.insert(moved.node_id());
            self.nodes.insert(moved.node_id(), moved);
        }
        self.reindex();
        Ok(())
    }

    fn reindex(&mut self) {
        self.by_lft.clear();
        self.by_rgt.clear();
        for node in self.nodes.values() {
            let b = node.bounds();
            self.by_lft.insert(b.lft, node.node_id());
            self.by_rgt.insert(b.rgt, node.node_id());
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[derive(Debug, Clone)]
    struct Node {
        id: Uuid,
        name: &'static str,
        parent: Option<Uuid>,
        bounds: Bounds,
    }

    impl NestedNode for Node {
        fn node_id(&self) -> Uuid {
            self.id
        }
        fn parent_id(&self) -> Option<Uuid> {
            self.parent
        }
        fn set_parent_id(&mut self, parent: Option<Uuid>) {
            self.parent = parent;
        }
        fn bounds(&self) -> Bounds {
            self.bounds
        }
        fn set_bounds(&mut self, bounds: Bounds) {
            self.bounds = bounds;
        }
    }

    fn node(name: &'static str) -> Node {
        Node {
            id: Uuid::now_v7(),
            name,
            parent: None,
            bounds: Bounds {
                lft: 0,
                rgt: 0,
                depth: 0,
            },
        }
    }

    /// root
    /// ├── a
    /// │   └── a1
    /// ├── b
    /// └── c
    fn sample() -> (NestedSet<Node>, HashMap<&'static str, Uuid>) {
        let mut tree = NestedSet::new();
        let mut ids = HashMap::new();
        let root = node("root");
        ids.insert("root", root.id);
        tree.insert_root(root).unwrap();
        for name in ["a", "b", "c"] {
            let n = node(name);
            ids.insert(name, n.id);
            tree.insert_child(ids["root"], n).unwrap();
        }
        let a1 = node("a1");
        ids.insert("a1", a1.id);
        tree.insert_child(ids["a"], a1).unwrap();
        (tree, ids)
    }

    fn names(nodes: Vec<&Node>) -> Vec<&'static str> {
        nodes.into_iter().map(|n| n.name).collect()
    }

    #[test]
    fn insert_child_appends_last() {
        let (tree, ids) = sample();
        tree.verify().unwrap();
        assert_eq!(names(tree.children(ids["root"])), ["a", "b", "c"]);
        assert_eq!(names(tree.ordered()), ["root", "a", "a1", "b", "c"]);

        let root = tree.get(ids["root"]).unwrap().bounds;
        assert_eq!((root.lft, root.rgt), (1, 10));
        let a1 = tree.get(ids["a1"]).unwrap().bounds;
        assert_eq!((a1.lft, a1.rgt, a1.depth), (3, 4, 2));
    }

    #[test]
    fn sibling_adjacency() {
        let (tree, ids) = sample();
        assert_eq!(tree.sibling_before(ids["b"]).unwrap().name, "a");
        assert_eq!(tree.sibling_after(ids["b"]).unwrap().name, "c");
        assert!(tree.sibling_before(ids["a"]).is_none());
        assert!(tree.sibling_after(ids["c"]).is_none());
        // a1 is the only child of a; nothing adjacent under the same parent.
        assert!(tree.sibling_after(ids["a1"]).is_none());
    }

    #[test]
    fn ancestors_and_descendants() {
        let (tree, ids) = sample();
        assert_eq!(names(tree.ancestors(ids["a1"])), ["root", "a"]);
        assert_eq!(names(tree.descendants(ids["root"])), ["a", "a1", "b", "c"]);
        assert!(tree.is_descendant_of(ids["a1"], ids["root"]));
        assert!(!tree.is_descendant_of(ids["b"], ids["a"]));
    }

    #[test]
    fn move_forward_as_next_sibling() {
        let (mut tree, ids) = sample();
        tree.take_touched();
        tree.move_as_next_sibling_of(ids["a"], ids["c"]).unwrap();
        tree.verify().unwrap();
        assert_eq!(names(tree.ordered()), ["root", "b", "c", "a", "a1"]);
        assert_eq!(tree.get(ids["a1"]).unwrap().bounds.depth, 2);
        assert!(tree.take_touched().contains(&ids["a1"]));
    }

    #[test]
    fn move_backward_as_previous_sibling() {
        let (mut tree, ids) = sample();
        tree.move_as_previous_sibling_of(ids["c"], ids["a"]).unwrap();
        tree.verify().unwrap();
        assert_eq!(names(tree.children(ids["root"])), ["c", "a", "b"]);
    }

    #[test]
    fn move_into_other_parent_changes_depth() {
        let (mut tree, ids) = sample();
        tree.move_as_next_sibling_of(ids["c"], ids["a1"]).unwrap();
        tree.verify().unwrap();
        let c = tree.get(ids["c"]).unwrap();
        assert_eq!(c.parent, Some(ids["a"]));
        assert_eq!(c.bounds.depth, 2);

        tree.move_as_last_child_of(ids["a"], ids["b"]).unwrap();
        tree.verify().unwrap();
        assert_eq!(names(tree.ancestors(ids["c"])), ["root", "b", "a"]);
        assert_eq!(tree.get(ids["c"]).unwrap().bounds.depth, 3);
    }

    #[test]
    fn move_noop_when_already_in_place() {
        let (mut tree, ids) = sample();
        tree.take_touched();
        tree.move_as_next_sibling_of(ids["b"], ids["a"]).unwrap();
        tree.move_as_previous_sibling_of(ids["b"], ids["c"]).unwrap();
        tree.move_as_last_child_of(ids["c"], ids["root"]).unwrap();
        assert!(tree.take_touched().is_empty());
    }

    #[test]
    fn move_into_own_subtree_is_rejected() {
        let (mut tree, ids) = sample();
        let before = names(tree.ordered());
        assert_eq!(
            tree.move_as_next_sibling_of(ids["a"], ids["a1"]),
            Err(TreeError::Cycle {
                node: ids["a"],
                target: ids["a1"]
            })
        );
        assert_eq!(
            tree.move_as_last_child_of(ids["root"], ids["b"]),
            Err(TreeError::Cycle {
                node: ids["root"],
                target: ids["b"]
            })
        );
        assert_eq!(
            tree.move_as_next_sibling_of(ids["a"], ids["a"]),
            Err(TreeError::SelfReference(ids["a"]))
        );
        assert_eq!(names(tree.ordered()), before);
        tree.verify().unwrap();
    }

    #[test]
    fn move_relative_to_foreign_node_is_rejected() {
        let (mut tree, ids) = sample();
        let stranger = Uuid::now_v7();
        assert_eq!(
            tree.move_as_previous_sibling_of(ids["b"], stranger),
            Err(TreeError::NodeNotFound(stranger))
        );
    }

    #[test]
    fn remove_subtree_closes_gap() {
        let (mut tree, ids) = sample();
        let removed = tree.remove_subtree(ids["a"]).unwrap();
        assert_eq!(
            removed.iter().map(|n| n.name).collect::<Vec<_>>(),
            ["a", "a1"]
        );
        tree.verify().unwrap();
        assert_eq!(names(tree.ordered()), ["root", "b", "c"]);
        assert_eq!(tree.get(ids["root"]).unwrap().bounds.rgt, 6);
    }

    #[test]
    fn modify_keeps_position() {
        let (mut tree, ids) = sample();
        tree.modify(ids["b"], |n| {
            n.name = "renamed";
            n.bounds.lft = 99;
            n.parent = None;
        });
        tree.verify().unwrap();
        assert_eq!(tree.get(ids["b"]).unwrap().name, "renamed");
    }

    #[test]
    fn from_nodes_rejects_overlap() {
        let (tree, _) = sample();
        let mut nodes: Vec<Node> = tree.iter().cloned().collect();
        for n in &mut nodes {
            if n.name == "b" {
                n.bounds.rgt = 9;
            }
            if n.name == "c" {
                n.bounds.lft = 7;
                n.bounds.rgt = 8;
            }
        }
        assert!(matches!(
            NestedSet::from_nodes(nodes),
            Err(TreeError::Malformed(_))
        ));
    }

    #[test]
    fn second_root_is_appended() {
        let (mut tree, _) = sample();
        let other = node("other");
        let other_id = other.id;
        tree.insert_root(other).unwrap();
        tree.verify().unwrap();
        assert_eq!(names(tree.roots()), ["root", "other"]);
        assert_eq!(tree.get(other_id).unwrap().bounds.lft, 11);
    }
}
