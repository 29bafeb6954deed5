//! The progress node tree.
//!
//! A [`ProgressTree`] is an immutable arena of [`ProgressNode`]s built once
//! from authored configuration. It also carries the reverse index used to
//! route interaction events to the leaves that care about them, so a snap
//! or grab only re-evaluates affected conditions instead of the whole tree.
//!
//! Runtime flags (`active`, `completed`, latched `is_met`) live in
//! [`RuntimeState`], one per session, which keeps the authored tree
//! shareable across concurrent sessions.

mod node;
mod state;

use std::collections::{BTreeSet, HashMap};

use serde::Serialize;

use crate::object::ObjectRef;

pub use node::{LockPolicy, NodeId, NodeKind, ProgressNode};
pub use state::{NodeStatus, RuntimeState, SessionSnapshot};

/// Immutable authored hierarchy plus its event index.
#[derive(Debug, Clone, Serialize)]
pub struct ProgressTree {
    nodes: Vec<ProgressNode>,
    /// Exclusive end of each node's pre-order subtree range.
    #[serde(skip)]
    subtree_end: Vec<usize>,
    #[serde(skip)]
    by_object: HashMap<ObjectRef, Vec<NodeId>>,
    #[serde(skip)]
    by_predicate: HashMap<String, Vec<NodeId>>,
    #[serde(skip)]
    socket_watchers: Vec<NodeId>,
}

impl ProgressTree {
    /// Starts building a tree rooted at `root`.
    #[must_use]
    pub fn builder(root: ProgressNode) -> TreeBuilder {
        TreeBuilder::new(root)
    }

    /// The root id.
    #[must_use]
    pub const fn root(&self) -> NodeId {
        NodeId::ROOT
    }

    /// Number of nodes.
    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    /// Always false: a tree has at least its root.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Looks up a node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&ProgressNode> {
        self.nodes.get(id.0)
    }

    /// Looks up a node that is known to belong to this tree.
    pub(crate) fn get(&self, id: NodeId) -> &ProgressNode {
        &self.nodes[id.0]
    }

    /// True if `id` belongs to this tree.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        id.0 < self.nodes.len()
    }

    /// All nodes in pre-order.
    pub fn iter(&self) -> impl Iterator<Item = &ProgressNode> {
        self.nodes.iter()
    }

    /// All step nodes in pre-order.
    pub fn steps(&self) -> impl Iterator<Item = &ProgressNode> {
        self.nodes.iter().filter(|n| n.kind == NodeKind::Step)
    }

    /// Pre-order id range covering `id` and all its descendants.
    #[must_use]
    pub fn subtree(&self, id: NodeId) -> std::ops::Range<usize> {
        id.0..self.subtree_end.get(id.0).copied().unwrap_or(id.0)
    }

    /// Ids from the root down to `id`, inclusive.
    #[must_use]
    pub fn path_to(&self, id: NodeId) -> Vec<NodeId> {
        let mut path = Vec::new();
        let mut cursor = self.node(id).map(|n| n.id);
        while let Some(current) = cursor {
            path.push(current);
            cursor = self.get(current).parent;
        }
        path.reverse();
        path
    }

    /// `Program/Module/Group/Step` style location string.
    #[must_use]
    pub fn location(&self, id: NodeId) -> String {
        self.path_to(id)
            .into_iter()
            .map(|n| self.get(n).name.as_str())
            .collect::<Vec<_>>()
            .join("/")
    }

    /// Finds a node by its names from the root, excluding the root's own
    /// name, e.g. `["Module 1", "Group A", "Tighten bolt"]`.
    #[must_use]
    pub fn find(&self, names: &[&str]) -> Option<NodeId> {
        let mut current = self.root();
        for name in names {
            current = self
                .get(current)
                .children
                .iter()
                .copied()
                .find(|c| self.get(*c).name == *name)?;
        }
        Some(current)
    }

    /// Leaves whose conditions read facts about `object`.
    #[must_use]
    pub fn interested_in(&self, object: ObjectRef) -> &[NodeId] {
        self.by_object.get(&object).map_or(&[][..], Vec::as_slice)
    }

    /// Leaves whose conditions read the custom predicate `predicate_id`.
    #[must_use]
    pub fn interested_in_predicate(&self, predicate_id: &str) -> &[NodeId] {
        self.by_predicate
            .get(predicate_id)
            .map_or(&[][..], Vec::as_slice)
    }

    /// Leaves that depend on the dynamic socket set.
    #[must_use]
    pub fn socket_watchers(&self) -> &[NodeId] {
        &self.socket_watchers
    }

    /// Leaves affected by a snap between `point` and `object`.
    #[must_use]
    pub fn affected_by_snap(&self, point: ObjectRef, object: ObjectRef) -> BTreeSet<NodeId> {
        let mut out: BTreeSet<NodeId> = self.interested_in(point).iter().copied().collect();
        out.extend(self.interested_in(object).iter().copied());
        out.extend(self.socket_watchers.iter().copied());
        out
    }

    fn index(nodes: Vec<ProgressNode>) -> Self {
        let mut subtree_end = vec![0; nodes.len()];
        for i in (0..nodes.len()).rev() {
            subtree_end[i] = nodes[i]
                .children
                .last()
                .map_or(i + 1, |last| subtree_end[last.0]);
        }

        let mut by_object: HashMap<ObjectRef, Vec<NodeId>> = HashMap::new();
        let mut by_predicate: HashMap<String, Vec<NodeId>> = HashMap::new();
        let mut socket_watchers = Vec::new();

        for node in nodes.iter().filter(|n| n.is_leaf()) {
            for condition in &node.requirement.conditions {
                for object in condition.referenced_objects() {
                    let entry = by_object.entry(object).or_default();
                    if !entry.contains(&node.id) {
                        entry.push(node.id);
                    }
                }
                if let Some(predicate) = condition.custom_predicate() {
                    let entry = by_predicate.entry(predicate.to_string()).or_default();
                    if !entry.contains(&node.id) {
                        entry.push(node.id);
                    }
                }
                if condition.watches_all_sockets() && !socket_watchers.contains(&node.id) {
                    socket_watchers.push(node.id);
                }
            }
        }

        Self {
            nodes,
            subtree_end,
            by_object,
            by_predicate,
            socket_watchers,
        }
    }
}

/// Builds a [`ProgressTree`] in pre-order.
///
/// Children must be pushed depth-first (a node's whole subtree before its
/// next sibling) so ids stay in pre-order.
#[derive(Debug)]
pub struct TreeBuilder {
    nodes: Vec<ProgressNode>,
}

impl TreeBuilder {
    /// Creates a builder with `root` as node 0.
    #[must_use]
    pub fn new(mut root: ProgressNode) -> Self {
        root.id = NodeId::ROOT;
        root.parent = None;
        root.index = 0;
        root.children.clear();
        Self { nodes: vec![root] }
    }

    /// Appends `node` as the last child of `parent` and returns its id.
    ///
    /// # Panics
    ///
    /// Panics if `parent` was not produced by this builder.
    pub fn push(&mut self, parent: NodeId, mut node: ProgressNode) -> NodeId {
        let id = NodeId(self.nodes.len());
        let siblings = &mut self.nodes[parent.0].children;
        node.id = id;
        node.parent = Some(parent);
        node.index = siblings.len();
        node.children.clear();
        siblings.push(id);
        self.nodes.push(node);
        id
    }

    /// An already pushed node.
    #[must_use]
    pub fn node(&self, id: NodeId) -> Option<&ProgressNode> {
        self.nodes.get(id.0)
    }

    /// Mutable access to an already pushed node.
    pub fn node_mut(&mut self, id: NodeId) -> Option<&mut ProgressNode> {
        self.nodes.get_mut(id.0)
    }

    /// Finishes the tree and builds its index.
    #[must_use]
    pub fn build(self) -> ProgressTree {
        ProgressTree::index(self.nodes)
    }
}
