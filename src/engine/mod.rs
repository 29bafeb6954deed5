//! Gating and transition engine.
//!
//! This module applies the sequencing rules to a [`RuntimeState`]: it
//! evaluates the conditions of active leaves, completes nodes bottom-up,
//! activates the next eligible siblings, and derives the resulting gate.
//! It is synchronous and allocation-light; the orchestrator calls it after
//! every registry mutation and on every tick.

/// Lock-policy resolution over the active frontier.
pub mod gating;

use std::collections::BTreeSet;

use crate::registry::ObjectStateRegistry;
use crate::tree::{NodeId, ProgressTree, RuntimeState};

pub use gating::Gate;

/// Which leaves to re-evaluate during an [`Engine::advance`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Focus {
    /// Re-evaluate every active leaf.
    All,
    /// Re-evaluate only these leaves (plus any activated during the pass).
    Nodes(BTreeSet<NodeId>),
}

impl Focus {
    fn contains(&self, id: NodeId) -> bool {
        match self {
            Self::All => true,
            Self::Nodes(set) => set.contains(&id),
        }
    }
}

/// A state change produced by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// A node joined the active frontier.
    Activated(NodeId),
    /// A node completed.
    Completed(NodeId),
    /// The root completed; terminal until reset.
    RunCompleted,
}

/// Engine policy switches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AdvancePolicy {
    /// Activate the next module as soon as one completes.
    pub auto_advance: bool,
}

impl Default for AdvancePolicy {
    fn default() -> Self {
        Self { auto_advance: true }
    }
}

/// Borrowed view that runs the sequencing algorithm for one session.
pub struct Engine<'a> {
    tree: &'a ProgressTree,
    state: &'a mut RuntimeState,
    registry: &'a ObjectStateRegistry,
    policy: AdvancePolicy,
}

impl<'a> Engine<'a> {
    /// Creates an engine over one session's state.
    pub fn new(
        tree: &'a ProgressTree,
        state: &'a mut RuntimeState,
        registry: &'a ObjectStateRegistry,
        policy: AdvancePolicy,
    ) -> Self {
        Self {
            tree,
            state,
            registry,
            policy,
        }
    }

    /// Marks the root active and activates the initial path.
    ///
    /// Conditions are not evaluated here; newly active leaves are evaluated
    /// by the next [`Self::advance`].
    pub fn begin(&mut self) -> Vec<Transition> {
        let mut out = Vec::new();
        self.state.started = true;
        self.activate(self.tree.root(), &mut out);
        self.activate_pass(&mut out);
        out
    }

    /// Re-evaluates the active frontier and moves it forward.
    ///
    /// Idempotent: running it again with no registry change in between
    /// yields no transitions and the same state.
    pub fn advance(&mut self, focus: &Focus) -> Vec<Transition> {
        let mut out = Vec::new();
        if !self.state.started || self.state.run_complete {
            return out;
        }

        loop {
            // All completions of a pass are applied before any activation so
            // sibling order decides ties, never evaluation order.
            let completed = self.complete_pass(self.tree.root(), focus, &mut out);
            if self.state.run_complete {
                break;
            }
            let activated = self.activate_pass(&mut out);
            if !completed && !activated {
                break;
            }
        }
        out
    }

    /// Clears all progress and, if the session was started, restores the
    /// initial active path.
    pub fn reset(&mut self) -> Vec<Transition> {
        self.state.clear_progress();
        if self.state.started {
            self.begin()
        } else {
            Vec::new()
        }
    }

    /// Resets progress, completes every earlier sibling along the path to
    /// `target` as skipped, and activates the path down to `target`.
    ///
    /// Bypasses dependency checks on the way. Callers must have verified
    /// that `target` belongs to the tree.
    pub fn skip_to(&mut self, target: NodeId) -> Vec<Transition> {
        self.state.clear_progress();
        self.state.started = true;
        let mut out = Vec::new();

        let tree = self.tree;
        let path = tree.path_to(target);
        for pair in path.windows(2) {
            let (parent, child) = (pair[0], pair[1]);
            let child_index = tree.get(child).index;
            for &sibling in &tree.get(parent).children[..child_index] {
                for i in tree.subtree(sibling) {
                    self.state.set_completed(NodeId(i), true);
                }
            }
        }
        for id in path {
            self.activate(id, &mut out);
        }
        self.activate_pass(&mut out);
        out
    }

    /// Takes an active optional node off the frontier as completed and
    /// skipped, then moves the sequence on.
    ///
    /// Callers must have verified that `id` is optional and active.
    pub fn pass_over(&mut self, id: NodeId) -> Vec<Transition> {
        for i in self.tree.subtree(id) {
            self.state.set_completed(NodeId(i), true);
        }
        let mut out = vec![Transition::Completed(id)];
        out.extend(self.advance(&Focus::Nodes(BTreeSet::new())));
        out
    }

    /// Completion pass over the active part of `id`'s subtree, children
    /// first and in sibling order. Returns true if anything completed.
    fn complete_pass(&mut self, id: NodeId, focus: &Focus, out: &mut Vec<Transition>) -> bool {
        if !self.state.is_active(id) {
            return false;
        }
        let tree = self.tree;
        let node = tree.get(id);
        let mut any = false;

        let satisfied = if node.is_leaf() {
            let pending = self.state.take_pending(id);
            if pending || focus.contains(id) {
                self.refresh_latches(id);
            }
            self.leaf_satisfied(id)
        } else {
            for &child in &node.children {
                any |= self.complete_pass(child, focus, out);
            }
            self.children_satisfied(id)
        };

        if satisfied {
            self.complete(id, out);
            any = true;
        }
        any
    }

    fn refresh_latches(&mut self, id: NodeId) {
        let tree = self.tree;
        let node = tree.get(id);
        for (i, condition) in node.requirement.conditions.iter().enumerate() {
            if !self.state.met(id)[i] && condition.evaluate(self.registry) {
                self.state.latch(id, i);
            }
        }
    }

    /// A leaf is satisfied when every condition has latched and every
    /// `depends_on` sibling is completed.
    fn leaf_satisfied(&self, id: NodeId) -> bool {
        self.state.met(id).iter().all(|m| *m) && self.dependencies_met(id)
    }

    /// An interior node is satisfied when every required child is completed.
    fn children_satisfied(&self, id: NodeId) -> bool {
        self.tree
            .get(id)
            .children
            .iter()
            .filter(|c| !self.tree.get(**c).optional)
            .all(|c| self.state.is_completed(*c))
    }

    fn dependencies_met(&self, id: NodeId) -> bool {
        let node = self.tree.get(id);
        let Some(parent) = node.parent else {
            return true;
        };
        let siblings = &self.tree.get(parent).children;
        node.depends_on
            .iter()
            .all(|&i| siblings.get(i).is_some_and(|s| self.state.is_completed(*s)))
    }

    fn complete(&mut self, id: NodeId, out: &mut Vec<Transition>) {
        // Leftover optional descendants leave the frontier with their parent.
        let range = self.tree.subtree(id);
        for i in range.skip(1) {
            self.state.set_active(NodeId(i), false);
        }
        self.state.set_completed(id, false);
        out.push(Transition::Completed(id));
        if id == self.tree.root() {
            self.state.run_complete = true;
            out.push(Transition::RunCompleted);
        }
    }

    fn activate(&mut self, id: NodeId, out: &mut Vec<Transition>) {
        if self.state.is_active(id) || self.state.is_completed(id) {
            return;
        }
        self.state.set_active(id, true);
        if self.tree.get(id).is_leaf() {
            self.state.mark_pending(id);
        }
        out.push(Transition::Activated(id));
    }

    /// Activation pass from the root down through active interior nodes.
    fn activate_pass(&mut self, out: &mut Vec<Transition>) -> bool {
        self.activate_under(self.tree.root(), out)
    }

    fn activate_under(&mut self, parent: NodeId, out: &mut Vec<Transition>) -> bool {
        if !self.state.is_active(parent) {
            return false;
        }
        let tree = self.tree;
        let mut any = self.activate_children(parent, out);
        for &child in &tree.get(parent).children {
            any |= self.activate_under(child, out);
        }
        any
    }

    /// Activates the eligible children of an active parent.
    ///
    /// Parallel children activate as soon as their dependencies are met.
    /// Other children, optional ones included, form a sequence: the
    /// earliest eligible one activates, and only while no sequential
    /// sibling is active.
    fn activate_children(&mut self, parent: NodeId, out: &mut Vec<Transition>) -> bool {
        let tree = self.tree;
        let node = tree.get(parent);
        if node.is_leaf() {
            return false;
        }

        let holding = parent == tree.root()
            && !self.policy.auto_advance
            && node.children.iter().any(|c| self.state.is_completed(*c))
            && !node.children.iter().any(|c| self.state.is_active(*c));
        if holding && !self.state.release_pending {
            return false;
        }

        let mut sequential_active = node
            .children
            .iter()
            .any(|c| self.state.is_active(*c) && !tree.get(*c).runs_alongside());
        let mut any = false;

        for &child in &node.children {
            if self.state.is_active(child) || self.state.is_completed(child) {
                continue;
            }
            if !self.dependencies_met(child) {
                continue;
            }
            let alongside = tree.get(child).runs_alongside();
            if alongside || !sequential_active {
                self.activate(child, out);
                sequential_active |= !alongside;
                any = true;
            }
        }

        if holding && any {
            self.state.release_pending = false;
        }
        any
    }
}

/// True when the root is holding between modules for an explicit continue.
#[must_use]
pub fn is_holding(tree: &ProgressTree, state: &RuntimeState, policy: AdvancePolicy) -> bool {
    if policy.auto_advance || !state.started || state.run_complete {
        return false;
    }
    let root = tree.get(tree.root());
    root.children.iter().any(|c| state.is_completed(*c))
        && !root.children.iter().any(|c| state.is_active(*c))
        && root.children.iter().any(|c| !state.is_completed(*c))
}
