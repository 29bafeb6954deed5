use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::object::ActionId;
use crate::tree::{ProgressTree, RuntimeState};

/// The resolved set of permitted actions for the current active frontier.
///
/// `allowed` is the union of allow-lists over every active node, or `None`
/// when no active node carries one. `denied` is the union of deny-lists and
/// always wins, so an ancestor's deny-list overrides any descendant's
/// allow-list.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Gate {
    /// Closed allow-list in effect, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed: Option<BTreeSet<ActionId>>,
    /// Actions denied by some active node.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub denied: BTreeSet<ActionId>,
}

impl Gate {
    /// Resolves the gate for the active nodes of `state`.
    #[must_use]
    pub fn resolve(tree: &ProgressTree, state: &RuntimeState) -> Self {
        let mut gate = Self::default();
        for id in state.active_nodes() {
            let Some(node) = tree.node(id) else { continue };
            let policy = &node.lock_policy;
            if !policy.allowed_actions.is_empty() {
                gate.allowed
                    .get_or_insert_with(BTreeSet::new)
                    .extend(policy.allowed_actions.iter().cloned());
            }
            gate.denied.extend(policy.locked_actions.iter().cloned());
        }
        gate
    }

    /// True if nothing is restricted.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.allowed.is_none() && self.denied.is_empty()
    }

    /// True if `action` may be performed right now.
    #[must_use]
    pub fn is_action_allowed(&self, action: &ActionId) -> bool {
        if self.denied.contains(action) {
            return false;
        }
        self.allowed.as_ref().map_or(true, |a| a.contains(action))
    }

    /// Complement of [`Self::is_action_allowed`].
    #[must_use]
    pub fn is_locked(&self, action: &ActionId) -> bool {
        !self.is_action_allowed(action)
    }

    /// The explicitly unlocked actions, when a closed allow-list is in effect.
    ///
    /// `None` means everything not denied is unlocked.
    #[must_use]
    pub fn unlocked_actions(&self) -> Option<BTreeSet<ActionId>> {
        self.allowed
            .as_ref()
            .map(|a| a.difference(&self.denied).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{AdvancePolicy, Engine};
    use crate::registry::ObjectStateRegistry;
    use crate::tree::{LockPolicy, NodeId, NodeKind, ProgressNode};

    fn started(tree: &ProgressTree) -> RuntimeState {
        let mut state = RuntimeState::new(tree);
        let registry = ObjectStateRegistry::new();
        Engine::new(tree, &mut state, &registry, AdvancePolicy::default()).begin();
        state
    }

    #[test]
    fn test_unrestricted_when_no_policies() {
        let mut b = ProgressTree::builder(ProgressNode::new(NodeKind::Program, "P"));
        b.push(NodeId::ROOT, ProgressNode::new(NodeKind::Module, "M"));
        let tree = b.build();
        let gate = Gate::resolve(&tree, &started(&tree));
        assert!(gate.is_unrestricted());
        assert!(gate.is_action_allowed(&ActionId::new("anything")));
        assert!(gate.unlocked_actions().is_none());
    }

    #[test]
    fn test_ancestor_deny_beats_descendant_allow() {
        let mut b = ProgressTree::builder(
            ProgressNode::new(NodeKind::Program, "P").with_lock_policy(LockPolicy::deny(["valve"])),
        );
        let m = b.push(
            NodeId::ROOT,
            ProgressNode::new(NodeKind::Module, "M").with_lock_policy(LockPolicy::allow(["valve", "wrench"])),
        );
        b.push(m, ProgressNode::new(NodeKind::Group, "G"));
        let tree = b.build();
        let gate = Gate::resolve(&tree, &started(&tree));

        assert!(!gate.is_action_allowed(&ActionId::new("valve")));
        assert!(gate.is_locked(&ActionId::new("valve")));
        assert!(gate.is_action_allowed(&ActionId::new("wrench")));
        assert!(!gate.is_action_allowed(&ActionId::new("hammer")));
        let unlocked = gate.unlocked_actions().unwrap();
        assert_eq!(unlocked.len(), 1);
        assert!(unlocked.contains(&ActionId::new("wrench")));
    }

    #[test]
    fn test_allow_lists_union_across_active_path() {
        let mut b = ProgressTree::builder(ProgressNode::new(NodeKind::Program, "P"));
        let m = b.push(
            NodeId::ROOT,
            ProgressNode::new(NodeKind::Module, "M").with_lock_policy(LockPolicy::allow(["door"])),
        );
        b.push(
            m,
            ProgressNode::new(NodeKind::Group, "G").with_lock_policy(LockPolicy::allow(["knob"])),
        );
        let tree = b.build();
        let gate = Gate::resolve(&tree, &started(&tree));
        assert!(gate.is_action_allowed(&ActionId::new("door")));
        assert!(gate.is_action_allowed(&ActionId::new("knob")));
        assert!(!gate.is_action_allowed(&ActionId::new("lever")));
    }

    #[test]
    fn test_deny_wins_on_same_node() {
        let policy = LockPolicy {
            allowed_actions: [ActionId::new("a"), ActionId::new("b")].into_iter().collect(),
            locked_actions: [ActionId::new("b")].into_iter().collect(),
        };
        let mut b = ProgressTree::builder(ProgressNode::new(NodeKind::Program, "P").with_lock_policy(policy));
        b.push(NodeId::ROOT, ProgressNode::new(NodeKind::Module, "M"));
        let tree = b.build();
        let gate = Gate::resolve(&tree, &started(&tree));
        assert!(gate.is_action_allowed(&ActionId::new("a")));
        assert!(!gate.is_action_allowed(&ActionId::new("b")));
    }

    #[test]
    fn test_inactive_nodes_do_not_gate() {
        let mut b = ProgressTree::builder(ProgressNode::new(NodeKind::Program, "P"));
        b.push(NodeId::ROOT, ProgressNode::new(NodeKind::Module, "M1"));
        b.push(
            NodeId::ROOT,
            ProgressNode::new(NodeKind::Module, "M2").with_lock_policy(LockPolicy::deny(["valve"])),
        );
        let tree = b.build();
        let gate = Gate::resolve(&tree, &started(&tree));
        assert!(gate.is_action_allowed(&ActionId::new("valve")));
    }
}
