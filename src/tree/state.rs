//! Per-session runtime state, kept apart from the authored tree.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use super::{NodeId, ProgressTree};

/// Runtime flags of one node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct NodeStatus {
    /// Currently part of the active frontier.
    pub active: bool,
    /// Completed during this run.
    pub completed: bool,
    /// Completed by a skip or by passing over an optional node rather than
    /// by the trainee.
    pub skipped: bool,
}

/// Mutable progress for one session over a shared [`ProgressTree`].
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeState {
    status: Vec<NodeStatus>,
    /// Latched `is_met` flags, one per leaf condition.
    met: Vec<Vec<bool>>,
    /// Leaves activated but not yet evaluated.
    pending_eval: BTreeSet<NodeId>,
    pub(crate) started: bool,
    pub(crate) run_complete: bool,
    pub(crate) release_pending: bool,
}

impl RuntimeState {
    /// Fresh state for `tree`: nothing active, nothing completed.
    #[must_use]
    pub fn new(tree: &ProgressTree) -> Self {
        Self {
            status: vec![NodeStatus::default(); tree.len()],
            met: tree
                .iter()
                .map(|n| vec![false; n.requirement.conditions.len()])
                .collect(),
            pending_eval: BTreeSet::new(),
            started: false,
            run_complete: false,
            release_pending: false,
        }
    }

    /// Status of `id`. Unknown ids read as inactive and incomplete.
    #[must_use]
    pub fn status(&self, id: NodeId) -> NodeStatus {
        self.status.get(id.0).copied().unwrap_or_default()
    }

    /// True if `id` is active.
    #[must_use]
    pub fn is_active(&self, id: NodeId) -> bool {
        self.status(id).active
    }

    /// True if `id` is completed.
    #[must_use]
    pub fn is_completed(&self, id: NodeId) -> bool {
        self.status(id).completed
    }

    /// Latched condition flags of a leaf.
    #[must_use]
    pub fn met(&self, id: NodeId) -> &[bool] {
        self.met.get(id.0).map_or(&[][..], Vec::as_slice)
    }

    /// True once `start` has run and until a session reset.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.started
    }

    /// True once the root has completed.
    #[must_use]
    pub const fn is_run_complete(&self) -> bool {
        self.run_complete
    }

    /// All active nodes in pre-order.
    #[must_use]
    pub fn active_nodes(&self) -> Vec<NodeId> {
        self.status
            .iter()
            .enumerate()
            .filter(|(_, s)| s.active)
            .map(|(i, _)| NodeId(i))
            .collect()
    }

    /// Serializable copy of every node's flags.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        SessionSnapshot {
            nodes: self.status.clone(),
            started: self.started,
            run_complete: self.run_complete,
        }
    }

    pub(crate) fn set_active(&mut self, id: NodeId, active: bool) {
        if let Some(s) = self.status.get_mut(id.0) {
            s.active = active;
        }
    }

    pub(crate) fn set_completed(&mut self, id: NodeId, skipped: bool) {
        if let Some(s) = self.status.get_mut(id.0) {
            s.completed = true;
            s.active = false;
            s.skipped = skipped;
        }
        self.pending_eval.remove(&id);
    }

    pub(crate) fn latch(&mut self, id: NodeId, condition: usize) {
        if let Some(flag) = self.met.get_mut(id.0).and_then(|m| m.get_mut(condition)) {
            *flag = true;
        }
    }

    pub(crate) fn mark_pending(&mut self, id: NodeId) {
        self.pending_eval.insert(id);
    }

    pub(crate) fn take_pending(&mut self, id: NodeId) -> bool {
        self.pending_eval.remove(&id)
    }

    /// Clears flags and latches for the ids in `range`.
    pub(crate) fn clear_range(&mut self, range: std::ops::Range<usize>) {
        for i in range {
            if let Some(s) = self.status.get_mut(i) {
                *s = NodeStatus::default();
            }
            if let Some(m) = self.met.get_mut(i) {
                m.iter_mut().for_each(|f| *f = false);
            }
            self.pending_eval.remove(&NodeId(i));
        }
    }

    /// Clears all progress. `started` is kept.
    pub(crate) fn clear_progress(&mut self) {
        self.clear_range(0..self.status.len());
        self.run_complete = false;
        self.release_pending = false;
    }
}

/// A point-in-time copy of every node's runtime flags.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionSnapshot {
    /// Flags indexed by node id.
    pub nodes: Vec<NodeStatus>,
    /// Whether the session was started.
    pub started: bool,
    /// Whether the root had completed.
    pub run_complete: bool,
}
