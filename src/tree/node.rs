//! Progress node definitions.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::condition::{Condition, Requirement};
use crate::object::ActionId;

/// Stable identity of a node within one [`super::ProgressTree`].
///
/// Ids are arena indices assigned in pre-order, so a parent always has a
/// smaller id than any of its descendants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub(crate) usize);

impl NodeId {
    /// The root of every tree.
    pub const ROOT: Self = Self(0);

    /// Returns the arena index.
    #[must_use]
    pub const fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Level of a node in the training hierarchy.
#[allow(missing_docs)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeKind {
    Program,
    Module,
    Group,
    Step,
}

impl fmt::Display for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Program => write!(f, "program"),
            Self::Module => write!(f, "module"),
            Self::Group => write!(f, "group"),
            Self::Step => write!(f, "step"),
        }
    }
}

/// Which actions a node permits while it is active.
///
/// `allowed_actions` is a closed allow-list, `locked_actions` a deny-list.
/// Both empty means unrestricted. When both are set on one node the
/// deny-list takes precedence.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockPolicy {
    /// Closed allow-list.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub allowed_actions: BTreeSet<ActionId>,
    /// Deny-list.
    #[serde(default, skip_serializing_if = "BTreeSet::is_empty")]
    pub locked_actions: BTreeSet<ActionId>,
}

impl LockPolicy {
    /// An allow-list policy.
    #[must_use]
    pub fn allow<I, A>(actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionId>,
    {
        Self {
            allowed_actions: actions.into_iter().map(Into::into).collect(),
            locked_actions: BTreeSet::new(),
        }
    }

    /// A deny-list policy.
    #[must_use]
    pub fn deny<I, A>(actions: I) -> Self
    where
        I: IntoIterator<Item = A>,
        A: Into<ActionId>,
    {
        Self {
            allowed_actions: BTreeSet::new(),
            locked_actions: actions.into_iter().map(Into::into).collect(),
        }
    }

    /// True if the policy restricts nothing.
    #[must_use]
    pub fn is_unrestricted(&self) -> bool {
        self.allowed_actions.is_empty() && self.locked_actions.is_empty()
    }
}

/// One element of the Program / Module / Group / Step hierarchy.
///
/// Authored shape only; runtime flags live in [`super::RuntimeState`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgressNode {
    /// Arena id, assigned when the node is pushed into a tree.
    pub id: NodeId,
    /// Hierarchy level.
    pub kind: NodeKind,
    /// Display name.
    pub name: String,
    /// Optional long description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Instruction shown to the trainee while this node is active.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
    /// Parent node, `None` for the root.
    pub parent: Option<NodeId>,
    /// Position among siblings.
    pub index: usize,
    /// Ordered children.
    pub children: Vec<NodeId>,
    /// Completion requirement for leaves.
    pub requirement: Requirement,
    /// Optional nodes do not block their parent's completion.
    pub optional: bool,
    /// May be active concurrently with its siblings.
    pub allows_parallel: bool,
    /// Sibling indices that must be completed first.
    pub depends_on: BTreeSet<usize>,
    /// Gating policy while active.
    pub lock_policy: LockPolicy,
}

impl ProgressNode {
    /// Creates a detached node. Tree linkage is filled in by the builder.
    #[must_use]
    pub fn new(kind: NodeKind, name: impl Into<String>) -> Self {
        Self {
            id: NodeId::ROOT,
            kind,
            name: name.into(),
            description: None,
            hint: None,
            parent: None,
            index: 0,
            children: Vec::new(),
            requirement: Requirement::none(),
            optional: false,
            allows_parallel: false,
            depends_on: BTreeSet::new(),
            lock_policy: LockPolicy::default(),
        }
    }

    /// Adds a completion condition.
    #[must_use]
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.requirement.conditions.push(condition);
        self
    }

    /// Sets the hint text.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }

    /// Marks the node as parallel.
    #[must_use]
    pub const fn parallel(mut self) -> Self {
        self.allows_parallel = true;
        self
    }

    /// Marks the node as optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Adds sibling dependencies.
    #[must_use]
    pub fn depends_on(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.depends_on.extend(indices);
        self
    }

    /// Sets the lock policy.
    #[must_use]
    pub fn with_lock_policy(mut self, policy: LockPolicy) -> Self {
        self.lock_policy = policy;
        self
    }

    /// True if the node has no children.
    #[must_use]
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// True if this node never holds the sequential cursor among its
    /// siblings. Optional nodes still take their turn in the sequence.
    #[must_use]
    pub const fn runs_alongside(&self) -> bool {
        self.allows_parallel
    }
}
