//! Volume orchestrator.
//!
//! [`VolumeOrchestrator`] owns one training session: the shared authored
//! tree, this session's runtime state and object registry, its settings and
//! its observers. Every public operation runs to completion before
//! returning; a multi-threaded host must serialize calls (see
//! [`crate::host::SessionHost`]).

use std::collections::BTreeSet;
use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::config::{acknowledgement_predicate, CompiledProgram, VolumeSettings};
use crate::engine::{is_holding, Engine, Focus, Gate, Transition};
use crate::error::{SessionError, TrainingResult};
use crate::events::{EventBus, EventStream, MistakeSeverity, ObserverId, ResetReason, TrainingEvent};
use crate::notify::Notification;
use crate::object::{ActionId, ObjectRef, Vec3};
use crate::registry::ObjectStateRegistry;
use crate::tree::{NodeId, NodeKind, ProgressTree, RuntimeState, SessionSnapshot};

/// Outcome of [`VolumeOrchestrator::attempt_action`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionVerdict {
    /// The action is permitted.
    Allowed,
    /// The action is locked; the caller should prevent it.
    Blocked,
    /// The action is locked but tolerated with a warning.
    Warned,
}

impl ActionVerdict {
    /// True unless the action was blocked.
    #[must_use]
    pub const fn proceeds(self) -> bool {
        !matches!(self, Self::Blocked)
    }
}

/// Aggregate counters for one session.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct VolumeStatistics {
    /// When `start` ran.
    pub started_at: Option<DateTime<Utc>>,
    /// When the root completed.
    pub completed_at: Option<DateTime<Utc>>,
    /// Steps in the program.
    pub total_steps: usize,
    /// Steps completed in the current run, skipped ones included.
    pub completed_steps: usize,
    /// Mistakes reported.
    pub mistakes: u32,
    /// Mistakes reported as critical.
    pub critical_mistakes: u32,
    /// Locked actions that were blocked.
    pub blocked_actions: u32,
    /// Locked actions that were tolerated with a warning.
    pub warnings: u32,
    /// Progress resets, including those caused by critical mistakes.
    pub resets: u32,
    /// Administrative skips.
    pub skips: u32,
}

impl VolumeStatistics {
    /// Time since start, up to completion if the run has completed.
    #[must_use]
    pub fn elapsed(&self) -> Option<Duration> {
        let started = self.started_at?;
        Some(self.completed_at.unwrap_or_else(Utc::now) - started)
    }
}

/// Drives one training session over a shared [`ProgressTree`].
#[derive(Debug)]
pub struct VolumeOrchestrator {
    session_id: Uuid,
    tree: Arc<ProgressTree>,
    state: RuntimeState,
    registry: ObjectStateRegistry,
    settings: VolumeSettings,
    bus: EventBus,
    gate: Gate,
    stats: VolumeStatistics,
    /// Steps with no optional node on their path.
    required_steps: Vec<NodeId>,
}

impl VolumeOrchestrator {
    /// Creates a session over `tree`. Nothing is active until [`Self::start`].
    #[must_use]
    pub fn new(tree: Arc<ProgressTree>, settings: VolumeSettings) -> Self {
        let state = RuntimeState::new(&tree);
        let required_steps = tree
            .steps()
            .filter(|s| {
                tree.path_to(s.id)
                    .iter()
                    .all(|id| tree.node(*id).is_some_and(|n| !n.optional))
            })
            .map(|s| s.id)
            .collect();
        let stats = VolumeStatistics {
            total_steps: tree.steps().count(),
            ..VolumeStatistics::default()
        };
        Self {
            session_id: Uuid::new_v4(),
            tree,
            state,
            registry: ObjectStateRegistry::new(),
            settings,
            bus: EventBus::new(),
            gate: Gate::default(),
            stats,
            required_steps,
        }
    }

    /// Creates a session over a compiled program.
    #[must_use]
    pub fn from_program(program: &CompiledProgram, settings: VolumeSettings) -> Self {
        Self::new(Arc::clone(&program.tree), settings)
    }

    // ------------------------------------------------------------------
    // Session control
    // ------------------------------------------------------------------

    /// Activates the root and its first eligible path.
    ///
    /// Starting an already started session does nothing.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::EmptyTree`] if the program has no modules;
    /// nothing is started in that case.
    pub fn start(&mut self) -> TrainingResult<()> {
        let root = self.tree.get(self.tree.root());
        if root.children.is_empty() {
            warn!(program = %root.name, "refusing to start an empty program");
            return Err(SessionError::EmptyTree {
                program: root.name.clone(),
            }
            .into());
        }
        if self.state.is_started() {
            debug!(session = %self.session_id, "start ignored; session already running");
            return Ok(());
        }

        let at = Utc::now();
        self.stats.started_at = Some(at);
        self.stats.completed_at = None;
        info!(session = %self.session_id, program = %root.name, "training started");
        let program = root.name.clone();
        self.bus.publish(&TrainingEvent::VolumeStarted { program, at });

        let transitions = self.engine().begin();
        self.publish_transitions(&transitions);
        Ok(())
    }

    /// Re-evaluates every active leaf. Safe to call every frame; does
    /// nothing before start or after completion.
    pub fn update_progress(&mut self) {
        self.advance(&Focus::All);
    }

    /// Clears all progress and restores the initial active path. Object
    /// facts are kept; conditions are re-checked on the next event or
    /// [`Self::update_progress`].
    pub fn reset(&mut self) {
        self.reset_with(ResetReason::Requested);
    }

    /// Clears progress and every recorded object fact, and returns the
    /// session to its not-started state.
    pub fn reset_session(&mut self) {
        info!(session = %self.session_id, "session restarted");
        self.registry.clear();
        self.state = RuntimeState::new(&self.tree);
        self.stats = VolumeStatistics {
            total_steps: self.stats.total_steps,
            resets: self.stats.resets + 1,
            ..VolumeStatistics::default()
        };
        self.bus.publish(&TrainingEvent::VolumeReset {
            reason: ResetReason::SessionRestart,
        });
        self.refresh_gate();
    }

    /// Administrative jump to `target`, bypassing dependencies.
    ///
    /// Earlier siblings along the way are marked completed as skipped.
    ///
    /// # Errors
    ///
    /// Fails unless `allow_skip` is set, the session is started and
    /// `target` belongs to this program.
    pub fn skip_to(&mut self, target: NodeId) -> TrainingResult<()> {
        if !self.settings.allow_skip {
            return Err(SessionError::SkipDisabled.into());
        }
        if !self.state.is_started() {
            return Err(SessionError::NotStarted.into());
        }
        let Some(node) = self.tree.node(target) else {
            return Err(SessionError::UnknownNode { id: target }.into());
        };

        let name = node.name.clone();
        warn!(session = %self.session_id, location = %self.tree.location(target), "administrative skip");
        self.stats.skips += 1;
        self.stats.completed_at = None;
        self.bus.publish(&TrainingEvent::SkippedTo { node: target, name });

        let transitions = self.engine().skip_to(target);
        self.publish_transitions(&transitions);
        Ok(())
    }

    /// Passes over an active optional node so the sequence can move on.
    /// The node is recorded as completed and skipped.
    ///
    /// # Errors
    ///
    /// Fails unless the session is started and `node` is an active
    /// optional node of this program.
    pub fn pass_optional(&mut self, node: NodeId) -> TrainingResult<()> {
        if !self.state.is_started() {
            return Err(SessionError::NotStarted.into());
        }
        let Some(target) = self.tree.node(node) else {
            return Err(SessionError::UnknownNode { id: node }.into());
        };
        if !target.optional || !self.state.is_active(node) {
            return Err(SessionError::NotPassable { id: node }.into());
        }

        debug!(session = %self.session_id, location = %self.tree.location(node), "optional node passed over");
        let transitions = self.engine().pass_over(node);
        self.publish_transitions(&transitions);
        Ok(())
    }

    /// Releases a session holding between modules (`auto_advance = false`).
    /// Returns false if the session was not holding.
    pub fn continue_to_next_module(&mut self) -> bool {
        if !self.is_awaiting_continue() {
            return false;
        }
        self.state.release_pending = true;
        self.advance(&Focus::All);
        true
    }

    /// True while the session waits for [`Self::continue_to_next_module`].
    #[must_use]
    pub fn is_awaiting_continue(&self) -> bool {
        is_holding(&self.tree, &self.state, self.settings.advance_policy())
    }

    /// True once started, until a session reset.
    #[must_use]
    pub const fn is_started(&self) -> bool {
        self.state.is_started()
    }

    /// True once the whole program has completed.
    #[must_use]
    pub const fn is_complete(&self) -> bool {
        self.state.is_run_complete()
    }

    // ------------------------------------------------------------------
    // Interaction input
    // ------------------------------------------------------------------

    /// `object` snapped into (or out of) `point`.
    pub fn notify_snap(&mut self, point: ObjectRef, object: ObjectRef, connected: bool) {
        self.registry.upsert_snap(point, object, connected);
        let focus = self.tree.affected_by_snap(point, object);
        self.advance(&Focus::Nodes(focus));
    }

    /// `object` was grabbed or released.
    pub fn notify_grab(&mut self, object: ObjectRef, grabbed: bool) {
        self.registry.upsert_grab(object, grabbed);
        self.advance_for_object(object);
    }

    /// `object` now sits at `angle` degrees.
    pub fn notify_rotation(&mut self, object: ObjectRef, angle: f32) {
        self.registry.upsert_rotation(object, angle);
        self.advance_for_object(object);
    }

    /// Position sample for `object`.
    pub fn notify_proximity_tick(&mut self, object: ObjectRef, position: Vec3) {
        self.registry.upsert_position(object, position);
        self.advance_for_object(object);
    }

    /// Sets an externally evaluated predicate.
    pub fn set_custom(&mut self, predicate_id: &str, value: bool) {
        self.registry.set_custom(predicate_id, value);
        let focus = self
            .tree
            .interested_in_predicate(predicate_id)
            .iter()
            .copied()
            .collect();
        self.advance(&Focus::Nodes(focus));
    }

    /// Acknowledges a `ShowInstruction` step.
    ///
    /// # Errors
    ///
    /// Returns [`SessionError::UnknownNode`] if `node` is not in the program.
    pub fn acknowledge(&mut self, node: NodeId) -> TrainingResult<()> {
        if !self.tree.contains(node) {
            return Err(SessionError::UnknownNode { id: node }.into());
        }
        self.set_custom(&acknowledgement_predicate(node), true);
        Ok(())
    }

    /// Makes `point` a known socket, which widens every `AllSnapped` check.
    pub fn register_socket(&mut self, point: ObjectRef) {
        if self.registry.register_socket(point) {
            debug!(%point, "socket discovered");
        }
        let focus = self.tree.socket_watchers().iter().copied().collect();
        self.advance(&Focus::Nodes(focus));
    }

    /// Applies one notification.
    pub fn apply(&mut self, notification: &Notification) {
        match notification {
            Notification::Snap {
                point,
                object,
                connected,
            } => self.notify_snap(*point, *object, *connected),
            Notification::Grab { object, grabbed } => self.notify_grab(*object, *grabbed),
            Notification::Rotation { object, angle } => self.notify_rotation(*object, *angle),
            Notification::ProximityTick { object, position } => {
                self.notify_proximity_tick(*object, *position);
            }
            Notification::Custom { predicate_id, value } => self.set_custom(predicate_id, *value),
            Notification::SocketDiscovered { point } => self.register_socket(*point),
            Notification::Tick => self.update_progress(),
        }
    }

    // ------------------------------------------------------------------
    // Gating and mistakes
    // ------------------------------------------------------------------

    /// Reports an attempted action and returns how the caller should treat
    /// it. Locked actions emit `ActionWarning` or `ActionBlocked` depending
    /// on `allow_mistakes_with_warning`.
    pub fn attempt_action(&mut self, action: impl Into<ActionId>) -> ActionVerdict {
        let action = action.into();
        if self.gate.is_action_allowed(&action) {
            return ActionVerdict::Allowed;
        }

        if self.settings.allow_mistakes_with_warning {
            self.stats.warnings += 1;
            let message = format!("'{action}' is not part of {}", self.current_location());
            warn!(%action, %message, "locked action tolerated");
            self.bus.publish(&TrainingEvent::ActionWarning { action, message });
            ActionVerdict::Warned
        } else {
            self.stats.blocked_actions += 1;
            warn!(%action, "locked action blocked");
            self.bus.publish(&TrainingEvent::ActionBlocked { action });
            ActionVerdict::Blocked
        }
    }

    /// True if `action` is currently permitted.
    #[must_use]
    pub fn is_action_allowed(&self, action: impl Into<ActionId>) -> bool {
        self.gate.is_action_allowed(&action.into())
    }

    /// True if `action` is currently locked.
    #[must_use]
    pub fn is_action_locked(&self, action: impl Into<ActionId>) -> bool {
        self.gate.is_locked(&action.into())
    }

    /// The resolved gate for the current frontier.
    #[must_use]
    pub const fn gate(&self) -> &Gate {
        &self.gate
    }

    /// Explicitly unlocked actions, or `None` when only a deny-list applies.
    #[must_use]
    pub fn unlocked_actions(&self) -> Option<BTreeSet<ActionId>> {
        self.gate.unlocked_actions()
    }

    /// Surfaces a trainee mistake. Returns true if it reset progress.
    pub fn report_mistake(&mut self, description: impl Into<String>, severity: MistakeSeverity) -> bool {
        let description = description.into();
        self.stats.mistakes += 1;
        if severity == MistakeSeverity::Critical {
            self.stats.critical_mistakes += 1;
        }
        info!(%severity, %description, "mistake reported");
        self.bus.publish(&TrainingEvent::MistakeMade {
            description,
            severity,
        });

        if severity == MistakeSeverity::Critical && self.settings.reset_on_critical_error {
            warn!(session = %self.session_id, "critical mistake; resetting progress");
            self.reset_with(ResetReason::CriticalMistake);
            return true;
        }
        false
    }

    // ------------------------------------------------------------------
    // Queries
    // ------------------------------------------------------------------

    /// What the trainee should do now.
    #[must_use]
    pub fn current_instruction(&self) -> String {
        let program = &self.tree.get(self.tree.root()).name;
        if !self.state.is_started() {
            return format!("{program} has not started");
        }
        if self.state.is_run_complete() {
            return format!("{program} complete");
        }
        if self.is_awaiting_continue() {
            return "Module complete. Continue to the next module.".to_string();
        }

        let active = self.state.active_nodes();
        let steps: Vec<&str> = active
            .iter()
            .filter_map(|id| self.tree.node(*id))
            .filter(|n| n.kind == NodeKind::Step)
            .map(|n| {
                n.description
                    .as_deref()
                    .or(n.hint.as_deref())
                    .unwrap_or(n.name.as_str())
            })
            .collect();
        if steps.is_empty() {
            active
                .last()
                .and_then(|id| self.tree.node(*id))
                .map(|n| n.name.clone())
                .unwrap_or_default()
        } else {
            steps.join(" | ")
        }
    }

    /// Completed share of required steps, in `[0, 1]`.
    #[must_use]
    pub fn completion_percentage(&self) -> f32 {
        if self.required_steps.is_empty() {
            return if self.state.is_run_complete() { 1.0 } else { 0.0 };
        }
        let done = self
            .required_steps
            .iter()
            .filter(|id| self.state.is_completed(**id))
            .count();
        #[allow(clippy::cast_precision_loss)]
        let ratio = done as f32 / self.required_steps.len() as f32;
        ratio.clamp(0.0, 1.0)
    }

    /// Multi-line progress overview: one line for the program, one per
    /// module.
    #[must_use]
    pub fn progress_summary(&self) -> String {
        let root = self.tree.get(self.tree.root());
        let done = self
            .required_steps
            .iter()
            .filter(|id| self.state.is_completed(**id))
            .count();
        let mut out = format!(
            "{}: {done}/{} steps ({:.0}%)",
            root.name,
            self.required_steps.len(),
            self.completion_percentage() * 100.0
        );
        for &module in &root.children {
            let node = self.tree.get(module);
            let status = self.state.status(module);
            let mark = if status.skipped {
                "skip"
            } else if status.completed {
                "done"
            } else if status.active {
                ">"
            } else {
                ""
            };
            let optional = if node.optional { " (optional)" } else { "" };
            let _ = write!(out, "\n  [{mark:>4}] {}{optional}", node.name);
        }
        out
    }

    /// Counters for this session.
    #[must_use]
    pub const fn statistics(&self) -> &VolumeStatistics {
        &self.stats
    }

    /// Serializable copy of every node's flags.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.state.snapshot()
    }

    /// Currently active nodes in pre-order.
    #[must_use]
    pub fn active_frontier(&self) -> Vec<NodeId> {
        self.state.active_nodes()
    }

    /// The shared authored tree.
    #[must_use]
    pub const fn tree(&self) -> &Arc<ProgressTree> {
        &self.tree
    }

    /// This session's runtime flags.
    #[must_use]
    pub const fn state(&self) -> &RuntimeState {
        &self.state
    }

    /// This session's object facts.
    #[must_use]
    pub const fn registry(&self) -> &ObjectStateRegistry {
        &self.registry
    }

    /// Session settings.
    #[must_use]
    pub const fn settings(&self) -> &VolumeSettings {
        &self.settings
    }

    /// Unique id of this session.
    #[must_use]
    pub const fn session_id(&self) -> Uuid {
        self.session_id
    }

    // ------------------------------------------------------------------
    // Observers
    // ------------------------------------------------------------------

    /// Registers a callback observer. Callbacks run in registration order.
    pub fn subscribe<F>(&mut self, callback: F) -> ObserverId
    where
        F: FnMut(&TrainingEvent) + Send + 'static,
    {
        self.bus.subscribe(callback)
    }

    /// Opens a bounded event stream sized by `event_stream_capacity`.
    pub fn events(&mut self) -> EventStream {
        self.bus.subscribe_stream(self.settings.event_stream_capacity)
    }

    /// Removes an observer.
    pub fn unsubscribe(&mut self, id: ObserverId) -> bool {
        self.bus.unsubscribe(id)
    }

    /// Events dropped because a stream was full.
    #[must_use]
    pub const fn dropped_events(&self) -> u64 {
        self.bus.dropped_events()
    }

    // ------------------------------------------------------------------
    // Internals
    // ------------------------------------------------------------------

    fn engine(&mut self) -> Engine<'_> {
        Engine::new(
            &self.tree,
            &mut self.state,
            &self.registry,
            self.settings.advance_policy(),
        )
    }

    fn advance(&mut self, focus: &Focus) {
        let transitions = self.engine().advance(focus);
        self.publish_transitions(&transitions);
    }

    fn advance_for_object(&mut self, object: ObjectRef) {
        let focus = self.tree.interested_in(object).iter().copied().collect();
        self.advance(&Focus::Nodes(focus));
    }

    fn reset_with(&mut self, reason: ResetReason) {
        info!(session = %self.session_id, ?reason, "progress reset");
        self.stats.resets += 1;
        self.stats.completed_at = None;
        self.bus.publish(&TrainingEvent::VolumeReset { reason });
        let transitions = self.engine().reset();
        self.publish_transitions(&transitions);
        self.refresh_gate();
    }

    fn publish_transitions(&mut self, transitions: &[Transition]) {
        if transitions.is_empty() {
            return;
        }
        let tree = Arc::clone(&self.tree);
        let mut finished_module = None;

        for transition in transitions {
            let event = match *transition {
                Transition::Activated(id) => {
                    let node = tree.get(id);
                    debug!(node = %id, kind = %node.kind, name = %node.name, "node activated");
                    TrainingEvent::NodeActivated {
                        node: id,
                        kind: node.kind,
                        name: node.name.clone(),
                    }
                }
                Transition::Completed(id) => {
                    let node = tree.get(id);
                    info!(node = %id, kind = %node.kind, name = %node.name, "node completed");
                    if node.parent == Some(tree.root()) {
                        finished_module = Some(id);
                    }
                    TrainingEvent::NodeCompleted {
                        node: id,
                        kind: node.kind,
                        name: node.name.clone(),
                    }
                }
                Transition::RunCompleted => {
                    let at = Utc::now();
                    self.stats.completed_at = Some(at);
                    let elapsed_ms = self.stats.elapsed().map_or(0, |d| d.num_milliseconds());
                    let program = tree.get(tree.root()).name.clone();
                    info!(session = %self.session_id, %program, elapsed_ms, "training completed");
                    TrainingEvent::VolumeCompleted {
                        program,
                        at,
                        elapsed_ms,
                    }
                }
            };
            self.bus.publish(&event);
        }

        self.stats.completed_steps = tree
            .steps()
            .filter(|s| self.state.is_completed(s.id))
            .count();
        self.refresh_gate();

        if let Some(completed) = finished_module {
            if self.is_awaiting_continue() {
                info!(module = %tree.get(completed).name, "waiting for continue");
                self.bus.publish(&TrainingEvent::AwaitingContinue { completed });
            }
        }
    }

    fn refresh_gate(&mut self) {
        let gate = Gate::resolve(&self.tree, &self.state);
        if gate != self.gate {
            debug!(
                allowed = ?gate.allowed,
                denied = ?gate.denied,
                "gate changed"
            );
            self.gate = gate.clone();
            self.bus.publish(&TrainingEvent::GateChanged { gate });
        }
    }

    /// Location of the first active step, or of the root.
    fn current_location(&self) -> String {
        let active = self.state.active_nodes();
        let id = active
            .iter()
            .copied()
            .find(|id| self.tree.get(*id).kind == NodeKind::Step)
            .or_else(|| active.last().copied())
            .unwrap_or(self.tree.root());
        self.tree.location(id)
    }
}
