//! Authored program schema.
//!
//! Programs are written offline (usually as JSON) and loaded once. The
//! schema mirrors the authoring hierarchy: a program holds modules, a
//! module holds task groups, a task group holds steps.

use serde::{Deserialize, Serialize};

use crate::object::ObjectRef;

/// How a step or condition refers to an object.
///
/// `{"ref": "<uuid>"}` binds directly; `{"name": "Knob1"}` is resolved once
/// at compile time through an [`crate::ObjectResolver`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ObjectBinding {
    /// Direct identity.
    Ref(ObjectRef),
    /// Scene name, resolved at compile time.
    Name(String),
}

impl ObjectBinding {
    /// Binds by name.
    #[must_use]
    pub fn name(name: impl Into<String>) -> Self {
        Self::Name(name.into())
    }

    /// Human readable form for logs and warnings.
    #[must_use]
    pub fn describe(&self) -> String {
        match self {
            Self::Ref(r) => r.to_string(),
            Self::Name(n) => n.clone(),
        }
    }
}

impl From<ObjectRef> for ObjectBinding {
    fn from(r: ObjectRef) -> Self {
        Self::Ref(r)
    }
}

impl From<&str> for ObjectBinding {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

/// Built-in step behaviours.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum StepType {
    /// Pick up `target`.
    Grab,
    /// Pick up `target` and snap it into `destination`.
    GrabAndSnap,
    /// Rotate `target` to `target_angle`.
    TurnKnob,
    /// Wait until the listed sibling steps are done.
    WaitForCondition,
    /// Show `hint_text` until the trainee acknowledges it.
    ShowInstruction,
}

impl StepType {
    /// Authoring name of the type.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Grab => "Grab",
            Self::GrabAndSnap => "GrabAndSnap",
            Self::TurnKnob => "TurnKnob",
            Self::WaitForCondition => "WaitForCondition",
            Self::ShowInstruction => "ShowInstruction",
        }
    }
}

/// Extra completion condition authored on a step.
#[allow(missing_docs)]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionSpec {
    ObjectSnapped {
        target: ObjectBinding,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        counterpart: Option<ObjectBinding>,
    },
    AllSnapped {
        points: Vec<ObjectBinding>,
    },
    Grabbed {
        target: ObjectBinding,
    },
    RotatedTo {
        target: ObjectBinding,
        target_value: f32,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        tolerance: Option<f32>,
    },
    Proximity {
        a: ObjectBinding,
        b: ObjectBinding,
        max_distance: f32,
    },
    Custom {
        predicate_id: String,
    },
}

/// Authored lock policy.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LockPolicyConfig {
    /// Closed allow-list of action ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub allowed_actions: Vec<String>,
    /// Deny-list of action ids.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub locked_actions: Vec<String>,
}

impl LockPolicyConfig {
    /// True if nothing is restricted.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.allowed_actions.is_empty() && self.locked_actions.is_empty()
    }
}

/// A whole training program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramConfig {
    /// Program name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Program-wide lock policy.
    #[serde(default, skip_serializing_if = "LockPolicyConfig::is_empty")]
    pub lock_policy: LockPolicyConfig,
    /// Modules in order.
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
}

/// A chapter of the program.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModuleConfig {
    /// Module name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// May run alongside its siblings.
    #[serde(default)]
    pub allow_parallel: bool,
    /// Not required for the program to complete.
    #[serde(default)]
    pub is_optional: bool,
    /// Indices of earlier sibling modules that must be completed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wait_for_indices: Vec<usize>,
    /// Lock policy while the module is active.
    #[serde(default, skip_serializing_if = "LockPolicyConfig::is_empty")]
    pub lock_policy: LockPolicyConfig,
    /// Task groups in order.
    #[serde(default)]
    pub groups: Vec<TaskGroupConfig>,
}

/// A group of related steps.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGroupConfig {
    /// Group name.
    pub name: String,
    /// Optional description.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// May run alongside its siblings.
    #[serde(default)]
    pub allow_parallel: bool,
    /// Not required for the module to complete.
    #[serde(default)]
    pub is_optional: bool,
    /// Indices of earlier sibling groups that must be completed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wait_for_indices: Vec<usize>,
    /// Lock policy while the group is active.
    #[serde(default, skip_serializing_if = "LockPolicyConfig::is_empty")]
    pub lock_policy: LockPolicyConfig,
    /// Steps in order.
    #[serde(default)]
    pub steps: Vec<StepConfig>,
}

/// A single trainee action.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepConfig {
    /// Step name.
    pub name: String,
    /// Built-in behaviour.
    #[serde(rename = "type")]
    pub step_type: StepType,
    /// Optional description shown as the current instruction.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// Object the step acts on.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target: Option<ObjectBinding>,
    /// Where `target` must end up (`GrabAndSnap`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub destination: Option<ObjectBinding>,
    /// Angle in degrees (`TurnKnob`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub target_angle: Option<f32>,
    /// Angular tolerance; defaults to 5 degrees.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tolerance: Option<f32>,
    /// May run alongside its siblings.
    #[serde(default)]
    pub allow_parallel: bool,
    /// Not required for the group to complete.
    #[serde(default)]
    pub is_optional: bool,
    /// Indices of earlier sibling steps that must be completed first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub wait_for_step_indices: Vec<usize>,
    /// Hint, or the instruction text of a `ShowInstruction` step.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hint_text: Option<String>,
    /// Additional conditions, all of which must hold.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conditions: Vec<ConditionSpec>,
}

impl ProgramConfig {
    /// Creates an empty program.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            lock_policy: LockPolicyConfig::default(),
            modules: Vec::new(),
        }
    }

    /// Appends a module.
    #[must_use]
    pub fn with_module(mut self, module: ModuleConfig) -> Self {
        self.modules.push(module);
        self
    }

    /// Sets the program-wide lock policy.
    #[must_use]
    pub fn with_lock_policy(mut self, policy: LockPolicyConfig) -> Self {
        self.lock_policy = policy;
        self
    }

    /// Total number of authored steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.modules
            .iter()
            .flat_map(|m| &m.groups)
            .map(|g| g.steps.len())
            .sum()
    }
}

impl ModuleConfig {
    /// Creates an empty module.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            allow_parallel: false,
            is_optional: false,
            wait_for_indices: Vec::new(),
            lock_policy: LockPolicyConfig::default(),
            groups: Vec::new(),
        }
    }

    /// Appends a task group.
    #[must_use]
    pub fn with_group(mut self, group: TaskGroupConfig) -> Self {
        self.groups.push(group);
        self
    }

    /// Sets the lock policy.
    #[must_use]
    pub fn with_lock_policy(mut self, policy: LockPolicyConfig) -> Self {
        self.lock_policy = policy;
        self
    }
}

impl TaskGroupConfig {
    /// Creates an empty group.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            description: None,
            allow_parallel: false,
            is_optional: false,
            wait_for_indices: Vec::new(),
            lock_policy: LockPolicyConfig::default(),
            steps: Vec::new(),
        }
    }

    /// Appends a step.
    #[must_use]
    pub fn with_step(mut self, step: StepConfig) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the lock policy.
    #[must_use]
    pub fn with_lock_policy(mut self, policy: LockPolicyConfig) -> Self {
        self.lock_policy = policy;
        self
    }

    /// Lets the group run alongside its siblings.
    #[must_use]
    pub const fn parallel(mut self) -> Self {
        self.allow_parallel = true;
        self
    }
}

impl StepConfig {
    /// A bare step of the given type; see the typed constructors.
    #[must_use]
    pub fn new(name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            name: name.into(),
            step_type,
            description: None,
            target: None,
            destination: None,
            target_angle: None,
            tolerance: None,
            allow_parallel: false,
            is_optional: false,
            wait_for_step_indices: Vec::new(),
            hint_text: None,
            conditions: Vec::new(),
        }
    }

    /// Grab `target`.
    #[must_use]
    pub fn grab(name: impl Into<String>, target: impl Into<ObjectBinding>) -> Self {
        let mut step = Self::new(name, StepType::Grab);
        step.target = Some(target.into());
        step
    }

    /// Grab `target` and snap it into `destination`.
    #[must_use]
    pub fn grab_and_snap(
        name: impl Into<String>,
        target: impl Into<ObjectBinding>,
        destination: impl Into<ObjectBinding>,
    ) -> Self {
        let mut step = Self::new(name, StepType::GrabAndSnap);
        step.target = Some(target.into());
        step.destination = Some(destination.into());
        step
    }

    /// Turn `target` to `angle` degrees.
    #[must_use]
    pub fn turn_knob(name: impl Into<String>, target: impl Into<ObjectBinding>, angle: f32) -> Self {
        let mut step = Self::new(name, StepType::TurnKnob);
        step.target = Some(target.into());
        step.target_angle = Some(angle);
        step
    }

    /// Wait for the listed earlier siblings.
    #[must_use]
    pub fn wait_for(name: impl Into<String>, indices: impl IntoIterator<Item = usize>) -> Self {
        let mut step = Self::new(name, StepType::WaitForCondition);
        step.wait_for_step_indices = indices.into_iter().collect();
        step
    }

    /// Show `text` until acknowledged.
    #[must_use]
    pub fn show_instruction(name: impl Into<String>, text: impl Into<String>) -> Self {
        let mut step = Self::new(name, StepType::ShowInstruction);
        step.hint_text = Some(text.into());
        step
    }

    /// Adds a condition on top of the step type's own.
    #[must_use]
    pub fn with_condition(mut self, condition: ConditionSpec) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Sets the rotation tolerance.
    #[must_use]
    pub const fn with_tolerance(mut self, tolerance: f32) -> Self {
        self.tolerance = Some(tolerance);
        self
    }

    /// Sets the hint text.
    #[must_use]
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint_text = Some(hint.into());
        self
    }

    /// Sets the description.
    #[must_use]
    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    /// Lets the step run alongside its siblings.
    #[must_use]
    pub const fn parallel(mut self) -> Self {
        self.allow_parallel = true;
        self
    }

    /// Marks the step optional.
    #[must_use]
    pub const fn optional(mut self) -> Self {
        self.is_optional = true;
        self
    }

    /// Requires the listed earlier siblings first.
    #[must_use]
    pub fn waits_for(mut self, indices: impl IntoIterator<Item = usize>) -> Self {
        self.wait_for_step_indices.extend(indices);
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_step_json_shape() {
        let json = r#"{
            "name": "Close valve",
            "type": "TurnKnob",
            "target": {"name": "Valve1"},
            "target_angle": 90.0,
            "hint_text": "Turn clockwise"
        }"#;
        let step: StepConfig = serde_json::from_str(json).unwrap();
        assert_eq!(step.step_type, StepType::TurnKnob);
        assert_eq!(step.target, Some(ObjectBinding::name("Valve1")));
        assert_eq!(step.target_angle, Some(90.0));
        assert!(step.tolerance.is_none());
        assert!(!step.allow_parallel);
    }

    #[test]
    fn test_condition_spec_is_tagged() {
        let json = r#"{"type":"proximity","a":{"name":"Trainee"},"b":{"name":"Panel"},"max_distance":1.5}"#;
        let spec: ConditionSpec = serde_json::from_str(json).unwrap();
        assert!(matches!(spec, ConditionSpec::Proximity { max_distance, .. } if (max_distance - 1.5).abs() < f32::EPSILON));
    }

    #[test]
    fn test_builders_count_steps() {
        let program = ProgramConfig::new("P").with_module(
            ModuleConfig::new("M").with_group(
                TaskGroupConfig::new("G")
                    .with_step(StepConfig::grab("Pick wrench", "Wrench"))
                    .with_step(StepConfig::wait_for("Wait", [0])),
            ),
        );
        assert_eq!(program.step_count(), 2);
        assert_eq!(StepType::GrabAndSnap.as_str(), "GrabAndSnap");
    }
}
