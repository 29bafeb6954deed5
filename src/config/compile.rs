//! Compiles a validated [`ProgramConfig`] into a [`ProgressTree`].
//!
//! Name-based bindings are resolved exactly once here. A name that matches
//! several scene objects is a configuration error. A name that matches none
//! is not: the condition that needed it compiles to
//! [`Condition::Unresolved`], which never holds, and a warning is recorded.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::condition::{Condition, DEFAULT_ROTATION_TOLERANCE};
use crate::error::{ConfigIssue, ConfigIssueKind, ConfigurationError, UnresolvedReference};
use crate::object::{ActionId, ObjectRef, ObjectResolver, Resolution};
use crate::tree::{LockPolicy, NodeId, NodeKind, ProgressNode, ProgressTree, TreeBuilder};

use super::program::{
    ConditionSpec, LockPolicyConfig, ModuleConfig, ObjectBinding, ProgramConfig, StepConfig,
    StepType, TaskGroupConfig,
};

/// Custom predicate acknowledged by [`crate::VolumeOrchestrator::acknowledge`]
/// for a `ShowInstruction` step.
#[must_use]
pub fn acknowledgement_predicate(node: NodeId) -> String {
    format!("ack:{}", node.index())
}

/// A compiled program ready to be run by any number of sessions.
#[derive(Debug, Clone)]
pub struct CompiledProgram {
    /// The shared authored tree.
    pub tree: Arc<ProgressTree>,
    /// Name-based references that failed to resolve.
    pub warnings: Vec<UnresolvedReference>,
}

impl CompiledProgram {
    /// True if every reference resolved.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.warnings.is_empty()
    }
}

impl ProgramConfig {
    /// Validates and compiles the program, resolving names through
    /// `resolver`.
    ///
    /// # Errors
    ///
    /// Returns the [`ConfigurationError`] from [`Self::validate`], or one
    /// listing every ambiguous object name.
    pub fn compile<R>(&self, resolver: &R) -> Result<CompiledProgram, ConfigurationError>
    where
        R: ObjectResolver + ?Sized,
    {
        self.validate()?;

        let root = ProgressNode {
            description: self.description.clone(),
            lock_policy: lock_policy(&self.lock_policy),
            ..ProgressNode::new(NodeKind::Program, self.name.trim())
        };
        let mut compiler = Compiler {
            resolver,
            builder: ProgressTree::builder(root),
            warnings: Vec::new(),
            issues: Vec::new(),
        };
        for module in &self.modules {
            compiler.module(module);
        }
        if !compiler.issues.is_empty() {
            return Err(ConfigurationError {
                issues: compiler.issues,
            });
        }

        let tree = compiler.builder.build();
        debug!(
            program = %self.name,
            nodes = tree.len(),
            unresolved = compiler.warnings.len(),
            "compiled training program"
        );
        Ok(CompiledProgram {
            tree: Arc::new(tree),
            warnings: compiler.warnings,
        })
    }
}

struct Compiler<'r, R: ?Sized> {
    resolver: &'r R,
    builder: TreeBuilder,
    warnings: Vec<UnresolvedReference>,
    issues: Vec<ConfigIssue>,
}

impl<R: ObjectResolver + ?Sized> Compiler<'_, R> {
    fn module(&mut self, module: &ModuleConfig) {
        let node = ProgressNode {
            description: module.description.clone(),
            optional: module.is_optional,
            allows_parallel: module.allow_parallel,
            depends_on: module.wait_for_indices.iter().copied().collect(),
            lock_policy: lock_policy(&module.lock_policy),
            ..ProgressNode::new(NodeKind::Module, module.name.trim())
        };
        let id = self.builder.push(NodeId::ROOT, node);
        for group in &module.groups {
            self.group(id, group);
        }
    }

    fn group(&mut self, parent: NodeId, group: &TaskGroupConfig) {
        let node = ProgressNode {
            description: group.description.clone(),
            optional: group.is_optional,
            allows_parallel: group.allow_parallel,
            depends_on: group.wait_for_indices.iter().copied().collect(),
            lock_policy: lock_policy(&group.lock_policy),
            ..ProgressNode::new(NodeKind::Group, group.name.trim())
        };
        let id = self.builder.push(parent, node);
        for step in &group.steps {
            self.step(id, step);
        }
    }

    fn step(&mut self, parent: NodeId, step: &StepConfig) {
        let node = ProgressNode {
            description: step.description.clone(),
            hint: step.hint_text.clone(),
            optional: step.is_optional,
            allows_parallel: step.allow_parallel,
            depends_on: step.wait_for_step_indices.iter().copied().collect(),
            ..ProgressNode::new(NodeKind::Step, step.name.trim())
        };
        let id = self.builder.push(parent, node);
        let location = self.location(id);

        let mut conditions = Vec::new();
        if let Some(condition) = self.step_condition(id, step, &location) {
            conditions.push(condition);
        }
        for spec in &step.conditions {
            conditions.push(self.condition(spec, &location));
        }

        if let Some(node) = self.builder.node_mut(id) {
            node.requirement.conditions = conditions;
        }
    }

    /// The condition implied by the step type. Validation guarantees the
    /// fields each type needs are present.
    fn step_condition(&mut self, id: NodeId, step: &StepConfig, location: &str) -> Option<Condition> {
        let condition = match step.step_type {
            StepType::Grab => {
                let target = step.target.as_ref()?;
                self.with_refs(&[target], location, |r| Condition::Grabbed { target: r[0] })
            }
            StepType::GrabAndSnap => {
                let target = step.target.as_ref()?;
                let destination = step.destination.as_ref()?;
                self.with_refs(&[target, destination], location, |r| Condition::ObjectSnapped {
                    target: r[0],
                    expected_counterpart: Some(r[1]),
                })
            }
            StepType::TurnKnob => {
                let target = step.target.as_ref()?;
                let target_value = step.target_angle?;
                let tolerance = step.tolerance.unwrap_or(DEFAULT_ROTATION_TOLERANCE);
                self.with_refs(&[target], location, |r| Condition::RotatedTo {
                    target: r[0],
                    target_value,
                    tolerance,
                })
            }
            StepType::WaitForCondition => return None,
            StepType::ShowInstruction => Condition::Custom {
                predicate_id: acknowledgement_predicate(id),
            },
        };
        Some(condition)
    }

    fn condition(&mut self, spec: &ConditionSpec, location: &str) -> Condition {
        match spec {
            ConditionSpec::ObjectSnapped { target, counterpart } => match counterpart {
                Some(counterpart) => self.with_refs(&[target, counterpart], location, |r| {
                    Condition::ObjectSnapped {
                        target: r[0],
                        expected_counterpart: Some(r[1]),
                    }
                }),
                None => self.with_refs(&[target], location, |r| Condition::ObjectSnapped {
                    target: r[0],
                    expected_counterpart: None,
                }),
            },
            ConditionSpec::AllSnapped { points } => {
                let bindings: Vec<&ObjectBinding> = points.iter().collect();
                self.with_refs(&bindings, location, |r| Condition::AllSnapped {
                    required_points: r.iter().copied().collect::<BTreeSet<_>>(),
                })
            }
            ConditionSpec::Grabbed { target } => {
                self.with_refs(&[target], location, |r| Condition::Grabbed { target: r[0] })
            }
            ConditionSpec::RotatedTo {
                target,
                target_value,
                tolerance,
            } => {
                let target_value = *target_value;
                let tolerance = tolerance.unwrap_or(DEFAULT_ROTATION_TOLERANCE);
                self.with_refs(&[target], location, |r| Condition::RotatedTo {
                    target: r[0],
                    target_value,
                    tolerance,
                })
            }
            ConditionSpec::Proximity { a, b, max_distance } => {
                let max_distance = *max_distance;
                self.with_refs(&[a, b], location, |r| Condition::Proximity {
                    a: r[0],
                    b: r[1],
                    max_distance,
                })
            }
            ConditionSpec::Custom { predicate_id } => Condition::Custom {
                predicate_id: predicate_id.trim().to_string(),
            },
        }
    }

    /// Resolves every binding and builds the condition, or degrades to
    /// [`Condition::Unresolved`] naming the first binding that failed.
    /// Ambiguous names are also recorded as issues, which fail the compile.
    fn with_refs(
        &mut self,
        bindings: &[&ObjectBinding],
        location: &str,
        build: impl FnOnce(&[ObjectRef]) -> Condition,
    ) -> Condition {
        let mut refs = Vec::with_capacity(bindings.len());
        for binding in bindings {
            match self.resolve(binding) {
                Resolution::Found(r) => refs.push(r),
                Resolution::Ambiguous => {
                    let name = binding.describe();
                    self.issues.push(ConfigIssue::new(
                        location,
                        ConfigIssueKind::AmbiguousName { name: name.clone() },
                    ));
                    return Condition::Unresolved { reference: name };
                }
                Resolution::Missing => {
                    let name = binding.describe();
                    warn!(name = %name, location, "unresolved object reference; condition will never hold");
                    self.warnings.push(UnresolvedReference {
                        name: name.clone(),
                        location: location.to_string(),
                    });
                    return Condition::Unresolved { reference: name };
                }
            }
        }
        build(&refs)
    }

    fn resolve(&self, binding: &ObjectBinding) -> Resolution {
        match binding {
            ObjectBinding::Ref(r) => Resolution::Found(*r),
            ObjectBinding::Name(name) => self.resolver.lookup(name.trim()),
        }
    }

    fn location(&self, id: NodeId) -> String {
        let mut names = Vec::new();
        let mut cursor = Some(id);
        while let Some(current) = cursor {
            match self.builder.node(current) {
                Some(node) => {
                    names.push(node.name.clone());
                    cursor = node.parent;
                }
                None => break,
            }
        }
        names.reverse();
        names.join("/")
    }
}

fn lock_policy(config: &LockPolicyConfig) -> LockPolicy {
    LockPolicy {
        allowed_actions: config.allowed_actions.iter().map(ActionId::new).collect(),
        locked_actions: config.locked_actions.iter().map(ActionId::new).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::object::NameDirectory;

    fn directory() -> NameDirectory {
        let mut dir = NameDirectory::new();
        dir.register_path("Wrench");
        dir.register_path("Bolt");
        dir.register_path("Socket1");
        dir.register_path("Knob");
        dir
    }

    fn program() -> ProgramConfig {
        ProgramConfig::new("Assembly").with_module(
            ModuleConfig::new("Prepare").with_group(
                TaskGroupConfig::new("Tools")
                    .with_step(StepConfig::grab("Pick wrench", "Wrench"))
                    .with_step(StepConfig::grab_and_snap("Seat bolt", "Bolt", "Socket1"))
                    .with_step(StepConfig::turn_knob("Open", "Knob", 45.0))
                    .with_step(StepConfig::show_instruction("Read", "Check the gauge"))
                    .with_step(StepConfig::wait_for("Wait", [0, 1])),
            ),
        )
    }

    #[test]
    fn test_step_types_map_to_conditions() {
        let compiled = program().compile(&directory()).unwrap();
        assert!(compiled.is_clean());
        let tree = &compiled.tree;
        let steps: Vec<_> = tree.steps().collect();
        assert_eq!(steps.len(), 5);

        let wrench = ObjectRef::from_scene_path("Wrench");
        assert_eq!(
            steps[0].requirement.conditions,
            vec![Condition::Grabbed { target: wrench }]
        );
        assert!(matches!(
            steps[1].requirement.conditions[0],
            Condition::ObjectSnapped {
                expected_counterpart: Some(_),
                ..
            }
        ));
        assert!(matches!(
            steps[2].requirement.conditions[0],
            Condition::RotatedTo { tolerance, .. } if (tolerance - 5.0).abs() < f32::EPSILON
        ));
        assert_eq!(
            steps[3].requirement.conditions[0].custom_predicate(),
            Some(acknowledgement_predicate(steps[3].id).as_str())
        );
        assert!(steps[4].requirement.is_empty());
        assert_eq!(steps[4].depends_on, [0, 1].into_iter().collect());
        assert_eq!(tree.interested_in(wrench), &[steps[0].id]);
    }

    #[test]
    fn test_unresolved_name_degrades_condition() {
        let mut dir = NameDirectory::new();
        for name in ["Wrench", "Socket1", "Knob"] {
            dir.register_path(name);
        }
        let compiled = program().compile(&dir).unwrap();

        assert_eq!(compiled.warnings.len(), 1);
        assert_eq!(compiled.warnings[0].name, "Bolt");
        assert_eq!(compiled.warnings[0].location, "Assembly/Prepare/Tools/Seat bolt");
        let seat = compiled.tree.steps().nth(1).unwrap();
        assert_eq!(
            seat.requirement.conditions,
            vec![Condition::Unresolved {
                reference: "Bolt".to_string()
            }]
        );
    }

    #[test]
    fn test_ambiguous_name_is_a_configuration_error() {
        let mut dir = directory();
        dir.register("Bolt", ObjectRef::new());
        dir.register("Knob", ObjectRef::new());
        let err = program().compile(&dir).unwrap_err();

        assert_eq!(err.issues.len(), 2);
        assert_eq!(
            err.issues[0].kind,
            ConfigIssueKind::AmbiguousName {
                name: "Bolt".to_string()
            }
        );
        assert_eq!(err.issues[0].path, "Assembly/Prepare/Tools/Seat bolt");
        assert_eq!(err.issues[1].path, "Assembly/Prepare/Tools/Open");
    }

    #[test]
    fn test_invalid_program_is_rejected() {
        let program = ProgramConfig::new("P").with_module(
            ModuleConfig::new("M")
                .with_group(TaskGroupConfig::new("G").with_step(StepConfig::new("S", StepType::Grab))),
        );
        let err = program.compile(&directory()).unwrap_err();
        assert_eq!(err.issues.len(), 1);
    }

    #[test]
    fn test_lock_policies_are_carried() {
        let policy = LockPolicyConfig {
            allowed_actions: vec!["wrench".to_string()],
            locked_actions: Vec::new(),
        };
        let program = ProgramConfig::new("P").with_module(
            ModuleConfig::new("M")
                .with_lock_policy(policy)
                .with_group(TaskGroupConfig::new("G").with_step(StepConfig::grab("S", "Wrench"))),
        );
        let compiled = program.compile(&directory()).unwrap();
        let module = compiled.tree.find(&["M"]).unwrap();
        let node = compiled.tree.node(module).unwrap();
        assert!(node.lock_policy.allowed_actions.contains(&ActionId::new("wrench")));
    }
}
