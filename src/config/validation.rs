//! Authored program validation.
//!
//! Validation walks the whole program and collects every issue instead of
//! stopping at the first, so authors can fix a file in one pass.

use std::collections::HashSet;

use crate::error::{ConfigIssue, ConfigIssueKind, ConfigurationError};

use super::program::{
    ConditionSpec, LockPolicyConfig, ModuleConfig, ProgramConfig, StepConfig, StepType,
    TaskGroupConfig,
};

#[derive(Default)]
struct Issues(Vec<ConfigIssue>);

impl Issues {
    fn push(&mut self, path: &str, kind: ConfigIssueKind) {
        self.0.push(ConfigIssue::new(path, kind));
    }
}

impl ProgramConfig {
    /// Validates the whole program.
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigurationError`] listing every issue found.
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        let mut issues = Issues::default();
        let path = label(&self.name, "program", 0);

        check_name(&mut issues, &path, &self.name);
        check_policy(&mut issues, &path, &self.lock_policy);
        check_unique(&mut issues, &path, self.modules.iter().map(|m| m.name.as_str()));

        for (i, module) in self.modules.iter().enumerate() {
            module.collect_issues(&mut issues, &format!("{path}/{}", label(&module.name, "module", i)), i);
        }

        if issues.0.is_empty() {
            Ok(())
        } else {
            Err(ConfigurationError { issues: issues.0 })
        }
    }
}

impl ModuleConfig {
    fn collect_issues(&self, issues: &mut Issues, path: &str, index: usize) {
        check_name(issues, path, &self.name);
        check_policy(issues, path, &self.lock_policy);
        check_dependencies(issues, path, index, &self.wait_for_indices);
        check_unique(issues, path, self.groups.iter().map(|g| g.name.as_str()));

        for (i, group) in self.groups.iter().enumerate() {
            group.collect_issues(issues, &format!("{path}/{}", label(&group.name, "group", i)), i);
        }
    }
}

impl TaskGroupConfig {
    fn collect_issues(&self, issues: &mut Issues, path: &str, index: usize) {
        check_name(issues, path, &self.name);
        check_policy(issues, path, &self.lock_policy);
        check_dependencies(issues, path, index, &self.wait_for_indices);
        check_unique(issues, path, self.steps.iter().map(|s| s.name.as_str()));

        for (i, step) in self.steps.iter().enumerate() {
            step.collect_issues(issues, &format!("{path}/step[{i}]"), i);
        }
    }
}

impl StepConfig {
    fn collect_issues(&self, issues: &mut Issues, path: &str, index: usize) {
        check_name(issues, path, &self.name);
        check_dependencies(issues, path, index, &self.wait_for_step_indices);

        let needs_target = matches!(
            self.step_type,
            StepType::Grab | StepType::GrabAndSnap | StepType::TurnKnob
        );
        if needs_target && self.target.is_none() {
            issues.push(
                path,
                ConfigIssueKind::MissingTarget {
                    step_type: self.step_type.as_str().to_string(),
                },
            );
        }

        match self.step_type {
            StepType::GrabAndSnap if self.destination.is_none() => {
                issues.push(path, ConfigIssueKind::MissingDestination);
            }
            StepType::TurnKnob if self.target_angle.is_none() => {
                issues.push(path, ConfigIssueKind::MissingTargetAngle);
            }
            StepType::WaitForCondition if self.wait_for_step_indices.is_empty() => {
                issues.push(path, ConfigIssueKind::EmptyWaitList);
            }
            StepType::ShowInstruction
                if self.hint_text.as_deref().map_or(true, |t| t.trim().is_empty()) =>
            {
                issues.push(path, ConfigIssueKind::MissingInstruction);
            }
            _ => {}
        }

        if let Some(tolerance) = self.tolerance {
            check_non_negative(issues, path, tolerance, |value| ConfigIssueKind::InvalidTolerance { value });
        }

        for condition in &self.conditions {
            check_condition(issues, path, condition);
        }
    }
}

fn check_condition(issues: &mut Issues, path: &str, condition: &ConditionSpec) {
    match condition {
        ConditionSpec::AllSnapped { points } if points.is_empty() => {
            issues.push(path, ConfigIssueKind::EmptyPointSet);
        }
        ConditionSpec::RotatedTo {
            tolerance: Some(value),
            ..
        } => check_non_negative(issues, path, *value, |value| ConfigIssueKind::InvalidTolerance { value }),
        ConditionSpec::Proximity { max_distance, .. } => {
            check_non_negative(issues, path, *max_distance, |value| ConfigIssueKind::InvalidDistance { value });
        }
        ConditionSpec::Custom { predicate_id } if predicate_id.trim().is_empty() => {
            issues.push(path, ConfigIssueKind::EmptyPredicateId);
        }
        _ => {}
    }
}

fn check_non_negative(issues: &mut Issues, path: &str, value: f32, kind: impl FnOnce(f32) -> ConfigIssueKind) {
    if !value.is_finite() || value < 0.0 {
        issues.push(path, kind(value));
    }
}

fn check_name(issues: &mut Issues, path: &str, name: &str) {
    if name.trim().is_empty() {
        issues.push(path, ConfigIssueKind::EmptyName);
    }
}

/// Sibling names must be unique: skip targets and summaries address nodes
/// by name.
fn check_unique<'a>(issues: &mut Issues, path: &str, names: impl Iterator<Item = &'a str>) {
    let mut seen = HashSet::new();
    let mut reported = HashSet::new();
    for name in names.map(str::trim).filter(|n| !n.is_empty()) {
        if !seen.insert(name) && reported.insert(name) {
            issues.push(
                path,
                ConfigIssueKind::DuplicateName {
                    name: name.to_string(),
                },
            );
        }
    }
}

/// Dependencies may only name earlier siblings, which keeps the dependency
/// graph acyclic.
fn check_dependencies(issues: &mut Issues, path: &str, own_index: usize, deps: &[usize]) {
    for &index in deps {
        let reason = if index == own_index {
            "a node cannot wait for itself"
        } else if index > own_index {
            "only earlier siblings may be waited for"
        } else {
            continue;
        };
        issues.push(
            path,
            ConfigIssueKind::InvalidDependency {
                index,
                reason: reason.to_string(),
            },
        );
    }
}

fn check_policy(issues: &mut Issues, path: &str, policy: &LockPolicyConfig) {
    let empty = policy
        .allowed_actions
        .iter()
        .chain(&policy.locked_actions)
        .any(|a| a.trim().is_empty());
    if empty {
        issues.push(path, ConfigIssueKind::EmptyActionId);
    }
}

fn label(name: &str, kind: &str, index: usize) -> String {
    let trimmed = name.trim();
    if trimmed.is_empty() {
        format!("{kind}[{index}]")
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::program::ObjectBinding;

    fn wrap(steps: Vec<StepConfig>) -> ProgramConfig {
        let mut group = TaskGroupConfig::new("G");
        group.steps = steps;
        ProgramConfig::new("P").with_module(ModuleConfig::new("M").with_group(group))
    }

    #[test]
    fn test_valid_program_passes() {
        let program = wrap(vec![
            StepConfig::grab("Pick", "Wrench"),
            StepConfig::turn_knob("Turn", "Knob", 45.0),
            StepConfig::wait_for("Wait", [0, 1]),
            StepConfig::show_instruction("Read", "Put on gloves"),
        ]);
        assert!(program.validate().is_ok());
    }

    #[test]
    fn test_collects_every_issue() {
        let mut snap = StepConfig::new("Snap", StepType::GrabAndSnap);
        snap.target = Some(ObjectBinding::name("Bolt"));
        let program = wrap(vec![
            StepConfig::new("Grab", StepType::Grab),
            snap,
            StepConfig::new("Turn", StepType::TurnKnob),
            StepConfig::new("Wait", StepType::WaitForCondition),
        ]);
        let err = program.validate().unwrap_err();
        let kinds: Vec<_> = err.issues.iter().map(|i| i.kind.clone()).collect();
        assert!(kinds.contains(&ConfigIssueKind::MissingTarget {
            step_type: "Grab".to_string()
        }));
        assert!(kinds.contains(&ConfigIssueKind::MissingDestination));
        assert!(kinds.contains(&ConfigIssueKind::MissingTargetAngle));
        assert!(kinds.contains(&ConfigIssueKind::EmptyWaitList));
        assert_eq!(err.issues[0].path, "P/M/G/step[0]");
    }

    #[test]
    fn test_forward_and_self_dependencies_rejected() {
        let program = wrap(vec![
            StepConfig::grab("A", "X").waits_for([1]),
            StepConfig::grab("B", "Y").waits_for([1]),
        ]);
        let err = program.validate().unwrap_err();
        assert_eq!(err.issues.len(), 2);
        assert!(err
            .issues
            .iter()
            .all(|i| matches!(i.kind, ConfigIssueKind::InvalidDependency { index: 1, .. })));
    }

    #[test]
    fn test_duplicate_sibling_names_reported_once() {
        let program = wrap(vec![
            StepConfig::grab("Same", "X"),
            StepConfig::grab("Same", "Y"),
            StepConfig::grab("Same", "Z"),
        ]);
        let err = program.validate().unwrap_err();
        assert_eq!(
            err.issues,
            vec![ConfigIssue::new(
                "P/M/G",
                ConfigIssueKind::DuplicateName {
                    name: "Same".to_string()
                }
            )]
        );
    }

    #[test]
    fn test_condition_and_policy_checks() {
        let step = StepConfig::grab("Pick", "Wrench")
            .with_tolerance(-1.0)
            .with_condition(ConditionSpec::AllSnapped { points: Vec::new() })
            .with_condition(ConditionSpec::Custom {
                predicate_id: "  ".to_string(),
            });
        let program = wrap(vec![step]).with_lock_policy(LockPolicyConfig {
            allowed_actions: vec![String::new()],
            locked_actions: Vec::new(),
        });
        let err = program.validate().unwrap_err();
        let kinds: Vec<_> = err.issues.iter().map(|i| i.kind.clone()).collect();
        assert!(kinds.contains(&ConfigIssueKind::EmptyActionId));
        assert!(kinds.contains(&ConfigIssueKind::InvalidTolerance { value: -1.0 }));
        assert!(kinds.contains(&ConfigIssueKind::EmptyPointSet));
        assert!(kinds.contains(&ConfigIssueKind::EmptyPredicateId));
    }
}
