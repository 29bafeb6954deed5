use std::collections::BTreeSet;

use trainflow::{
    ActionId, ActionVerdict, LockPolicyConfig, ModuleConfig, NameDirectory, ObjectRef,
    ProgramConfig, StepConfig, TaskGroupConfig, TrainingEvent, VolumeOrchestrator, VolumeSettings,
};

fn policy(allowed: &[&str], locked: &[&str]) -> LockPolicyConfig {
    LockPolicyConfig {
        allowed_actions: allowed.iter().map(ToString::to_string).collect(),
        locked_actions: locked.iter().map(ToString::to_string).collect(),
    }
}

/// Two modules: the first only allows valve work, the second only drain
/// work. The program denies the breaker throughout.
fn plant() -> ProgramConfig {
    ProgramConfig::new("Plant")
        .with_lock_policy(policy(&[], &["breaker"]))
        .with_module(
            ModuleConfig::new("Isolate")
                .with_lock_policy(policy(&["valve", "breaker"], &[]))
                .with_group(TaskGroupConfig::new("Valves").with_step(StepConfig::grab("Close", "Valve"))),
        )
        .with_module(
            ModuleConfig::new("Drain")
                .with_lock_policy(policy(&["drain"], &[]))
                .with_group(TaskGroupConfig::new("Tank").with_step(StepConfig::grab("Open", "Drain"))),
        )
}

fn session(settings: VolumeSettings) -> VolumeOrchestrator {
    let mut scene = NameDirectory::new();
    scene.register_path("Valve");
    scene.register_path("Drain");
    let compiled = plant().compile(&scene).unwrap();
    VolumeOrchestrator::from_program(&compiled, settings)
}

#[test]
fn everything_is_permitted_before_start() {
    let volume = session(VolumeSettings::default());
    assert!(volume.gate().is_unrestricted());
    assert!(volume.is_action_allowed("breaker"));
    assert!(volume.unlocked_actions().is_none());
}

#[test]
fn ancestor_deny_overrides_descendant_allow() {
    let mut volume = session(VolumeSettings::default());
    volume.start().unwrap();

    assert!(volume.is_action_allowed("valve"));
    assert!(volume.is_action_locked("breaker"));
    assert!(volume.is_action_locked("drain"));
    assert_eq!(
        volume.unlocked_actions(),
        Some(BTreeSet::from([ActionId::new("valve")]))
    );
}

#[test]
fn gate_follows_the_active_module() {
    let mut volume = session(VolumeSettings::default());
    let stream = volume.events();
    volume.start().unwrap();
    volume.notify_grab(ObjectRef::from_scene_path("Valve"), true);

    assert!(volume.is_action_locked("valve"));
    assert!(volume.is_action_allowed("drain"));

    let gates: Vec<_> = stream
        .drain()
        .into_iter()
        .filter_map(|e| match e {
            TrainingEvent::GateChanged { gate } => Some(gate),
            _ => None,
        })
        .collect();
    assert_eq!(gates.len(), 2, "one change on start, one on the module switch");
    assert!(gates[0].is_action_allowed(&ActionId::new("valve")));
    assert!(gates[1].is_action_allowed(&ActionId::new("drain")));
}

#[test]
fn locked_action_is_blocked_or_warned() {
    let mut hard = session(VolumeSettings::default());
    hard.start().unwrap();
    let stream = hard.events();
    assert_eq!(hard.attempt_action("valve"), ActionVerdict::Allowed);
    assert_eq!(hard.attempt_action("drain"), ActionVerdict::Blocked);
    assert!(matches!(
        stream.try_recv().unwrap(),
        Some(TrainingEvent::ActionBlocked { action }) if action.as_str() == "drain"
    ));
    assert_eq!(hard.statistics().blocked_actions, 1);

    let mut soft = session(VolumeSettings {
        allow_mistakes_with_warning: true,
        ..VolumeSettings::default()
    });
    soft.start().unwrap();
    let stream = soft.events();
    let verdict = soft.attempt_action("drain");
    assert_eq!(verdict, ActionVerdict::Warned);
    assert!(verdict.proceeds());
    assert!(matches!(
        stream.try_recv().unwrap(),
        Some(TrainingEvent::ActionWarning { .. })
    ));
    assert_eq!(soft.statistics().warnings, 1);
}

#[test]
fn gate_is_lifted_when_the_program_completes() {
    let mut volume = session(VolumeSettings::default());
    volume.start().unwrap();
    volume.notify_grab(ObjectRef::from_scene_path("Valve"), true);
    volume.notify_grab(ObjectRef::from_scene_path("Drain"), true);

    assert!(volume.is_complete());
    assert!(volume.gate().is_unrestricted());
}
