use std::collections::BTreeSet;

use trainflow::{
    ConditionSpec, ModuleConfig, NameDirectory, NodeId, ObjectRef, ProgramConfig, ProgressTree,
    RuntimeState, SessionError, StepConfig, TaskGroupConfig, TrainingError, VolumeOrchestrator,
    VolumeSettings,
};

fn scene(names: &[&str]) -> NameDirectory {
    let mut dir = NameDirectory::new();
    for name in names {
        dir.register_path(name);
    }
    dir
}

fn obj(name: &str) -> ObjectRef {
    ObjectRef::from_scene_path(name)
}

fn session(program: &ProgramConfig, dir: &NameDirectory) -> VolumeOrchestrator {
    let compiled = program.compile(dir).unwrap();
    let mut volume = VolumeOrchestrator::from_program(&compiled, VolumeSettings::default());
    volume.start().unwrap();
    volume
}

fn step(volume: &VolumeOrchestrator, path: &[&str]) -> NodeId {
    volume.tree().find(path).unwrap()
}

/// Every active interior node has at most one active child that is not
/// marked parallel. Optional children count like any other.
fn assert_single_sequential_path(tree: &ProgressTree, state: &RuntimeState) {
    for node in tree.iter().filter(|n| state.is_active(n.id)) {
        let sequential = node
            .children
            .iter()
            .filter(|c| state.is_active(**c))
            .filter(|c| !tree.node(**c).unwrap().allows_parallel)
            .count();
        assert!(sequential <= 1, "{} has {sequential} sequential active children", node.name);
    }
    for node in tree.iter().filter(|n| state.is_active(n.id)) {
        if let Some(parent) = node.parent {
            assert!(state.is_active(parent), "{} is active under an inactive parent", node.name);
        }
    }
}

fn parallel_program() -> ProgramConfig {
    ProgramConfig::new("Bench").with_module(
        ModuleConfig::new("Setup").with_group(
            TaskGroupConfig::new("Tools")
                .with_step(StepConfig::grab("A", "Wrench").parallel())
                .with_step(StepConfig::grab("B", "Torch").parallel())
                .with_step(StepConfig::grab("C", "Gauge").waits_for([0, 1])),
        ),
    )
}

#[test]
fn parallel_pair_gates_dependent_step_in_either_order() {
    let dir = scene(&["Wrench", "Torch", "Gauge"]);

    for order in [["Wrench", "Torch"], ["Torch", "Wrench"]] {
        let mut volume = session(&parallel_program(), &dir);
        let a = step(&volume, &["Setup", "Tools", "A"]);
        let b = step(&volume, &["Setup", "Tools", "B"]);
        let c = step(&volume, &["Setup", "Tools", "C"]);
        assert!(volume.state().is_active(a) && volume.state().is_active(b));

        volume.notify_grab(obj(order[0]), true);
        assert!(!volume.state().is_active(c), "C must wait for both");

        volume.notify_grab(obj(order[1]), true);
        assert!(volume.state().is_completed(a));
        assert!(volume.state().is_completed(b));
        assert!(volume.state().is_active(c));
        assert_single_sequential_path(volume.tree(), volume.state());
    }
}

#[test]
fn rotation_tolerance_boundaries() {
    let dir = scene(&["Knob1"]);
    let program = ProgramConfig::new("Panel").with_module(
        ModuleConfig::new("Dial")
            .with_group(TaskGroupConfig::new("Set").with_step(StepConfig::turn_knob("Turn", "Knob1", 45.0))),
    );

    let mut volume = session(&program, &dir);
    volume.notify_rotation(obj("Knob1"), 51.0);
    assert!(!volume.is_complete());
    volume.notify_rotation(obj("Knob1"), 44.0);
    assert!(volume.is_complete());
}

#[test]
fn all_snapped_covers_sockets_discovered_later() {
    let dir = scene(&["S1", "S2", "S3"]);
    let program = ProgramConfig::new("Board").with_module(
        ModuleConfig::new("Fill").with_group(
            TaskGroupConfig::new("Sockets").with_step(
                StepConfig::show_instruction("Fill all", "Fill every socket").with_condition(
                    ConditionSpec::AllSnapped {
                        points: vec!["S1".into(), "S2".into(), "S3".into()],
                    },
                ),
            ),
        ),
    );
    let mut volume = session(&program, &dir);
    let fill = step(&volume, &["Fill", "Sockets", "Fill all"]);
    volume.acknowledge(fill).unwrap();
    volume.register_socket(obj("S4"));

    for (i, socket) in ["S1", "S2", "S3"].iter().enumerate() {
        volume.notify_snap(obj(socket), obj(&format!("Plug{i}")), true);
    }
    assert!(!volume.is_complete(), "S4 is known and empty");

    volume.notify_snap(obj("S4"), obj("Plug3"), true);
    assert!(volume.is_complete());
}

#[test]
fn reset_restores_three_completed_steps() {
    let dir = scene(&["A", "B", "C"]);
    let program = ProgramConfig::new("Line").with_module(
        ModuleConfig::new("M").with_group(
            TaskGroupConfig::new("G")
                .with_step(StepConfig::grab("Grab A", "A"))
                .with_step(StepConfig::grab("Grab B", "B"))
                .with_step(StepConfig::grab("Grab C", "C")),
        ),
    );
    let mut volume = session(&program, &dir);
    let steps: Vec<NodeId> = volume.tree().steps().map(|s| s.id).collect();

    volume.notify_grab(obj("A"), true);
    volume.notify_grab(obj("B"), true);
    volume.notify_grab(obj("C"), true);
    assert!(steps.iter().all(|s| volume.state().is_completed(*s)));

    volume.reset();
    assert!(steps.iter().all(|s| !volume.state().is_completed(*s)));
    let root = volume.tree().root();
    let module = volume.tree().node(root).unwrap().children[0];
    let group = volume.tree().node(module).unwrap().children[0];
    assert_eq!(volume.active_frontier(), vec![root, module, group, steps[0]]);
}

#[test]
fn unresolved_name_does_not_halt_siblings() {
    let dir = scene(&["Wrench"]);
    let program = ProgramConfig::new("Shop").with_module(
        ModuleConfig::new("M").with_group(
            TaskGroupConfig::new("G")
                .with_step(StepConfig::grab("Missing", "Ghost").parallel())
                .with_step(StepConfig::grab("Present", "Wrench").parallel()),
        ),
    );
    let compiled = program.compile(&dir).unwrap();
    assert_eq!(compiled.warnings.len(), 1);

    let mut volume = VolumeOrchestrator::from_program(&compiled, VolumeSettings::default());
    volume.start().unwrap();
    volume.notify_grab(obj("Ghost"), true);
    volume.notify_grab(obj("Wrench"), true);
    volume.update_progress();

    let missing = step(&volume, &["M", "G", "Missing"]);
    let present = step(&volume, &["M", "G", "Present"]);
    assert!(volume.state().is_completed(present));
    assert!(!volume.state().is_completed(missing));
    assert!(volume.state().is_active(missing));
}

#[test]
fn conditions_latch_while_active() {
    let dir = scene(&["Valve", "Handle"]);
    let program = ProgramConfig::new("Latch").with_module(
        ModuleConfig::new("M").with_group(
            TaskGroupConfig::new("G").with_step(
                StepConfig::grab("Hold and turn", "Handle").with_condition(ConditionSpec::RotatedTo {
                    target: "Valve".into(),
                    target_value: 90.0,
                    tolerance: None,
                }),
            ),
        ),
    );
    let mut volume = session(&program, &dir);
    volume.notify_grab(obj("Handle"), true);
    volume.notify_grab(obj("Handle"), false);
    volume.notify_rotation(obj("Valve"), 88.0);
    assert!(volume.is_complete(), "the grab latched before release");
}

#[test]
fn later_steps_do_not_latch_while_inactive() {
    let dir = scene(&["A", "B"]);
    let program = ProgramConfig::new("Order").with_module(
        ModuleConfig::new("M").with_group(
            TaskGroupConfig::new("G")
                .with_step(StepConfig::grab("First", "A"))
                .with_step(StepConfig::grab("Second", "B")),
        ),
    );
    let mut volume = session(&program, &dir);
    let second = step(&volume, &["M", "G", "Second"]);

    volume.notify_grab(obj("B"), true);
    volume.notify_grab(obj("B"), false);
    volume.notify_grab(obj("A"), true);
    assert!(volume.state().is_active(second));
    assert!(!volume.state().is_completed(second));
}

#[test]
fn completion_is_monotonic_and_update_is_idempotent() {
    let dir = scene(&["Wrench", "Torch", "Gauge"]);
    let mut volume = session(&parallel_program(), &dir);
    let mut completed: BTreeSet<NodeId> = BTreeSet::new();

    for name in ["Torch", "Wrench", "Gauge"] {
        volume.notify_grab(obj(name), true);
        volume.notify_grab(obj(name), false);
        let now: BTreeSet<NodeId> = volume
            .tree()
            .iter()
            .map(|n| n.id)
            .filter(|id| volume.state().is_completed(*id))
            .collect();
        assert!(completed.is_subset(&now));
        completed = now;

        let before = volume.snapshot();
        volume.update_progress();
        volume.update_progress();
        assert_eq!(before, volume.snapshot());
        assert_single_sequential_path(volume.tree(), volume.state());
    }
    assert!(volume.is_complete());
}

#[test]
fn optional_step_does_not_block_its_group() {
    let dir = scene(&["Gloves", "Wrench"]);
    let program = ProgramConfig::new("Safety").with_module(
        ModuleConfig::new("M").with_group(
            TaskGroupConfig::new("G")
                .with_step(StepConfig::grab("Gloves", "Gloves").optional())
                .with_step(StepConfig::grab("Wrench", "Wrench")),
        ),
    );
    let mut volume = session(&program, &dir);
    let gloves = step(&volume, &["M", "G", "Gloves"]);
    let wrench = step(&volume, &["M", "G", "Wrench"]);
    assert!(volume.state().is_active(gloves));
    assert!(!volume.state().is_active(wrench), "an optional step still holds its turn");
    assert_single_sequential_path(volume.tree(), volume.state());

    volume.notify_grab(obj("Wrench"), true);
    assert!(!volume.is_complete());

    volume.pass_optional(gloves).unwrap();
    assert!(volume.is_complete());
    assert!(volume.state().status(gloves).skipped);
    assert!((volume.completion_percentage() - 1.0).abs() < f32::EPSILON);
}

#[test]
fn optional_steps_never_run_beside_sequential_siblings() {
    let dir = scene(&["A", "B", "C"]);
    let program = ProgramConfig::new("Line").with_module(
        ModuleConfig::new("M").with_group(
            TaskGroupConfig::new("G")
                .with_step(StepConfig::grab("A", "A"))
                .with_step(StepConfig::grab("B", "B").optional())
                .with_step(StepConfig::grab("C", "C")),
        ),
    );
    let mut volume = session(&program, &dir);
    let b = step(&volume, &["M", "G", "B"]);
    assert_single_sequential_path(volume.tree(), volume.state());

    volume.notify_grab(obj("A"), true);
    assert!(volume.state().is_active(b));
    assert_single_sequential_path(volume.tree(), volume.state());

    // Only the active optional node can be passed over.
    let c = step(&volume, &["M", "G", "C"]);
    assert!(matches!(
        volume.pass_optional(c),
        Err(TrainingError::Session(SessionError::NotPassable { .. }))
    ));

    volume.notify_grab(obj("B"), true);
    assert!(volume.state().is_completed(b));
    assert!(!volume.state().status(b).skipped);
    assert!(volume.state().is_active(c));
    assert_single_sequential_path(volume.tree(), volume.state());
}

#[test]
fn wait_step_completes_once_its_dependencies_do() {
    let dir = scene(&["A", "B"]);
    let program = ProgramConfig::new("Wait").with_module(
        ModuleConfig::new("M").with_group(
            TaskGroupConfig::new("G")
                .with_step(StepConfig::grab("A", "A").parallel())
                .with_step(StepConfig::grab("B", "B").parallel())
                .with_step(StepConfig::wait_for("Both done", [0, 1]))
                .with_step(StepConfig::show_instruction("Report", "Tell the supervisor").waits_for([2])),
        ),
    );
    let mut volume = session(&program, &dir);
    let wait = step(&volume, &["M", "G", "Both done"]);
    assert!(!volume.state().is_active(wait));
    volume.notify_grab(obj("A"), true);
    volume.notify_grab(obj("B"), true);

    let report = step(&volume, &["M", "G", "Report"]);
    assert!(volume.state().is_completed(wait));
    assert!(volume.state().is_active(report));
    assert_eq!(volume.current_instruction(), "Tell the supervisor");
}
