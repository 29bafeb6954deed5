//! Authored configuration and session settings.
//!
//! A program is authored offline as a [`ProgramConfig`], validated (every
//! issue collected), and compiled into an immutable [`crate::ProgressTree`].
//! Session policy comes from [`VolumeSettings`].

mod compile;
mod program;
mod serialization;
mod settings;
mod validation;

pub use compile::{acknowledgement_predicate, CompiledProgram};
pub use program::{
    ConditionSpec, LockPolicyConfig, ModuleConfig, ObjectBinding, ProgramConfig, StepConfig,
    StepType, TaskGroupConfig,
};
pub use serialization::{from_json, load_program, to_json_pretty};
pub use settings::{VolumeSettings, ENV_PREFIX};
