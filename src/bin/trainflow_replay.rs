//! trainflow replay tool
//!
//! Loads a training program, replays a scripted list of interactions
//! against a fresh session and prints the resulting progress.
//!
//! Object names in both files resolve to deterministic scene-path
//! identities, so a script can say `"object": "Wrench"`.

use std::path::PathBuf;
use std::process::ExitCode;

use serde::Deserialize;
use tracing_subscriber::EnvFilter;

use trainflow::config::load_program;
use trainflow::{
    MistakeSeverity, Notification, ObjectRef, TrainingResult, Vec3, VolumeOrchestrator,
    VolumeSettings,
};

/// Replay configuration
struct Config {
    program: PathBuf,
    script: PathBuf,
    settings: Option<PathBuf>,
}

fn usage() {
    println!("trainflow-replay - replay scripted interactions against a training program");
    println!();
    println!("USAGE:");
    println!("    trainflow-replay --program <FILE> --script <FILE> [OPTIONS]");
    println!();
    println!("OPTIONS:");
    println!("    -p, --program <FILE>     Program JSON");
    println!("    -s, --script <FILE>      Script JSON (array of steps)");
    println!("    -c, --settings <FILE>    Session settings TOML");
    println!("    -h, --help               Print help information");
}

fn parse_args() -> Config {
    let args: Vec<String> = std::env::args().collect();
    let mut program = None;
    let mut script = None;
    let mut settings = None;

    let mut i = 1;
    while i < args.len() {
        let flag = args[i].as_str();
        match flag {
            "--program" | "-p" | "--script" | "-s" | "--settings" | "-c" => {
                let Some(value) = args.get(i + 1) else {
                    eprintln!("error: {flag} requires a value");
                    std::process::exit(1);
                };
                let value = PathBuf::from(value);
                match flag {
                    "--program" | "-p" => program = Some(value),
                    "--script" | "-s" => script = Some(value),
                    _ => settings = Some(value),
                }
                i += 2;
            }
            "--help" | "-h" => {
                usage();
                std::process::exit(0);
            }
            arg => {
                eprintln!("error: unknown argument: {arg}");
                std::process::exit(1);
            }
        }
    }

    let (Some(program), Some(script)) = (program, script) else {
        eprintln!("error: --program and --script are required");
        usage();
        std::process::exit(1);
    };
    Config {
        program,
        script,
        settings,
    }
}

const fn yes() -> bool {
    true
}

/// One scripted action, addressing objects by scene name.
#[derive(Debug, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum ScriptStep {
    Snap {
        point: String,
        object: String,
        #[serde(default = "yes")]
        connected: bool,
    },
    Grab {
        object: String,
        #[serde(default = "yes")]
        grabbed: bool,
    },
    Rotation {
        object: String,
        angle: f32,
    },
    Position {
        object: String,
        x: f32,
        y: f32,
        z: f32,
    },
    Socket {
        point: String,
    },
    Custom {
        predicate_id: String,
        #[serde(default = "yes")]
        value: bool,
    },
    Acknowledge {
        path: Vec<String>,
    },
    PassOptional {
        path: Vec<String>,
    },
    Action {
        action: String,
    },
    Mistake {
        description: String,
        severity: MistakeSeverity,
    },
    Continue,
    Reset,
    Tick,
}

fn object(name: &str) -> ObjectRef {
    ObjectRef::from_scene_path(name)
}

fn replay(session: &mut VolumeOrchestrator, step: ScriptStep) -> TrainingResult<()> {
    let notification = match step {
        ScriptStep::Snap {
            point,
            object: o,
            connected,
        } => Notification::Snap {
            point: object(&point),
            object: object(&o),
            connected,
        },
        ScriptStep::Grab { object: o, grabbed } => Notification::Grab {
            object: object(&o),
            grabbed,
        },
        ScriptStep::Rotation { object: o, angle } => Notification::Rotation {
            object: object(&o),
            angle,
        },
        ScriptStep::Position { object: o, x, y, z } => Notification::ProximityTick {
            object: object(&o),
            position: Vec3::new(x, y, z),
        },
        ScriptStep::Socket { point } => Notification::SocketDiscovered { point: object(&point) },
        ScriptStep::Custom { predicate_id, value } => Notification::Custom { predicate_id, value },
        ScriptStep::Tick => Notification::Tick,
        ScriptStep::Acknowledge { path } => {
            let names: Vec<&str> = path.iter().map(String::as_str).collect();
            match session.tree().find(&names) {
                Some(node) => session.acknowledge(node)?,
                None => eprintln!("warning: no step at {}", path.join("/")),
            }
            return Ok(());
        }
        ScriptStep::PassOptional { path } => {
            let names: Vec<&str> = path.iter().map(String::as_str).collect();
            match session.tree().find(&names) {
                Some(node) => session.pass_optional(node)?,
                None => eprintln!("warning: no node at {}", path.join("/")),
            }
            return Ok(());
        }
        ScriptStep::Action { action } => {
            let verdict = session.attempt_action(action.as_str());
            println!("action {action}: {verdict:?}");
            return Ok(());
        }
        ScriptStep::Mistake {
            description,
            severity,
        } => {
            session.report_mistake(description, severity);
            return Ok(());
        }
        ScriptStep::Continue => {
            session.continue_to_next_module();
            return Ok(());
        }
        ScriptStep::Reset => {
            session.reset();
            return Ok(());
        }
    };
    session.apply(&notification);
    Ok(())
}

fn run(config: &Config) -> TrainingResult<()> {
    let settings = match &config.settings {
        Some(path) => VolumeSettings::load(path)?,
        None => VolumeSettings::from_env(),
    };

    let program = load_program(&config.program)?;
    let compiled = program.compile(&|name: &str| Some(object(name)))?;

    let raw = std::fs::read_to_string(&config.script).map_err(|e| {
        trainflow::TrainingError::Serialization {
            message: format!("read '{}': {e}", config.script.display()),
        }
    })?;
    let script: Vec<ScriptStep> =
        serde_json::from_str(&raw).map_err(|e| trainflow::TrainingError::Serialization {
            message: format!("parse script: {e}"),
        })?;

    let mut session = VolumeOrchestrator::from_program(&compiled, settings);
    let stream = session.events();
    session.start()?;

    for step in script {
        replay(&mut session, step)?;
        for event in stream.drain() {
            println!("event {}", serde_json::to_string(&event).unwrap_or_else(|_| event.label().to_string()));
        }
    }

    println!();
    println!("{}", session.progress_summary());
    println!("instruction: {}", session.current_instruction());
    println!("completion: {:.1}%", session.completion_percentage() * 100.0);
    Ok(())
}

fn main() -> ExitCode {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = parse_args();
    match run(&config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("error: {e}");
            for issue in e.issues() {
                eprintln!("  - {issue}");
            }
            ExitCode::FAILURE
        }
    }
}
