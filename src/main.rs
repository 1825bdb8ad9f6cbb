#![warn(clippy::nursery, clippy::pedantic)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions
)]

use clap::{Parser, ValueHint};
use mdd_bridge::{Event, Session, SessionConfig, SessionError, ShellLauncher};
use serde::Serialize;
use serde_json::json;
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, Level, Metadata};
use tracing_subscriber::{filter, fmt::writer::BoxMakeWriter, prelude::*};

/// Debug a Monkey C app with `mdd` from the console.
///
/// Commands are read from stdin, one per line:
/// `c` continue, `n` step, `s` step in, `o` step out,
/// `b <file>:<line>` and `d <file>:<line>` to set and delete breakpoints
/// (lines are one-based), `bt` backtrace, `locals`, `args`, `globals`,
/// `vars <reference>`, `p <name>` and `q` to quit.
/// Results and events are printed as JSON lines.
#[derive(Parser, Debug)]
#[command(name = "mdd-bridge")]
struct Options {
    /// A launch configuration (`program`, `sdkPath`, `projectPath`, `device`,
    /// plus optional tunables).
    #[arg(long, value_hint = ValueHint::FilePath)]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> ProgramResult {
    let options = Options::parse();
    init_logger();

    let config = std::fs::read_to_string(&options.config).map_err(|error| {
        error!("Could not read {}: {error}", options.config.display());
        Exit::ConfigNotFound
    })?;
    let config = SessionConfig::from_json(&config).map_err(|error| {
        error!("{error}");
        Exit::InvalidConfig
    })?;
    let stop_on_entry = config.launch.stop_on_entry;

    let (mut session, mut events) = Session::new(config);
    let printer = tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            print_json(&event);
            if event == Event::End {
                break;
            }
        }
    });

    session.launch(&ShellLauncher).await.map_err(Exit::Session)?;
    session.start(stop_on_entry).await.map_err(Exit::Session)?;

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Ok(Some(line)) = lines.next_line().await {
        let Some(command) = ConsoleCommand::parse(&line) else {
            error!("Unknown command: {line}");
            continue;
        };
        if command == ConsoleCommand::Quit {
            break;
        }
        if let Err(error) = run_command(&mut session, command).await {
            error!("{error}");
            print_json(&json!({ "error": error.to_string() }));
        }
    }

    info!("Quitting.");
    match session.terminate().await {
        Ok(()) | Err(SessionError::NotLaunched) => {}
        Err(error) => error!("{error}"),
    }
    printer.abort();
    Ok(())
}

type ProgramResult = Result<(), Exit>;
#[derive(Debug)]
enum Exit {
    ConfigNotFound,
    InvalidConfig,
    #[allow(dead_code)]
    Session(SessionError),
}

#[derive(Clone, Debug, Eq, PartialEq)]
enum ConsoleCommand {
    Continue,
    Step,
    StepIn,
    StepOut,
    SetBreakpoint { file: PathBuf, line: u32 },
    ClearBreakpoint { file: PathBuf, line: u32 },
    Backtrace,
    Locals,
    Arguments,
    Globals,
    Children(usize),
    Print(String),
    Quit,
}

impl ConsoleCommand {
    fn parse(line: &str) -> Option<Self> {
        let line = line.trim();
        let (command, argument) = line
            .split_once(' ')
            .map_or((line, ""), |(command, argument)| (command, argument.trim()));
        Some(match (command, argument) {
            ("c", "") => Self::Continue,
            ("n", "") => Self::Step,
            ("s", "") => Self::StepIn,
            ("o", "") => Self::StepOut,
            ("b", location) => {
                let (file, line) = parse_location(location)?;
                Self::SetBreakpoint { file, line }
            }
            ("d", location) => {
                let (file, line) = parse_location(location)?;
                Self::ClearBreakpoint { file, line }
            }
            ("bt", "") => Self::Backtrace,
            ("locals", "") => Self::Locals,
            ("args", "") => Self::Arguments,
            ("globals", "") => Self::Globals,
            ("vars", reference) => Self::Children(reference.parse().ok()?),
            ("p", name) if !name.is_empty() => Self::Print(name.to_string()),
            ("q", "") => Self::Quit,
            _ => return None,
        })
    }
}

/// `source/App.mc:12` → (`source/App.mc`, 11)
fn parse_location(location: &str) -> Option<(PathBuf, u32)> {
    let (file, line) = location.rsplit_once(':')?;
    let line: u32 = line.parse().ok()?;
    if file.is_empty() || line == 0 {
        return None;
    }
    Some((PathBuf::from(file), line - 1))
}

async fn run_command(session: &mut Session, command: ConsoleCommand) -> Result<(), SessionError> {
    match command {
        ConsoleCommand::Continue => session.continue_execution(false).await?,
        ConsoleCommand::Step => session.step(false).await?,
        ConsoleCommand::StepIn => session.step_in().await?,
        ConsoleCommand::StepOut => session.step_out().await?,
        ConsoleCommand::SetBreakpoint { file, line } => {
            print_json(&session.set_breakpoint(&file, line).await?);
        }
        ConsoleCommand::ClearBreakpoint { file, line } => {
            print_json(&session.clear_breakpoint(&file, line).await?);
        }
        ConsoleCommand::Backtrace => print_json(&session.stack().await?),
        ConsoleCommand::Locals => print_json(&*session.local_variables().await?),
        ConsoleCommand::Arguments => print_json(&*session.args_variables().await?),
        ConsoleCommand::Globals => print_json(&*session.global_variables().await?),
        ConsoleCommand::Children(reference) => print_json(&session.child_variables(reference)),
        ConsoleCommand::Print(name) => print_json(&session.evaluate(&name).await?),
        ConsoleCommand::Quit => {}
    }
    Ok(())
}

fn print_json(value: &impl Serialize) {
    match serde_json::to_string(value) {
        Ok(json) => println!("{json}"),
        Err(error) => error!("Could not serialize the output: {error}"),
    }
}

fn init_logger() {
    let console_log = tracing_subscriber::fmt::layer()
        .compact()
        .with_writer(BoxMakeWriter::new(std::io::stderr))
        .with_filter(filter::filter_fn(|metadata| {
            // For external packages, show only the error logs.
            metadata.level() <= &Level::ERROR
                || metadata
                    .module_path()
                    .unwrap_or_default()
                    .starts_with("mdd_bridge")
        }))
        .with_filter(filter::filter_fn(level_for("mdd_bridge", Level::DEBUG)))
        .with_filter(filter::filter_fn(level_for(
            "mdd_bridge::correlator",
            Level::INFO,
        )));
    tracing_subscriber::registry().with(console_log).init();
}
fn level_for(module: &'static str, level: Level) -> impl Fn(&Metadata) -> bool {
    move |metadata| {
        if metadata
            .module_path()
            .unwrap_or_default()
            .starts_with(module)
        {
            metadata.level() <= &level
        } else {
            true
        }
    }
}
