//! Drives `mdd`, the Monkey C command-line debugger, and exposes it as an
//! asynchronous debugging API.
//!
//! `mdd` is a text REPL: it prints free-form output followed by the prompt
//! `(mdd) ` and never says which command an output belongs to. A [`Session`]
//! splits the output into frames ([`frame`]), matches them to the commands
//! waiting for them ([`correlator`]) and turns them into breakpoints, stack
//! frames and variable trees.

pub mod breakpoints;
pub mod config;
pub mod correlator;
pub mod errors;
pub mod events;
pub mod frame;
pub mod launcher;
pub mod markers;
pub mod session;
pub mod source;
pub mod stack;
pub mod variable;

pub use crate::{
    config::{LaunchArguments, SessionConfig},
    errors::SessionError,
    events::Event,
    launcher::{DebuggerProcess, Launcher, ShellLauncher},
    session::{Session, SessionState},
};
