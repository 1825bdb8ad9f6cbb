use crate::{breakpoints::Breakpoint, markers::CrashReport};
use serde::Serialize;
use tokio::sync::mpsc;

/// Notifications a [`crate::Session`] sends to its owner.
///
/// Serialized like debug adapter events: `{"event": "...", "body": ...}`.
#[derive(Serialize, Debug, Clone, PartialEq, Eq)]
#[serde(tag = "event", content = "body", rename_all = "camelCase")]
pub enum Event {
    /// The program stopped at its first statement.
    StopOnEntry,
    /// A step finished.
    StopOnStep,
    /// The program hit a source breakpoint.
    StopOnBreakpoint,
    StopOnDataBreakpoint,
    /// The app crashed. The session is terminated afterwards.
    StopOnException(CrashReport),
    /// A breakpoint was acknowledged by the debugger.
    BreakpointValidated(Breakpoint),
    Continued,
    /// The program runs without being stopped at a breakpoint.
    ExecuteProgram,
    /// The debugger paused the program on its own, e.g. after an interrupt.
    PauseProgramExecution,
    /// Diagnostic text the debugger reported on stderr.
    Output(String),
    /// The session is over.
    End,
    Error(String),
}

pub type EventSender = mpsc::UnboundedSender<Event>;
pub type EventReceiver = mpsc::UnboundedReceiver<Event>;
