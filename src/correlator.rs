use crate::markers;
use std::fmt::{self, Display, Formatter};
use tokio::sync::oneshot;
use tracing::trace;

/// What kind of frame answers a pending command.
#[derive(Clone, Debug, Eq, Hash, PartialEq)]
pub enum Expectation {
    LaunchAck,
    RunInfo,
    VariablesInfo,
    GlobalVariablesInfo,
    FrameInfo,
    NextInfo,
    /// Output of `print <subject>`.
    ChildVariablesInfo(String),
}

impl Expectation {
    /// `armed` is set when the previous frame carried the facilities sentinel.
    pub fn matches(&self, frame: &str, armed: bool) -> bool {
        match self {
            Expectation::LaunchAck => markers::is_launch_ack(frame),
            Expectation::RunInfo => markers::is_breakpoint_hit(frame),
            Expectation::VariablesInfo => !armed && markers::is_variables_listing(frame),
            Expectation::GlobalVariablesInfo => armed,
            Expectation::FrameInfo | Expectation::NextInfo => {
                markers::starts_with_frame_index(frame)
            }
            Expectation::ChildVariablesInfo(subject) => {
                markers::is_print_output_for(frame, subject)
            }
        }
    }
}

impl Display for Expectation {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        match self {
            Expectation::LaunchAck => write!(f, "launch-ack"),
            Expectation::RunInfo => write!(f, "run-info"),
            Expectation::VariablesInfo => write!(f, "variables-info"),
            Expectation::GlobalVariablesInfo => write!(f, "global-variables-info"),
            Expectation::FrameInfo => write!(f, "frame-info"),
            Expectation::NextInfo => write!(f, "next-info"),
            Expectation::ChildVariablesInfo(subject) => write!(f, "child-variables-info[{subject}]"),
        }
    }
}

#[derive(Clone, Copy, Debug, Eq, Hash, PartialEq)]
pub struct WaiterId(u64);

struct Waiter {
    id: WaiterId,
    expectation: Expectation,
    continuation: oneshot::Sender<String>,
}

/// Matches frames to the commands waiting for them.
///
/// The debugger's output carries no request ids, so every frame is offered
/// to every pending waiter in registration order and the first one whose
/// expectation holds receives it.
#[derive(Default)]
pub struct Correlator {
    waiters: Vec<Waiter>,
    next_id: u64,
    globals_armed: bool,
}

impl Correlator {
    pub fn register(&mut self, expectation: Expectation) -> (WaiterId, oneshot::Receiver<String>) {
        let (sender, receiver) = oneshot::channel();
        let id = WaiterId(self.next_id);
        self.next_id += 1;
        trace!("Waiting for {expectation} ({id:?}).");
        self.waiters.push(Waiter {
            id,
            expectation,
            continuation: sender,
        });
        (id, receiver)
    }

    /// Drops a waiter whose caller stopped waiting.
    pub fn cancel(&mut self, id: WaiterId) {
        let Some(index) = self.waiters.iter().position(|it| it.id == id) else {
            return;
        };
        let waiter = self.waiters.remove(index);
        if waiter.expectation == Expectation::GlobalVariablesInfo {
            self.globals_armed = false;
        }
    }

    /// Drops every waiter. Their receivers observe a closed channel.
    pub fn close(&mut self) {
        self.waiters.clear();
        self.globals_armed = false;
    }

    pub fn pending(&self) -> usize {
        self.waiters.len()
    }

    /// Offers `frame` to the pending waiters. Returns whether one took it.
    pub fn dispatch(&mut self, frame: &str) -> bool {
        let frame = frame.trim();
        let armed = self.globals_armed;
        self.globals_armed = markers::is_facilities_sentinel(frame);
        // A bare prompt only answers `info variables` for an app without
        // globals.
        if frame.is_empty() && !armed {
            return false;
        }

        self.waiters.retain(|it| !it.continuation.is_closed());
        let Some(index) = self
            .waiters
            .iter()
            .position(|it| it.expectation.matches(frame, armed))
        else {
            trace!("No waiter for frame: {frame:?}");
            return false;
        };
        let waiter = self.waiters.remove(index);
        trace!("Frame resolves {} ({:?}).", waiter.expectation, waiter.id);
        waiter.continuation.send(frame.to_string()).is_ok()
    }
}
