//! Text markers recognized in `mdd` output.
//!
//! Everything here is a pure function of frame text so that it can be tested
//! without a debugger process.

use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;

pub const LAUNCH_ACK: &str = "Loading application";
pub const BREAKPOINT_HIT: &str = "Hit breakpoint";
pub const ARGS: &str = "Args:";
pub const LOCALS: &str = "Locals:";
pub const NO_LOCALS: &str = "No locals.";
pub const NO_SUSPENDED_APP: &str = "No app is suspended.";
/// Printed by `help support`; arms the global variable listing.
pub const FACILITIES: &str = "Support facilities";
pub const PAUSING_EXECUTION: &str = "Pausing execution";
pub const COMMAND_FAILED: &str = "Command failed";
pub const BACKTRACE_TIMEOUT: &str = "Failed to get stack backtrace: Timeout";
pub const LAUNCH_TIMEOUTS: [&str; 2] = [
    "Failed to launch the device: Timeout",
    "Failed to launch the app: Timeout",
];
pub const STDERR_ERROR: &str = "ERROR:";

lazy_static! {
    static ref FRAME_INDEX: Regex = Regex::new(r"^#\d+").unwrap();
    static ref HIT: Regex =
        Regex::new(r"(?s)Hit breakpoint (\d+).*\bat ([^\r\n]+?):(\d+)").unwrap();
    static ref CRASH: Regex = Regex::new(
        r"(?s)Error:(.+?)\r?\n\s*Details:(.*?)\r?\n\s*Stack:(.*?)Encountered app crash"
    )
    .unwrap();
}

pub fn is_launch_ack(frame: &str) -> bool {
    frame.contains(LAUNCH_ACK)
}
pub fn is_breakpoint_hit(frame: &str) -> bool {
    frame.contains(BREAKPOINT_HIT)
}
pub fn is_variables_listing(frame: &str) -> bool {
    frame.contains(LOCALS) || frame.contains(NO_LOCALS) || frame.contains(NO_SUSPENDED_APP)
}
pub fn is_facilities_sentinel(frame: &str) -> bool {
    frame.contains(FACILITIES)
}
pub fn starts_with_frame_index(frame: &str) -> bool {
    FRAME_INDEX.is_match(frame.trim_start())
}

/// Whether `frame` answers `print <subject>`.
pub fn is_print_output_for(frame: &str, subject: &str) -> bool {
    let mut tokens = frame.split_whitespace();
    if tokens.next() == Some(subject) && tokens.next() == Some("=") {
        return true;
    }
    is_no_symbol_for(frame, subject)
}
pub fn is_no_symbol_for(frame: &str, subject: &str) -> bool {
    frame.contains(&format!("No symbol \"{subject}\" in current context"))
}

pub fn is_launch_timeout(text: &str) -> bool {
    LAUNCH_TIMEOUTS.iter().any(|it| text.contains(it))
}
pub fn is_stderr_error(text: &str) -> bool {
    text.contains(STDERR_ERROR)
}

#[derive(Clone, Debug, Eq, PartialEq)]
pub struct BreakpointHit {
    pub id: u32,
    pub file: String,
    /// One-based, as printed by the debugger.
    pub line: u32,
}

pub fn parse_breakpoint_hit(frame: &str) -> Option<BreakpointHit> {
    let captures = HIT.captures(frame)?;
    Some(BreakpointHit {
        id: captures[1].parse().ok()?,
        file: captures[2].trim().to_string(),
        line: captures[3].parse().ok()?,
    })
}

/// Structured form of the block `mdd` prints when the app crashes.
#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CrashReport {
    pub description: String,
    pub message: String,
    pub stack_trace: String,
}

pub fn parse_crash_report(text: &str) -> Option<CrashReport> {
    let captures = CRASH.captures(text)?;
    let stack_trace = captures[3]
        .lines()
        .map(|line| line.trim().trim_start_matches('-').trim())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n");
    Some(CrashReport {
        description: captures[1].trim().to_string(),
        message: captures[2].trim().to_string(),
        stack_trace,
    })
}
