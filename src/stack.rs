use crate::markers::CrashReport;
use lazy_static::lazy_static;
use regex::Regex;
use serde::Serialize;
use std::path::PathBuf;

#[derive(Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StackFrame {
    pub index: usize,
    pub function_name: String,
    pub file: PathBuf,
    /// Zero-based.
    pub line: u32,
}

lazy_static! {
    // `#0  0x10000123 in onUpdate at source/View.mc:20`
    static ref WITH_ADDRESS: Regex = Regex::new(r"^#(\d+)\s+\S+ in (.*?) at (.+):(\d+)").unwrap();
    // `#0  onUpdate at source/View.mc:20`
    static ref WITHOUT_ADDRESS: Regex = Regex::new(r"^#(\d+)\s+(.*?) at (.+):(\d+)").unwrap();
    // `onUpdate() at /project/source/View.mc:20 0x10000123`
    static ref CRASH_LOCATION: Regex = Regex::new(r"(\S+) at (\S+?):(\d+)").unwrap();
}

/// Parses one `#<index> ...` line. `resolve` maps the reported file to a
/// known source path.
pub fn parse_frame_line(line: &str, resolve: impl Fn(&str) -> PathBuf) -> Option<StackFrame> {
    let line = line.trim();
    let captures = WITH_ADDRESS
        .captures(line)
        .or_else(|| WITHOUT_ADDRESS.captures(line))?;
    let reported_line: u32 = captures[4].parse().ok()?;
    Some(StackFrame {
        index: captures[1].parse().ok()?,
        function_name: captures[2].trim().to_string(),
        file: resolve(captures[3].trim()),
        line: reported_line.saturating_sub(1),
    })
}

/// Every frame of a `backtrace` answer. Lines that are not frames are skipped.
pub fn parse_backtrace(frame: &str, resolve: impl Fn(&str) -> PathBuf) -> Vec<StackFrame> {
    frame
        .lines()
        .filter_map(|line| parse_frame_line(line, &resolve))
        .collect()
}

/// The innermost frame named in a crash report.
pub fn frame_from_crash(
    report: &CrashReport,
    resolve: impl Fn(&str) -> PathBuf,
) -> Option<StackFrame> {
    let captures = CRASH_LOCATION.captures(&report.stack_trace)?;
    let reported_line: u32 = captures[3].parse().ok()?;
    Some(StackFrame {
        index: 1,
        function_name: captures[1].to_string(),
        file: resolve(&captures[2]),
        line: reported_line.saturating_sub(1),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn as_reported(file: &str) -> PathBuf {
        PathBuf::from(file)
    }

    #[test]
    fn test_backtrace() {
        let frames = parse_backtrace(
            "#0  0x10000123 in onUpdate at source/View.mc:20\r\n\
             #1  compute at source/Math.mc:7\r\n\
             Backtrace stopped.\r\n",
            as_reported,
        );
        assert_eq!(
            frames,
            vec![
                StackFrame {
                    index: 0,
                    function_name: "onUpdate".to_string(),
                    file: PathBuf::from("source/View.mc"),
                    line: 19,
                },
                StackFrame {
                    index: 1,
                    function_name: "compute".to_string(),
                    file: PathBuf::from("source/Math.mc"),
                    line: 6,
                },
            ],
        );
    }

    #[test]
    fn test_resolution_is_applied() {
        let frame = parse_frame_line("#2 main at a.mc:1", |file| {
            PathBuf::from("/project/source").join(file)
        })
        .unwrap();
        assert_eq!(frame.file, PathBuf::from("/project/source/a.mc"));
        assert_eq!(frame.line, 0);
        assert_eq!(parse_frame_line("main at a.mc:1", as_reported), None);
    }

    #[test]
    fn test_crash_frame() {
        let report = CrashReport {
            description: "Unhandled Exception".to_string(),
            message: "Failed invoking <symbol>".to_string(),
            stack_trace: "onUpdate() at /project/source/View.mc:20 0x10000123".to_string(),
        };
        let frame = frame_from_crash(&report, as_reported).unwrap();
        assert_eq!(frame.function_name, "onUpdate()");
        assert_eq!(frame.file, PathBuf::from("/project/source/View.mc"));
        assert_eq!(frame.line, 19);
    }
}
