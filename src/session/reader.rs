use super::{emit, write_line, SessionState, Shared, SharedInput};
use crate::{
    events::{Event, EventSender},
    frame::FrameAssembler,
    launcher::DebuggerOutput,
    markers,
};
use std::sync::Arc;
use tokio::{
    io::{AsyncBufReadExt, AsyncReadExt, BufReader},
    sync::Mutex,
};
use tracing::{debug, error, trace, warn};

pub(super) struct ReaderContext {
    pub prompt: String,
    pub shared: Arc<Mutex<Shared>>,
    pub events: EventSender,
    pub stdin: SharedInput,
    pub simulator_kill_command: Option<String>,
}

/// Splits the debugger's stdout into frames and hands them to the waiters.
pub(super) async fn read_stdout(mut stdout: DebuggerOutput, context: ReaderContext) {
    let mut assembler = FrameAssembler::new(context.prompt.as_str());
    let mut chunk = vec![0; 4096];
    loop {
        match stdout.read(&mut chunk).await {
            Ok(0) => break,
            Ok(length) => {
                for frame in assembler.feed(&chunk[..length]) {
                    handle_frame(&frame, &context).await;
                }
            }
            Err(error) => {
                warn!("Reading from the debugger failed: {error}");
                break;
            }
        }
    }

    if let Some(tail) = assembler.finish() {
        debug!("Flushing output that was not followed by a prompt.");
        handle_frame(&tail, &context).await;
    }

    let mut shared = context.shared.lock().await;
    shared.correlator.close();
    if shared.terminated_deliberately {
        return;
    }
    error!("The debugger process exited.");
    shared.state = SessionState::Terminated;
    emit(
        &context.events,
        Event::Error("The debugger process exited unexpectedly.".to_string()),
    );
    emit(&context.events, Event::End);
}

async fn handle_frame(frame: &str, context: &ReaderContext) {
    trace!("← {frame:?}");

    if markers::is_launch_timeout(frame) {
        error!("The simulator did not start in time.");
        if let Some(command) = &context.simulator_kill_command {
            if let Err(error) = write_line(&context.stdin, command).await {
                warn!("Could not kill the simulator: {error}");
            }
        }
        let reason = markers::LAUNCH_TIMEOUTS
            .iter()
            .find(|it| frame.contains(*it))
            .copied()
            .unwrap_or(markers::LAUNCH_TIMEOUTS[0]);
        emit(&context.events, Event::Error(reason.to_string()));
    }

    let mut shared = context.shared.lock().await;
    if let Some(report) = markers::parse_crash_report(frame) {
        error!("The app crashed: {}", report.description);
        shared.state = SessionState::Terminated;
        shared.crash_report = Some(report.clone());
        emit(&context.events, Event::StopOnException(report));
    }
    if frame.contains(markers::COMMAND_FAILED) || frame.contains(markers::BACKTRACE_TIMEOUT) {
        warn!("The debugger reported a failure: {}", frame.trim());
        emit(
            &context.events,
            Event::Error(format!("Connect IQ: {}", frame.trim())),
        );
    }
    if frame.contains(markers::PAUSING_EXECUTION) {
        if shared.state != SessionState::Terminated {
            shared.state = SessionState::Suspended;
        }
        emit(&context.events, Event::PauseProgramExecution);
    }

    shared.correlator.dispatch(frame);
}

/// Records the error lines the debugger prints on stderr.
pub(super) async fn read_stderr(
    stderr: DebuggerOutput,
    shared: Arc<Mutex<Shared>>,
    events: EventSender,
) {
    let mut lines = BufReader::new(stderr).lines();
    loop {
        match lines.next_line().await {
            Ok(Some(line)) => {
                if !markers::is_stderr_error(&line) {
                    trace!("stderr: {line}");
                    continue;
                }
                warn!("The debugger reported an error: {line}");
                shared.lock().await.error_log.push(line.clone());
                emit(&events, Event::Output(line));
            }
            Ok(None) => break,
            Err(error) => {
                warn!("Reading the debugger's stderr failed: {error}");
                break;
            }
        }
    }
}
