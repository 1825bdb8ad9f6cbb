use crate::{
    breakpoints::{Breakpoint, BreakpointStore},
    config::SessionConfig,
    correlator::{Correlator, Expectation},
    errors::SessionError,
    events::{Event, EventReceiver, EventSender},
    launcher::{DebuggerInput, Launcher},
    markers::{self, CrashReport},
    source::{word_start_columns, SourceFiles},
    stack::{self, StackFrame},
    variable::{Variable, VariableHandles},
};
use serde::Serialize;
use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};
use tokio::{
    io::AsyncWriteExt,
    process::Child,
    sync::{mpsc, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, trace, warn};

mod reader;
mod variables;

#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum SessionState {
    NotLaunched,
    Launching,
    /// Launched, but the program was not started yet.
    Idle,
    Running,
    Suspended,
    Terminated,
}

/// Status that the output readers update while the session waits.
struct Shared {
    state: SessionState,
    correlator: Correlator,
    crash_report: Option<CrashReport>,
    /// Error lines the debugger printed on stderr.
    error_log: Vec<String>,
    terminated_deliberately: bool,
}

type SharedInput = Arc<Mutex<DebuggerInput>>;

/// One `mdd` process and everything known about the program it debugs.
pub struct Session {
    config: SessionConfig,
    shared: Arc<Mutex<Shared>>,
    events: EventSender,
    stdin: Option<SharedInput>,
    child: Option<Child>,
    readers: Vec<JoinHandle<()>>,
    /// Whether `run` was written already. Later resumes use `continue`.
    is_started: bool,

    breakpoints: BreakpointStore,
    sources: SourceFiles,
    current_file: Option<PathBuf>,
    current_line: Option<u32>,

    // Cleared whenever the program resumes.
    locals: Option<Arc<Vec<Variable>>>,
    arguments: Option<Arc<Vec<Variable>>>,
    globals: Option<Arc<Vec<Variable>>>,
    handles: VariableHandles,
}

impl Session {
    pub fn new(config: SessionConfig) -> (Self, EventReceiver) {
        let (events, receiver) = mpsc::unbounded_channel();
        let session = Session {
            config,
            shared: Arc::new(Mutex::new(Shared {
                state: SessionState::NotLaunched,
                correlator: Correlator::default(),
                crash_report: None,
                error_log: vec![],
                terminated_deliberately: false,
            })),
            events,
            stdin: None,
            child: None,
            readers: vec![],
            is_started: false,
            breakpoints: BreakpointStore::default(),
            sources: SourceFiles::default(),
            current_file: None,
            current_line: None,
            locals: None,
            arguments: None,
            globals: None,
            handles: VariableHandles::default(),
        };
        (session, receiver)
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }
    pub async fn state(&self) -> SessionState {
        self.shared.lock().await.state
    }
    /// The file and zero-based line the program is suspended at.
    pub fn current_location(&self) -> Option<(&Path, u32)> {
        Some((self.current_file.as_deref()?, self.current_line?))
    }
    pub async fn crash_report(&self) -> Option<CrashReport> {
        self.shared.lock().await.crash_report.clone()
    }
    pub fn breakpoints(&self) -> &BreakpointStore {
        &self.breakpoints
    }

    /// Spawns the debugger, writes the bootstrap commands and waits until
    /// the app is loaded.
    pub async fn launch(&mut self, launcher: &impl Launcher) -> Result<(), SessionError> {
        self.config.validate()?;
        {
            let mut shared = self.shared.lock().await;
            if shared.state != SessionState::NotLaunched {
                return Err(SessionError::AlreadyLaunched);
            }
            shared.state = SessionState::Launching;
        }
        info!("Launching {}.", self.config.launch.program.display());

        let launch = &self.config.launch;
        self.sources
            .discover(&launch.project_path, &self.config.source_extension);
        self.sources.register(&launch.program);

        let process = match launcher.spawn(&self.config).await {
            Ok(process) => process,
            Err(error) => {
                self.set_state(SessionState::Terminated).await;
                return Err(error);
            }
        };
        let stdin = Arc::new(Mutex::new(process.stdin));
        self.stdin = Some(stdin.clone());
        self.child = process.child;
        self.readers.push(tokio::spawn(reader::read_stdout(
            process.stdout,
            reader::ReaderContext {
                prompt: self.config.prompt.clone(),
                shared: self.shared.clone(),
                events: self.events.clone(),
                stdin,
                simulator_kill_command: self.config.simulator_kill_command.clone(),
            },
        )));
        if let Some(stderr) = process.stderr {
            self.readers.push(tokio::spawn(reader::read_stderr(
                stderr,
                self.shared.clone(),
                self.events.clone(),
            )));
        }

        let commands = self.config.bootstrap_commands();
        let commands = commands.iter().map(String::as_str).collect::<Vec<_>>();
        let acknowledgement = self
            .request(Expectation::LaunchAck, &commands, self.config.launch_timeout())
            .await?;
        if acknowledgement.is_none() {
            warn!("The debugger did not confirm loading the app. Continuing anyway.");
        }
        tokio::time::sleep(self.config.launch_settle()).await;

        let mut shared = self.shared.lock().await;
        if shared.state == SessionState::Launching {
            shared.state = SessionState::Idle;
            info!("The app is loaded.");
        }
        Ok(())
    }

    /// Starts the launched program. With `stop_on_entry`, one step follows.
    pub async fn start(&mut self, stop_on_entry: bool) -> Result<(), SessionError> {
        self.continue_execution(false).await?;
        if stop_on_entry {
            self.step_with("next", Event::StopOnEntry).await?;
        }
        Ok(())
    }

    /// Runs until the next breakpoint. `mdd` cannot run backwards, so
    /// `reverse` has no effect.
    pub async fn continue_execution(&mut self, reverse: bool) -> Result<(), SessionError> {
        self.ensure_alive().await?;
        if reverse {
            debug!("Ignoring reverse continue.");
        }
        self.clear_caches();

        let command = if self.is_started { "continue" } else { "run" };
        self.is_started = true;
        let frame = self
            .request(Expectation::RunInfo, &[command], self.config.continue_timeout())
            .await?;

        if let Some(hit) = frame.as_deref().and_then(markers::parse_breakpoint_hit) {
            let file = self.sources.resolve_or_reported(&hit.file);
            info!("Hit breakpoint {} at {}:{}.", hit.id, file.display(), hit.line);
            self.load_source(&file).await;
            self.current_file = Some(file);
            self.current_line = Some(hit.line.saturating_sub(1));
            self.set_state(SessionState::Suspended).await;
            self.emit(Event::StopOnBreakpoint);
        } else if self.shared.lock().await.crash_report.is_none() {
            debug!("No breakpoint was hit, so the program keeps running.");
            self.set_state(SessionState::Running).await;
            self.emit(Event::Continued);
            self.emit(Event::ExecuteProgram);
        }
        Ok(())
    }

    pub async fn step(&mut self, reverse: bool) -> Result<(), SessionError> {
        if reverse {
            debug!("Ignoring reverse step.");
        }
        self.step_with("next", Event::StopOnStep).await
    }
    pub async fn step_in(&mut self) -> Result<(), SessionError> {
        self.step_with("step", Event::StopOnStep).await
    }
    /// `mdd` has no command for leaving the current function, so this only
    /// reports a finished step.
    pub async fn step_out(&mut self) -> Result<(), SessionError> {
        self.ensure_alive().await?;
        self.clear_caches();
        self.emit(Event::StopOnStep);
        Ok(())
    }

    async fn step_with(&mut self, command: &str, event: Event) -> Result<(), SessionError> {
        self.ensure_alive().await?;
        self.clear_caches();

        let frame = self
            .request(Expectation::NextInfo, &[command, "frame"], self.config.step_timeout())
            .await?;
        let Some(frame) = frame else {
            self.emit(Event::Error(format!(
                "The debugger did not report a location after `{command}`."
            )));
            return Ok(());
        };
        let location = stack::parse_backtrace(&frame, |file| self.sources.resolve_or_reported(file))
            .into_iter()
            .next();
        let Some(location) = location else {
            warn!("Unexpected answer to `frame`: {frame:?}");
            self.emit(Event::Error(format!("Could not parse the location: {frame}")));
            return Ok(());
        };

        debug!("Stepped to {}:{}.", location.file.display(), location.line);
        self.load_source(&location.file).await;
        self.current_file = Some(location.file);
        self.current_line = Some(location.line);
        self.set_state(SessionState::Suspended).await;
        self.emit(event);
        Ok(())
    }

    /// `line` is zero-based.
    pub async fn set_breakpoint(&mut self, path: &Path, line: u32) -> Result<Breakpoint, SessionError> {
        self.ensure_alive().await?;
        let breakpoint = self.breakpoints.add(path, line);
        self.load_source(path).await;

        if self.state().await == SessionState::Running {
            // `mdd` only accepts breakpoints while the program is interrupted.
            let interrupt = self.config.interrupt_command.clone();
            self.write_commands(&[interrupt.as_str()]).await?;
            tokio::time::sleep(self.config.breakpoint_settle()).await;
        }
        let command = format!("break {}:{}", path.display(), line + 1);
        self.write_commands(&[command.as_str()]).await?;

        if self.config.launch.no_debug {
            return Ok(breakpoint);
        }
        for verified in self.breakpoints.verify(path) {
            self.emit(Event::BreakpointValidated(verified));
        }
        Ok(self
            .breakpoints
            .at(path, line)
            .cloned()
            .unwrap_or(breakpoint))
    }

    pub async fn clear_breakpoint(
        &mut self,
        path: &Path,
        line: u32,
    ) -> Result<Option<Breakpoint>, SessionError> {
        self.ensure_alive().await?;
        let Some(breakpoint) = self.breakpoints.remove(path, line) else {
            return Ok(None);
        };
        let command = format!("delete {}", breakpoint.id);
        self.write_commands(&[command.as_str()]).await?;
        Ok(Some(breakpoint))
    }

    /// Removes every breakpoint of `path` with a single `delete` command.
    pub async fn clear_breakpoints(&mut self, path: &Path) -> Result<Vec<Breakpoint>, SessionError> {
        self.ensure_alive().await?;
        if let Some(command) = self.breakpoints.delete_command(path) {
            self.write_commands(&[command.as_str()]).await?;
        }
        Ok(self.breakpoints.clear(path))
    }

    /// Columns on the zero-based `line` of `path` where a breakpoint could go.
    pub async fn breakpoint_columns(&mut self, path: &Path, line: u32) -> Result<Vec<u32>, SessionError> {
        let lines = self.sources.load(path).await?;
        Ok(lines
            .get(line as usize)
            .map(|it| word_start_columns(it))
            .unwrap_or_default())
    }

    pub async fn stack(&mut self) -> Result<Vec<StackFrame>, SessionError> {
        let (crash_report, has_errors) = {
            let shared = self.shared.lock().await;
            (shared.crash_report.clone(), !shared.error_log.is_empty())
        };
        if let Some(report) = crash_report {
            return Ok(stack::frame_from_crash(&report, |file| self.sources.resolve_or_reported(file))
                .into_iter()
                .collect());
        }
        if has_errors {
            debug!("The debugger reported errors, so there is no stack to show.");
            return Ok(vec![]);
        }

        self.ensure_alive().await?;
        let frame = self
            .request(Expectation::FrameInfo, &["backtrace"], self.config.request_timeout())
            .await?;
        Ok(frame
            .map(|frame| stack::parse_backtrace(&frame, |file| self.sources.resolve_or_reported(file)))
            .unwrap_or_default())
    }

    pub fn set_data_breakpoint(&mut self, address: &str) -> bool {
        self.breakpoints.set_data_breakpoint(address)
    }
    pub fn clear_all_data_breakpoints(&mut self) {
        self.breakpoints.clear_data_breakpoints();
    }

    /// Ends the debugger and the program.
    pub async fn terminate(&mut self) -> Result<(), SessionError> {
        let Some(stdin) = self.stdin.clone() else {
            return Err(SessionError::NotLaunched);
        };
        {
            let mut shared = self.shared.lock().await;
            if shared.terminated_deliberately {
                return Ok(());
            }
            shared.terminated_deliberately = true;
            shared.state = SessionState::Terminated;
            shared.correlator.close();
        }
        info!("Terminating the debug session.");

        if let Err(error) = write_line(&stdin, "kill").await {
            debug!("Could not write `kill`: {error}");
        }
        if let Some(mut child) = self.child.take() {
            if let Err(error) = child.kill().await {
                warn!("Failed to kill the debugger process: {error}");
            }
        }
        for reader in self.readers.drain(..) {
            reader.abort();
        }
        self.clear_caches();
        self.emit(Event::End);
        Ok(())
    }

    async fn ensure_alive(&self) -> Result<(), SessionError> {
        if self.stdin.is_none() {
            return Err(SessionError::NotLaunched);
        }
        if self.shared.lock().await.state == SessionState::Terminated {
            return Err(SessionError::Terminated);
        }
        Ok(())
    }

    async fn set_state(&self, state: SessionState) {
        let mut shared = self.shared.lock().await;
        if shared.state == SessionState::Terminated {
            return;
        }
        debug!("Session state: {:?} → {state:?}", shared.state);
        shared.state = state;
    }

    fn emit(&self, event: Event) {
        emit(&self.events, event);
    }

    fn clear_caches(&mut self) {
        self.locals = None;
        self.arguments = None;
        self.globals = None;
        self.handles.reset();
    }

    async fn load_source(&mut self, path: &Path) {
        if let Err(error) = self.sources.load(path).await {
            warn!("{error}");
        }
    }

    async fn write_commands(&self, commands: &[&str]) -> Result<(), SessionError> {
        let stdin = self.stdin.as_ref().ok_or(SessionError::NotLaunched)?;
        for command in commands {
            write_line(stdin, command).await?;
        }
        Ok(())
    }

    /// Registers a waiter for `expectation`, writes `commands` and waits for
    /// the answer. `None` means the debugger did not answer in time.
    async fn request(
        &self,
        expectation: Expectation,
        commands: &[&str],
        timeout: Duration,
    ) -> Result<Option<String>, SessionError> {
        let (id, answer) = self
            .shared
            .lock()
            .await
            .correlator
            .register(expectation.clone());
        if let Err(error) = self.write_commands(commands).await {
            self.shared.lock().await.correlator.cancel(id);
            return Err(error);
        }

        match tokio::time::timeout(timeout, answer).await {
            Ok(Ok(frame)) => Ok(Some(frame)),
            Ok(Err(_)) => Err(SessionError::ProcessExited),
            Err(_) => {
                self.shared.lock().await.correlator.cancel(id);
                warn!("Timed out waiting for {expectation}.");
                Ok(None)
            }
        }
    }
}

async fn write_line(stdin: &SharedInput, command: &str) -> Result<(), SessionError> {
    trace!("→ {command}");
    let mut stdin = stdin.lock().await;
    stdin.write_all(command.as_bytes()).await?;
    stdin.write_all(b"\n").await?;
    stdin.flush().await?;
    Ok(())
}

fn emit(events: &EventSender, event: Event) {
    debug!("Sending event {event:?}.");
    if events.send(event).is_err() {
        trace!("Nobody listens for session events anymore.");
    }
}
