use crate::{errors::SessionError, variable::IndentRules};
use serde::{Deserialize, Serialize};
use std::{
    path::{Path, PathBuf},
    time::Duration,
};

/// What to debug, as found in a launch configuration.
#[derive(Clone, Debug, Default, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LaunchArguments {
    /// The source file the program starts in.
    pub program: PathBuf,
    pub sdk_path: PathBuf,
    pub project_path: PathBuf,
    /// Simulator device id, e.g. `fenix6`.
    pub device: String,
    #[serde(default)]
    pub stop_on_entry: bool,
    /// Run without verifying breakpoints.
    #[serde(default)]
    pub no_debug: bool,
}

impl LaunchArguments {
    pub fn project_name(&self) -> String {
        self.project_path
            .file_name()
            .map(|it| it.to_string_lossy().to_string())
            .unwrap_or_default()
    }

    /// The compiled program: `<project>/bin/<project name>.prg`.
    pub fn prg_path(&self) -> PathBuf {
        self.project_path
            .join("bin")
            .join(format!("{}.prg", self.project_name()))
    }
}

/// Launch arguments plus the tunables of a session. Every tunable has a
/// default, so a plain launch configuration is a valid `SessionConfig`.
#[derive(Clone, Debug, Deserialize, Eq, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionConfig {
    #[serde(flatten)]
    pub launch: LaunchArguments,

    #[serde(default = "default_prompt")]
    pub prompt: String,

    #[serde(default = "default_launch_timeout")]
    pub launch_timeout_ms: u64,
    /// How long the simulator gets to settle after the app was loaded.
    #[serde(default = "default_launch_settle")]
    pub launch_settle_ms: u64,
    #[serde(default = "default_short_timeout")]
    pub continue_timeout_ms: u64,
    #[serde(default = "default_short_timeout")]
    pub step_timeout_ms: u64,
    /// Bound for `info frame`, `print`, `backtrace` and similar queries.
    #[serde(default = "default_short_timeout")]
    pub request_timeout_ms: u64,
    /// Pause after interrupting a running program before a breakpoint is set.
    #[serde(default = "default_short_timeout")]
    pub breakpoint_settle_ms: u64,

    #[serde(default)]
    pub indent_rules: IndentRules,
    #[serde(default = "default_source_extension")]
    pub source_extension: String,

    #[serde(default = "default_shell")]
    pub shell: String,
    #[serde(default = "default_shell_args")]
    pub shell_args: Vec<String>,
    /// Written before the compiler runs, e.g. to put the SDK on the `PATH`.
    #[serde(default)]
    pub env_setup_commands: Vec<String>,
    #[serde(default = "default_interrupt_command")]
    pub interrupt_command: String,
    #[serde(default)]
    pub simulator_kill_command: Option<String>,
}

fn default_prompt() -> String {
    "(mdd) ".to_string()
}
fn default_launch_timeout() -> u64 {
    60_000
}
fn default_launch_settle() -> u64 {
    10_000
}
fn default_short_timeout() -> u64 {
    5_000
}
fn default_source_extension() -> String {
    "mc".to_string()
}
fn default_shell() -> String {
    if cfg!(windows) { "cmd" } else { "sh" }.to_string()
}
fn default_shell_args() -> Vec<String> {
    if cfg!(windows) {
        vec!["/K".to_string()]
    } else {
        vec![]
    }
}
fn default_interrupt_command() -> String {
    "a".to_string()
}

impl SessionConfig {
    pub fn new(launch: LaunchArguments) -> Self {
        SessionConfig {
            launch,
            prompt: default_prompt(),
            launch_timeout_ms: default_launch_timeout(),
            launch_settle_ms: default_launch_settle(),
            continue_timeout_ms: default_short_timeout(),
            step_timeout_ms: default_short_timeout(),
            request_timeout_ms: default_short_timeout(),
            breakpoint_settle_ms: default_short_timeout(),
            indent_rules: IndentRules::default(),
            source_extension: default_source_extension(),
            shell: default_shell(),
            shell_args: default_shell_args(),
            env_setup_commands: vec![],
            interrupt_command: default_interrupt_command(),
            simulator_kill_command: None,
        }
    }

    pub fn from_json(json: &str) -> Result<Self, SessionError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
    pub fn from_value(value: serde_json::Value) -> Result<Self, SessionError> {
        let config: Self = serde_json::from_value(value)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), SessionError> {
        if self.prompt.is_empty() {
            return Err(SessionError::InvalidConfig("the prompt must not be empty"));
        }
        Ok(())
    }

    pub fn launch_timeout(&self) -> Duration {
        Duration::from_millis(self.launch_timeout_ms)
    }
    pub fn launch_settle(&self) -> Duration {
        Duration::from_millis(self.launch_settle_ms)
    }
    pub fn continue_timeout(&self) -> Duration {
        Duration::from_millis(self.continue_timeout_ms)
    }
    pub fn step_timeout(&self) -> Duration {
        Duration::from_millis(self.step_timeout_ms)
    }
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }
    pub fn breakpoint_settle(&self) -> Duration {
        Duration::from_millis(self.breakpoint_settle_ms)
    }

    /// Everything written to a fresh shell to compile the app, start the
    /// simulator and load the app into `mdd`.
    pub fn bootstrap_commands(&self) -> Vec<String> {
        let launch = &self.launch;
        let project = &launch.project_path;
        let prg = launch.prg_path();
        let mut commands = self.env_setup_commands.clone();
        commands.push(format!(
            "monkeyc -d {} -f \"{}\" -o \"{}\" -y \"{}\"",
            launch.device,
            project.join("monkey.jungle").display(),
            prg.display(),
            launch.sdk_path.join("developer_key.der").display(),
        ));
        commands.push("connectiq".to_string());
        commands.push("mdd".to_string());
        commands.push(format!(
            "file \"{}\" \"{}\" {}",
            prg.display(),
            debug_info_path(&prg).display(),
            launch.device,
        ));
        commands.push("set print max-depth 100".to_string());
        commands.push("set timeout 5".to_string());
        commands.push("set print array-indexes".to_string());
        commands
    }
}

fn debug_info_path(prg: &Path) -> PathBuf {
    let mut path = prg.as_os_str().to_owned();
    path.push(".debug.xml");
    PathBuf::from(path)
}
