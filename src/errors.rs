use std::path::PathBuf;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SessionError {
    #[error("I/O error")]
    IoError(#[from] std::io::Error),

    #[error("Could not spawn the debugger process `{program}`")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("The debugger has not been launched yet")]
    NotLaunched,

    #[error("The debugger was already launched for this session")]
    AlreadyLaunched,

    #[error("The session has terminated")]
    Terminated,

    #[error("The debugger process exited")]
    ProcessExited,

    #[error("Invalid launch configuration")]
    ConfigError(#[from] serde_json::Error),

    #[error("Invalid launch configuration: {0}")]
    InvalidConfig(&'static str),

    #[error("Source error")]
    SourceError(#[from] SourceError),
}

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("could not read source file '{}'", path.display())]
    Unreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}
