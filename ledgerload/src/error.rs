use ledgerload_core::ConfigError;
use std::path::PathBuf;
use std::process::ExitStatus;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConnectorError {
    #[error("Connector does not implement `{0}`")]
    NotImplemented(&'static str),

    #[error("Request failed: {0}")]
    Request(String),

    #[error("Connector error: {0}")]
    Other(#[from] Box<dyn std::error::Error + Send + Sync>),
}

#[derive(Debug, Error)]
pub enum RateControlError {
    #[error("Unknown rate controller type \"{0}\"")]
    UnknownType(String),

    #[error("Invalid options for {kind}: {source}")]
    InvalidOptions {
        kind: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid options for {kind}: {reason}")]
    InvalidValue { kind: String, reason: String },

    #[error("Trace file does not exist: {}", .0.display())]
    TraceFileMissing(PathBuf),

    #[error("Malformed trace file {}: {reason}", .path.display())]
    MalformedTrace { path: PathBuf, reason: String },

    #[error("I/O error on trace file {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

#[derive(Debug, Error)]
pub enum CommandError {
    #[error("Failed to spawn \"{command}\": {source}")]
    Spawn {
        command: String,
        #[source]
        source: std::io::Error,
    },

    #[error("\"{command}\" exited with {status}")]
    Status { command: String, status: ExitStatus },

    #[error("Command failed: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum WorkloadError {
    #[error("No workload module named \"{0}\"")]
    UnknownModule(String),

    #[error("Invalid workload arguments: {0}")]
    Arguments(#[from] serde_json::Error),

    #[error("Workload request failed: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Workload error: {0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error("Invalid benchmark configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Connector failure: {0}")]
    Connector(#[from] ConnectorError),

    #[error("Rate control failure: {0}")]
    RateControl(#[from] RateControlError),

    #[error("Workload failure: {0}")]
    Workload(#[from] WorkloadError),

    #[error("Expected {expected} worker argument sets, connector prepared {actual}")]
    WorkerArguments { expected: usize, actual: usize },

    #[error("Worker task failed: {0}")]
    Join(#[from] tokio::task::JoinError),
}

/// A failed phase. Each variant maps onto the process exit code returned by
/// [`Engine::run`](crate::engine::Engine::run).
#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Start command must be a string, found {0}")]
    StartCommandNotString(&'static str),

    #[error("Start command is empty")]
    StartCommandBlank,

    #[error("Start command failed: {0}")]
    StartCommand(#[source] CommandError),

    #[error("Connector initialization failed: {0}")]
    ConnectorInit(#[source] ConnectorError),

    #[error("Smart contract installation failed: {0}")]
    Install(#[source] ConnectorError),

    #[error("Could not acquire a connector: {0}")]
    ConnectorAcquisition(#[source] ConnectorError),

    #[error("Benchmark rounds failed: {0}")]
    Test(#[source] OrchestratorError),

    #[error("End command must be a string, found {0}")]
    EndCommandNotString(&'static str),

    #[error("End command failed: {0}")]
    EndCommand(#[source] CommandError),

    #[error("Unexpected failure: {0}")]
    Unexpected(String),
}

impl EngineError {
    pub fn code(&self) -> i32 {
        use EngineError::*;
        match self {
            StartCommandNotString(_) => 1,
            StartCommandBlank => 2,
            StartCommand(_) => 3,
            ConnectorInit(_) => 4,
            Install(_) => 5,
            ConnectorAcquisition(_) | Test(_) | Unexpected(_) => 6,
            EndCommandNotString(_) | EndCommand(_) => 9,
        }
    }
}
