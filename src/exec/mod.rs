/// Runs the workflow
mod workflow_runner;
pub use workflow_runner::{Dispatch, WorkflowRunner};

/// Run a subprocess
mod run_cmd;

/// Nodes that run in-process
mod builtins;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Expected file not found: {0}")]
    ExpectedFileNotFound(String),
    #[error("Subprocess for node '{0}' failed ({1})")]
    SubprocessFailed(String, String),
    #[error("Failed to execute child process '{0}'")]
    SpawnFailed(String, #[source] std::io::Error),
    #[error("Cannot attach to child {0}")]
    ChildPipe(&'static str),
    #[error("Error joining {0} thread")]
    TeeThread(&'static str),
    #[error("Node '{0}' has no input '{1}'")]
    MissingInput(String, String),
    #[error("Node '{0}' found no file for '{1}' matching {2}")]
    NoMatch(String, String, String),
    #[error("Realization has no value for iterable field '{0}'")]
    MissingField(String),
}
