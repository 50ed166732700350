//! Error types for Armada

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for Armada operations
pub type Result<T> = std::result::Result<T, ArmadaError>;

/// Main error type for Armada
#[derive(Error, Debug)]
pub enum ArmadaError {
    /// Task-source parsing errors
    #[error("Parse error: {0}")]
    Parse(#[from] ParseError),

    /// Target resolution errors
    #[error("Host error: {0}")]
    Host(#[from] HostError),

    /// Statement execution errors
    #[error("Execution error: {0}")]
    Exec(#[from] ExecError),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// YAML parsing errors (host registry)
    #[error("YAML parsing error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// A selected task is not in the catalog
    #[error("no such task: {0}")]
    TaskNotFound(String),

    /// A key=value word appeared before any task name
    #[error("parameter '{0}' given before any task")]
    StrayParameter(String),
}

/// Task-source parsing errors. These are fatal: nothing executes if the
/// catalog cannot be loaded.
#[derive(Error, Debug)]
pub enum ParseError {
    #[error("task keyword without a name (line {line})")]
    MissingTaskName { line: usize },

    #[error("malformed task header: {0}")]
    BadTaskHeader(String),

    #[error("malformed condition: {0}")]
    BadCondition(String),

    #[error("malformed sync block: {0}")]
    BadSyncBlock(String),

    #[error("'{found}' without a matching open block (line {line})")]
    UnmatchedEnd { found: String, line: usize },

    #[error("failed to read task file '{path}': {error}")]
    Unreadable { path: PathBuf, error: String },
}

/// Target resolution errors
#[derive(Error, Debug)]
pub enum HostError {
    #[error("invalid host spec '{0}'")]
    BadSpec(String),

    #[error("invalid port in host spec '{0}'")]
    BadPort(String),

    #[error("failed to read host registry '{path}': {error}")]
    Registry { path: PathBuf, error: String },
}

/// Statement execution errors. Raised at the point a statement is about to
/// run and recorded as that target's failure; they never abort other
/// targets.
#[derive(Error, Debug)]
pub enum ExecError {
    #[error("unknown verb: {0}")]
    UnknownVerb(String),

    #[error("{0}")]
    Argument(String),

    #[error("connect error: {0}")]
    Connection(String),

    #[error("failed to spawn '{command}': {error}")]
    Spawn { command: String, error: String },

    #[error("file transfer failed for '{path}': {error}")]
    Transfer { path: String, error: String },

    #[error("ssh session error: {0}")]
    Session(String),
}

/// Specialized result type for parsing operations
pub type ParseResult<T> = std::result::Result<T, ParseError>;

/// Specialized result type for target resolution
pub type HostResult<T> = std::result::Result<T, HostError>;

/// Specialized result type for statement execution
pub type ExecResult<T> = std::result::Result<T, ExecError>;
