use std::path::Path;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, RuntimeError>;

/// Everything that can go wrong between the CLI and the kernel. All
/// library code returns these; the binary prints the chain to stderr.
#[derive(Error, Debug)]
pub enum RuntimeError {
    #[error("Invalid configuration: {message}")]
    ConfigError { message: String },

    #[error("No such container: {target}")]
    NotFound { target: String },

    #[error("Unsupported: {message}")]
    Unsupported { message: String },

    #[error("IO error on {path}")]
    IOError {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Mount error: {message}")]
    MountError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Spawn error: {message}")]
    SpawnError {
        message: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("Command not found: {command}")]
    CommandNotFound { command: String },
}

impl RuntimeError {
    pub fn config(message: impl Into<String>) -> Self {
        RuntimeError::ConfigError {
            message: message.into(),
        }
    }

    pub fn not_found(target: impl Into<String>) -> Self {
        RuntimeError::NotFound {
            target: target.into(),
        }
    }

    pub fn unsupported(message: impl Into<String>) -> Self {
        RuntimeError::Unsupported {
            message: message.into(),
        }
    }

    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        RuntimeError::IOError {
            path: path.as_ref().display().to_string(),
            source,
        }
    }

    pub fn mount(message: impl Into<String>, source: nix::Error) -> Self {
        RuntimeError::MountError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn mount_msg(message: impl Into<String>) -> Self {
        RuntimeError::MountError {
            message: message.into(),
            source: None,
        }
    }

    pub fn spawn(message: impl Into<String>, source: nix::Error) -> Self {
        RuntimeError::SpawnError {
            message: message.into(),
            source: Some(Box::new(source)),
        }
    }

    pub fn command_not_found(command: impl Into<String>) -> Self {
        RuntimeError::CommandNotFound {
            command: command.into(),
        }
    }
}
