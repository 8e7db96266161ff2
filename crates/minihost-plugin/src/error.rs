//! Error types for plugin sessions

use crate::session::Lifecycle;
use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoadStage {
    Opening,
    Instantiation,
    Initialization,
    Setup,
    Activation,
    Reload,
}

impl std::fmt::Display for LoadStage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadStage::Opening => write!(f, "opening library"),
            LoadStage::Instantiation => write!(f, "creating instance"),
            LoadStage::Initialization => write!(f, "initializing plugin"),
            LoadStage::Setup => write!(f, "setting up audio"),
            LoadStage::Activation => write!(f, "activating"),
            LoadStage::Reload => write!(f, "reloading"),
        }
    }
}

/// Coarse classification shared by every error type in the workspace.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Malformed or incompatible input. Nothing was changed.
    Validation,
    /// Operation not allowed in the current lifecycle state.
    State,
    /// Parameter, program or pin index out of range.
    Bounds,
    Io,
    /// The native plugin (or its loader) reported failure.
    Native,
}

#[derive(Error, Debug)]
pub enum HostError {
    #[error("Invalid {what}: {reason}")]
    Validation { what: &'static str, reason: String },

    #[error("Cannot {operation} while plugin is {state}")]
    State {
        operation: &'static str,
        state: Lifecycle,
    },

    #[error("{kind} index {index} out of range (0..{len})")]
    Bounds {
        kind: &'static str,
        index: usize,
        len: usize,
    },

    #[error("Cannot {operation}: {reason}")]
    Unsupported {
        operation: &'static str,
        reason: String,
    },

    #[error("Cannot {operation} from inside a plugin callback")]
    Reentrant { operation: &'static str },

    #[error("Plugin failed at {stage} stage: {reason}")]
    Native { stage: LoadStage, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl HostError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            HostError::Validation { .. } => ErrorKind::Validation,
            HostError::State { .. }
            | HostError::Unsupported { .. }
            | HostError::Reentrant { .. } => ErrorKind::State,
            HostError::Bounds { .. } => ErrorKind::Bounds,
            HostError::Native { .. } => ErrorKind::Native,
            HostError::Io(_) => ErrorKind::Io,
        }
    }

    pub(crate) fn validation(what: &'static str, reason: impl Into<String>) -> Self {
        HostError::Validation {
            what,
            reason: reason.into(),
        }
    }

    pub(crate) fn unsupported(operation: &'static str, reason: impl Into<String>) -> Self {
        HostError::Unsupported {
            operation,
            reason: reason.into(),
        }
    }

    pub(crate) fn native(stage: LoadStage, reason: impl Into<String>) -> Self {
        HostError::Native {
            stage,
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, HostError>;

/// Fails with [`HostError::Bounds`] unless `index < len`.
pub(crate) fn check_index(kind: &'static str, index: usize, len: usize) -> Result<()> {
    if index < len {
        Ok(())
    } else {
        Err(HostError::Bounds { kind, index, len })
    }
}
