//! Error types for minihost-preset

use crate::format::FileKind;
use minihost_plugin::{ErrorKind, HostError, UniqueId};
use std::io;
use thiserror::Error;

/// Preset/bank persistence error.
///
/// Every variant except [`PresetError::Host`] and [`PresetError::Io`] is raised
/// before the session is touched.
#[derive(Error, Debug)]
pub enum PresetError {
    #[error("File does not start with chunk magic \"CcnK\" (found {found:?})")]
    BadMagic { found: String },

    #[error("Unknown chunk type {found:?}")]
    UnknownChunkType { found: String },

    #[error("Expected a {expected} file, found a {found} file")]
    WrongFileKind { found: FileKind, expected: FileKind },

    #[error("Unsupported {kind} format version {found} (max {max})")]
    UnsupportedVersion { kind: FileKind, found: i32, max: i32 },

    #[error("File is for plugin [{found}], but session plugin is [{expected}] ({name})")]
    PluginMismatch {
        expected: UniqueId,
        found: UniqueId,
        name: String,
    },

    #[error("File was written by plugin version {file}, session plugin is only version {plugin}")]
    RevisionTooNew { file: i32, plugin: i32 },

    #[error("File contains opaque data but the plugin does not accept programs as chunks")]
    OpaqueNotAccepted,

    #[error("Invalid {what} in file: {value}")]
    InvalidCount { what: &'static str, value: i32 },

    #[error("File has {file} parameters, plugin only has {plugin}")]
    ParameterCountMismatch { file: usize, plugin: usize },

    #[error("File has {file} programs, plugin only has {plugin}")]
    ProgramCountMismatch { file: usize, plugin: usize },

    #[error("Parameter {index} has value {value} outside [0, 1]")]
    ValueOutOfRange { index: usize, value: f32 },

    #[error(transparent)]
    Host(#[from] HostError),

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl PresetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PresetError::Host(e) => e.kind(),
            PresetError::Io(_) => ErrorKind::Io,
            _ => ErrorKind::Validation,
        }
    }
}

/// Result type for persistence operations
pub type Result<T> = std::result::Result<T, PresetError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_errors_are_validation() {
        let errors = [
            PresetError::BadMagic {
                found: "RIFF".into(),
            },
            PresetError::UnsupportedVersion {
                kind: FileKind::Preset,
                found: 3,
                max: 1,
            },
            PresetError::OpaqueNotAccepted,
            PresetError::ValueOutOfRange {
                index: 0,
                value: 1.5,
            },
        ];
        for err in &errors {
            assert_eq!(err.kind(), ErrorKind::Validation, "{}", err);
        }
    }

    #[test]
    fn test_wrapped_errors_keep_kind() {
        let io = io::Error::new(io::ErrorKind::UnexpectedEof, "truncated");
        assert_eq!(PresetError::from(io).kind(), ErrorKind::Io);

        let host = HostError::Bounds {
            kind: "program",
            index: 4,
            len: 2,
        };
        let err = PresetError::from(host);
        assert_eq!(err.kind(), ErrorKind::Bounds);
        assert_eq!(err.to_string(), "program index 4 out of range (0..2)");
    }

    #[test]
    fn test_error_display() {
        let err = PresetError::PluginMismatch {
            expected: UniqueId::from_bytes(*b"Tsyn"),
            found: UniqueId::from_bytes(*b"Xfx1"),
            name: "TestSynth".into(),
        };
        assert_eq!(
            err.to_string(),
            "File is for plugin [Xfx1], but session plugin is [Tsyn] (TestSynth)"
        );

        let err = PresetError::WrongFileKind {
            found: FileKind::Bank,
            expected: FileKind::Preset,
        };
        assert_eq!(err.to_string(), "Expected a preset file, found a bank file");
    }
}
