//! Centralized error type for the minihost umbrella crate.
//!
//! Wraps the session and persistence errors so `?` propagates naturally across crate boundaries.

use minihost_plugin::ErrorKind;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("Plugin: {0}")]
    Plugin(#[from] minihost_plugin::HostError),

    #[error("Preset: {0}")]
    Preset(#[from] minihost_preset::PresetError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Plugin(e) => e.kind(),
            Error::Preset(e) => e.kind(),
            Error::Io(_) => ErrorKind::Io,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
