//! Session configuration.

use crate::error::{HostError, Result};
use serde::{Deserialize, Serialize};

/// Audio format a session pushes to the plugin at load and after every reset.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default = "default_sample_rate")]
    pub sample_rate: f32,

    #[serde(default = "default_block_size")]
    pub block_size: usize,
}

fn default_sample_rate() -> f32 {
    44100.0
}

fn default_block_size() -> usize {
    512
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            sample_rate: default_sample_rate(),
            block_size: default_block_size(),
        }
    }
}

impl SessionConfig {
    pub fn new(sample_rate: f32, block_size: usize) -> Self {
        Self {
            sample_rate,
            block_size,
        }
    }

    pub fn validate(&self) -> Result<()> {
        validate_sample_rate(self.sample_rate)?;
        validate_block_size(self.block_size)
    }
}

pub(crate) fn validate_sample_rate(rate: f32) -> Result<()> {
    if rate.is_finite() && rate > 0.0 {
        Ok(())
    } else {
        Err(HostError::validation(
            "sample rate",
            format!("{} is not a positive number", rate),
        ))
    }
}

pub(crate) fn validate_block_size(size: usize) -> Result<()> {
    if size > 0 {
        Ok(())
    } else {
        Err(HostError::validation("block size", "must be positive"))
    }
}
