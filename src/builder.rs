//! Builder for opening a configured `PluginSession`.

use crate::plugin::{HostListener, NativeLoader, PluginSession, SessionConfig, Vst2Loader};
use crate::Result;
use std::path::Path;
use std::sync::Arc;

/// Opens a plugin session with its audio setup, listeners and initial
/// lifecycle state applied in one go.
///
/// # Example
///
/// ```ignore
/// use minihost::prelude::*;
///
/// let session = HostBuilder::new()
///     .sample_rate(48000.0)
///     .block_size(256)
///     .listener(FnListener::new().on_automate(|i, v| { println!("{} = {}", i, v); Ok(()) }).into_arc())
///     .resume()
///     .open_vst2("/path/to/Synth.so")?;
/// ```
#[derive(Default)]
pub struct HostBuilder {
    config: SessionConfig,
    listeners: Vec<Arc<dyn HostListener>>,
    resume: bool,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Default: 44100 Hz
    pub fn sample_rate(mut self, rate: f32) -> Self {
        self.config.sample_rate = rate;
        self
    }

    /// Default: 512 frames
    pub fn block_size(mut self, size: usize) -> Self {
        self.config.block_size = size;
        self
    }

    pub fn config(mut self, config: SessionConfig) -> Self {
        self.config = config;
        self
    }

    /// Registered in call order, before the session is returned.
    pub fn listener(mut self, listener: Arc<dyn HostListener>) -> Self {
        self.listeners.push(listener);
        self
    }

    /// Turn the plugin on after opening (sessions start suspended).
    pub fn resume(mut self) -> Self {
        self.resume = true;
        self
    }

    pub fn open(self, loader: Arc<dyn NativeLoader>) -> Result<PluginSession> {
        self.config.validate()?;
        let session = PluginSession::open(loader, self.config)?;
        for listener in self.listeners {
            session.add_listener(listener);
        }
        if self.resume {
            if let Err(e) = session.turn_on() {
                // The handle must be released before the session is dropped.
                if let Err(close) = session.close() {
                    tracing::error!("Failed to close session after turn on failed: {}", close);
                }
                return Err(e.into());
            }
        }
        Ok(session)
    }

    /// Open a VST2 plugin. Requires the `vst2` feature.
    pub fn open_vst2(self, path: impl AsRef<Path>) -> Result<PluginSession> {
        self.open(Vst2Loader::new(path.as_ref()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::mock::{MockLoader, MockSpec};
    use crate::plugin::{ErrorKind, FnListener, Lifecycle};

    #[test]
    fn test_builder_applies_config() {
        let loader = MockLoader::new(MockSpec::new("Tsyn", "TestSynth"));
        let probe = loader.probe();
        let session = HostBuilder::new()
            .sample_rate(48000.0)
            .block_size(128)
            .open(loader)
            .unwrap();

        assert_eq!(session.lifecycle(), Lifecycle::Suspended);
        assert_eq!(probe.sample_rate(), 48000.0);
        assert_eq!(probe.block_size(), 128);
        session.close().unwrap();
    }

    #[test]
    fn test_builder_resume_and_listeners() {
        let loader = MockLoader::new(MockSpec::new("Tsyn", "TestSynth"));
        let session = HostBuilder::new()
            .listener(FnListener::new().into_arc())
            .listener(FnListener::new().into_arc())
            .resume()
            .open(loader)
            .unwrap();

        assert!(session.is_turned_on());
        assert_eq!(session.listener_count(), 2);
        session.close().unwrap();
    }

    #[test]
    fn test_builder_rejects_bad_config() {
        let loader = MockLoader::new(MockSpec::new("Tsyn", "TestSynth"));
        let probe = loader.probe();
        let err = HostBuilder::new().block_size(0).open(loader).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Validation);
        assert_eq!(probe.loads(), 0);
    }

    #[test]
    fn test_open_vst2_without_plugin() {
        let err = HostBuilder::new()
            .open_vst2("/nonexistent/plugin.so")
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Native);
    }
}
