//! The native plugin boundary.
//!
//! A [`NativeLoader`] produces [`NativePlugin`] handles; the session owns the
//! handle exclusively and serializes every call into it. Implementations use
//! interior mutability because the plugin may call back into the host (and from
//! there into the session) while one of its own methods is still running.

use crate::callback::HostCallback;
use crate::metadata::{CanDo, ChunkKind, PinDirection, PinProperties, PluginInfo, Support, TimeInfo};
use crate::midi::MidiEvent;
use crate::Result;
use std::path::PathBuf;
use std::sync::Arc;

/// Produces fresh plugin handles for one plugin source.
pub trait NativeLoader: Send + Sync {
    /// Path or name used in log lines and error messages.
    fn source(&self) -> String;

    /// `host` must be kept by the plugin for its whole lifetime.
    fn load(&self, host: HostCallback) -> Result<Box<dyn NativePlugin>>;

    /// Directory the plugin binary was loaded from, if it came from disk.
    fn directory(&self) -> Option<PathBuf> {
        None
    }
}

/// Unified interface over one loaded plugin instance.
pub trait NativePlugin: Send {
    fn info(&self) -> PluginInfo;

    /// Normalized 0..1.
    fn get_parameter(&self, index: usize) -> f32;

    /// Normalized 0..1.
    fn set_parameter(&self, index: usize, value: f32);

    fn parameter_name(&self, index: usize) -> String;

    /// Value formatted by the plugin, e.g. `"-6.0"`.
    fn parameter_display(&self, index: usize) -> String;

    /// Unit, e.g. `"dB"`.
    fn parameter_label(&self, index: usize) -> String;

    fn program(&self) -> usize;

    fn set_program(&self, index: usize);

    fn program_name(&self) -> String;

    fn set_program_name(&self, name: &str);

    /// `None` when the plugin does not support indexed program names.
    fn program_name_at(&self, index: usize) -> Option<String>;

    fn chunk(&self, kind: ChunkKind) -> Vec<u8>;

    fn set_chunk(&self, kind: ChunkKind, data: &[u8]);

    fn set_sample_rate(&self, rate: f32);

    fn set_block_size(&self, size: usize);

    fn suspend(&self);

    fn resume(&self);

    /// 2.3+ only.
    fn start_process(&self) {}

    /// 2.3+ only.
    fn stop_process(&self) {}

    fn process_replacing(
        &self,
        events: &[MidiEvent],
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
    );

    /// Legacy `process`: adds into `outputs` instead of overwriting.
    fn process_accumulating(
        &self,
        events: &[MidiEvent],
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
    );

    fn process_double_replacing(
        &self,
        events: &[MidiEvent],
        inputs: &[&[f64]],
        outputs: &mut [&mut [f64]],
        frames: usize,
    );

    fn can_do(&self, capability: CanDo) -> Support;

    /// Returns whether the plugin honoured the request.
    fn set_bypass(&self, bypass: bool) -> bool;

    /// Timing info returned to the plugin's `getTimeInfo` requests.
    fn update_time_info(&self, time: &TimeInfo);

    fn pin_properties(&self, direction: PinDirection, index: usize) -> Option<PinProperties>;

    /// Samples the plugin keeps sounding after its input goes silent, as
    /// reported by `effGetTailSize`: 0 when unknown, 1 for no tail.
    fn tail_size(&self) -> usize {
        0
    }

    fn is_parameter_automatable(&self, _index: usize) -> bool {
        true
    }

    /// `false` when the plugin sets `effFlagsNoSoundInStop`.
    fn produces_sound_in_stop(&self) -> bool {
        true
    }

    fn edit_idle(&self) {}

    /// A fresh editor handle, or `None` if the plugin has no editor.
    fn editor(&self) -> Option<Box<dyn NativeEditor>>;

    /// Closes the plugin. The handle is unusable afterwards.
    fn release(self: Box<Self>);
}

/// A plugin editor window.
pub trait NativeEditor: Send {
    /// Opens the window and blocks until it is closed.
    fn run(&mut self, title: &str);

    /// Asks a running editor to close. Must be callable from any thread.
    fn close_requester(&self) -> Arc<dyn Fn() + Send + Sync>;
}
