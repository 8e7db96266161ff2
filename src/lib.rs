//! # minihost - VST2 plugin host
//!
//! Load a VST2 plugin in-process, drive it, and persist its state.
//!
//! ## Architecture
//!
//! minihost is an umbrella crate that coordinates:
//! - **minihost-plugin** - Plugin sessions (lifecycle, parameters, programs, MIDI,
//!   audio processing, listener fan-out, editor window)
//! - **minihost-preset** - `.fxp` presets, `.fxb` banks, header inspection, text dumps
//!
//! ## Quick Start
//!
//! ```ignore
//! use minihost::prelude::*;
//!
//! let session = HostBuilder::new()
//!     .sample_rate(44100.0)
//!     .block_size(512)
//!     .resume()
//!     .open_vst2("/path/to/Synth.so")?;
//!
//! session.queue_midi(MidiEvent::note_on(0, 60, 100));
//! session.process_replacing(&inputs, &mut outputs, 512)?;
//!
//! PresetCodec::default().save_to_path(&session, "patch.fxp")?;
//! session.close()?;
//! ```
//!
//! ## Feature Flags
//!
//! - `vst2` - Load real plugins through the `vst` crate. Without it, only
//!   custom [`plugin::NativeLoader`]s (and the built-in mock) can be opened.

/// Re-export of minihost-plugin for direct access
pub use minihost_plugin as plugin;

/// Re-export of minihost-preset for direct access
pub use minihost_preset as preset;

// Sessions
pub use minihost_plugin::{
    CanDo, EventKind, FnListener, HostListener, Lifecycle, MidiEvent, ParameterView,
    PluginInfo, PluginSession, SessionConfig, Support, UniqueId, VstVersion, Vst2Loader,
};

// Persistence
pub use minihost_preset::{
    inspect, inspect_path, write_text_dump, BankCodec, FileInfo, FileKind, PersistOptions,
    PresetCodec,
};

mod error;
pub use error::{Error, Result};

mod builder;
pub use builder::HostBuilder;

/// Convenience prelude for common imports
pub mod prelude {
    pub use crate::HostBuilder;

    // Sessions
    pub use crate::plugin::{
        FnListener, HostListener, Lifecycle, MidiEvent, PluginSession, SessionConfig,
    };

    // Persistence
    pub use crate::preset::{BankCodec, PersistOptions, PresetCodec};

    pub use crate::{Error, Result};
}
