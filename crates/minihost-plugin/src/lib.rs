//! In-process VST2 plugin hosting for minihost
//!
//! A [`PluginSession`] owns one native plugin instance and guards its
//! lifecycle: parameter and program access, chunk state, MIDI delivery,
//! audio processing and the editor window. Plugin-initiated calls
//! (automation, I/O changes, edit gestures, MIDI output) reach the host
//! through a [`HostCallback`] and are fanned out to registered
//! [`HostListener`]s.
//!
//! ## Usage
//!
//! ```ignore
//! use minihost_plugin::{PluginSession, SessionConfig, Vst2Loader};
//!
//! let session = PluginSession::open(
//!     Vst2Loader::new("/path/to/Synth.so"),
//!     SessionConfig::new(48000.0, 256),
//! )?;
//!
//! session.turn_on()?;
//! session.queue_midi(MidiEvent::note_on(0, 60, 100));
//! session.process_replacing(&inputs, &mut outputs, 256)?;
//! session.close()?;
//! ```

pub mod error;
pub use error::{ErrorKind, HostError, LoadStage, Result};

mod callback;
pub use callback::HostCallback;

mod config;
pub use config::SessionConfig;

mod editor;
pub use editor::EditorSignal;

mod listener;
pub use listener::{
    EventKind, FnListener, HostListener, IoChange, ListenerError, ListenerRegistry,
    ListenerResult, ParameterView,
};

mod metadata;
pub use metadata::{
    AudioIO, CanDo, ChunkKind, IoCounts, PinDirection, PinProperties, PluginInfo, Support,
    TimeInfo, UniqueId,
};

mod midi;
pub use midi::{MidiCommand, MidiEvent, MidiEventQueue, MidiEventVec};

mod native;
pub use native::{NativeEditor, NativeLoader, NativePlugin};

mod session;
pub use session::{Lifecycle, ParameterSnapshot, PluginSession};

mod version;
pub use version::{VersionPolicy, VstVersion};

mod vst2_loader;
pub use vst2_loader::Vst2Loader;

/// Scriptable in-memory plugin used by tests and the `--mock` CLI flag.
#[doc(hidden)]
pub mod mock;
