//! VST preset and bank files for minihost
//!
//! - [`PresetCodec`]: the current program as an `.fxp` file
//! - [`BankCodec`]: every program as an `.fxb` file
//! - [`inspect`]: read a file's header without loading a plugin
//! - [`write_text_dump`]: one line per parameter, for debugging
//!
//! Loading is all-or-nothing with respect to validation: magic, format
//! version, plugin id, plugin revision, chunk capability and the whole payload
//! are checked before the session is modified.
//!
//! ```ignore
//! use minihost_preset::{inspect_path, PresetCodec};
//!
//! let info = inspect_path("lead.fxp")?;
//! if info.matches(&session) {
//!     PresetCodec::default().load_from_path(&session, "lead.fxp")?;
//! }
//! ```

pub mod error;
pub use error::{PresetError, Result};

pub mod format;
pub use format::{ChunkType, FileKind};

mod options;
pub use options::PersistOptions;

mod preset;
pub use preset::PresetCodec;

mod bank;
pub use bank::BankCodec;

mod info;
pub use info::{inspect, inspect_path, FileInfo};

mod text;
pub use text::{text_dump, write_text_dump};
