//! Header inspection without a plugin

use crate::error::Result;
use crate::format::{open_file, FileKind, Header, Reader};
use minihost_plugin::{PluginSession, UniqueId};
use serde::{Deserialize, Serialize};
use std::io::Read;
use std::path::Path;

/// Summary of an `.fxp` / `.fxb` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInfo {
    pub kind: FileKind,
    pub opaque: bool,
    pub format_version: i32,
    pub unique_id: UniqueId,
    /// Version of the plugin that wrote the file
    pub plugin_version: i32,
    /// Parameter count of a regular preset, program count of a bank
    pub count: i32,
    /// Byte length of the remainder as declared in the file
    pub declared_size: i32,
    /// Presets only
    pub program_name: Option<String>,
    /// Banks only
    pub current_program: Option<i32>,
}

impl FileInfo {
    /// Whether the file was written for this session's plugin.
    pub fn matches(&self, session: &PluginSession) -> bool {
        self.unique_id == session.unique_id()
    }
}

impl std::fmt::Display for FileInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} {} for [{}] v{} (format {})",
            if self.opaque { "opaque" } else { "regular" },
            self.kind,
            self.unique_id,
            self.plugin_version,
            self.format_version
        )?;
        if let Some(name) = &self.program_name {
            write!(f, ", program {:?}", name)?;
        }
        if let Some(current) = self.current_program {
            write!(f, ", {} programs, current {}", self.count, current)?;
        }
        Ok(())
    }
}

/// Read only the header of a preset or bank.
pub fn inspect<R: Read>(source: R) -> Result<FileInfo> {
    let mut reader = Reader::new(source);
    let header = Header::read(&mut reader)?;
    let kind = header.chunk_type.kind();
    let (program_name, current_program) = match kind {
        FileKind::Preset => (Some(reader.name()?), None),
        FileKind::Bank => (None, Some(reader.i32()?)),
    };
    Ok(FileInfo {
        kind,
        opaque: header.chunk_type.is_opaque(),
        format_version: header.format_version,
        unique_id: header.unique_id,
        plugin_version: header.plugin_revision,
        count: header.count,
        declared_size: header.byte_size,
        program_name,
        current_program,
    })
}

pub fn inspect_path(path: impl AsRef<Path>) -> Result<FileInfo> {
    inspect(open_file(path.as_ref())?)
}
