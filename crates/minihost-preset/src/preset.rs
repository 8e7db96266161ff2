//! Single-program presets (`.fxp`)

use crate::error::{PresetError, Result};
use crate::format::{
    check_values, open_file, write_file, ChunkType, FileKind, Header, Reader, Writer,
    PRESET_FORMAT_VERSION,
};
use crate::options::PersistOptions;
use minihost_plugin::PluginSession;
use std::io::{Read, Write};
use std::path::Path;

/// Reads and writes the current program of a session as an `.fxp` file.
///
/// Plugins that accept programs as chunks are saved as opaque data (`FPCh`),
/// everything else as one float per parameter (`FxCk`).
///
/// ```ignore
/// use minihost_preset::{PersistOptions, PresetCodec};
///
/// let codec = PresetCodec::default();
/// codec.save_to_path(&session, "lead.fxp")?;
/// codec.load_from_path(&session, "lead.fxp")?;
/// ```
#[derive(Debug, Clone, Copy, Default)]
pub struct PresetCodec {
    options: PersistOptions,
}

impl PresetCodec {
    pub fn new(options: PersistOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PersistOptions {
        &self.options
    }

    /// Encode the current program.
    pub fn encode(&self, session: &PluginSession) -> Result<Vec<u8>> {
        session.exclusive(|s| -> Result<Vec<u8>> {
            let opaque = s.accepts_programs_as_chunks();
            let name = s.program_name()?;

            let mut w = Writer::new(ChunkType::new(FileKind::Preset, opaque));
            w.i32(PRESET_FORMAT_VERSION);
            w.fourcc(s.unique_id().as_bytes());
            w.i32(s.plugin_version());
            if opaque {
                let chunk = s.program_chunk()?;
                w.i32(1);
                w.name(&name);
                w.blob(&chunk)?;
            } else {
                let count = s.num_parameters();
                w.count("parameter count", count)?;
                w.name(&name);
                for index in 0..count {
                    w.f32(s.get_parameter(index)?);
                }
            }
            Ok(w.finish()?)
        })
    }

    /// Write the current program to `sink`.
    ///
    /// The file is encoded in full before anything is written.
    pub fn save<W: Write>(&self, session: &PluginSession, mut sink: W) -> Result<()> {
        let bytes = self.encode(session)?;
        sink.write_all(&bytes)?;
        sink.flush()?;
        Ok(())
    }

    pub fn save_to_path(&self, session: &PluginSession, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let bytes = self.encode(session)?;
        write_file(path, &bytes)?;
        tracing::debug!("Saved preset {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load a preset into the current program.
    ///
    /// The whole file is read and validated before the session is touched;
    /// on any validation or read error the session is unchanged.
    pub fn load<R: Read>(&self, session: &PluginSession, source: R) -> Result<()> {
        session.exclusive(|s| -> Result<()> {
            let mut reader = Reader::new(source);
            let header = Header::read(&mut reader)?;
            header.check(s, FileKind::Preset, &self.options)?;

            let name = reader.name()?;
            if header.chunk_type.is_opaque() {
                let chunk = reader.blob()?;
                tracing::debug!("Loading opaque preset {:?} ({} bytes)", name, chunk.len());
                s.set_program_name(&name)?;
                s.set_program_chunk(&chunk)?;
            } else {
                let count = header.count("parameter count")?;
                let plugin = s.num_parameters();
                if count > plugin {
                    return Err(PresetError::ParameterCountMismatch {
                        file: count,
                        plugin,
                    });
                }
                let values = reader.floats(count)?;
                check_values(&values, count)?;
                tracing::debug!("Loading preset {:?} ({} parameters)", name, count);
                s.set_program_name(&name)?;
                for (index, &value) in values.iter().enumerate() {
                    s.set_parameter(index, value)?;
                }
            }
            Ok(())
        })
    }

    /// Load a preset from a file. A missing path or a directory is a `NotFound` error.
    pub fn load_from_path(&self, session: &PluginSession, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = open_file(path)?;
        self.load(session, file)?;
        tracing::debug!("Loaded preset {}", path.display());
        Ok(())
    }
}
