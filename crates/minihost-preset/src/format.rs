//! Byte-level layout shared by `.fxp` and `.fxb` files
//!
//! Every multi-byte field is big-endian. Both file kinds start with the same
//! 28-byte header:
//!
//! ```text
//! 0   "CcnK"             container magic
//! 4   i32                byte length of the remainder
//! 8   chunk-type magic   FxCk / FPCh (preset), FxBk / FBCh (bank)
//! 12  i32                format version
//! 16  4 bytes            plugin unique id
//! 20  i32                plugin revision
//! 24  i32                parameter count (preset) or program count (bank)
//! ```

use crate::error::{PresetError, Result};
use crate::options::PersistOptions;
use minihost_plugin::{PluginSession, UniqueId};
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;

pub const CHUNK_MAGIC: [u8; 4] = *b"CcnK";
pub const REGULAR_PRESET_MAGIC: [u8; 4] = *b"FxCk";
pub const OPAQUE_PRESET_MAGIC: [u8; 4] = *b"FPCh";
pub const REGULAR_BANK_MAGIC: [u8; 4] = *b"FxBk";
pub const OPAQUE_BANK_MAGIC: [u8; 4] = *b"FBCh";

/// Highest preset format version understood (and the one written)
pub const PRESET_FORMAT_VERSION: i32 = 1;
/// Highest bank format version understood; 2 adds the VST 2.4 extensions
pub const BANK_FORMAT_VERSION: i32 = 2;

/// Fixed width of the program name field
pub const PROGRAM_NAME_LEN: usize = 28;
/// Zero padding after the current-program field of a bank
pub const BANK_RESERVED_LEN: usize = 124;

/// Bytes before the payload of a preset
pub const PRESET_HEADER_LEN: usize = 56;
/// Bytes before the payload of a bank
pub const BANK_HEADER_LEN: usize = 156;

/// Preset (`.fxp`) or bank (`.fxb`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Preset,
    Bank,
}

impl FileKind {
    pub fn max_format_version(self) -> i32 {
        match self {
            FileKind::Preset => PRESET_FORMAT_VERSION,
            FileKind::Bank => BANK_FORMAT_VERSION,
        }
    }

    /// File extension (without dot).
    pub fn extension(self) -> &'static str {
        match self {
            FileKind::Preset => "fxp",
            FileKind::Bank => "fxb",
        }
    }
}

impl std::fmt::Display for FileKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FileKind::Preset => write!(f, "preset"),
            FileKind::Bank => write!(f, "bank"),
        }
    }
}

/// The chunk-type tag at offset 8.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ChunkType {
    RegularPreset,
    OpaquePreset,
    RegularBank,
    OpaqueBank,
}

impl ChunkType {
    pub fn new(kind: FileKind, opaque: bool) -> Self {
        match (kind, opaque) {
            (FileKind::Preset, false) => ChunkType::RegularPreset,
            (FileKind::Preset, true) => ChunkType::OpaquePreset,
            (FileKind::Bank, false) => ChunkType::RegularBank,
            (FileKind::Bank, true) => ChunkType::OpaqueBank,
        }
    }

    pub fn from_magic(magic: [u8; 4]) -> Option<Self> {
        match &magic {
            b"FxCk" => Some(ChunkType::RegularPreset),
            b"FPCh" => Some(ChunkType::OpaquePreset),
            b"FxBk" => Some(ChunkType::RegularBank),
            b"FBCh" => Some(ChunkType::OpaqueBank),
            _ => None,
        }
    }

    pub fn magic(self) -> [u8; 4] {
        match self {
            ChunkType::RegularPreset => REGULAR_PRESET_MAGIC,
            ChunkType::OpaquePreset => OPAQUE_PRESET_MAGIC,
            ChunkType::RegularBank => REGULAR_BANK_MAGIC,
            ChunkType::OpaqueBank => OPAQUE_BANK_MAGIC,
        }
    }

    pub fn kind(self) -> FileKind {
        match self {
            ChunkType::RegularPreset | ChunkType::OpaquePreset => FileKind::Preset,
            ChunkType::RegularBank | ChunkType::OpaqueBank => FileKind::Bank,
        }
    }

    pub fn is_opaque(self) -> bool {
        matches!(self, ChunkType::OpaquePreset | ChunkType::OpaqueBank)
    }
}

/// Printable form of a four-byte tag.
pub(crate) fn fourcc(bytes: [u8; 4]) -> String {
    UniqueId::from_bytes(bytes).to_string()
}

/// Encode a program name into the fixed 28-byte field.
///
/// Non-ASCII characters become `?`; longer names are truncated.
pub(crate) fn encode_name(name: &str) -> [u8; PROGRAM_NAME_LEN] {
    let mut field = [0u8; PROGRAM_NAME_LEN];
    for (slot, c) in field.iter_mut().zip(name.chars()) {
        *slot = if c.is_ascii() { c as u8 } else { b'?' };
    }
    field
}

/// Decode the 28-byte name field, stopping at the first NUL.
pub(crate) fn decode_name(field: &[u8; PROGRAM_NAME_LEN]) -> String {
    let end = field.iter().position(|&b| b == 0).unwrap_or(PROGRAM_NAME_LEN);
    String::from_utf8_lossy(&field[..end]).into_owned()
}

/// The shared 28-byte header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct Header {
    pub chunk_type: ChunkType,
    pub byte_size: i32,
    pub format_version: i32,
    pub unique_id: UniqueId,
    pub plugin_revision: i32,
    pub count: i32,
}

impl Header {
    /// Read and classify the header. Only the two magics are checked here.
    pub fn read<R: Read>(reader: &mut Reader<R>) -> Result<Self> {
        let magic = reader.fourcc()?;
        if magic != CHUNK_MAGIC {
            return Err(PresetError::BadMagic {
                found: fourcc(magic),
            });
        }
        let byte_size = reader.i32()?;
        let type_magic = reader.fourcc()?;
        let chunk_type =
            ChunkType::from_magic(type_magic).ok_or_else(|| PresetError::UnknownChunkType {
                found: fourcc(type_magic),
            })?;
        Ok(Self {
            chunk_type,
            byte_size,
            format_version: reader.i32()?,
            unique_id: UniqueId::from_bytes(reader.fourcc()?),
            plugin_revision: reader.i32()?,
            count: reader.i32()?,
        })
    }

    /// Check that this file can be applied to `session`.
    ///
    /// Order: file kind, format version, unique id, plugin revision, then
    /// opaque data against the plugin's chunk capability.
    pub fn check(
        &self,
        session: &PluginSession,
        expected: FileKind,
        options: &PersistOptions,
    ) -> Result<()> {
        let kind = self.chunk_type.kind();
        if kind != expected {
            return Err(PresetError::WrongFileKind {
                found: kind,
                expected,
            });
        }

        let max = expected.max_format_version();
        if self.format_version > max {
            return Err(PresetError::UnsupportedVersion {
                kind,
                found: self.format_version,
                max,
            });
        }

        let id = session.unique_id();
        if self.unique_id != id {
            return Err(PresetError::PluginMismatch {
                expected: id,
                found: self.unique_id,
                name: session.effect_name(),
            });
        }

        let plugin = session.plugin_version();
        if self.plugin_revision > plugin {
            if !options.skip_version_check {
                return Err(PresetError::RevisionTooNew {
                    file: self.plugin_revision,
                    plugin,
                });
            }
            tracing::warn!(
                "Ignoring plugin version: file {} is newer than plugin {}",
                self.plugin_revision,
                plugin
            );
        }

        if self.chunk_type.is_opaque() && !session.accepts_programs_as_chunks() {
            return Err(PresetError::OpaqueNotAccepted);
        }
        Ok(())
    }

    /// The count field as a length.
    pub fn count(&self, what: &'static str) -> Result<usize> {
        to_len(what, self.count)
    }
}

fn to_len(what: &'static str, value: i32) -> Result<usize> {
    usize::try_from(value).map_err(|_| PresetError::InvalidCount { what, value })
}

/// Reject values a session would refuse, before anything is assigned.
pub(crate) fn check_values(values: &[f32], parameters: usize) -> Result<()> {
    for (i, &value) in values.iter().enumerate() {
        if !(0.0..=1.0).contains(&value) {
            return Err(PresetError::ValueOutOfRange {
                index: i % parameters.max(1),
                value,
            });
        }
    }
    Ok(())
}

/// Big-endian field reader. Short input surfaces as `UnexpectedEof`.
pub(crate) struct Reader<R> {
    inner: R,
}

impl<R: Read> Reader<R> {
    pub fn new(inner: R) -> Self {
        Self { inner }
    }

    fn array<const N: usize>(&mut self) -> io::Result<[u8; N]> {
        let mut buf = [0u8; N];
        self.inner.read_exact(&mut buf)?;
        Ok(buf)
    }

    pub fn fourcc(&mut self) -> io::Result<[u8; 4]> {
        self.array()
    }

    pub fn i32(&mut self) -> io::Result<i32> {
        Ok(i32::from_be_bytes(self.array()?))
    }

    pub fn f32(&mut self) -> io::Result<f32> {
        Ok(f32::from_be_bytes(self.array()?))
    }

    pub fn name(&mut self) -> io::Result<String> {
        Ok(decode_name(&self.array()?))
    }

    pub fn skip(&mut self, len: usize) -> io::Result<()> {
        let skipped = io::copy(&mut (&mut self.inner).take(len as u64), &mut io::sink())?;
        if skipped < len as u64 {
            return Err(truncated(len as u64, skipped));
        }
        Ok(())
    }

    pub fn floats(&mut self, count: usize) -> io::Result<Vec<f32>> {
        (0..count).map(|_| self.f32()).collect()
    }

    /// Length-prefixed opaque blob.
    pub fn blob(&mut self) -> Result<Vec<u8>> {
        let len = to_len("chunk length", self.i32()?)?;
        let mut data = Vec::new();
        (&mut self.inner).take(len as u64).read_to_end(&mut data)?;
        if data.len() < len {
            return Err(truncated(len as u64, data.len() as u64).into());
        }
        Ok(data)
    }
}

fn truncated(expected: u64, found: u64) -> io::Error {
    io::Error::new(
        io::ErrorKind::UnexpectedEof,
        format!("file truncated: expected {} more bytes, found {}", expected, found),
    )
}

/// Big-endian field writer. `finish` fills in the byte-length field.
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub fn new(chunk_type: ChunkType) -> Self {
        let mut buf = Vec::with_capacity(BANK_HEADER_LEN);
        buf.extend_from_slice(&CHUNK_MAGIC);
        buf.extend_from_slice(&0i32.to_be_bytes());
        buf.extend_from_slice(&chunk_type.magic());
        Self { buf }
    }

    pub fn fourcc(&mut self, bytes: [u8; 4]) {
        self.buf.extend_from_slice(&bytes);
    }

    pub fn i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    /// A count or index field.
    pub fn count(&mut self, what: &str, value: usize) -> io::Result<()> {
        let value = i32::try_from(value).map_err(|_| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("{} {} does not fit the file format", what, value),
            )
        })?;
        self.i32(value);
        Ok(())
    }

    pub fn f32(&mut self, value: f32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn name(&mut self, name: &str) {
        self.buf.extend_from_slice(&encode_name(name));
    }

    pub fn zeros(&mut self, len: usize) {
        self.buf.resize(self.buf.len() + len, 0);
    }

    pub fn blob(&mut self, data: &[u8]) -> io::Result<()> {
        self.count("chunk length", data.len())?;
        self.buf.extend_from_slice(data);
        Ok(())
    }

    pub fn finish(mut self) -> io::Result<Vec<u8>> {
        let remainder = i32::try_from(self.buf.len() - 8).map_err(|_| {
            io::Error::new(io::ErrorKind::InvalidInput, "file larger than 2 GiB")
        })?;
        self.buf[4..8].copy_from_slice(&remainder.to_be_bytes());
        Ok(self.buf)
    }
}

/// Open an existing regular file for reading.
pub(crate) fn open_file(path: &Path) -> io::Result<BufReader<File>> {
    let meta = fs::metadata(path)?;
    if !meta.is_file() {
        return Err(io::Error::new(
            io::ErrorKind::NotFound,
            format!("{} is not a file", path.display()),
        ));
    }
    Ok(BufReader::new(File::open(path)?))
}

/// Write a complete file. Directories are refused.
pub(crate) fn write_file(path: &Path, bytes: &[u8]) -> io::Result<()> {
    if path.is_dir() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("{} is a directory", path.display()),
        ));
    }
    fs::write(path, bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_chunk_type_magics() {
        for kind in [FileKind::Preset, FileKind::Bank] {
            for opaque in [false, true] {
                let ty = ChunkType::new(kind, opaque);
                assert_eq!(ChunkType::from_magic(ty.magic()), Some(ty));
                assert_eq!(ty.kind(), kind);
                assert_eq!(ty.is_opaque(), opaque);
            }
        }
        assert_eq!(ChunkType::from_magic(*b"RIFF"), None);
    }

    #[test]
    fn test_encode_name_pads_and_truncates() {
        let field = encode_name("Init");
        assert_eq!(&field[..4], b"Init");
        assert!(field[4..].iter().all(|&b| b == 0));

        let long = "A very long program name that does not fit";
        let field = encode_name(long);
        assert_eq!(&field[..], &long.as_bytes()[..PROGRAM_NAME_LEN]);
        assert_eq!(decode_name(&field).len(), PROGRAM_NAME_LEN);

        assert_eq!(decode_name(&encode_name("Brass\u{e9}")), "Brass?");
    }

    #[test]
    fn test_writer_fills_byte_size() {
        let mut w = Writer::new(ChunkType::OpaquePreset);
        w.i32(1);
        w.blob(&[1, 2, 3]).unwrap();
        let bytes = w.finish().unwrap();
        assert_eq!(bytes.len(), 12 + 4 + 4 + 3);
        assert_eq!(&bytes[0..4], b"CcnK");
        assert_eq!(i32::from_be_bytes(bytes[4..8].try_into().unwrap()), 15);
        assert_eq!(&bytes[8..12], b"FPCh");
    }

    #[test]
    fn test_header_rejects_bad_magic() {
        let mut reader = Reader::new(&b"RIFF\0\0\0\0WAVE"[..]);
        match Header::read(&mut reader) {
            Err(PresetError::BadMagic { found }) => assert_eq!(found, "RIFF"),
            other => panic!("expected BadMagic, got {:?}", other),
        }
    }

    #[test]
    fn test_header_rejects_unknown_chunk_type() {
        let mut reader = Reader::new(&b"CcnK\0\0\0\x10Fxxx"[..]);
        assert!(matches!(
            Header::read(&mut reader),
            Err(PresetError::UnknownChunkType { .. })
        ));
    }

    #[test]
    fn test_reader_reports_truncation() {
        let mut reader = Reader::new(&[0u8, 0, 0, 8, 1, 2][..]);
        let err = reader.blob().unwrap_err();
        match err {
            PresetError::Io(e) => assert_eq!(e.kind(), io::ErrorKind::UnexpectedEof),
            other => panic!("expected Io, got {:?}", other),
        }

        let mut reader = Reader::new(&[0u8; 10][..]);
        assert!(reader.skip(BANK_RESERVED_LEN).is_err());
    }

    #[test]
    fn test_negative_blob_length() {
        let bytes = (-1i32).to_be_bytes();
        let mut reader = Reader::new(&bytes[..]);
        assert!(matches!(
            reader.blob(),
            Err(PresetError::InvalidCount { value: -1, .. })
        ));
    }

    #[test]
    fn test_check_values() {
        assert!(check_values(&[0.0, 0.5, 1.0], 3).is_ok());
        match check_values(&[0.0, 0.5, 0.2, 1.5], 2) {
            Err(PresetError::ValueOutOfRange { index, value }) => {
                assert_eq!(index, 1);
                assert_eq!(value, 1.5);
            }
            other => panic!("expected ValueOutOfRange, got {:?}", other),
        }
        assert!(check_values(&[f32::NAN], 1).is_err());
    }

    #[test]
    fn test_open_file_rejects_directory() {
        let dir = tempfile::tempdir().unwrap();
        let err = open_file(dir.path()).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        let err = open_file(&dir.path().join("missing.fxp")).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);

        assert!(write_file(dir.path(), b"data").is_err());
    }
}
