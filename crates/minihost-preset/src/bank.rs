//! Program banks (`.fxb`)

use crate::error::{PresetError, Result};
use crate::format::{
    check_values, open_file, write_file, ChunkType, FileKind, Header, Reader, Writer,
    BANK_FORMAT_VERSION, BANK_RESERVED_LEN,
};
use crate::options::PersistOptions;
use minihost_plugin::PluginSession;
use std::io::{Read, Write};
use std::path::Path;

/// Reads and writes every program of a session as an `.fxb` file.
///
/// Regular banks are written by switching to each program in turn; the
/// session's current program is restored afterwards, for both save and load.
#[derive(Debug, Clone, Copy, Default)]
pub struct BankCodec {
    options: PersistOptions,
}

impl BankCodec {
    pub fn new(options: PersistOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &PersistOptions {
        &self.options
    }

    pub fn encode(&self, session: &PluginSession) -> Result<Vec<u8>> {
        session.exclusive(|s| -> Result<Vec<u8>> {
            let opaque = s.accepts_programs_as_chunks();
            let programs = s.num_programs();

            let mut w = Writer::new(ChunkType::new(FileKind::Bank, opaque));
            w.i32(BANK_FORMAT_VERSION);
            w.fourcc(s.unique_id().as_bytes());
            w.i32(s.plugin_version());
            w.count("program count", programs)?;
            w.count("current program", s.program()?)?;
            w.zeros(BANK_RESERVED_LEN);

            if opaque {
                w.blob(&s.bank_chunk()?)?;
            } else {
                let parameters = s.num_parameters();
                with_program_restored(s, || {
                    for program in 0..programs {
                        s.set_program(program)?;
                        for index in 0..parameters {
                            w.f32(s.get_parameter(index)?);
                        }
                    }
                    Ok(())
                })?;
            }
            Ok(w.finish()?)
        })
    }

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
        tracing::debug!("Saved bank {} ({} bytes)", path.display(), bytes.len());
        Ok(())
    }

    /// Load a bank. Validation happens before any program is touched.
    ///
    /// Regular banks assign programs `0..count` in order; the current program
    /// is left as it was before the load.
    pub fn load<R: Read>(&self, session: &PluginSession, source: R) -> Result<()> {
        session.exclusive(|s| -> Result<()> {
            let mut reader = Reader::new(source);
            let header = Header::read(&mut reader)?;
            header.check(s, FileKind::Bank, &self.options)?;

            let count = header.count("program count")?;
            let plugin = s.num_programs();
            if count > plugin {
                return Err(PresetError::ProgramCountMismatch {
                    file: count,
                    plugin,
                });
            }
            let file_current = reader.i32()?;
            reader.skip(BANK_RESERVED_LEN)?;

            if header.chunk_type.is_opaque() {
                let chunk = reader.blob()?;
                tracing::debug!("Loading opaque bank ({} bytes)", chunk.len());
                s.set_bank_chunk(&chunk)?;
                return Ok(());
            }

            let parameters = s.num_parameters();
            let values = reader.floats(count * parameters)?;
            check_values(&values, parameters)?;
            tracing::debug!(
                "Loading bank: {} programs x {} parameters (file current program {})",
                count,
                parameters,
                file_current
            );
            if parameters == 0 {
                return Ok(());
            }
            with_program_restored(s, || {
                for (program, values) in values.chunks(parameters).enumerate() {
                    s.set_program(program)?;
                    for (index, &value) in values.iter().enumerate() {
                        s.set_parameter(index, value)?;
                    }
                }
                Ok(())
            })
        })
    }

    pub fn load_from_path(&self, session: &PluginSession, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let file = open_file(path)?;
        self.load(session, file)?;
        tracing::debug!("Loaded bank {}", path.display());
        Ok(())
    }
}

/// Run `f`, then switch back to the program that was current before it,
/// even if `f` failed. The first error wins.
///
/// A plugin without programs has nothing to switch between, so `f` just runs.
fn with_program_restored<T>(
    session: &PluginSession,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    if session.num_programs() == 0 {
        return f();
    }
    let original = session.program()?;
    let result = f();
    let restored = session.set_program(original);
    let value = result?;
    restored?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::format::BANK_HEADER_LEN;
    use minihost_plugin::mock::{MockLoader, MockProbe, MockSpec};
    use minihost_plugin::{ErrorKind, SessionConfig};

    fn session_with(spec: MockSpec) -> (PluginSession, MockProbe) {
        let loader = MockLoader::new(spec);
        let probe = loader.probe();
        let session = PluginSession::open(loader, SessionConfig::default()).unwrap();
        (session, probe)
    }

    fn regular_bank() -> (PluginSession, MockProbe) {
        session_with(
            MockSpec::new("Tsyn", "TestSynth")
                .with_parameters(&[0.5, 0.5])
                .with_programs(&["Lead", "Pad", "Bass"]),
        )
    }

    fn be_i32(bytes: &[u8], offset: usize) -> i32 {
        i32::from_be_bytes(bytes[offset..offset + 4].try_into().unwrap())
    }

    /// Give every program distinct values: program p, parameter i = (p * 2 + i) / 10
    fn fill_programs(session: &PluginSession) {
        for p in 0..session.num_programs() {
            session.set_program(p).unwrap();
            for i in 0..session.num_parameters() {
                session
                    .set_parameter(i, (p * 2 + i) as f32 / 10.0)
                    .unwrap();
            }
        }
    }

    #[test]
    fn test_regular_bank_layout() {
        let (session, _probe) = regular_bank();
        fill_programs(&session);
        session.set_program(1).unwrap();

        let bytes = BankCodec::default().encode(&session).unwrap();

        assert_eq!(bytes.len(), BANK_HEADER_LEN + 3 * 2 * 4);
        assert_eq!(&bytes[0..4], b"CcnK");
        assert_eq!(be_i32(&bytes, 4) as usize, bytes.len() - 8);
        assert_eq!(&bytes[8..12], b"FxBk");
        assert_eq!(be_i32(&bytes, 12), 2);
        assert_eq!(&bytes[16..20], b"Tsyn");
        assert_eq!(be_i32(&bytes, 24), 3);
        assert_eq!(be_i32(&bytes, 28), 1);
        assert!(bytes[32..156].iter().all(|&b| b == 0));

        // program 2, parameter 1
        let last = f32::from_be_bytes(bytes[bytes.len() - 4..].try_into().unwrap());
        assert_eq!(last, 0.5);

        // saving switched programs, then switched back
        assert_eq!(session.program().unwrap(), 1);

        session.close().unwrap();
    }

    #[test]
    fn test_regular_bank_round_trip() {
        let (session, probe) = regular_bank();
        fill_programs(&session);
        let bytes = BankCodec::default().encode(&session).unwrap();

        session.reset().unwrap();
        session.set_program(2).unwrap();
        BankCodec::default().load(&session, &bytes[..]).unwrap();

        assert_eq!(session.program().unwrap(), 2);
        assert_eq!(probe.program_values(0), Some(vec![0.0, 0.1]));
        assert_eq!(probe.program_values(1), Some(vec![0.2, 0.3]));
        assert_eq!(probe.program_values(2), Some(vec![0.4, 0.5]));

        session.close().unwrap();
    }

    #[test]
    fn test_opaque_bank_round_trip() {
        let (session, probe) = session_with(
            MockSpec::new("Tsyn", "TestSynth")
                .with_parameters(&[0.5])
                .with_programs(&["A", "B"])
                .map_info(|info| info.chunks(true)),
        );
        session.set_program(1).unwrap();
        session.set_parameter(0, 0.9).unwrap();
        let bytes = BankCodec::default().encode(&session).unwrap();
        assert_eq!(&bytes[8..12], b"FBCh");

        session.reset().unwrap();
        probe.clear_calls();
        BankCodec::default().load(&session, &bytes[..]).unwrap();

        assert_eq!(probe.count("set_chunk Bank"), 1);
        assert_eq!(probe.count("set_program "), 0);
        assert_eq!(probe.program_values(1), Some(vec![0.9]));

        session.close().unwrap();
    }

    #[test]
    fn test_plugin_without_programs() {
        let (session, plugin) = session_with(
            MockSpec::new("Tsyn", "TestSynth")
                .with_parameters(&[0.5])
                .with_programs(&[]),
        );
        assert_eq!(session.num_programs(), 0);

        let bytes = BankCodec::default().encode(&session).unwrap();
        assert_eq!(bytes.len(), BANK_HEADER_LEN);
        assert_eq!(be_i32(&bytes, 24), 0);

        BankCodec::default().load(&session, &bytes[..]).unwrap();
        assert_eq!(plugin.count("set_program"), 0);

        session.close().unwrap();
    }

    #[test]
    fn test_preset_file_is_not_a_bank() {
        let (session, plugin) = regular_bank();
        let preset = crate::PresetCodec::default().encode(&session).unwrap();

        plugin.clear_calls();
        let err = BankCodec::default().load(&session, &preset[..]).unwrap_err();
        assert!(matches!(
            err,
            PresetError::WrongFileKind {
                found: FileKind::Preset,
                expected: FileKind::Bank
            }
        ));
        assert_eq!(plugin.count("set_"), 0);

        session.close().unwrap();
    }

    #[test]
    fn test_bank_version_limit() {
        let (session, _probe) = regular_bank();
        let mut bytes = BankCodec::default().encode(&session).unwrap();
        bytes[12..16].copy_from_slice(&3i32.to_be_bytes());

        let err = BankCodec::default().load(&session, &bytes[..]).unwrap_err();
        assert!(matches!(
            err,
            PresetError::UnsupportedVersion {
                found: 3,
                max: 2,
                ..
            }
        ));
        assert_eq!(err.kind(), ErrorKind::Validation);

        session.close().unwrap();
    }

    #[test]
    fn test_too_many_programs() {
        let (source, _) = regular_bank();
        let bytes = BankCodec::default().encode(&source).unwrap();
        source.close().unwrap();

        let (target, plugin) = session_with(
            MockSpec::new("Tsyn", "TestSynth")
                .with_parameters(&[0.5, 0.5])
                .with_programs(&["Only"]),
        );
        plugin.clear_calls();
        let err = BankCodec::default().load(&target, &bytes[..]).unwrap_err();
        assert!(matches!(
            err,
            PresetError::ProgramCountMismatch { file: 3, plugin: 1 }
        ));
        assert_eq!(plugin.count("set_"), 0);

        target.close().unwrap();
    }

    #[test]
    fn test_truncated_bank_changes_nothing() {
        let (session, plugin) = regular_bank();
        let bytes = BankCodec::default().encode(&session).unwrap();

        plugin.clear_calls();
        let err = BankCodec::default()
            .load(&session, &bytes[..bytes.len() - 4])
            .unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Io);
        assert_eq!(plugin.count("set_"), 0);

        session.close().unwrap();
    }

    #[test]
    fn test_bank_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("factory.fxb");
        let (session, plugin) = regular_bank();
        fill_programs(&session);

        let codec = BankCodec::default();
        codec.save_to_path(&session, &path).unwrap();
        session.reset().unwrap();
        codec.load_from_path(&session, &path).unwrap();

        assert_eq!(plugin.program_values(2), Some(vec![0.4, 0.5]));
        assert_eq!(session.program().unwrap(), 0);

        session.close().unwrap();
    }
}
