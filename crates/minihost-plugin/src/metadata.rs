//! Plugin metadata reported by a native plugin at load time.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Four-character plugin identifier, e.g. `"Tsyn"`.
///
/// Stored as the big-endian bytes of the plugin's 32-bit `uniqueID`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UniqueId([u8; 4]);

impl UniqueId {
    pub const fn from_bytes(bytes: [u8; 4]) -> Self {
        Self(bytes)
    }

    pub const fn from_i32(id: i32) -> Self {
        Self(id.to_be_bytes())
    }

    pub const fn as_bytes(&self) -> [u8; 4] {
        self.0
    }

    pub const fn as_i32(&self) -> i32 {
        i32::from_be_bytes(self.0)
    }
}

impl std::fmt::Display for UniqueId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for &b in &self.0 {
            let c = if b.is_ascii_graphic() || b == b' ' {
                b as char
            } else {
                '?'
            };
            write!(f, "{}", c)?;
        }
        Ok(())
    }
}

impl FromStr for UniqueId {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes: [u8; 4] = s
            .as_bytes()
            .try_into()
            .map_err(|_| format!("unique id must be 4 ASCII characters, got {:?}", s))?;
        Ok(Self(bytes))
    }
}

/// Audio I/O configuration
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AudioIO {
    pub inputs: usize,
    pub outputs: usize,
}

impl AudioIO {
    pub fn stereo() -> Self {
        Self {
            inputs: 2,
            outputs: 2,
        }
    }
}

/// Static description of a loaded plugin.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PluginInfo {
    pub unique_id: UniqueId,

    /// Effect name (`effGetEffectName`)
    pub name: String,

    pub vendor: String,

    /// Product string (`effGetProductString`)
    pub product: String,

    /// Plugin revision (`AEffect::version`), compared against preset files
    pub revision: i32,

    /// Raw protocol version number, see [`crate::VstVersion::from_number`]
    pub vst_version: i32,

    pub audio_io: AudioIO,

    pub num_parameters: usize,

    pub num_programs: usize,

    /// Latency in samples
    pub initial_delay: usize,

    pub is_synth: bool,

    pub has_editor: bool,

    /// Programs are persisted as an opaque chunk instead of parameter floats
    pub programs_are_chunks: bool,

    pub can_replacing: bool,

    #[serde(default)]
    pub can_double_replacing: bool,
}

impl PluginInfo {
    pub fn new(unique_id: UniqueId, name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            unique_id,
            product: name.clone(),
            name,
            vendor: String::new(),
            revision: 1,
            vst_version: 2400,
            audio_io: AudioIO::stereo(),
            num_parameters: 0,
            num_programs: 1,
            initial_delay: 0,
            is_synth: false,
            has_editor: false,
            programs_are_chunks: false,
            can_replacing: true,
            can_double_replacing: false,
        }
    }

    pub fn vendor(mut self, vendor: impl Into<String>) -> Self {
        self.vendor = vendor.into();
        self
    }

    pub fn product(mut self, product: impl Into<String>) -> Self {
        self.product = product.into();
        self
    }

    pub fn revision(mut self, revision: i32) -> Self {
        self.revision = revision;
        self
    }

    pub fn vst_version(mut self, number: i32) -> Self {
        self.vst_version = number;
        self
    }

    pub fn audio_io(mut self, inputs: usize, outputs: usize) -> Self {
        self.audio_io = AudioIO { inputs, outputs };
        self
    }

    pub fn parameters(mut self, count: usize) -> Self {
        self.num_parameters = count;
        self
    }

    pub fn programs(mut self, count: usize) -> Self {
        self.num_programs = count;
        self
    }

    pub fn latency(mut self, samples: usize) -> Self {
        self.initial_delay = samples;
        self
    }

    pub fn synth(mut self, is_synth: bool) -> Self {
        self.is_synth = is_synth;
        self
    }

    pub fn editor(mut self, has_editor: bool) -> Self {
        self.has_editor = has_editor;
        self
    }

    pub fn chunks(mut self, programs_are_chunks: bool) -> Self {
        self.programs_are_chunks = programs_are_chunks;
        self
    }

    pub fn replacing(mut self, can_replacing: bool) -> Self {
        self.can_replacing = can_replacing;
        self
    }

    pub fn f64_support(mut self, can_double_replacing: bool) -> Self {
        self.can_double_replacing = can_double_replacing;
        self
    }
}

/// Live I/O counts. Cached by the session and refreshed on `ioChanged`.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IoCounts {
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub num_parameters: usize,
    pub num_programs: usize,
    pub initial_delay: usize,
}

impl From<&PluginInfo> for IoCounts {
    fn from(info: &PluginInfo) -> Self {
        Self {
            num_inputs: info.audio_io.inputs,
            num_outputs: info.audio_io.outputs,
            num_parameters: info.num_parameters,
            num_programs: info.num_programs,
            initial_delay: info.initial_delay,
        }
    }
}

/// Which state a chunk call refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChunkKind {
    Bank,
    Program,
}

/// Standard `canDo` capability strings.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanDo {
    SendVstEvents,
    SendVstMidiEvent,
    ReceiveVstEvents,
    ReceiveVstMidiEvent,
    ReceiveVstTimeInfo,
    Offline,
    MidiProgramNames,
    Bypass,
}

impl CanDo {
    pub const ALL: [CanDo; 8] = [
        CanDo::SendVstEvents,
        CanDo::SendVstMidiEvent,
        CanDo::ReceiveVstEvents,
        CanDo::ReceiveVstMidiEvent,
        CanDo::ReceiveVstTimeInfo,
        CanDo::Offline,
        CanDo::MidiProgramNames,
        CanDo::Bypass,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            CanDo::SendVstEvents => "sendVstEvents",
            CanDo::SendVstMidiEvent => "sendVstMidiEvent",
            CanDo::ReceiveVstEvents => "receiveVstEvents",
            CanDo::ReceiveVstMidiEvent => "receiveVstMidiEvent",
            CanDo::ReceiveVstTimeInfo => "receiveVstTimeInfo",
            CanDo::Offline => "offline",
            CanDo::MidiProgramNames => "midiProgramNames",
            CanDo::Bypass => "bypass",
        }
    }
}

impl std::fmt::Display for CanDo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Answer to a [`CanDo`] query.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Support {
    Yes,
    No,
    Maybe,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PinDirection {
    Input,
    Output,
}

/// Properties of one plugin input or output pin.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PinProperties {
    pub index: usize,
    pub label: String,
    pub short_label: String,
    pub is_active: bool,
    pub is_first_in_stereo_pair: bool,
}

/// Host timing information handed to the plugin on request.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TimeInfo {
    pub sample_rate: f32,
    pub tempo: f64,
    pub time_sig_numerator: u32,
    pub time_sig_denominator: u32,
}

impl Default for TimeInfo {
    fn default() -> Self {
        Self {
            sample_rate: 44100.0,
            tempo: 120.0,
            time_sig_numerator: 4,
            time_sig_denominator: 4,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_id_big_endian() {
        let id = UniqueId::from_i32(0x5473_796E);
        assert_eq!(&id.as_bytes(), b"Tsyn");
        assert_eq!(id.to_string(), "Tsyn");
        assert_eq!(id.as_i32(), 0x5473_796E);
        assert_eq!("Tsyn".parse::<UniqueId>().unwrap(), id);
    }

    #[test]
    fn test_unique_id_non_ascii_display() {
        let id = UniqueId::from_bytes([b'A', 0, 0xFF, b'z']);
        assert_eq!(id.to_string(), "A??z");
        assert!("toolong".parse::<UniqueId>().is_err());
    }

    #[test]
    fn test_info_builder() {
        let info = PluginInfo::new(UniqueId::from_bytes(*b"Gain"), "Gain")
            .vendor("TestCo")
            .audio_io(1, 2)
            .parameters(3)
            .programs(4)
            .chunks(true);

        assert_eq!(info.product, "Gain");
        assert_eq!(info.vendor, "TestCo");
        assert!(info.programs_are_chunks);

        let counts = IoCounts::from(&info);
        assert_eq!(counts.num_inputs, 1);
        assert_eq!(counts.num_outputs, 2);
        assert_eq!(counts.num_parameters, 3);
        assert_eq!(counts.num_programs, 4);
    }

    #[test]
    fn test_info_serde_default_f64() {
        let info = PluginInfo::new(UniqueId::from_bytes(*b"Old!"), "Old").f64_support(true);
        let mut json: serde_json::Value = serde_json::to_value(&info).unwrap();
        json.as_object_mut().unwrap().remove("can_double_replacing");

        let decoded: PluginInfo = serde_json::from_value(json).unwrap();
        assert!(!decoded.can_double_replacing);
        assert_eq!(decoded.name, "Old");
    }

    #[test]
    fn test_can_do_strings() {
        assert_eq!(CanDo::ReceiveVstMidiEvent.to_string(), "receiveVstMidiEvent");
        assert_eq!(CanDo::ALL.len(), 8);
    }
}
