//! Deterministic in-memory plugin for tests and demos.
//!
//! [`MockLoader`] hands out [`NativePlugin`] instances backed by shared state
//! that a [`MockProbe`] can inspect and drive: the call log shows exactly which
//! native calls a session made, and the probe can act as the plugin (automate,
//! ioChanged, closing its own editor window) from any thread.

use crate::callback::HostCallback;
use crate::editor::EditorSignal;
use crate::error::{HostError, LoadStage, Result};
use crate::metadata::{
    CanDo, ChunkKind, PinDirection, PinProperties, PluginInfo, Support, TimeInfo, UniqueId,
};
use crate::midi::{MidiCommand, MidiEvent};
use crate::native::{NativeEditor, NativeLoader, NativePlugin};
use parking_lot::Mutex;
use std::sync::Arc;

/// What a mock plugin looks like.
#[derive(Clone, Debug)]
pub struct MockSpec {
    pub info: PluginInfo,
    pub defaults: Vec<f32>,
    pub program_names: Vec<String>,
    pub capabilities: Vec<CanDo>,
    /// The editor ignores close requests until its window is closed by the probe.
    pub stubborn_editor: bool,
    pub tail_size: usize,
    /// Parameters the plugin refuses to have automated.
    pub fixed_parameters: Vec<usize>,
    pub silent_in_stop: bool,
}

impl MockSpec {
    pub fn new(unique_id: &str, name: &str) -> Self {
        let id = unique_id
            .parse::<UniqueId>()
            .unwrap_or_else(|_| UniqueId::from_bytes(*b"Mock"));
        Self {
            info: PluginInfo::new(id, name).vendor("minihost"),
            defaults: Vec::new(),
            program_names: vec!["Default".to_string()],
            capabilities: vec![
                CanDo::ReceiveVstEvents,
                CanDo::ReceiveVstMidiEvent,
                CanDo::ReceiveVstTimeInfo,
                CanDo::Bypass,
            ],
            stubborn_editor: false,
            tail_size: 0,
            fixed_parameters: Vec::new(),
            silent_in_stop: false,
        }
    }

    /// Parameter count and the initial value of each parameter in every program.
    pub fn with_parameters(mut self, defaults: &[f32]) -> Self {
        self.defaults = defaults.to_vec();
        self.info.num_parameters = defaults.len();
        self
    }

    pub fn with_programs(mut self, names: &[&str]) -> Self {
        self.program_names = names.iter().map(|n| n.to_string()).collect();
        self.info.num_programs = names.len();
        self
    }

    /// Adjusts the reported [`PluginInfo`] with its builder methods.
    pub fn map_info(mut self, f: impl FnOnce(PluginInfo) -> PluginInfo) -> Self {
        self.info = f(self.info);
        self
    }

    pub fn stubborn_editor(mut self) -> Self {
        self.stubborn_editor = true;
        self
    }

    pub fn with_tail_size(mut self, samples: usize) -> Self {
        self.tail_size = samples;
        self
    }

    pub fn with_fixed_parameters(mut self, indices: &[usize]) -> Self {
        self.fixed_parameters = indices.to_vec();
        self
    }

    pub fn silent_in_stop(mut self) -> Self {
        self.silent_in_stop = true;
        self
    }
}

#[derive(Clone, Debug, PartialEq)]
struct MockProgram {
    name: String,
    values: Vec<f32>,
}

#[derive(Default)]
struct MockState {
    calls: Vec<String>,
    programs: Vec<MockProgram>,
    current: usize,
    io: (usize, usize),
    sample_rate: f32,
    block_size: usize,
    time: TimeInfo,
    bypassed: bool,
    host: Option<HostCallback>,
    loads: usize,
    releases: usize,
    fail_loads: bool,
    midi_batches: Vec<Vec<MidiEvent>>,
    notes: Vec<u8>,
    frame_counter: u64,
    editor_window: Option<Arc<EditorSignal>>,
}

impl MockState {
    fn log(&mut self, call: impl Into<String>) {
        self.calls.push(call.into());
    }

    fn current(&self) -> Option<&MockProgram> {
        self.programs.get(self.current)
    }

    fn current_mut(&mut self) -> Option<&mut MockProgram> {
        self.programs.get_mut(self.current)
    }
}

/// Loader for mock plugins. Every load produces a fresh instance of the spec.
pub struct MockLoader {
    spec: MockSpec,
    state: Arc<Mutex<MockState>>,
}

impl MockLoader {
    pub fn new(spec: MockSpec) -> Arc<Self> {
        Arc::new(Self {
            spec,
            state: Arc::new(Mutex::new(MockState::default())),
        })
    }

    pub fn probe(&self) -> MockProbe {
        MockProbe {
            state: Arc::clone(&self.state),
        }
    }
}

impl NativeLoader for MockLoader {
    fn source(&self) -> String {
        format!("mock:{}", self.spec.info.name)
    }

    fn load(&self, host: HostCallback) -> Result<Box<dyn NativePlugin>> {
        let mut state = self.state.lock();
        state.log("load");
        if state.fail_loads {
            return Err(HostError::native(
                LoadStage::Instantiation,
                "mock configured to fail",
            ));
        }
        state.loads += 1;
        state.programs = self
            .spec
            .program_names
            .iter()
            .map(|name| MockProgram {
                name: name.clone(),
                values: self.spec.defaults.clone(),
            })
            .collect();
        state.current = 0;
        state.io = (self.spec.info.audio_io.inputs, self.spec.info.audio_io.outputs);
        state.bypassed = false;
        state.notes.clear();
        state.frame_counter = 0;
        state.host = Some(host);
        Ok(Box::new(MockPlugin {
            spec: self.spec.clone(),
            state: Arc::clone(&self.state),
        }))
    }
}

/// Test-side view of the mock plugin's state.
#[derive(Clone)]
pub struct MockProbe {
    state: Arc<Mutex<MockState>>,
}

impl MockProbe {
    pub fn calls(&self) -> Vec<String> {
        self.state.lock().calls.clone()
    }

    /// Number of logged calls whose name starts with `prefix`.
    pub fn count(&self, prefix: &str) -> usize {
        self.state
            .lock()
            .calls
            .iter()
            .filter(|c| c.starts_with(prefix))
            .count()
    }

    pub fn clear_calls(&self) {
        self.state.lock().calls.clear();
    }

    pub fn loads(&self) -> usize {
        self.state.lock().loads
    }

    pub fn releases(&self) -> usize {
        self.state.lock().releases
    }

    /// Makes every following load fail until reset to `false`.
    pub fn set_fail_loads(&self, fail: bool) {
        self.state.lock().fail_loads = fail;
    }

    pub fn sample_rate(&self) -> f32 {
        self.state.lock().sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.state.lock().block_size
    }

    pub fn time_info(&self) -> TimeInfo {
        self.state.lock().time
    }

    pub fn is_bypassed(&self) -> bool {
        self.state.lock().bypassed
    }

    pub fn current_program(&self) -> usize {
        self.state.lock().current
    }

    pub fn program_values(&self, program: usize) -> Option<Vec<f32>> {
        self.state
            .lock()
            .programs
            .get(program)
            .map(|p| p.values.clone())
    }

    pub fn midi_batches(&self) -> Vec<Vec<MidiEvent>> {
        self.state.lock().midi_batches.clone()
    }

    pub fn host(&self) -> Option<HostCallback> {
        self.state.lock().host.clone()
    }

    /// Acts as the plugin changing a parameter from its own UI.
    pub fn automate(&self, index: usize, value: f32) {
        let host = {
            let mut state = self.state.lock();
            if let Some(v) = state.current_mut().and_then(|p| p.values.get_mut(index)) {
                *v = value;
            }
            state.host.clone()
        };
        if let Some(host) = host {
            host.automate(index, value);
        }
    }

    /// Changes the I/O layout and reports it to the host.
    pub fn change_io(&self, inputs: usize, outputs: usize) {
        let host = {
            let mut state = self.state.lock();
            state.io = (inputs, outputs);
            state.host.clone()
        };
        if let Some(host) = host {
            host.io_changed();
        }
    }

    pub fn begin_edit(&self, index: usize) {
        if let Some(host) = self.host() {
            host.begin_edit(index);
        }
    }

    pub fn end_edit(&self, index: usize) {
        if let Some(host) = self.host() {
            host.end_edit(index);
        }
    }

    pub fn send_midi(&self, event: MidiEvent) {
        if let Some(host) = self.host() {
            host.midi_out(event);
        }
    }

    pub fn is_editor_window_open(&self) -> bool {
        self.state
            .lock()
            .editor_window
            .as_ref()
            .is_some_and(|w| !w.is_closed())
    }

    /// Acts as the user closing the editor window.
    pub fn close_editor_window(&self) {
        let window = self.state.lock().editor_window.clone();
        if let Some(window) = window {
            window.notify_closed();
        }
    }
}

/// A mock plugin instance.
pub struct MockPlugin {
    spec: MockSpec,
    state: Arc<Mutex<MockState>>,
}

trait Sample: Copy {
    fn to_f64(self) -> f64;
    fn from_f64(value: f64) -> Self;
}

impl Sample for f32 {
    fn to_f64(self) -> f64 {
        self as f64
    }

    fn from_f64(value: f64) -> Self {
        value as f32
    }
}

impl Sample for f64 {
    fn to_f64(self) -> f64 {
        self
    }

    fn from_f64(value: f64) -> Self {
        value
    }
}

impl MockPlugin {
    /// Input passthrough scaled by parameter 0, plus a quiet sine per held note.
    fn render<T: Sample>(
        &self,
        call: &str,
        events: &[MidiEvent],
        inputs: &[&[T]],
        outputs: &mut [&mut [T]],
        frames: usize,
        accumulate: bool,
    ) {
        let mut state = self.state.lock();
        state.log(format!("{} {}", call, frames));
        state.midi_batches.push(events.to_vec());
        for event in events {
            match event.command {
                MidiCommand::NoteOn if event.data2 > 0 => {
                    if !state.notes.contains(&event.data1) {
                        state.notes.push(event.data1);
                    }
                }
                MidiCommand::NoteOn | MidiCommand::NoteOff => {
                    state.notes.retain(|&n| n != event.data1);
                }
                _ => {}
            }
        }
        if state.bypassed {
            for (ch, out) in outputs.iter_mut().enumerate() {
                for frame in 0..frames {
                    let sample = inputs.get(ch).map_or(0.0, |i| i[frame].to_f64());
                    out[frame] = T::from_f64(sample);
                }
            }
            return;
        }

        let gain = state
            .current()
            .and_then(|p| p.values.first().copied())
            .unwrap_or(1.0) as f64;
        let sample_rate = state.sample_rate.max(1.0) as f64;
        let start = state.frame_counter;
        for frame in 0..frames {
            let t = (start + frame as u64) as f64 / sample_rate;
            let tone: f64 = state
                .notes
                .iter()
                .map(|&note| {
                    let freq = 440.0 * 2f64.powf((note as f64 - 69.0) / 12.0);
                    (2.0 * std::f64::consts::PI * freq * t).sin() * 0.1
                })
                .sum();
            for (ch, out) in outputs.iter_mut().enumerate() {
                let input = if inputs.is_empty() {
                    0.0
                } else {
                    inputs[ch % inputs.len()][frame].to_f64()
                };
                let sample = input * gain + tone;
                out[frame] = if accumulate {
                    T::from_f64(out[frame].to_f64() + sample)
                } else {
                    T::from_f64(sample)
                };
            }
        }
        state.frame_counter += frames as u64;
    }
}

fn encode_program(program: &MockProgram) -> Vec<u8> {
    let name = program.name.as_bytes();
    let mut out = Vec::with_capacity(2 + name.len() + program.values.len() * 4);
    out.push(name.len().min(255) as u8);
    out.extend_from_slice(&name[..name.len().min(255)]);
    out.push(program.values.len().min(255) as u8);
    for v in program.values.iter().take(255) {
        out.extend_from_slice(&v.to_le_bytes());
    }
    out
}

fn decode_program(data: &[u8]) -> Option<(MockProgram, usize)> {
    let name_len = *data.first()? as usize;
    let name = String::from_utf8_lossy(data.get(1..1 + name_len)?).into_owned();
    let mut pos = 1 + name_len;
    let count = *data.get(pos)? as usize;
    pos += 1;
    let mut values = Vec::with_capacity(count);
    for _ in 0..count {
        let bytes: [u8; 4] = data.get(pos..pos + 4)?.try_into().ok()?;
        values.push(f32::from_le_bytes(bytes));
        pos += 4;
    }
    Some((MockProgram { name, values }, pos))
}

impl NativePlugin for MockPlugin {
    fn info(&self) -> PluginInfo {
        let state = self.state.lock();
        let mut info = self.spec.info.clone();
        info.audio_io.inputs = state.io.0;
        info.audio_io.outputs = state.io.1;
        info
    }

    fn get_parameter(&self, index: usize) -> f32 {
        let mut state = self.state.lock();
        state.log(format!("get_parameter {}", index));
        state
            .current()
            .and_then(|p| p.values.get(index).copied())
            .unwrap_or(0.0)
    }

    fn set_parameter(&self, index: usize, value: f32) {
        let mut state = self.state.lock();
        state.log(format!("set_parameter {} {}", index, value));
        if let Some(v) = state.current_mut().and_then(|p| p.values.get_mut(index)) {
            *v = value;
        }
    }

    fn parameter_name(&self, index: usize) -> String {
        format!("Param {}", index)
    }

    fn parameter_display(&self, index: usize) -> String {
        let state = self.state.lock();
        let value = state
            .current()
            .and_then(|p| p.values.get(index).copied())
            .unwrap_or(0.0);
        format!("{:.0}", value * 100.0)
    }

    fn parameter_label(&self, _index: usize) -> String {
        "%".to_string()
    }

    fn program(&self) -> usize {
        self.state.lock().current
    }

    fn set_program(&self, index: usize) {
        let mut state = self.state.lock();
        state.log(format!("set_program {}", index));
        if index < state.programs.len() {
            state.current = index;
        }
    }

    fn program_name(&self) -> String {
        self.state
            .lock()
            .current()
            .map(|p| p.name.clone())
            .unwrap_or_default()
    }

    fn set_program_name(&self, name: &str) {
        let mut state = self.state.lock();
        state.log(format!("set_program_name {}", name));
        if let Some(program) = state.current_mut() {
            program.name = name.to_string();
        }
    }

    fn program_name_at(&self, index: usize) -> Option<String> {
        self.state.lock().programs.get(index).map(|p| p.name.clone())
    }

    fn chunk(&self, kind: ChunkKind) -> Vec<u8> {
        let mut state = self.state.lock();
        state.log(format!("chunk {:?}", kind));
        match kind {
            ChunkKind::Program => state.current().map(encode_program).unwrap_or_default(),
            ChunkKind::Bank => {
                let mut out = vec![state.programs.len().min(255) as u8];
                for program in state.programs.iter().take(255) {
                    out.extend(encode_program(program));
                }
                out
            }
        }
    }

    fn set_chunk(&self, kind: ChunkKind, data: &[u8]) {
        let mut state = self.state.lock();
        state.log(format!("set_chunk {:?} {}", kind, data.len()));
        match kind {
            ChunkKind::Program => {
                if let Some((program, _)) = decode_program(data) {
                    if let Some(current) = state.current_mut() {
                        *current = program;
                    }
                }
            }
            ChunkKind::Bank => {
                let Some((&count, mut rest)) = data.split_first() else {
                    return;
                };
                for slot in 0..count as usize {
                    let Some((program, used)) = decode_program(rest) else {
                        break;
                    };
                    if let Some(target) = state.programs.get_mut(slot) {
                        *target = program;
                    }
                    rest = &rest[used..];
                }
            }
        }
    }

    fn set_sample_rate(&self, rate: f32) {
        let mut state = self.state.lock();
        state.log(format!("set_sample_rate {}", rate));
        state.sample_rate = rate;
    }

    fn set_block_size(&self, size: usize) {
        let mut state = self.state.lock();
        state.log(format!("set_block_size {}", size));
        state.block_size = size;
    }

    fn suspend(&self) {
        self.state.lock().log("suspend");
    }

    fn resume(&self) {
        self.state.lock().log("resume");
    }

    fn start_process(&self) {
        self.state.lock().log("start_process");
    }

    fn stop_process(&self) {
        self.state.lock().log("stop_process");
    }

    fn process_replacing(
        &self,
        events: &[MidiEvent],
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
    ) {
        self.render("process_replacing", events, inputs, outputs, frames, false);
    }

    fn process_accumulating(
        &self,
        events: &[MidiEvent],
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
    ) {
        self.render("process_accumulating", events, inputs, outputs, frames, true);
    }

    fn process_double_replacing(
        &self,
        events: &[MidiEvent],
        inputs: &[&[f64]],
        outputs: &mut [&mut [f64]],
        frames: usize,
    ) {
        self.render(
            "process_double_replacing",
            events,
            inputs,
            outputs,
            frames,
            false,
        );
    }

    fn can_do(&self, capability: CanDo) -> Support {
        if self.spec.capabilities.contains(&capability) {
            Support::Yes
        } else {
            Support::No
        }
    }

    fn set_bypass(&self, bypass: bool) -> bool {
        let mut state = self.state.lock();
        state.log(format!("set_bypass {}", bypass));
        if self.spec.capabilities.contains(&CanDo::Bypass) {
            state.bypassed = bypass;
            true
        } else {
            false
        }
    }

    fn update_time_info(&self, time: &TimeInfo) {
        self.state.lock().time = *time;
    }

    fn pin_properties(&self, direction: PinDirection, index: usize) -> Option<PinProperties> {
        let state = self.state.lock();
        let (count, prefix) = match direction {
            PinDirection::Input => (state.io.0, "In"),
            PinDirection::Output => (state.io.1, "Out"),
        };
        (index < count).then(|| PinProperties {
            index,
            label: format!("{} {}", prefix, index + 1),
            short_label: format!("{}{}", &prefix[..1], index + 1),
            is_active: true,
            is_first_in_stereo_pair: index % 2 == 0 && index + 1 < count,
        })
    }

    fn tail_size(&self) -> usize {
        self.spec.tail_size
    }

    fn is_parameter_automatable(&self, index: usize) -> bool {
        self.state.lock().log(format!("is_parameter_automatable {}", index));
        !self.spec.fixed_parameters.contains(&index)
    }

    fn produces_sound_in_stop(&self) -> bool {
        !self.spec.silent_in_stop
    }

    fn edit_idle(&self) {
        self.state.lock().log("edit_idle");
    }

    fn editor(&self) -> Option<Box<dyn NativeEditor>> {
        if !self.spec.info.has_editor {
            return None;
        }
        Some(Box::new(MockEditor {
            state: Arc::clone(&self.state),
            window: Arc::new(EditorSignal::new()),
            stubborn: self.spec.stubborn_editor,
        }))
    }

    fn release(self: Box<Self>) {
        let mut state = self.state.lock();
        state.log("release");
        state.releases += 1;
        state.host = None;
    }
}

struct MockEditor {
    state: Arc<Mutex<MockState>>,
    window: Arc<EditorSignal>,
    stubborn: bool,
}

impl NativeEditor for MockEditor {
    fn run(&mut self, title: &str) {
        {
            let mut state = self.state.lock();
            state.log(format!("editor_open {}", title));
            state.editor_window = Some(Arc::clone(&self.window));
        }
        self.window.wait();
        self.state.lock().log("editor_closed");
    }

    fn close_requester(&self) -> Arc<dyn Fn() + Send + Sync> {
        let window = Arc::clone(&self.window);
        let stubborn = self.stubborn;
        Arc::new(move || {
            if !stubborn {
                window.notify_closed();
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_program_chunk_encoding() {
        let program = MockProgram {
            name: "Lead".into(),
            values: vec![0.25, 0.75],
        };
        let bytes = encode_program(&program);
        let (decoded, used) = decode_program(&bytes).unwrap();
        assert_eq!(decoded, program);
        assert_eq!(used, bytes.len());
        assert!(decode_program(&bytes[..3]).is_none());
    }

    #[test]
    fn test_fresh_state_per_load() {
        let loader = MockLoader::new(MockSpec::new("Test", "Test").with_parameters(&[0.5]));
        let probe = loader.probe();

        let plugin = loader.load(HostCallback::detached()).unwrap();
        plugin.set_parameter(0, 0.9);
        assert_eq!(plugin.get_parameter(0), 0.9);
        plugin.release();

        let plugin = loader.load(HostCallback::detached()).unwrap();
        assert_eq!(plugin.get_parameter(0), 0.5);
        plugin.release();

        assert_eq!(probe.loads(), 2);
        assert_eq!(probe.releases(), 2);
    }

    #[test]
    fn test_failing_load() {
        let loader = MockLoader::new(MockSpec::new("Test", "Test"));
        loader.probe().set_fail_loads(true);
        let err = loader.load(HostCallback::detached()).err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Native);
    }

    #[test]
    fn test_pin_properties() {
        let loader = MockLoader::new(MockSpec::new("Test", "Test"));
        let plugin = loader.load(HostCallback::detached()).unwrap();

        let left = plugin.pin_properties(PinDirection::Output, 0).unwrap();
        assert_eq!(left.label, "Out 1");
        assert_eq!(left.short_label, "O1");
        assert!(left.is_first_in_stereo_pair);
        let right = plugin.pin_properties(PinDirection::Output, 1).unwrap();
        assert!(!right.is_first_in_stereo_pair);
        assert!(plugin.pin_properties(PinDirection::Input, 2).is_none());
        plugin.release();
    }
}
