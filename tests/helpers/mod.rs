//! Shared fixtures for minihost integration tests
//!
//! Every session here is backed by the in-memory mock plugin, so the tests
//! run without any plugin binaries installed.

#![allow(dead_code)]

use minihost::plugin::mock::{MockLoader, MockProbe, MockSpec};
use minihost::prelude::*;
use std::sync::Arc;

pub const TEST_SAMPLE_RATE: f32 = 48000.0;
pub const TEST_BLOCK_SIZE: usize = 256;

/// Four parameters, three programs, stereo in and out.
pub fn synth_spec() -> MockSpec {
    MockSpec::new("Tsyn", "Test Synth")
        .with_parameters(&[0.5, 0.25, 0.75, 0.0])
        .with_programs(&["Init", "Pad", "Lead"])
        .map_info(|info| info.synth(true).revision(3))
}

/// Same layout as [`synth_spec`] but state is exchanged as opaque chunks.
pub fn chunk_spec() -> MockSpec {
    synth_spec().map_info(|info| info.chunks(true))
}

/// Open a suspended session on `spec` with the test audio setup.
pub fn open(spec: MockSpec) -> (PluginSession, MockProbe) {
    let loader = MockLoader::new(spec);
    let probe = loader.probe();
    let session = HostBuilder::new()
        .sample_rate(TEST_SAMPLE_RATE)
        .block_size(TEST_BLOCK_SIZE)
        .open(loader)
        .expect("Failed to open mock session");
    (session, probe)
}

/// Like [`open`] but already turned on.
pub fn open_running(spec: MockSpec) -> (PluginSession, MockProbe) {
    let (session, probe) = open(spec);
    session.turn_on().expect("Failed to turn on mock session");
    (session, probe)
}

/// Stereo silence and an output buffer, `frames` long.
pub struct StereoBuffers {
    pub inputs: Vec<Vec<f32>>,
    pub outputs: Vec<Vec<f32>>,
}

impl StereoBuffers {
    pub fn new(frames: usize) -> Self {
        Self {
            inputs: vec![vec![0.0; frames]; 2],
            outputs: vec![vec![0.0; frames]; 2],
        }
    }

    pub fn process(&mut self, session: &PluginSession, frames: usize) -> Result<()> {
        let inputs: Vec<&[f32]> = self.inputs.iter().map(|c| c.as_slice()).collect();
        let mut outputs: Vec<&mut [f32]> =
            self.outputs.iter_mut().map(|c| c.as_mut_slice()).collect();
        session.process_replacing(&inputs, &mut outputs, frames)?;
        Ok(())
    }

    pub fn peak(&self) -> f32 {
        self.outputs
            .iter()
            .flatten()
            .fold(0.0f32, |acc, s| acc.max(s.abs()))
    }
}

/// Records every notification it receives as a short string.
#[derive(Default)]
pub struct Recorder {
    events: parking_lot::Mutex<Vec<String>>,
}

impl Recorder {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn events(&self) -> Vec<String> {
        self.events.lock().clone()
    }

    fn push(&self, event: String) -> minihost::plugin::ListenerResult {
        self.events.lock().push(event);
        Ok(())
    }
}

impl HostListener for Recorder {
    fn on_automate(&self, index: usize, value: f32) -> minihost::plugin::ListenerResult {
        self.push(format!("automate {} {}", index, value))
    }

    fn on_io_changed(&self, change: minihost::plugin::IoChange) -> minihost::plugin::ListenerResult {
        self.push(format!("io {} {}", change.num_inputs, change.num_outputs))
    }

    fn on_begin_edit(&self, index: usize) -> minihost::plugin::ListenerResult {
        self.push(format!("begin {}", index))
    }

    fn on_end_edit(&self, index: usize) -> minihost::plugin::ListenerResult {
        self.push(format!("end {}", index))
    }

    fn on_midi_out(&self, event: MidiEvent) -> minihost::plugin::ListenerResult {
        self.push(format!("midi {:?} {}", event.command, event.data1))
    }
}
