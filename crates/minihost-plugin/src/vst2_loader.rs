//! VST2 plugin loader
//!
//! Loads VST2 shared libraries through the `vst` crate. Without the `vst2`
//! feature the loader still exists but every load fails with a clear message.

use crate::callback::HostCallback;
use crate::error::{HostError, LoadStage, Result};
use crate::native::{NativeLoader, NativePlugin};
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[cfg(feature = "vst2")]
use crate::metadata::{
    CanDo, ChunkKind, PinDirection, PinProperties, PluginInfo, Support, TimeInfo, UniqueId,
};
#[cfg(feature = "vst2")]
use crate::midi::MidiEvent;
#[cfg(feature = "vst2")]
use crate::native::NativeEditor;
#[cfg(feature = "vst2")]
use parking_lot::Mutex;
#[cfg(feature = "vst2")]
use vst::host::{Host, PluginLoader};
#[cfg(feature = "vst2")]
use vst::plugin::Plugin as VstPlugin;

/// `getVstVersion` is not exposed by the `vst` crate; it only hosts 2.4 plugins.
#[cfg(feature = "vst2")]
const ASSUMED_VST_VERSION: i32 = 2400;

/// Loads a VST2 plugin from a shared library (or macOS `.vst` bundle).
#[derive(Debug, Clone)]
pub struct Vst2Loader {
    path: PathBuf,
}

impl Vst2Loader {
    pub fn new(path: impl Into<PathBuf>) -> Arc<Self> {
        Arc::new(Self { path: path.into() })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Resolve a macOS `.vst` bundle path to the inner mach-o binary.
    ///
    /// `PluginLoader` calls `dlopen` directly and doesn't resolve bundles.
    #[cfg_attr(not(feature = "vst2"), allow(dead_code))]
    fn resolve_bundle_path(path: &Path) -> PathBuf {
        if path.is_dir() && path.extension().and_then(|e| e.to_str()) == Some("vst") {
            if let Some(stem) = path.file_stem() {
                let inner = path.join("Contents").join("MacOS").join(stem);
                if inner.exists() {
                    return inner;
                }
            }
        }
        path.to_path_buf()
    }
}

impl NativeLoader for Vst2Loader {
    fn source(&self) -> String {
        self.path.display().to_string()
    }

    #[cfg(feature = "vst2")]
    fn load(&self, host: HostCallback) -> Result<Box<dyn NativePlugin>> {
        let resolved = Self::resolve_bundle_path(&self.path);
        let time_info = Arc::new(arc_swap::ArcSwap::from_pointee(None));
        // The `vst` crate holds this mutex for the whole of every host callback,
        // so the adapter only queues notifications and never waits on the session.
        let adapter = Arc::new(std::sync::Mutex::new(HostAdapter {
            callback: host.deferred(),
            time_info: Arc::clone(&time_info),
        }));

        let mut loader = PluginLoader::load(&resolved, Arc::clone(&adapter)).map_err(|e| {
            HostError::native(
                LoadStage::Opening,
                format!("Failed to load VST {}: {:?}", self.path.display(), e),
            )
        })?;

        let mut instance = loader.instance().map_err(|e| {
            HostError::native(
                LoadStage::Instantiation,
                format!("Failed to create instance: {:?}", e),
            )
        })?;

        instance.init();

        // get_editor() only succeeds once per instance, so it is taken here and
        // handed from editor session to editor session.
        let editor = instance.get_editor().map(SendEditor);
        let params = SendParams(instance.get_parameter_object());
        let has_editor = editor.is_some();
        let info = describe(&instance.get_info(), has_editor);

        tracing::debug!(
            "VST2 {} [{}]: {} in, {} out, {} params",
            info.name,
            info.unique_id,
            info.audio_io.inputs,
            info.audio_io.outputs,
            info.num_parameters
        );

        Ok(Box::new(Vst2Plugin {
            instance: Mutex::new(instance),
            params,
            editor: Arc::new(Mutex::new(editor)),
            has_editor,
            info: Mutex::new(info),
            host,
            _host: adapter,
            time_info,
        }))
    }

    /// For a macOS bundle this is the directory holding the `.vst`.
    fn directory(&self) -> Option<PathBuf> {
        self.path
            .parent()
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(Path::to_path_buf)
    }

    #[cfg(not(feature = "vst2"))]
    fn load(&self, host: HostCallback) -> Result<Box<dyn NativePlugin>> {
        let _ = host;
        Err(HostError::native(
            LoadStage::Opening,
            format!(
                "{}: VST2 support not compiled (enable 'vst2' feature)",
                self.path.display()
            ),
        ))
    }
}

#[cfg(feature = "vst2")]
fn describe(vst_info: &vst::plugin::Info, has_editor: bool) -> PluginInfo {
    PluginInfo::new(UniqueId::from_i32(vst_info.unique_id), vst_info.name.clone())
        .vendor(vst_info.vendor.clone())
        .revision(vst_info.version)
        .vst_version(ASSUMED_VST_VERSION)
        .audio_io(vst_info.inputs.max(0) as usize, vst_info.outputs.max(0) as usize)
        .parameters(vst_info.parameters.max(0) as usize)
        .programs(vst_info.presets.max(1) as usize)
        .latency(vst_info.initial_delay.max(0) as usize)
        .synth(vst_info.category == vst::plugin::Category::Synth)
        .editor(has_editor)
        .chunks(vst_info.preset_chunks)
        .f64_support(vst_info.f64_precision)
}

/// Wrapper to make `Box<dyn Editor>` Send.
/// Safety: only the editor thread touches the editor while it is running;
/// otherwise it sits idle behind a mutex.
#[cfg(feature = "vst2")]
struct SendEditor(Box<dyn vst::editor::Editor>);
#[cfg(feature = "vst2")]
unsafe impl Send for SendEditor {}

/// Wrapper to make `Arc<dyn PluginParameters>` Send + Sync.
/// Safety: The concrete type (`PluginParametersInstance`) is `Send + Sync`,
/// but that info is erased by `get_parameter_object()` returning `Arc<dyn PluginParameters>`.
#[cfg(feature = "vst2")]
struct SendParams(Arc<dyn vst::plugin::PluginParameters>);
#[cfg(feature = "vst2")]
unsafe impl Send for SendParams {}
#[cfg(feature = "vst2")]
unsafe impl Sync for SendParams {}

#[cfg(feature = "vst2")]
impl std::ops::Deref for SendParams {
    type Target = dyn vst::plugin::PluginParameters;
    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

/// A loaded VST2 plugin.
///
/// Parameter and program calls go through the thread-safe parameter object,
/// so they work while the plugin is inside one of the instance calls below
/// and calls back into the host.
#[cfg(feature = "vst2")]
struct Vst2Plugin {
    instance: Mutex<vst::host::PluginInstance>,
    params: SendParams,
    editor: Arc<Mutex<Option<SendEditor>>>,
    has_editor: bool,
    /// Last info read from the instance
    info: Mutex<PluginInfo>,
    /// Delivers notifications the adapter queued while the editor runs.
    host: HostCallback,
    /// Kept alive for the `vst` crate's Host trait dispatch
    _host: Arc<std::sync::Mutex<HostAdapter>>,
    time_info: Arc<arc_swap::ArcSwap<Option<vst::api::TimeInfo>>>,
}

#[cfg(feature = "vst2")]
impl Vst2Plugin {
    fn send_midi_events(instance: &mut vst::host::PluginInstance, midi_events: &[MidiEvent]) {
        use vst::api;

        if midi_events.is_empty() {
            return;
        }

        let mut api_events: Vec<api::MidiEvent> =
            midi_events.iter().map(midi_to_api_event).collect();
        let num_events = api_events.len() as i32;

        // Safety: api_events Vec is not moved/reallocated while pointers are live.
        let event_ptrs: Vec<*mut api::Event> = api_events
            .iter_mut()
            .map(|e| e as *mut api::MidiEvent as *mut api::Event)
            .collect();

        // api::Events ends in a [*mut Event; 2] flexible array member.
        let events_offset = std::mem::offset_of!(api::Events, events);
        let needed = events_offset + event_ptrs.len() * std::mem::size_of::<*mut api::Event>();
        let alloc_size = needed.max(std::mem::size_of::<api::Events>());

        // Vec<u64> for 8-byte alignment.
        let mut buf = vec![0u64; alloc_size.div_ceil(8)];

        unsafe {
            let p = buf.as_mut_ptr() as *mut u8;
            let events = &mut *(p as *mut api::Events);
            events.num_events = num_events;
            events._reserved = 0;
            let base = p.add(events_offset) as *mut *mut api::Event;
            for (i, ptr) in event_ptrs.iter().enumerate() {
                *base.add(i) = *ptr;
            }
            instance.process_events(events);
        }
    }

    fn run_f32(
        &self,
        events: &[MidiEvent],
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
    ) {
        use vst::buffer::AudioBuffer as VstBuffer;

        if frames == 0 {
            return;
        }
        let mut instance = self.instance.lock();
        Self::send_midi_events(&mut instance, events);

        let input_ptrs: Vec<*const f32> = inputs.iter().map(|ch| ch.as_ptr()).collect();
        let mut output_ptrs: Vec<*mut f32> = outputs.iter_mut().map(|ch| ch.as_mut_ptr()).collect();

        // Safety: channel counts and lengths were validated by the session.
        let mut vst_buffer = unsafe {
            VstBuffer::from_raw(
                input_ptrs.len(),
                output_ptrs.len(),
                input_ptrs.as_ptr(),
                output_ptrs.as_mut_ptr(),
                frames,
            )
        };
        instance.process(&mut vst_buffer);
    }
}

#[cfg(feature = "vst2")]
fn midi_to_api_event(event: &MidiEvent) -> vst::api::MidiEvent {
    use vst::api;

    api::MidiEvent {
        event_type: api::EventType::Midi,
        byte_size: std::mem::size_of::<api::MidiEvent>() as i32,
        delta_frames: event.delta_frames as i32,
        flags: if event.realtime {
            api::MidiEventFlags::REALTIME_EVENT.bits()
        } else {
            0
        },
        note_length: 0,
        note_offset: 0,
        midi_data: event.to_bytes(),
        _midi_reserved: 0,
        detune: 0,
        note_off_velocity: 0,
        _reserved1: 0,
        _reserved2: 0,
    }
}

#[cfg(feature = "vst2")]
mod time_info_flags {
    pub const TRANSPORT_CHANGED: i32 = 1;
    pub const TEMPO_VALID: i32 = 1 << 10;
    pub const TIME_SIG_VALID: i32 = 1 << 13;
}

#[cfg(feature = "vst2")]
fn build_vst2_time_info(time: &TimeInfo) -> vst::api::TimeInfo {
    use time_info_flags::*;

    vst::api::TimeInfo {
        sample_rate: time.sample_rate as f64,
        tempo: time.tempo,
        time_sig_numerator: time.time_sig_numerator as i32,
        time_sig_denominator: time.time_sig_denominator as i32,
        flags: TRANSPORT_CHANGED | TEMPO_VALID | TIME_SIG_VALID,
        ..Default::default()
    }
}

#[cfg(feature = "vst2")]
impl NativePlugin for Vst2Plugin {
    /// Re-read on every call so `ioChanged` is reflected. Falls back to the
    /// last read while another thread is inside an instance call.
    fn info(&self) -> PluginInfo {
        let Some(instance) = self.instance.try_lock() else {
            return self.info.lock().clone();
        };
        let info = describe(&instance.get_info(), self.has_editor);
        *self.info.lock() = info.clone();
        info
    }

    fn get_parameter(&self, index: usize) -> f32 {
        self.params.get_parameter(index as i32)
    }

    fn set_parameter(&self, index: usize, value: f32) {
        self.params.set_parameter(index as i32, value);
    }

    fn parameter_name(&self, index: usize) -> String {
        self.params.get_parameter_name(index as i32)
    }

    fn parameter_display(&self, index: usize) -> String {
        self.params.get_parameter_text(index as i32)
    }

    fn parameter_label(&self, index: usize) -> String {
        self.params.get_parameter_label(index as i32)
    }

    fn program(&self) -> usize {
        self.params.get_preset_num().max(0) as usize
    }

    fn set_program(&self, index: usize) {
        self.params.change_preset(index as i32);
    }

    fn program_name(&self) -> String {
        self.params.get_preset_name(self.params.get_preset_num())
    }

    fn set_program_name(&self, name: &str) {
        self.params.set_preset_name(name.to_string());
    }

    fn program_name_at(&self, index: usize) -> Option<String> {
        Some(self.params.get_preset_name(index as i32))
    }

    fn chunk(&self, kind: ChunkKind) -> Vec<u8> {
        match kind {
            ChunkKind::Program => self.params.get_preset_data(),
            ChunkKind::Bank => self.params.get_bank_data(),
        }
    }

    fn set_chunk(&self, kind: ChunkKind, data: &[u8]) {
        match kind {
            ChunkKind::Program => self.params.load_preset_data(data),
            ChunkKind::Bank => self.params.load_bank_data(data),
        }
    }

    fn set_sample_rate(&self, rate: f32) {
        self.instance.lock().set_sample_rate(rate);
    }

    fn set_block_size(&self, size: usize) {
        self.instance.lock().set_block_size(size as i64);
    }

    fn suspend(&self) {
        self.instance.lock().suspend();
    }

    fn resume(&self) {
        self.instance.lock().resume();
    }

    fn start_process(&self) {
        self.instance.lock().start_process();
    }

    fn stop_process(&self) {
        self.instance.lock().stop_process();
    }

    fn process_replacing(
        &self,
        events: &[MidiEvent],
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
    ) {
        self.run_f32(events, inputs, outputs, frames);
    }

    fn process_accumulating(
        &self,
        events: &[MidiEvent],
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
    ) {
        let mut rendered: Vec<Vec<f32>> = outputs.iter().map(|_| vec![0.0; frames]).collect();
        let mut slices: Vec<&mut [f32]> = rendered.iter_mut().map(|v| v.as_mut_slice()).collect();
        self.run_f32(events, inputs, &mut slices, frames);
        for (out, add) in outputs.iter_mut().zip(&rendered) {
            for (o, a) in out.iter_mut().zip(add) {
                *o += a;
            }
        }
    }

    /// The `vst` crate does not expose processDoubleReplacing on the host
    /// side, so f64 buffers are converted through f32.
    fn process_double_replacing(
        &self,
        events: &[MidiEvent],
        inputs: &[&[f64]],
        outputs: &mut [&mut [f64]],
        frames: usize,
    ) {
        let input_vecs: Vec<Vec<f32>> = inputs
            .iter()
            .map(|ch| ch[..frames].iter().map(|&s| s as f32).collect())
            .collect();
        let input_slices: Vec<&[f32]> = input_vecs.iter().map(|v| v.as_slice()).collect();
        let mut output_vecs: Vec<Vec<f32>> = outputs.iter().map(|_| vec![0.0; frames]).collect();
        let mut output_slices: Vec<&mut [f32]> =
            output_vecs.iter_mut().map(|v| v.as_mut_slice()).collect();

        self.run_f32(events, &input_slices, &mut output_slices, frames);

        for (out, rendered) in outputs.iter_mut().zip(&output_vecs) {
            for (o, &r) in out.iter_mut().zip(rendered) {
                *o = r as f64;
            }
        }
    }

    fn can_do(&self, capability: CanDo) -> Support {
        use vst::plugin::CanDo as VstCanDo;

        let query = match capability {
            CanDo::SendVstEvents => VstCanDo::SendEvents,
            CanDo::SendVstMidiEvent => VstCanDo::SendMidiEvent,
            CanDo::ReceiveVstEvents => VstCanDo::ReceiveEvents,
            CanDo::ReceiveVstMidiEvent => VstCanDo::ReceiveMidiEvent,
            CanDo::ReceiveVstTimeInfo => VstCanDo::ReceiveTimeInfo,
            CanDo::Offline => VstCanDo::Offline,
            CanDo::MidiProgramNames => VstCanDo::MidiProgramNames,
            CanDo::Bypass => VstCanDo::Bypass,
        };
        match self.instance.lock().can_do(query) {
            vst::api::Supported::Yes => Support::Yes,
            vst::api::Supported::No => Support::No,
            _ => Support::Maybe,
        }
    }

    fn set_bypass(&self, bypass: bool) -> bool {
        // effSetBypass has no host-side binding in the `vst` crate.
        tracing::debug!("Bypass ({}) not forwarded to VST2 plugin", bypass);
        false
    }

    fn update_time_info(&self, time: &TimeInfo) {
        self.time_info
            .store(Arc::new(Some(build_vst2_time_info(time))));
    }

    fn pin_properties(&self, direction: PinDirection, index: usize) -> Option<PinProperties> {
        let io = self.info.lock().audio_io;
        let instance = self.instance.lock();
        let (count, channel) = match direction {
            PinDirection::Input => (io.inputs, instance.get_input_info(index as i32)),
            PinDirection::Output => (io.outputs, instance.get_output_info(index as i32)),
        };
        if index >= count {
            return None;
        }
        Some(PinProperties {
            index,
            label: channel.name(),
            short_label: channel.short_name(),
            is_active: channel.is_active(),
            // The stereo-pair flag is not surfaced by ChannelInfo; pair channels by position.
            is_first_in_stereo_pair: index % 2 == 0 && index + 1 < count,
        })
    }

    fn tail_size(&self) -> usize {
        self.instance.lock().get_tail_size().max(0) as usize
    }

    fn is_parameter_automatable(&self, index: usize) -> bool {
        self.params.can_be_automated(index as i32)
    }

    fn produces_sound_in_stop(&self) -> bool {
        !self.instance.lock().get_info().silent_when_stopped
    }

    fn edit_idle(&self) {
        if let Some(editor) = self.editor.lock().as_mut() {
            editor.0.idle();
        }
    }

    fn editor(&self) -> Option<Box<dyn NativeEditor>> {
        if self.editor.lock().is_none() {
            return None;
        }
        Some(Box::new(Vst2Editor {
            slot: Arc::clone(&self.editor),
            host: self.host.clone(),
            close_requested: Arc::new(std::sync::atomic::AtomicBool::new(false)),
        }))
    }

    fn release(self: Box<Self>) {
        if let Some(mut editor) = self.editor.lock().take() {
            editor.0.close();
        }
        tracing::debug!("Releasing VST2 {}", self.info.lock().name);
        // Dropping PluginInstance dispatches effClose.
    }
}

/// Runs the plugin's editor until closed, idling it at roughly 60 Hz.
///
/// Notifications the plugin raises from its editor are delivered after each
/// idle tick, once the `vst` crate has released its host lock.
#[cfg(feature = "vst2")]
struct Vst2Editor {
    slot: Arc<Mutex<Option<SendEditor>>>,
    host: HostCallback,
    close_requested: Arc<std::sync::atomic::AtomicBool>,
}

#[cfg(feature = "vst2")]
impl NativeEditor for Vst2Editor {
    fn run(&mut self, title: &str) {
        use std::sync::atomic::Ordering;

        let Some(mut editor) = self.slot.lock().take() else {
            tracing::warn!("Editor for {} is already in use", title);
            return;
        };
        // No host window: the plugin creates its own top-level window.
        if !editor.0.open(std::ptr::null_mut()) {
            tracing::warn!("VST2 editor.open() returned false for {}", title);
            *self.slot.lock() = Some(editor);
            return;
        }
        while !self.close_requested.load(Ordering::Acquire) && editor.0.is_open() {
            editor.0.idle();
            self.host.flush();
            std::thread::sleep(std::time::Duration::from_millis(16));
        }
        editor.0.close();
        *self.slot.lock() = Some(editor);
        self.host.flush();
    }

    fn close_requester(&self) -> Arc<dyn Fn() + Send + Sync> {
        let flag = Arc::clone(&self.close_requested);
        Arc::new(move || flag.store(true, std::sync::atomic::Ordering::Release))
    }
}

/// Host side of the `vst` crate's callback dispatch.
#[cfg(feature = "vst2")]
struct HostAdapter {
    callback: HostCallback,
    /// Lock-free timing information (shared with Vst2Plugin)
    time_info: Arc<arc_swap::ArcSwap<Option<vst::api::TimeInfo>>>,
}

#[cfg(feature = "vst2")]
impl Host for HostAdapter {
    fn automate(&self, index: i32, value: f32) {
        if index >= 0 {
            self.callback.automate(index as usize, value);
        }
    }

    fn begin_edit(&self, index: i32) {
        if index >= 0 {
            self.callback.begin_edit(index as usize);
        }
    }

    fn end_edit(&self, index: i32) {
        if index >= 0 {
            self.callback.end_edit(index as usize);
        }
    }

    fn get_plugin_id(&self) -> i32 {
        0x4D48_5354 // "MHST"
    }

    fn idle(&self) {}

    fn process_events(&self, events: &vst::api::Events) {
        for event in events.events() {
            if let vst::event::Event::Midi(midi) = event {
                if let Some(event) = MidiEvent::from_bytes(midi.data, midi.delta_frames.max(0) as u32)
                {
                    self.callback.midi_out(event.with_realtime(midi.live));
                }
            }
        }
    }

    fn get_time_info(&self, _mask: i32) -> Option<vst::api::TimeInfo> {
        **self.time_info.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_source_is_path() {
        let loader = Vst2Loader::new("/plugins/Synth.so");
        assert_eq!(loader.source(), "/plugins/Synth.so");
        assert_eq!(loader.path(), Path::new("/plugins/Synth.so"));
    }

    #[test]
    fn test_directory() {
        let loader = Vst2Loader::new("/plugins/Synth.so");
        assert_eq!(loader.directory(), Some(PathBuf::from("/plugins")));
        assert_eq!(Vst2Loader::new("Synth.so").directory(), None);
    }

    #[test]
    fn test_resolve_plain_path_unchanged() {
        let path = Path::new("/nonexistent/plugin.so");
        assert_eq!(Vst2Loader::resolve_bundle_path(path), path.to_path_buf());
    }

    #[test]
    fn test_load_nonexistent_path() {
        let loader = Vst2Loader::new("/nonexistent/plugin.vst");
        let err = loader.load(HostCallback::detached()).err().unwrap();
        assert_eq!(err.kind(), crate::ErrorKind::Native);
        assert!(err.to_string().contains("opening library"));
    }

    #[cfg(feature = "vst2")]
    #[test]
    fn test_midi_to_api_event() {
        let event = MidiEvent::note_on(2, 60, 100).at_frame(17);
        let api = midi_to_api_event(&event);
        assert_eq!(api.midi_data, [0x92, 60, 100]);
        assert_eq!(api.delta_frames, 17);
        assert_eq!(api.flags, vst::api::MidiEventFlags::REALTIME_EVENT.bits());

        let sequenced = midi_to_api_event(&event.with_realtime(false));
        assert_eq!(sequenced.flags, 0);
    }

    #[cfg(feature = "vst2")]
    #[test]
    fn test_time_info_conversion() {
        let info = build_vst2_time_info(&TimeInfo {
            sample_rate: 48000.0,
            tempo: 98.0,
            time_sig_numerator: 7,
            time_sig_denominator: 8,
        });
        assert_eq!(info.sample_rate, 48000.0);
        assert_eq!(info.tempo, 98.0);
        assert_eq!(info.time_sig_numerator, 7);
        assert_eq!(info.time_sig_denominator, 8);
    }
}
