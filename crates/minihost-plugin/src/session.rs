//! Plugin session: lifecycle state machine and parameter/program facade.
//!
//! A [`PluginSession`] exclusively owns one native plugin handle. Every public
//! operation runs under a single per-session re-entrant lock, so a control
//! thread, an audio thread and plugin callbacks never interleave native calls.
//! The lock is re-entrant because listeners may call back into the session.
//!
//! Plugin notifications (automate, ioChanged) never take the lock directly.
//! They are queued and delivered once no session call is in progress: right
//! away when the session is idle, otherwise by whichever thread finishes the
//! outermost call.

use crate::callback::HostCallback;
use crate::config::{validate_block_size, validate_sample_rate, SessionConfig};
use crate::editor::EditorHandle;
use crate::error::{check_index, HostError, LoadStage, Result};
use crate::listener::{
    deliver, panic_message, EventKind, HostListener, IoChange, ListenerRegistry, ParameterView,
};
use crate::metadata::{
    CanDo, ChunkKind, IoCounts, PinDirection, PinProperties, PluginInfo, Support, TimeInfo, UniqueId,
};
use crate::midi::{MidiEvent, MidiEventQueue};
use crate::native::{NativeLoader, NativePlugin};
use crate::version::{VersionPolicy, VstVersion};
use parking_lot::{Mutex, ReentrantMutex, ReentrantMutexGuard};
use std::cell::{Cell, RefCell};
use std::mem::ManuallyDrop;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
    Unloaded,
    Suspended,
    Resumed,
    /// Resumed and between `startProcess`/`stopProcess` (2.3+).
    Processing,
}

impl Lifecycle {
    pub fn is_on(self) -> bool {
        matches!(self, Lifecycle::Resumed | Lifecycle::Processing)
    }
}

impl std::fmt::Display for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Lifecycle::Unloaded => write!(f, "unloaded"),
            Lifecycle::Suspended => write!(f, "suspended"),
            Lifecycle::Resumed => write!(f, "resumed"),
            Lifecycle::Processing => write!(f, "processing"),
        }
    }
}

/// State guarded by the session lock. Interior mutability because the lock is
/// re-entrant and only hands out shared references.
struct SessionCore {
    loader: Arc<dyn NativeLoader>,
    native: RefCell<Option<Box<dyn NativePlugin>>>,
    lifecycle: Cell<Lifecycle>,
    version: Cell<VstVersion>,
    policy: Cell<Option<VersionPolicy>>,
    info: RefCell<PluginInfo>,
    io: Cell<IoCounts>,
    config: Cell<SessionConfig>,
    time: Cell<TimeInfo>,
    listeners: RefCell<ListenerRegistry>,
    view: RefCell<Option<Arc<dyn ParameterView>>>,
    /// Nesting of session calls on the thread holding the lock.
    depth: Cell<usize>,
}

/// A plugin-initiated notification waiting for delivery.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Notification {
    Automate { index: usize, value: f32 },
    IoChanged,
    BeginEdit(usize),
    EndEdit(usize),
    MidiOut(MidiEvent),
}

pub(crate) struct SessionShared {
    core: ReentrantMutex<SessionCore>,
    /// Notifications are queued here and delivered only when no session call
    /// is in progress, so a plugin callback never waits for the session lock.
    pending: Mutex<Vec<Notification>>,
    midi: MidiEventQueue,
    editor: Mutex<Option<EditorHandle>>,
}

/// Session lock guard. Releasing the outermost guard delivers queued notifications.
struct CoreGuard<'a> {
    shared: &'a SessionShared,
    guard: ManuallyDrop<ReentrantMutexGuard<'a, SessionCore>>,
}

impl std::ops::Deref for CoreGuard<'_> {
    type Target = SessionCore;

    fn deref(&self) -> &SessionCore {
        &self.guard
    }
}

impl Drop for CoreGuard<'_> {
    fn drop(&mut self) {
        let depth = self.guard.depth.get().saturating_sub(1);
        self.guard.depth.set(depth);
        // SAFETY: the guard is dropped exactly once and not touched afterwards.
        unsafe { ManuallyDrop::drop(&mut self.guard) };
        if depth == 0 {
            self.shared.flush_notifications();
        }
    }
}

impl SessionCore {
    fn new(loader: Arc<dyn NativeLoader>, config: SessionConfig) -> Self {
        let placeholder = PluginInfo::new(UniqueId::default(), loader.source());
        Self {
            loader,
            native: RefCell::new(None),
            lifecycle: Cell::new(Lifecycle::Unloaded),
            version: Cell::new(VstVersion::Unknown),
            policy: Cell::new(None),
            info: RefCell::new(placeholder),
            io: Cell::new(IoCounts::default()),
            config: Cell::new(config),
            time: Cell::new(TimeInfo {
                sample_rate: config.sample_rate,
                ..TimeInfo::default()
            }),
            listeners: RefCell::new(ListenerRegistry::new()),
            view: RefCell::new(None),
            depth: Cell::new(0),
        }
    }

    /// Runs `f` against the loaded plugin.
    fn native<R>(&self, operation: &'static str, f: impl FnOnce(&dyn NativePlugin) -> R) -> Result<R> {
        let native = self.native.borrow();
        match native.as_deref() {
            Some(plugin) => Ok(f(plugin)),
            None => Err(HostError::State {
                operation,
                state: Lifecycle::Unloaded,
            }),
        }
    }

    fn policy(&self, operation: &'static str) -> Result<VersionPolicy> {
        self.policy.get().ok_or(HostError::State {
            operation,
            state: self.lifecycle.get(),
        })
    }

    fn require_on(&self, operation: &'static str) -> Result<()> {
        let state = self.lifecycle.get();
        if state.is_on() {
            Ok(())
        } else {
            Err(HostError::State { operation, state })
        }
    }

    fn require_off(&self, operation: &'static str) -> Result<()> {
        let state = self.lifecycle.get();
        if state.is_on() {
            Err(HostError::State { operation, state })
        } else {
            Ok(())
        }
    }

    fn load(&self, callback: HostCallback, stage: LoadStage) -> Result<()> {
        let source = self.loader.source();
        let plugin = self.loader.load(callback).map_err(|e| match e {
            HostError::Native { .. } => e,
            other => HostError::native(stage, other.to_string()),
        })?;

        let info = plugin.info();
        let version = VstVersion::from_number(info.vst_version);
        let Some(policy) = version.policy() else {
            plugin.release();
            return Err(HostError::native(
                LoadStage::Initialization,
                format!("{} reports unsupported VST version {}", source, info.vst_version),
            ));
        };

        match self.version.get() {
            VstVersion::Unknown => {
                self.version.set(version);
                self.policy.set(Some(policy));
            }
            original if original != version => {
                tracing::warn!(
                    "{} now reports {} but the session was created for {}; keeping {}",
                    source,
                    version,
                    original,
                    original
                );
            }
            _ => {}
        }

        let config = self.config.get();
        plugin.set_sample_rate(config.sample_rate);
        plugin.set_block_size(config.block_size);
        plugin.update_time_info(&self.time.get());

        let mut slot = self
            .native
            .try_borrow_mut()
            .map_err(|_| HostError::Reentrant { operation: "load" })?;
        self.io.set(IoCounts::from(&info));
        *self.info.borrow_mut() = info;
        *slot = Some(plugin);
        drop(slot);
        self.lifecycle.set(Lifecycle::Suspended);

        tracing::info!("Loaded {} ({})", source, self.version.get());
        Ok(())
    }

    fn release(&self, operation: &'static str) -> Result<()> {
        let plugin = self
            .native
            .try_borrow_mut()
            .map_err(|_| HostError::Reentrant { operation })?
            .take();
        self.lifecycle.set(Lifecycle::Unloaded);
        if let Some(plugin) = plugin {
            plugin.release();
            tracing::debug!("Released {}", self.loader.source());
        }
        Ok(())
    }

    fn turn_on(&self) -> Result<()> {
        match self.lifecycle.get() {
            Lifecycle::Unloaded => Err(HostError::State {
                operation: "turn on",
                state: Lifecycle::Unloaded,
            }),
            Lifecycle::Resumed | Lifecycle::Processing => Ok(()),
            Lifecycle::Suspended => {
                let policy = self.policy("turn on")?;
                self.native("turn on", |p| p.resume())?;
                self.lifecycle.set(Lifecycle::Resumed);
                if policy.needs_start_stop_process {
                    self.native("turn on", |p| p.start_process())?;
                    self.lifecycle.set(Lifecycle::Processing);
                }
                tracing::debug!("Turned on ({})", self.lifecycle.get());
                Ok(())
            }
        }
    }

    fn turn_off(&self) -> Result<()> {
        if self.lifecycle.get() == Lifecycle::Unloaded {
            return Err(HostError::State {
                operation: "turn off",
                state: Lifecycle::Unloaded,
            });
        }
        if self.lifecycle.get() == Lifecycle::Processing {
            self.native("turn off", |p| p.stop_process())?;
            self.lifecycle.set(Lifecycle::Resumed);
        }
        if self.lifecycle.get() == Lifecycle::Resumed {
            self.native("turn off", |p| p.suspend())?;
            self.lifecycle.set(Lifecycle::Suspended);
            tracing::debug!("Turned off");
        }
        Ok(())
    }

    fn listener_snapshot(&self) -> Vec<Arc<dyn HostListener>> {
        self.listeners.borrow().snapshot()
    }

    fn visible_view(&self) -> Option<Arc<dyn ParameterView>> {
        let view = self.view.borrow().clone()?;
        view.is_visible().then_some(view)
    }

    fn check_buffers<T>(
        &self,
        operation: &'static str,
        inputs: &[&[T]],
        outputs: &[&mut [T]],
        frames: usize,
    ) -> Result<()> {
        let io = self.io.get();
        if inputs.len() != io.num_inputs {
            return Err(HostError::validation(
                "input buffers",
                format!(
                    "{}: expected {} channels, got {}",
                    operation,
                    io.num_inputs,
                    inputs.len()
                ),
            ));
        }
        if outputs.len() != io.num_outputs {
            return Err(HostError::validation(
                "output buffers",
                format!(
                    "{}: expected {} channels, got {}",
                    operation,
                    io.num_outputs,
                    outputs.len()
                ),
            ));
        }
        let lengths = inputs
            .iter()
            .map(|ch| ch.len())
            .chain(outputs.iter().map(|ch| ch.len()));
        for len in lengths {
            if len < frames {
                return Err(HostError::validation(
                    "buffer length",
                    format!("{}: channel holds {} frames, need {}", operation, len, frames),
                ));
            }
        }
        Ok(())
    }
}

impl SessionShared {
    fn lock(&self) -> CoreGuard<'_> {
        let guard = self.core.lock();
        guard.depth.set(guard.depth.get() + 1);
        CoreGuard {
            shared: self,
            guard: ManuallyDrop::new(guard),
        }
    }

    /// Queues a notification and delivers it right away if the session is idle.
    pub(crate) fn post(&self, notification: Notification) {
        self.queue(notification);
        self.flush_notifications();
    }

    /// Queues a notification without touching the session lock.
    pub(crate) fn queue(&self, notification: Notification) {
        self.pending.lock().push(notification);
    }

    /// Delivers queued notifications unless a session call is in progress.
    ///
    /// Whoever holds the lock flushes when its outermost call returns, so a
    /// notification queued while the lock is busy is never stranded.
    pub(crate) fn flush_notifications(&self) {
        while !self.pending.lock().is_empty() {
            let Some(core) = self.core.try_lock() else {
                return;
            };
            if core.depth.get() > 0 {
                return;
            }
            core.depth.set(1);
            let batch = std::mem::take(&mut *self.pending.lock());
            for notification in batch {
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| core.deliver(notification))) {
                    tracing::error!(
                        "Delivering {:?} panicked: {}",
                        notification,
                        panic_message(&*panic)
                    );
                }
            }
            core.depth.set(0);
        }
    }
}

impl SessionCore {
    fn deliver(&self, notification: Notification) {
        let listeners = self.listener_snapshot();
        match notification {
            Notification::Automate { index, value } => {
                if let Some(view) = self.visible_view() {
                    let display = self
                        .native("automate", |p| p.parameter_display(index))
                        .unwrap_or_default();
                    view.update_parameter(index, value, &display);
                }
                deliver(&listeners, EventKind::Automate, |l| l.on_automate(index, value));
            }
            Notification::IoChanged => {
                let Some(change) = self.refresh_io() else {
                    return;
                };
                deliver(&listeners, EventKind::IoChanged, |l| l.on_io_changed(change));
            }
            Notification::BeginEdit(index) => {
                deliver(&listeners, EventKind::BeginEdit, |l| l.on_begin_edit(index));
            }
            Notification::EndEdit(index) => {
                deliver(&listeners, EventKind::EndEdit, |l| l.on_end_edit(index));
            }
            Notification::MidiOut(event) => {
                deliver(&listeners, EventKind::MidiOut, |l| l.on_midi_out(event));
            }
        }
    }

    /// Re-reads the plugin's info after `ioChanged` and updates the cached counts.
    fn refresh_io(&self) -> Option<IoChange> {
        let info = self.native("io changed", |p| p.info()).ok()?;
        let io = IoCounts::from(&info);
        self.io.set(io);
        if let Ok(mut cached) = self.info.try_borrow_mut() {
            *cached = info;
        }
        tracing::debug!(
            "I/O changed: {} in, {} out, {} params, delay {}",
            io.num_inputs,
            io.num_outputs,
            io.num_parameters,
            io.initial_delay
        );
        Some(IoChange {
            num_inputs: io.num_inputs,
            num_outputs: io.num_outputs,
            initial_delay: io.initial_delay,
            num_parameters: io.num_parameters,
        })
    }
}

/// A loaded plugin and everything the host tracks about it.
///
/// Created suspended by [`PluginSession::open`]. Must be finished with
/// [`PluginSession::close`]; dropping an open session is a bug and leaks the
/// native handle.
pub struct PluginSession {
    shared: Arc<SessionShared>,
}

impl PluginSession {
    /// Loads a plugin and pushes `config` to it. The session starts suspended.
    pub fn open(loader: Arc<dyn NativeLoader>, config: SessionConfig) -> Result<Self> {
        config.validate()?;
        let session = Self {
            shared: Arc::new(SessionShared {
                core: ReentrantMutex::new(SessionCore::new(loader, config)),
                pending: Mutex::new(Vec::new()),
                midi: MidiEventQueue::new(),
                editor: Mutex::new(None),
            }),
        };
        {
            let core = session.shared.lock();
            core.load(session.callback(), LoadStage::Opening)?;
        }
        Ok(session)
    }

    fn callback(&self) -> HostCallback {
        HostCallback::new(Arc::downgrade(&self.shared))
    }

    /// Runs `f` with the session lock held, so a multi-step sequence of
    /// session calls is not interleaved with other threads.
    pub fn exclusive<R>(&self, f: impl FnOnce(&PluginSession) -> R) -> R {
        let _guard = self.shared.lock();
        f(self)
    }

    // =========================================================================
    // Lifecycle
    // =========================================================================

    pub fn lifecycle(&self) -> Lifecycle {
        self.shared.lock().lifecycle.get()
    }

    pub fn is_turned_on(&self) -> bool {
        self.lifecycle().is_on()
    }

    /// Resumes the plugin (and starts processing on 2.3+). No-op when already on.
    pub fn turn_on(&self) -> Result<()> {
        self.shared.lock().turn_on()
    }

    /// Inverse of [`turn_on`](Self::turn_on). No-op when already off.
    pub fn turn_off(&self) -> Result<()> {
        self.shared.lock().turn_off()
    }

    pub fn sample_rate(&self) -> f32 {
        self.shared.lock().config.get().sample_rate
    }

    pub fn block_size(&self) -> usize {
        self.shared.lock().config.get().block_size
    }

    /// Requires the plugin to be turned off.
    pub fn set_sample_rate(&self, rate: f32) -> Result<()> {
        validate_sample_rate(rate)?;
        let core = self.shared.lock();
        core.require_off("set sample rate")?;
        core.native("set sample rate", |p| p.set_sample_rate(rate))?;
        let mut config = core.config.get();
        config.sample_rate = rate;
        core.config.set(config);

        let mut time = core.time.get();
        time.sample_rate = rate;
        core.time.set(time);
        core.native("set sample rate", |p| p.update_time_info(&time))?;
        Ok(())
    }

    /// Requires the plugin to be turned off.
    pub fn set_block_size(&self, size: usize) -> Result<()> {
        validate_block_size(size)?;
        let core = self.shared.lock();
        core.require_off("set block size")?;
        core.native("set block size", |p| p.set_block_size(size))?;
        let mut config = core.config.get();
        config.block_size = size;
        core.config.set(config);
        Ok(())
    }

    /// Tears the plugin down and loads a fresh instance from the same source,
    /// restoring sample rate and block size, then turns it on.
    ///
    /// If the reload fails the session stays unloaded.
    pub fn reset(&self) -> Result<()> {
        self.close_editor()?;
        let core = self.shared.lock();
        tracing::info!("Resetting {}", core.loader.source());
        if core.lifecycle.get() != Lifecycle::Unloaded {
            core.turn_off()?;
            core.release("reset")?;
        }
        self.shared.midi.clear();
        core.load(self.callback(), LoadStage::Reload)?;
        core.turn_on()
    }

    /// Turns the plugin off and releases the native handle.
    pub fn close(self) -> Result<()> {
        self.close_editor()?;
        let core = self.shared.lock();
        if core.lifecycle.get() != Lifecycle::Unloaded {
            core.turn_off()?;
            core.release("close")?;
            tracing::info!("Closed {}", core.loader.source());
        }
        self.shared.midi.clear();
        Ok(())
    }

    // =========================================================================
    // Metadata
    // =========================================================================

    pub fn info(&self) -> PluginInfo {
        self.shared.lock().info.borrow().clone()
    }

    pub fn vst_version(&self) -> VstVersion {
        self.shared.lock().version.get()
    }

    pub fn unique_id(&self) -> UniqueId {
        self.shared.lock().info.borrow().unique_id
    }

    /// The unique id as the big-endian integer the plugin reports.
    pub fn unique_id_number(&self) -> i32 {
        self.unique_id().as_i32()
    }

    /// Plugin revision, compared against preset files.
    pub fn plugin_version(&self) -> i32 {
        self.shared.lock().info.borrow().revision
    }

    pub fn effect_name(&self) -> String {
        self.shared.lock().info.borrow().name.clone()
    }

    pub fn vendor_name(&self) -> String {
        self.shared.lock().info.borrow().vendor.clone()
    }

    pub fn product_string(&self) -> String {
        self.shared.lock().info.borrow().product.clone()
    }

    pub fn is_synth(&self) -> bool {
        self.shared.lock().info.borrow().is_synth
    }

    pub fn has_editor(&self) -> bool {
        self.shared.lock().info.borrow().has_editor
    }

    pub fn can_replacing(&self) -> bool {
        self.shared.lock().info.borrow().can_replacing
    }

    pub fn can_double_replacing(&self) -> bool {
        let core = self.shared.lock();
        let supported = core
            .policy
            .get()
            .is_some_and(|p| p.supports_double_precision);
        let can = core.info.borrow().can_double_replacing;
        supported && can
    }

    pub fn accepts_programs_as_chunks(&self) -> bool {
        self.shared.lock().info.borrow().programs_are_chunks
    }

    pub fn num_inputs(&self) -> usize {
        self.shared.lock().io.get().num_inputs
    }

    pub fn num_outputs(&self) -> usize {
        self.shared.lock().io.get().num_outputs
    }

    pub fn num_parameters(&self) -> usize {
        self.shared.lock().io.get().num_parameters
    }

    pub fn num_programs(&self) -> usize {
        self.shared.lock().io.get().num_programs
    }

    /// Latency in samples.
    pub fn initial_delay(&self) -> usize {
        self.shared.lock().io.get().initial_delay
    }

    pub fn can_do(&self, capability: CanDo) -> Result<Support> {
        self.shared
            .lock()
            .native("query capabilities", |p| p.can_do(capability))
    }

    pub fn input_properties(&self, index: usize) -> Result<Option<PinProperties>> {
        let core = self.shared.lock();
        check_index("input", index, core.io.get().num_inputs)?;
        core.native("query input", |p| p.pin_properties(PinDirection::Input, index))
    }

    pub fn output_properties(&self, index: usize) -> Result<Option<PinProperties>> {
        let core = self.shared.lock();
        check_index("output", index, core.io.get().num_outputs)?;
        core.native("query output", |p| p.pin_properties(PinDirection::Output, index))
    }

    /// Samples the plugin keeps sounding after its input goes silent.
    pub fn tail_size(&self) -> Result<usize> {
        self.shared.lock().native("query tail size", |p| p.tail_size())
    }

    /// `false` for plugins that stay silent when their input is silent.
    pub fn produces_sound_in_stop(&self) -> Result<bool> {
        self.shared
            .lock()
            .native("query sound in stop", |p| p.produces_sound_in_stop())
    }

    /// Directory the plugin binary was loaded from. `None` for plugins not
    /// loaded from disk.
    pub fn plugin_directory(&self) -> Option<PathBuf> {
        self.shared.lock().loader.directory()
    }

    // =========================================================================
    // Parameters
    // =========================================================================

    pub fn get_parameter(&self, index: usize) -> Result<f32> {
        let core = self.shared.lock();
        check_index("parameter", index, core.io.get().num_parameters)?;
        core.native("get parameter", |p| p.get_parameter(index))
    }

    /// Values outside `0.0..=1.0` (and NaN) are rejected without a native call.
    pub fn set_parameter(&self, index: usize, value: f32) -> Result<()> {
        let core = self.shared.lock();
        check_index("parameter", index, core.io.get().num_parameters)?;
        if !(0.0..=1.0).contains(&value) {
            return Err(HostError::validation(
                "parameter value",
                format!("{} is outside 0..=1 (parameter {})", value, index),
            ));
        }
        core.native("set parameter", |p| p.set_parameter(index, value))
    }

    pub fn parameter_name(&self, index: usize) -> Result<String> {
        let core = self.shared.lock();
        check_index("parameter", index, core.io.get().num_parameters)?;
        core.native("get parameter name", |p| p.parameter_name(index))
    }

    pub fn parameter_display(&self, index: usize) -> Result<String> {
        let core = self.shared.lock();
        check_index("parameter", index, core.io.get().num_parameters)?;
        core.native("get parameter display", |p| p.parameter_display(index))
    }

    pub fn parameter_label(&self, index: usize) -> Result<String> {
        let core = self.shared.lock();
        check_index("parameter", index, core.io.get().num_parameters)?;
        core.native("get parameter label", |p| p.parameter_label(index))
    }

    pub fn is_parameter_automatable(&self, index: usize) -> Result<bool> {
        let core = self.shared.lock();
        check_index("parameter", index, core.io.get().num_parameters)?;
        core.native("query parameter automation", |p| p.is_parameter_automatable(index))
    }

    /// Name, value, display text and unit in one call.
    pub fn parameter_info(&self, index: usize) -> Result<ParameterSnapshot> {
        let core = self.shared.lock();
        check_index("parameter", index, core.io.get().num_parameters)?;
        core.native("get parameter", |p| ParameterSnapshot {
            index,
            name: p.parameter_name(index),
            value: p.get_parameter(index),
            display: p.parameter_display(index),
            label: p.parameter_label(index),
        })
    }

    // =========================================================================
    // Programs and chunks
    // =========================================================================

    pub fn program(&self) -> Result<usize> {
        self.shared.lock().native("get program", |p| p.program())
    }

    /// Selects a program. A visible parameter view is told about the change.
    pub fn set_program(&self, index: usize) -> Result<()> {
        let core = self.shared.lock();
        check_index("program", index, core.io.get().num_programs)?;
        core.native("set program", |p| p.set_program(index))?;
        if let Some(view) = core.visible_view() {
            view.update_program(index);
        }
        Ok(())
    }

    pub fn program_name(&self) -> Result<String> {
        self.shared
            .lock()
            .native("get program name", |p| p.program_name())
    }

    pub fn set_program_name(&self, name: &str) -> Result<()> {
        self.shared
            .lock()
            .native("set program name", |p| p.set_program_name(name))
    }

    /// `None` if the plugin cannot name programs other than the current one.
    pub fn program_name_at(&self, index: usize) -> Result<Option<String>> {
        let core = self.shared.lock();
        check_index("program", index, core.io.get().num_programs)?;
        core.native("get program name", |p| p.program_name_at(index))
    }

    pub fn program_chunk(&self) -> Result<Vec<u8>> {
        self.chunk(ChunkKind::Program, "get program chunk")
    }

    pub fn set_program_chunk(&self, data: &[u8]) -> Result<()> {
        self.set_chunk(ChunkKind::Program, data, "set program chunk")
    }

    pub fn bank_chunk(&self) -> Result<Vec<u8>> {
        self.chunk(ChunkKind::Bank, "get bank chunk")
    }

    pub fn set_bank_chunk(&self, data: &[u8]) -> Result<()> {
        self.set_chunk(ChunkKind::Bank, data, "set bank chunk")
    }

    fn chunk(&self, kind: ChunkKind, operation: &'static str) -> Result<Vec<u8>> {
        let core = self.shared.lock();
        if !core.info.borrow().programs_are_chunks {
            return Err(HostError::unsupported(operation, "plugin does not use chunks"));
        }
        core.native(operation, |p| p.chunk(kind))
    }

    fn set_chunk(&self, kind: ChunkKind, data: &[u8], operation: &'static str) -> Result<()> {
        let core = self.shared.lock();
        if !core.info.borrow().programs_are_chunks {
            return Err(HostError::unsupported(operation, "plugin does not use chunks"));
        }
        core.native(operation, |p| p.set_chunk(kind, data))
    }

    // =========================================================================
    // Transport and misc
    // =========================================================================

    pub fn set_tempo(&self, bpm: f64) -> Result<()> {
        if !(bpm.is_finite() && bpm > 0.0) {
            return Err(HostError::validation(
                "tempo",
                format!("{} is not a positive number", bpm),
            ));
        }
        let core = self.shared.lock();
        let mut time = core.time.get();
        time.tempo = bpm;
        core.native("set tempo", |p| p.update_time_info(&time))?;
        core.time.set(time);
        Ok(())
    }

    pub fn set_time_signature(&self, numerator: u32, denominator: u32) -> Result<()> {
        if numerator == 0 || denominator == 0 {
            return Err(HostError::validation(
                "time signature",
                format!("{}/{} must be positive", numerator, denominator),
            ));
        }
        let core = self.shared.lock();
        let mut time = core.time.get();
        time.time_sig_numerator = numerator;
        time.time_sig_denominator = denominator;
        core.native("set time signature", |p| p.update_time_info(&time))?;
        core.time.set(time);
        Ok(())
    }

    pub fn time_info(&self) -> TimeInfo {
        self.shared.lock().time.get()
    }

    /// Returns whether the plugin accepted the bypass request.
    pub fn set_bypass(&self, bypass: bool) -> Result<bool> {
        self.shared
            .lock()
            .native("set bypass", |p| p.set_bypass(bypass))
    }

    /// Gives the plugin's editor time to redraw.
    pub fn edit_idle(&self) -> Result<()> {
        self.shared.lock().native("edit idle", |p| p.edit_idle())
    }

    // =========================================================================
    // MIDI and processing
    // =========================================================================

    /// Queues an event for the next processing call.
    pub fn queue_midi(&self, event: MidiEvent) {
        let _core = self.shared.lock();
        self.shared.midi.enqueue(event);
    }

    pub fn pending_midi(&self) -> usize {
        let _core = self.shared.lock();
        self.shared.midi.len()
    }

    /// Runs `processReplacing` on `frames` samples, delivering every queued
    /// MIDI event first.
    ///
    /// Channel counts must equal the plugin's, and every buffer must hold at
    /// least `frames` samples. On any violation nothing reaches the plugin and
    /// queued MIDI stays queued.
    pub fn process_replacing(
        &self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
    ) -> Result<()> {
        const OP: &str = "process replacing";
        let core = self.shared.lock();
        core.require_on(OP)?;
        if !core.info.borrow().can_replacing {
            return Err(HostError::unsupported(OP, "plugin lacks processReplacing"));
        }
        core.check_buffers(OP, inputs, outputs, frames)?;
        let events = self.shared.midi.drain_all();
        core.native(OP, |p| p.process_replacing(&events, inputs, outputs, frames))
    }

    /// Legacy accumulating `process`. Refused for 2.4 plugins.
    pub fn process_accumulating(
        &self,
        inputs: &[&[f32]],
        outputs: &mut [&mut [f32]],
        frames: usize,
    ) -> Result<()> {
        const OP: &str = "process";
        let core = self.shared.lock();
        core.require_on(OP)?;
        if !core.policy(OP)?.supports_accumulating_process {
            return Err(HostError::unsupported(
                OP,
                format!("accumulating process is deprecated in {}", core.version.get()),
            ));
        }
        core.check_buffers(OP, inputs, outputs, frames)?;
        let events = self.shared.midi.drain_all();
        core.native(OP, |p| p.process_accumulating(&events, inputs, outputs, frames))
    }

    /// `processDoubleReplacing`. Requires a 2.4 plugin that supports it.
    pub fn process_double_replacing(
        &self,
        inputs: &[&[f64]],
        outputs: &mut [&mut [f64]],
        frames: usize,
    ) -> Result<()> {
        const OP: &str = "process double replacing";
        let core = self.shared.lock();
        core.require_on(OP)?;
        if !core.policy(OP)?.supports_double_precision {
            return Err(HostError::unsupported(
                OP,
                format!("{} has no double precision processing", core.version.get()),
            ));
        }
        if !core.info.borrow().can_double_replacing {
            return Err(HostError::unsupported(
                OP,
                "plugin lacks processDoubleReplacing",
            ));
        }
        core.check_buffers(OP, inputs, outputs, frames)?;
        let events = self.shared.midi.drain_all();
        core.native(OP, |p| {
            p.process_double_replacing(&events, inputs, outputs, frames)
        })
    }

    // =========================================================================
    // Listeners and parameter view
    // =========================================================================

    /// Returns `false` if the listener was already registered.
    pub fn add_listener(&self, listener: Arc<dyn HostListener>) -> bool {
        let core = self.shared.lock();
        let added = core.listeners.borrow_mut().add(listener);
        added
    }

    /// Returns `false` if the listener was not registered.
    pub fn remove_listener(&self, listener: &Arc<dyn HostListener>) -> bool {
        let core = self.shared.lock();
        let removed = core.listeners.borrow_mut().remove(listener);
        removed
    }

    pub fn listener_count(&self) -> usize {
        self.shared.lock().listeners.borrow().len()
    }

    /// Attaches a parameter view, replacing any previous one.
    pub fn set_view(&self, view: Arc<dyn ParameterView>) {
        let core = self.shared.lock();
        *core.view.borrow_mut() = Some(view);
    }

    pub fn remove_view(&self) -> Option<Arc<dyn ParameterView>> {
        let core = self.shared.lock();
        let view = core.view.borrow_mut().take();
        view
    }

    /// Shows the attached view. Returns `false` if no view is attached.
    pub fn open_view(&self) -> bool {
        self.set_view_visible(true)
    }

    /// Hides the attached view. Returns `false` if no view is attached.
    pub fn close_view(&self) -> bool {
        self.set_view_visible(false)
    }

    pub fn is_view_visible(&self) -> bool {
        self.shared.lock().visible_view().is_some()
    }

    fn set_view_visible(&self, visible: bool) -> bool {
        let core = self.shared.lock();
        let view = core.view.borrow().clone();
        match view {
            Some(view) => {
                view.set_visible(visible);
                true
            }
            None => false,
        }
    }

    // =========================================================================
    // Editor
    // =========================================================================

    /// Opens the plugin's editor on a background thread. No-op if already open.
    pub fn open_editor(&self, title: &str) -> Result<()> {
        const OP: &str = "open editor";
        let core = self.shared.lock();
        let mut slot = self.shared.editor.lock();
        if slot.as_ref().is_some_and(|e| e.is_open()) {
            return Ok(());
        }
        if !core.info.borrow().has_editor {
            return Err(HostError::unsupported(OP, "plugin has no editor"));
        }
        let editor = core
            .native(OP, |p| p.editor())?
            .ok_or_else(|| HostError::unsupported(OP, "plugin returned no editor"))?;
        *slot = Some(EditorHandle::spawn(editor, title.to_string())?);
        tracing::debug!("Opened editor \"{}\"", title);
        Ok(())
    }

    /// Asks the editor to close and blocks until its window is gone.
    ///
    /// The session lock is not held while waiting, so the editor can still
    /// call back into the session as it shuts down.
    pub fn close_editor(&self) -> Result<()> {
        let handle = self.shared.editor.lock().take();
        if let Some(handle) = handle {
            // Without a timeout the close always completes.
            let _ = handle.close(None);
            tracing::debug!("Editor closed");
        }
        Ok(())
    }

    /// Like [`close_editor`](Self::close_editor) but gives up after `timeout`.
    /// Returns whether the editor closed; if not it is still tracked as open.
    pub fn close_editor_timeout(&self, timeout: Duration) -> Result<bool> {
        let handle = self.shared.editor.lock().take();
        let Some(handle) = handle else {
            return Ok(true);
        };
        match handle.close(Some(timeout)) {
            Ok(()) => Ok(true),
            Err(handle) => {
                tracing::warn!("Editor did not close within {:?}", timeout);
                *self.shared.editor.lock() = Some(handle);
                Ok(false)
            }
        }
    }

    pub fn is_editor_open(&self) -> bool {
        self.shared
            .editor
            .lock()
            .as_ref()
            .is_some_and(|e| e.is_open())
    }
}

impl Drop for PluginSession {
    fn drop(&mut self) {
        let core = self.shared.lock();
        if core.lifecycle.get() == Lifecycle::Unloaded {
            return;
        }
        tracing::error!(
            "PluginSession for {} dropped without close(); native handle leaked",
            core.loader.source()
        );
        if let Ok(mut native) = core.native.try_borrow_mut() {
            if let Some(plugin) = native.take() {
                std::mem::forget(plugin);
            }
        }
        core.lifecycle.set(Lifecycle::Unloaded);
    }
}

impl std::fmt::Display for PluginSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.shared.lock();
        let info = core.info.borrow();
        write!(
            f,
            "{} by {} [{}] ({}, {})",
            info.product,
            info.vendor,
            info.unique_id,
            core.version.get(),
            core.lifecycle.get()
        )
    }
}

impl std::fmt::Debug for PluginSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let core = self.shared.lock();
        f.debug_struct("PluginSession")
            .field("source", &core.loader.source())
            .field("version", &core.version.get())
            .field("lifecycle", &core.lifecycle.get())
            .field("io", &core.io.get())
            .finish()
    }
}

/// One parameter as seen by the host.
#[derive(Debug, Clone, PartialEq)]
pub struct ParameterSnapshot {
    pub index: usize,
    pub name: String,
    pub value: f32,
    pub display: String,
    pub label: String,
}
