//! Observers of plugin-initiated notifications.
//!
//! Notifications arrive on whatever thread the plugin calls the host from.
//! Delivery is synchronous, in registration order, over a snapshot of the
//! registry so an observer may add or remove observers while being notified.

use crate::midi::MidiEvent;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

/// Error an observer may report. Logged, never propagated.
pub type ListenerError = Box<dyn std::error::Error + Send + Sync>;

pub type ListenerResult = std::result::Result<(), ListenerError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    Automate,
    IoChanged,
    BeginEdit,
    EndEdit,
    MidiOut,
}

/// Counts reported with an `ioChanged` notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IoChange {
    pub num_inputs: usize,
    pub num_outputs: usize,
    pub initial_delay: usize,
    pub num_parameters: usize,
}

/// Receives plugin notifications.
///
/// Every handler defaults to doing nothing, so an observer implements only
/// the events it cares about. [`HostListener::wants`] additionally keeps an
/// observer from being called at all for other kinds.
pub trait HostListener: Send + Sync {
    fn wants(&self, _kind: EventKind) -> bool {
        true
    }

    fn on_automate(&self, _index: usize, _value: f32) -> ListenerResult {
        Ok(())
    }

    fn on_io_changed(&self, _change: IoChange) -> ListenerResult {
        Ok(())
    }

    fn on_begin_edit(&self, _index: usize) -> ListenerResult {
        Ok(())
    }

    fn on_end_edit(&self, _index: usize) -> ListenerResult {
        Ok(())
    }

    fn on_midi_out(&self, _event: MidiEvent) -> ListenerResult {
        Ok(())
    }
}

type AutomateFn = Box<dyn Fn(usize, f32) -> ListenerResult + Send + Sync>;
type IoChangedFn = Box<dyn Fn(IoChange) -> ListenerResult + Send + Sync>;
type EditFn = Box<dyn Fn(usize) -> ListenerResult + Send + Sync>;
type MidiOutFn = Box<dyn Fn(MidiEvent) -> ListenerResult + Send + Sync>;

/// Listener assembled from closures; only the kinds given a closure are delivered.
///
/// ```
/// use minihost_plugin::FnListener;
///
/// let listener = FnListener::new().on_automate(|index, value| {
///     println!("param {index} -> {value}");
///     Ok(())
/// });
/// ```
#[derive(Default)]
pub struct FnListener {
    automate: Option<AutomateFn>,
    io_changed: Option<IoChangedFn>,
    begin_edit: Option<EditFn>,
    end_edit: Option<EditFn>,
    midi_out: Option<MidiOutFn>,
}

impl FnListener {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on_automate(
        mut self,
        f: impl Fn(usize, f32) -> ListenerResult + Send + Sync + 'static,
    ) -> Self {
        self.automate = Some(Box::new(f));
        self
    }

    pub fn on_io_changed(
        mut self,
        f: impl Fn(IoChange) -> ListenerResult + Send + Sync + 'static,
    ) -> Self {
        self.io_changed = Some(Box::new(f));
        self
    }

    pub fn on_begin_edit(
        mut self,
        f: impl Fn(usize) -> ListenerResult + Send + Sync + 'static,
    ) -> Self {
        self.begin_edit = Some(Box::new(f));
        self
    }

    pub fn on_end_edit(mut self, f: impl Fn(usize) -> ListenerResult + Send + Sync + 'static) -> Self {
        self.end_edit = Some(Box::new(f));
        self
    }

    pub fn on_midi_out(
        mut self,
        f: impl Fn(MidiEvent) -> ListenerResult + Send + Sync + 'static,
    ) -> Self {
        self.midi_out = Some(Box::new(f));
        self
    }

    pub fn into_arc(self) -> Arc<dyn HostListener> {
        Arc::new(self)
    }
}

impl HostListener for FnListener {
    fn wants(&self, kind: EventKind) -> bool {
        match kind {
            EventKind::Automate => self.automate.is_some(),
            EventKind::IoChanged => self.io_changed.is_some(),
            EventKind::BeginEdit => self.begin_edit.is_some(),
            EventKind::EndEdit => self.end_edit.is_some(),
            EventKind::MidiOut => self.midi_out.is_some(),
        }
    }

    fn on_automate(&self, index: usize, value: f32) -> ListenerResult {
        self.automate.as_ref().map_or(Ok(()), |f| f(index, value))
    }

    fn on_io_changed(&self, change: IoChange) -> ListenerResult {
        self.io_changed.as_ref().map_or(Ok(()), |f| f(change))
    }

    fn on_begin_edit(&self, index: usize) -> ListenerResult {
        self.begin_edit.as_ref().map_or(Ok(()), |f| f(index))
    }

    fn on_end_edit(&self, index: usize) -> ListenerResult {
        self.end_edit.as_ref().map_or(Ok(()), |f| f(index))
    }

    fn on_midi_out(&self, event: MidiEvent) -> ListenerResult {
        self.midi_out.as_ref().map_or(Ok(()), |f| f(event))
    }
}

/// Optional parameter view (a generic editor UI). Only updated while visible.
pub trait ParameterView: Send + Sync {
    fn is_visible(&self) -> bool;

    fn set_visible(&self, visible: bool);

    fn update_program(&self, index: usize);

    fn update_parameter(&self, index: usize, value: f32, display: &str);
}

fn same_listener(a: &Arc<dyn HostListener>, b: &Arc<dyn HostListener>) -> bool {
    // Compare data pointers only; vtable pointers may differ across codegen units.
    std::ptr::eq(
        Arc::as_ptr(a) as *const (),
        Arc::as_ptr(b) as *const (),
    )
}

/// Ordered set of observers, keyed by `Arc` identity.
#[derive(Default)]
pub struct ListenerRegistry {
    listeners: Vec<Arc<dyn HostListener>>,
}

impl ListenerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns `false` if the listener was already registered.
    pub fn add(&mut self, listener: Arc<dyn HostListener>) -> bool {
        if self.contains(&listener) {
            return false;
        }
        self.listeners.push(listener);
        true
    }

    /// Returns `false` if the listener was not registered.
    pub fn remove(&mut self, listener: &Arc<dyn HostListener>) -> bool {
        match self.listeners.iter().position(|l| same_listener(l, listener)) {
            Some(pos) => {
                self.listeners.remove(pos);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, listener: &Arc<dyn HostListener>) -> bool {
        self.listeners.iter().any(|l| same_listener(l, listener))
    }

    pub fn len(&self) -> usize {
        self.listeners.len()
    }

    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty()
    }

    pub fn snapshot(&self) -> Vec<Arc<dyn HostListener>> {
        self.listeners.clone()
    }
}

/// Delivers one notification to every listener in `snapshot` that wants it.
///
/// Returns how many listeners failed (error or panic).
pub(crate) fn deliver(
    snapshot: &[Arc<dyn HostListener>],
    kind: EventKind,
    notify: impl Fn(&dyn HostListener) -> ListenerResult,
) -> usize {
    let mut failures = 0;
    for (position, listener) in snapshot.iter().enumerate() {
        if !listener.wants(kind) {
            continue;
        }
        match catch_unwind(AssertUnwindSafe(|| notify(listener.as_ref()))) {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                failures += 1;
                tracing::error!("Listener {} failed on {:?}: {}", position, kind, e);
            }
            Err(panic) => {
                failures += 1;
                tracing::error!(
                    "Listener {} panicked on {:?}: {}",
                    position,
                    kind,
                    panic_message(&*panic)
                );
            }
        }
    }
    failures
}

pub(crate) fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
