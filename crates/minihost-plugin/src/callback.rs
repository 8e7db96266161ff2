//! Host side of plugin-initiated calls.

use crate::listener::panic_message;
use crate::midi::MidiEvent;
use crate::session::{Notification, SessionShared};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Weak;

/// Handle a plugin uses to reach its host.
///
/// Handed to [`crate::NativeLoader::load`] and kept by the plugin. Methods may
/// be called from any thread, never panic, never block on the session lock,
/// and do nothing once the owning session is gone.
///
/// Notifications are queued on the session. If no session call is in progress
/// they are delivered before the method returns; otherwise they are delivered
/// when the current call completes.
#[derive(Clone, Default)]
pub struct HostCallback {
    session: Weak<SessionShared>,
    deferred: bool,
}

impl HostCallback {
    pub(crate) fn new(session: Weak<SessionShared>) -> Self {
        Self {
            session,
            deferred: false,
        }
    }

    /// A callback not attached to any session.
    pub fn detached() -> Self {
        Self::default()
    }

    /// A copy that only queues notifications and leaves delivery to the next
    /// session call or [`HostCallback::flush`].
    ///
    /// For call sites that hold a lock of their own while the plugin calls
    /// back, where running listeners inline could deadlock.
    pub fn deferred(&self) -> Self {
        Self {
            session: self.session.clone(),
            deferred: true,
        }
    }

    pub fn is_attached(&self) -> bool {
        self.session.strong_count() > 0
    }

    /// Delivers queued notifications if the session is idle.
    pub fn flush(&self) {
        self.dispatch("flush", |s| s.flush_notifications());
    }

    /// `audioMasterAutomate`
    pub fn automate(&self, index: usize, value: f32) {
        self.notify("automate", Notification::Automate { index, value });
    }

    /// `audioMasterIOChanged`. The session re-reads I/O counts before notifying.
    pub fn io_changed(&self) {
        self.notify("io changed", Notification::IoChanged);
    }

    /// `audioMasterBeginEdit`
    pub fn begin_edit(&self, index: usize) {
        self.notify("begin edit", Notification::BeginEdit(index));
    }

    /// `audioMasterEndEdit`
    pub fn end_edit(&self, index: usize) {
        self.notify("end edit", Notification::EndEdit(index));
    }

    /// `audioMasterProcessEvents`
    pub fn midi_out(&self, event: MidiEvent) {
        self.notify("midi out", Notification::MidiOut(event));
    }

    fn notify(&self, what: &'static str, notification: Notification) {
        if self.deferred {
            self.dispatch(what, |s| s.queue(notification));
        } else {
            self.dispatch(what, |s| s.post(notification));
        }
    }

    fn dispatch(&self, what: &'static str, f: impl FnOnce(&SessionShared)) {
        let Some(session) = self.session.upgrade() else {
            tracing::trace!("Dropping {} callback: session closed", what);
            return;
        };
        if let Err(panic) = catch_unwind(AssertUnwindSafe(|| f(&session))) {
            tracing::error!("Host callback {} panicked: {}", what, panic_message(&*panic));
        }
    }
}

impl std::fmt::Debug for HostCallback {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HostCallback")
            .field("attached", &self.is_attached())
            .field("deferred", &self.deferred)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_detached_callback_is_inert() {
        let callback = HostCallback::detached();
        assert!(!callback.is_attached());
        callback.automate(0, 0.5);
        callback.io_changed();
        callback.begin_edit(0);
        callback.end_edit(0);
        callback.midi_out(MidiEvent::note_on(0, 60, 100));
        callback.flush();
        assert_eq!(
            format!("{:?}", callback),
            "HostCallback { attached: false, deferred: false }"
        );
        assert_eq!(
            format!("{:?}", callback.deferred()),
            "HostCallback { attached: false, deferred: true }"
        );
    }
}
