//! Editor open/close handshake.
//!
//! The editor runs on its own thread, blocked inside the native window loop.
//! When the window closes that thread raises an [`EditorSignal`]; whoever asked
//! for the close waits on it.

use crate::listener::panic_message;
use crate::native::NativeEditor;
use parking_lot::{Condvar, Mutex};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

/// One-shot "editor closed" signal.
#[derive(Debug, Default)]
pub struct EditorSignal {
    closed: Mutex<bool>,
    cond: Condvar,
}

impl EditorSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notify_closed(&self) {
        let mut closed = self.closed.lock();
        *closed = true;
        self.cond.notify_all();
    }

    pub fn is_closed(&self) -> bool {
        *self.closed.lock()
    }

    /// Blocks until the signal is raised.
    pub fn wait(&self) {
        let mut closed = self.closed.lock();
        while !*closed {
            self.cond.wait(&mut closed);
        }
    }

    /// Blocks until the signal is raised or `timeout` elapses.
    /// Returns whether the signal was raised.
    pub fn wait_for(&self, timeout: Duration) -> bool {
        let deadline = Instant::now() + timeout;
        let mut closed = self.closed.lock();
        while !*closed {
            if self.cond.wait_until(&mut closed, deadline).timed_out() {
                return *closed;
            }
        }
        true
    }
}

/// A running editor thread.
pub(crate) struct EditorHandle {
    signal: Arc<EditorSignal>,
    request_close: Arc<dyn Fn() + Send + Sync>,
    thread: Option<JoinHandle<()>>,
}

impl EditorHandle {
    pub(crate) fn spawn(mut editor: Box<dyn NativeEditor>, title: String) -> std::io::Result<Self> {
        let signal = Arc::new(EditorSignal::new());
        let request_close = editor.close_requester();
        let thread_signal = Arc::clone(&signal);

        let thread = std::thread::Builder::new()
            .name(format!("editor: {}", title))
            .spawn(move || {
                tracing::debug!("Editor thread started for {}", title);
                if let Err(panic) = catch_unwind(AssertUnwindSafe(|| editor.run(&title))) {
                    tracing::error!("Editor for {} panicked: {}", title, panic_message(&*panic));
                }
                drop(editor);
                thread_signal.notify_closed();
                tracing::debug!("Editor thread for {} finished", title);
            })?;

        Ok(Self {
            signal,
            request_close,
            thread: Some(thread),
        })
    }

    pub(crate) fn is_open(&self) -> bool {
        !self.signal.is_closed()
    }

    pub(crate) fn request_close(&self) {
        if self.is_open() {
            (self.request_close)();
        }
    }

    /// Requests closure and waits for the editor thread. `None` waits forever.
    /// On timeout the handle is handed back so the caller can keep tracking it.
    pub(crate) fn close(mut self, timeout: Option<Duration>) -> Result<(), Self> {
        self.request_close();
        let closed = match timeout {
            None => {
                self.signal.wait();
                true
            }
            Some(timeout) => self.signal.wait_for(timeout),
        };
        if !closed {
            return Err(self);
        }
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                tracing::error!("Editor thread terminated abnormally");
            }
        }
        Ok(())
    }
}
