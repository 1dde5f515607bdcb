//! Joinable thread handles that shut their thread down when dropped.

use std::thread::JoinHandle;

/// Calls its shutdown function and joins the thread on drop.
pub struct ThreadHandler {
    shutdown: Option<Box<dyn FnOnce() + Send>>,
    handle: Option<JoinHandle<()>>,
}

impl ThreadHandler {
    /// Wrap `handle`; `shutdown` must make the thread's loop return.
    #[must_use]
    pub fn new(shutdown: Box<dyn FnOnce() + Send>, handle: JoinHandle<()>) -> Self {
        Self {
            shutdown: Some(shutdown),
            handle: Some(handle),
        }
    }
}

impl Drop for ThreadHandler {
    fn drop(&mut self) {
        if let Some(shutdown) = self.shutdown.take() {
            shutdown();
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}
