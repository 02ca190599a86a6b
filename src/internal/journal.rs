//! Per-thread journal of services registered while a module installs.
//!
//! `install_module` opens a frame before running the module's `configure`
//! callback. Registrations made on the same thread against the same registry
//! are recorded so a failed install can unregister them again.

use std::cell::RefCell;

thread_local! {
    static FRAMES: RefCell<Vec<Frame>> = const { RefCell::new(Vec::new()) };
}

struct Frame {
    registry: usize,
    services: Vec<String>,
}

/// Open journal frame; popped on [`InstallJournal::finish`] or drop.
pub(crate) struct InstallJournal {
    depth: usize,
    finished: bool,
}

impl InstallJournal {
    pub(crate) fn begin(registry: usize) -> Self {
        let depth = FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            frames.push(Frame {
                registry,
                services: Vec::new(),
            });
            frames.len()
        });
        Self { depth, finished: false }
    }

    /// Closes the frame and returns the services it recorded.
    pub(crate) fn finish(mut self) -> Vec<String> {
        self.finished = true;
        self.pop()
    }

    fn pop(&self) -> Vec<String> {
        FRAMES.with(|frames| {
            let mut frames = frames.borrow_mut();
            debug_assert_eq!(frames.len(), self.depth);
            frames.pop().map(|frame| frame.services).unwrap_or_default()
        })
    }
}

impl Drop for InstallJournal {
    fn drop(&mut self) {
        if !self.finished {
            self.pop();
        }
    }
}

/// Records a new registration in the innermost frame for `registry`.
pub(crate) fn record(registry: usize, service: &str) {
    FRAMES.with(|frames| {
        if let Some(frame) = frames.borrow_mut().last_mut() {
            if frame.registry == registry {
                frame.services.push(service.to_string());
            }
        }
    });
}
