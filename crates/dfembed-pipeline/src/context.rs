//! Per-run shared state handed to every worker and to the drain consumer.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use dfembed_core::error::Error;

#[derive(Debug, Default)]
pub struct RunContext {
    cancelled: AtomicBool,
    chunks_completed: AtomicUsize,
    first_error: Mutex<Option<Error>>,
}

impl RunContext {
    pub fn new() -> Self { Self::default() }

    pub fn is_cancelled(&self) -> bool { self.cancelled.load(Ordering::Acquire) }

    /// Record `err` as the terminal error unless one is already set, and cancel the run.
    /// Returns true when `err` became the terminal error.
    pub fn fail(&self, err: Error) -> bool {
        let first = {
            let mut slot = self.first_error.lock().unwrap_or_else(|p| p.into_inner());
            if slot.is_none() { *slot = Some(err); true } else { false }
        };
        self.cancelled.store(true, Ordering::Release);
        first
    }

    pub fn take_error(&self) -> Option<Error> {
        self.first_error.lock().unwrap_or_else(|p| p.into_inner()).take()
    }

    pub fn chunk_completed(&self) { self.chunks_completed.fetch_add(1, Ordering::AcqRel); }

    pub fn chunks_completed(&self) -> usize { self.chunks_completed.load(Ordering::Acquire) }
}
