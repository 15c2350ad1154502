//! An in-memory [`Handler`] for tests.

use std::sync::{
    Mutex, PoisonError,
    atomic::{AtomicUsize, Ordering},
};

use crate::{Error, Handler};

/// A [`Handler`] remembering the last error it received.
///
/// Each call to [`handle`](Handler::handle) replaces the remembered error
/// and increments a counter. Under concurrent use the remembered error is
/// whichever call stored last; no ordering with respect to the counter is
/// implied.
///
/// # Examples
///
/// ```
/// use faultline::{Error, Handler, TestHandler};
///
/// let handler = TestHandler::new();
/// assert!(handler.last().is_none());
///
/// handler.handle(&Error::msg("first"));
/// handler.handle(&Error::msg("second"));
///
/// assert_eq!(handler.last().map(|e| e.to_string()).as_deref(), Some("second"));
/// assert_eq!(handler.count(), 2);
/// ```
#[derive(Debug, Default)]
pub struct TestHandler {
    last: Mutex<Option<Error>>,
    count: AtomicUsize,
}

impl TestHandler {
    /// Creates a handler that has not seen any error yet.
    pub const fn new() -> Self {
        Self {
            last: Mutex::new(None),
            count: AtomicUsize::new(0),
        }
    }

    /// Returns the most recently handled error.
    pub fn last(&self) -> Option<Error> {
        self.last
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Returns how many errors were handled.
    pub fn count(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }

    /// Forgets the remembered error and resets the counter.
    pub fn clear(&self) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = None;
        self.count.store(0, Ordering::SeqCst);
    }
}

impl Handler for TestHandler {
    fn handle(&self, error: &Error) {
        *self.last.lock().unwrap_or_else(PoisonError::into_inner) = Some(error.clone());
        self.count.fetch_add(1, Ordering::SeqCst);
    }
}
