//! Fanning one error out to several handlers.
//!
//! A [`Composite`] holds an ordered, fixed list of handlers and passes every
//! error it receives to each of them. One destination failing must not stop
//! the others from receiving the error, so every call is isolated: a panic in
//! one handler is caught, logged, and the remaining handlers still run. Once
//! all of them have been called, the panic is raised again so the failure is
//! never silently swallowed:
//!
//! - a single panicking handler is resumed with its original payload,
//! - several panicking handlers are resumed with a [`HandlerPanics`] payload
//!   holding all of them, in handler order.
//!
//! The composite never closes or flushes the handlers it holds; their owners
//! remain responsible for that.

use std::{
    any::Any,
    borrow::Cow,
    fmt,
    panic::{self, AssertUnwindSafe},
    sync::Arc,
    thread,
};

use crate::{Error, Handler, recover::payload_text};

/// How a [`Composite`] invokes the handlers it holds.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum FanoutMode {
    /// One after the other, in construction order, on the calling thread.
    #[default]
    Sequential,
    /// All at once, each on its own scoped thread. `handle` returns once
    /// every handler has returned. No ordering between handlers is
    /// guaranteed.
    Parallel,
}

/// A [`Handler`] delegating to an ordered collection of handlers.
///
/// # Examples
///
/// ```
/// use faultline::{Composite, Error, Handler, TestHandler};
/// use std::sync::Arc;
///
/// let first = Arc::new(TestHandler::new());
/// let second = Arc::new(TestHandler::new());
/// let composite = Composite::new([
///     first.clone() as Arc<dyn Handler>,
///     second.clone() as Arc<dyn Handler>,
/// ]);
///
/// let error = Error::msg("error");
/// composite.handle(&error);
///
/// assert!(first.last().is_some_and(|e| e.ptr_eq(&error)));
/// assert!(second.last().is_some_and(|e| e.ptr_eq(&error)));
/// ```
#[derive(Clone)]
pub struct Composite {
    handlers: Vec<Arc<dyn Handler>>,
    mode: FanoutMode,
}

impl Composite {
    /// Creates a sequential composite from shared handlers.
    pub fn new<I>(handlers: I) -> Self
    where
        I: IntoIterator<Item = Arc<dyn Handler>>,
    {
        Self {
            handlers: handlers.into_iter().collect(),
            mode: FanoutMode::Sequential,
        }
    }

    /// Starts building a composite.
    pub fn builder() -> CompositeBuilder {
        CompositeBuilder::default()
    }

    /// Returns the number of held handlers.
    pub fn len(&self) -> usize {
        self.handlers.len()
    }

    /// Returns `true` if no handlers are held.
    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }

    /// Returns the fan-out mode.
    pub fn mode(&self) -> FanoutMode {
        self.mode
    }

    fn fan_out_sequential(&self, error: &Error) -> Vec<(usize, Box<dyn Any + Send>)> {
        self.handlers
            .iter()
            .enumerate()
            .filter_map(|(index, handler)| {
                panic::catch_unwind(AssertUnwindSafe(|| handler.handle(error)))
                    .err()
                    .map(|payload| (index, payload))
            })
            .collect()
    }

    fn fan_out_parallel(&self, error: &Error) -> Vec<(usize, Box<dyn Any + Send>)> {
        thread::scope(|scope| {
            let running: Vec<_> = self
                .handlers
                .iter()
                .map(|handler| scope.spawn(move || handler.handle(error)))
                .collect();
            running
                .into_iter()
                .enumerate()
                .filter_map(|(index, running)| running.join().err().map(|payload| (index, payload)))
                .collect()
        })
    }
}

impl Handler for Composite {
    fn handle(&self, error: &Error) {
        let mut panics = match self.mode {
            FanoutMode::Sequential => self.fan_out_sequential(error),
            FanoutMode::Parallel => self.fan_out_parallel(error),
        };

        for (index, payload) in &panics {
            tracing::error!(
                handler_index = index,
                handler_count = self.handlers.len(),
                error = %error,
                panic = %payload_text(&**payload).unwrap_or(Cow::Borrowed("Box<dyn Any>")),
                "handler panicked during fan-out"
            );
        }

        match panics.len() {
            0 => {}
            1 => {
                let (_, payload) = panics.remove(0);
                panic::resume_unwind(payload)
            }
            _ => panic::resume_unwind(Box::new(HandlerPanics {
                payloads: panics.into_iter().map(|(_, payload)| payload).collect(),
            })),
        }
    }
}

impl fmt::Debug for Composite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Composite")
            .field("handlers", &self.handlers.len())
            .field("mode", &self.mode)
            .finish()
    }
}

/// Builder for [`Composite`].
#[derive(Default)]
pub struct CompositeBuilder {
    handlers: Vec<Arc<dyn Handler>>,
    mode: FanoutMode,
}

impl CompositeBuilder {
    /// Appends an owned handler.
    pub fn handler<H>(mut self, handler: H) -> Self
    where
        H: Handler + 'static,
    {
        self.handlers.push(Arc::new(handler));
        self
    }

    /// Appends a shared handler; the caller keeps its own reference, for
    /// example to close it at shutdown.
    pub fn shared(mut self, handler: Arc<dyn Handler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Sets the fan-out mode.
    pub fn mode(mut self, mode: FanoutMode) -> Self {
        self.mode = mode;
        self
    }

    /// Builds the composite. The handler list cannot change afterwards.
    pub fn build(self) -> Composite {
        Composite {
            handlers: self.handlers,
            mode: self.mode,
        }
    }
}

/// The panic payload raised by a [`Composite`] when more than one of its
/// handlers panicked.
pub struct HandlerPanics {
    payloads: Vec<Box<dyn Any + Send>>,
}

impl HandlerPanics {
    /// Returns the original payloads, in handler order.
    pub fn payloads(&self) -> &[Box<dyn Any + Send>] {
        &self.payloads
    }

    /// Returns the text of every payload that carried one.
    pub fn messages(&self) -> impl Iterator<Item = Cow<'_, str>> {
        self.payloads
            .iter()
            .filter_map(|payload| payload_text(&**payload))
    }
}

impl fmt::Debug for HandlerPanics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.messages()).finish()
    }
}

impl fmt::Display for HandlerPanics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} handlers panicked", self.payloads.len())?;
        for message in self.messages() {
            write!(f, "; {message}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{TestHandler, handler_fn};

    fn panicking(message: &'static str) -> Arc<dyn Handler> {
        Arc::new(handler_fn(move |_: &Error| panic!("{message}")))
    }

    #[test]
    fn test_composite_send_sync() {
        static_assertions::assert_impl_all!(Composite: Handler, Send, Sync, Clone);
        static_assertions::assert_impl_all!(HandlerPanics: Send);
    }

    #[test]
    fn test_handlers_run_in_construction_order() {
        let order = Arc::new(std::sync::Mutex::new(Vec::new()));
        let recorder = |label: &'static str| {
            let order = order.clone();
            handler_fn(move |_: &Error| order.lock().unwrap().push(label))
        };
        let composite = Composite::builder()
            .handler(recorder("first"))
            .handler(recorder("second"))
            .handler(recorder("third"))
            .build();

        composite.handle(&Error::msg("error"));

        assert_eq!(*order.lock().unwrap(), ["first", "second", "third"]);
    }

    #[test]
    fn test_panic_is_isolated_then_resumed() {
        let first = Arc::new(TestHandler::new());
        let third = Arc::new(TestHandler::new());
        let composite = Composite::builder()
            .shared(first.clone())
            .shared(panicking("second failed"))
            .shared(third.clone())
            .build();
        let error = Error::msg("error");

        let payload = panic::catch_unwind(AssertUnwindSafe(|| composite.handle(&error)))
            .expect_err("panic resurfaces");

        assert!(first.last().is_some_and(|e| e.ptr_eq(&error)));
        assert!(third.last().is_some_and(|e| e.ptr_eq(&error)));
        assert_eq!(payload.downcast_ref::<String>().map(String::as_str), Some("second failed"));
    }

    #[test]
    fn test_multiple_panics_are_aggregated() {
        let last = Arc::new(TestHandler::new());
        let composite = Composite::builder()
            .shared(panicking("a"))
            .shared(panicking("b"))
            .shared(last.clone())
            .build();

        let payload = panic::catch_unwind(AssertUnwindSafe(|| composite.handle(&Error::msg("x"))))
            .expect_err("panic resurfaces");

        let panics = payload.downcast_ref::<HandlerPanics>().expect("aggregated");
        assert_eq!(panics.messages().collect::<Vec<_>>(), ["a", "b"]);
        assert_eq!(panics.to_string(), "2 handlers panicked; a; b");
        assert_eq!(last.count(), 1);
    }

    #[test]
    fn test_parallel_mode_reaches_every_handler() {
        let handlers: Vec<Arc<TestHandler>> = (0..4).map(|_| Arc::new(TestHandler::new())).collect();
        let composite = handlers
            .iter()
            .fold(Composite::builder().mode(FanoutMode::Parallel), |builder, h| {
                builder.shared(h.clone())
            })
            .build();
        let error = Error::msg("error");

        composite.handle(&error);

        assert_eq!(composite.mode(), FanoutMode::Parallel);
        assert!(handlers.iter().all(|h| h.last().is_some_and(|e| e.ptr_eq(&error))));
    }

    #[test]
    fn test_parallel_mode_resumes_panic() {
        let other = Arc::new(TestHandler::new());
        let composite = Composite::builder()
            .mode(FanoutMode::Parallel)
            .shared(panicking("parallel failure"))
            .shared(other.clone())
            .build();

        let outcome = panic::catch_unwind(AssertUnwindSafe(|| composite.handle(&Error::msg("x"))));

        assert!(outcome.is_err());
        assert_eq!(other.count(), 1);
    }

    #[test]
    fn test_empty_composite_is_noop() {
        let composite = Composite::new([]);
        assert!(composite.is_empty());
        composite.handle(&Error::msg("nobody listens"));
    }
}
