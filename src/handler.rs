//! The [`Handler`] capability and small building blocks around it.
//!
//! A handler is anything that accepts a finished [`Error`] and reports it
//! somewhere: a log sink, a crash-reporting service, a metrics counter, or a
//! [`Composite`](crate::Composite) of several of those. The capability says
//! nothing about synchronicity, idempotence or failure handling; those are
//! properties of each implementation.
//!
//! # Examples
//!
//! ```
//! use faultline::{Error, Handler, HandlerExt, handler_fn};
//! use std::sync::atomic::{AtomicUsize, Ordering};
//!
//! let seen = AtomicUsize::new(0);
//! let counter = handler_fn(|_error: &Error| {
//!     seen.fetch_add(1, Ordering::Relaxed);
//! });
//!
//! let tagged = counter.with_context([("service", "billing")]);
//! tagged.handle(&Error::msg("card declined"));
//! assert_eq!(seen.load(Ordering::Relaxed), 1);
//! ```

use std::{fmt, sync::Arc};

use crate::{
    Error,
    context::{Context, Key, Value},
};

/// A reporting destination for errors.
///
/// `handle` may be called any number of times, including zero, from any
/// thread. Implementations only read the error; they may clone the handle to
/// keep it beyond the call.
pub trait Handler: Send + Sync {
    /// Reports `error`.
    fn handle(&self, error: &Error);
}

impl<H: Handler + ?Sized> Handler for &H {
    fn handle(&self, error: &Error) {
        (**self).handle(error)
    }
}

impl<H: Handler + ?Sized> Handler for Box<H> {
    fn handle(&self, error: &Error) {
        (**self).handle(error)
    }
}

impl<H: Handler + ?Sized> Handler for Arc<H> {
    fn handle(&self, error: &Error) {
        (**self).handle(error)
    }
}

/// A [`Handler`] calling a closure. Created by [`handler_fn`].
#[derive(Clone)]
pub struct HandlerFn<F> {
    f: F,
}

/// Wraps a closure into a [`Handler`].
pub fn handler_fn<F>(f: F) -> HandlerFn<F>
where
    F: Fn(&Error) + Send + Sync,
{
    HandlerFn { f }
}

impl<F> Handler for HandlerFn<F>
where
    F: Fn(&Error) + Send + Sync,
{
    fn handle(&self, error: &Error) {
        (self.f)(error)
    }
}

impl<F> fmt::Debug for HandlerFn<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "HandlerFn<{}>", core::any::type_name::<F>())
    }
}

/// A [`Handler`] that discards every error.
#[derive(Copy, Clone, Debug, Default)]
pub struct NopHandler;

impl Handler for NopHandler {
    fn handle(&self, _error: &Error) {}
}

/// A [`Handler`] that adds a fixed annotation set to every error before
/// passing it on. Created by [`HandlerExt::with_context`].
///
/// The set becomes the outermost layer, so its keys take precedence over the
/// same keys attached by the code that produced the error.
#[derive(Clone, Debug)]
pub struct WithContextHandler<H> {
    inner: H,
    context: Context,
}

impl<H> WithContextHandler<H> {
    /// Returns the wrapped handler.
    pub fn into_inner(self) -> H {
        self.inner
    }
}

impl<H: Handler> Handler for WithContextHandler<H> {
    fn handle(&self, error: &Error) {
        let error = error.clone().with_context(self.context.clone());
        self.inner.handle(&error)
    }
}

/// Extension methods available on every [`Handler`].
pub trait HandlerExt: Handler + Sized {
    /// Adds `pairs` to every error passed to this handler.
    fn with_context<I, K, V>(self, pairs: I) -> WithContextHandler<Self>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        WithContextHandler {
            inner: self,
            context: pairs.into_iter().collect(),
        }
    }
}

impl<H: Handler> HandlerExt for H {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::TestHandler;

    #[test]
    fn test_handler_object_safe() {
        static_assertions::assert_obj_safe!(Handler);
        static_assertions::assert_impl_all!(NopHandler: Handler, Copy);
        static_assertions::assert_impl_all!(Arc<dyn Handler>: Handler);
        static_assertions::assert_impl_all!(Box<dyn Handler>: Handler);
    }

    #[test]
    fn test_handler_fn_receives_identical_error() {
        let error = Error::msg("error");
        let matched = std::sync::atomic::AtomicBool::new(false);
        let handler = handler_fn(|received: &Error| {
            matched.store(received.ptr_eq(&error), std::sync::atomic::Ordering::SeqCst);
        });
        handler.handle(&error);
        assert!(matched.load(std::sync::atomic::Ordering::SeqCst));
    }

    #[test]
    fn test_with_context_handler_overrides_keys() {
        let captured = TestHandler::new();
        let handler = (&captured).with_context([("env", "prod"), ("host", "a")]);
        let error = Error::msg("error").with_context([("host", "b"), ("user", "7")]);

        handler.handle(&error);

        let last = captured.last().expect("handled");
        assert!(last.predecessor().is_some_and(|p| p.ptr_eq(&error)));
        let keys: Vec<String> = last.context().keys().map(str::to_string).collect();
        assert_eq!(keys, ["env", "host", "user"]);
        assert_eq!(last.context().get("host").and_then(Value::as_str), Some("a"));
        assert!(error.context().get("env").is_none());
    }
}
