//! Reporting panics without suppressing them.
//!
//! [`handle_recover`] is a reporting tap on the unwind path: it runs a
//! closure, and if a panic escapes from it, the panic is converted into an
//! [`Error`], handed to a [`Handler`], and then resumed with its original
//! payload. The caller observes exactly the panic it would have observed
//! without the tap.
//!
//! ```should_panic
//! use faultline::{TestHandler, handle_recover};
//!
//! let handler = TestHandler::new();
//! handle_recover(&handler, || {
//!     panic!("worker crashed");
//! });
//! ```

use std::{
    any::Any,
    borrow::Cow,
    fmt,
    panic::{self, AssertUnwindSafe},
};

use crate::{Error, Handler};

/// The root error of a recovered panic whose payload was not an [`Error`].
///
/// Panics raised with `panic!` carry a `&'static str` or a `String`; that
/// text becomes the message. Any other payload type cannot be inspected
/// without knowing it, so it is recorded as opaque.
///
/// # Examples
///
/// ```
/// use faultline::{PanicError, recover};
///
/// let error = recover(&String::from("index out of bounds"));
/// let panic = error.downcast_ref::<PanicError>().expect("panic root");
/// assert_eq!(panic.message(), "index out of bounds");
/// assert!(!panic.is_opaque());
/// ```
#[derive(Clone, Debug)]
pub struct PanicError {
    message: Cow<'static, str>,
    opaque: bool,
}

impl PanicError {
    /// Returns the panic message.
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Returns `true` if the payload was neither text nor an error, so no
    /// message could be extracted from it.
    pub fn is_opaque(&self) -> bool {
        self.opaque
    }
}

impl fmt::Display for PanicError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.message)
    }
}

impl core::error::Error for PanicError {}

pub(crate) fn payload_text(payload: &(dyn Any + Send)) -> Option<Cow<'_, str>> {
    if let Some(message) = payload.downcast_ref::<&'static str>() {
        Some(Cow::Borrowed(message))
    } else if let Some(message) = payload.downcast_ref::<String>() {
        Some(Cow::Borrowed(message))
    } else if let Some(error) = payload.downcast_ref::<Error>() {
        Some(Cow::Owned(error.to_string()))
    } else if let Some(error) = payload.downcast_ref::<Box<dyn core::error::Error + Send + Sync>>()
    {
        Some(Cow::Owned(error.to_string()))
    } else {
        None
    }
}

/// Converts a panic payload into an [`Error`].
///
/// - A payload that already is an [`Error`] (as raised by [`panic_on_err`])
///   is returned as-is.
/// - A `&'static str` or `String` payload becomes a root [`PanicError`]
///   whose message is that text.
/// - A boxed `core::error::Error` becomes a root [`PanicError`] carrying its
///   display text only. The payload is borrowed and must be resumed as it
///   is, so the boxed value and its concrete type are not reachable through
///   [`Error::downcast_ref`]. Panic with an [`Error`] (see [`panic_on_err`])
///   to keep the underlying value inspectable.
/// - Anything else becomes an opaque [`PanicError`].
pub fn recover(payload: &(dyn Any + Send)) -> Error {
    if let Some(error) = payload.downcast_ref::<Error>() {
        return error.clone();
    }
    let panic = match payload_text(payload) {
        Some(message) => PanicError {
            message: Cow::Owned(message.into_owned()),
            opaque: false,
        },
        None => PanicError {
            message: Cow::Borrowed("Box<dyn Any>"),
            opaque: true,
        },
    };
    Error::new(panic)
}

/// Runs `f`, reporting a panic escaping from it to `handler` before letting
/// it continue.
///
/// If `f` returns normally its value is returned and the handler is not
/// called. If `f` panics, the payload is converted with [`recover`], passed
/// to `handler`, and the unwind is resumed with the original payload. A panic
/// raised by the handler itself is logged and dropped, so reporting can never
/// replace the original failure.
///
/// # Examples
///
/// ```
/// use faultline::{Error, TestHandler, handle_recover};
///
/// let handler = TestHandler::new();
/// let outcome: std::thread::Result<()> = std::panic::catch_unwind(|| {
///     handle_recover(&handler, || {
///         std::panic::panic_any(Error::msg("error"));
///     })
/// });
///
/// assert!(outcome.is_err());
/// assert_eq!(handler.last().map(|e| e.to_string()).as_deref(), Some("error"));
/// ```
pub fn handle_recover<H, F, R>(handler: &H, f: F) -> R
where
    H: Handler + ?Sized,
    F: FnOnce() -> R,
{
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(value) => value,
        Err(payload) => {
            let error = recover(&*payload);
            tracing::debug!(error = %error, "reporting recovered panic");
            if let Err(handler_panic) =
                panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&error)))
            {
                let handler_panic =
                    payload_text(&*handler_panic).unwrap_or(Cow::Borrowed("Box<dyn Any>"));
                tracing::error!(
                    error = %error,
                    handler_panic = %handler_panic,
                    "handler panicked while reporting a recovered panic"
                );
            }
            panic::resume_unwind(payload)
        }
    }
}

/// Escalates an error into a panic.
///
/// `Ok(value)` returns `value`. `Err(error)` panics with the converted
/// [`Error`] as payload, which [`recover`] and [`handle_recover`] turn back
/// into that same error.
///
/// # Examples
///
/// ```
/// use faultline::{Error, panic_on_err, recover};
///
/// assert_eq!(panic_on_err(Ok::<_, Error>(3)), 3);
///
/// let payload = std::panic::catch_unwind(|| {
///     panic_on_err(Err::<(), _>(Error::msg("invariant violated")));
/// })
/// .unwrap_err();
/// assert_eq!(recover(&*payload).to_string(), "invariant violated");
/// ```
#[track_caller]
pub fn panic_on_err<T, E>(result: Result<T, E>) -> T
where
    E: Into<Error>,
{
    match result {
        Ok(value) => value,
        Err(error) => panic::panic_any::<Error>(error.into()),
    }
}
