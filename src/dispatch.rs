use crate::{Error, Handler};

/// Reports the error of `result` to `handler`, if there is one.
///
/// `Ok(value)` returns `Some(value)` without touching the handler.
/// `Err(error)` converts the error into an [`Error`] (an existing [`Error`]
/// is passed through unchanged), calls [`Handler::handle`] once,
/// synchronously, and returns `None`.
///
/// This is the counterpart of [`handle_recover`](crate::handle_recover) for
/// call sites that already hold a `Result` rather than a panic.
///
/// # Examples
///
/// ```
/// use faultline::{Error, TestHandler, handle_if_err};
///
/// let handler = TestHandler::new();
///
/// assert_eq!(handle_if_err(&handler, Ok::<_, Error>(1)), Some(1));
/// assert!(handler.last().is_none());
///
/// let error = Error::msg("error");
/// assert_eq!(handle_if_err(&handler, Err::<(), _>(error.clone())), None);
/// assert!(handler.last().is_some_and(|last| last.ptr_eq(&error)));
/// ```
pub fn handle_if_err<H, T, E>(handler: &H, result: Result<T, E>) -> Option<T>
where
    H: Handler + ?Sized,
    E: Into<Error>,
{
    match result {
        Ok(value) => Some(value),
        Err(error) => {
            handler.handle(&error.into());
            None
        }
    }
}
