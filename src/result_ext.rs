use std::borrow::Cow;

use crate::{
    Error,
    context::{Key, Value},
};

mod sealed {
    pub trait Sealed {}
    impl<T, E> Sealed for Result<T, E> {}
}

/// Extension methods for adding layers to the error of a [`Result`].
///
/// Every method converts the error into an [`Error`] first, so they can be
/// chained directly on results carrying any foreign error type.
///
/// # Examples
///
/// ```
/// use faultline::{Error, prelude::*};
///
/// fn read_config(path: &str) -> Result<String, Error> {
///     std::fs::read_to_string(path)
///         .wrap("reading configuration")
///         .with_context([("path", path.to_string())])
/// }
///
/// let error = read_config("/does/not/exist.toml").unwrap_err();
/// assert!(error.to_string().starts_with("reading configuration: "));
/// assert!(error.downcast_ref::<std::io::Error>().is_some());
/// ```
pub trait ResultExt<T, E>: sealed::Sealed {
    /// Converts the error into an [`Error`] without adding a layer.
    fn into_error(self) -> Result<T, Error>
    where
        E: Into<Error>;

    /// Adds a layer of key/value annotations to the error.
    ///
    /// See [`Error::with_context`].
    fn with_context<I, K, V>(self, pairs: I) -> Result<T, Error>
    where
        E: Into<Error>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>;

    /// Like [`ResultExt::with_context`], but only builds the annotations if
    /// there is an error.
    fn with_context_lazy<F, I, K, V>(self, pairs: F) -> Result<T, Error>
    where
        E: Into<Error>,
        F: FnOnce() -> I,
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>;

    /// Adds a message prefix to the error.
    ///
    /// See [`Error::wrap`].
    fn wrap<M>(self, message: M) -> Result<T, Error>
    where
        E: Into<Error>,
        M: Into<Cow<'static, str>>;

    /// Captures the call stack into the error.
    ///
    /// See [`Error::with_stack_trace`].
    fn with_stack_trace(self) -> Result<T, Error>
    where
        E: Into<Error>;
}

impl<T, E> ResultExt<T, E> for Result<T, E> {
    #[inline]
    fn into_error(self) -> Result<T, Error>
    where
        E: Into<Error>,
    {
        self.map_err(Into::into)
    }

    #[inline]
    fn with_context<I, K, V>(self, pairs: I) -> Result<T, Error>
    where
        E: Into<Error>,
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        self.map_err(|error| error.into().with_context(pairs))
    }

    #[inline]
    fn with_context_lazy<F, I, K, V>(self, pairs: F) -> Result<T, Error>
    where
        E: Into<Error>,
        F: FnOnce() -> I,
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        self.map_err(|error| error.into().with_context(pairs()))
    }

    #[inline]
    fn wrap<M>(self, message: M) -> Result<T, Error>
    where
        E: Into<Error>,
        M: Into<Cow<'static, str>>,
    {
        self.map_err(|error| error.into().wrap(message))
    }

    #[inline(never)]
    fn with_stack_trace(self) -> Result<T, Error>
    where
        E: Into<Error>,
    {
        match self {
            Ok(value) => Ok(value),
            Err(error) => Err(error.into().with_stack_trace()),
        }
    }
}
