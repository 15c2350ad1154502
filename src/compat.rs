//! Converting an [`Error`] into a boxed [`core::error::Error`] trait object.
//!
//! [`Error`] deliberately does not implement [`core::error::Error`] itself,
//! which is what allows the blanket `From` conversion used by `?`. Code
//! that must hand an error to an API expecting
//! `Box<dyn Error + Send + Sync>` converts it explicitly:
//!
//! ```
//! use faultline::{Error, fault};
//!
//! fn boxed() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
//!     Err(fault!("database connection failed").wrap("startup"))?
//! }
//!
//! let error = boxed().unwrap_err();
//! assert_eq!(error.to_string(), "startup: database connection failed");
//! ```

use core::fmt;

use crate::Error;

/// An [`Error`] presented through the [`core::error::Error`] trait.
///
/// The foreign error at the root of the chain, if any, is reported as the
/// [`source`](core::error::Error::source).
struct BoxedError(Error);

impl fmt::Display for BoxedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.0, f)
    }
}

impl fmt::Debug for BoxedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.0, f)
    }
}

impl core::error::Error for BoxedError {
    fn source(&self) -> Option<&(dyn core::error::Error + 'static)> {
        self.0.root_error()?.source()
    }
}

impl Error {
    /// Converts this error into a boxed [`core::error::Error`] trait object.
    ///
    /// Display and Debug output are those of the [`Error`].
    pub fn into_boxed_error(self) -> Box<dyn core::error::Error + Send + Sync + 'static> {
        Box::new(BoxedError(self))
    }
}

impl From<Error> for Box<dyn core::error::Error + Send + Sync + 'static> {
    fn from(error: Error) -> Self {
        error.into_boxed_error()
    }
}

impl From<Error> for Box<dyn core::error::Error + 'static> {
    fn from(error: Error) -> Self {
        error.into_boxed_error()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("request rejected")]
    struct Rejected {
        #[source]
        source: std::io::Error,
    }

    #[test]
    fn test_boxed_error_keeps_formatting() {
        let error = Error::msg("root").with_context([("k", "v")]).wrap("outer");
        let expected_debug = format!("{error:?}");
        let boxed = error.into_boxed_error();
        assert_eq!(boxed.to_string(), "outer: root");
        assert_eq!(format!("{boxed:?}"), expected_debug);
    }

    #[test]
    fn test_boxed_error_source_is_foreign_source() {
        let error = Error::new(Rejected {
            source: std::io::Error::other("connection reset"),
        });
        let boxed: Box<dyn core::error::Error + Send + Sync> = error.into();
        let source = boxed.source().expect("io source");
        assert_eq!(source.to_string(), "connection reset");
    }
}
