/// Creates a root [`Error`](crate::Error) from a format string.
///
/// The arguments are interpreted the same way as the [`format!()`] macro. A
/// format string without arguments is stored without allocating.
///
/// [`format!()`]: std::format
///
/// # Examples
///
/// ```
/// use faultline::fault;
///
/// let error = fault!("connection to {} refused", "db-1");
/// assert_eq!(error.to_string(), "connection to db-1 refused");
/// assert!(error.predecessor().is_none());
/// ```
#[macro_export]
macro_rules! fault {
    ($($arg:tt)*) => {
        $crate::__private::format_error($crate::__private::format_args!($($arg)*))
    };
}

/// Return early with an error.
///
/// Constructs a new error using the same arguments as the [`fault!`] macro
/// and returns it wrapped in an `Err`. The error is converted with
/// [`Into`], so this also works in functions returning other error types
/// that can be built from an [`Error`](crate::Error).
///
/// # Examples
///
/// ```
/// use faultline::{Error, bail};
///
/// fn check(value: i32) -> Result<i32, Error> {
///     if value < 0 {
///         bail!("value must be non-negative, got {}", value);
///     }
///     Ok(value)
/// }
///
/// assert!(check(-1).is_err());
/// ```
#[macro_export]
macro_rules! bail {
    ($($arg:tt)*) => {
        return $crate::__private::Err($crate::fault!($($arg)*).into())
    };
}

/// Builds a [`Context`](crate::Context) from `key => value` pairs.
///
/// Pairs keep the order in which they are written.
///
/// # Examples
///
/// ```
/// use faultline::{context, fault};
///
/// let error = fault!("upload failed").with_context(context! {
///     "bucket" => "avatars",
///     "attempt" => 3,
/// });
///
/// let context = error.context();
/// let keys: Vec<&str> = context.keys().collect();
/// assert_eq!(keys, ["bucket", "attempt"]);
/// ```
#[macro_export]
macro_rules! context {
    () => {
        $crate::Context::new()
    };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut context = $crate::Context::new();
        $( context.push($key, $value); )+
        context
    }};
}
