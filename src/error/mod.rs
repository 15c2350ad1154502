//! The [`Error`] handle and the layers it is built from.

pub(crate) mod iter;

use std::{borrow::Cow, fmt};

use triomphe::Arc;

use self::iter::Layers;
use crate::{
    context::{self, Context, Key, Value},
    stack::{StackFilter, StackTrace},
};

/// An error value made of a chain of immutable layers.
///
/// The outermost layer is the one most recently added. Every layer either
/// originates the failure (it has no [predecessor](Error::predecessor)) or
/// wraps the layer that was outermost before it, adding one of:
///
/// - a message prefix ([`Error::wrap`]),
/// - a set of key/value annotations ([`Error::with_context`]),
/// - a stack snapshot ([`Error::with_stack_trace`]),
/// - an HTTP request descriptor (`Error::with_http_request`, feature `http`).
///
/// Cloning an [`Error`] only increments a reference count; clones share the
/// same layers and compare equal under [`Error::ptr_eq`].
///
/// Because a new layer can only point at a layer that already exists, a chain
/// can never contain a cycle, and walking from any layer towards the root
/// always terminates.
///
/// # Examples
///
/// ```
/// use faultline::Error;
///
/// let io = std::io::Error::new(std::io::ErrorKind::NotFound, "config.toml");
/// let error = Error::new(io)
///     .wrap("failed to load configuration")
///     .with_context([("path", "config.toml")]);
///
/// assert_eq!(
///     error.to_string(),
///     "failed to load configuration: config.toml"
/// );
/// assert_eq!(error.layers().count(), 3);
/// assert!(error.downcast_ref::<std::io::Error>().is_some());
/// ```
#[derive(Clone)]
#[must_use]
pub struct Error {
    layer: Arc<Layer>,
}

pub(crate) struct Layer {
    kind: LayerKind,
    predecessor: Option<Error>,
}

impl Drop for Layer {
    // Unlink uniquely owned predecessors one at a time so that dropping a
    // long chain does not recurse once per layer.
    fn drop(&mut self) {
        let mut next = self.predecessor.take();
        while let Some(mut error) = next {
            next = match Arc::get_mut(&mut error.layer) {
                Some(layer) => layer.predecessor.take(),
                None => None,
            };
        }
    }
}

pub(crate) enum LayerKind {
    Message(Cow<'static, str>),
    Foreign(Box<dyn core::error::Error + Send + Sync + 'static>, &'static str),
    Wrap(Cow<'static, str>),
    Context(Context),
    Stack(Arc<StackTrace>),
    #[cfg(feature = "http")]
    Request(crate::http::HttpRequest),
}

impl Error {
    /// Creates a root error from a foreign error value.
    ///
    /// The value stays reachable through [`Error::downcast_ref`], and its own
    /// [`source`](core::error::Error::source) chain is printed by the
    /// [`Debug`](fmt::Debug) implementation.
    pub fn new<E>(error: E) -> Self
    where
        E: core::error::Error + Send + Sync + 'static,
    {
        Self::from_kind(
            LayerKind::Foreign(Box::new(error), core::any::type_name::<E>()),
            None,
        )
    }

    /// Creates a root error from a message.
    ///
    /// # Examples
    ///
    /// ```
    /// use faultline::Error;
    ///
    /// let error = Error::msg("error");
    /// assert_eq!(error.to_string(), "error");
    /// ```
    pub fn msg<M>(message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        Self::from_kind(LayerKind::Message(message.into()), None)
    }

    /// Creates a root error from an already boxed foreign error.
    pub fn from_boxed(error: Box<dyn core::error::Error + Send + Sync + 'static>) -> Self {
        Self::from_kind(
            LayerKind::Foreign(error, "Box<dyn core::error::Error>"),
            None,
        )
    }

    fn from_kind(kind: LayerKind, predecessor: Option<Error>) -> Self {
        Self {
            layer: Arc::new(Layer { kind, predecessor }),
        }
    }

    pub(crate) fn push(self, kind: LayerKind) -> Self {
        Self::from_kind(kind, Some(self))
    }

    pub(crate) fn kind(&self) -> &LayerKind {
        &self.layer.kind
    }

    /// Adds a layer whose message prefixes the message of this error.
    ///
    /// # Examples
    ///
    /// ```
    /// use faultline::Error;
    ///
    /// let error = Error::msg("timed out").wrap("fetching profile");
    /// assert_eq!(error.to_string(), "fetching profile: timed out");
    /// ```
    pub fn wrap<M>(self, message: M) -> Self
    where
        M: Into<Cow<'static, str>>,
    {
        self.push(LayerKind::Wrap(message.into()))
    }

    /// Adds a layer carrying a set of key/value annotations.
    ///
    /// Annotations already attached further in remain reachable; when the
    /// same key appears at several layers, [`Error::context`] reports the
    /// outermost value. An empty set adds no layer.
    ///
    /// # Examples
    ///
    /// ```
    /// use faultline::Error;
    ///
    /// let error = Error::msg("error")
    ///     .with_context([("a", "1")])
    ///     .with_context([("a", "2"), ("b", "3")]);
    ///
    /// let context = error.context();
    /// let pairs: Vec<(&str, String)> = context
    ///     .iter()
    ///     .map(|(k, v)| (k, v.to_string()))
    ///     .collect();
    /// assert_eq!(pairs, [("a", "2".to_string()), ("b", "3".to_string())]);
    /// ```
    pub fn with_context<I, K, V>(self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<Key>,
        V: Into<Value>,
    {
        let set: Context = pairs.into_iter().collect();
        if set.is_empty() {
            self
        } else {
            self.push(LayerKind::Context(set))
        }
    }

    /// Returns the merged annotations of the whole chain.
    ///
    /// This is the same as [`extract_context`](crate::extract_context).
    pub fn context(&self) -> Context {
        context::extract_context(self)
    }

    /// Returns the annotations attached by the outermost layer only.
    pub fn own_context(&self) -> Option<&Context> {
        match self.kind() {
            LayerKind::Context(set) => Some(set),
            _ => None,
        }
    }

    /// Captures the current call stack and adds it as a new layer.
    ///
    /// If a stack snapshot is already reachable from this error, it is
    /// returned unchanged: a chain never holds more than the snapshot taken
    /// closest to where the failure originated. Capture is also skipped when
    /// disabled through the `FAULTLINE_BACKTRACE=off` environment variable.
    ///
    /// # Examples
    ///
    /// ```
    /// use faultline::Error;
    ///
    /// let error = Error::msg("error").with_stack_trace().with_stack_trace();
    /// let snapshots = error
    ///     .layers()
    ///     .filter(|layer| layer.own_stack_trace().is_some())
    ///     .count();
    /// assert_eq!(snapshots, usize::from(error.has_stack_trace()));
    /// ```
    #[inline(never)]
    pub fn with_stack_trace(self) -> Self {
        self.with_stack_trace_filtered(&StackFilter::new_from_env())
    }

    #[inline(never)]
    pub(crate) fn with_stack_trace_filtered(self, filter: &StackFilter) -> Self {
        if !filter.enabled || self.has_stack_trace() {
            return self;
        }
        let trace = StackTrace::capture(filter);
        self.push(LayerKind::Stack(Arc::new(trace)))
    }

    /// Makes the stack snapshot of the chain available on the outermost
    /// layer.
    ///
    /// If some layer holds a snapshot but the outermost one does not, a new
    /// outer layer sharing that same snapshot is added. Otherwise the error
    /// is returned unchanged. Afterwards [`Error::own_stack_trace`] answers
    /// whether the chain carries a trace at all.
    ///
    /// # Examples
    ///
    /// ```
    /// use faultline::Error;
    ///
    /// let error = Error::msg("error")
    ///     .with_stack_trace()
    ///     .with_context([("request_id", 7)]);
    /// assert!(error.own_stack_trace().is_none());
    ///
    /// let exposed = error.expose_stack_trace();
    /// assert_eq!(exposed.own_stack_trace().is_some(), exposed.has_stack_trace());
    /// ```
    pub fn expose_stack_trace(self) -> Self {
        if self.own_stack_trace().is_some() {
            return self;
        }
        let shared = self.layers().find_map(|layer| match layer.kind() {
            LayerKind::Stack(trace) => Some(trace.clone()),
            _ => None,
        });
        match shared {
            Some(trace) => self.push(LayerKind::Stack(trace)),
            None => self,
        }
    }

    /// Returns `true` if any layer of the chain holds a stack snapshot.
    pub fn has_stack_trace(&self) -> bool {
        self.stack_trace().is_some()
    }

    /// Returns the first stack snapshot found scanning from the outermost
    /// layer inwards.
    pub fn stack_trace(&self) -> Option<&StackTrace> {
        self.layers().find_map(Error::own_stack_trace)
    }

    /// Returns the stack snapshot held by the outermost layer only.
    pub fn own_stack_trace(&self) -> Option<&StackTrace> {
        match self.kind() {
            LayerKind::Stack(trace) => Some(trace),
            _ => None,
        }
    }

    /// Returns the layer this one wraps, or `None` for the root.
    pub fn predecessor(&self) -> Option<&Error> {
        self.layer.predecessor.as_ref()
    }

    /// Returns the innermost layer, the one that originated the failure.
    pub fn root_cause(&self) -> &Error {
        let mut current = self;
        while let Some(predecessor) = current.predecessor() {
            current = predecessor;
        }
        current
    }

    /// Iterates over every layer from this one down to the root.
    pub fn layers(&self) -> Layers<'_> {
        Layers::new(self)
    }

    /// Returns the foreign error value at the root of the chain, if the
    /// error was created from one.
    pub fn root_error(&self) -> Option<&(dyn core::error::Error + Send + Sync + 'static)> {
        match self.root_cause().kind() {
            LayerKind::Foreign(error, _) => Some(&**error),
            _ => None,
        }
    }

    /// Returns the name of the type the chain originated from.
    ///
    /// This is the Rust type name of the foreign error given to
    /// [`Error::new`], or `"faultline::Error"` for errors created from a
    /// message. Reporting services use it to group errors.
    ///
    /// # Examples
    ///
    /// ```
    /// use faultline::Error;
    ///
    /// let error = Error::new(std::io::Error::other("disk full")).wrap("saving");
    /// assert!(error.type_name().starts_with("std::io::"));
    /// assert_eq!(Error::msg("error").type_name(), "faultline::Error");
    /// ```
    pub fn type_name(&self) -> &'static str {
        match self.root_cause().kind() {
            LayerKind::Foreign(_, type_name) => type_name,
            _ => "faultline::Error",
        }
    }

    /// Looks for a value of type `E` in the foreign error at the root and
    /// its source chain.
    ///
    /// # Examples
    ///
    /// ```
    /// use faultline::{Error, PanicError, recover};
    ///
    /// let error = recover(&"boom");
    /// let panic = error.downcast_ref::<PanicError>().expect("recovered panic");
    /// assert_eq!(panic.message(), "boom");
    /// ```
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: core::error::Error + 'static,
    {
        let root: &(dyn core::error::Error + 'static) = self.root_error()?;
        core::iter::successors(Some(root), |error| error.source())
            .find_map(|error| error.downcast_ref::<E>())
    }

    /// Returns `true` if both handles point at the same outermost layer.
    pub fn ptr_eq(&self, other: &Error) -> bool {
        Arc::ptr_eq(&self.layer, &other.layer)
    }

    /// Returns the message of the outermost layer that carries one, without
    /// any prefixes added by [`Error::wrap`].
    pub fn message(&self) -> Cow<'_, str> {
        for layer in self.layers() {
            match layer.kind() {
                LayerKind::Message(message) => return Cow::Borrowed(message),
                LayerKind::Foreign(error, _) => return Cow::Owned(error.to_string()),
                _ => {}
            }
        }
        Cow::Borrowed("")
    }

    fn foreign_sources(&self) -> impl Iterator<Item = &(dyn core::error::Error + 'static)> {
        let first = self.root_error().and_then(|error| error.source());
        core::iter::successors(first, |error| error.source())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for layer in self.layers() {
            match layer.kind() {
                LayerKind::Message(message) => return f.write_str(message),
                LayerKind::Foreign(error, _) => return fmt::Display::fmt(error, f),
                LayerKind::Wrap(message) => write!(f, "{message}: ")?,
                _ => {}
            }
        }
        Ok(())
    }
}

impl fmt::Debug for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if f.alternate() {
            let mut list = f.debug_list();
            for layer in self.layers() {
                list.entry(layer.kind());
            }
            return list.finish();
        }

        write!(f, "{self}")?;

        let context = self.context();
        if !context.is_empty() {
            write!(f, "\n\nContext:")?;
            for (key, value) in context.iter() {
                write!(f, "\n    {key} = {value}")?;
            }
        }

        let mut sources = self.foreign_sources().peekable();
        if sources.peek().is_some() {
            write!(f, "\n\nCaused by:")?;
            for (index, source) in sources.enumerate() {
                write!(f, "\n    {index}: {source}")?;
            }
        }

        #[cfg(feature = "http")]
        if let Some(request) = self.http_request() {
            write!(f, "\n\nRequest:\n    {} {}", request.method(), request.uri())?;
        }

        if let Some(trace) = self.stack_trace()
            && !trace.is_empty()
        {
            write!(f, "\n\nStack trace:\n{trace}")?;
        }

        Ok(())
    }
}

impl fmt::Debug for LayerKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LayerKind::Message(message) => f.debug_tuple("Message").field(message).finish(),
            LayerKind::Foreign(error, type_name) => f
                .debug_struct("Foreign")
                .field("type", type_name)
                .field("error", error)
                .finish(),
            LayerKind::Wrap(message) => f.debug_tuple("Wrap").field(message).finish(),
            LayerKind::Context(set) => f.debug_tuple("Context").field(set).finish(),
            LayerKind::Stack(trace) => f
                .debug_struct("Stack")
                .field("frames", &trace.frames().len())
                .finish(),
            #[cfg(feature = "http")]
            LayerKind::Request(request) => f.debug_tuple("Request").field(request).finish(),
        }
    }
}

impl<E> From<E> for Error
where
    E: core::error::Error + Send + Sync + 'static,
{
    fn from(error: E) -> Self {
        Error::new(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("query failed")]
    struct QueryError {
        #[source]
        source: std::io::Error,
    }

    #[test]
    fn test_error_send_sync() {
        static_assertions::assert_impl_all!(Error: Send, Sync, Clone, Unpin);
        static_assertions::assert_not_impl_any!(Error: Copy, core::error::Error);
        static_assertions::assert_eq_size!(Error, usize);
    }

    #[test]
    fn test_root_has_no_predecessor() {
        let error = Error::msg("root");
        assert!(error.predecessor().is_none());
        assert!(error.root_cause().ptr_eq(&error));
        assert_eq!(error.layers().count(), 1);
    }

    #[test]
    fn test_wrapping_keeps_predecessor() {
        let root = Error::msg("root");
        let wrapped = root.clone().with_context([("k", "v")]);
        assert!(wrapped.predecessor().is_some_and(|p| p.ptr_eq(&root)));
        assert!(wrapped.root_cause().ptr_eq(&root));
        assert!(!wrapped.ptr_eq(&root));
    }

    #[test]
    fn test_wrapping_with_itself_terminates() {
        let error = Error::msg("root");
        let again = error.clone().wrap("outer").wrap("outer");
        assert_eq!(again.layers().count(), 3);
        assert_eq!(again.to_string(), "outer: outer: root");
    }

    #[test]
    fn test_empty_context_adds_no_layer() {
        let error = Error::msg("root");
        let same = error.clone().with_context(Vec::<(&str, &str)>::new());
        assert!(same.ptr_eq(&error));
    }

    #[test]
    fn test_display_skips_annotation_layers() {
        let error = Error::msg("root")
            .with_context([("a", 1)])
            .wrap("middle")
            .with_stack_trace()
            .wrap("outer");
        assert_eq!(error.to_string(), "outer: middle: root");
        assert_eq!(error.message(), "root");
    }

    #[test]
    fn test_downcast_walks_foreign_sources() {
        let error = Error::new(QueryError {
            source: std::io::Error::other("disk on fire"),
        })
        .wrap("loading user");

        assert!(error.downcast_ref::<QueryError>().is_some());
        let io = error.downcast_ref::<std::io::Error>().expect("io source");
        assert_eq!(io.to_string(), "disk on fire");
        assert!(Error::msg("plain").downcast_ref::<std::io::Error>().is_none());
    }

    #[test]
    fn test_debug_lists_context_and_sources() {
        let error = Error::new(QueryError {
            source: std::io::Error::other("disk on fire"),
        })
        .with_context([("table", "users")]);

        let debug = format!("{error:?}");
        assert!(debug.starts_with("query failed"));
        assert!(debug.contains("table = users"));
        assert!(debug.contains("0: disk on fire"));
    }

    #[test]
    fn test_stack_trace_is_captured_once() {
        let filter = StackFilter {
            enabled: true,
            ..StackFilter::DEFAULT
        };
        let error = Error::msg("error").with_stack_trace_filtered(&filter);
        let again = error.clone().with_stack_trace_filtered(&filter);

        assert!(again.has_stack_trace());
        assert!(again.ptr_eq(&error));
        let snapshots = again
            .layers()
            .filter(|layer| layer.own_stack_trace().is_some())
            .count();
        assert_eq!(snapshots, 1);
    }

    #[test]
    fn test_disabled_filter_adds_no_layer() {
        let filter = StackFilter {
            enabled: false,
            ..StackFilter::DEFAULT
        };
        let error = Error::msg("error");
        let same = error.clone().with_stack_trace_filtered(&filter);
        assert!(same.ptr_eq(&error));
        assert!(!same.has_stack_trace());
    }

    #[test]
    fn test_dropping_deep_chain() {
        let mut error = Error::msg("root");
        for attempt in 0..200_000u32 {
            error = error.with_context([("attempt", attempt)]);
        }
        assert_eq!(error.layers().count(), 200_001);
        drop(error);
    }

    #[test]
    fn test_dropping_chain_keeps_shared_tail() {
        let mut shared = Error::msg("root");
        for index in 0..1_000u32 {
            shared = shared.with_context([("index", index)]);
        }
        let outer = shared.clone().wrap("outer");
        drop(outer);
        assert_eq!(shared.layers().count(), 1_001);
        assert_eq!(shared.root_cause().to_string(), "root");
    }

    #[test]
    fn test_question_mark_conversion() {
        fn parse(input: &str) -> Result<u32, Error> {
            Ok(input.parse::<u32>()?)
        }

        let error = parse("nope").unwrap_err();
        assert!(error.downcast_ref::<core::num::ParseIntError>().is_some());
    }
}
