#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! `tracing` integration for faultline.
//!
//! This crate connects faultline errors to the `tracing` ecosystem in both
//! directions:
//!
//! - [`TracingHandler`] is a [`Handler`] destination that emits one tracing
//!   event per reported error, carrying the merged context as a field.
//! - [`SpanExt::with_span_context`] records the tracing span an error was
//!   created in as context on the error itself, so destinations that know
//!   nothing about tracing still see where the failure happened.
//!
//! # Quick Start
//!
//! ```
//! use faultline::{Composite, Error, Handler};
//! use faultline_tracing::{FaultlineLayer, SpanExt, TracingHandler};
//! use tracing_subscriber::{Registry, layer::SubscriberExt};
//!
//! // 1. Add FaultlineLayer to the subscriber (required for span context)
//! let subscriber = Registry::default()
//!     .with(FaultlineLayer)
//!     .with(tracing_subscriber::fmt::layer());
//!
//! tracing::subscriber::with_default(subscriber, || {
//!     // 2. Record the current span on errors as they are created
//!     #[tracing::instrument(fields(user_id = 42))]
//!     fn load_profile() -> Result<(), Error> {
//!         Err(Error::msg("profile not found").with_span_context())
//!     }
//!
//!     // 3. Report errors as tracing events
//!     let handler = Composite::builder().handler(TracingHandler::new()).build();
//!     if let Err(error) = load_profile() {
//!         handler.handle(&error);
//!     }
//! });
//! ```
//!
//! # Environment Variables
//!
//! - `FAULTLINE_TRACING` - Comma-separated options:
//!   - `stack_traces` - Include the rendered stack snapshot in every event
//!     emitted by [`TracingHandler`]

use std::{
    fmt::{self, Write as _},
    sync::OnceLock,
};

use faultline::{Context, Error, Handler};
use tracing::{
    Level, Span,
    field::{Field, Visit},
};
use tracing_subscriber::registry::LookupSpan;

/// The context key under which [`SpanExt::with_span_context`] records the
/// span path.
pub const SPAN_CONTEXT_KEY: &str = "span";

/// Field values recorded for a span, rendered as `name=value` pairs.
#[derive(Clone, Default)]
struct CapturedFields(String);

struct FieldVisitor<'a> {
    output: &'a mut String,
}

impl Visit for FieldVisitor<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        if !self.output.is_empty() {
            self.output.push(' ');
        }
        let _ = write!(self.output, "{}={:?}", field.name(), value);
    }
}

/// A tracing layer that remembers span field values so they can be recorded
/// on errors.
///
/// **Required for [`SpanExt`].** Add this to your subscriber alongside your
/// other layers. Without it, span names are still recorded but their fields
/// are not.
///
/// # Examples
///
/// ```
/// use faultline_tracing::FaultlineLayer;
/// use tracing_subscriber::{Registry, layer::SubscriberExt};
///
/// let subscriber = Registry::default()
///     .with(FaultlineLayer)
///     .with(tracing_subscriber::fmt::layer());
///
/// tracing::subscriber::set_global_default(subscriber).expect("failed to set subscriber");
/// ```
#[derive(Copy, Clone, Debug, Default)]
pub struct FaultlineLayer;

impl<S> tracing_subscriber::Layer<S> for FaultlineLayer
where
    S: tracing::Subscriber + for<'a> LookupSpan<'a>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut fields = CapturedFields::default();
        attrs.record(&mut FieldVisitor {
            output: &mut fields.0,
        });
        span.extensions_mut().insert(fields);
    }

    fn on_record(
        &self,
        id: &tracing::span::Id,
        values: &tracing::span::Record<'_>,
        ctx: tracing_subscriber::layer::Context<'_, S>,
    ) {
        let Some(span) = ctx.span(id) else {
            return;
        };
        let mut extensions = span.extensions_mut();
        if let Some(fields) = extensions.get_mut::<CapturedFields>() {
            values.record(&mut FieldVisitor {
                output: &mut fields.0,
            });
        }
    }
}

/// Renders the current span and its ancestors, outermost first, as
/// `outer{a=1} > inner{b=2}`.
///
/// Returns `None` when there is no current span or the subscriber is not
/// built on a [`tracing_subscriber::Registry`].
pub fn current_span_path() -> Option<String> {
    let span = Span::current();
    span.with_subscriber(|(span_id, dispatch)| {
        let registry = dispatch.downcast_ref::<tracing_subscriber::Registry>()?;
        let span_ref = registry.span(span_id)?;

        let mut path = String::new();
        for ancestor in span_ref.scope().from_root() {
            if !path.is_empty() {
                path.push_str(" > ");
            }
            path.push_str(ancestor.name());
            let extensions = ancestor.extensions();
            if let Some(fields) = extensions.get::<CapturedFields>()
                && !fields.0.is_empty()
            {
                let _ = write!(path, "{{{}}}", fields.0);
            }
        }
        Some(path)
    })
    .flatten()
}

/// Extension trait recording the current tracing span on errors.
///
/// # Examples
///
/// ```
/// use faultline::Error;
/// use faultline_tracing::{FaultlineLayer, SPAN_CONTEXT_KEY, SpanExt};
/// use tracing_subscriber::{Registry, layer::SubscriberExt};
///
/// let subscriber = Registry::default().with(FaultlineLayer);
/// let error = tracing::subscriber::with_default(subscriber, || {
///     let _guard = tracing::info_span!("checkout", order = 17).entered();
///     Error::msg("payment declined").with_span_context()
/// });
///
/// let span = error.context().get(SPAN_CONTEXT_KEY).map(|v| v.to_string());
/// assert_eq!(span.as_deref(), Some("checkout{order=17}"));
/// ```
pub trait SpanExt: Sized {
    /// Adds the path of the current span as context under
    /// [`SPAN_CONTEXT_KEY`]. Outside of any span, nothing is added.
    fn with_span_context(self) -> Self;
}

impl SpanExt for Error {
    fn with_span_context(self) -> Self {
        match current_span_path() {
            Some(path) => self.with_context([(SPAN_CONTEXT_KEY, path)]),
            None => self,
        }
    }
}

impl<T> SpanExt for Result<T, Error> {
    fn with_span_context(self) -> Self {
        self.map_err(SpanExt::with_span_context)
    }
}

#[derive(Debug)]
struct FaultlineTracingEnvOptions {
    stack_traces: bool,
}

impl FaultlineTracingEnvOptions {
    fn get() -> &'static Self {
        static FAULTLINE_TRACING_FLAGS: OnceLock<FaultlineTracingEnvOptions> = OnceLock::new();

        FAULTLINE_TRACING_FLAGS.get_or_init(|| {
            let mut stack_traces = false;

            if let Some(var) = std::env::var_os("FAULTLINE_TRACING") {
                for v in var.to_string_lossy().split(',') {
                    if v.eq_ignore_ascii_case("stack_traces") {
                        stack_traces = true;
                    }
                }
            }

            FaultlineTracingEnvOptions { stack_traces }
        })
    }
}

/// A [`Handler`] emitting one tracing event per reported error.
///
/// Events use the target `faultline` and carry these fields:
///
/// - `error`: the display text of the error,
/// - `context`: the merged context rendered as `key=value` pairs,
/// - `has_stack_trace`: whether the chain holds a stack snapshot,
/// - `stack_trace`: the rendered snapshot, only if enabled.
///
/// # Examples
///
/// ```
/// use faultline::{Error, Handler};
/// use faultline_tracing::TracingHandler;
///
/// let handler = TracingHandler::new().level(tracing::Level::WARN);
/// handler.handle(&Error::msg("cache miss storm").with_context([("shard", 3)]));
/// ```
#[derive(Copy, Clone, Debug)]
pub struct TracingHandler {
    level: Level,
    include_stack_trace: bool,
}

impl TracingHandler {
    /// Creates a handler emitting at [`Level::ERROR`].
    ///
    /// Whether stack snapshots are included is controlled by the
    /// `FAULTLINE_TRACING` environment variable.
    pub fn new() -> Self {
        Self {
            level: Level::ERROR,
            include_stack_trace: FaultlineTracingEnvOptions::get().stack_traces,
        }
    }

    /// Sets the level events are emitted at.
    pub fn level(mut self, level: Level) -> Self {
        self.level = level;
        self
    }

    /// Sets whether the rendered stack snapshot is added to every event.
    pub fn include_stack_trace(mut self, include: bool) -> Self {
        self.include_stack_trace = include;
        self
    }
}

impl Default for TracingHandler {
    fn default() -> Self {
        Self::new()
    }
}

/// Renders a context as space-separated `key=value` pairs.
pub fn render_context(context: &Context) -> String {
    let mut rendered = String::new();
    for (key, value) in context.iter() {
        if !rendered.is_empty() {
            rendered.push(' ');
        }
        let _ = write!(rendered, "{key}={value}");
    }
    rendered
}

impl Handler for TracingHandler {
    fn handle(&self, error: &Error) {
        let context = render_context(&error.context());
        let has_stack_trace = error.has_stack_trace();
        let stack_trace = self
            .include_stack_trace
            .then(|| error.stack_trace().map(ToString::to_string))
            .flatten();

        macro_rules! emit {
            ($event:ident) => {
                tracing::$event!(
                    target: "faultline",
                    error = %error,
                    context = %context,
                    has_stack_trace,
                    stack_trace = stack_trace.as_deref(),
                    "error reported"
                )
            };
        }

        if self.level == Level::ERROR {
            emit!(error)
        } else if self.level == Level::WARN {
            emit!(warn)
        } else if self.level == Level::INFO {
            emit!(info)
        } else if self.level == Level::DEBUG {
            emit!(debug)
        } else {
            emit!(trace)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_render_context() {
        let context: Context = [("a", "1"), ("b", "two")].into_iter().collect();
        assert_eq!(render_context(&context), "a=1 b=two");
        assert_eq!(render_context(&Context::new()), "");
    }

    #[test]
    fn test_outside_span_adds_nothing() {
        let error = Error::msg("error");
        let same = error.clone().with_span_context();
        assert!(same.ptr_eq(&error));
    }

    #[test]
    fn test_handler_is_copy() {
        let handler = TracingHandler::new().level(Level::INFO);
        let copy = handler;
        assert_eq!(copy.level, handler.level);
    }
}
