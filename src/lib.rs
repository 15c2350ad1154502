#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]
// Make docs.rs generate better docs
#![cfg_attr(docsrs, feature(doc_cfg))]

//! Attach context to errors as they propagate, then dispatch them to
//! pluggable reporting handlers.
//!
//! ## Overview
//!
//! Application code rarely knows where its errors end up. A failed database
//! query might be logged, sent to a crash-reporting service and counted in a
//! metrics sink, all at once, and the code that produced the error should not
//! care. This crate separates the two halves:
//!
//! - **Capturing**: an [`Error`] is a chain of immutable layers. Each time the
//!   error crosses a function boundary you can wrap it with key/value
//!   [`Context`], a [`StackTrace`], a message prefix or (with the `http`
//!   feature) the originating HTTP request. Nothing that was attached earlier
//!   is ever lost.
//! - **Dispatching**: at a boundary (end of a request, top of a thread) the
//!   finished error is handed to a [`Handler`]. A [`Composite`] handler fans
//!   it out to any number of destinations, each of which extracts the context
//!   and stack trace it needs on its own terms.
//!
//! ## Quick Example
//!
//! ```
//! use faultline::{Composite, Error, TestHandler, handle_if_err, prelude::*};
//! use std::sync::Arc;
//!
//! fn load_user(id: u64) -> Result<String, Error> {
//!     Err(fault!("user not found"))
//!         .with_context([("user_id", id)])
//!         .with_stack_trace()
//! }
//!
//! let captured = Arc::new(TestHandler::new());
//! let handler = Composite::builder().shared(captured.clone()).build();
//!
//! assert_eq!(handle_if_err(&handler, load_user(42)), None);
//!
//! let error = captured.last().expect("error was dispatched");
//! assert_eq!(error.to_string(), "user not found");
//! assert_eq!(error.context().get("user_id"), Some(&42u64.into()));
//! assert!(error.has_stack_trace());
//! ```
//!
//! ## Core Concepts
//!
//! An [`Error`] is a pointer-sized, cheaply cloneable handle to the outermost
//! layer of a chain. Every layer either *originates* the failure (a message,
//! a foreign [`core::error::Error`], or a recovered panic) or *wraps* a
//! predecessor. Layers are never mutated after creation, so the same error
//! can be handed to several destinations, stored in a queue, or sent to
//! another thread without copying.
//!
//! Context extraction walks the chain from the outermost layer inwards and
//! merges every annotation set it finds. When the same key was attached at
//! several points, the outermost (most recently attached) value wins, so more
//! specific context added late in the propagation overrides general context
//! added early.
//!
//! ## Dispatch Helpers
//!
//! - [`handle_if_err`] reports the error of a `Result`, if any.
//! - [`handle_recover`] runs a closure and reports a panic escaping from it,
//!   then lets the panic continue unwinding.
//! - [`panic_on_err`] escalates an error into a panic that [`handle_recover`]
//!   turns back into the same error.
//!
//! ## Ecosystem
//!
//! Concrete destinations live in companion crates:
//!
//! - **`faultline-tracing`** - emits one `tracing` event per error.
//! - **`faultline-notifier`** - sends Airbrake-compatible notices from a
//!   bounded background queue.

#[macro_use]
mod macros;

pub mod composite;
pub mod context;
pub mod handler;
#[cfg(feature = "http")]
#[cfg_attr(docsrs, doc(cfg(feature = "http")))]
pub mod http;
pub mod prelude;
pub mod recover;
pub mod stack;
pub mod testing;

mod compat;
mod dispatch;
mod error;
mod result_ext;

pub use self::{
    composite::{Composite, FanoutMode, HandlerPanics},
    context::{Context, Key, Value, extract_context},
    dispatch::handle_if_err,
    error::{Error, iter::Layers},
    handler::{Handler, HandlerExt, HandlerFn, NopHandler, handler_fn},
    recover::{PanicError, handle_recover, panic_on_err, recover},
    result_ext::ResultExt,
    stack::StackTrace,
    testing::TestHandler,
};

/// A [`Result`](core::result::Result) type alias where the error is [`Error`].
///
/// # Examples
///
/// ```
/// fn might_fail() -> faultline::Result<u32> {
///     Ok(7)
/// }
/// ```
pub type Result<T, E = Error> = core::result::Result<T, E>;

// Not public API. Referenced by macro-generated code.
#[doc(hidden)]
pub mod __private {
    #[doc(hidden)]
    pub use core::{format_args, result::Result::Err};

    use crate::Error;

    #[doc(hidden)]
    #[inline]
    #[cold]
    #[must_use]
    pub fn format_error(args: core::fmt::Arguments<'_>) -> Error {
        if let Some(message) = args.as_str() {
            Error::msg(message)
        } else {
            Error::msg(std::fmt::format(args))
        }
    }
}
