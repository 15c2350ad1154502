#![deny(
    missing_docs,
    unsafe_code,
    rustdoc::invalid_rust_codeblocks,
    rustdoc::broken_intra_doc_links,
    missing_copy_implementations,
    unused_doc_comments
)]

//! Airbrake-compatible error notices for faultline.
//!
//! [`Notifier`] is a [`Handler`] that turns every reported error into an
//! Airbrake v3 [`Notice`] and posts it to an Airbrake or Errbit server. The
//! notice carries:
//!
//! - the error message and root type, plus the foreign causes,
//! - the stack snapshot of the chain as the backtrace,
//! - the HTTP request recorded with `Error::with_http_request`, if any,
//! - the merged error context as `params`.
//!
//! # Delivery
//!
//! By default notices are queued on a bounded queue drained by background
//! workers, and [`Handler::handle`] returns immediately. When the queue is
//! full, the [`QueueFullPolicy`] decides between waiting for a free slot
//! (the default, which keeps call order), delivering on the calling thread,
//! or evicting the oldest notice. Delivery failures are
//! logged through `tracing` and counted in [`NotifierStats`]; they never
//! reach the code that reported the error.
//!
//! The workers are stopped by [`Notifier::close`], which delivers what is
//! still queued first. Dropping the notifier closes it as well.
//!
//! # Examples
//!
//! ```no_run
//! use faultline::{Composite, Error, Handler};
//! use faultline_notifier::{Notifier, NotifierConfig};
//! use std::{sync::Arc, time::Duration};
//!
//! let notifier = Arc::new(Notifier::new(NotifierConfig::new(1, "project-key"))?);
//! let handler = Composite::builder().shared(notifier.clone()).build();
//!
//! handler.handle(&Error::msg("payment declined").with_context([("order", 17)]));
//!
//! notifier.flush(Duration::from_secs(5))?;
//! notifier.close()?;
//! # Ok::<(), faultline_notifier::NotifierError>(())
//! ```

mod config;
mod error;
mod notice;
mod transport;
mod worker;

use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    time::Duration,
};

use faultline::{Error, Handler};

pub use self::{
    config::{NotifierConfig, QueueFullPolicy},
    error::NotifierError,
    notice::{Notice, NoticeContext, NoticeError, NotifierInfo, StackFrame},
    transport::{HttpTransport, Transport},
    worker::NotifierStats,
};
use self::worker::{Progress, Queue, deliver};

/// A [`Handler`] delivering errors as Airbrake notices.
pub struct Notifier {
    config: NotifierConfig,
    transport: Arc<dyn Transport>,
    progress: Arc<Progress>,
    queue: Option<Queue>,
    closed: AtomicBool,
}

impl Notifier {
    /// Creates a notifier posting to the host of `config` over HTTP.
    pub fn new(config: NotifierConfig) -> Result<Self, NotifierError> {
        let transport = HttpTransport::new(&config)?;
        Self::with_transport(config, transport)
    }

    /// Creates a notifier delivering through `transport`.
    ///
    /// If `config` selects asynchronous delivery, the worker threads are
    /// started here.
    pub fn with_transport<T>(config: NotifierConfig, transport: T) -> Result<Self, NotifierError>
    where
        T: Transport + 'static,
    {
        config.validate()?;
        let transport: Arc<dyn Transport> = Arc::new(transport);
        let progress = Arc::new(Progress::default());
        let queue = if config.send_asynchronously {
            Some(Queue::start(
                config.queue_capacity,
                config.workers,
                config.queue_full,
                transport.clone(),
                progress.clone(),
            )?)
        } else {
            None
        };

        Ok(Self {
            config,
            transport,
            progress,
            queue,
            closed: AtomicBool::new(false),
        })
    }

    /// Returns the configuration.
    pub fn config(&self) -> &NotifierConfig {
        &self.config
    }

    /// Builds the notice that would be delivered for `error`.
    ///
    /// The stack snapshot is looked up across the whole chain, so a trace
    /// captured deep inside the call stack is reported even after further
    /// layers were added.
    pub fn notice(&self, error: &Error) -> Notice {
        Notice::from_error(error, &self.config)
    }

    /// Delivers the notice for `error` on the calling thread, bypassing the
    /// queue, and reports the outcome.
    pub fn send(&self, error: &Error) -> Result<(), NotifierError> {
        if self.is_closed() {
            return Err(NotifierError::Closed);
        }
        self.transport.send(&self.notice(error))
    }

    /// Waits until every queued notice was delivered or dropped.
    ///
    /// Returns [`NotifierError::FlushTimeout`] if notices are still pending
    /// after `timeout`. With synchronous delivery there is never anything to
    /// wait for.
    pub fn flush(&self, timeout: Duration) -> Result<(), NotifierError> {
        self.progress.wait_drained(timeout)
    }

    /// Stops accepting notices, delivers those still queued and stops the
    /// workers.
    ///
    /// Closing is idempotent: later calls return `Ok(())` immediately.
    /// Errors handled after closing are discarded with a warning.
    pub fn close(&self) -> Result<(), NotifierError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        match &self.queue {
            Some(queue) => queue.shutdown(),
            None => Ok(()),
        }
    }

    /// Returns `true` once [`Notifier::close`] was called.
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Returns the delivery counters.
    pub fn stats(&self) -> NotifierStats {
        self.progress.stats()
    }
}

impl Handler for Notifier {
    fn handle(&self, error: &Error) {
        if self.is_closed() {
            tracing::warn!(error = %error, "notifier is closed, discarding error");
            return;
        }
        let notice = self.notice(error);
        let Some(queue) = &self.queue else {
            deliver(&*self.transport, &notice, &self.progress);
            return;
        };
        match queue.push(notice, &self.progress) {
            Ok(None) => {}
            Ok(Some(notice)) => deliver(&*self.transport, &notice, &self.progress),
            Err(error) => tracing::warn!(error = %error, "notice not queued"),
        }
    }
}

impl Drop for Notifier {
    fn drop(&mut self) {
        if let Err(error) = self.close() {
            tracing::warn!(error = %error, "failed to close notifier");
        }
    }
}

impl std::fmt::Debug for Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("config", &self.config)
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Rejecting;

    impl Transport for Rejecting {
        fn send(&self, _notice: &Notice) -> Result<(), NotifierError> {
            Err(NotifierError::Status {
                status: 401,
                body: "unauthorized".to_string(),
            })
        }
    }

    #[test]
    fn test_notifier_send_sync() {
        static_assertions::assert_impl_all!(Notifier: Handler, Send, Sync);
        static_assertions::assert_obj_safe!(Transport);
    }

    #[test]
    fn test_synchronous_failure_is_counted_not_raised() {
        let config = NotifierConfig::new(1, "k").send_asynchronously(false);
        let notifier = Notifier::with_transport(config, Rejecting).unwrap();

        notifier.handle(&Error::msg("error"));

        assert_eq!(notifier.stats().failed, 1);
        assert!(matches!(
            notifier.send(&Error::msg("error")),
            Err(NotifierError::Status { status: 401, .. })
        ));
    }

    #[test]
    fn test_invalid_config_is_rejected() {
        let config = NotifierConfig::new(1, "k").queue_capacity(0);
        assert!(matches!(
            Notifier::with_transport(config, Rejecting),
            Err(NotifierError::Config(_))
        ));
    }
}
