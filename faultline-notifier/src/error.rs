/// Failures of the notifier itself.
///
/// These never reach the code whose error is being reported: the
/// [`Handler`](faultline::Handler) implementation logs them and moves on.
/// They are returned by the operations that can be checked explicitly, such
/// as [`Notifier::send`](crate::Notifier::send),
/// [`Notifier::flush`](crate::Notifier::flush) and
/// [`Notifier::close`](crate::Notifier::close).
#[derive(Debug, thiserror::Error)]
pub enum NotifierError {
    /// The notifier was closed and accepts no more notices.
    #[error("notifier is closed")]
    Closed,

    /// The request could not be sent or no response was received.
    #[error("failed to deliver notice")]
    Transport(#[from] reqwest::Error),

    /// The service answered with a non-success status.
    #[error("notice rejected with status {status}: {body}")]
    Status {
        /// The HTTP status code.
        status: u16,
        /// The response body, for diagnostics.
        body: String,
    },

    /// The notice could not be serialized.
    #[error("failed to encode notice")]
    Encode(#[from] serde_json::Error),

    /// Queued notices were still pending when the flush deadline passed.
    #[error("flush timed out with {pending} notice(s) pending")]
    FlushTimeout {
        /// Notices not yet delivered or dropped.
        pending: usize,
    },

    /// The configuration is incomplete or invalid.
    #[error("invalid notifier configuration: {0}")]
    Config(String),

    /// A worker thread could not be started.
    #[error("failed to spawn notifier worker")]
    Spawn(#[source] std::io::Error),

    /// Worker threads terminated by panicking.
    #[error("{count} notifier worker(s) panicked")]
    WorkerPanicked {
        /// The number of panicked workers.
        count: usize,
    },
}
