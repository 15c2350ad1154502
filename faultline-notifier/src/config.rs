use std::{fmt, time::Duration};

use crate::NotifierError;

/// What [`Notifier::handle`](crate::Notifier) does when the background
/// queue is full.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub enum QueueFullPolicy {
    /// Wait until a worker frees a slot. Nothing is dropped and notices
    /// keep the order they were handled in.
    ///
    /// A transport that reports errors through its own notifier must not
    /// use this policy: a worker waiting on its own queue never returns.
    #[default]
    Block,
    /// Deliver the notice synchronously on the calling thread. Nothing is
    /// dropped, but the notice overtakes those still queued, so delivery
    /// order no longer follows the order notices were handled in.
    SendInline,
    /// Evict the oldest queued notice to make room. Evictions are logged and
    /// counted in [`NotifierStats::dropped`](crate::NotifierStats::dropped).
    DropOldest,
}

/// Configuration of a [`Notifier`](crate::Notifier).
///
/// # Examples
///
/// ```
/// use faultline_notifier::{NotifierConfig, QueueFullPolicy};
/// use std::time::Duration;
///
/// let config = NotifierConfig::new(1, "key")
///     .host("https://errbit.internal")
///     .environment("staging")
///     .queue_full(QueueFullPolicy::DropOldest)
///     .timeout(Duration::from_secs(2));
///
/// assert_eq!(config.host, "https://errbit.internal");
/// assert_eq!(config.workers, 1);
/// ```
#[derive(Clone)]
pub struct NotifierConfig {
    /// The project the notices belong to.
    pub project_id: i64,
    /// The project key, sent as bearer authorization.
    pub project_key: String,
    /// The service base URL, without a trailing slash.
    pub host: String,
    /// The deployment environment reported with every notice.
    pub environment: Option<String>,
    /// Whether notices are queued for background workers (`true`) or
    /// delivered on the calling thread (`false`).
    pub send_asynchronously: bool,
    /// Capacity of the background queue.
    pub queue_capacity: usize,
    /// Number of background workers. A single worker delivers notices in
    /// the order they were handled, unless [`QueueFullPolicy::SendInline`]
    /// is selected.
    pub workers: usize,
    /// Behavior when the background queue is full.
    pub queue_full: QueueFullPolicy,
    /// Per-request timeout of the HTTP transport.
    pub timeout: Duration,
}

impl NotifierConfig {
    /// The Airbrake service URL.
    pub const DEFAULT_HOST: &'static str = "https://api.airbrake.io";

    /// Creates a configuration for a project with default settings.
    pub fn new(project_id: i64, project_key: impl Into<String>) -> Self {
        Self {
            project_id,
            project_key: project_key.into(),
            host: Self::DEFAULT_HOST.to_string(),
            environment: None,
            send_asynchronously: true,
            queue_capacity: 100,
            workers: 1,
            queue_full: QueueFullPolicy::Block,
            timeout: Duration::from_secs(10),
        }
    }

    /// Reads the configuration from environment variables.
    ///
    /// # Environment Variables
    ///
    /// - `FAULTLINE_NOTIFIER_PROJECT_ID` - required, an integer
    /// - `FAULTLINE_NOTIFIER_PROJECT_KEY` - required
    /// - `FAULTLINE_NOTIFIER_HOST` - optional service URL
    /// - `FAULTLINE_NOTIFIER_ENVIRONMENT` - optional environment name
    pub fn from_env() -> Result<Self, NotifierError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Like [`NotifierConfig::from_env`], reading variables through
    /// `lookup`.
    ///
    /// # Examples
    ///
    /// ```
    /// use faultline_notifier::NotifierConfig;
    ///
    /// let config = NotifierConfig::from_lookup(|name| match name {
    ///     "FAULTLINE_NOTIFIER_PROJECT_ID" => Some("42".to_string()),
    ///     "FAULTLINE_NOTIFIER_PROJECT_KEY" => Some("secret".to_string()),
    ///     _ => None,
    /// })
    /// .unwrap();
    ///
    /// assert_eq!(config.project_id, 42);
    /// assert_eq!(config.host, NotifierConfig::DEFAULT_HOST);
    /// ```
    pub fn from_lookup<F>(lookup: F) -> Result<Self, NotifierError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let project_id = lookup("FAULTLINE_NOTIFIER_PROJECT_ID")
            .ok_or_else(|| missing("FAULTLINE_NOTIFIER_PROJECT_ID"))?;
        let project_id = project_id.trim().parse().map_err(|_| {
            NotifierError::Config(format!(
                "FAULTLINE_NOTIFIER_PROJECT_ID is not an integer: {project_id:?}"
            ))
        })?;
        let project_key = lookup("FAULTLINE_NOTIFIER_PROJECT_KEY")
            .ok_or_else(|| missing("FAULTLINE_NOTIFIER_PROJECT_KEY"))?;

        let mut config = Self::new(project_id, project_key);
        if let Some(host) = lookup("FAULTLINE_NOTIFIER_HOST") {
            config = config.host(host);
        }
        if let Some(environment) = lookup("FAULTLINE_NOTIFIER_ENVIRONMENT") {
            config = config.environment(environment);
        }
        Ok(config)
    }

    /// Sets the service base URL.
    pub fn host(mut self, host: impl Into<String>) -> Self {
        self.host = host.into().trim_end_matches('/').to_string();
        self
    }

    /// Sets the deployment environment.
    pub fn environment(mut self, environment: impl Into<String>) -> Self {
        self.environment = Some(environment.into());
        self
    }

    /// Selects background (`true`) or inline (`false`) delivery.
    pub fn send_asynchronously(mut self, asynchronously: bool) -> Self {
        self.send_asynchronously = asynchronously;
        self
    }

    /// Sets the capacity of the background queue.
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity;
        self
    }

    /// Sets the number of background workers.
    pub fn workers(mut self, workers: usize) -> Self {
        self.workers = workers;
        self
    }

    /// Sets the behavior when the background queue is full.
    pub fn queue_full(mut self, policy: QueueFullPolicy) -> Self {
        self.queue_full = policy;
        self
    }

    /// Sets the per-request timeout of the HTTP transport.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Returns the URL notices are posted to.
    pub fn notices_url(&self) -> String {
        format!(
            "{}/api/v3/projects/{}/notices",
            self.host, self.project_id
        )
    }

    pub(crate) fn validate(&self) -> Result<(), NotifierError> {
        if self.project_key.is_empty() {
            return Err(NotifierError::Config("project key is empty".to_string()));
        }
        if self.send_asynchronously && (self.queue_capacity == 0 || self.workers == 0) {
            return Err(NotifierError::Config(
                "asynchronous delivery needs a queue capacity and at least one worker"
                    .to_string(),
            ));
        }
        Ok(())
    }
}

impl fmt::Debug for NotifierConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NotifierConfig")
            .field("project_id", &self.project_id)
            .field("project_key", &"<redacted>")
            .field("host", &self.host)
            .field("environment", &self.environment)
            .field("send_asynchronously", &self.send_asynchronously)
            .field("queue_capacity", &self.queue_capacity)
            .field("workers", &self.workers)
            .field("queue_full", &self.queue_full)
            .field("timeout", &self.timeout)
            .finish()
    }
}

fn missing(name: &str) -> NotifierError {
    NotifierError::Config(format!("{name} is not set"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_trailing_slash_is_trimmed() {
        let config = NotifierConfig::new(7, "key").host("https://errbit.example.com/");
        assert_eq!(
            config.notices_url(),
            "https://errbit.example.com/api/v3/projects/7/notices"
        );
    }

    #[test]
    fn test_from_lookup_requires_project() {
        let error = NotifierConfig::from_lookup(|_| None).unwrap_err();
        assert!(matches!(error, NotifierError::Config(message) if message.contains("PROJECT_ID")));
    }

    #[test]
    fn test_from_lookup_rejects_bad_id() {
        let error = NotifierConfig::from_lookup(|name| match name {
            "FAULTLINE_NOTIFIER_PROJECT_ID" => Some("abc".to_string()),
            _ => Some("x".to_string()),
        })
        .unwrap_err();
        assert!(matches!(error, NotifierError::Config(_)));
    }

    #[test]
    fn test_from_lookup_reads_optional_settings() {
        let config = NotifierConfig::from_lookup(|name| {
            Some(
                match name {
                    "FAULTLINE_NOTIFIER_PROJECT_ID" => "3",
                    "FAULTLINE_NOTIFIER_PROJECT_KEY" => "k",
                    "FAULTLINE_NOTIFIER_HOST" => "http://localhost:8080/",
                    "FAULTLINE_NOTIFIER_ENVIRONMENT" => "test",
                    _ => return None,
                }
                .to_string(),
            )
        })
        .unwrap();
        assert_eq!(config.host, "http://localhost:8080");
        assert_eq!(config.environment.as_deref(), Some("test"));
    }

    #[test]
    fn test_default_policy_blocks() {
        assert_eq!(QueueFullPolicy::default(), QueueFullPolicy::Block);
        assert_eq!(NotifierConfig::new(1, "k").queue_full, QueueFullPolicy::Block);
    }

    #[test]
    fn test_debug_redacts_project_key() {
        let config = NotifierConfig::new(5, "s3cr3t-project-key");
        let debug = format!("{config:?}");
        assert!(!debug.contains("s3cr3t-project-key"));
        assert!(debug.contains("project_key: \"<redacted>\""));
        assert!(debug.contains("project_id: 5"));
    }

    #[test]
    fn test_validate() {
        assert!(NotifierConfig::new(1, "k").validate().is_ok());
        assert!(NotifierConfig::new(1, "").validate().is_err());
        assert!(NotifierConfig::new(1, "k").workers(0).validate().is_err());
        assert!(
            NotifierConfig::new(1, "k")
                .workers(0)
                .send_asynchronously(false)
                .validate()
                .is_ok()
        );
    }
}
