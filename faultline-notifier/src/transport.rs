use reqwest::{blocking::Client, header};

use crate::{Notice, NotifierConfig, NotifierError};

/// Delivers a single [`Notice`].
///
/// Implementations are called from the notifier's worker threads, or from
/// the thread calling [`Handler::handle`](faultline::Handler::handle) when
/// delivery is synchronous. They must bound their own latency; the notifier
/// does not time them out.
pub trait Transport: Send + Sync {
    /// Sends `notice`, returning once the service accepted or rejected it.
    fn send(&self, notice: &Notice) -> Result<(), NotifierError>;
}

impl<T: Transport + ?Sized> Transport for std::sync::Arc<T> {
    fn send(&self, notice: &Notice) -> Result<(), NotifierError> {
        (**self).send(notice)
    }
}

/// A [`Transport`] posting notices as JSON to the Airbrake v3 API.
///
/// Built on a blocking HTTP client, so it must not be created or dropped
/// from within an async runtime context.
#[derive(Clone, Debug)]
pub struct HttpTransport {
    client: Client,
    url: String,
    project_key: String,
}

impl HttpTransport {
    /// Creates a transport for the project and host of `config`, applying
    /// its request timeout.
    pub fn new(config: &NotifierConfig) -> Result<Self, NotifierError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            client,
            url: config.notices_url(),
            project_key: config.project_key.clone(),
        })
    }

    /// Returns the URL notices are posted to.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Transport for HttpTransport {
    fn send(&self, notice: &Notice) -> Result<(), NotifierError> {
        let body = serde_json::to_vec(notice)?;
        let response = self
            .client
            .post(&self.url)
            .bearer_auth(&self.project_key)
            .header(header::CONTENT_TYPE, "application/json")
            .body(body)
            .send()?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }
        let body = response.text().unwrap_or_default();
        Err(NotifierError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
