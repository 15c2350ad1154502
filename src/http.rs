//! Attaching the HTTP request being served to an error.
//!
//! Reporting services group and display errors by the request that caused
//! them. A request layer records a copy of the request line and headers; the
//! body is never captured.
//!
//! # Examples
//!
//! ```
//! use faultline::Error;
//!
//! let request = http::Request::get("https://example.com/users/7")
//!     .header("user-agent", "curl/8.5.0")
//!     .body(())
//!     .unwrap();
//!
//! let error = Error::msg("user not found").with_http_request(&request);
//!
//! let attached = error.http_request().expect("request layer");
//! assert_eq!(attached.method(), http::Method::GET);
//! assert_eq!(attached.uri().path(), "/users/7");
//! assert_eq!(attached.user_agent(), Some("curl/8.5.0"));
//! ```

use http::{HeaderMap, Method, Uri, header, request::Parts};

use crate::{Error, error::LayerKind};

/// The request line and headers of an HTTP request.
#[derive(Clone, Debug)]
pub struct HttpRequest {
    method: Method,
    uri: Uri,
    headers: HeaderMap,
}

impl HttpRequest {
    /// Creates a request descriptor from its parts.
    pub fn new(method: Method, uri: Uri, headers: HeaderMap) -> Self {
        Self {
            method,
            uri,
            headers,
        }
    }

    /// Returns the request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Returns the request URI.
    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    /// Returns the request headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Returns the `User-Agent` header, if present and valid text.
    pub fn user_agent(&self) -> Option<&str> {
        self.headers
            .get(header::USER_AGENT)
            .and_then(|value| value.to_str().ok())
    }
}

impl<B> From<&http::Request<B>> for HttpRequest {
    fn from(request: &http::Request<B>) -> Self {
        Self::new(
            request.method().clone(),
            request.uri().clone(),
            request.headers().clone(),
        )
    }
}

impl From<&Parts> for HttpRequest {
    fn from(parts: &Parts) -> Self {
        Self::new(parts.method.clone(), parts.uri.clone(), parts.headers.clone())
    }
}

impl Error {
    /// Adds a layer recording the HTTP request being served.
    pub fn with_http_request<R>(self, request: R) -> Self
    where
        R: Into<HttpRequest>,
    {
        self.push(LayerKind::Request(request.into()))
    }

    /// Returns the outermost request recorded in the chain.
    pub fn http_request(&self) -> Option<&HttpRequest> {
        self.layers().find_map(|layer| match layer.kind() {
            LayerKind::Request(request) => Some(request),
            _ => None,
        })
    }
}
