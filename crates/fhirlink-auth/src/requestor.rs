//! Pluggable HTTP transport.
//!
//! The discovery fetch and the token exchange go through the
//! [`HttpRequestor`] trait rather than a concrete HTTP client, so hosts can
//! substitute their own transport (instrumented clients, webview bridges,
//! test doubles). [`ReqwestRequestor`] is the default implementation.

use std::time::Duration;

use async_trait::async_trait;

/// Errors raised by an HTTP requestor.
///
/// Transport-level failures only; non-2xx statuses are reported through
/// [`HttpResponse::status`] and interpreted by the caller. URL parse
/// failures are deliberately folded in here so that malformed endpoint URLs
/// surface as network failures instead of being validated up front.
#[derive(Debug, thiserror::Error)]
pub enum RequestorError {
    /// The request could not be sent or the response body could not be read.
    #[error("Network error: {message}")]
    Network {
        /// Description of the transport failure.
        message: String,
    },
}

impl RequestorError {
    /// Creates a new `Network` error.
    #[must_use]
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
        }
    }
}

/// An HTTP response reduced to what the flow needs: status and body text.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    /// HTTP status code.
    pub status: u16,
    /// Response body as text.
    pub body: String,
}

impl HttpResponse {
    /// Returns `true` for 2xx statuses.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Pluggable HTTP transport used for discovery and token exchange.
#[async_trait]
pub trait HttpRequestor: Send + Sync {
    /// Performs a GET request with `Accept: application/json`.
    ///
    /// # Errors
    ///
    /// Returns a [`RequestorError`] on transport failure. A non-2xx status
    /// is not an error at this layer.
    async fn get_json(&self, url: &str) -> Result<HttpResponse, RequestorError>;

    /// Performs a form-encoded POST request.
    ///
    /// # Errors
    ///
    /// Returns a [`RequestorError`] on transport failure. A non-2xx status
    /// is not an error at this layer.
    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<HttpResponse, RequestorError>;
}

/// Default requestor backed by [`reqwest`].
pub struct ReqwestRequestor {
    client: reqwest::Client,
}

impl ReqwestRequestor {
    /// Default request timeout.
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

    /// Creates a requestor with the given request timeout.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client cannot be created (should not happen in
    /// practice).
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .expect("Failed to create HTTP client");
        Self { client }
    }

    /// Creates a requestor with the default timeout.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(Self::DEFAULT_TIMEOUT)
    }

    /// Wraps an existing [`reqwest::Client`].
    #[must_use]
    pub fn from_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    async fn read_response(response: reqwest::Response) -> Result<HttpResponse, RequestorError> {
        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|e| RequestorError::network(e.to_string()))?;
        Ok(HttpResponse { status, body })
    }
}

impl Default for ReqwestRequestor {
    fn default() -> Self {
        Self::with_defaults()
    }
}

#[async_trait]
impl HttpRequestor for ReqwestRequestor {
    async fn get_json(&self, url: &str) -> Result<HttpResponse, RequestorError> {
        let response = self
            .client
            .get(url)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| RequestorError::network(e.to_string()))?;
        Self::read_response(response).await
    }

    async fn post_form(
        &self,
        url: &str,
        params: &[(&str, &str)],
    ) -> Result<HttpResponse, RequestorError> {
        let body = {
            let mut body = url::form_urlencoded::Serializer::new(String::new());
            for (key, value) in params {
                body.append_pair(key, value);
            }
            body.finish()
        };
        let response = self
            .client
            .post(url)
            .header("Content-Type", "application/x-www-form-urlencoded")
            .header("Accept", "application/json")
            .body(body)
            .send()
            .await
            .map_err(|e| RequestorError::network(e.to_string()))?;
        Self::read_response(response).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_http_response_success_range() {
        assert!(
            HttpResponse {
                status: 200,
                body: String::new()
            }
            .is_success()
        );
        assert!(
            HttpResponse {
                status: 204,
                body: String::new()
            }
            .is_success()
        );
        assert!(
            !HttpResponse {
                status: 302,
                body: String::new()
            }
            .is_success()
        );
        assert!(
            !HttpResponse {
                status: 500,
                body: String::new()
            }
            .is_success()
        );
    }

    #[tokio::test]
    async fn test_invalid_url_surfaces_as_network_error() {
        let requestor = ReqwestRequestor::with_defaults();
        let result = requestor.get_json("not a url").await;
        assert!(matches!(result, Err(RequestorError::Network { .. })));
    }
}
