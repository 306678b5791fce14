//! The remote API capability the engine drives.
//!
//! [`ApiClient`] is the seam between the engine and the network. Hosts plug
//! in their own implementation (with authentication, retries, ...) or use
//! [`HttpApiClient`] from the default `remote` feature.

use serde_json::Value;

#[cfg(feature = "remote")]
use std::time::Duration;

/// Failure reported by an [`ApiClient`]; the engine passes it through as is.
pub type TransportError = Box<dyn std::error::Error + Send + Sync>;

/// Raw response of one API call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
    pub status: u16,
    pub body: String,
}

impl ApiResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// A response with a JSON body.
    pub fn with_json(status: u16, body: &Value) -> Self {
        Self::new(status, body.to_string())
    }

    /// Parse the body as JSON. An empty body yields `None`.
    pub fn json(&self) -> Result<Option<Value>, serde_json::Error> {
        if self.body.trim().is_empty() {
            return Ok(None);
        }
        serde_json::from_str(&self.body).map(Some)
    }
}

/// Remote API operations used by the engine.
///
/// `path` is the resolved collection path (parent IDs already substituted).
/// Instance calls address `{path}/{id}`. `parent_ids` are passed along for
/// implementations that need them, e.g. for auditing or custom routing.
pub trait ApiClient {
    fn post(
        &self,
        path: &str,
        parent_ids: &[String],
        payload: &Value,
    ) -> Result<ApiResponse, TransportError>;

    fn get(&self, path: &str, id: &str, parent_ids: &[String])
        -> Result<ApiResponse, TransportError>;

    fn put(
        &self,
        path: &str,
        id: &str,
        parent_ids: &[String],
        payload: &Value,
    ) -> Result<ApiResponse, TransportError>;

    fn delete(
        &self,
        path: &str,
        id: &str,
        parent_ids: &[String],
    ) -> Result<ApiResponse, TransportError>;
}

/// Default timeout for HTTP requests (30 seconds).
#[cfg(feature = "remote")]
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

/// Blocking HTTP client for a single API base URL.
///
/// Requires the `remote` feature (enabled by default).
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpApiClient {
    base_url: String,
    client: reqwest::blocking::Client,
}

#[cfg(feature = "remote")]
impl HttpApiClient {
    /// Client with default settings.
    ///
    /// # Errors
    ///
    /// Returns an error if the underlying HTTP client cannot be built.
    pub fn new(base_url: impl Into<String>) -> Result<Self, TransportError> {
        Self::builder(base_url).build()
    }

    pub fn builder(base_url: impl Into<String>) -> HttpApiClientBuilder {
        HttpApiClientBuilder {
            base_url: base_url.into(),
            headers: Vec::new(),
            timeout: HTTP_TIMEOUT,
            user_agent: concat!("resource-lifecycle/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn collection_url(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn instance_url(&self, path: &str, id: &str) -> String {
        format!("{}/{}", self.collection_url(path), id)
    }

    fn send(request: reqwest::blocking::RequestBuilder) -> Result<ApiResponse, TransportError> {
        let response = request.send()?;
        let status = response.status().as_u16();
        let body = response.text()?;
        tracing::debug!("HTTP {} ({} bytes)", status, body.len());
        Ok(ApiResponse { status, body })
    }
}

#[cfg(feature = "remote")]
impl ApiClient for HttpApiClient {
    fn post(
        &self,
        path: &str,
        _parent_ids: &[String],
        payload: &Value,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.collection_url(path);
        tracing::debug!("POST {}", url);
        Self::send(self.client.post(url).json(payload))
    }

    fn get(
        &self,
        path: &str,
        id: &str,
        _parent_ids: &[String],
    ) -> Result<ApiResponse, TransportError> {
        let url = self.instance_url(path, id);
        tracing::debug!("GET {}", url);
        Self::send(self.client.get(url))
    }

    fn put(
        &self,
        path: &str,
        id: &str,
        _parent_ids: &[String],
        payload: &Value,
    ) -> Result<ApiResponse, TransportError> {
        let url = self.instance_url(path, id);
        tracing::debug!("PUT {}", url);
        Self::send(self.client.put(url).json(payload))
    }

    fn delete(
        &self,
        path: &str,
        id: &str,
        _parent_ids: &[String],
    ) -> Result<ApiResponse, TransportError> {
        let url = self.instance_url(path, id);
        tracing::debug!("DELETE {}", url);
        Self::send(self.client.delete(url))
    }
}

/// Builder for [`HttpApiClient`].
#[cfg(feature = "remote")]
#[derive(Debug, Clone)]
pub struct HttpApiClientBuilder {
    base_url: String,
    headers: Vec<(String, String)>,
    timeout: Duration,
    user_agent: String,
}

#[cfg(feature = "remote")]
impl HttpApiClientBuilder {
    /// Add a header sent with every request.
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn user_agent(mut self, user_agent: impl Into<String>) -> Self {
        self.user_agent = user_agent.into();
        self
    }

    /// # Errors
    ///
    /// Returns an error for an invalid header name or value, or if the
    /// underlying HTTP client cannot be built.
    pub fn build(self) -> Result<HttpApiClient, TransportError> {
        use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

        let mut headers = HeaderMap::new();
        for (name, value) in &self.headers {
            let name = HeaderName::from_bytes(name.as_bytes())?;
            let value = HeaderValue::from_str(value)?;
            headers.insert(name, value);
        }

        let client = reqwest::blocking::Client::builder()
            .timeout(self.timeout)
            .user_agent(self.user_agent)
            .default_headers(headers)
            .build()?;

        Ok(HttpApiClient {
            base_url: self.base_url,
            client,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn empty_body_parses_to_none() {
        assert_eq!(ApiResponse::new(204, "").json().unwrap(), None);
        assert_eq!(ApiResponse::new(200, "  \n").json().unwrap(), None);
    }

    #[test]
    fn json_body_parses() {
        let response = ApiResponse::with_json(200, &json!({ "id": "abc" }));
        assert_eq!(response.json().unwrap(), Some(json!({ "id": "abc" })));
    }

    #[test]
    fn invalid_body_is_an_error() {
        assert!(ApiResponse::new(200, "<html>").json().is_err());
    }

    #[cfg(feature = "remote")]
    mod remote {
        use super::*;

        #[test]
        fn urls_join_base_and_path() {
            let client = HttpApiClient::new("http://localhost:8080/").unwrap();
            assert_eq!(client.collection_url("/v1/cdns"), "http://localhost:8080/v1/cdns");
            assert_eq!(
                client.instance_url("/v1/cdns", "abc"),
                "http://localhost:8080/v1/cdns/abc"
            );
        }

        #[test]
        fn invalid_header_name_is_rejected() {
            let result = HttpApiClient::builder("http://localhost")
                .header("bad header", "v")
                .build();
            assert!(result.is_err());
        }
    }
}
