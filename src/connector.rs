use crate::events::FailureKind;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;
use thiserror::Error;

pub type ByteStream = BoxStream<'static, Result<Bytes, TransportError>>;

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("network error: {0}")]
    Network(String),

    #[error("HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("failed to decode response body: {0}")]
    Decode(String),

    #[error("no data received for {0:?}")]
    IdleTimeout(Duration),

    #[error("transport was already opened")]
    AlreadyOpened,
}

impl TransportError {
    pub fn kind(&self) -> FailureKind {
        match self {
            Self::Status { .. } => FailureKind::Status,
            Self::IdleTimeout(_) => FailureKind::Timeout,
            Self::Decode(_) => FailureKind::Decode,
            Self::Network(_) | Self::AlreadyOpened => FailureKind::Network,
        }
    }
}

impl From<reqwest::Error> for TransportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_connect() {
            TransportError::Network(format!("connection failed: {}", err))
        } else if err.is_decode() || err.is_body() {
            TransportError::Decode(err.to_string())
        } else {
            TransportError::Network(err.to_string())
        }
    }
}

// ============================================================================
// Request Options
// ============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum HttpMethod {
    #[default]
    Post,
    Get,
}

impl From<HttpMethod> for reqwest::Method {
    fn from(method: HttpMethod) -> Self {
        match method {
            HttpMethod::Post => reqwest::Method::POST,
            HttpMethod::Get => reqwest::Method::GET,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestOptions {
    pub headers: BTreeMap<String, String>,
    pub method: HttpMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,
    pub with_credentials: bool,
}

impl RequestOptions {
    /// JSON POST carrying a bearer token, the shape every completion request uses.
    pub fn json_post(api_key: &str, body: String) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("Authorization".to_string(), format!("Bearer {}", api_key));
        headers.insert("Content-Type".to_string(), "application/json".to_string());
        Self {
            headers,
            method: HttpMethod::Post,
            body: Some(body),
            with_credentials: false,
        }
    }

    pub fn with_credentials(mut self, with_credentials: bool) -> Self {
        self.with_credentials = with_credentials;
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }
}

// ============================================================================
// Connector Trait
// ============================================================================

pub struct ConnectResponse {
    pub status: u16,
    pub body: ByteStream,
}

impl ConnectResponse {
    pub fn is_success(&self) -> bool {
        self.status == 200
    }
}

/// HTTP seam underneath [`StreamTransport`](crate::transport::StreamTransport)
/// and the buffered completion path.
#[async_trait]
pub trait Connector: Send + Sync {
    /// Start a request and hand back the status plus the raw body as it arrives.
    async fn connect(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<ConnectResponse, TransportError>;

    /// One buffered request. A non-200 status becomes [`TransportError::Status`].
    async fn fetch_json(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<serde_json::Value, TransportError>;
}

// ============================================================================
// reqwest Connector
// ============================================================================

/// Keeps two clients so `with_credentials` decides whether a cookie jar
/// travels with the request.
#[derive(Clone)]
pub struct HttpConnector {
    client: reqwest::Client,
    credentialed: reqwest::Client,
}

impl HttpConnector {
    pub fn new() -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {}", e)))?;
        let credentialed = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| TransportError::Network(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            credentialed,
        })
    }

    fn request(&self, url: &str, options: &RequestOptions) -> reqwest::RequestBuilder {
        let client = if options.with_credentials {
            &self.credentialed
        } else {
            &self.client
        };

        let mut request = client.request(options.method.into(), url);
        for (name, value) in &options.headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &options.body {
            request = request.body(body.clone());
        }
        request
    }
}

#[async_trait]
impl Connector for HttpConnector {
    async fn connect(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<ConnectResponse, TransportError> {
        let response = self.request(url, options).send().await?;
        let status = response.status().as_u16();
        log::debug!("{} {} -> {}", options.method.as_str(), url, status);

        let body = response
            .bytes_stream()
            .map(|chunk| chunk.map_err(TransportError::from))
            .boxed();

        Ok(ConnectResponse { status, body })
    }

    async fn fetch_json(
        &self,
        url: &str,
        options: &RequestOptions,
    ) -> Result<serde_json::Value, TransportError> {
        let response = self.request(url, options).send().await?;
        let status = response.status().as_u16();
        log::debug!("{} {} -> {}", options.method.as_str(), url, status);

        if status != 200 {
            let body = response.text().await.unwrap_or_default();
            return Err(TransportError::Status { status, body });
        }
        Ok(response.json::<serde_json::Value>().await?)
    }
}

impl HttpMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            HttpMethod::Post => "POST",
            HttpMethod::Get => "GET",
        }
    }
}

// ============================================================================
// Scripted Connector (tests)
// ============================================================================
