use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use reqwest::{Method, StatusCode};
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::debug;

use crate::error::ApiError;
use crate::jar::CredentialJar;

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// A request that can be issued any number of times.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<serde_json::Value>,
}

impl ApiRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            body: None,
        }
    }

    #[must_use]
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    #[must_use]
    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    #[must_use]
    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    #[must_use]
    pub fn patch(path: impl Into<String>) -> Self {
        Self::new(Method::PATCH, path)
    }

    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_json<T: Serialize>(mut self, body: &T) -> Result<Self, ApiError> {
        let value = serde_json::to_value(body).map_err(|err| ApiError::decode(&self.path, err))?;
        self.body = Some(value);
        Ok(self)
    }
}

#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub url: String,
    pub body: String,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, ApiError> {
        serde_json::from_str(&self.body).map_err(|err| {
            let snippet: String = self.body.chars().take(512).collect();
            ApiError::decode(&self.url, format!("{err} (status {}) body: {snippet}", self.status))
        })
    }

    #[must_use]
    pub fn text(&self) -> &str {
        &self.body
    }
}

/// Anything that can send an [`ApiRequest`].
///
/// Any status outside 2xx comes back as [`ApiError::Status`].
#[async_trait]
pub trait HttpClient: Send + Sync {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError>;

    /// Drops credentials held by the client itself (cookies).
    fn clear_credentials(&self) {}
}

#[async_trait]
impl<T: HttpClient + ?Sized> HttpClient for Arc<T> {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        (**self).execute(request).await
    }

    fn clear_credentials(&self) {
        (**self).clear_credentials();
    }
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Duration,
    pub accept_invalid_certs: bool,
}

impl ClientConfig {
    #[must_use]
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
            accept_invalid_certs: false,
        }
    }
}

pub struct ReqwestClient {
    client: reqwest::Client,
    base_url: String,
    jar: Arc<CredentialJar>,
}

impl ReqwestClient {
    pub fn new(config: &ClientConfig, jar: Arc<CredentialJar>) -> Result<Self, ApiError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .cookie_provider(Arc::clone(&jar))
            .build()
            .map_err(|err| ApiError::transport(&config.base_url, err))?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            jar,
        })
    }

    #[must_use]
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        if path.starts_with('/') {
            format!("{}{path}", self.base_url)
        } else {
            format!("{}/{path}", self.base_url)
        }
    }
}

#[async_trait]
impl HttpClient for ReqwestClient {
    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse, ApiError> {
        let url = self.url(&request.path);
        let builder = self.client.request(request.method.clone(), &url);
        let builder = match request.body.as_ref() {
            Some(body) => builder.json(body),
            None => builder,
        };
        debug!(method = %request.method, url = %url, "http request");
        let start = Instant::now();
        let response = builder
            .send()
            .await
            .map_err(|err| ApiError::transport(&url, err))?;
        let status = response.status();
        debug!(
            method = %request.method,
            url = %url,
            status = %status,
            elapsed_ms = start.elapsed().as_millis(),
            "http response"
        );
        let body = response
            .text()
            .await
            .map_err(|err| ApiError::transport(&url, err))?;
        if !status.is_success() {
            return Err(ApiError::Status { status, url, body });
        }
        Ok(ApiResponse { status, url, body })
    }

    fn clear_credentials(&self) {
        self.jar.clear();
    }
}
