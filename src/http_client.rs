use anyhow::Context;
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, Method, StatusCode, Url};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::error::{ApiError, Result};

/// A backend call as it travels through the middleware pipeline
#[derive(Debug, Clone)]
pub struct ApiRequest {
    /// Short id used to correlate log lines
    pub id: String,
    pub method: Method,
    /// Path relative to the API base, e.g. `/expenses/`
    pub path: String,
    pub query: Vec<(String, String)>,
    pub headers: HeaderMap,
    pub body: Option<Value>,
    /// Set once the request has been re-issued after a token refresh
    pub retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string()[..8].to_string(),
            method,
            path: path.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    pub fn with_query(mut self, pairs: Vec<(String, String)>) -> Self {
        self.query = pairs;
        self
    }

    pub fn with_json<B: Serialize + ?Sized>(mut self, body: &B) -> Result<Self> {
        let value = serde_json::to_value(body).context("Failed to serialize request body")?;
        self.body = Some(value);
        Ok(self)
    }

    /// Replace the authorization header with a bearer credential
    pub fn set_bearer(&mut self, token: &str) -> Result<()> {
        let value = HeaderValue::from_str(&format!("Bearer {}", token))
            .context("Access token is not a valid header value")?;
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    pub fn bearer(&self) -> Option<&str> {
        self.headers
            .get(AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
    }
}

/// A fully-read backend response, any status
#[derive(Debug, Clone)]
pub struct ApiResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl ApiResponse {
    pub fn json<T: DeserializeOwned>(&self) -> Result<T> {
        serde_json::from_slice(&self.body).map_err(|e| {
            ApiError::Decode(format!("{} (status {}): {}", e, self.status, self.text()))
        })
    }

    /// Body as JSON; non-JSON bodies become a string, empty bodies null
    pub fn json_value(&self) -> Value {
        if self.body.is_empty() {
            return Value::Null;
        }
        serde_json::from_slice(&self.body).unwrap_or_else(|_| Value::String(self.text()))
    }

    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    /// Turn a non-2xx response into `ApiError::Status`
    pub fn into_result(self) -> Result<Self> {
        if self.status.is_success() {
            Ok(self)
        } else {
            Err(ApiError::Status {
                status: self.status.as_u16(),
                body: self.json_value(),
            })
        }
    }
}

/// The base call the pipeline wraps
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse>;
}

/// One stage of the request pipeline.
///
/// A stage may rewrite the request before calling `next`, inspect or
/// replace the response afterwards, or call `next` more than once.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(&self, request: ApiRequest, next: Next<'_>) -> Result<ApiResponse>;
}

/// The remainder of the pipeline after the current stage
#[derive(Clone, Copy)]
pub struct Next<'a> {
    transport: &'a dyn Transport,
    stages: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    pub async fn run(self, request: ApiRequest) -> Result<ApiResponse> {
        match self.stages.split_first() {
            Some((stage, rest)) => {
                let next = Next {
                    transport: self.transport,
                    stages: rest,
                };
                stage.handle(request, next).await
            }
            None => self.transport.send(&request).await,
        }
    }

    /// Raw transport, skipping every remaining stage
    pub fn transport(&self) -> &'a dyn Transport {
        self.transport
    }
}

/// `reqwest` transport with base-path prefixing and a fixed JSON content type
pub struct ReqwestTransport {
    client: Client,
    base_url: String,
}

impl ReqwestTransport {
    pub fn new(base_url: &str, connect_timeout: Option<u64>) -> Result<Self> {
        Url::parse(base_url)
            .map_err(|e| ApiError::Config(format!("Invalid API base URL {}: {}", base_url, e)))?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));

        let mut builder = Client::builder().default_headers(headers);
        if let Some(secs) = connect_timeout {
            builder = builder.connect_timeout(Duration::from_secs(secs));
        }
        let client = builder.build().context("Failed to create HTTP client")?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url_for(&self, request: &ApiRequest) -> Result<Url> {
        let mut url = Url::parse(&format!("{}{}", self.base_url, request.path))
            .with_context(|| format!("Invalid request path: {}", request.path))?;
        if !request.query.is_empty() {
            url.query_pairs_mut().extend_pairs(request.query.iter());
        }
        Ok(url)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(request)?;
        tracing::debug!(
            request_id = %request.id,
            method = %request.method,
            url = %url,
            retried = request.retried,
            "Sending HTTP request"
        );

        let mut builder = self
            .client
            .request(request.method.clone(), url.clone())
            .headers(request.headers.clone());
        if let Some(ref body) = request.body {
            builder = builder.json(body);
        }

        let response = match builder.send().await {
            Ok(response) => response,
            Err(e) => {
                let error_kind = if e.is_timeout() {
                    "timeout"
                } else if e.is_connect() {
                    "connection_failed"
                } else if e.is_request() {
                    "request_error"
                } else {
                    "unknown"
                };
                tracing::warn!(
                    request_id = %request.id,
                    error_kind = error_kind,
                    error = %e,
                    url = %url,
                    "HTTP request error"
                );
                return Err(ApiError::Network(format!("{} (kind: {})", e, error_kind)));
            }
        };

        let status = response.status();
        let headers = response.headers().clone();
        let body = response
            .bytes()
            .await
            .map_err(|e| ApiError::Network(format!("Failed to read response body: {}", e)))?;

        tracing::debug!(request_id = %request.id, status = %status, "Received HTTP response");
        if !status.is_success() {
            tracing::warn!(
                request_id = %request.id,
                status = status.as_u16(),
                url = %url,
                "Received error response"
            );
        }

        Ok(ApiResponse {
            status,
            headers,
            body,
        })
    }
}

/// The shared request pipeline every backend call goes through
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    stages: Vec<Arc<dyn Middleware>>,
}

impl ApiClient {
    /// Stages run in order; the first one sees the request first and the
    /// response last.
    pub fn new(transport: Arc<dyn Transport>, stages: Vec<Arc<dyn Middleware>>) -> Self {
        Self { transport, stages }
    }

    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Run a request through the pipeline. Non-2xx outcomes become
    /// `ApiError::Status` carrying the backend payload.
    pub async fn execute(&self, request: ApiRequest) -> Result<ApiResponse> {
        let next = Next {
            transport: self.transport.as_ref(),
            stages: &self.stages,
        };
        next.run(request).await?.into_result()
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T> {
        self.execute(ApiRequest::get(path)).await?.json()
    }

    pub async fn get_with_query<T: DeserializeOwned>(
        &self,
        path: &str,
        query: Vec<(String, String)>,
    ) -> Result<T> {
        self.execute(ApiRequest::get(path).with_query(query))
            .await?
            .json()
    }

    pub async fn post<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::post(path).with_json(body)?;
        self.execute(request).await?.json()
    }

    /// POST whose response body is ignored
    pub async fn post_unit<B: Serialize + ?Sized>(&self, path: &str, body: &B) -> Result<()> {
        let request = ApiRequest::post(path).with_json(body)?;
        self.execute(request).await.map(|_| ())
    }

    pub async fn put<B, T>(&self, path: &str, body: &B) -> Result<T>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let request = ApiRequest::put(path).with_json(body)?;
        self.execute(request).await?.json()
    }

    pub async fn delete(&self, path: &str) -> Result<()> {
        self.execute(ApiRequest::delete(path)).await.map(|_| ())
    }
}
