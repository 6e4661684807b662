//! The HTTP seam: one request in, one raw response out.
//!
//! [`RemoteClient`](crate::RemoteClient) owns auth and retries and talks to
//! upstream only through [`Transport`], so tests swap in a scripted fake.

use std::future::Future;

use reqwest::{Method, Url};
use serde_json::Value;

use crate::{ClientConfig, Error, Result};

#[derive(Debug, Clone, PartialEq)]
pub struct ApiRequest {
  pub method: Method,
  /// Path relative to the base URL, e.g. `api/Insumos`.
  pub path:   String,
  pub query:  Vec<(String, String)>,
  pub body:   Option<Value>,
  pub bearer: Option<String>,
}

impl ApiRequest {
  pub fn get(path: impl Into<String>) -> Self {
    Self {
      method: Method::GET,
      path:   path.into(),
      query:  Vec::new(),
      body:   None,
      bearer: None,
    }
  }

  pub fn post(path: impl Into<String>, body: Value) -> Self {
    Self { method: Method::POST, body: Some(body), ..Self::get(path) }
  }

  pub fn param(mut self, key: &str, value: impl ToString) -> Self {
    self.query.push((key.to_owned(), value.to_string()));
    self
  }

  /// Value of the first query parameter named `key`.
  pub fn query_value(&self, key: &str) -> Option<&str> {
    self
      .query
      .iter()
      .find(|(k, _)| k == key)
      .map(|(_, v)| v.as_str())
  }
}

/// Status and body of an upstream response. Non-2xx statuses are data here;
/// the client decides what they mean.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ApiResponse {
  pub status: u16,
  pub body:   String,
}

impl ApiResponse {
  pub fn ok(body: impl Into<String>) -> Self { Self { status: 200, body: body.into() } }

  pub fn is_success(&self) -> bool { (200..300).contains(&self.status) }
}

pub trait Transport: Send + Sync {
  /// Perform one HTTP exchange. Only failures to get any response at all are
  /// errors.
  fn send(&self, request: ApiRequest) -> impl Future<Output = Result<ApiResponse>> + Send + '_;
}

// ─── reqwest ─────────────────────────────────────────────────────────────────

/// [`Transport`] over a pooled [`reqwest::Client`].
#[derive(Debug, Clone)]
pub struct HttpTransport {
  client:   reqwest::Client,
  base_url: Url,
}

impl HttpTransport {
  pub fn new(config: &ClientConfig) -> Result<Self> {
    let base_url = Url::parse(&config.base_url)
      .map_err(|e| Error::Config(format!("base_url {:?}: {e}", config.base_url)))?;
    let client = reqwest::Client::builder()
      .timeout(config.timeout())
      .user_agent(concat!("sinapi-client/", env!("CARGO_PKG_VERSION")))
      .build()?;
    Ok(Self { client, base_url })
  }
}

impl Transport for HttpTransport {
  async fn send(&self, request: ApiRequest) -> Result<ApiResponse> {
    let url = self
      .base_url
      .join(&request.path)
      .map_err(|e| Error::Config(format!("path {:?}: {e}", request.path)))?;

    let mut builder = self.client.request(request.method, url).query(&request.query);
    if let Some(token) = &request.bearer {
      builder = builder.bearer_auth(token);
    }
    if let Some(body) = &request.body {
      builder = builder.json(body);
    }

    let response = builder.send().await?;
    let status = response.status().as_u16();
    let body = response.text().await?;
    Ok(ApiResponse { status, body })
  }
}
