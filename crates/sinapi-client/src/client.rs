//! [`RemoteClient`]: authenticated, retrying access to the upstream API.

use serde::de::DeserializeOwned;
use tokio::sync::Mutex;

use crate::{
  ClientConfig, Error, Result,
  auth::{AuthToken, LoginRequest, LoginResponse},
  transport::{ApiRequest, ApiResponse, HttpTransport, Transport},
  wire::{CatalogRecord, Estado, MonthOption, Page},
};

pub const LOGIN_PATH: &str = "api/Authentication/login";
pub const STATES_PATH: &str = "api/Estados";
pub const CATALOG_PATH: &str = "api/Insumos";
pub const MONTHS_PATH: &str = "api/Tabelas/meses/select";

/// Body text upstream sends when a period has no imported table. Matched
/// case-insensitively, whatever the status code.
pub const NO_DATA_MARKER: &str = "nenhuma tabela importada";

/// States are few; one oversized page fetches them all.
const STATES_LIMIT: u32 = 1000;

/// Result of a call that may legitimately find nothing.
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched<T> {
  Data(T),
  /// Upstream has no data for the requested period.
  NoData,
}

impl<T> Fetched<T> {
  pub fn into_option(self) -> Option<T> {
    match self {
      Self::Data(v) => Some(v),
      Self::NoData => None,
    }
  }
}

fn is_no_data(response: &ApiResponse) -> bool {
  response.body.to_lowercase().contains(NO_DATA_MARKER)
}

/// One `(state, year, month, kind)` slice of the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceQuery {
  pub uf:          String,
  pub year:        i32,
  pub month:       u32,
  pub composition: bool,
}

// ─── Client ──────────────────────────────────────────────────────────────────

pub struct RemoteClient<T = HttpTransport> {
  transport: T,
  config:    ClientConfig,
  token:     Mutex<Option<AuthToken>>,
}

impl RemoteClient<HttpTransport> {
  /// Build a client over a real HTTP connection pool.
  pub fn new(config: ClientConfig) -> Result<Self> {
    let transport = HttpTransport::new(&config)?;
    Ok(Self::with_transport(transport, config))
  }
}

impl<T: Transport> RemoteClient<T> {
  pub fn with_transport(transport: T, config: ClientConfig) -> Self {
    Self { transport, config, token: Mutex::new(None) }
  }

  pub fn config(&self) -> &ClientConfig { &self.config }

  pub fn transport(&self) -> &T { &self.transport }

  /// Return a valid bearer token, logging in only when the cached one is
  /// missing or expired.
  pub async fn authenticate(&self) -> Result<AuthToken> {
    let mut cached = self.token.lock().await;
    if let Some(token) = cached.as_ref()
      && token.is_valid()
    {
      tracing::trace!("using cached token");
      return Ok(token.clone());
    }

    let body = serde_json::to_value(LoginRequest {
      login: &self.config.login,
      senha: &self.config.password,
    })
    .map_err(|e| Error::Auth(e.to_string()))?;

    let response = self.transport.send(ApiRequest::post(LOGIN_PATH, body)).await?;
    if response.status >= 500 {
      return Err(Error::Status { status: response.status, body: response.body });
    }
    if !response.is_success() {
      return Err(Error::Auth(format!("login rejected with status {}", response.status)));
    }

    let login: LoginResponse = serde_json::from_str(&response.body).map_err(|e| {
      Error::Decode { path: LOGIN_PATH.to_owned(), message: e.to_string() }
    })?;
    let token = AuthToken::from_login(login)?;
    tracing::debug!(expires_at = %token.expires_at, "obtained new token");

    *cached = Some(token.clone());
    Ok(token)
  }

  async fn forget_token(&self) { *self.token.lock().await = None; }

  /// Perform an authenticated call, retrying transport failures and
  /// unexpected statuses with exponential backoff.
  pub async fn request<R: DeserializeOwned>(&self, request: ApiRequest) -> Result<Fetched<R>> {
    let policy = self.config.retry;
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 1;

    loop {
      match self.attempt(request.clone()).await {
        Ok(fetched) => return Ok(fetched),
        Err(err) if err.is_retryable() && attempt < max_attempts => {
          let delay = policy.delay(attempt);
          tracing::warn!(
            path = %request.path,
            attempt,
            max_attempts,
            delay_ms = delay.as_millis() as u64,
            error = %err,
            "request failed, retrying"
          );
          tokio::time::sleep(delay).await;
          attempt += 1;
        }
        Err(err) if err.is_retryable() => {
          tracing::error!(path = %request.path, attempts = attempt, error = %err, "giving up");
          return Err(Error::Exhausted { attempts: attempt, last: Box::new(err) });
        }
        Err(err) => return Err(err),
      }
    }
  }

  async fn attempt<R: DeserializeOwned>(&self, mut request: ApiRequest) -> Result<Fetched<R>> {
    let token = self.authenticate().await?;
    request.bearer = Some(token.token);
    let path = request.path.clone();

    let response = self.transport.send(request).await?;
    if is_no_data(&response) {
      tracing::debug!(%path, "upstream reports no data for period");
      return Ok(Fetched::NoData);
    }
    if response.status == 401 {
      // Expired or revoked server-side; the next attempt logs in again.
      self.forget_token().await;
    }
    if !response.is_success() {
      return Err(Error::Status { status: response.status, body: response.body });
    }

    serde_json::from_str(&response.body)
      .map(Fetched::Data)
      .map_err(|e| Error::Decode { path, message: e.to_string() })
  }

  // ── Endpoints ─────────────────────────────────────────────────────────────

  pub async fn list_states(&self) -> Result<Vec<Estado>> {
    let request = ApiRequest::get(STATES_PATH)
      .param("Page", 1)
      .param("Limit", STATES_LIMIT);
    let page: Option<Page<Estado>> = self.request(request).await?.into_option();
    Ok(page.map(|p| p.items).unwrap_or_default())
  }

  /// Months with an imported table for `uf` in `year`.
  pub async fn imported_months(&self, uf: &str, year: i32) -> Result<Vec<u32>> {
    let request = ApiRequest::get(MONTHS_PATH)
      .param("TipoTabela", &self.config.table_type)
      .param("Uf", uf)
      .param("Ano", year);
    let months: Option<Vec<MonthOption>> = self.request(request).await?.into_option();
    let mut months: Vec<u32> = months.unwrap_or_default().into_iter().map(|m| m.value).collect();
    months.sort_unstable();
    months.dedup();
    Ok(months)
  }

  pub async fn fetch_catalog_page(
    &self,
    slice: &SliceQuery,
    page: u32,
    limit: u32,
  ) -> Result<Fetched<Page<CatalogRecord>>> {
    let request = ApiRequest::get(CATALOG_PATH)
      .param("TipoTabela", &self.config.table_type)
      .param("Ano", slice.year)
      .param("Mes", slice.month)
      .param("Uf", &slice.uf)
      .param("Composicao", slice.composition)
      .param("Page", page)
      .param("Limit", limit);
    self.request(request).await
  }
}
