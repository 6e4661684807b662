//! Client configuration, passed in explicitly at construction.

use std::time::Duration;

use rand::Rng as _;
use serde::{Deserialize, Serialize};

pub const DEFAULT_BASE_URL: &str = "https://api.apisinapi.com.br/";

fn default_base_url() -> String { DEFAULT_BASE_URL.to_owned() }
fn default_timeout_secs() -> u64 { 3600 }
fn default_page_size() -> u32 { 50 }
fn default_table_type() -> String { "SINAPI".to_owned() }

/// Connection settings and credentials for the upstream catalog API.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClientConfig {
  #[serde(default = "default_base_url")]
  pub base_url:     String,
  pub login:        String,
  pub password:     String,
  /// Overall ceiling for a single call. Upstream can be very slow on large
  /// pages, hence the generous default.
  #[serde(default = "default_timeout_secs")]
  pub timeout_secs: u64,
  #[serde(default = "default_page_size")]
  pub page_size:    u32,
  /// `TipoTabela` filter sent with every catalog query.
  #[serde(default = "default_table_type")]
  pub table_type:   String,
  #[serde(default)]
  pub retry:        RetryPolicy,
}

impl ClientConfig {
  pub fn new(login: impl Into<String>, password: impl Into<String>) -> Self {
    Self {
      base_url:     default_base_url(),
      login:        login.into(),
      password:     password.into(),
      timeout_secs: default_timeout_secs(),
      page_size:    default_page_size(),
      table_type:   default_table_type(),
      retry:        RetryPolicy::default(),
    }
  }

  pub fn timeout(&self) -> Duration { Duration::from_secs(self.timeout_secs) }
}

// ─── Retry ───────────────────────────────────────────────────────────────────

/// Exponential backoff with additive random jitter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
  /// Total attempts per request, including the first.
  pub max_attempts:  u32,
  /// Delay after the first failure; doubles on every further one.
  pub base_delay_ms: u64,
  /// Upper bound of the uniform jitter added to each delay.
  pub max_jitter_ms: u64,
}

impl Default for RetryPolicy {
  fn default() -> Self { Self { max_attempts: 5, base_delay_ms: 1000, max_jitter_ms: 1000 } }
}

impl RetryPolicy {
  /// A policy that retries immediately; handy in tests.
  pub fn immediate(max_attempts: u32) -> Self {
    Self { max_attempts, base_delay_ms: 0, max_jitter_ms: 0 }
  }

  /// Backoff before the attempt following failed attempt number `attempt`
  /// (1-based), without jitter.
  pub fn base_delay(&self, attempt: u32) -> Duration {
    let shift = attempt.saturating_sub(1).min(16);
    Duration::from_millis(self.base_delay_ms.saturating_mul(1u64 << shift))
  }

  /// [`base_delay`](Self::base_delay) plus a random jitter.
  pub fn delay(&self, attempt: u32) -> Duration {
    let jitter = rand::thread_rng().gen_range(0..=self.max_jitter_ms);
    self.base_delay(attempt) + Duration::from_millis(jitter)
  }
}
