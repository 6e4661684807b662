//! Error type for `sinapi-client`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// The request never produced a response (connect, timeout, TLS, ...).
  #[error("transport error: {0}")]
  Transport(String),

  /// Upstream answered with a status the client does not accept.
  #[error("unexpected status {status}: {body}")]
  Status { status: u16, body: String },

  #[error("could not decode response from {path}: {message}")]
  Decode { path: String, message: String },

  /// Login was refused or returned an unusable token.
  #[error("authentication failed: {0}")]
  Auth(String),

  /// Every attempt failed; `last` is the final attempt's error.
  #[error("request gave up after {attempts} attempts: {last}")]
  Exhausted { attempts: u32, last: Box<Error> },

  #[error("invalid client configuration: {0}")]
  Config(String),
}

impl Error {
  /// Whether another attempt at the same request may succeed.
  pub fn is_retryable(&self) -> bool {
    matches!(self, Self::Transport(_) | Self::Status { .. })
  }
}

impl From<reqwest::Error> for Error {
  fn from(err: reqwest::Error) -> Self { Self::Transport(err.to_string()) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
