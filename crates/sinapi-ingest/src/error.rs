//! Error type for `sinapi-ingest`.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  /// A single record could not be ingested; the run carries on.
  #[error("record failed: {0}")]
  Record(#[from] sinapi_core::Error),

  /// The store failed for reasons unrelated to the record at hand.
  #[error("store error: {0}")]
  Store(#[source] Box<dyn std::error::Error + Send + Sync>),

  #[error("upstream error: {0}")]
  Client(#[from] sinapi_client::Error),
}

impl Error {
  /// Classify a store error: per-record failures stay recoverable.
  pub fn from_store<E: sinapi_core::store::StoreError>(err: E) -> Self {
    match err.record_failure() {
      Some(failure) => Self::Record(failure.clone()),
      None => Self::Store(Box::new(err)),
    }
  }

  pub fn is_record_failure(&self) -> bool { matches!(self, Self::Record(_)) }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
