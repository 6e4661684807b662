//! Error type for `sinapi-store-sqlite`.

use sinapi_core::store::StoreError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
  #[error("core error: {0}")]
  Core(#[from] sinapi_core::Error),

  #[error("database error: {0}")]
  Database(tokio_rusqlite::Error),

  #[error("date/time parse error: {0}")]
  DateParse(String),
}

impl StoreError for Error {
  fn record_failure(&self) -> Option<&sinapi_core::Error> {
    match self {
      Self::Core(e) if e.is_record_failure() => Some(e),
      _ => None,
    }
  }
}

/// Sorts errors coming back from the database thread: domain errors raised
/// inside a closure are unboxed, and SQLite integrity failures become
/// [`sinapi_core::Error::ConstraintViolation`].
impl From<tokio_rusqlite::Error> for Error {
  fn from(err: tokio_rusqlite::Error) -> Self {
    match err {
      tokio_rusqlite::Error::Other(boxed) => match boxed.downcast::<sinapi_core::Error>() {
        Ok(core) => Self::Core(*core),
        Err(other) => Self::Database(tokio_rusqlite::Error::Other(other)),
      },
      tokio_rusqlite::Error::Rusqlite(rusqlite::Error::SqliteFailure(code, msg))
        if code.code == rusqlite::ErrorCode::ConstraintViolation =>
      {
        Self::Core(sinapi_core::Error::ConstraintViolation(
          msg.unwrap_or_else(|| code.to_string()),
        ))
      }
      other => Self::Database(other),
    }
  }
}

/// Raise a domain error from inside a `Connection::call` closure.
pub(crate) fn raise(err: sinapi_core::Error) -> tokio_rusqlite::Error {
  tokio_rusqlite::Error::Other(Box::new(err))
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
