//! Error types for `sinapi-core`.
//!
//! The first three variants are the per-record failure taxonomy: any of them
//! aborts the record being ingested, never the run.

use thiserror::Error;

use crate::entity::{EntityKind, Id};

#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
  /// The upstream record lacks a key the data model cannot do without.
  #[error("record {record_id:?} is missing required field `{field}`")]
  MissingRequiredField {
    record_id: Option<Id>,
    field:     &'static str,
  },

  /// A referenced row is absent even though everything it depends on was
  /// merged first.
  #[error("{kind} {id} not found")]
  DependencyNotFound { kind: EntityKind, id: Id },

  /// The store rejected a write on integrity grounds.
  #[error("constraint violation: {0}")]
  ConstraintViolation(String),

  #[error("unknown order column {requested:?}; expected one of: {allowed}")]
  UnknownOrderColumn {
    requested: String,
    allowed:   String,
  },

  #[error("unknown sort direction {0:?}; expected `asc` or `desc`")]
  UnknownDirection(String),
}

impl Error {
  /// Whether this error belongs to the per-record taxonomy.
  pub fn is_record_failure(&self) -> bool {
    matches!(
      self,
      Self::MissingRequiredField { .. }
        | Self::DependencyNotFound { .. }
        | Self::ConstraintViolation(_)
    )
  }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
