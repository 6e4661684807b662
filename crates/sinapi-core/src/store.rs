//! The `CatalogStore` trait and supporting query types.
//!
//! The trait is implemented by storage backends (e.g. `sinapi-store-sqlite`).
//! Ingestion writes through it; the read API only ever calls its read half.

use std::{fmt, future::Future, str::FromStr};

use serde::{Deserialize, Serialize};

use crate::{
  Error,
  checkpoint::{Checkpoint, SliceKey},
  entity::{CatalogEntry, Class, CompositionLine, Entity, EntityKind, Id, PricingTable, State},
  plan::{MergeOutcome, RecordOutcome, RecordPlan},
};

// ─── Query types ─────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
  #[default]
  Asc,
  Desc,
}

impl Direction {
  pub fn as_sql(self) -> &'static str {
    match self {
      Self::Asc => "ASC",
      Self::Desc => "DESC",
    }
  }
}

impl FromStr for Direction {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s.to_ascii_lowercase().as_str() {
      "asc" => Ok(Self::Asc),
      "desc" => Ok(Self::Desc),
      _ => Err(Error::UnknownDirection(s.to_owned())),
    }
  }
}

/// Columns catalog entries may be ordered by.
///
/// Parsing is strict: an unknown column is a caller bug and is rejected with
/// the list of accepted names rather than silently ignored.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum EntryOrder {
  #[default]
  Id,
  Name,
  Code,
  ValueBurdened,
  ValueUnburdened,
}

impl EntryOrder {
  pub const NAMES: [&'static str; 5] =
    ["id", "name", "code", "value_burdened", "value_unburdened"];

  pub fn column(self) -> &'static str {
    match self {
      Self::Id => "id",
      Self::Name => "name",
      Self::Code => "code",
      Self::ValueBurdened => "value_burdened",
      Self::ValueUnburdened => "value_unburdened",
    }
  }
}

impl FromStr for EntryOrder {
  type Err = Error;

  fn from_str(s: &str) -> Result<Self, Self::Err> {
    match s {
      "id" => Ok(Self::Id),
      "name" => Ok(Self::Name),
      "code" => Ok(Self::Code),
      "value_burdened" => Ok(Self::ValueBurdened),
      "value_unburdened" => Ok(Self::ValueUnburdened),
      other => Err(Error::UnknownOrderColumn {
        requested: other.to_owned(),
        allowed:   Self::NAMES.join(", "),
      }),
    }
  }
}

impl fmt::Display for EntryOrder {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.column())
  }
}

/// Parameters for [`CatalogStore::list_entries`].
#[derive(Debug, Clone, Default)]
pub struct EntryQuery {
  pub table_id:    Option<Id>,
  pub class_id:    Option<Id>,
  /// `Some(true)` for compositions only, `Some(false)` for insumos only.
  pub composition: Option<bool>,
  pub order_by:    EntryOrder,
  pub direction:   Direction,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

/// Parameters for [`CatalogStore::list_tables`].
#[derive(Debug, Clone, Default)]
pub struct TableQuery {
  pub state_id: Option<Id>,
  pub year:     Option<i64>,
  pub month:    Option<i64>,
}

/// An inclusive run of ids, as reported by the gap query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdRange {
  pub first: Id,
  pub last:  Id,
}

impl IdRange {
  pub fn count(&self) -> u64 { self.last.abs_diff(self.first) + 1 }
}

impl fmt::Display for IdRange {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    if self.first == self.last {
      write!(f, "{}", self.first)
    } else {
      write!(f, "{}-{}", self.first, self.last)
    }
  }
}

// ─── Trait ───────────────────────────────────────────────────────────────────

/// Backend errors, some of which wrap a per-record failure.
///
/// Ingestion uses this to tell a record that must be skipped apart from a
/// store that has stopped working.
pub trait StoreError: std::error::Error + Send + Sync + 'static {
  fn record_failure(&self) -> Option<&Error>;
}

/// Abstraction over a catalog store backend.
///
/// Writes are merges keyed by upstream id; rows are never deleted. A
/// [`RecordPlan`] is applied atomically: either every op commits or none does.
///
/// All methods return `Send` futures so the trait can be used in multi-threaded
/// async runtimes (e.g. tokio with `axum`).
pub trait CatalogStore: Send + Sync {
  type Error: StoreError;

  // ── Writes ────────────────────────────────────────────────────────────

  /// Insert the entity if its id is new, otherwise refresh its mutable
  /// fields. Runs as its own unit of work.
  fn merge_entity(
    &self,
    entity: Entity,
  ) -> impl Future<Output = Result<MergeOutcome, Self::Error>> + Send + '_;

  /// Merge every op of `plan` in order inside one transaction.
  ///
  /// Before each op, all of its references must resolve; a dangling one
  /// aborts the plan with a dependency error and nothing is persisted.
  fn apply_record(
    &self,
    plan: RecordPlan,
  ) -> impl Future<Output = Result<RecordOutcome, Self::Error>> + Send + '_;

  // ── Reconciliation ────────────────────────────────────────────────────

  /// All stored states, ordered by id.
  fn list_states(&self) -> impl Future<Output = Result<Vec<State>, Self::Error>> + Send + '_;

  /// The stored state most recently worked on by ingestion, if any.
  fn last_touched_state(
    &self,
  ) -> impl Future<Output = Result<Option<Id>, Self::Error>> + Send + '_;

  /// Ids of states with an unfinished year or at least one slice not marked
  /// completed.
  fn unfinished_states(&self) -> impl Future<Output = Result<Vec<Id>, Self::Error>> + Send + '_;

  /// Record whether every month of `year` has been enumerated for a state.
  ///
  /// A run marks the year unfinished before it lists the months, so a state
  /// whose month listing failed, or whose run stopped before the first slice
  /// checkpoint, is still reported by [`Self::unfinished_states`].
  fn mark_state_year(
    &self,
    state_id: Id,
    year: i32,
    completed: bool,
  ) -> impl Future<Output = Result<(), Self::Error>> + Send + '_;

  fn get_checkpoint(
    &self,
    key: SliceKey,
  ) -> impl Future<Output = Result<Option<Checkpoint>, Self::Error>> + Send + '_;

  /// Create or overwrite the checkpoint for `key`; the store stamps the time.
  fn save_checkpoint(
    &self,
    key: SliceKey,
    next_page: u32,
    completed: bool,
  ) -> impl Future<Output = Result<Checkpoint, Self::Error>> + Send + '_;

  /// Runs of ids between the smallest and largest stored entry of
  /// `table_id` that have no row, in ascending order.
  fn missing_entry_ranges(
    &self,
    table_id: Id,
  ) -> impl Future<Output = Result<Vec<IdRange>, Self::Error>> + Send + '_;

  // ── Reads ─────────────────────────────────────────────────────────────

  fn count(&self, kind: EntityKind) -> impl Future<Output = Result<u64, Self::Error>> + Send + '_;

  fn get_state(&self, id: Id) -> impl Future<Output = Result<Option<State>, Self::Error>> + Send + '_;

  fn get_class(&self, id: Id) -> impl Future<Output = Result<Option<Class>, Self::Error>> + Send + '_;

  fn list_classes(&self) -> impl Future<Output = Result<Vec<Class>, Self::Error>> + Send + '_;

  fn list_tables<'a>(
    &'a self,
    query: &'a TableQuery,
  ) -> impl Future<Output = Result<Vec<PricingTable>, Self::Error>> + Send + 'a;

  fn get_entry(
    &self,
    id: Id,
  ) -> impl Future<Output = Result<Option<CatalogEntry>, Self::Error>> + Send + '_;

  fn list_entries<'a>(
    &'a self,
    query: &'a EntryQuery,
  ) -> impl Future<Output = Result<Vec<CatalogEntry>, Self::Error>> + Send + 'a;

  /// Lines whose parent is `parent_id`, ordered by line id.
  fn composition_lines(
    &self,
    parent_id: Id,
  ) -> impl Future<Output = Result<Vec<CompositionLine>, Self::Error>> + Send + '_;
}
