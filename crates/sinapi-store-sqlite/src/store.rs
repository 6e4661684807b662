//! [`SqliteStore`]: the SQLite implementation of [`CatalogStore`].

use std::path::Path;

use chrono::Utc;
use rusqlite::{OptionalExtension as _, TransactionBehavior, params};

use sinapi_core::{
  checkpoint::{Checkpoint, SliceKey},
  entity::{CatalogEntry, Class, CompositionLine, Entity, EntityKind, Id, PricingTable, State},
  plan::{MergeOutcome, RecordOutcome, RecordPlan},
  store::{CatalogStore, EntryQuery, IdRange, TableQuery},
};

use crate::{
  Result,
  encode::{
    CHECKPOINT_COLUMNS, CLASS_COLUMNS, ENTRY_COLUMNS, LINE_COLUMNS, RawCheckpoint, STATE_COLUMNS,
    TABLE_COLUMNS, class_from_row, encode_dt, entry_from_row, line_from_row, state_from_row,
    table_from_row, table_name,
  },
  merge::apply_entity,
  schema::SCHEMA,
};

/// Default page size for list reads when the caller sets none.
const DEFAULT_LIMIT: usize = 100;

// ─── Store ───────────────────────────────────────────────────────────────────

/// A catalog store backed by a single SQLite file.
///
/// Cloning is cheap; the inner connection is reference-counted. Every clone
/// shares one database thread, so writes are serialised store-wide.
#[derive(Clone)]
pub struct SqliteStore {
  conn: tokio_rusqlite::Connection,
}

impl SqliteStore {
  /// Open (or create) a store at `path` and run schema initialisation.
  pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open(path).await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  /// Open an in-memory store, mainly for tests.
  pub async fn open_in_memory() -> Result<Self> {
    let conn = tokio_rusqlite::Connection::open_in_memory().await?;
    let store = Self { conn };
    store.init_schema().await?;
    Ok(store)
  }

  async fn init_schema(&self) -> Result<()> {
    self
      .conn
      .call(|conn| {
        conn.execute_batch(SCHEMA)?;
        Ok(())
      })
      .await?;
    Ok(())
  }
}

// ─── CatalogStore impl ───────────────────────────────────────────────────────

impl CatalogStore for SqliteStore {
  type Error = crate::Error;

  // ── Writes ────────────────────────────────────────────────────────────────

  async fn merge_entity(&self, entity: Entity) -> Result<MergeOutcome> {
    let outcome = self
      .conn
      .call(move |conn| {
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let outcome = apply_entity(&tx, &entity)?;
        tx.commit()?;
        Ok(outcome)
      })
      .await?;
    Ok(outcome)
  }

  async fn apply_record(&self, plan: RecordPlan) -> Result<RecordOutcome> {
    let root_id = plan.root_id;
    let outcome = self
      .conn
      .call(move |conn| {
        // Dropping `tx` on any early return rolls the whole record back.
        let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
        let mut outcome = RecordOutcome::new(plan.root_id);
        for op in &plan.ops {
          outcome.tally(apply_entity(&tx, op)?);
        }
        tx.commit()?;
        Ok(outcome)
      })
      .await?;

    tracing::trace!(
      record_id = root_id,
      inserted = outcome.inserted,
      updated = outcome.updated,
      unchanged = outcome.unchanged,
      "record committed"
    );
    Ok(outcome)
  }

  // ── Reconciliation ────────────────────────────────────────────────────────

  async fn list_states(&self) -> Result<Vec<State>> {
    let states = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT {STATE_COLUMNS} FROM states ORDER BY id"))?;
        let rows = stmt
          .query_map([], state_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(states)
  }

  async fn last_touched_state(&self) -> Result<Option<Id>> {
    let id = self
      .conn
      .call(|conn| {
        let touched: Option<Id> = conn
          .query_row(
            "SELECT state_id FROM slice_checkpoints ORDER BY seq DESC LIMIT 1",
            [],
            |row| row.get(0),
          )
          .optional()?;
        if touched.is_some() {
          return Ok(touched);
        }
        // Runs visit states in id order, so the highest stored id is the
        // last one an unrecorded run can have reached.
        let highest: Option<Id> = conn.query_row("SELECT MAX(id) FROM states", [], |row| row.get(0))?;
        Ok(highest)
      })
      .await?;
    Ok(id)
  }

  async fn unfinished_states(&self) -> Result<Vec<Id>> {
    let ids = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(
          "SELECT state_id FROM slice_checkpoints WHERE completed = 0
           UNION
           SELECT state_id FROM state_years WHERE completed = 0
           ORDER BY state_id",
        )?;
        let rows = stmt
          .query_map([], |row| row.get(0))?
          .collect::<rusqlite::Result<Vec<Id>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(ids)
  }

  async fn mark_state_year(&self, state_id: Id, year: i32, completed: bool) -> Result<()> {
    let at_str = encode_dt(Utc::now());
    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO state_years (state_id, year, completed, updated_at)
           VALUES (?1, ?2, ?3, ?4)
           ON CONFLICT (state_id, year) DO UPDATE SET
             completed  = excluded.completed,
             updated_at = excluded.updated_at",
          params![state_id, year, completed, at_str],
        )?;
        Ok(())
      })
      .await?;
    Ok(())
  }

  async fn get_checkpoint(&self, key: SliceKey) -> Result<Option<Checkpoint>> {
    let raw = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!(
                "SELECT {CHECKPOINT_COLUMNS} FROM slice_checkpoints
                 WHERE state_id = ?1 AND year = ?2 AND month = ?3 AND composition = ?4"
              ),
              params![key.state_id, key.year, key.month, key.composition],
              RawCheckpoint::from_row,
            )
            .optional()?,
        )
      })
      .await?;
    raw.map(RawCheckpoint::into_checkpoint).transpose()
  }

  async fn save_checkpoint(
    &self,
    key: SliceKey,
    next_page: u32,
    completed: bool,
  ) -> Result<Checkpoint> {
    let checkpoint = Checkpoint { key, next_page, completed, updated_at: Utc::now() };
    let at_str = encode_dt(checkpoint.updated_at);

    self
      .conn
      .call(move |conn| {
        conn.execute(
          "INSERT INTO slice_checkpoints
             (state_id, year, month, composition, next_page, completed, updated_at, seq)
           VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7,
                   (SELECT COALESCE(MAX(seq), 0) + 1 FROM slice_checkpoints))
           ON CONFLICT (state_id, year, month, composition) DO UPDATE SET
             next_page  = excluded.next_page,
             completed  = excluded.completed,
             updated_at = excluded.updated_at,
             seq        = excluded.seq",
          params![
            key.state_id,
            key.year,
            key.month,
            key.composition,
            next_page,
            completed,
            at_str,
          ],
        )?;
        Ok(())
      })
      .await?;

    Ok(checkpoint)
  }

  async fn missing_entry_ranges(&self, table_id: Id) -> Result<Vec<IdRange>> {
    let ranges = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(
          "SELECT prev + 1, id - 1 FROM (
             SELECT id, LAG(id) OVER (ORDER BY id) AS prev
             FROM catalog_entries WHERE table_id = ?1
           )
           WHERE id - prev > 1
           ORDER BY id",
        )?;
        let rows = stmt
          .query_map(params![table_id], |row| {
            Ok(IdRange { first: row.get(0)?, last: row.get(1)? })
          })?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(ranges)
  }

  // ── Reads ─────────────────────────────────────────────────────────────────

  async fn count(&self, kind: EntityKind) -> Result<u64> {
    let sql = format!("SELECT COUNT(*) FROM {}", table_name(kind));
    let n = self
      .conn
      .call(move |conn| Ok(conn.query_row(&sql, [], |row| row.get::<_, u64>(0))?))
      .await?;
    Ok(n)
  }

  async fn get_state(&self, id: Id) -> Result<Option<State>> {
    let state = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {STATE_COLUMNS} FROM states WHERE id = ?1"),
              params![id],
              state_from_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(state)
  }

  async fn get_class(&self, id: Id) -> Result<Option<Class>> {
    let class = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {CLASS_COLUMNS} FROM classes WHERE id = ?1"),
              params![id],
              class_from_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(class)
  }

  async fn list_classes(&self) -> Result<Vec<Class>> {
    let classes = self
      .conn
      .call(|conn| {
        let mut stmt = conn.prepare(&format!("SELECT {CLASS_COLUMNS} FROM classes ORDER BY id"))?;
        let rows = stmt
          .query_map([], class_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(classes)
  }

  async fn list_tables(&self, query: &TableQuery) -> Result<Vec<PricingTable>> {
    let TableQuery { state_id, year, month } = query.clone();

    let tables = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {TABLE_COLUMNS} FROM pricing_tables
           WHERE (?1 IS NULL OR state_id = ?1)
             AND (?2 IS NULL OR year = ?2)
             AND (?3 IS NULL OR month = ?3)
           ORDER BY year, month, state_id, id"
        ))?;
        let rows = stmt
          .query_map(params![state_id, year, month], table_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(tables)
  }

  async fn get_entry(&self, id: Id) -> Result<Option<CatalogEntry>> {
    let entry = self
      .conn
      .call(move |conn| {
        Ok(
          conn
            .query_row(
              &format!("SELECT {ENTRY_COLUMNS} FROM catalog_entries WHERE id = ?1"),
              params![id],
              entry_from_row,
            )
            .optional()?,
        )
      })
      .await?;
    Ok(entry)
  }

  async fn list_entries(&self, query: &EntryQuery) -> Result<Vec<CatalogEntry>> {
    let table_id    = query.table_id;
    let class_id    = query.class_id;
    let composition = query.composition;
    let limit_val   = query.limit.unwrap_or(DEFAULT_LIMIT) as i64;
    let offset_val  = query.offset.unwrap_or(0) as i64;
    // Both pieces come from closed enums, never from caller text.
    let order       = format!("{} {}", query.order_by.column(), query.direction.as_sql());

    let entries = self
      .conn
      .call(move |conn| {
        let sql = format!(
          "SELECT {ENTRY_COLUMNS} FROM catalog_entries
           WHERE (?1 IS NULL OR table_id = ?1)
             AND (?2 IS NULL OR class_id = ?2)
             AND (?3 IS NULL OR is_composition = ?3)
           ORDER BY {order}, id
           LIMIT ?4 OFFSET ?5"
        );
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
          .query_map(
            params![table_id, class_id, composition, limit_val, offset_val],
            entry_from_row,
          )?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(entries)
  }

  async fn composition_lines(&self, parent_id: Id) -> Result<Vec<CompositionLine>> {
    let lines = self
      .conn
      .call(move |conn| {
        let mut stmt = conn.prepare(&format!(
          "SELECT {LINE_COLUMNS} FROM composition_lines
           WHERE parent_entry_id = ?1 ORDER BY id"
        ))?;
        let rows = stmt
          .query_map(params![parent_id], line_from_row)?
          .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
      })
      .await?;
    Ok(lines)
  }
}
