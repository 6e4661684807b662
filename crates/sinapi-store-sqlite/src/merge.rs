//! Check-then-act merges, run on the database thread.
//!
//! Every function here takes a plain [`Connection`]; callers pass the open
//! [`rusqlite::Transaction`] of the record being applied, so a failure
//! anywhere unwinds the whole record. All statements go through the single
//! connection owned by the store, which serialises concurrent merges of the
//! same id.

use rusqlite::{Connection, OptionalExtension as _, params};
use sinapi_core::{
  entity::{
    CatalogEntry, Class, CompositionLine, Entity, EntityKind, Id, PricingTable, State, Unit,
  },
  plan::MergeOutcome,
};

use crate::{
  encode::{
    CLASS_COLUMNS, ENTRY_COLUMNS, LINE_COLUMNS, STATE_COLUMNS, TABLE_COLUMNS, UNIT_COLUMNS,
    class_from_row, entry_from_row, line_from_row, state_from_row, table_from_row, table_name,
    unit_from_row,
  },
  error::raise,
};

// ─── Entry point ─────────────────────────────────────────────────────────────

/// Verify `entity`'s references, then merge it.
///
/// An entry's table and unit are optional: one that is not stored is written
/// as NULL instead of failing the record. Every other reference must resolve.
pub fn apply_entity(conn: &Connection, entity: &Entity) -> tokio_rusqlite::Result<MergeOutcome> {
  let detached;
  let entity = match entity {
    Entity::CatalogEntry(e) => {
      detached = Entity::CatalogEntry(detach_missing(conn, e)?);
      &detached
    }
    other => other,
  };

  for (kind, id) in entity.references() {
    if !exists(conn, kind, id)? {
      return Err(raise(sinapi_core::Error::DependencyNotFound { kind, id }));
    }
  }

  let outcome = match entity {
    Entity::State(s) => merge_state(conn, s)?,
    Entity::PricingTable(t) => merge_table(conn, t)?,
    Entity::Unit(u) => merge_unit(conn, u)?,
    Entity::Class(c) => merge_class(conn, c)?,
    Entity::PlaceholderClass(id) => ensure_placeholder_class(conn, *id)?,
    Entity::CatalogEntry(e) => merge_entry(conn, e)?,
    Entity::CompositionLine(l) => merge_line(conn, l)?,
  };
  Ok(outcome)
}

pub fn exists(conn: &Connection, kind: EntityKind, id: Id) -> rusqlite::Result<bool> {
  let sql = format!("SELECT 1 FROM {} WHERE id = ?1", table_name(kind));
  Ok(
    conn
      .prepare_cached(&sql)?
      .query_row(params![id], |_| Ok(()))
      .optional()?
      .is_some(),
  )
}

fn detach_missing(conn: &Connection, e: &CatalogEntry) -> rusqlite::Result<CatalogEntry> {
  let mut out = e.clone();
  for (kind, slot) in [
    (EntityKind::PricingTable, &mut out.table_id),
    (EntityKind::Unit, &mut out.unit_id),
  ] {
    if let Some(id) = *slot
      && !exists(conn, kind, id)?
    {
      tracing::debug!(entry_id = e.id, %kind, id, "unknown reference stored as null");
      *slot = None;
    }
  }
  Ok(out)
}

/// Shared decision: write nothing when the stored row already matches.
fn decide<T: PartialEq>(
  stored: Option<T>,
  incoming: &T,
  insert: impl FnOnce() -> rusqlite::Result<usize>,
  update: impl FnOnce() -> rusqlite::Result<usize>,
) -> rusqlite::Result<MergeOutcome> {
  match stored {
    None => {
      insert()?;
      Ok(MergeOutcome::Inserted)
    }
    Some(row) if row == *incoming => Ok(MergeOutcome::Unchanged),
    Some(_) => {
      update()?;
      Ok(MergeOutcome::Updated)
    }
  }
}

// ─── Per-kind merges ─────────────────────────────────────────────────────────

fn merge_state(conn: &Connection, s: &State) -> rusqlite::Result<MergeOutcome> {
  let stored = conn
    .prepare_cached(&format!("SELECT {STATE_COLUMNS} FROM states WHERE id = ?1"))?
    .query_row(params![s.id], state_from_row)
    .optional()?;

  decide(
    stored,
    s,
    || {
      conn.execute(
        "INSERT INTO states (id, name, abbreviation, ibge_code, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![s.id, s.name, s.abbreviation, s.ibge_code, s.deleted],
      )
    },
    || {
      conn.execute(
        "UPDATE states SET name = ?2, abbreviation = ?3, ibge_code = ?4, deleted = ?5
         WHERE id = ?1",
        params![s.id, s.name, s.abbreviation, s.ibge_code, s.deleted],
      )
    },
  )
}

fn merge_table(conn: &Connection, t: &PricingTable) -> rusqlite::Result<MergeOutcome> {
  let stored = conn
    .prepare_cached(&format!("SELECT {TABLE_COLUMNS} FROM pricing_tables WHERE id = ?1"))?
    .query_row(params![t.id], table_from_row)
    .optional()?;

  let values = params![
    t.id,
    t.name,
    t.state_id,
    t.month,
    t.year,
    t.updated_at,
    t.table_type_id,
    t.deleted,
  ];

  decide(
    stored,
    t,
    || {
      conn.execute(
        "INSERT INTO pricing_tables
           (id, name, state_id, month, year, updated_at, table_type_id, deleted)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        values,
      )
    },
    || {
      conn.execute(
        "UPDATE pricing_tables
         SET name = ?2, state_id = ?3, month = ?4, year = ?5,
             updated_at = ?6, table_type_id = ?7, deleted = ?8
         WHERE id = ?1",
        values,
      )
    },
  )
}

fn merge_unit(conn: &Connection, u: &Unit) -> rusqlite::Result<MergeOutcome> {
  let stored = conn
    .prepare_cached(&format!("SELECT {UNIT_COLUMNS} FROM units WHERE id = ?1"))?
    .query_row(params![u.id], unit_from_row)
    .optional()?;

  decide(
    stored,
    u,
    || {
      conn.execute(
        "INSERT INTO units (id, name, deleted) VALUES (?1, ?2, ?3)",
        params![u.id, u.name, u.deleted],
      )
    },
    || {
      conn.execute(
        "UPDATE units SET name = ?2, deleted = ?3 WHERE id = ?1",
        params![u.id, u.name, u.deleted],
      )
    },
  )
}

/// A real class record always wins over a placeholder with the same id.
fn merge_class(conn: &Connection, c: &Class) -> rusqlite::Result<MergeOutcome> {
  let stored = conn
    .prepare_cached(&format!(
      "SELECT {CLASS_COLUMNS}, placeholder FROM classes WHERE id = ?1"
    ))?
    .query_row(params![c.id], |row| {
      Ok((class_from_row(row)?, row.get::<_, bool>(3)?))
    })
    .optional()?;

  decide(
    stored,
    &(c.clone(), false),
    || {
      conn.execute(
        "INSERT INTO classes (id, name, deleted, placeholder) VALUES (?1, ?2, ?3, 0)",
        params![c.id, c.name, c.deleted],
      )
    },
    || {
      conn.execute(
        "UPDATE classes SET name = ?2, deleted = ?3, placeholder = 0 WHERE id = ?1",
        params![c.id, c.name, c.deleted],
      )
    },
  )
}

fn ensure_placeholder_class(conn: &Connection, id: Id) -> rusqlite::Result<MergeOutcome> {
  if exists(conn, EntityKind::Class, id)? {
    return Ok(MergeOutcome::Unchanged);
  }
  let placeholder = Class::placeholder(id);
  conn.execute(
    "INSERT INTO classes (id, name, deleted, placeholder) VALUES (?1, ?2, ?3, 1)",
    params![placeholder.id, placeholder.name, placeholder.deleted],
  )?;
  tracing::debug!(class_id = id, "synthesised placeholder class");
  Ok(MergeOutcome::Inserted)
}

fn merge_entry(conn: &Connection, e: &CatalogEntry) -> rusqlite::Result<MergeOutcome> {
  let stored = conn
    .prepare_cached(&format!("SELECT {ENTRY_COLUMNS} FROM catalog_entries WHERE id = ?1"))?
    .query_row(params![e.id], entry_from_row)
    .optional()?;

  let b = &e.breakdown;
  let values = params![
    e.id,
    e.name,
    e.code,
    e.table_id,
    e.unit_id,
    e.class_id,
    e.value_burdened,
    e.value_unburdened,
    e.is_composition,
    b.labor,
    b.material,
    b.equipment,
    b.third_party_services,
    b.other,
    e.deleted,
  ];

  decide(
    stored,
    e,
    || {
      conn.execute(
        "INSERT INTO catalog_entries (
           id, name, code, table_id, unit_id, class_id,
           value_burdened, value_unburdened, is_composition,
           pct_labor, pct_material, pct_equipment, pct_third_party_services, pct_other,
           deleted
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15)",
        values,
      )
    },
    || {
      conn.execute(
        "UPDATE catalog_entries
         SET name = ?2, code = ?3, table_id = ?4, unit_id = ?5, class_id = ?6,
             value_burdened = ?7, value_unburdened = ?8, is_composition = ?9,
             pct_labor = ?10, pct_material = ?11, pct_equipment = ?12,
             pct_third_party_services = ?13, pct_other = ?14, deleted = ?15
         WHERE id = ?1",
        values,
      )
    },
  )
}

fn merge_line(conn: &Connection, l: &CompositionLine) -> rusqlite::Result<MergeOutcome> {
  let stored = conn
    .prepare_cached(&format!("SELECT {LINE_COLUMNS} FROM composition_lines WHERE id = ?1"))?
    .query_row(params![l.id], line_from_row)
    .optional()?;

  let values = params![
    l.id,
    l.parent_entry_id,
    l.child_entry_id,
    l.value_burdened,
    l.value_unburdened,
    l.coefficient,
    l.deleted,
  ];

  decide(
    stored,
    l,
    || {
      conn.execute(
        "INSERT INTO composition_lines (
           id, parent_entry_id, child_entry_id,
           value_burdened, value_unburdened, coefficient, deleted
         ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        values,
      )
    },
    || {
      conn.execute(
        "UPDATE composition_lines
         SET parent_entry_id = ?2, child_entry_id = ?3, value_burdened = ?4,
             value_unburdened = ?5, coefficient = ?6, deleted = ?7
         WHERE id = ?1",
        values,
      )
    },
  )
}
