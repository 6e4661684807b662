//! Encoding and decoding helpers between domain types and SQLite rows.
//!
//! Catalog columns map one-to-one onto entity fields, so rows decode straight
//! from [`rusqlite::Row`]. Checkpoint timestamps are stored as fixed-width
//! RFC 3339 strings and decode outside the database thread.

use chrono::{DateTime, SecondsFormat, Utc};
use rusqlite::Row;
use sinapi_core::{
  checkpoint::{Checkpoint, SliceKey},
  entity::{
    CatalogEntry, Class, CompositionLine, CostBreakdown, EntityKind, PricingTable, State, Unit,
  },
};

use crate::{Error, Result};

// ─── Table names ─────────────────────────────────────────────────────────────

pub fn table_name(kind: EntityKind) -> &'static str {
  match kind {
    EntityKind::State => "states",
    EntityKind::PricingTable => "pricing_tables",
    EntityKind::Unit => "units",
    EntityKind::Class => "classes",
    EntityKind::CatalogEntry => "catalog_entries",
    EntityKind::CompositionLine => "composition_lines",
  }
}

// ─── DateTime<Utc> ───────────────────────────────────────────────────────────

pub fn encode_dt(dt: DateTime<Utc>) -> String {
  dt.to_rfc3339_opts(SecondsFormat::Micros, true)
}

pub fn decode_dt(s: &str) -> Result<DateTime<Utc>> {
  DateTime::parse_from_rfc3339(s)
    .map(|dt| dt.with_timezone(&Utc))
    .map_err(|e| Error::DateParse(e.to_string()))
}

// ─── Column lists ────────────────────────────────────────────────────────────

pub const STATE_COLUMNS: &str = "id, name, abbreviation, ibge_code, deleted";

pub const TABLE_COLUMNS: &str =
  "id, name, state_id, month, year, updated_at, table_type_id, deleted";

pub const UNIT_COLUMNS: &str = "id, name, deleted";

pub const CLASS_COLUMNS: &str = "id, name, deleted";

pub const ENTRY_COLUMNS: &str = "id, name, code, table_id, unit_id, class_id,
  value_burdened, value_unburdened, is_composition,
  pct_labor, pct_material, pct_equipment, pct_third_party_services, pct_other,
  deleted";

pub const LINE_COLUMNS: &str = "id, parent_entry_id, child_entry_id,
  value_burdened, value_unburdened, coefficient, deleted";

// ─── Row decoders ────────────────────────────────────────────────────────────

pub fn state_from_row(row: &Row<'_>) -> rusqlite::Result<State> {
  Ok(State {
    id:           row.get(0)?,
    name:         row.get(1)?,
    abbreviation: row.get(2)?,
    ibge_code:    row.get(3)?,
    deleted:      row.get(4)?,
  })
}

pub fn table_from_row(row: &Row<'_>) -> rusqlite::Result<PricingTable> {
  Ok(PricingTable {
    id:            row.get(0)?,
    name:          row.get(1)?,
    state_id:      row.get(2)?,
    month:         row.get(3)?,
    year:          row.get(4)?,
    updated_at:    row.get(5)?,
    table_type_id: row.get(6)?,
    deleted:       row.get(7)?,
  })
}

pub fn unit_from_row(row: &Row<'_>) -> rusqlite::Result<Unit> {
  Ok(Unit { id: row.get(0)?, name: row.get(1)?, deleted: row.get(2)? })
}

pub fn class_from_row(row: &Row<'_>) -> rusqlite::Result<Class> {
  Ok(Class { id: row.get(0)?, name: row.get(1)?, deleted: row.get(2)? })
}

pub fn entry_from_row(row: &Row<'_>) -> rusqlite::Result<CatalogEntry> {
  Ok(CatalogEntry {
    id:               row.get(0)?,
    name:             row.get(1)?,
    code:             row.get(2)?,
    table_id:         row.get(3)?,
    unit_id:          row.get(4)?,
    class_id:         row.get(5)?,
    value_burdened:   row.get(6)?,
    value_unburdened: row.get(7)?,
    is_composition:   row.get(8)?,
    breakdown:        CostBreakdown {
      labor:                row.get(9)?,
      material:             row.get(10)?,
      equipment:            row.get(11)?,
      third_party_services: row.get(12)?,
      other:                row.get(13)?,
    },
    deleted:          row.get(14)?,
  })
}

pub fn line_from_row(row: &Row<'_>) -> rusqlite::Result<CompositionLine> {
  Ok(CompositionLine {
    id:               row.get(0)?,
    parent_entry_id:  row.get(1)?,
    child_entry_id:   row.get(2)?,
    value_burdened:   row.get(3)?,
    value_unburdened: row.get(4)?,
    coefficient:      row.get(5)?,
    deleted:          row.get(6)?,
  })
}

// ─── Checkpoints ─────────────────────────────────────────────────────────────

pub const CHECKPOINT_COLUMNS: &str =
  "state_id, year, month, composition, next_page, completed, updated_at";

/// Raw values read directly from a `slice_checkpoints` row.
pub struct RawCheckpoint {
  pub state_id:    i64,
  pub year:        i32,
  pub month:       u32,
  pub composition: bool,
  pub next_page:   u32,
  pub completed:   bool,
  pub updated_at:  String,
}

impl RawCheckpoint {
  pub fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
    Ok(Self {
      state_id:    row.get(0)?,
      year:        row.get(1)?,
      month:       row.get(2)?,
      composition: row.get(3)?,
      next_page:   row.get(4)?,
      completed:   row.get(5)?,
      updated_at:  row.get(6)?,
    })
  }

  pub fn into_checkpoint(self) -> Result<Checkpoint> {
    Ok(Checkpoint {
      key:        SliceKey {
        state_id:    self.state_id,
        year:        self.year,
        month:       self.month,
        composition: self.composition,
      },
      next_page:  self.next_page,
      completed:  self.completed,
      updated_at: decode_dt(&self.updated_at)?,
    })
  }
}
