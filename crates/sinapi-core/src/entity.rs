//! Entity types: the local mirror of the upstream cost catalog.
//!
//! Every entity is keyed by the integer id the upstream API assigned to it;
//! the store never generates ids of its own. Rows are created and refreshed by
//! ingestion only, and the `deleted` flags are copied from upstream verbatim.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Upstream-assigned identifier, also the local primary key.
pub type Id = i64;

/// Name given to a class synthesised before its real record is seen.
pub const UNCLASSIFIED: &str = "unclassified";

// ─── Kinds ───────────────────────────────────────────────────────────────────

/// Discriminant for each table of the data model, in dependency order.
#[derive(
  Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(rename_all = "snake_case")]
pub enum EntityKind {
  State,
  PricingTable,
  Unit,
  Class,
  CatalogEntry,
  CompositionLine,
}

impl EntityKind {
  pub const ALL: [EntityKind; 6] = [
    Self::State,
    Self::PricingTable,
    Self::Unit,
    Self::Class,
    Self::CatalogEntry,
    Self::CompositionLine,
  ];

  pub fn as_str(self) -> &'static str {
    match self {
      Self::State => "state",
      Self::PricingTable => "pricing_table",
      Self::Unit => "unit",
      Self::Class => "class",
      Self::CatalogEntry => "catalog_entry",
      Self::CompositionLine => "composition_line",
    }
  }
}

impl fmt::Display for EntityKind {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    f.write_str(self.as_str())
  }
}

// ─── State ───────────────────────────────────────────────────────────────────

/// A Brazilian federative unit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct State {
  pub id:           Id,
  pub name:         String,
  /// Two-letter UF, e.g. `"RS"`.
  pub abbreviation: String,
  pub ibge_code:    i64,
  pub deleted:      Option<bool>,
}

impl State {
  /// The pair that decides whether two state records describe the same
  /// state. Names and flags are ignored.
  pub fn identity(&self) -> (Id, i64) { (self.id, self.ibge_code) }
}

// ─── PricingTable ────────────────────────────────────────────────────────────

/// A monthly price list scoped to one state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PricingTable {
  pub id:            Id,
  pub name:          Option<String>,
  pub state_id:      Id,
  pub month:         i64,
  pub year:          i64,
  /// Upstream's last-updated timestamp, kept as sent.
  pub updated_at:    Option<String>,
  pub table_type_id: Option<i64>,
  pub deleted:       Option<bool>,
}

// ─── Unit / Class ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Unit {
  pub id:      Id,
  pub name:    Option<String>,
  pub deleted: Option<bool>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Class {
  pub id:      Id,
  pub name:    Option<String>,
  pub deleted: Option<bool>,
}

impl Class {
  /// Stand-in for a class that is referenced before it has been fetched.
  pub fn placeholder(id: Id) -> Self {
    Self { id, name: Some(UNCLASSIFIED.to_owned()), deleted: None }
  }
}

// ─── CatalogEntry ────────────────────────────────────────────────────────────

/// Optional percentage split of an entry's cost.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CostBreakdown {
  pub labor:                Option<f64>,
  pub material:             Option<f64>,
  pub equipment:            Option<f64>,
  pub third_party_services: Option<f64>,
  pub other:                Option<f64>,
}

/// An insumo (priced base input) or, with `is_composition`, a composição.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CatalogEntry {
  pub id:               Id,
  pub name:             Option<String>,
  pub code:             Option<String>,
  pub table_id:         Option<Id>,
  pub unit_id:          Option<Id>,
  pub class_id:         Option<Id>,
  /// Price including payroll charges ("onerado").
  pub value_burdened:   Option<f64>,
  /// Price without payroll charges ("não onerado").
  pub value_unburdened: Option<f64>,
  pub is_composition:   bool,
  pub breakdown:        CostBreakdown,
  pub deleted:          Option<bool>,
}

// ─── CompositionLine ─────────────────────────────────────────────────────────

/// Edge from a composition to one of its components.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompositionLine {
  pub id:               Id,
  pub parent_entry_id:  Id,
  pub child_entry_id:   Id,
  pub value_burdened:   Option<f64>,
  pub value_unburdened: Option<f64>,
  /// Quantity of the child per unit of the parent.
  pub coefficient:      Option<f64>,
  pub deleted:          Option<bool>,
}

// ─── Entity ──────────────────────────────────────────────────────────────────

/// One row-to-be, as produced by normalisation and consumed by the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "data", rename_all = "snake_case")]
pub enum Entity {
  State(State),
  PricingTable(PricingTable),
  Unit(Unit),
  Class(Class),
  /// Insert [`Class::placeholder`] unless a class with this id exists.
  PlaceholderClass(Id),
  CatalogEntry(CatalogEntry),
  CompositionLine(CompositionLine),
}

impl Entity {
  pub fn kind(&self) -> EntityKind {
    match self {
      Self::State(_) => EntityKind::State,
      Self::PricingTable(_) => EntityKind::PricingTable,
      Self::Unit(_) => EntityKind::Unit,
      Self::Class(_) | Self::PlaceholderClass(_) => EntityKind::Class,
      Self::CatalogEntry(_) => EntityKind::CatalogEntry,
      Self::CompositionLine(_) => EntityKind::CompositionLine,
    }
  }

  pub fn id(&self) -> Id {
    match self {
      Self::State(e) => e.id,
      Self::PricingTable(e) => e.id,
      Self::Unit(e) => e.id,
      Self::Class(e) => e.id,
      Self::PlaceholderClass(id) => *id,
      Self::CatalogEntry(e) => e.id,
      Self::CompositionLine(e) => e.id,
    }
  }

  /// Every `(kind, id)` this entity points at through a foreign key.
  pub fn references(&self) -> Vec<(EntityKind, Id)> {
    match self {
      Self::PricingTable(t) => vec![(EntityKind::State, t.state_id)],
      Self::CatalogEntry(e) => [
        e.table_id.map(|id| (EntityKind::PricingTable, id)),
        e.unit_id.map(|id| (EntityKind::Unit, id)),
        e.class_id.map(|id| (EntityKind::Class, id)),
      ]
      .into_iter()
      .flatten()
      .collect(),
      Self::CompositionLine(l) => vec![
        (EntityKind::CatalogEntry, l.parent_entry_id),
        (EntityKind::CatalogEntry, l.child_entry_id),
      ],
      Self::State(_) | Self::Unit(_) | Self::Class(_) | Self::PlaceholderClass(_) => {
        Vec::new()
      }
    }
  }
}
