//! Record plans and merge outcomes.
//!
//! A [`RecordPlan`] is the unit of work for one top-level upstream record: an
//! ordered list of entities that a store applies atomically. The order is the
//! dependency order, so each entity's references are already in place by the
//! time it is merged.

use serde::{Deserialize, Serialize};

use crate::entity::{Entity, EntityKind, Id};

// ─── RecordPlan ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordPlan {
  /// Id of the top-level catalog entry; used in logs and errors.
  pub root_id: Id,
  pub ops:     Vec<Entity>,
}

impl RecordPlan {
  pub fn new(root_id: Id) -> Self { Self { root_id, ops: Vec::new() } }

  pub fn push(&mut self, entity: Entity) { self.ops.push(entity); }

  pub fn len(&self) -> usize { self.ops.len() }

  pub fn is_empty(&self) -> bool { self.ops.is_empty() }

  /// Position of the first op creating `(kind, id)`, if any.
  pub fn position_of(&self, kind: EntityKind, id: Id) -> Option<usize> {
    self.ops.iter().position(|op| op.kind() == kind && op.id() == id)
  }
}

// ─── Outcomes ────────────────────────────────────────────────────────────────

/// What a single merge did to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
  Inserted,
  Updated,
  /// The stored row already matched; nothing was written.
  Unchanged,
}

/// Tally of the merges performed for one committed [`RecordPlan`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordOutcome {
  pub root_id:   Id,
  pub inserted:  usize,
  pub updated:   usize,
  pub unchanged: usize,
}

impl RecordOutcome {
  pub fn new(root_id: Id) -> Self { Self { root_id, ..Self::default() } }

  pub fn tally(&mut self, outcome: MergeOutcome) {
    match outcome {
      MergeOutcome::Inserted => self.inserted += 1,
      MergeOutcome::Updated => self.updated += 1,
      MergeOutcome::Unchanged => self.unchanged += 1,
    }
  }

  /// True when the record changed nothing in the store.
  pub fn is_noop(&self) -> bool { self.inserted == 0 && self.updated == 0 }
}
