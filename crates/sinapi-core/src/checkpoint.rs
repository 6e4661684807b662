//! Slice checkpoints: ingestion progress bookkeeping.
//!
//! A slice is one `(state, year, month, items-or-compositions)` combination
//! paged through by the ingestion run. Its checkpoint remembers the next page
//! to fetch so an interrupted run can resume where it stopped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entity::Id;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SliceKey {
  pub state_id:    Id,
  pub year:        i32,
  pub month:       u32,
  pub composition: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Checkpoint {
  pub key:        SliceKey,
  /// First page not yet fully upserted.
  pub next_page:  u32,
  pub completed:  bool,
  pub updated_at: DateTime<Utc>,
}

impl Checkpoint {
  /// Page a run should start the slice from.
  ///
  /// Completed slices start over, since they are only revisited when the
  /// planner suspects their state.
  pub fn resume_page(&self) -> u32 {
    if self.completed { 1 } else { self.next_page.max(1) }
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn checkpoint(next_page: u32, completed: bool) -> Checkpoint {
    Checkpoint {
      key: SliceKey { state_id: 1, year: 2024, month: 3, composition: true },
      next_page,
      completed,
      updated_at: Utc::now(),
    }
  }

  #[test]
  fn incomplete_slice_resumes_from_next_page() {
    assert_eq!(checkpoint(7, false).resume_page(), 7);
  }

  #[test]
  fn completed_slice_restarts() {
    assert_eq!(checkpoint(7, true).resume_page(), 1);
  }

  #[test]
  fn page_zero_is_clamped() {
    assert_eq!(checkpoint(0, false).resume_page(), 1);
  }
}
