//! Reconciliation: which states does this run still need to visit?

use std::collections::HashSet;

use sinapi_client::CatalogSource;
use sinapi_core::{
  entity::{Id, State},
  store::CatalogStore,
};

use crate::{Error, Result, normalize::state_from_wire};

/// States present upstream but not in the store, plus the last state a run
/// touched, ordered by id.
///
/// The last-touched state is re-verified even though it is stored: the run
/// that wrote it may have stopped half-way through. Two states are the same
/// when both id and IBGE code match.
pub fn candidate_states(upstream: &[State], stored: &[State], last_touched: Option<Id>) -> Vec<State> {
  let stored_ids: HashSet<(Id, i64)> = stored.iter().map(State::identity).collect();

  let mut out: Vec<State> = upstream
    .iter()
    .filter(|s| !stored_ids.contains(&s.identity()) || Some(s.id) == last_touched)
    .cloned()
    .collect();

  // A last-touched state upstream no longer lists is still worth finishing.
  if let Some(id) = last_touched
    && !out.iter().any(|s| s.id == id)
    && let Some(state) = stored.iter().find(|s| s.id == id)
  {
    out.push(state.clone());
  }

  out.sort_by_key(|s| s.id);
  out.dedup_by_key(|s| s.id);
  out
}

/// Add the states in `unfinished` (ids with an incomplete slice) that
/// `planned` does not already hold, keeping id order.
pub fn with_unfinished(
  mut planned: Vec<State>,
  unfinished: &[Id],
  upstream: &[State],
  stored: &[State],
) -> Vec<State> {
  for id in unfinished {
    if planned.iter().any(|s| s.id == *id) {
      continue;
    }
    if let Some(state) = upstream.iter().chain(stored).find(|s| s.id == *id) {
      planned.push(state.clone());
    }
  }
  planned.sort_by_key(|s| s.id);
  planned
}

/// Fetch both sides and compute the states this run must visit.
pub async fn reconcile<Src, St>(source: &Src, store: &St) -> Result<Vec<State>>
where
  Src: CatalogSource,
  St: CatalogStore,
{
  let upstream: Vec<State> = source.states().await?.iter().map(state_from_wire).collect();
  let stored = store.list_states().await.map_err(Error::from_store)?;
  let last_touched = store.last_touched_state().await.map_err(Error::from_store)?;
  let unfinished = store.unfinished_states().await.map_err(Error::from_store)?;

  let planned = with_unfinished(
    candidate_states(&upstream, &stored, last_touched),
    &unfinished,
    &upstream,
    &stored,
  );
  tracing::info!(
    upstream = upstream.len(),
    stored = stored.len(),
    ?last_touched,
    unfinished = unfinished.len(),
    planned = planned.len(),
    "reconciled states"
  );
  Ok(planned)
}
