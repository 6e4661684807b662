//! Handlers for catalog entries and composition detail.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/entries` | Filters, `order_by`, `direction`, `limit`, `offset` |
//! | `GET`  | `/entries/{id}` | 404 if not found |
//! | `GET`  | `/compositions/{id}` | Entry plus lines, each child expanded |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Path, Query, State},
};
use serde::{Deserialize, Serialize};
use sinapi_core::{
  entity::{CatalogEntry, CompositionLine, Id},
  store::{CatalogStore, Direction, EntryOrder, EntryQuery},
};

use crate::error::ApiError;

/// Largest page the API hands out in one response.
pub const MAX_LIMIT: usize = 1000;

// ─── List ─────────────────────────────────────────────────────────────────────

#[derive(Debug, Deserialize, Default)]
pub struct ListParams {
  pub table_id:    Option<Id>,
  pub class_id:    Option<Id>,
  /// `true` for compositions only, `false` for insumos only.
  pub composition: Option<bool>,
  /// One of [`EntryOrder::NAMES`]; anything else is a 400.
  pub order_by:    Option<String>,
  /// `asc` (default) or `desc`.
  pub direction:   Option<String>,
  pub limit:       Option<usize>,
  pub offset:      Option<usize>,
}

impl ListParams {
  fn into_query(self) -> Result<EntryQuery, ApiError> {
    let order_by = self.order_by.as_deref().map(str::parse::<EntryOrder>).transpose()?;
    let direction = self.direction.as_deref().map(str::parse::<Direction>).transpose()?;
    Ok(EntryQuery {
      table_id:    self.table_id,
      class_id:    self.class_id,
      composition: self.composition,
      order_by:    order_by.unwrap_or_default(),
      direction:   direction.unwrap_or_default(),
      limit:       self.limit.map(|l| l.min(MAX_LIMIT)),
      offset:      self.offset,
    })
  }
}

/// `GET /entries[?table_id=...][&class_id=...][&composition=...][&order_by=...][&direction=...][&limit=...][&offset=...]`
pub async fn list<S: CatalogStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<ListParams>,
) -> Result<Json<Vec<CatalogEntry>>, ApiError> {
  let query = params.into_query()?;
  let entries = store.list_entries(&query).await.map_err(ApiError::store)?;
  Ok(Json(entries))
}

// ─── Get one ──────────────────────────────────────────────────────────────────

/// `GET /entries/{id}`
pub async fn get_one<S: CatalogStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Id>,
) -> Result<Json<CatalogEntry>, ApiError> {
  let entry = fetch_entry(store.as_ref(), id).await?;
  Ok(Json(entry))
}

async fn fetch_entry<S: CatalogStore>(store: &S, id: Id) -> Result<CatalogEntry, ApiError> {
  store
    .get_entry(id)
    .await
    .map_err(ApiError::store)?
    .ok_or_else(|| ApiError::NotFound(format!("catalog entry {id} not found")))
}

// ─── Composition detail ───────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
pub struct LineView {
  #[serde(flatten)]
  pub line:  CompositionLine,
  /// The child entry; `None` only if the store lost it.
  pub child: Option<CatalogEntry>,
}

#[derive(Debug, Serialize)]
pub struct CompositionView {
  #[serde(flatten)]
  pub entry: CatalogEntry,
  pub lines: Vec<LineView>,
}

/// `GET /compositions/{id}`
///
/// Lines are expanded one level: each child entry is inlined, but the
/// child's own lines are not.
pub async fn composition<S: CatalogStore>(
  State(store): State<Arc<S>>,
  Path(id): Path<Id>,
) -> Result<Json<CompositionView>, ApiError> {
  let entry = fetch_entry(store.as_ref(), id).await?;
  if !entry.is_composition {
    return Err(ApiError::NotFound(format!("catalog entry {id} is not a composition")));
  }

  let mut lines = Vec::new();
  for line in store.composition_lines(id).await.map_err(ApiError::store)? {
    let child = store.get_entry(line.child_entry_id).await.map_err(ApiError::store)?;
    lines.push(LineView { line, child });
  }
  Ok(Json(CompositionView { entry, lines }))
}
