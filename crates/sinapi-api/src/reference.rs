//! Handlers for the reference data: states, classes and pricing tables.
//!
//! | Method | Path | Notes |
//! |--------|------|-------|
//! | `GET`  | `/states` | Ordered by id |
//! | `GET`  | `/classes` | Placeholder classes included |
//! | `GET`  | `/tables` | Optional `state_id`, `year`, `month` |

use std::sync::Arc;

use axum::{
  Json,
  extract::{Query, State},
};
use serde::Deserialize;
use sinapi_core::{
  entity::{self, Class, Id, PricingTable},
  store::{CatalogStore, TableQuery},
};

use crate::error::ApiError;

/// `GET /states`
pub async fn states<S: CatalogStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<entity::State>>, ApiError> {
  let states = store.list_states().await.map_err(ApiError::store)?;
  Ok(Json(states))
}

/// `GET /classes`
pub async fn classes<S: CatalogStore>(
  State(store): State<Arc<S>>,
) -> Result<Json<Vec<Class>>, ApiError> {
  let classes = store.list_classes().await.map_err(ApiError::store)?;
  Ok(Json(classes))
}

#[derive(Debug, Deserialize, Default)]
pub struct TableParams {
  pub state_id: Option<Id>,
  pub year:     Option<i64>,
  pub month:    Option<i64>,
}

/// `GET /tables[?state_id=...][&year=...][&month=...]`
pub async fn tables<S: CatalogStore>(
  State(store): State<Arc<S>>,
  Query(params): Query<TableParams>,
) -> Result<Json<Vec<PricingTable>>, ApiError> {
  let query = TableQuery { state_id: params.state_id, year: params.year, month: params.month };
  let tables = store.list_tables(&query).await.map_err(ApiError::store)?;
  Ok(Json(tables))
}
