//! Read-only JSON API over a SINAPI catalog store.
//!
//! Exposes an axum [`Router`] backed by any [`sinapi_core::store::CatalogStore`].
//! Nothing here writes; ingestion owns the data.
//!
//! # Mounting
//!
//! ```rust,ignore
//! .nest("/api", sinapi_api::api_router(store.clone()))
//! ```

pub mod entries;
pub mod error;
pub mod reference;

use std::{path::PathBuf, sync::Arc};

use axum::{Router, routing::get};
use serde::Deserialize;
use sinapi_core::store::CatalogStore;

pub use error::ApiError;

// ─── Configuration ────────────────────────────────────────────────────────────

fn default_host() -> String { "127.0.0.1".to_owned() }
fn default_port() -> u16 { 8080 }
fn default_store_path() -> PathBuf { PathBuf::from("sinapi.db") }

/// Runtime server configuration, deserialised from `config.toml`.
#[derive(Debug, Deserialize, Clone)]
pub struct ApiConfig {
  #[serde(default = "default_host")]
  pub host:       String,
  #[serde(default = "default_port")]
  pub port:       u16,
  #[serde(default = "default_store_path")]
  pub store_path: PathBuf,
}

// ─── Router ───────────────────────────────────────────────────────────────────

/// Build a fully-materialised API router for `store`.
pub fn api_router<S>(store: Arc<S>) -> Router<()>
where
  S: CatalogStore + 'static,
{
  Router::new()
    .route("/states", get(reference::states::<S>))
    .route("/classes", get(reference::classes::<S>))
    .route("/tables", get(reference::tables::<S>))
    .route("/entries", get(entries::list::<S>))
    .route("/entries/{id}", get(entries::get_one::<S>))
    .route("/compositions/{id}", get(entries::composition::<S>))
    .with_state(store)
}
