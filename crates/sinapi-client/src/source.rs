//! The [`CatalogSource`] trait: what ingestion needs from upstream.

use std::future::Future;

use crate::{
  Result,
  client::{Fetched, RemoteClient, SliceQuery},
  transport::Transport,
  wire::{CatalogRecord, Estado, Page},
};

/// Read-only view of the upstream catalog.
///
/// [`RemoteClient`] is the production implementation; tests implement it
/// directly over canned pages.
pub trait CatalogSource: Send + Sync {
  fn states(&self) -> impl Future<Output = Result<Vec<Estado>>> + Send + '_;

  /// Months of `year` with an imported table for the state `uf`.
  fn months<'a>(
    &'a self,
    uf: &'a str,
    year: i32,
  ) -> impl Future<Output = Result<Vec<u32>>> + Send + 'a;

  fn catalog_page<'a>(
    &'a self,
    slice: &'a SliceQuery,
    page: u32,
    limit: u32,
  ) -> impl Future<Output = Result<Fetched<Page<CatalogRecord>>>> + Send + 'a;
}

impl<T: Transport> CatalogSource for RemoteClient<T> {
  async fn states(&self) -> Result<Vec<Estado>> { self.list_states().await }

  async fn months(&self, uf: &str, year: i32) -> Result<Vec<u32>> {
    self.imported_months(uf, year).await
  }

  async fn catalog_page(
    &self,
    slice: &SliceQuery,
    page: u32,
    limit: u32,
  ) -> Result<Fetched<Page<CatalogRecord>>> {
    self.fetch_catalog_page(slice, page, limit).await
  }
}
