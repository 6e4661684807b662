//! [`PageCursor`]: page-by-page enumeration of one catalog slice.

use futures::{Stream, TryStreamExt as _, stream};

use crate::{
  Error, Result,
  client::{Fetched, SliceQuery},
  source::CatalogSource,
  wire::CatalogRecord,
};

/// Records of one fetched page, tagged with the page number.
#[derive(Debug, Clone, PartialEq)]
pub struct FetchedPage {
  pub page:    u32,
  pub records: Vec<CatalogRecord>,
}

/// Walks one slice from a start page until upstream runs dry.
///
/// The cursor ends on the first empty page or on a no-data response. Each
/// fetched page advances the counter by exactly one; a failed fetch leaves
/// it in place so the same page can be retried.
pub struct PageCursor<'a, S> {
  source:    &'a S,
  slice:     SliceQuery,
  page_size: u32,
  next_page: u32,
  done:      bool,
}

impl<'a, S: CatalogSource> PageCursor<'a, S> {
  pub fn new(source: &'a S, slice: SliceQuery, page_size: u32) -> Self {
    Self { source, slice, page_size, next_page: 1, done: false }
  }

  /// Resume from `page` instead of page 1.
  pub fn starting_at(mut self, page: u32) -> Self {
    self.next_page = page.max(1);
    self
  }

  pub fn slice(&self) -> &SliceQuery { &self.slice }

  /// The page the next call to [`next_page`](Self::next_page) fetches.
  pub fn position(&self) -> u32 { self.next_page }

  pub fn is_done(&self) -> bool { self.done }

  /// Fetch the next page, or `None` once the slice is exhausted.
  pub async fn next_page(&mut self) -> Result<Option<FetchedPage>> {
    if self.done {
      return Ok(None);
    }

    let page = self.next_page;
    let fetched = self.source.catalog_page(&self.slice, page, self.page_size).await?;
    self.next_page += 1;

    match fetched {
      Fetched::Data(p) if !p.items.is_empty() => {
        tracing::trace!(page, records = p.items.len(), "fetched page");
        Ok(Some(FetchedPage { page, records: p.items }))
      }
      _ => {
        tracing::trace!(page, "slice exhausted");
        self.done = true;
        Ok(None)
      }
    }
  }

  /// Flatten the remaining pages into a lazy stream of records.
  pub fn records(self) -> impl Stream<Item = Result<CatalogRecord>> + 'a {
    stream::try_unfold(self, |mut cursor| async move {
      Ok::<_, Error>(cursor.next_page().await?.map(|page| {
        (stream::iter(page.records.into_iter().map(Ok::<_, Error>)), cursor)
      }))
    })
    .try_flatten()
  }
}
