//! The ingestion run: plan, enumerate, fetch, normalise, upsert, repeat.

use std::{fmt, time::Duration};

use sinapi_client::{CatalogSource, PageCursor, SliceQuery};
use sinapi_core::{
  checkpoint::SliceKey,
  entity::{Entity, State},
  store::CatalogStore,
};

use crate::{
  Error, Result,
  engine::{BatchReport, UpsertEngine},
  normalize::normalize_record,
  planner::reconcile,
};

// ─── Phases ──────────────────────────────────────────────────────────────────

/// Where a run currently is. Transitions are logged at `DEBUG`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Phase {
  Idle,
  Planning,
  Enumerating { state: String, year: i32, month: u32, composition: bool },
  Fetching { page: u32 },
  Normalizing { page: u32 },
  Upserting { page: u32 },
}

impl fmt::Display for Phase {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    match self {
      Self::Idle => f.write_str("idle"),
      Self::Planning => f.write_str("planning"),
      Self::Enumerating { state, year, month, composition } => {
        let kind = if *composition { "compositions" } else { "items" };
        write!(f, "enumerating {state} {month:02}/{year} {kind}")
      }
      Self::Fetching { page } => write!(f, "fetching page {page}"),
      Self::Normalizing { page } => write!(f, "normalizing page {page}"),
      Self::Upserting { page } => write!(f, "upserting page {page}"),
    }
  }
}

// ─── Report ──────────────────────────────────────────────────────────────────

/// Summary of one full pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
  pub states_planned:   usize,
  pub slices_completed: usize,
  /// Slices (or month listings) abandoned after the client gave up.
  pub slices_failed:    usize,
  pub pages:            usize,
  pub records_ok:       usize,
  pub records_failed:   usize,
  pub inserted:         usize,
  pub updated:          usize,
}

impl RunReport {
  fn absorb(&mut self, batch: &BatchReport) {
    self.pages += 1;
    self.records_ok += batch.ok;
    self.records_failed += batch.failed;
    self.inserted += batch.inserted;
    self.updated += batch.updated;
  }
}

// ─── Pipeline ────────────────────────────────────────────────────────────────

pub struct Pipeline<'a, Src, St> {
  source:    &'a Src,
  store:     &'a St,
  years:     Vec<i32>,
  page_size: u32,
  phase:     Phase,
}

impl<'a, Src, St> Pipeline<'a, Src, St>
where
  Src: CatalogSource,
  St: CatalogStore,
{
  pub fn new(source: &'a Src, store: &'a St, years: Vec<i32>, page_size: u32) -> Self {
    Self { source, store, years, page_size, phase: Phase::Idle }
  }

  pub fn phase(&self) -> &Phase { &self.phase }

  fn enter(&mut self, phase: Phase) {
    tracing::debug!(from = %self.phase, to = %phase, "phase");
    self.phase = phase;
  }

  /// One full pass over every planned state, year and month.
  ///
  /// Per-record and per-slice failures are counted in the report; only a
  /// failed plan or a broken store aborts the pass.
  pub async fn run_once(&mut self) -> Result<RunReport> {
    let mut report = RunReport::default();

    self.enter(Phase::Planning);
    let states = match reconcile(self.source, self.store).await {
      Ok(states) => states,
      Err(err) => {
        self.enter(Phase::Idle);
        return Err(err);
      }
    };
    report.states_planned = states.len();

    let result = self.visit_states(&states, &mut report).await;
    self.enter(Phase::Idle);
    result?;

    tracing::info!(
      states = report.states_planned,
      slices_completed = report.slices_completed,
      slices_failed = report.slices_failed,
      pages = report.pages,
      records_ok = report.records_ok,
      records_failed = report.records_failed,
      "run finished"
    );
    Ok(report)
  }

  async fn visit_states(&mut self, states: &[State], report: &mut RunReport) -> Result<()> {
    for state in states {
      // Marked before anything else is written, so a state cut short here
      // is planned again even after later states have been touched.
      for &year in &self.years {
        self
          .store
          .mark_state_year(state.id, year, false)
          .await
          .map_err(Error::from_store)?;
      }

      // Stored up front so the state counts as visited even if it has no
      // months yet.
      if let Err(err) = UpsertEngine::new(self.store)
        .merge_entity(Entity::State(state.clone()))
        .await
      {
        if !err.is_record_failure() {
          return Err(err);
        }
        tracing::warn!(state = %state.abbreviation, error = %err, "could not store state");
      }

      for year in self.years.clone() {
        let months = match self.source.months(&state.abbreviation, year).await {
          Ok(months) => months,
          Err(err) => {
            tracing::warn!(state = %state.abbreviation, year, error = %err, "month listing failed");
            report.slices_failed += 1;
            continue;
          }
        };

        for month in months {
          for composition in [false, true] {
            self.run_slice(state, year, month, composition, report).await?;
          }
        }
        // Abandoned slices keep their own incomplete checkpoints.
        self
          .store
          .mark_state_year(state.id, year, true)
          .await
          .map_err(Error::from_store)?;
      }
    }
    Ok(())
  }

  /// Page through one slice, checkpointing after every upserted page.
  async fn run_slice(
    &mut self,
    state: &State,
    year: i32,
    month: u32,
    composition: bool,
    report: &mut RunReport,
  ) -> Result<()> {
    self.enter(Phase::Enumerating {
      state: state.abbreviation.clone(),
      year,
      month,
      composition,
    });

    let key = SliceKey { state_id: state.id, year, month, composition };
    let start = self
      .store
      .get_checkpoint(key)
      .await
      .map_err(Error::from_store)?
      .map_or(1, |cp| cp.resume_page());
    // Mark the slice as in flight before the first fetch, so an interrupted
    // or abandoned slice is picked up by the next plan.
    self
      .store
      .save_checkpoint(key, start, false)
      .await
      .map_err(Error::from_store)?;

    let slice = SliceQuery { uf: state.abbreviation.clone(), year, month, composition };
    let source = self.source;
    let mut cursor = PageCursor::new(source, slice, self.page_size).starting_at(start);
    let engine = UpsertEngine::new(self.store);

    loop {
      self.enter(Phase::Fetching { page: cursor.position() });
      let page = match cursor.next_page().await {
        Ok(Some(page)) => page,
        Ok(None) => break,
        Err(err) => {
          tracing::warn!(
            state = %state.abbreviation,
            year,
            month,
            composition,
            page = cursor.position(),
            error = %err,
            "slice abandoned"
          );
          report.slices_failed += 1;
          return Ok(());
        }
      };

      self.enter(Phase::Normalizing { page: page.page });
      let plans: Vec<_> = page.records.iter().map(|r| normalize_record(r, state)).collect();

      self.enter(Phase::Upserting { page: page.page });
      let batch = engine.upsert_batch(plans).await?;
      report.absorb(&batch);

      tracing::info!(
        state = %state.abbreviation,
        year,
        month,
        composition,
        page = page.page,
        ok = batch.ok,
        failed = batch.failed,
        "page done"
      );
      self
        .store
        .save_checkpoint(key, page.page + 1, false)
        .await
        .map_err(Error::from_store)?;
    }

    self
      .store
      .save_checkpoint(key, cursor.position(), true)
      .await
      .map_err(Error::from_store)?;
    report.slices_completed += 1;
    Ok(())
  }

  /// Run passes forever, sleeping `interval` between them. A failed pass is
  /// logged and the next one starts on schedule.
  pub async fn run_forever(&mut self, interval: Duration) {
    loop {
      if let Err(err) = self.run_once().await {
        tracing::error!(error = %err, "run failed");
      }
      tracing::info!(secs = interval.as_secs(), "sleeping until next run");
      tokio::time::sleep(interval).await;
    }
  }
}
