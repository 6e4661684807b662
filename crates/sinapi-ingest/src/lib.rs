//! SINAPI catalog ingestion.
//!
//! [`Pipeline`] drives one pass: [`planner`] picks the states to visit, the
//! client pages through every `(state, year, month)` slice, [`normalize`]
//! turns records into dependency-ordered plans and [`UpsertEngine`] applies
//! each plan as one unit of work.

pub mod config;
pub mod engine;
pub mod error;
pub mod normalize;
pub mod pipeline;
pub mod planner;

pub use config::IngestConfig;
pub use engine::{BatchReport, UpsertEngine};
pub use error::{Error, Result};
pub use pipeline::{Phase, Pipeline, RunReport};
pub use planner::{candidate_states, reconcile};
