//! Client for the upstream SINAPI catalog API.
//!
//! [`RemoteClient`] handles login, token caching and retries on top of a
//! [`Transport`]; [`PageCursor`] pages through one catalog slice. Ingestion
//! depends only on the [`CatalogSource`] trait.

pub mod auth;
pub mod client;
pub mod config;
pub mod cursor;
pub mod error;
pub mod source;
pub mod transport;
pub mod wire;

pub use client::{Fetched, RemoteClient, SliceQuery};
pub use config::{ClientConfig, RetryPolicy};
pub use cursor::{FetchedPage, PageCursor};
pub use error::{Error, Result};
pub use source::CatalogSource;
pub use transport::{ApiRequest, ApiResponse, HttpTransport, Transport};
