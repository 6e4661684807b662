//! `sinapi-ingest`: mirrors the SINAPI catalog into a local SQLite store.
//!
//! # Usage
//!
//! ```
//! sinapi-ingest --config config.toml run     # pass, sleep, repeat
//! sinapi-ingest once                         # a single pass
//! sinapi-ingest gaps --table 42              # missing id ranges in table 42
//! ```

use std::{path::PathBuf, time::Duration};

use anyhow::Context as _;
use clap::{Parser, Subcommand};
use sinapi_client::RemoteClient;
use sinapi_core::store::CatalogStore as _;
use sinapi_ingest::{IngestConfig, Pipeline};
use sinapi_store_sqlite::SqliteStore;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about = "SINAPI catalog ingestion")]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "config.toml")]
  config: PathBuf,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand)]
enum Command {
  /// Run passes forever, sleeping `interval_secs` between them.
  Run,
  /// Run a single pass and print its report.
  Once,
  /// List runs of entry ids missing between the lowest and highest stored
  /// id of a pricing table. Needs no upstream credentials.
  Gaps {
    #[arg(long)]
    table: i64,
  },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let cfg = IngestConfig::load(&cli.config).context("failed to load configuration")?;

  let store = SqliteStore::open(&cfg.store_path)
    .await
    .with_context(|| format!("failed to open store at {:?}", cfg.store_path))?;

  let years = cfg.target_years();
  let interval = Duration::from_secs(cfg.interval_secs);

  match cli.command {
    Command::Gaps { table } => {
      let gaps = store.missing_entry_ranges(table).await.context("gap query failed")?;
      for gap in gaps {
        println!("{gap}");
      }
    }
    Command::Run => {
      let client = connect(&cfg)?;
      let page_size = client.config().page_size;
      Pipeline::new(&client, &store, years, page_size).run_forever(interval).await;
    }
    Command::Once => {
      let client = connect(&cfg)?;
      let page_size = client.config().page_size;
      let report = Pipeline::new(&client, &store, years, page_size)
        .run_once()
        .await
        .context("ingestion pass failed")?;
      println!("{report:#?}");
    }
  }

  Ok(())
}

fn connect(cfg: &IngestConfig) -> anyhow::Result<RemoteClient> {
  let client_cfg = cfg.require_client().context("upstream settings are required")?;
  RemoteClient::new(client_cfg.clone()).context("failed to build client")
}
