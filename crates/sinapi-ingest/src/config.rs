//! Ingestion configuration.

use std::path::{Path, PathBuf};

use chrono::Datelike as _;
use serde::Deserialize;
use sinapi_client::ClientConfig;

fn default_store_path() -> PathBuf { PathBuf::from("sinapi.db") }
fn default_interval_secs() -> u64 { 3600 }

/// Settings for the `sinapi-ingest` binary, deserialised from `config.toml`
/// and `SINAPI_*` environment variables.
#[derive(Debug, Clone, Deserialize)]
pub struct IngestConfig {
  #[serde(default = "default_store_path")]
  pub store_path:    PathBuf,
  /// Years to mirror; empty means the current year.
  #[serde(default)]
  pub years:         Vec<i32>,
  /// Pause between two full passes in `run` mode.
  #[serde(default = "default_interval_secs")]
  pub interval_secs: u64,
  /// Upstream settings; only the commands that fetch need them.
  #[serde(default)]
  pub client:        Option<ClientConfig>,
}

impl IngestConfig {
  /// Layer `path` (optional) under `SINAPI_`-prefixed environment variables,
  /// e.g. `SINAPI_CLIENT__LOGIN`.
  pub fn load(path: &Path) -> Result<Self, config::ConfigError> {
    config::Config::builder()
      .add_source(config::File::from(path).required(false))
      .add_source(
        config::Environment::with_prefix("SINAPI")
          .prefix_separator("_")
          .separator("__")
          .list_separator(",")
          .with_list_parse_key("years")
          .try_parsing(true),
      )
      .build()?
      .try_deserialize()
  }

  pub fn require_client(&self) -> Result<&ClientConfig, config::ConfigError> {
    self
      .client
      .as_ref()
      .ok_or_else(|| config::ConfigError::NotFound("client".to_owned()))
  }

  pub fn target_years(&self) -> Vec<i32> {
    if self.years.is_empty() {
      vec![chrono::Utc::now().year()]
    } else {
      let mut years = self.years.clone();
      years.sort_unstable();
      years.dedup();
      years
    }
  }
}

#[cfg(test)]
mod tests {
  use std::io::Write as _;

  use super::*;

  #[test]
  fn loads_toml_with_defaults() {
    let dir = std::env::temp_dir().join(format!("sinapi-ingest-cfg-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
      file,
      r#"
years = [2024, 2023, 2024]

[client]
login = "ops@example.com"
password = "hunter2"
"#
    )
    .unwrap();

    let cfg = IngestConfig::load(&path).unwrap();
    assert_eq!(cfg.target_years(), vec![2023, 2024]);
    assert_eq!(cfg.interval_secs, 3600);
    assert_eq!(cfg.store_path, PathBuf::from("sinapi.db"));
    let client = cfg.require_client().unwrap();
    assert_eq!(client.page_size, 50);
    assert_eq!(client.table_type, "SINAPI");

    std::fs::remove_dir_all(&dir).ok();
  }

  #[test]
  fn store_only_config_loads_without_credentials() {
    let dir = std::env::temp_dir().join(format!("sinapi-ingest-offline-{}", std::process::id()));
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join("config.toml");
    std::fs::write(&path, "store_path = \"/var/lib/sinapi/catalog.db\"\n").unwrap();

    let cfg = IngestConfig::load(&path).unwrap();
    assert_eq!(cfg.store_path, PathBuf::from("/var/lib/sinapi/catalog.db"));
    assert!(cfg.client.is_none());
    assert!(cfg.require_client().is_err());

    std::fs::remove_dir_all(&dir).ok();
  }
}
