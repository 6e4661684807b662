//! [`UpsertEngine`]: per-record units of work against a [`CatalogStore`].

use sinapi_client::wire::CatalogRecord;
use sinapi_core::{
  entity::{Entity, State},
  plan::{MergeOutcome, RecordOutcome, RecordPlan},
  store::CatalogStore,
};

use crate::{Error, Result, normalize::normalize_record};

/// Tally of one batch of records.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchReport {
  pub ok:        usize,
  pub failed:    usize,
  pub inserted:  usize,
  pub updated:   usize,
  pub unchanged: usize,
}

impl BatchReport {
  fn absorb(&mut self, outcome: &RecordOutcome) {
    self.ok += 1;
    self.inserted += outcome.inserted;
    self.updated += outcome.updated;
    self.unchanged += outcome.unchanged;
  }
}

pub struct UpsertEngine<'a, St> {
  store: &'a St,
}

impl<'a, St: CatalogStore> UpsertEngine<'a, St> {
  pub fn new(store: &'a St) -> Self { Self { store } }

  /// Merge a single entity as its own unit of work.
  pub async fn merge_entity(&self, entity: Entity) -> Result<MergeOutcome> {
    let (kind, id) = (entity.kind(), entity.id());
    let outcome = self.store.merge_entity(entity).await.map_err(Error::from_store)?;
    tracing::trace!(%kind, id, ?outcome, "merged entity");
    Ok(outcome)
  }

  /// Apply one plan atomically. Nothing is written if any op fails.
  pub async fn upsert_plan(&self, plan: RecordPlan) -> Result<RecordOutcome> {
    let record_id = plan.root_id;
    match self.store.apply_record(plan).await {
      Ok(outcome) => {
        tracing::info!(
          record_id,
          inserted = outcome.inserted,
          updated = outcome.updated,
          "record upserted"
        );
        Ok(outcome)
      }
      Err(err) => Err(Error::from_store(err)),
    }
  }

  /// Normalise and apply one upstream record.
  pub async fn upsert_record(&self, record: &CatalogRecord, state: &State) -> Result<RecordOutcome> {
    let plan = normalize_record(record, state)?;
    self.upsert_plan(plan).await
  }

  /// Apply a batch of already-normalised records in order.
  ///
  /// A record that fails is logged with its id and counted; the batch moves
  /// on. Only an error unrelated to the record (the store itself failing)
  /// stops the batch.
  pub async fn upsert_batch<I>(&self, plans: I) -> Result<BatchReport>
  where
    I: IntoIterator<Item = sinapi_core::Result<RecordPlan>>,
  {
    let mut report = BatchReport::default();
    for plan in plans {
      let result = match plan {
        Ok(plan) => {
          let record_id = plan.root_id;
          self.upsert_plan(plan).await.map_err(|e| (Some(record_id), e))
        }
        Err(e) => Err((record_id_of(&e), Error::Record(e))),
      };

      match result {
        Ok(outcome) => report.absorb(&outcome),
        Err((record_id, err)) if err.is_record_failure() => {
          tracing::warn!(?record_id, error = %err, "record skipped");
          report.failed += 1;
        }
        Err((_, err)) => return Err(err),
      }
    }
    Ok(report)
  }

  /// Normalise and apply `records`, isolating per-record failures.
  pub async fn upsert_records(&self, records: &[CatalogRecord], state: &State) -> Result<BatchReport> {
    self
      .upsert_batch(records.iter().map(|r| normalize_record(r, state)))
      .await
  }
}

fn record_id_of(err: &sinapi_core::Error) -> Option<i64> {
  match err {
    sinapi_core::Error::MissingRequiredField { record_id, .. } => *record_id,
    _ => None,
  }
}

#[cfg(test)]
mod tests {
  use std::sync::{Arc, Mutex};

  use sinapi_core::entity::{EntityKind, UNCLASSIFIED};
  use sinapi_store_sqlite::SqliteStore;
  use tracing_subscriber::fmt::MakeWriter;

  use super::*;

  async fn store() -> SqliteStore { SqliteStore::open_in_memory().await.expect("in-memory store") }

  fn rs() -> State {
    State {
      id:           21,
      name:         "Rio Grande do Sul".into(),
      abbreviation: "RS".into(),
      ibge_code:    43,
      deleted:      None,
    }
  }

  fn insumo(id: i64, month: i64, unit_id: i64) -> CatalogRecord {
    serde_json::from_value(serde_json::json!({
      "id": id, "nome": format!("insumo {id}"), "codigo": format!("{id:05}"),
      "idTabela": 10 + month, "idUnidade": unit_id, "idClasse": 999,
      "composicao": false, "valorOnerado": 1.5,
      "tabela": {"id": 10 + month, "idEstado": 21, "mes": month, "ano": 2024},
      "unidade": {"id": unit_id, "nome": "UN"}
    }))
    .unwrap()
  }

  fn composition(id: i64, unit_id: i64, child: CatalogRecord) -> CatalogRecord {
    let child_id = child.id;
    serde_json::from_value(serde_json::json!({
      "id": id, "composicao": true, "idTabela": 13, "idUnidade": unit_id,
      "tabela": {"id": 13, "idEstado": 21, "mes": 3, "ano": 2024},
      "unidade": {"id": unit_id, "nome": "M2"},
      "insumosComposicoes": [{
        "id": 9000, "idInsumo": id, "idInsumoItem": child_id, "coeficiente": 2.5,
        "insumoItem": child
      }]
    }))
    .unwrap()
  }

  async fn counts(s: &SqliteStore) -> Vec<u64> {
    let mut out = Vec::new();
    for kind in EntityKind::ALL {
      out.push(s.count(kind).await.unwrap());
    }
    out
  }

  #[tokio::test]
  async fn same_record_twice_is_idempotent() {
    let s = store().await;
    let engine = UpsertEngine::new(&s);
    let rec = composition(200, 5, insumo(100, 3, 6));

    engine.upsert_record(&rec, &rs()).await.unwrap();
    let after_first = counts(&s).await;
    let entry = s.get_entry(200).await.unwrap();
    let lines = s.composition_lines(200).await.unwrap();

    let second = engine.upsert_record(&rec, &rs()).await.unwrap();
    assert!(second.is_noop());
    assert_eq!(counts(&s).await, after_first);
    assert_eq!(s.get_entry(200).await.unwrap(), entry);
    assert_eq!(s.composition_lines(200).await.unwrap(), lines);
  }

  #[tokio::test]
  async fn missing_child_is_created_before_its_line() {
    let s = store().await;
    let engine = UpsertEngine::new(&s);

    engine
      .upsert_record(&composition(200, 5, insumo(100, 3, 6)), &rs())
      .await
      .unwrap();

    let child = s.get_entry(100).await.unwrap().expect("child entry");
    assert_eq!(child.unit_id, Some(6));
    let lines = s.composition_lines(200).await.unwrap();
    assert_eq!(lines.len(), 1);
    assert_eq!(lines[0].child_entry_id, 100);
    assert_eq!(lines[0].coefficient, Some(2.5));
  }

  #[tokio::test]
  async fn placeholder_class_is_synthesised() {
    let s = store().await;
    UpsertEngine::new(&s).upsert_record(&insumo(100, 3, 5), &rs()).await.unwrap();

    let class = s.get_class(999).await.unwrap().expect("placeholder class");
    assert_eq!(class.name.as_deref(), Some(UNCLASSIFIED));
  }

  #[tokio::test]
  async fn failing_record_is_isolated_in_a_batch() {
    let s = store().await;
    let engine = UpsertEngine::new(&s);

    // Record 2's child sits in a month-13 table, which the store rejects
    // after unit 77 and entry 2 were already merged in the same transaction.
    let batch = [insumo(1, 3, 5), composition(2, 77, insumo(50, 13, 78)), insumo(3, 3, 5)];
    let report = engine.upsert_records(&batch, &rs()).await.unwrap();

    assert_eq!(report.ok, 2);
    assert_eq!(report.failed, 1);
    assert!(s.get_entry(1).await.unwrap().is_some());
    assert!(s.get_entry(2).await.unwrap().is_none());
    assert!(s.get_entry(3).await.unwrap().is_some());
    assert!(s.get_entry(50).await.unwrap().is_none());
    assert_eq!(s.count(EntityKind::Unit).await.unwrap(), 1);
    assert_eq!(s.count(EntityKind::PricingTable).await.unwrap(), 1);
  }

  #[tokio::test]
  async fn constraint_violation_surfaces_as_record_failure() {
    let s = store().await;
    let err = UpsertEngine::new(&s)
      .upsert_record(&insumo(2, 13, 77), &rs())
      .await
      .unwrap_err();
    assert!(
      matches!(err, Error::Record(sinapi_core::Error::ConstraintViolation(_))),
      "{err:?}"
    );
  }

  #[tokio::test]
  async fn bare_unit_id_without_its_object_is_tolerated() {
    let s = store().await;
    let rec: CatalogRecord = serde_json::from_value(serde_json::json!({
      "id": 100, "idUnidade": 5, "idTabela": 10,
      "tabela": {"id": 10, "idEstado": 21, "mes": 3, "ano": 2024}
    }))
    .unwrap();

    UpsertEngine::new(&s).upsert_record(&rec, &rs()).await.unwrap();
    let entry = s.get_entry(100).await.unwrap().expect("entry stored");
    assert_eq!(entry.table_id, Some(10));
    assert_eq!(entry.unit_id, None);
  }

  /// Collects formatted log output.
  #[derive(Clone, Default)]
  struct Captured(Arc<Mutex<Vec<u8>>>);

  impl std::io::Write for Captured {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
      self.0.lock().unwrap().extend_from_slice(buf);
      Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> { Ok(()) }
  }

  impl<'a> MakeWriter<'a> for Captured {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer { self.clone() }
  }

  #[tokio::test]
  async fn each_record_is_logged_with_its_id_at_info() {
    let captured = Captured::default();
    let subscriber = tracing_subscriber::fmt()
      .with_max_level(tracing::Level::INFO)
      .with_ansi(false)
      .with_writer(captured.clone())
      .finish();
    let _guard = tracing::subscriber::set_default(subscriber);

    let s = store().await;
    let nameless: CatalogRecord = serde_json::from_str(r#"{"nome": "no id"}"#).unwrap();
    UpsertEngine::new(&s)
      .upsert_records(&[insumo(100, 3, 5), nameless], &rs())
      .await
      .unwrap();

    let logs = String::from_utf8(captured.0.lock().unwrap().clone()).unwrap();
    assert!(logs.contains("record upserted"), "{logs}");
    assert!(logs.contains("record_id=100"), "{logs}");
    assert!(logs.contains("record skipped"), "{logs}");
  }

  #[tokio::test]
  async fn malformed_record_is_counted_not_fatal() {
    let s = store().await;
    let nameless: CatalogRecord = serde_json::from_str(r#"{"nome": "no id"}"#).unwrap();
    let report = UpsertEngine::new(&s)
      .upsert_records(&[nameless, insumo(1, 3, 5)], &rs())
      .await
      .unwrap();
    assert_eq!((report.ok, report.failed), (1, 1));
  }
}
