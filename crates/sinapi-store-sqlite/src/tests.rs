//! Integration tests for `SqliteStore` against an in-memory database.

use sinapi_core::{
  checkpoint::SliceKey,
  entity::{
    CatalogEntry, Class, CompositionLine, CostBreakdown, Entity, EntityKind, Id, PricingTable,
    State, UNCLASSIFIED, Unit,
  },
  plan::{MergeOutcome, RecordPlan},
  store::{
    CatalogStore, Direction, EntryOrder, EntryQuery, IdRange, StoreError as _, TableQuery,
  },
};

use crate::{Error, SqliteStore};

async fn store() -> SqliteStore {
  SqliteStore::open_in_memory()
    .await
    .expect("in-memory store")
}

// ─── Fixtures ────────────────────────────────────────────────────────────────

fn rs() -> State {
  State {
    id:           21,
    name:         "Rio Grande do Sul".into(),
    abbreviation: "RS".into(),
    ibge_code:    43,
    deleted:      Some(false),
  }
}

fn table(id: Id, month: i64) -> PricingTable {
  PricingTable {
    id,
    name: Some(format!("SINAPI {month:02}/2024")),
    state_id: 21,
    month,
    year: 2024,
    updated_at: Some("2024-04-02T10:00:00".into()),
    table_type_id: Some(1),
    deleted: Some(false),
  }
}

fn unit(id: Id) -> Unit {
  Unit { id, name: Some("M2".into()), deleted: Some(false) }
}

fn entry(id: Id, table_id: Id, unit_id: Id, class_id: Option<Id>) -> CatalogEntry {
  CatalogEntry {
    id,
    name: Some(format!("entry {id}")),
    code: Some(format!("{id:05}")),
    table_id: Some(table_id),
    unit_id: Some(unit_id),
    class_id,
    value_burdened: Some(10.5),
    value_unburdened: Some(9.25),
    is_composition: false,
    breakdown: CostBreakdown::default(),
    deleted: Some(false),
  }
}

/// A plan for one insumo together with its table, unit and optional class.
fn insumo_plan(id: Id, t: PricingTable, u: Unit, class_id: Option<Id>) -> RecordPlan {
  let mut plan = RecordPlan::new(id);
  plan.push(Entity::State(rs()));
  let table_id = t.id;
  plan.push(Entity::PricingTable(t));
  let unit_id = u.id;
  plan.push(Entity::Unit(u));
  if let Some(class_id) = class_id {
    plan.push(Entity::PlaceholderClass(class_id));
  }
  plan.push(Entity::CatalogEntry(entry(id, table_id, unit_id, class_id)));
  plan
}

async fn counts(s: &SqliteStore) -> Vec<u64> {
  let mut out = Vec::new();
  for kind in EntityKind::ALL {
    out.push(s.count(kind).await.unwrap());
  }
  out
}

// ─── Merging ─────────────────────────────────────────────────────────────────

#[tokio::test]
async fn merge_inserts_then_updates_then_skips() {
  let s = store().await;

  let first = s.merge_entity(Entity::State(rs())).await.unwrap();
  assert_eq!(first, MergeOutcome::Inserted);

  let again = s.merge_entity(Entity::State(rs())).await.unwrap();
  assert_eq!(again, MergeOutcome::Unchanged);

  let renamed = State { name: "RS".into(), ..rs() };
  let updated = s.merge_entity(Entity::State(renamed)).await.unwrap();
  assert_eq!(updated, MergeOutcome::Updated);

  let fetched = s.get_state(21).await.unwrap().unwrap();
  assert_eq!(fetched.name, "RS");
  assert_eq!(s.count(EntityKind::State).await.unwrap(), 1);
}

#[tokio::test]
async fn applying_a_record_twice_changes_nothing() {
  let s = store().await;
  let plan = insumo_plan(100, table(10, 3), unit(5), Some(7));

  let first = s.apply_record(plan.clone()).await.unwrap();
  assert_eq!(first.inserted, plan.len());
  let before = counts(&s).await;
  let entry_before = s.get_entry(100).await.unwrap();

  let second = s.apply_record(plan.clone()).await.unwrap();
  assert!(second.is_noop());
  assert_eq!(second.unchanged, plan.len());
  assert_eq!(counts(&s).await, before);
  assert_eq!(s.get_entry(100).await.unwrap(), entry_before);
}

#[tokio::test]
async fn dangling_reference_is_dependency_not_found() {
  let s = store().await;

  // Class 7 was never merged and has no placeholder directive.
  let mut plan = RecordPlan::new(100);
  plan.push(Entity::State(rs()));
  plan.push(Entity::PricingTable(table(10, 3)));
  plan.push(Entity::Unit(unit(5)));
  plan.push(Entity::CatalogEntry(entry(100, 10, 5, Some(7))));

  let err = s.apply_record(plan).await.unwrap_err();
  assert!(
    matches!(
      err,
      Error::Core(sinapi_core::Error::DependencyNotFound { kind: EntityKind::Class, id: 7 })
    ),
    "{err:?}"
  );
  assert!(err.record_failure().is_some());

  // The state and table merged earlier in the plan were rolled back too.
  assert_eq!(s.count(EntityKind::State).await.unwrap(), 0);
  assert_eq!(s.count(EntityKind::PricingTable).await.unwrap(), 0);
}

#[tokio::test]
async fn unknown_table_and_unit_are_stored_as_null() {
  let s = store().await;
  s.merge_entity(Entity::State(rs())).await.unwrap();

  // Neither table 10 nor unit 5 exist.
  let mut plan = RecordPlan::new(100);
  plan.push(Entity::CatalogEntry(entry(100, 10, 5, None)));
  s.apply_record(plan.clone()).await.unwrap();

  let stored = s.get_entry(100).await.unwrap().unwrap();
  assert_eq!((stored.table_id, stored.unit_id), (None, None));
  assert!(s.apply_record(plan).await.unwrap().is_noop());

  // Once the unit shows up, the next merge links it.
  s.merge_entity(Entity::Unit(unit(5))).await.unwrap();
  let mut plan = RecordPlan::new(100);
  plan.push(Entity::CatalogEntry(entry(100, 10, 5, None)));
  let outcome = s.apply_record(plan).await.unwrap();
  assert_eq!(outcome.updated, 1);
  assert_eq!(s.get_entry(100).await.unwrap().unwrap().unit_id, Some(5));
}

#[tokio::test]
async fn table_without_state_is_rejected() {
  let s = store().await;
  let err = s.merge_entity(Entity::PricingTable(table(10, 3))).await.unwrap_err();
  assert!(matches!(
    err.record_failure(),
    Some(sinapi_core::Error::DependencyNotFound { kind: EntityKind::State, id: 21 })
  ));
}

// ─── Placeholder classes ─────────────────────────────────────────────────────

#[tokio::test]
async fn unknown_class_gets_a_placeholder() {
  let s = store().await;
  s.apply_record(insumo_plan(100, table(10, 3), unit(5), Some(999)))
    .await
    .unwrap();

  let class = s.get_class(999).await.unwrap().unwrap();
  assert_eq!(class.name.as_deref(), Some(UNCLASSIFIED));
  assert_eq!(s.get_entry(100).await.unwrap().unwrap().class_id, Some(999));
}

#[tokio::test]
async fn real_class_overwrites_placeholder() {
  let s = store().await;
  s.apply_record(insumo_plan(100, table(10, 3), unit(5), Some(999)))
    .await
    .unwrap();

  let real = Class { id: 999, name: Some("AÇO".into()), deleted: Some(false) };
  let outcome = s.merge_entity(Entity::Class(real.clone())).await.unwrap();
  assert_eq!(outcome, MergeOutcome::Updated);
  assert_eq!(s.get_class(999).await.unwrap(), Some(real.clone()));

  // A later placeholder directive leaves the real class alone.
  let again = s.merge_entity(Entity::PlaceholderClass(999)).await.unwrap();
  assert_eq!(again, MergeOutcome::Unchanged);
  assert_eq!(s.get_class(999).await.unwrap(), Some(real));
}

#[tokio::test]
async fn real_class_matching_placeholder_text_is_still_promoted() {
  let s = store().await;
  s.merge_entity(Entity::PlaceholderClass(3)).await.unwrap();

  // Same visible fields as the placeholder; only the marker differs.
  let outcome = s.merge_entity(Entity::Class(Class::placeholder(3))).await.unwrap();
  assert_eq!(outcome, MergeOutcome::Updated);

  let again = s.merge_entity(Entity::Class(Class::placeholder(3))).await.unwrap();
  assert_eq!(again, MergeOutcome::Unchanged);
}

// ─── Atomicity ───────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_record_leaves_its_neighbours_intact() {
  let s = store().await;

  let one = insumo_plan(1, table(10, 3), unit(5), None);
  // Month 13 trips the table's CHECK constraint after unit 77 was merged.
  let mut two = RecordPlan::new(2);
  two.push(Entity::State(rs()));
  two.push(Entity::Unit(unit(77)));
  two.push(Entity::PricingTable(table(11, 13)));
  two.push(Entity::CatalogEntry(entry(2, 11, 77, None)));
  let three = insumo_plan(3, table(10, 3), unit(5), None);

  s.apply_record(one).await.unwrap();
  let err = s.apply_record(two).await.unwrap_err();
  assert!(
    matches!(err.record_failure(), Some(sinapi_core::Error::ConstraintViolation(_))),
    "{err:?}"
  );
  s.apply_record(three).await.unwrap();

  assert!(s.get_entry(1).await.unwrap().is_some());
  assert!(s.get_entry(2).await.unwrap().is_none());
  assert!(s.get_entry(3).await.unwrap().is_some());
  assert_eq!(s.count(EntityKind::Unit).await.unwrap(), 1);
  assert_eq!(s.count(EntityKind::PricingTable).await.unwrap(), 1);
}

// ─── Compositions ────────────────────────────────────────────────────────────

#[tokio::test]
async fn composition_lines_link_parent_and_child() {
  let s = store().await;
  s.apply_record(insumo_plan(100, table(10, 3), unit(5), None))
    .await
    .unwrap();

  let parent = CatalogEntry { is_composition: true, ..entry(200, 10, 5, None) };
  let line = CompositionLine {
    id:               9000,
    parent_entry_id:  200,
    child_entry_id:   100,
    value_burdened:   Some(21.0),
    value_unburdened: Some(18.5),
    coefficient:      Some(2.0),
    deleted:          Some(false),
  };
  let mut plan = RecordPlan::new(200);
  plan.push(Entity::CatalogEntry(parent));
  plan.push(Entity::CompositionLine(line.clone()));
  s.apply_record(plan).await.unwrap();

  assert_eq!(s.composition_lines(200).await.unwrap(), vec![line]);
  assert!(s.composition_lines(100).await.unwrap().is_empty());
}

#[tokio::test]
async fn line_before_its_parent_is_rejected() {
  let s = store().await;
  s.apply_record(insumo_plan(100, table(10, 3), unit(5), None))
    .await
    .unwrap();

  let line = CompositionLine {
    id:               9000,
    parent_entry_id:  200,
    child_entry_id:   100,
    value_burdened:   None,
    value_unburdened: None,
    coefficient:      Some(1.0),
    deleted:          None,
  };
  let err = s.merge_entity(Entity::CompositionLine(line)).await.unwrap_err();
  assert!(matches!(
    err.record_failure(),
    Some(sinapi_core::Error::DependencyNotFound { kind: EntityKind::CatalogEntry, id: 200 })
  ));
}

// ─── Checkpoints ─────────────────────────────────────────────────────────────

fn slice(state_id: Id, composition: bool) -> SliceKey {
  SliceKey { state_id, year: 2024, month: 3, composition }
}

#[tokio::test]
async fn checkpoint_round_trip_and_overwrite() {
  let s = store().await;
  assert!(s.get_checkpoint(slice(21, false)).await.unwrap().is_none());

  s.save_checkpoint(slice(21, false), 4, false).await.unwrap();
  let cp = s.get_checkpoint(slice(21, false)).await.unwrap().unwrap();
  assert_eq!(cp.next_page, 4);
  assert!(!cp.completed);
  assert_eq!(cp.resume_page(), 4);

  s.save_checkpoint(slice(21, false), 9, true).await.unwrap();
  let cp = s.get_checkpoint(slice(21, false)).await.unwrap().unwrap();
  assert_eq!(cp.next_page, 9);
  assert!(cp.completed);

  // The composition slice of the same month is tracked separately.
  assert!(s.get_checkpoint(slice(21, true)).await.unwrap().is_none());
}

#[tokio::test]
async fn last_touched_follows_latest_checkpoint() {
  let s = store().await;
  assert_eq!(s.last_touched_state().await.unwrap(), None);

  s.save_checkpoint(slice(5, false), 2, false).await.unwrap();
  s.save_checkpoint(slice(12, false), 2, false).await.unwrap();
  assert_eq!(s.last_touched_state().await.unwrap(), Some(12));

  // Re-saving an older slice makes it the latest again.
  s.save_checkpoint(slice(5, false), 3, false).await.unwrap();
  assert_eq!(s.last_touched_state().await.unwrap(), Some(5));
}

#[tokio::test]
async fn unfinished_states_lists_incomplete_slices_only() {
  let s = store().await;
  s.save_checkpoint(slice(5, false), 2, true).await.unwrap();
  s.save_checkpoint(slice(12, false), 3, false).await.unwrap();
  s.save_checkpoint(slice(12, true), 1, false).await.unwrap();
  assert_eq!(s.unfinished_states().await.unwrap(), vec![12]);

  s.save_checkpoint(slice(12, false), 4, true).await.unwrap();
  s.save_checkpoint(slice(12, true), 2, true).await.unwrap();
  assert!(s.unfinished_states().await.unwrap().is_empty());
}

#[tokio::test]
async fn unfinished_year_keeps_its_state_unfinished() {
  let s = store().await;
  s.mark_state_year(21, 2024, false).await.unwrap();
  s.mark_state_year(24, 2024, true).await.unwrap();
  assert_eq!(s.unfinished_states().await.unwrap(), vec![21]);

  // A completed slice does not hide the unfinished year.
  s.save_checkpoint(slice(21, false), 2, true).await.unwrap();
  assert_eq!(s.unfinished_states().await.unwrap(), vec![21]);

  s.mark_state_year(21, 2024, true).await.unwrap();
  assert!(s.unfinished_states().await.unwrap().is_empty());
}

#[tokio::test]
async fn last_touched_falls_back_to_highest_state() {
  let s = store().await;
  s.merge_entity(Entity::State(rs())).await.unwrap();
  s.merge_entity(Entity::State(State {
    id:           3,
    name:         "Amapá".into(),
    abbreviation: "AP".into(),
    ibge_code:    16,
    deleted:      None,
  }))
  .await
  .unwrap();

  assert_eq!(s.last_touched_state().await.unwrap(), Some(21));
}

#[tokio::test]
async fn checkpoints_do_not_touch_catalog_tables() {
  let s = store().await;
  s.apply_record(insumo_plan(100, table(10, 3), unit(5), None))
    .await
    .unwrap();
  let before = counts(&s).await;
  s.save_checkpoint(slice(21, false), 2, true).await.unwrap();
  assert_eq!(counts(&s).await, before);
}

// ─── Gaps ────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn missing_ids_are_reported_per_table() {
  let s = store().await;
  for id in [100, 101, 104, 106] {
    s.apply_record(insumo_plan(id, table(10, 3), unit(5), None))
      .await
      .unwrap();
  }
  s.apply_record(insumo_plan(102, table(11, 4), unit(5), None))
    .await
    .unwrap();

  assert_eq!(
    s.missing_entry_ranges(10).await.unwrap(),
    vec![IdRange { first: 102, last: 103 }, IdRange { first: 105, last: 105 }]
  );
  assert!(s.missing_entry_ranges(11).await.unwrap().is_empty());
  assert!(s.missing_entry_ranges(404).await.unwrap().is_empty());
}

#[tokio::test]
async fn sparse_ids_are_reported_as_one_range() {
  let s = store().await;
  for id in [1, 15_000_000] {
    s.apply_record(insumo_plan(id, table(10, 3), unit(5), None))
      .await
      .unwrap();
  }

  let gaps = s.missing_entry_ranges(10).await.unwrap();
  assert_eq!(gaps, vec![IdRange { first: 2, last: 14_999_999 }]);
  assert_eq!(gaps[0].count(), 14_999_998);
}

// ─── Reads ───────────────────────────────────────────────────────────────────

#[tokio::test]
async fn list_tables_filters_by_slice() {
  let s = store().await;
  s.merge_entity(Entity::State(rs())).await.unwrap();
  s.merge_entity(Entity::PricingTable(table(10, 3))).await.unwrap();
  s.merge_entity(Entity::PricingTable(table(11, 4))).await.unwrap();

  let all = s.list_tables(&TableQuery::default()).await.unwrap();
  assert_eq!(all.len(), 2);

  let april = s
    .list_tables(&TableQuery { month: Some(4), ..TableQuery::default() })
    .await
    .unwrap();
  assert_eq!(april.iter().map(|t| t.id).collect::<Vec<_>>(), vec![11]);

  let elsewhere = s
    .list_tables(&TableQuery { state_id: Some(3), ..TableQuery::default() })
    .await
    .unwrap();
  assert!(elsewhere.is_empty());
}

#[tokio::test]
async fn list_entries_orders_and_pages() {
  let s = store().await;
  for (id, price) in [(1, 30.0), (2, 10.0), (3, 20.0)] {
    let mut plan = insumo_plan(id, table(10, 3), unit(5), None);
    if let Some(Entity::CatalogEntry(e)) = plan.ops.last_mut() {
      e.value_burdened = Some(price);
    }
    s.apply_record(plan).await.unwrap();
  }

  let query = EntryQuery {
    table_id: Some(10),
    order_by: EntryOrder::ValueBurdened,
    direction: Direction::Desc,
    ..EntryQuery::default()
  };
  let ids: Vec<Id> = s
    .list_entries(&query)
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.id)
    .collect();
  assert_eq!(ids, vec![1, 3, 2]);

  let paged = EntryQuery { limit: Some(1), offset: Some(1), ..query };
  let ids: Vec<Id> = s
    .list_entries(&paged)
    .await
    .unwrap()
    .into_iter()
    .map(|e| e.id)
    .collect();
  assert_eq!(ids, vec![3]);

  let compositions = EntryQuery { composition: Some(true), ..EntryQuery::default() };
  assert!(s.list_entries(&compositions).await.unwrap().is_empty());
}
