//! Upstream records → dependency-ordered [`RecordPlan`]s.
//!
//! Pure functions: nothing here touches the network or the store. A plan
//! lists the state first, then for every catalog entry its table, unit and
//! class (or a placeholder directive), the entry itself, and finally its
//! composition lines, each preceded by the child entry it points at.

use std::collections::HashSet;

use sinapi_client::wire::{CatalogRecord, CompositionItem, Estado, Named, Tabela};
use sinapi_core::{
  Error, Result,
  entity::{
    CatalogEntry, Class, CompositionLine, CostBreakdown, Entity, EntityKind, Id, PricingTable,
    State, Unit,
  },
  plan::RecordPlan,
};

pub fn state_from_wire(estado: &Estado) -> State {
  State {
    id:           estado.id,
    name:         estado.nome.clone(),
    abbreviation: estado.uf.clone(),
    ibge_code:    estado.ibge,
    deleted:      estado.excluido,
  }
}

/// Build the plan for one top-level record fetched while enumerating `state`.
pub fn normalize_record(record: &CatalogRecord, state: &State) -> Result<RecordPlan> {
  let root_id = record.id.ok_or(Error::MissingRequiredField { record_id: None, field: "id" })?;

  let mut builder = PlanBuilder {
    plan:         RecordPlan::new(root_id),
    state,
    seen:         HashSet::new(),
    placeholders: HashSet::new(),
  };
  builder.push(Entity::State(state.clone()));
  builder.entry(record, root_id)?;
  Ok(builder.plan)
}

struct PlanBuilder<'a> {
  plan:         RecordPlan,
  state:        &'a State,
  /// Real entities already in the plan.
  seen:         HashSet<(EntityKind, Id)>,
  /// Class ids already covered by a placeholder directive.
  placeholders: HashSet<Id>,
}

impl PlanBuilder<'_> {
  /// Push `entity` unless the plan already creates it.
  fn push(&mut self, entity: Entity) {
    match &entity {
      Entity::PlaceholderClass(id) => {
        if self.seen.contains(&(EntityKind::Class, *id)) || !self.placeholders.insert(*id) {
          return;
        }
      }
      other => {
        if !self.seen.insert((other.kind(), other.id())) {
          return;
        }
      }
    }
    self.plan.push(entity);
  }

  fn missing(&self, field: &'static str) -> Error {
    Error::MissingRequiredField { record_id: Some(self.plan.root_id), field }
  }

  /// Emit `record` and everything it depends on. `id` is the record's id,
  /// already resolved by the caller.
  fn entry(&mut self, record: &CatalogRecord, id: Id) -> Result<()> {
    if self.seen.contains(&(EntityKind::CatalogEntry, id)) {
      return Ok(());
    }

    let table_id = record.id_tabela.or(record.tabela.as_ref().and_then(|t| t.id));
    if let Some(tabela) = &record.tabela
      && let Some(table) = self.table(tabela)?
    {
      self.push(Entity::PricingTable(table));
    }

    let unit_id = record.id_unidade.or(record.unidade.as_ref().and_then(|u| u.id));
    if let Some(unit) = record.unidade.as_ref().and_then(unit_from_wire) {
      self.push(Entity::Unit(unit));
    }

    let class_id = record.id_classe.or(record.classe.as_ref().and_then(|c| c.id));
    match record.classe.as_ref().and_then(class_from_wire) {
      Some(class) if Some(class.id) == class_id => self.push(Entity::Class(class)),
      Some(class) => {
        // The embedded object disagrees with the foreign key; keep both
        // satisfiable.
        self.push(Entity::Class(class));
        if let Some(class_id) = class_id {
          self.push(Entity::PlaceholderClass(class_id));
        }
      }
      None => {
        if let Some(class_id) = class_id {
          self.push(Entity::PlaceholderClass(class_id));
        }
      }
    }

    self.push(Entity::CatalogEntry(CatalogEntry {
      id,
      name: record.nome.clone(),
      code: record.codigo.clone(),
      table_id,
      unit_id,
      class_id,
      value_burdened: record.valor_onerado,
      value_unburdened: record.valor_nao_onerado,
      is_composition: record.composicao.unwrap_or(!record.insumos_composicoes.is_empty()),
      breakdown: CostBreakdown {
        labor:                record.percentual_mao_de_obra,
        material:             record.percentual_material,
        equipment:            record.percentual_equipamentos,
        third_party_services: record.percentual_servicos_terceiros,
        other:                record.percentual_outros,
      },
      deleted: record.excluido,
    }));

    for item in &record.insumos_composicoes {
      self.line(item, id)?;
    }
    Ok(())
  }

  fn line(&mut self, item: &CompositionItem, parent_id: Id) -> Result<()> {
    let id = item.id.ok_or_else(|| self.missing("insumosComposicoes.id"))?;
    let child_id = item
      .id_insumo_item
      .or(item.insumo_item.as_ref().and_then(|c| c.id))
      .ok_or_else(|| self.missing("insumosComposicoes.idInsumoItem"))?;

    // Children get the same treatment as top-level records, so their own
    // table, unit and class land before the edge does.
    if let Some(child) = &item.insumo_item {
      self.entry(child, child_id)?;
    }

    self.push(Entity::CompositionLine(CompositionLine {
      id,
      parent_entry_id: item.id_insumo.unwrap_or(parent_id),
      child_entry_id: child_id,
      value_burdened: item.valor_onerado,
      value_unburdened: item.valor_nao_onerado,
      coefficient: item.coeficiente,
      deleted: item.excluido,
    }));
    Ok(())
  }

  /// A table object without an id is skipped; one with an id must carry its
  /// period.
  fn table(&self, tabela: &Tabela) -> Result<Option<PricingTable>> {
    let Some(id) = tabela.id else {
      return Ok(None);
    };
    Ok(Some(PricingTable {
      id,
      name: tabela.nome.clone(),
      state_id: tabela.id_estado.unwrap_or(self.state.id),
      month: tabela.mes.ok_or_else(|| self.missing("tabela.mes"))?,
      year: tabela.ano.ok_or_else(|| self.missing("tabela.ano"))?,
      updated_at: tabela.data_hora_atualizacao.clone(),
      table_type_id: tabela.id_tipo_tabela,
      deleted: tabela.excluido,
    }))
  }
}

fn unit_from_wire(named: &Named) -> Option<Unit> {
  Some(Unit { id: named.id?, name: named.nome.clone(), deleted: named.excluido })
}

fn class_from_wire(named: &Named) -> Option<Class> {
  Some(Class { id: named.id?, name: named.nome.clone(), deleted: named.excluido })
}

#[cfg(test)]
mod tests {
  use super::*;

  fn rs() -> State {
    State {
      id:           21,
      name:         "Rio Grande do Sul".into(),
      abbreviation: "RS".into(),
      ibge_code:    43,
      deleted:      None,
    }
  }

  fn record(json: &str) -> CatalogRecord { serde_json::from_str(json).unwrap() }

  fn kinds(plan: &RecordPlan) -> Vec<(EntityKind, Id)> {
    plan.ops.iter().map(|op| (op.kind(), op.id())).collect()
  }

  #[test]
  fn insumo_in_dependency_order() {
    let rec = record(
      r#"{
        "id": 100, "nome": "CIMENTO", "codigo": "00001",
        "idTabela": 10, "idUnidade": 5, "idClasse": 7,
        "composicao": false, "valorOnerado": 0.6,
        "tabela": {"id": 10, "idEstado": 21, "mes": 3, "ano": 2024},
        "unidade": {"id": 5, "nome": "KG"},
        "classe": {"id": 7, "nome": "MATERIAIS"}
      }"#,
    );
    let plan = normalize_record(&rec, &rs()).unwrap();
    assert_eq!(plan.root_id, 100);
    assert_eq!(
      kinds(&plan),
      vec![
        (EntityKind::State, 21),
        (EntityKind::PricingTable, 10),
        (EntityKind::Unit, 5),
        (EntityKind::Class, 7),
        (EntityKind::CatalogEntry, 100),
      ]
    );
    assert!(matches!(plan.ops[3], Entity::Class(_)));
  }

  #[test]
  fn forward_referenced_class_becomes_placeholder() {
    let rec = record(r#"{"id": 100, "idTabela": 10, "idUnidade": 5, "idClasse": 999}"#);
    let plan = normalize_record(&rec, &rs()).unwrap();
    assert_eq!(
      plan.ops,
      vec![
        Entity::State(rs()),
        Entity::PlaceholderClass(999),
        Entity::CatalogEntry(CatalogEntry {
          id:               100,
          name:             None,
          code:             None,
          table_id:         Some(10),
          unit_id:          Some(5),
          class_id:         Some(999),
          value_burdened:   None,
          value_unburdened: None,
          is_composition:   false,
          breakdown:        CostBreakdown::default(),
          deleted:          None,
        }),
      ]
    );
  }

  #[test]
  fn missing_root_id_is_rejected() {
    let err = normalize_record(&record(r#"{"nome": "sem id"}"#), &rs()).unwrap_err();
    assert_eq!(err, Error::MissingRequiredField { record_id: None, field: "id" });
  }

  #[test]
  fn table_without_period_is_rejected() {
    let rec = record(r#"{"id": 100, "tabela": {"id": 10, "ano": 2024}}"#);
    let err = normalize_record(&rec, &rs()).unwrap_err();
    assert_eq!(err, Error::MissingRequiredField { record_id: Some(100), field: "tabela.mes" });
  }

  #[test]
  fn composition_children_precede_their_lines() {
    let rec = record(
      r#"{
        "id": 200, "composicao": true, "idTabela": 10, "idUnidade": 5,
        "tabela": {"id": 10, "mes": 3, "ano": 2024},
        "unidade": {"id": 5, "nome": "M2"},
        "insumosComposicoes": [
          {"id": 9000, "idInsumo": 200, "idInsumoItem": 100, "coeficiente": 2.0,
           "insumoItem": {"id": 100, "idTabela": 10, "idUnidade": 6, "idClasse": 999,
                          "unidade": {"id": 6, "nome": "KG"},
                          "tabela": {"id": 10, "mes": 3, "ano": 2024}}},
          {"id": 9001, "idInsumo": 200, "idInsumoItem": 101, "coeficiente": 1.0}
        ]
      }"#,
    );
    let plan = normalize_record(&rec, &rs()).unwrap();
    assert_eq!(
      kinds(&plan),
      vec![
        (EntityKind::State, 21),
        (EntityKind::PricingTable, 10),
        (EntityKind::Unit, 5),
        (EntityKind::CatalogEntry, 200),
        (EntityKind::Unit, 6),
        (EntityKind::Class, 999),
        (EntityKind::CatalogEntry, 100),
        (EntityKind::CompositionLine, 9000),
        (EntityKind::CompositionLine, 9001),
      ]
    );

    // Every reference resolves to an earlier op, except the bare child 101
    // that the store must already hold.
    for (pos, op) in plan.ops.iter().enumerate() {
      for (kind, id) in op.references() {
        if (kind, id) == (EntityKind::CatalogEntry, 101) {
          continue;
        }
        let at = plan.position_of(kind, id).expect("referenced op");
        assert!(at < pos, "{kind} {id} must precede op {pos}");
      }
    }
  }

  #[test]
  fn line_without_child_id_is_rejected() {
    let rec = record(r#"{"id": 200, "insumosComposicoes": [{"id": 9000}]}"#);
    let err = normalize_record(&rec, &rs()).unwrap_err();
    assert_eq!(
      err,
      Error::MissingRequiredField {
        record_id: Some(200),
        field:     "insumosComposicoes.idInsumoItem",
      }
    );
  }
}
