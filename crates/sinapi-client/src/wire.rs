//! Upstream JSON shapes.
//!
//! Field names follow the upstream camelCase Portuguese keys. Almost
//! everything is optional: upstream omits and nulls fields freely, and
//! deciding which absences are fatal is normalisation's job.

use serde::{Deserialize, Deserializer, Serialize};

/// Accept `null` wherever a list is expected.
fn null_as_empty<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
  D: Deserializer<'de>,
  T: Deserialize<'de>,
{
  Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

/// One page of a listing endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", bound(deserialize = "T: Deserialize<'de>"))]
pub struct Page<T> {
  #[serde(default = "Vec::new", deserialize_with = "null_as_empty")]
  pub items:      Vec<T>,
  #[serde(default)]
  pub total_rows: Option<i64>,
}

impl<T> Page<T> {
  pub fn new(items: Vec<T>) -> Self { Self { items, total_rows: None } }
}

/// `GET api/Estados` item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estado {
  pub id:       i64,
  pub nome:     String,
  pub uf:       String,
  pub ibge:     i64,
  #[serde(default)]
  pub excluido: Option<bool>,
}

/// `GET api/Tabelas/meses/select` item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonthOption {
  pub value: u32,
  #[serde(default)]
  pub text:  Option<String>,
}

/// Nested `tabela` object of a catalog record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Tabela {
  pub id:                    Option<i64>,
  pub nome:                  Option<String>,
  pub id_estado:             Option<i64>,
  pub mes:                   Option<i64>,
  pub ano:                   Option<i64>,
  pub data_hora_atualizacao: Option<String>,
  pub id_tipo_tabela:        Option<i64>,
  pub excluido:              Option<bool>,
}

/// Nested `unidade` or `classe` object.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Named {
  pub id:       Option<i64>,
  pub nome:     Option<String>,
  pub excluido: Option<bool>,
}

/// An insumo or composição as returned by `GET api/Insumos`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CatalogRecord {
  pub id:                            Option<i64>,
  pub nome:                          Option<String>,
  pub codigo:                        Option<String>,
  pub id_tabela:                     Option<i64>,
  pub id_unidade:                    Option<i64>,
  pub id_classe:                     Option<i64>,
  pub composicao:                    Option<bool>,
  pub percentual_mao_de_obra:        Option<f64>,
  pub percentual_material:           Option<f64>,
  pub percentual_equipamentos:       Option<f64>,
  pub percentual_servicos_terceiros: Option<f64>,
  pub percentual_outros:             Option<f64>,
  pub excluido:                      Option<bool>,
  pub valor_onerado:                 Option<f64>,
  pub valor_nao_onerado:             Option<f64>,
  pub tabela:                        Option<Tabela>,
  pub unidade:                       Option<Named>,
  pub classe:                        Option<Named>,
  /// Composition lines; empty for plain insumos.
  #[serde(deserialize_with = "null_as_empty")]
  pub insumos_composicoes:           Vec<CompositionItem>,
}

/// One entry of `insumosComposicoes`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompositionItem {
  pub id:                Option<i64>,
  /// The parent composition.
  pub id_insumo:         Option<i64>,
  /// The component.
  pub id_insumo_item:    Option<i64>,
  pub valor_onerado:     Option<f64>,
  pub valor_nao_onerado: Option<f64>,
  pub coeficiente:       Option<f64>,
  pub excluido:          Option<bool>,
  pub insumo_item:       Option<Box<CatalogRecord>>,
}
