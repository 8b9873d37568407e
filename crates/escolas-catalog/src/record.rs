//! School records and CSV row parsing.
//!
//! Column names follow the portal's export headers verbatim (pt-BR,
//! accented). Serialized field names keep the shape the original public API
//! exposed, so downstream consumers see `codigoINEP`, `municipio`, etc.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchoolRecord {
    #[serde(rename = "codigoINEP")]
    pub codigo_inep: String,
    pub restricao_atendimento: Option<String>,
    pub nome: Option<String>,
    pub uf: Option<String>,
    pub municipio: Option<String>,
    pub localizacao: Option<String>,
    pub localidade_diferenciada: Option<String>,
    pub categoria_administrativa: Option<String>,
    pub endereco: Option<String>,
    pub telefone: Option<String>,
    pub dependencia_administrativa: Option<String>,
    pub categoria_escola_privada: Option<String>,
    pub conveniada_poder_publico: Option<String>,
    pub regulamentacao: Option<String>,
    pub porte: Option<String>,
    pub etapas_modalidades: Option<String>,
    pub outras_ofertas: Option<String>,
    pub latitude: Option<String>,
    pub longitude: Option<String>,
}

/// Header-name → column-index lookup built once per file. Header cells are
/// matched after trimming because exports carry stray whitespace.
pub struct HeaderMap {
    indices: HashMap<String, usize>,
}

impl HeaderMap {
    pub fn new(headers: &csv::StringRecord) -> Self {
        let indices = headers
            .iter()
            .enumerate()
            .map(|(index, name)| (name.trim().to_string(), index))
            .collect();
        Self { indices }
    }

    fn field(&self, row: &csv::StringRecord, name: &str) -> Option<String> {
        let index = *self.indices.get(name)?;
        let value = row.get(index)?.trim();
        if value.is_empty() {
            None
        } else {
            Some(value.to_string())
        }
    }
}

/// Parse one export row. Rows without an INEP code are dropped — the code
/// is the cache key.
pub fn parse_school_row(headers: &HeaderMap, row: &csv::StringRecord) -> Option<SchoolRecord> {
    let codigo_inep = headers.field(row, "Código INEP")?;
    Some(SchoolRecord {
        codigo_inep,
        restricao_atendimento: headers.field(row, "Restrição de Atendimento"),
        nome: headers.field(row, "Escola"),
        uf: headers.field(row, "UF"),
        municipio: headers.field(row, "Município"),
        localizacao: headers.field(row, "Localização"),
        localidade_diferenciada: headers.field(row, "Localidade Diferenciada"),
        categoria_administrativa: headers.field(row, "Categoria Administrativa"),
        endereco: headers.field(row, "Endereço"),
        telefone: headers.field(row, "Telefone"),
        dependencia_administrativa: headers.field(row, "Dependência Administrativa"),
        categoria_escola_privada: headers.field(row, "Categoria Escola Privada"),
        conveniada_poder_publico: headers.field(row, "Conveniada Poder Público"),
        regulamentacao: headers.field(row, "Regulamentação pelo Conselho de Educação"),
        porte: headers.field(row, "Porte da Escola"),
        etapas_modalidades: headers.field(row, "Etapas e Modalidade de Ensino Oferecidas"),
        outras_ofertas: headers.field(row, "Outras Ofertas Educacionais"),
        latitude: headers.field(row, "Latitude"),
        longitude: headers.field(row, "Longitude"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(values: &[&str]) -> csv::StringRecord {
        csv::StringRecord::from(values.to_vec())
    }

    #[test]
    fn parses_a_row_by_header_name() {
        let headers = HeaderMap::new(&record(&["Código INEP", "Escola", "UF", "Município"]));
        let row = record(&["12345678", "EMEF Paulo Freire", "SP", "Campinas"]);

        let school = parse_school_row(&headers, &row).unwrap();
        assert_eq!(school.codigo_inep, "12345678");
        assert_eq!(school.nome.as_deref(), Some("EMEF Paulo Freire"));
        assert_eq!(school.uf.as_deref(), Some("SP"));
        assert_eq!(school.municipio.as_deref(), Some("Campinas"));
        assert!(school.telefone.is_none());
    }

    #[test]
    fn trims_headers_and_values_and_maps_blanks_to_none() {
        let headers = HeaderMap::new(&record(&[" Código INEP ", " Escola ", "Telefone"]));
        let row = record(&[" 987 ", "  Colégio A  ", "   "]);

        let school = parse_school_row(&headers, &row).unwrap();
        assert_eq!(school.codigo_inep, "987");
        assert_eq!(school.nome.as_deref(), Some("Colégio A"));
        assert!(school.telefone.is_none());
    }

    #[test]
    fn rows_without_a_code_are_dropped() {
        let headers = HeaderMap::new(&record(&["Código INEP", "Escola"]));
        assert!(parse_school_row(&headers, &record(&["", "Sem código"])).is_none());
        assert!(parse_school_row(&headers, &record(&["   ", "Sem código"])).is_none());
    }

    #[test]
    fn serialized_field_names_keep_the_api_contract() {
        let headers = HeaderMap::new(&record(&["Código INEP", "Escola", "Dependência Administrativa"]));
        let row = record(&["1", "E", "Municipal"]);
        let school = parse_school_row(&headers, &row).unwrap();

        let json = serde_json::to_value(&school).unwrap();
        assert!(json.get("codigoINEP").is_some());
        assert!(json.get("dependenciaAdministrativa").is_some());
        assert!(json.get("codigo_inep").is_none());
    }
}
