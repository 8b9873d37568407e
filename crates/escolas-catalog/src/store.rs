//! In-memory record cache with lookup, search and pagination.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::record::{HeaderMap, SchoolRecord, parse_school_row};

const DEFAULT_MAX_RESULTS: usize = 1000;
const DEFAULT_PAGE_SIZE: usize = 100;

#[derive(Debug, Clone, Copy)]
pub struct QueryLimits {
    /// Cap on search results per request.
    pub max_results: usize,
    pub default_page_size: usize,
}

impl Default for QueryLimits {
    fn default() -> Self {
        Self {
            max_results: DEFAULT_MAX_RESULTS,
            default_page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchFilters {
    pub nome: Option<String>,
    pub municipio: Option<String>,
    pub uf: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct Pagination {
    pub total: usize,
    pub page: usize,
    pub limit: usize,
    #[serde(rename = "totalPages")]
    pub total_pages: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogPage {
    pub schools: Vec<SchoolRecord>,
    pub pagination: Pagination,
}

#[derive(Debug, Clone, Serialize)]
pub struct CatalogStats {
    #[serde(rename = "totalSchools")]
    pub total_schools: usize,
    #[serde(rename = "lastUpdate")]
    pub last_update: Option<DateTime<Utc>>,
    #[serde(rename = "currentFile")]
    pub current_file: Option<PathBuf>,
}

#[derive(Default)]
struct CatalogState {
    records: HashMap<String, SchoolRecord>,
    /// Insertion order of codes, for stable pagination.
    order: Vec<String>,
    last_update: Option<DateTime<Utc>>,
    source: Option<PathBuf>,
}

/// Thread-safe cache of the latest loaded export. A load replaces the
/// whole cache atomically.
pub struct CatalogStore {
    state: RwLock<CatalogState>,
    limits: QueryLimits,
}

impl Default for CatalogStore {
    fn default() -> Self {
        Self::new(QueryLimits::default())
    }
}

impl CatalogStore {
    pub fn new(limits: QueryLimits) -> Self {
        Self {
            state: RwLock::new(CatalogState::default()),
            limits,
        }
    }

    pub fn limits(&self) -> QueryLimits {
        self.limits
    }

    /// Parse `path` and swap it in as the active dataset. Returns the
    /// number of records loaded.
    pub fn load_from_file(&self, path: &Path) -> Result<usize> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .flexible(true)
            .from_path(path)
            .with_context(|| format!("opening catalog file {}", path.display()))?;
        let headers = HeaderMap::new(
            reader
                .headers()
                .with_context(|| format!("reading headers of {}", path.display()))?,
        );

        let mut records = HashMap::new();
        let mut order = Vec::new();
        for row in reader.records() {
            let row = row.with_context(|| format!("reading row of {}", path.display()))?;
            if let Some(school) = parse_school_row(&headers, &row) {
                let code = school.codigo_inep.clone();
                if records.insert(code.clone(), school).is_none() {
                    order.push(code);
                }
            }
        }

        let total = records.len();
        let mut state = self.state.write();
        state.records = records;
        state.order = order;
        state.last_update = Some(Utc::now());
        state.source = Some(path.to_path_buf());
        drop(state);

        info!(schools = total, file = %path.display(), "catalog loaded");
        Ok(total)
    }

    pub fn is_empty(&self) -> bool {
        self.state.read().records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.state.read().records.len()
    }

    pub fn find_by_code(&self, codigo_inep: &str) -> Option<SchoolRecord> {
        self.state.read().records.get(codigo_inep).cloned()
    }

    /// Substring search on name and municipality (case-insensitive), exact
    /// match on UF. Results are capped at the configured maximum.
    pub fn search(&self, filters: &SearchFilters) -> Vec<SchoolRecord> {
        let state = self.state.read();
        let nome = filters.nome.as_deref().map(str::to_lowercase);
        let municipio = filters.municipio.as_deref().map(str::to_lowercase);
        let uf = filters.uf.as_deref().map(str::to_uppercase);

        state
            .order
            .iter()
            .filter_map(|code| state.records.get(code))
            .filter(|school| {
                if let Some(nome) = &nome {
                    let hit = school
                        .nome
                        .as_deref()
                        .map(|v| v.to_lowercase().contains(nome))
                        .unwrap_or(false);
                    if !hit {
                        return false;
                    }
                }
                if let Some(municipio) = &municipio {
                    let hit = school
                        .municipio
                        .as_deref()
                        .map(|v| v.to_lowercase().contains(municipio))
                        .unwrap_or(false);
                    if !hit {
                        return false;
                    }
                }
                if let Some(uf) = &uf {
                    if school.uf.as_deref() != Some(uf.as_str()) {
                        return false;
                    }
                }
                true
            })
            .take(self.limits.max_results)
            .cloned()
            .collect()
    }

    /// 1-based pagination over insertion order.
    pub fn paginate(&self, page: usize, limit: usize) -> CatalogPage {
        let state = self.state.read();
        let page = page.max(1);
        let limit = limit.clamp(1, self.limits.max_results);
        let total = state.order.len();
        let offset = (page - 1).saturating_mul(limit);

        let schools = state
            .order
            .iter()
            .skip(offset)
            .take(limit)
            .filter_map(|code| state.records.get(code))
            .cloned()
            .collect();

        CatalogPage {
            schools,
            pagination: Pagination {
                total,
                page,
                limit,
                total_pages: total.div_ceil(limit),
            },
        }
    }

    pub fn stats(&self) -> CatalogStats {
        let state = self.state.read();
        CatalogStats {
            total_schools: state.records.len(),
            last_update: state.last_update,
            current_file: state.source.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn sample_csv(dir: &Path) -> PathBuf {
        let path = dir.join("catalog.csv");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(file, "Código INEP,Escola,UF,Município").unwrap();
        writeln!(file, "100,EMEF Anísio Teixeira,SP,Campinas").unwrap();
        writeln!(file, "200,EE Machado de Assis,RJ,Niterói").unwrap();
        writeln!(file, "300,Colégio Dom Pedro,SP,Santos").unwrap();
        writeln!(file, ",Linha sem código,MG,Uberaba").unwrap();
        path
    }

    #[test]
    fn load_replaces_the_cache_and_skips_codeless_rows() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::default();
        let loaded = store.load_from_file(&sample_csv(dir.path())).unwrap();

        assert_eq!(loaded, 3);
        assert_eq!(store.len(), 3);
        assert!(!store.is_empty());
        assert!(store.stats().last_update.is_some());
    }

    #[test]
    fn lookup_by_code() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::default();
        store.load_from_file(&sample_csv(dir.path())).unwrap();

        let school = store.find_by_code("200").unwrap();
        assert_eq!(school.nome.as_deref(), Some("EE Machado de Assis"));
        assert!(store.find_by_code("999").is_none());
    }

    #[test]
    fn search_combines_filters() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::default();
        store.load_from_file(&sample_csv(dir.path())).unwrap();

        let hits = store.search(&SearchFilters {
            uf: Some("sp".to_string()),
            ..SearchFilters::default()
        });
        assert_eq!(hits.len(), 2);

        let hits = store.search(&SearchFilters {
            nome: Some("machado".to_string()),
            ..SearchFilters::default()
        });
        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].codigo_inep, "200");

        let hits = store.search(&SearchFilters {
            nome: Some("colégio".to_string()),
            uf: Some("RJ".to_string()),
            ..SearchFilters::default()
        });
        assert!(hits.is_empty());
    }

    #[test]
    fn pagination_is_stable_and_1_based() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::default();
        store.load_from_file(&sample_csv(dir.path())).unwrap();

        let page = store.paginate(1, 2);
        assert_eq!(page.schools.len(), 2);
        assert_eq!(page.pagination.total, 3);
        assert_eq!(page.pagination.total_pages, 2);
        assert_eq!(page.schools[0].codigo_inep, "100");

        let page = store.paginate(2, 2);
        assert_eq!(page.schools.len(), 1);
        assert_eq!(page.schools[0].codigo_inep, "300");

        let page = store.paginate(9, 2);
        assert!(page.schools.is_empty());
    }

    #[test]
    fn reload_swaps_the_whole_dataset() {
        let dir = tempfile::tempdir().unwrap();
        let store = CatalogStore::default();
        store.load_from_file(&sample_csv(dir.path())).unwrap();

        let second = dir.path().join("catalog2.csv");
        std::fs::write(&second, "Código INEP,Escola\n900,Nova Escola\n").unwrap();
        store.load_from_file(&second).unwrap();

        assert_eq!(store.len(), 1);
        assert!(store.find_by_code("100").is_none());
        assert!(store.find_by_code("900").is_some());
    }
}
