//! School catalog endpoints, keeping the original service's routes and
//! JSON field names.

use std::collections::BTreeMap;

use axum::Json;
use axum::extract::{Path, Query, State};
use chrono::{DateTime, Utc};
use escolas_catalog::{CatalogPage, CatalogStats, RotationStats, SchoolRecord, SearchFilters};
use escolas_core::{API_VERSION, RefreshOutcome, SchedulerStatus};
use serde::{Deserialize, Serialize};
use tracing::error;

use crate::api::AppState;
use crate::api::response::ApiError;

const SERVICE_NAME: &str = "API INEP - Catálogo de Escolas";

#[derive(Serialize)]
pub struct DatasetSnapshot {
    #[serde(flatten)]
    stats: CatalogStats,
    files: RotationStats,
}

fn snapshot(state: &AppState) -> DatasetSnapshot {
    DatasetSnapshot {
        stats: state.catalog.stats(),
        files: state.rotation.stats(),
    }
}

#[derive(Serialize)]
pub struct ServiceInfo {
    nome: &'static str,
    versao: &'static str,
    endpoints: BTreeMap<&'static str, &'static str>,
    #[serde(flatten)]
    dataset: DatasetSnapshot,
}

// GET /
pub async fn service_info(State(state): State<AppState>) -> Json<ServiceInfo> {
    let endpoints = BTreeMap::from([
        ("GET /", "Informações da API"),
        ("GET /status", "Status do sistema"),
        ("POST /atualizar", "Baixa novo catálogo do INEP"),
        ("GET /escola/{codigo}", "Busca escola por código INEP"),
        ("GET /escolas", "Lista escolas com paginação"),
        ("GET /buscar", "Busca escolas por filtros"),
    ]);
    Json(ServiceInfo {
        nome: SERVICE_NAME,
        versao: API_VERSION,
        endpoints,
        dataset: snapshot(&state),
    })
}

#[derive(Serialize)]
pub struct StatusResponse {
    status: &'static str,
    #[serde(rename = "escolasCarregadas")]
    escolas_carregadas: usize,
    #[serde(rename = "ultimaAtualizacao")]
    ultima_atualizacao: Option<DateTime<Utc>>,
    arquivo: Option<std::path::PathBuf>,
    arquivos: RotationStats,
    scheduler: SchedulerStatus,
}

// GET /status
pub async fn system_status(State(state): State<AppState>) -> Json<StatusResponse> {
    let stats = state.catalog.stats();
    Json(StatusResponse {
        status: "online",
        escolas_carregadas: stats.total_schools,
        ultima_atualizacao: stats.last_update,
        arquivo: stats.current_file,
        arquivos: state.rotation.stats(),
        scheduler: state.scheduler_status(),
    })
}

#[derive(Serialize)]
pub struct AtualizarResponse {
    sucesso: bool,
    mensagem: &'static str,
    #[serde(rename = "totalEscolas")]
    total_escolas: usize,
    #[serde(rename = "dataAtualizacao")]
    data_atualizacao: DateTime<Utc>,
}

// POST /atualizar
pub async fn atualizar(
    State(state): State<AppState>,
) -> Result<Json<AtualizarResponse>, ApiError> {
    match state.refresh.run().await {
        Ok(RefreshOutcome::Completed { total_schools, .. }) => Ok(Json(AtualizarResponse {
            sucesso: true,
            mensagem: "Base de dados atualizada com sucesso",
            total_escolas: total_schools,
            data_atualizacao: Utc::now(),
        })),
        Ok(RefreshOutcome::Skipped) => Err(ApiError::conflict("Atualização já em andamento")
            .with_mensagem("Aguarde a execução atual terminar")),
        Err(error) => {
            error!(%error, "manual refresh failed");
            Err(ApiError::internal("Erro ao atualizar base de dados")
                .with_detalhes(error.to_string()))
        }
    }
}

#[derive(Serialize)]
pub struct EscolaResponse {
    escola: SchoolRecord,
}

// GET /escola/{codigo}
pub async fn escola_por_codigo(
    State(state): State<AppState>,
    Path(codigo): Path<String>,
) -> Result<Json<EscolaResponse>, ApiError> {
    if state.catalog.is_empty() {
        return Err(ApiError::no_dataset());
    }
    state
        .catalog
        .find_by_code(&codigo)
        .map(|escola| Json(EscolaResponse { escola }))
        .ok_or_else(|| ApiError::not_found("Escola não encontrada").with_codigo(codigo))
}

#[derive(Deserialize)]
pub struct PaginationParams {
    pagina: Option<usize>,
    limite: Option<usize>,
}

#[derive(Serialize)]
pub struct EscolasResponse {
    sucesso: bool,
    #[serde(flatten)]
    page: CatalogPage,
}

// GET /escolas
pub async fn listar_escolas(
    State(state): State<AppState>,
    Query(params): Query<PaginationParams>,
) -> Result<Json<EscolasResponse>, ApiError> {
    if state.catalog.is_empty() {
        return Err(ApiError::no_dataset());
    }
    let limit = params
        .limite
        .unwrap_or(state.catalog.limits().default_page_size);
    let page = state.catalog.paginate(params.pagina.unwrap_or(1), limit);
    Ok(Json(EscolasResponse {
        sucesso: true,
        page,
    }))
}

#[derive(Serialize)]
pub struct BuscarResponse {
    sucesso: bool,
    total: usize,
    filtros: SearchFilters,
    escolas: Vec<SchoolRecord>,
}

// GET /buscar
pub async fn buscar_escolas(
    State(state): State<AppState>,
    Query(filtros): Query<SearchFilters>,
) -> Result<Json<BuscarResponse>, ApiError> {
    if state.catalog.is_empty() {
        return Err(ApiError::no_dataset());
    }
    let escolas = state.catalog.search(&filtros);
    Ok(Json(BuscarResponse {
        sucesso: true,
        total: escolas.len(),
        filtros,
        escolas,
    }))
}

// Fallback for unknown routes.
pub async fn endpoint_nao_encontrado() -> ApiError {
    ApiError::not_found("Endpoint não encontrado")
        .with_mensagem("Consulte GET / para ver os endpoints disponíveis")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::router;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use escolas_core::{AppConfig, AppCore};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn test_state(dir: &std::path::Path, with_data: bool) -> AppState {
        if with_data {
            std::fs::write(
                dir.join("current.csv"),
                "Código INEP,Escola,UF,Município\n\
                 100,EMEF Anísio Teixeira,SP,Campinas\n\
                 200,EE Machado de Assis,RJ,Niterói\n",
            )
            .unwrap();
        }
        let config = AppConfig {
            data_dir: dir.to_path_buf(),
            daily_download: false,
            ..AppConfig::default()
        };
        Arc::new(AppCore::new(config).await.unwrap())
    }

    async fn get(state: AppState, uri: &str) -> (StatusCode, serde_json::Value) {
        let response = router(state)
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn service_info_lists_endpoints_and_stats() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), true).await;
        let (status, body) = get(state, "/").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["nome"], "API INEP - Catálogo de Escolas");
        assert_eq!(body["totalSchools"], 2);
        assert!(body["endpoints"].get("GET /status").is_some());
    }

    #[tokio::test]
    async fn status_reports_scheduler_and_files() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), true).await;
        let (status, body) = get(state, "/status").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "online");
        assert_eq!(body["escolasCarregadas"], 2);
        assert_eq!(body["scheduler"]["enabled"], false);
        assert_eq!(body["arquivos"]["current"]["exists"], true);
    }

    #[tokio::test]
    async fn lookup_hits_and_misses() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), true).await;

        let (status, body) = get(state.clone(), "/escola/100").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["escola"]["codigoINEP"], "100");

        let (status, body) = get(state, "/escola/999").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["erro"], "Escola não encontrada");
        assert_eq!(body["codigoInep"], "999");
    }

    #[tokio::test]
    async fn empty_cache_returns_service_unavailable() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), false).await;

        for uri in ["/escola/1", "/escolas", "/buscar?nome=x"] {
            let (status, body) = get(state.clone(), uri).await;
            assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE, "{uri}");
            assert_eq!(body["erro"], "Base de dados não carregada");
        }
    }

    #[tokio::test]
    async fn pagination_and_search() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), true).await;

        let (status, body) = get(state.clone(), "/escolas?pagina=1&limite=1").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["pagination"]["total"], 2);
        assert_eq!(body["pagination"]["totalPages"], 2);
        assert_eq!(body["schools"].as_array().unwrap().len(), 1);

        let (status, body) = get(state, "/buscar?uf=RJ").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["escolas"][0]["municipio"], "Niterói");
    }

    #[tokio::test]
    async fn unknown_routes_get_the_json_fallback() {
        let dir = tempfile::tempdir().unwrap();
        let state = test_state(dir.path(), true).await;
        let (status, body) = get(state, "/nada/por/aqui").await;

        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["erro"], "Endpoint não encontrado");
    }
}
