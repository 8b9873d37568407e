//! Error responses in the service's original pt-BR contract.

use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiError {
    #[serde(skip)]
    pub status: StatusCode,
    pub erro: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mensagem: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detalhes: Option<String>,
    #[serde(rename = "codigoInep", skip_serializing_if = "Option::is_none")]
    pub codigo_inep: Option<String>,
}

impl ApiError {
    fn new(status: StatusCode, erro: impl Into<String>) -> Self {
        Self {
            status,
            erro: erro.into(),
            mensagem: None,
            detalhes: None,
            codigo_inep: None,
        }
    }

    pub fn not_found(erro: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, erro)
    }

    pub fn conflict(erro: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, erro)
    }

    pub fn internal(erro: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, erro)
    }

    /// The cache is empty: nothing to serve until a refresh runs.
    pub fn no_dataset() -> Self {
        Self::new(StatusCode::SERVICE_UNAVAILABLE, "Base de dados não carregada")
            .with_mensagem("Use POST /atualizar para carregar os dados")
    }

    pub fn with_mensagem(mut self, mensagem: impl Into<String>) -> Self {
        self.mensagem = Some(mensagem.into());
        self
    }

    pub fn with_detalhes(mut self, detalhes: impl Into<String>) -> Self {
        self.detalhes = Some(detalhes.into());
        self
    }

    pub fn with_codigo(mut self, codigo: impl Into<String>) -> Self {
        self.codigo_inep = Some(codigo.into());
        self
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self)).into_response()
    }
}
