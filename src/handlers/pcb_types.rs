use axum::{
    extract::{Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;

use super::common::created_response;
use crate::{
    entities::pcb_type,
    errors::ServiceError,
    services::pcb_types::CreatePcbTypeInput,
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PcbTypeListQuery {
    #[serde(default)]
    pub active_only: bool,
}

pub fn pcb_types_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_pcb_types).post(create_pcb_type))
        .route("/initialize", post(initialize_pcb_types))
}

#[utoipa::path(
    get,
    path = "/api/v1/pcb-types",
    summary = "List PCB types",
    params(PcbTypeListQuery),
    responses(
        (status = 200, description = "PCB types in resolution order", body = ApiResponse<Vec<pcb_type::Model>>),
    ),
    tag = "pcb-types"
)]
pub async fn list_pcb_types(
    State(state): State<AppState>,
    Query(query): Query<PcbTypeListQuery>,
) -> ApiResult<Vec<pcb_type::Model>> {
    let types = state.services.pcb_types.list(query.active_only).await?;
    Ok(Json(ApiResponse::success(types)))
}

#[utoipa::path(
    post,
    path = "/api/v1/pcb-types",
    summary = "Register a PCB type",
    request_body = CreatePcbTypeInput,
    responses(
        (status = 201, description = "PCB type created", body = ApiResponse<pcb_type::Model>),
        (status = 400, description = "Invalid PCB type", body = crate::errors::ErrorResponse),
        (status = 409, description = "Code already registered", body = crate::errors::ErrorResponse),
    ),
    tag = "pcb-types"
)]
pub async fn create_pcb_type(
    State(state): State<AppState>,
    Json(input): Json<CreatePcbTypeInput>,
) -> Result<Response, ServiceError> {
    let created = state.services.pcb_types.create(input).await?;
    Ok(created_response(created))
}

#[utoipa::path(
    post,
    path = "/api/v1/pcb-types/initialize",
    summary = "Seed the default PCB types",
    responses(
        (status = 200, description = "Codes created by this call", body = ApiResponse<Vec<String>>),
    ),
    tag = "pcb-types"
)]
pub async fn initialize_pcb_types(State(state): State<AppState>) -> ApiResult<Vec<String>> {
    let created = state.services.pcb_types.initialize_defaults().await?;
    Ok(Json(ApiResponse::success(created)))
}
