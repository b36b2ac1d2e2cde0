use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use uuid::Uuid;

use super::common::{created_response, PaginatedResponse, PaginationParams};
use crate::{
    entities::completed_assembly,
    errors::ServiceError,
    services::{
        completed_assemblies::{ArchiveFilter, UpdateComponentBarcodeInput},
        rework::{ReworkFromArchiveInput, ReworkOutcome},
    },
    ApiResponse, ApiResult, AppState,
};

pub fn completed_assemblies_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_completed_assemblies))
        .route("/:id", get(get_assembly_details))
        .route("/:id/components/barcode", put(update_component_barcode))
        .route("/:id/rework", post(create_rework_order))
}

#[utoipa::path(
    get,
    path = "/api/v1/completed-assemblies",
    summary = "List archived units",
    params(ArchiveFilter, PaginationParams),
    responses(
        (status = 200, description = "Archived units, newest first", body = ApiResponse<PaginatedResponse<completed_assembly::Model>>),
        (status = 400, description = "Invalid date range", body = crate::errors::ErrorResponse),
    ),
    tag = "completed-assemblies"
)]
pub async fn list_completed_assemblies(
    State(state): State<AppState>,
    Query(filter): Query<ArchiveFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<completed_assembly::Model>> {
    let page = pagination.page();
    let per_page = state.config.page_size(pagination.per_page);
    let (items, total) = state
        .services
        .completed_assemblies
        .list(filter, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, per_page,
    ))))
}

#[utoipa::path(
    get,
    path = "/api/v1/completed-assemblies/{id}",
    summary = "Get archived unit",
    params(("id" = Uuid, Path, description = "Archive entry id")),
    responses(
        (status = 200, description = "Archived unit", body = ApiResponse<completed_assembly::Model>),
        (status = 404, description = "Archive entry not found", body = crate::errors::ErrorResponse),
    ),
    tag = "completed-assemblies"
)]
pub async fn get_assembly_details(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<completed_assembly::Model> {
    let entry = state.services.completed_assemblies.get_details(id).await?;
    Ok(Json(ApiResponse::success(entry)))
}

#[utoipa::path(
    put,
    path = "/api/v1/completed-assemblies/{id}/components/barcode",
    summary = "Correct a component barcode",
    request_body = UpdateComponentBarcodeInput,
    params(("id" = Uuid, Path, description = "Archive entry id")),
    responses(
        (status = 200, description = "Updated archive entry", body = ApiResponse<completed_assembly::Model>),
        (status = 400, description = "Invalid replacement", body = crate::errors::ErrorResponse),
        (status = 404, description = "Entry or component not found", body = crate::errors::ErrorResponse),
    ),
    tag = "completed-assemblies"
)]
pub async fn update_component_barcode(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateComponentBarcodeInput>,
) -> ApiResult<completed_assembly::Model> {
    let entry = state
        .services
        .completed_assemblies
        .update_component_barcode(id, input)
        .await?;
    Ok(Json(ApiResponse::success(entry)))
}

#[utoipa::path(
    post,
    path = "/api/v1/completed-assemblies/{id}/rework",
    summary = "Spawn a rework order from an archived unit",
    request_body = ReworkFromArchiveInput,
    params(("id" = String, Path, description = "Archive entry id")),
    responses(
        (status = 201, description = "Rework order created", body = ApiResponse<ReworkOutcome>),
        (status = 404, description = "Archive entry not found", body = crate::errors::ErrorResponse),
    ),
    tag = "completed-assemblies"
)]
pub async fn create_rework_order(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(input): Json<ReworkFromArchiveInput>,
) -> Result<Response, ServiceError> {
    let outcome = state
        .services
        .rework
        .create_rework_order(&id, input)
        .await?;
    Ok(created_response(outcome))
}
