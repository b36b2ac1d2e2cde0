use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post, put},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{created_response, PaginatedResponse, PaginationParams};
use crate::{
    entities::{assembly_log, assembly_process},
    errors::ServiceError,
    services::assembly::{
        AssemblyDetails, AssemblyFilter, CompleteAssemblyInput, CompletionOutcome, OpenUnitInput,
        RejectAssemblyInput, ReplacePartInput, ScanOutcome, ScanPartInput, UpdateSensorIndexInput,
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AssemblyLogQuery {
    /// Only entries of this assembly process
    pub assembly_id: Option<Uuid>,
}

pub fn assembly_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_assemblies).post(open_unit))
        .route("/:id", get(get_assembly))
        .route("/:id/scan", post(scan_part))
        .route("/:id/sensor-index", put(update_sensor_index))
        .route("/:id/complete", post(complete_assembly))
        .route("/:id/reject", post(reject_assembly))
        .route("/:id/parts/:part_id/replace", post(replace_part))
}

pub fn assembly_log_routes() -> Router<AppState> {
    Router::new().route("/", get(list_assembly_logs))
}

#[utoipa::path(
    get,
    path = "/api/v1/assembly",
    summary = "List assembly units",
    params(AssemblyFilter),
    responses(
        (status = 200, description = "Assembly units", body = ApiResponse<Vec<assembly_process::Model>>),
    ),
    tag = "assembly"
)]
pub async fn list_assemblies(
    State(state): State<AppState>,
    Query(filter): Query<AssemblyFilter>,
) -> ApiResult<Vec<assembly_process::Model>> {
    let units = state.services.assembly.list_assemblies(filter).await?;
    Ok(Json(ApiResponse::success(units)))
}

#[utoipa::path(
    post,
    path = "/api/v1/assembly",
    summary = "Open the next unit of a work order",
    request_body = OpenUnitInput,
    responses(
        (status = 201, description = "Unit opened", body = ApiResponse<assembly_process::Model>),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order cancelled, full, or a unit is already open", body = crate::errors::ErrorResponse),
    ),
    tag = "assembly"
)]
pub async fn open_unit(
    State(state): State<AppState>,
    Json(input): Json<OpenUnitInput>,
) -> Result<Response, ServiceError> {
    let unit = state
        .services
        .assembly
        .open_unit(input.work_order_id, &input.created_by)
        .await?;
    Ok(created_response(unit))
}

#[utoipa::path(
    get,
    path = "/api/v1/assembly/{id}",
    summary = "Get assembly unit with its parts",
    params(("id" = Uuid, Path, description = "Assembly process id")),
    responses(
        (status = 200, description = "Assembly unit", body = ApiResponse<AssemblyDetails>),
        (status = 404, description = "Assembly not found", body = crate::errors::ErrorResponse),
    ),
    tag = "assembly"
)]
pub async fn get_assembly(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<AssemblyDetails> {
    let details = state.services.assembly.get_assembly(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

#[utoipa::path(
    post,
    path = "/api/v1/assembly/{id}/scan",
    summary = "Scan a part onto a unit",
    request_body = ScanPartInput,
    params(("id" = Uuid, Path, description = "Assembly process id")),
    responses(
        (status = 201, description = "Part recorded", body = ApiResponse<ScanOutcome>),
        (status = 404, description = "Assembly not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit closed or sensor already filled", body = crate::errors::ErrorResponse),
    ),
    tag = "assembly"
)]
pub async fn scan_part(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ScanPartInput>,
) -> Result<Response, ServiceError> {
    let outcome = state.services.assembly.scan_part(id, input).await?;
    Ok(created_response(outcome))
}

#[utoipa::path(
    put,
    path = "/api/v1/assembly/{id}/sensor-index",
    summary = "Move the scan cursor",
    request_body = UpdateSensorIndexInput,
    params(("id" = Uuid, Path, description = "Assembly process id")),
    responses(
        (status = 200, description = "Updated unit", body = ApiResponse<assembly_process::Model>),
        (status = 409, description = "Unit closed", body = crate::errors::ErrorResponse),
    ),
    tag = "assembly"
)]
pub async fn update_sensor_index(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<UpdateSensorIndexInput>,
) -> ApiResult<assembly_process::Model> {
    let unit = state
        .services
        .assembly
        .update_sensor_index(id, input.index)
        .await?;
    Ok(Json(ApiResponse::success(unit)))
}

#[utoipa::path(
    post,
    path = "/api/v1/assembly/{id}/complete",
    summary = "Complete a unit",
    description = "Advances the work order, archives the unit and opens the next one while units remain.",
    request_body = CompleteAssemblyInput,
    params(("id" = Uuid, Path, description = "Assembly process id")),
    responses(
        (status = 200, description = "Completion outcome", body = ApiResponse<CompletionOutcome>),
        (status = 404, description = "Assembly not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit already closed", body = crate::errors::ErrorResponse),
    ),
    tag = "assembly"
)]
pub async fn complete_assembly(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<CompleteAssemblyInput>,
) -> ApiResult<CompletionOutcome> {
    let outcome = state.services.assembly.complete(id, input).await?;
    Ok(Json(ApiResponse::success(outcome)))
}

#[utoipa::path(
    post,
    path = "/api/v1/assembly/{id}/reject",
    summary = "Reject a unit",
    request_body = RejectAssemblyInput,
    params(("id" = Uuid, Path, description = "Assembly process id")),
    responses(
        (status = 200, description = "Rejected unit", body = ApiResponse<assembly_process::Model>),
        (status = 409, description = "Unit already closed", body = crate::errors::ErrorResponse),
    ),
    tag = "assembly"
)]
pub async fn reject_assembly(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<RejectAssemblyInput>,
) -> ApiResult<assembly_process::Model> {
    let unit = state.services.assembly.reject(id, input).await?;
    Ok(Json(ApiResponse::success(unit)))
}

#[utoipa::path(
    post,
    path = "/api/v1/assembly/{id}/parts/{part_id}/replace",
    summary = "Replace a scanned part",
    request_body = ReplacePartInput,
    params(
        ("id" = Uuid, Path, description = "Assembly process id"),
        ("part_id" = Uuid, Path, description = "Scanned part id"),
    ),
    responses(
        (status = 201, description = "Replacement recorded", body = ApiResponse<ScanOutcome>),
        (status = 404, description = "Assembly or part not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Unit closed or part already replaced", body = crate::errors::ErrorResponse),
    ),
    tag = "assembly"
)]
pub async fn replace_part(
    State(state): State<AppState>,
    Path((id, part_id)): Path<(Uuid, Uuid)>,
    Json(input): Json<ReplacePartInput>,
) -> Result<Response, ServiceError> {
    let outcome = state
        .services
        .assembly
        .replace_part(id, part_id, input)
        .await?;
    Ok(created_response(outcome))
}

#[utoipa::path(
    get,
    path = "/api/v1/assembly-logs",
    summary = "Assembly audit trail",
    params(AssemblyLogQuery, PaginationParams),
    responses(
        (status = 200, description = "Log entries, newest first", body = ApiResponse<PaginatedResponse<assembly_log::Model>>),
    ),
    tag = "assembly"
)]
pub async fn list_assembly_logs(
    State(state): State<AppState>,
    Query(query): Query<AssemblyLogQuery>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<assembly_log::Model>> {
    let page = pagination.page();
    let per_page = state.config.page_size(pagination.per_page);
    let (items, total) = state
        .services
        .assembly
        .get_assembly_logs(query.assembly_id, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, per_page,
    ))))
}
