use axum::{
    extract::{Path, Query, State},
    response::Response,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use utoipa::IntoParams;
use uuid::Uuid;

use super::common::{
    created_response, no_content_response, Operator, PaginatedResponse, PaginationParams,
};
use crate::{
    entities::{assembly_process, work_order},
    errors::ServiceError,
    services::{
        rework::ReworkFromWorkOrderInput,
        work_orders::{
            CreateWorkOrderInput, UpdateWorkOrderInput, WorkOrderFilter, WorkOrderProgress,
        },
    },
    ApiResponse, ApiResult, AppState,
};

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct PcbTypeQuery {
    /// PCB type code, e.g. `YBS`
    pub code: String,
}

pub fn work_orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_work_orders).post(create_work_order))
        .route("/by-pcb-type", get(list_by_pcb_type))
        .route(
            "/:id",
            get(get_work_order)
                .put(update_work_order)
                .delete(delete_work_order),
        )
        .route("/:id/complete-unit", post(complete_unit))
        .route("/:id/can-complete", get(can_complete_unit))
        .route("/:id/progress", get(get_progress))
        .route("/:id/lineage", get(get_lineage))
        .route("/:id/active-unit", get(get_active_unit))
        .route("/:id/rework", post(create_rework))
}

#[utoipa::path(
    get,
    path = "/api/v1/work-orders",
    summary = "List work orders",
    params(WorkOrderFilter, PaginationParams),
    responses(
        (status = 200, description = "Work orders, newest first", body = ApiResponse<PaginatedResponse<work_order::Model>>),
        (status = 400, description = "Invalid filter", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn list_work_orders(
    State(state): State<AppState>,
    Query(filter): Query<WorkOrderFilter>,
    Query(pagination): Query<PaginationParams>,
) -> ApiResult<PaginatedResponse<work_order::Model>> {
    let page = pagination.page();
    let per_page = state.config.page_size(pagination.per_page);
    let (items, total) = state
        .services
        .work_orders
        .list_work_orders(filter, page, per_page)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, per_page,
    ))))
}

#[utoipa::path(
    post,
    path = "/api/v1/work-orders",
    summary = "Create work order",
    request_body = CreateWorkOrderInput,
    params(("X-Operator-Id" = String, Header, description = "Acting operator")),
    responses(
        (status = 201, description = "Work order created", body = ApiResponse<work_order::Model>),
        (status = 400, description = "Invalid work order", body = crate::errors::ErrorResponse),
        (status = 404, description = "Original work order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn create_work_order(
    State(state): State<AppState>,
    Operator(operator): Operator,
    Json(input): Json<CreateWorkOrderInput>,
) -> Result<Response, ServiceError> {
    let wo = state
        .services
        .work_orders
        .create_work_order(input, &operator)
        .await?;
    Ok(created_response(wo))
}

#[utoipa::path(
    get,
    path = "/api/v1/work-orders/by-pcb-type",
    summary = "List work orders of one PCB type",
    params(PcbTypeQuery),
    responses(
        (status = 200, description = "Matching work orders", body = ApiResponse<Vec<work_order::Model>>),
        (status = 404, description = "Unknown PCB type", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn list_by_pcb_type(
    State(state): State<AppState>,
    Query(query): Query<PcbTypeQuery>,
) -> ApiResult<Vec<work_order::Model>> {
    let orders = state
        .services
        .work_orders
        .list_by_pcb_type(&query.code)
        .await?;
    Ok(Json(ApiResponse::success(orders)))
}

#[utoipa::path(
    get,
    path = "/api/v1/work-orders/{id}",
    summary = "Get work order",
    params(("id" = Uuid, Path, description = "Work order id")),
    responses(
        (status = 200, description = "Work order", body = ApiResponse<work_order::Model>),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn get_work_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<work_order::Model> {
    let wo = state.services.work_orders.get_work_order(id).await?;
    Ok(Json(ApiResponse::success(wo)))
}

#[utoipa::path(
    put,
    path = "/api/v1/work-orders/{id}",
    summary = "Update work order",
    description = "Edits descriptive fields. Status accepts `Cancelled` or the status implied by progress.",
    request_body = UpdateWorkOrderInput,
    params(
        ("id" = Uuid, Path, description = "Work order id"),
        ("X-Operator-Id" = String, Header, description = "Acting operator"),
    ),
    responses(
        (status = 200, description = "Updated work order", body = ApiResponse<work_order::Model>),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Status change not allowed", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn update_work_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Operator(operator): Operator,
    Json(input): Json<UpdateWorkOrderInput>,
) -> ApiResult<work_order::Model> {
    let wo = state
        .services
        .work_orders
        .update_work_order(id, input, &operator)
        .await?;
    Ok(Json(ApiResponse::success(wo)))
}

#[utoipa::path(
    delete,
    path = "/api/v1/work-orders/{id}",
    summary = "Delete work order",
    params(
        ("id" = Uuid, Path, description = "Work order id"),
        ("X-Operator-Id" = String, Header, description = "Acting operator"),
    ),
    responses(
        (status = 204, description = "Work order deleted"),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Work order still referenced", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn delete_work_order(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Operator(operator): Operator,
) -> Result<Response, ServiceError> {
    state
        .services
        .work_orders
        .delete_work_order(id, &operator)
        .await?;
    Ok(no_content_response())
}

#[utoipa::path(
    post,
    path = "/api/v1/work-orders/{id}/complete-unit",
    summary = "Complete one unit against the ledger",
    params(
        ("id" = Uuid, Path, description = "Work order id"),
        ("X-Operator-Id" = String, Header, description = "Acting operator"),
    ),
    responses(
        (status = 200, description = "Progress after completion", body = ApiResponse<WorkOrderProgress>),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Nothing left to complete, or order cancelled", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn complete_unit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Operator(operator): Operator,
) -> ApiResult<WorkOrderProgress> {
    let progress = state
        .services
        .work_orders
        .complete_unit(id, &operator)
        .await?;
    Ok(Json(ApiResponse::success(progress)))
}

#[utoipa::path(
    get,
    path = "/api/v1/work-orders/{id}/can-complete",
    summary = "Whether another unit can be completed",
    params(("id" = Uuid, Path, description = "Work order id")),
    responses(
        (status = 200, description = "Flag", body = ApiResponse<bool>),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn can_complete_unit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<bool> {
    let allowed = state.services.work_orders.can_complete_unit(id).await?;
    Ok(Json(ApiResponse::success(allowed)))
}

#[utoipa::path(
    get,
    path = "/api/v1/work-orders/{id}/progress",
    summary = "Work order progress",
    params(("id" = Uuid, Path, description = "Work order id")),
    responses(
        (status = 200, description = "Progress counters", body = ApiResponse<WorkOrderProgress>),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn get_progress(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<WorkOrderProgress> {
    let progress = state.services.work_orders.progress(id).await?;
    Ok(Json(ApiResponse::success(progress)))
}

#[utoipa::path(
    get,
    path = "/api/v1/work-orders/{id}/lineage",
    summary = "Rework lineage",
    description = "The order followed by each order it was reworked from, root last.",
    params(("id" = Uuid, Path, description = "Work order id")),
    responses(
        (status = 200, description = "Lineage chain", body = ApiResponse<Vec<work_order::Model>>),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn get_lineage(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Vec<work_order::Model>> {
    let chain = state.services.work_orders.lineage(id).await?;
    Ok(Json(ApiResponse::success(chain)))
}

#[utoipa::path(
    get,
    path = "/api/v1/work-orders/{id}/active-unit",
    summary = "Unit currently being assembled",
    params(("id" = Uuid, Path, description = "Work order id")),
    responses(
        (status = 200, description = "Active unit, or null", body = ApiResponse<Option<assembly_process::Model>>),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn get_active_unit(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<Option<assembly_process::Model>> {
    let unit = state.services.assembly.active_unit(id).await?;
    Ok(Json(ApiResponse::success(unit)))
}

#[utoipa::path(
    post,
    path = "/api/v1/work-orders/{id}/rework",
    summary = "Create rework order from a completed work order",
    request_body = ReworkFromWorkOrderInput,
    params(("id" = Uuid, Path, description = "Completed work order id")),
    responses(
        (status = 201, description = "Rework order created", body = ApiResponse<work_order::Model>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Work order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Work order not completed", body = crate::errors::ErrorResponse),
    ),
    tag = "work-orders"
)]
pub async fn create_rework(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<ReworkFromWorkOrderInput>,
) -> Result<Response, ServiceError> {
    let wo = state
        .services
        .rework
        .create_rework_from_work_order(id, input)
        .await?;
    Ok(created_response(wo))
}
