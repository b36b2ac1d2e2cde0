use axum::{routing::get, Json, Router};
use utoipa::OpenApi;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Assembly Tracker API",
        version = "0.1.0",
        description = r#"
# Assembly Tracker

Tracks manufacturing work orders through multi-unit production.

- **Work orders** hold requested and completed quantities; completion only moves forward one unit at a time
- **Assembly** opens one unit at a time per work order, records scanned parts by sensor position and completes or rejects the unit
- **Completed assemblies** archive every finished unit with its component history
- **Rework** spawns linked single-unit work orders from archived units or completed orders

## Operator identity

Work order mutations read the acting operator from the `X-Operator-Id` header.
Assembly and archive mutations carry it in the request body.

## Errors

```json
{
  "error": "Conflict",
  "message": "Conflict: Sensor 5 already scanned on assembly 5YB-250314-0001",
  "request_id": "5f0c...",
  "timestamp": "2025-03-14T09:00:00Z"
}
```

`400` malformed input, `404` missing entity, `409` state-machine rule violated
(retry after re-reading state), `500` unexpected failure.
        "#,
    ),
    servers(
        (url = "http://localhost:8080", description = "Local development")
    ),
    tags(
        (name = "work-orders", description = "Work order ledger"),
        (name = "assembly", description = "Per-unit scan workflow and audit trail"),
        (name = "completed-assemblies", description = "Archive of finished units and rework spawning"),
        (name = "pcb-types", description = "Board family registry")
    ),
    paths(
        crate::handlers::work_orders::list_work_orders,
        crate::handlers::work_orders::create_work_order,
        crate::handlers::work_orders::list_by_pcb_type,
        crate::handlers::work_orders::get_work_order,
        crate::handlers::work_orders::update_work_order,
        crate::handlers::work_orders::delete_work_order,
        crate::handlers::work_orders::complete_unit,
        crate::handlers::work_orders::can_complete_unit,
        crate::handlers::work_orders::get_progress,
        crate::handlers::work_orders::get_lineage,
        crate::handlers::work_orders::get_active_unit,
        crate::handlers::work_orders::create_rework,

        crate::handlers::assembly::list_assemblies,
        crate::handlers::assembly::open_unit,
        crate::handlers::assembly::get_assembly,
        crate::handlers::assembly::scan_part,
        crate::handlers::assembly::update_sensor_index,
        crate::handlers::assembly::complete_assembly,
        crate::handlers::assembly::reject_assembly,
        crate::handlers::assembly::replace_part,
        crate::handlers::assembly::list_assembly_logs,

        crate::handlers::completed_assemblies::list_completed_assemblies,
        crate::handlers::completed_assemblies::get_assembly_details,
        crate::handlers::completed_assemblies::update_component_barcode,
        crate::handlers::completed_assemblies::create_rework_order,

        crate::handlers::pcb_types::list_pcb_types,
        crate::handlers::pcb_types::create_pcb_type,
        crate::handlers::pcb_types::initialize_pcb_types,
    ),
    components(
        schemas(
            crate::entities::manufacturing::ComponentRecord,
            crate::entities::work_order::WorkOrderStatus,
            crate::entities::work_order::WorkOrderPriority,
            crate::entities::assembly_process::AssemblyStatus,
            crate::services::work_orders::CreateWorkOrderInput,
            crate::services::work_orders::UpdateWorkOrderInput,
            crate::services::work_orders::WorkOrderProgress,
            crate::services::assembly::LatePart,
            crate::errors::ErrorResponse
        )
    )
)]
pub struct ApiDocV1;

/// Serves the generated document at `/api-docs/openapi.json`
pub fn openapi_routes<S>() -> Router<S>
where
    S: Clone + Send + Sync + 'static,
{
    Router::new().route(
        "/api-docs/openapi.json",
        get(|| async { Json(ApiDocV1::openapi()) }),
    )
}
