// Leaf helpers
pub mod identifiers;
pub mod locks;

// Work order ledger and board registry
pub mod pcb_types;
pub mod work_orders;

// Per-unit scan workflow
pub mod assembly;

// Archive and rework
pub mod completed_assemblies;
pub mod rework;

use std::sync::Arc;

use sea_orm::DatabaseConnection;

use crate::{
    clock::SharedClock, config::AppConfig, errors::ServiceError, events::EventSender,
};

use self::locks::WorkOrderLocks;

/// Identifier and rework defaults shared by the manufacturing services
#[derive(Clone, Debug)]
pub struct ManufacturingSettings {
    pub default_serial_prefix: String,
    pub default_barcode_marker: String,
    pub allow_multi_unit_rework: bool,
}

impl Default for ManufacturingSettings {
    fn default() -> Self {
        Self {
            default_serial_prefix: "5YB".to_string(),
            default_barcode_marker: identifiers::GENERIC_BARCODE_MARKER.to_string(),
            allow_multi_unit_rework: false,
        }
    }
}

impl From<&AppConfig> for ManufacturingSettings {
    fn from(cfg: &AppConfig) -> Self {
        Self {
            default_serial_prefix: cfg.default_serial_prefix.clone(),
            default_barcode_marker: cfg.default_barcode_marker.clone(),
            allow_multi_unit_rework: cfg.allow_multi_unit_rework,
        }
    }
}

/// Dependencies every manufacturing service is built from
#[derive(Clone, Debug)]
pub struct ServiceContext {
    pub db: Arc<DatabaseConnection>,
    pub clock: SharedClock,
    pub locks: WorkOrderLocks,
    pub settings: Arc<ManufacturingSettings>,
    pub event_sender: Option<EventSender>,
}

impl ServiceContext {
    pub fn new(
        db: Arc<DatabaseConnection>,
        clock: SharedClock,
        settings: ManufacturingSettings,
        event_sender: Option<EventSender>,
    ) -> Self {
        Self {
            db,
            clock,
            locks: WorkOrderLocks::new(),
            settings: Arc::new(settings),
            event_sender,
        }
    }
}

/// All manufacturing services, sharing one lock registry
#[derive(Clone)]
pub struct ManufacturingServices {
    pub pcb_types: Arc<pcb_types::PcbTypeService>,
    pub work_orders: Arc<work_orders::WorkOrderService>,
    pub assembly: Arc<assembly::AssemblyService>,
    pub completed_assemblies: Arc<completed_assemblies::CompletedAssemblyService>,
    pub rework: Arc<rework::ReworkService>,
    pub locks: WorkOrderLocks,
}

impl ManufacturingServices {
    pub fn new(ctx: ServiceContext) -> Self {
        Self {
            locks: ctx.locks.clone(),
            pcb_types: Arc::new(pcb_types::PcbTypeService::new(ctx.clone())),
            work_orders: Arc::new(work_orders::WorkOrderService::new(ctx.clone())),
            assembly: Arc::new(assembly::AssemblyService::new(ctx.clone())),
            completed_assemblies: Arc::new(
                completed_assemblies::CompletedAssemblyService::new(ctx.clone()),
            ),
            rework: Arc::new(rework::ReworkService::new(ctx)),
        }
    }
}

/// Trims the acting operator's identity and rejects blanks.
pub(crate) fn require_operator(operator: &str) -> Result<String, ServiceError> {
    let trimmed = operator.trim();
    if trimmed.is_empty() {
        return Err(ServiceError::ValidationError(
            "operator identity is required".to_string(),
        ));
    }
    Ok(trimmed.to_string())
}

/// Maps an empty or whitespace-only optional string to `None`.
pub(crate) fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
