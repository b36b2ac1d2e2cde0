use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait, EntityTrait,
    QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use validator::Validate;

use super::{identifiers, non_blank, ServiceContext};
use crate::{
    entities::pcb_type::{self, Entity as PcbTypeEntity},
    errors::ServiceError,
    events::{emit, Event},
};

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreatePcbTypeInput {
    #[validate(length(min = 1, max = 32))]
    pub code: String,
    #[validate(length(min = 1, max = 128))]
    pub name: String,
    pub description: Option<String>,
    #[validate(length(min = 1, max = 16))]
    pub prefix: String,
    pub barcode_marker: Option<String>,
    #[serde(default = "default_active")]
    pub active: bool,
}

fn default_active() -> bool {
    true
}

/// Board families seeded by [`PcbTypeService::initialize_defaults`]:
/// code, name, description, prefix, barcode marker.
const DEFAULT_TYPES: [(&str, &str, &str, &str, &str); 2] = [
    (
        "YBS",
        "Yamaha System Board",
        "YBS PCB assembly",
        "5YB",
        "23",
    ),
    (
        "RSM",
        "Roland Sound Module",
        "RSM PCB assembly",
        "5RS",
        "12",
    ),
];

/// Active types in resolution order: oldest first, ties broken by code.
pub(crate) async fn resolution_order<C: ConnectionTrait>(
    conn: &C,
) -> Result<Vec<pcb_type::Model>, ServiceError> {
    PcbTypeEntity::find()
        .filter(pcb_type::Column::Active.eq(true))
        .order_by_asc(pcb_type::Column::CreatedAt)
        .order_by_asc(pcb_type::Column::Code)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

pub(crate) async fn find_by_code<C: ConnectionTrait>(
    conn: &C,
    code: &str,
) -> Result<Option<pcb_type::Model>, ServiceError> {
    PcbTypeEntity::find()
        .filter(pcb_type::Column::Code.eq(code.trim().to_uppercase()))
        .one(conn)
        .await
        .map_err(ServiceError::db_error)
}

#[derive(Clone)]
pub struct PcbTypeService {
    ctx: ServiceContext,
}

impl PcbTypeService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self))]
    pub async fn list(&self, active_only: bool) -> Result<Vec<pcb_type::Model>, ServiceError> {
        let mut query = PcbTypeEntity::find();
        if active_only {
            query = query.filter(pcb_type::Column::Active.eq(true));
        }
        query
            .order_by_asc(pcb_type::Column::CreatedAt)
            .order_by_asc(pcb_type::Column::Code)
            .all(&*self.ctx.db)
            .await
            .map_err(ServiceError::db_error)
    }

    #[instrument(skip(self))]
    pub async fn get_by_code(&self, code: &str) -> Result<pcb_type::Model, ServiceError> {
        find_by_code(&*self.ctx.db, code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("PCB type {} not found", code)))
    }

    #[instrument(skip(self))]
    pub async fn create(&self, input: CreatePcbTypeInput) -> Result<pcb_type::Model, ServiceError> {
        input.validate()?;
        let marker = non_blank(input.barcode_marker.clone());
        if let Some(marker) = &marker {
            if !identifiers::is_valid_marker(marker) {
                return Err(ServiceError::ValidationError(format!(
                    "barcode marker '{}' must be exactly two digits",
                    marker
                )));
            }
        }

        let code = input.code.trim().to_uppercase();
        let prefix = input.prefix.trim().to_string();
        if code.is_empty() || prefix.is_empty() {
            return Err(ServiceError::ValidationError(
                "PCB type code and prefix are required".to_string(),
            ));
        }

        let db = &*self.ctx.db;
        if find_by_code(db, &code).await?.is_some() {
            return Err(ServiceError::Conflict(format!(
                "PCB type {} already exists",
                code
            )));
        }

        let now = self.ctx.clock.now();
        let model = pcb_type::ActiveModel {
            code: Set(code),
            name: Set(input.name.trim().to_string()),
            description: Set(non_blank(input.description)),
            prefix: Set(prefix),
            barcode_marker: Set(marker),
            active: Set(input.active),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(db)
        .await
        .map_err(ServiceError::db_error)?;

        info!(code = %model.code, prefix = %model.prefix, "PCB type created");
        Ok(model)
    }

    /// Seeds the standard board families that are not registered yet.
    ///
    /// Returns the codes created; a fully seeded registry yields an empty list.
    #[instrument(skip(self))]
    pub async fn initialize_defaults(&self) -> Result<Vec<String>, ServiceError> {
        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;

        let base = self.ctx.clock.now();
        let mut created = Vec::with_capacity(DEFAULT_TYPES.len());
        for (offset, (code, name, description, prefix, marker)) in
            DEFAULT_TYPES.iter().enumerate()
        {
            if find_by_code(&txn, code).await?.is_some() {
                continue;
            }
            // Stagger creation times so resolution order is stable.
            let at = base + chrono::Duration::milliseconds(offset as i64);
            pcb_type::ActiveModel {
                code: Set(code.to_string()),
                name: Set(name.to_string()),
                description: Set(Some(description.to_string())),
                prefix: Set(prefix.to_string()),
                barcode_marker: Set(Some(marker.to_string())),
                active: Set(true),
                created_at: Set(at),
                updated_at: Set(at),
                ..Default::default()
            }
            .insert(&txn)
            .await
            .map_err(ServiceError::db_error)?;
            created.push(code.to_string());
        }

        txn.commit().await.map_err(ServiceError::db_error)?;

        if created.is_empty() {
            info!("Default PCB types already registered");
            return Ok(created);
        }

        counter!("manufacturing.pcb_types.initialized", created.len() as u64);
        emit(
            &self.ctx.event_sender,
            Event::PcbTypesInitialized(created.clone()),
        );
        info!(?created, "Default PCB types initialized");
        Ok(created)
    }
}
