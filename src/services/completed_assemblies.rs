use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition, ConnectionTrait, DbErr,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{identifiers, non_blank, require_operator, ManufacturingSettings, ServiceContext};
use crate::{
    entities::{
        assembly_process,
        completed_assembly::{self, Entity as CompletedAssemblyEntity},
        manufacturing::{ComponentList, ComponentRecord},
        pcb_type, work_order,
    },
    errors::ServiceError,
    events::{emit, Event},
};

const MAX_BARCODE_ATTEMPTS: usize = 5;
const DEFAULT_ZONE: &str = "Assembly";

#[derive(Debug, Clone, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ArchiveFilter {
    /// Inclusive lower bound on `completed_at`
    pub from: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `completed_at`
    pub to: Option<DateTime<Utc>>,
    /// Matches serial, barcode, product or item code
    pub search: Option<String>,
    pub is_rework: Option<bool>,
}

#[derive(Debug, Clone, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateComponentBarcodeInput {
    #[validate(length(min = 1))]
    pub old_barcode: String,
    #[validate(length(min = 1, max = 128))]
    pub new_barcode: String,
    #[validate(length(min = 1, max = 500))]
    pub reason: String,
    pub operator: String,
}

pub(crate) async fn find_entry_in<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<completed_assembly::Model, ServiceError> {
    CompletedAssemblyEntity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Completed assembly {} not found", id)))
}

async fn barcode_taken<C: ConnectionTrait>(conn: &C, barcode: &str) -> Result<bool, ServiceError> {
    let hits = CompletedAssemblyEntity::find()
        .filter(completed_assembly::Column::BarcodeNumber.eq(barcode))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;
    Ok(hits > 0)
}

/// Generates a unit barcode, retrying a bounded number of times on collision.
async fn fresh_barcode<C: ConnectionTrait>(
    conn: &C,
    wo: &work_order::Model,
    settings: &ManufacturingSettings,
) -> Result<String, ServiceError> {
    let marker = match wo.pcb_type_id {
        Some(pcb_id) => pcb_type::Entity::find_by_id(pcb_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .and_then(|t| t.barcode_marker),
        None => None,
    }
    .unwrap_or_else(|| settings.default_barcode_marker.clone());

    let mut candidate = identifiers::barcode(&marker);
    for attempt in 1..MAX_BARCODE_ATTEMPTS {
        if !barcode_taken(conn, &candidate).await? {
            return Ok(candidate);
        }
        warn!(attempt, barcode = %candidate, "generated barcode already archived; retrying");
        candidate = identifiers::barcode(&marker);
    }
    if barcode_taken(conn, &candidate).await? {
        warn!(barcode = %candidate, "barcode still collides after retries; keeping it");
    }
    Ok(candidate)
}

/// Everything the archive needs from a finished unit.
pub(crate) struct ArchiveEntry<'a> {
    pub work_order: &'a work_order::Model,
    pub assembly: &'a assembly_process::Model,
    pub components: ComponentList,
    pub completed_by: &'a str,
    pub barcode: Option<String>,
    pub completed_at: DateTime<Utc>,
}

/// Writes the archive record for a completed unit.
///
/// Units of a rework order inherit the source entry's components as `previous_components`.
pub(crate) async fn create_entry_in<C: ConnectionTrait>(
    conn: &C,
    entry: ArchiveEntry<'_>,
    settings: &ManufacturingSettings,
) -> Result<completed_assembly::Model, ServiceError> {
    let wo = entry.work_order;

    let (original_assembly_id, previous_components) = match wo.source_assembly_id {
        Some(source_id) if wo.is_rework => {
            let previous = CompletedAssemblyEntity::find_by_id(source_id)
                .one(conn)
                .await
                .map_err(ServiceError::db_error)?
                .map(|source| source.scanned_components)
                .unwrap_or_default();
            (Some(source_id), previous)
        }
        _ => (None, ComponentList::new()),
    };

    let barcode = match non_blank(entry.barcode) {
        Some(barcode) => barcode,
        None => fresh_barcode(conn, wo, settings).await?,
    };

    completed_assembly::ActiveModel {
        id: Set(Uuid::new_v4()),
        work_order_ref: Set(wo.id.to_string()),
        assembly_process_id: Set(Some(entry.assembly.id)),
        product: Set(wo.product.clone()),
        item_code: Set(wo.item_code.clone()),
        serial_number: Set(entry.assembly.serial_number.clone()),
        barcode_number: Set(barcode),
        completed_at: Set(entry.completed_at),
        completed_by: Set(entry.completed_by.to_string()),
        zone: Set(wo
            .machine_no
            .clone()
            .unwrap_or_else(|| DEFAULT_ZONE.to_string())),
        is_rework: Set(wo.is_rework),
        reworked: Set(false),
        original_assembly_id: Set(original_assembly_id),
        scanned_components: Set(entry.components),
        reworked_components: Set(ComponentList::new()),
        previous_components: Set(previous_components),
        version: Set(0),
        created_at: Set(entry.completed_at),
        updated_at: Set(entry.completed_at),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

/// Flags an entry as reworked; the version check catches racing writers.
pub(crate) async fn mark_reworked_in<C: ConnectionTrait>(
    conn: &C,
    entry: &completed_assembly::Model,
    notes: Option<String>,
    operator: &str,
    components: Vec<ComponentRecord>,
    now: DateTime<Utc>,
) -> Result<completed_assembly::Model, ServiceError> {
    let mut reworked_components = entry.reworked_components.clone();
    reworked_components.extend(components);

    let mut model: completed_assembly::ActiveModel = entry.clone().into();
    model.reworked = Set(true);
    model.rework_notes = Set(notes);
    model.reworked_by = Set(Some(operator.to_string()));
    model.reworked_at = Set(Some(now));
    model.reworked_components = Set(reworked_components);

    update_versioned_in(conn, entry, model, now).await
}

/// Writes `model` only if the stored row still carries `entry.version`.
async fn update_versioned_in<C: ConnectionTrait>(
    conn: &C,
    entry: &completed_assembly::Model,
    mut model: completed_assembly::ActiveModel,
    now: DateTime<Utc>,
) -> Result<completed_assembly::Model, ServiceError> {
    model.version = Set(entry.version + 1);
    model.updated_at = Set(now);

    CompletedAssemblyEntity::update(model)
        .filter(completed_assembly::Column::Version.eq(entry.version))
        .exec(conn)
        .await
        .map_err(|err| match err {
            DbErr::RecordNotUpdated => ServiceError::ConcurrentModification(entry.id),
            other => ServiceError::db_error(other),
        })
}

#[derive(Clone)]
pub struct CompletedAssemblyService {
    ctx: ServiceContext,
}

impl CompletedAssemblyService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Newest first, with the total matching row count.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        filter: ArchiveFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<completed_assembly::Model>, u64), ServiceError> {
        if let (Some(from), Some(to)) = (filter.from, filter.to) {
            if from > to {
                return Err(ServiceError::ValidationError(
                    "'from' must not be after 'to'".to_string(),
                ));
            }
        }

        let mut query = CompletedAssemblyEntity::find();
        if let Some(from) = filter.from {
            query = query.filter(completed_assembly::Column::CompletedAt.gte(from));
        }
        if let Some(to) = filter.to {
            query = query.filter(completed_assembly::Column::CompletedAt.lte(to));
        }
        if let Some(is_rework) = filter.is_rework {
            query = query.filter(completed_assembly::Column::IsRework.eq(is_rework));
        }
        if let Some(search) = non_blank(filter.search) {
            query = query.filter(
                Condition::any()
                    .add(completed_assembly::Column::SerialNumber.contains(search.as_str()))
                    .add(completed_assembly::Column::BarcodeNumber.contains(search.as_str()))
                    .add(completed_assembly::Column::Product.contains(search.as_str()))
                    .add(completed_assembly::Column::ItemCode.contains(search.as_str())),
            );
        }

        let paginator = query
            .order_by_desc(completed_assembly::Column::CompletedAt)
            .order_by_desc(completed_assembly::Column::Id)
            .paginate(&*self.ctx.db, per_page.max(1));
        let total = paginator
            .num_items()
            .await
            .map_err(ServiceError::db_error)?;
        let items = paginator
            .fetch_page(page.saturating_sub(1))
            .await
            .map_err(ServiceError::db_error)?;

        Ok((items, total))
    }

    #[instrument(skip(self))]
    pub async fn get_details(&self, id: Uuid) -> Result<completed_assembly::Model, ServiceError> {
        find_entry_in(&*self.ctx.db, id).await
    }

    /// Corrects one component barcode in place, keeping the old value as `previous_barcode`.
    #[instrument(skip(self, input), fields(old = %input.old_barcode, new = %input.new_barcode))]
    pub async fn update_component_barcode(
        &self,
        archive_id: Uuid,
        input: UpdateComponentBarcodeInput,
    ) -> Result<completed_assembly::Model, ServiceError> {
        input.validate()?;
        let operator = require_operator(&input.operator)?;
        let old_barcode = input.old_barcode.trim();
        let new_barcode = input.new_barcode.trim();
        let reason = input.reason.trim();
        if new_barcode.is_empty() || reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "new barcode and reason are required".to_string(),
            ));
        }
        if new_barcode == old_barcode {
            return Err(ServiceError::ValidationError(
                "new barcode must differ from the old one".to_string(),
            ));
        }

        let now = self.ctx.clock.now();
        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        let entry = find_entry_in(&txn, archive_id).await?;

        let mut components = entry.scanned_components.clone();
        if !components.replace_barcode(old_barcode, new_barcode, reason, &operator, now) {
            return Err(ServiceError::NotFound(format!(
                "Component {} not found on completed assembly {}",
                old_barcode, archive_id
            )));
        }

        let mut model: completed_assembly::ActiveModel = entry.clone().into();
        model.scanned_components = Set(components);
        let updated = update_versioned_in(&txn, &entry, model, now).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("manufacturing.archive.barcode_updates", 1);
        emit(
            &self.ctx.event_sender,
            Event::ComponentBarcodeUpdated {
                archive_id,
                old_barcode: old_barcode.to_string(),
                new_barcode: new_barcode.to_string(),
            },
        );
        info!(%archive_id, %operator, "Component barcode updated");
        Ok(updated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use sea_orm::{ConnectOptions, Database, DatabaseConnection};
    use sea_orm_migration::MigratorTrait;

    use crate::migrator::Migrator;

    async fn archive_db() -> DatabaseConnection {
        let mut opts = ConnectOptions::new("sqlite::memory:");
        opts.max_connections(1).min_connections(1);
        let db = Database::connect(opts).await.unwrap();
        Migrator::up(&db, None).await.unwrap();
        db
    }

    async fn archived_unit(db: &DatabaseConnection, at: DateTime<Utc>) -> completed_assembly::Model {
        completed_assembly::ActiveModel {
            work_order_ref: Set(Uuid::new_v4().to_string()),
            product: Set("5YB011056 board".to_string()),
            item_code: Set("5YB011056".to_string()),
            serial_number: Set("5YB-250314-0001".to_string()),
            barcode_number: Set("250314240001".to_string()),
            completed_at: Set(at),
            completed_by: Set("op-1".to_string()),
            zone: Set(DEFAULT_ZONE.to_string()),
            is_rework: Set(false),
            created_at: Set(at),
            updated_at: Set(at),
            ..Default::default()
        }
        .insert(db)
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn stale_rework_mark_at_same_instant_is_rejected() {
        let db = archive_db().await;
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 8, 0, 0).unwrap();
        let entry = archived_unit(&db, at).await;
        assert_eq!(entry.version, 0);

        let notes = Some("cold joint".to_string());
        let first = mark_reworked_in(&db, &entry, notes, "op-1", vec![], at)
            .await
            .unwrap();
        assert_eq!(first.version, 1);
        assert_eq!(first.updated_at, entry.updated_at);

        let notes = Some("bent pin".to_string());
        let err = mark_reworked_in(&db, &entry, notes, "op-2", vec![], at)
            .await
            .unwrap_err();
        assert!(matches!(err, ServiceError::ConcurrentModification(id) if id == entry.id));

        let stored = find_entry_in(&db, entry.id).await.unwrap();
        assert_eq!(stored.rework_notes.as_deref(), Some("cold joint"));
        assert_eq!(stored.reworked_by.as_deref(), Some("op-1"));
    }

    #[tokio::test]
    async fn fresh_read_after_rework_mark_can_update_again() {
        let db = archive_db().await;
        let at = Utc.with_ymd_and_hms(2025, 3, 14, 8, 0, 0).unwrap();
        let entry = archived_unit(&db, at).await;

        let first = mark_reworked_in(&db, &entry, None, "op-1", vec![], at)
            .await
            .unwrap();
        let second = mark_reworked_in(&db, &first, None, "op-1", vec![], at)
            .await
            .unwrap();
        assert_eq!(second.version, 2);
    }
}
