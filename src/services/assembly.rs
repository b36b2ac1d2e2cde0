use std::collections::HashMap;

use chrono::{DateTime, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ActiveValue::Set, ColumnTrait, ConnectionTrait,
    EntityTrait, PaginatorTrait, QueryFilter, QueryOrder, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;

use super::{
    completed_assemblies::{self, ArchiveEntry},
    identifiers, non_blank, require_operator,
    work_orders::{self, WorkOrderProgress},
    ManufacturingSettings, ServiceContext,
};
use crate::{
    entities::{
        assembly_log::{
            self, ACTION_COMPLETED, ACTION_CREATED, ACTION_PART_REPLACED, ACTION_PART_SCANNED,
            ACTION_REJECTED,
        },
        assembly_process::{self, AssemblyStatus, Entity as AssemblyEntity},
        completed_assembly,
        manufacturing::{ComponentList, ComponentRecord},
        pcb_type, scanned_part, work_order,
    },
    errors::ServiceError,
    events::{emit, Event},
};

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct OpenUnitInput {
    pub work_order_id: Uuid,
    pub created_by: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ScanPartInput {
    pub part_code: String,
    pub sensor_id: Option<i32>,
    pub operator: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct UpdateSensorIndexInput {
    pub index: i32,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ReplacePartInput {
    pub new_part_code: String,
    pub reason: String,
    pub operator: String,
}

/// Part scanned on the floor but only reported with the completion request.
#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct LatePart {
    pub part_code: String,
    pub sensor_id: Option<i32>,
    pub operator: Option<String>,
    pub scan_time: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, ToSchema)]
pub struct CompleteAssemblyInput {
    pub operator: String,
    pub notes: Option<String>,
    /// Unit barcode; generated when absent
    pub barcode: Option<String>,
    #[serde(default)]
    pub scanned_parts: Vec<LatePart>,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct RejectAssemblyInput {
    pub reason: String,
    pub operator: String,
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AssemblyFilter {
    pub work_order_id: Option<Uuid>,
    pub status: Option<AssemblyStatus>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AssemblyDetails {
    pub assembly: assembly_process::Model,
    pub parts: Vec<scanned_part::Model>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScanOutcome {
    pub assembly: assembly_process::Model,
    pub part: scanned_part::Model,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CompletionOutcome {
    pub assembly: assembly_process::Model,
    pub archive: completed_assembly::Model,
    pub progress: WorkOrderProgress,
    /// Unit opened for the next piece of work, while any remain
    pub next_unit: Option<assembly_process::Model>,
}

async fn find_assembly_in<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<assembly_process::Model, ServiceError> {
    AssemblyEntity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Assembly process {} not found", id)))
}

fn ensure_open(assembly: &assembly_process::Model) -> Result<(), ServiceError> {
    if assembly.is_terminal() {
        return Err(ServiceError::Conflict(format!(
            "Assembly {} is already {:?}",
            assembly.serial_number, assembly.status
        )));
    }
    Ok(())
}

fn ensure_not_cancelled(wo: &work_order::Model) -> Result<(), ServiceError> {
    if wo.is_cancelled() {
        return Err(ServiceError::Conflict(format!(
            "Work order {} is cancelled",
            wo.id
        )));
    }
    Ok(())
}

fn validate_sensor(sensor_id: Option<i32>) -> Result<(), ServiceError> {
    if matches!(sensor_id, Some(sensor) if sensor < 1) {
        return Err(ServiceError::ValidationError(
            "sensor_id must be positive".to_string(),
        ));
    }
    Ok(())
}

async fn live_parts_in<C: ConnectionTrait>(
    conn: &C,
    assembly_id: Uuid,
) -> Result<Vec<scanned_part::Model>, ServiceError> {
    scanned_part::Entity::find()
        .filter(scanned_part::Column::AssemblyProcessId.eq(assembly_id))
        .filter(scanned_part::Column::Replaced.eq(false))
        .order_by_asc(scanned_part::Column::ScanTime)
        .all(conn)
        .await
        .map_err(ServiceError::db_error)
}

async fn write_log_in<C: ConnectionTrait>(
    conn: &C,
    assembly_id: Uuid,
    action: &str,
    details: String,
    operator: &str,
    at: DateTime<Utc>,
) -> Result<(), ServiceError> {
    assembly_log::ActiveModel {
        id: Set(Uuid::new_v4()),
        assembly_process_id: Set(assembly_id),
        action: Set(action.to_string()),
        details: Set(details),
        operator: Set(operator.to_string()),
        timestamp: Set(at),
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;
    Ok(())
}

async fn insert_part_in<C: ConnectionTrait>(
    conn: &C,
    assembly_id: Uuid,
    part_code: &str,
    sensor_id: Option<i32>,
    operator: &str,
    at: DateTime<Utc>,
) -> Result<scanned_part::Model, ServiceError> {
    scanned_part::ActiveModel {
        id: Set(Uuid::new_v4()),
        assembly_process_id: Set(assembly_id),
        part_code: Set(part_code.to_string()),
        sensor_id: Set(sensor_id),
        operator: Set(operator.to_string()),
        scan_time: Set(at),
        replaced: Set(false),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

fn scan_details(part_code: &str, sensor_id: Option<i32>) -> String {
    match sensor_id {
        Some(sensor) => format!("Scanned {} at sensor {}", part_code, sensor),
        None => format!("Scanned {}", part_code),
    }
}

/// Opens the next unit of a work order.
///
/// Callers hold the work order's lock: the sequence number comes from a count of the
/// order's existing units.
pub(crate) async fn open_unit_in<C: ConnectionTrait>(
    conn: &C,
    wo: &work_order::Model,
    created_by: &str,
    now: DateTime<Utc>,
    settings: &ManufacturingSettings,
) -> Result<assembly_process::Model, ServiceError> {
    ensure_not_cancelled(wo)?;
    if !wo.can_complete_unit() {
        return Err(ServiceError::Conflict(format!(
            "Work order {} is fully completed",
            wo.id
        )));
    }

    let active = AssemblyEntity::find()
        .filter(assembly_process::Column::WorkOrderId.eq(wo.id))
        .filter(assembly_process::Column::Status.is_in(AssemblyStatus::active()))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;
    if active > 0 {
        return Err(ServiceError::Conflict(format!(
            "Work order {} already has a unit in progress",
            wo.id
        )));
    }

    let existing = AssemblyEntity::find()
        .filter(assembly_process::Column::WorkOrderId.eq(wo.id))
        .count(conn)
        .await
        .map_err(ServiceError::db_error)?;
    let sequence = u32::try_from(existing + 1).map_err(|_| {
        ServiceError::InternalError(format!("unit sequence overflow on work order {}", wo.id))
    })?;

    let prefix = match wo.pcb_type_id {
        Some(pcb_id) => pcb_type::Entity::find_by_id(pcb_id)
            .one(conn)
            .await
            .map_err(ServiceError::db_error)?
            .map(|t| t.prefix),
        None => None,
    }
    .unwrap_or_else(|| settings.default_serial_prefix.clone());
    let serial = identifiers::serial_number(&prefix, now.date_naive(), sequence);

    let assembly = assembly_process::ActiveModel {
        id: Set(Uuid::new_v4()),
        serial_number: Set(serial.clone()),
        work_order_id: Set(wo.id),
        sequence_number: Set(sequence as i32),
        status: Set(AssemblyStatus::Pending),
        quantity_completed: Set(0),
        current_sensor_index: Set(1),
        created_by: Set(created_by.to_string()),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)?;

    write_log_in(
        conn,
        assembly.id,
        ACTION_CREATED,
        format!(
            "Opened unit {} of {} with serial {}",
            sequence, wo.quantity, serial
        ),
        created_by,
        now,
    )
    .await?;

    Ok(assembly)
}

fn publish_opened(ctx: &ServiceContext, assembly: &assembly_process::Model) {
    counter!("manufacturing.assembly.opened", 1);
    emit(
        &ctx.event_sender,
        Event::AssemblyOpened {
            assembly_id: assembly.id,
            work_order_id: assembly.work_order_id,
            serial_number: assembly.serial_number.clone(),
        },
    );
}

/// Archive component list for the unit's live parts, carrying replacement history.
fn archive_components(
    live: &[scanned_part::Model],
    replaced: &[scanned_part::Model],
) -> ComponentList {
    let by_successor: HashMap<&str, &scanned_part::Model> = replaced
        .iter()
        .filter_map(|p| p.replaced_with.as_deref().map(|code| (code, p)))
        .collect();

    live.iter()
        .map(|part| {
            let mut record = part.to_component();
            if let Some(old) = by_successor.get(part.part_code.as_str()) {
                record.previous_barcode = Some(old.part_code.clone());
                record.replacement_reason = old.replace_reason.clone();
                record.replacement_time = old.replace_time;
                record.replaced_by = Some(part.operator.clone());
            }
            record
        })
        .collect::<Vec<ComponentRecord>>()
        .into()
}

#[derive(Clone)]
pub struct AssemblyService {
    ctx: ServiceContext,
}

impl AssemblyService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self))]
    pub async fn open_unit(
        &self,
        work_order_id: Uuid,
        created_by: &str,
    ) -> Result<assembly_process::Model, ServiceError> {
        let created_by = require_operator(created_by)?;
        let _guard = self.ctx.locks.acquire(work_order_id).await?;
        let now = self.ctx.clock.now();

        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        let wo = work_orders::find_work_order_in(&txn, work_order_id).await?;
        let assembly = open_unit_in(&txn, &wo, &created_by, now, &self.ctx.settings).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        publish_opened(&self.ctx, &assembly);
        info!(
            assembly_id = %assembly.id,
            serial = %assembly.serial_number,
            %work_order_id,
            "Assembly unit opened"
        );
        Ok(assembly)
    }

    /// Records a part on a unit, starting the unit on its first scan.
    #[instrument(skip(self, input), fields(part_code = %input.part_code, sensor_id = ?input.sensor_id))]
    pub async fn scan_part(
        &self,
        assembly_id: Uuid,
        input: ScanPartInput,
    ) -> Result<ScanOutcome, ServiceError> {
        let operator = require_operator(&input.operator)?;
        let part_code = input.part_code.trim().to_string();
        if part_code.is_empty() {
            return Err(ServiceError::ValidationError(
                "part_code is required".to_string(),
            ));
        }
        validate_sensor(input.sensor_id)?;

        let work_order_id = find_assembly_in(&*self.ctx.db, assembly_id)
            .await?
            .work_order_id;
        let _guard = self.ctx.locks.acquire(work_order_id).await?;
        let now = self.ctx.clock.now();

        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        let assembly = find_assembly_in(&txn, assembly_id).await?;
        ensure_open(&assembly)?;
        let wo = work_orders::find_work_order_in(&txn, work_order_id).await?;
        ensure_not_cancelled(&wo)?;

        if let Some(sensor) = input.sensor_id {
            let taken = scanned_part::Entity::find()
                .filter(scanned_part::Column::AssemblyProcessId.eq(assembly_id))
                .filter(scanned_part::Column::SensorId.eq(sensor))
                .filter(scanned_part::Column::Replaced.eq(false))
                .count(&txn)
                .await
                .map_err(ServiceError::db_error)?;
            if taken > 0 {
                return Err(ServiceError::Conflict(format!(
                    "Sensor {} already scanned on assembly {}",
                    sensor, assembly.serial_number
                )));
            }
        }

        let part =
            insert_part_in(&txn, assembly_id, &part_code, input.sensor_id, &operator, now).await?;

        let mut unit: assembly_process::ActiveModel = assembly.clone().into();
        if assembly.status == AssemblyStatus::Pending {
            unit.status = Set(AssemblyStatus::InProgress);
            unit.started_at = Set(Some(now));
        }
        unit.updated_at = Set(now);
        let assembly = unit.update(&txn).await.map_err(ServiceError::db_error)?;

        let mut components = wo.scanned_components.clone();
        components.push(part.to_component());
        let mut order: work_order::ActiveModel = wo.clone().into();
        if wo.assembly_start_time.is_none() {
            order.assembly_start_time = Set(Some(now));
        }
        order.scanned_components = Set(components);
        order.updated_at = Set(now);
        order.update(&txn).await.map_err(ServiceError::db_error)?;

        write_log_in(
            &txn,
            assembly_id,
            ACTION_PART_SCANNED,
            scan_details(&part_code, input.sensor_id),
            &operator,
            now,
        )
        .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("manufacturing.assembly.parts_scanned", 1);
        emit(
            &self.ctx.event_sender,
            Event::PartScanned {
                assembly_id,
                part_code,
                sensor_id: input.sensor_id,
            },
        );
        debug!(%assembly_id, "Part scanned");
        Ok(ScanOutcome { assembly, part })
    }

    /// Moves the operator-facing scan cursor of an open unit.
    #[instrument(skip(self))]
    pub async fn update_sensor_index(
        &self,
        assembly_id: Uuid,
        index: i32,
    ) -> Result<assembly_process::Model, ServiceError> {
        if index < 1 {
            return Err(ServiceError::ValidationError(
                "sensor index must be positive".to_string(),
            ));
        }
        let db = &*self.ctx.db;
        let assembly = find_assembly_in(db, assembly_id).await?;
        ensure_open(&assembly)?;

        let result = AssemblyEntity::update_many()
            .col_expr(
                assembly_process::Column::CurrentSensorIndex,
                Expr::value(index),
            )
            .col_expr(
                assembly_process::Column::UpdatedAt,
                Expr::value(self.ctx.clock.now()),
            )
            .filter(assembly_process::Column::Id.eq(assembly_id))
            .filter(assembly_process::Column::Status.is_in(AssemblyStatus::active()))
            .exec(db)
            .await
            .map_err(ServiceError::db_error)?;
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "Assembly {} closed before its sensor index could change",
                assembly.serial_number
            )));
        }

        find_assembly_in(db, assembly_id).await
    }

    /// Swaps a scanned part for a new one on the same sensor.
    #[instrument(skip(self, input), fields(new_part_code = %input.new_part_code))]
    pub async fn replace_part(
        &self,
        assembly_id: Uuid,
        part_id: Uuid,
        input: ReplacePartInput,
    ) -> Result<ScanOutcome, ServiceError> {
        let operator = require_operator(&input.operator)?;
        let new_code = input.new_part_code.trim().to_string();
        let reason = input.reason.trim().to_string();
        if new_code.is_empty() || reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "new_part_code and reason are required".to_string(),
            ));
        }

        let work_order_id = find_assembly_in(&*self.ctx.db, assembly_id)
            .await?
            .work_order_id;
        let _guard = self.ctx.locks.acquire(work_order_id).await?;
        let now = self.ctx.clock.now();

        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        let assembly = find_assembly_in(&txn, assembly_id).await?;
        ensure_open(&assembly)?;
        let wo = work_orders::find_work_order_in(&txn, work_order_id).await?;
        ensure_not_cancelled(&wo)?;

        let old = scanned_part::Entity::find_by_id(part_id)
            .filter(scanned_part::Column::AssemblyProcessId.eq(assembly_id))
            .one(&txn)
            .await
            .map_err(ServiceError::db_error)?
            .ok_or_else(|| {
                ServiceError::NotFound(format!(
                    "Part {} not found on assembly {}",
                    part_id, assembly.serial_number
                ))
            })?;
        if old.replaced {
            return Err(ServiceError::Conflict(format!(
                "Part {} was already replaced",
                old.part_code
            )));
        }

        let mut retired: scanned_part::ActiveModel = old.clone().into();
        retired.replaced = Set(true);
        retired.replaced_with = Set(Some(new_code.clone()));
        retired.replace_reason = Set(Some(reason.clone()));
        retired.replace_time = Set(Some(now));
        retired.update(&txn).await.map_err(ServiceError::db_error)?;

        let part = insert_part_in(&txn, assembly_id, &new_code, old.sensor_id, &operator, now).await?;

        let mut components = wo.scanned_components.clone();
        if components.replace_barcode(&old.part_code, &new_code, &reason, &operator, now) {
            let mut order: work_order::ActiveModel = wo.into();
            order.scanned_components = Set(components);
            order.updated_at = Set(now);
            order.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        let mut unit: assembly_process::ActiveModel = assembly.into();
        unit.updated_at = Set(now);
        let assembly = unit.update(&txn).await.map_err(ServiceError::db_error)?;

        write_log_in(
            &txn,
            assembly_id,
            ACTION_PART_REPLACED,
            format!("Replaced {} with {}: {}", old.part_code, new_code, reason),
            &operator,
            now,
        )
        .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        emit(
            &self.ctx.event_sender,
            Event::PartReplaced {
                assembly_id,
                old_part_code: old.part_code,
                new_part_code: new_code,
            },
        );
        Ok(ScanOutcome { assembly, part })
    }

    /// Finishes a unit: ledger increment, archive entry and next unit commit together.
    #[instrument(skip(self, input), fields(operator = %input.operator))]
    pub async fn complete(
        &self,
        assembly_id: Uuid,
        input: CompleteAssemblyInput,
    ) -> Result<CompletionOutcome, ServiceError> {
        let operator = require_operator(&input.operator)?;
        for late in &input.scanned_parts {
            validate_sensor(late.sensor_id)?;
        }
        let work_order_id = find_assembly_in(&*self.ctx.db, assembly_id)
            .await?
            .work_order_id;
        let _guard = self.ctx.locks.acquire(work_order_id).await?;
        let now = self.ctx.clock.now();
        let settings = &self.ctx.settings;

        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        let assembly = find_assembly_in(&txn, assembly_id).await?;
        ensure_open(&assembly)?;

        let mut live = live_parts_in(&txn, assembly_id).await?;
        for late in input.scanned_parts {
            let code = late.part_code.trim();
            if code.is_empty() {
                continue;
            }
            let duplicate = match late.sensor_id {
                Some(sensor) => live.iter().any(|p| p.sensor_id == Some(sensor)),
                None => live.iter().any(|p| p.part_code == code),
            };
            if duplicate {
                debug!(part_code = code, sensor_id = ?late.sensor_id, "skipping late part already on unit");
                continue;
            }
            let scanned_by = non_blank(late.operator).unwrap_or_else(|| operator.clone());
            let part = insert_part_in(
                &txn,
                assembly_id,
                code,
                late.sensor_id,
                &scanned_by,
                late.scan_time.unwrap_or(now),
            )
            .await?;
            write_log_in(
                &txn,
                assembly_id,
                ACTION_PART_SCANNED,
                scan_details(code, late.sensor_id),
                &scanned_by,
                now,
            )
            .await?;
            live.push(part);
        }

        let wo = work_orders::complete_unit_in(&txn, work_order_id, &operator, now).await?;

        let mut unit: assembly_process::ActiveModel = assembly.clone().into();
        unit.status = Set(AssemblyStatus::Completed);
        unit.completed_at = Set(Some(now));
        unit.quantity_completed = Set(1);
        if assembly.started_at.is_none() {
            unit.started_at = Set(Some(now));
        }
        if let Some(notes) = non_blank(input.notes) {
            unit.notes = Set(Some(notes));
        }
        unit.updated_at = Set(now);
        let assembly = unit.update(&txn).await.map_err(ServiceError::db_error)?;

        let replaced = scanned_part::Entity::find()
            .filter(scanned_part::Column::AssemblyProcessId.eq(assembly_id))
            .filter(scanned_part::Column::Replaced.eq(true))
            .all(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let archive = completed_assemblies::create_entry_in(
            &txn,
            ArchiveEntry {
                work_order: &wo,
                assembly: &assembly,
                components: archive_components(&live, &replaced),
                completed_by: &operator,
                barcode: input.barcode,
                completed_at: now,
            },
            settings,
        )
        .await?;

        let mut order: work_order::ActiveModel = wo.clone().into();
        order.scanned_components = Set(ComponentList::new());
        order.updated_at = Set(now);
        let wo = order.update(&txn).await.map_err(ServiceError::db_error)?;

        let next_unit = if wo.accepts_units() {
            Some(open_unit_in(&txn, &wo, &operator, now, settings).await?)
        } else {
            None
        };

        write_log_in(
            &txn,
            assembly_id,
            ACTION_COMPLETED,
            format!(
                "Completed unit {} ({}/{})",
                assembly.serial_number, wo.completed_quantity, wo.quantity
            ),
            &operator,
            now,
        )
        .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        work_orders::publish_unit_completed(&self.ctx, &wo);
        emit(
            &self.ctx.event_sender,
            Event::AssemblyCompleted {
                assembly_id,
                archive_id: archive.id,
                serial_number: assembly.serial_number.clone(),
                next_unit: next_unit.as_ref().map(|u| u.id),
            },
        );
        if let Some(next) = &next_unit {
            publish_opened(&self.ctx, next);
        }
        info!(
            %assembly_id,
            serial = %assembly.serial_number,
            completed = wo.completed_quantity,
            quantity = wo.quantity,
            "Assembly unit completed"
        );

        Ok(CompletionOutcome {
            assembly,
            archive,
            progress: WorkOrderProgress::from(&wo),
            next_unit,
        })
    }

    /// Closes a unit as defective. The ledger is left alone.
    #[instrument(skip(self, input), fields(operator = %input.operator))]
    pub async fn reject(
        &self,
        assembly_id: Uuid,
        input: RejectAssemblyInput,
    ) -> Result<assembly_process::Model, ServiceError> {
        let operator = require_operator(&input.operator)?;
        let reason = input.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "rejection reason is required".to_string(),
            ));
        }

        let work_order_id = find_assembly_in(&*self.ctx.db, assembly_id)
            .await?
            .work_order_id;
        let _guard = self.ctx.locks.acquire(work_order_id).await?;
        let now = self.ctx.clock.now();

        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        let assembly = find_assembly_in(&txn, assembly_id).await?;
        ensure_open(&assembly)?;

        let mut unit: assembly_process::ActiveModel = assembly.into();
        unit.status = Set(AssemblyStatus::Rejected);
        unit.rejection_reason = Set(Some(reason.clone()));
        unit.updated_at = Set(now);
        let assembly = unit.update(&txn).await.map_err(ServiceError::db_error)?;

        let wo = work_orders::find_work_order_in(&txn, work_order_id).await?;
        if !wo.scanned_components.is_empty() {
            let mut order: work_order::ActiveModel = wo.into();
            order.scanned_components = Set(ComponentList::new());
            order.updated_at = Set(now);
            order.update(&txn).await.map_err(ServiceError::db_error)?;
        }

        write_log_in(
            &txn,
            assembly_id,
            ACTION_REJECTED,
            format!("Rejected unit {}: {}", assembly.serial_number, reason),
            &operator,
            now,
        )
        .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        counter!("manufacturing.assembly.rejected", 1);
        emit(
            &self.ctx.event_sender,
            Event::AssemblyRejected {
                assembly_id,
                reason,
            },
        );
        info!(%assembly_id, serial = %assembly.serial_number, "Assembly unit rejected");
        Ok(assembly)
    }

    #[instrument(skip(self))]
    pub async fn get_assembly(&self, id: Uuid) -> Result<AssemblyDetails, ServiceError> {
        let db = &*self.ctx.db;
        let assembly = find_assembly_in(db, id).await?;
        let parts = scanned_part::Entity::find()
            .filter(scanned_part::Column::AssemblyProcessId.eq(id))
            .order_by_asc(scanned_part::Column::ScanTime)
            .all(db)
            .await
            .map_err(ServiceError::db_error)?;
        Ok(AssemblyDetails { assembly, parts })
    }

    #[instrument(skip(self))]
    pub async fn list_assemblies(
        &self,
        filter: AssemblyFilter,
    ) -> Result<Vec<assembly_process::Model>, ServiceError> {
        let mut query = AssemblyEntity::find();
        if let Some(work_order_id) = filter.work_order_id {
            query = query.filter(assembly_process::Column::WorkOrderId.eq(work_order_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(assembly_process::Column::Status.eq(status));
        }
        query
            .order_by_desc(assembly_process::Column::CreatedAt)
            .order_by_desc(assembly_process::Column::SequenceNumber)
            .all(&*self.ctx.db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// The work order's unit that is not yet completed or rejected, if any.
    #[instrument(skip(self))]
    pub async fn active_unit(
        &self,
        work_order_id: Uuid,
    ) -> Result<Option<assembly_process::Model>, ServiceError> {
        let db = &*self.ctx.db;
        work_orders::find_work_order_in(db, work_order_id).await?;
        AssemblyEntity::find()
            .filter(assembly_process::Column::WorkOrderId.eq(work_order_id))
            .filter(assembly_process::Column::Status.is_in(AssemblyStatus::active()))
            .order_by_desc(assembly_process::Column::SequenceNumber)
            .one(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Audit entries, newest first.
    #[instrument(skip(self))]
    pub async fn get_assembly_logs(
        &self,
        assembly_id: Option<Uuid>,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<assembly_log::Model>, u64), ServiceError> {
        let mut query = assembly_log::Entity::find();
        if let Some(assembly_id) = assembly_id {
            query = query.filter(assembly_log::Column::AssemblyProcessId.eq(assembly_id));
        }

        let paginator = query
            .order_by_desc(assembly_log::Column::Timestamp)
            .order_by_desc(assembly_log::Column::Id)
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
}
