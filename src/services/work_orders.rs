use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use metrics::counter;
use sea_orm::{
    sea_query::Expr, ActiveEnum, ActiveModelTrait, ActiveValue::Set, ColumnTrait, Condition,
    ConnectionTrait, DbErr, EntityTrait, PaginatorTrait, QueryFilter, QueryOrder,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument, warn};
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use super::{
    identifiers, non_blank, pcb_types, require_operator, ManufacturingSettings, ServiceContext,
};
use crate::{
    entities::{
        assembly_process, completed_assembly,
        work_order::{self, Entity as WorkOrderEntity, WorkOrderPriority, WorkOrderStatus},
    },
    errors::ServiceError,
    events::{emit, Event},
};

/// Rework chains are shallow; anything deeper than this is treated as corrupt.
pub const MAX_LINEAGE_DEPTH: usize = 32;

#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct CreateWorkOrderInput {
    #[validate(length(min = 1, max = 64))]
    pub item_code: String,
    #[validate(length(min = 1, max = 255))]
    pub product: String,
    #[validate(range(min = 1))]
    pub quantity: i32,
    /// Explicit board family; resolved from the item code prefix when absent
    pub pcb_type_code: Option<String>,
    pub description: Option<String>,
    pub machine_no: Option<String>,
    pub customer_name: Option<String>,
    pub target_date: Option<NaiveDate>,
    pub released_by: Option<String>,
    pub remarks: Option<String>,
    #[serde(default)]
    pub priority: WorkOrderPriority,
    #[serde(default)]
    pub is_rework: bool,
    pub original_work_order_id: Option<Uuid>,
    pub rework_notes: Option<String>,
}

/// Descriptive fields an operator may change after creation.
///
/// Quantity counters are absent on purpose: they only move through unit completion.
#[derive(Debug, Clone, Default, Deserialize, Serialize, Validate, ToSchema)]
pub struct UpdateWorkOrderInput {
    #[validate(length(min = 1, max = 255))]
    pub product: Option<String>,
    pub description: Option<String>,
    pub machine_no: Option<String>,
    pub customer_name: Option<String>,
    pub target_date: Option<NaiveDate>,
    pub released_by: Option<String>,
    pub remarks: Option<String>,
    pub priority: Option<WorkOrderPriority>,
    pub rework_notes: Option<String>,
    pub status: Option<WorkOrderStatus>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
pub struct WorkOrderProgress {
    pub work_order_id: Uuid,
    pub quantity: i32,
    pub completed_quantity: i32,
    pub remaining_quantity: i32,
    pub completion_percentage: f64,
    pub is_fully_completed: bool,
    pub status: WorkOrderStatus,
}

impl From<&work_order::Model> for WorkOrderProgress {
    fn from(wo: &work_order::Model) -> Self {
        Self {
            work_order_id: wo.id,
            quantity: wo.quantity,
            completed_quantity: wo.completed_quantity,
            remaining_quantity: wo.remaining_quantity(),
            completion_percentage: wo.completion_percentage(),
            is_fully_completed: wo.is_fully_completed(),
            status: wo.status,
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize, Serialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct WorkOrderFilter {
    pub status: Option<WorkOrderStatus>,
    /// PCB type code
    pub pcb_type: Option<String>,
    pub is_rework: Option<bool>,
    /// Matches item code, product, barcode or customer
    pub search: Option<String>,
}

pub(crate) async fn find_work_order_in<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
) -> Result<work_order::Model, ServiceError> {
    WorkOrderEntity::find_by_id(id)
        .one(conn)
        .await
        .map_err(ServiceError::db_error)?
        .ok_or_else(|| ServiceError::NotFound(format!("Work order {} not found", id)))
}

/// Inserts a work order after validating it and resolving its board family.
pub(crate) async fn insert_work_order_in<C: ConnectionTrait>(
    conn: &C,
    input: &CreateWorkOrderInput,
    source_assembly_id: Option<Uuid>,
    created_by: Option<String>,
    now: DateTime<Utc>,
    settings: &ManufacturingSettings,
) -> Result<work_order::Model, ServiceError> {
    input.validate()?;
    let item_code = input.item_code.trim().to_string();
    let product = input.product.trim().to_string();
    if item_code.is_empty() || product.is_empty() {
        return Err(ServiceError::ValidationError(
            "item_code and product are required".to_string(),
        ));
    }
    if input.is_rework && input.quantity != 1 && !settings.allow_multi_unit_rework {
        return Err(ServiceError::ValidationError(format!(
            "rework orders are single-unit; got quantity {}",
            input.quantity
        )));
    }

    let pcb_type = match non_blank(input.pcb_type_code.clone()) {
        Some(code) => Some(pcb_types::find_by_code(conn, &code).await?.ok_or_else(|| {
            ServiceError::ValidationError(format!("unknown PCB type {}", code))
        })?),
        None => {
            let types = pcb_types::resolution_order(conn).await?;
            identifiers::resolve_pcb_type(&item_code, &types).cloned()
        }
    };

    if let Some(original_id) = input.original_work_order_id {
        find_work_order_in(conn, original_id).await?;
    }

    let marker = pcb_type
        .as_ref()
        .and_then(|t| t.barcode_marker.clone())
        .unwrap_or_else(|| settings.default_barcode_marker.clone());

    work_order::ActiveModel {
        id: Set(Uuid::new_v4()),
        item_code: Set(item_code),
        product: Set(product),
        pcb_type_id: Set(pcb_type.map(|t| t.id)),
        description: Set(non_blank(input.description.clone())),
        quantity: Set(input.quantity),
        completed_quantity: Set(0),
        status: Set(WorkOrderStatus::Pending),
        priority: Set(input.priority),
        barcode: Set(Some(identifiers::barcode(&marker))),
        machine_no: Set(non_blank(input.machine_no.clone())),
        customer_name: Set(non_blank(input.customer_name.clone())),
        target_date: Set(input.target_date),
        released_by: Set(non_blank(input.released_by.clone())),
        remarks: Set(non_blank(input.remarks.clone())),
        is_rework: Set(input.is_rework),
        original_work_order_id: Set(input.original_work_order_id),
        source_assembly_id: Set(source_assembly_id),
        rework_notes: Set(non_blank(input.rework_notes.clone())),
        created_by: Set(created_by),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(conn)
    .await
    .map_err(ServiceError::db_error)
}

/// The single write path for `completed_quantity`.
///
/// The update only lands if the counter still holds the value read and the order is not
/// cancelled, so a writer that slipped in between surfaces as `ConcurrentModification`.
pub(crate) async fn complete_unit_in<C: ConnectionTrait>(
    conn: &C,
    id: Uuid,
    operator: &str,
    now: DateTime<Utc>,
) -> Result<work_order::Model, ServiceError> {
    let wo = find_work_order_in(conn, id).await?;
    if wo.is_cancelled() {
        return Err(ServiceError::Conflict(format!(
            "Work order {} is cancelled",
            id
        )));
    }
    if !wo.can_complete_unit() {
        return Err(ServiceError::Conflict(format!(
            "Work order {} has no units left to complete ({}/{})",
            id, wo.completed_quantity, wo.quantity
        )));
    }

    let completed = wo.completed_quantity + 1;
    let status = WorkOrderStatus::derive(wo.quantity, completed);

    let result = WorkOrderEntity::update_many()
        .col_expr(work_order::Column::CompletedQuantity, Expr::value(completed))
        .col_expr(work_order::Column::Status, Expr::value(status.to_value()))
        .col_expr(
            work_order::Column::CompletedBy,
            Expr::value(Some(operator.to_string())),
        )
        .col_expr(work_order::Column::CompletedAt, Expr::value(Some(now)))
        .col_expr(work_order::Column::UpdatedAt, Expr::value(now))
        .filter(work_order::Column::Id.eq(id))
        .filter(work_order::Column::CompletedQuantity.eq(wo.completed_quantity))
        .filter(work_order::Column::Status.ne(WorkOrderStatus::Cancelled))
        .exec(conn)
        .await
        .map_err(ServiceError::db_error)?;

    if result.rows_affected == 0 {
        warn!(work_order_id = %id, "work order changed between read and update");
        return Err(ServiceError::ConcurrentModification(id));
    }

    find_work_order_in(conn, id).await
}

/// Metrics and events for a committed unit completion.
pub(crate) fn publish_unit_completed(ctx: &ServiceContext, wo: &work_order::Model) {
    counter!("manufacturing.units.completed", 1);
    emit(
        &ctx.event_sender,
        Event::UnitCompleted {
            work_order_id: wo.id,
            completed_quantity: wo.completed_quantity,
            quantity: wo.quantity,
        },
    );
    if wo.is_fully_completed() {
        counter!("manufacturing.work_orders.completed", 1);
        emit(&ctx.event_sender, Event::WorkOrderCompleted(wo.id));
        info!(work_order_id = %wo.id, "Work order fully completed");
    }
}

pub(crate) fn publish_work_order_created(ctx: &ServiceContext, wo: &work_order::Model) {
    counter!("manufacturing.work_orders.created", 1);
    emit(
        &ctx.event_sender,
        Event::WorkOrderCreated {
            work_order_id: wo.id,
            item_code: wo.item_code.clone(),
            quantity: wo.quantity,
            is_rework: wo.is_rework,
        },
    );
}

fn not_updated(id: Uuid) -> impl FnOnce(DbErr) -> ServiceError {
    move |err| match err {
        DbErr::RecordNotUpdated => ServiceError::ConcurrentModification(id),
        other => ServiceError::db_error(other),
    }
}

#[derive(Clone)]
pub struct WorkOrderService {
    ctx: ServiceContext,
}

impl WorkOrderService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    #[instrument(skip(self, input), fields(item_code = %input.item_code, quantity = input.quantity))]
    pub async fn create_work_order(
        &self,
        input: CreateWorkOrderInput,
        operator: &str,
    ) -> Result<work_order::Model, ServiceError> {
        let operator = require_operator(operator)?;
        let now = self.ctx.clock.now();

        let wo = insert_work_order_in(
            &*self.ctx.db,
            &input,
            None,
            Some(operator),
            now,
            &self.ctx.settings,
        )
        .await?;

        publish_work_order_created(&self.ctx, &wo);
        info!(work_order_id = %wo.id, pcb_type_id = ?wo.pcb_type_id, "Work order created");
        Ok(wo)
    }

    #[instrument(skip(self))]
    pub async fn get_work_order(&self, id: Uuid) -> Result<work_order::Model, ServiceError> {
        find_work_order_in(&*self.ctx.db, id).await
    }

    #[instrument(skip(self))]
    pub async fn progress(&self, id: Uuid) -> Result<WorkOrderProgress, ServiceError> {
        let wo = self.get_work_order(id).await?;
        Ok(WorkOrderProgress::from(&wo))
    }

    /// Whether another unit may be completed: not cancelled and not yet full.
    #[instrument(skip(self))]
    pub async fn can_complete_unit(&self, id: Uuid) -> Result<bool, ServiceError> {
        Ok(self.get_work_order(id).await?.accepts_units())
    }

    /// Newest first, with the total matching row count.
    #[instrument(skip(self))]
    pub async fn list_work_orders(
        &self,
        filter: WorkOrderFilter,
        page: u64,
        per_page: u64,
    ) -> Result<(Vec<work_order::Model>, u64), ServiceError> {
        let db = &*self.ctx.db;
        let mut query = WorkOrderEntity::find();

        if let Some(status) = filter.status {
            query = query.filter(work_order::Column::Status.eq(status));
        }
        if let Some(is_rework) = filter.is_rework {
            query = query.filter(work_order::Column::IsRework.eq(is_rework));
        }
        if let Some(code) = non_blank(filter.pcb_type) {
            match pcb_types::find_by_code(db, &code).await? {
                Some(pcb) => {
                    query = query.filter(
                        Condition::any()
                            .add(work_order::Column::PcbTypeId.eq(pcb.id))
                            .add(work_order::Column::ItemCode.starts_with(pcb.prefix.as_str())),
                    )
                }
                None => return Ok((Vec::new(), 0)),
            }
        }
        if let Some(search) = non_blank(filter.search) {
            query = query.filter(
                Condition::any()
                    .add(work_order::Column::ItemCode.contains(search.as_str()))
                    .add(work_order::Column::Product.contains(search.as_str()))
                    .add(work_order::Column::Barcode.contains(search.as_str()))
                    .add(work_order::Column::CustomerName.contains(search.as_str())),
            );
        }

        let paginator = query
            .order_by_desc(work_order::Column::CreatedAt)
            .order_by_desc(work_order::Column::Id)
            .paginate(db, per_page.max(1));
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

    /// Orders tagged with the type, or whose item code carries its prefix.
    #[instrument(skip(self))]
    pub async fn list_by_pcb_type(
        &self,
        code: &str,
    ) -> Result<Vec<work_order::Model>, ServiceError> {
        let db = &*self.ctx.db;
        let pcb = pcb_types::find_by_code(db, code)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("PCB type {} not found", code)))?;

        WorkOrderEntity::find()
            .filter(
                Condition::any()
                    .add(work_order::Column::PcbTypeId.eq(pcb.id))
                    .add(work_order::Column::ItemCode.starts_with(pcb.prefix.as_str())),
            )
            .order_by_desc(work_order::Column::CreatedAt)
            .all(db)
            .await
            .map_err(ServiceError::db_error)
    }

    /// Completes one unit directly against the ledger, outside the scan workflow.
    #[instrument(skip(self))]
    pub async fn complete_unit(
        &self,
        id: Uuid,
        operator: &str,
    ) -> Result<WorkOrderProgress, ServiceError> {
        let operator = require_operator(operator)?;
        let _guard = self.ctx.locks.acquire(id).await?;
        let now = self.ctx.clock.now();

        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        let wo = complete_unit_in(&txn, id, &operator, now).await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        publish_unit_completed(&self.ctx, &wo);
        info!(
            work_order_id = %id,
            completed = wo.completed_quantity,
            quantity = wo.quantity,
            "Unit completed"
        );
        Ok(WorkOrderProgress::from(&wo))
    }

    /// Applies descriptive edits and status overrides.
    ///
    /// The only status values accepted are `Cancelled` and the status the counters already
    /// imply. Cancelled orders keep their status; completed orders cannot be cancelled.
    #[instrument(skip(self, input))]
    pub async fn update_work_order(
        &self,
        id: Uuid,
        input: UpdateWorkOrderInput,
        operator: &str,
    ) -> Result<work_order::Model, ServiceError> {
        input.validate()?;
        let operator = require_operator(operator)?;
        let _guard = self.ctx.locks.acquire(id).await?;
        let now = self.ctx.clock.now();

        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        let wo = find_work_order_in(&txn, id).await?;

        let mut cancelling = false;
        if let Some(requested) = input.status {
            let derived = WorkOrderStatus::derive(wo.quantity, wo.completed_quantity);
            match (wo.status, requested) {
                (WorkOrderStatus::Cancelled, WorkOrderStatus::Cancelled) => {}
                (WorkOrderStatus::Cancelled, other) => {
                    return Err(ServiceError::Conflict(format!(
                        "Work order {} is cancelled and cannot move to {:?}",
                        id, other
                    )))
                }
                (_, WorkOrderStatus::Cancelled) if wo.is_fully_completed() => {
                    return Err(ServiceError::Conflict(format!(
                        "Work order {} is already completed",
                        id
                    )))
                }
                (_, WorkOrderStatus::Cancelled) => cancelling = true,
                (_, other) if other == derived => {}
                (_, other) => {
                    return Err(ServiceError::Conflict(format!(
                        "Status {:?} does not match progress {}/{} of work order {}",
                        other, wo.completed_quantity, wo.quantity, id
                    )))
                }
            }
        }

        let mut model: work_order::ActiveModel = wo.clone().into();
        if let Some(product) = non_blank(input.product) {
            model.product = Set(product);
        }
        if input.description.is_some() {
            model.description = Set(non_blank(input.description));
        }
        if input.machine_no.is_some() {
            model.machine_no = Set(non_blank(input.machine_no));
        }
        if input.customer_name.is_some() {
            model.customer_name = Set(non_blank(input.customer_name));
        }
        if input.target_date.is_some() {
            model.target_date = Set(input.target_date);
        }
        if input.released_by.is_some() {
            model.released_by = Set(non_blank(input.released_by));
        }
        if input.remarks.is_some() {
            model.remarks = Set(non_blank(input.remarks));
        }
        if let Some(priority) = input.priority {
            model.priority = Set(priority);
        }
        if input.rework_notes.is_some() {
            model.rework_notes = Set(non_blank(input.rework_notes));
        }
        if cancelling {
            model.status = Set(WorkOrderStatus::Cancelled);
        }
        model.updated_at = Set(now);

        let updated = WorkOrderEntity::update(model)
            .filter(work_order::Column::CompletedQuantity.eq(wo.completed_quantity))
            .exec(&txn)
            .await
            .map_err(not_updated(id))?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        if cancelling {
            counter!("manufacturing.work_orders.cancelled", 1);
            emit(&self.ctx.event_sender, Event::WorkOrderCancelled(id));
            info!(work_order_id = %id, %operator, "Work order cancelled");
        } else {
            emit(&self.ctx.event_sender, Event::WorkOrderUpdated(id));
            info!(work_order_id = %id, %operator, "Work order updated");
        }
        Ok(updated)
    }

    /// Removes a work order nothing refers to.
    #[instrument(skip(self))]
    pub async fn delete_work_order(&self, id: Uuid, operator: &str) -> Result<(), ServiceError> {
        let operator = require_operator(operator)?;
        let _guard = self.ctx.locks.acquire(id).await?;

        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        find_work_order_in(&txn, id).await?;

        let units = assembly_process::Entity::find()
            .filter(assembly_process::Column::WorkOrderId.eq(id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let archived = completed_assembly::Entity::find()
            .filter(completed_assembly::Column::WorkOrderRef.eq(id.to_string()))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        let reworks = WorkOrderEntity::find()
            .filter(work_order::Column::OriginalWorkOrderId.eq(id))
            .count(&txn)
            .await
            .map_err(ServiceError::db_error)?;

        if units + archived + reworks > 0 {
            return Err(ServiceError::Conflict(format!(
                "Work order {} is still referenced by {} assembly, {} archive and {} rework records",
                id, units, archived, reworks
            )));
        }

        WorkOrderEntity::delete_by_id(id)
            .exec(&txn)
            .await
            .map_err(ServiceError::db_error)?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        emit(&self.ctx.event_sender, Event::WorkOrderDeleted(id));
        info!(work_order_id = %id, %operator, "Work order deleted");
        Ok(())
    }

    /// The order followed by each ancestor it was reworked from, root last.
    #[instrument(skip(self))]
    pub async fn lineage(&self, id: Uuid) -> Result<Vec<work_order::Model>, ServiceError> {
        let db = &*self.ctx.db;
        let mut chain = vec![find_work_order_in(db, id).await?];
        let mut seen = HashSet::from([id]);

        while let Some(parent) = chain.last().and_then(|wo| wo.original_work_order_id) {
            if chain.len() >= MAX_LINEAGE_DEPTH {
                warn!(work_order_id = %id, "rework lineage truncated at depth limit");
                break;
            }
            if !seen.insert(parent) {
                warn!(work_order_id = %id, %parent, "rework lineage loops back on itself");
                break;
            }
            match WorkOrderEntity::find_by_id(parent)
                .one(db)
                .await
                .map_err(ServiceError::db_error)?
            {
                Some(wo) => chain.push(wo),
                None => break,
            }
        }

        Ok(chain)
    }
}
