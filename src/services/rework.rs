use metrics::counter;
use sea_orm::{EntityTrait, TransactionTrait};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;

use super::{
    completed_assemblies, non_blank, require_operator,
    work_orders::{self, CreateWorkOrderInput},
    ServiceContext,
};
use crate::{
    entities::{
        completed_assembly,
        manufacturing::ComponentRecord,
        work_order::{self, WorkOrderPriority, WorkOrderStatus},
    },
    errors::ServiceError,
    events::{emit, Event},
};

const REWORK_SUFFIX: &str = "(REWORK)";

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ReworkFromArchiveInput {
    pub reason: String,
    /// Components to record against the source unit's rework history
    pub components: Option<Vec<ComponentRecord>>,
    pub notes: Option<String>,
    pub requested_by: String,
}

#[derive(Debug, Clone, Deserialize, Serialize, ToSchema)]
pub struct ReworkFromWorkOrderInput {
    /// Defaults to a single unit
    pub quantity: Option<i32>,
    pub notes: Option<String>,
    pub operator: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ReworkOutcome {
    pub work_order: work_order::Model,
    pub source: completed_assembly::Model,
}

fn rework_product(product: &str) -> String {
    if product.ends_with(REWORK_SUFFIX) {
        product.to_string()
    } else {
        format!("{} {}", product, REWORK_SUFFIX)
    }
}

#[derive(Clone)]
pub struct ReworkService {
    ctx: ServiceContext,
}

impl ReworkService {
    pub fn new(ctx: ServiceContext) -> Self {
        Self { ctx }
    }

    /// Spawns a single-unit, high-priority rework order from an archived unit.
    ///
    /// `original_assembly_id` is taken as text: ids that don't parse are reported as
    /// missing entries rather than malformed input.
    #[instrument(skip(self, input), fields(requested_by = %input.requested_by))]
    pub async fn create_rework_order(
        &self,
        original_assembly_id: &str,
        input: ReworkFromArchiveInput,
    ) -> Result<ReworkOutcome, ServiceError> {
        let requested_by = require_operator(&input.requested_by)?;
        let reason = input.reason.trim().to_string();
        if reason.is_empty() {
            return Err(ServiceError::ValidationError(
                "rework reason is required".to_string(),
            ));
        }
        let source_id = Uuid::parse_str(original_assembly_id.trim()).map_err(|_| {
            ServiceError::NotFound(format!(
                "Completed assembly {} not found",
                original_assembly_id
            ))
        })?;

        let now = self.ctx.clock.now();
        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        let source = completed_assemblies::find_entry_in(&txn, source_id).await?;

        let original = match source.work_order_id() {
            Some(id) => work_order::Entity::find_by_id(id)
                .one(&txn)
                .await
                .map_err(ServiceError::db_error)?,
            None => None,
        };

        let rework_notes = non_blank(input.notes).unwrap_or_else(|| reason.clone());
        let request = CreateWorkOrderInput {
            item_code: source.item_code.clone(),
            product: rework_product(&source.product),
            quantity: 1,
            description: Some(format!(
                "Rework of unit {}: {}",
                source.serial_number, reason
            )),
            machine_no: original.as_ref().and_then(|wo| wo.machine_no.clone()),
            customer_name: original.as_ref().and_then(|wo| wo.customer_name.clone()),
            priority: WorkOrderPriority::High,
            is_rework: true,
            original_work_order_id: original.as_ref().map(|wo| wo.id),
            rework_notes: Some(rework_notes.clone()),
            ..Default::default()
        };

        let work_order = work_orders::insert_work_order_in(
            &txn,
            &request,
            Some(source.id),
            Some(requested_by.clone()),
            now,
            &self.ctx.settings,
        )
        .await?;
        let source = completed_assemblies::mark_reworked_in(
            &txn,
            &source,
            Some(rework_notes),
            &requested_by,
            input.components.unwrap_or_default(),
            now,
        )
        .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        self.publish(&work_order);
        info!(
            rework_order_id = %work_order.id,
            source_assembly_id = %source.id,
            serial = %source.serial_number,
            "Rework order created from completed assembly"
        );
        Ok(ReworkOutcome { work_order, source })
    }

    /// Spawns a rework order from a completed work order.
    #[instrument(skip(self, input), fields(operator = %input.operator))]
    pub async fn create_rework_from_work_order(
        &self,
        original_work_order_id: Uuid,
        input: ReworkFromWorkOrderInput,
    ) -> Result<work_order::Model, ServiceError> {
        let operator = require_operator(&input.operator)?;
        let quantity = input.quantity.unwrap_or(1);
        if quantity < 1 {
            return Err(ServiceError::ValidationError(format!(
                "rework quantity must be at least 1, got {}",
                quantity
            )));
        }
        if quantity != 1 && !self.ctx.settings.allow_multi_unit_rework {
            return Err(ServiceError::ValidationError(
                "multi-unit rework orders are disabled".to_string(),
            ));
        }

        let now = self.ctx.clock.now();
        let txn = self.ctx.db.begin().await.map_err(ServiceError::db_error)?;
        let original = work_orders::find_work_order_in(&txn, original_work_order_id).await?;
        if original.status != WorkOrderStatus::Completed {
            return Err(ServiceError::Conflict(format!(
                "Work order {} is {:?}; only completed orders can be reworked",
                original.id, original.status
            )));
        }

        let request = CreateWorkOrderInput {
            item_code: original.item_code.clone(),
            product: rework_product(&original.product),
            quantity,
            description: original.description.clone(),
            machine_no: original.machine_no.clone(),
            customer_name: original.customer_name.clone(),
            priority: WorkOrderPriority::High,
            is_rework: true,
            original_work_order_id: Some(original.id),
            rework_notes: non_blank(input.notes),
            ..Default::default()
        };
        let work_order = work_orders::insert_work_order_in(
            &txn,
            &request,
            None,
            Some(operator),
            now,
            &self.ctx.settings,
        )
        .await?;
        txn.commit().await.map_err(ServiceError::db_error)?;

        self.publish(&work_order);
        info!(
            rework_order_id = %work_order.id,
            %original_work_order_id,
            quantity,
            "Rework order created from work order"
        );
        Ok(work_order)
    }

    fn publish(&self, work_order: &work_order::Model) {
        work_orders::publish_work_order_created(&self.ctx, work_order);
        counter!("manufacturing.rework_orders.created", 1);
        emit(
            &self.ctx.event_sender,
            Event::ReworkOrderCreated {
                rework_order_id: work_order.id,
                original_work_order_id: work_order.original_work_order_id,
                source_assembly_id: work_order.source_assembly_id,
            },
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rework_suffix_is_not_repeated() {
        assert_eq!(rework_product("YBS board"), "YBS board (REWORK)");
        assert_eq!(rework_product("YBS board (REWORK)"), "YBS board (REWORK)");
    }
}
