use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::component::ComponentList;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
pub enum WorkOrderStatus {
    #[sea_orm(string_value = "Pending")]
    Pending,
    #[sea_orm(string_value = "In Progress")]
    #[serde(rename = "In Progress")]
    InProgress,
    #[sea_orm(string_value = "Completed")]
    Completed,
    #[sea_orm(string_value = "Cancelled")]
    Cancelled,
}

impl WorkOrderStatus {
    /// Status implied by the quantity counters alone.
    pub fn derive(quantity: i32, completed_quantity: i32) -> Self {
        if completed_quantity >= quantity {
            WorkOrderStatus::Completed
        } else if completed_quantity > 0 {
            WorkOrderStatus::InProgress
        } else {
            WorkOrderStatus::Pending
        }
    }
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, EnumIter, DeriveActiveEnum, Serialize,
    Deserialize, ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "lowercase")]
pub enum WorkOrderPriority {
    #[sea_orm(string_value = "low")]
    Low,
    #[default]
    #[sea_orm(string_value = "normal")]
    Normal,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "urgent")]
    Urgent,
}

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "work_orders")]
#[schema(as = WorkOrder)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub item_code: String,
    pub product: String,
    pub pcb_type_id: Option<Uuid>,
    pub description: Option<String>,
    /// Requested units; fixed at creation
    pub quantity: i32,
    /// Only ever advanced by the ledger's unit completion
    pub completed_quantity: i32,
    pub status: WorkOrderStatus,
    pub priority: WorkOrderPriority,
    pub barcode: Option<String>,
    pub machine_no: Option<String>,
    pub customer_name: Option<String>,
    pub target_date: Option<NaiveDate>,
    pub released_by: Option<String>,
    pub remarks: Option<String>,
    pub is_rework: bool,
    pub original_work_order_id: Option<Uuid>,
    /// Archive entry this rework order was spawned from
    pub source_assembly_id: Option<Uuid>,
    pub rework_notes: Option<String>,
    pub assembly_start_time: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Json")]
    pub scanned_components: ComponentList,
    pub completed_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::pcb_type::Entity",
        from = "Column::PcbTypeId",
        to = "super::pcb_type::Column::Id"
    )]
    PcbType,
    #[sea_orm(has_many = "super::assembly_process::Entity")]
    AssemblyProcesses,
}

impl Related<super::pcb_type::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::PcbType.def()
    }
}

impl Related<super::assembly_process::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssemblyProcesses.def()
    }
}

impl Model {
    pub fn remaining_quantity(&self) -> i32 {
        (self.quantity - self.completed_quantity).max(0)
    }

    pub fn completion_percentage(&self) -> f64 {
        if self.quantity <= 0 {
            return 0.0;
        }
        f64::from(self.completed_quantity) / f64::from(self.quantity) * 100.0
    }

    pub fn is_fully_completed(&self) -> bool {
        self.completed_quantity >= self.quantity
    }

    pub fn can_complete_unit(&self) -> bool {
        self.completed_quantity < self.quantity
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == WorkOrderStatus::Cancelled
    }

    /// True when another unit may be started or completed against this order.
    pub fn accepts_units(&self) -> bool {
        !self.is_cancelled() && self.can_complete_unit()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let now = Utc::now();

        if insert {
            if let ActiveValue::NotSet = self.id {
                self.id = ActiveValue::Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = self.created_at {
                self.created_at = ActiveValue::Set(now);
            }
            if let ActiveValue::NotSet = self.completed_quantity {
                self.completed_quantity = ActiveValue::Set(0);
            }
            if let ActiveValue::NotSet = self.status {
                self.status = ActiveValue::Set(WorkOrderStatus::Pending);
            }
            if let ActiveValue::NotSet = self.priority {
                self.priority = ActiveValue::Set(WorkOrderPriority::Normal);
            }
            if let ActiveValue::NotSet = self.is_rework {
                self.is_rework = ActiveValue::Set(false);
            }
            if let ActiveValue::NotSet = self.scanned_components {
                self.scanned_components = ActiveValue::Set(ComponentList::new());
            }
        }

        if let ActiveValue::NotSet = self.updated_at {
            self.updated_at = ActiveValue::Set(now);
        }

        Ok(self)
    }
}
