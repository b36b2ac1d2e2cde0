use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize,
    ToSchema,
)]
#[sea_orm(rs_type = "String", db_type = "Text")]
#[serde(rename_all = "snake_case")]
pub enum AssemblyStatus {
    #[sea_orm(string_value = "pending")]
    Pending,
    #[sea_orm(string_value = "in_progress")]
    InProgress,
    #[sea_orm(string_value = "completed")]
    Completed,
    #[sea_orm(string_value = "rejected")]
    Rejected,
}

impl AssemblyStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, AssemblyStatus::Completed | AssemblyStatus::Rejected)
    }

    pub fn active() -> [AssemblyStatus; 2] {
        [AssemblyStatus::Pending, AssemblyStatus::InProgress]
    }
}

/// One physical unit being built against a work order.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "assembly_processes")]
#[schema(as = AssemblyProcess)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub serial_number: String,
    pub work_order_id: Uuid,
    /// 1-based position of this unit among the work order's assembly records
    pub sequence_number: i32,
    pub status: AssemblyStatus,
    pub quantity_completed: i32,
    pub current_sensor_index: i32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_by: String,
    pub notes: Option<String>,
    pub rejection_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::work_order::Entity",
        from = "Column::WorkOrderId",
        to = "super::work_order::Column::Id"
    )]
    WorkOrder,
    #[sea_orm(has_many = "super::scanned_part::Entity")]
    ScannedParts,
    #[sea_orm(has_many = "super::assembly_log::Entity")]
    Logs,
}

impl Related<super::work_order::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::WorkOrder.def()
    }
}

impl Related<super::scanned_part::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::ScannedParts.def()
    }
}

impl Related<super::assembly_log::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Logs.def()
    }
}

impl Model {
    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
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
            if let ActiveValue::NotSet = self.status {
                self.status = ActiveValue::Set(AssemblyStatus::Pending);
            }
            if let ActiveValue::NotSet = self.quantity_completed {
                self.quantity_completed = ActiveValue::Set(0);
            }
            if let ActiveValue::NotSet = self.current_sensor_index {
                self.current_sensor_index = ActiveValue::Set(1);
            }
        }

        if let ActiveValue::NotSet = self.updated_at {
            self.updated_at = ActiveValue::Set(now);
        }

        Ok(self)
    }
}
