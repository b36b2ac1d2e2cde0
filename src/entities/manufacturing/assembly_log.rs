use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

pub const ACTION_CREATED: &str = "Created";
pub const ACTION_PART_SCANNED: &str = "Part Scanned";
pub const ACTION_PART_REPLACED: &str = "Part Replaced";
pub const ACTION_COMPLETED: &str = "Completed";
pub const ACTION_REJECTED: &str = "Rejected";

/// Append-only audit trail entry for an assembly process.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "assembly_logs")]
#[schema(as = AssemblyLog)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub assembly_process_id: Uuid,
    pub action: String,
    pub details: String,
    pub operator: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::assembly_process::Entity",
        from = "Column::AssemblyProcessId",
        to = "super::assembly_process::Column::Id"
    )]
    AssemblyProcess,
}

impl Related<super::assembly_process::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::AssemblyProcess.def()
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if !insert {
            return Err(DbErr::Custom(
                "assembly log entries are append-only".to_string(),
            ));
        }
        if let ActiveValue::NotSet = self.id {
            self.id = ActiveValue::Set(Uuid::new_v4());
        }
        if let ActiveValue::NotSet = self.timestamp {
            self.timestamp = ActiveValue::Set(Utc::now());
        }
        Ok(self)
    }

    async fn before_delete<C>(self, _db: &C) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Err(DbErr::Custom(
            "assembly log entries are append-only".to_string(),
        ))
    }
}
