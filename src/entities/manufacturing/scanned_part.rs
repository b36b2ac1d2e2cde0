use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::component::ComponentRecord;

#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "scanned_parts")]
#[schema(as = ScannedPart)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub assembly_process_id: Uuid,
    pub part_code: String,
    /// Not every scan is sensor-indexed
    pub sensor_id: Option<i32>,
    pub operator: String,
    pub scan_time: DateTime<Utc>,
    pub replaced: bool,
    pub replaced_with: Option<String>,
    pub replace_reason: Option<String>,
    pub replace_time: Option<DateTime<Utc>>,
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

impl Model {
    pub fn to_component(&self) -> ComponentRecord {
        ComponentRecord::scanned(
            self.part_code.clone(),
            self.sensor_id,
            self.operator.clone(),
            self.scan_time,
        )
    }
}

#[async_trait::async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C>(mut self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        if insert {
            if let ActiveValue::NotSet = self.id {
                self.id = ActiveValue::Set(Uuid::new_v4());
            }
            if let ActiveValue::NotSet = self.scan_time {
                self.scan_time = ActiveValue::Set(Utc::now());
            }
            if let ActiveValue::NotSet = self.replaced {
                self.replaced = ActiveValue::Set(false);
            }
        }

        Ok(self)
    }
}
