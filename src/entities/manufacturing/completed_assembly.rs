use chrono::{DateTime, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveModelBehavior, ActiveValue, ConnectionTrait};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use super::component::ComponentList;

/// Durable record of a finished unit.
///
/// Holds no foreign keys: the work order is referenced by its id rendered as text so
/// archive entries outlive the live records they were built from.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "completed_assemblies")]
#[schema(as = CompletedAssembly)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub work_order_ref: String,
    pub assembly_process_id: Option<Uuid>,
    pub product: String,
    pub item_code: String,
    pub serial_number: String,
    pub barcode_number: String,
    pub completed_at: DateTime<Utc>,
    pub completed_by: String,
    pub zone: String,
    pub is_rework: bool,
    pub reworked: bool,
    pub original_assembly_id: Option<Uuid>,
    pub rework_notes: Option<String>,
    pub reworked_by: Option<String>,
    pub reworked_at: Option<DateTime<Utc>>,
    #[sea_orm(column_type = "Json")]
    pub scanned_components: ComponentList,
    #[sea_orm(column_type = "Json")]
    pub reworked_components: ComponentList,
    #[sea_orm(column_type = "Json")]
    pub previous_components: ComponentList,
    /// Bumped on every update; writers compare it to detect lost updates.
    pub version: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl Model {
    /// Parses `work_order_ref` back into an id, if it still looks like one.
    pub fn work_order_id(&self) -> Option<Uuid> {
        Uuid::parse_str(&self.work_order_ref).ok()
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
            if let ActiveValue::NotSet = self.reworked {
                self.reworked = ActiveValue::Set(false);
            }
            if let ActiveValue::NotSet = self.version {
                self.version = ActiveValue::Set(0);
            }
            for list in [
                &mut self.scanned_components,
                &mut self.reworked_components,
                &mut self.previous_components,
            ] {
                if let ActiveValue::NotSet = list {
                    *list = ActiveValue::Set(ComponentList::new());
                }
            }
        }

        if let ActiveValue::NotSet = self.updated_at {
            self.updated_at = ActiveValue::Set(now);
        }

        Ok(self)
    }

    async fn before_delete<C>(self, _db: &C) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        Err(DbErr::Custom(
            "completed assembly records are never deleted".to_string(),
        ))
    }
}
