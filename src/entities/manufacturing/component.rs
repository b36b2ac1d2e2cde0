use chrono::{DateTime, Utc};
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// One component placed on a unit, as recorded in work order and archive history.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct ComponentRecord {
    pub barcode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sensor_id: Option<i32>,
    pub scanned_at: DateTime<Utc>,
    pub operator: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previous_barcode: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replacement_time: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub replaced_by: Option<String>,
}

impl ComponentRecord {
    pub fn scanned(
        barcode: impl Into<String>,
        sensor_id: Option<i32>,
        operator: impl Into<String>,
        scanned_at: DateTime<Utc>,
    ) -> Self {
        Self {
            barcode: barcode.into(),
            sensor_id,
            scanned_at,
            operator: operator.into(),
            previous_barcode: None,
            replacement_reason: None,
            replacement_time: None,
            replaced_by: None,
        }
    }
}

/// Ordered component list stored as a JSON column.
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
#[serde(transparent)]
pub struct ComponentList(pub Vec<ComponentRecord>);

impl ComponentList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, ComponentRecord> {
        self.0.iter()
    }

    pub fn push(&mut self, record: ComponentRecord) {
        self.0.push(record);
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = ComponentRecord>) {
        self.0.extend(records);
    }

    pub fn find_by_barcode_mut(&mut self, barcode: &str) -> Option<&mut ComponentRecord> {
        self.0.iter_mut().find(|c| c.barcode == barcode)
    }

    pub fn contains_barcode(&self, barcode: &str) -> bool {
        self.0.iter().any(|c| c.barcode == barcode)
    }

    /// Rewrites the component carrying `old_barcode` in place, keeping its position.
    ///
    /// Returns `false` when no component carries `old_barcode`.
    pub fn replace_barcode(
        &mut self,
        old_barcode: &str,
        new_barcode: &str,
        reason: &str,
        operator: &str,
        at: DateTime<Utc>,
    ) -> bool {
        match self.find_by_barcode_mut(old_barcode) {
            Some(component) => {
                component.previous_barcode = Some(component.barcode.clone());
                component.barcode = new_barcode.to_string();
                component.replacement_reason = Some(reason.to_string());
                component.replacement_time = Some(at);
                component.replaced_by = Some(operator.to_string());
                true
            }
            None => false,
        }
    }
}

impl From<Vec<ComponentRecord>> for ComponentList {
    fn from(records: Vec<ComponentRecord>) -> Self {
        Self(records)
    }
}

impl IntoIterator for ComponentList {
    type Item = ComponentRecord;
    type IntoIter = std::vec::IntoIter<ComponentRecord>;

    fn into_iter(self) -> Self::IntoIter {
        self.0.into_iter()
    }
}
