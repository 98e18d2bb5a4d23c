//! Read-mostly reference entities.
//!
//! These tables are pulled wholesale from the remote store and never pushed,
//! so they carry numeric server-assigned keys and no local edits.

use serde::{Deserialize, Serialize};

use super::entity::Entity;
use super::record::RecordId;
use crate::registry::EntityKind;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct InventoryItem {
    pub id: i64,
    pub nombre: String,
    #[serde(default)]
    pub cantidad: f64,
    #[serde(default)]
    pub unidad: String,
    #[serde(default)]
    pub ubicacion: Option<String>,
}

impl InventoryItem {
    pub fn new(
        id: i64,
        nombre: impl Into<String>,
        cantidad: f64,
        unidad: impl Into<String>,
    ) -> Self {
        Self {
            id,
            nombre: nombre.into(),
            cantidad,
            unidad: unidad.into(),
            ubicacion: None,
        }
    }
}

impl Entity for InventoryItem {
    const KIND: EntityKind = EntityKind::Inventory;

    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolRef {
    pub id: i64,
    pub nombre: String,
    #[serde(default)]
    pub categoria: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
}

impl Entity for ToolRef {
    const KIND: EntityKind = EntityKind::Tool;

    fn record_id(&self) -> RecordId {
        self.id.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::Record;
    use serde_json::json;

    #[test]
    fn test_inventory_item_from_record_uses_numeric_id() {
        let record = Record::new(
            "12",
            serde_json::from_value(json!({"nombre": "Cemento", "cantidad": 40.0, "unidad": "saco"}))
                .unwrap(),
        );

        let item = InventoryItem::from_record(&record).unwrap();
        assert_eq!(item.id, 12);
        assert_eq!(item.unidad, "saco");
        assert_eq!(item.record_id().as_str(), "12");
    }
}
